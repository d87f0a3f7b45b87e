use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("grid dimension `{0}` must be non-zero")]
    ZeroDimension(&'static str),
    #[error("grid width {width} exceeds {panels_wide} panel(s) of {panel_width} columns")]
    TooWide {
        width: usize,
        panel_width: usize,
        panels_wide: usize,
    },
}

/// Logical grid plus the physical panel tiling behind it.
///
/// Panels are `panel_width` x `panel_height` LEDs, tiled `panels_wide` across.
/// Every odd panel row is mounted upside down, so both the local coordinates
/// and the panel order within that row are reversed. Inside a panel the LEDs
/// run column by column in a zigzag: even columns top to bottom, odd columns
/// bottom to top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    pub panel_width: usize,
    pub panel_height: usize,
    pub panels_wide: usize,
    pub max_leds: usize,
}

impl Geometry {
    /// Build a geometry. `max_leds` defaults to [`Geometry::total_leds`].
    pub fn new(
        width: usize,
        height: usize,
        panel_width: usize,
        panel_height: usize,
        panels_wide: usize,
        max_leds: Option<usize>,
    ) -> Result<Self, GeometryError> {
        for (name, value) in [
            ("width", width),
            ("height", height),
            ("panel_width", panel_width),
            ("panel_height", panel_height),
            ("panels_wide", panels_wide),
        ] {
            if value == 0 {
                return Err(GeometryError::ZeroDimension(name));
            }
        }
        if width > panel_width * panels_wide {
            return Err(GeometryError::TooWide {
                width,
                panel_width,
                panels_wide,
            });
        }

        let mut geometry = Self {
            width,
            height,
            panel_width,
            panel_height,
            panels_wide,
            max_leds: 0,
        };
        geometry.max_leds = match max_leds {
            Some(0) => return Err(GeometryError::ZeroDimension("max_leds")),
            Some(n) => n,
            None => geometry.total_leds(),
        };
        Ok(geometry)
    }

    pub fn panel_rows(&self) -> usize {
        self.height.div_ceil(self.panel_height)
    }

    /// Number of LEDs physically present on the tiled panels.
    pub fn total_leds(&self) -> usize {
        self.panel_rows() * self.panels_wide * self.panel_width * self.panel_height
    }

    /// Map a logical pixel to its LED index, `None` when outside the grid.
    ///
    /// The index is not checked against `max_leds`; writers do that.
    pub fn map(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }

        let (pw, ph) = (self.panel_width, self.panel_height);
        let panel_col = x / pw;
        let panel_row = y / ph;
        let mut lx = x % pw;
        let mut ly = y % ph;

        let panel_index = if panel_row % 2 == 1 {
            lx = pw - 1 - lx;
            ly = ph - 1 - ly;
            panel_row * self.panels_wide + (self.panels_wide - 1 - panel_col)
        } else {
            panel_row * self.panels_wide + panel_col
        };

        let offset = if lx % 2 == 0 {
            lx * ph + ly
        } else {
            lx * ph + (ph - 1 - ly)
        };

        Some(panel_index * pw * ph + offset)
    }

    /// [`Geometry::map`] for coordinates already known to be non-negative.
    pub fn led(&self, x: usize, y: usize) -> Option<usize> {
        match (i32::try_from(x), i32::try_from(y)) {
            (Ok(x), Ok(y)) => self.map(x, y),
            _ => None,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            panel_width: 32,
            panel_height: 8,
            panels_wide: 1,
            max_leds: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_indices(g: &Geometry) -> Vec<usize> {
        let mut out = Vec::new();
        for y in 0..g.height {
            for x in 0..g.width {
                if let Some(i) = g.led(x, y) {
                    out.push(i);
                }
            }
        }
        out
    }

    #[test]
    fn single_panel_covers_every_index_once() {
        let g = Geometry::new(32, 8, 32, 8, 1, None).unwrap();
        let mut indices = all_indices(&g);
        assert_eq!(indices.len(), 256);
        indices.sort_unstable();
        assert_eq!(indices, (0..256).collect::<Vec<_>>());
    }

    #[test]
    fn full_grid_is_a_bijection() {
        let g = Geometry::default();
        let indices = all_indices(&g);
        let unique: HashSet<_> = indices.iter().copied().collect();
        assert_eq!(indices.len(), 1024);
        assert_eq!(unique.len(), 1024);
        assert!(indices.iter().all(|&i| i < g.total_leds()));
    }

    #[test]
    fn tiled_panels_are_a_bijection() {
        let g = Geometry::new(64, 24, 32, 8, 2, None).unwrap();
        assert_eq!(g.total_leds(), 3 * 2 * 256);
        let mut indices = all_indices(&g);
        indices.sort_unstable();
        assert_eq!(indices, (0..g.total_leds()).collect::<Vec<_>>());
    }

    #[test]
    fn zigzag_columns_in_first_panel() {
        let g = Geometry::default();
        assert_eq!(g.map(0, 0), Some(0));
        assert_eq!(g.map(0, 1), Some(1));
        assert_eq!(g.map(0, 7), Some(7));
        // odd column runs bottom to top
        assert_eq!(g.map(1, 0), Some(15));
        assert_eq!(g.map(1, 7), Some(8));
        assert_eq!(g.map(2, 0), Some(16));
    }

    #[test]
    fn odd_panel_row_is_rotated() {
        let g = Geometry::default();
        // y=8 sits in panel row 1: local (31, 7) in panel 1
        assert_eq!(g.map(0, 8), Some(256 + 31 * 8));
        assert_eq!(g.map(31, 15), Some(256));
        assert_eq!(g.map(0, 16), Some(512));
    }

    #[test]
    fn odd_panel_row_reverses_panel_order() {
        let g = Geometry::new(64, 16, 32, 8, 2, None).unwrap();
        // left half of the second row lands in the last panel
        assert_eq!(g.map(0, 8).map(|i| i / 256), Some(3));
        assert_eq!(g.map(63, 8).map(|i| i / 256), Some(2));
        assert_eq!(g.map(40, 0).map(|i| i / 256), Some(1));
    }

    #[test]
    fn out_of_range_is_none() {
        let g = Geometry::default();
        assert_eq!(g.map(-1, 0), None);
        assert_eq!(g.map(0, -1), None);
        assert_eq!(g.map(32, 0), None);
        assert_eq!(g.map(0, 32), None);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert_eq!(
            Geometry::new(0, 32, 32, 8, 1, None),
            Err(GeometryError::ZeroDimension("width"))
        );
        assert!(matches!(
            Geometry::new(40, 32, 32, 8, 1, None),
            Err(GeometryError::TooWide { .. })
        ));
        assert_eq!(Geometry::new(32, 32, 32, 8, 1, Some(512)).unwrap().max_leds, 512);
    }
}
