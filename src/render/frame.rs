use super::color::Rgb;
use super::mapper::Geometry;

/// Raw LED frame: `3 * max_leds` bytes of RGB in LED-index order.
///
/// Unwritten slots stay zero (off). Writes past `max_leds` are dropped.
pub struct PixelFrame {
    data: Vec<u8>,
}

impl PixelFrame {
    pub fn new(max_leds: usize) -> Self {
        Self {
            data: vec![0; max_leds * 3],
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Returns false when `index` is outside the buffer.
    pub fn set(&mut self, index: usize, color: Rgb) -> bool {
        let Some(slot) = slot_range(index).and_then(|range| self.data.get_mut(range)) else {
            return false;
        };
        slot.copy_from_slice(&[color.r, color.g, color.b]);
        true
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        let slot = self.data.get(slot_range(index)?)?;
        Some(Rgb::new(slot[0], slot[1], slot[2]))
    }

    /// Write a logical pixel through the panel mapping.
    pub fn set_xy(&mut self, geometry: &Geometry, x: usize, y: usize, color: Rgb) {
        if let Some(index) = geometry.led(x, y) {
            self.set(index, color);
        }
    }

    pub fn get_xy(&self, geometry: &Geometry, x: usize, y: usize) -> Option<Rgb> {
        geometry.led(x, y).and_then(|index| self.get(index))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn lit_count(&self) -> usize {
        self.data
            .chunks_exact(3)
            .filter(|px| px.iter().any(|&c| c != 0))
            .count()
    }
}

fn slot_range(index: usize) -> Option<std::ops::Range<usize>> {
    let start = index.checked_mul(3)?;
    Some(start..start.checked_add(3)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_dark_with_fixed_length() {
        let frame = PixelFrame::new(1024);
        assert_eq!(frame.as_bytes().len(), 3072);
        assert_eq!(frame.lit_count(), 0);
    }

    #[test]
    fn out_of_capacity_writes_are_dropped() {
        let mut frame = PixelFrame::new(4);
        assert!(frame.set(3, Rgb::WHITE));
        assert!(!frame.set(4, Rgb::WHITE));
        assert!(!frame.set(usize::MAX, Rgb::WHITE));
        assert_eq!(frame.lit_count(), 1);
        assert_eq!(frame.as_bytes().len(), 12);
    }

    #[test]
    fn mapped_write_respects_capacity() {
        // half the panel chain is cut off by max_leds
        let geometry = Geometry::new(32, 16, 32, 8, 1, Some(256)).unwrap();
        let mut frame = PixelFrame::new(geometry.max_leds);
        for y in 0..geometry.height {
            for x in 0..geometry.width {
                frame.set_xy(&geometry, x, y, Rgb::new(1, 2, 3));
            }
        }
        assert_eq!(frame.lit_count(), 256);
        assert_eq!(frame.get_xy(&geometry, 0, 0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(frame.get_xy(&geometry, 0, 8), None);
    }

    #[test]
    fn rgb_channel_order() {
        let mut frame = PixelFrame::new(2);
        frame.set(1, Rgb::new(10, 20, 30));
        assert_eq!(frame.as_bytes(), &[0, 0, 0, 10, 20, 30]);
        frame.clear();
        assert_eq!(frame.as_bytes(), &[0; 6]);
    }
}
