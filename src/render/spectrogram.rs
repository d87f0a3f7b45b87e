use std::collections::VecDeque;

/// Scrolling waterfall: `rows` x `columns`, oldest row first.
#[derive(Debug)]
pub struct SpectrogramHistory {
    rows: VecDeque<Vec<f32>>,
    columns: usize,
}

impl SpectrogramHistory {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| vec![0.0; columns]).collect(),
            columns,
        }
    }

    /// Scroll up by one row and append `heights` as the newest (bottom) row.
    pub fn push(&mut self, heights: &[f32]) {
        if self.rows.is_empty() {
            return;
        }
        let mut row = self.rows.pop_front().unwrap_or_default();
        row.clear();
        row.extend(heights.iter().copied().take(self.columns));
        row.resize(self.columns, 0.0);
        self.rows.push_back(row);
    }

    /// Intensity at (`x`, `y`), `y = 0` being the oldest row.
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.rows
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(0.0)
    }
}
