/// Per-pixel weighted-average accumulator with a weight cap.
///
/// Repeated additions sharpen a static pixel by averaging successive
/// samples; the cap rescales the running sums so the average stays
/// responsive when the scene eventually changes. Invariant:
/// `weight() <= cap` after every `add_with_cap`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccumCell {
    r: f64,
    g: f64,
    b: f64,
    w: f64,
}

impl AccumCell {
    pub fn add_with_cap(&mut self, r: f64, g: f64, b: f64, weight: f64, cap: f64) {
        self.r += r * weight;
        self.g += g * weight;
        self.b += b * weight;
        self.w += weight;

        if self.w > cap {
            let (avg_r, avg_g, avg_b) = self.to_pixel();
            self.r = avg_r * cap;
            self.g = avg_g * cap;
            self.b = avg_b * cap;
            self.w = cap;
        }
    }

    /// The observable pixel: the weighted mean, or black while empty.
    pub fn to_pixel(&self) -> (f64, f64, f64) {
        if self.w == 0.0 {
            return (0.0, 0.0, 0.0);
        }
        (self.r / self.w, self.g / self.w, self.b / self.w)
    }

    pub fn weight(&self) -> f64 {
        self.w
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_reads_black() {
        assert_eq!(AccumCell::default().to_pixel(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn average_of_two_samples() {
        let mut cell = AccumCell::default();
        cell.add_with_cap(1.0, 0.0, 0.5, 1.0, 4.0);
        cell.add_with_cap(0.0, 1.0, 0.5, 1.0, 4.0);
        let (r, g, b) = cell.to_pixel();
        assert!((r - 0.5).abs() < 1e-12);
        assert!((g - 0.5).abs() < 1e-12);
        assert!((b - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weight_never_exceeds_cap() {
        let mut cell = AccumCell::default();
        for _ in 0..100 {
            cell.add_with_cap(0.25, 0.5, 0.75, 1.0, 4.0);
            assert!(cell.weight() <= 4.0 + 1e-12);
        }
        // Long-run average of a constant input is that input.
        let (r, g, b) = cell.to_pixel();
        assert!((r - 0.25).abs() < 1e-9);
        assert!((g - 0.5).abs() < 1e-9);
        assert!((b - 0.75).abs() < 1e-9);
    }

    #[test]
    fn cap_rescale_preserves_the_average() {
        let mut cell = AccumCell::default();
        for _ in 0..4 {
            cell.add_with_cap(0.8, 0.2, 0.4, 1.0, 4.0);
        }
        let before = cell.to_pixel();
        cell.add_with_cap(0.8, 0.2, 0.4, 1.0, 4.0);
        let after = cell.to_pixel();
        assert!((before.0 - after.0).abs() < 1e-9);
        assert!((before.1 - after.1).abs() < 1e-9);
        assert!((before.2 - after.2).abs() < 1e-9);
        assert!((cell.weight() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut cell = AccumCell::default();
        cell.add_with_cap(1.0, 1.0, 1.0, 1.0, 4.0);
        cell.clear();
        assert_eq!(cell.weight(), 0.0);
        assert_eq!(cell.to_pixel(), (0.0, 0.0, 0.0));
    }
}
