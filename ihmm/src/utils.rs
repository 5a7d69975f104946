/// Render a matrix of values in `[0, 1]` as rows of shade glyphs, darkest for one.
#[cfg(test)]
pub(crate) fn shade_rows(matrix: &[Vec<f64>]) -> Vec<String> {
    const SHADES: [char; 5] = [' ', '\u{2591}', '\u{2592}', '\u{2593}', '\u{2588}'];

    matrix
        .iter()
        .map(|row| {
            row.iter()
                .map(|&v| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let level = (v.clamp(0.0, 1.0) * 4.0).round() as usize;
                    SHADES[level]
                })
                .collect()
        })
        .collect()
}

/// Scale non-negative weights so they sum to one.
///
/// A vector with no usable mass (all zero, or a non-finite sum) becomes uniform.
pub(crate) fn normalize(weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        weights.into_iter().map(|w| w / total).collect()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let uniform = (weights.len() as f64).recip();
        vec![uniform; weights.len()]
    }
}

/// Index of the first cumulative weight strictly above `u`.
///
/// `None` when round-off leaves the whole cumulative mass at or below `u`.
pub(crate) fn inverse_cdf(weights: &[f64], u: f64) -> Option<usize> {
    let cumulative: Vec<f64> = weights
        .iter()
        .scan(0.0, |acc, w| {
            *acc += w;
            Some(*acc)
        })
        .collect();

    let index = cumulative.partition_point(|&c| c <= u);
    (index < cumulative.len()).then_some(index)
}

/// Online Mean and Variance
#[derive(Default, Clone, Copy, Debug)]
pub struct MeanAndVariance {
    count: usize,
    mean: f64,
    m2: f64,
}

impl MeanAndVariance {
    #[must_use]
    pub fn update(self, new_value: f64) -> Self {
        let count = self.count + 1;
        let delta = new_value - self.mean;
        #[allow(clippy::cast_precision_loss)]
        let mean = self.mean + delta / (count as f64);
        let delta2 = new_value - mean;
        let m2 = delta.mul_add(delta2, self.m2);

        Self { count, mean, m2 }
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance, `0` for fewer than two values.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = self.count as f64;
            self.m2 / n
        }
    }
}

impl FromIterator<f64> for MeanAndVariance {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        iter.into_iter().fold(Self::default(), Self::update)
    }
}
