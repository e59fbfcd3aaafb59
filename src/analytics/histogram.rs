use serde::Serialize;

pub const DEFAULT_BINS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    pub lower_bound: f64,
    pub count: u64,
}

/// Frequency bins ordered by lower bound, ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Histogram {
    pub bins: Vec<Bin>,
}

#[cfg(test)]
impl Histogram {
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Bucket simulated terminal values into `bins` equal-width bins spanning
/// `[min, max]`. Pure and deterministic.
///
/// When every sample is equal the width would be zero; a width of 1 is used
/// instead, so all samples land in bin 0 and the bounds run `min, min+1, ..`.
/// A sample equal to `max` is clamped into the last bin.
pub fn histogram(samples: &[f64], bins: usize) -> Histogram {
    if samples.is_empty() || bins == 0 {
        return Histogram::default();
    }

    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));

    let mut width = (max - min) / bins as f64;
    if width == 0.0 {
        width = 1.0;
    }

    let last = (bins - 1) as f64;
    let mut counts = vec![0u64; bins];
    for &s in samples {
        // NaN maps to bin 0 through max(0.0)
        let idx = ((s - min) / width).floor().max(0.0).min(last) as usize;
        counts[idx] += 1;
    }

    Histogram {
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| Bin {
                lower_bound: min + i as f64 * width,
                count,
            })
            .collect(),
    }
}
