//! Positional series operations with explicit missing values
//!
//! Every feature is built from these primitives. Rolling windows are only
//! ever applied to already-shifted series, so a window ending at row `t`
//! covers rows `t - w .. t - 1`.

pub type Series = Vec<Option<f64>>;

/// Window aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Mean,
    Max,
    Min,
    Sum,
}

impl Agg {
    pub fn label(self) -> &'static str {
        match self {
            Agg::Mean => "mean",
            Agg::Max => "max",
            Agg::Min => "min",
            Agg::Sum => "sum",
        }
    }

    fn apply(self, window: &[f64]) -> f64 {
        match self {
            Agg::Mean => window.iter().sum::<f64>() / window.len() as f64,
            Agg::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Agg::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            Agg::Sum => window.iter().sum(),
        }
    }
}

/// Value from `n` rows earlier; the first `n` rows are missing.
pub fn shift(values: &[Option<f64>], n: usize) -> Series {
    (0..values.len())
        .map(|i| if i >= n { values[i - n] } else { None })
        .collect()
}

/// Trailing aggregate over exactly `width` rows ending at each row.
///
/// A window that is incomplete or contains a missing value yields missing.
pub fn rolling(values: &[Option<f64>], width: usize, agg: Agg) -> Series {
    let mut out = Vec::with_capacity(values.len());
    let mut buf = Vec::with_capacity(width);

    for end in 0..values.len() {
        if width == 0 || end + 1 < width {
            out.push(None);
            continue;
        }

        buf.clear();
        let window = &values[end + 1 - width..=end];
        let complete = window.iter().all(|v| match v {
            Some(x) => {
                buf.push(*x);
                true
            }
            None => false,
        });
        out.push(if complete { Some(agg.apply(&buf)) } else { None });
    }

    out
}

/// Element-wise `a - b`.
pub fn difference(a: &[Option<f64>], b: &[Option<f64>]) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(x - y),
            _ => None,
        })
        .collect()
}

/// 1 where `pred` holds, 0 otherwise. Missing inputs never satisfy `pred`.
pub fn flag<F>(values: &[Option<f64>], pred: F) -> Vec<u8>
where
    F: Fn(f64) -> bool,
{
    values
        .iter()
        .map(|v| v.map(|x| pred(x)).unwrap_or(false) as u8)
        .collect()
}

/// Conjunction of two flag vectors.
pub fn flag_and(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x & y).collect()
}

/// Length of the current run of consecutive 1s, counted within each run
/// and reset by every 0.
pub fn run_length(flags: &[u8]) -> Vec<u32> {
    let mut count = 0u32;
    flags
        .iter()
        .map(|&f| {
            count = if f == 1 { count + 1 } else { 0 };
            count
        })
        .collect()
}

/// Widen flags or counters into a numeric column.
pub fn as_series<T: Copy + Into<f64>>(values: &[T]) -> Series {
    values.iter().map(|&v| Some(v.into())).collect()
}
