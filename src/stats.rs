//! Estimators for post-processing Census statistics: margin-of-error
//! aggregation and percentile interpolation over grouped (binned) data.
//!
//! Census distributions are frequently published as counts per range
//! ("204,986 people aged 15 to 19") rather than per exact value, so a
//! median or other percentile has to be interpolated within the bin that
//! contains the target rank.

use std::cmp::Ordering;

/// One distribution bin: observation count plus `(lower, upper)` bounds.
pub type Bin = (f64, (f64, f64));

/// Margin of error of a sum of independent estimates, combined as the
/// root sum of squares of the individual margins.
///
/// Zero-valued estimates are excluded from the sum, except that the
/// single largest margin among them is folded back in once (the
/// Census-recommended treatment of zero-suppressed cells, which would
/// otherwise double-count correlated zeros).
///
/// **Warning**: this approximation assumes zero covariance between the
/// summed variables. The Census Bureau publishes no covariance data and
/// suggests this formula with exactly that caveat.
///
/// ```
/// use census_api::stats::moe_of_sum;
/// let moe = moe_of_sum(&[10.0, 0.0, 0.0], &[2.0, 1.0, 3.0]);
/// assert!((moe - 13.0_f64.sqrt()).abs() < 1e-12);
/// ```
pub fn moe_of_sum(values: &[f64], moes: &[f64]) -> f64 {
    let mut moe_sq: f64 = values
        .iter()
        .zip(moes)
        .filter(|(value, _)| **value != 0.0)
        .map(|(_, moe)| moe * moe)
        .sum();

    let largest_zero_moe = values
        .iter()
        .zip(moes)
        .filter(|(value, _)| **value == 0.0)
        .map(|(_, moe)| *moe)
        .reduce(f64::max);
    if let Some(moe) = largest_zero_moe {
        moe_sq += moe * moe;
    }

    moe_sq.sqrt()
}

/// Estimate a percentile of grouped data by linear interpolation within
/// the bin containing the target rank.
///
/// Bins need not be pre-sorted; they are ordered by lower bound
/// internally. Returns `None` for empty input, a zero total count, or a
/// percentile past the end of the distribution.
///
/// ```
/// use census_api::stats::linear_percentile;
/// let ages = [
///     (216350.0, (0.0, 4.0)),
///     (201692.0, (5.0, 9.0)),
///     (211151.0, (10.0, 14.0)),
///     (204986.0, (15.0, 19.0)),
///     (200257.0, (20.0, 24.0)),
///     (439047.0, (25.0, 34.0)),
///     (459664.0, (35.0, 44.0)),
///     (424775.0, (45.0, 54.0)),
///     (163492.0, (55.0, 59.0)),
///     (127511.0, (60.0, 64.0)),
///     (169552.0, (65.0, 74.0)),
///     (113693.0, (75.0, 84.0)),
///     (44661.0, (85.0, 120.0)),
/// ];
/// let median = linear_percentile(&ages, 0.5).unwrap();
/// assert!((median - 35.3).abs() < 0.1);
/// ```
pub fn linear_percentile(bins: &[Bin], percentile: f64) -> Option<f64> {
    let (index, sorted) = bin_select(bins, percentile)?;
    Some(interpolate_linear(&sorted, index, percentile))
}

/// Estimate a percentile assuming a Pareto distribution within the
/// selected bin. Suits heavily skewed distributions such as income.
///
/// The bin selection is identical to [`linear_percentile`]; only the
/// within-bin interpolation differs. The final (open-ended) bin must be
/// given a finite upper bound, since the bound ratio enters a logarithm.
/// When the target rank lands in the last bin the overall-count ratio is
/// zero and its logarithm undefined, so the estimate falls back to linear
/// interpolation there, as it does for a non-positive lower bound.
pub fn pareto_percentile(bins: &[Bin], percentile: f64) -> Option<f64> {
    let (index, sorted) = bin_select(bins, percentile)?;
    let (_, (lower, upper)) = sorted[index];

    let total: f64 = sorted.iter().map(|(count, _)| count).sum();
    let at_or_above: f64 = sorted[index..].iter().map(|(count, _)| count).sum();
    let above: f64 = sorted[index + 1..].iter().map(|(count, _)| count).sum();

    if above == 0.0 || lower <= 0.0 {
        return Some(interpolate_linear(&sorted, index, percentile));
    }

    let ratio_proportion = percentile * total / at_or_above;
    let ratio_overall = above / at_or_above;
    let ratio_bounds = upper / lower;

    Some(lower * (ratio_proportion.ln() / ratio_overall.ln() * ratio_bounds.ln()).exp())
}

/// Locate the bin whose cumulative count first reaches
/// `percentile * total`. Returns the index together with the sorted bins
/// it refers to.
fn bin_select(bins: &[Bin], percentile: f64) -> Option<(usize, Vec<Bin>)> {
    if bins.is_empty() {
        return None;
    }
    let mut sorted = bins.to_vec();
    sorted.sort_by(|a, b| a.1.0.partial_cmp(&b.1.0).unwrap_or(Ordering::Equal));

    let total: f64 = sorted.iter().map(|(count, _)| count).sum();
    if total == 0.0 {
        return None;
    }

    let target = total * percentile;
    let mut running = 0.0;
    for (i, (count, _)) in sorted.iter().enumerate() {
        if running + count >= target {
            return Some((i, sorted));
        }
        running += count;
    }
    None
}

fn interpolate_linear(sorted: &[Bin], index: usize, percentile: f64) -> f64 {
    let (count, (lower, upper)) = sorted[index];
    if count == 0.0 {
        // A zero-count bin can only be selected when the target rank sits
        // exactly on its lower edge.
        return lower;
    }
    let total: f64 = sorted.iter().map(|(count, _)| count).sum();
    let below: f64 = sorted[..index].iter().map(|(count, _)| count).sum();
    let target = percentile * total;
    lower + (target - below) / count * (upper - lower)
}
