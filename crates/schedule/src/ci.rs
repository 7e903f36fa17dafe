//! Confidence interval seam.
//!
//! Statistical estimators live outside the engine. They are plugged in
//! through [`ConfidenceInterval`] and [`CiProvider`]; the engine only reads a
//! prediction, percentile bounds and a viability score.

use crate::Metrics;
use std::fmt;
use std::sync::Arc;

/// The interval could not be computed at all.
pub const CANNOT_CALCULATE: f64 = 0.0;
/// The interval exists but is not trustworthy.
pub const SERIOUS_PROBLEM: f64 = 1.0;
/// Lowest score still worth considering. Intervals at or below it are
/// discarded.
pub const ACCEPTABLE: f64 = 2.0;
/// A healthy interval.
pub const NOMINAL: f64 = 3.0;

/// Confidence for the forecast ranges shown to users.
pub const RANGE_CONFIDENCE: f64 = 0.70;

/// A distribution over some predicted quantity.
pub trait ConfidenceInterval: Send + Sync + fmt::Debug {
    /// Most likely value.
    fn prediction(&self) -> f64;

    /// Lower bound of the central interval holding `percentage` of the mass.
    fn lpi(&self, percentage: f64) -> f64;

    /// Upper bound of the central interval holding `percentage` of the mass.
    fn upi(&self, percentage: f64) -> f64;

    /// Quality score, comparable to [`ACCEPTABLE`].
    fn viability(&self) -> f64;

    /// Ratio of actual to planned values, for intervals built from ratios.
    fn actual_vs_plan_ratio(&self) -> Option<f64> {
        None
    }

    /// Viability recomputed against a target value. `None` when the interval
    /// does not support targeting.
    fn targeted_viability(&self, _target: f64, _percentage: f64) -> Option<f64> {
        None
    }
}

/// A shared interval plus the viability the engine currently assigns it.
#[derive(Clone)]
pub struct Interval {
    ci: Arc<dyn ConfidenceInterval>,
    viability: f64,
}

impl Interval {
    /// Wrap an interval, starting from its own viability.
    pub fn new(ci: Arc<dyn ConfidenceInterval>) -> Self {
        let viability = ci.viability();
        Self { ci, viability }
    }

    /// Most likely value.
    pub fn prediction(&self) -> f64 {
        self.ci.prediction()
    }

    /// Lower bound at `percentage`.
    pub fn lpi(&self, percentage: f64) -> f64 {
        self.ci.lpi(percentage)
    }

    /// Upper bound at `percentage`.
    pub fn upi(&self, percentage: f64) -> f64 {
        self.ci.upi(percentage)
    }

    /// Current viability.
    pub fn viability(&self) -> f64 {
        self.viability
    }

    /// Ratio of actual to planned values, if known.
    pub fn actual_vs_plan_ratio(&self) -> Option<f64> {
        self.ci.actual_vs_plan_ratio()
    }

    /// True when viability is above [`ACCEPTABLE`].
    pub fn is_viable(&self) -> bool {
        self.viability > ACCEPTABLE
    }

    /// Recompute viability against `target` when the interval supports it.
    pub fn retarget(&mut self, target: f64, percentage: f64) {
        if let Some(v) = self.ci.targeted_viability(target, percentage) {
            self.viability = v;
        }
    }

    /// Value at quantile `q` in `0..=1`, read from the central bounds.
    pub fn quantile(&self, q: f64) -> f64 {
        if q < 0.5 {
            self.lpi(1.0 - 2.0 * q)
        } else if q > 0.5 {
            self.upi(2.0 * q - 1.0)
        } else {
            self.prediction()
        }
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interval")
            .field("ci", &self.ci)
            .field("viability", &self.viability)
            .finish()
    }
}

/// Data handed to a provider when an interval is requested.
#[derive(Debug, Clone, Copy)]
pub struct CiRequest<'a> {
    /// Metrics of the schedule being recalculated.
    pub metrics: &'a Metrics,
    /// Quantity the interval should be centered on, if any.
    pub input: Option<f64>,
    /// `(plan, actual)` pairs of completed work, for estimators that fit
    /// the current plan.
    pub points: &'a [(f64, f64)],
}

/// Source of confidence intervals for one purpose (cost or time error).
pub trait CiProvider: Send + Sync {
    /// Build an interval, or `None` when there is not enough data.
    fn interval(&self, request: &CiRequest<'_>) -> Option<Interval>;
}

/// An interval with fixed, evenly widening bounds.
///
/// Useful when an estimate is supplied from outside, and in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedInterval {
    /// Most likely value.
    pub prediction: f64,
    /// Distance from the prediction to either bound at 100 %.
    pub half_width: f64,
    /// Reported viability.
    pub viability: f64,
    /// Ratio of actual to plan, if meaningful.
    pub ratio: Option<f64>,
}

impl FixedInterval {
    /// A nominal interval around `prediction`.
    pub fn new(prediction: f64, half_width: f64) -> Self {
        Self { prediction, half_width, viability: NOMINAL, ratio: None }
    }
}

impl ConfidenceInterval for FixedInterval {
    fn prediction(&self) -> f64 {
        self.prediction
    }

    fn lpi(&self, percentage: f64) -> f64 {
        self.prediction - self.half_width * percentage
    }

    fn upi(&self, percentage: f64) -> f64 {
        self.prediction + self.half_width * percentage
    }

    fn viability(&self) -> f64 {
        self.viability
    }

    fn actual_vs_plan_ratio(&self) -> Option<f64> {
        self.ratio
    }

    fn targeted_viability(&self, target: f64, percentage: f64) -> Option<f64> {
        Some(targeted(self.lpi(percentage), self.upi(percentage), target))
    }
}

/// An interval read from a sorted sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalInterval {
    samples: Vec<f64>,
    viability: f64,
}

impl EmpiricalInterval {
    /// Build from unsorted samples. Non-finite samples are dropped.
    pub fn new(mut samples: Vec<f64>, viability: f64) -> Self {
        samples.retain(|s| s.is_finite());
        samples.sort_by(|a, b| a.total_cmp(b));
        let viability = if samples.is_empty() { CANNOT_CALCULATE } else { viability };
        Self { samples, viability }
    }

    fn at(&self, q: f64) -> f64 {
        if self.samples.is_empty() {
            return f64::NAN;
        }
        let pos = (q.clamp(0.0, 1.0) * (self.samples.len() - 1) as f64).round() as usize;
        self.samples[pos]
    }
}

impl ConfidenceInterval for EmpiricalInterval {
    fn prediction(&self) -> f64 {
        self.at(0.5)
    }

    fn lpi(&self, percentage: f64) -> f64 {
        self.at((1.0 - percentage) / 2.0)
    }

    fn upi(&self, percentage: f64) -> f64 {
        self.at((1.0 + percentage) / 2.0)
    }

    fn viability(&self) -> f64 {
        self.viability
    }

    fn targeted_viability(&self, target: f64, percentage: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return Some(CANNOT_CALCULATE);
        }
        Some(targeted(self.lpi(percentage), self.upi(percentage), target))
    }
}

/// Sum of independent intervals. Distances from the prediction to each
/// bound add in quadrature.
#[derive(Debug, Clone)]
pub struct SumInterval {
    parts: Vec<Interval>,
}

impl SumInterval {
    /// Sum `parts`.
    pub fn new(parts: Vec<Interval>) -> Self {
        Self { parts }
    }

    fn spread(&self, percentage: f64, bound: impl Fn(&Interval, f64) -> f64) -> f64 {
        self.parts
            .iter()
            .map(|p| (bound(p, percentage) - p.prediction()).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl ConfidenceInterval for SumInterval {
    fn prediction(&self) -> f64 {
        self.parts.iter().map(Interval::prediction).sum()
    }

    fn lpi(&self, percentage: f64) -> f64 {
        self.prediction() - self.spread(percentage, Interval::lpi)
    }

    fn upi(&self, percentage: f64) -> f64 {
        self.prediction() + self.spread(percentage, Interval::upi)
    }

    fn viability(&self) -> f64 {
        self.parts.iter().map(Interval::viability).reduce(f64::min).unwrap_or(CANNOT_CALCULATE)
    }

    fn targeted_viability(&self, target: f64, percentage: f64) -> Option<f64> {
        Some(targeted(self.lpi(percentage), self.upi(percentage), target))
    }
}

fn targeted(lower: f64, upper: f64, target: f64) -> f64 {
    if target.is_nan() || target < 0.0 {
        SERIOUS_PROBLEM
    } else if lower <= target && target <= upper {
        NOMINAL
    } else {
        SERIOUS_PROBLEM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_bounds_and_quantiles() {
        let iv = Interval::new(Arc::new(FixedInterval::new(100.0, 50.0)));
        assert_eq!(iv.lpi(0.7), 65.0);
        assert_eq!(iv.upi(0.7), 135.0);
        assert_eq!(iv.quantile(0.5), 100.0);
        assert_eq!(iv.quantile(0.15), 65.0);
        assert!(iv.is_viable());
    }

    #[test]
    fn test_retarget_outside_range_is_unviable() {
        let mut iv = Interval::new(Arc::new(FixedInterval::new(100.0, 10.0)));
        iv.retarget(500.0, RANGE_CONFIDENCE);
        assert_eq!(iv.viability(), SERIOUS_PROBLEM);
        assert!(!iv.is_viable());
        iv.retarget(101.0, RANGE_CONFIDENCE);
        assert_eq!(iv.viability(), NOMINAL);
    }

    #[test]
    fn test_acceptable_is_not_viable() {
        let mut fixed = FixedInterval::new(1.0, 1.0);
        fixed.viability = ACCEPTABLE;
        assert!(!Interval::new(Arc::new(fixed)).is_viable());
    }

    #[test]
    fn test_empirical_interval_reads_sorted_samples() {
        let e = EmpiricalInterval::new(vec![5.0, 1.0, f64::NAN, 3.0, 2.0, 4.0], NOMINAL);
        assert_eq!(e.prediction(), 3.0);
        assert_eq!(e.lpi(1.0), 1.0);
        assert_eq!(e.upi(1.0), 5.0);
        assert_eq!(EmpiricalInterval::new(vec![], NOMINAL).viability(), CANNOT_CALCULATE);
    }

    #[test]
    fn test_sum_interval_adds_spreads_in_quadrature() {
        let a = Interval::new(Arc::new(FixedInterval::new(100.0, 30.0)));
        let b = Interval::new(Arc::new(FixedInterval::new(200.0, 40.0)));
        let sum = SumInterval::new(vec![a, b]);
        assert_eq!(sum.prediction(), 300.0);
        assert!((sum.lpi(1.0) - 250.0).abs() < 1e-9);
        assert!((sum.upi(1.0) - 350.0).abs() < 1e-9);
        assert_eq!(sum.viability(), NOMINAL);
        assert_eq!(SumInterval::new(Vec::new()).viability(), CANNOT_CALCULATE);
    }
}
