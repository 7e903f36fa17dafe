//! EvMan schedule timeline and earned-value metrics.
//!
//! A [`Schedule`] is an ordered list of [`Period`]s holding planned and
//! actual time. Rollup schedules derive their periods from sub-schedules.
//! Each schedule owns the [`Metrics`] computed for it on the last
//! recalculation.

// Timeline
mod period;
mod timeline;
mod split;
mod rollup;

// Metrics
mod ci;
mod metrics;
mod format;

// Forecasting
pub mod forecast;
mod forecast_ci;

// Re-exports
pub use period::{Period, ADJUSTMENT_MILLIS};
pub use timeline::{Schedule, ScheduleData, ScheduleKind, MAX_PERIODS};

pub use ci::{
    CiProvider, CiRequest, ConfidenceInterval, EmpiricalInterval, FixedInterval, Interval, SumInterval,
    ACCEPTABLE, CANNOT_CALCULATE, NOMINAL, RANGE_CONFIDENCE, SERIOUS_PROBLEM,
};
pub use metrics::{Metrics, RollupMetrics};
pub use format::{format_duration, MetricRow};

pub use forecast::{ForecastMethod, Projection, TaskExtrapolation};
pub use forecast_ci::{PendingDateInterval, DEFAULT_SAMPLES};
