//! Calculator configuration.
//!
//! The three calculator variants share one pipeline. What differs is a set
//! of capabilities: where the leaves come from, how confidence intervals
//! are produced, and whether a baseline is compared.

use chrono::{DateTime, Utc};
use evman_schedule::ForecastMethod;
use serde::{Deserialize, Serialize};

/// Errors raised by invalid configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A percentage outside `0..=100`.
    #[error("{name} must be between 0 and 100, got {value}")]
    Percent {
        /// Setting name.
        name: &'static str,
        /// Rejected value.
        value: u8,
    },

    /// A setting that only applies to another variant.
    #[error("{0} does not apply to the {1:?} calculator")]
    Unsupported(&'static str, Variant),
}

/// Result alias for configuration checks.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where the ordered leaf list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafSource {
    /// The leaves of this task list's own tree.
    Tree,
    /// The already ordered leaves of each child list, merged by date.
    SubLists,
}

/// How confidence intervals are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiPolicy {
    /// Ask the configured providers, current plan first, then history.
    Providers,
    /// Combine the children's intervals when every child has a viable one.
    Combined,
    /// No intervals.
    Disabled,
}

/// Whether baseline data is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Match nodes against the registered baseline snapshot.
    Snapshot,
    /// Leave baseline fields untouched.
    Skip,
}

/// The calculator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// One task list with its own schedule.
    #[default]
    Single,
    /// A rollup of task lists.
    Rollup,
    /// A rollup that only collects leaves and root totals.
    LeavesOnly,
}

/// The strategies selected by a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Leaf source.
    pub leaves: LeafSource,
    /// Interval policy.
    pub ci: CiPolicy,
    /// Baseline policy.
    pub baseline: BaselinePolicy,
}

impl Variant {
    /// Strategies this variant runs with.
    pub fn capabilities(self) -> Capabilities {
        match self {
            Variant::Single => Capabilities {
                leaves: LeafSource::Tree,
                ci: CiPolicy::Providers,
                baseline: BaselinePolicy::Snapshot,
            },
            Variant::Rollup => Capabilities {
                leaves: LeafSource::SubLists,
                ci: CiPolicy::Combined,
                baseline: BaselinePolicy::Snapshot,
            },
            Variant::LeavesOnly => Capabilities {
                leaves: LeafSource::SubLists,
                ci: CiPolicy::Disabled,
                baseline: BaselinePolicy::Skip,
            },
        }
    }
}

/// Per-task-list calculator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    /// Calculator variant.
    pub variant: Variant,
    /// Sort completed tasks to the front by completion date.
    pub reorder_completed: bool,
    /// Ignore time and tasks finished before the schedule start.
    pub rezero_at_start: bool,
    /// Effective date to use instead of the clock.
    pub fixed_effective_date: Option<DateTime<Utc>>,
    /// Forecast method.
    pub forecast_method: ForecastMethod,
    /// Assumed completion of overspent tasks, in percent.
    pub almost_done_pct: u8,
    /// Cap on the CPI correction of underspent tasks, in percent.
    pub max_cpi_correction_pct: u8,
    /// Ask the current-plan interval providers.
    pub use_current_plan_ci: bool,
    /// Fall back to the historical interval providers.
    pub use_historical_ci: bool,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Single,
            reorder_completed: true,
            rezero_at_start: true,
            fixed_effective_date: None,
            forecast_method: ForecastMethod::default(),
            almost_done_pct: 90,
            max_cpi_correction_pct: 0,
            use_current_plan_ci: true,
            use_historical_ci: false,
        }
    }
}

impl CalculatorConfig {
    /// Defaults for a rollup.
    pub fn rollup() -> Self {
        Self { variant: Variant::Rollup, ..Self::default() }
    }

    /// Defaults for a leaves-only rollup.
    pub fn leaves_only() -> Self {
        Self { variant: Variant::LeavesOnly, ..Self::default() }
    }

    /// Builder: sort completed tasks first.
    pub fn with_reorder_completed(mut self, on: bool) -> Self {
        self.reorder_completed = on;
        self
    }

    /// Builder: ignore work before the schedule start.
    pub fn with_rezero_at_start(mut self, on: bool) -> Self {
        self.rezero_at_start = on;
        self
    }

    /// Builder: pin the effective date.
    pub fn with_fixed_effective_date(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.fixed_effective_date = at;
        self
    }

    /// Builder: set the forecast method.
    pub fn with_forecast_method(mut self, method: ForecastMethod) -> Self {
        self.forecast_method = method;
        self
    }

    /// Builder: set the almost-done percentage.
    pub fn with_almost_done_pct(mut self, pct: u8) -> Self {
        self.almost_done_pct = pct;
        self
    }

    /// Builder: set the CPI correction cap.
    pub fn with_max_cpi_correction_pct(mut self, pct: u8) -> Self {
        self.max_cpi_correction_pct = pct;
        self
    }

    /// Builder: choose interval sources.
    pub fn with_ci_sources(mut self, current_plan: bool, historical: bool) -> Self {
        self.use_current_plan_ci = current_plan;
        self.use_historical_ci = historical;
        self
    }

    /// Strategies for the configured variant.
    pub fn capabilities(&self) -> Capabilities {
        self.variant.capabilities()
    }

    /// Assumed completion of overspent tasks, as a fraction.
    pub fn almost_done(&self) -> f64 {
        f64::from(self.almost_done_pct.min(100)) / 100.0
    }

    /// CPI correction cap, as a fraction.
    pub fn max_cpi_correction(&self) -> f64 {
        f64::from(self.max_cpi_correction_pct.min(100)) / 100.0
    }

    /// Check ranges and variant-specific settings.
    pub fn validate(&self) -> Result<()> {
        if self.almost_done_pct > 100 || self.almost_done_pct == 0 {
            return Err(ConfigError::Percent { name: "almost_done_pct", value: self.almost_done_pct });
        }
        if self.max_cpi_correction_pct > 100 {
            return Err(ConfigError::Percent {
                name: "max_cpi_correction_pct",
                value: self.max_cpi_correction_pct,
            });
        }
        if self.variant != Variant::Single && self.fixed_effective_date.is_some() {
            return Err(ConfigError::Unsupported("fixed_effective_date", self.variant));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = CalculatorConfig::default();
        assert!(c.reorder_completed);
        assert!(c.rezero_at_start);
        assert_eq!(c.forecast_method, ForecastMethod::Task);
        assert_eq!(c.almost_done(), 0.9);
        assert_eq!(c.max_cpi_correction(), 0.0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_variant_capabilities() {
        assert_eq!(Variant::Single.capabilities().leaves, LeafSource::Tree);
        assert_eq!(Variant::Rollup.capabilities().ci, CiPolicy::Combined);
        let fast = Variant::LeavesOnly.capabilities();
        assert_eq!(fast.ci, CiPolicy::Disabled);
        assert_eq!(fast.baseline, BaselinePolicy::Skip);
    }

    #[test]
    fn test_validate_rejects_bad_percentages() {
        let c = CalculatorConfig::default().with_almost_done_pct(120);
        assert_eq!(
            c.validate(),
            Err(ConfigError::Percent { name: "almost_done_pct", value: 120 })
        );
        let c = CalculatorConfig::rollup().with_fixed_effective_date(Some(Utc::now()));
        assert!(matches!(c.validate(), Err(ConfigError::Unsupported(_, Variant::Rollup))));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let c: CalculatorConfig =
            serde_json::from_str(r#"{"forecast_method":"simple","almost_done_pct":80}"#).unwrap();
        assert_eq!(c.forecast_method, ForecastMethod::Simple);
        assert_eq!(c.almost_done_pct, 80);
        assert!(c.use_current_plan_ci);
    }
}
