//! Formatted metric rows for reports.

use crate::Metrics;
use evman_core::{bad_double, EvDate};
use serde::Serialize;

const HOUR_MINUTES: f64 = 60.0;
const DAY_MINUTES: f64 = 24.0 * HOUR_MINUTES;

const DURATION_UNITS: [(f64, &str); 6] = [
    (365.0 * DAY_MINUTES, "year"),
    (30.0 * DAY_MINUTES, "month"),
    (7.0 * DAY_MINUTES, "week"),
    (DAY_MINUTES, "day"),
    (HOUR_MINUTES, "hour"),
    (1.0, "minute"),
];

/// One displayable metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    /// Stable identifier, e.g. `Cost_Performance_Index`.
    pub key: &'static str,
    /// Human-readable name.
    pub name: String,
    /// Number only, e.g. `1.09` or `-65%`.
    pub short: String,
    /// Interpreted value, e.g. `45% over budget`.
    pub medium: String,
    /// A full sentence.
    pub full: String,
    /// True for rows derived from cost data.
    pub cost_related: bool,
}

enum Value {
    Date(Option<EvDate>),
    Cost(f64),
    Abs(f64),
    Dbl(f64),
    Duration(f64),
    CostRange(f64, f64),
    DateRange(Option<EvDate>, Option<EvDate>),
}

fn valid_date(d: Option<EvDate>) -> Option<String> {
    match d {
        Some(d @ EvDate::At(_)) => Some(d.to_string()),
        _ => None,
    }
}

fn finite(d: f64) -> Option<f64> {
    (!bad_double(d)).then_some(d)
}

/// Render `minutes` in the largest unit not exceeding `max_units`.
pub fn format_duration(minutes: f64, max_units: f64) -> Option<String> {
    let minutes = finite(minutes)?.abs();
    for (unit, label) in DURATION_UNITS {
        if unit > max_units {
            continue;
        }
        if minutes > unit {
            return Some(format!("{} {label}s", format_number(minutes / unit)));
        }
        if minutes == unit {
            return Some(format!("1 {label}"));
        }
    }
    Some(format!("{} minutes", format_number(minutes)))
}

fn format_number(n: f64) -> String {
    let s = format!("{n:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn percent(d: f64) -> String {
    format!("{}%", format_number(d * 100.0))
}

fn render(key: &'static str, value: Value) -> Option<(String, String, String)> {
    let name = key.replace('_', " ");
    let (short, medium) = match value {
        Value::Date(d) => {
            let d = valid_date(d)?;
            (d.clone(), d)
        }
        Value::Cost(c) => {
            let c = finite(c)?;
            let hours = format_number(c / HOUR_MINUTES);
            (hours, format_duration(c, HOUR_MINUTES)?)
        }
        Value::Abs(d) => {
            let d = finite(d)?;
            let word = if d < 0.0 { "below" } else { "above" };
            (percent(d), format!("{} {word}", percent(d.abs())))
        }
        Value::Dbl(d) => {
            let d = finite(d)?;
            (format_number(d), format_number(d))
        }
        Value::Duration(d) => {
            let d = finite(d)?;
            (format_number(d / DAY_MINUTES), format_duration(d, f64::MAX)?)
        }
        Value::CostRange(lo, hi) => {
            let (lo, hi) = (finite(lo)?, finite(hi)?);
            (
                format!("{} - {}", format_number(lo / HOUR_MINUTES), format_number(hi / HOUR_MINUTES)),
                format!(
                    "{} to {}",
                    format_duration(lo, HOUR_MINUTES)?,
                    format_duration(hi, HOUR_MINUTES)?
                ),
            )
        }
        Value::DateRange(lo, hi) => {
            let (lo, hi) = (lo?.to_string(), hi?.to_string());
            (format!("{lo} - {hi}"), format!("{lo} to {hi}"))
        }
    };
    let full = format!("{name}: {medium}.");
    Some((short, medium, full))
}

impl Metrics {
    /// The valid metric rows, in display order. Rows whose value cannot be
    /// computed are omitted.
    pub fn rows(&self) -> Vec<MetricRow> {
        let mut defs: Vec<(&'static str, Value, bool)> = vec![
            ("Plan_Date", Value::Date(self.plan_date()), false),
            ("Replan_Date", Value::Date(self.replan_date()), false),
            ("Replan_Cost", Value::Cost(self.replan_cost()), true),
            ("Cost_Variance", Value::Cost(self.cost_variance()), true),
            ("Cost_Variance_Percent", Value::Abs(self.cost_variance_percentage()), true),
            ("Cost_Performance_Index", Value::Dbl(self.cost_performance_index()), true),
            ("Schedule_Variance", Value::Cost(self.schedule_variance()), true),
            ("Schedule_Variance_Percent", Value::Abs(self.schedule_variance_percentage()), false),
            ("Schedule_Variance_Duration", Value::Duration(self.schedule_variance_duration()), false),
            ("Schedule_Performance_Index", Value::Dbl(self.schedule_performance_index()), false),
            ("Baseline_Cost", Value::Cost(self.total_baseline()), true),
            ("Baseline_Growth", Value::Cost(self.baseline_growth()), true),
            ("Baseline_Growth_Percent", Value::Abs(self.baseline_growth_percentage()), false),
            ("Baseline_Date", Value::Date(self.baseline_date()), false),
            ("Percent_Complete", Value::Dbl(self.percent_complete()), false),
            ("Percent_Spent", Value::Dbl(self.percent_spent()), true),
            ("To_Complete_Index", Value::Dbl(self.to_complete_performance_index()), true),
            ("Improvement_Ratio", Value::Abs(self.improvement_ratio()), true),
            ("Forecast_Cost", Value::Cost(self.independent_forecast_cost_eff()), true),
            (
                "Forecast_Cost_Range",
                Value::CostRange(self.independent_forecast_cost_lpi(), self.independent_forecast_cost_upi()),
                true,
            ),
            ("Forecast_Duration", Value::Duration(self.independent_forecast_duration()), false),
            ("Forecast_Date", Value::Date(self.independent_forecast_date()), false),
            (
                "Forecast_Date_Range",
                Value::DateRange(self.independent_forecast_date_lpi(), self.independent_forecast_date_upi()),
                false,
            ),
        ];

        if self.rollup().is_some() {
            defs.push((
                "Optimized_Forecast_Duration",
                Value::Duration(self.optimized_forecast_duration()),
                false,
            ));
            defs.push(("Optimized_Forecast_Date", Value::Date(self.optimized_forecast_date()), false));
            defs.push((
                "Optimized_Forecast_Date_Range",
                Value::DateRange(self.optimized_forecast_date_lpi(), self.optimized_forecast_date_upi()),
                false,
            ));
            defs.insert(1, ("Optimized_Plan_Date", Value::Date(self.optimized_plan_date()), false));
            defs.insert(3, ("Optimized_Replan_Date", Value::Date(self.optimized_replan_date()), false));
        }

        defs.into_iter()
            .filter_map(|(key, value, cost_related)| {
                let (short, medium, full) = render(key, value)?;
                Some(MetricRow { key, name: key.replace('_', " "), short, medium, full, cost_related })
            })
            .collect()
    }
}
