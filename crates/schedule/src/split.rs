//! Split schedules: history rewritten as actuals, future kept as planned.

use crate::Schedule;
use evman_core::{bad_double, Time};

impl Schedule {
    /// Copy of this schedule where every period before the effective date
    /// plans exactly the direct time that was actually spent, so a
    /// hypothetical date reflects what really happened so far. With
    /// `use_dtpi` the future plan is scaled by the direct-time performance
    /// index.
    ///
    /// Rollups split each sub-schedule and rebuild the combined timeline.
    pub fn split_history(&self, use_dtpi: bool) -> Schedule {
        if self.is_rollup() {
            let subs = self.subs().iter().map(|s| s.split_history(use_dtpi)).collect();
            let mut r = Schedule::new_rollup(subs);
            r.set_effective_date(self.effective_date());
            r.rebuild_rollup_periods(self.effective_date().unwrap_or_else(chrono::Utc::now));
            return r;
        }

        let mut s = self.timeline_copy();
        s.set_level_of_effort(0.0);
        let eff = self.effective_date();
        if let Some(eff) = eff {
            s.split_at(eff);
            let history = s.periods.clone();
            s.rewrite_history(&history, eff);
        }

        for p in s.periods.iter_mut() {
            p.plan_total_time = p.plan_direct_time;
        }
        s.default_plan_total_time = s.default_plan_direct_time;

        if use_dtpi {
            let dtpi = self.metrics.direct_time_performance_index_eff();
            if !bad_double(dtpi) && dtpi > 0.0 {
                s.scale_future(eff, 1.0 / dtpi);
            }
        }
        s.recalc_cum_plan_times();
        s
    }

    fn scale_future(&mut self, after: Option<Time>, factor: f64) {
        for p in self.periods.iter_mut().filter(|p| after.map_or(true, |a| p.end > a)) {
            p.plan_direct_time *= factor;
            p.plan_total_time *= factor;
        }
        self.default_plan_direct_time *= factor;
        self.default_plan_total_time *= factor;
    }
}
