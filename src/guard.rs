//! Optional per-context instrumentation.
//!
//! A [`ScopeGuard`] snapshots wall time and resident set size on entry
//! and reports the deltas when dropped. The pipeline works identically
//! with no guards installed; they exist for operators chasing memory
//! growth across capture sessions.

use std::time::{Duration, Instant};

use tracing::debug;

/// Resident set size of this process in megabytes, or 0.0 where the
/// probe is unsupported.
pub fn rss_mb() -> f64 {
    read_rss_kb().map_or(0.0, |kb| kb as f64 / 1024.0)
}

#[cfg(target_os = "linux")]
fn read_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse::<u64>()
                .ok();
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_rss_kb() -> Option<u64> {
    None
}

#[derive(Clone, Debug)]
pub struct ScopeReport {
    pub label: &'static str,
    pub duration: Duration,
    pub rss_growth_mb: f64,
}

pub trait ScopeObserver: Send + Sync {
    fn scope_closed(&self, report: ScopeReport);
}

/// Logs every closed scope at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingScopeObserver;

impl ScopeObserver for TracingScopeObserver {
    fn scope_closed(&self, report: ScopeReport) {
        debug!(
            label = report.label,
            duration_ms = report.duration.as_secs_f64() * 1000.0,
            rss_growth_mb = report.rss_growth_mb,
            "scope closed"
        );
    }
}

pub struct ScopeGuard<'a> {
    label: &'static str,
    entered: Instant,
    rss_on_entry_mb: f64,
    observer: &'a dyn ScopeObserver,
}

impl<'a> ScopeGuard<'a> {
    pub fn enter(label: &'static str, observer: &'a dyn ScopeObserver) -> Self {
        Self {
            label,
            entered: Instant::now(),
            rss_on_entry_mb: rss_mb(),
            observer,
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.observer.scope_closed(ScopeReport {
            label: self.label,
            duration: self.entered.elapsed(),
            rss_growth_mb: rss_mb() - self.rss_on_entry_mb,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        reports: Mutex<Vec<ScopeReport>>,
    }

    impl ScopeObserver for RecordingObserver {
        fn scope_closed(&self, report: ScopeReport) {
            self.reports.lock().unwrap().push(report);
        }
    }

    #[test]
    fn guard_reports_once_on_drop() {
        let observer = RecordingObserver::default();
        {
            let _guard = ScopeGuard::enter("tick", &observer);
        }
        let reports = observer.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].label, "tick");
    }

    #[test]
    fn rss_probe_never_panics() {
        let value = rss_mb();
        assert!(value >= 0.0);
        assert!(value.is_finite());
    }
}
