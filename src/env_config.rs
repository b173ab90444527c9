/// Centralized environment-variable parsing helpers.
///
/// All tuning-knob env-var reads go through these helpers so the
/// truthy/numeric parsing logic lives in exactly one place.

/// Returns `true` when the environment variable is set to a truthy value
/// (`1`, `true`, `yes`, or `on`, case-insensitive, trimmed).
#[inline]
pub(crate) fn env_var_truthy(var_name: &str) -> bool {
    std::env::var(var_name)
        .map(|raw| {
            let normalized = raw.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
        })
        .unwrap_or(false)
}

/// Parses the environment variable as a `u64`, returning `Some` only when
/// the value is a valid positive (> 0) integer.
#[inline]
pub(crate) fn env_var_positive_u64(var_name: &str) -> Option<u64> {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

/// Worker-count override for the tile renderer. Unset or zero means the
/// automatic `max(4, cores - 2)` policy applies.
#[inline]
pub(crate) fn tile_worker_override() -> Option<usize> {
    env_var_positive_u64("DRIFT_CAPTURE_TILE_WORKERS").map(|v| v as usize)
}

/// Quick-lane capacity override for the frame pool.
#[inline]
pub(crate) fn quick_lane_capacity_override() -> Option<usize> {
    env_var_positive_u64("DRIFT_CAPTURE_QUICK_LANE").map(|v| v as usize)
}

/// Force the gradient fixture backend even where a platform backend
/// would be available. Used by smoke tests and demos.
#[inline]
pub(crate) fn force_fixture_backend() -> bool {
    env_var_truthy("DRIFT_CAPTURE_FIXTURE")
}
