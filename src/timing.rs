use std::time::{Duration, Instant};

/// High-precision sleep that spin-waits the final sub-millisecond to
/// sidestep coarse OS timer resolution.
pub(crate) fn spin_sleep(duration: Duration) {
    const SPIN_THRESHOLD: Duration = Duration::from_micros(1500);

    if duration > SPIN_THRESHOLD {
        std::thread::sleep(duration - SPIN_THRESHOLD);
    }

    let target = Instant::now() + duration;
    while Instant::now() < target {
        std::hint::spin_loop();
    }
}

/// Sleep until an absolute deadline; returns immediately when the
/// deadline has already passed.
pub(crate) fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        spin_sleep(deadline - now);
    }
}
