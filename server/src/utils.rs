//! Wall-clock helpers. Deadlines shown to clients are milliseconds since the
//! UNIX epoch so that any client clock can render a countdown from them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current time in milliseconds since the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

pub fn deadline_ms(now_ms: u64, delay: Duration) -> u64 {
    now_ms.saturating_add(delay.as_millis() as u64)
}

/// Time left until `deadline_ms`; zero once it has passed.
pub fn remaining(deadline_ms: u64, now_ms: u64) -> Duration {
    Duration::from_millis(deadline_ms.saturating_sub(now_ms))
}
