//! Payload timestamp formatting
//!
//! Wall-clock synchronization is the host OS's job; the agent only applies
//! the site's fixed UTC offset when stamping payloads.

use chrono::{FixedOffset, Utc};

/// Clock with the site's fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct DeviceClock {
    offset: FixedOffset,
}

impl DeviceClock {
    /// Build from a whole-hour UTC offset; out-of-range offsets clamp to UTC
    pub fn with_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| {
            FixedOffset::east_opt(0).expect("zero offset is always valid")
        });
        Self { offset }
    }

    /// Current local time as `YYYY-MM-DD HH:MM:SS`
    pub fn now_formatted(&self) -> String {
        Utc::now()
            .with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}
