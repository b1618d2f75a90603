//! Gate clock and 12-hour time rendering.

use chrono::{Local, NaiveTime, SubsecRound, Timelike};

use crate::db::models::visitors::GateStamp;

/// Render a time as `h:mm AM|PM`, with midnight and noon shown as 12.
pub fn format_12h(time: NaiveTime) -> String {
    let hour = time.hour();
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let hour12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{hour12}:{:02} {suffix}", time.minute())
}

impl GateStamp {
    /// The service's local wall clock, truncated to whole seconds.
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        Self {
            date: now.date(),
            time: now.time().trunc_subsecs(0),
        }
    }
}
