//! Display formatting helpers for digital readouts and timezone labels.
//!
//! These are pure functions over a [`TimeSample`]; the engine itself never
//! formats anything. Consumers such as the demo binary's digital display and
//! the operator shell use them on `secondBoundary` / `minuteBoundary`
//! messages.

use chrono::{Local, Offset, Utc};
use chrono_tz::Tz;

use crate::time::{TimeSample, LOCAL_TIMEZONE};

/// Options for [`format_digital`].
#[derive(Debug, Clone, Copy)]
pub struct DigitalFormat {
    pub twelve_hour: bool,
    pub show_seconds: bool,
    pub pad_zeros: bool,
}

impl Default for DigitalFormat {
    fn default() -> Self {
        Self {
            twelve_hour: true,
            show_seconds: true,
            pad_zeros: true,
        }
    }
}

/// Renders a sample as a digital readout, e.g. `03:07:09 PM` or `15:7:9`.
pub fn format_digital(sample: &TimeSample, format: &DigitalFormat) -> String {
    let mut hours = sample.hours;
    let mut period = "";
    if format.twelve_hour {
        period = if hours >= 12 { " PM" } else { " AM" };
        hours %= 12;
        if hours == 0 {
            hours = 12;
        }
    }
    let pad = |value: u32| {
        if format.pad_zeros {
            format!("{value:02}")
        } else {
            value.to_string()
        }
    };
    let mut out = format!("{}:{}", pad(hours), pad(sample.minutes));
    if format.show_seconds {
        out.push(':');
        out.push_str(&pad(sample.seconds));
    }
    out.push_str(period);
    out
}

/// A short human label for a zone id: `"Asia/Karachi"` becomes `"Karachi"`,
/// `"local"` becomes `"Local Time"`.
pub fn timezone_display_name(timezone_id: &str) -> String {
    if timezone_id == LOCAL_TIMEZONE {
        return "Local Time".to_string();
    }
    timezone_id
        .rsplit('/')
        .next()
        .unwrap_or(timezone_id)
        .replace('_', " ")
}

/// The zone's current UTC offset as `+HH:MM` / `-HH:MM`. An unknown zone id
/// reports the host-local offset, consistent with the clock source fallback.
pub fn utc_offset_string(timezone_id: &str) -> String {
    let offset_seconds = if timezone_id == LOCAL_TIMEZONE {
        Local::now().offset().fix().local_minus_utc()
    } else {
        match timezone_id.parse::<Tz>() {
            Ok(tz) => Utc::now().with_timezone(&tz).offset().fix().local_minus_utc(),
            Err(_) => Local::now().offset().fix().local_minus_utc(),
        }
    };
    let sign = if offset_seconds >= 0 { '+' } else { '-' };
    let magnitude = offset_seconds.abs();
    format!("{}{:02}:{:02}", sign, magnitude / 3600, (magnitude % 3600) / 60)
}
