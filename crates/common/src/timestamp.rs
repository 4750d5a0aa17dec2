//! RFC 3339 timestamps for log lines

use std::time::{Duration, SystemTime};

const SECONDS_PER_DAY: u64 = 86_400;

/// Format a wall-clock time as `YYYY-MM-DDTHH:MM:SS.mmmZ` (UTC)
///
/// Times before the Unix epoch are clamped to the epoch.
pub fn format_rfc3339(time: SystemTime) -> String {
    let since_epoch = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);

    let secs = since_epoch.as_secs();
    let millis = since_epoch.subsec_millis();

    let (year, month, day) = civil_from_days(secs / SECONDS_PER_DAY);
    let seconds_of_day = secs % SECONDS_PER_DAY;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        seconds_of_day / 3600,
        (seconds_of_day % 3600) / 60,
        seconds_of_day % 60,
        millis
    )
}

/// Days since 1970-01-01 to a (year, month, day) date
///
/// Shifts the year to start in March so the leap day falls at the end,
/// then splits into 400-year eras.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let day_of_era = z % 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = year_of_era + era * 400 + u64::from(month <= 2);

    (year, month, day)
}
