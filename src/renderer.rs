//! # Terminal Rendering
//!
//! Development view of a day's prayer times, the same role ASCII output plays next to a real
//! display. Each row shows one prayer; the next prayer is marked with `▶` and a countdown,
//! passed prayers with `✓` when completed or `·` otherwise. A footer line names the tier of
//! the fallback chain the times came from, with a warning when it is the fixed default.

use crate::calculator::format_time_until;
use crate::{DailyPrayerTimes, TimeSource};
use chrono::{DateTime, FixedOffset};

pub fn render_ascii(times: &DailyPrayerTimes, now: DateTime<FixedOffset>) -> String {
    let mut out = String::new();
    let next = times.prayers.iter().find(|p| p.instant > now).map(|p| p.name);

    out.push_str(&format!(
        "{}  {}\n",
        times.date_key.format("%A %-d %B %Y"),
        times.location.display_name()
    ));
    out.push_str(&format!("Method: {}\n", times.calculation_method));
    out.push_str(&"─".repeat(36));
    out.push('\n');

    for prayer in &times.prayers {
        let marker = if Some(prayer.name) == next {
            '▶'
        } else if prayer.instant <= now && prayer.completed {
            '✓'
        } else if prayer.instant <= now {
            '·'
        } else {
            ' '
        };

        let countdown = if Some(prayer.name) == next {
            format!("in {}", format_time_until(prayer.instant - now))
        } else {
            String::new()
        };

        out.push_str(&format!(
            "{marker} {:<8} {:>7}  {}  {}\n",
            prayer.name.as_str(),
            prayer.arabic_name,
            prayer.time,
            countdown
        ));
    }

    out.push_str(&"─".repeat(36));
    out.push('\n');
    if times.source == TimeSource::Default {
        out.push_str("⚠ ESTIMATE (default schedule)\n");
    } else {
        out.push_str(&format!("Source: {}\n", times.source));
    }
    out
}

/// Print the table to stdout.
pub fn draw_ascii(times: &DailyPrayerTimes, now: DateTime<FixedOffset>) {
    print!("{}", render_ascii(times, now));
}
