//! # Fixed Default Schedule
//!
//! Last tier of the fallback chain. When neither the remote service nor the astronomical
//! calculation can produce a day (polar night, a configuration that inverts the order, a
//! broken calculator), the engine still hands the UI five plausible times so it never has to
//! show an empty screen. The result is tagged [`TimeSource::Default`] with a low confidence so
//! the UI can flag it.
//!
//! The schedule comes from configuration; if that schedule is itself malformed, a built-in
//! one is used instead. This function cannot fail.

use crate::calculator::ensure_chronological;
use crate::{
    CalculationMethod, DailyPrayerTimes, PrayerAdjustments, PrayerName, PrayerTime, TimeSource,
    UserLocation,
};
use chrono::{NaiveDate, NaiveTime, TimeZone};
use tracing::warn;

pub const DEFAULT_CONFIDENCE: f32 = 0.1;

/// Built-in wall-clock schedule, Fajr through Isha.
pub const BUILT_IN_SCHEDULE: [(u32, u32); 5] = [(5, 0), (12, 30), (15, 30), (18, 0), (19, 30)];

/// Build a day from a fixed wall-clock schedule in the location's offset.
pub fn approximate(
    location: &UserLocation,
    date: NaiveDate,
    method: CalculationMethod,
    schedule: &[String],
) -> DailyPrayerTimes {
    let prayers = from_schedule(location, date, schedule).unwrap_or_else(|| {
        warn!(?schedule, "Configured default schedule unusable, using built-in times");
        let built_in: Vec<String> = BUILT_IN_SCHEDULE
            .iter()
            .map(|(h, m)| format!("{h:02}:{m:02}"))
            .collect();
        from_schedule(location, date, &built_in).unwrap_or_default()
    });

    DailyPrayerTimes {
        date_key: date,
        location: location.clone(),
        calculation_method: method,
        adjustments: PrayerAdjustments::default(),
        prayers,
        source: TimeSource::Default,
        confidence: DEFAULT_CONFIDENCE,
    }
}

fn from_schedule(location: &UserLocation, date: NaiveDate, schedule: &[String]) -> Option<Vec<PrayerTime>> {
    if schedule.len() != PrayerName::ALL.len() {
        return None;
    }
    let offset = *location.timestamp.offset();

    let mut prayers = Vec::with_capacity(5);
    for (name, raw) in PrayerName::ALL.into_iter().zip(schedule) {
        let wall = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()?;
        let instant = offset.from_local_datetime(&date.and_time(wall)).single()?;
        prayers.push(PrayerTime::new(name, instant));
    }
    ensure_chronological(&prayers).ok()?;
    Some(prayers)
}
