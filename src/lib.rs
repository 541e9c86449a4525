//! # Prayer Tracker Core Library
//!
//! This library provides the data structures and engine behind the prayer tracker: computing
//! the five daily prayer instants for the device's location, caching them for the current
//! calendar day, and keeping exactly one local notification alive per upcoming prayer.
//!
//! ## Data Flow
//! 1. **Location**: [`location::LocationProvider`] returns a cached fix (24h TTL) or asks the device
//! 2. **Cache**: [`cache::PrayerTimeCache`] answers for today if date, method and adjustments match
//! 3. **Resolve**: on a miss the [`strategy`] chain tries the remote service, then the local
//!    astronomical calculation, then a fixed default schedule
//! 4. **Notify**: [`notifications::NotificationScheduler`] cancels the previous batch and
//!    schedules one notification per prayer still in the future
//!
//! ## Core Types
//! - [`UserLocation`]: coordinates plus optional place name
//! - [`PrayerTime`]: one named prayer at an absolute instant
//! - [`DailyPrayerTimes`]: the ordered set of five prayers for one calendar day
//! - [`PrayerAdjustments`]: per-prayer minute offsets
//! - [`NotificationBatch`]: the persisted IDs that must be cancelled before rescheduling

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cache;
pub mod calculator;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod location;
pub mod method;
pub mod notifications;
pub mod remote;
pub mod renderer;
pub mod service;
pub mod solar;
pub mod store;
pub mod strategy;

pub use error::PrayerError;
pub use method::{CalculationMethod, HighLatitudeRule, Madhab};

/// A device position, optionally annotated with a reverse-geocoded place name.
///
/// # Example
/// ```
/// use chrono::{FixedOffset, TimeZone};
/// use prayer_clock_lib::UserLocation;
///
/// let at = FixedOffset::west_opt(6 * 3600)
///     .unwrap()
///     .with_ymd_and_hms(2025, 1, 15, 8, 0, 0)
///     .unwrap();
/// let aurora = UserLocation::new(41.7606, -88.3201, at);
/// assert!(aurora.city.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
    /// Horizontal accuracy in meters, when the device reports one
    pub accuracy: Option<f64>,
    /// When the fix was taken
    pub timestamp: DateTime<FixedOffset>,
}

impl UserLocation {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<FixedOffset>) -> Self {
        UserLocation {
            latitude,
            longitude,
            city: None,
            country: None,
            accuracy: None,
            timestamp,
        }
    }

    /// "City, Country" when geocoding succeeded, otherwise the raw coordinates.
    pub fn display_name(&self) -> String {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{city}, {country}"),
            (Some(city), None) => city.clone(),
            _ => format!("{:.4}, {:.4}", self.latitude, self.longitude),
        }
    }

    /// Great-circle distance to another location in kilometers (haversine).
    pub fn distance_km(&self, other: &UserLocation) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// The five daily prayers in chronological order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrayerName {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    pub const ALL: [PrayerName; 5] = [
        PrayerName::Fajr,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn arabic_name(self) -> &'static str {
        match self {
            PrayerName::Fajr => "الفجر",
            PrayerName::Dhuhr => "الظهر",
            PrayerName::Asr => "العصر",
            PrayerName::Maghrib => "المغرب",
            PrayerName::Isha => "العشاء",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prayer at an absolute instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrayerTime {
    pub name: PrayerName,
    pub arabic_name: String,
    /// Wall-clock time "HH:MM" in the instant's offset
    pub time: String,
    pub instant: DateTime<FixedOffset>,
    pub completed: bool,
}

impl PrayerTime {
    pub fn new(name: PrayerName, instant: DateTime<FixedOffset>) -> Self {
        PrayerTime {
            name,
            arabic_name: name.arabic_name().to_string(),
            time: instant.format("%H:%M").to_string(),
            instant,
            completed: false,
        }
    }
}

/// Per-prayer offsets in whole minutes, applied after the astronomical calculation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrayerAdjustments {
    pub fajr: i32,
    pub dhuhr: i32,
    pub asr: i32,
    pub maghrib: i32,
    pub isha: i32,
}

impl PrayerAdjustments {
    pub fn minutes_for(&self, name: PrayerName) -> i32 {
        match name {
            PrayerName::Fajr => self.fajr,
            PrayerName::Dhuhr => self.dhuhr,
            PrayerName::Asr => self.asr,
            PrayerName::Maghrib => self.maghrib,
            PrayerName::Isha => self.isha,
        }
    }
}

/// Which tier of the fallback chain produced a [`DailyPrayerTimes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeSource {
    Cache,
    RemoteService,
    LocalCalculation,
    Default,
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeSource::Cache => "cache",
            TimeSource::RemoteService => "remote service",
            TimeSource::LocalCalculation => "local calculation",
            TimeSource::Default => "default",
        })
    }
}

/// The five prayers of one calendar day, Fajr through Isha.
///
/// `prayers` is strictly increasing in `instant`. The set is only meaningful while `date_key`
/// equals the caller's current calendar day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyPrayerTimes {
    pub date_key: NaiveDate,
    pub location: UserLocation,
    pub calculation_method: CalculationMethod,
    pub adjustments: PrayerAdjustments,
    pub prayers: Vec<PrayerTime>,
    pub source: TimeSource,
    /// 0.0 (guess) to 1.0 (authoritative)
    pub confidence: f32,
}

impl DailyPrayerTimes {
    pub fn prayer(&self, name: PrayerName) -> Option<&PrayerTime> {
        self.prayers.iter().find(|p| p.name == name)
    }

    /// True when every prayer is strictly later than the one before it.
    pub fn is_chronological(&self) -> bool {
        self.prayers.windows(2).all(|w| w[0].instant < w[1].instant)
    }

    /// Prayers whose instant is strictly after `now`.
    pub fn upcoming(&self, now: DateTime<FixedOffset>) -> impl Iterator<Item = &PrayerTime> {
        self.prayers.iter().filter(move |p| p.instant > now)
    }
}

/// Opaque identifier handed back by the device notification API.
pub type NotificationId = String;

/// The notifications currently scheduled for one day; the single source of truth for what
/// `cancel_all` must remove.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationBatch {
    pub date_key: Option<NaiveDate>,
    /// One ID per future prayer
    pub ids: Vec<NotificationId>,
    /// Pre-prayer reminders, cancelled together with `ids`
    #[serde(default)]
    pub reminder_ids: Vec<NotificationId>,
}

impl NotificationBatch {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.reminder_ids.is_empty()
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &NotificationId> {
        self.ids.iter().chain(self.reminder_ids.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 15, h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_prayer_time_formats_wall_clock() {
        let p = PrayerTime::new(PrayerName::Asr, at(14, 5));
        assert_eq!(p.time, "14:05");
        assert_eq!(p.arabic_name, "العصر");
        assert!(!p.completed);
    }

    #[test]
    fn test_distance_between_known_points() {
        let chicago = UserLocation::new(41.8781, -87.6298, at(0, 0));
        let aurora = UserLocation::new(41.7606, -88.3201, at(0, 0));
        let d = chicago.distance_km(&aurora);
        assert!((55.0..=62.0).contains(&d), "distance {d}");
        assert_eq!(aurora.distance_km(&aurora), 0.0);
    }

    #[test]
    fn test_display_name_falls_back_to_coordinates() {
        let mut loc = UserLocation::new(41.7606, -88.3201, at(0, 0));
        assert_eq!(loc.display_name(), "41.7606, -88.3201");
        loc.city = Some("Aurora".into());
        loc.country = Some("United States".into());
        assert_eq!(loc.display_name(), "Aurora, United States");
    }

    #[test]
    fn test_adjustments_lookup() {
        let adj = PrayerAdjustments {
            fajr: 10,
            isha: -5,
            ..Default::default()
        };
        assert_eq!(adj.minutes_for(PrayerName::Fajr), 10);
        assert_eq!(adj.minutes_for(PrayerName::Dhuhr), 0);
        assert_eq!(adj.minutes_for(PrayerName::Isha), -5);
    }

    #[test]
    fn test_time_source_serializes_camel_case() {
        let json = serde_json::to_string(&TimeSource::LocalCalculation).unwrap();
        assert_eq!(json, "\"localCalculation\"");
    }
}
