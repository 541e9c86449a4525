//! # Prayer Time Calculator
//!
//! Wraps an [`AstronomicalCalculator`] and turns its raw instants into a
//! [`DailyPrayerTimes`]: instants are rounded to the minute, moved by the user's per-prayer
//! offsets and checked for chronological order.
//!
//! Ordering is never repaired. An adjustment that pushes one prayer at or past the next is a
//! configuration error and is reported as [`PrayerError::InvertedSchedule`].

use crate::error::{PrayerError, Result};
use crate::solar::{AstronomicalCalculator, CalculationRequest, SolarCalculator};
use crate::{
    CalculationMethod, DailyPrayerTimes, HighLatitudeRule, Madhab, PrayerAdjustments, PrayerName,
    PrayerTime, TimeSource, UserLocation,
};
use chrono::{DateTime, Duration, DurationRound, FixedOffset, NaiveDate};
use std::sync::Arc;
use tracing::debug;

/// Confidence attached to a locally computed set.
pub const LOCAL_CONFIDENCE: f32 = 0.9;

#[derive(Clone)]
pub struct PrayerTimeCalculator {
    engine: Arc<dyn AstronomicalCalculator>,
    madhab: Madhab,
    high_latitude_rule: HighLatitudeRule,
}

impl Default for PrayerTimeCalculator {
    fn default() -> Self {
        Self::new(
            Arc::new(SolarCalculator),
            Madhab::default(),
            HighLatitudeRule::default(),
        )
    }
}

impl PrayerTimeCalculator {
    pub fn new(
        engine: Arc<dyn AstronomicalCalculator>,
        madhab: Madhab,
        high_latitude_rule: HighLatitudeRule,
    ) -> Self {
        PrayerTimeCalculator {
            engine,
            madhab,
            high_latitude_rule,
        }
    }

    /// Compute the five prayers of `date` at `location`.
    ///
    /// Instants are expressed in `location.timestamp`'s offset, which is the device's local
    /// offset when the location came from [`crate::location::LocationProvider`].
    pub fn calculate(
        &self,
        location: &UserLocation,
        date: NaiveDate,
        method: CalculationMethod,
        adjustments: PrayerAdjustments,
    ) -> Result<DailyPrayerTimes> {
        let request = CalculationRequest {
            latitude: location.latitude,
            longitude: location.longitude,
            date,
            method,
            madhab: self.madhab,
            high_latitude_rule: self.high_latitude_rule,
        };
        let raw = self.engine.compute(&request)?;
        let offset = *location.timestamp.offset();

        let mut prayers = Vec::with_capacity(5);
        for (name, raw_instant) in PrayerName::ALL.into_iter().zip(raw.as_array()) {
            let rounded = raw_instant
                .duration_round(Duration::minutes(1))
                .map_err(|e| PrayerError::Calculation(e.to_string()))?;
            let instant = rounded.with_timezone(&offset)
                + Duration::minutes(adjustments.minutes_for(name) as i64);
            prayers.push(PrayerTime::new(name, instant));
        }
        ensure_chronological(&prayers)?;

        debug!(
            %date,
            %method,
            fajr = %prayers[0].time,
            isha = %prayers[4].time,
            "Calculated prayer times"
        );

        Ok(DailyPrayerTimes {
            date_key: date,
            location: location.clone(),
            calculation_method: method,
            adjustments,
            prayers,
            source: TimeSource::LocalCalculation,
            confidence: LOCAL_CONFIDENCE,
        })
    }

    /// First prayer strictly after `now`; `None` once Isha has passed.
    pub fn get_next_prayer<'a>(
        &self,
        times: &'a DailyPrayerTimes,
        now: DateTime<FixedOffset>,
    ) -> Option<&'a PrayerTime> {
        times.prayers.iter().find(|p| p.instant > now)
    }

    /// "Hh Mm" until the prayer, or "Now" once it has arrived.
    pub fn get_time_until(&self, prayer: &PrayerTime, now: DateTime<FixedOffset>) -> String {
        format_time_until(prayer.instant - now)
    }

    /// Mark one prayer as prayed (or not).
    pub fn mark_completed(&self, times: &mut DailyPrayerTimes, name: PrayerName, completed: bool) {
        if let Some(prayer) = times.prayers.iter_mut().find(|p| p.name == name) {
            prayer.completed = completed;
        }
    }
}

/// Every prayer must be strictly later than the one before it.
pub fn ensure_chronological(prayers: &[PrayerTime]) -> Result<()> {
    match prayers.windows(2).find(|w| w[0].instant >= w[1].instant) {
        Some(w) => Err(PrayerError::InvertedSchedule {
            earlier: w[0].name,
            later: w[1].name,
        }),
        None => Ok(()),
    }
}

pub fn format_time_until(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "Now".to_string();
    }
    // Round partial minutes up so "0h 0m" is never shown for a future prayer
    let minutes = (remaining.num_seconds() + 59) / 60;
    format!("{}h {}m", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cst() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    fn aurora() -> UserLocation {
        UserLocation::new(
            41.7606,
            -88.3201,
            cst().with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap(),
        )
    }

    fn jan_15() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn calculate(adjustments: PrayerAdjustments) -> Result<DailyPrayerTimes> {
        PrayerTimeCalculator::default().calculate(
            &aurora(),
            jan_15(),
            CalculationMethod::NorthAmerica,
            adjustments,
        )
    }

    #[test]
    fn test_calculate_is_ordered_and_local() {
        let times = calculate(PrayerAdjustments::default()).unwrap();

        assert_eq!(times.prayers.len(), 5);
        assert!(times.is_chronological());
        assert_eq!(times.source, TimeSource::LocalCalculation);
        assert_eq!(times.date_key, jan_15());
        for (prayer, name) in times.prayers.iter().zip(PrayerName::ALL) {
            assert_eq!(prayer.name, name);
            assert_eq!(prayer.instant.date_naive(), jan_15());
            assert_eq!(prayer.instant.offset(), &cst());
        }
    }

    #[test]
    fn test_calculate_is_deterministic() {
        let a = calculate(PrayerAdjustments::default()).unwrap();
        let b = calculate(PrayerAdjustments::default()).unwrap();
        let times_a: Vec<_> = a.prayers.iter().map(|p| p.time.clone()).collect();
        let times_b: Vec<_> = b.prayers.iter().map(|p| p.time.clone()).collect();
        assert_eq!(times_a, times_b);
    }

    #[test]
    fn test_fajr_adjustment_moves_exactly_ten_minutes() {
        let base = calculate(PrayerAdjustments::default()).unwrap();
        let adjusted = calculate(PrayerAdjustments {
            fajr: 10,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            adjusted.prayers[0].instant - base.prayers[0].instant,
            Duration::minutes(10)
        );
        assert_eq!(adjusted.prayers[1].instant, base.prayers[1].instant);
    }

    #[test]
    fn test_inverting_adjustment_is_rejected() {
        // Maghrib is roughly 2h20m after Asr in January
        let err = calculate(PrayerAdjustments {
            asr: 200,
            ..Default::default()
        })
        .unwrap_err();

        assert!(matches!(
            err,
            PrayerError::InvertedSchedule {
                earlier: PrayerName::Asr,
                later: PrayerName::Maghrib
            }
        ));
    }

    #[test]
    fn test_next_prayer_after_isha_is_none() {
        let calc = PrayerTimeCalculator::default();
        let times = calculate(PrayerAdjustments::default()).unwrap();

        let before_dawn = cst().with_ymd_and_hms(2025, 1, 15, 3, 0, 0).unwrap();
        assert_eq!(
            calc.get_next_prayer(&times, before_dawn).map(|p| p.name),
            Some(PrayerName::Fajr)
        );

        let at_asr = times.prayers[2].instant;
        assert_eq!(
            calc.get_next_prayer(&times, at_asr).map(|p| p.name),
            Some(PrayerName::Maghrib)
        );

        let late = times.prayers[4].instant + Duration::minutes(1);
        assert!(calc.get_next_prayer(&times, late).is_none());
    }

    #[test]
    fn test_time_until_formatting() {
        assert_eq!(format_time_until(Duration::minutes(135)), "2h 15m");
        assert_eq!(format_time_until(Duration::seconds(30)), "0h 1m");
        assert_eq!(format_time_until(Duration::zero()), "Now");
        assert_eq!(format_time_until(Duration::minutes(-5)), "Now");
    }

    #[test]
    fn test_mark_completed() {
        let calc = PrayerTimeCalculator::default();
        let mut times = calculate(PrayerAdjustments::default()).unwrap();
        calc.mark_completed(&mut times, PrayerName::Dhuhr, true);
        assert!(times.prayer(PrayerName::Dhuhr).unwrap().completed);
        assert!(!times.prayer(PrayerName::Fajr).unwrap().completed);
    }
}
