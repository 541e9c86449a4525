//! # Prayer Time Cache
//!
//! A single-slot, day-scoped cache in front of the calculator. Only "today" is ever relevant,
//! so there is no eviction policy: the slot is overwritten by every `put` (last writer wins)
//! and emptied by `invalidate`.
//!
//! ## Validity
//! A stored set answers a request only when all of these hold:
//! - its `date_key` equals the requested day (a set from yesterday is a miss at 00:01)
//! - it was computed with the same calculation method
//! - it was computed with the same per-prayer adjustments
//! - its instants were rendered in the requesting location's UTC offset (a DST switch or a
//!   timezone change mid-day is a miss, since the "HH:MM" strings would be stale)
//! - if a drift threshold is configured, the requested location is within that distance of
//!   the location the set was computed for
//!
//! Entries that fail to deserialize are discarded rather than repaired.

use crate::error::Result;
use crate::store::{self, KeyValueStore, PRAYER_TIMES_KEY};
use crate::{CalculationMethod, DailyPrayerTimes, PrayerAdjustments, TimeSource, UserLocation};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Why a lookup did not hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MissReason {
    Empty,
    DateChanged,
    MethodChanged,
    AdjustmentsChanged,
    /// The device's UTC offset differs from the one the times were rendered in
    OffsetChanged,
    /// Distance in kilometers from the cached location
    LocationDrift(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CacheLookup {
    Hit(DailyPrayerTimes),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn hit(self) -> Option<DailyPrayerTimes> {
        match self {
            CacheLookup::Hit(times) => Some(times),
            CacheLookup::Miss(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct PrayerTimeCache {
    store: Arc<dyn KeyValueStore>,
    drift_threshold_km: Option<f64>,
}

impl PrayerTimeCache {
    pub fn new(store: Arc<dyn KeyValueStore>, drift_threshold_km: Option<f64>) -> Self {
        PrayerTimeCache {
            store,
            drift_threshold_km,
        }
    }

    pub fn get(
        &self,
        date_key: NaiveDate,
        location: &UserLocation,
        method: CalculationMethod,
        adjustments: PrayerAdjustments,
    ) -> Result<CacheLookup> {
        let Some(mut cached) = store::load_json::<DailyPrayerTimes>(&*self.store, PRAYER_TIMES_KEY)?
        else {
            return Ok(CacheLookup::Miss(MissReason::Empty));
        };

        let rendered_in = cached.prayers.first().map(|p| *p.instant.offset());

        let miss = if cached.date_key != date_key {
            Some(MissReason::DateChanged)
        } else if cached.calculation_method != method {
            Some(MissReason::MethodChanged)
        } else if cached.adjustments != adjustments {
            Some(MissReason::AdjustmentsChanged)
        } else if rendered_in.is_some_and(|offset| offset != *location.timestamp.offset()) {
            Some(MissReason::OffsetChanged)
        } else {
            self.drift_threshold_km.and_then(|threshold| {
                let moved = cached.location.distance_km(location);
                (moved > threshold).then_some(MissReason::LocationDrift(moved))
            })
        };

        if let Some(reason) = miss {
            debug!(?reason, cached = %cached.date_key, "Prayer time cache miss");
            return Ok(CacheLookup::Miss(reason));
        }

        cached.source = TimeSource::Cache;
        Ok(CacheLookup::Hit(cached))
    }

    /// Overwrite the slot.
    pub fn put(&self, times: &DailyPrayerTimes) -> Result<()> {
        store::save_json(&*self.store, PRAYER_TIMES_KEY, times)
    }

    pub fn invalidate(&self) -> Result<()> {
        debug!("Prayer time cache invalidated");
        self.store.remove(PRAYER_TIMES_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::PrayerTimeCalculator;
    use crate::store::MemoryStore;
    use chrono::{FixedOffset, TimeZone};

    fn location(lat: f64, lng: f64) -> UserLocation {
        let cst = FixedOffset::west_opt(6 * 3600).unwrap();
        UserLocation::new(lat, lng, cst.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn setup(drift: Option<f64>) -> (PrayerTimeCache, DailyPrayerTimes) {
        let cache = PrayerTimeCache::new(Arc::new(MemoryStore::new()), drift);
        let times = PrayerTimeCalculator::default()
            .calculate(
                &location(41.7606, -88.3201),
                day(15),
                CalculationMethod::NorthAmerica,
                PrayerAdjustments::default(),
            )
            .unwrap();
        cache.put(&times).unwrap();
        (cache, times)
    }

    #[test]
    fn test_hit_reports_cache_source() {
        let (cache, times) = setup(Some(5.0));
        let hit = cache
            .get(
                day(15),
                &location(41.7606, -88.3201),
                CalculationMethod::NorthAmerica,
                PrayerAdjustments::default(),
            )
            .unwrap()
            .hit()
            .unwrap();
        assert_eq!(hit.source, TimeSource::Cache);
        assert_eq!(hit.prayers, times.prayers);
    }

    #[test]
    fn test_next_day_is_a_miss() {
        let (cache, _) = setup(None);
        let lookup = cache
            .get(
                day(16),
                &location(41.7606, -88.3201),
                CalculationMethod::NorthAmerica,
                PrayerAdjustments::default(),
            )
            .unwrap();
        assert_eq!(lookup, CacheLookup::Miss(MissReason::DateChanged));
    }

    #[test]
    fn test_settings_change_is_a_miss() {
        let (cache, _) = setup(None);
        let here = location(41.7606, -88.3201);

        let lookup = cache
            .get(day(15), &here, CalculationMethod::MuslimWorldLeague, PrayerAdjustments::default())
            .unwrap();
        assert_eq!(lookup, CacheLookup::Miss(MissReason::MethodChanged));

        let adjusted = PrayerAdjustments {
            isha: 5,
            ..Default::default()
        };
        let lookup = cache
            .get(day(15), &here, CalculationMethod::NorthAmerica, adjusted)
            .unwrap();
        assert_eq!(lookup, CacheLookup::Miss(MissReason::AdjustmentsChanged));
    }

    #[test]
    fn test_offset_change_is_a_miss() {
        let (cache, _) = setup(None);
        let cdt = FixedOffset::west_opt(5 * 3600).unwrap();
        let after_dst =
            UserLocation::new(41.7606, -88.3201, cdt.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap());

        let lookup = cache
            .get(day(15), &after_dst, CalculationMethod::NorthAmerica, PrayerAdjustments::default())
            .unwrap();
        assert_eq!(lookup, CacheLookup::Miss(MissReason::OffsetChanged));
    }

    #[test]
    fn test_drift_threshold_is_optional() {
        // Chicago Loop is ~58 km from Aurora
        let chicago = location(41.8781, -87.6298);

        let (with_drift, _) = setup(Some(5.0));
        let lookup = with_drift
            .get(day(15), &chicago, CalculationMethod::NorthAmerica, PrayerAdjustments::default())
            .unwrap();
        assert!(matches!(lookup, CacheLookup::Miss(MissReason::LocationDrift(km)) if km > 50.0));

        let (without_drift, _) = setup(None);
        let lookup = without_drift
            .get(day(15), &chicago, CalculationMethod::NorthAmerica, PrayerAdjustments::default())
            .unwrap();
        assert!(matches!(lookup, CacheLookup::Hit(_)));
    }

    #[test]
    fn test_small_move_within_threshold_hits() {
        let (cache, _) = setup(Some(5.0));
        // ~1 km north
        let nearby = location(41.7696, -88.3201);
        let lookup = cache
            .get(day(15), &nearby, CalculationMethod::NorthAmerica, PrayerAdjustments::default())
            .unwrap();
        assert!(matches!(lookup, CacheLookup::Hit(_)));
    }

    #[test]
    fn test_invalidate_and_corruption() {
        let (cache, _) = setup(None);
        cache.invalidate().unwrap();
        let lookup = cache
            .get(
                day(15),
                &location(41.7606, -88.3201),
                CalculationMethod::NorthAmerica,
                PrayerAdjustments::default(),
            )
            .unwrap();
        assert_eq!(lookup, CacheLookup::Miss(MissReason::Empty));

        let store = Arc::new(MemoryStore::new());
        store.put(PRAYER_TIMES_KEY, "[1,2,3]").unwrap();
        let cache = PrayerTimeCache::new(store.clone(), None);
        let lookup = cache
            .get(
                day(15),
                &location(41.7606, -88.3201),
                CalculationMethod::NorthAmerica,
                PrayerAdjustments::default(),
            )
            .unwrap();
        assert_eq!(lookup, CacheLookup::Miss(MissReason::Empty));
        assert_eq!(store.get(PRAYER_TIMES_KEY).unwrap(), None);
    }

    #[test]
    fn test_put_is_last_writer_wins() {
        let (cache, mut times) = setup(None);
        times.confidence = 0.5;
        cache.put(&times).unwrap();
        let hit = cache
            .get(
                day(15),
                &location(41.7606, -88.3201),
                CalculationMethod::NorthAmerica,
                PrayerAdjustments::default(),
            )
            .unwrap()
            .hit()
            .unwrap();
        assert_eq!(hit.confidence, 0.5);
    }
}
