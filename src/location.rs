//! # Location Provider
//!
//! Acquires the device's coordinates and caches them for a day, so the prayer-time pipeline
//! normally runs without touching the GPS at all.
//!
//! ## Acquisition
//! 1. **Cache**: a stored fix younger than the TTL is returned with no device I/O
//! 2. **Permission**: without location permission the call fails with `PermissionDenied`
//! 3. **Fix**: one high-accuracy fix, bounded by a timeout (the only cancellation mechanism)
//! 4. **Geocode**: best-effort city/country lookup; failure just leaves them unset
//! 5. **Persist**: the new fix is stored with a fresh cache timestamp
//!
//! If the fix fails or times out, any cached location is returned even when expired; only
//! with nothing cached does the caller see `LocationUnavailable`.

use crate::clock::Clock;
use crate::error::{PermissionKind, PrayerError, Result};
use crate::store::{self, KeyValueStore, LOCATION_KEY};
use crate::UserLocation;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A raw position reported by the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

/// Reverse-geocoded place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Place {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Device location and permission API.
#[async_trait]
pub trait LocationDevice: Send + Sync {
    async fn request_permission(&self) -> bool;
    async fn has_permission(&self) -> bool;
    /// One high-accuracy fix.
    async fn current_fix(&self) -> Result<Fix>;
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Place>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CachedLocation {
    location: UserLocation,
    cached_at: DateTime<FixedOffset>,
}

pub struct LocationProvider {
    device: Arc<dyn LocationDevice>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    fix_timeout: std::time::Duration,
}

impl LocationProvider {
    pub fn new(
        device: Arc<dyn LocationDevice>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        LocationProvider {
            device,
            store,
            clock,
            ttl: Duration::hours(24),
            fix_timeout: std::time::Duration::from_secs(15),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fix_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.fix_timeout = timeout;
        self
    }

    pub async fn request_permission(&self) -> bool {
        self.device.request_permission().await
    }

    pub async fn has_permission(&self) -> bool {
        self.device.has_permission().await
    }

    pub async fn get_current_location(&self, use_cache: bool) -> Result<UserLocation> {
        let cached = self.load_cached()?;

        if use_cache {
            if let Some(entry) = &cached {
                let age = self.clock.now() - entry.cached_at;
                if age < self.ttl {
                    debug!(age_mins = age.num_minutes(), "Using cached location");
                    return Ok(entry.location.clone());
                }
            }
        }

        if !self.device.has_permission().await {
            warn!("Location permission not granted");
            return Err(PrayerError::PermissionDenied(PermissionKind::Location));
        }

        let fix = match tokio::time::timeout(self.fix_timeout, self.device.current_fix()).await {
            Ok(Ok(fix)) => fix,
            Ok(Err(err)) => return self.stale_or_unavailable(cached, &err.to_string()),
            Err(_) => return self.stale_or_unavailable(cached, "fix timed out"),
        };

        let now = self.clock.now();
        let mut location = UserLocation::new(fix.latitude, fix.longitude, now);
        location.accuracy = fix.accuracy;

        match self.device.reverse_geocode(fix.latitude, fix.longitude).await {
            Ok(place) => {
                location.city = place.city;
                location.country = place.country;
            }
            Err(err) => debug!(error = %err, "Reverse geocoding failed"),
        }

        let entry = CachedLocation {
            location: location.clone(),
            cached_at: now,
        };
        store::save_json(&*self.store, LOCATION_KEY, &entry)?;
        info!(location = %location.display_name(), "Acquired location");

        Ok(location)
    }

    /// Stored location regardless of age.
    pub fn cached_location(&self) -> Result<Option<UserLocation>> {
        Ok(self.load_cached()?.map(|entry| entry.location))
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.store.remove(LOCATION_KEY)
    }

    fn load_cached(&self) -> Result<Option<CachedLocation>> {
        store::load_json(&*self.store, LOCATION_KEY)
    }

    fn stale_or_unavailable(&self, cached: Option<CachedLocation>, reason: &str) -> Result<UserLocation> {
        match cached {
            Some(entry) => {
                warn!(reason, cached_at = %entry.cached_at, "Location fix failed, using cached location");
                Ok(entry.location)
            }
            None => {
                warn!(reason, "Location fix failed and nothing cached");
                Err(PrayerError::LocationUnavailable)
            }
        }
    }
}

/// A device that always reports the same position; for the CLI and for hosts without GPS.
#[derive(Clone, Debug)]
pub struct FixedLocationDevice {
    fix: Fix,
    place: Place,
}

impl FixedLocationDevice {
    pub fn new(latitude: f64, longitude: f64, name: impl Into<String>) -> Self {
        let name = name.into();
        FixedLocationDevice {
            fix: Fix {
                latitude,
                longitude,
                accuracy: None,
            },
            place: Place {
                city: (!name.is_empty()).then_some(name),
                country: None,
            },
        }
    }
}

#[async_trait]
impl LocationDevice for FixedLocationDevice {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn has_permission(&self) -> bool {
        true
    }

    async fn current_fix(&self) -> Result<Fix> {
        Ok(self.fix)
    }

    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<Place> {
        Ok(self.place.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDevice {
        denied: AtomicBool,
        failing: AtomicBool,
        hanging: AtomicBool,
        geocode_fails: AtomicBool,
        fixes: AtomicUsize,
    }

    #[async_trait]
    impl LocationDevice for FakeDevice {
        async fn request_permission(&self) -> bool {
            self.denied.store(false, Ordering::SeqCst);
            true
        }

        async fn has_permission(&self) -> bool {
            !self.denied.load(Ordering::SeqCst)
        }

        async fn current_fix(&self) -> Result<Fix> {
            self.fixes.fetch_add(1, Ordering::SeqCst);
            if self.hanging.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(PrayerError::LocationUnavailable);
            }
            Ok(Fix {
                latitude: 41.7606,
                longitude: -88.3201,
                accuracy: Some(12.0),
            })
        }

        async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<Place> {
            if self.geocode_fails.load(Ordering::SeqCst) {
                return Err(PrayerError::Remote("geocoder offline".into()));
            }
            Ok(Place {
                city: Some("Aurora".into()),
                country: Some("United States".into()),
            })
        }
    }

    fn setup() -> (LocationProvider, Arc<FakeDevice>, Arc<FixedClock>) {
        let cst = FixedOffset::west_opt(6 * 3600).unwrap();
        let clock = Arc::new(FixedClock::new(
            cst.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap(),
        ));
        let device = Arc::new(FakeDevice::default());
        let provider = LocationProvider::new(device.clone(), Arc::new(MemoryStore::new()), clock.clone())
            .with_fix_timeout(std::time::Duration::from_millis(50));
        (provider, device, clock)
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_uses_cache() {
        let (provider, device, clock) = setup();

        let first = provider.get_current_location(true).await.unwrap();
        clock.advance(Duration::hours(23));
        let second = provider.get_current_location(true).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(device.fixes.load(Ordering::SeqCst), 1);
        assert_eq!(first.city.as_deref(), Some("Aurora"));
        assert_eq!(first.accuracy, Some(12.0));
    }

    #[tokio::test]
    async fn test_expired_cache_takes_new_fix() {
        let (provider, device, clock) = setup();
        provider.get_current_location(true).await.unwrap();
        clock.advance(Duration::hours(25));
        provider.get_current_location(true).await.unwrap();
        assert_eq!(device.fixes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bypassing_cache_takes_new_fix() {
        let (provider, device, _) = setup();
        provider.get_current_location(true).await.unwrap();
        provider.get_current_location(false).await.unwrap();
        assert_eq!(device.fixes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let (provider, device, _) = setup();
        device.denied.store(true, Ordering::SeqCst);

        let err = provider.get_current_location(true).await.unwrap_err();
        assert!(matches!(err, PrayerError::PermissionDenied(PermissionKind::Location)));
        assert_eq!(device.fixes.load(Ordering::SeqCst), 0);

        assert!(provider.request_permission().await);
        assert!(provider.get_current_location(true).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_fix_falls_back_to_expired_cache() {
        let (provider, device, clock) = setup();
        let original = provider.get_current_location(true).await.unwrap();

        clock.advance(Duration::hours(48));
        device.failing.store(true, Ordering::SeqCst);
        let fallback = provider.get_current_location(true).await.unwrap();
        assert_eq!(fallback, original);
    }

    #[tokio::test]
    async fn test_timeout_without_cache_is_unavailable() {
        let (provider, device, _) = setup();
        device.hanging.store(true, Ordering::SeqCst);

        let err = provider.get_current_location(true).await.unwrap_err();
        assert!(matches!(err, PrayerError::LocationUnavailable));
    }

    #[tokio::test]
    async fn test_geocode_failure_is_not_fatal() {
        let (provider, device, _) = setup();
        device.geocode_fails.store(true, Ordering::SeqCst);

        let location = provider.get_current_location(true).await.unwrap();
        assert!(location.city.is_none());
        assert!(location.country.is_none());
        assert_eq!(location.latitude, 41.7606);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_new_fix() {
        let (provider, device, _) = setup();
        provider.get_current_location(true).await.unwrap();
        provider.clear_cache().unwrap();
        assert!(provider.cached_location().unwrap().is_none());

        provider.get_current_location(true).await.unwrap();
        assert_eq!(device.fixes.load(Ordering::SeqCst), 2);
    }
}
