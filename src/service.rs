//! # Prayer Time Service
//!
//! Composes the location provider, the single-slot cache and the strategy chain into the one
//! call a UI needs: "what are today's prayer times?". It always produces an answer; the
//! [`TimeSource`] on the result says which tier of the chain produced it.
//!
//! The user's calculation method and per-prayer adjustments are persisted in the store.
//! Changing either invalidates the cached day. The configured madhab and high-latitude rule
//! are recorded too, so a config edit between runs also drops the cached day.

use crate::cache::{CacheLookup, PrayerTimeCache};
use crate::calculator::PrayerTimeCalculator;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::location::{LocationDevice, LocationProvider};
use crate::remote::RemoteTimingService;
use crate::solar::SolarCalculator;
use crate::store::{self, KeyValueStore, ADJUSTMENTS_KEY, CALCULATION_METHOD_KEY, CONVENTIONS_KEY};
use crate::strategy::{
    DefaultStrategy, LocalStrategy, RemoteStrategy, Resolution, StrategyChain, TimingRequest,
};
use crate::{
    CalculationMethod, HighLatitudeRule, Madhab, PrayerAdjustments, PrayerTime, TimeSource,
    UserLocation,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Values used when the device or the store has nothing better.
#[derive(Clone, Debug)]
pub struct ServiceDefaults {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub method: CalculationMethod,
    pub adjustments: PrayerAdjustments,
}

/// Calculation settings that come only from config, not from the user's stored choices.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct Conventions {
    madhab: Madhab,
    high_latitude_rule: HighLatitudeRule,
}

pub struct PrayerTimeService {
    locations: LocationProvider,
    cache: PrayerTimeCache,
    calculator: PrayerTimeCalculator,
    chain: StrategyChain,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    defaults: ServiceDefaults,
}

impl PrayerTimeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locations: LocationProvider,
        cache: PrayerTimeCache,
        calculator: PrayerTimeCalculator,
        chain: StrategyChain,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        defaults: ServiceDefaults,
    ) -> Self {
        PrayerTimeService {
            locations,
            cache,
            calculator,
            chain,
            store,
            clock,
            defaults,
        }
    }

    /// Wire every component from configuration.
    pub fn from_config(
        config: &Config,
        device: Arc<dyn LocationDevice>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let locations = LocationProvider::new(device, store.clone(), clock.clone())
            .with_ttl(Duration::hours(config.cache.location_ttl_hours))
            .with_fix_timeout(std::time::Duration::from_secs(config.location.fix_timeout_secs));
        let drift = config.cache.drift_threshold_km.filter(|km| *km > 0.0);
        let cache = PrayerTimeCache::new(store.clone(), drift);
        let calculator = PrayerTimeCalculator::new(
            Arc::new(SolarCalculator),
            config.calculation.madhab,
            config.calculation.high_latitude_rule,
        );

        let mut chain = StrategyChain::new();
        if config.remote.enabled {
            let remote = RemoteTimingService::new(
                config.remote.base_url.clone(),
                std::time::Duration::from_secs(config.remote.timeout_secs),
            )?;
            chain = chain.then(RemoteStrategy::new(remote));
        }
        let chain = chain
            .then(LocalStrategy::new(calculator.clone()))
            .then(DefaultStrategy::new(config.calculation.default_schedule.clone()));
        info!(strategies = ?chain.names(), "Prayer time chain ready");

        let conventions = Conventions {
            madhab: config.calculation.madhab,
            high_latitude_rule: config.calculation.high_latitude_rule,
        };
        let recorded = store::load_json::<Conventions>(&*store, CONVENTIONS_KEY)?;
        if recorded != Some(conventions) {
            if recorded.is_some() {
                info!(?conventions, "Calculation conventions changed, dropping cached day");
            }
            cache.invalidate()?;
            store::save_json(&*store, CONVENTIONS_KEY, &conventions)?;
        }

        let defaults = ServiceDefaults {
            latitude: config.location.latitude,
            longitude: config.location.longitude,
            name: config.location.name.clone(),
            method: config.calculation.method,
            adjustments: config.calculation.adjustments,
        };

        Ok(Self::new(locations, cache, calculator, chain, store, clock, defaults))
    }

    pub fn calculator(&self) -> &PrayerTimeCalculator {
        &self.calculator
    }

    pub fn locations(&self) -> &LocationProvider {
        &self.locations
    }

    /// Today's prayer times from the cache, or from the first strategy that succeeds.
    pub async fn today(&self) -> Result<Resolution> {
        let location = self.current_location().await;
        let date = self.clock.today();
        let method = self.method()?;
        let adjustments = self.adjustments()?;

        match self.cache.get(date, &location, method, adjustments).map(CacheLookup::hit) {
            Ok(Some(times)) => {
                return Ok(Resolution {
                    times,
                    failures: Vec::new(),
                })
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Prayer time cache unreadable"),
        }

        let request = TimingRequest {
            location,
            date,
            method,
            adjustments,
        };
        let resolution = self.chain.resolve(&request).await?;

        // A default schedule is a placeholder; the next call should try the real tiers again
        if resolution.times.source != TimeSource::Default {
            if let Err(err) = self.cache.put(&resolution.times) {
                warn!(error = %err, "Could not cache prayer times");
            }
        }
        Ok(resolution)
    }

    /// Drop the cached day and resolve again (manual refresh).
    pub async fn refresh(&self) -> Result<Resolution> {
        self.cache.invalidate()?;
        self.today().await
    }

    /// Prayer times for another day; never cached.
    pub async fn times_for(&self, date: NaiveDate) -> Result<Resolution> {
        let request = TimingRequest {
            location: self.current_location().await,
            date,
            method: self.method()?,
            adjustments: self.adjustments()?,
        };
        self.chain.resolve(&request).await
    }

    /// Next prayer today, or tomorrow's Fajr once Isha has passed.
    pub async fn next_prayer(&self) -> Result<Option<PrayerTime>> {
        let now = self.clock.now();
        let today = self.today().await?;
        if let Some(next) = self.calculator.get_next_prayer(&today.times, now) {
            return Ok(Some(next.clone()));
        }

        let tomorrow = self.times_for(today.times.date_key + Duration::days(1)).await?;
        Ok(self.calculator.get_next_prayer(&tomorrow.times, now).cloned())
    }

    /// Persisted method, or the configured default when none is stored or it is unknown.
    pub fn method(&self) -> Result<CalculationMethod> {
        let Some(name) = store::load_json::<String>(&*self.store, CALCULATION_METHOD_KEY)? else {
            return Ok(self.defaults.method);
        };
        match name.parse::<CalculationMethod>() {
            Ok(method) => Ok(method),
            Err(err) => {
                warn!(error = %err, "Discarding stored calculation method");
                self.store.remove(CALCULATION_METHOD_KEY)?;
                Ok(self.defaults.method)
            }
        }
    }

    pub fn set_method(&self, method: CalculationMethod) -> Result<()> {
        store::save_json(&*self.store, CALCULATION_METHOD_KEY, &method.as_str())?;
        info!(%method, "Calculation method changed");
        self.cache.invalidate()
    }

    pub fn adjustments(&self) -> Result<PrayerAdjustments> {
        Ok(store::load_json(&*self.store, ADJUSTMENTS_KEY)?.unwrap_or(self.defaults.adjustments))
    }

    pub fn set_adjustments(&self, adjustments: PrayerAdjustments) -> Result<()> {
        store::save_json(&*self.store, ADJUSTMENTS_KEY, &adjustments)?;
        info!(?adjustments, "Prayer adjustments changed");
        self.cache.invalidate()
    }

    /// Device location, or the configured default when the device cannot provide one.
    ///
    /// The timestamp is re-expressed in the clock's current offset, which is the offset every
    /// computed instant is shown in.
    async fn current_location(&self) -> UserLocation {
        let now = self.clock.now();
        let mut location = match self.locations.get_current_location(true).await {
            Ok(location) => location,
            Err(err) => {
                warn!(error = %err, fallback = %self.defaults.name, "Using default location");
                let mut fallback =
                    UserLocation::new(self.defaults.latitude, self.defaults.longitude, now);
                fallback.city = Some(self.defaults.name.clone());
                fallback
            }
        };
        location.timestamp = location.timestamp.with_timezone(now.offset());
        location
    }
}
