//! Ordered fallback chain for obtaining a day's prayer times.
//!
//! Each tier is a named [`TimingStrategy`] that returns a tagged outcome instead of an error.
//! The chain tries them in order and stops at the first success, keeping the failures so the
//! caller can show why a lower tier was used.

use crate::calculator::PrayerTimeCalculator;
use crate::error::{PrayerError, Result};
use crate::fallback;
use crate::remote::RemoteTimingService;
use crate::{CalculationMethod, DailyPrayerTimes, PrayerAdjustments, UserLocation};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct TimingRequest {
    pub location: UserLocation,
    pub date: NaiveDate,
    pub method: CalculationMethod,
    pub adjustments: PrayerAdjustments,
}

#[derive(Debug)]
pub enum StrategyOutcome {
    Resolved(DailyPrayerTimes),
    Failed(PrayerError),
}

#[async_trait]
pub trait TimingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve(&self, request: &TimingRequest) -> StrategyOutcome;
}

/// Why one tier was skipped.
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub error: PrayerError,
}

/// The winning day plus every tier that failed before it.
#[derive(Debug)]
pub struct Resolution {
    pub times: DailyPrayerTimes,
    pub failures: Vec<StrategyFailure>,
}

pub struct RemoteStrategy {
    service: RemoteTimingService,
}

impl RemoteStrategy {
    pub fn new(service: RemoteTimingService) -> Self {
        RemoteStrategy { service }
    }
}

#[async_trait]
impl TimingStrategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn resolve(&self, request: &TimingRequest) -> StrategyOutcome {
        match self
            .service
            .fetch(&request.location, request.date, request.method, request.adjustments)
            .await
        {
            Ok(times) => StrategyOutcome::Resolved(times),
            Err(err) => StrategyOutcome::Failed(err),
        }
    }
}

pub struct LocalStrategy {
    calculator: PrayerTimeCalculator,
}

impl LocalStrategy {
    pub fn new(calculator: PrayerTimeCalculator) -> Self {
        LocalStrategy { calculator }
    }
}

#[async_trait]
impl TimingStrategy for LocalStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn resolve(&self, request: &TimingRequest) -> StrategyOutcome {
        match self.calculator.calculate(
            &request.location,
            request.date,
            request.method,
            request.adjustments,
        ) {
            Ok(times) => StrategyOutcome::Resolved(times),
            Err(err) => StrategyOutcome::Failed(err),
        }
    }
}

/// Fixed wall-clock schedule; never fails.
pub struct DefaultStrategy {
    schedule: Vec<String>,
}

impl DefaultStrategy {
    pub fn new(schedule: Vec<String>) -> Self {
        DefaultStrategy { schedule }
    }
}

#[async_trait]
impl TimingStrategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn resolve(&self, request: &TimingRequest) -> StrategyOutcome {
        StrategyOutcome::Resolved(fallback::approximate(
            &request.location,
            request.date,
            request.method,
            &self.schedule,
        ))
    }
}

#[derive(Default)]
pub struct StrategyChain {
    strategies: Vec<Box<dyn TimingStrategy>>,
}

impl StrategyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, strategy: impl TimingStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy in order; the error of the last one is returned if none succeeds.
    pub async fn resolve(&self, request: &TimingRequest) -> Result<Resolution> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            match strategy.resolve(request).await {
                StrategyOutcome::Resolved(times) => {
                    debug!(strategy = strategy.name(), source = %times.source, "Resolved prayer times");
                    return Ok(Resolution { times, failures });
                }
                StrategyOutcome::Failed(error) => {
                    warn!(strategy = strategy.name(), %error, "Prayer time strategy failed");
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        error,
                    });
                }
            }
        }

        match failures.pop() {
            Some(last) => Err(last.error),
            None => Err(PrayerError::Config("no prayer time strategies configured".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeSource;
    use chrono::{FixedOffset, TimeZone};

    struct AlwaysFails;

    #[async_trait]
    impl TimingStrategy for AlwaysFails {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn resolve(&self, _request: &TimingRequest) -> StrategyOutcome {
            StrategyOutcome::Failed(PrayerError::Remote("connection refused".into()))
        }
    }

    fn request(adjustments: PrayerAdjustments) -> TimingRequest {
        let cst = FixedOffset::west_opt(6 * 3600).unwrap();
        TimingRequest {
            location: UserLocation::new(
                41.7606,
                -88.3201,
                cst.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap(),
            ),
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            method: CalculationMethod::NorthAmerica,
            adjustments,
        }
    }

    fn full_chain() -> StrategyChain {
        StrategyChain::new()
            .then(AlwaysFails)
            .then(LocalStrategy::new(PrayerTimeCalculator::default()))
            .then(DefaultStrategy::new(vec![]))
    }

    #[tokio::test]
    async fn test_failed_tier_falls_through_to_local() {
        let resolution = full_chain()
            .resolve(&request(PrayerAdjustments::default()))
            .await
            .unwrap();

        assert_eq!(resolution.times.source, TimeSource::LocalCalculation);
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.failures[0].strategy, "broken");
    }

    #[tokio::test]
    async fn test_inverted_adjustments_reach_default_with_reason() {
        let inverted = PrayerAdjustments {
            maghrib: 120,
            ..Default::default()
        };
        let resolution = full_chain().resolve(&request(inverted)).await.unwrap();

        assert_eq!(resolution.times.source, TimeSource::Default);
        assert!(matches!(
            resolution.failures.last().map(|f| &f.error),
            Some(PrayerError::InvertedSchedule { .. })
        ));
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_last_error() {
        let chain = StrategyChain::new().then(AlwaysFails);
        let err = chain
            .resolve(&request(PrayerAdjustments::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, PrayerError::Remote(_)));
        assert_eq!(chain.names(), vec!["broken"]);
    }
}
