//! # Remote Timing Service
//!
//! Optional primary source of prayer times: an HTTP service answering
//! `GET {base_url}/timings?latitude=&longitude=&method=` with an Aladhan-style JSON body.
//!
//! ## Response Format
//! ```json
//! { "code": 200, "data": { "timings": { "Fajr": "05:56", "Dhuhr": "12:03",
//!   "Asr": "14:29", "Maghrib": "16:48", "Isha": "18:10", "Sunrise": "07:18" } } }
//! ```
//! Extra timings are ignored. A value may carry a trailing annotation such as `"05:56 (CST)"`.
//!
//! ## Validation
//! The service is trusted for nothing but the shape of its answer. A response is only
//! accepted when all five prayers are present as well-formed `HH:MM` values in strictly
//! increasing order; anything else is an error and the caller falls back to local calculation.
//!
//! Wall-clock times are interpreted in the offset of the requesting location's timestamp
//! (the device's local offset).

use crate::calculator::ensure_chronological;
use crate::error::{PrayerError, Result};
use crate::{
    CalculationMethod, DailyPrayerTimes, PrayerAdjustments, PrayerName, PrayerTime, TimeSource,
    UserLocation,
};
use chrono::{NaiveDate, NaiveTime, TimeZone};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const REMOTE_CONFIDENCE: f32 = 0.95;

#[derive(Debug, Deserialize)]
struct TimingsEnvelope {
    data: TimingsData,
}

#[derive(Debug, Deserialize)]
struct TimingsData {
    timings: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RemoteTimingService {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTimingService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("prayer-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(RemoteTimingService {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch and validate today's timings for `location`.
    ///
    /// Adjustments are applied on top of the service's values the same way local calculation
    /// applies them, and the adjusted set must still be chronological.
    pub async fn fetch(
        &self,
        location: &UserLocation,
        date: NaiveDate,
        method: CalculationMethod,
        adjustments: PrayerAdjustments,
    ) -> Result<DailyPrayerTimes> {
        let url = format!("{}/timings", self.base_url);
        let method_id = method.remote_id().to_string();
        let latitude = location.latitude.to_string();
        let longitude = location.longitude.to_string();
        let day = date.format("%d-%m-%Y").to_string();

        debug!(%url, method = %method, "Requesting remote timings");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("method", method_id.as_str()),
                ("date", day.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let envelope: TimingsEnvelope = response.json().await?;
        parse_timings(&envelope.data.timings, location, date, method, adjustments)
    }
}

/// Validate a map of named wall-clock timings and build a [`DailyPrayerTimes`].
pub fn parse_timings(
    timings: &HashMap<String, String>,
    location: &UserLocation,
    date: NaiveDate,
    method: CalculationMethod,
    adjustments: PrayerAdjustments,
) -> Result<DailyPrayerTimes> {
    let offset = *location.timestamp.offset();

    let mut prayers = Vec::with_capacity(5);
    for name in PrayerName::ALL {
        let raw = timings
            .get(name.as_str())
            .ok_or_else(|| PrayerError::Remote(format!("missing {name}")))?;
        let wall = parse_hh_mm(raw)
            .ok_or_else(|| PrayerError::Remote(format!("malformed {name} time '{raw}'")))?;
        let instant = offset
            .from_local_datetime(&date.and_time(wall))
            .single()
            .ok_or_else(|| PrayerError::Remote(format!("unrepresentable {name} time '{raw}'")))?;
        prayers.push(PrayerTime::new(name, instant));
    }

    ensure_chronological(&prayers).map_err(|err| PrayerError::Remote(err.to_string()))?;

    for prayer in &mut prayers {
        let shift = adjustments.minutes_for(prayer.name) as i64;
        if shift != 0 {
            *prayer = PrayerTime::new(prayer.name, prayer.instant + chrono::Duration::minutes(shift));
        }
    }
    ensure_chronological(&prayers)?;

    Ok(DailyPrayerTimes {
        date_key: date,
        location: location.clone(),
        calculation_method: method,
        adjustments,
        prayers,
        source: TimeSource::RemoteService,
        confidence: REMOTE_CONFIDENCE,
    })
}

/// Strict "HH:MM" (two digits each), optionally followed by whitespace and an annotation.
fn parse_hh_mm(raw: &str) -> Option<NaiveTime> {
    let value = raw.split_whitespace().next()?;
    let (h, m) = value.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}
