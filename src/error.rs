//! Error taxonomy shared by every component of the engine.

use crate::PrayerName;
use std::fmt;
use thiserror::Error;

/// Which device permission was missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionKind {
    Location,
    Notifications,
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionKind::Location => "location",
            PermissionKind::Notifications => "notifications",
        })
    }
}

/// Errors that can occur while locating the device, computing prayer times or scheduling
/// notifications.
///
/// Environmental failures (GPS timeout, network) are usually absorbed by the fallback chain
/// before they reach a caller. Logic failures are returned as-is and never retried.
#[derive(Error, Debug)]
pub enum PrayerError {
    /// The user has not granted a required device permission
    #[error("{0} permission denied")]
    PermissionDenied(PermissionKind),

    /// No fresh fix could be taken and nothing was cached
    #[error("location unavailable")]
    LocationUnavailable,

    /// The astronomical calculator rejected its input
    #[error("calculation failed: {0}")]
    Calculation(String),

    /// Minute adjustments moved a prayer at or past the next one
    #[error("adjustments invert {earlier} and {later}")]
    InvertedSchedule { earlier: PrayerName, later: PrayerName },

    /// One notification could not be scheduled
    #[error("could not schedule {prayer} notification: {reason}")]
    NotificationScheduling { prayer: PrayerName, reason: String },

    /// Remote timing service failed or returned unusable data
    #[error("remote timing service: {0}")]
    Remote(String),

    /// Persisted key-value store failed
    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PrayerError {
    fn from(err: reqwest::Error) -> Self {
        PrayerError::Remote(err.to_string())
    }
}

impl From<std::io::Error> for PrayerError {
    fn from(err: std::io::Error) -> Self {
        PrayerError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for PrayerError {
    fn from(err: serde_json::Error) -> Self {
        PrayerError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PrayerError>;
