//! Low-precision solar ephemeris and sun-angle prayer times.
//!
//! Accuracy: about one minute for latitudes below ~48°, which is well under the resolution of
//! a prayer timetable. The sun position uses the USNO almanac approximation (valid roughly
//! 1950–2050); times are found from the hour angle at which the sun reaches a given depression,
//! with one refinement pass at the approximate time of each event.
//!
//! The rest of the crate only sees [`AstronomicalCalculator`]; nothing outside this module
//! depends on the formulas.

use crate::error::{PrayerError, Result};
use crate::method::{HighLatitudeRule, IshaRule, Madhab};
use crate::CalculationMethod;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Everything the calculator needs for one day at one place.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalculationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub date: NaiveDate,
    pub method: CalculationMethod,
    pub madhab: Madhab,
    pub high_latitude_rule: HighLatitudeRule,
}

/// Unadjusted prayer instants for one day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawPrayerTimes {
    pub fajr: DateTime<Utc>,
    pub dhuhr: DateTime<Utc>,
    pub asr: DateTime<Utc>,
    pub maghrib: DateTime<Utc>,
    pub isha: DateTime<Utc>,
}

impl RawPrayerTimes {
    pub fn as_array(&self) -> [DateTime<Utc>; 5] {
        [self.fajr, self.dhuhr, self.asr, self.maghrib, self.isha]
    }
}

/// A pure, deterministic source of raw prayer instants.
pub trait AstronomicalCalculator: Send + Sync {
    fn compute(&self, request: &CalculationRequest) -> Result<RawPrayerTimes>;
}

/// Built-in sun-angle calculator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolarCalculator;

/// Sun altitude at apparent sunrise/sunset (refraction plus semidiameter).
const RISE_SET_ANGLE: f64 = 0.833;

impl AstronomicalCalculator for SolarCalculator {
    fn compute(&self, request: &CalculationRequest) -> Result<RawPrayerTimes> {
        let CalculationRequest {
            latitude,
            longitude,
            date,
            method,
            madhab,
            high_latitude_rule,
        } = *request;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PrayerError::Calculation(format!("latitude {latitude} out of range")));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PrayerError::Calculation(format!("longitude {longitude} out of range")));
        }

        let params = method.params();
        let day = SolarDay {
            jd: julian_day(date.year(), date.month(), date.day()) - longitude / (15.0 * 24.0),
            latitude,
        };

        // Hours of local solar time; initial guesses follow the usual day layout
        let sunrise = day
            .sun_angle_time(RISE_SET_ANGLE, 6.0, true)
            .ok_or_else(|| polar(latitude, date))?;
        let sunset = day
            .sun_angle_time(RISE_SET_ANGLE, 18.0, false)
            .ok_or_else(|| polar(latitude, date))?;
        let dhuhr = day.mid_day(12.0);
        let asr = day
            .asr_time(madhab.shadow_factor(), 13.0)
            .ok_or_else(|| PrayerError::Calculation("asr shadow length unreachable".into()))?;

        let night = sunrise + 24.0 - sunset;
        let portion = |angle: f64| high_latitude_rule.night_portion(angle) * night;

        let fajr = clamp_before(
            day.sun_angle_time(params.fajr_angle, 5.0, true),
            sunrise,
            portion(params.fajr_angle),
        );

        let maghrib = match params.maghrib_angle {
            Some(angle) => clamp_after(day.sun_angle_time(angle, 18.0, false), sunset, portion(angle)),
            None => sunset,
        };

        let isha = match params.isha {
            IshaRule::Angle(angle) => {
                clamp_after(day.sun_angle_time(angle, 18.0, false), sunset, portion(angle))
            }
            IshaRule::MinutesAfterMaghrib(minutes) => maghrib + minutes / 60.0,
        };

        let to_utc = |local_solar: f64| instant(date, local_solar - longitude / 15.0);
        Ok(RawPrayerTimes {
            fajr: to_utc(fajr)?,
            dhuhr: to_utc(dhuhr)?,
            asr: to_utc(asr)?,
            maghrib: to_utc(maghrib)?,
            isha: to_utc(isha)?,
        })
    }
}

fn polar(latitude: f64, date: NaiveDate) -> PrayerError {
    PrayerError::Calculation(format!(
        "sun does not rise or set at latitude {latitude:.2} on {date}"
    ))
}

/// Morning twilight event: never further before sunrise than `max_hours`.
fn clamp_before(time: Option<f64>, sunrise: f64, max_hours: f64) -> f64 {
    match time {
        Some(t) if sunrise - t <= max_hours => t,
        _ => sunrise - max_hours,
    }
}

/// Evening twilight event: never further after sunset than `max_hours`.
fn clamp_after(time: Option<f64>, sunset: f64, max_hours: f64) -> f64 {
    match time {
        Some(t) if t - sunset <= max_hours => t,
        _ => sunset + max_hours,
    }
}

/// `hours` past UTC midnight of `date`, to the second. Values outside 0..24 roll into the
/// neighbouring UTC day, which is where the local prayer actually falls.
fn instant(date: NaiveDate, hours: f64) -> Result<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| PrayerError::Calculation(format!("invalid date {date}")))?;
    Ok(midnight + Duration::seconds((hours * 3600.0).round() as i64))
}

struct SolarDay {
    /// Julian day of local midnight
    jd: f64,
    latitude: f64,
}

struct SunPosition {
    declination: f64,
    /// Equation of time in hours
    equation: f64,
}

impl SolarDay {
    /// Local solar noon in hours, evaluated near `hour`.
    fn mid_day(&self, hour: f64) -> f64 {
        let eqt = sun_position(self.jd + hour / 24.0).equation;
        fix_hour(12.0 - eqt)
    }

    /// When the sun is `angle` degrees below the horizon, before noon if `before_noon`.
    /// `None` when the sun never reaches that depression on this day.
    fn sun_angle_time(&self, angle: f64, hour: f64, before_noon: bool) -> Option<f64> {
        let decl = sun_position(self.jd + hour / 24.0).declination;
        let noon = self.mid_day(hour);
        let cos_h = (-dsin(angle) - dsin(decl) * dsin(self.latitude))
            / (dcos(decl) * dcos(self.latitude));
        if !(-1.0..=1.0).contains(&cos_h) {
            return None;
        }
        let t = cos_h.acos().to_degrees() / 15.0;
        Some(if before_noon { noon - t } else { noon + t })
    }

    /// Afternoon time when an object's shadow is `factor` times its height plus its noon shadow.
    fn asr_time(&self, factor: f64, hour: f64) -> Option<f64> {
        let decl = sun_position(self.jd + hour / 24.0).declination;
        let angle = -(1.0 / (factor + dtan((self.latitude - decl).abs())))
            .atan()
            .to_degrees();
        self.sun_angle_time(angle, hour, false)
    }
}

fn sun_position(jd: f64) -> SunPosition {
    let d = jd - 2_451_545.0;
    let g = fix_angle(357.529 + 0.985_600_28 * d);
    let q = fix_angle(280.459 + 0.985_647_36 * d);
    let l = fix_angle(q + 1.915 * dsin(g) + 0.020 * dsin(2.0 * g));
    let e = 23.439 - 0.000_000_36 * d;

    let ra = (dcos(e) * dsin(l)).atan2(dcos(l)).to_degrees() / 15.0;
    SunPosition {
        declination: (dsin(e) * dsin(l)).asin().to_degrees(),
        equation: q / 15.0 - fix_hour(ra),
    }
}

/// Julian day at 00:00 UT of a Gregorian date.
fn julian_day(year: i32, month: u32, day: u32) -> f64 {
    let (mut y, mut m) = (year as f64, month as f64);
    if month <= 2 {
        y -= 1.0;
        m += 12.0;
    }
    let a = (y / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();
    (365.25 * (y + 4716.0)).floor() + (30.6001 * (m + 1.0)).floor() + day as f64 + b - 1524.5
}

fn dsin(deg: f64) -> f64 {
    deg.to_radians().sin()
}

fn dcos(deg: f64) -> f64 {
    deg.to_radians().cos()
}

fn dtan(deg: f64) -> f64 {
    deg.to_radians().tan()
}

fn fix_angle(a: f64) -> f64 {
    a.rem_euclid(360.0)
}

fn fix_hour(h: f64) -> f64 {
    h.rem_euclid(24.0)
}
