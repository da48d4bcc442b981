//! Daylight window computation.
//!
//! The window gating acquisition is derived from the sunrise equation: solar
//! mean anomaly, equation of centre, ecliptic longitude, declination and the
//! hour angle at which the upper limb touches the horizon (-0.833° accounts
//! for refraction and the solar disc). Accuracy is about a minute, well under
//! the gating margin.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::AcqError;

/// Julian date of the J2000.0 epoch (2000-01-01 12:00 UTC)
const J2000: f64 = 2_451_545.0;
/// Julian date of the Unix epoch
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Days from 1970-01-01 to 2000-01-01
const J2000_DAYS_AFTER_UNIX: i64 = 10_957;
/// Axial tilt, degrees
const OBLIQUITY: f64 = 23.4397;
/// Solar altitude at apparent sunrise/sunset, degrees
const HORIZON_ALTITUDE: f64 = -0.833;

/// Observer position in decimal degrees, east and north positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AcqError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AcqError::Configuration(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AcqError::Configuration(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self { latitude, longitude })
    }

    /// Parse coordinates given as decimal-degree strings.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, AcqError> {
        let lat = latitude
            .trim()
            .parse::<f64>()
            .map_err(|e| AcqError::Configuration(format!("latitude {latitude:?}: {e}")))?;
        let lon = longitude
            .trim()
            .parse::<f64>()
            .map_err(|e| AcqError::Configuration(format!("longitude {longitude:?}: {e}")))?;
        Self::new(lat, lon)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Sunrise, sunset and the following sunrise, as local wall-clock times.
///
/// Invariant: `sunrise < sunset < next_sunrise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaylightWindow {
    pub sunrise: NaiveDateTime,
    pub sunset: NaiveDateTime,
    pub next_sunrise: NaiveDateTime,
}

impl DaylightWindow {
    pub fn new(
        sunrise: NaiveDateTime,
        sunset: NaiveDateTime,
        next_sunrise: NaiveDateTime,
    ) -> Result<Self, AcqError> {
        if !(sunrise < sunset && sunset < next_sunrise) {
            return Err(AcqError::Configuration(format!(
                "inconsistent daylight window: sunrise {sunrise}, sunset {sunset}, next sunrise {next_sunrise}"
            )));
        }
        Ok(Self {
            sunrise,
            sunset,
            next_sunrise,
        })
    }

    /// First instant of the active period.
    pub fn active_from(&self, margin: Duration) -> NaiveDateTime {
        self.sunrise - margin
    }

    /// Last instant of the active period.
    pub fn active_until(&self, margin: Duration) -> NaiveDateTime {
        self.sunset + margin
    }

    /// Whether `now` falls inside `[sunrise - margin, sunset + margin]`.
    pub fn contains(&self, now: NaiveDateTime, margin: Duration) -> bool {
        self.active_from(margin) <= now && now <= self.active_until(margin)
    }

    /// When the next active period begins, seen from `now`.
    pub fn next_wake(&self, now: NaiveDateTime, margin: Duration) -> NaiveDateTime {
        if now < self.active_from(margin) {
            self.active_from(margin)
        } else {
            self.next_sunrise - margin
        }
    }
}

impl fmt::Display for DaylightWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sunrise {}, sunset {}, next sunrise {}",
            self.sunrise.format("%Y-%m-%d %H:%M:%S"),
            self.sunset.format("%H:%M:%S"),
            self.next_sunrise.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Computes the daylight window for a calendar day.
pub trait SolarCalculator: Send + Sync {
    fn compute(&self, date: NaiveDate, location: &Location) -> Result<DaylightWindow, AcqError>;
}

/// Sunrise-equation calculator reporting times in the wall clock of `Tz`.
#[derive(Debug, Clone)]
pub struct NoaaCalculator<Tz: TimeZone = Local> {
    tz: Tz,
}

impl NoaaCalculator<Local> {
    pub fn local() -> Self {
        Self { tz: Local }
    }
}

impl Default for NoaaCalculator<Local> {
    fn default() -> Self {
        Self::local()
    }
}

impl<Tz: TimeZone> NoaaCalculator<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn to_wall_clock(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&self.tz).naive_local()
    }
}

impl<Tz> SolarCalculator for NoaaCalculator<Tz>
where
    Tz: TimeZone + Send + Sync,
{
    fn compute(&self, date: NaiveDate, location: &Location) -> Result<DaylightWindow, AcqError> {
        let today = sun_events(date, location)?;
        let next_date = date
            .succ_opt()
            .ok_or_else(|| AcqError::Configuration(format!("no day after {date}")))?;
        let tomorrow = sun_events(next_date, location)?;
        DaylightWindow::new(
            self.to_wall_clock(today.rise),
            self.to_wall_clock(today.set),
            self.to_wall_clock(tomorrow.rise),
        )
    }
}

struct SunEvents {
    rise: DateTime<Utc>,
    set: DateTime<Utc>,
}

fn sun_events(date: NaiveDate, location: &Location) -> Result<SunEvents, AcqError> {
    let n = (date.signed_duration_since(NaiveDate::default()).num_days() - J2000_DAYS_AFTER_UNIX) as f64;

    // Mean solar noon, in days relative to J2000
    let mean_noon = n - location.longitude / 360.0;
    let anomaly = (357.5291 + 0.985_600_28 * mean_noon).rem_euclid(360.0);
    let m = anomaly.to_radians();
    let centre = 1.9148 * m.sin() + 0.0200 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin();
    let ecliptic = (anomaly + centre + 180.0 + 102.9372).rem_euclid(360.0).to_radians();
    let transit = J2000 + mean_noon + 0.0053 * m.sin() - 0.0069 * (2.0 * ecliptic).sin();

    let sin_decl = ecliptic.sin() * OBLIQUITY.to_radians().sin();
    let cos_decl = sin_decl.asin().cos();
    let phi = location.latitude.to_radians();
    let cos_hour_angle =
        (HORIZON_ALTITUDE.to_radians().sin() - phi.sin() * sin_decl) / (phi.cos() * cos_decl);

    if cos_hour_angle > 1.0 {
        return Err(AcqError::NoSunEvent { date, kind: "sunrise" });
    }
    if cos_hour_angle < -1.0 {
        return Err(AcqError::NoSunEvent { date, kind: "sunset" });
    }
    let half_day = cos_hour_angle.acos().to_degrees() / 360.0;

    Ok(SunEvents {
        rise: julian_to_utc(transit - half_day)?,
        set: julian_to_utc(transit + half_day)?,
    })
}

fn julian_to_utc(jd: f64) -> Result<DateTime<Utc>, AcqError> {
    let secs = (jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY;
    DateTime::<Utc>::from_timestamp(secs.floor() as i64, 0)
        .ok_or_else(|| AcqError::Configuration(format!("julian date {jd} out of range")))
}
