//! Solar position math and the daylight brightness curve.
//!
//! The Location mode maps the sun's position at the user's coordinates to a
//! brightness/contrast percentage: 0% outside the (extended) daylight
//! window, 100% on a flat plateau around solar noon, and a configurable
//! power-curve transition at dawn and dusk.  [`hourly_samples`] evaluates
//! the curve at 24 discrete hourly points, which the preview surfaces reuse.
//!
//! Elevation and sunrise/sunset use the NOAA low-accuracy series, which is
//! within a fraction of a degree — far below what a brightness curve can
//! perceive.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Solar zenith angle for official sunrise/sunset, in degrees.
const ZENITH_OFFICIAL: f64 = 90.833;

/// Geographic coordinates, degrees; east and north positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Shape of the daylight brightness curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaylightCurve {
    /// Width of the 100% plateau centred on solar noon, minutes.
    #[serde(default = "default_noon_duration")]
    pub noon_duration_minutes: i64,
    /// Widens the dawn/dusk transition windows beyond sunrise/sunset, minutes.
    #[serde(default = "default_daylight_extension")]
    pub daylight_extension_minutes: i64,
    /// Exponent applied to the normalized transition position.
    #[serde(default = "default_curve_factor")]
    pub curve_factor: f64,
}

fn default_noon_duration() -> i64 {
    180
}
fn default_daylight_extension() -> i64 {
    180
}
fn default_curve_factor() -> f64 {
    0.5
}

impl Default for DaylightCurve {
    fn default() -> Self {
        Self {
            noon_duration_minutes: default_noon_duration(),
            daylight_extension_minutes: default_daylight_extension(),
            curve_factor: default_curve_factor(),
        }
    }
}

/// The sun's behaviour on a given date at given coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SunPhase {
    /// The sun rises and sets.
    Normal {
        sunrise: DateTime<Utc>,
        noon: DateTime<Utc>,
        sunset: DateTime<Utc>,
    },
    /// The sun never sets (polar day).
    PolarDay,
    /// The sun never rises (polar night).
    PolarNight,
}

/// Fractional year in radians for the NOAA series.
fn fractional_year(t: &DateTime<Utc>) -> f64 {
    let day_of_year = t.ordinal() as f64;
    let hour = t.hour() as f64 + t.minute() as f64 / 60.0;
    2.0 * PI / 365.0 * (day_of_year - 1.0 + (hour - 12.0) / 24.0)
}

/// Equation of time, minutes.
fn equation_of_time(fy: f64) -> f64 {
    229.18
        * (0.000075 + 0.001868 * fy.cos() - 0.032077 * fy.sin()
            - 0.014615 * (2.0 * fy).cos()
            - 0.040849 * (2.0 * fy).sin())
}

/// Solar declination, radians.
fn declination(fy: f64) -> f64 {
    0.006918 - 0.399912 * fy.cos() + 0.070257 * fy.sin() - 0.006758 * (2.0 * fy).cos()
        + 0.000907 * (2.0 * fy).sin()
        - 0.002697 * (3.0 * fy).cos()
        + 0.00148 * (3.0 * fy).sin()
}

/// Solar elevation above the horizon in degrees at the given instant.
pub fn solar_elevation(coords: Coordinates, t: DateTime<Utc>) -> f64 {
    let fy = fractional_year(&t);
    let decl = declination(fy);
    let eqtime = equation_of_time(fy);

    let minutes = t.hour() as f64 * 60.0 + t.minute() as f64 + t.second() as f64 / 60.0;
    let true_solar_time = minutes + eqtime + 4.0 * coords.longitude;
    let hour_angle = (true_solar_time / 4.0 - 180.0).to_radians();

    let lat = coords.latitude.to_radians();
    (lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos())
        .asin()
        .to_degrees()
}

/// Sunrise, solar noon, and sunset (UTC) for the given date, or the polar
/// special cases.
pub fn sun_phase(coords: Coordinates, date: NaiveDate) -> SunPhase {
    let noon_guess = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"));
    let fy = fractional_year(&noon_guess);
    let decl = declination(fy);
    let eqtime = equation_of_time(fy);
    let lat = coords.latitude.to_radians();

    let cos_hour_angle =
        ZENITH_OFFICIAL.to_radians().cos() / (lat.cos() * decl.cos()) - lat.tan() * decl.tan();
    if cos_hour_angle > 1.0 {
        return SunPhase::PolarNight;
    }
    if cos_hour_angle < -1.0 {
        return SunPhase::PolarDay;
    }

    let hour_angle = cos_hour_angle.acos().to_degrees();
    let sunrise_minutes = 720.0 - 4.0 * (coords.longitude + hour_angle) - eqtime;
    let sunset_minutes = 720.0 - 4.0 * (coords.longitude - hour_angle) - eqtime;
    let noon_minutes = 720.0 - 4.0 * coords.longitude - eqtime;

    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("valid time"));
    let at = |minutes: f64| midnight + Duration::seconds((minutes * 60.0) as i64);

    SunPhase::Normal {
        sunrise: at(sunrise_minutes),
        noon: at(noon_minutes),
        sunset: at(sunset_minutes),
    }
}

/// Brightness percentage for the given instant.
///
/// 0% outside `[sunrise - extension, sunset + extension]`, 100% on the noon
/// plateau, and a `s^curve_factor` transition in between.
pub fn daylight_percent(coords: Coordinates, curve: &DaylightCurve, t: DateTime<Utc>) -> f64 {
    match sun_phase(coords, t.date_naive()) {
        SunPhase::PolarNight => 0.0,
        SunPhase::PolarDay => 100.0,
        SunPhase::Normal {
            sunrise,
            noon,
            sunset,
        } => {
            let extension = Duration::minutes(curve.daylight_extension_minutes);
            let rise = sunrise - extension;
            let set = sunset + extension;
            if t <= rise || t >= set {
                return 0.0;
            }

            let half_plateau = Duration::minutes(curve.noon_duration_minutes / 2);
            let plateau_start = noon - half_plateau;
            let plateau_end = noon + half_plateau;
            if t >= plateau_start && t <= plateau_end {
                return 100.0;
            }

            if t < plateau_start {
                let span = (plateau_start - rise).num_seconds() as f64;
                if span <= 0.0 {
                    return 100.0;
                }
                let s = (t - rise).num_seconds() as f64 / span;
                100.0 * s.powf(curve.curve_factor)
            } else {
                let span = (set - plateau_end).num_seconds() as f64;
                if span <= 0.0 {
                    return 100.0;
                }
                let s = (set - t).num_seconds() as f64 / span;
                100.0 * s.powf(curve.curve_factor)
            }
        }
    }
}

/// Evaluates the curve at each of the 24 hours of `date` (UTC, on the hour).
///
/// The same samples back the brightness preview charts.
pub fn hourly_samples(coords: Coordinates, curve: &DaylightCurve, date: NaiveDate) -> [f64; 24] {
    let mut samples = [0.0; 24];
    for (hour, sample) in samples.iter_mut().enumerate() {
        let t = Utc.from_utc_datetime(
            &date
                .and_hms_opt(hour as u32, 0, 0)
                .expect("hour within range"),
        );
        *sample = daylight_percent(coords, curve, t);
    }
    samples
}

// ── Tests ─────────────────────────────────────────────────────────────────────
