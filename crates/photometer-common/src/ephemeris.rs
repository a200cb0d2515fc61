//! Low-precision solar ephemeris.
//!
//! Solar position follows the NOAA spreadsheet formulation (declination and
//! equation of time from Julian centuries since J2000.0), good to about a
//! minute for rise/set times. Altitudes are geometric: no refraction and no
//! horizon dip for observer elevation.

use chrono::{DateTime, Duration, Utc};

/// Solar depression that opens the night window (astronomical dusk side).
pub const NIGHT_HORIZON_DEG: f64 = -10.0;

/// How far ahead rise/set crossings are searched for, in hours.
pub const LOOK_AHEAD_HOURS: i64 = 48;

const SCAN_STEP_MINUTES: i64 = 10;
const BISECT_RESOLUTION_MS: i64 = 1_000;

/// Direction of a horizon crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    Rising,
    Setting,
}

fn julian_day(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 86_400_000.0 + 2_440_587.5
}

/// Geometric altitude of the Sun, in degrees, seen from `lat`/`lon`.
pub fn solar_altitude(latitude: f64, longitude: f64, at: DateTime<Utc>) -> f64 {
    let jd = julian_day(at);
    let t = (jd - 2_451_545.0) / 36_525.0;

    let mean_long = (280.46646 + t * (36_000.76983 + t * 0.000_303_2)).rem_euclid(360.0);
    let mean_anom = 357.52911 + t * (35_999.05029 - 0.000_153_7 * t);
    let ecc = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anom.to_radians();
    let center = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;

    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_long = (mean_long + center - 0.005_69 - 0.004_78 * omega.sin()).to_radians();

    let mean_obliq = 23.0
        + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    let obliq = (mean_obliq + 0.002_56 * omega.cos()).to_radians();

    let declination = (obliq.sin() * apparent_long.sin()).asin();

    let y = (obliq / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let eot_minutes = 4.0
        * (y * (2.0 * l0).sin() - 2.0 * ecc * m.sin()
            + 4.0 * ecc * y * m.sin() * (2.0 * l0).cos()
            - 0.5 * y * y * (4.0 * l0).sin()
            - 1.25 * ecc * ecc * (2.0 * m).sin())
        .to_degrees();

    let utc_minutes = (jd + 0.5).rem_euclid(1.0) * 1_440.0;
    let true_solar_minutes = utc_minutes + eot_minutes + 4.0 * longitude;
    let hour_angle = (true_solar_minutes / 4.0 - 180.0).to_radians();

    let lat = latitude.to_radians();
    let cos_zenith = (lat.sin() * declination.sin()
        + lat.cos() * declination.cos() * hour_angle.cos())
    .clamp(-1.0, 1.0);

    90.0 - cos_zenith.acos().to_degrees()
}

/// First instant strictly after `after` at which the Sun crosses `horizon`
/// in the given direction, or `None` if it does not within
/// [`LOOK_AHEAD_HOURS`].
pub fn next_crossing(
    latitude: f64,
    longitude: f64,
    after: DateTime<Utc>,
    horizon: f64,
    crossing: Crossing,
) -> Option<DateTime<Utc>> {
    let above = |t: DateTime<Utc>| solar_altitude(latitude, longitude, t) >= horizon;

    let scan_step = Duration::minutes(SCAN_STEP_MINUTES);
    let steps = LOOK_AHEAD_HOURS * 60 / SCAN_STEP_MINUTES;
    let mut prev_t = after;
    let mut prev_above = above(after);

    for i in 1..=steps {
        let t = after + scan_step * i as i32;
        let now_above = above(t);

        let hit = match crossing {
            Crossing::Rising => !prev_above && now_above,
            Crossing::Setting => prev_above && !now_above,
        };
        if hit {
            return Some(bisect(prev_t, t, prev_above, &above));
        }

        prev_t = t;
        prev_above = now_above;
    }

    None
}

fn bisect(
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    lo_above: bool,
    above: &impl Fn(DateTime<Utc>) -> bool,
) -> DateTime<Utc> {
    while (hi - lo).num_milliseconds() > BISECT_RESOLUTION_MS {
        let mid = lo + (hi - lo) / 2;
        if above(mid) == lo_above {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CTIO_LAT: f64 = -30.169166;
    const CTIO_LON: f64 = -70.804;

    #[test]
    fn test_noon_sun_is_high_in_southern_summer() {
        // Local solar noon at CTIO is near 16:41 UTC.
        let t = Utc.with_ymd_and_hms(2024, 12, 21, 16, 41, 0).unwrap();
        let alt = solar_altitude(CTIO_LAT, CTIO_LON, t);
        assert!(alt > 80.0, "altitude was {}", alt);
    }

    #[test]
    fn test_midnight_sun_is_below_horizon() {
        let t = Utc.with_ymd_and_hms(2024, 12, 2, 4, 0, 0).unwrap();
        let alt = solar_altitude(CTIO_LAT, CTIO_LON, t);
        assert!(alt < NIGHT_HORIZON_DEG, "altitude was {}", alt);
    }

    #[test]
    fn test_equinox_sunset_near_six_pm_local_solar_time() {
        // Greenwich, equator: geometric sunset close to 18:07 UTC on the equinox.
        let after = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let sunset = next_crossing(0.0, 0.0, after, 0.0, Crossing::Setting).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 20, 18, 7, 0).unwrap();
        assert!((sunset - expected).num_minutes().abs() <= 5, "sunset was {}", sunset);
    }

    #[test]
    fn test_crossing_is_after_reference() {
        let after = Utc.with_ymd_and_hms(2024, 12, 2, 9, 0, 0).unwrap();
        let rise = next_crossing(CTIO_LAT, CTIO_LON, after, NIGHT_HORIZON_DEG, Crossing::Rising)
            .unwrap();
        let set = next_crossing(CTIO_LAT, CTIO_LON, after, NIGHT_HORIZON_DEG, Crossing::Setting)
            .unwrap();
        assert!(rise > after);
        assert!(set > after);
        // Daytime: the evening crossing comes first.
        assert!(set < rise);
    }

    #[test]
    fn test_polar_day_has_no_setting() {
        // Alert, Nunavut around the June solstice.
        let after = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
        assert!(next_crossing(82.5, -62.3, after, NIGHT_HORIZON_DEG, Crossing::Setting).is_none());
    }
}
