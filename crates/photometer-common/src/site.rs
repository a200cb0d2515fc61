//! Observing sites.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::ephemeris::{self, Crossing};
use crate::error::{ReaderError, ReaderResult};

/// An astronomical site hosting one or more photometers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    /// Geodetic latitude in degrees, north positive.
    pub latitude: f64,
    /// Geodetic longitude in degrees, east positive.
    pub longitude: f64,
    /// Elevation above sea level in meters.
    pub elevation: f64,
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
}

fn serialize_tz<S: serde::Serializer>(tz: &Tz, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(tz.name())
}

/// Upcoming sunset/sunrise for a site relative to a reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub reference: DateTime<Utc>,
    pub next_sunset: Option<DateTime<Utc>>,
    pub next_sunrise: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn time_to_sunset(&self) -> Option<Duration> {
        self.next_sunset.map(|t| t - self.reference)
    }

    pub fn time_to_sunrise(&self) -> Option<Duration> {
        self.next_sunrise.map(|t| t - self.reference)
    }
}

impl Site {
    /// Create a validated site.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation: f64,
        timezone: &str,
    ) -> ReaderResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ReaderError::Config("Site id cannot be empty".to_string()));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ReaderError::Config(format!(
                "Site '{}': latitude {} outside [-90, 90]",
                id, latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ReaderError::Config(format!(
                "Site '{}': longitude {} outside [-180, 180]",
                id, longitude
            )));
        }
        let timezone: Tz = timezone.parse().map_err(|_| {
            ReaderError::Config(format!("Site '{}': unknown timezone '{}'", id, timezone))
        })?;

        Ok(Self {
            id,
            name: name.into(),
            latitude,
            longitude,
            elevation,
            timezone,
        })
    }

    /// Geometric solar altitude in degrees at `at`.
    pub fn solar_altitude(&self, at: DateTime<Utc>) -> f64 {
        ephemeris::solar_altitude(self.latitude, self.longitude, at)
    }

    pub fn next_sunset(&self, after: DateTime<Utc>, horizon: f64) -> Option<DateTime<Utc>> {
        ephemeris::next_crossing(self.latitude, self.longitude, after, horizon, Crossing::Setting)
    }

    pub fn next_sunrise(&self, after: DateTime<Utc>, horizon: f64) -> Option<DateTime<Utc>> {
        ephemeris::next_crossing(self.latitude, self.longitude, after, horizon, Crossing::Rising)
    }

    /// Next sunset and sunrise across `horizon`, relative to `now`.
    pub fn time_range(&self, now: DateTime<Utc>, horizon: f64) -> TimeRange {
        TimeRange {
            reference: now,
            next_sunset: self.next_sunset(now, horizon),
            next_sunrise: self.next_sunrise(now, horizon),
        }
    }

    /// Format an instant in the site's local time.
    pub fn local_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()
    }
}
