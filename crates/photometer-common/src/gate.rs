//! Night window gate.
//!
//! Readings are meaningful only while the Sun is below the night horizon
//! ([`NIGHT_HORIZON_DEG`]). The gate is evaluated per message; a deferral
//! never queues anything.

use chrono::{DateTime, Duration, Utc};

use crate::ephemeris::{LOOK_AHEAD_HOURS, NIGHT_HORIZON_DEG};
use crate::site::Site;

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The site is inside its night window.
    Process,
    /// Daytime; the next window opens after `wait`, at `until` when known.
    Defer {
        wait: Duration,
        until: Option<DateTime<Utc>>,
    },
}

impl GateDecision {
    pub fn is_process(&self) -> bool {
        matches!(self, GateDecision::Process)
    }
}

/// Anything able to decide whether a site is currently observable.
pub trait WindowGate: Send + Sync {
    fn decide(&self, site: &Site, now: DateTime<Utc>) -> GateDecision;
}

/// Core rule: if sunrise is further away than sunset the site is still in
/// daytime heading toward sunset. Equal distances resolve to `Process`.
pub fn decide_from_remaining(time_to_sunset: Duration, time_to_sunrise: Duration) -> GateDecision {
    if time_to_sunrise > time_to_sunset {
        GateDecision::Defer {
            wait: time_to_sunset,
            until: None,
        }
    } else {
        GateDecision::Process
    }
}

/// Gate driven by the site's solar ephemeris.
#[derive(Debug, Clone, Copy)]
pub struct NightWindowGate {
    horizon: f64,
}

impl Default for NightWindowGate {
    fn default() -> Self {
        Self {
            horizon: NIGHT_HORIZON_DEG,
        }
    }
}

impl NightWindowGate {
    pub fn new(horizon: f64) -> Self {
        Self { horizon }
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }
}

impl WindowGate for NightWindowGate {
    fn decide(&self, site: &Site, now: DateTime<Utc>) -> GateDecision {
        let range = site.time_range(now, self.horizon);

        match (range.time_to_sunset(), range.time_to_sunrise()) {
            (Some(to_sunset), Some(to_sunrise)) => {
                match decide_from_remaining(to_sunset, to_sunrise) {
                    GateDecision::Defer { wait, .. } => GateDecision::Defer {
                        wait,
                        until: range.next_sunset,
                    },
                    GateDecision::Process => GateDecision::Process,
                }
            }
            // Polar day/night or a window opening beyond the look-ahead:
            // fall back to where the Sun is right now.
            _ if site.solar_altitude(now) < self.horizon => GateDecision::Process,
            _ => GateDecision::Defer {
                wait: range
                    .time_to_sunset()
                    .unwrap_or_else(|| Duration::hours(LOOK_AHEAD_HOURS)),
                until: range.next_sunset,
            },
        }
    }
}

/// Gate that always processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl WindowGate for OpenGate {
    fn decide(&self, _site: &Site, _now: DateTime<Utc>) -> GateDecision {
        GateDecision::Process
    }
}

/// Render a wait as `HH hours MM minutes SS seconds`.
pub fn format_wait(wait: Duration) -> String {
    let total = wait.num_seconds().max(0);
    format!(
        "{:02} hours {:02} minutes {:02} seconds",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctio() -> Site {
        Site::new("ctio", "CTIO", -30.169166, -70.804, 2174.0, "America/Santiago").unwrap()
    }

    #[test]
    fn test_daytime_defers_until_sunset() {
        // 07:00 local (UTC-3), well after the -10 degree rising.
        let now = Utc.with_ymd_and_hms(2024, 12, 2, 10, 0, 0).unwrap();
        match NightWindowGate::default().decide(&ctio(), now) {
            GateDecision::Defer { wait, until } => {
                assert!(wait > Duration::hours(13), "wait was {}", wait);
                assert!(wait < Duration::hours(16), "wait was {}", wait);
                assert_eq!(until, Some(now + wait));
            }
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_night_processes() {
        let now = Utc.with_ymd_and_hms(2024, 12, 2, 4, 0, 0).unwrap();
        assert_eq!(
            NightWindowGate::default().decide(&ctio(), now),
            GateDecision::Process
        );
    }

    #[test]
    fn test_decision_is_deterministic() {
        let gate = NightWindowGate::default();
        let site = ctio();
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 27, 33).unwrap();
        assert_eq!(gate.decide(&site, now), gate.decide(&site, now));
    }

    #[test]
    fn test_equal_remaining_processes() {
        let d = Duration::hours(6);
        assert_eq!(decide_from_remaining(d, d), GateDecision::Process);
    }

    #[test]
    fn test_sunrise_first_processes() {
        assert_eq!(
            decide_from_remaining(Duration::hours(20), Duration::hours(3)),
            GateDecision::Process
        );
    }

    #[test]
    fn test_polar_day_defers() {
        let site = Site::new("alert", "Alert", 82.5, -62.3, 30.0, "America/Toronto").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
        assert!(!NightWindowGate::default().decide(&site, now).is_process());
    }

    #[test]
    fn test_polar_night_processes() {
        let site = Site::new("alert", "Alert", 82.5, -62.3, 30.0, "America/Toronto").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 12, 21, 17, 0, 0).unwrap();
        assert!(NightWindowGate::default().decide(&site, now).is_process());
    }

    #[test]
    fn test_format_wait() {
        let wait = Duration::seconds(3 * 3600 + 7 * 60 + 9);
        assert_eq!(format_wait(wait), "03 hours 07 minutes 09 seconds");
    }
}
