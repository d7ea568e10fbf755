//! Clock and zone context handed to the detector and parsers
//!
//! Parsers never read the system clock or configuration directly; every
//! "already past, roll forward" decision is made against `now`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    /// Reference instant for relative dates
    pub now: DateTime<Utc>,
    /// Zone assumed when the email states a time without one
    pub default_tz: Tz,
}

impl ParseContext {
    /// Context for a live pipeline run
    pub fn new(default_tz: Tz) -> Self {
        Self {
            now: Utc::now(),
            default_tz,
        }
    }

    /// Context pinned to a fixed instant
    pub fn at(now: DateTime<Utc>, default_tz: Tz) -> Self {
        Self { now, default_tz }
    }

    /// Parse a configured IANA zone name, falling back to US Eastern
    pub fn zone_from_config(name: &str) -> Tz {
        match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(zone = name, "Unknown default timezone, using America/New_York");
                chrono_tz::America::New_York
            }
        }
    }
}

impl Default for ParseContext {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}
