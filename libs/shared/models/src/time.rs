//! Clinic-local time-of-day values travel as `"HH:MM"` strings.

use std::sync::OnceLock;

use chrono::NaiveTime;
use regex::Regex;

pub const HHMM_FORMAT: &str = "%H:%M";

/// Strictly parses a zero-padded 24h `HH:MM` string.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    if !hhmm_regex().is_match(value) {
        return None;
    }
    NaiveTime::parse_from_str(value, HHMM_FORMAT).ok()
}

pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format(HHMM_FORMAT).to_string()
}

fn hhmm_regex() -> &'static Regex {
    static HHMM: OnceLock<Regex> = OnceLock::new();
    HHMM.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid HH:MM pattern"))
}

/// `#[serde(with = "shared_models::time::hhmm")]` for `NaiveTime` fields.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_hhmm(time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        // Postgres `time` columns come back as HH:MM:SS
        let trimmed = if raw.len() == 8 && raw.ends_with(":00") { &raw[..5] } else { raw.as_str() };
        super::parse_hhmm(trimmed)
            .ok_or_else(|| D::Error::custom(format!("invalid HH:MM time '{}'", raw)))
    }
}
