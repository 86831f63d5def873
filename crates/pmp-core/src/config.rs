//! Runtime configuration, built once at startup and passed down explicitly.

use pmp_types::ParseError;
use std::env::VarError;

/// Switches that change how the core behaves for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InspectConfig {
    /// Report persistence hooks around every write.
    pub instrument: bool,
}

impl InspectConfig {
    pub const ENV_INSTRUMENT: &'static str = "PMEMPOOL_INSTRUMENT";

    /// Read the configuration from the environment. Unset variables keep
    /// their defaults.
    pub fn from_env() -> Result<Self, ParseError> {
        Ok(Self {
            instrument: env_bool(Self::ENV_INSTRUMENT, false)?,
        })
    }

    /// Force instrumentation on; `false` leaves the current value alone.
    #[must_use]
    pub const fn with_instrument(mut self, enabled: bool) -> Self {
        if enabled {
            self.instrument = true;
        }
        self
    }
}

/// Accepts `1/0`, `true/false`, `yes/no` and `on/off`, case-insensitively.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
    {
        Some(true)
    } else if value == "0"
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("no")
        || value.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        None
    }
}

pub fn env_bool(key: &'static str, default: bool) -> Result<bool, ParseError> {
    match std::env::var(key) {
        Ok(value) => parse_bool(&value).ok_or(ParseError::InvalidText { what: key, input: value }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(raw)) => Err(ParseError::InvalidText {
            what: key,
            input: raw.to_string_lossy().into_owned(),
        }),
    }
}
