//! `limit` match: token-bucket rate limiting
//!
//! Unlike the other matches, `limit` may be attached more than once per
//! rule; each occurrence adds its own bucket.

use super::{invalid, required_value};
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionData, ExtensionKind, OptionSpec};
use crate::validators;
use serde_json::{Value, json};
use tracing::warn;

const DEFAULT_RATE: u32 = 3;
const DEFAULT_UNIT: TimeUnit = TimeUnit::Hour;
const DEFAULT_BURST: u32 = 5;

const LIMIT: u32 = 0x01;
const LIMIT_BURST: u32 = 0x02;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("--limit", LIMIT),
    OptionSpec::with_arg("--limit-burst", LIMIT_BURST),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum TimeUnit {
    #[strum(serialize = "second")]
    Second,
    #[strum(serialize = "minute")]
    Minute,
    #[strum(serialize = "hour")]
    Hour,
    #[strum(serialize = "day")]
    Day,
}

impl TimeUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        }
    }

    /// Accepts any non-empty prefix of the unit name (`s`, `sec`, `second`).
    pub fn from_prefix(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let s = s.to_ascii_lowercase();
        [TimeUnit::Second, TimeUnit::Minute, TimeUnit::Hour, TimeUnit::Day]
            .into_iter()
            .find(|unit| unit.as_str().starts_with(&s))
    }
}

/// Parses `rate[/unit]`; the unit defaults to seconds.
pub fn parse_rate(value: &str) -> std::result::Result<(u32, TimeUnit), String> {
    let (count, unit) = match value.split_once('/') {
        Some((count, unit)) => (
            count,
            TimeUnit::from_prefix(unit).ok_or_else(|| format!("unknown time unit '{unit}'"))?,
        ),
        None => (value, TimeUnit::Second),
    };
    let count = validators::parse_unsigned::<u32>(count)
        .ok_or_else(|| format!("'{count}' is not a valid rate"))?;
    Ok((count, unit))
}

#[derive(Debug)]
pub struct LimitMatch;

impl Extension for LimitMatch {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Match
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn help(&self) -> &'static str {
        "Rate limit (default 3/hour, burst 5); may be repeated"
    }

    fn exclusive(&self) -> bool {
        false
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(LimitInfo::default())
    }
}

#[derive(Debug)]
pub struct LimitInfo {
    rate: u32,
    unit: TimeUnit,
    burst: u32,
}

impl Default for LimitInfo {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            unit: DEFAULT_UNIT,
            burst: DEFAULT_BURST,
        }
    }
}

impl ExtensionData for LimitInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        let value = required_value(option, value)?;
        if invert {
            return Err(Error::invalid_option(option.name, value, "cannot be inverted"));
        }
        match option.bit {
            LIMIT => {
                let (rate, unit) = parse_rate(value).map_err(invalid(option, value))?;
                if let Some(warning) =
                    validators::validate_rate_limit(rate, unit).map_err(invalid(option, value))?
                {
                    warn!("{}: {warning}", option.name);
                }
                self.rate = rate;
                self.unit = unit;
            }
            LIMIT_BURST => {
                self.burst = validators::parse_u32(value)
                    .ok()
                    .filter(|burst| *burst > 0)
                    .ok_or_else(|| {
                        Error::invalid_option(option.name, value, "burst must be a positive number")
                    })?;
            }
            _ => {
                return Err(Error::UnknownOption {
                    option: option.name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn to_nft(&self) -> Vec<Value> {
        vec![json!({
            "limit": {
                "rate": self.rate,
                "per": self.unit.as_str(),
                "burst": self.burst
            }
        })]
    }
}
