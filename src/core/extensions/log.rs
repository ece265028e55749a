//! Logging watchers: `log` (kernel log) and `nflog` (netlink group)

use super::{invalid, required_value};
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionData, ExtensionKind, OptionSpec};
use crate::validators;
use serde_json::{Map, Value, json};
use std::str::FromStr;

/// Longest `--log-prefix`, leaving room for the terminating NUL
pub const LOG_PREFIX_MAX: usize = 29;
pub const NFLOG_PREFIX_MAX: usize = 63;
const NFLOG_DEFAULT_GROUP: u16 = 1;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum LogLevel {
    #[strum(serialize = "emerg")]
    Emerg,
    #[strum(serialize = "alert")]
    Alert,
    #[strum(serialize = "crit")]
    Crit,
    #[strum(serialize = "error", serialize = "err")]
    Error,
    #[strum(serialize = "warning", serialize = "warn")]
    Warning,
    #[strum(serialize = "notice")]
    Notice,
    #[default]
    #[strum(serialize = "info")]
    Info,
    #[strum(serialize = "debug")]
    Debug,
}

impl LogLevel {
    const BY_SYSLOG: [LogLevel; 8] = [
        LogLevel::Emerg,
        LogLevel::Alert,
        LogLevel::Crit,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    /// Name or syslog number 0-7.
    pub fn parse(value: &str) -> Option<Self> {
        Self::from_str(value).ok().or_else(|| {
            let number = validators::parse_unsigned::<usize>(value)?;
            Self::BY_SYSLOG.get(number).copied()
        })
    }

    pub const fn nft_name(self) -> &'static str {
        match self {
            LogLevel::Emerg => "emerg",
            LogLevel::Alert => "alert",
            LogLevel::Crit => "crit",
            LogLevel::Error => "err",
            LogLevel::Warning => "warn",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// log
// ═══════════════════════════════════════════════════════════════════════════

const LOG: u32 = 0x01;
const LOG_LEVEL: u32 = 0x02;
const LOG_PREFIX: u32 = 0x04;

const LOG_OPTIONS: &[OptionSpec] = &[
    OptionSpec::flag("--log", LOG),
    OptionSpec::with_arg("--log-level", LOG_LEVEL),
    OptionSpec::with_arg("--log-prefix", LOG_PREFIX),
];

#[derive(Debug)]
pub struct LogWatcher;

impl Extension for LogWatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Watcher
    }

    fn options(&self) -> &'static [OptionSpec] {
        LOG_OPTIONS
    }

    fn help(&self) -> &'static str {
        "Log matching frames to the kernel log"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(LogInfo::default())
    }
}

#[derive(Debug, Default)]
pub struct LogInfo {
    level: LogLevel,
    prefix: String,
}

fn no_invert(option: &OptionSpec, value: &str, invert: bool) -> Result<()> {
    if invert {
        Err(Error::invalid_option(option.name, value, "cannot be inverted"))
    } else {
        Ok(())
    }
}

impl ExtensionData for LogInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        match option.bit {
            LOG => no_invert(option, "", invert),
            LOG_LEVEL => {
                let value = required_value(option, value)?;
                no_invert(option, value, invert)?;
                self.level = LogLevel::parse(value).ok_or_else(|| {
                    Error::invalid_option(option.name, value, "unknown log level")
                })?;
                Ok(())
            }
            LOG_PREFIX => {
                let value = required_value(option, value)?;
                no_invert(option, value, invert)?;
                self.prefix = validators::validate_prefix(value, LOG_PREFIX_MAX)
                    .map_err(invalid(option, value))?;
                Ok(())
            }
            _ => Err(Error::UnknownOption {
                option: option.name.to_string(),
            }),
        }
    }

    fn to_nft(&self) -> Vec<Value> {
        let mut log = Map::new();
        if !self.prefix.is_empty() {
            log.insert("prefix".to_string(), json!(self.prefix));
        }
        log.insert("level".to_string(), json!(self.level.nft_name()));
        vec![json!({ "log": log })]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// nflog
// ═══════════════════════════════════════════════════════════════════════════

const NFLOG_GROUP: u32 = 0x01;
const NFLOG_PREFIX: u32 = 0x02;

const NFLOG_OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("--nflog-group", NFLOG_GROUP),
    OptionSpec::with_arg("--nflog-prefix", NFLOG_PREFIX),
];

#[derive(Debug)]
pub struct NflogWatcher;

impl Extension for NflogWatcher {
    fn name(&self) -> &'static str {
        "nflog"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Watcher
    }

    fn options(&self) -> &'static [OptionSpec] {
        NFLOG_OPTIONS
    }

    fn help(&self) -> &'static str {
        "Send matching frames to an nflog netlink group (default 1)"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(NflogInfo::default())
    }
}

#[derive(Debug)]
pub struct NflogInfo {
    group: u16,
    prefix: String,
}

impl Default for NflogInfo {
    fn default() -> Self {
        Self {
            group: NFLOG_DEFAULT_GROUP,
            prefix: String::new(),
        }
    }
}

impl ExtensionData for NflogInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        let value = required_value(option, value)?;
        no_invert(option, value, invert)?;
        match option.bit {
            NFLOG_GROUP => {
                self.group = validators::parse_unsigned::<u16>(value).ok_or_else(|| {
                    Error::invalid_option(option.name, value, "group must be 0-65535")
                })?;
            }
            NFLOG_PREFIX => {
                self.prefix = validators::validate_prefix(value, NFLOG_PREFIX_MAX)
                    .map_err(invalid(option, value))?;
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
        let mut log = Map::new();
        log.insert("group".to_string(), json!(self.group));
        if !self.prefix.is_empty() {
            log.insert("prefix".to_string(), json!(self.prefix));
        }
        vec![json!({ "log": log })]
    }
}
