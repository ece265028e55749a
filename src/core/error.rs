use crate::core::command_state::Phase;
use crate::core::extension::ExtensionKind;
use thiserror::Error;

/// Core error types for ebtc
///
/// Every variant carries the offending token or option so the caller can
/// build its own message. The library never prints these.
#[derive(Debug, Error)]
pub enum Error {
    /// Token is neither a pattern keyword nor a valid MAC literal
    #[error("Problem with the specified address: {token}")]
    InvalidAddress { token: String },

    /// Mask after `/` is not a MAC literal or a prefix length in 0..=48
    #[error("Problem with the specified mask: {token}")]
    InvalidMask { token: String },

    /// No extension of this kind is registered under the name
    #[error("Unknown {kind} extension: {name}")]
    UnknownExtension { kind: ExtensionKind, name: String },

    /// Option is not handled by the base entry or any loaded extension
    #[error("Unknown option: {option}")]
    UnknownOption { option: String },

    /// Option (or exclusive extension) used more than once in one rule
    #[error("Multiple use of same option not allowed: {option}")]
    DuplicateOption { option: String },

    /// Finalize found no target and no default policy applies
    #[error("No target set and no default target configured")]
    UnresolvedTarget,

    /// Option value failed extension-specific validation
    #[error("Invalid value '{value}' for {option}: {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    /// Extension requires an option that was never given
    #[error("{extension}: {option} must be specified")]
    MissingOption {
        extension: &'static str,
        option: &'static str,
    },

    #[error("Invalid interface name '{name}': {reason}")]
    InvalidInterface { name: String, reason: String },

    #[error("Problem with the specified protocol: {token}")]
    InvalidProtocol { token: String },

    /// Operation not allowed in the current command state phase
    #[error("Cannot {operation} a rule that is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    /// Malformed rule arguments
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_option(
        option: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            option: option.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn duplicate(option: impl Into<String>) -> Self {
        Self::DuplicateOption {
            option: option.into(),
        }
    }

    /// Returns a short suggestion for fixing the error, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidAddress { .. } => Some(
                "Use a MAC address like 00:11:22:33:44:55 or one of Unicast, Multicast, Broadcast, BGA",
            ),
            Self::InvalidMask { .. } => Some(
                "A mask is either a MAC address (ff:ff:ff:00:00:00) or a prefix length from 0 to 48",
            ),
            Self::UnknownExtension { .. } | Self::UnknownOption { .. } => {
                Some("Run `ebtc extensions` to list the available extensions and their options")
            }
            Self::DuplicateOption { .. } => Some("Each option may appear only once per rule"),
            Self::UnresolvedTarget => Some(
                "Add -j ACCEPT|DROP|CONTINUE|RETURN or set default_target in the configuration",
            ),
            Self::InvalidInterface { .. } => Some(
                "Interface names are at most 15 characters; a trailing '+' matches any suffix",
            ),
            Self::InvalidProtocol { .. } => Some(
                "Use a protocol name (IPv4, ARP, IPv6, RARP, 802_1Q), LENGTH, or a hex value >= 0x0600",
            ),
            Self::Io(_) | Self::Serialization(_) => {
                Some("Check the configuration file path and its JSON syntax")
            }
            Self::InvalidOption { .. }
            | Self::MissingOption { .. }
            | Self::InvalidState { .. }
            | Self::Parse(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
