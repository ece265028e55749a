//! Hardware address pattern resolution
//!
//! Turns the textual value of a MAC-valued option (`-s`, `-d`) into an
//! address and a mask. Zero mask bits are "don't care"; an all-ones mask is
//! an exact match.
//!
//! Accepted forms:
//! - a pattern keyword from a [`KeywordTable`] (`Unicast`, `Multicast`,
//!   `Broadcast`, `BGA` by default)
//! - `xx:xx:xx:xx:xx:xx` (one or two hex digits per octet)
//! - `xx:xx:xx:xx:xx:xx/yy:yy:yy:yy:yy:yy`
//! - `xx:xx:xx:xx:xx:xx/N` with a prefix length `N` in `0..=48`
//!
//! # Example
//!
//! ```
//! use ebtc::core::mac::{resolve, MacPattern};
//!
//! let pattern = resolve("Multicast").unwrap();
//! assert_eq!(pattern, MacPattern::MULTICAST);
//!
//! let exact = resolve("00:11:22:33:44:55").unwrap();
//! assert!(exact.is_exact());
//! ```

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

pub const ETH_ALEN: usize = 6;

const EXACT_MASK: [u8; ETH_ALEN] = [0xff; ETH_ALEN];

/// A link-layer address with a wildcard mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacPattern {
    pub addr: [u8; ETH_ALEN],
    pub mask: [u8; ETH_ALEN],
}

impl MacPattern {
    /// Individual/group bit clear
    pub const UNICAST: Self = Self {
        addr: [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        mask: [0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
    };
    /// Individual/group bit set
    pub const MULTICAST: Self = Self {
        addr: [0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
        mask: [0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
    };
    pub const BROADCAST: Self = Self {
        addr: [0xff; ETH_ALEN],
        mask: EXACT_MASK,
    };
    /// 802.1D bridge group address (STP and friends)
    pub const BRIDGE_GROUP: Self = Self {
        addr: [0x01, 0x80, 0xc2, 0x00, 0x00, 0x00],
        mask: EXACT_MASK,
    };

    /// Exact-match pattern for a single address
    pub const fn exact(addr: [u8; ETH_ALEN]) -> Self {
        Self {
            addr,
            mask: EXACT_MASK,
        }
    }

    /// Builds a pattern, clearing address bits the mask ignores.
    pub fn new(addr: [u8; ETH_ALEN], mask: [u8; ETH_ALEN]) -> Self {
        let mut addr = addr;
        for (a, m) in addr.iter_mut().zip(mask) {
            *a &= m;
        }
        Self { addr, mask }
    }

    pub fn is_exact(&self) -> bool {
        self.mask == EXACT_MASK
    }

    pub fn addr_string(&self) -> String {
        format_mac(&self.addr)
    }

    pub fn mask_string(&self) -> String {
        format_mac(&self.mask)
    }
}

impl fmt::Display for MacPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "{}", format_mac(&self.addr))
        } else {
            write!(f, "{}/{}", format_mac(&self.addr), format_mac(&self.mask))
        }
    }
}

/// The four predefined patterns
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum PatternKind {
    #[strum(serialize = "Unicast")]
    Unicast,
    #[strum(serialize = "Multicast")]
    Multicast,
    #[strum(serialize = "Broadcast")]
    Broadcast,
    #[strum(serialize = "BGA")]
    #[serde(alias = "BGA")]
    BridgeGroup,
}

impl PatternKind {
    pub const fn pattern(self) -> MacPattern {
        match self {
            PatternKind::Unicast => MacPattern::UNICAST,
            PatternKind::Multicast => MacPattern::MULTICAST,
            PatternKind::Broadcast => MacPattern::BROADCAST,
            PatternKind::BridgeGroup => MacPattern::BRIDGE_GROUP,
        }
    }
}

/// Keyword spellings recognised as pattern shortcuts
///
/// The legacy front end compares case-insensitively; embedders that want a
/// different contract can switch to case-sensitive lookup or add aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    entries: Vec<(String, PatternKind)>,
    case_sensitive: bool,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::legacy()
    }
}

impl KeywordTable {
    /// The spellings the ebtables front end has always accepted.
    pub fn legacy() -> Self {
        Self {
            entries: vec![
                ("Unicast".to_string(), PatternKind::Unicast),
                ("Multicast".to_string(), PatternKind::Multicast),
                ("Broadcast".to_string(), PatternKind::Broadcast),
                ("BGA".to_string(), PatternKind::BridgeGroup),
            ],
            case_sensitive: false,
        }
    }

    /// A table with no keywords; only literals resolve.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            case_sensitive: false,
        }
    }

    pub fn with_alias(mut self, keyword: impl Into<String>, kind: PatternKind) -> Self {
        self.entries.push((keyword.into(), kind));
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn lookup(&self, token: &str) -> Option<PatternKind> {
        self.entries
            .iter()
            .find(|(keyword, _)| {
                if self.case_sensitive {
                    keyword == token
                } else {
                    keyword.eq_ignore_ascii_case(token)
                }
            })
            .map(|(_, kind)| *kind)
    }

    pub fn keywords(&self) -> impl Iterator<Item = (&str, PatternKind)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Resolves option values into [`MacPattern`]s using a keyword table
#[derive(Debug, Clone, Default)]
pub struct MacResolver {
    keywords: KeywordTable,
}

impl MacResolver {
    pub fn new(keywords: KeywordTable) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// Resolves a keyword or `addr[/mask]` literal.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if the address part is not a MAC literal
    /// - [`Error::InvalidMask`] if a mask is present but malformed
    pub fn resolve(&self, token: &str) -> Result<MacPattern> {
        if let Some(kind) = self.keywords.lookup(token) {
            trace!("{token} resolved as keyword {kind}");
            return Ok(kind.pattern());
        }

        let (addr_part, mask_part) = match token.split_once('/') {
            Some((addr, mask)) => (addr, Some(mask)),
            None => (token, None),
        };

        let addr = parse_mac(addr_part).ok_or_else(|| Error::InvalidAddress {
            token: token.to_string(),
        })?;

        let Some(mask_part) = mask_part else {
            return Ok(MacPattern::exact(addr));
        };

        let mask = parse_mask(mask_part).ok_or_else(|| Error::InvalidMask {
            token: token.to_string(),
        })?;

        Ok(MacPattern::new(addr, mask))
    }
}

/// Resolves a token with the legacy keyword table.
///
/// # Errors
///
/// See [`MacResolver::resolve`].
pub fn resolve(token: &str) -> Result<MacPattern> {
    MacResolver::default().resolve(token)
}

/// Parses `xx:xx:xx:xx:xx:xx`, one or two hex digits per octet.
pub fn parse_mac(s: &str) -> Option<[u8; ETH_ALEN]> {
    let mut out = [0u8; ETH_ALEN];
    let mut parts = s.split(':');

    for byte in &mut out {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn parse_mask(s: &str) -> Option<[u8; ETH_ALEN]> {
    if s.contains(':') {
        return parse_mac(s);
    }
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let bits: u32 = s.parse().ok()?;
    prefix_mask(bits)
}

/// Mask with the leading `bits` bits set; `None` above 48.
pub fn prefix_mask(bits: u32) -> Option<[u8; ETH_ALEN]> {
    if bits > 48 {
        return None;
    }
    let value: u64 = if bits == 0 {
        0
    } else {
        (!0u64 << (48 - bits)) & 0xffff_ffff_ffff
    };
    let bytes = value.to_be_bytes();
    let mut mask = [0u8; ETH_ALEN];
    mask.copy_from_slice(&bytes[2..]);
    Some(mask)
}

pub fn format_mac(bytes: &[u8; ETH_ALEN]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}
