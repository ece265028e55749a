//! ebtc - ebtables compatibility layer for nftables bridge filtering
//!
//! Parses legacy ebtables rule arguments and renders them as nftables
//! `bridge` family rules.
//!
//! # Architecture
//!
//! - [`core`] - Address resolution, verdict codec, extensions, and the
//!   per-rule command state
//! - [`parse`] - ebtables argument vectors into finalized rules
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories, line splitting)
//!
//! # Example
//!
//! ```
//! use ebtc::parse::RuleParser;
//!
//! let parser = RuleParser::default();
//! let rule = parser.parse_line("-A FORWARD -s Multicast -j DROP").unwrap();
//! assert_eq!(
//!     rule.to_nft_text(),
//!     "add rule bridge filter FORWARD ether saddr & 01:00:00:00:00:00 01:00:00:00:00:00 counter drop"
//! );
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod parse;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::command_state::{CommandState, Phase};
pub use core::error::{Error, Result};
pub use core::extension::load_extensions;
pub use core::mac::{MacPattern, resolve};
pub use core::verdict::{Verdict, pack_verdict, unpack_verdict};
