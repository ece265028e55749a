//! Core translation logic
//!
//! - [`mac`]: MAC address and keyword pattern resolution
//! - [`verdict`]: Standard verdicts and their integer encoding
//! - [`entry`]: Base (non-extension) rule criteria
//! - [`extension`]: Extension capability trait and registry
//! - [`extensions`]: Built-in matches, watchers, and targets
//! - [`command_state`]: One rule under construction, with ordered cleanup
//! - [`nft_json`]: nftables JSON and text rendering
//! - [`error`]: Error types for translation

pub mod command_state;
pub mod entry;
pub mod error;
pub mod extension;
pub mod extensions;
pub mod mac;
pub mod nft_json;
pub mod verdict;

#[cfg(test)]
pub mod test_helpers;
