//! Extension capability interface and registry
//!
//! An [`Extension`] describes one match, watcher, or target: its name, the
//! options it consumes, and how to allocate per-rule scratch data. The
//! scratch data ([`ExtensionData`]) parses option values and produces the
//! nftables statements for the rule.
//!
//! The registry is populated once per process by [`load_extensions`] and is
//! read-only afterwards. Tests and embedders can build private registries
//! with [`ExtensionRegistry::new`] and [`ExtensionRegistry::register`].

use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum ExtensionKind {
    #[strum(serialize = "match")]
    Match,
    #[strum(serialize = "watcher")]
    Watcher,
    #[strum(serialize = "target")]
    Target,
}

/// One command-line option understood by an extension
///
/// Aliases share a `bit`, so using both spellings counts as a repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub has_arg: bool,
    pub bit: u32,
}

impl OptionSpec {
    pub const fn with_arg(name: &'static str, bit: u32) -> Self {
        Self {
            name,
            has_arg: true,
            bit,
        }
    }

    pub const fn flag(name: &'static str, bit: u32) -> Self {
        Self {
            name,
            has_arg: false,
            bit,
        }
    }
}

/// Tracks which options of one extension instance (or the base entry) have
/// been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionFlags(u32);

impl OptionFlags {
    /// Marks `bit` as used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateOption`] if `bit` was already set.
    pub fn check(&mut self, bit: u32, option: &str) -> Result<()> {
        if self.0 & bit != 0 {
            return Err(Error::duplicate(option));
        }
        self.0 |= bit;
        Ok(())
    }

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Registry entry for one match, watcher, or target
pub trait Extension: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ExtensionKind;

    fn options(&self) -> &'static [OptionSpec];

    /// One-line description for `ebtc extensions`
    fn help(&self) -> &'static str {
        ""
    }

    /// Whether the extension may be attached at most once per rule.
    fn exclusive(&self) -> bool {
        true
    }

    /// Allocates the scratch data for one attached instance.
    fn allocate(&self) -> Box<dyn ExtensionData>;

    /// Releases scratch data at cleanup time.
    fn release(&self, data: Box<dyn ExtensionData>) {
        drop(data);
    }
}

/// Per-instance scratch data owned by the command state
pub trait ExtensionData: fmt::Debug + Send {
    /// Consumes one option. `value` is `Some` exactly when the option takes
    /// an argument.
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()>;

    /// Cross-checks the instance against the base entry once all options
    /// are in.
    fn final_check(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// nftables JSON statements for this instance, in evaluation order.
    fn to_nft(&self) -> Vec<Value>;

    /// Info word with a packed verdict, for targets that carry one.
    fn info_word(&self) -> Option<u32> {
        None
    }
}

/// An extension attached to a command state
#[derive(Debug)]
pub struct ExtensionInstance {
    extension: Arc<dyn Extension>,
    data: Option<Box<dyn ExtensionData>>,
    flags: OptionFlags,
    sequence: usize,
}

impl ExtensionInstance {
    pub(crate) fn new(extension: Arc<dyn Extension>, sequence: usize) -> Self {
        let data = extension.allocate();
        Self {
            extension,
            data: Some(data),
            flags: OptionFlags::default(),
            sequence,
        }
    }

    pub fn name(&self) -> &'static str {
        self.extension.name()
    }

    pub fn kind(&self) -> ExtensionKind {
        self.extension.kind()
    }

    pub fn extension(&self) -> &Arc<dyn Extension> {
        &self.extension
    }

    /// Attachment order across matches and watchers of the same rule
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn flags(&self) -> OptionFlags {
        self.flags
    }

    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }

    pub fn handles(&self, option: &str) -> bool {
        self.extension.options().iter().any(|o| o.name == option)
    }

    /// Feeds one option to the instance.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOption`] if the extension has no such option
    /// - [`Error::DuplicateOption`] if the option was already used
    /// - whatever the extension's parser reports
    pub fn parse_option(&mut self, option: &str, value: Option<&str>, invert: bool) -> Result<()> {
        let spec = self
            .extension
            .options()
            .iter()
            .find(|o| o.name == option)
            .ok_or_else(|| Error::UnknownOption {
                option: option.to_string(),
            })?;

        let data = self.data.as_mut().ok_or(Error::InvalidState {
            operation: "parse options for",
            phase: crate::core::command_state::Phase::Released,
        })?;

        self.flags.check(spec.bit, option)?;
        data.parse(spec, value, invert)
    }

    pub(crate) fn final_check(&self, entry: &Entry) -> Result<()> {
        match &self.data {
            Some(data) => data.final_check(entry),
            None => Ok(()),
        }
    }

    pub fn to_nft(&self) -> Vec<Value> {
        self.data.as_ref().map(|d| d.to_nft()).unwrap_or_default()
    }

    pub fn info_word(&self) -> Option<u32> {
        self.data.as_ref().and_then(|d| d.info_word())
    }

    /// Hands the scratch data back to the extension. Safe to call twice.
    pub(crate) fn release(&mut self) {
        if let Some(data) = self.data.take() {
            debug!("Releasing {} {}", self.kind(), self.name());
            self.extension.release(data);
        }
    }
}

/// Name → extension lookup, one namespace per kind
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    extensions: BTreeMap<ExtensionKind, BTreeMap<&'static str, Arc<dyn Extension>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extension, replacing any earlier one of the same kind and
    /// name.
    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        let (kind, name) = (extension.kind(), extension.name());
        if self
            .extensions
            .entry(kind)
            .or_default()
            .insert(name, extension)
            .is_some()
        {
            debug!("Replaced {kind} extension {name}");
        }
    }

    pub fn get(&self, kind: ExtensionKind, name: &str) -> Option<&Arc<dyn Extension>> {
        self.extensions.get(&kind)?.get(name)
    }

    /// Looks up an extension by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownExtension`] if nothing is registered.
    pub fn require(&self, kind: ExtensionKind, name: &str) -> Result<Arc<dyn Extension>> {
        self.get(kind, name)
            .cloned()
            .ok_or_else(|| Error::UnknownExtension {
                kind,
                name: name.to_string(),
            })
    }

    /// The match or watcher that owns `option`. Target options are only
    /// routed to the rule's chosen target, so they are not searched here.
    pub fn for_option(&self, option: &str) -> Option<&Arc<dyn Extension>> {
        [ExtensionKind::Match, ExtensionKind::Watcher]
            .iter()
            .filter_map(|kind| self.extensions.get(kind))
            .flat_map(BTreeMap::values)
            .find(|ext| ext.options().iter().any(|o| o.name == option))
    }

    /// Every extension, grouped by kind and then sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.extensions.values().flat_map(BTreeMap::values)
    }

    pub fn len(&self) -> usize {
        self.extensions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static REGISTRY: OnceLock<ExtensionRegistry> = OnceLock::new();

/// Populates the process-wide registry with the built-in extensions.
///
/// Runs the registration exactly once; later calls return the same registry.
pub fn load_extensions() -> &'static ExtensionRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = ExtensionRegistry::new();
        crate::core::extensions::register_builtin(&mut registry);
        debug!("Loaded {} extensions", registry.len());
        registry
    })
}
