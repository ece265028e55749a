//! Rule-under-construction state
//!
//! A [`CommandState`] accumulates one rule while its options are parsed:
//! the base [`Entry`], the ordered match and watcher instances, and the
//! target. It moves through [`Phase::Empty`] → [`Phase::Accumulating`] →
//! [`Phase::Finalized`] → [`Phase::Released`]; the error path may jump
//! straight to `Released` from any earlier phase.
//!
//! Cleanup hands every instance's scratch data back to its extension in
//! reverse attachment order, then releases the target. It is idempotent and
//! also runs on drop, so a state abandoned after a parse error never leaks.
//!
//! # Example
//!
//! ```
//! use ebtc::core::command_state::{CommandState, Phase};
//! use ebtc::core::extension::load_extensions;
//! use ebtc::core::verdict::Verdict;
//!
//! let mut cs = CommandState::new(load_extensions());
//! cs.add_match_by_name("limit").unwrap();
//! cs.finalize(Some(Verdict::Continue)).unwrap();
//! assert_eq!(cs.verdict(), Some(Verdict::Continue));
//! cs.cleanup();
//! assert_eq!(cs.phase(), Phase::Released);
//! ```

use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionInstance, ExtensionKind, ExtensionRegistry};
use crate::core::mac::MacResolver;
use crate::core::verdict::{Verdict, unpack_verdict};
use std::sync::Arc;
use tracing::debug;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter, strum::AsRefStr,
)]
pub enum Phase {
    #[strum(serialize = "empty")]
    Empty,
    #[strum(serialize = "accumulating")]
    Accumulating,
    #[strum(serialize = "finalized")]
    Finalized,
    #[strum(serialize = "released")]
    Released,
}

/// What the rule does once all matches succeed
#[derive(Debug)]
pub enum Target {
    Standard(Verdict),
    Extension(ExtensionInstance),
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Standard(verdict) => verdict.as_str(),
            Target::Extension(instance) => instance.name(),
        }
    }
}

#[derive(Debug)]
pub struct CommandState<'r> {
    registry: &'r ExtensionRegistry,
    entry: Entry,
    matches: Vec<ExtensionInstance>,
    watchers: Vec<ExtensionInstance>,
    target: Option<Target>,
    phase: Phase,
    next_sequence: usize,
}

impl<'r> CommandState<'r> {
    pub fn new(registry: &'r ExtensionRegistry) -> Self {
        Self {
            registry,
            entry: Entry::new(),
            matches: Vec::new(),
            watchers: Vec::new(),
            target: None,
            phase: Phase::Empty,
            next_sequence: 0,
        }
    }

    pub fn registry(&self) -> &'r ExtensionRegistry {
        self.registry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Matches in attachment order
    pub fn matches(&self) -> &[ExtensionInstance] {
        &self.matches
    }

    /// Watchers in attachment order
    pub fn watchers(&self) -> &[ExtensionInstance] {
        &self.watchers
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// The verdict the rule ends with: the standard target, or the verdict a
    /// target extension packed into its info word.
    pub fn verdict(&self) -> Option<Verdict> {
        match self.target.as_ref()? {
            Target::Standard(verdict) => Some(*verdict),
            Target::Extension(instance) => instance.info_word().and_then(unpack_verdict),
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        match self.phase {
            Phase::Empty | Phase::Accumulating => Ok(()),
            phase => Err(Error::InvalidState { operation, phase }),
        }
    }

    /// Parses a base (non-extension) option into the entry.
    ///
    /// # Errors
    ///
    /// See [`Entry::parse_option`]; also [`Error::InvalidState`] once the
    /// rule is finalized or released.
    pub fn parse_entry_option(
        &mut self,
        option: &str,
        value: &str,
        invert: bool,
        resolver: &MacResolver,
    ) -> Result<()> {
        self.ensure_open("set options on")?;
        self.entry.parse_option(option, value, invert, resolver)
    }

    /// Appends a match instance.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownExtension`] if `extension` is not a match
    /// - [`Error::DuplicateOption`] if it is exclusive and already attached
    /// - [`Error::InvalidState`] after finalize or cleanup
    pub fn add_match(&mut self, extension: Arc<dyn Extension>) -> Result<&mut ExtensionInstance> {
        self.attach(ExtensionKind::Match, extension)
    }

    /// Appends a watcher instance. Errors as for [`Self::add_match`].
    pub fn add_watcher(
        &mut self,
        extension: Arc<dyn Extension>,
    ) -> Result<&mut ExtensionInstance> {
        self.attach(ExtensionKind::Watcher, extension)
    }

    pub fn add_match_by_name(&mut self, name: &str) -> Result<&mut ExtensionInstance> {
        let extension = self.registry.require(ExtensionKind::Match, name)?;
        self.add_match(extension)
    }

    pub fn add_watcher_by_name(&mut self, name: &str) -> Result<&mut ExtensionInstance> {
        let extension = self.registry.require(ExtensionKind::Watcher, name)?;
        self.add_watcher(extension)
    }

    /// Returns the instance of `extension` already attached, attaching it
    /// first if needed. Used when options arrive one by one.
    pub fn instance_for(
        &mut self,
        extension: Arc<dyn Extension>,
    ) -> Result<&mut ExtensionInstance> {
        let kind = extension.kind();
        let existing = self
            .list(kind)
            .and_then(|list| list.iter().position(|i| i.name() == extension.name()));

        match (existing, kind) {
            (Some(index), ExtensionKind::Match) => Ok(&mut self.matches[index]),
            (Some(index), ExtensionKind::Watcher) => Ok(&mut self.watchers[index]),
            _ => self.attach(kind, extension),
        }
    }

    fn list(&self, kind: ExtensionKind) -> Option<&Vec<ExtensionInstance>> {
        match kind {
            ExtensionKind::Match => Some(&self.matches),
            ExtensionKind::Watcher => Some(&self.watchers),
            ExtensionKind::Target => None,
        }
    }

    fn attach(
        &mut self,
        kind: ExtensionKind,
        extension: Arc<dyn Extension>,
    ) -> Result<&mut ExtensionInstance> {
        self.ensure_open(match kind {
            ExtensionKind::Match => "attach a match to",
            ExtensionKind::Watcher => "attach a watcher to",
            ExtensionKind::Target => "attach a target to",
        })?;

        let unknown = || Error::UnknownExtension {
            kind,
            name: extension.name().to_string(),
        };
        // Targets only enter through set_target
        let list = match kind {
            ExtensionKind::Match => &mut self.matches,
            ExtensionKind::Watcher => &mut self.watchers,
            ExtensionKind::Target => return Err(unknown()),
        };
        if extension.kind() != kind {
            return Err(unknown());
        }
        if extension.exclusive() && list.iter().any(|i| i.name() == extension.name()) {
            return Err(Error::duplicate(extension.name()));
        }

        let instance = ExtensionInstance::new(extension, self.next_sequence);
        self.next_sequence += 1;
        self.phase = Phase::Accumulating;
        debug!("Attached {} {}", kind, instance.name());

        list.push(instance);
        let index = list.len() - 1;
        Ok(&mut list[index])
    }

    /// Sets the target from a `-j` argument: a standard verdict name, or the
    /// name of a target extension.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateOption`] if a target is already set
    /// - [`Error::UnknownExtension`] if the name is neither
    /// - [`Error::InvalidState`] after finalize or cleanup
    pub fn set_target(&mut self, name: &str) -> Result<()> {
        self.ensure_open("set the target of")?;
        if self.target.is_some() {
            return Err(Error::duplicate("-j"));
        }

        let target = match Verdict::from_name(name) {
            Some(verdict) => Target::Standard(verdict),
            None => {
                let extension = self.registry.require(ExtensionKind::Target, name)?;
                let instance = ExtensionInstance::new(extension, self.next_sequence);
                self.next_sequence += 1;
                Target::Extension(instance)
            }
        };
        debug!("Target set to {}", target.name());
        self.target = Some(target);
        Ok(())
    }

    /// The target extension instance, for routing its options.
    pub fn target_instance_mut(&mut self) -> Option<&mut ExtensionInstance> {
        match self.target.as_mut()? {
            Target::Extension(instance) => Some(instance),
            Target::Standard(_) => None,
        }
    }

    /// Runs every instance's final check and applies `default_target` when
    /// no target was chosen. After success the target is always set.
    ///
    /// # Errors
    ///
    /// - [`Error::UnresolvedTarget`] if no target is set and
    ///   `default_target` is `None`
    /// - [`Error::InvalidState`] if already finalized or released
    /// - any extension's final-check error
    pub fn finalize(&mut self, default_target: Option<Verdict>) -> Result<()> {
        self.ensure_open("finalize")?;

        for instance in self.matches.iter().chain(&self.watchers) {
            instance.final_check(&self.entry)?;
        }
        if let Some(Target::Extension(instance)) = &self.target {
            instance.final_check(&self.entry)?;
        }

        if self.target.is_none() {
            let verdict = default_target.ok_or(Error::UnresolvedTarget)?;
            debug!("No target given, applying default {verdict}");
            self.target = Some(Target::Standard(verdict));
        }

        self.phase = Phase::Finalized;
        Ok(())
    }

    /// Releases all scratch data and empties the state.
    ///
    /// Matches and watchers are released newest first, then the target.
    /// Calling this again (or dropping the state afterwards) does nothing.
    pub fn cleanup(&mut self) {
        if self.phase == Phase::Released {
            return;
        }

        let mut instances: Vec<ExtensionInstance> = self
            .matches
            .drain(..)
            .chain(self.watchers.drain(..))
            .collect();
        instances.sort_by_key(|i| std::cmp::Reverse(i.sequence()));
        for instance in &mut instances {
            instance.release();
        }

        if let Some(Target::Extension(mut instance)) = self.target.take() {
            instance.release();
        }

        debug!("Released command state ({} instances)", instances.len());
        self.phase = Phase::Released;
    }
}

impl Drop for CommandState<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
