//! Built-in matches, watchers, and targets
//!
//! Each module pairs a stateless [`Extension`] descriptor with the scratch
//! data one attached instance parses into.

use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionRegistry, OptionSpec};
use std::sync::Arc;

pub mod ip;
pub mod limit;
pub mod log;
pub mod mark;
pub mod pkttype;
pub mod vlan;

/// Registers every built-in extension.
pub fn register_builtin(registry: &mut ExtensionRegistry) {
    let builtin: [Arc<dyn Extension>; 8] = [
        Arc::new(ip::IpMatch),
        Arc::new(vlan::VlanMatch),
        Arc::new(mark::MarkMatch),
        Arc::new(pkttype::PktTypeMatch),
        Arc::new(limit::LimitMatch),
        Arc::new(log::LogWatcher),
        Arc::new(log::NflogWatcher),
        Arc::new(mark::MarkTarget),
    ];
    for extension in builtin {
        registry.register(extension);
    }
}

/// The argument of an option that takes one.
pub(crate) fn required_value<'a>(option: &OptionSpec, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| Error::Parse(format!("{} requires an argument", option.name)))
}

/// Maps a validator's reason into [`Error::InvalidOption`].
pub(crate) fn invalid(option: &OptionSpec, value: &str) -> impl FnOnce(String) -> Error {
    let option = option.name;
    let value = value.to_string();
    move |reason| Error::invalid_option(option, value, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extension::ExtensionKind;

    #[test]
    fn test_builtin_names_and_kinds() {
        let mut registry = ExtensionRegistry::new();
        register_builtin(&mut registry);
        assert_eq!(registry.len(), 8);
        for (kind, name) in [
            (ExtensionKind::Match, "ip"),
            (ExtensionKind::Match, "vlan"),
            (ExtensionKind::Match, "mark_m"),
            (ExtensionKind::Match, "pkttype"),
            (ExtensionKind::Match, "limit"),
            (ExtensionKind::Watcher, "log"),
            (ExtensionKind::Watcher, "nflog"),
            (ExtensionKind::Target, "mark"),
        ] {
            assert!(registry.get(kind, name).is_some(), "{kind} {name}");
        }
    }

    #[test]
    fn test_match_and_watcher_options_are_unique() {
        let mut registry = ExtensionRegistry::new();
        register_builtin(&mut registry);
        let mut seen = std::collections::HashSet::new();
        for ext in registry.iter().filter(|e| e.kind() != ExtensionKind::Target) {
            for option in ext.options() {
                assert!(seen.insert(option.name), "{} claimed twice", option.name);
                assert!(
                    !crate::core::entry::Entry::is_base_option(option.name),
                    "{} shadows a base option",
                    option.name
                );
            }
        }
    }

    #[test]
    fn test_every_builtin_has_help() {
        let mut registry = ExtensionRegistry::new();
        register_builtin(&mut registry);
        assert!(registry.iter().all(|e| !e.help().is_empty()));
    }
}
