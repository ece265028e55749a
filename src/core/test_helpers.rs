//! Shared test utilities for core module tests
//!
//! Provides a configurable fake extension so command-state tests can count
//! releases and observe their order. This module is only compiled in test
//! mode.

use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{
    Extension, ExtensionData, ExtensionKind, ExtensionRegistry, OptionSpec,
};
use crate::core::verdict::{Verdict, pack_verdict};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Value that makes [`TestData::final_check`] fail
pub const FAIL_FINAL: &str = "fail-final";

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("--test-value", 0x01),
    OptionSpec::flag("--test-flag", 0x02),
];

pub type ReleaseLog = Arc<Mutex<Vec<&'static str>>>;

/// Fake extension recording every release
#[derive(Debug, Clone)]
pub struct TestExtension {
    name: &'static str,
    kind: ExtensionKind,
    exclusive: bool,
    releases: Arc<AtomicUsize>,
    log: ReleaseLog,
}

impl TestExtension {
    pub fn new(name: &'static str, kind: ExtensionKind) -> Self {
        Self {
            name,
            kind,
            exclusive: true,
            releases: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn non_exclusive(mut self) -> Self {
        self.exclusive = false;
        self
    }

    /// Shares a release log with other test extensions, so the combined
    /// release order can be checked.
    pub fn with_release_log(mut self, log: ReleaseLog) -> Self {
        self.log = log;
        self
    }

    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    pub fn release_log(&self) -> ReleaseLog {
        Arc::clone(&self.log)
    }

    pub fn into_arc(self) -> Arc<dyn Extension> {
        Arc::new(self)
    }
}

impl Extension for TestExtension {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ExtensionKind {
        self.kind
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn help(&self) -> &'static str {
        "test extension"
    }

    fn exclusive(&self) -> bool {
        self.exclusive
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(TestData {
            name: self.name,
            value: None,
            flag: false,
        })
    }

    fn release(&self, data: Box<dyn ExtensionData>) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.name);
        drop(data);
    }
}

#[derive(Debug)]
pub struct TestData {
    name: &'static str,
    value: Option<String>,
    flag: bool,
}

impl ExtensionData for TestData {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, _invert: bool) -> Result<()> {
        match option.name {
            "--test-value" => self.value = value.map(str::to_string),
            _ => self.flag = true,
        }
        Ok(())
    }

    fn final_check(&self, _entry: &Entry) -> Result<()> {
        if self.value.as_deref() == Some(FAIL_FINAL) {
            return Err(Error::MissingOption {
                extension: "test",
                option: "--test-flag",
            });
        }
        Ok(())
    }

    fn to_nft(&self) -> Vec<Value> {
        vec![json!({ "test": { "name": self.name, "value": self.value, "flag": self.flag } })]
    }

    /// A `--test-value` naming a verdict is packed like a real target would.
    fn info_word(&self) -> Option<u32> {
        let verdict = Verdict::from_name(self.value.as_deref()?)?;
        Some(pack_verdict(verdict, 0))
    }
}

/// Registry with one extension of each shape:
/// `exclusive` and `shared` matches, `watch` watcher, `tgt` target.
pub fn test_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    registry.register(TestExtension::new("exclusive", ExtensionKind::Match).into_arc());
    registry.register(
        TestExtension::new("shared", ExtensionKind::Match)
            .non_exclusive()
            .into_arc(),
    );
    registry.register(TestExtension::new("watch", ExtensionKind::Watcher).into_arc());
    registry.register(TestExtension::new("tgt", ExtensionKind::Target).into_arc());
    registry
}
