use crate::core::error::Result;
use crate::core::mac::{KeywordTable, MacResolver, PatternKind};
use crate::core::verdict::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Translation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatConfig {
    /// Verdict applied to rules without `-j`. `null` makes such rules an
    /// error instead.
    #[serde(default = "default_target")]
    pub default_target: Option<Verdict>,
    /// nftables table used when a rule has no `-t`
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub keywords: KeywordConfig,
}

/// Pattern keyword spellings accepted by `-s` / `-d`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default)]
    pub case_sensitive: bool,
    /// Extra spellings, e.g. `"stp": "BridgeGroup"`
    #[serde(default)]
    pub aliases: BTreeMap<String, PatternKind>,
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            default_target: default_target(),
            table: default_table(),
            keywords: KeywordConfig::default(),
        }
    }
}

fn default_target() -> Option<Verdict> {
    Some(Verdict::Continue)
}

fn default_table() -> String {
    crate::parse::default_table()
}

impl CompatConfig {
    /// Address resolver with the configured keyword table
    pub fn resolver(&self) -> MacResolver {
        let table = self.keywords.aliases.iter().fold(
            KeywordTable::legacy().case_sensitive(self.keywords.case_sensitive),
            |table, (alias, kind)| table.with_alias(alias.clone(), *kind),
        );
        MacResolver::new(table)
    }
}

/// Saves the config using an atomic write pattern.
/// 1. Writes to a temporary file in the target directory.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
pub fn save_config(config: &CompatConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    crate::utils::ensure_dir(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?; // Ensure data is flushed to physical media

    temp.persist(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e.error
        }
    })?;
    debug!("Saved config to {}", path.display());
    Ok(())
}

/// Loads the config, or returns the default if the file is missing or
/// invalid.
pub fn load_config(path: &Path) -> CompatConfig {
    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str::<CompatConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring invalid config {}: {e}", path.display());
                CompatConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CompatConfig::default(),
        Err(e) => {
            warn!("Cannot read config {}: {e}", path.display());
            CompatConfig::default()
        }
    }
}

/// Strict variant of [`load_config`] that reports every problem.
pub fn read_config(path: &Path) -> Result<CompatConfig> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
