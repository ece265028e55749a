//! ebtables argument vectors into finalized rules
//!
//! [`RuleParser`] walks one rule's arguments (`-A CHAIN`, base options,
//! extension options, `-j TARGET`), feeds them to a [`CommandState`], and
//! finalizes it. A `!` before an option (or before its value) inverts it.
//!
//! Extension options are routed by name: the first option belonging to a
//! match or watcher attaches it. Target options go to the target chosen by
//! `-j`, so they must follow it.

use crate::config::CompatConfig;
use crate::core::command_state::CommandState;
use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{ExtensionRegistry, load_extensions};
use crate::core::mac::MacResolver;
use crate::core::nft_json::{RuleLocation, RuleTranslation};
use crate::core::verdict::Verdict;
use crate::utils;
use crate::validators;
use serde_json::Value;
use tracing::{debug, trace};

pub const DEFAULT_TABLE: &str = "filter";

/// Table used when a rule has no `-t`.
pub fn default_table() -> String {
    // Packagers may bake in a different default table
    option_env!("EBTC_DEFAULT_TABLE")
        .unwrap_or(DEFAULT_TABLE)
        .to_string()
}

/// One rule after parsing and finalization
#[derive(Debug)]
pub struct ParsedRule<'r> {
    state: CommandState<'r>,
    translation: RuleTranslation,
}

impl<'r> ParsedRule<'r> {
    pub fn location(&self) -> &RuleLocation {
        &self.translation.location
    }

    pub fn state(&self) -> &CommandState<'r> {
        &self.state
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.state.verdict()
    }

    pub fn translation(&self) -> &RuleTranslation {
        &self.translation
    }

    /// Releases the command state and keeps only the rendering.
    pub fn into_translation(mut self) -> RuleTranslation {
        self.state.cleanup();
        self.translation
    }

    pub fn to_nftables_json(&self) -> Value {
        self.translation.to_nftables_json()
    }

    pub fn to_nft_text(&self) -> String {
        self.translation.to_nft_text()
    }
}

#[derive(Debug, Clone)]
pub struct RuleParser<'r> {
    registry: &'r ExtensionRegistry,
    resolver: MacResolver,
    default_target: Option<Verdict>,
    table: String,
}

impl Default for RuleParser<'static> {
    fn default() -> Self {
        Self::new(load_extensions())
    }
}

impl RuleParser<'static> {
    /// Parser over the built-in extensions, configured from `config`.
    pub fn from_config(config: &CompatConfig) -> Self {
        Self::new(load_extensions())
            .with_resolver(config.resolver())
            .with_default_target(config.default_target)
            .with_table(config.table.clone())
    }
}

impl<'r> RuleParser<'r> {
    pub fn new(registry: &'r ExtensionRegistry) -> Self {
        Self {
            registry,
            resolver: MacResolver::default(),
            default_target: Some(Verdict::Continue),
            table: default_table(),
        }
    }

    pub fn with_resolver(mut self, resolver: MacResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Verdict used when a rule has no `-j`; `None` makes that an error.
    pub fn with_default_target(mut self, default_target: Option<Verdict>) -> Self {
        self.default_target = default_target;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn resolver(&self) -> &MacResolver {
        &self.resolver
    }

    /// Splits a shell-style line and parses it. A leading `ebtables` word
    /// is ignored.
    pub fn parse_line(&self, line: &str) -> Result<ParsedRule<'r>> {
        let args = utils::split_args(line).map_err(Error::Parse)?;
        let args = match args.split_first() {
            Some((first, rest)) if first == "ebtables" || first == "ebtables-nft" => rest,
            _ => &args[..],
        };
        self.parse_args(args)
    }

    /// Parses one rule's arguments.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`] for structural problems (no chain, missing
    ///   values, stray arguments)
    /// - [`Error::UnknownOption`] for options nothing handles
    /// - any option, extension, or finalize error
    ///
    /// The command state is released before an error is returned.
    pub fn parse_args<S: AsRef<str>>(&self, args: &[S]) -> Result<ParsedRule<'r>> {
        let mut state = CommandState::new(self.registry);
        let mut table = self.table.clone();
        let mut command: Option<(String, Option<u32>)> = None;
        let mut invert = false;

        let mut tokens = args.iter().map(AsRef::<str>::as_ref).peekable();
        while let Some(token) = tokens.next() {
            trace!("token {token:?}");

            if token == "!" {
                if invert {
                    return Err(Error::Parse("double inversion with '!'".to_string()));
                }
                invert = true;
                continue;
            }

            match token {
                "-t" | "--table" => {
                    no_invert(token, invert)?;
                    table = next_value(&mut tokens, token)?.to_string();
                }
                "-A" | "--append" | "-I" | "--insert" => {
                    no_invert(token, invert)?;
                    if command.is_some() {
                        return Err(Error::Parse("multiple commands specified".to_string()));
                    }
                    let chain = next_value(&mut tokens, token)?.to_string();
                    let position = if matches!(token, "-I" | "--insert") {
                        match tokens.peek().and_then(|t| validators::parse_unsigned::<u32>(t)) {
                            Some(0) => {
                                return Err(Error::Parse(
                                    "rule positions start at 1".to_string(),
                                ));
                            }
                            Some(n) => {
                                tokens.next();
                                Some(n)
                            }
                            None => Some(1),
                        }
                    } else {
                        None
                    };
                    command = Some((chain, position));
                }
                "-j" | "--jump" => {
                    no_invert(token, invert)?;
                    state.set_target(next_value(&mut tokens, token)?)?;
                }
                option if option.starts_with('-') && option.len() > 1 => {
                    self.parse_option(&mut state, &mut tokens, option, invert)?;
                    invert = false;
                }
                other => {
                    return Err(Error::Parse(format!("unexpected argument '{other}'")));
                }
            }
        }

        if invert {
            return Err(Error::Parse("'!' must precede an option".to_string()));
        }
        let (chain, position) = command.ok_or_else(|| {
            Error::Parse("no chain specified (use -A CHAIN or -I CHAIN)".to_string())
        })?;

        state.finalize(self.default_target)?;
        let location = RuleLocation {
            table,
            chain,
            position,
        };
        let translation = RuleTranslation::new(location, &state)?;
        debug!(
            "Parsed rule for {}/{} with {} matches, {} watchers",
            translation.location.table,
            translation.location.chain,
            state.matches().len(),
            state.watchers().len()
        );
        Ok(ParsedRule { state, translation })
    }

    fn parse_option<'a, I>(
        &self,
        state: &mut CommandState<'r>,
        tokens: &mut std::iter::Peekable<I>,
        option: &str,
        invert: bool,
    ) -> Result<()>
    where
        I: Iterator<Item = &'a str>,
    {
        if Entry::is_base_option(option) {
            let (value, invert) = inverted_value(tokens, option, invert)?;
            return state.parse_entry_option(option, value, invert, &self.resolver);
        }

        if let Some(target) = state.target_instance_mut()
            && target.handles(option)
        {
            let (value, invert) = inverted_value(tokens, option, invert)?;
            return target.parse_option(option, Some(value), invert);
        }

        let extension = self
            .registry
            .for_option(option)
            .cloned()
            .ok_or_else(|| Error::UnknownOption {
                option: option.to_string(),
            })?;
        let has_arg = extension
            .options()
            .iter()
            .find(|o| o.name == option)
            .is_some_and(|o| o.has_arg);

        let instance = state.instance_for(extension)?;
        if has_arg {
            let (value, invert) = inverted_value(tokens, option, invert)?;
            instance.parse_option(option, Some(value), invert)
        } else {
            instance.parse_option(option, None, invert)
        }
    }
}

fn no_invert(option: &str, invert: bool) -> Result<()> {
    if invert {
        Err(Error::Parse(format!("{option} cannot be inverted")))
    } else {
        Ok(())
    }
}

fn next_value<'a, I>(tokens: &mut I, option: &str) -> Result<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    tokens
        .next()
        .ok_or_else(|| Error::Parse(format!("option {option} requires an argument")))
}

/// Reads an option value, accepting the `--opt ! value` inversion form.
fn inverted_value<'a, I>(tokens: &mut I, option: &str, invert: bool) -> Result<(&'a str, bool)>
where
    I: Iterator<Item = &'a str>,
{
    let value = next_value(tokens, option)?;
    if value != "!" {
        return Ok((value, invert));
    }
    if invert {
        return Err(Error::Parse("double inversion with '!'".to_string()));
    }
    Ok((next_value(tokens, option)?, true))
}
