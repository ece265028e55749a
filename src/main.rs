//! ebtc - ebtables compatibility layer for nftables bridge filtering
//!
//! Translates legacy ebtables rules into nftables `bridge` family rules.
//!
//! # Usage
//!
//! ```bash
//! ebtc translate -- -A FORWARD -s Multicast -j DROP   # nft syntax
//! ebtc translate --format json -- -A INPUT -p ARP     # nftables JSON
//! ebtc batch rules.txt | nft -j -f -                  # one rule per line
//! ebtc resolve BGA                    # 01:80:c2:00:00:00/ff:ff:ff:ff:ff:ff
//! ebtc verdict -- -3                                  # CONTINUE
//! ebtc extensions                                     # list extensions
//! ebtc config --init                                  # write default config
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use ebtc::config::{self, CompatConfig};
use ebtc::core::extension::{ExtensionKind, load_extensions};
use ebtc::core::nft_json::{RuleTranslation, batch_json};
use ebtc::core::verdict::{fill_target, target_name};
use ebtc::parse::RuleParser;
use ebtc::{Error, Verdict};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "ebtc")]
#[command(about = "Translate ebtables rules into nftables bridge rules", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: XDG config dir/ebtc/config.json)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum Format {
    /// nft command syntax
    #[default]
    Nft,
    /// nftables JSON (`nft -j -f -`)
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate one rule given as ebtables arguments
    Translate {
        #[arg(short, long, value_enum, default_value_t)]
        format: Format,
        /// Table used when the rule has no -t
        #[arg(long)]
        table: Option<String>,
        /// ebtables arguments, e.g. -A INPUT -s Unicast -j DROP
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Translate a file of rules, one per line ('-' reads stdin)
    Batch {
        #[arg(short, long, value_enum, default_value_t)]
        format: Format,
        /// Table used when a rule has no -t
        #[arg(long)]
        table: Option<String>,
        file: PathBuf,
    },
    /// Resolve a MAC keyword or addr[/mask] literal
    Resolve { token: String },
    /// Convert between verdict names and codes
    Verdict {
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// List registered extensions and their options
    Extensions,
    /// Show the effective configuration
    Config {
        /// Write the default configuration if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().or_else(ebtc::utils::config_path);
    let config = config_path
        .as_deref()
        .map(config::load_config)
        .unwrap_or_default();

    match run(cli.command, &config, config_path) {
        Ok(code) => code,
        Err(e) => {
            report(&e, None);
            ExitCode::FAILURE
        }
    }
}

fn report(e: &Error, line: Option<usize>) {
    match line {
        Some(line) => eprintln!("Error (line {line}): {e}"),
        None => eprintln!("Error: {e}"),
    }
    if let Some(hint) = e.hint() {
        eprintln!("  hint: {hint}");
    }
}

fn parser_for(config: &CompatConfig, table: Option<String>) -> RuleParser<'static> {
    let parser = RuleParser::from_config(config);
    match table {
        Some(table) => parser.with_table(table),
        None => parser,
    }
}

fn print_rules(rules: &[RuleTranslation], format: Format) -> ebtc::Result<()> {
    match format {
        Format::Nft => {
            for rule in rules {
                println!("{}", rule.to_nft_text());
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&batch_json(rules))?),
    }
    Ok(())
}

fn run(
    command: Commands,
    config: &CompatConfig,
    config_path: Option<PathBuf>,
) -> ebtc::Result<ExitCode> {
    match command {
        Commands::Translate {
            format,
            table,
            args,
        } => {
            let rule = parser_for(config, table).parse_args(&args)?;
            print_rules(&[rule.into_translation()], format)?;
        }
        Commands::Batch {
            format,
            table,
            file,
        } => {
            let parser = parser_for(config, table);
            let reader: Box<dyn BufRead> = if file.as_os_str() == "-" {
                Box::new(BufReader::new(std::io::stdin()))
            } else {
                Box::new(BufReader::new(std::fs::File::open(&file)?))
            };

            let mut rules = Vec::new();
            let mut failures = 0usize;
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match parser.parse_line(trimmed) {
                    Ok(rule) => rules.push(rule.into_translation()),
                    Err(e) => {
                        report(&e, Some(index + 1));
                        failures += 1;
                    }
                }
            }

            info!("Translated {} rules, {} failed", rules.len(), failures);
            print_rules(&rules, format)?;
            if failures > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Resolve { token } => {
            let pattern = config.resolver().resolve(&token)?;
            println!("{}/{}", pattern.addr_string(), pattern.mask_string());
        }
        Commands::Verdict { value } => {
            let answer = match value.parse::<i32>() {
                Ok(code) => target_name(code).map(str::to_string),
                Err(_) => fill_target(&value).map(|code| code.to_string()),
            };
            match answer {
                Some(answer) => println!("{answer}"),
                None => {
                    eprintln!(
                        "'{value}' is not a standard verdict (names: {}; codes: -1 to -4)",
                        Verdict::ALL.map(Verdict::as_str).join(", ")
                    );
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Extensions => {
            let registry = load_extensions();
            for kind in [ExtensionKind::Match, ExtensionKind::Watcher, ExtensionKind::Target] {
                println!(
                    "{}",
                    match kind {
                        ExtensionKind::Match => "Matches:",
                        ExtensionKind::Watcher => "Watchers:",
                        ExtensionKind::Target => "Targets:",
                    }
                );
                for ext in registry.iter().filter(|e| e.kind() == kind) {
                    let options: Vec<&str> = ext.options().iter().map(|o| o.name).collect();
                    println!("  {:<8} {}", ext.name(), ext.help());
                    println!("  {:<8} {}", "", options.join(" "));
                }
            }
        }
        Commands::Config { init } => {
            if init {
                let path = config_path.ok_or_else(|| {
                    Error::Parse("no configuration directory; pass --config".to_string())
                })?;
                if path.exists() {
                    warn!("{} already exists, leaving it unchanged", path.display());
                } else {
                    config::save_config(&CompatConfig::default(), &path)?;
                    println!("Wrote {}", path.display());
                }
            }
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
