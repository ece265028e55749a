//! Utility functions for directory management and rule-file input
//!
//! Directories follow the XDG Base Directory specification:
//!
//! - Config: `~/.config/ebtc/` - `config.json`
//!
//! # Example
//!
//! ```
//! use ebtc::utils::split_args;
//!
//! let args = split_args(r#"-A INPUT --log-prefix "bridge drop" # trailing"#).unwrap();
//! assert_eq!(args, ["-A", "INPUT", "--log-prefix", "bridge drop"]);
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "config.json";

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "ebtc", "ebtc").map(|pd| pd.config_dir().to_path_buf())
}

/// Default location of the configuration file
pub fn config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE))
}

pub fn ensure_dir(dir: &std::path::Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new()
            .mode(0o700) // User read/write/execute only
            .recursive(true)
            .create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Splits one line into arguments the way a POSIX shell would for simple
/// input: whitespace separates words, single quotes are literal, double
/// quotes allow `\"` and `\\`, a backslash outside quotes escapes the next
/// character, and an unquoted `#` at the start of a word ends the line.
///
/// # Errors
///
/// Returns `Err` for an unterminated quote or a trailing backslash.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (Quote::None, '#') if !in_word => break,
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_word = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_word = true;
            }
            (Quote::None, '\\') => {
                let escaped = chars.next().ok_or("trailing backslash")?;
                current.push(escaped);
                in_word = true;
            }
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, '\\') => match chars.next() {
                Some(escaped @ ('"' | '\\')) => current.push(escaped),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => return Err("trailing backslash".to_string()),
            },
            (_, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote != Quote::None {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            split_args("  -A   INPUT\t-j DROP ").unwrap(),
            ["-A", "INPUT", "-j", "DROP"]
        );
        assert!(split_args("").unwrap().is_empty());
    }

    #[test]
    fn test_split_quotes() {
        assert_eq!(
            split_args(r#"--log-prefix 'a "b"' --x "c \"d\" \n""#).unwrap(),
            ["--log-prefix", "a \"b\"", "--x", "c \"d\" \\n"]
        );
        assert_eq!(split_args("''").unwrap(), [""]);
    }

    #[test]
    fn test_split_comments() {
        assert!(split_args("# whole line").unwrap().is_empty());
        assert_eq!(split_args("-A X#Y # c").unwrap(), ["-A", "X#Y"]);
        assert_eq!(split_args("'#' x").unwrap(), ["#", "x"]);
    }

    #[test]
    fn test_split_escapes() {
        assert_eq!(split_args(r"a\ b").unwrap(), ["a b"]);
        assert!(split_args("abc\\").is_err());
    }

    #[test]
    fn test_split_unterminated() {
        assert!(split_args("'abc").is_err());
        assert!(split_args("\"abc").is_err());
    }
}
