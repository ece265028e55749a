//! Firewall mark: the `mark_m` match and the `mark` target
//!
//! The target's info word carries the mark operation in its upper bits and
//! the verdict to continue with in the packed low bits.

use super::{invalid, required_value};
use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionData, ExtensionKind, OptionSpec};
use crate::core::nft_json::{masked, match_expr, meta, meta_match, op, verdict_expr};
use crate::core::verdict::{Verdict, extension_flags, pack_verdict, unpack_verdict};
use crate::validators;
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════════
// mark_m match
// ═══════════════════════════════════════════════════════════════════════════

const MARK: u32 = 0x01;

const MATCH_OPTIONS: &[OptionSpec] = &[OptionSpec::with_arg("--mark", MARK)];

#[derive(Debug)]
pub struct MarkMatch;

impl Extension for MarkMatch {
    fn name(&self) -> &'static str {
        "mark_m"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Match
    }

    fn options(&self) -> &'static [OptionSpec] {
        MATCH_OPTIONS
    }

    fn help(&self) -> &'static str {
        "Firewall mark: value[/mask] compares, /mask tests for any set bit"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(MarkMatchInfo::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkTest {
    /// `(mark & mask) == value`
    Equals { value: u32, mask: u32 },
    /// `(mark & mask) != 0`
    AnyBit { mask: u32 },
}

#[derive(Debug, Default)]
pub struct MarkMatchInfo {
    test: Option<(MarkTest, bool)>,
}

impl ExtensionData for MarkMatchInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        let raw = required_value(option, value)?;
        let test = match raw.split_once('/') {
            Some(("", mask)) => MarkTest::AnyBit {
                mask: validators::parse_u32(mask).map_err(invalid(option, raw))?,
            },
            Some((value, mask)) => MarkTest::Equals {
                value: validators::parse_u32(value).map_err(invalid(option, raw))?,
                mask: validators::parse_u32(mask).map_err(invalid(option, raw))?,
            },
            None => MarkTest::Equals {
                value: validators::parse_u32(raw).map_err(invalid(option, raw))?,
                mask: u32::MAX,
            },
        };
        self.test = Some((test, invert));
        Ok(())
    }

    fn final_check(&self, _entry: &Entry) -> Result<()> {
        if self.test.is_none() {
            return Err(Error::MissingOption {
                extension: "mark_m",
                option: "--mark",
            });
        }
        Ok(())
    }

    fn to_nft(&self) -> Vec<Value> {
        let Some((test, invert)) = self.test else {
            return Vec::new();
        };
        let expr = match test {
            MarkTest::Equals {
                value,
                mask: u32::MAX,
            } => meta_match("mark", invert, value),
            MarkTest::Equals { value, mask } => {
                match_expr(masked(meta("mark"), mask), op(invert), value)
            }
            // The test itself is "!= 0", so inversion flips it back
            MarkTest::AnyBit { mask } => match_expr(masked(meta("mark"), mask), op(!invert), 0),
        };
        vec![expr]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// mark target
// ═══════════════════════════════════════════════════════════════════════════

pub const MARK_SET_VALUE: u32 = 0xFFFF_FFF0;
pub const MARK_OR_VALUE: u32 = 0xFFFF_FFE0;
pub const MARK_AND_VALUE: u32 = 0xFFFF_FFD0;
pub const MARK_XOR_VALUE: u32 = 0xFFFF_FFC0;

const MARK_OP: u32 = 0x01;
const MARK_TARGET: u32 = 0x02;

const TARGET_OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("--mark-set", MARK_OP),
    OptionSpec::with_arg("--set-mark", MARK_OP),
    OptionSpec::with_arg("--mark-or", MARK_OP),
    OptionSpec::with_arg("--mark-and", MARK_OP),
    OptionSpec::with_arg("--mark-xor", MARK_OP),
    OptionSpec::with_arg("--mark-target", MARK_TARGET),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MarkOp {
    #[strum(serialize = "set")]
    Set,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "xor")]
    Xor,
}

impl MarkOp {
    /// The operation's bits in the info word
    pub const fn bits(self) -> u32 {
        match self {
            MarkOp::Set => MARK_SET_VALUE,
            MarkOp::Or => MARK_OR_VALUE,
            MarkOp::And => MARK_AND_VALUE,
            MarkOp::Xor => MARK_XOR_VALUE,
        }
    }

    pub fn from_bits(word: u32) -> Option<Self> {
        match extension_flags(word) {
            MARK_SET_VALUE => Some(MarkOp::Set),
            MARK_OR_VALUE => Some(MarkOp::Or),
            MARK_AND_VALUE => Some(MarkOp::And),
            MARK_XOR_VALUE => Some(MarkOp::Xor),
            _ => None,
        }
    }

    fn from_option(option: &str) -> Option<Self> {
        match option {
            "--mark-set" | "--set-mark" => Some(MarkOp::Set),
            "--mark-or" => Some(MarkOp::Or),
            "--mark-and" => Some(MarkOp::And),
            "--mark-xor" => Some(MarkOp::Xor),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct MarkTarget;

impl Extension for MarkTarget {
    fn name(&self) -> &'static str {
        "mark"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Target
    }

    fn options(&self) -> &'static [OptionSpec] {
        TARGET_OPTIONS
    }

    fn help(&self) -> &'static str {
        "Set or modify the firewall mark, then continue with --mark-target (default ACCEPT)"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(MarkTargetInfo::default())
    }
}

#[derive(Debug)]
pub struct MarkTargetInfo {
    value: u32,
    /// Operation bits plus the packed verdict
    word: u32,
    op_given: bool,
}

impl Default for MarkTargetInfo {
    fn default() -> Self {
        Self {
            value: 0,
            word: pack_verdict(Verdict::Accept, MARK_SET_VALUE),
            op_given: false,
        }
    }
}

impl ExtensionData for MarkTargetInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, _invert: bool) -> Result<()> {
        let raw = required_value(option, value)?;
        match option.bit {
            MARK_OP => {
                let op = MarkOp::from_option(option.name).ok_or_else(|| Error::UnknownOption {
                    option: option.name.to_string(),
                })?;
                self.value = validators::parse_u32(raw).map_err(invalid(option, raw))?;
                let verdict = unpack_verdict(self.word).unwrap_or(Verdict::Accept);
                self.word = pack_verdict(verdict, op.bits());
                self.op_given = true;
            }
            MARK_TARGET => {
                let verdict = Verdict::from_name(raw).ok_or_else(|| {
                    Error::invalid_option(
                        option.name,
                        raw,
                        "expected ACCEPT, DROP, CONTINUE or RETURN",
                    )
                })?;
                self.word = pack_verdict(verdict, self.word);
            }
            _ => {
                return Err(Error::UnknownOption {
                    option: option.name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn final_check(&self, _entry: &Entry) -> Result<()> {
        if self.op_given {
            Ok(())
        } else {
            Err(Error::MissingOption {
                extension: "mark",
                option: "--mark-set",
            })
        }
    }

    fn to_nft(&self) -> Vec<Value> {
        let mark = meta("mark");
        let value = match MarkOp::from_bits(self.word) {
            Some(MarkOp::Or) => json!({ "|": [mark, self.value] }),
            Some(MarkOp::And) => json!({ "&": [mark, self.value] }),
            Some(MarkOp::Xor) => json!({ "^": [mark, self.value] }),
            Some(MarkOp::Set) | None => json!(self.value),
        };
        let mut expr = vec![json!({ "mangle": { "key": meta("mark"), "value": value } })];
        if let Some(verdict) = unpack_verdict(self.word) {
            expr.push(verdict_expr(verdict));
        }
        expr
    }

    fn info_word(&self) -> Option<u32> {
        Some(self.word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extension::ExtensionInstance;
    use std::sync::Arc;

    fn target() -> ExtensionInstance {
        ExtensionInstance::new(Arc::new(MarkTarget), 0)
    }

    fn mark_match() -> ExtensionInstance {
        ExtensionInstance::new(Arc::new(MarkMatch), 0)
    }

    #[test]
    fn test_match_exact_value() {
        let mut m = mark_match();
        m.parse_option("--mark", Some("0x10"), false).unwrap();
        assert_eq!(m.to_nft(), vec![meta_match("mark", false, 16)]);
    }

    #[test]
    fn test_match_value_with_mask() {
        let mut m = mark_match();
        m.parse_option("--mark", Some("1/0xff"), true).unwrap();
        assert_eq!(
            m.to_nft(),
            vec![match_expr(masked(meta("mark"), 0xff), "!=", 1)]
        );
    }

    #[test]
    fn test_match_any_bit() {
        let mut m = mark_match();
        m.parse_option("--mark", Some("/0x0f"), false).unwrap();
        assert_eq!(
            m.to_nft(),
            vec![match_expr(masked(meta("mark"), 0x0f), "!=", 0)]
        );
    }

    #[test]
    fn test_match_requires_value() {
        assert!(mark_match().final_check(&Entry::new()).is_err());
        let mut m = mark_match();
        assert!(m.parse_option("--mark", Some("x/y"), false).is_err());
    }

    #[test]
    fn test_target_defaults_to_accept() {
        let mut t = target();
        t.parse_option("--mark-set", Some("7"), false).unwrap();
        let word = t.info_word().unwrap();
        assert_eq!(unpack_verdict(word), Some(Verdict::Accept));
        assert_eq!(MarkOp::from_bits(word), Some(MarkOp::Set));
        assert_eq!(
            t.to_nft(),
            vec![
                json!({"mangle": {"key": {"meta": {"key": "mark"}}, "value": 7}}),
                json!({"accept": null}),
            ]
        );
    }

    #[test]
    fn test_target_verdict_survives_op_in_either_order() {
        let mut t = target();
        t.parse_option("--mark-target", Some("CONTINUE"), false).unwrap();
        t.parse_option("--mark-or", Some("0x100"), false).unwrap();
        let word = t.info_word().unwrap();
        assert_eq!(word, pack_verdict(Verdict::Continue, MARK_OR_VALUE));
        assert_eq!(unpack_verdict(word), Some(Verdict::Continue));

        let mut t = target();
        t.parse_option("--mark-xor", Some("3"), false).unwrap();
        t.parse_option("--mark-target", Some("RETURN"), false).unwrap();
        let word = t.info_word().unwrap();
        assert_eq!(MarkOp::from_bits(word), Some(MarkOp::Xor));
        assert_eq!(unpack_verdict(word), Some(Verdict::Return));
    }

    #[test]
    fn test_target_single_operation() {
        let mut t = target();
        t.parse_option("--mark-and", Some("1"), false).unwrap();
        let err = t.parse_option("--mark-or", Some("2"), false).unwrap_err();
        assert!(matches!(err, Error::DuplicateOption { .. }));
    }

    #[test]
    fn test_target_rejects_bad_verdict() {
        let mut t = target();
        assert!(t.parse_option("--mark-target", Some("accept"), false).is_err());
    }

    #[test]
    fn test_target_requires_operation() {
        let t = target();
        let err = t.final_check(&Entry::new()).unwrap_err();
        assert!(matches!(err, Error::MissingOption { extension: "mark", .. }));
    }
}
