//! Standard verdicts and their legacy integer encoding
//!
//! Verdicts are negative integers on the wire: ACCEPT = -1, DROP = -2,
//! CONTINUE = -3, RETURN = -4. Non-negative values are jump offsets and
//! never decode to a verdict.
//!
//! Target extensions store their verdict inside a 32-bit info word. The low
//! [`VERDICT_BITS`] hold the verdict's absolute value (1..=4); the remaining
//! 28 bits belong to the extension. Always go through [`pack_verdict`] and
//! [`unpack_verdict`] rather than masking by hand.

use serde::{Deserialize, Serialize};

pub const NUM_STANDARD_TARGETS: usize = 4;

/// Names indexed by `-code - 1`
pub const STANDARD_TARGETS: [&str; NUM_STANDARD_TARGETS] = ["ACCEPT", "DROP", "CONTINUE", "RETURN"];

/// Bits of an extension info word reserved for the verdict
pub const VERDICT_BITS: u32 = 0x0000_000F;

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i32)]
pub enum Verdict {
    #[strum(serialize = "ACCEPT")]
    Accept = -1,
    #[strum(serialize = "DROP")]
    Drop = -2,
    #[strum(serialize = "CONTINUE")]
    Continue = -3,
    #[strum(serialize = "RETURN")]
    Return = -4,
}

impl Verdict {
    pub const ALL: [Verdict; NUM_STANDARD_TARGETS] = [
        Verdict::Accept,
        Verdict::Drop,
        Verdict::Continue,
        Verdict::Return,
    ];

    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn as_str(self) -> &'static str {
        STANDARD_TARGETS[self.index()]
    }

    const fn index(self) -> usize {
        match self {
            Verdict::Accept => 0,
            Verdict::Drop => 1,
            Verdict::Continue => 2,
            Verdict::Return => 3,
        }
    }

    /// Name → verdict. `None` means the name is not a standard target and
    /// should be looked up as a target extension instead.
    pub fn from_name(name: &str) -> Option<Self> {
        STANDARD_TARGETS
            .iter()
            .position(|target| *target == name)
            .map(|i| Self::ALL[i])
    }

    pub fn from_code(code: i32) -> Option<Self> {
        if !(Verdict::Return.code()..=Verdict::Accept.code()).contains(&code) {
            return None;
        }
        let index = usize::try_from(-code - 1).ok()?;
        Self::ALL.get(index).copied()
    }

    /// Verdict statement keyword in nftables
    pub const fn nft_keyword(self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Drop => "drop",
            Verdict::Continue => "continue",
            Verdict::Return => "return",
        }
    }
}

/// Standard target name at table index `num`.
pub fn standard_target(num: u32) -> Option<&'static str> {
    usize::try_from(num)
        .ok()
        .and_then(|i| STANDARD_TARGETS.get(i))
        .copied()
}

/// Name for an encoded verdict, `None` for anything outside -1..=-4.
pub fn target_name(code: i32) -> Option<&'static str> {
    Verdict::from_code(code).map(Verdict::as_str)
}

/// Parses a standard target name into its code.
pub fn fill_target(name: &str) -> Option<i32> {
    Verdict::from_name(name).map(Verdict::code)
}

/// Stores `verdict` in the low four bits of `flags`, discarding whatever
/// `flags` had there.
pub const fn pack_verdict(verdict: Verdict, flags: u32) -> u32 {
    (flags & !VERDICT_BITS) | verdict.code().unsigned_abs()
}

/// Recovers the verdict from an info word; the upper 28 bits are ignored.
pub fn unpack_verdict(word: u32) -> Option<Verdict> {
    let field = i32::try_from(word & VERDICT_BITS).ok()?;
    Verdict::from_code(-field)
}

/// The extension-owned part of an info word.
pub const fn extension_flags(word: u32) -> u32 {
    word & !VERDICT_BITS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_name_code_name_identity() {
        for name in STANDARD_TARGETS {
            let code = fill_target(name).unwrap();
            assert_eq!(target_name(code), Some(name));
        }
    }

    #[test]
    fn test_codes_are_exactly_minus_one_to_minus_four() {
        let codes: HashSet<i32> = Verdict::iter().map(Verdict::code).collect();
        assert_eq!(codes, HashSet::from([-1, -2, -3, -4]));
        assert_eq!(Verdict::Accept.code(), -1);
        assert_eq!(Verdict::Return.code(), -4);
    }

    #[test]
    fn test_out_of_range_codes_have_no_name() {
        for code in [0, 1, 4, 15, -5, -16, i32::MIN, i32::MAX] {
            assert_eq!(target_name(code), None, "code {code}");
        }
    }

    #[test]
    fn test_non_standard_names() {
        assert_eq!(Verdict::from_name("accept"), None);
        assert_eq!(Verdict::from_name("mark"), None);
        assert_eq!(Verdict::from_name(""), None);
        assert_eq!(fill_target("ACCEPT"), Some(-1));
    }

    #[test]
    fn test_standard_target_bounds() {
        assert_eq!(standard_target(0), Some("ACCEPT"));
        assert_eq!(standard_target(3), Some("RETURN"));
        assert_eq!(standard_target(4), None);
        assert_eq!(standard_target(u32::MAX), None);
    }

    #[test]
    fn test_display_matches_table() {
        for v in Verdict::iter() {
            assert_eq!(v.to_string(), v.as_str());
            assert_eq!(v.as_str().parse::<Verdict>().unwrap(), v);
        }
    }

    #[test]
    fn test_pack_uses_absolute_value() {
        assert_eq!(pack_verdict(Verdict::Accept, 0), 1);
        assert_eq!(pack_verdict(Verdict::Return, 0), 4);
        assert_eq!(pack_verdict(Verdict::Drop, 0xffff_fff0), 0xffff_fff2);
        // Low bits of the flags are overwritten
        assert_eq!(pack_verdict(Verdict::Drop, 0x0000_00ff), 0x0000_00f2);
    }

    #[test]
    fn test_unpack_rejects_unused_field_values() {
        assert_eq!(unpack_verdict(0), None);
        for field in 5..=15u32 {
            assert_eq!(unpack_verdict(0xabc0_0000 | field), None);
        }
    }

    #[test]
    fn test_extension_flags() {
        let word = pack_verdict(Verdict::Continue, 0xffff_ffe0);
        assert_eq!(extension_flags(word), 0xffff_ffe0);
    }

    #[test]
    fn test_serde_uses_upper_case_names() {
        let json = serde_json::to_string(&Verdict::Continue).unwrap();
        assert_eq!(json, "\"CONTINUE\"");
        let v: Verdict = serde_json::from_str("\"DROP\"").unwrap();
        assert_eq!(v, Verdict::Drop);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_verdict() -> impl Strategy<Value = Verdict> {
        prop_oneof![
            Just(Verdict::Accept),
            Just(Verdict::Drop),
            Just(Verdict::Continue),
            Just(Verdict::Return),
        ]
    }

    proptest! {
        #[test]
        fn test_pack_unpack_ignores_upper_bits(verdict in arb_verdict(), flags in any::<u32>()) {
            let word = pack_verdict(verdict, flags);
            prop_assert_eq!(unpack_verdict(word), Some(verdict));
            prop_assert_eq!(extension_flags(word), flags & !VERDICT_BITS);
        }

        #[test]
        fn test_target_name_total(code in any::<i32>()) {
            let name = target_name(code);
            prop_assert_eq!(name.is_some(), (-4..=-1).contains(&code));
        }

        #[test]
        fn test_unpack_never_panics(word in any::<u32>()) {
            let _ = unpack_verdict(word);
        }
    }
}
