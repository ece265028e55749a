//! Input validation and sanitization functions for ebtc
//!
//! Validators return `Result<_, String>` with a human-readable reason; the
//! caller wraps the reason into the typed error for the option at hand.

use crate::core::extensions::limit::TimeUnit;
use std::str::FromStr;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
pub const MAX_IFNAME_LEN: usize = 15;

/// Smallest value that is an ethertype rather than an 802.3 length
pub const ETH_P_MIN: u16 = 0x0600;

/// Ethertype names accepted by `-p`, with the nftables spelling used on
/// output.
const ETHERTYPES: &[(&str, u16, &str)] = &[
    ("IPv4", 0x0800, "ip"),
    ("ARP", 0x0806, "arp"),
    ("RARP", 0x8035, "rarp"),
    ("IPv6", 0x86dd, "ip6"),
    ("802_1Q", 0x8100, "vlan"),
    ("802_1AD", 0x88a8, "8021ad"),
];

/// Sanitizes a log prefix for safe use inside a quoted nftables string.
///
/// Keeps printable ASCII except quotes, backslashes and shell
/// metacharacters, and truncates to `max_len` bytes.
///
/// # Examples
///
/// ```
/// use ebtc::validators::sanitize_prefix;
///
/// assert_eq!(sanitize_prefix("bridge drop: ", 29), "bridge drop: ");
/// assert_eq!(sanitize_prefix("a\"b\nc", 29), "abc");
/// ```
pub fn sanitize_prefix(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| {
            // SECURITY: ASCII only, no quoting or substitution characters
            *c == ' '
                || (c.is_ascii_graphic()
                    && !matches!(c, '"' | '\'' | '\\' | '`' | '$' | ';' | '|' | '&'))
        })
        .take(max_len)
        .collect()
}

/// Validates a log prefix length and content.
///
/// # Errors
///
/// Returns `Err` if:
/// - Prefix exceeds `max_len` bytes
/// - Prefix contains characters [`sanitize_prefix`] would remove
pub fn validate_prefix(input: &str, max_len: usize) -> Result<String, String> {
    if input.len() > max_len {
        return Err(format!("prefix too long (max {max_len} characters)"));
    }

    let sanitized = sanitize_prefix(input, max_len);
    if sanitized != input {
        return Err(
            "prefix may only contain printable ASCII without quotes, backslashes, \
             or any of `$;|&"
                .to_string(),
        );
    }

    Ok(sanitized)
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// A single trailing `+` is a wildcard matching any suffix.
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("interface name cannot be empty".to_string());
    }

    if name.len() > MAX_IFNAME_LEN {
        return Err(format!(
            "interface name too long (max {MAX_IFNAME_LEN} characters)"
        ));
    }

    let stem = name.strip_suffix('+').unwrap_or(name);

    if stem == "." || stem == ".." {
        return Err("invalid interface name".to_string());
    }

    if !stem
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Converts the legacy `+` wildcard into the nftables `*` form.
pub fn nft_interface(name: &str) -> String {
    match name.strip_suffix('+') {
        Some(stem) => format!("{stem}*"),
        None => name.to_string(),
    }
}

/// Parses a `-p` value.
///
/// Returns `Ok(None)` for `LENGTH` (802.3 frames), otherwise the ethertype.
///
/// # Errors
///
/// Returns `Err` for unknown names and values below 0x0600.
pub fn parse_ethertype(value: &str) -> Result<Option<u16>, String> {
    if value.eq_ignore_ascii_case("LENGTH") {
        return Ok(None);
    }

    if let Some((_, ethertype, _)) = ETHERTYPES
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(value))
    {
        return Ok(Some(*ethertype));
    }

    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let ethertype = Some(digits)
        .filter(|d| is_hex_digits(d))
        .and_then(|d| u16::from_str_radix(d, 16).ok())
        .ok_or_else(|| format!("unknown protocol '{value}'"))?;

    if ethertype < ETH_P_MIN {
        return Err(format!(
            "ethertype {ethertype:#06x} is below {ETH_P_MIN:#06x}, use LENGTH for 802.3 frames"
        ));
    }
    Ok(Some(ethertype))
}

/// Parses an unsigned decimal number made of ASCII digits only.
///
/// `str::parse` would also take a leading `+`, which the ebtables syntax
/// never allows.
pub fn parse_unsigned<T: FromStr>(value: &str) -> Option<T> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn is_hex_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// nftables name of a well-known ethertype.
pub fn ethertype_nft_name(ethertype: u16) -> Option<&'static str> {
    ETHERTYPES
        .iter()
        .find(|(_, value, _)| *value == ethertype)
        .map(|(_, _, nft)| *nft)
}

/// Parses a decimal or `0x`-prefixed hexadecimal `u32`.
///
/// # Errors
///
/// Returns `Err` if the value is not a number or overflows.
pub fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) if is_hex_digits(hex) => u32::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => parse_unsigned(value),
    };
    parsed.ok_or_else(|| format!("'{value}' is not a valid number"))
}

/// Parses a port or `first:last` range.
///
/// # Errors
///
/// Returns `Err` if either end is not a port number or the range is
/// reversed.
pub fn parse_port_range(value: &str) -> Result<(u16, u16), String> {
    let (start, end) = value.split_once(':').unwrap_or((value, value));
    let start = if start.is_empty() { "0" } else { start };
    let end = if end.is_empty() { "65535" } else { end };

    let start: u16 =
        parse_unsigned(start).ok_or_else(|| format!("'{start}' is not a valid port"))?;
    let end: u16 = parse_unsigned(end).ok_or_else(|| format!("'{end}' is not a valid port"))?;

    if start > end {
        return Err("start port must be less than or equal to end port".to_string());
    }
    Ok((start, end))
}

/// Validates a rate limit value.
///
/// Returns Ok(Some(warning)) for high but acceptable values.
/// Returns Err for values that exceed kernel/system limits.
///
/// # Errors
///
/// Returns `Err` if rate is zero or exceeds the maximum for the time unit.
pub fn validate_rate_limit(count: u32, unit: TimeUnit) -> Result<Option<String>, String> {
    if count == 0 {
        return Err("rate must be at least 1".to_string());
    }

    let (max, warn) = match unit {
        TimeUnit::Second => (10_000, 1_000),
        TimeUnit::Minute => (100_000, 10_000),
        TimeUnit::Hour => (1_000_000, 100_000),
        TimeUnit::Day => (10_000_000, 1_000_000),
    };

    if count > max {
        return Err(format!("rate limit exceeds max {}/{}", max, unit.as_str()));
    }

    if count > warn {
        return Ok(Some(format!(
            "high rate ({}/{}) - typical: 1-{}",
            count,
            unit.as_str(),
            warn / 10
        )));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_prefix_normal() {
        assert_eq!(sanitize_prefix("EBT DROP: ", 29), "EBT DROP: ");
    }

    #[test]
    fn test_sanitize_prefix_removes_quotes_and_control() {
        let s = sanitize_prefix("x\"y'z\n\t$(rm)", 29);
        assert_eq!(s, "xyz(rm)");
    }

    #[test]
    fn test_sanitize_prefix_length_limit() {
        assert_eq!(sanitize_prefix(&"a".repeat(100), 29).len(), 29);
    }

    #[test]
    fn test_validate_prefix_too_long() {
        assert!(validate_prefix(&"a".repeat(30), 29).is_err());
        assert!(validate_prefix(&"a".repeat(29), 29).is_ok());
    }

    #[test]
    fn test_validate_prefix_only_invalid_chars() {
        assert!(validate_prefix("\"\"", 29).is_err());
        assert_eq!(validate_prefix("", 29).unwrap(), "");
    }

    #[test]
    fn test_validate_prefix_rejects_instead_of_rewriting() {
        assert!(validate_prefix("drop;$HOME\"x", 29).is_err());
        assert!(validate_prefix("tab\there", 29).is_err());
        assert_eq!(validate_prefix("br-drop: ", 29).unwrap(), "br-drop: ");
    }

    #[test]
    fn test_validate_interface_valid() {
        assert!(validate_interface("eth0").is_ok());
        assert!(validate_interface("br-lan").is_ok());
        assert!(validate_interface("veth_1.100").is_ok());
        assert!(validate_interface("eth+").is_ok());
        assert!(validate_interface("+").is_ok());
    }

    #[test]
    fn test_validate_interface_invalid() {
        assert!(validate_interface("").is_err());
        assert!(validate_interface(".").is_err());
        assert!(validate_interface("..+").is_err());
        assert!(validate_interface("eth 0").is_err());
        assert!(validate_interface("eth+0").is_err());
        assert!(validate_interface("eth0;ls").is_err());
    }

    #[test]
    fn test_validate_interface_length() {
        assert!(validate_interface("abcdefghijklmno").is_ok());
        assert!(validate_interface("abcdefghijklmnop").is_err());
    }

    #[test]
    fn test_nft_interface_wildcard() {
        assert_eq!(nft_interface("eth+"), "eth*");
        assert_eq!(nft_interface("eth0"), "eth0");
    }

    #[test]
    fn test_parse_ethertype() {
        assert_eq!(parse_ethertype("IPv4"), Ok(Some(0x0800)));
        assert_eq!(parse_ethertype("ipv6"), Ok(Some(0x86dd)));
        assert_eq!(parse_ethertype("0x88cc"), Ok(Some(0x88cc)));
        assert_eq!(parse_ethertype("0800"), Ok(Some(0x0800)));
        assert_eq!(parse_ethertype("length"), Ok(None));
        assert!(parse_ethertype("0x05ff").is_err());
        assert!(parse_ethertype("IPX").is_err());
        assert!(parse_ethertype("0x10000").is_err());
    }

    #[test]
    fn test_ethertype_nft_name() {
        assert_eq!(ethertype_nft_name(0x0800), Some("ip"));
        assert_eq!(ethertype_nft_name(0x8100), Some("vlan"));
        assert_eq!(ethertype_nft_name(0x88cc), None);
    }

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("42"), Ok(42));
        assert_eq!(parse_u32("0xff"), Ok(255));
        assert_eq!(parse_u32("0XFFFFFFFF"), Ok(u32::MAX));
        assert!(parse_u32("0x100000000").is_err());
        assert!(parse_u32("-1").is_err());
        assert!(parse_u32("").is_err());
    }

    #[test]
    fn test_parse_port_range() {
        assert_eq!(parse_port_range("22"), Ok((22, 22)));
        assert_eq!(parse_port_range("1024:2048"), Ok((1024, 2048)));
        assert_eq!(parse_port_range(":1023"), Ok((0, 1023)));
        assert_eq!(parse_port_range("1024:"), Ok((1024, 65535)));
        assert!(parse_port_range("2048:1024").is_err());
        assert!(parse_port_range("http").is_err());
    }

    #[test]
    fn test_numbers_reject_signs() {
        assert_eq!(parse_unsigned::<u16>("22"), Some(22));
        assert_eq!(parse_unsigned::<u16>("+22"), None);
        assert_eq!(parse_unsigned::<u16>("-0"), None);
        assert_eq!(parse_unsigned::<u8>(""), None);
        assert!(parse_ethertype("+0800").is_err());
        assert!(parse_ethertype("0x+800").is_err());
        assert!(parse_u32("+5").is_err());
        assert!(parse_u32("0x+5").is_err());
        assert!(parse_port_range("+22").is_err());
        assert!(parse_port_range("1:+22").is_err());
    }

    #[test]
    fn test_validate_rate_limit() {
        assert_eq!(validate_rate_limit(10, TimeUnit::Second), Ok(None));
        assert!(validate_rate_limit(5000, TimeUnit::Second).unwrap().is_some());
        assert!(validate_rate_limit(10_001, TimeUnit::Second).is_err());
        assert!(validate_rate_limit(0, TimeUnit::Hour).is_err());
    }
}
