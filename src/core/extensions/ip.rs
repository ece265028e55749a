//! `ip` match: IPv4 header fields of bridged frames

use super::{invalid, required_value};
use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionData, ExtensionKind, OptionSpec};
use crate::core::nft_json::{match_expr, op, payload, payload_match, range_or_single};
use crate::validators;
use ipnetwork::Ipv4Network;
use serde_json::{Value, json};

const ETH_P_IP: u16 = 0x0800;

const IP_SOURCE: u32 = 0x01;
const IP_DEST: u32 = 0x02;
const IP_PROTO: u32 = 0x04;
const IP_SPORT: u32 = 0x08;
const IP_DPORT: u32 = 0x10;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("--ip-src", IP_SOURCE),
    OptionSpec::with_arg("--ip-source", IP_SOURCE),
    OptionSpec::with_arg("--ip-dst", IP_DEST),
    OptionSpec::with_arg("--ip-destination", IP_DEST),
    OptionSpec::with_arg("--ip-proto", IP_PROTO),
    OptionSpec::with_arg("--ip-protocol", IP_PROTO),
    OptionSpec::with_arg("--ip-sport", IP_SPORT),
    OptionSpec::with_arg("--ip-source-port", IP_SPORT),
    OptionSpec::with_arg("--ip-dport", IP_DPORT),
    OptionSpec::with_arg("--ip-destination-port", IP_DPORT),
];

/// IP protocol names nft understands, with their numbers
const PROTOCOLS: &[(&str, u8)] = &[
    ("icmp", 1),
    ("igmp", 2),
    ("tcp", 6),
    ("udp", 17),
    ("gre", 47),
    ("esp", 50),
    ("ah", 51),
    ("sctp", 132),
    ("udplite", 136),
];

/// Protocols with a port pair at the start of their header
const PORT_PROTOCOLS: [u8; 4] = [6, 17, 132, 136];

#[derive(Debug)]
pub struct IpMatch;

impl Extension for IpMatch {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Match
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn help(&self) -> &'static str {
        "IPv4 addresses, protocol and ports (needs -p IPv4)"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(IpInfo::default())
    }
}

#[derive(Debug, Default)]
pub struct IpInfo {
    source: Option<(Ipv4Network, bool)>,
    destination: Option<(Ipv4Network, bool)>,
    protocol: Option<(u8, bool)>,
    sport: Option<((u16, u16), bool)>,
    dport: Option<((u16, u16), bool)>,
}

fn parse_network(option: &OptionSpec, value: &str) -> Result<Ipv4Network> {
    value
        .parse::<Ipv4Network>()
        .map_err(|e| Error::invalid_option(option.name, value, e.to_string()))
}

fn parse_protocol(option: &OptionSpec, value: &str) -> Result<u8> {
    if let Some((_, number)) = PROTOCOLS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
    {
        return Ok(*number);
    }
    validators::parse_unsigned::<u8>(value)
        .ok_or_else(|| Error::invalid_option(option.name, value, "unknown IP protocol"))
}

fn protocol_value(number: u8) -> Value {
    PROTOCOLS
        .iter()
        .find(|(_, n)| *n == number)
        .map_or_else(|| json!(number), |(name, _)| json!(name))
}

impl ExtensionData for IpInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        let value = required_value(option, value)?;
        match option.bit {
            IP_SOURCE => self.source = Some((parse_network(option, value)?, invert)),
            IP_DEST => self.destination = Some((parse_network(option, value)?, invert)),
            IP_PROTO => self.protocol = Some((parse_protocol(option, value)?, invert)),
            IP_SPORT => {
                let range = validators::parse_port_range(value).map_err(invalid(option, value))?;
                self.sport = Some((range, invert));
            }
            IP_DPORT => {
                let range = validators::parse_port_range(value).map_err(invalid(option, value))?;
                self.dport = Some((range, invert));
            }
            _ => {
                return Err(Error::UnknownOption {
                    option: option.name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn final_check(&self, entry: &Entry) -> Result<()> {
        if !entry.requires_protocol(ETH_P_IP) {
            return Err(Error::MissingOption {
                extension: "ip",
                option: "-p IPv4",
            });
        }
        if self.sport.is_some() || self.dport.is_some() {
            match self.protocol {
                Some((number, false)) if PORT_PROTOCOLS.contains(&number) => {}
                _ => {
                    return Err(Error::MissingOption {
                        extension: "ip",
                        option: "--ip-proto tcp|udp|sctp|udplite",
                    });
                }
            }
        }
        Ok(())
    }

    fn to_nft(&self) -> Vec<Value> {
        let mut expr = Vec::with_capacity(5);
        for (field, network) in [("saddr", &self.source), ("daddr", &self.destination)] {
            if let Some((network, invert)) = network {
                let right = if network.prefix() == 32 {
                    json!(network.ip().to_string())
                } else {
                    json!({
                        "prefix": { "addr": network.network().to_string(), "len": network.prefix() }
                    })
                };
                expr.push(match_expr(payload("ip", field), op(*invert), right));
            }
        }
        if let Some((number, invert)) = self.protocol {
            expr.push(payload_match("ip", "protocol", invert, protocol_value(number)));
        }
        for (field, ports) in [("sport", &self.sport), ("dport", &self.dport)] {
            if let Some(((lo, hi), invert)) = ports {
                expr.push(payload_match("th", field, *invert, range_or_single(*lo, *hi)));
            }
        }
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extension::ExtensionInstance;
    use crate::core::mac::MacResolver;
    use std::sync::Arc;

    fn instance() -> ExtensionInstance {
        ExtensionInstance::new(Arc::new(IpMatch), 0)
    }

    fn ipv4_entry() -> Entry {
        let mut entry = Entry::new();
        entry
            .parse_option("-p", "IPv4", false, &MacResolver::default())
            .unwrap();
        entry
    }

    #[test]
    fn test_source_prefix_and_host() {
        let mut ip = instance();
        ip.parse_option("--ip-src", Some("10.0.0.0/8"), false).unwrap();
        ip.parse_option("--ip-dst", Some("192.168.1.1"), true).unwrap();
        let expr = ip.to_nft();
        assert_eq!(
            expr[0],
            match_expr(
                payload("ip", "saddr"),
                "==",
                json!({"prefix": {"addr": "10.0.0.0", "len": 8}})
            )
        );
        assert_eq!(expr[1], payload_match("ip", "daddr", true, "192.168.1.1"));
    }

    #[test]
    fn test_alias_repeat_rejected() {
        let mut ip = instance();
        ip.parse_option("--ip-src", Some("10.0.0.1"), false).unwrap();
        let err = ip.parse_option("--ip-source", Some("10.0.0.2"), false).unwrap_err();
        assert!(matches!(err, Error::DuplicateOption { .. }));
    }

    #[test]
    fn test_bad_address() {
        let mut ip = instance();
        let err = ip.parse_option("--ip-src", Some("10.0.0.300"), false).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { option, .. } if option == "--ip-src"));
    }

    #[test]
    fn test_protocol_names_and_numbers() {
        let mut ip = instance();
        ip.parse_option("--ip-proto", Some("UDP"), false).unwrap();
        assert_eq!(ip.to_nft()[0], payload_match("ip", "protocol", false, "udp"));

        let mut ip = instance();
        ip.parse_option("--ip-proto", Some("253"), false).unwrap();
        assert_eq!(ip.to_nft()[0], payload_match("ip", "protocol", false, 253));

        let mut ip = instance();
        assert!(ip.parse_option("--ip-proto", Some("bogus"), false).is_err());
    }

    #[test]
    fn test_requires_ipv4_protocol() {
        let ip = instance();
        let err = ip.final_check(&Entry::new()).unwrap_err();
        assert!(matches!(err, Error::MissingOption { extension: "ip", .. }));
        assert!(ip.final_check(&ipv4_entry()).is_ok());
    }

    #[test]
    fn test_ports_need_port_protocol() {
        let mut ip = instance();
        ip.parse_option("--ip-dport", Some("1000:2000"), false).unwrap();
        assert!(ip.final_check(&ipv4_entry()).is_err());
        ip.parse_option("--ip-proto", Some("tcp"), false).unwrap();
        ip.final_check(&ipv4_entry()).unwrap();
        assert_eq!(
            ip.to_nft()[1],
            payload_match("th", "dport", false, json!({"range": [1000, 2000]}))
        );
    }
}
