//! `pkttype` match: link-layer packet class

use super::required_value;
use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionData, ExtensionKind, OptionSpec};
use crate::core::nft_json::meta_match;
use crate::validators;
use serde_json::Value;
use std::str::FromStr;

const PKTTYPE: u32 = 0x01;

const OPTIONS: &[OptionSpec] = &[OptionSpec::with_arg("--pkttype-type", PKTTYPE)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum PacketType {
    #[strum(serialize = "host")]
    Host,
    #[strum(serialize = "broadcast")]
    Broadcast,
    #[strum(serialize = "multicast")]
    Multicast,
    #[strum(serialize = "otherhost")]
    OtherHost,
}

impl PacketType {
    /// Kernel `PACKET_*` value, also accepted on input
    pub const fn number(self) -> u8 {
        match self {
            PacketType::Host => 0,
            PacketType::Broadcast => 1,
            PacketType::Multicast => 2,
            PacketType::OtherHost => 3,
        }
    }

    pub const fn nft_name(self) -> &'static str {
        match self {
            PacketType::Host => "host",
            PacketType::Broadcast => "broadcast",
            PacketType::Multicast => "multicast",
            PacketType::OtherHost => "other",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Self::from_str(value).ok().or_else(|| match validators::parse_unsigned::<u8>(value)? {
            0 => Some(PacketType::Host),
            1 => Some(PacketType::Broadcast),
            2 => Some(PacketType::Multicast),
            3 => Some(PacketType::OtherHost),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct PktTypeMatch;

impl Extension for PktTypeMatch {
    fn name(&self) -> &'static str {
        "pkttype"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Match
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn help(&self) -> &'static str {
        "Packet class: host, broadcast, multicast, otherhost"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(PktTypeInfo::default())
    }
}

#[derive(Debug, Default)]
pub struct PktTypeInfo {
    pkt_type: Option<(PacketType, bool)>,
}

impl ExtensionData for PktTypeInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        let value = required_value(option, value)?;
        let pkt_type = PacketType::parse(value).ok_or_else(|| {
            Error::invalid_option(
                option.name,
                value,
                "expected host, broadcast, multicast or otherhost",
            )
        })?;
        self.pkt_type = Some((pkt_type, invert));
        Ok(())
    }

    fn final_check(&self, _entry: &Entry) -> Result<()> {
        if self.pkt_type.is_none() {
            return Err(Error::MissingOption {
                extension: "pkttype",
                option: "--pkttype-type",
            });
        }
        Ok(())
    }

    fn to_nft(&self) -> Vec<Value> {
        self.pkt_type
            .map(|(pkt_type, invert)| meta_match("pkttype", invert, pkt_type.nft_name()))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extension::ExtensionInstance;
    use std::sync::Arc;

    fn instance() -> ExtensionInstance {
        ExtensionInstance::new(Arc::new(PktTypeMatch), 0)
    }

    #[test]
    fn test_names_and_numbers() {
        assert_eq!(PacketType::parse("Broadcast"), Some(PacketType::Broadcast));
        assert_eq!(PacketType::parse("3"), Some(PacketType::OtherHost));
        assert_eq!(PacketType::parse("4"), None);
        assert_eq!(PacketType::parse("loopback"), None);
        assert_eq!(PacketType::OtherHost.number(), 3);
    }

    #[test]
    fn test_otherhost_renders_as_other() {
        let mut m = instance();
        m.parse_option("--pkttype-type", Some("otherhost"), true).unwrap();
        assert_eq!(m.to_nft(), vec![meta_match("pkttype", true, "other")]);
    }

    #[test]
    fn test_requires_type() {
        assert!(instance().final_check(&Entry::new()).is_err());
    }
}
