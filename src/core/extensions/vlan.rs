//! `vlan` match: 802.1Q tag fields

use super::{invalid, required_value};
use crate::core::entry::Entry;
use crate::core::error::{Error, Result};
use crate::core::extension::{Extension, ExtensionData, ExtensionKind, OptionSpec};
use crate::core::nft_json::payload_match;
use crate::validators;
use serde_json::{Value, json};

const ETH_P_8021Q: u16 = 0x8100;
const VLAN_ID_MAX: u16 = 4094;
const VLAN_PRIO_MAX: u8 = 7;

const VLAN_ID: u32 = 0x01;
const VLAN_PRIO: u32 = 0x02;
const VLAN_ENCAP: u32 = 0x04;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("--vlan-id", VLAN_ID),
    OptionSpec::with_arg("--vlan-prio", VLAN_PRIO),
    OptionSpec::with_arg("--vlan-encap", VLAN_ENCAP),
];

#[derive(Debug)]
pub struct VlanMatch;

impl Extension for VlanMatch {
    fn name(&self) -> &'static str {
        "vlan"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Match
    }

    fn options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn help(&self) -> &'static str {
        "802.1Q VLAN id, priority and encapsulated protocol (needs -p 802_1Q)"
    }

    fn allocate(&self) -> Box<dyn ExtensionData> {
        Box::new(VlanInfo::default())
    }
}

#[derive(Debug, Default)]
pub struct VlanInfo {
    id: Option<(u16, bool)>,
    prio: Option<(u8, bool)>,
    encap: Option<(u16, bool)>,
}

impl ExtensionData for VlanInfo {
    fn parse(&mut self, option: &OptionSpec, value: Option<&str>, invert: bool) -> Result<()> {
        let value = required_value(option, value)?;
        match option.bit {
            VLAN_ID => {
                let id = validators::parse_u32(value).map_err(invalid(option, value))?;
                let id = u16::try_from(id)
                    .ok()
                    .filter(|id| *id <= VLAN_ID_MAX)
                    .ok_or_else(|| {
                        Error::invalid_option(option.name, value, "VLAN id must be 0-4094")
                    })?;
                self.id = Some((id, invert));
            }
            VLAN_PRIO => {
                let prio = validators::parse_unsigned::<u8>(value)
                    .filter(|p| *p <= VLAN_PRIO_MAX)
                    .ok_or_else(|| {
                        Error::invalid_option(option.name, value, "priority must be 0-7")
                    })?;
                self.prio = Some((prio, invert));
            }
            VLAN_ENCAP => {
                let encap = validators::parse_ethertype(value)
                    .map_err(invalid(option, value))?
                    .ok_or_else(|| {
                        Error::invalid_option(option.name, value, "LENGTH cannot be encapsulated")
                    })?;
                self.encap = Some((encap, invert));
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
        if entry.requires_protocol(ETH_P_8021Q) {
            Ok(())
        } else {
            Err(Error::MissingOption {
                extension: "vlan",
                option: "-p 802_1Q",
            })
        }
    }

    fn to_nft(&self) -> Vec<Value> {
        let mut expr = Vec::with_capacity(3);
        if let Some((id, invert)) = self.id {
            expr.push(payload_match("vlan", "id", invert, id));
        }
        if let Some((prio, invert)) = self.prio {
            expr.push(payload_match("vlan", "pcp", invert, prio));
        }
        if let Some((encap, invert)) = self.encap {
            let right = validators::ethertype_nft_name(encap)
                .map_or_else(|| json!(encap), |name| json!(name));
            expr.push(payload_match("vlan", "type", invert, right));
        }
        expr
    }
}
