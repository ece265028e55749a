//! Base (non-extension) part of a bridge rule
//!
//! Holds the link-layer criteria every rule can carry without loading an
//! extension: protocol, interfaces, logical (bridge) interfaces and MAC
//! patterns, each optionally inverted.

use crate::core::error::{Error, Result};
use crate::core::extension::{OptionFlags, OptionSpec};
use crate::core::mac::{MacPattern, MacResolver};
use crate::validators;
use bitflags::bitflags;

bitflags! {
    /// Which base criteria are present
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u32 {
        const ENTRY_OR_ENTRIES = 0x01;
        const NOPROTO = 0x02;
        const IEEE_802_3 = 0x04;
        const SOURCEMAC = 0x08;
        const DESTMAC = 0x10;
    }
}

bitflags! {
    /// Which base criteria are inverted
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InvFlags: u32 {
        const IPROTO = 0x01;
        const IIN = 0x02;
        const IOUT = 0x04;
        const ISOURCE = 0x08;
        const IDEST = 0x10;
        const ILOGICALIN = 0x20;
        const ILOGICALOUT = 0x40;
    }
}

const OPT_PROTOCOL: u32 = 0x01;
const OPT_SOURCE: u32 = 0x02;
const OPT_DEST: u32 = 0x04;
const OPT_IN: u32 = 0x08;
const OPT_OUT: u32 = 0x10;
const OPT_LOGICALIN: u32 = 0x20;
const OPT_LOGICALOUT: u32 = 0x40;

pub const BASE_OPTIONS: &[OptionSpec] = &[
    OptionSpec::with_arg("-p", OPT_PROTOCOL),
    OptionSpec::with_arg("--protocol", OPT_PROTOCOL),
    OptionSpec::with_arg("--proto", OPT_PROTOCOL),
    OptionSpec::with_arg("-s", OPT_SOURCE),
    OptionSpec::with_arg("--source", OPT_SOURCE),
    OptionSpec::with_arg("--src", OPT_SOURCE),
    OptionSpec::with_arg("-d", OPT_DEST),
    OptionSpec::with_arg("--destination", OPT_DEST),
    OptionSpec::with_arg("--dst", OPT_DEST),
    OptionSpec::with_arg("-i", OPT_IN),
    OptionSpec::with_arg("--in-interface", OPT_IN),
    OptionSpec::with_arg("--in-if", OPT_IN),
    OptionSpec::with_arg("-o", OPT_OUT),
    OptionSpec::with_arg("--out-interface", OPT_OUT),
    OptionSpec::with_arg("--out-if", OPT_OUT),
    OptionSpec::with_arg("--logical-in", OPT_LOGICALIN),
    OptionSpec::with_arg("--logical-out", OPT_LOGICALOUT),
];

/// Base criteria of one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub bitmask: EntryFlags,
    pub invflags: InvFlags,
    /// Ethertype in host order; meaningless while `NOPROTO` or `IEEE_802_3`
    /// is set
    pub ethproto: u16,
    pub in_iface: Option<String>,
    pub out_iface: Option<String>,
    pub logical_in: Option<String>,
    pub logical_out: Option<String>,
    pub source: Option<MacPattern>,
    pub destination: Option<MacPattern>,
    flags: OptionFlags,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    pub fn new() -> Self {
        Self {
            bitmask: EntryFlags::ENTRY_OR_ENTRIES | EntryFlags::NOPROTO,
            invflags: InvFlags::empty(),
            ethproto: 0,
            in_iface: None,
            out_iface: None,
            logical_in: None,
            logical_out: None,
            source: None,
            destination: None,
            flags: OptionFlags::default(),
        }
    }

    pub fn is_base_option(option: &str) -> bool {
        BASE_OPTIONS.iter().any(|o| o.name == option)
    }

    /// The ethertype the rule is restricted to, if any (inversion aside).
    pub fn protocol(&self) -> Option<u16> {
        if self
            .bitmask
            .intersects(EntryFlags::NOPROTO | EntryFlags::IEEE_802_3)
        {
            None
        } else {
            Some(self.ethproto)
        }
    }

    /// True when the rule positively selects `ethertype`.
    pub fn requires_protocol(&self, ethertype: u16) -> bool {
        self.protocol() == Some(ethertype) && !self.invflags.contains(InvFlags::IPROTO)
    }

    /// Parses one base option.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownOption`] for non-base options
    /// - [`Error::DuplicateOption`] when an option is repeated
    /// - [`Error::InvalidProtocol`], [`Error::InvalidInterface`],
    ///   [`Error::InvalidAddress`], [`Error::InvalidMask`] for bad values
    pub fn parse_option(
        &mut self,
        option: &str,
        value: &str,
        invert: bool,
        resolver: &MacResolver,
    ) -> Result<()> {
        let spec = BASE_OPTIONS
            .iter()
            .find(|o| o.name == option)
            .ok_or_else(|| Error::UnknownOption {
                option: option.to_string(),
            })?;
        self.flags.check(spec.bit, option)?;

        match spec.bit {
            OPT_PROTOCOL => {
                self.bitmask.remove(EntryFlags::NOPROTO);
                match validators::parse_ethertype(value) {
                    Ok(None) => self.bitmask.insert(EntryFlags::IEEE_802_3),
                    Ok(Some(ethertype)) => self.ethproto = ethertype,
                    Err(_) => {
                        return Err(Error::InvalidProtocol {
                            token: value.to_string(),
                        });
                    }
                }
                self.invflags.set(InvFlags::IPROTO, invert);
            }
            OPT_SOURCE => {
                self.source = Some(resolver.resolve(value)?);
                self.bitmask.insert(EntryFlags::SOURCEMAC);
                self.invflags.set(InvFlags::ISOURCE, invert);
            }
            OPT_DEST => {
                self.destination = Some(resolver.resolve(value)?);
                self.bitmask.insert(EntryFlags::DESTMAC);
                self.invflags.set(InvFlags::IDEST, invert);
            }
            OPT_IN => {
                self.in_iface = Some(interface(value)?);
                self.invflags.set(InvFlags::IIN, invert);
            }
            OPT_OUT => {
                self.out_iface = Some(interface(value)?);
                self.invflags.set(InvFlags::IOUT, invert);
            }
            OPT_LOGICALIN => {
                self.logical_in = Some(interface(value)?);
                self.invflags.set(InvFlags::ILOGICALIN, invert);
            }
            OPT_LOGICALOUT => {
                self.logical_out = Some(interface(value)?);
                self.invflags.set(InvFlags::ILOGICALOUT, invert);
            }
            _ => {
                return Err(Error::UnknownOption {
                    option: option.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn interface(value: &str) -> Result<String> {
    validators::validate_interface(value).map_err(|reason| Error::InvalidInterface {
        name: value.to_string(),
        reason,
    })
}
