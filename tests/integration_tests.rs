//! Integration tests for ebtc
//!
//! These tests drive the public API end to end: parsing ebtables argument
//! lines, resolving addresses, running the command-state lifecycle against
//! the built-in extensions, and producing nftables JSON batches.
//!
//! ```bash
//! cargo test --test integration_tests
//! ```

#![allow(clippy::uninlined_format_args)]

use ebtc::config::{self, CompatConfig};
use ebtc::core::command_state::Target;
use ebtc::core::extension::ExtensionKind;
use ebtc::core::nft_json::{RuleLocation, RuleTranslation, batch_json};
use ebtc::parse::RuleParser;
use ebtc::{
    CommandState, Error, MacPattern, Phase, Verdict, load_extensions, pack_verdict, resolve,
    unpack_verdict,
};
use serde_json::json;

fn parser() -> RuleParser<'static> {
    RuleParser::default()
}

#[test]
fn test_keyword_and_literal_resolution() {
    assert_eq!(resolve("Broadcast").unwrap(), MacPattern::BROADCAST);
    assert_eq!(resolve("multicast").unwrap(), MacPattern::MULTICAST);

    let exact = resolve("00:1A:2b:3c:4d:5e").unwrap();
    assert!(exact.is_exact());
    assert_eq!(exact.addr_string(), "00:1a:2b:3c:4d:5e");

    let prefixed = resolve("00:1a:2b:3c:4d:5e/24").unwrap();
    assert_eq!(prefixed.addr_string(), "00:1a:2b:00:00:00");
    assert_eq!(prefixed.mask_string(), "ff:ff:ff:00:00:00");

    assert!(matches!(resolve("00:1a:2b:3c:4d:5e/zz"), Err(Error::InvalidMask { .. })));
    assert!(matches!(resolve("not-a-mac"), Err(Error::InvalidAddress { .. })));
}

#[test]
fn test_verdict_packing_survives_extension_bits() {
    for verdict in Verdict::ALL {
        let word = pack_verdict(verdict, 0xFFFF_FFE0);
        assert_eq!(unpack_verdict(word), Some(verdict));
        assert_eq!(word & !0xF, 0xFFFF_FFE0);
    }
}

#[test]
fn test_lifecycle_against_builtin_registry() {
    let registry = load_extensions();
    let mut state = CommandState::new(registry);
    assert_eq!(state.phase(), Phase::Empty);

    state
        .add_match_by_name("pkttype")
        .unwrap()
        .parse_option("--pkttype-type", Some("broadcast"), true)
        .unwrap();
    state.add_watcher_by_name("log").unwrap();
    assert_eq!(state.phase(), Phase::Accumulating);

    // Exclusive extensions attach once per rule
    assert!(matches!(
        state.add_match_by_name("pkttype"),
        Err(Error::DuplicateOption { .. })
    ));
    assert!(matches!(
        state.add_match_by_name("log"),
        Err(Error::UnknownExtension { kind: ExtensionKind::Match, .. })
    ));

    state.set_target("DROP").unwrap();
    assert!(matches!(state.set_target("ACCEPT"), Err(Error::DuplicateOption { .. })));
    state.finalize(Some(Verdict::Continue)).unwrap();
    assert_eq!(state.verdict(), Some(Verdict::Drop));

    let rule = RuleTranslation::new(RuleLocation::append("filter", "INPUT"), &state).unwrap();
    assert_eq!(
        rule.to_nft_text(),
        "add rule bridge filter INPUT meta pkttype != broadcast log level info counter drop"
    );

    state.cleanup();
    state.cleanup();
    assert_eq!(state.phase(), Phase::Released);
    assert!(state.target().is_none());
}

#[test]
fn test_translate_full_rule_to_json() {
    let rule = parser()
        .parse_line(
            "ebtables -I FORWARD 2 -i eth0 -o veth+ -p ARP -s Multicast --limit 10/minute -j ACCEPT",
        )
        .unwrap();

    assert_eq!(
        rule.to_nftables_json(),
        json!({
            "nftables": [{
                "insert": {
                    "rule": {
                        "family": "bridge",
                        "table": "filter",
                        "chain": "FORWARD",
                        "index": 1,
                        "expr": [
                            {"match": {"left": {"meta": {"key": "iifname"}}, "op": "==", "right": "eth0"}},
                            {"match": {"left": {"meta": {"key": "oifname"}}, "op": "==", "right": "veth*"}},
                            {"match": {
                                "left": {"&": [{"payload": {"protocol": "ether", "field": "saddr"}}, "01:00:00:00:00:00"]},
                                "op": "==",
                                "right": "01:00:00:00:00:00"
                            }},
                            {"match": {"left": {"payload": {"protocol": "ether", "field": "type"}}, "op": "==", "right": "arp"}},
                            {"limit": {"rate": 10, "per": "minute", "burst": 5}},
                            {"counter": null},
                            {"accept": null}
                        ]
                    }
                }
            }]
        })
    );
}

#[test]
fn test_mark_target_carries_packed_verdict() {
    let rule = parser()
        .parse_line("-A OUTPUT -j mark --mark-or 0x4 --mark-target CONTINUE")
        .unwrap();
    let Some(Target::Extension(target)) = rule.state().target() else {
        panic!("expected the mark target");
    };
    let word = target.info_word().unwrap();
    assert_eq!(word & !0xF, 0xFFFF_FFE0);
    assert_eq!(unpack_verdict(word), Some(Verdict::Continue));
    assert_eq!(
        rule.to_nft_text(),
        "add rule bridge filter OUTPUT counter meta mark set meta mark | 4 continue"
    );
}

#[test]
fn test_batch_of_rules() {
    let parser = parser();
    let lines = [
        "-A INPUT -d BGA -j DROP",
        "-A FORWARD -p 802_1Q --vlan-id 100 --nflog-group 5",
        "# not a rule",
    ];
    let rules: Vec<RuleTranslation> = lines
        .iter()
        .filter(|l| !l.starts_with('#'))
        .map(|l| parser.parse_line(l).unwrap().into_translation())
        .collect();

    let batch = batch_json(&rules);
    let commands = batch["nftables"].as_array().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["add"]["rule"]["chain"], "INPUT");
    assert_eq!(commands[1]["add"]["rule"]["expr"][3], json!({"counter": null}));
    assert_eq!(commands[1]["add"]["rule"]["expr"][4], json!({"continue": null}));
}

#[test]
fn test_errors_are_reported_per_rule() {
    let parser = parser();
    let cases = [
        ("-A INPUT -s 00:11:22", "address"),
        ("-A INPUT --vlan-id 10", "vlan"),
        ("-A INPUT -j nope", "nope"),
        ("-A INPUT --log-level loud", "--log-level"),
    ];
    for (line, needle) in cases {
        let err = parser.parse_line(line).unwrap_err();
        assert!(
            err.to_string().contains(needle),
            "error for {:?} was {:?}",
            line,
            err.to_string()
        );
    }
}

#[test]
fn test_config_drives_parser() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "default_target": "RETURN",
            "table": "nat",
            "keywords": {"aliases": {"stp": "BGA"}}
        }"#,
    )
    .unwrap();

    let config = config::read_config(&path).unwrap();
    let rule = RuleParser::from_config(&config)
        .parse_line("-A POSTROUTING -d STP")
        .unwrap();
    assert_eq!(rule.location().table, "nat");
    assert_eq!(rule.verdict(), Some(Verdict::Return));
    assert_eq!(rule.state().entry().destination, Some(MacPattern::BRIDGE_GROUP));

    let strict = CompatConfig {
        default_target: None,
        ..CompatConfig::default()
    };
    assert!(matches!(
        RuleParser::from_config(&strict).parse_line("-A INPUT"),
        Err(Error::UnresolvedTarget)
    ));
}
