//! nftables JSON and text rendering for translated bridge rules
//!
//! A finalized [`CommandState`] becomes one `add rule` (or `insert rule`)
//! command in the `bridge` family. Expressions are emitted in evaluation
//! order: base entry, matches, watchers, `counter`, then the target.

use crate::core::command_state::{CommandState, Phase, Target};
use crate::core::entry::{Entry, EntryFlags, InvFlags};
use crate::core::error::{Error, Result};
use crate::core::mac::MacPattern;
use crate::core::verdict::Verdict;
use crate::validators::{self, ETH_P_MIN};
use serde_json::{Value, json};
use std::fmt::Write;

pub const FAMILY: &str = "bridge";

// ═══════════════════════════════════════════════════════════════════════════
// JSON Helper Functions
// ═══════════════════════════════════════════════════════════════════════════

pub fn op(invert: bool) -> &'static str {
    if invert { "!=" } else { "==" }
}

pub fn meta(key: &str) -> Value {
    json!({ "meta": { "key": key } })
}

pub fn payload(protocol: &str, field: &str) -> Value {
    json!({ "payload": { "protocol": protocol, "field": field } })
}

/// `left & mask`
pub fn masked(left: Value, mask: impl serde::Serialize) -> Value {
    json!({ "&": [left, mask] })
}

pub fn match_expr(left: Value, op: &str, right: impl serde::Serialize) -> Value {
    json!({
        "match": {
            "left": left,
            "op": op,
            "right": right
        }
    })
}

/// Creates a match expression for nft meta keys (iifname, mark, pkttype, etc.)
pub fn meta_match(key: &str, invert: bool, value: impl serde::Serialize) -> Value {
    match_expr(meta(key), op(invert), value)
}

pub fn payload_match(
    protocol: &str,
    field: &str,
    invert: bool,
    value: impl serde::Serialize,
) -> Value {
    match_expr(payload(protocol, field), op(invert), value)
}

/// `{"range": [lo, hi]}`, or the bare value when `lo == hi`
pub fn range_or_single(lo: u16, hi: u16) -> Value {
    if lo == hi {
        json!(lo)
    } else {
        json!({ "range": [lo, hi] })
    }
}

pub fn verdict_expr(verdict: Verdict) -> Value {
    let mut statement = serde_json::Map::new();
    statement.insert(verdict.nft_keyword().to_string(), Value::Null);
    Value::Object(statement)
}

// ═══════════════════════════════════════════════════════════════════════════

/// Where a translated rule goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLocation {
    pub table: String,
    pub chain: String,
    /// 1-based insert position; `None` appends
    pub position: Option<u32>,
}

impl RuleLocation {
    pub fn append(table: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            chain: chain.into(),
            position: None,
        }
    }
}

/// nftables rendering of one finalized rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTranslation {
    pub location: RuleLocation,
    pub expr: Vec<Value>,
}

impl RuleTranslation {
    /// Renders a finalized command state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the state is finalized.
    pub fn new(location: RuleLocation, state: &CommandState<'_>) -> Result<Self> {
        if state.phase() != Phase::Finalized {
            return Err(Error::InvalidState {
                operation: "translate",
                phase: state.phase(),
            });
        }

        let mut expr = Vec::with_capacity(8 + state.matches().len() + state.watchers().len());
        entry_expressions(state.entry(), &mut expr);
        for instance in state.matches().iter().chain(state.watchers()) {
            expr.extend(instance.to_nft());
        }
        expr.push(json!({ "counter": null }));
        match state.target() {
            Some(Target::Standard(verdict)) => expr.push(verdict_expr(*verdict)),
            Some(Target::Extension(instance)) => expr.extend(instance.to_nft()),
            None => return Err(Error::UnresolvedTarget),
        }

        Ok(Self { location, expr })
    }

    /// The bare `add`/`insert` command object
    pub fn rule_command(&self) -> Value {
        let mut rule = json!({
            "family": FAMILY,
            "table": self.location.table,
            "chain": self.location.chain,
            "expr": self.expr,
        });
        match self.location.position {
            Some(position) => {
                rule["index"] = json!(position.saturating_sub(1));
                json!({ "insert": { "rule": rule } })
            }
            None => json!({ "add": { "rule": rule } }),
        }
    }

    pub fn to_nftables_json(&self) -> Value {
        json!({ "nftables": [self.rule_command()] })
    }

    /// Generates the equivalent `nft` command line (without the leading
    /// `nft`).
    pub fn to_nft_text(&self) -> String {
        let mut out = String::new();
        match self.location.position {
            Some(position) => {
                let _ = write!(
                    out,
                    "insert rule {FAMILY} {} {} index {}",
                    self.location.table,
                    self.location.chain,
                    position.saturating_sub(1)
                );
            }
            None => {
                let _ = write!(
                    out,
                    "add rule {FAMILY} {} {}",
                    self.location.table, self.location.chain
                );
            }
        }
        for expr in &self.expr {
            let _ = write!(out, " {}", expr_text(expr));
        }
        out
    }
}

/// Wraps several rules in one `{"nftables": [...]}` batch.
pub fn batch_json(rules: &[RuleTranslation]) -> Value {
    let commands: Vec<Value> = rules.iter().map(RuleTranslation::rule_command).collect();
    json!({ "nftables": commands })
}

fn entry_expressions(entry: &Entry, expr: &mut Vec<Value>) {
    let interfaces = [
        ("iifname", &entry.in_iface, InvFlags::IIN),
        ("oifname", &entry.out_iface, InvFlags::IOUT),
        ("ibrname", &entry.logical_in, InvFlags::ILOGICALIN),
        ("obrname", &entry.logical_out, InvFlags::ILOGICALOUT),
    ];
    for (key, name, flag) in interfaces {
        if let Some(name) = name {
            expr.push(meta_match(
                key,
                entry.invflags.contains(flag),
                validators::nft_interface(name),
            ));
        }
    }

    if let Some(source) = &entry.source {
        expr.push(mac_match("saddr", source, entry.invflags.contains(InvFlags::ISOURCE)));
    }
    if let Some(destination) = &entry.destination {
        expr.push(mac_match("daddr", destination, entry.invflags.contains(InvFlags::IDEST)));
    }

    let invert = entry.invflags.contains(InvFlags::IPROTO);
    if entry.bitmask.contains(EntryFlags::IEEE_802_3) {
        // 802.3 frames carry a length, not a type, in the ethertype field
        let op = if invert { ">=" } else { "<" };
        expr.push(match_expr(payload("ether", "type"), op, ETH_P_MIN));
    } else if let Some(ethertype) = entry.protocol() {
        let right = validators::ethertype_nft_name(ethertype)
            .map_or_else(|| json!(ethertype), |name| json!(name));
        expr.push(match_expr(payload("ether", "type"), op(invert), right));
    }
}

fn mac_match(field: &str, pattern: &MacPattern, invert: bool) -> Value {
    let left = if pattern.is_exact() {
        payload("ether", field)
    } else {
        masked(payload("ether", field), pattern.mask_string())
    };
    match_expr(left, op(invert), pattern.addr_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Text rendering
// ═══════════════════════════════════════════════════════════════════════════

/// Renders one JSON statement in nft syntax.
pub fn expr_text(expr: &Value) -> String {
    let Some((key, body)) = expr.as_object().and_then(|o| o.iter().next()) else {
        return expr.to_string();
    };

    match key.as_str() {
        "match" => {
            let left = operand_text(&body["left"]);
            let right = operand_text(&body["right"]);
            match body["op"].as_str().unwrap_or("==") {
                "==" => format!("{left} {right}"),
                op => format!("{left} {op} {right}"),
            }
        }
        "counter" => "counter".to_string(),
        "limit" => {
            let mut out = format!(
                "limit rate {}/{}",
                body["rate"],
                body["per"].as_str().unwrap_or("second")
            );
            if let Some(burst) = body.get("burst") {
                let _ = write!(out, " burst {burst} packets");
            }
            out
        }
        "log" => {
            let mut out = "log".to_string();
            if let Some(group) = body.get("group") {
                let _ = write!(out, " group {group}");
            }
            if let Some(prefix) = body.get("prefix").and_then(Value::as_str) {
                let _ = write!(out, " prefix \"{prefix}\"");
            }
            if let Some(level) = body.get("level").and_then(Value::as_str) {
                let _ = write!(out, " level {level}");
            }
            out
        }
        "mangle" => format!(
            "{} set {}",
            operand_text(&body["key"]),
            operand_text(&body["value"])
        ),
        "accept" | "drop" | "continue" | "return" => key.clone(),
        _ => expr.to_string(),
    }
}

fn operand_text(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if s.chars().all(|c| c.is_ascii_alphanumeric() || ":._-/".contains(c)) {
                s.clone()
            } else {
                format!("\"{s}\"")
            }
        }
        Value::Object(map) => {
            if let Some(meta) = map.get("meta") {
                return format!("meta {}", meta["key"].as_str().unwrap_or_default());
            }
            if let Some(payload) = map.get("payload") {
                return format!(
                    "{} {}",
                    payload["protocol"].as_str().unwrap_or_default(),
                    payload["field"].as_str().unwrap_or_default()
                );
            }
            if let Some(prefix) = map.get("prefix") {
                return format!("{}/{}", prefix["addr"].as_str().unwrap_or_default(), prefix["len"]);
            }
            if let Some(range) = map.get("range").and_then(Value::as_array) {
                let bounds: Vec<String> = range.iter().map(operand_text).collect();
                return bounds.join("-");
            }
            if let Some(set) = map.get("set").and_then(Value::as_array) {
                let items: Vec<String> = set.iter().map(operand_text).collect();
                return format!("{{ {} }}", items.join(", "));
            }
            for binop in ["&", "|", "^"] {
                let operands = map.get(binop).and_then(Value::as_array).map(Vec::as_slice);
                if let Some([left, right]) = operands {
                    return format!("{} {binop} {}", operand_text(left), operand_text(right));
                }
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}
