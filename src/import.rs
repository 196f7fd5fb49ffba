//! Import normalizer and exporter for JSON transaction feeds
//!
//! Three layouts are recognized and normalized into one record shape before
//! a transaction is built from each record:
//! - transaction map: records keyed by arbitrary labels, each with `in` and
//!   `out` arrays carrying asm script text and display-order hashes
//! - unspent snapshot: a top-level `unspent_outputs` array; one partial
//!   transaction is synthesized per distinct hash
//! - address feed: provider envelopes `{status, data: {tx: {...}}}` with
//!   numeric values and unix timestamps
//!
//! The exporter writes the transaction-map layout and always carries raw
//! script hex next to the asm, so an export imports back bit-exact.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDateTime};
use hashlink::LinkedHashMap;
use serde::Deserialize;
use serde_json::{json, Map, Value as Json};
use tracing::{debug, info};

use crate::address::Address;
use crate::amount::{format_coins, parse_coins, parse_value};
use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::script::{Script, ScriptDescriptor};
use crate::transaction::calculate_transaction_size;
use crate::types::*;

pub const PARSE_FAILED: &str = "Transaction data invalid (parse failed)";

/// Detected layout of an import document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    TransactionMap,
    UnspentSnapshot,
    AddressFeed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Recompute every hash and reject records whose supplied hash differs
    pub strict: bool,
}

/// One step of an import run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Accepted(Hash),
    Rejected(String),
    Complete,
    AllInvalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStatus {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStatus {
    pub text: String,
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    hash: Option<String>,
    ver: Option<u32>,
    lock_time: Option<u32>,
    time: Option<Json>,
    #[serde(rename = "in", default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    out: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawPrevOut {
    hash: String,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    prev_out: RawPrevOut,
    #[serde(rename = "scriptSig")]
    script_sig: Option<String>,
    coinbase: Option<String>,
    script: Option<String>,
    sequence: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    index: Option<u64>,
    position: Option<u64>,
    tx_output_n: Option<u64>,
    value: Option<Json>,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: Option<String>,
    script: Option<String>,
    #[serde(alias = "Address")]
    address: Option<String>,
}

/// A record awaiting normalization, or the reason it cannot be normalized
type Pending = std::result::Result<Json, String>;

fn is_address_feed(v: &Json) -> bool {
    v.pointer("/data/tx").is_some()
}

/// Sniff the layout of a parsed document
pub fn detect_format(doc: &Json) -> FeedFormat {
    if doc.get("unspent_outputs").is_some() {
        return FeedFormat::UnspentSnapshot;
    }
    if is_address_feed(doc) {
        return FeedFormat::AddressFeed;
    }
    let any_feed = match doc {
        Json::Object(map) => map.values().any(is_address_feed),
        Json::Array(items) => items.iter().any(is_address_feed),
        _ => false,
    };
    if any_feed {
        FeedFormat::AddressFeed
    } else {
        FeedFormat::TransactionMap
    }
}

/// Error message carried by a provider envelope, if any
pub fn provider_error(v: &Json) -> Option<String> {
    match v.get("status").and_then(Json::as_str) {
        Some(status) if status != "success" => Some(match v.get("data") {
            Some(Json::String(msg)) => msg.clone(),
            Some(Json::Null) | None => format!("provider status {}", status),
            Some(other) => other.to_string(),
        }),
        _ => None,
    }
}

fn reverse_hex(s: &str) -> std::result::Result<String, String> {
    let mut bytes = hex::decode(s.trim()).map_err(|e| format!("bad hash {}: {}", s, e))?;
    bytes.reverse();
    Ok(hex::encode(bytes))
}

fn fixed_coins(v: &Json) -> Json {
    match v {
        Json::Number(n) => match n.as_f64() {
            Some(f) => Json::String(format!("{:.8}", f)),
            None => v.clone(),
        },
        other => other.clone(),
    }
}

/// Rewrite one address-feed envelope into the transaction-map record shape
fn convert_address_feed(entry: &Json) -> std::result::Result<Json, String> {
    let tx = entry
        .pointer("/data/tx")
        .ok_or_else(|| "address feed entry without data.tx".to_string())?;
    let txid = tx
        .get("txid")
        .and_then(Json::as_str)
        .ok_or_else(|| "address feed entry without txid".to_string())?;

    let mut inputs = Vec::new();
    for vin in tx.get("vin").and_then(Json::as_array).into_iter().flatten() {
        let mut input = Map::new();
        if let Some(coinbase) = vin.get("coinbase").and_then(Json::as_str) {
            input.insert(
                "prev_out".into(),
                json!({ "hash": display_hash(&[0u8; 32]), "n": NULL_OUTPUT_INDEX }),
            );
            input.insert("coinbase".into(), json!(coinbase));
        } else {
            input.insert(
                "prev_out".into(),
                json!({
                    "hash": vin.get("txid").cloned().unwrap_or(Json::Null),
                    "n": vin.get("vout").cloned().unwrap_or(Json::Null),
                }),
            );
            if let Some(asm) = vin.pointer("/scriptSig/asm") {
                input.insert("scriptSig".into(), asm.clone());
            }
            if let Some(hex) = vin.pointer("/scriptSig/hex") {
                input.insert("script".into(), hex.clone());
            }
        }
        if let Some(sequence) = vin.get("sequence") {
            input.insert("sequence".into(), sequence.clone());
        }
        inputs.push(Json::Object(input));
    }

    let mut outputs = Vec::new();
    for vout in tx.get("vout").and_then(Json::as_array).into_iter().flatten() {
        let mut output = Map::new();
        if let Some(value) = vout.get("value") {
            output.insert("value".into(), fixed_coins(value));
        }
        if let Some(asm) = vout.pointer("/scriptPubKey/asm") {
            output.insert("scriptPubKey".into(), asm.clone());
        }
        if let Some(hex) = vout.pointer("/scriptPubKey/hex") {
            output.insert("script".into(), hex.clone());
        }
        if let Some(n) = vout.get("n") {
            output.insert("index".into(), n.clone());
        }
        outputs.push(Json::Object(output));
    }

    let time = tx
        .get("time")
        .or_else(|| entry.get("time"))
        .cloned()
        .unwrap_or(Json::Null);

    Ok(json!({
        "hash": txid,
        "time": time,
        "in": inputs,
        "out": outputs,
    }))
}

/// Group unspent-snapshot entries into one partial record per hash
fn group_unspent(entries: &[Json]) -> Vec<Pending> {
    let mut groups: LinkedHashMap<String, Vec<Json>> = LinkedHashMap::new();
    let mut pending = Vec::new();
    for entry in entries {
        let display = match entry.get("tx_hash").and_then(Json::as_str) {
            // snapshot hashes are in internal order
            Some(h) => reverse_hex(h),
            None => Err("unspent entry without tx_hash".to_string()),
        };
        match display {
            Ok(hash) => groups.entry(hash).or_insert_with(Vec::new).push(entry.clone()),
            Err(msg) => pending.push(Err(msg)),
        }
    }
    pending.extend(
        groups
            .into_iter()
            .map(|(hash, outs)| Ok(json!({ "hash": hash, "out": outs }))),
    );
    pending
}

/// Parse a document into its queue of pending records.
/// An `Err` aborts the whole import before anything is inserted.
fn prepare(text: &str) -> std::result::Result<VecDeque<Pending>, String> {
    let doc: Json = serde_json::from_str(text).map_err(|_| PARSE_FAILED.to_string())?;

    if let Some(entries) = doc.get("unspent_outputs") {
        let entries = entries.as_array().map(Vec::as_slice).unwrap_or(&[]);
        return Ok(group_unspent(entries).into());
    }
    if doc.get("out").is_some() {
        return Ok(VecDeque::from(vec![Ok(doc)]));
    }
    if is_address_feed(&doc) {
        if let Some(err) = provider_error(&doc) {
            return Err(err);
        }
        return Ok(VecDeque::from(vec![convert_address_feed(&doc)]));
    }

    let records: Vec<&Json> = match &doc {
        Json::Object(map) => map.values().collect(),
        Json::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };
    let mut queue = VecDeque::with_capacity(records.len());
    for record in records {
        if is_address_feed(record) {
            if let Some(err) = provider_error(record) {
                return Err(err);
            }
            queue.push_back(convert_address_feed(record));
        } else {
            queue.push_back(Ok(record.clone()));
        }
    }
    Ok(queue)
}

/// Records with neither inputs nor outputs are comments and are skipped
fn is_dead_wood(record: &Json) -> bool {
    match record {
        Json::Object(map) => !map.contains_key("in") && !map.contains_key("out"),
        _ => true,
    }
}

fn parse_time(v: &Json) -> Option<i64> {
    match v {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Json::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return Some(secs);
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, EXPORT_TIME_FORMAT) {
                return Some(naive.and_utc().timestamp());
            }
            DateTime::parse_from_rfc3339(s).ok().map(|d| d.timestamp())
        }
        _ => None,
    }
}

fn parse_output_value(v: Option<&Json>) -> Result<Value> {
    match v {
        Some(Json::String(s)) => parse_value(s),
        Some(Json::Number(n)) => match n.as_u64() {
            Some(units) => Ok(units),
            None => match n.as_f64() {
                Some(f) if f >= 0.0 => parse_coins(&format!("{:.8}", f)),
                _ => Err(LedgerError::InvalidValue(format!("bad output value {}", n))),
            },
        },
        _ => Err(LedgerError::Import("tx output value unspecified".into())),
    }
}

fn output_script(out: &RawOutput) -> Result<Script> {
    if let Some(hex) = &out.script {
        return Script::from_hex(hex);
    }
    if let Some(asm) = &out.script_pub_key {
        return Script::from_asm(asm);
    }
    if let Some(address) = &out.address {
        return Ok(Script::pay_to_address(&Address::parse(address)?));
    }
    Err(LedgerError::Import("tx output incomplete".into()))
}

fn input_script(input: &RawInput) -> Result<Script> {
    if let Some(hex) = &input.script {
        return Script::from_hex(hex);
    }
    if let Some(coinbase) = &input.coinbase {
        return Script::from_hex(coinbase);
    }
    match &input.script_sig {
        Some(asm) => Script::from_asm(asm),
        None => Ok(Script::default()),
    }
}

/// Zero-based slot named by an output, if it names one
fn output_slot(out: &RawOutput, ordinal: usize) -> Result<Option<usize>> {
    let slot = match (out.index.or(out.tx_output_n), out.position) {
        (Some(index), _) => Some(index),
        (None, Some(position)) => Some(position.checked_sub(1).ok_or_else(|| {
            LedgerError::Import(format!("Import tx choked on output {}", ordinal))
        })?),
        (None, None) => None,
    };
    match slot {
        Some(s) if s as usize > MAX_OUTPUT_POSITION => Err(LedgerError::Import(format!(
            "Import tx choked on output {}",
            ordinal
        ))),
        Some(s) => Ok(Some(s as usize)),
        None => Ok(None),
    }
}

/// Build a transaction from one normalized record
fn normalize_record(record: Json, options: ImportOptions) -> Result<Transaction> {
    let raw: RawRecord = serde_json::from_value(record)
        .map_err(|e| LedgerError::Import(format!("malformed record: {}", e)))?;

    let mut inputs = Vec::with_capacity(raw.inputs.len());
    for input in &raw.inputs {
        inputs.push(TransactionInput {
            prevout: OutPoint::new(parse_display_hash(&input.prev_out.hash)?, input.prev_out.n),
            script_sig: input_script(input)?,
            sequence: input.sequence.unwrap_or(SEQUENCE_FINAL),
        });
    }
    if raw.hash.is_none() && inputs.is_empty() {
        return Err(LedgerError::Import("no tx inputs and no hash".into()));
    }

    let mut slots: Vec<Option<TransactionOutput>> = Vec::new();
    for (ordinal, out) in raw.out.iter().enumerate() {
        let position = output_slot(out, ordinal)?.unwrap_or(slots.len());
        if slots.len() <= position {
            slots.resize(position + 1, None);
        }
        slots[position] = Some(TransactionOutput {
            value: parse_output_value(out.value.as_ref())?,
            script_pubkey: output_script(out)?,
        });
    }
    if slots.is_empty() {
        return Err(LedgerError::Import("no tx outputs".into()));
    }
    let outputs: Vec<TransactionOutput> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(TransactionOutput::placeholder))
        .collect();

    let version = raw.ver.unwrap_or(DEFAULT_TX_VERSION);
    let lock_time = raw.lock_time.unwrap_or(0);
    let timestamp = raw.time.as_ref().and_then(parse_time);

    let tx = match &raw.hash {
        None => Transaction::new(version, inputs, outputs, lock_time),
        Some(text) => {
            let supplied = parse_display_hash(text)?;
            if options.strict {
                let tx = Transaction::new(version, inputs, outputs, lock_time);
                if tx.hash() != supplied {
                    return Err(LedgerError::HashMismatch(format!(
                        "supplied {} computed {}",
                        text,
                        tx.display_hash()
                    )));
                }
                tx
            } else {
                Transaction::with_hash(supplied, version, inputs, outputs, lock_time)
            }
        }
    };
    Ok(tx.with_timestamp(timestamp))
}

#[derive(Debug)]
enum RunState {
    Unparsed,
    Running(VecDeque<Pending>),
    Done,
}

/// Lazy import run: each `next` normalizes and inserts one record.
///
/// Insertions defer pruning; the ledger is pruned when the run completes.
/// A double spend prunes what was inserted so far and ends the run with
/// an `Err`.
pub struct Importer<'a> {
    text: &'a str,
    ledger: &'a mut Ledger,
    options: ImportOptions,
    state: RunState,
}

impl<'a> Importer<'a> {
    pub fn new(text: &'a str, ledger: &'a mut Ledger, options: ImportOptions) -> Self {
        Self {
            text,
            ledger,
            options,
            state: RunState::Unparsed,
        }
    }

    fn step(&mut self) -> Option<Result<ImportOutcome>> {
        if let RunState::Unparsed = self.state {
            match prepare(self.text) {
                Ok(queue) => self.state = RunState::Running(queue),
                Err(msg) => {
                    info!(error = %msg, "import aborted");
                    self.state = RunState::Done;
                    return Some(Ok(ImportOutcome::AllInvalid(msg)));
                }
            }
        }
        let queue = match &mut self.state {
            RunState::Running(queue) => queue,
            _ => return None,
        };

        loop {
            let pending = match queue.pop_front() {
                Some(pending) => pending,
                None => {
                    self.ledger.prune_spent_outputs();
                    self.state = RunState::Done;
                    return Some(Ok(ImportOutcome::Complete));
                }
            };
            let record = match pending {
                Ok(record) if is_dead_wood(&record) => continue,
                Ok(record) => record,
                Err(msg) => {
                    debug!(reason = %msg, "import record rejected");
                    return Some(Ok(ImportOutcome::Rejected(msg)));
                }
            };
            let tx = match normalize_record(record, self.options) {
                Ok(tx) => tx,
                Err(e) => {
                    debug!(reason = %e, "import record rejected");
                    return Some(Ok(ImportOutcome::Rejected(e.to_string())));
                }
            };
            return match self.ledger.insert(tx, false, true) {
                Ok(hash) => Some(Ok(ImportOutcome::Accepted(hash))),
                Err(e) if e.is_fatal() => {
                    // earlier records in this run were inserted unpruned
                    self.ledger.prune_spent_outputs();
                    self.state = RunState::Done;
                    Some(Err(e))
                }
                Err(e) => Some(Ok(ImportOutcome::Rejected(e.to_string()))),
            };
        }
    }
}

impl Iterator for Importer<'_> {
    type Item = Result<ImportOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}

/// Run an import to completion, then reprocess the ledger.
/// Empty text only reprocesses.
pub fn import_all(text: &str, ledger: &mut Ledger, options: ImportOptions) -> Result<ImportStatus> {
    let mut status = ImportStatus::default();
    if text.trim().is_empty() {
        ledger.reprocess()?;
        return Ok(status);
    }

    let mut failure = None;
    for outcome in Importer::new(text, ledger, options) {
        match outcome? {
            ImportOutcome::Accepted(_) => status.accepted += 1,
            ImportOutcome::Rejected(_) => status.rejected += 1,
            ImportOutcome::Complete => break,
            ImportOutcome::AllInvalid(msg) => {
                failure = Some(msg);
                break;
            }
        }
    }
    ledger.reprocess()?;
    info!(accepted = status.accepted, rejected = status.rejected, "import finished");

    match failure {
        Some(msg) => Err(LedgerError::Import(msg)),
        None => Ok(status),
    }
}

fn format_time(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|d| d.format(EXPORT_TIME_FORMAT).to_string())
}

/// Export one transaction as a transaction-map record keyed by display hash
pub fn export_transaction(tx: &Transaction, network_version: u8) -> (String, Json) {
    let hash = tx.display_hash();
    let mut record = Map::new();
    if tx.has_canonical_hash() {
        record.insert("size".into(), json!(calculate_transaction_size(tx)));
    }
    if let Some(time) = tx.timestamp.and_then(format_time) {
        record.insert("time".into(), json!(time));
    }
    record.insert("hash".into(), json!(hash));
    record.insert("ver".into(), json!(tx.version));
    record.insert("vin_sz".into(), json!(tx.inputs.len()));
    record.insert("vout_sz".into(), json!(tx.outputs.len()));
    record.insert("lock_time".into(), json!(tx.lock_time));

    let inputs: Vec<Json> = tx
        .inputs
        .iter()
        .map(|input| {
            let mut entry = Map::new();
            entry.insert(
                "prev_out".into(),
                json!({ "hash": display_hash(&input.prevout.hash), "n": input.prevout.index }),
            );
            if input.prevout.index == NULL_OUTPUT_INDEX {
                entry.insert("coinbase".into(), json!(input.script_sig.to_hex()));
            } else {
                entry.insert("scriptSig".into(), json!(input.script_sig.to_asm()));
            }
            entry.insert("script".into(), json!(input.script_sig.to_hex()));
            if input.sequence != SEQUENCE_FINAL {
                entry.insert("sequence".into(), json!(input.sequence));
            }
            Json::Object(entry)
        })
        .collect();
    record.insert("in".into(), Json::Array(inputs));

    let outputs: Vec<Json> = tx
        .outputs
        .iter()
        .map(|output| {
            let mut entry = Map::new();
            entry.insert("value".into(), json!(format_coins(output.value)));
            entry.insert("scriptPubKey".into(), json!(output.script_pubkey.to_asm()));
            let info = output.script_pubkey.output_addresses(network_version);
            match info.kind {
                ScriptDescriptor::Address | ScriptDescriptor::Pubkey => {
                    if let Some(address) = info.addresses.first() {
                        entry.insert("Address".into(), json!(address.to_string()));
                    }
                }
                ScriptDescriptor::Multisig => {
                    entry.insert("M".into(), json!(info.m));
                    for (i, address) in info.addresses.iter().enumerate() {
                        entry.insert(format!("N{}", i + 1), json!(address.to_string()));
                    }
                }
                ScriptDescriptor::Data | ScriptDescriptor::Unrecognized => {}
            }
            entry.insert("script".into(), json!(output.script_pubkey.to_hex()));
            Json::Object(entry)
        })
        .collect();
    record.insert("out".into(), Json::Array(outputs));

    (hash, Json::Object(record))
}

/// Add one transaction to an export document by re-parsing it.
/// Every intermediate document is valid JSON.
pub fn export_add_transaction(document: &str, tx: &Transaction, network_version: u8) -> Result<String> {
    let mut doc: Json = serde_json::from_str(document)?;
    let map = doc
        .as_object_mut()
        .ok_or_else(|| LedgerError::Serialization("export document is not an object".into()))?;
    let (hash, record) = export_transaction(tx, network_version);
    map.insert(hash, record);
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Export every transaction of the ledger in insertion order
pub fn export_all(ledger: &Ledger) -> ExportStatus {
    let mut status = ExportStatus {
        text: "{}".to_string(),
        ..Default::default()
    };
    for tx in ledger.transactions() {
        match export_add_transaction(&status.text, tx, ledger.network_version()) {
            Ok(text) => {
                status.text = text;
                status.accepted += 1;
            }
            Err(e) => {
                debug!(tx = %tx.display_hash(), error = %e, "export failed");
                status.rejected += 1;
            }
        }
    }
    status
}
