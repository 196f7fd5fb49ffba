//! Ledger index: transactions by hash plus derived output partitions
//!
//! Every positive-value output of an indexed transaction lives in exactly one
//! of three partitions:
//! - `unspent`: payable to this wallet and not known to be consumed
//! - `exit`: not spendable by this wallet and not known to be consumed
//! - `pruned`: consumed by an input of another indexed transaction
//!
//! `all_outputs` is their union. Partitions are derived data: `reprocess`
//! rebuilds them from the transaction map.

use hashlink::LinkedHashMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::address::Address;
use crate::error::{LedgerError, Result};
use crate::keys::{hash160, Key};
use crate::script::{InputKind, Script, ScriptDescriptor, ScriptKind};
use crate::types::*;

/// Which set of outputs a query runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    All,
    Unspent,
    Exit,
    Pruned,
}

/// What the ledger tracks: bare addresses or signing keys
#[derive(Debug, Clone)]
pub enum Identity {
    Watch(Vec<Address>),
    Signing(Vec<Key>),
}

/// Output summary returned by queries and selection statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub outpoint: OutPoint,
    pub value: Value,
    pub timestamp: Option<i64>,
    pub kind: ScriptDescriptor,
    pub m: usize,
    pub addresses: Vec<Address>,
    pub confirmed: bool,
    pub data: ByteString,
    pub memo: String,
}

impl OutputRecord {
    /// Number of addresses in the output script
    pub fn n(&self) -> usize {
        self.addresses.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputQuery {
    pub records: Vec<OutputRecord>,
    /// Value of matched outputs whose transaction is unconfirmed
    pub unconfirmed: Value,
}

/// Conjunctive output filter; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct OutputFilter {
    pub tx_hash: Option<Hash>,
    pub index: Option<u32>,
    pub min_date: Option<i64>,
    pub max_date: Option<i64>,
    pub eq_value: Option<Value>,
    pub min_value: Option<Value>,
    pub max_value: Option<Value>,
    pub kind: Option<ScriptDescriptor>,
    /// Matches when any address of the output equals this one
    pub address: Option<Address>,
    /// Matches when the address at the given position equals this one
    pub address_at: Option<(usize, Address)>,
    pub eq_m: Option<usize>,
    pub min_m: Option<usize>,
    pub max_m: Option<usize>,
    pub eq_n: Option<usize>,
    pub min_n: Option<usize>,
    pub max_n: Option<usize>,
    /// Data payload prefix, compared at `data_offset`
    pub data: Option<ByteString>,
    pub data_offset: usize,
    /// Memo text prefix, compared at `memo_offset`
    pub memo: Option<String>,
    pub memo_offset: usize,
}

impl OutputFilter {
    fn matches(&self, record: &OutputRecord) -> bool {
        let date_ok = |bound: Option<i64>, cmp: fn(i64, i64) -> bool| match bound {
            None => true,
            Some(b) => record.timestamp.map_or(false, |t| cmp(t, b)),
        };
        let within = |v: usize, eq: Option<usize>, min: Option<usize>, max: Option<usize>| {
            eq.map_or(true, |e| v == e)
                && min.map_or(true, |m| v >= m)
                && max.map_or(true, |m| v <= m)
        };

        self.tx_hash.map_or(true, |h| h == record.outpoint.hash)
            && self.index.map_or(true, |i| i == record.outpoint.index)
            && date_ok(self.min_date, |t, b| t >= b)
            && date_ok(self.max_date, |t, b| t <= b)
            && self.eq_value.map_or(true, |v| record.value == v)
            && self.min_value.map_or(true, |v| record.value >= v)
            && self.max_value.map_or(true, |v| record.value <= v)
            && self.kind.map_or(true, |k| record.kind == k)
            && self
                .address
                .map_or(true, |a| record.addresses.contains(&a))
            && self
                .address_at
                .map_or(true, |(i, a)| record.addresses.get(i) == Some(&a))
            && within(record.m, self.eq_m, self.min_m, self.max_m)
            && within(record.n(), self.eq_n, self.min_n, self.max_n)
            && self.data.as_ref().map_or(true, |prefix| {
                record.kind == ScriptDescriptor::Data
                    && record
                        .data
                        .get(self.data_offset..)
                        .map_or(false, |d| d.starts_with(prefix))
            })
            && self.memo.as_ref().map_or(true, |prefix| {
                record.kind == ScriptDescriptor::Data
                    && record
                        .memo
                        .chars()
                        .skip(self.memo_offset)
                        .collect::<String>()
                        .starts_with(prefix.as_str())
            })
    }
}

/// Input summary returned by input queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub tx_hash: Hash,
    pub index: u32,
    pub prevout: OutPoint,
    pub kind: InputKind,
    pub addresses: Vec<Address>,
    pub pubkeys: Vec<ByteString>,
}

#[derive(Debug, Clone, Default)]
pub struct InputFilter {
    pub tx_hash: Option<Hash>,
    pub ref_tx_hash: Option<Hash>,
    pub ref_index: Option<u32>,
    pub kind: Option<InputKind>,
    pub address: Option<Address>,
    pub pubkey: Option<ByteString>,
}

impl InputFilter {
    fn matches(&self, record: &InputRecord) -> bool {
        self.tx_hash.map_or(true, |h| h == record.tx_hash)
            && self.ref_tx_hash.map_or(true, |h| h == record.prevout.hash)
            && self.ref_index.map_or(true, |i| i == record.prevout.index)
            && self.kind.map_or(true, |k| k == record.kind)
            && self
                .address
                .map_or(true, |a| record.addresses.contains(&a))
            && self
                .pubkey
                .as_ref()
                .map_or(true, |pk| record.pubkeys.contains(pk))
    }
}

/// Totals over the unspent partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub total: Value,
    /// Confirmed spendable value
    pub available: Value,
    pub unconfirmed: Value,
}

/// True when the owned hashes satisfy the script's signature requirement
pub fn is_spendable_by(script: &Script, owned: &HashSet<PubkeyHash>) -> bool {
    match script.classify() {
        ScriptKind::PayToAddress(hash) => owned.contains(&hash),
        ScriptKind::PayToPubkey(pk) => owned.contains(&hash160(&pk)),
        ScriptKind::Multisig { m, pubkeys } => {
            pubkeys
                .iter()
                .filter(|pk| owned.contains(&hash160(pk)))
                .count()
                >= m
        }
        ScriptKind::Data(_) | ScriptKind::Unrecognized => false,
    }
}

#[derive(Debug, Clone, Default)]
struct DerivedIndex {
    all_outputs: Vec<OutPoint>,
    unspent: Vec<OutPoint>,
    exit: Vec<OutPoint>,
    pruned: Vec<OutPoint>,
    pruned_index: HashSet<OutPoint>,
    consumed_by: HashMap<OutPoint, InputRef>,
    tx_count: usize,
}

impl DerivedIndex {
    /// Index one transaction. Nothing is modified when an input collides.
    fn add(&mut self, tx: &Transaction, owned: &HashSet<PubkeyHash>) -> Result<()> {
        // 1. Reject outpoints already consumed, including twice by this tx
        let mut claimed = HashSet::new();
        for input in tx.inputs.iter().filter(|i| !i.prevout.is_null()) {
            if self.consumed_by.contains_key(&input.prevout) || !claimed.insert(input.prevout) {
                warn!(tx = %tx.display_hash(), outpoint = %input.prevout, "double spend detected");
                return Err(LedgerError::DoubleSpend(format!(
                    "outpoint {} consumed twice",
                    input.prevout
                )));
            }
        }

        // 2. Partition positive-value outputs
        for (i, output) in tx.outputs.iter().enumerate() {
            if output.value == 0 {
                continue;
            }
            let outpoint = tx.outpoint(i as u32);
            self.all_outputs.push(outpoint);
            if is_spendable_by(&output.script_pubkey, owned) {
                self.unspent.push(outpoint);
            } else {
                self.exit.push(outpoint);
            }
        }

        // 3. Record consumed outpoints
        for (j, input) in tx.inputs.iter().enumerate() {
            if input.prevout.is_null() {
                continue;
            }
            self.consumed_by.insert(
                input.prevout,
                InputRef {
                    tx_hash: tx.hash(),
                    index: j as u32,
                },
            );
        }

        self.tx_count += 1;
        Ok(())
    }

    fn prune(&mut self) {
        let consumed = &self.consumed_by;
        let mut moved = Vec::new();
        for list in [&mut self.unspent, &mut self.exit] {
            list.retain(|op| {
                if consumed.contains_key(op) {
                    moved.push(*op);
                    false
                } else {
                    true
                }
            });
        }
        for op in moved {
            if self.pruned_index.insert(op) {
                self.pruned.push(op);
            }
        }
    }
}

/// Client-side transaction ledger for one wallet
#[derive(Debug, Clone)]
pub struct Ledger {
    network_version: u8,
    identity: Identity,
    owned: HashSet<PubkeyHash>,
    transactions: LinkedHashMap<Hash, Transaction>,
    index: DerivedIndex,
}

impl Ledger {
    /// Empty watch ledger for the given address version
    pub fn new(network_version: u8) -> Self {
        Self {
            network_version,
            identity: Identity::Watch(Vec::new()),
            owned: HashSet::new(),
            transactions: LinkedHashMap::new(),
            index: DerivedIndex::default(),
        }
    }

    pub fn watch(network_version: u8, addresses: &[Address]) -> Self {
        let mut ledger = Self::new(network_version);
        ledger.set_identity(Identity::Watch(dedupe_addresses(addresses)));
        ledger
    }

    pub fn with_keys(network_version: u8, keys: Vec<Key>) -> Self {
        let mut ledger = Self::new(network_version);
        ledger.set_identity(Identity::Signing(keys));
        ledger
    }

    fn set_identity(&mut self, identity: Identity) {
        self.owned = match &identity {
            Identity::Watch(addresses) => addresses.iter().map(|a| *a.hash()).collect(),
            Identity::Signing(keys) => keys.iter().map(Key::pubkey_hash).collect(),
        };
        self.identity = identity;
    }

    pub fn network_version(&self) -> u8 {
        self.network_version
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_watch_only(&self) -> bool {
        matches!(self.identity, Identity::Watch(_))
    }

    /// Tracked addresses, derived from keys for a signing ledger
    pub fn addresses(&self) -> Vec<Address> {
        match &self.identity {
            Identity::Watch(addresses) => addresses.clone(),
            Identity::Signing(keys) => keys
                .iter()
                .map(|k| k.address(self.network_version))
                .collect(),
        }
    }

    pub fn keys(&self) -> &[Key] {
        match &self.identity {
            Identity::Signing(keys) => keys,
            Identity::Watch(_) => &[],
        }
    }

    pub fn key_for(&self, hash: &PubkeyHash) -> Option<&Key> {
        self.keys().iter().find(|k| &k.pubkey_hash() == hash)
    }

    pub fn owns(&self, hash: &PubkeyHash) -> bool {
        self.owned.contains(hash)
    }

    /// Add watch addresses. A signing ledger, or `reset`, starts from an empty list.
    pub fn add_addresses(&mut self, addresses: &[Address], reset: bool) -> Result<()> {
        let mut current = match (&self.identity, reset) {
            (Identity::Watch(existing), false) => existing.clone(),
            _ => Vec::new(),
        };
        current.extend_from_slice(addresses);
        self.set_identity(Identity::Watch(dedupe_addresses(&current)));
        self.reprocess()
    }

    /// Switch to a signing identity over `keys` and rebuild derived state
    pub fn replace_keys(&mut self, keys: Vec<Key>) -> Result<()> {
        self.set_identity(Identity::Signing(keys));
        self.reprocess()
    }

    /// Insert a transaction.
    ///
    /// Re-inserting a known hash only advances its confirmed flag. With
    /// `defer_prune` the caller must run `prune_spent_outputs` after the batch.
    pub fn insert(&mut self, mut tx: Transaction, unconfirmed: bool, defer_prune: bool) -> Result<Hash> {
        let hash = tx.hash();
        if let Some(existing) = self.transactions.get_mut(&hash) {
            if !unconfirmed && !existing.is_confirmed() {
                existing.set_confirmed(true);
            }
            return Ok(hash);
        }

        tx.set_confirmed(!unconfirmed);
        self.index.add(&tx, &self.owned)?;
        debug!(tx = %tx.display_hash(), confirmed = !unconfirmed, "indexed transaction");
        self.transactions.insert(hash, tx);

        if !defer_prune {
            self.prune_spent_outputs();
        }
        Ok(hash)
    }

    /// Move consumed outputs from `unspent` and `exit` into `pruned`
    pub fn prune_spent_outputs(&mut self) {
        self.index.prune();
    }

    /// Rebuild every derived structure from the transaction map, in insertion order
    pub fn reprocess(&mut self) -> Result<()> {
        let mut index = DerivedIndex::default();
        for tx in self.transactions.values() {
            index.add(tx, &self.owned)?;
        }
        index.prune();
        self.index = index;
        Ok(())
    }

    /// Remove a transaction. With `only_if_unconfirmed`, confirmed ones are kept.
    pub fn remove(&mut self, hash: &Hash, only_if_unconfirmed: bool) -> Result<bool> {
        match self.transactions.get(hash) {
            None => return Ok(false),
            Some(tx) if only_if_unconfirmed && tx.is_confirmed() => return Ok(false),
            Some(_) => {}
        }
        self.transactions.remove(hash);
        debug!(tx = %display_hash(hash), "removed transaction");
        self.reprocess()?;
        Ok(true)
    }

    /// Mark a transaction confirmed so its outputs become selectable
    pub fn confirm(&mut self, hash: &Hash) -> Result<bool> {
        match self.transactions.get_mut(hash) {
            Some(tx) if !tx.is_confirmed() => {
                tx.set_confirmed(true);
            }
            _ => return Ok(false),
        }
        self.reprocess()?;
        Ok(true)
    }

    /// Drop every transaction, keeping the identity
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.index = DerivedIndex::default();
        debug!("cleared ledger");
    }

    pub fn transaction(&self, hash: &Hash) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Transactions in insertion order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn transaction_count(&self) -> usize {
        self.index.tx_count
    }

    pub fn partition(&self, partition: Partition) -> &[OutPoint] {
        match partition {
            Partition::All => &self.index.all_outputs,
            Partition::Unspent => &self.index.unspent,
            Partition::Exit => &self.index.exit,
            Partition::Pruned => &self.index.pruned,
        }
    }

    pub fn unspent(&self) -> &[OutPoint] {
        &self.index.unspent
    }

    pub fn output(&self, outpoint: &OutPoint) -> Option<&TransactionOutput> {
        self.transactions
            .get(&outpoint.hash)
            .and_then(|tx| tx.outputs.get(outpoint.index as usize))
    }

    pub fn is_output_pruned(&self, outpoint: &OutPoint) -> bool {
        self.index.pruned_index.contains(outpoint)
    }

    /// The input consuming `outpoint`, if indexed
    pub fn consumer_of(&self, outpoint: &OutPoint) -> Option<InputRef> {
        self.index.consumed_by.get(outpoint).copied()
    }

    pub fn is_output_script_spendable(&self, script: &Script) -> bool {
        is_spendable_by(script, &self.owned)
    }

    /// Summary of one output of an indexed transaction
    pub fn output_record(&self, outpoint: &OutPoint) -> Option<OutputRecord> {
        let tx = self.transactions.get(&outpoint.hash)?;
        let output = tx.outputs.get(outpoint.index as usize)?;
        let info = output.script_pubkey.output_addresses(self.network_version);
        let memo = info.data_text().unwrap_or_default();
        Some(OutputRecord {
            outpoint: *outpoint,
            value: output.value,
            timestamp: tx.timestamp,
            kind: info.kind,
            m: info.m,
            addresses: info.addresses,
            confirmed: tx.is_confirmed(),
            data: info.data.unwrap_or_default(),
            memo,
        })
    }

    /// Alias of `output_record`
    pub fn output_stats(&self, outpoint: &OutPoint) -> Option<OutputRecord> {
        self.output_record(outpoint)
    }

    /// Select outputs of a partition matching every set filter field.
    ///
    /// Over `Partition::All` with a transaction hash filter, only that
    /// transaction's positive-value outputs are scanned.
    pub fn query_outputs(&self, partition: Partition, filter: &OutputFilter) -> OutputQuery {
        let candidates: Vec<OutPoint> = match (partition, filter.tx_hash) {
            (Partition::All, Some(hash)) => match self.transactions.get(&hash) {
                None => Vec::new(),
                Some(tx) => match filter.index {
                    Some(i) if (i as usize) < tx.outputs.len() => vec![tx.outpoint(i)],
                    Some(_) => Vec::new(),
                    None => (0..tx.outputs.len() as u32).map(|i| tx.outpoint(i)).collect(),
                },
            },
            _ => self.partition(partition).to_vec(),
        };

        let mut result = OutputQuery::default();
        for outpoint in candidates {
            let record = match self.output_record(&outpoint) {
                Some(record) if record.value > 0 => record,
                _ => continue,
            };
            if filter.matches(&record) {
                if !record.confirmed {
                    result.unconfirmed = result.unconfirmed.saturating_add(record.value);
                }
                result.records.push(record);
            }
        }
        result
    }

    /// Select inputs across all transactions, in insertion order
    pub fn query_inputs(&self, filter: &InputFilter) -> Vec<InputRecord> {
        let record_for = |tx: &Transaction, index: usize| {
            let input = &tx.inputs[index];
            let info = input.script_sig.input_info(self.network_version);
            InputRecord {
                tx_hash: tx.hash(),
                index: index as u32,
                prevout: input.prevout,
                kind: info.kind,
                addresses: info.addresses,
                pubkeys: info.pubkeys,
            }
        };

        if let (Some(hash), Some(index)) = (filter.ref_tx_hash, filter.ref_index) {
            return self
                .consumer_of(&OutPoint::new(hash, index))
                .and_then(|r| {
                    let tx = self.transactions.get(&r.tx_hash)?;
                    Some(record_for(tx, r.index as usize))
                })
                .filter(|record| filter.matches(record))
                .into_iter()
                .collect();
        }

        self.transactions
            .values()
            .flat_map(|tx| (0..tx.inputs.len()).map(move |i| (tx, i)))
            .map(|(tx, i)| record_for(tx, i))
            .filter(|record| filter.matches(record))
            .collect()
    }

    pub fn balance(&self) -> Balance {
        let mut balance = Balance::default();
        for outpoint in &self.index.unspent {
            let confirmed = self
                .transactions
                .get(&outpoint.hash)
                .map_or(false, Transaction::is_confirmed);
            let value = self.output(outpoint).map_or(0, |o| o.value);
            balance.total = balance.total.saturating_add(value);
            if confirmed {
                balance.available = balance.available.saturating_add(value);
            } else {
                balance.unconfirmed = balance.unconfirmed.saturating_add(value);
            }
        }
        balance
    }
}

fn dedupe_addresses(addresses: &[Address]) -> Vec<Address> {
    let mut seen = HashSet::new();
    addresses
        .iter()
        .filter(|a| seen.insert(*a.hash()))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn key(name: &str) -> Key {
        Key::from_passphrase(name).unwrap()
    }

    fn pay(value: Value, to: &Address, seed: u8) -> Transaction {
        Transaction::new(
            1,
            vec![TransactionInput::unsigned(OutPoint::new([seed; 32], 0))],
            vec![TransactionOutput {
                value,
                script_pubkey: Script::pay_to_address(to),
            }],
            0,
        )
    }

    #[test]
    fn test_insert_partitions_by_ownership() {
        let mine = key("mine").address(MAINNET_ADDRESS_VERSION);
        let other = key("other").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[mine]);
        ledger.insert(pay(10, &mine, 1), false, false).unwrap();
        ledger.insert(pay(20, &other, 2), false, false).unwrap();
        assert_eq!(ledger.partition(Partition::Unspent).len(), 1);
        assert_eq!(ledger.partition(Partition::Exit).len(), 1);
        assert_eq!(ledger.partition(Partition::All).len(), 2);
    }

    #[test]
    fn test_zero_value_outputs_not_indexed() {
        let mine = key("mine").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[mine]);
        ledger.insert(pay(0, &mine, 1), false, false).unwrap();
        assert!(ledger.partition(Partition::All).is_empty());
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[test]
    fn test_duplicate_input_within_transaction() {
        let mine = key("mine").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[mine]);
        let prevout = OutPoint::new([5u8; 32], 0);
        let tx = Transaction::new(
            1,
            vec![TransactionInput::unsigned(prevout), TransactionInput::unsigned(prevout)],
            vec![TransactionOutput {
                value: 1,
                script_pubkey: Script::pay_to_address(&mine),
            }],
            0,
        );
        let err = ledger.insert(tx, false, false).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ledger.transaction_count(), 0);
        assert!(ledger.partition(Partition::All).is_empty());
    }

    #[test]
    fn test_coinbase_inputs_never_collide() {
        let mine = key("mine").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[mine]);
        for (value, tag) in [(50u64, 1u8), (60, 2)] {
            let mut input = TransactionInput::unsigned(OutPoint::null());
            input.script_sig = Script::new(vec![0x01, tag]);
            let tx = Transaction::new(
                1,
                vec![input],
                vec![TransactionOutput {
                    value,
                    script_pubkey: Script::pay_to_address(&mine),
                }],
                0,
            );
            assert!(tx.is_coinbase());
            ledger.insert(tx, false, false).unwrap();
        }
        assert_eq!(ledger.unspent().len(), 2);
    }

    #[test]
    fn test_pay_to_pubkey_spendable() {
        let k = key("p2pk");
        let mut script = Script::default();
        script.push_data(&k.public_key_bytes());
        script.push_op(OP_CHECKSIG);
        let ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, vec![k]);
        assert!(ledger.is_output_script_spendable(&script));
        assert!(!ledger.is_output_script_spendable(&Script::data(b"x").unwrap()));
    }

    #[test]
    fn test_memo_and_data_filters() {
        let mine = key("mine").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[mine]);
        let tx = Transaction::new(
            1,
            vec![TransactionInput::unsigned(OutPoint::new([1u8; 32], 0))],
            vec![TransactionOutput {
                value: 1,
                script_pubkey: Script::memo("hello world").unwrap(),
            }],
            0,
        );
        ledger.insert(tx, false, false).unwrap();

        let memo = OutputFilter {
            memo: Some("world".into()),
            memo_offset: 6,
            ..Default::default()
        };
        assert_eq!(ledger.query_outputs(Partition::Exit, &memo).records.len(), 1);

        let data = OutputFilter {
            data: Some(b"hel".to_vec()),
            ..Default::default()
        };
        assert_eq!(ledger.query_outputs(Partition::All, &data).records.len(), 1);

        let miss = OutputFilter {
            data: Some(b"world".to_vec()),
            ..Default::default()
        };
        assert!(ledger.query_outputs(Partition::All, &miss).records.is_empty());
    }

    #[test]
    fn test_balance_splits_unconfirmed() {
        let mine = key("mine").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[mine]);
        ledger.insert(pay(10, &mine, 1), false, false).unwrap();
        ledger.insert(pay(5, &mine, 2), true, false).unwrap();
        let balance = ledger.balance();
        assert_eq!(balance.total, 15);
        assert_eq!(balance.available, 10);
        assert_eq!(balance.unconfirmed, 5);
    }

    #[test]
    fn test_address_dedupe() {
        let a = key("a").address(MAINNET_ADDRESS_VERSION);
        let mut ledger = Ledger::watch(MAINNET_ADDRESS_VERSION, &[a, a]);
        assert_eq!(ledger.addresses().len(), 1);
        ledger.add_addresses(&[a], false).unwrap();
        assert_eq!(ledger.addresses().len(), 1);
    }
}
