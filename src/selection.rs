//! Coin selection and unsigned transaction building
//!
//! Selection is first-fit by age: the unspent partition is scanned in
//! insertion order and the shortest prefix of confirmed, non-excluded
//! outputs covering the target is spent.

use std::collections::HashSet;
use tracing::debug;

use crate::address::Address;
use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, OutputRecord};
use crate::script::Script;
use crate::types::*;

/// Where a new output pays to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Address(Address),
    Multisig { m: usize, pubkeys: Vec<ByteString> },
    Data(ByteString),
    Memo(String),
}

/// One output to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTo {
    pub value: Value,
    pub destination: Destination,
}

impl SendTo {
    pub fn address(value: Value, address: Address) -> Self {
        Self {
            value,
            destination: Destination::Address(address),
        }
    }

    pub fn script(&self) -> Result<Script> {
        match &self.destination {
            Destination::Address(address) => Ok(Script::pay_to_address(address)),
            Destination::Multisig { m, pubkeys } => Script::multisig(*m, pubkeys),
            Destination::Data(payload) => Script::data(payload),
            Destination::Memo(text) => Script::memo(text),
        }
    }

    pub fn to_output(&self) -> Result<TransactionOutput> {
        Ok(TransactionOutput {
            value: self.value,
            script_pubkey: self.script()?,
        })
    }
}

/// Per-candidate statistics collected during selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStats {
    pub will_spend: bool,
    pub output: OutputRecord,
}

/// Result of coin selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendPlan {
    /// Requested amount plus fee, before any clamping
    pub target: Value,
    /// Amount plus fee actually spent
    pub value: Value,
    /// Value paid to the requested outputs
    pub amount: Value,
    pub fee: Value,
    pub change: Value,
    /// Every unspent output, whatever its state
    pub total: Value,
    /// Confirmed, non-excluded unspent value
    pub available: Value,
    pub unconfirmed: Value,
    pub excluded: Value,
    pub selected_total: Value,
    pub selected: Vec<OutPoint>,
    /// Outputs to create, change last when present
    pub outputs: Vec<SendTo>,
    pub stats: Vec<OutputStats>,
    pub insufficient_funds: bool,
}

/// Scan the unspent partition and pick the outputs funding `sends` plus `fee`.
///
/// `available` grows for every confirmed, non-excluded candidate whether or
/// not it is selected, so it reports all spendable value.
pub fn select_outputs(
    ledger: &Ledger,
    sends: &[SendTo],
    fee: Value,
    exclusions: &[OutPoint],
    with_stats: bool,
) -> SpendPlan {
    let excluded_set: HashSet<&OutPoint> = exclusions.iter().collect();
    let amount = sends.iter().fold(0u64, |acc, s| acc.saturating_add(s.value));
    let target = amount.saturating_add(fee);

    let mut plan = SpendPlan {
        target,
        value: target,
        amount,
        fee,
        outputs: sends.to_vec(),
        ..Default::default()
    };

    for outpoint in ledger.unspent() {
        let record = match ledger.output_record(outpoint) {
            Some(record) => record,
            None => continue,
        };
        let value = record.value;
        let excluded = excluded_set.contains(outpoint);
        let confirmed = record.confirmed;

        let will_spend = plan.available < target && !excluded && confirmed;
        if will_spend {
            plan.selected_total = plan.selected_total.saturating_add(value);
            plan.selected.push(*outpoint);
        }
        if with_stats {
            plan.stats.push(OutputStats {
                will_spend,
                output: record,
            });
        }

        if !excluded && confirmed {
            plan.available = plan.available.saturating_add(value);
        }
        if !confirmed {
            plan.unconfirmed = plan.unconfirmed.saturating_add(value);
        }
        if excluded {
            plan.excluded = plan.excluded.saturating_add(value);
        }
        plan.total = plan.total.saturating_add(value);
    }

    if plan.available < target {
        plan.insufficient_funds = true;
        plan.change = 0;
        plan.value = plan.available;
        match plan.value.checked_sub(plan.fee) {
            Some(amount) => plan.amount = amount,
            None => {
                plan.fee = 0;
                plan.amount = plan.available;
            }
        }
    } else {
        plan.change = plan.selected_total.saturating_sub(target);
    }

    debug!(
        needed = target,
        available = plan.available,
        selected = plan.selected.len(),
        insufficient = plan.insufficient_funds,
        "selected outputs"
    );
    plan
}

/// Plan a spend, adding a change output to `change_address` when change is positive
pub fn plan_spend(
    ledger: &Ledger,
    sends: &[SendTo],
    change_address: &Address,
    fee: Value,
    exclusions: &[OutPoint],
) -> SpendPlan {
    let mut plan = select_outputs(ledger, sends, fee, exclusions, false);
    if !plan.insufficient_funds && plan.change > 0 {
        plan.outputs.push(SendTo::address(plan.change, *change_address));
    }
    plan
}

/// Unsigned transaction spending the plan's selected outputs
pub fn build_unsigned(plan: &SpendPlan) -> Result<Transaction> {
    if plan.insufficient_funds {
        return Err(LedgerError::InsufficientFunds {
            needed: plan.target,
            available: plan.available,
        });
    }
    let inputs = plan
        .selected
        .iter()
        .map(|op| TransactionInput::unsigned(*op))
        .collect();
    let outputs = plan
        .outputs
        .iter()
        .map(SendTo::to_output)
        .collect::<Result<Vec<_>>>()?;
    Ok(Transaction::new(DEFAULT_TX_VERSION, inputs, outputs, 0))
}
