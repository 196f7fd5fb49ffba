//! Transaction signing
//!
//! Signing never mutates the ledger. A caller-supplied key set replaces the
//! ledger's own keys for the duration of one signing context.

use std::ops::ControlFlow;
use tracing::{debug, info};

use crate::address::Address;
use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::keys::Key;
use crate::ledger::Ledger;
use crate::script::{Script, ScriptDescriptor};
use crate::selection::{build_unsigned, plan_spend, SendTo};
use crate::transaction::signature_hash;
use crate::types::*;

/// Keys available for one signing pass
pub struct SigningContext<'a> {
    ledger: &'a Ledger,
    scoped: Option<&'a [Key]>,
}

impl<'a> SigningContext<'a> {
    pub fn new(ledger: &'a Ledger, keys: Option<&'a [Key]>) -> Self {
        Self {
            ledger,
            scoped: keys,
        }
    }

    fn key_for(&self, hash: &PubkeyHash) -> Option<&'a Key> {
        match self.scoped {
            Some(keys) => keys.iter().find(|k| &k.pubkey_hash() == hash),
            None => self.ledger.key_for(hash),
        }
    }

    /// Unlock script for input `index` spending an output locked by `locking`.
    ///
    /// Multisig scripts start with OP_0 and collect signatures in address
    /// order until `m` are present. Pay-to-address scripts carry the
    /// signature followed by the public key.
    pub fn input_script(&self, tx: &Transaction, index: usize, locking: &Script) -> Result<Script> {
        let digest = signature_hash(tx, index, locking, SIGHASH_ALL)?;
        let info = locking.output_addresses(self.ledger.network_version());
        if info.m == 0 {
            return Err(LedgerError::InvalidScript(format!(
                "input {} spends an unsignable {} output",
                index, info.kind
            )));
        }

        let mut script = Script::default();
        if info.kind == ScriptDescriptor::Multisig {
            script.push_op(OP_0);
        }

        let mut signed = 0;
        for address in &info.addresses {
            if signed == info.m {
                break;
            }
            let key = match self.key_for(address.hash()) {
                Some(key) => key,
                None => continue,
            };
            let mut sig = key.sign(&digest)?;
            sig.push(SIGHASH_ALL);
            script.push_data(&sig);
            if info.kind == ScriptDescriptor::Address {
                script.push_data(&key.public_key_bytes());
            }
            signed += 1;
        }

        if signed != info.m {
            return Err(LedgerError::MissingSigningKey(index));
        }
        Ok(script)
    }
}

fn locking_scripts(ledger: &Ledger, tx: &Transaction) -> Result<Vec<Script>> {
    tx.inputs
        .iter()
        .map(|input| {
            ledger
                .output(&input.prevout)
                .map(|o| o.script_pubkey.clone())
                .ok_or_else(|| {
                    LedgerError::InvalidScript(format!(
                        "input spends unknown output {}",
                        input.prevout
                    ))
                })
        })
        .collect()
}

fn with_scripts(tx: &Transaction, scripts: Vec<Script>) -> Transaction {
    let inputs = tx
        .inputs
        .iter()
        .zip(scripts)
        .map(|(input, script_sig)| TransactionInput {
            prevout: input.prevout,
            script_sig,
            sequence: input.sequence,
        })
        .collect();
    Transaction::new(tx.version, inputs, tx.outputs.clone(), tx.lock_time)
}

/// Sign every input of `tx`, which must spend outputs known to `ledger`.
/// Any missing key fails the whole transaction.
pub fn sign_transaction(ledger: &Ledger, tx: &Transaction, keys: Option<&[Key]>) -> Result<Transaction> {
    let mut task = SigningTask::new(ledger, tx, keys)?;
    while !task.is_complete() {
        task.step()?;
    }
    task.finish()
}

/// Plan, build and sign in one call
pub fn create_send(
    ledger: &Ledger,
    sends: &[SendTo],
    change_address: &Address,
    fee: Value,
    exclusions: &[OutPoint],
    keys: Option<&[Key]>,
) -> Result<Transaction> {
    let plan = plan_spend(ledger, sends, change_address, fee, exclusions);
    let unsigned = build_unsigned(&plan)?;
    sign_transaction(ledger, &unsigned, keys)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignProgress {
    pub signed: usize,
    pub total: usize,
}

/// Input-by-input signer that can be driven manually or through `run`
pub struct SigningTask<'a> {
    context: SigningContext<'a>,
    unsigned: Transaction,
    locking: Vec<Script>,
    scripts: Vec<Script>,
    canceled: bool,
}

impl<'a> SigningTask<'a> {
    pub fn new(ledger: &'a Ledger, tx: &Transaction, keys: Option<&'a [Key]>) -> Result<Self> {
        Ok(Self {
            context: SigningContext::new(ledger, keys),
            unsigned: tx.clone(),
            locking: locking_scripts(ledger, tx)?,
            scripts: Vec::with_capacity(tx.inputs.len()),
            canceled: false,
        })
    }

    pub fn progress(&self) -> SignProgress {
        SignProgress {
            signed: self.scripts.len(),
            total: self.locking.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.scripts.len() == self.locking.len()
    }

    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Sign the next input
    pub fn step(&mut self) -> Result<SignProgress> {
        if self.canceled {
            return Err(LedgerError::SigningCanceled);
        }
        let index = self.scripts.len();
        if let Some(locking) = self.locking.get(index) {
            let script = self.context.input_script(&self.unsigned, index, locking)?;
            self.scripts.push(script);
        }
        Ok(self.progress())
    }

    /// The signed transaction, once every input has a script
    pub fn finish(self) -> Result<Transaction> {
        if self.canceled {
            return Err(LedgerError::SigningCanceled);
        }
        if !self.is_complete() {
            return Err(LedgerError::MissingSigningKey(self.scripts.len()));
        }
        Ok(with_scripts(&self.unsigned, self.scripts))
    }

    /// Sign asynchronously, yielding between inputs.
    ///
    /// `on_progress` is called before the first input and after each one;
    /// returning `ControlFlow::Break` before completion discards the work.
    pub async fn run<F>(mut self, mut on_progress: F) -> Result<Transaction>
    where
        F: FnMut(SignProgress) -> ControlFlow<()>,
    {
        if on_progress(self.progress()).is_break() {
            info!("signing canceled before start");
            return Err(LedgerError::SigningCanceled);
        }
        while !self.is_complete() {
            let progress = self.step()?;
            debug!(signed = progress.signed, total = progress.total, "signed input");
            if !self.is_complete() && on_progress(progress).is_break() {
                self.cancel();
                info!(signed = progress.signed, "signing canceled");
                return Err(LedgerError::SigningCanceled);
            }
            tokio::task::yield_now().await;
        }
        let done = self.progress();
        let _ = on_progress(done);
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::verify_signature;
    use crate::script::Chunk;

    fn funded_by(script: Script, keys: Vec<Key>) -> (Ledger, Transaction) {
        let mut ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, keys);
        let funding = Transaction::new(
            1,
            vec![TransactionInput::unsigned(OutPoint::new([9u8; 32], 0))],
            vec![TransactionOutput {
                value: 1000,
                script_pubkey: script,
            }],
            0,
        );
        let outpoint = funding.outpoint(0);
        ledger.insert(funding, false, false).unwrap();
        let spend = Transaction::new(
            1,
            vec![TransactionInput::unsigned(outpoint)],
            vec![TransactionOutput {
                value: 900,
                script_pubkey: Script::pay_to_pubkey_hash(&[1u8; 20]),
            }],
            0,
        );
        (ledger, spend)
    }

    #[test]
    fn test_p2pkh_unlock_script_verifies() {
        let key = Key::from_passphrase("signer").unwrap();
        let locking = Script::pay_to_address(&key.address(MAINNET_ADDRESS_VERSION));
        let (ledger, spend) = funded_by(locking.clone(), vec![key.clone()]);

        let signed = sign_transaction(&ledger, &spend, None).unwrap();
        let chunks = signed.inputs[0].script_sig.chunks().unwrap();
        assert_eq!(chunks.len(), 2);
        let sig = chunks[0].push_data().unwrap();
        assert_eq!(*sig.last().unwrap(), SIGHASH_ALL);
        assert_eq!(chunks[1], Chunk::Push(key.public_key_bytes()));

        let digest = signature_hash(&spend, 0, &locking, SIGHASH_ALL).unwrap();
        assert!(verify_signature(&key.public_key_bytes(), &sig[..sig.len() - 1], &digest));
        assert_ne!(signed.hash(), spend.hash());
    }

    #[test]
    fn test_multisig_collects_m_signatures() {
        let keys: Vec<Key> = ["a", "b", "c"]
            .iter()
            .map(|p| Key::from_passphrase(p).unwrap())
            .collect();
        let pubkeys: Vec<ByteString> = keys.iter().map(Key::public_key_bytes).collect();
        let locking = Script::multisig(2, &pubkeys).unwrap();
        let (ledger, spend) = funded_by(locking, keys[1..].to_vec());

        let signed = sign_transaction(&ledger, &spend, None).unwrap();
        let chunks = signed.inputs[0].script_sig.chunks().unwrap();
        assert_eq!(chunks[0], Chunk::Op(OP_0));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_missing_key_fails_whole_transaction() {
        let owner = Key::from_passphrase("owner").unwrap();
        let stranger = Key::from_passphrase("stranger").unwrap();
        let locking = Script::pay_to_address(&owner.address(MAINNET_ADDRESS_VERSION));
        let (ledger, spend) = funded_by(locking, vec![owner]);

        let err = sign_transaction(&ledger, &spend, Some(&[stranger])).unwrap_err();
        assert_eq!(err, LedgerError::MissingSigningKey(0));
    }

    #[test]
    fn test_canceled_task_discards_work() {
        let key = Key::from_passphrase("signer").unwrap();
        let locking = Script::pay_to_address(&key.address(MAINNET_ADDRESS_VERSION));
        let (ledger, spend) = funded_by(locking, vec![key]);
        let mut task = SigningTask::new(&ledger, &spend, None).unwrap();
        task.cancel();
        assert_eq!(task.step().unwrap_err(), LedgerError::SigningCanceled);
        assert_eq!(task.finish().unwrap_err(), LedgerError::SigningCanceled);
    }
}
