//! Canonical transaction serialization, hashing and signature hashes

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::script::Script;
use crate::types::*;

/// Append a Bitcoin varint
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Serialize: version, inputs, outputs, lock time
///
/// Each input is (prev hash, prev index, script, sequence) and each output
/// is (value, script), scripts prefixed by their varint length.
pub fn serialize_transaction(tx: &Transaction) -> ByteString {
    let mut buf = Vec::with_capacity(calculate_transaction_size(tx));
    buf.extend_from_slice(&tx.version.to_le_bytes());

    write_varint(&mut buf, tx.inputs.len() as u64);
    for input in &tx.inputs {
        buf.extend_from_slice(&input.prevout.hash);
        buf.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_varint(&mut buf, input.script_sig.len() as u64);
        buf.extend_from_slice(input.script_sig.as_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }

    write_varint(&mut buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        buf.extend_from_slice(&output.value.to_le_bytes());
        write_varint(&mut buf, output.script_pubkey.len() as u64);
        buf.extend_from_slice(output.script_pubkey.as_bytes());
    }

    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf
}

fn varint_size(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Size in bytes of the serialized transaction
pub fn calculate_transaction_size(tx: &Transaction) -> usize {
    let inputs: usize = tx
        .inputs
        .iter()
        .map(|i| 32 + 4 + varint_size(i.script_sig.len() as u64) + i.script_sig.len() + 4)
        .sum();
    let outputs: usize = tx
        .outputs
        .iter()
        .map(|o| 8 + varint_size(o.script_pubkey.len() as u64) + o.script_pubkey.len())
        .sum();
    4 + varint_size(tx.inputs.len() as u64)
        + inputs
        + varint_size(tx.outputs.len() as u64)
        + outputs
        + 4
}

/// Double SHA-256 of the canonical serialization, internal byte order
pub fn calculate_hash(tx: &Transaction) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(&serialize_transaction(tx));
    sha256d::Hash::from_engine(engine).into_inner()
}

/// Legacy signature hash of input `index` against the script it spends.
///
/// Every input script is blanked, input `index` receives `subscript`, the
/// hash type is appended as a little-endian u32 and the result is double hashed.
pub fn signature_hash(
    tx: &Transaction,
    index: usize,
    subscript: &Script,
    hash_type: u8,
) -> Result<Hash> {
    if index >= tx.inputs.len() {
        return Err(LedgerError::InvalidScript(format!(
            "input {} out of range for {} inputs",
            index,
            tx.inputs.len()
        )));
    }
    let mut copy = tx.clone();
    for (i, input) in copy.inputs.iter_mut().enumerate() {
        input.script_sig = if i == index {
            subscript.clone()
        } else {
            Script::default()
        };
    }
    let mut engine = sha256d::Hash::engine();
    engine.input(&serialize_transaction(&copy));
    engine.input(&(hash_type as u32).to_le_bytes());
    Ok(sha256d::Hash::from_engine(engine).into_inner())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                LedgerError::Parse(format!("transaction truncated at byte {}", self.pos))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    fn varint(&mut self) -> Result<u64> {
        let first = self.take(1)?[0];
        Ok(match first {
            0xfd => {
                let b = self.take(2)?;
                u16::from_le_bytes([b[0], b[1]]) as u64
            }
            0xfe => self.u32()? as u64,
            0xff => self.u64()?,
            n => n as u64,
        })
    }

    fn script(&mut self) -> Result<Script> {
        let len = self.varint()? as usize;
        Ok(Script::new(self.take(len)?.to_vec()))
    }
}

/// Parse a serialized transaction. Trailing bytes are rejected.
pub fn deserialize_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut r = Reader { bytes, pos: 0 };
    let version = r.u32()?;

    let input_count = r.varint()?;
    let mut inputs = Vec::new();
    for _ in 0..input_count {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(r.take(32)?);
        let index = r.u32()?;
        let script_sig = r.script()?;
        let sequence = r.u32()?;
        inputs.push(TransactionInput {
            prevout: OutPoint::new(hash, index),
            script_sig,
            sequence,
        });
    }

    let output_count = r.varint()?;
    let mut outputs = Vec::new();
    for _ in 0..output_count {
        let value = r.u64()?;
        let script_pubkey = r.script()?;
        outputs.push(TransactionOutput {
            value,
            script_pubkey,
        });
    }

    let lock_time = r.u32()?;
    if r.pos != bytes.len() {
        return Err(LedgerError::Parse(format!(
            "{} trailing bytes after transaction",
            bytes.len() - r.pos
        )));
    }
    Ok(Transaction::new(version, inputs, outputs, lock_time))
}

pub fn transaction_to_hex(tx: &Transaction) -> String {
    hex::encode(serialize_transaction(tx))
}

pub fn transaction_from_hex(s: &str) -> Result<Transaction> {
    deserialize_transaction(&hex::decode(s.trim())?)
}

/// Sum of output values
pub fn total_output_value(tx: &Transaction) -> Result<Value> {
    tx.outputs.iter().try_fold(0u64, |acc, o| {
        acc.checked_add(o.value)
            .filter(|v| *v <= MAX_MONEY)
            .ok_or_else(|| LedgerError::InvalidValue("output total exceeds money supply".into()))
    })
}
