//! Scripts: chunk parsing, asm conversion, templates and classification

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::keys::hash160;
use crate::types::*;

/// One element of a script: an opcode or a data push
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Chunk {
    Op(u8),
    Push(ByteString),
}

impl Chunk {
    /// Small integer carried by OP_0 and OP_1..OP_16
    pub fn small_int(&self) -> Option<usize> {
        match self {
            Chunk::Op(OP_0) => Some(0),
            Chunk::Op(op) if (OP_1..=OP_16).contains(op) => Some((op - OP_1 + 1) as usize),
            _ => None,
        }
    }

    pub fn is_op(&self, opcode: u8) -> bool {
        matches!(self, Chunk::Op(op) if *op == opcode)
    }

    pub fn push_data(&self) -> Option<&[u8]> {
        match self {
            Chunk::Push(data) => Some(data),
            _ => None,
        }
    }
}

/// A script held in its serialized form.
///
/// Any byte string is a valid `Script`; the chunk view is parsed on demand
/// and fails for truncated pushes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script(ByteString);

/// Output script template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    PayToAddress(PubkeyHash),
    PayToPubkey(ByteString),
    Multisig { m: usize, pubkeys: Vec<ByteString> },
    Data(ByteString),
    Unrecognized,
}

/// Template name without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptDescriptor {
    Address,
    Pubkey,
    Multisig,
    Data,
    Unrecognized,
}

impl fmt::Display for ScriptDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptDescriptor::Address => "Address",
            ScriptDescriptor::Pubkey => "Pubkey",
            ScriptDescriptor::Multisig => "Multisig",
            ScriptDescriptor::Data => "Data",
            ScriptDescriptor::Unrecognized => "Strange",
        };
        f.write_str(name)
    }
}

impl ScriptKind {
    pub fn descriptor(&self) -> ScriptDescriptor {
        match self {
            ScriptKind::PayToAddress(_) => ScriptDescriptor::Address,
            ScriptKind::PayToPubkey(_) => ScriptDescriptor::Pubkey,
            ScriptKind::Multisig { .. } => ScriptDescriptor::Multisig,
            ScriptKind::Data(_) => ScriptDescriptor::Data,
            ScriptKind::Unrecognized => ScriptDescriptor::Unrecognized,
        }
    }
}

/// Addresses and parameters extracted from an output script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAddresses {
    pub kind: ScriptDescriptor,
    pub addresses: Vec<Address>,
    /// Signatures required to spend: 1 for single-key templates, 0 when unspendable
    pub m: usize,
    pub data: Option<ByteString>,
}

impl OutputAddresses {
    /// Data payload read as one character per byte
    pub fn data_text(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|bytes| bytes.iter().map(|&b| b as char).collect())
    }
}

/// Input script template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKind {
    /// `<sig> <pubkey>`
    Address,
    /// `<sig>`
    Pubkey,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub kind: InputKind,
    pub pubkeys: Vec<ByteString>,
    pub addresses: Vec<Address>,
}

fn is_pubkey(data: &[u8]) -> bool {
    matches!(data.len(), 33 | 65)
}

fn opcode_name(op: u8) -> Option<&'static str> {
    OPCODE_NAMES
        .iter()
        .find(|(_, code)| *code == op)
        .map(|(name, _)| *name)
}

fn opcode_by_name(name: &str) -> Option<u8> {
    OPCODE_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

impl Script {
    pub fn new(bytes: ByteString) -> Self {
        Script(bytes)
    }

    /// Accept serialized bytes only if every push is complete
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let script = Script(bytes.to_vec());
        script.chunks()?;
        Ok(script)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Script(hex::decode(s.trim())?))
    }

    pub fn to_bytes(&self) -> ByteString {
        self.0.clone()
    }

    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut script = Script::default();
        for chunk in chunks {
            match chunk {
                Chunk::Op(op) => script.push_op(*op),
                Chunk::Push(data) => script.push_data(data),
            }
        }
        script
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> ByteString {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn push_op(&mut self, op: u8) {
        self.0.push(op);
    }

    /// Append OP_0 or OP_1..OP_16
    pub fn push_small_int(&mut self, n: u8) -> Result<()> {
        match n {
            0 => self.push_op(OP_0),
            1..=16 => self.push_op(OP_1 + n - 1),
            _ => {
                return Err(LedgerError::InvalidScript(format!(
                    "{} is not a small integer",
                    n
                )))
            }
        }
        Ok(())
    }

    /// Append a data push using the shortest push encoding
    pub fn push_data(&mut self, data: &[u8]) {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.0.push(len as u8);
        } else if len <= 0xff {
            self.0.push(OP_PUSHDATA1);
            self.0.push(len as u8);
        } else if len <= 0xffff {
            self.0.push(OP_PUSHDATA2);
            self.0.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.0.push(OP_PUSHDATA4);
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
    }

    /// Parse the serialized form into chunks
    pub fn chunks(&self) -> Result<Vec<Chunk>> {
        let bytes = &self.0;
        let mut chunks = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let op = bytes[i];
            i += 1;
            let len = match op {
                0x01..=0x4b => op as usize,
                OP_PUSHDATA1 => {
                    let n = *bytes.get(i).ok_or_else(|| truncated(i))? as usize;
                    i += 1;
                    n
                }
                OP_PUSHDATA2 => {
                    let raw = bytes.get(i..i + 2).ok_or_else(|| truncated(i))?;
                    i += 2;
                    u16::from_le_bytes([raw[0], raw[1]]) as usize
                }
                OP_PUSHDATA4 => {
                    let raw = bytes.get(i..i + 4).ok_or_else(|| truncated(i))?;
                    i += 4;
                    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
                }
                _ => {
                    chunks.push(Chunk::Op(op));
                    continue;
                }
            };
            let end = i.checked_add(len).ok_or_else(|| truncated(i))?;
            let data = bytes.get(i..end).ok_or_else(|| truncated(i))?;
            chunks.push(Chunk::Push(data.to_vec()));
            i = end;
        }
        Ok(chunks)
    }

    /// Parse space-separated asm text.
    ///
    /// Opcode names become opcodes, decimal tokens `0`..`16` become small
    /// integer opcodes and everything else is read as a hex push.
    pub fn from_asm(asm: &str) -> Result<Self> {
        let mut script = Script::default();
        for token in asm.split_whitespace() {
            if let Some(op) = opcode_by_name(token) {
                script.push_op(op);
                continue;
            }
            if token.len() <= 2 {
                if let Ok(n) = token.parse::<u8>() {
                    if n <= 16 && n.to_string() == token {
                        script.push_small_int(n)?;
                        continue;
                    }
                }
            }
            if let Some(code) = token.strip_prefix("OP_0x") {
                let op = u8::from_str_radix(code, 16)
                    .map_err(|_| LedgerError::InvalidScript(format!("unknown opcode {}", token)))?;
                script.push_op(op);
                continue;
            }
            let data = hex::decode(token)
                .map_err(|_| LedgerError::InvalidScript(format!("bad asm token {}", token)))?;
            script.push_data(&data);
        }
        Ok(script)
    }

    /// Render as asm text. Unparsable scripts render as a single hex token.
    pub fn to_asm(&self) -> String {
        let chunks = match self.chunks() {
            Ok(chunks) => chunks,
            Err(_) => return self.to_hex(),
        };
        chunks
            .iter()
            .map(|chunk| match chunk {
                Chunk::Op(op) => opcode_name(*op)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("OP_0x{:02x}", op)),
                Chunk::Push(data) => hex::encode(data),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
    pub fn pay_to_pubkey_hash(hash: &PubkeyHash) -> Self {
        let mut script = Script(Vec::with_capacity(25));
        script.push_op(OP_DUP);
        script.push_op(OP_HASH160);
        script.push_data(hash);
        script.push_op(OP_EQUALVERIFY);
        script.push_op(OP_CHECKSIG);
        script
    }

    pub fn pay_to_address(address: &Address) -> Self {
        Self::pay_to_pubkey_hash(address.hash())
    }

    /// OP_m <pubkeys> OP_n OP_CHECKMULTISIG
    pub fn multisig(m: usize, pubkeys: &[ByteString]) -> Result<Self> {
        let n = pubkeys.len();
        if m == 0 || m > n || n > MAX_MULTISIG_KEYS {
            return Err(LedgerError::InvalidScript(format!(
                "invalid multisig {} of {}",
                m, n
            )));
        }
        if let Some(bad) = pubkeys.iter().find(|pk| !is_pubkey(pk)) {
            return Err(LedgerError::InvalidScript(format!(
                "bad multisig public key of {} bytes",
                bad.len()
            )));
        }
        let mut script = Script::default();
        script.push_small_int(m as u8)?;
        for pk in pubkeys {
            script.push_data(pk);
        }
        script.push_small_int(n as u8)?;
        script.push_op(OP_CHECKMULTISIG);
        Ok(script)
    }

    /// OP_RETURN <payload>, payload at most 40 bytes
    pub fn data(payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_DATA_PAYLOAD {
            return Err(LedgerError::InvalidScript(format!(
                "Data output exceeds {} bytes",
                MAX_DATA_PAYLOAD
            )));
        }
        let mut script = Script::default();
        script.push_op(OP_RETURN);
        script.push_data(payload);
        Ok(script)
    }

    /// Data output carrying text, one byte per character
    pub fn memo(text: &str) -> Result<Self> {
        let bytes = text
            .chars()
            .map(|c| {
                u8::try_from(c as u32).map_err(|_| {
                    LedgerError::InvalidScript(format!("memo character {:?} out of range", c))
                })
            })
            .collect::<Result<Vec<u8>>>()?;
        Self::data(&bytes)
    }

    /// Classify an output script
    pub fn classify(&self) -> ScriptKind {
        let chunks = match self.chunks() {
            Ok(chunks) => chunks,
            Err(_) => return ScriptKind::Unrecognized,
        };
        let l = chunks.len();

        // OP_RETURN <data>
        if l == 2 && chunks[0].is_op(OP_RETURN) {
            match &chunks[1] {
                Chunk::Push(data) => return ScriptKind::Data(data.clone()),
                Chunk::Op(OP_0) => return ScriptKind::Data(Vec::new()),
                _ => {}
            }
        }

        // OP_m <n pubkeys> OP_n OP_CHECKMULTISIG
        if l >= 4 && chunks[l - 1].is_op(OP_CHECKMULTISIG) {
            if let (Some(m), Some(n)) = (chunks[0].small_int(), chunks[l - 2].small_int()) {
                let keys: Vec<ByteString> = chunks[1..l - 2]
                    .iter()
                    .filter_map(|c| c.push_data().map(<[u8]>::to_vec))
                    .collect();
                if n == l - 3 && m >= 1 && m <= n && keys.len() == n {
                    return ScriptKind::Multisig { m, pubkeys: keys };
                }
            }
        }

        // OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
        if l == 5
            && chunks[0].is_op(OP_DUP)
            && chunks[1].is_op(OP_HASH160)
            && chunks[3].is_op(OP_EQUALVERIFY)
            && chunks[4].is_op(OP_CHECKSIG)
        {
            if let Some(data) = chunks[2].push_data() {
                if data.len() == HASH160_SIZE {
                    let mut hash = [0u8; HASH160_SIZE];
                    hash.copy_from_slice(data);
                    return ScriptKind::PayToAddress(hash);
                }
            }
        }

        // <pubkey> OP_CHECKSIG
        if l == 2 && chunks[1].is_op(OP_CHECKSIG) {
            if let Some(data) = chunks[0].push_data() {
                if is_pubkey(data) {
                    return ScriptKind::PayToPubkey(data.to_vec());
                }
            }
        }

        ScriptKind::Unrecognized
    }

    pub fn descriptor(&self) -> ScriptDescriptor {
        self.classify().descriptor()
    }

    /// Addresses an output script pays to, under the given network version
    pub fn output_addresses(&self, version: u8) -> OutputAddresses {
        match self.classify() {
            ScriptKind::PayToAddress(hash) => OutputAddresses {
                kind: ScriptDescriptor::Address,
                addresses: vec![Address::new(version, hash)],
                m: 1,
                data: None,
            },
            ScriptKind::PayToPubkey(pk) => OutputAddresses {
                kind: ScriptDescriptor::Pubkey,
                addresses: vec![Address::from_pubkey(&pk, version)],
                m: 1,
                data: None,
            },
            ScriptKind::Multisig { m, pubkeys } => OutputAddresses {
                kind: ScriptDescriptor::Multisig,
                addresses: pubkeys
                    .iter()
                    .map(|pk| Address::from_pubkey(pk, version))
                    .collect(),
                m,
                data: None,
            },
            ScriptKind::Data(payload) => OutputAddresses {
                kind: ScriptDescriptor::Data,
                addresses: Vec::new(),
                m: 0,
                data: Some(payload),
            },
            ScriptKind::Unrecognized => OutputAddresses {
                kind: ScriptDescriptor::Unrecognized,
                addresses: Vec::new(),
                m: 0,
                data: None,
            },
        }
    }

    /// Inspect an input (unlock) script
    pub fn input_info(&self, version: u8) -> InputInfo {
        let chunks = self.chunks().unwrap_or_default();
        match chunks.as_slice() {
            [Chunk::Push(_sig), Chunk::Push(pk)] if is_pubkey(pk) => InputInfo {
                kind: InputKind::Address,
                pubkeys: vec![pk.clone()],
                addresses: vec![Address::from_pubkey(pk, version)],
            },
            [Chunk::Push(_sig)] => InputInfo {
                kind: InputKind::Pubkey,
                pubkeys: Vec::new(),
                addresses: Vec::new(),
            },
            _ => InputInfo {
                kind: InputKind::Unrecognized,
                pubkeys: Vec::new(),
                addresses: Vec::new(),
            },
        }
    }

    /// Public key hash of every key-bearing element of an output script
    pub fn pubkey_hashes(&self) -> Vec<PubkeyHash> {
        match self.classify() {
            ScriptKind::PayToAddress(hash) => vec![hash],
            ScriptKind::PayToPubkey(pk) => vec![hash160(&pk)],
            ScriptKind::Multisig { pubkeys, .. } => pubkeys.iter().map(|pk| hash160(pk)).collect(),
            _ => Vec::new(),
        }
    }
}

fn truncated(at: usize) -> LedgerError {
    LedgerError::InvalidScript(format!("push truncated at byte {}", at))
}

impl From<ByteString> for Script {
    fn from(bytes: ByteString) -> Self {
        Script(bytes)
    }
}
