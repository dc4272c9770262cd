//! Raw block decoding.
//!
//! `getblock <hash> false` returns the block in its consensus
//! serialization, hex encoded. Decoding it here keeps output values as
//! exact integers in base units instead of the floating point coin
//! amounts of the verbose JSON form.

use thiserror::Error;

/// Number of base units in one whole coin.
pub const COIN: u64 = 100_000_000;

/// Size of a serialized block header in bytes.
pub const HEADER_LEN: usize = 80;

/// Smallest possible serialized input: outpoint, empty script, sequence.
const MIN_TXIN_LEN: usize = 32 + 4 + 1 + 4;
/// Smallest possible serialized output: value and empty script.
const MIN_TXOUT_LEN: usize = 8 + 1;
/// Smallest possible serialized transaction.
const MIN_TX_LEN: usize = 4 + 1 + MIN_TXIN_LEN + 1 + MIN_TXOUT_LEN + 4;

/// Errors that can occur while decoding a raw block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
    #[error("invalid block hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("unexpected end of block data at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("non-canonical compact size at offset {offset}")]
    NonCanonicalSize { offset: usize },

    #[error("count {count} at offset {offset} exceeds remaining block data")]
    OversizedCount { offset: usize, count: u64 },

    #[error("{0} trailing bytes after block")]
    TrailingBytes(usize),

    #[error("block has no transactions")]
    NoTransactions,

    #[error("coinbase transaction has no outputs")]
    NoOutputs,
}

/// Block header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    /// Previous block hash in internal (little-endian) byte order.
    pub prev_block: [u8; 32],
    /// Merkle root in internal byte order.
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prev_txid: [u8; 32],
    pub prev_vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Witness stack; empty for legacy transactions.
    pub witness: Vec<Vec<u8>>,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in base units.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

/// A fully decoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Decodes a block from the hex string returned by `getblock <hash> false`.
    pub fn from_hex(raw: &str) -> Result<Self, BlockError> {
        let bytes = hex::decode(raw.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Decodes a block from its consensus serialization.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        let mut reader = Reader::new(bytes);
        let header = reader.read_header()?;

        let tx_count = reader.read_count(MIN_TX_LEN)?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(reader.read_transaction()?);
        }

        if reader.remaining() > 0 {
            return Err(BlockError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            header,
            transactions,
        })
    }

    /// Value of the first output of the first transaction, in base units.
    pub fn coinbase_value(&self) -> Result<u64, BlockError> {
        let coinbase = self
            .transactions
            .first()
            .ok_or(BlockError::NoTransactions)?;
        let output = coinbase.outputs.first().ok_or(BlockError::NoOutputs)?;
        Ok(output.value)
    }

    /// Block subsidy in whole coins.
    ///
    /// Integer division: any fractional part of a coin is truncated.
    pub fn subsidy(&self) -> Result<u64, BlockError> {
        Ok(self.coinbase_value()? / COIN)
    }
}

/// Forward-only cursor over serialized block bytes.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BlockError> {
        if n > self.remaining() {
            return Err(BlockError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos + n)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BlockError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, BlockError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, BlockError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, BlockError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, BlockError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a CompactSize integer, rejecting non-minimal encodings.
    fn read_compact_size(&mut self) -> Result<u64, BlockError> {
        let offset = self.pos;
        let (value, min) = match self.read_u8()? {
            0xfd => (u64::from(u16::from_le_bytes(self.read_array()?)), 0xfd),
            0xfe => (u64::from(self.read_u32()?), 0x1_0000),
            0xff => (self.read_u64()?, 0x1_0000_0000),
            n => return Ok(u64::from(n)),
        };
        if value < min {
            return Err(BlockError::NonCanonicalSize { offset });
        }
        Ok(value)
    }

    /// Reads an element count and checks it against the bytes left, so a
    /// corrupt count never drives a huge allocation.
    fn read_count(&mut self, min_item_len: usize) -> Result<usize, BlockError> {
        let offset = self.pos;
        let count = self.read_compact_size()?;
        let fits = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(min_item_len))
            .is_some_and(|len| len <= self.remaining());
        if !fits {
            return Err(BlockError::OversizedCount { offset, count });
        }
        // Checked above.
        Ok(count as usize)
    }

    fn read_var_bytes(&mut self) -> Result<Vec<u8>, BlockError> {
        let len = self.read_count(1)?;
        Ok(self.take(len)?.to_vec())
    }

    fn read_header(&mut self) -> Result<BlockHeader, BlockError> {
        if self.remaining() < HEADER_LEN {
            return Err(BlockError::UnexpectedEof {
                offset: self.pos,
                needed: HEADER_LEN,
            });
        }
        Ok(BlockHeader {
            version: self.read_i32()?,
            prev_block: self.read_array()?,
            merkle_root: self.read_array()?,
            time: self.read_u32()?,
            bits: self.read_u32()?,
            nonce: self.read_u32()?,
        })
    }

    fn read_transaction(&mut self) -> Result<Transaction, BlockError> {
        let version = self.read_i32()?;

        // BIP 144 marker and flag.
        let segwit = self.peek(2) == Some(&[0x00, 0x01]);
        if segwit {
            self.take(2)?;
        }

        let input_count = self.read_count(MIN_TXIN_LEN)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxIn {
                prev_txid: self.read_array()?,
                prev_vout: self.read_u32()?,
                script_sig: self.read_var_bytes()?,
                sequence: self.read_u32()?,
                witness: Vec::new(),
            });
        }

        let output_count = self.read_count(MIN_TXOUT_LEN)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOut {
                value: self.read_u64()?,
                script_pubkey: self.read_var_bytes()?,
            });
        }

        if segwit {
            for input in &mut inputs {
                let items = self.read_count(1)?;
                input.witness.reserve(items);
                for _ in 0..items {
                    input.witness.push(self.read_var_bytes()?);
                }
            }
        }

        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time: self.read_u32()?,
        })
    }
}
