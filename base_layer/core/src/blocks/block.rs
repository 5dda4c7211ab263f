// Copyright 2023. The Iron Fish Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::fmt::{Display, Formatter};

use ironfish_common_types::types::BlockHash;

use crate::{
    blocks::{decode_header, encode_header, BlockHeader, ByteReader, CodecError},
    consensus::ConsensusManager,
    proof_of_work::FishHashFactory,
    transactions::{decode_transaction, encode_transaction, Transaction},
};

/// The upper bound on one serialized block message, shared by both sides of the peer boundary.
pub const MAX_MESSAGE_SIZE: usize = 524_288;

/// A block: a header plus an ordered, non-empty list of transactions. The first transaction is
/// always the miners' fee transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        debug_assert!(!transactions.is_empty(), "a block carries at least the miners' fee");
        Self { header, transactions }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn miners_fee_transaction(&self) -> &Transaction {
        &self.transactions[0]
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence()
    }

    /// Output notes added by every transaction in this block.
    pub fn note_count(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.notes().len() as u64).sum()
    }

    /// Nullifiers revealed by every transaction in this block.
    pub fn spend_count(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.spends().len() as u64).sum()
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} with {} transaction(s)", self.header, self.transactions.len())
    }
}

/// Encodes a block for the peer boundary, enforcing the message size bound.
pub fn encode_block(block: &Block) -> Result<Vec<u8>, CodecError> {
    let mut buf = encode_header(&block.header);
    buf.extend_from_slice(&(block.transactions.len() as u32).to_le_bytes());
    for transaction in &block.transactions {
        buf.extend_from_slice(&encode_transaction(transaction));
    }
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge {
            got: buf.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(buf)
}

/// Decodes one peer-supplied block message.
pub fn decode_block(
    bytes: &[u8],
    rules: &ConsensusManager,
    pow: &FishHashFactory,
) -> Result<Block, CodecError> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge {
            got: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut reader = ByteReader::new(bytes);
    let header = decode_header(&mut reader, rules, pow)?;
    let transaction_count = reader.read_u32_le()? as usize;
    if transaction_count == 0 {
        return Err(CodecError::InvalidField("a block carries at least one transaction"));
    }
    let mut transactions = Vec::with_capacity(transaction_count.min(1024));
    for _ in 0..transaction_count {
        transactions.push(decode_transaction(&mut reader)?);
    }
    reader.finish()?;
    Ok(Block::new(header, transactions))
}
