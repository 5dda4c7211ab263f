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

use ironfish_common_types::types::{BlockHash, Nullifier};

use crate::blocks::{ByteReader, CodecError};

/// The hash domain for transaction identifiers.
const TRANSACTION_HASH_PERSONALIZATION: &[u8] = b"IronFish Transaction";

const MINERS_FEE_FLAG: u8 = 0x01;

/// One spent note: the nullifier it reveals and the notes-tree root the spender witnessed at the
/// moment of spending, along with the size of the tree at that root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spend {
    pub nullifier: Nullifier,
    pub commitment: BlockHash,
    pub tree_size: u64,
}

/// A transaction as seen by the chain core. The zero-knowledge payload is an opaque byte blob
/// verified by an external service; the core only reads the fee, the output note commitments and
/// the spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    fee: i64,
    is_miners_fee: bool,
    notes: Vec<BlockHash>,
    spends: Vec<Spend>,
    proof: Vec<u8>,
}

impl Transaction {
    pub fn new(fee: i64, notes: Vec<BlockHash>, spends: Vec<Spend>, proof: Vec<u8>) -> Self {
        Self {
            fee,
            is_miners_fee: false,
            notes,
            spends,
            proof,
        }
    }

    /// A miners' fee transaction: no spends, a negative fee equal to the mining reward plus the
    /// block's transaction fees, and at least one output note.
    pub fn miners_fee(fee: i64, notes: Vec<BlockHash>) -> Self {
        Self {
            fee,
            is_miners_fee: true,
            notes,
            spends: Vec::new(),
            proof: Vec::new(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(TRANSACTION_HASH_PERSONALIZATION);
        hasher.update(&encode_transaction(self));
        BlockHash::from(*hasher.finalize().as_bytes())
    }

    pub fn fee(&self) -> i64 {
        self.fee
    }

    pub fn is_miners_fee(&self) -> bool {
        self.is_miners_fee
    }

    pub fn notes(&self) -> &[BlockHash] {
        &self.notes
    }

    pub fn spends(&self) -> &[Spend] {
        &self.spends
    }

    pub fn proof(&self) -> &[u8] {
        &self.proof
    }
}

pub fn encode_transaction(transaction: &Transaction) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut flags = 0u8;
    if transaction.is_miners_fee {
        flags |= MINERS_FEE_FLAG;
    }
    buf.push(flags);
    buf.extend_from_slice(&transaction.fee.to_le_bytes());
    buf.extend_from_slice(&(transaction.notes.len() as u32).to_le_bytes());
    for note in &transaction.notes {
        buf.extend_from_slice(note.as_slice());
    }
    buf.extend_from_slice(&(transaction.spends.len() as u32).to_le_bytes());
    for spend in &transaction.spends {
        buf.extend_from_slice(spend.nullifier.as_slice());
        buf.extend_from_slice(spend.commitment.as_slice());
        buf.extend_from_slice(&spend.tree_size.to_le_bytes());
    }
    buf.extend_from_slice(&(transaction.proof.len() as u32).to_le_bytes());
    buf.extend_from_slice(&transaction.proof);
    buf
}

pub fn decode_transaction(reader: &mut ByteReader<'_>) -> Result<Transaction, CodecError> {
    let flags = reader.read_u8()?;
    let fee = i64::from_le_bytes(reader.read_u64_le()?.to_le_bytes());
    let note_count = reader.read_u32_le()? as usize;
    let mut notes = Vec::with_capacity(note_count.min(1024));
    for _ in 0..note_count {
        notes.push(reader.read_hash()?);
    }
    let spend_count = reader.read_u32_le()? as usize;
    let mut spends = Vec::with_capacity(spend_count.min(1024));
    for _ in 0..spend_count {
        let nullifier = reader.read_hash()?;
        let commitment = reader.read_hash()?;
        let tree_size = reader.read_u64_le()?;
        spends.push(Spend {
            nullifier,
            commitment,
            tree_size,
        });
    }
    let proof_len = reader.read_u32_le()? as usize;
    let proof = reader.read_bytes(proof_len)?.to_vec();

    Ok(Transaction {
        fee,
        is_miners_fee: flags & MINERS_FEE_FLAG != 0,
        notes,
        spends,
        proof,
    })
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;

    fn sample_transaction() -> Transaction {
        let mut rng = thread_rng();
        Transaction::new(
            7,
            vec![BlockHash::random(&mut rng)],
            vec![Spend {
                nullifier: Nullifier::random(&mut rng),
                commitment: BlockHash::random(&mut rng),
                tree_size: 12,
            }],
            vec![1, 2, 3, 4],
        )
    }

    #[test]
    fn it_round_trips_through_the_codec() {
        let transaction = sample_transaction();
        let bytes = encode_transaction(&transaction);
        let mut reader = ByteReader::new(&bytes);
        let decoded = decode_transaction(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, transaction);
        assert_eq!(decoded.hash(), transaction.hash());
    }

    #[test]
    fn it_changes_hash_when_any_field_changes() {
        let transaction = sample_transaction();
        let mut other = transaction.clone();
        other.fee += 1;
        assert_ne!(transaction.hash(), other.hash());
    }

    #[test]
    fn it_marks_miners_fee_transactions() {
        let tx = Transaction::miners_fee(-500_000_000, vec![BlockHash::zero()]);
        assert!(tx.is_miners_fee());
        assert!(tx.spends().is_empty());
        let bytes = encode_transaction(&tx);
        let decoded = decode_transaction(&mut ByteReader::new(&bytes)).unwrap();
        assert!(decoded.is_miners_fee());
        assert_eq!(decoded.fee(), -500_000_000);
    }
}
