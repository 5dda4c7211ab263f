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
    blocks::{ByteReader, CodecError},
    consensus::{ConsensusFeature, ConsensusManager},
    proof_of_work::{FishHashFactory, Target},
};

pub const GRAFFITI_SIZE: usize = 32;

const STATE_COMMITMENT_FLAG: u8 = 0x01;

/// The consensus fields of a block header. This is the record peers agree on; everything a node
/// derives locally (the hash, the cumulative work) lives on [`BlockHeader`] and
/// [`ChainHeader`](crate::blocks::ChainHeader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlockHeader {
    /// Block counter, 1 at genesis and strictly ascending on the main chain
    pub sequence: u32,
    pub previous_block_hash: BlockHash,
    /// Root of the global notes tree after this block's additions
    pub note_commitment: BlockHash,
    /// Merkle root over this block's transaction hashes
    pub transaction_commitment: BlockHash,
    pub target: Target,
    pub randomness: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Arbitrary miner-chosen bytes. Rendering to text is a view concern, never a consensus one.
    pub graffiti: [u8; GRAFFITI_SIZE],
    /// EVM post-state root, present iff the EVM-descriptions feature is active at this sequence
    pub state_commitment: Option<BlockHash>,
}

impl RawBlockHeader {
    /// The canonical hash preimage of this header.
    ///
    /// The field order is part of the chain ABI and differs between the BLAKE3 era and the
    /// FishHash era: the FishHash layout moves the randomness from the front to just before the
    /// optional state commitment, and leads with the graffiti.
    pub fn serialize_for_hash(&self, rules: &ConsensusManager) -> Vec<u8> {
        let fish_hash = rules.is_active(ConsensusFeature::FishHash, self.sequence);
        let evm = rules.is_active(ConsensusFeature::EvmDescriptions, self.sequence);

        let mut buf = Vec::with_capacity(212);
        if fish_hash {
            buf.extend_from_slice(&self.graffiti);
            buf.extend_from_slice(&self.sequence.to_le_bytes());
            buf.extend_from_slice(self.previous_block_hash.as_slice());
            buf.extend_from_slice(self.note_commitment.as_slice());
            buf.extend_from_slice(self.transaction_commitment.as_slice());
            buf.extend_from_slice(&self.target.to_bytes_be());
            buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
            buf.extend_from_slice(&self.randomness.to_be_bytes());
        } else {
            buf.extend_from_slice(&self.randomness.to_be_bytes());
            buf.extend_from_slice(&self.sequence.to_le_bytes());
            buf.extend_from_slice(self.previous_block_hash.as_slice());
            buf.extend_from_slice(self.note_commitment.as_slice());
            buf.extend_from_slice(self.transaction_commitment.as_slice());
            buf.extend_from_slice(&self.target.to_bytes_be());
            buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
            buf.extend_from_slice(&self.graffiti);
        }
        if evm {
            buf.extend_from_slice(self.state_commitment.unwrap_or_default().as_slice());
        }
        buf
    }

    /// Hashes this header with the function the consensus rules select at its sequence:
    /// BLAKE3 before the FishHash activation, FishHash after.
    pub fn compute_hash(&self, rules: &ConsensusManager, pow: &FishHashFactory) -> BlockHash {
        let preimage = self.serialize_for_hash(rules);
        if rules.is_active(ConsensusFeature::FishHash, self.sequence) {
            BlockHash::from(pow.context().hash(&preimage))
        } else {
            BlockHash::from(*blake3::hash(&preimage).as_bytes())
        }
    }
}

/// A block header with its locally derived identity. The hash is computed once at construction
/// and is read-only afterwards; changing the randomness means constructing a new header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    raw: RawBlockHeader,
    /// Size of the notes tree after this block
    note_size: u64,
    /// Size of the nullifier set after this block
    nullifier_size: u64,
    /// The fee of the miners' fee transaction, negative by construction. Kept on the header for
    /// the legacy storage record.
    miners_fee: i64,
    hash: BlockHash,
}

impl BlockHeader {
    pub fn new(
        raw: RawBlockHeader,
        note_size: u64,
        nullifier_size: u64,
        miners_fee: i64,
        rules: &ConsensusManager,
        pow: &FishHashFactory,
    ) -> Self {
        let hash = raw.compute_hash(rules, pow);
        Self {
            raw,
            note_size,
            nullifier_size,
            miners_fee,
            hash,
        }
    }

    /// Rebuilds a header from a trusted record that already carries its hash. Only storage
    /// decoding may use this; everything else recomputes the hash through [`BlockHeader::new`].
    pub(crate) fn from_parts(
        raw: RawBlockHeader,
        note_size: u64,
        nullifier_size: u64,
        miners_fee: i64,
        hash: BlockHash,
    ) -> Self {
        Self {
            raw,
            note_size,
            nullifier_size,
            miners_fee,
            hash,
        }
    }

    pub fn raw(&self) -> &RawBlockHeader {
        &self.raw
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    pub fn sequence(&self) -> u32 {
        self.raw.sequence
    }

    pub fn previous_block_hash(&self) -> BlockHash {
        self.raw.previous_block_hash
    }

    pub fn note_commitment(&self) -> BlockHash {
        self.raw.note_commitment
    }

    pub fn transaction_commitment(&self) -> BlockHash {
        self.raw.transaction_commitment
    }

    pub fn target(&self) -> Target {
        self.raw.target
    }

    pub fn randomness(&self) -> u64 {
        self.raw.randomness
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.raw.timestamp_ms
    }

    pub fn graffiti(&self) -> &[u8; GRAFFITI_SIZE] {
        &self.raw.graffiti
    }

    pub fn state_commitment(&self) -> Option<BlockHash> {
        self.raw.state_commitment
    }

    pub fn note_size(&self) -> u64 {
        self.note_size
    }

    pub fn nullifier_size(&self) -> u64 {
        self.nullifier_size
    }

    pub fn miners_fee(&self) -> i64 {
        self.miners_fee
    }

    /// A copy of this header with new randomness. The hash is recomputed; the original header is
    /// left untouched.
    pub fn with_randomness(&self, randomness: u64, rules: &ConsensusManager, pow: &FishHashFactory) -> Self {
        let mut raw = self.raw.clone();
        raw.randomness = randomness;
        Self::new(
            raw,
            self.note_size,
            self.nullifier_size,
            self.miners_fee,
            rules,
            pow,
        )
    }
}

impl Display for BlockHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.sequence(), self.hash())
    }
}

/// Encodes a header for the peer boundary.
pub fn encode_header(header: &BlockHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(230);
    let mut flags = 0u8;
    if header.state_commitment().is_some() {
        flags |= STATE_COMMITMENT_FLAG;
    }
    buf.push(flags);
    buf.extend_from_slice(&header.sequence().to_le_bytes());
    buf.extend_from_slice(header.previous_block_hash().as_slice());
    buf.extend_from_slice(header.note_commitment().as_slice());
    buf.extend_from_slice(&header.note_size().to_le_bytes());
    buf.extend_from_slice(header.transaction_commitment().as_slice());
    buf.extend_from_slice(&header.nullifier_size().to_le_bytes());
    buf.extend_from_slice(&header.target().to_bytes_be());
    buf.extend_from_slice(&header.randomness().to_be_bytes());
    buf.extend_from_slice(&header.timestamp_ms().to_le_bytes());
    buf.extend_from_slice(header.graffiti());
    buf.extend_from_slice(&header.miners_fee().to_le_bytes());
    if let Some(state_commitment) = header.state_commitment() {
        buf.extend_from_slice(state_commitment.as_slice());
    }
    buf
}

/// Decodes a peer-supplied header. The hash is recomputed locally from the consensus rules, so a
/// peer cannot assert an identity its bytes do not hash to.
pub fn decode_header(
    reader: &mut ByteReader<'_>,
    rules: &ConsensusManager,
    pow: &FishHashFactory,
) -> Result<BlockHeader, CodecError> {
    let flags = reader.read_u8()?;
    let sequence = reader.read_u32_le()?;
    let previous_block_hash = reader.read_hash()?;
    let note_commitment = reader.read_hash()?;
    let note_size = reader.read_u64_le()?;
    let transaction_commitment = reader.read_hash()?;
    let nullifier_size = reader.read_u64_le()?;
    let target = Target::from_bytes_be(reader.read_bytes(32)?).map_err(|_| CodecError::InvalidField("target"))?;
    let randomness = reader.read_u64_be()?;
    let timestamp_ms = reader.read_u64_le()?;
    let graffiti = reader.read_array32()?;
    let miners_fee = i64::from_le_bytes(reader.read_u64_le()?.to_le_bytes());
    let state_commitment = if flags & STATE_COMMITMENT_FLAG != 0 {
        Some(reader.read_hash()?)
    } else {
        None
    };

    let raw = RawBlockHeader {
        sequence,
        previous_block_hash,
        note_commitment,
        transaction_commitment,
        target,
        randomness,
        timestamp_ms,
        graffiti,
        state_commitment,
    };
    Ok(BlockHeader::new(raw, note_size, nullifier_size, miners_fee, rules, pow))
}
