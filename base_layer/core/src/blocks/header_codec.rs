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

//! The persisted header record. This layout is per-node and never peer-visible, but it must stay
//! stable for the lifetime of a database: the leading version byte pins it. It is also never fed
//! to a hash function; the hash preimage is a separate layout owned by
//! [`RawBlockHeader::serialize_for_hash`](crate::blocks::RawBlockHeader::serialize_for_hash).

use integer_encoding::VarInt;
use primitive_types::U256;

use crate::{
    blocks::{BlockHeader, ByteReader, ChainHeader, CodecError, RawBlockHeader},
    proof_of_work::Target,
};

const HEADER_RECORD_VERSION: u8 = 1;

const STATE_COMMITMENT_FLAG: u8 = 0x01;
const MINERS_FEE_NEGATIVE_FLAG: u8 = 0x02;

/// Encodes a connected header for storage. Fixed-size fields are little-endian; `work` is a
/// varint-length-prefixed little-endian magnitude; `miners_fee` is stored as a sign flag plus
/// absolute value, the legacy on-disk form.
pub fn encode_chain_header(header: &ChainHeader) -> Vec<u8> {
    let h = header.header();
    let mut buf = Vec::with_capacity(256);
    buf.push(HEADER_RECORD_VERSION);

    let mut flags = 0u8;
    if h.state_commitment().is_some() {
        flags |= STATE_COMMITMENT_FLAG;
    }
    if h.miners_fee() < 0 {
        flags |= MINERS_FEE_NEGATIVE_FLAG;
    }
    buf.push(flags);

    buf.extend_from_slice(&h.sequence().to_le_bytes());
    buf.extend_from_slice(h.previous_block_hash().as_slice());
    buf.extend_from_slice(h.note_commitment().as_slice());
    buf.extend_from_slice(&h.note_size().to_le_bytes());
    buf.extend_from_slice(h.transaction_commitment().as_slice());
    buf.extend_from_slice(&h.nullifier_size().to_le_bytes());

    let mut target_le = h.target().to_bytes_be();
    target_le.reverse();
    buf.extend_from_slice(&target_le);

    buf.extend_from_slice(&h.randomness().to_le_bytes());
    buf.extend_from_slice(&h.timestamp_ms().to_le_bytes());
    buf.extend_from_slice(h.graffiti());
    buf.extend_from_slice(&h.miners_fee().unsigned_abs().to_le_bytes());

    let mut work_bytes = [0u8; 32];
    header.work().to_little_endian(&mut work_bytes);
    let significant = 32 - work_bytes.iter().rev().take_while(|b| **b == 0).count();
    buf.extend_from_slice(&(significant as u64).encode_var_vec());
    buf.extend_from_slice(&work_bytes[..significant]);

    buf.extend_from_slice(h.hash().as_slice());
    if let Some(state_commitment) = h.state_commitment() {
        buf.extend_from_slice(state_commitment.as_slice());
    }
    buf
}

/// Decodes a stored header record. The record carries the hash it was stored under, so no hashing
/// is redone here.
pub fn decode_chain_header(bytes: &[u8]) -> Result<ChainHeader, CodecError> {
    let mut reader = ByteReader::new(bytes);
    let version = reader.read_u8()?;
    if version != HEADER_RECORD_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    let flags = reader.read_u8()?;

    let sequence = reader.read_u32_le()?;
    let previous_block_hash = reader.read_hash()?;
    let note_commitment = reader.read_hash()?;
    let note_size = reader.read_u64_le()?;
    let transaction_commitment = reader.read_hash()?;
    let nullifier_size = reader.read_u64_le()?;

    let mut target_le = reader.read_array32()?;
    target_le.reverse();
    let target = Target::from_bytes_be(&target_le).map_err(|_| CodecError::InvalidField("target"))?;

    let randomness = reader.read_u64_le()?;
    let timestamp_ms = reader.read_u64_le()?;
    let graffiti = reader.read_array32()?;

    let fee_magnitude = reader.read_u64_le()?;
    if fee_magnitude > i64::MAX as u64 {
        return Err(CodecError::InvalidField("miners_fee"));
    }
    let miners_fee = if flags & MINERS_FEE_NEGATIVE_FLAG != 0 {
        -(fee_magnitude as i64)
    } else {
        fee_magnitude as i64
    };

    let work_bytes = reader.read_var_bytes()?;
    if work_bytes.len() > 32 {
        return Err(CodecError::InvalidField("work"));
    }
    let work = U256::from_little_endian(work_bytes);

    let hash = reader.read_hash()?;
    let state_commitment = if flags & STATE_COMMITMENT_FLAG != 0 {
        Some(reader.read_hash()?)
    } else {
        None
    };
    reader.finish()?;

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
    let header = BlockHeader::from_parts(raw, note_size, nullifier_size, miners_fee, hash);
    Ok(ChainHeader::new(header, work))
}
