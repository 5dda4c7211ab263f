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

use std::fmt::{Display, Error, Formatter};

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::types::BlockHash;

/// A snapshot of the canonical chain as seen by one node: the heaviest head and the cumulative
/// work behind it. Published on every head change and consumed by sync decision logic.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct ChainMetadata {
    /// The sequence number of the current heaviest head
    best_block_sequence: u32,
    /// The block hash of the current heaviest head
    best_block_hash: BlockHash,
    /// The total accumulated proof of work of the heaviest chain
    accumulated_work: U256,
    /// Timestamp of the heaviest head, in milliseconds since epoch
    timestamp_ms: u64,
}

impl ChainMetadata {
    pub fn new(
        best_block_sequence: u32,
        best_block_hash: BlockHash,
        accumulated_work: U256,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            best_block_sequence,
            best_block_hash,
            accumulated_work,
            timestamp_ms,
        }
    }

    pub fn best_block_sequence(&self) -> u32 {
        self.best_block_sequence
    }

    pub fn best_block_hash(&self) -> &BlockHash {
        &self.best_block_hash
    }

    pub fn accumulated_work(&self) -> U256 {
        self.accumulated_work
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

impl Display for ChainMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        writeln!(f, "Best block sequence: {}", self.best_block_sequence)?;
        writeln!(f, "Best block hash: {}", self.best_block_hash)?;
        writeln!(f, "Accumulated work: {}", self.accumulated_work)?;
        Ok(())
    }
}
