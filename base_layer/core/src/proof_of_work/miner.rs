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

use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    blocks::RawBlockHeader,
    consensus::ConsensusManager,
    proof_of_work::FishHashFactory,
};

/// The largest randomness value the batch search will emit. Randomness is an 8-byte field on the
/// wire, but legacy miner codecs represent it as a double-precision integer, so the search stays
/// inside the 53-bit safe range to keep every candidate representable by them.
pub const MAX_SAFE_RANDOMNESS: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MineResult {
    pub randomness: u64,
    pub initial_randomness: u64,
}

/// Searches one batch of randomness values for a header hash meeting the header's target.
///
/// Candidates are `initial_randomness + i` for `i` in `[0, batch_size)`, wrapping inside
/// `[0, MAX_SAFE_RANDOMNESS]`. The hash function and preimage layout follow the consensus rules
/// for the header's sequence, so a found header verifies unchanged. The abort flag is observed at
/// the top of every iteration; once set the batch exits with no result.
pub fn mine_header_batch(
    header: &RawBlockHeader,
    rules: &ConsensusManager,
    pow: &FishHashFactory,
    initial_randomness: u64,
    batch_size: u64,
    abort: &AtomicBool,
) -> Option<MineResult> {
    for i in 0..batch_size {
        if abort.load(Ordering::Relaxed) {
            return None;
        }
        let randomness = wrap_randomness(initial_randomness, i);
        let mut candidate = header.clone();
        candidate.randomness = randomness;
        let hash = candidate.compute_hash(rules, pow);
        if header.target.meets(hash.to_u256()) {
            return Some(MineResult {
                randomness,
                initial_randomness,
            });
        }
    }
    None
}

fn wrap_randomness(start: u64, i: u64) -> u64 {
    if i > MAX_SAFE_RANDOMNESS - start {
        i - (MAX_SAFE_RANDOMNESS - start) - 1
    } else {
        start + i
    }
}
