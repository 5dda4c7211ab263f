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

use once_cell::sync::Lazy;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::proof_of_work::{Difficulty, PowError, MIN_DIFFICULTY};

/// The number of difficulty steps one retarget bucket moves, as a divisor of the parent
/// difficulty. A block that lands one bucket late loses `parent / 2048` difficulty.
const DIFFICULTY_STEP_DIVISOR: u64 = 2048;

/// A block that lands later than this many buckets past the desired block time is treated the
/// same as one exactly this late.
const MAX_BUCKETS: i64 = 99;

static MAX_TARGET: Lazy<Target> = Lazy::new(|| Target(div_pow256(U256::from(MIN_DIFFICULTY))));

/// A proof-of-work target. A header hash, read as an unsigned big-endian 256-bit integer, meets
/// the target iff it is less than or equal to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target(U256);

impl Target {
    /// The largest target the network will ever assign, `2^256 / MIN_DIFFICULTY`.
    pub fn max_target() -> Self {
        *MAX_TARGET
    }

    pub fn from_u256(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Reads a big-endian byte string of at most 32 bytes.
    pub fn from_bytes_be(bytes: &[u8]) -> Result<Self, PowError> {
        if bytes.len() > 32 {
            return Err(PowError::TargetBytesTooLong(bytes.len()));
        }
        Ok(Self(U256::from_big_endian(bytes)))
    }

    pub fn to_bytes_be(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.0.to_big_endian(&mut buf);
        buf
    }

    /// The difficulty this target represents: `2^256 / target`, saturating to `U256::MAX` for
    /// targets below 2 where the quotient does not fit into 256 bits.
    pub fn to_difficulty(&self) -> Difficulty {
        if self.0 <= U256::one() {
            return Difficulty::from_u256(U256::MAX);
        }
        Difficulty::from_u256(div_pow256(self.0))
    }

    /// The target a block of the given difficulty must meet. Difficulties at or below the network
    /// minimum all map onto the maximum target.
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        if difficulty.as_u256() <= U256::from(MIN_DIFFICULTY) {
            return Self::max_target();
        }
        Self(div_pow256(difficulty.as_u256()))
    }

    /// Whether a header hash (as an unsigned 256-bit integer) satisfies this target.
    pub fn meets(&self, hash: U256) -> bool {
        hash <= self.0
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `floor(2^256 / x)` computed in 256-bit space. The caller must ensure `x >= 2`.
fn div_pow256(x: U256) -> U256 {
    debug_assert!(x >= U256::from(2));
    let quotient = U256::MAX / x;
    let remainder = U256::MAX % x;
    // 2^256 = U256::MAX + 1, so the quotient gains one when the remainder is x - 1
    if remainder + U256::one() == x {
        quotient + U256::one()
    } else {
        quotient
    }
}

/// The bucketed difficulty retarget. Blocks faster than the desired block time raise the
/// difficulty and slower blocks lower it, in discrete buckets of `target_bucket_time_secs`
/// centred on `target_block_time_secs`. The result never drops below the network minimum.
///
/// This is a consensus-critical numeric contract: the floor-division of the signed bucket, the
/// half-bucket offset and the 99-bucket clamp must all be preserved exactly.
pub fn calculate_difficulty(
    timestamp_ms: u64,
    parent_timestamp_ms: u64,
    parent_difficulty: Difficulty,
    target_block_time_secs: u64,
    target_bucket_time_secs: u64,
) -> Difficulty {
    let diff_in_seconds = (timestamp_ms as i64 - parent_timestamp_ms as i64).div_euclid(1000);
    let half_bucket = (target_bucket_time_secs / 2) as i64;

    let numerator = diff_in_seconds - target_block_time_secs as i64 + half_bucket;
    let mut bucket = numerator.div_euclid(target_bucket_time_secs as i64);
    if bucket > MAX_BUCKETS {
        bucket = MAX_BUCKETS;
    }

    let parent = parent_difficulty.as_u256();
    let step = parent / DIFFICULTY_STEP_DIVISOR;
    let adjusted = if bucket >= 0 {
        parent.saturating_sub(step.saturating_mul(U256::from(bucket as u64)))
    } else {
        parent.saturating_add(step.saturating_mul(U256::from(bucket.unsigned_abs())))
    };

    Difficulty::from_u256(adjusted.max(U256::from(MIN_DIFFICULTY)))
}

/// Convenience wrapper over [`calculate_difficulty`] returning the target form.
pub fn calculate_target(
    timestamp_ms: u64,
    parent_timestamp_ms: u64,
    parent_difficulty: Difficulty,
    target_block_time_secs: u64,
    target_bucket_time_secs: u64,
) -> Target {
    Target::from_difficulty(calculate_difficulty(
        timestamp_ms,
        parent_timestamp_ms,
        parent_difficulty,
        target_block_time_secs,
        target_bucket_time_secs,
    ))
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;

    const TARGET_BLOCK_TIME: u64 = 60;
    const TARGET_BUCKET_TIME: u64 = 10;

    fn retarget(diff_ms: u64, parent: u64) -> Difficulty {
        calculate_difficulty(
            diff_ms,
            0,
            Difficulty::from(parent),
            TARGET_BLOCK_TIME,
            TARGET_BUCKET_TIME,
        )
    }

    mod to_difficulty {
        use super::*;

        #[test]
        fn it_saturates_below_two() {
            assert_eq!(
                Target::from_u256(U256::zero()).to_difficulty(),
                Difficulty::from_u256(U256::MAX)
            );
            assert_eq!(
                Target::from_u256(U256::one()).to_difficulty(),
                Difficulty::from_u256(U256::MAX)
            );
        }

        #[test]
        fn it_round_trips_through_from_difficulty() {
            for d in [MIN_DIFFICULTY, MIN_DIFFICULTY + 1, 1 << 20, 1 << 40, u64::MAX] {
                let difficulty = Difficulty::from(d);
                assert_eq!(Target::from_difficulty(difficulty).to_difficulty(), difficulty);
            }
        }

        #[test]
        fn it_meets_its_own_value() {
            let target = Target::from_difficulty(Difficulty::from(1 << 30));
            assert!(target.meets(target.as_u256()));
            assert!(!target.meets(target.as_u256() + U256::one()));
        }

        #[test]
        fn it_maps_low_difficulties_to_the_max_target() {
            assert_eq!(Target::from_difficulty(Difficulty::from(1)), Target::max_target());
            assert_eq!(
                Target::from_difficulty(Difficulty::from(MIN_DIFFICULTY)),
                Target::max_target()
            );
        }
    }

    mod calculate_difficulty {
        use super::*;

        #[test]
        fn it_holds_difficulty_inside_the_centre_bucket() {
            // 55s..=64s all land in bucket zero
            for secs in 55..=64u64 {
                assert_eq!(retarget(secs * 1000, 1 << 30), Difficulty::from(1 << 30));
            }
            assert_eq!(retarget(60_000, MIN_DIFFICULTY), Difficulty::from(MIN_DIFFICULTY));
        }

        #[test]
        fn it_raises_difficulty_one_step_for_one_fast_bucket() {
            let parent = MIN_DIFFICULTY;
            let expected = parent + parent / DIFFICULTY_STEP_DIVISOR;
            for secs in 45..=54u64 {
                assert_eq!(retarget(secs * 1000, parent), Difficulty::from(expected));
            }
            assert_eq!(retarget(45_000, 131_072), Difficulty::from(131_136));
        }

        #[test]
        fn it_lowers_difficulty_one_step_for_one_slow_bucket() {
            let parent: u64 = 1 << 30;
            let expected = parent - parent / DIFFICULTY_STEP_DIVISOR;
            assert_eq!(retarget(65_000, parent), Difficulty::from(expected));
        }

        #[test]
        fn it_clamps_very_slow_blocks_to_ninety_nine_buckets() {
            let parent: u64 = 1 << 30;
            let expected = parent - 99 * (parent / DIFFICULTY_STEP_DIVISOR);
            let very_late = (100 * TARGET_BUCKET_TIME + TARGET_BLOCK_TIME + 1) * 1000;
            assert_eq!(retarget(very_late, parent), Difficulty::from(expected));
            assert_eq!(retarget(very_late * 50, parent), Difficulty::from(expected));
        }

        #[test]
        fn it_never_drops_below_the_minimum() {
            assert_eq!(retarget(10_000_000, MIN_DIFFICULTY), Difficulty::from(MIN_DIFFICULTY));
            assert_eq!(
                retarget(10_000_000, MIN_DIFFICULTY + 5),
                Difficulty::from(MIN_DIFFICULTY)
            );
        }

        #[test]
        fn it_accepts_timestamps_before_the_parent() {
            // Timestamps may precede the parent by up to the verifier slack; the bucket goes
            // negative and difficulty rises.
            let parent: u64 = 1 << 30;
            let d = calculate_difficulty(
                0,
                14_000,
                Difficulty::from(parent),
                TARGET_BLOCK_TIME,
                TARGET_BUCKET_TIME,
            );
            // -14s puts the numerator at -69, bucket at -7
            assert_eq!(
                d,
                Difficulty::from(parent + 7 * (parent / DIFFICULTY_STEP_DIVISOR))
            );
        }
    }

    quickcheck! {
        fn prop_round_trip(difficulty: u64) -> bool {
            let d = Difficulty::from(difficulty.max(MIN_DIFFICULTY));
            Target::from_difficulty(d).to_difficulty() == d
        }

        fn prop_target_meets_itself(difficulty: u64) -> bool {
            let t = Target::from_difficulty(Difficulty::from(difficulty));
            t.meets(t.as_u256())
        }
    }
}
