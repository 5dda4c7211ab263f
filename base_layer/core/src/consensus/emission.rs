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

use std::{collections::HashMap, sync::Mutex};

use crate::consensus::ConsensusConstants;

/// The number of ORE in one IRON. All consensus arithmetic is done in ORE, the smallest
/// denomination.
pub const ORE_PER_IRON: u64 = 100_000_000;

/// The decay rate of the annual mining allocation, applied per elapsed year.
const DECAY_PER_YEAR: f64 = -0.05;

/// The block reward schedule: a quarter of the genesis supply decays exponentially per elapsed
/// year and is paid out evenly over the blocks of that year.
///
/// The reward is constant within a year, so results are cached keyed by the integer year.
#[derive(Debug)]
pub struct MiningRewardSchedule {
    genesis_supply_iron: u64,
    year_in_blocks: u32,
    rewards_by_year: Mutex<HashMap<u32, u64>>,
}

impl MiningRewardSchedule {
    pub fn new(constants: &ConsensusConstants) -> Self {
        Self {
            genesis_supply_iron: constants.genesis_supply_iron(),
            year_in_blocks: constants.year_in_blocks(),
            rewards_by_year: Mutex::new(HashMap::new()),
        }
    }

    /// The mining reward in ORE for a block at the given sequence.
    pub fn reward_at(&self, sequence: u32) -> u64 {
        let years_after_launch = sequence / self.year_in_blocks;
        let mut cache = self
            .rewards_by_year
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache
            .entry(years_after_launch)
            .or_insert_with(|| self.calculate_reward(years_after_launch))
    }

    fn calculate_reward(&self, years_after_launch: u32) -> u64 {
        let annual_iron =
            (self.genesis_supply_iron as f64 / 4.0) * (DECAY_PER_YEAR * f64::from(years_after_launch)).exp();
        let per_block_iron = annual_iron / f64::from(self.year_in_blocks);
        (per_block_iron * ORE_PER_IRON as f64).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> MiningRewardSchedule {
        MiningRewardSchedule::new(&ConsensusConstants::mainnet())
    }

    #[test]
    fn it_pays_five_iron_during_the_first_year() {
        let schedule = schedule();
        assert_eq!(schedule.reward_at(1), 5 * ORE_PER_IRON);
        assert_eq!(schedule.reward_at(100_000), 5 * ORE_PER_IRON);
    }

    #[test]
    fn it_decays_after_the_first_year() {
        let schedule = schedule();
        assert_eq!(schedule.reward_at(2_100_001), 475_614_712);
        let year_in_blocks = ConsensusConstants::mainnet().year_in_blocks();
        assert!(schedule.reward_at(year_in_blocks) < schedule.reward_at(year_in_blocks - 1));
    }

    #[test]
    fn it_is_monotonically_non_increasing_by_year() {
        let schedule = schedule();
        let year_in_blocks = ConsensusConstants::mainnet().year_in_blocks();
        let mut previous = schedule.reward_at(1);
        for year in 1..100u32 {
            let reward = schedule.reward_at(year.saturating_mul(year_in_blocks));
            assert!(reward <= previous, "reward rose in year {}", year);
            previous = reward;
        }
    }

    #[test]
    fn it_caches_by_year() {
        let schedule = schedule();
        schedule.reward_at(1);
        schedule.reward_at(2);
        assert_eq!(schedule.rewards_by_year.lock().unwrap().len(), 1);
    }
}
