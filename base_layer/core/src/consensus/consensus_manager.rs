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

use std::sync::Arc;

use crate::consensus::{ActivationSequence, ConsensusConstants, ConsensusFeature, MiningRewardSchedule};

/// A cheaply cloneable handle over the consensus rules of one network: the constants, feature
/// activations and the mining reward schedule.
#[derive(Clone)]
pub struct ConsensusManager {
    inner: Arc<ConsensusManagerInner>,
}

struct ConsensusManagerInner {
    constants: ConsensusConstants,
    emission: MiningRewardSchedule,
}

impl ConsensusManager {
    pub fn new(constants: ConsensusConstants) -> Self {
        let emission = MiningRewardSchedule::new(&constants);
        Self {
            inner: Arc::new(ConsensusManagerInner { constants, emission }),
        }
    }

    pub fn consensus_constants(&self) -> &ConsensusConstants {
        &self.inner.constants
    }

    pub fn activation(&self, feature: ConsensusFeature) -> ActivationSequence {
        self.inner.constants.activation(feature)
    }

    pub fn is_active(&self, feature: ConsensusFeature, sequence: u32) -> bool {
        self.inner.constants.is_active(feature, sequence)
    }

    pub fn is_never_active(&self, feature: ConsensusFeature) -> bool {
        self.inner.constants.is_never_active(feature)
    }

    /// The mining reward in ORE for a block at the given sequence.
    pub fn mining_reward(&self, sequence: u32) -> u64 {
        self.inner.emission.reward_at(sequence)
    }
}
