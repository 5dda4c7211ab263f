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

use serde::{Deserialize, Serialize};

/// Named consensus features. Forks are expressed as activation policies on these names rather
/// than by branching consensus code on protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsensusFeature {
    /// Switch the header hash from BLAKE3 to the memory-hard FishHash, with its reordered
    /// preimage layout
    FishHash,
    /// Permit transferring ownership of a minted asset
    AssetOwnership,
    /// Carry an EVM post-state commitment in the block header
    EvmDescriptions,
}

impl Display for ConsensusFeature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConsensusFeature::FishHash => "enableFishHash",
            ConsensusFeature::AssetOwnership => "enableAssetOwnership",
            ConsensusFeature::EvmDescriptions => "enableEvmDescriptions",
        };
        f.write_str(s)
    }
}

/// The activation policy of one consensus feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationSequence {
    Never,
    Always,
    /// Active for every block whose sequence is at or past the given sequence
    AtSequence(u32),
}

impl ActivationSequence {
    pub fn is_active(&self, sequence: u32) -> bool {
        match self {
            ActivationSequence::Never => false,
            ActivationSequence::Always => true,
            ActivationSequence::AtSequence(activation) => sequence >= *activation,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, ActivationSequence::Never)
    }
}

/// The numeric parameters and feature activations of one network. This is a value object; two
/// nodes interoperate iff they hold identical constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConstants {
    target_block_time_secs: u64,
    target_bucket_time_secs: u64,
    genesis_supply_iron: u64,
    year_in_blocks: u32,
    genesis_timestamp_ms: u64,
    genesis_graffiti: [u8; 32],
    enable_fish_hash: ActivationSequence,
    enable_asset_ownership: ActivationSequence,
    enable_evm_descriptions: ActivationSequence,
}

impl ConsensusConstants {
    pub fn mainnet() -> Self {
        Self {
            target_block_time_secs: 60,
            target_bucket_time_secs: 10,
            genesis_supply_iron: 42_000_000,
            year_in_blocks: 2_100_000,
            genesis_timestamp_ms: 1_681_948_800_000,
            genesis_graffiti: *b"genesis\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0",
            enable_fish_hash: ActivationSequence::AtSequence(419_193),
            enable_asset_ownership: ActivationSequence::AtSequence(334_000),
            enable_evm_descriptions: ActivationSequence::Never,
        }
    }

    pub fn target_block_time_secs(&self) -> u64 {
        self.target_block_time_secs
    }

    pub fn target_bucket_time_secs(&self) -> u64 {
        self.target_bucket_time_secs
    }

    pub fn genesis_supply_iron(&self) -> u64 {
        self.genesis_supply_iron
    }

    pub fn year_in_blocks(&self) -> u32 {
        self.year_in_blocks
    }

    pub fn genesis_timestamp_ms(&self) -> u64 {
        self.genesis_timestamp_ms
    }

    pub fn genesis_graffiti(&self) -> [u8; 32] {
        self.genesis_graffiti
    }

    pub fn activation(&self, feature: ConsensusFeature) -> ActivationSequence {
        match feature {
            ConsensusFeature::FishHash => self.enable_fish_hash,
            ConsensusFeature::AssetOwnership => self.enable_asset_ownership,
            ConsensusFeature::EvmDescriptions => self.enable_evm_descriptions,
        }
    }

    pub fn is_active(&self, feature: ConsensusFeature, sequence: u32) -> bool {
        self.activation(feature).is_active(sequence)
    }

    pub fn is_never_active(&self, feature: ConsensusFeature) -> bool {
        self.activation(feature).is_never()
    }

    /// Overrides one feature activation. Used to assemble devnet and test networks; mainnet
    /// constants are never mutated in place.
    pub fn with_activation(mut self, feature: ConsensusFeature, activation: ActivationSequence) -> Self {
        match feature {
            ConsensusFeature::FishHash => self.enable_fish_hash = activation,
            ConsensusFeature::AssetOwnership => self.enable_asset_ownership = activation,
            ConsensusFeature::EvmDescriptions => self.enable_evm_descriptions = activation,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_activates_at_the_configured_sequence() {
        let activation = ActivationSequence::AtSequence(10);
        assert!(!activation.is_active(9));
        assert!(activation.is_active(10));
        assert!(activation.is_active(11));
        assert!(ActivationSequence::Always.is_active(0));
        assert!(!ActivationSequence::Never.is_active(u32::MAX));
    }

    #[test]
    fn it_reports_never_active_features() {
        let constants = ConsensusConstants::mainnet();
        assert!(constants.is_never_active(ConsensusFeature::EvmDescriptions));
        assert!(!constants.is_never_active(ConsensusFeature::FishHash));
    }

    #[test]
    fn it_overrides_a_single_activation() {
        let constants = ConsensusConstants::mainnet()
            .with_activation(ConsensusFeature::FishHash, ActivationSequence::Always);
        assert!(constants.is_active(ConsensusFeature::FishHash, 1));
        assert!(!constants.is_active(ConsensusFeature::EvmDescriptions, 1));
    }
}
