#![no_main]

use ironfish_core::{
    blocks::{decode_block, encode_block},
    consensus::{ActivationSequence, ConsensusConstants, ConsensusFeature, ConsensusManager},
    proof_of_work::FishHashFactory,
};
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

// FishHash is held inactive so every fuzzed header hashes on the BLAKE3 path and no context is
// built inside the fuzz loop.
static RULES: Lazy<ConsensusManager> = Lazy::new(|| {
    ConsensusManager::new(
        ConsensusConstants::mainnet().with_activation(ConsensusFeature::FishHash, ActivationSequence::Never),
    )
});
static POW: Lazy<FishHashFactory> = Lazy::new(FishHashFactory::default);

// Peer-supplied block messages are fully untrusted: decoding must never panic, embedded counts
// and length prefixes must be bounds-checked, and an accepted block must round-trip through the
// wire codec with its locally computed hash intact.
fuzz_target!(|data: &[u8]| {
    if let Ok(block) = decode_block(data, &RULES, &POW) {
        let bytes = encode_block(&block).expect("a decoded block re-encodes within the size bound");
        let again = decode_block(&bytes, &RULES, &POW).expect("a re-encoded block decodes");
        assert_eq!(again.hash(), block.hash());
        assert_eq!(again, block);
    }
});
