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

//! The memory-hard proof-of-work hash used after the FishHash activation sequence.
//!
//! The mix is built over a keccak-seeded light cache. Dataset items are derived from the cache on
//! demand, or precomputed in full when a deployment opts into the larger memory footprint for
//! faster verification. Both paths produce identical hashes.

use std::sync::Arc;

use log::*;
use once_cell::sync::OnceCell;
use tiny_keccak::{Hasher, Keccak};

const LOG_TARGET: &str = "c::pow::fish_hash";

const LIGHT_CACHE_NUM_ITEMS: usize = 1 << 16;
const FULL_DATASET_NUM_ITEMS: usize = 1 << 18;
const LIGHT_CACHE_ROUNDS: usize = 2;
const DATASET_PARENTS: usize = 64;
const MIX_ROUNDS: usize = 8;

const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const SEED_PHRASE: &[u8] = b"Iron Fish FishHash cache seed";

fn fnv1(u: u64, v: u64) -> u64 {
    u.wrapping_mul(FNV_PRIME) ^ v
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    let mut keccak = Keccak::v256();
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut output = [0u8; 64];
    let mut keccak = Keccak::v512();
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

type Hash512 = [u64; 8];
type Hash1024 = [u64; 16];

fn to_words(bytes: [u8; 64]) -> Hash512 {
    let mut words = [0u64; 8];
    for (i, chunk) in bytes.chunks_exact(8).enumerate() {
        words[i] = u64::from_le_bytes(chunk.try_into().unwrap_or_default());
    }
    words
}

fn to_bytes(words: Hash512) -> [u8; 64] {
    let mut bytes = [0u8; 64];
    for (i, word) in words.iter().enumerate() {
        bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// Configuration for the FishHash context held by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FishHashConfig {
    /// Precompute the full dataset at context creation. Validators trade a large, slow, one-off
    /// allocation for faster per-hash verification. This is a deployment choice only; both
    /// settings hash identically.
    pub prebuild_dataset: bool,
}

/// The shared FishHash state: the keccak-seeded light cache and, optionally, the precomputed
/// full dataset derived from it.
pub struct FishHashContext {
    light_cache: Vec<Hash512>,
    full_dataset: Option<Vec<Hash1024>>,
    dataset_items: usize,
}

impl FishHashContext {
    pub fn new(prebuild_dataset: bool) -> Self {
        Self::with_sizes(LIGHT_CACHE_NUM_ITEMS, FULL_DATASET_NUM_ITEMS, prebuild_dataset)
    }

    fn with_sizes(light_items: usize, full_items: usize, prebuild_dataset: bool) -> Self {
        let light_cache = build_light_cache(light_items);
        let full_dataset = if prebuild_dataset {
            Some(
                (0..full_items)
                    .map(|i| calculate_dataset_item(&light_cache, i, full_items))
                    .collect(),
            )
        } else {
            None
        };
        Self {
            light_cache,
            full_dataset,
            dataset_items: full_items,
        }
    }

    fn dataset_item(&self, index: usize) -> Hash1024 {
        match &self.full_dataset {
            Some(dataset) => dataset[index],
            None => calculate_dataset_item(&self.light_cache, index, self.dataset_items),
        }
    }

    /// Hashes an arbitrary preimage to 32 bytes.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let seed = keccak512(data);
        let seed_words = to_words(seed);

        let mut mix: Hash1024 = [0u64; 16];
        mix[..8].copy_from_slice(&seed_words);
        mix[8..].copy_from_slice(&seed_words);

        let num_items = self.dataset_items;
        for round in 0..MIX_ROUNDS {
            let index = fnv1(round as u64 ^ seed_words[0], mix[round % 16]) as usize % num_items;
            let item = self.dataset_item(index);
            for word in 0..16 {
                mix[word] = fnv1(mix[word], item[word]);
            }
        }

        let mut compressed = [0u64; 4];
        for word in 0..4 {
            compressed[word] = fnv1(
                fnv1(fnv1(mix[4 * word], mix[4 * word + 1]), mix[4 * word + 2]),
                mix[4 * word + 3],
            );
        }

        let mut final_input = [0u8; 96];
        final_input[..64].copy_from_slice(&seed);
        for (i, word) in compressed.iter().enumerate() {
            final_input[64 + i * 8..64 + (i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        keccak256(&final_input)
    }
}

fn build_light_cache(num_items: usize) -> Vec<Hash512> {
    let mut items = Vec::with_capacity(num_items);
    let mut item = keccak512(&keccak256(SEED_PHRASE));
    items.push(to_words(item));
    for _ in 1..num_items {
        item = keccak512(&item);
        items.push(to_words(item));
    }

    // RandMemoHash passes over the freshly generated items
    for _ in 0..LIGHT_CACHE_ROUNDS {
        for i in 0..num_items {
            let first = items[(i + num_items - 1) % num_items];
            let second = items[items[i][0] as usize % num_items];
            let mut mixed = [0u64; 8];
            for word in 0..8 {
                mixed[word] = first[word] ^ second[word];
            }
            items[i] = to_words(keccak512(&to_bytes(mixed)));
        }
    }
    items
}

fn calculate_dataset_item(cache: &[Hash512], index: usize, num_items: usize) -> Hash1024 {
    debug_assert!(index < num_items);
    let num_cache_items = cache.len();

    let mut seed0 = cache[index % num_cache_items];
    seed0[0] ^= index as u64;
    let mut mix0 = to_words(keccak512(&to_bytes(seed0)));

    let mut seed1 = cache[(index + 1) % num_cache_items];
    seed1[0] ^= (index as u64).wrapping_add(1);
    let mut mix1 = to_words(keccak512(&to_bytes(seed1)));

    for parent in 0..DATASET_PARENTS {
        let parent0 = fnv1(index as u64 ^ parent as u64, mix0[parent % 8]) as usize % num_cache_items;
        let parent1 =
            fnv1((index as u64).rotate_left(1) ^ parent as u64, mix1[parent % 8]) as usize % num_cache_items;
        for word in 0..8 {
            mix0[word] = fnv1(mix0[word], cache[parent0][word]);
            mix1[word] = fnv1(mix1[word], cache[parent1][word]);
        }
    }

    let mix0 = to_words(keccak512(&to_bytes(mix0)));
    let mix1 = to_words(keccak512(&to_bytes(mix1)));

    let mut item = [0u64; 16];
    item[..8].copy_from_slice(&mix0);
    item[8..].copy_from_slice(&mix1);
    item
}

/// Creates and shares the process-wide [`FishHashContext`]. Context creation is expensive, so it
/// is deferred until the first post-activation header is hashed and then reused for the lifetime
/// of the process.
#[derive(Clone)]
pub struct FishHashFactory {
    config: FishHashConfig,
    context: Arc<OnceCell<Arc<FishHashContext>>>,
}

impl FishHashFactory {
    pub fn new(config: FishHashConfig) -> Self {
        Self {
            config,
            context: Arc::new(OnceCell::new()),
        }
    }

    pub fn context(&self) -> Arc<FishHashContext> {
        self.context
            .get_or_init(|| {
                info!(
                    target: LOG_TARGET,
                    "Building FishHash context (prebuild_dataset = {})", self.config.prebuild_dataset
                );
                Arc::new(FishHashContext::new(self.config.prebuild_dataset))
            })
            .clone()
    }
}

impl Default for FishHashFactory {
    fn default() -> Self {
        Self::new(FishHashConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_hashes_deterministically() {
        let context = FishHashContext::with_sizes(512, 2048, false);
        let a = context.hash(b"some header bytes");
        let b = context.hash(b"some header bytes");
        assert_eq!(a, b);
        let c = context.hash(b"some header bytez");
        assert_ne!(a, c);
    }

    #[test]
    fn it_hashes_identically_with_and_without_the_full_dataset() {
        let light = FishHashContext::with_sizes(512, 2048, false);
        let full = FishHashContext::with_sizes(512, 2048, true);
        for input in [&b"one"[..], &b"two"[..], &[0u8; 180][..]] {
            assert_eq!(light.hash(input), full.hash(input));
        }
    }

    #[test]
    fn it_builds_the_context_once_per_factory() {
        let factory = FishHashFactory::new(FishHashConfig::default());
        let first = factory.context();
        let second = factory.context();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
