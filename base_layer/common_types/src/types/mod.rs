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

use std::{
    fmt::{Display, Formatter},
    ops::Deref,
};

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BLOCK_HASH_LENGTH: usize = 32;

/// The hash of a block header. Also used for the note, nullifier and transaction commitments carried
/// inside a header, which are roots of the respective global trees.
pub type BlockHash = FixedHash;

/// A nullifier revealed by a spend. Byte-equality only; nullifiers are never ordered on chain.
pub type Nullifier = FixedHash;

#[derive(Debug, Error)]
#[error("Invalid size for fixed hash: expected {BLOCK_HASH_LENGTH} bytes")]
pub struct FixedHashSizeError;

/// A 32-byte opaque hash value. Equality is byte equality and `Ord` is big-endian lexicographic,
/// which is the comparison order used by fork-choice tiebreaks.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FixedHash(#[serde(with = "crate::serializers::hex")] [u8; BLOCK_HASH_LENGTH]);

impl FixedHash {
    pub const fn byte_size() -> usize {
        BLOCK_HASH_LENGTH
    }

    pub const fn zero() -> Self {
        Self([0; BLOCK_HASH_LENGTH])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, FixedHashSizeError> {
        let bytes = hex::decode(s).map_err(|_| FixedHashSizeError)?;
        Self::try_from(bytes.as_slice())
    }

    /// Interprets the hash as an unsigned big-endian 256-bit integer, the form used by
    /// proof-of-work target comparisons.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    pub fn random<R: rand::Rng>(rng: &mut R) -> Self {
        let mut buf = [0u8; BLOCK_HASH_LENGTH];
        rng.fill(&mut buf);
        Self(buf)
    }
}

impl From<[u8; BLOCK_HASH_LENGTH]> for FixedHash {
    fn from(hash: [u8; BLOCK_HASH_LENGTH]) -> Self {
        Self(hash)
    }
}

impl TryFrom<&[u8]> for FixedHash {
    type Error = FixedHashSizeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let hash: [u8; BLOCK_HASH_LENGTH] = bytes.try_into().map_err(|_| FixedHashSizeError)?;
        Ok(Self(hash))
    }
}

impl TryFrom<Vec<u8>> for FixedHash {
    type Error = FixedHashSizeError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        bytes.as_slice().try_into()
    }
}

impl AsRef<[u8]> for FixedHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for FixedHash {
    type Target = [u8; BLOCK_HASH_LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for FixedHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for FixedHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_rejects_a_slice_of_the_wrong_length() {
        FixedHash::try_from([0u8; 31].as_slice()).unwrap_err();
        FixedHash::try_from([0u8; 33].as_slice()).unwrap_err();
        let hash = FixedHash::try_from([1u8; 32].as_slice()).unwrap();
        assert_eq!(hash.as_slice(), &[1u8; 32]);
    }

    #[test]
    fn it_orders_big_endian_lexicographically() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[0] = 1;
        b[31] = 0xff;
        // The leading byte dominates no matter how large the tail is
        assert!(FixedHash::from(a) > FixedHash::from(b));
        assert!(FixedHash::from(a).to_u256() > FixedHash::from(b).to_u256());
    }

    #[test]
    fn it_round_trips_hex() {
        let hash = FixedHash::from([0xab; 32]);
        assert_eq!(FixedHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(hash.to_hex().len(), 64);
    }
}
