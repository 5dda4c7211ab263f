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

use ironfish_common_types::types::{BlockHash, Nullifier};
use thiserror::Error;

use crate::blocks::Block;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreesError {
    #[error("The notes tree has never had size {0}")]
    UnknownTreeSize(u64),
    #[error("Trees service failure: {0}")]
    ServiceFailure(String),
}

/// The boundary to the external notes/nullifiers tree service. The chain core never walks these
/// trees itself; it only asks for historical roots and nullifier membership against a consistent
/// snapshot.
pub trait NoteTreesService: Send + Sync + 'static {
    /// The root the global notes tree had when its size was exactly `tree_size`.
    fn past_notes_root(&self, tree_size: u64) -> Result<BlockHash, TreesError>;

    /// Whether the nullifier is present among the first `tree_size` entries of the nullifier set.
    fn contains_nullifier(&self, nullifier: &Nullifier, tree_size: u64) -> Result<bool, TreesError>;

    /// The EVM post-state root after applying the block's EVM-affecting transactions, or `None`
    /// when the deployment carries no EVM state.
    fn state_root_after(&self, block: &Block) -> Result<Option<BlockHash>, TreesError>;
}
