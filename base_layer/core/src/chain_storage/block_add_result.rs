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

use ironfish_common_types::types::BlockHash;

/// The connected component an added block landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGraph {
    /// The heaviest tip of the component. For genesis-connected blocks this is the canonical
    /// head; for islands it is the latest known descendant.
    pub heaviest_hash: BlockHash,
    /// The lowest-sequence header of the component. For genesis-connected blocks this is the
    /// genesis hash; for islands it is the header whose predecessor is still missing.
    pub tail_hash: BlockHash,
}

/// The outcome of [`BlockchainDatabase::add_block`](crate::chain_storage::BlockchainDatabase::add_block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAddResult {
    /// False when the block was already known and nothing changed
    pub is_added: bool,
    /// Whether the block's ancestry reaches the genesis block
    pub connected_to_genesis: bool,
    /// Present for every added block
    pub resolved_graph: Option<ResolvedGraph>,
}

impl BlockAddResult {
    pub fn assert_added(&self) {
        assert!(self.is_added, "block was not added");
    }

    pub fn graph(&self) -> &ResolvedGraph {
        self.resolved_graph.as_ref().expect("block add result has no graph")
    }
}
