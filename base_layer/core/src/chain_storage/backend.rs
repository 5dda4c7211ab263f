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

use ironfish_common_types::{chain_metadata::ChainMetadata, types::BlockHash};

use crate::{
    blocks::{Block, ChainHeader},
    chain_storage::ChainStorageError,
};

/// One mutation inside an atomic write batch.
#[derive(Debug, Clone)]
pub enum WriteOperation {
    InsertChainHeader(Box<ChainHeader>),
    InsertBlock { hash: BlockHash, block: Arc<Block> },
    DeleteChainHeader(BlockHash),
    DeleteBlock(BlockHash),
    InsertOrphan(Arc<Block>),
    DeleteOrphan(BlockHash),
    SetHashAtSequence { sequence: u32, hash: BlockHash },
    DeleteHashAtSequence(u32),
    SetNextHash { hash: BlockHash, next: Option<BlockHash> },
    SetMetadata(ChainMetadata),
}

/// An ordered batch of write operations applied atomically by the backend.
#[derive(Debug, Clone, Default)]
pub struct DbTransaction {
    operations: Vec<WriteOperation>,
}

impl DbTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[WriteOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn insert_chain_header(&mut self, header: ChainHeader) -> &mut Self {
        self.operations.push(WriteOperation::InsertChainHeader(Box::new(header)));
        self
    }

    pub fn insert_block(&mut self, hash: BlockHash, block: Arc<Block>) -> &mut Self {
        self.operations.push(WriteOperation::InsertBlock { hash, block });
        self
    }

    pub fn delete_chain_header(&mut self, hash: BlockHash) -> &mut Self {
        self.operations.push(WriteOperation::DeleteChainHeader(hash));
        self
    }

    pub fn delete_block(&mut self, hash: BlockHash) -> &mut Self {
        self.operations.push(WriteOperation::DeleteBlock(hash));
        self
    }

    pub fn insert_orphan(&mut self, block: Arc<Block>) -> &mut Self {
        self.operations.push(WriteOperation::InsertOrphan(block));
        self
    }

    pub fn delete_orphan(&mut self, hash: BlockHash) -> &mut Self {
        self.operations.push(WriteOperation::DeleteOrphan(hash));
        self
    }

    pub fn set_hash_at_sequence(&mut self, sequence: u32, hash: BlockHash) -> &mut Self {
        self.operations.push(WriteOperation::SetHashAtSequence { sequence, hash });
        self
    }

    pub fn delete_hash_at_sequence(&mut self, sequence: u32) -> &mut Self {
        self.operations.push(WriteOperation::DeleteHashAtSequence(sequence));
        self
    }

    pub fn set_next_hash(&mut self, hash: BlockHash, next: Option<BlockHash>) -> &mut Self {
        self.operations.push(WriteOperation::SetNextHash { hash, next });
        self
    }

    pub fn set_metadata(&mut self, metadata: ChainMetadata) -> &mut Self {
        self.operations.push(WriteOperation::SetMetadata(metadata));
        self
    }
}

/// The storage capability behind the chain. Backends only move bytes; every consensus decision
/// stays in [`BlockchainDatabase`](crate::chain_storage::BlockchainDatabase).
///
/// The key spaces are: connected headers by hash, block bodies by hash, the orphan pool, the
/// main-chain sequence index, the main-chain successor index, the child index, and the chain
/// metadata singleton.
pub trait BlockchainBackend: Send + Sync + 'static {
    /// Applies a write batch atomically.
    fn write(&mut self, txn: DbTransaction) -> Result<(), ChainStorageError>;

    fn fetch_chain_header(&self, hash: &BlockHash) -> Result<Option<ChainHeader>, ChainStorageError>;

    fn fetch_block(&self, hash: &BlockHash) -> Result<Option<Arc<Block>>, ChainStorageError>;

    fn fetch_orphan(&self, hash: &BlockHash) -> Result<Option<Arc<Block>>, ChainStorageError>;

    /// The main-chain hash at a sequence, if that sequence is on the main chain.
    fn fetch_hash_at_sequence(&self, sequence: u32) -> Result<Option<BlockHash>, ChainStorageError>;

    /// The main-chain successor of a hash.
    fn fetch_next_hash(&self, hash: &BlockHash) -> Result<Option<BlockHash>, ChainStorageError>;

    /// All known children of a hash, connected or orphaned.
    fn fetch_children(&self, hash: &BlockHash) -> Result<Vec<BlockHash>, ChainStorageError>;

    fn fetch_metadata(&self) -> Result<Option<ChainMetadata>, ChainStorageError>;

    /// Whether the hash is known at all, as a connected block or an orphan.
    fn contains(&self, hash: &BlockHash) -> Result<bool, ChainStorageError>;
}
