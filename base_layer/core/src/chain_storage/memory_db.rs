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

use std::{collections::HashMap, sync::Arc};

use ironfish_common_types::{chain_metadata::ChainMetadata, types::BlockHash};

use crate::{
    blocks::{decode_chain_header, encode_chain_header, Block, ChainHeader},
    chain_storage::{BlockchainBackend, ChainStorageError, DbTransaction, WriteOperation},
};

/// The in-memory storage backend. Connected headers are held in their encoded storage-record
/// form, so the persisted codec is exercised on every fetch.
#[derive(Default)]
pub struct MemoryDatabase {
    headers: HashMap<BlockHash, Vec<u8>>,
    blocks: HashMap<BlockHash, Arc<Block>>,
    orphans: HashMap<BlockHash, Arc<Block>>,
    sequence_index: HashMap<u32, BlockHash>,
    next_hashes: HashMap<BlockHash, BlockHash>,
    children: HashMap<BlockHash, Vec<BlockHash>>,
    metadata: Option<ChainMetadata>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn link_child(&mut self, parent: BlockHash, child: BlockHash) {
        let children = self.children.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
    }
}

impl BlockchainBackend for MemoryDatabase {
    fn write(&mut self, txn: DbTransaction) -> Result<(), ChainStorageError> {
        for op in txn.operations() {
            match op.clone() {
                WriteOperation::InsertChainHeader(header) => {
                    let hash = header.hash();
                    let parent = header.header().previous_block_hash();
                    self.headers.insert(hash, encode_chain_header(&header));
                    self.link_child(parent, hash);
                },
                WriteOperation::InsertBlock { hash, block } => {
                    self.blocks.insert(hash, block);
                },
                WriteOperation::DeleteChainHeader(hash) => {
                    self.headers.remove(&hash);
                },
                WriteOperation::DeleteBlock(hash) => {
                    self.blocks.remove(&hash);
                },
                WriteOperation::InsertOrphan(block) => {
                    let hash = block.hash();
                    let parent = block.header().previous_block_hash();
                    self.orphans.insert(hash, block);
                    self.link_child(parent, hash);
                },
                WriteOperation::DeleteOrphan(hash) => {
                    self.orphans.remove(&hash);
                },
                WriteOperation::SetHashAtSequence { sequence, hash } => {
                    self.sequence_index.insert(sequence, hash);
                },
                WriteOperation::DeleteHashAtSequence(sequence) => {
                    self.sequence_index.remove(&sequence);
                },
                WriteOperation::SetNextHash { hash, next } => match next {
                    Some(next) => {
                        self.next_hashes.insert(hash, next);
                    },
                    None => {
                        self.next_hashes.remove(&hash);
                    },
                },
                WriteOperation::SetMetadata(metadata) => {
                    self.metadata = Some(metadata);
                },
            }
        }
        Ok(())
    }

    fn fetch_chain_header(&self, hash: &BlockHash) -> Result<Option<ChainHeader>, ChainStorageError> {
        self.headers
            .get(hash)
            .map(|bytes| decode_chain_header(bytes).map_err(ChainStorageError::from))
            .transpose()
    }

    fn fetch_block(&self, hash: &BlockHash) -> Result<Option<Arc<Block>>, ChainStorageError> {
        Ok(self.blocks.get(hash).cloned())
    }

    fn fetch_orphan(&self, hash: &BlockHash) -> Result<Option<Arc<Block>>, ChainStorageError> {
        Ok(self.orphans.get(hash).cloned())
    }

    fn fetch_hash_at_sequence(&self, sequence: u32) -> Result<Option<BlockHash>, ChainStorageError> {
        Ok(self.sequence_index.get(&sequence).copied())
    }

    fn fetch_next_hash(&self, hash: &BlockHash) -> Result<Option<BlockHash>, ChainStorageError> {
        Ok(self.next_hashes.get(hash).copied())
    }

    fn fetch_children(&self, hash: &BlockHash) -> Result<Vec<BlockHash>, ChainStorageError> {
        Ok(self.children.get(hash).cloned().unwrap_or_default())
    }

    fn fetch_metadata(&self) -> Result<Option<ChainMetadata>, ChainStorageError> {
        Ok(self.metadata.clone())
    }

    fn contains(&self, hash: &BlockHash) -> Result<bool, ChainStorageError> {
        Ok(self.headers.contains_key(hash) || self.orphans.contains_key(hash))
    }
}
