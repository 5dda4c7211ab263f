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
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use log::*;
use lru::LruCache;

use crate::{
    base_node::{BlockRequest, BlocksResponse, PeerId, RequestKey, SyncError, MAX_BLOCKS_PER_MESSAGE},
    blocks::{encode_block, Block, MAX_MESSAGE_SIZE},
    chain_storage::{BlockchainBackend, BlockchainDatabase},
};

const LOG_TARGET: &str = "c::bn::block_service";

/// Capacity of the recently-served block cache.
pub const SERVED_BLOCK_CACHE_SIZE: usize = 500;

/// The serving side of the peer boundary: answers block requests out of a read-through LRU over
/// the chain store.
pub struct BlockRequestService<B> {
    db: BlockchainDatabase<B>,
    local_peer: PeerId,
    recently_served: Mutex<LruCache<RequestKey, Arc<Block>>>,
}

impl<B: BlockchainBackend> BlockRequestService<B> {
    pub fn new(db: BlockchainDatabase<B>, local_peer: PeerId) -> Self {
        Self {
            db,
            local_peer,
            recently_served: Mutex::new(LruCache::new(
                NonZeroUsize::new(SERVED_BLOCK_CACHE_SIZE).expect("capacity is non-zero"),
            )),
        }
    }

    /// Answers one block request.
    ///
    /// A non-forward request returns the named block or fails. A forward request returns the
    /// main-chain successors of the named hash, at most [`MAX_BLOCKS_PER_MESSAGE`] of them and
    /// bounded by [`MAX_MESSAGE_SIZE`]; when the hash has no successor the response is the
    /// current heaviest head, or the empty list when the asker already holds our exact tip.
    pub fn handle_block_request(&self, request: &BlockRequest) -> Result<BlocksResponse, SyncError> {
        if !request.forward {
            let block = self.get_block_through_cache(request)?;
            return match block {
                Some(block) => Ok(self.respond(vec![block])),
                None => Err(SyncError::CannotSatisfyRequest(request.hash.to_hex())),
            };
        }

        let mut blocks = Vec::new();
        let mut response_size = 0usize;
        let mut cursor = request.hash;
        while blocks.len() < MAX_BLOCKS_PER_MESSAGE {
            let next = match self.db.next_hash(&cursor)? {
                Some(next) => next,
                None => break,
            };
            let block = self
                .db
                .get_block(&next)?
                .ok_or_else(|| SyncError::CannotSatisfyRequest(next.to_hex()))?;
            let encoded_size = encode_block(&block)
                .map_err(|e| SyncError::CannotSatisfyRequest(e.to_string()))?
                .len();
            if response_size + encoded_size > MAX_MESSAGE_SIZE {
                break;
            }
            response_size += encoded_size;
            blocks.push(block);
            cursor = next;
        }

        if !blocks.is_empty() {
            return Ok(self.respond(blocks));
        }

        // cannot serve successors: answer with the heaviest head as a heartbeat, or with the
        // empty list when the asker is exactly at our tip
        let head = self.db.head()?;
        if head.hash() == request.hash {
            debug!(target: LOG_TARGET, "Forward request is already at our tip {}", head);
            return Ok(self.respond(Vec::new()));
        }
        let head_block = self
            .db
            .get_block(&head.hash())?
            .ok_or_else(|| SyncError::CannotSatisfyRequest(head.hash().to_hex()))?;
        Ok(self.respond(vec![head_block]))
    }

    fn get_block_through_cache(&self, request: &BlockRequest) -> Result<Option<Arc<Block>>, SyncError> {
        let key = request.key();
        if let Ok(mut cache) = self.recently_served.lock() {
            if let Some(block) = cache.get(&key) {
                return Ok(Some(block.clone()));
            }
        }
        let block = self.db.get_block(&request.hash)?;
        if let Some(block) = &block {
            if let Ok(mut cache) = self.recently_served.lock() {
                cache.put(key, block.clone());
            }
        }
        Ok(block)
    }

    fn respond(&self, blocks: Vec<Arc<Block>>) -> BlocksResponse {
        BlocksResponse {
            blocks,
            from_peer: self.local_peer.clone(),
        }
    }
}
