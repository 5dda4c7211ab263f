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
    sync::{Arc, Mutex, RwLock},
};

use ironfish_common_types::{chain_metadata::ChainMetadata, types::BlockHash};
use log::*;
use lru::LruCache;
use strum_macros::Display;
use tokio::sync::broadcast;

use crate::{
    blocks::{is_heavier, is_later, Block, BlockHeader, ChainHeader},
    chain_storage::{BlockAddResult, BlockchainBackend, ChainStorageError, DbTransaction, ResolvedGraph},
    consensus::ConsensusManager,
    proof_of_work::FishHashFactory,
    validation::BlockValidator,
};

const LOG_TARGET: &str = "c::cs::database";

/// How many permanently rejected hashes are remembered. Old entries age out; re-validating an
/// aged-out bad block is wasteful but harmless.
const REJECTED_BLOCKS_CAPACITY: usize = 1024;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Chain lifecycle events delivered to subscribers. Dropping the receiver ends the subscription.
#[derive(Debug, Clone, Display)]
pub enum BlockEvent {
    /// The header joined the main chain
    Connected(ChainHeader),
    /// The header left the main chain during a reorg or rewind
    Disconnected(ChainHeader),
    /// The block was stored on a side fork that did not win fork choice
    Forked(Arc<Block>),
}

/// The chain store: validates candidate blocks, attaches islands, runs heaviest-fork selection
/// and publishes connect/disconnect/fork events.
pub struct BlockchainDatabase<B> {
    db: Arc<RwLock<B>>,
    rules: ConsensusManager,
    pow: FishHashFactory,
    validator: Arc<BlockValidator>,
    event_sender: broadcast::Sender<Arc<BlockEvent>>,
    rejected_blocks: Arc<Mutex<LruCache<BlockHash, ()>>>,
    latest: Arc<RwLock<BlockHeader>>,
}

impl<B> Clone for BlockchainDatabase<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            rules: self.rules.clone(),
            pow: self.pow.clone(),
            validator: self.validator.clone(),
            event_sender: self.event_sender.clone(),
            rejected_blocks: self.rejected_blocks.clone(),
            latest: self.latest.clone(),
        }
    }
}

impl<B: BlockchainBackend> BlockchainDatabase<B> {
    /// Opens the database, writing the genesis block if the backend is empty.
    pub fn new(
        mut db: B,
        rules: ConsensusManager,
        pow: FishHashFactory,
        validator: BlockValidator,
        genesis: Block,
    ) -> Result<Self, ChainStorageError> {
        if db.fetch_metadata()?.is_none() {
            let work = genesis.header().target().to_difficulty().as_u256();
            let genesis_header = ChainHeader::new(genesis.header().clone(), work);
            let hash = genesis.hash();
            info!(target: LOG_TARGET, "Writing genesis block {}", genesis_header);
            let mut txn = DbTransaction::new();
            txn.insert_chain_header(genesis_header)
                .insert_block(hash, Arc::new(genesis.clone()))
                .set_hash_at_sequence(1, hash)
                .set_metadata(ChainMetadata::new(1, hash, work, genesis.header().timestamp_ms()));
            db.write(txn)?;
        }

        let metadata = db
            .fetch_metadata()?
            .ok_or(ChainStorageError::InvalidOperation("the database has no metadata".to_string()))?;
        let head = db
            .fetch_chain_header(metadata.best_block_hash())?
            .ok_or(ChainStorageError::ValueNotFound {
                entity: "ChainHeader",
                field: "hash",
                value: metadata.best_block_hash().to_hex(),
            })?;

        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            rules,
            pow,
            validator: Arc::new(validator),
            event_sender,
            rejected_blocks: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(REJECTED_BLOCKS_CAPACITY).expect("capacity is non-zero"),
            ))),
            latest: Arc::new(RwLock::new(head.into_header())),
        })
    }

    pub fn rules(&self) -> &ConsensusManager {
        &self.rules
    }

    pub fn pow_factory(&self) -> &FishHashFactory {
        &self.pow
    }

    /// Subscribes to connect/disconnect/fork events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BlockEvent>> {
        self.event_sender.subscribe()
    }

    fn publish(&self, event: BlockEvent) {
        if self.event_sender.send(Arc::new(event)).is_err() {
            trace!(target: LOG_TARGET, "No block event subscribers");
        }
    }

    /// Whether the hash was rejected as permanently invalid.
    pub fn is_bad_block(&self, hash: &BlockHash) -> bool {
        self.rejected_blocks
            .lock()
            .map(|mut lru| lru.get(hash).is_some())
            .unwrap_or(false)
    }

    fn note_bad_block(&self, hash: BlockHash) {
        if let Ok(mut lru) = self.rejected_blocks.lock() {
            lru.put(hash, ());
        }
    }

    pub fn chain_metadata(&self) -> Result<ChainMetadata, ChainStorageError> {
        let db = self.read_access()?;
        db.fetch_metadata()?
            .ok_or(ChainStorageError::InvalidOperation("the database has no metadata".to_string()))
    }

    pub fn head(&self) -> Result<ChainHeader, ChainStorageError> {
        let metadata = self.chain_metadata()?;
        self.get_header(metadata.best_block_hash())?
            .ok_or(ChainStorageError::ValueNotFound {
                entity: "ChainHeader",
                field: "hash",
                value: metadata.best_block_hash().to_hex(),
            })
    }

    pub fn genesis(&self) -> Result<ChainHeader, ChainStorageError> {
        self.get_header_at_sequence(1)?.ok_or(ChainStorageError::ValueNotFound {
            entity: "ChainHeader",
            field: "sequence",
            value: "1".to_string(),
        })
    }

    /// The most recently observed header, canonical or not.
    pub fn latest(&self) -> BlockHeader {
        self.latest
            .read()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn observe_latest(&self, header: &BlockHeader) {
        if let Ok(mut latest) = self.latest.write() {
            if is_later(header, &*latest) {
                *latest = header.clone();
            }
        }
    }

    fn current_head(&self, db: &B) -> Result<ChainHeader, ChainStorageError> {
        let metadata = db
            .fetch_metadata()?
            .ok_or(ChainStorageError::InvalidOperation("the database has no metadata".to_string()))?;
        db.fetch_chain_header(metadata.best_block_hash())?
            .ok_or(ChainStorageError::ValueNotFound {
                entity: "ChainHeader",
                field: "hash",
                value: metadata.best_block_hash().to_hex(),
            })
    }

    pub fn get_header(&self, hash: &BlockHash) -> Result<Option<ChainHeader>, ChainStorageError> {
        self.read_access()?.fetch_chain_header(hash)
    }

    /// A header from either the connected chain or the orphan pool.
    pub fn get_any_header(&self, hash: &BlockHash) -> Result<Option<BlockHeader>, ChainStorageError> {
        let db = self.read_access()?;
        if let Some(header) = db.fetch_chain_header(hash)? {
            return Ok(Some(header.into_header()));
        }
        Ok(db.fetch_orphan(hash)?.map(|block| block.header().clone()))
    }

    pub fn get_header_at_sequence(&self, sequence: u32) -> Result<Option<ChainHeader>, ChainStorageError> {
        let db = self.read_access()?;
        match db.fetch_hash_at_sequence(sequence)? {
            Some(hash) => db.fetch_chain_header(&hash),
            None => Ok(None),
        }
    }

    pub fn get_block(&self, hash: &BlockHash) -> Result<Option<Arc<Block>>, ChainStorageError> {
        let db = self.read_access()?;
        if let Some(block) = db.fetch_block(hash)? {
            return Ok(Some(block));
        }
        db.fetch_orphan(hash)
    }

    /// The main-chain successor of a hash.
    pub fn next_hash(&self, hash: &BlockHash) -> Result<Option<BlockHash>, ChainStorageError> {
        self.read_access()?.fetch_next_hash(hash)
    }

    /// Main-chain headers from `from` up to `to`, ascending, both inclusive. Stops early where
    /// the main chain ends.
    pub fn iterate_from(&self, from: u32, to: u32) -> Result<Vec<ChainHeader>, ChainStorageError> {
        let db = self.read_access()?;
        let mut headers = Vec::new();
        for sequence in from..=to {
            match db.fetch_hash_at_sequence(sequence)? {
                Some(hash) => match db.fetch_chain_header(&hash)? {
                    Some(header) => headers.push(header),
                    None => break,
                },
                None => break,
            }
        }
        Ok(headers)
    }

    /// Main-chain headers from `from` down to `to`, descending, both inclusive.
    pub fn iterate_to(&self, from: u32, to: u32) -> Result<Vec<ChainHeader>, ChainStorageError> {
        let mut headers = self.iterate_from(to.min(from), to.max(from))?;
        headers.reverse();
        Ok(headers)
    }

    /// Validates and stores a block.
    ///
    /// A block whose parent is connected is fully verified and joins the chain, possibly pulling
    /// previously orphaned descendants in with it and triggering a reorg. A block with no known
    /// parent is held as an island until its ancestry arrives. Previously rejected hashes are
    /// refused without re-validation.
    pub async fn add_block(&self, block: Arc<Block>) -> Result<BlockAddResult, ChainStorageError> {
        let hash = block.hash();
        if self.is_bad_block(&hash) {
            return Err(ChainStorageError::BadBlock(hash));
        }

        {
            let db = self.read_access()?;
            if db.fetch_chain_header(&hash)?.is_some() {
                debug!(target: LOG_TARGET, "Block {} already stored", block.header());
                return Ok(BlockAddResult {
                    is_added: false,
                    connected_to_genesis: true,
                    resolved_graph: None,
                });
            }
            if db.fetch_orphan(&hash)?.is_some() {
                debug!(target: LOG_TARGET, "Block {} already orphaned", block.header());
                return Ok(BlockAddResult {
                    is_added: false,
                    connected_to_genesis: false,
                    resolved_graph: None,
                });
            }
        }

        // Island blocks cannot be validated against a parent yet, but their hash must still meet
        // their declared target.
        if !block.header().target().meets(hash.to_u256()) {
            self.note_bad_block(hash);
            return Err(ChainStorageError::ValidationError {
                source: crate::validation::ValidationError::HashNotMeetTarget,
            });
        }

        let parent = {
            let db = self.read_access()?;
            db.fetch_chain_header(&block.header().previous_block_hash())?
        };

        match parent {
            Some(parent) => self.add_connected_block(block, parent).await,
            None => self.add_orphan_block(block),
        }
    }

    fn add_orphan_block(&self, block: Arc<Block>) -> Result<BlockAddResult, ChainStorageError> {
        let hash = block.hash();
        {
            let mut db = self.write_access()?;
            let mut txn = DbTransaction::new();
            txn.insert_orphan(block.clone());
            db.write(txn)?;
        }
        self.observe_latest(block.header());

        let graph = {
            let db = self.read_access()?;
            self.resolve_island_graph(&*db, &hash)?
        };
        debug!(
            target: LOG_TARGET,
            "Stored orphan {}; island tail is {}",
            block.header(),
            graph.tail_hash
        );
        Ok(BlockAddResult {
            is_added: true,
            connected_to_genesis: false,
            resolved_graph: Some(graph),
        })
    }

    async fn add_connected_block(
        &self,
        block: Arc<Block>,
        parent: ChainHeader,
    ) -> Result<BlockAddResult, ChainStorageError> {
        let hash = block.hash();
        if let Err(err) = self.validator.verify_block(&block, &parent).await {
            warn!(target: LOG_TARGET, "Rejecting block {}: {}", block.header(), err);
            self.note_bad_block(hash);
            return Err(err.into());
        }

        let first = self.store_connected(&block, &parent)?;
        self.observe_latest(block.header());

        let mut newly_connected = vec![first.clone()];
        self.adopt_orphans(first, &mut newly_connected).await?;

        let (connected, disconnected, head) = self.run_fork_choice(&newly_connected)?;

        for header in &disconnected {
            self.publish(BlockEvent::Disconnected(header.clone()));
        }
        for header in &connected {
            self.publish(BlockEvent::Connected(header.clone()));
        }
        if !connected.iter().any(|h| h.hash() == hash) {
            debug!(target: LOG_TARGET, "Block {} stored on a side fork", block.header());
            self.publish(BlockEvent::Forked(block));
        }

        let genesis_hash = self.genesis()?.hash();
        Ok(BlockAddResult {
            is_added: true,
            connected_to_genesis: true,
            resolved_graph: Some(ResolvedGraph {
                heaviest_hash: head.hash(),
                tail_hash: genesis_hash,
            }),
        })
    }

    fn store_connected(&self, block: &Arc<Block>, parent: &ChainHeader) -> Result<ChainHeader, ChainStorageError> {
        let work = parent.work() + block.header().target().to_difficulty().as_u256();
        let chain_header = ChainHeader::new(block.header().clone(), work);
        let mut db = self.write_access()?;
        let mut txn = DbTransaction::new();
        txn.insert_chain_header(chain_header.clone())
            .insert_block(block.hash(), block.clone());
        db.write(txn)?;
        Ok(chain_header)
    }

    /// Walks the orphan pool for descendants of newly connected headers and connects every one
    /// that validates. Orphans that fail validation are dropped and remembered as bad.
    async fn adopt_orphans(
        &self,
        start: ChainHeader,
        newly_connected: &mut Vec<ChainHeader>,
    ) -> Result<(), ChainStorageError> {
        let mut frontier = vec![start];
        while let Some(parent) = frontier.pop() {
            let children: Vec<Arc<Block>> = {
                let db = self.read_access()?;
                let mut found = Vec::new();
                for child_hash in db.fetch_children(&parent.hash())? {
                    if let Some(block) = db.fetch_orphan(&child_hash)? {
                        found.push(block);
                    }
                }
                found
            };

            for child in children {
                let child_hash = child.hash();
                match self.validator.verify_block(&child, &parent).await {
                    Ok(()) => {
                        let work = parent.work() + child.header().target().to_difficulty().as_u256();
                        let chain_header = ChainHeader::new(child.header().clone(), work);
                        let mut db = self.write_access()?;
                        let mut txn = DbTransaction::new();
                        txn.delete_orphan(child_hash)
                            .insert_chain_header(chain_header.clone())
                            .insert_block(child_hash, child.clone());
                        db.write(txn)?;
                        info!(target: LOG_TARGET, "Connected orphan {}", chain_header);
                        newly_connected.push(chain_header.clone());
                        frontier.push(chain_header);
                    },
                    Err(err) => {
                        warn!(
                            target: LOG_TARGET,
                            "Dropping orphan {} that fails validation against its parent: {}",
                            child.header(),
                            err
                        );
                        self.note_bad_block(child_hash);
                        let mut db = self.write_access()?;
                        let mut txn = DbTransaction::new();
                        txn.delete_orphan(child_hash);
                        db.write(txn)?;
                    },
                }
            }
        }
        Ok(())
    }

    /// Compares every newly connected tip against the current head and reorganizes the main
    /// chain indexes when a heavier tip exists.
    fn run_fork_choice(
        &self,
        newly_connected: &[ChainHeader],
    ) -> Result<(Vec<ChainHeader>, Vec<ChainHeader>, ChainHeader), ChainStorageError> {
        let mut db = self.write_access()?;
        let current_head = self.current_head(&*db)?;

        let mut best = current_head.clone();
        for candidate in newly_connected {
            if is_heavier(candidate, &best) {
                best = candidate.clone();
            }
        }
        if best.hash() == current_head.hash() {
            return Ok((Vec::new(), Vec::new(), current_head));
        }

        let (connected, disconnected) = self.reorganize(&mut *db, &best, &current_head)?;
        if !disconnected.is_empty() {
            info!(
                target: LOG_TARGET,
                "Chain reorg: {} block(s) disconnected, {} connected, new head {}",
                disconnected.len(),
                connected.len(),
                best
            );
        }
        Ok((connected, disconnected, best))
    }

    fn reorganize(
        &self,
        db: &mut B,
        new_tip: &ChainHeader,
        current_head: &ChainHeader,
    ) -> Result<(Vec<ChainHeader>, Vec<ChainHeader>), ChainStorageError> {
        // walk back from the new tip to the first header already indexed on the main chain
        let mut path = Vec::new();
        let mut cursor = new_tip.clone();
        while db.fetch_hash_at_sequence(cursor.sequence())? != Some(cursor.hash()) {
            path.push(cursor.clone());
            let prev = cursor.header().previous_block_hash();
            cursor = db.fetch_chain_header(&prev)?.ok_or(ChainStorageError::ValueNotFound {
                entity: "ChainHeader",
                field: "hash",
                value: prev.to_hex(),
            })?;
        }
        path.reverse();
        let fork_point = cursor;

        let mut txn = DbTransaction::new();
        let mut disconnected = Vec::new();
        for sequence in ((fork_point.sequence() + 1)..=current_head.sequence()).rev() {
            if let Some(hash) = db.fetch_hash_at_sequence(sequence)? {
                if let Some(header) = db.fetch_chain_header(&hash)? {
                    disconnected.push(header);
                }
                txn.delete_hash_at_sequence(sequence);
            }
        }

        let mut prev = fork_point.hash();
        for header in &path {
            txn.set_hash_at_sequence(header.sequence(), header.hash());
            txn.set_next_hash(prev, Some(header.hash()));
            prev = header.hash();
        }
        txn.set_next_hash(prev, None);
        txn.set_metadata(ChainMetadata::new(
            new_tip.sequence(),
            new_tip.hash(),
            new_tip.work(),
            new_tip.header().timestamp_ms(),
        ));
        db.write(txn)?;
        Ok((path, disconnected))
    }

    /// Removes main-chain blocks above the given sequence entirely, as if they were never added.
    pub fn rewind_to_sequence(&self, sequence: u32) -> Result<Vec<Arc<Block>>, ChainStorageError> {
        let head = self.head()?;
        if sequence >= head.sequence() || sequence == 0 {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let mut disconnected = Vec::new();
        {
            let mut db = self.write_access()?;
            let mut txn = DbTransaction::new();
            for seq in ((sequence + 1)..=head.sequence()).rev() {
                let hash = db
                    .fetch_hash_at_sequence(seq)?
                    .ok_or(ChainStorageError::ValueNotFound {
                        entity: "BlockHash",
                        field: "sequence",
                        value: seq.to_string(),
                    })?;
                if let Some(header) = db.fetch_chain_header(&hash)? {
                    disconnected.push(header);
                }
                if let Some(block) = db.fetch_block(&hash)? {
                    removed.push(block);
                }
                txn.delete_hash_at_sequence(seq)
                    .delete_chain_header(hash)
                    .delete_block(hash)
                    .set_next_hash(hash, None);
            }

            let new_head_hash = db
                .fetch_hash_at_sequence(sequence)?
                .ok_or(ChainStorageError::ValueNotFound {
                    entity: "BlockHash",
                    field: "sequence",
                    value: sequence.to_string(),
                })?;
            let new_head = db
                .fetch_chain_header(&new_head_hash)?
                .ok_or(ChainStorageError::ValueNotFound {
                    entity: "ChainHeader",
                    field: "hash",
                    value: new_head_hash.to_hex(),
                })?;
            txn.set_next_hash(new_head_hash, None);
            txn.set_metadata(ChainMetadata::new(
                new_head.sequence(),
                new_head.hash(),
                new_head.work(),
                new_head.header().timestamp_ms(),
            ));
            db.write(txn)?;
        }

        for header in disconnected {
            self.publish(BlockEvent::Disconnected(header));
        }
        Ok(removed)
    }

    fn resolve_island_graph(&self, db: &B, hash: &BlockHash) -> Result<ResolvedGraph, ChainStorageError> {
        let mut tail = db.fetch_orphan(hash)?.ok_or(ChainStorageError::ValueNotFound {
            entity: "Orphan",
            field: "hash",
            value: hash.to_hex(),
        })?;
        while let Some(parent) = db.fetch_orphan(&tail.header().previous_block_hash())? {
            tail = parent;
        }

        let mut best = tail.clone();
        let mut stack = vec![tail.hash()];
        while let Some(cursor) = stack.pop() {
            for child_hash in db.fetch_children(&cursor)? {
                if let Some(child) = db.fetch_orphan(&child_hash)? {
                    if is_later(child.header(), best.header()) {
                        best = child.clone();
                    }
                    stack.push(child_hash);
                }
            }
        }

        Ok(ResolvedGraph {
            heaviest_hash: best.hash(),
            tail_hash: tail.hash(),
        })
    }

    fn read_access(&self) -> Result<std::sync::RwLockReadGuard<'_, B>, ChainStorageError> {
        self.db
            .read()
            .map_err(|_| ChainStorageError::InvalidOperation("the database lock is poisoned".to_string()))
    }

    fn write_access(&self) -> Result<std::sync::RwLockWriteGuard<'_, B>, ChainStorageError> {
        self.db
            .write()
            .map_err(|_| ChainStorageError::InvalidOperation("the database lock is poisoned".to_string()))
    }
}
