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
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use log::*;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    base_node::{
        transition,
        BlockNetwork,
        BlockRequest,
        BlockSource,
        BlocksResponse,
        PeerId,
        QueuedBlock,
        RequestManager,
        StateEvent,
        SyncConfig,
        SyncError,
        SyncerState,
        SyncerStatus,
    },
    blocks::Block,
    chain_storage::{BlockchainBackend, BlockchainDatabase},
};

const LOG_TARGET: &str = "c::bn::syncer";

const STATE_EVENT_CHANNEL_CAPACITY: usize = 64;

/// The insertion queue. FIFO, except that an arrival at or below the sequence of the current
/// queue head is pushed to the front.
pub(crate) struct BlockQueue {
    inner: Mutex<VecDeque<QueuedBlock>>,
    notify: tokio::sync::Notify,
    max_length: usize,
}

impl BlockQueue {
    fn new(max_length: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: tokio::sync::Notify::new(),
            max_length,
        }
    }

    /// Pushes an arrival. Gossip is dropped when the queue is full; requested blocks are always
    /// accepted.
    pub fn push(&self, queued: QueuedBlock) -> bool {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.len() >= self.max_length && queued.source == BlockSource::Gossip {
                return false;
            }
            let to_front = inner
                .front()
                .map(|head| queued.block.sequence() <= head.block.sequence())
                .unwrap_or(false);
            if to_front {
                inner.push_front(queued);
            } else {
                inner.push_back(queued);
            }
        }
        self.notify.notify_one();
        true
    }

    pub fn pop(&self) -> Option<QueuedBlock> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub async fn wait_for_block(&self) {
        self.notify.notified().await;
    }

    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

/// The block syncer. One cooperative driver loop owns the state machine; blocks arrive through
/// [`SyncerHandle::add_block_to_process`] and leave through the chain store.
pub struct Syncer<B, N> {
    db: BlockchainDatabase<B>,
    requests: RequestManager<N>,
    queue: Arc<BlockQueue>,
    shutdown_receiver: watch::Receiver<bool>,
    shutdown_sender: Option<watch::Sender<bool>>,
    status_sender: watch::Sender<SyncerStatus>,
    state_events: broadcast::Sender<SyncerStatus>,
    initial_sync_pending: bool,
}

impl<B, N> Syncer<B, N>
where
    B: BlockchainBackend,
    N: BlockNetwork,
{
    pub fn new(db: BlockchainDatabase<B>, network: Arc<N>, config: SyncConfig) -> Self {
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let (status_sender, _) = watch::channel(SyncerStatus::Stopped);
        let (state_events, _) = broadcast::channel(STATE_EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            requests: RequestManager::new(network, config.rpc_timeout),
            queue: Arc::new(BlockQueue::new(config.max_queue_length)),
            shutdown_receiver,
            shutdown_sender: Some(shutdown_sender),
            status_sender,
            state_events,
            initial_sync_pending: config.initial_sync,
        }
    }

    /// Spawns the driver loop and hands back the control handle.
    pub fn start(mut self) -> SyncerHandle<B> {
        let shutdown = self.shutdown_sender.take().expect("start is only called once");
        let db = self.db.clone();
        let queue = self.queue.clone();
        let status = self.status_sender.subscribe();
        let state_events = self.state_events.clone();
        let join = tokio::spawn(self.run());
        SyncerHandle {
            db,
            queue,
            status,
            state_events,
            shutdown,
            join: Some(join),
        }
    }

    async fn run(mut self) -> Result<(), SyncError> {
        let mut state = SyncerState::Starting;
        self.publish(&state);
        loop {
            if matches!(state, SyncerState::Stopped) {
                info!(target: LOG_TARGET, "Block syncer stopped");
                return Ok(());
            }

            let event = self.next_state_event(&state).await;
            if let StateEvent::FatalError(reason) = &event {
                error!(target: LOG_TARGET, "Fatal syncer invariant violated: {}", reason);
                let stopped = transition(transition(state, event.clone()), StateEvent::Drained);
                self.publish(&stopped);
                return Err(SyncError::FatalInvariant(reason.clone()));
            }

            trace!(target: LOG_TARGET, "Syncer event in state [{}]: {}", state, event);
            state = transition(state, event);
            self.publish(&state);
        }
    }

    async fn next_state_event(&mut self, state: &SyncerState) -> StateEvent {
        match state {
            SyncerState::Starting => {
                info!(target: LOG_TARGET, "Block syncer starting");
                StateEvent::Initialized
            },
            SyncerState::Idle => self.on_idle().await,
            SyncerState::Requesting(request) => self.on_requesting(request.clone()).await,
            SyncerState::Syncing(queued) => self.on_syncing(queued.clone()).await,
            SyncerState::Stopping => {
                debug!(target: LOG_TARGET, "Outstanding operations drained");
                StateEvent::Drained
            },
            SyncerState::Stopped => unreachable!("the driver exits before entering Stopped"),
        }
    }

    /// Entering `Idle` pulls the next queued block, or issues the one-off catch-up request, or
    /// parks until an arrival or shutdown wakes the loop.
    async fn on_idle(&mut self) -> StateEvent {
        loop {
            if *self.shutdown_receiver.borrow() {
                return StateEvent::ShutdownRequested;
            }
            if let Some(next) = self.queue.pop() {
                return StateEvent::BlockPopped(next);
            }
            if self.initial_sync_pending {
                self.initial_sync_pending = false;
                match self.db.head() {
                    Ok(head) => {
                        return StateEvent::SendRequest(BlockRequest {
                            hash: head.hash(),
                            sequence: Some(head.sequence()),
                            forward: true,
                            from_peer: None,
                        })
                    },
                    Err(err) => return StateEvent::FatalError(err.to_string()),
                }
            }

            tokio::select! {
                _ = self.queue.wait_for_block() => {},
                _ = self.shutdown_receiver.changed() => {},
            }
        }
    }

    async fn on_requesting(&mut self, request: BlockRequest) -> StateEvent {
        let result = tokio::select! {
            biased;
            _ = self.shutdown_receiver.changed() => {
                debug!(target: LOG_TARGET, "Shutdown requested while a block request was outstanding");
                return StateEvent::ShutdownRequested;
            },
            result = self.requests.request(request.clone()) => result,
        };

        match result {
            Ok(BlocksResponse { blocks, from_peer }) => {
                if blocks.is_empty() {
                    debug!(target: LOG_TARGET, "Peer {} is at our tip", from_peer);
                    return StateEvent::RequestSatisfied { appended: 0 };
                }
                let mut appended = 0;
                for block in blocks {
                    if self.db.is_bad_block(&block.hash()) {
                        warn!(
                            target: LOG_TARGET,
                            "Peer {} answered with previously rejected block {}",
                            from_peer,
                            block.header()
                        );
                        continue;
                    }
                    if self.queue.push(QueuedBlock {
                        block,
                        peer: from_peer.clone(),
                        source: BlockSource::Syncing,
                    }) {
                        appended += 1;
                    }
                }
                StateEvent::RequestSatisfied { appended }
            },
            Err(err) => {
                if *self.shutdown_receiver.borrow() {
                    debug!(target: LOG_TARGET, "Swallowing request error during shutdown: {}", err);
                    return StateEvent::ShutdownRequested;
                }
                warn!(target: LOG_TARGET, "Block request for {} failed: {}", request, err);
                StateEvent::RequestFailed(err)
            },
        }
    }

    /// The insertion sequence. A block that joins the connected chain propagates the sync
    /// forward; a block that stays an island backfills its ancestry from the same peer.
    async fn on_syncing(&mut self, queued: QueuedBlock) -> StateEvent {
        let QueuedBlock { block, peer, source } = queued;
        let descriptor = block.header().to_string();

        let result = match self.db.add_block(block).await {
            Ok(result) => result,
            Err(err) => {
                warn!(target: LOG_TARGET, "Block {} from {} was not added: {}", descriptor, peer, err);
                return StateEvent::BlockProcessed;
            },
        };

        if !result.is_added {
            return StateEvent::BlockProcessed;
        }

        if result.connected_to_genesis {
            if source == BlockSource::Gossip {
                // connected gossip needs no follow-up request
                return StateEvent::BlockProcessed;
            }
            let heaviest = result.graph().heaviest_hash;
            return StateEvent::SendRequest(BlockRequest {
                hash: heaviest,
                sequence: None,
                forward: true,
                from_peer: None,
            });
        }

        let tail_hash = result.graph().tail_hash;
        let tail = match self.db.get_any_header(&tail_hash) {
            Ok(Some(header)) => header,
            Ok(None) => return StateEvent::FatalError(format!("island tail {} disappeared", tail_hash)),
            Err(err) => return StateEvent::FatalError(err.to_string()),
        };
        if tail.sequence() == 1 {
            return StateEvent::FatalError(format!(
                "the predecessor of sequence-1 block {} was requested",
                tail.hash()
            ));
        }
        StateEvent::SendRequest(BlockRequest {
            hash: tail.previous_block_hash(),
            sequence: Some(tail.sequence() - 1),
            forward: false,
            from_peer: Some(peer),
        })
    }

    fn publish(&self, state: &SyncerState) {
        let status = SyncerStatus::from(state);
        let _ = self.status_sender.send_replace(status);
        let _ = self.state_events.send(status);
    }
}

/// The control handle of a running syncer: block ingress, state observation and shutdown.
pub struct SyncerHandle<B> {
    db: BlockchainDatabase<B>,
    queue: Arc<BlockQueue>,
    status: watch::Receiver<SyncerStatus>,
    state_events: broadcast::Sender<SyncerStatus>,
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<Result<(), SyncError>>>,
}

impl<B: BlockchainBackend> SyncerHandle<B> {
    /// Queues a block for insertion. Blocks already rejected as permanently invalid are refused;
    /// gossip is dropped (and logged) when the queue is full.
    pub fn add_block_to_process(&self, block: Arc<Block>, peer: PeerId, source: BlockSource) {
        if self.db.is_bad_block(&block.hash()) {
            warn!(
                target: LOG_TARGET,
                "Refusing previously rejected block {} from {}",
                block.header(),
                peer
            );
            return;
        }
        let descriptor = block.header().to_string();
        if !self.queue.push(QueuedBlock { block, peer, source }) {
            warn!(target: LOG_TARGET, "Insertion queue is full, dropping gossip block {}", descriptor);
        }
    }

    pub fn status(&self) -> SyncerStatus {
        *self.status.borrow()
    }

    /// A stream of every state the machine enters, in order.
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<SyncerStatus> {
        self.state_events.subscribe()
    }

    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    /// Requests shutdown and waits for the driver to drain and stop.
    pub async fn shutdown(mut self) -> Result<(), SyncError> {
        let _ = self.shutdown.send(true);
        self.queue.wake();
        match self.join.take() {
            Some(join) => join
                .await
                .unwrap_or_else(|err| Err(SyncError::FatalInvariant(format!("the syncer task panicked: {}", err)))),
            None => Ok(()),
        }
    }
}
