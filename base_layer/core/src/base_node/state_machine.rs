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
    fmt::{self, Formatter},
    sync::Arc,
};

use log::*;
use strum_macros::Display;

use crate::{
    base_node::{BlockRequest, PeerId, SyncError},
    blocks::Block,
};

const LOG_TARGET: &str = "c::bn::state_machine";

/// Where a block came from: unsolicited gossip, or the reply to one of our own requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BlockSource {
    Gossip,
    Syncing,
}

/// A block awaiting insertion, exclusively owned by the syncer until the chain accepts it.
#[derive(Debug, Clone)]
pub struct QueuedBlock {
    pub block: Arc<Block>,
    pub peer: PeerId,
    pub source: BlockSource,
}

/// The syncer states. The allowed transitions form a hard invariant; dispatching a transition
/// that is not allowed from the current state is a no-op, not an error.
#[derive(Debug, Clone)]
pub enum SyncerState {
    Stopped,
    Starting,
    Idle,
    Requesting(BlockRequest),
    Syncing(QueuedBlock),
    Stopping,
}

/// A plain summary of the current state, published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SyncerStatus {
    Stopped,
    Starting,
    Idle,
    Requesting,
    Syncing,
    Stopping,
}

impl From<&SyncerState> for SyncerStatus {
    fn from(state: &SyncerState) -> Self {
        match state {
            SyncerState::Stopped => SyncerStatus::Stopped,
            SyncerState::Starting => SyncerStatus::Starting,
            SyncerState::Idle => SyncerStatus::Idle,
            SyncerState::Requesting(_) => SyncerStatus::Requesting,
            SyncerState::Syncing(_) => SyncerStatus::Syncing,
            SyncerState::Stopping => SyncerStatus::Stopping,
        }
    }
}

/// The outcome of one state's entry action, consumed by [`transition`].
#[derive(Debug, Clone)]
pub enum StateEvent {
    Initialized,
    /// A queued block is ready for insertion
    BlockPopped(QueuedBlock),
    /// The insertion sequence finished with no follow-up request
    BlockProcessed,
    /// The insertion sequence (or idle catch-up) wants a network request issued
    SendRequest(BlockRequest),
    /// The outstanding request completed and appended this many blocks to the queue
    RequestSatisfied { appended: usize },
    RequestFailed(SyncError),
    FatalError(String),
    ShutdownRequested,
    Drained,
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use StateEvent::*;
        match self {
            Initialized => write!(f, "Initialized"),
            BlockPopped(q) => write!(f, "Block {} popped from the queue", q.block.header()),
            BlockProcessed => write!(f, "Block processed"),
            SendRequest(r) => write!(f, "Requesting {}", r),
            RequestSatisfied { appended } => write!(f, "Request satisfied with {} block(s)", appended),
            RequestFailed(e) => write!(f, "Request failed: {}", e),
            FatalError(e) => write!(f, "Fatal error: {}", e),
            ShutdownRequested => write!(f, "Shutdown requested"),
            Drained => write!(f, "Outstanding operations drained"),
        }
    }
}

impl fmt::Display for SyncerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SyncerStatus::from(self))
    }
}

/// The complete transition table of the syncer. Every possible `(state, event)` pair is either
/// mapped here or stays where it is.
pub fn transition(state: SyncerState, event: StateEvent) -> SyncerState {
    use SyncerState::*;
    match (state, event) {
        (Starting, StateEvent::Initialized) => Idle,

        (Idle, StateEvent::BlockPopped(q)) => Syncing(q),
        (Idle, StateEvent::SendRequest(r)) => Requesting(r),

        (Syncing(_), StateEvent::BlockProcessed) => Idle,
        (Syncing(_), StateEvent::SendRequest(r)) => Requesting(r),

        (Requesting(_), StateEvent::RequestSatisfied { .. }) => Idle,
        (Requesting(_), StateEvent::RequestFailed(_)) => Idle,

        (Idle, StateEvent::ShutdownRequested)
        | (Syncing(_), StateEvent::ShutdownRequested)
        | (Requesting(_), StateEvent::ShutdownRequested) => Stopping,

        (Idle, StateEvent::FatalError(_))
        | (Syncing(_), StateEvent::FatalError(_))
        | (Requesting(_), StateEvent::FatalError(_)) => Stopping,

        (Stopping, StateEvent::Drained) => Stopped,

        (state, event) => {
            warn!(
                target: LOG_TARGET,
                "No state transition occurs for event [{}] in state [{}]", event, state
            );
            state
        },
    }
}
