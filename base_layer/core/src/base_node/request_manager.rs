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
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use ironfish_common_types::types::BlockHash;
use log::*;
use tokio::sync::oneshot;

use crate::{
    base_node::{PeerId, SyncError},
    blocks::Block,
};

const LOG_TARGET: &str = "c::bn::request_manager";

/// How long one outstanding block request may stay unanswered before it rejects.
pub const RPC_TIMEOUT_MILLIS: u64 = 30_000;

/// A response carries at most this many serialized blocks.
pub const MAX_BLOCKS_PER_MESSAGE: usize = 1;

/// A request for blocks from the network: either one specific block by hash, or (`forward`) the
/// main-chain successors of a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    pub hash: BlockHash,
    pub sequence: Option<u32>,
    pub forward: bool,
    /// Pin the request to one peer. Island backfill always asks the peer that supplied the
    /// island.
    pub from_peer: Option<PeerId>,
}

impl BlockRequest {
    pub fn key(&self) -> RequestKey {
        (self.hash.to_hex(), self.sequence.map(|s| s.to_string()))
    }
}

impl Display for BlockRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}{}",
            if self.forward { "successors of" } else { "block" },
            self.hash,
            self.from_peer
                .as_ref()
                .map(|p| format!(" from peer {}", p))
                .unwrap_or_default()
        )
    }
}

/// The collapsing key of an outstanding request.
pub type RequestKey = (String, Option<String>);

/// The blocks a peer answered with, or an empty list for an exact tip-equals-tip request.
#[derive(Debug, Clone)]
pub struct BlocksResponse {
    pub blocks: Vec<Arc<Block>>,
    pub from_peer: PeerId,
}

/// The network capability the syncer uses to fetch blocks. The transport decides which peer
/// serves an unpinned request.
#[async_trait]
pub trait BlockNetwork: Send + Sync + 'static {
    async fn request_blocks(&self, request: BlockRequest) -> Result<BlocksResponse, SyncError>;
}

/// Issues block requests with per-key collapsing and a timeout.
///
/// At most one network call is in flight per [`RequestKey`]: a duplicate request subscribes to
/// the outcome of the call already in flight, so both callers resolve on the same response.
pub struct RequestManager<N> {
    network: Arc<N>,
    timeout: Duration,
    in_flight: Mutex<HashMap<RequestKey, Vec<oneshot::Sender<Result<BlocksResponse, SyncError>>>>>,
}

impl<N: BlockNetwork> RequestManager<N> {
    pub fn new(network: Arc<N>, timeout: Duration) -> Self {
        Self {
            network,
            timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn request(&self, request: BlockRequest) -> Result<BlocksResponse, SyncError> {
        let key = request.key();
        let waiter = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(waiters) = in_flight.get_mut(&key) {
                let (sender, receiver) = oneshot::channel();
                waiters.push(sender);
                Some(receiver)
            } else {
                in_flight.insert(key.clone(), Vec::new());
                None
            }
        };

        if let Some(receiver) = waiter {
            debug!(target: LOG_TARGET, "Collapsing duplicate request for {}", request);
            return receiver
                .await
                .map_err(|_| SyncError::PeerDisconnect("the collapsed request was dropped".to_string()))?;
        }

        let result = match tokio::time::timeout(self.timeout, self.network.request_blocks(request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::RequestTimeout),
        };

        let waiters = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            in_flight.remove(&key).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockNetwork;

    fn request(byte: u8, sequence: Option<u32>) -> BlockRequest {
        BlockRequest {
            hash: BlockHash::from([byte; 32]),
            sequence,
            forward: false,
            from_peer: None,
        }
    }

    #[tokio::test]
    async fn it_collapses_requests_with_the_same_key() {
        let network = Arc::new(MockNetwork::new());
        network.set_delay(Duration::from_millis(50));
        network.respond_with_empty();
        let manager = Arc::new(RequestManager::new(network.clone(), Duration::from_secs(5)));

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request(request(1, Some(5))).await })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request(request(1, Some(5))).await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.blocks.len(), b.blocks.len());
        assert_eq!(network.request_count(), 1);
    }

    #[tokio::test]
    async fn it_does_not_collapse_different_keys() {
        let network = Arc::new(MockNetwork::new());
        network.respond_with_empty();
        let manager = RequestManager::new(network.clone(), Duration::from_secs(5));

        manager.request(request(1, Some(5))).await.unwrap();
        manager.request(request(1, Some(6))).await.unwrap();
        assert_eq!(network.request_count(), 2);
    }

    #[tokio::test]
    async fn it_times_out_a_silent_peer() {
        let network = Arc::new(MockNetwork::new());
        network.set_delay(Duration::from_secs(60));
        network.respond_with_empty();
        let manager = RequestManager::new(network, Duration::from_millis(20));

        let err = manager.request(request(2, None)).await.unwrap_err();
        assert_eq!(err, SyncError::RequestTimeout);
    }
}
