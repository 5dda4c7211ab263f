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

use crate::{
    chain_storage::{BlockEvent, ChainStorageError},
    test_helpers::{create_test_chain, create_test_database},
};

mod add_block {
    use super::*;

    #[tokio::test]
    async fn it_advances_the_head_along_a_chain() {
        let chain = create_test_chain(3).await;
        let db = create_test_database(&chain);

        for block in &chain.blocks[1..] {
            db.add_block(Arc::new(block.clone())).await.unwrap().assert_added();
        }
        assert_eq!(db.head().unwrap().hash(), chain.blocks[2].hash());
        assert_eq!(db.head().unwrap().sequence(), 3);
    }

    #[tokio::test]
    async fn it_ignores_a_block_it_already_has() {
        let chain = create_test_chain(2).await;
        let db = create_test_database(&chain);
        let block = Arc::new(chain.blocks[1].clone());

        db.add_block(block.clone()).await.unwrap().assert_added();
        let result = db.add_block(block).await.unwrap();
        assert!(!result.is_added);
        assert!(result.connected_to_genesis);
        assert_eq!(db.head().unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn it_reports_the_heaviest_hash_for_connected_blocks() {
        let chain = create_test_chain(2).await;
        let db = create_test_database(&chain);
        let result = db.add_block(Arc::new(chain.blocks[1].clone())).await.unwrap();
        let graph = *result.graph();
        assert!(result.connected_to_genesis);
        assert_eq!(graph.heaviest_hash, chain.blocks[1].hash());
        assert_eq!(graph.tail_hash, chain.genesis().hash());
    }

    #[tokio::test]
    async fn it_holds_a_block_with_unknown_ancestry_as_an_island() {
        let chain = create_test_chain(3).await;
        let db = create_test_database(&chain);

        let result = db.add_block(Arc::new(chain.blocks[2].clone())).await.unwrap();
        assert!(result.is_added);
        assert!(!result.connected_to_genesis);
        assert_eq!(result.graph().tail_hash, chain.blocks[2].hash());
        // the head has not moved
        assert_eq!(db.head().unwrap().sequence(), 1);
    }

    #[tokio::test]
    async fn it_connects_an_island_when_the_gap_fills() {
        let chain = create_test_chain(4).await;
        let db = create_test_database(&chain);

        db.add_block(Arc::new(chain.blocks[2].clone())).await.unwrap();
        db.add_block(Arc::new(chain.blocks[3].clone())).await.unwrap();
        assert_eq!(db.head().unwrap().sequence(), 1);

        // the missing block connects the whole island
        let result = db.add_block(Arc::new(chain.blocks[1].clone())).await.unwrap();
        assert!(result.connected_to_genesis);
        assert_eq!(db.head().unwrap().hash(), chain.blocks[3].hash());
        assert_eq!(result.graph().heaviest_hash, chain.blocks[3].hash());
    }

    #[tokio::test]
    async fn it_rejects_an_invalid_block_and_remembers_the_hash() {
        let chain = create_test_chain(2).await;
        let db = create_test_database(&chain);

        let bad = chain.block_with_wrong_miners_fee(&chain.chain_header(0));
        let hash = bad.hash();
        db.add_block(Arc::new(bad.clone())).await.unwrap_err();
        assert!(db.is_bad_block(&hash));

        let err = db.add_block(Arc::new(bad)).await.unwrap_err();
        assert!(matches!(err, ChainStorageError::BadBlock(_)));
    }

    #[tokio::test]
    async fn it_reorgs_to_a_heavier_fork() {
        let chain = create_test_chain(2).await;
        let db = create_test_database(&chain);
        let mut events = db.subscribe();

        db.add_block(Arc::new(chain.blocks[1].clone())).await.unwrap();

        // a competing fork off genesis that ends up heavier
        let fork_b2 = chain.block_with_timestamp(
            &chain.chain_header(0),
            chain.genesis().header().timestamp_ms() + 61_000,
        );
        let fork_b2_work = chain.chain_header(0).work() + fork_b2.header().target().to_difficulty().as_u256();
        let fork_b2_header = crate::blocks::ChainHeader::new(fork_b2.header().clone(), fork_b2_work);
        let fork_b3 = chain.next_block(&fork_b2_header);

        // the tip arrives first and islands, then its parent connects and wins fork choice
        db.add_block(Arc::new(fork_b3.clone())).await.unwrap();
        db.add_block(Arc::new(fork_b2.clone())).await.unwrap();

        assert_eq!(db.head().unwrap().hash(), fork_b3.hash());
        assert_eq!(db.get_header_at_sequence(2).unwrap().unwrap().hash(), fork_b2.hash());

        let mut saw_disconnect = false;
        let mut connected = vec![];
        while let Ok(event) = events.try_recv() {
            match &*event {
                BlockEvent::Disconnected(h) if h.hash() == chain.blocks[1].hash() => saw_disconnect = true,
                BlockEvent::Connected(h) => connected.push(h.hash()),
                _ => {},
            }
        }
        assert!(saw_disconnect);
        assert!(connected.contains(&fork_b2.hash()));
        assert!(connected.contains(&fork_b3.hash()));
    }

    #[tokio::test]
    async fn it_marks_a_lighter_fork_block_as_forked() {
        let chain = create_test_chain(3).await;
        let db = create_test_database(&chain);
        let mut events = db.subscribe();

        db.add_block(Arc::new(chain.blocks[1].clone())).await.unwrap();
        db.add_block(Arc::new(chain.blocks[2].clone())).await.unwrap();

        // a fork off genesis is lighter than the two-block main chain
        let fork = chain.block_with_timestamp(
            &chain.chain_header(0),
            chain.genesis().header().timestamp_ms() + 61_000,
        );
        db.add_block(Arc::new(fork.clone())).await.unwrap();
        assert_eq!(db.head().unwrap().hash(), chain.blocks[2].hash());

        let mut saw_fork = false;
        while let Ok(event) = events.try_recv() {
            if let BlockEvent::Forked(block) = &*event {
                if block.hash() == fork.hash() {
                    saw_fork = true;
                }
            }
        }
        assert!(saw_fork);
    }
}

mod rewind_to_sequence {
    use super::*;

    #[tokio::test]
    async fn it_removes_and_readds_cleanly() {
        let chain = create_test_chain(4).await;
        let db = create_test_database(&chain);
        for block in &chain.blocks[1..] {
            db.add_block(Arc::new(block.clone())).await.unwrap();
        }

        let removed = db.rewind_to_sequence(2).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(db.head().unwrap().sequence(), 2);
        assert!(db.get_header(&chain.blocks[3].hash()).unwrap().is_none());

        // re-adding the removed blocks restores the original head
        db.add_block(Arc::new(chain.blocks[2].clone())).await.unwrap().assert_added();
        db.add_block(Arc::new(chain.blocks[3].clone())).await.unwrap().assert_added();
        assert_eq!(db.head().unwrap().hash(), chain.blocks[3].hash());
    }

    #[tokio::test]
    async fn it_is_a_no_op_at_or_above_the_head() {
        let chain = create_test_chain(2).await;
        let db = create_test_database(&chain);
        db.add_block(Arc::new(chain.blocks[1].clone())).await.unwrap();
        assert!(db.rewind_to_sequence(2).unwrap().is_empty());
        assert!(db.rewind_to_sequence(5).unwrap().is_empty());
        assert_eq!(db.head().unwrap().sequence(), 2);
    }
}

mod read_views {
    use super::*;

    #[tokio::test]
    async fn it_serves_sequence_lookups_and_iteration() {
        let chain = create_test_chain(4).await;
        let db = create_test_database(&chain);
        for block in &chain.blocks[1..] {
            db.add_block(Arc::new(block.clone())).await.unwrap();
        }

        assert_eq!(db.genesis().unwrap().hash(), chain.genesis().hash());
        assert_eq!(
            db.get_header_at_sequence(3).unwrap().unwrap().hash(),
            chain.blocks[2].hash()
        );

        let ascending = db.iterate_from(1, 4).unwrap();
        assert_eq!(ascending.len(), 4);
        assert!(ascending.windows(2).all(|w| w[0].sequence() + 1 == w[1].sequence()));

        let descending = db.iterate_to(4, 1).unwrap();
        assert_eq!(descending.first().unwrap().sequence(), 4);
        assert_eq!(descending.last().unwrap().sequence(), 1);
    }

    #[tokio::test]
    async fn it_indexes_main_chain_successors() {
        let chain = create_test_chain(3).await;
        let db = create_test_database(&chain);
        for block in &chain.blocks[1..] {
            db.add_block(Arc::new(block.clone())).await.unwrap();
        }

        assert_eq!(
            db.next_hash(&chain.genesis().hash()).unwrap(),
            Some(chain.blocks[1].hash())
        );
        assert_eq!(
            db.next_hash(&chain.blocks[1].hash()).unwrap(),
            Some(chain.blocks[2].hash())
        );
        assert_eq!(db.next_hash(&chain.blocks[2].hash()).unwrap(), None);
    }

    #[tokio::test]
    async fn it_tracks_the_latest_observed_header() {
        let chain = create_test_chain(3).await;
        let db = create_test_database(&chain);

        // an island far ahead of the head is still the latest observation
        db.add_block(Arc::new(chain.blocks[2].clone())).await.unwrap();
        assert_eq!(db.head().unwrap().sequence(), 1);
        assert_eq!(db.latest().sequence(), 3);
        assert_eq!(db.latest().hash(), chain.blocks[2].hash());
    }
}
