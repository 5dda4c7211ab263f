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

use async_trait::async_trait;
use futures::future;
use log::*;
use thiserror::Error;

use crate::transactions::Transaction;

const LOG_TARGET: &str = "c::tx::verify";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionVerifyError {
    #[error("Transaction at index {index} has an invalid proof")]
    InvalidProof { index: usize },
    #[error("The verification worker pool failed: {0}")]
    WorkerFailure(String),
}

/// The zero-knowledge verification capability. Proof verification is CPU-bound and offloaded to
/// whatever worker pool the node injects; the chain core only consumes the binary outcome.
#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    /// Verifies a batch of transactions. Individual proofs may be checked in parallel, but the
    /// results combine conjunctively: the first invalid index fails the batch.
    async fn verify_batch(&self, transactions: &[Transaction]) -> Result<(), TransactionVerifyError>;
}

/// A [`TransactionVerifier`] that fans the batch out over blocking worker tasks.
pub struct WorkerPoolVerifier<F> {
    verify_proof: Arc<F>,
}

impl<F> WorkerPoolVerifier<F>
where F: Fn(&Transaction) -> bool + Send + Sync + 'static
{
    pub fn new(verify_proof: F) -> Self {
        Self {
            verify_proof: Arc::new(verify_proof),
        }
    }
}

#[async_trait]
impl<F> TransactionVerifier for WorkerPoolVerifier<F>
where F: Fn(&Transaction) -> bool + Send + Sync + 'static
{
    async fn verify_batch(&self, transactions: &[Transaction]) -> Result<(), TransactionVerifyError> {
        let handles = transactions
            .iter()
            .map(|transaction| {
                let verify = self.verify_proof.clone();
                let transaction = transaction.clone();
                tokio::task::spawn_blocking(move || verify(&transaction))
            })
            .collect::<Vec<_>>();

        let results = future::join_all(handles).await;
        for (index, result) in results.into_iter().enumerate() {
            let valid = result.map_err(|e| TransactionVerifyError::WorkerFailure(e.to_string()))?;
            if !valid {
                debug!(target: LOG_TARGET, "Proof verification failed for transaction {}", index);
                return Err(TransactionVerifyError::InvalidProof { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transactions(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| Transaction::new(i as i64, vec![], vec![], vec![i as u8]))
            .collect()
    }

    #[tokio::test]
    async fn it_accepts_a_batch_of_valid_proofs() {
        let verifier = WorkerPoolVerifier::new(|_: &Transaction| true);
        verifier.verify_batch(&transactions(8)).await.unwrap();
    }

    #[tokio::test]
    async fn it_reports_the_first_invalid_index() {
        let verifier = WorkerPoolVerifier::new(|tx: &Transaction| tx.fee() != 3);
        let err = verifier.verify_batch(&transactions(8)).await.unwrap_err();
        assert_eq!(err, TransactionVerifyError::InvalidProof { index: 3 });
    }

    #[tokio::test]
    async fn it_accepts_an_empty_batch() {
        let verifier = WorkerPoolVerifier::new(|_: &Transaction| false);
        verifier.verify_batch(&[]).await.unwrap();
    }
}
