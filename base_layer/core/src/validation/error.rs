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

use thiserror::Error;

use crate::{transactions::TransactionVerifyError, validation::TreesError};

/// Why a block was rejected. Every reason is fatal for that block: once rejected under any of
/// these, the same hash must never be re-requested or re-validated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Graffiti field must be exactly 32 bytes")]
    Graffiti,
    #[error("Header hash does not meet the declared target")]
    HashNotMeetTarget,
    #[error("Timestamp is too far in the future")]
    TooFarInFuture,
    #[error("Timestamp is too far before the parent block")]
    BlockTooOld,
    #[error("Sequence {got} does not follow parent sequence {parent}")]
    SequenceOutOfOrder { parent: u32, got: u32 },
    #[error("Declared target does not match the retarget rule")]
    InvalidTarget,
    #[error("Invalid miners' fee: {0}")]
    InvalidMinersFee(String),
    #[error("Transaction at index {index} has an invalid proof")]
    InvalidTransactionProof { index: usize },
    #[error("Note commitment size {got} does not continue the parent tree of size {expected}")]
    NoteCommitmentSize { expected: u64, got: u64 },
    #[error("Nullifier commitment size {got} does not continue the parent set of size {expected}")]
    NullifierCommitmentSize { expected: u64, got: u64 },
    #[error("Spend at index {index} witnesses a root the notes tree never had")]
    InvalidSpend { index: usize },
    #[error("Nullifier has already been revealed")]
    DuplicateNullifier,
    #[error("State commitment is missing or does not match the post-state of the block")]
    MissingStateCommitment,
    #[error("Trees service error: {0}")]
    Trees(#[from] TreesError),
}

impl From<TransactionVerifyError> for ValidationError {
    fn from(err: TransactionVerifyError) -> Self {
        match err {
            TransactionVerifyError::InvalidProof { index } => ValidationError::InvalidTransactionProof { index },
            TransactionVerifyError::WorkerFailure(_) => ValidationError::InvalidTransactionProof { index: 0 },
        }
    }
}
