use std::time::Duration;

use common::DeploymentRecord;
use ethers::types::{Address, H256, U256};

use crate::ethereum::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("account {account:?} unavailable: {cause}")]
    AccountUnavailable { account: Address, cause: LedgerError },

    #[error("nonce offset must be at least 1 (1 is the next transaction)")]
    InvalidOffset,

    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("mint failed: {0}")]
    MintFailed(StepFailure),

    #[error("step {step} ({name}) failed: {cause}")]
    DeploymentFailed {
        /// 1-based index of the failing step
        step: usize,
        name: String,
        cause: StepFailure,
        /// Everything deployed before the failure
        partial: Box<DeploymentRecord>,
    },

    #[error(
        "stale prediction: {contract} holds {predicted:?} for {target} ({reference}) \
         but {target} lives at {realized:?}"
    )]
    StalePrediction {
        contract: String,
        reference: String,
        target: String,
        predicted: Address,
        realized: Address,
        record: Box<DeploymentRecord>,
    },

    #[error("peer check {contract}.{getter}() failed: {cause}")]
    PeerCheck {
        contract: String,
        getter: String,
        cause: String,
        record: Box<DeploymentRecord>,
    },
}

impl Error {
    /// Contracts already on chain when the error was raised
    pub fn partial_record(&self) -> Option<&DeploymentRecord> {
        match self {
            Error::DeploymentFailed { partial, .. } => Some(partial),
            Error::StalePrediction { record, .. } | Error::PeerCheck { record, .. } => {
                Some(record)
            }
            _ => None,
        }
    }
}

/// Why a single plan step did not complete
#[derive(Debug, thiserror::Error)]
pub enum StepFailure {
    #[error("could not read deployer nonce: {0}")]
    NonceUnavailable(LedgerError),

    #[error("deployer nonce is {actual}, expected {expected}; another sender used the account")]
    NonceDrift { expected: U256, actual: U256 },

    #[error("could not encode transaction: {0}")]
    Encoding(String),

    #[error("transaction could not be sent: {0}")]
    Send(LedgerError),

    #[error("waiting for {tx_hash:?} failed: {cause}")]
    Wait { tx_hash: H256, cause: LedgerError },

    #[error("transaction {0:?} was not mined")]
    NotMined(H256),

    #[error("no confirmation for {tx_hash:?} within {timeout:?}")]
    Timeout { tx_hash: H256, timeout: Duration },

    #[error("transaction {0:?} reverted")]
    Reverted(H256),

    #[error("receipt for {0:?} carries no contract address")]
    MissingAddress(H256),
}
