pub mod artifact;
pub mod chain;

pub use artifact::{ArtifactStore, ContractArtifact};
pub use chain::{NetworkConfig, NetworkRegistry};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// The three ledger operations deployment depends on, plus a read-only call
///
/// Implementations own one signing account. Everything a plan sends goes
/// through `send_transaction`, one transaction at a time.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Account that signs transactions
    fn signer(&self) -> Address;

    /// Transaction count of `account`, including its own pending transactions
    async fn transaction_count(&self, account: Address) -> Result<U256, LedgerError>;

    /// Sign and submit a transaction, returning its hash without waiting
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, LedgerError>;

    /// Wait for the receipt of a submitted transaction
    ///
    /// `Ok(None)` means the transaction was dropped from the pool.
    async fn wait(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, LedgerError>;

    /// Execute a read-only call against the latest state
    async fn call(&self, tx: TransactionRequest) -> Result<Bytes, LedgerError>;
}

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// JSON-RPC ledger signing with a local key
pub struct RpcLedger {
    client: Arc<SignerClient>,
    poll_interval: Duration,
    confirmations: usize,
}

impl RpcLedger {
    /// Connect to `rpc_url` and bind `wallet` to the chain id the node reports
    pub async fn connect(
        rpc_url: &str,
        wallet: LocalWallet,
        poll_interval: Duration,
        confirmations: usize,
    ) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Provider(e.to_string()))?
            .interval(poll_interval);
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Provider(e.to_string()))?;
        log::debug!("connected to {} (chain id {})", rpc_url, chain_id);

        let client = SignerMiddleware::new(provider, wallet.with_chain_id(chain_id.as_u64()));
        Ok(Self {
            client: Arc::new(client),
            poll_interval,
            confirmations,
        })
    }

    /// Chain id the signer is bound to
    pub fn chain_id(&self) -> u64 {
        self.client.signer().chain_id()
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    fn signer(&self) -> Address {
        self.client.address()
    }

    async fn transaction_count(&self, account: Address) -> Result<U256, LedgerError> {
        self.client
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| LedgerError::Provider(e.to_string()))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, LedgerError> {
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        Ok(*pending)
    }

    async fn wait(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, LedgerError> {
        PendingTransaction::new(tx_hash, self.client.provider())
            .interval(self.poll_interval)
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::Provider(e.to_string()))
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes, LedgerError> {
        self.client
            .call(&tx.into(), None)
            .await
            .map_err(|e| LedgerError::Provider(e.to_string()))
    }
}
