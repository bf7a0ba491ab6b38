//! In-memory ledger and stub artifacts for tests.
//!
//! The mock assigns creation addresses with the same rule as a real chain,
//! keeps every creation input so constructor arguments can be read back, and
//! can inject the failures a deployment has to survive.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use common::contract_address;
use ethers::types::{
    Address, Bytes, NameOrAddress, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use ethers::utils::{id, keccak256};
use serde_json::{json, Value};

use crate::ethereum::{ArtifactStore, ContractArtifact, Ledger, LedgerError};
use crate::plan::{AuctionParams, DaoParams};

/// Length of the creation code of every stub artifact
pub const STUB_CODE_LEN: usize = 4;

/// First account of the default hardhat/anvil mnemonic
pub fn deployer() -> Address {
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        .parse()
        .expect("valid address")
}

/// Failure injected into one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The node refuses the transaction; no nonce is used
    RejectSend,
    /// Mined with status 0; the nonce is used but nothing is created
    Revert,
    /// Evicted from the pool; the receipt never appears
    Drop,
    /// Never confirmed while the caller waits
    Hang,
    /// Confirmed, then another sender uses the account once
    Interleave,
}

#[derive(Default)]
struct State {
    nonces: HashMap<Address, U256>,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<H256, (TransactionReceipt, Option<Fault>)>,
    creations: HashMap<Address, Bytes>,
    getters: HashMap<([u8; 4], [u8; 4]), usize>,
    faults: HashMap<usize, Fault>,
    attempts: usize,
    unavailable: bool,
}

/// Single-process chain that confirms transactions instantly
pub struct MockLedger {
    signer: Address,
    state: Mutex<State>,
}

impl MockLedger {
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            state: Mutex::new(State::default()),
        }
    }

    /// Start the signer at `nonce` as if it had sent that many transactions
    pub fn with_nonce(self, nonce: u64) -> Self {
        self.state().nonces.insert(self.signer, U256::from(nonce));
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock ledger poisoned")
    }

    /// Make transaction counts unreadable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Inject `fault` into the `index`-th transaction submitted (0-based)
    pub fn fail_transaction(&self, index: usize, fault: Fault) {
        self.state().faults.insert(index, fault);
    }

    /// Simulate a transaction sent from `account` by someone else
    pub fn bump_nonce(&self, account: Address) {
        *self.state().nonces.entry(account).or_default() += U256::one();
    }

    /// Answer `getter()` on contracts created from `artifact` with constructor word `word`
    pub fn expose_getter(&self, artifact: &ContractArtifact, getter: &str, word: usize) {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&artifact.bytecode[..STUB_CODE_LEN]);
        self.state()
            .getters
            .insert((tag, id(format!("{}()", getter))), word);
    }

    pub fn nonce_of(&self, account: Address) -> U256 {
        self.state().nonces.get(&account).copied().unwrap_or_default()
    }

    /// Every transaction the ledger accepted, in order
    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.state().sent.clone()
    }

    pub fn creation_input(&self, contract: Address) -> Option<Bytes> {
        self.state().creations.get(&contract).cloned()
    }

    /// 32-byte constructor argument `word` of a contract created from a stub artifact
    pub fn constructor_word(&self, contract: Address, word: usize) -> Option<[u8; 32]> {
        let input = self.creation_input(contract)?;
        let start = STUB_CODE_LEN + 32 * word;
        let mut out = [0u8; 32];
        out.copy_from_slice(input.get(start..start + 32)?);
        Some(out)
    }

    pub fn constructor_address(&self, contract: Address, word: usize) -> Option<Address> {
        self.constructor_word(contract, word)
            .map(|w| Address::from_slice(&w[12..]))
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn transaction_count(&self, account: Address) -> Result<U256, LedgerError> {
        let state = self.state();
        if state.unavailable {
            return Err(LedgerError::Provider("account not authorized".to_string()));
        }
        Ok(state.nonces.get(&account).copied().unwrap_or_default())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, LedgerError> {
        let mut state = self.state();
        let attempt = state.attempts;
        state.attempts += 1;

        let fault = state.faults.get(&attempt).copied();
        if fault == Some(Fault::RejectSend) {
            return Err(LedgerError::Rejected("injected rejection".to_string()));
        }

        let from = tx.from.unwrap_or(self.signer);
        let nonce = state.nonces.get(&from).copied().unwrap_or_default();
        if let Some(requested) = tx.nonce {
            if requested != nonce {
                return Err(LedgerError::Rejected(format!(
                    "nonce {} requested but account is at {}",
                    requested, nonce
                )));
            }
        }

        let mut preimage = from.as_bytes().to_vec();
        let mut nonce_bytes = [0u8; 32];
        nonce.to_big_endian(&mut nonce_bytes);
        preimage.extend_from_slice(&nonce_bytes);
        let tx_hash = H256::from(keccak256(preimage));

        let to = match &tx.to {
            Some(NameOrAddress::Address(to)) => Some(*to),
            _ => None,
        };
        let contract = match (to, fault) {
            (Some(_), _) | (None, Some(Fault::Revert)) | (None, Some(Fault::Drop)) => None,
            (None, _) => {
                let address = contract_address(from, nonce);
                let input = tx.data.clone().unwrap_or_default();
                state.creations.insert(address, input);
                Some(address)
            }
        };

        let used = match fault {
            Some(Fault::Drop) => 0u64,
            Some(Fault::Interleave) => 2,
            _ => 1,
        };
        state.nonces.insert(from, nonce + U256::from(used));

        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            from,
            to,
            contract_address: contract,
            status: Some(if fault == Some(Fault::Revert) {
                U64::zero()
            } else {
                U64::one()
            }),
            ..Default::default()
        };
        state.receipts.insert(tx_hash, (receipt, fault));
        state.sent.push(tx);

        Ok(tx_hash)
    }

    async fn wait(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, LedgerError> {
        let outcome = {
            let state = self.state();
            match state.receipts.get(&tx_hash) {
                None => return Err(LedgerError::Provider(format!("unknown transaction {:?}", tx_hash))),
                Some((_, Some(Fault::Drop))) => return Ok(None),
                Some((_, Some(Fault::Hang))) => None,
                Some((receipt, _)) => Some(receipt.clone()),
            }
        };

        match outcome {
            Some(receipt) => Ok(Some(receipt)),
            None => std::future::pending().await,
        }
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes, LedgerError> {
        let reverted = || LedgerError::Provider("execution reverted".to_string());

        let to = match &tx.to {
            Some(NameOrAddress::Address(to)) => *to,
            _ => return Err(reverted()),
        };
        let data = tx.data.unwrap_or_default();
        if data.len() < 4 {
            return Err(reverted());
        }

        let state = self.state();
        let input = state.creations.get(&to).ok_or_else(reverted)?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(input.get(..STUB_CODE_LEN).ok_or_else(reverted)?);
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);

        let word = *state.getters.get(&(tag, selector)).ok_or_else(reverted)?;
        let start = STUB_CODE_LEN + 32 * word;
        let out = input.get(start..start + 32).ok_or_else(reverted)?;
        Ok(Bytes::from(out.to_vec()))
    }
}

fn params(types: &str) -> Vec<Value> {
    types
        .split(',')
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .enumerate()
        .map(|(i, kind)| json!({ "name": format!("arg{}", i), "type": kind, "internalType": kind }))
        .collect()
}

/// Artifact with the given constructor and functions and a 4-byte creation code
///
/// Types are comma-separated lists, functions are `(name, inputs, outputs)`.
/// The creation code is derived from the name so the mock can tell
/// contracts apart.
pub fn stub_artifact(
    name: &str,
    constructor: &str,
    functions: &[(&str, &str, &str)],
) -> ContractArtifact {
    let mut abi = vec![json!({
        "type": "constructor",
        "inputs": params(constructor),
        "stateMutability": "nonpayable",
    })];
    for (function, inputs, outputs) in functions {
        abi.push(json!({
            "type": "function",
            "name": function,
            "inputs": params(inputs),
            "outputs": params(outputs),
            "stateMutability": "nonpayable",
        }));
    }

    let abi = serde_json::from_value(Value::Array(abi)).expect("stub abi");
    let code = keccak256(name.as_bytes())[..STUB_CODE_LEN].to_vec();
    ContractArtifact::new(name, abi, Bytes::from(code))
}

/// Stub artifacts matching the governance plan
pub fn dao_artifacts(params: &DaoParams) -> ArtifactStore {
    let mut store = ArtifactStore::new();
    let mut nft_functions = vec![("mint", "address,uint256", "")];
    if let Some(getter) = &params.nft_timelock_getter {
        nft_functions.push((getter.as_str(), "", "address"));
    }
    store.insert(stub_artifact(
        &params.nft_artifact,
        "address,address,address",
        &nft_functions,
    ));
    store.insert(stub_artifact(
        &params.executor_artifact,
        "address,uint256",
        &[("admin", "", "address")],
    ));
    store.insert(stub_artifact(
        &params.governor_artifact,
        "address,address,uint256,uint256,uint256",
        &[("timelock", "", "address"), ("token", "", "address")],
    ));
    store
}

/// Point the governance getters at the constructor words that hold them
pub fn expose_dao_getters(ledger: &MockLedger, artifacts: &ArtifactStore, params: &DaoParams) {
    let governor = artifacts.get(&params.governor_artifact).expect("governor artifact");
    ledger.expose_getter(governor, "token", 0);
    ledger.expose_getter(governor, "timelock", 1);
    let executor = artifacts.get(&params.executor_artifact).expect("executor artifact");
    ledger.expose_getter(executor, "admin", 0);
    if let Some(getter) = &params.nft_timelock_getter {
        let nft = artifacts.get(&params.nft_artifact).expect("nft artifact");
        ledger.expose_getter(nft, getter, 1);
    }
}

/// Stub artifacts matching the auction plan
pub fn auction_artifacts(params: &AuctionParams) -> ArtifactStore {
    let mut store = ArtifactStore::new();
    store.insert(stub_artifact(
        &params.executor_artifact,
        "address,uint256",
        &[("admin", "", "address")],
    ));
    store.insert(stub_artifact(
        &params.auction_artifact,
        "address,address",
        &[("setNFTAddress", "address", "")],
    ));
    store.insert(stub_artifact(&params.nft_artifact, "address,address", &[]));
    store
}
