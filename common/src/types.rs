use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Address a contract is expected to receive once its creating transaction lands
///
/// Only valid while `sender` has not sent any transaction other than the ones
/// counted by `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictedAddress {
    /// Predicted contract address
    pub address: Address,
    /// Account expected to create the contract
    pub sender: Address,
    /// Nonce of the creating transaction
    pub nonce: U256,
    /// Offset the prediction was requested with (1 = next transaction)
    pub offset: u64,
}

/// A contract created by a deployment plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    /// Logical name inside the plan
    pub name: String,
    /// Artifact the creation code came from
    pub artifact: String,
    /// Realized on-chain address
    pub address: Address,
    /// Creating transaction
    pub tx_hash: H256,
    /// Nonce the creating transaction used
    pub nonce: U256,
    /// Constructor arguments as they were encoded
    pub constructor_args: Vec<String>,
}

/// A plain contract call sent as part of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentCall {
    /// Logical name inside the plan
    pub name: String,
    /// Called contract
    pub target: Address,
    /// Called function
    pub function: String,
    /// Transaction hash
    pub tx_hash: H256,
    /// Nonce the transaction used
    pub nonce: U256,
}

/// Everything a plan run has put on chain, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Plan that produced this record
    pub plan: String,
    /// Deploying account
    pub deployer: Address,
    /// Deployer nonce when the plan started
    pub start_nonce: U256,
    /// When the plan started
    pub started_at: DateTime<Utc>,
    /// Addresses predicted for every deployment step, by logical name
    pub predictions: BTreeMap<String, PredictedAddress>,
    /// Contracts created so far
    pub contracts: Vec<DeployedContract>,
    /// Calls sent so far
    pub calls: Vec<SentCall>,
}

impl DeploymentRecord {
    pub fn new(plan: impl Into<String>, deployer: Address, start_nonce: U256) -> Self {
        Self {
            plan: plan.into(),
            deployer,
            start_nonce,
            started_at: Utc::now(),
            predictions: BTreeMap::new(),
            contracts: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Realized address of a deployed contract
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.name == name)
            .map(|contract| contract.address)
    }

    /// Logical name to realized address, for every contract deployed so far
    pub fn addresses(&self) -> BTreeMap<String, Address> {
        self.contracts
            .iter()
            .map(|contract| (contract.name.clone(), contract.address))
            .collect()
    }

    /// Number of transactions the plan has sent
    pub fn transactions_sent(&self) -> usize {
        self.contracts.len() + self.calls.len()
    }

    /// Deployed contracts whose realized address differs from the prediction
    pub fn mispredicted(&self) -> Vec<(&str, Address, Address)> {
        self.contracts
            .iter()
            .filter_map(|contract| {
                let predicted = self.predictions.get(&contract.name)?;
                (predicted.address != contract.address).then(|| {
                    (contract.name.as_str(), predicted.address, contract.address)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed(name: &str, address: Address) -> DeployedContract {
        DeployedContract {
            name: name.to_string(),
            artifact: name.to_string(),
            address,
            tx_hash: H256::zero(),
            nonce: U256::zero(),
            constructor_args: vec![],
        }
    }

    #[test]
    fn test_record_lookup() {
        let mut record = DeploymentRecord::new("dao", Address::zero(), U256::zero());
        record.contracts.push(deployed("nft", Address::from_low_u64_be(1)));
        record.contracts.push(deployed("timelock", Address::from_low_u64_be(2)));

        assert_eq!(record.address_of("timelock"), Some(Address::from_low_u64_be(2)));
        assert_eq!(record.address_of("governor"), None);
        assert_eq!(record.addresses().len(), 2);
        assert_eq!(record.transactions_sent(), 2);
    }

    #[test]
    fn test_record_mispredicted() {
        let mut record = DeploymentRecord::new("dao", Address::zero(), U256::zero());
        record.contracts.push(deployed("nft", Address::from_low_u64_be(1)));
        record.contracts.push(deployed("timelock", Address::from_low_u64_be(2)));
        for (name, low, offset) in [("nft", 1, 1), ("timelock", 3, 2)] {
            record.predictions.insert(
                name.to_string(),
                PredictedAddress {
                    address: Address::from_low_u64_be(low),
                    sender: Address::zero(),
                    nonce: U256::from(offset - 1),
                    offset,
                },
            );
        }

        let wrong = record.mispredicted();
        assert_eq!(wrong.len(), 1);
        assert_eq!(wrong[0].0, "timelock");
        assert_eq!(wrong[0].1, Address::from_low_u64_be(3));
        assert_eq!(wrong[0].2, Address::from_low_u64_be(2));
    }
}
