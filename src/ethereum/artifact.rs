use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ethers::abi::{Abi, Function, Token};
use ethers::types::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Compiled contract as hardhat writes it under `artifacts/contracts/`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    pub fn new(contract_name: impl Into<String>, abi: Abi, bytecode: Bytes) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode,
        }
    }

    /// Creation code followed by the ABI-encoded constructor arguments
    pub fn creation_input(&self, args: &[Token]) -> Result<Bytes, Error> {
        match self.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(self.bytecode.to_vec(), args)
                .map(Bytes::from)
                .map_err(|e| {
                    Error::Artifact(format!("{} constructor: {}", self.contract_name, e))
                }),
            None if args.is_empty() => Ok(self.bytecode.clone()),
            None => Err(Error::Artifact(format!(
                "{} has no constructor but {} arguments were given",
                self.contract_name,
                args.len()
            ))),
        }
    }

    /// Function `name` taking exactly `arity` arguments
    pub fn function(&self, name: &str, arity: usize) -> Result<&Function, Error> {
        self.abi
            .functions_by_name(name)
            .ok()
            .and_then(|functions| functions.iter().find(|f| f.inputs.len() == arity))
            .ok_or_else(|| {
                Error::Artifact(format!(
                    "{} has no function {} taking {} arguments",
                    self.contract_name, name, arity
                ))
            })
    }
}

/// Artifacts by contract name
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<String, ContractArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every artifact below a hardhat `artifacts` directory
    ///
    /// Debug files (`*.dbg.json`) and build-info are skipped, as are JSON files
    /// that are not contract artifacts.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let mut store = Self::new();
        store.scan(dir.as_ref())?;
        log::debug!("loaded {} artifacts", store.artifacts.len());
        Ok(store)
    }

    fn scan(&mut self, dir: &Path) -> Result<(), Error> {
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::Artifact(format!("reading {}: {}", dir.display(), e)))?;

        for entry in entries {
            let path = entry
                .map_err(|e| Error::Artifact(format!("reading {}: {}", dir.display(), e)))?
                .path();
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

            if path.is_dir() {
                if file_name != "build-info" {
                    self.scan(&path)?;
                }
                continue;
            }
            if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                continue;
            }

            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Artifact(format!("reading {}: {}", path.display(), e)))?;
            match serde_json::from_str::<ContractArtifact>(&content) {
                Ok(artifact) => self.insert(artifact),
                Err(e) => log::debug!("skipping {}: {}", path.display(), e),
            }
        }

        Ok(())
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.artifacts.insert(artifact.contract_name.clone(), artifact);
    }

    pub fn get(&self, name: &str) -> Result<&ContractArtifact, Error> {
        self.artifacts
            .get(name)
            .ok_or_else(|| Error::Artifact(format!("no artifact named {}", name)))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use tempfile::tempdir;

    const GREETER: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "Greeter",
        "sourceName": "contracts/Greeter.sol",
        "abi": [
            {
                "type": "constructor",
                "inputs": [{ "name": "owner", "type": "address", "internalType": "address" }],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "owner",
                "inputs": [],
                "outputs": [{ "name": "", "type": "address", "internalType": "address" }],
                "stateMutability": "view"
            }
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x6080",
        "linkReferences": {},
        "deployedLinkReferences": {}
    }"#;

    #[test]
    fn test_load_dir() -> Result<(), Error> {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("contracts").join("Greeter.sol");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Greeter.json"), GREETER).unwrap();
        fs::write(nested.join("Greeter.dbg.json"), r#"{"buildInfo": "x"}"#).unwrap();
        fs::create_dir_all(dir.path().join("build-info")).unwrap();
        fs::write(dir.path().join("build-info").join("abc.json"), "{}").unwrap();

        let store = ArtifactStore::load_dir(dir.path())?;

        assert_eq!(store.len(), 1);
        let greeter = store.get("Greeter")?;
        assert_eq!(greeter.bytecode.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert!(store.get("Missing").is_err());
        Ok(())
    }

    #[test]
    fn test_creation_input_appends_arguments() -> Result<(), Error> {
        let artifact: ContractArtifact = serde_json::from_str(GREETER).unwrap();
        let owner = Address::from_low_u64_be(0xbeef);

        let input = artifact.creation_input(&[Token::Address(owner)])?;

        assert_eq!(input.len(), 5 + 32);
        assert_eq!(&input[..5], &artifact.bytecode[..]);
        assert_eq!(&input[5 + 12..], owner.as_bytes());
        Ok(())
    }

    #[test]
    fn test_creation_input_rejects_wrong_arguments() {
        let artifact: ContractArtifact = serde_json::from_str(GREETER).unwrap();

        assert!(artifact.creation_input(&[Token::Bool(true)]).is_err());
        assert!(artifact.function("owner", 0).is_ok());
        assert!(artifact.function("owner", 1).is_err());
    }
}
