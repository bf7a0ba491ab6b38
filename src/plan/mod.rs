// Deployment plans
//
// A plan is an ordered list of transactions sent by one account. Deployment
// steps may take the address of an earlier step (`Deployed`) or the predicted
// address of a later one (`Predicted`). Offsets for predictions are derived
// from the step positions, so inserting a step never needs hand-adjusted
// numbers.

mod builtin;

pub use builtin::{auction_plan, dao_plan, AuctionParams, DaoParams};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Constructor or call argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Arg {
    /// The deploying account
    Signer,
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    /// Realized address of an earlier deployment step
    Deployed(String),
    /// Predicted address of a later deployment step
    Predicted(String),
}

impl Arg {
    pub fn uint(value: u64) -> Self {
        Arg::Uint(U256::from(value))
    }

    pub fn deployed(name: &str) -> Self {
        Arg::Deployed(name.to_string())
    }

    pub fn predicted(name: &str) -> Self {
        Arg::Predicted(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Create a contract from an artifact
    Deploy {
        name: String,
        artifact: String,
        #[serde(default)]
        args: Vec<Arg>,
    },
    /// Call a function on a contract deployed earlier in the plan
    Call {
        name: String,
        target: String,
        function: String,
        #[serde(default)]
        args: Vec<Arg>,
        #[serde(default)]
        value: U256,
    },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Deploy { name, .. } | Step::Call { name, .. } => name,
        }
    }

    pub fn args(&self) -> &[Arg] {
        match self {
            Step::Deploy { args, .. } | Step::Call { args, .. } => args,
        }
    }

    pub fn is_deploy(&self) -> bool {
        matches!(self, Step::Deploy { .. })
    }
}

/// Reads `getter()` on `contract` after the plan and expects the address of `expected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCheck {
    pub contract: String,
    pub getter: String,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub name: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub checks: Vec<PeerCheck>,
}

impl DeploymentPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn deploy(mut self, name: &str, artifact: &str, args: Vec<Arg>) -> Self {
        self.steps.push(Step::Deploy {
            name: name.to_string(),
            artifact: artifact.to_string(),
            args,
        });
        self
    }

    pub fn call(self, name: &str, target: &str, function: &str, args: Vec<Arg>) -> Self {
        self.call_with_value(name, target, function, args, U256::zero())
    }

    pub fn call_with_value(
        mut self,
        name: &str,
        target: &str,
        function: &str,
        args: Vec<Arg>,
        value: U256,
    ) -> Self {
        self.steps.push(Step::Call {
            name: name.to_string(),
            target: target.to_string(),
            function: function.to_string(),
            args,
            value,
        });
        self
    }

    pub fn check(mut self, contract: &str, getter: &str, expected: &str) -> Self {
        self.checks.push(PeerCheck {
            contract: contract.to_string(),
            getter: getter.to_string(),
            expected: expected.to_string(),
        });
        self
    }

    /// Load a plan from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::InvalidPlan(format!("reading {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::InvalidPlan(format!("parsing {}: {}", path.display(), e)))
    }

    /// Nonce offset of every deployment step, counting calls too
    ///
    /// Offset 1 is the first transaction of the plan.
    pub fn deploy_offsets(&self) -> BTreeMap<String, u64> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.is_deploy())
            .map(|(index, step)| (step.name().to_string(), index as u64 + 1))
            .collect()
    }

    /// Check that every reference can be resolved in step order
    pub fn validate(&self) -> Result<(), Error> {
        if self.steps.is_empty() {
            return Err(Error::InvalidPlan(format!("plan {} has no steps", self.name)));
        }

        let mut deploys: HashMap<&str, usize> = HashMap::new();
        let mut names: HashMap<&str, usize> = HashMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            if names.insert(step.name(), index).is_some() {
                return Err(Error::InvalidPlan(format!(
                    "step name {} is used twice",
                    step.name()
                )));
            }
            if step.is_deploy() {
                deploys.insert(step.name(), index);
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Call { target, .. } = step {
                match deploys.get(target.as_str()) {
                    Some(&at) if at < index => {}
                    _ => {
                        return Err(Error::InvalidPlan(format!(
                            "{} calls {}, which is not deployed before it",
                            step.name(),
                            target
                        )))
                    }
                }
            }

            for arg in step.args() {
                match arg {
                    Arg::Deployed(target) => match deploys.get(target.as_str()) {
                        Some(&at) if at < index => {}
                        Some(_) => {
                            return Err(Error::InvalidPlan(format!(
                                "{} needs the deployed address of {}, which comes later; \
                                 use a predicted address",
                                step.name(),
                                target
                            )))
                        }
                        None => {
                            return Err(Error::InvalidPlan(format!(
                                "{} references unknown contract {}",
                                step.name(),
                                target
                            )))
                        }
                    },
                    Arg::Predicted(target) => match deploys.get(target.as_str()) {
                        Some(&at) if at > index => {}
                        Some(_) => {
                            return Err(Error::InvalidPlan(format!(
                                "{} predicts {}, which is already deployed by then",
                                step.name(),
                                target
                            )))
                        }
                        None => {
                            return Err(Error::InvalidPlan(format!(
                                "{} references unknown contract {}",
                                step.name(),
                                target
                            )))
                        }
                    },
                    _ => {}
                }
            }
        }

        for check in &self.checks {
            for name in [&check.contract, &check.expected] {
                if !deploys.contains_key(name.as_str()) {
                    return Err(Error::InvalidPlan(format!(
                        "peer check {}.{}() references unknown contract {}",
                        check.contract, check.getter, name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circular() -> DeploymentPlan {
        DeploymentPlan::new("circular")
            .deploy("nft", "NFT", vec![Arg::Signer, Arg::predicted("timelock")])
            .deploy("timelock", "Timelock", vec![Arg::predicted("governor"), Arg::uint(2)])
            .deploy(
                "governor",
                "Governor",
                vec![Arg::deployed("nft"), Arg::deployed("timelock")],
            )
            .check("governor", "timelock", "timelock")
    }

    #[test]
    fn test_validate_circular_plan() {
        assert!(circular().validate().is_ok());
    }

    #[test]
    fn test_offsets_count_calls() {
        let plan = DeploymentPlan::new("linear")
            .deploy("a", "A", vec![])
            .deploy("b", "B", vec![Arg::deployed("a")])
            .call("link", "a", "setB", vec![Arg::deployed("b")])
            .deploy("c", "C", vec![]);

        let offsets = plan.deploy_offsets();
        assert_eq!(offsets["a"], 1);
        assert_eq!(offsets["b"], 2);
        assert_eq!(offsets["c"], 4);
        assert!(!offsets.contains_key("link"));
    }

    #[test]
    fn test_validate_rejects_forward_deployed_reference() {
        let plan = DeploymentPlan::new("bad")
            .deploy("a", "A", vec![Arg::deployed("b")])
            .deploy("b", "B", vec![]);

        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("use a predicted address"));
    }

    #[test]
    fn test_validate_rejects_backward_prediction() {
        let plan = DeploymentPlan::new("bad")
            .deploy("a", "A", vec![])
            .deploy("b", "B", vec![Arg::predicted("a")]);

        assert!(matches!(plan.validate(), Err(Error::InvalidPlan(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_and_duplicate_names() {
        let unknown = DeploymentPlan::new("bad").deploy("a", "A", vec![Arg::predicted("x")]);
        assert!(unknown.validate().is_err());

        let duplicate = DeploymentPlan::new("bad")
            .deploy("a", "A", vec![])
            .deploy("a", "A", vec![]);
        assert!(duplicate.validate().is_err());

        let empty = DeploymentPlan::new("empty");
        assert!(empty.validate().is_err());

        let check = circular().check("governor", "admin", "treasury");
        assert!(check.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_call_before_target() {
        let plan = DeploymentPlan::new("bad")
            .call("early", "a", "start", vec![])
            .deploy("a", "A", vec![]);

        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_json_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plan = circular().call_with_value(
            "mint",
            "nft",
            "mint",
            vec![Arg::Signer, Arg::uint(1)],
            U256::exp10(15),
        );
        fs::write(&path, serde_json::to_string_pretty(&plan).unwrap()).unwrap();

        let loaded = DeploymentPlan::from_file(&path).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn test_plan_json_shape() {
        let json = r#"{
            "name": "pair",
            "steps": [
                { "type": "deploy", "name": "a", "artifact": "A",
                  "args": [{ "kind": "signer" }, { "kind": "predicted", "value": "b" }] },
                { "type": "deploy", "name": "b", "artifact": "B",
                  "args": [{ "kind": "deployed", "value": "a" }, { "kind": "uint", "value": "0x2" }] }
            ]
        }"#;

        let plan: DeploymentPlan = serde_json::from_str(json).unwrap();
        assert!(plan.validate().is_ok());
        assert!(plan.checks.is_empty());
        assert_eq!(plan.steps[1].args()[1], Arg::uint(2));
    }
}
