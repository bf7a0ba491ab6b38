// Deployment orchestration
//
// Runs a plan one transaction at a time from a single account. Every step is
// sent with the exact nonce its position in the plan implies and is confirmed
// before the next one is built. A failed step ends the run: what is already
// on chain stays there and is handed back to the operator, nothing is retried.

use std::collections::BTreeMap;
use std::time::Duration;

use common::{DeployedContract, DeploymentRecord, PredictedAddress, SentCall};
use ethers::abi::Token;
use ethers::types::{Address, TransactionReceipt, TransactionRequest, H256, U256, U64};

use crate::error::{Error, StepFailure};
use crate::ethereum::{ArtifactStore, Ledger};
use crate::plan::{Arg, DeploymentPlan, Step};
use crate::predictor::AddressPredictor;

/// Default time a step may wait for its receipt
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// A plan step resolved against the deployer's current nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// 1-based position in the plan
    pub index: usize,
    pub name: String,
    /// Nonce the step will be sent with
    pub nonce: U256,
    /// Predicted address for deployment steps
    pub prediction: Option<PredictedAddress>,
    /// Artifact for deployments, `target.function` for calls
    pub action: String,
    /// Arguments as they will be encoded, with their origin
    pub args: Vec<String>,
}

/// Dry run of a plan: what would be sent, and where contracts would land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPreview {
    pub plan: String,
    pub deployer: Address,
    pub start_nonce: U256,
    pub steps: Vec<PlannedStep>,
}

impl PlanPreview {
    pub fn predictions(&self) -> BTreeMap<String, PredictedAddress> {
        self.steps
            .iter()
            .filter_map(|step| step.prediction.map(|p| (step.name.clone(), p)))
            .collect()
    }
}

/// Deploys plans through one ledger account
pub struct DeploymentOrchestrator<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
    artifacts: &'a ArtifactStore,
    step_timeout: Duration,
}

impl<'a, L: Ledger + ?Sized> DeploymentOrchestrator<'a, L> {
    pub fn new(ledger: &'a L, artifacts: &'a ArtifactStore) -> Self {
        Self {
            ledger,
            artifacts,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Validate a plan, predict every address and encode every transaction
    ///
    /// Sends nothing. Encoding problems surface here rather than halfway
    /// through a deployment.
    pub async fn preview(&self, plan: &DeploymentPlan) -> Result<PlanPreview, Error> {
        plan.validate()?;

        let deployer = self.ledger.signer();
        let snapshot = AddressPredictor::new(self.ledger).snapshot(deployer).await?;

        let mut predictions = BTreeMap::new();
        for (name, offset) in plan.deploy_offsets() {
            let prediction = snapshot.predict(offset)?;
            log::debug!(
                "{}: offset {} -> nonce {} -> {:?}",
                name,
                offset,
                prediction.nonce,
                prediction.address
            );
            predictions.insert(name, prediction);
        }

        // Before anything is sent, a deployed address is the predicted one.
        let lookup = |name: &str| predictions.get(name).map(|p| p.address);

        let mut steps = Vec::with_capacity(plan.steps.len());
        for (position, step) in plan.steps.iter().enumerate() {
            let tokens = resolve_args(step.args(), deployer, &predictions, lookup)
                .map_err(Error::InvalidPlan)?;
            let action = match step {
                Step::Deploy { artifact, .. } => {
                    self.artifacts.get(artifact)?.creation_input(&tokens)?;
                    artifact.clone()
                }
                Step::Call {
                    target, function, ..
                } => {
                    let artifact = self.artifacts.get(self.artifact_of(plan, target)?)?;
                    artifact
                        .function(function, tokens.len())?
                        .encode_input(&tokens)
                        .map_err(|e| {
                            Error::Artifact(format!("{}.{}: {}", target, function, e))
                        })?;
                    format!("{}.{}", target, function)
                }
            };

            steps.push(PlannedStep {
                index: position + 1,
                name: step.name().to_string(),
                nonce: snapshot.nonce + U256::from(position),
                prediction: predictions.get(step.name()).copied(),
                action,
                args: step
                    .args()
                    .iter()
                    .zip(&tokens)
                    .map(|(arg, token)| describe_arg(arg, token))
                    .collect(),
            });
        }

        Ok(PlanPreview {
            plan: plan.name.clone(),
            deployer,
            start_nonce: snapshot.nonce,
            steps,
        })
    }

    /// Run a plan to completion or to its first failing step
    pub async fn execute(&self, plan: &DeploymentPlan) -> Result<DeploymentRecord, Error> {
        let preview = self.preview(plan).await?;
        let mut record = DeploymentRecord::new(&plan.name, preview.deployer, preview.start_nonce);
        record.predictions = preview.predictions();

        log::info!(
            "deploying plan {} from {:?} starting at nonce {} ({} transactions)",
            plan.name,
            preview.deployer,
            preview.start_nonce,
            plan.steps.len()
        );

        for (position, step) in plan.steps.iter().enumerate() {
            let nonce = preview.start_nonce + U256::from(position);
            if let Err(cause) = self.run_step(plan, step, nonce, &mut record).await {
                log::warn!(
                    "step {} ({}) failed: {}; {} contracts already deployed",
                    position + 1,
                    step.name(),
                    cause,
                    record.contracts.len()
                );
                return Err(Error::DeploymentFailed {
                    step: position + 1,
                    name: step.name().to_string(),
                    cause,
                    partial: Box::new(record),
                });
            }
        }

        let record = check_predictions(plan, record)?;
        self.check_peers(plan, record).await
    }

    async fn run_step(
        &self,
        plan: &DeploymentPlan,
        step: &Step,
        nonce: U256,
        record: &mut DeploymentRecord,
    ) -> Result<(), StepFailure> {
        let deployer = record.deployer;
        let current = self
            .ledger
            .transaction_count(deployer)
            .await
            .map_err(StepFailure::NonceUnavailable)?;
        if current != nonce {
            return Err(StepFailure::NonceDrift {
                expected: nonce,
                actual: current,
            });
        }

        let tokens = resolve_args(step.args(), deployer, &record.predictions, |name| {
            record.address_of(name)
        })
        .map_err(StepFailure::Encoding)?;

        match step {
            Step::Deploy { name, artifact, .. } => {
                let input = self
                    .artifacts
                    .get(artifact)
                    .and_then(|a| a.creation_input(&tokens))
                    .map_err(|e| StepFailure::Encoding(e.to_string()))?;
                let tx = TransactionRequest::new().from(deployer).nonce(nonce).data(input);

                log::info!("deploying {} ({}) with nonce {}", name, artifact, nonce);
                let receipt = submit(self.ledger, tx, self.step_timeout).await?;
                let address = receipt
                    .contract_address
                    .ok_or(StepFailure::MissingAddress(receipt.transaction_hash))?;
                log::info!("{} deployed at {:?}", name, address);

                record.contracts.push(DeployedContract {
                    name: name.clone(),
                    artifact: artifact.clone(),
                    address,
                    tx_hash: receipt.transaction_hash,
                    nonce,
                    constructor_args: tokens.iter().map(render_token).collect(),
                });
            }
            Step::Call {
                name,
                target,
                function,
                value,
                ..
            } => {
                let target_address = record.address_of(target).ok_or_else(|| {
                    StepFailure::Encoding(format!("{} is not deployed", target))
                })?;
                let data = self
                    .artifact_of(plan, target)
                    .and_then(|artifact| self.artifacts.get(artifact))
                    .and_then(|artifact| artifact.function(function, tokens.len()))
                    .map_err(|e| StepFailure::Encoding(e.to_string()))?
                    .encode_input(&tokens)
                    .map_err(|e| StepFailure::Encoding(e.to_string()))?;
                let tx = TransactionRequest::new()
                    .from(deployer)
                    .to(target_address)
                    .nonce(nonce)
                    .value(*value)
                    .data(data);

                log::info!("calling {}.{} ({}) with nonce {}", target, function, name, nonce);
                let receipt = submit(self.ledger, tx, self.step_timeout).await?;

                record.calls.push(SentCall {
                    name: name.clone(),
                    target: target_address,
                    function: function.clone(),
                    tx_hash: receipt.transaction_hash,
                    nonce,
                });
            }
        }

        Ok(())
    }

    /// Read peer addresses back from chain and compare them with the record
    async fn check_peers(
        &self,
        plan: &DeploymentPlan,
        record: DeploymentRecord,
    ) -> Result<DeploymentRecord, Error> {
        for check in &plan.checks {
            let peer_error = |cause: String, record: &DeploymentRecord| Error::PeerCheck {
                contract: check.contract.clone(),
                getter: check.getter.clone(),
                cause,
                record: Box::new(record.clone()),
            };

            let (Some(address), Some(realized)) = (
                record.address_of(&check.contract),
                record.address_of(&check.expected),
            ) else {
                return Err(peer_error("contract missing from record".to_string(), &record));
            };

            let function = match self
                .artifact_of(plan, &check.contract)
                .and_then(|artifact| self.artifacts.get(artifact))
                .and_then(|artifact| artifact.function(&check.getter, 0))
            {
                Ok(function) => function,
                Err(e) => return Err(peer_error(e.to_string(), &record)),
            };
            let data = match function.encode_input(&[]) {
                Ok(data) => data,
                Err(e) => return Err(peer_error(e.to_string(), &record)),
            };

            let output = match self
                .ledger
                .call(TransactionRequest::new().to(address).data(data))
                .await
            {
                Ok(output) => output,
                Err(e) => return Err(peer_error(e.to_string(), &record)),
            };
            let stored = match function.decode_output(&output).map(|t| t.into_iter().next()) {
                Ok(Some(Token::Address(stored))) => stored,
                Ok(_) => {
                    return Err(peer_error("getter did not return an address".to_string(), &record))
                }
                Err(e) => return Err(peer_error(e.to_string(), &record)),
            };

            if stored != realized {
                return Err(Error::StalePrediction {
                    contract: check.contract.clone(),
                    reference: format!("{}()", check.getter),
                    target: check.expected.clone(),
                    predicted: stored,
                    realized,
                    record: Box::new(record),
                });
            }
            log::debug!("{}.{}() = {:?}", check.contract, check.getter, stored);
        }

        Ok(record)
    }

    fn artifact_of<'p>(&self, plan: &'p DeploymentPlan, name: &str) -> Result<&'p str, Error> {
        plan.steps
            .iter()
            .find_map(|step| match step {
                Step::Deploy {
                    name: step_name,
                    artifact,
                    ..
                } if step_name == name => Some(artifact.as_str()),
                _ => None,
            })
            .ok_or_else(|| Error::InvalidPlan(format!("{} is not a deployment step", name)))
    }
}

/// Send one transaction and wait for a successful receipt
pub async fn submit<L: Ledger + ?Sized>(
    ledger: &L,
    tx: TransactionRequest,
    timeout: Duration,
) -> Result<TransactionReceipt, StepFailure> {
    let tx_hash: H256 = ledger.send_transaction(tx).await.map_err(StepFailure::Send)?;
    log::debug!("sent {:?}, waiting up to {:?}", tx_hash, timeout);

    let receipt = match tokio::time::timeout(timeout, ledger.wait(tx_hash)).await {
        Err(_) => return Err(StepFailure::Timeout { tx_hash, timeout }),
        Ok(Err(cause)) => return Err(StepFailure::Wait { tx_hash, cause }),
        Ok(Ok(None)) => return Err(StepFailure::NotMined(tx_hash)),
        Ok(Ok(Some(receipt))) => receipt,
    };

    if receipt.status == Some(U64::zero()) {
        return Err(StepFailure::Reverted(tx_hash));
    }
    Ok(receipt)
}

/// Every predicted address baked into an argument must have come true
fn check_predictions(
    plan: &DeploymentPlan,
    record: DeploymentRecord,
) -> Result<DeploymentRecord, Error> {
    for step in &plan.steps {
        for (position, arg) in step.args().iter().enumerate() {
            let Arg::Predicted(target) = arg else {
                continue;
            };
            let (Some(predicted), Some(realized)) =
                (record.predictions.get(target), record.address_of(target))
            else {
                continue;
            };
            if predicted.address != realized {
                log::warn!(
                    "{} was built with {:?} for {} but it was deployed at {:?}",
                    step.name(),
                    predicted.address,
                    target,
                    realized
                );
                return Err(Error::StalePrediction {
                    contract: step.name().to_string(),
                    reference: format!("argument {}", position + 1),
                    target: target.clone(),
                    predicted: predicted.address,
                    realized,
                    record: Box::new(record),
                });
            }
        }
    }

    Ok(record)
}

fn resolve_args<F>(
    args: &[Arg],
    signer: Address,
    predictions: &BTreeMap<String, PredictedAddress>,
    deployed: F,
) -> Result<Vec<Token>, String>
where
    F: Fn(&str) -> Option<Address>,
{
    args.iter()
        .map(|arg| match arg {
            Arg::Signer => Ok(Token::Address(signer)),
            Arg::Address(address) => Ok(Token::Address(*address)),
            Arg::Uint(value) => Ok(Token::Uint(*value)),
            Arg::Bool(value) => Ok(Token::Bool(*value)),
            Arg::String(value) => Ok(Token::String(value.clone())),
            Arg::Bytes(value) => Ok(Token::Bytes(value.to_vec())),
            Arg::Deployed(name) => deployed(name)
                .map(Token::Address)
                .ok_or_else(|| format!("{} has not been deployed", name)),
            Arg::Predicted(name) => predictions
                .get(name)
                .map(|p| Token::Address(p.address))
                .ok_or_else(|| format!("no prediction for {}", name)),
        })
        .collect()
}

fn render_token(token: &Token) -> String {
    match token {
        Token::Address(address) => format!("{:?}", address),
        Token::Uint(value) | Token::Int(value) => value.to_string(),
        Token::String(value) => format!("{:?}", value),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => format!("0x{}", hex::encode(bytes)),
        other => other.to_string(),
    }
}

fn describe_arg(arg: &Arg, token: &Token) -> String {
    let rendered = render_token(token);
    match arg {
        Arg::Signer => format!("{} (deployer)", rendered),
        Arg::Deployed(name) => format!("{} ({})", rendered, name),
        Arg::Predicted(name) => format!("{} (predicted {})", rendered, name),
        _ => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired() -> DeploymentPlan {
        DeploymentPlan::new("pair")
            .deploy("nft", "NFT", vec![Arg::Signer, Arg::predicted("timelock")])
            .deploy("timelock", "Timelock", vec![Arg::deployed("nft")])
    }

    fn deployed(name: &str, address: Address, nonce: u64) -> DeployedContract {
        DeployedContract {
            name: name.to_string(),
            artifact: name.to_string(),
            address,
            tx_hash: H256::zero(),
            nonce: U256::from(nonce),
            constructor_args: vec![],
        }
    }

    fn record_with_timelock_at(realized: Address) -> DeploymentRecord {
        let mut record = DeploymentRecord::new("pair", Address::zero(), U256::zero());
        record.predictions.insert(
            "timelock".to_string(),
            PredictedAddress {
                address: Address::from_low_u64_be(2),
                sender: Address::zero(),
                nonce: U256::one(),
                offset: 2,
            },
        );
        record
            .contracts
            .push(deployed("nft", Address::from_low_u64_be(1), 0));
        record.contracts.push(deployed("timelock", realized, 1));
        record
    }

    #[test]
    fn test_check_predictions_accepts_realized_prediction() {
        let record = record_with_timelock_at(Address::from_low_u64_be(2));

        let checked = check_predictions(&paired(), record.clone()).unwrap();
        assert_eq!(checked, record);
    }

    #[test]
    fn test_check_predictions_flags_baked_in_argument() {
        let record = record_with_timelock_at(Address::from_low_u64_be(3));

        match check_predictions(&paired(), record) {
            Err(Error::StalePrediction {
                contract,
                reference,
                target,
                predicted,
                realized,
                record,
            }) => {
                assert_eq!(contract, "nft");
                assert_eq!(reference, "argument 2");
                assert_eq!(target, "timelock");
                assert_eq!(predicted, Address::from_low_u64_be(2));
                assert_eq!(realized, Address::from_low_u64_be(3));
                assert_eq!(record.contracts.len(), 2);
            }
            other => panic!("expected StalePrediction, got {:?}", other),
        }
    }

    #[test]
    fn test_describe_arg_names_the_source() {
        let address = Address::from_low_u64_be(0xabc);
        let token = Token::Address(address);

        assert!(describe_arg(&Arg::Signer, &token).ends_with("(deployer)"));
        assert!(describe_arg(&Arg::predicted("governor"), &token).ends_with("(predicted governor)"));
        assert_eq!(
            render_token(&Token::Bytes(vec![0xde, 0xad])),
            "0xdead"
        );
        assert_eq!(render_token(&Token::Uint(U256::from(1800))), "1800");
    }
}
