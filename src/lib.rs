//! Deployment tooling for the DAO contracts.
//!
//! Contracts that reference each other are deployed in one pass by predicting
//! the addresses of the ones that do not exist yet. See [`plan`] for how a
//! deployment is described, [`orchestrator`] for how it is run and
//! [`predictor`] for the address derivation.

pub mod api;
pub mod error;
pub mod ethereum;
pub mod mint;
pub mod orchestrator;
pub mod plan;
pub mod predictor;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use common::{DeployedContract, DeploymentRecord, PredictedAddress};
pub use error::{Error, StepFailure};
pub use ethereum::{ArtifactStore, ContractArtifact, Ledger, LedgerError, RpcLedger};
pub use orchestrator::{DeploymentOrchestrator, PlanPreview, PlannedStep};
pub use plan::{Arg, DeploymentPlan, PeerCheck, Step};
pub use predictor::{AddressPredictor, NonceSnapshot};
