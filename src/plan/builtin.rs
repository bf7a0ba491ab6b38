use ethers::types::Address;
use serde::{Deserialize, Serialize};

use super::{Arg, DeploymentPlan};

/// Parameters of the governance deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoParams {
    pub nft_artifact: String,
    pub executor_artifact: String,
    pub governor_artifact: String,
    /// Receives the developer share of mints; the deployer when unset
    pub dev_address: Option<Address>,
    /// Timelock delay in seconds
    pub timelock_delay: u64,
    /// Blocks between proposal and voting start
    pub voting_delay: u64,
    /// Blocks a vote stays open
    pub voting_period: u64,
    /// Votes needed to create a proposal
    pub proposal_threshold: u64,
    /// Read the peer addresses back from every contract afterwards
    pub verify_peers: bool,
    /// Getter on the NFT returning the timelock it was built with
    pub nft_timelock_getter: Option<String>,
}

impl Default for DaoParams {
    fn default() -> Self {
        Self {
            nft_artifact: "DrawDAONFT".to_string(),
            executor_artifact: "DrawDAOExecutor".to_string(),
            governor_artifact: "DrawDAOGovernor".to_string(),
            dev_address: None,
            timelock_delay: 2,
            voting_delay: 5,
            voting_period: 1800,
            proposal_threshold: 1,
            verify_peers: true,
            nft_timelock_getter: Some("timelock".to_string()),
        }
    }
}

/// Parameters of the auction deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionParams {
    pub executor_artifact: String,
    pub auction_artifact: String,
    pub nft_artifact: String,
    /// Timelock delay in seconds
    pub timelock_delay: u64,
}

impl Default for AuctionParams {
    fn default() -> Self {
        Self {
            executor_artifact: "ChickenDAOExecutor".to_string(),
            auction_artifact: "ChickenDAOAuctionHouse".to_string(),
            nft_artifact: "ChickenDAONFT".to_string(),
            timelock_delay: 86400,
        }
    }
}

/// NFT, timelock and governor, which reference each other in a cycle
///
/// The NFT needs the timelock, the timelock is administered by the governor
/// and the governor needs both. The NFT goes first with the predicted
/// timelock address, the timelock second with the predicted governor.
pub fn dao_plan(params: &DaoParams) -> DeploymentPlan {
    let dev = params.dev_address.map(Arg::Address).unwrap_or(Arg::Signer);

    let plan = DeploymentPlan::new("dao")
        .deploy(
            "nft",
            &params.nft_artifact,
            vec![Arg::Signer, Arg::predicted("timelock"), dev],
        )
        .deploy(
            "timelock",
            &params.executor_artifact,
            vec![Arg::predicted("governor"), Arg::uint(params.timelock_delay)],
        )
        .deploy(
            "governor",
            &params.governor_artifact,
            vec![
                Arg::deployed("nft"),
                Arg::deployed("timelock"),
                Arg::uint(params.voting_delay),
                Arg::uint(params.voting_period),
                Arg::uint(params.proposal_threshold),
            ],
        );

    if !params.verify_peers {
        return plan;
    }
    let plan = plan
        .check("governor", "token", "nft")
        .check("governor", "timelock", "timelock")
        .check("timelock", "admin", "governor");
    match &params.nft_timelock_getter {
        Some(getter) => plan.check("nft", getter, "timelock"),
        None => plan,
    }
}

/// Timelock, auction house and NFT in a straight line, then wire the NFT in
///
/// The timelock is the auction treasury and the auction house is the NFT
/// minter, so every constructor argument already exists when it is needed.
pub fn auction_plan(params: &AuctionParams) -> DeploymentPlan {
    DeploymentPlan::new("auction")
        .deploy(
            "timelock",
            &params.executor_artifact,
            vec![Arg::Signer, Arg::uint(params.timelock_delay)],
        )
        .deploy(
            "auction_house",
            &params.auction_artifact,
            vec![Arg::Signer, Arg::deployed("timelock")],
        )
        .deploy(
            "nft",
            &params.nft_artifact,
            vec![Arg::Signer, Arg::deployed("auction_house")],
        )
        .call(
            "set_nft",
            "auction_house",
            "setNFTAddress",
            vec![Arg::deployed("nft")],
        )
}
