// DAO deployment CLI
//
// Deploys the DAO contracts from hardhat artifacts and prints where they
// landed. Takes no interactive input.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dao_deploy::api::{ConfigManager, DeployConfig, ReportFormat, ReportFormatter};
use dao_deploy::ethereum::{ArtifactStore, NetworkRegistry, RpcLedger};
use dao_deploy::mint::{mint, mint_price};
use dao_deploy::plan::{auction_plan, dao_plan, DeploymentPlan};
use dao_deploy::predictor::{AddressPredictor, NonceSnapshot};
use dao_deploy::{DeploymentOrchestrator, Ledger};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, BlockNumber, U256};

/// DAO Deploy - deploys mutually-referencing DAO contracts in one pass
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Network preset (overrides the configuration)
    #[clap(short, long, global = true)]
    network: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a plan and print the realized addresses
    Deploy {
        #[clap(flatten)]
        source: PlanSource,

        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write the report to this file
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the transactions and addresses of a plan without sending anything
    Plan {
        #[clap(flatten)]
        source: PlanSource,
    },

    /// Predict the address of a contract created by an account
    Predict {
        /// Account to predict for; the deployer key when omitted
        #[clap(short, long)]
        account: Option<Address>,

        /// 1 is the account's next transaction
        #[clap(short, long, default_value_t = 1)]
        offset: u64,
    },

    /// Mint a token on a deployed NFT contract
    Mint {
        /// NFT contract address
        #[clap(long)]
        contract: Address,

        /// Recipient; the deployer when omitted
        #[clap(long)]
        to: Option<Address>,

        /// Token id (decimal or 0x-prefixed hex)
        #[clap(long, value_parser = parse_u256)]
        token_id: U256,
    },

    /// Generate a default configuration file
    Config {
        /// Output file path
        #[clap(short, long)]
        output: PathBuf,
    },

    /// List network presets
    Networks,
}

#[derive(Args)]
struct PlanSource {
    /// Built-in plan
    #[clap(long, value_enum, conflicts_with = "plan_file")]
    plan: Option<BuiltinPlan>,

    /// Plan described in a JSON file
    #[clap(long)]
    plan_file: Option<PathBuf>,
}

impl PlanSource {
    fn resolve(&self, config: &DeployConfig) -> Result<DeploymentPlan> {
        match (&self.plan_file, self.plan) {
            (Some(path), _) => DeploymentPlan::from_file(path).context("Failed to load plan"),
            (None, Some(BuiltinPlan::Auction)) => Ok(auction_plan(&config.auction)),
            (None, Some(BuiltinPlan::Dao)) | (None, None) => Ok(dao_plan(&config.dao)),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BuiltinPlan {
    /// NFT, timelock and governor (circular, uses predicted addresses)
    Dao,
    /// Timelock, auction house and NFT (linear)
    Auction,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn parse_u256(value: &str) -> Result<U256, String> {
    match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(value).map_err(|e| e.to_string()),
    }
}

fn load_config(cli: &Cli) -> Result<DeployConfig> {
    let config = match &cli.config {
        Some(path) => {
            ConfigManager::load_from_file(path).context("Failed to load configuration")?
        }
        None => DeployConfig::default(),
    };
    let mut config = ConfigManager::apply_env(config)?;
    if let Some(network) = &cli.network {
        config.network = network.clone();
    }
    Ok(config)
}

async fn connect(config: &DeployConfig) -> Result<RpcLedger> {
    let rpc_url = config.resolve_rpc_url(&NetworkRegistry::new())?;
    let wallet = ConfigManager::wallet_from_env()?;
    let ledger = RpcLedger::connect(
        &rpc_url,
        wallet,
        config.poll_interval(),
        config.confirmations,
    )
    .await
    .with_context(|| format!("Failed to connect to {}", rpc_url))?;

    log::info!(
        "using {} (chain id {}) as {:?}",
        config.network,
        ledger.chain_id(),
        ledger.signer()
    );
    Ok(ledger)
}

fn load_artifacts(config: &DeployConfig) -> Result<ArtifactStore> {
    ArtifactStore::load_dir(&config.artifacts_dir).with_context(|| {
        format!(
            "Failed to load artifacts from {}; run `npx hardhat compile` first",
            config.artifacts_dir.display()
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Deploy {
            source,
            format,
            output,
        } => {
            let config = load_config(&cli)?;
            let plan = source.resolve(&config)?;
            let artifacts = load_artifacts(&config)?;
            let ledger = connect(&config).await?;

            let orchestrator = DeploymentOrchestrator::new(&ledger, &artifacts)
                .with_step_timeout(config.step_timeout());

            match orchestrator.execute(&plan).await {
                Ok(record) => {
                    println!("{}", ReportFormatter::format(&record, (*format).into())?);
                    if let Some(output_path) = output {
                        ReportFormatter::save_to_file(&record, output_path, (*format).into())
                            .context("Failed to save report")?;
                        println!("Report saved to {:?}", output_path);
                    }
                }
                Err(error) => {
                    eprintln!("{}", ReportFormatter::failure(&error, (*format).into())?);
                    process::exit(1);
                }
            }
        }
        Commands::Plan { source } => {
            let config = load_config(&cli)?;
            let plan = source.resolve(&config)?;
            let artifacts = load_artifacts(&config)?;
            let ledger = connect(&config).await?;

            let preview = DeploymentOrchestrator::new(&ledger, &artifacts)
                .preview(&plan)
                .await?;
            print!("{}", ReportFormatter::preview(&preview));
        }
        Commands::Predict { account, offset } => {
            let config = load_config(&cli)?;

            let prediction = match account {
                Some(account) => {
                    // No key needed to predict for someone else.
                    let rpc_url = config.resolve_rpc_url(&NetworkRegistry::new())?;
                    let provider = Provider::<Http>::try_from(rpc_url.as_str())?;
                    let nonce = provider
                        .get_transaction_count(*account, Some(BlockNumber::Pending.into()))
                        .await
                        .context("Failed to read transaction count")?;
                    NonceSnapshot {
                        account: *account,
                        nonce,
                    }
                    .predict(*offset)?
                }
                None => {
                    let ledger = connect(&config).await?;
                    AddressPredictor::new(&ledger)
                        .predict(ledger.signer(), *offset)
                        .await?
                }
            };

            println!(
                "{:?} (account {:?}, nonce {})",
                prediction.address, prediction.sender, prediction.nonce
            );
        }
        Commands::Mint {
            contract,
            to,
            token_id,
        } => {
            let config = load_config(&cli)?;
            let price = mint_price(&config.mint_price)?;
            let ledger = connect(&config).await?;
            let recipient = to.unwrap_or_else(|| ledger.signer());

            let receipt = mint(
                &ledger,
                *contract,
                recipient,
                *token_id,
                price,
                config.step_timeout(),
            )
            .await?;
            println!("Minting done => {:?}", receipt.transaction_hash);
        }
        Commands::Config { output } => {
            let config = DeployConfig::default();
            ConfigManager::save_to_file(&config, output)
                .context("Failed to save configuration")?;
            println!("Default configuration saved to {:?}", output);
        }
        Commands::Networks => {
            let registry = NetworkRegistry::new();

            println!("Supported networks:");
            println!("-------------------");
            for network in registry.iter() {
                println!("- {} (Chain ID: {})", network.name, network.chain_id);
                println!("  Currency: {}", network.currency_symbol);
                match &network.rpc_url {
                    Some(url) => println!("  RPC: {}", url),
                    None => println!("  RPC: set DAO_RPC_URL"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u256() {
        assert_eq!(parse_u256("10").unwrap(), U256::from(10));
        assert_eq!(parse_u256("0x10").unwrap(), U256::from(16));
        assert!(parse_u256("ten").is_err());
    }

    #[test]
    fn test_cli_parses_deploy() {
        let cli = Cli::try_parse_from(["dao-deploy", "deploy", "--plan", "auction", "-f", "json"])
            .unwrap();

        match cli.command {
            Commands::Deploy { source, format, .. } => {
                assert!(matches!(source.plan, Some(BuiltinPlan::Auction)));
                assert!(matches!(format, OutputFormat::Json));
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_cli_rejects_both_plan_sources() {
        let result = Cli::try_parse_from([
            "dao-deploy",
            "plan",
            "--plan",
            "dao",
            "--plan-file",
            "plan.json",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_plan_source_defaults_to_dao() {
        let source = PlanSource {
            plan: None,
            plan_file: None,
        };

        let plan = source.resolve(&DeployConfig::default()).unwrap();
        assert_eq!(plan.name, "dao");
    }
}
