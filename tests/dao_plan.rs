use dao_deploy::plan::{dao_plan, DaoParams};
use dao_deploy::test_utils::{dao_artifacts, deployer, expose_dao_getters, stub_artifact, MockLedger};
use dao_deploy::{Arg, ArtifactStore, DeploymentOrchestrator, DeploymentPlan, Error};
use ethers::types::{Address, U256};

#[tokio::test]
async fn circular_dao_is_wired_in_one_pass() {
    let params = DaoParams::default();
    let ledger = MockLedger::new(deployer()).with_nonce(5);
    let artifacts = dao_artifacts(&params);
    expose_dao_getters(&ledger, &artifacts, &params);

    let record = DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&dao_plan(&params))
        .await
        .unwrap();

    let nft = record.address_of("nft").unwrap();
    let timelock = record.address_of("timelock").unwrap();
    let governor = record.address_of("governor").unwrap();

    // nft(minter, timelock, dev)
    assert_eq!(ledger.constructor_address(nft, 0), Some(deployer()));
    assert_eq!(ledger.constructor_address(nft, 1), Some(timelock));
    assert_eq!(ledger.constructor_address(nft, 2), Some(deployer()));
    // timelock(admin, delay)
    assert_eq!(ledger.constructor_address(timelock, 0), Some(governor));
    // governor(token, timelock, ...)
    assert_eq!(ledger.constructor_address(governor, 0), Some(nft));
    assert_eq!(ledger.constructor_address(governor, 1), Some(timelock));

    assert!(record.mispredicted().is_empty());
    assert_eq!(record.transactions_sent(), 3);
    assert_eq!(ledger.nonce_of(deployer()), U256::from(8));
}

#[tokio::test]
async fn predictions_follow_plan_positions() {
    let params = DaoParams::default();
    let ledger = MockLedger::new(deployer()).with_nonce(5);
    let artifacts = dao_artifacts(&params);

    let preview = DeploymentOrchestrator::new(&ledger, &artifacts)
        .preview(&dao_plan(&params))
        .await
        .unwrap();

    let predictions = preview.predictions();
    assert_eq!(predictions["nft"].nonce, U256::from(5));
    assert_eq!(predictions["timelock"].nonce, U256::from(6));
    assert_eq!(predictions["governor"].nonce, U256::from(7));
    assert_eq!(preview.steps.len(), 3);
    assert_eq!(preview.steps[2].index, 3);
    assert!(preview.steps[0].args[1].contains("(predicted timelock)"));
    assert!(ledger.sent().is_empty());
}

#[tokio::test]
async fn nft_built_with_predicted_timelock() {
    let mut artifacts = ArtifactStore::new();
    artifacts.insert(stub_artifact("NFT", "address,address", &[]));
    artifacts.insert(stub_artifact("Timelock", "address,uint256", &[]));
    let plan = DeploymentPlan::new("pair")
        .deploy("nft", "NFT", vec![Arg::Signer, Arg::predicted("timelock")])
        .deploy("timelock", "Timelock", vec![Arg::Signer, Arg::uint(2)]);

    let ledger = MockLedger::new(deployer());
    let record = DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&plan)
        .await
        .unwrap();

    let nft = record.address_of("nft").unwrap();
    let timelock = record.address_of("timelock").unwrap();
    assert_eq!(ledger.constructor_address(nft, 1), Some(timelock));
    assert_eq!(record.predictions["timelock"].address, timelock);
    assert_eq!(record.contracts[0].constructor_args[1], format!("{:?}", timelock));
}

#[tokio::test]
async fn explicit_dev_address_is_used() {
    let dev = Address::from_low_u64_be(0xdef);
    let params = DaoParams {
        dev_address: Some(dev),
        verify_peers: false,
        ..Default::default()
    };
    let ledger = MockLedger::new(deployer());
    let artifacts = dao_artifacts(&params);

    let record = DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&dao_plan(&params))
        .await
        .unwrap();

    let nft = record.address_of("nft").unwrap();
    assert_eq!(ledger.constructor_address(nft, 2), Some(dev));
}

#[tokio::test]
async fn missing_getter_fails_peer_check_with_record() {
    let params = DaoParams::default();
    let ledger = MockLedger::new(deployer());
    let artifacts = dao_artifacts(&params);
    // getters not exposed: every eth_call reverts

    let err = DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&dao_plan(&params))
        .await
        .unwrap_err();

    match &err {
        Error::PeerCheck {
            contract, getter, ..
        } => {
            assert_eq!(contract, "governor");
            assert_eq!(getter, "token");
        }
        other => panic!("expected PeerCheck, got {:?}", other),
    }
    assert_eq!(err.partial_record().unwrap().contracts.len(), 3);
}

#[tokio::test]
async fn wrong_peer_on_chain_is_a_stale_prediction() {
    let params = DaoParams::default();
    let ledger = MockLedger::new(deployer());
    let artifacts = dao_artifacts(&params);
    expose_dao_getters(&ledger, &artifacts, &params);
    // admin() now answers with the delay word instead of the governor
    let executor = artifacts.get(&params.executor_artifact).unwrap();
    ledger.expose_getter(executor, "admin", 1);

    let err = DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&dao_plan(&params))
        .await
        .unwrap_err();

    match &err {
        Error::StalePrediction {
            contract,
            target,
            predicted,
            realized,
            ..
        } => {
            assert_eq!(contract, "timelock");
            assert_eq!(target, "governor");
            assert_eq!(*predicted, Address::from_low_u64_be(params.timelock_delay));
            assert_eq!(Some(*realized), err.partial_record().unwrap().address_of("governor"));
        }
        other => panic!("expected StalePrediction, got {:?}", other),
    }
}

async fn corrupted_getter(artifact: &str, getter: &str, word: usize) -> Error {
    let params = DaoParams::default();
    let ledger = MockLedger::new(deployer());
    let artifacts = dao_artifacts(&params);
    expose_dao_getters(&ledger, &artifacts, &params);
    ledger.expose_getter(artifacts.get(artifact).unwrap(), getter, word);

    DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&dao_plan(&params))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn every_peer_reference_is_read_back() {
    let params = DaoParams::default();
    // (artifact, getter, wrong constructor word, contract, expected peer)
    let cases = [
        (&params.governor_artifact, "token", 1, "governor", "nft"),
        (&params.governor_artifact, "timelock", 0, "governor", "timelock"),
        (&params.executor_artifact, "admin", 1, "timelock", "governor"),
        (&params.nft_artifact, "timelock", 0, "nft", "timelock"),
    ];

    for (artifact, getter, word, expected_contract, expected_target) in cases {
        match corrupted_getter(artifact, getter, word).await {
            Error::StalePrediction {
                contract,
                reference,
                target,
                ..
            } => {
                assert_eq!(contract, expected_contract);
                assert_eq!(reference, format!("{}()", getter));
                assert_eq!(target, expected_target);
            }
            other => panic!("{}.{}(): expected StalePrediction, got {:?}", artifact, getter, other),
        }
    }
}

#[tokio::test]
async fn nft_getter_can_be_skipped() {
    let params = DaoParams {
        nft_timelock_getter: None,
        ..Default::default()
    };
    let ledger = MockLedger::new(deployer());
    let artifacts = dao_artifacts(&params);
    expose_dao_getters(&ledger, &artifacts, &params);

    let record = DeploymentOrchestrator::new(&ledger, &artifacts)
        .execute(&dao_plan(&params))
        .await
        .unwrap();

    assert_eq!(record.contracts.len(), 3);
}
