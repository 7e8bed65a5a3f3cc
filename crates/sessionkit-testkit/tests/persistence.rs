//! Grant persistence is lossless, and activation survives a restart.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;

use sessionkit::chain::{LocalSigner, MemoryChain};
use sessionkit::{ActivationState, UsageMode};
use sessionkit_core::{ChainId, PermissionGrant};
use sessionkit_store::{CredentialStore, MemoryStore, SealingKey, SqliteStore};
use sessionkit_testkit::fixtures::{action_ax, action_by, TestFixture};
use sessionkit_testkit::generators::{grant_from_params, GrantParams};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn round_trip<S: CredentialStore>(store: &S, grant: &PermissionGrant) -> PermissionGrant {
    store.persist_grant(grant.account(), grant).await.unwrap();
    store.load_grant(grant.account()).await.unwrap().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn grant_round_trips_through_memory_store(params: GrantParams) {
        let grant = grant_from_params(&params);
        let loaded = runtime().block_on(round_trip(&MemoryStore::new(), &grant));

        prop_assert_eq!(&loaded, &grant);
        prop_assert_eq!(loaded.account().chain_id, params.account.chain_id);
        prop_assert_eq!(loaded.fee().chain_id, params.fee.chain_id);
        prop_assert!(loaded.verify().is_ok());
    }

    #[test]
    fn grant_round_trips_through_sqlite_store(params: GrantParams) {
        let grant = grant_from_params(&params);
        let store = SqliteStore::open_memory(SealingKey::generate()).unwrap();
        let loaded = runtime().block_on(round_trip(&store, &grant));

        prop_assert_eq!(&loaded, &grant);
        prop_assert_eq!(loaded.id().unwrap(), grant.id().unwrap());
        for (a, b) in loaded.policies().iter().zip(grant.policies()) {
            prop_assert_eq!(a.chain_id, b.chain_id);
        }
    }

    #[test]
    fn grant_round_trips_through_json(params: GrantParams) {
        let grant = grant_from_params(&params);
        let json = grant.to_json().unwrap();
        let loaded = PermissionGrant::from_json(&json).unwrap();

        prop_assert_eq!(&loaded, &grant);
        prop_assert!(loaded.verify().is_ok());
    }
}

#[test]
fn large_chain_id_is_a_string_in_json() {
    let chain_id = ChainId::new((1u64 << 53) + 1);
    let json = serde_json::to_string(&chain_id).unwrap();
    assert_eq!(json, "\"9007199254740993\"");

    let parsed: ChainId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, chain_id);
}

#[tokio::test]
async fn activation_survives_restart() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sessions.db");
    let sealing = [0x5a; 32];
    let chain = Arc::new(MemoryChain::new(ChainId::BASE));

    let (account, owner_secret) = {
        let store = Arc::new(SqliteStore::open(&path, SealingKey::from_bytes(sealing))?);
        let fixture = TestFixture::with_parts(
            chain.clone(),
            store,
            LocalSigner::from_secret_bytes(&[0x11; 32])?,
        );
        let (account, _grant) = fixture.granted_two().await?;
        let context = fixture.kit.build_context(&account).await?;
        let op = fixture
            .kit
            .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
            .await?;
        assert!(fixture.kit.wait_for_receipt(&context, &op, None).await?.is_confirmed());
        (account, [0x11; 32])
    };

    // A new process: fresh kit and tracker, same database and chain.
    let store = Arc::new(SqliteStore::open(&path, SealingKey::from_bytes(sealing))?);
    let fixture = TestFixture::with_parts(
        chain.clone(),
        store,
        LocalSigner::from_secret_bytes(&owner_secret)?,
    );
    assert_eq!(fixture.account(), account);
    assert!(matches!(
        fixture.kit.activation_state(&account).await?,
        ActivationState::Activated { operation: None }
    ));

    // The session acts without the owner and without re-activating.
    let submitted = chain.submitted_operations();
    let context = fixture.kit.build_context(&account).await?;
    let op = fixture
        .kit
        .use_permission(&context, UsageMode::SubsequentUse, vec![action_by()])
        .await?;
    assert!(fixture.kit.wait_for_receipt(&context, &op, None).await?.is_confirmed());
    assert_eq!(chain.submitted_operations(), submitted + 1);
    assert_eq!(chain.executed_calls(&account), vec![action_ax(), action_by()]);
    Ok(())
}

#[tokio::test]
async fn wrong_sealing_key_cannot_build_context() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sessions.db");
    let chain = Arc::new(MemoryChain::new(ChainId::BASE));

    let account = {
        let store = Arc::new(SqliteStore::open(&path, SealingKey::from_bytes([0x01; 32]))?);
        let fixture = TestFixture::with_parts(chain.clone(), store, LocalSigner::generate());
        fixture.granted_two().await?.0
    };

    let store = Arc::new(SqliteStore::open(&path, SealingKey::from_bytes([0x02; 32]))?);
    let fixture = TestFixture::with_parts(chain, store, LocalSigner::generate());
    let err = fixture.kit.build_context(&account).await.unwrap_err();
    assert!(matches!(err, sessionkit::SessionError::Store { .. }));
    Ok(())
}
