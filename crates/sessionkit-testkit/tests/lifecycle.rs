//! End-to-end delegation lifecycle against the in-memory chain.

use sessionkit::chain::{ChainError, SigningBackend};
use sessionkit::perms::PermsError;
use sessionkit::{ActivationState, Missing, Phase, PrepareOutcome, SessionError, UsageMode};
use sessionkit_store::CredentialStore;
use sessionkit_testkit::fixtures::{
    action_ax, action_by, action_unlisted, policy_ax, policy_by, TestFixture, TARGET_B,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sessionkit=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn prepare_grant_activate_then_use() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new();
    let kit = &fixture.kit;

    // Prepare on an undeployed account submits and confirms.
    let account = kit.resolve_account(fixture.owner.address()).await?.handle;
    let PrepareOutcome::Submitted(op) = kit.prepare(&fixture.owner, &account).await? else {
        anyhow::bail!("prepare should submit for a fresh account");
    };
    assert!(kit.wait_for_prepare(&account, &op, None).await?.is_confirmed());

    // Grant A/x and B/y.
    kit.provision_credential(&account).await?;
    let grant = kit
        .grant(&fixture.owner, &account, vec![policy_ax(), policy_by()])
        .await?;
    assert_eq!(grant.policies().len(), 2);
    assert_eq!(kit.activation_state(&account).await?, ActivationState::Granted);

    // First activation with A/x.
    let context = kit.build_context(&account).await?;
    let op = kit
        .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
        .await?;
    let receipt = kit.wait_for_receipt(&context, &op, None).await?;
    assert!(receipt.is_confirmed());
    assert!(matches!(
        kit.activation_state(&account).await?,
        ActivationState::Activated { operation: Some(id) } if id == op
    ));
    assert!(fixture.chain.is_grant_enabled(&account, &grant.id()?));

    // Subsequent use with B/y.
    let op = kit
        .use_permission(&context, UsageMode::SubsequentUse, vec![action_by()])
        .await?;
    assert!(kit.wait_for_receipt(&context, &op, None).await?.is_confirmed());

    let executed = fixture.chain.executed_calls(&account);
    assert_eq!(executed, vec![action_ax(), action_by()]);
    Ok(())
}

#[tokio::test]
async fn subsequent_use_without_activation_is_not_activated() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, _grant) = fixture.granted_two().await?;
    let context = fixture.kit.build_context(&account).await?;
    let submitted = fixture.chain.submitted_operations();

    let err = fixture
        .kit
        .use_permission(&context, UsageMode::SubsequentUse, vec![action_ax()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::PermissionNotActivated {
            phase: Phase::Use,
            ..
        }
    ));
    assert_eq!(fixture.chain.submitted_operations(), submitted);
    assert_eq!(
        fixture.kit.activation_state(&account).await?,
        ActivationState::Granted
    );
    Ok(())
}

#[tokio::test]
async fn chain_rejection_of_unactivated_use_is_not_activated() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, grant) = fixture.granted_two().await?;
    let context = fixture.kit.build_context(&account).await?;

    // Local bookkeeping claims activation; the chain disagrees.
    fixture
        .store
        .mark_activated(&account, &context.redeemer(), &grant.id()?)
        .await?;

    let err = fixture
        .kit
        .use_permission(&context, UsageMode::SubsequentUse, vec![action_ax()])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::PermissionNotActivated { .. }));
    assert!(fixture.chain.executed_calls(&account).is_empty());
    Ok(())
}

#[tokio::test]
async fn unlisted_target_rejected_before_any_network_call() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, _grant) = fixture.granted_two().await?;
    let context = fixture.kit.build_context(&account).await?;
    let calls = fixture.chain.network_calls();

    for mode in [UsageMode::FirstActivation, UsageMode::SubsequentUse] {
        let err = fixture
            .kit
            .use_permission(&context, mode, vec![action_unlisted()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::ActionNotAuthorized {
                source: PermsError::ActionNotAuthorized { index: 0, .. },
                ..
            }
        ));
    }

    assert_eq!(fixture.chain.network_calls(), calls);
    assert_eq!(
        fixture.kit.activation_state(&account).await?,
        ActivationState::Granted
    );
    Ok(())
}

#[tokio::test]
async fn prepare_twice_is_a_noop() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let account = fixture.prepared().await?;
    let submitted = fixture.chain.submitted_operations();

    let outcome = fixture.kit.prepare(&fixture.owner, &account).await?;
    assert_eq!(outcome, PrepareOutcome::AlreadyInstalled);
    assert_eq!(fixture.chain.submitted_operations(), submitted);
    Ok(())
}

#[tokio::test]
async fn failed_batch_reports_failing_call() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, _grant) = fixture.granted_two().await?;
    let context = fixture.kit.build_context(&account).await?;
    fixture.chain.fail_calls_to(TARGET_B);

    let op = fixture
        .kit
        .use_permission(
            &context,
            UsageMode::FirstActivation,
            vec![action_ax(), action_by()],
        )
        .await?;
    let receipt = fixture.kit.wait_for_receipt(&context, &op, None).await?;
    assert!(!receipt.is_confirmed());
    assert_eq!(receipt.failed_call(), Some(1));

    // The batch reverted, so the grant was not registered.
    assert!(matches!(
        fixture.kit.activation_state(&account).await?,
        ActivationState::ActivationRejected { .. }
    ));
    assert!(fixture.chain.executed_calls(&account).is_empty());

    // A new first activation is the way back.
    let op = fixture
        .kit
        .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
        .await?;
    assert!(fixture.kit.wait_for_receipt(&context, &op, None).await?.is_confirmed());
    assert!(fixture.kit.activation_state(&account).await?.is_activated());
    Ok(())
}

#[tokio::test]
async fn submission_offline_is_transient_and_not_a_wait_retry() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, _grant) = fixture.granted_two().await?;
    let context = fixture.kit.build_context(&account).await?;
    fixture.chain.set_offline(true);

    let err = fixture
        .kit
        .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::TransientNetworkFailure {
            phase: Phase::Use,
            source: ChainError::Transport(_),
            ..
        }
    ));
    assert!(!err.is_retryable_wait());
    Ok(())
}

#[tokio::test]
async fn nothing_granted_before_prepare() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let account = fixture.chain.deploy_account(&fixture.owner.address());
    fixture.kit.provision_credential(&account).await?;

    // Grant cannot be issued before prepare.
    let err = fixture
        .kit
        .grant(&fixture.owner, &account, vec![policy_ax()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::PreconditionViolation {
            phase: Phase::Grant,
            ..
        }
    ));

    // A context still builds: the account is deployed.
    let context = fixture.kit.build_context(&account).await?;
    let err = fixture
        .kit
        .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotFound {
            missing: Missing::Grant,
            ..
        }
    ));
    Ok(())
}
