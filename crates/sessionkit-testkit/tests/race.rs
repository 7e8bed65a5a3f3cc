//! Concurrent use of one delegation, and independence of distinct ones.

use std::sync::Arc;
use std::time::Duration;

use sessionkit::chain::SigningBackend;
use sessionkit::{ActivationState, PrepareOutcome, SessionError, SessionKit, UsageMode};
use sessionkit_core::{OperationId, SmartAccountHandle};
use sessionkit_store::{CredentialStore, MemoryStore};
use sessionkit_testkit::fixtures::{action_ax, action_by, TestFixture};

type Kit = SessionKit<sessionkit::chain::MemoryChain, MemoryStore>;

/// Build a context, submit a first activation and wait for it.
async fn activate(kit: &Kit, account: SmartAccountHandle) -> Result<OperationId, SessionError> {
    let context = kit.build_context(&account).await?;
    let op = kit
        .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
        .await?;
    let receipt = kit.wait_for_receipt(&context, &op, None).await?;
    assert!(receipt.is_confirmed());
    Ok(op)
}

#[tokio::test]
async fn concurrent_first_activations_settle_once() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, grant) = fixture.granted_two().await?;
    // Keep both submissions in flight at the same time.
    fixture.chain.set_inclusion_delay(3);

    let (first, second) = tokio::join!(
        activate(&fixture.kit, account),
        activate(&fixture.kit, account)
    );
    let (first, second) = (first?, second?);
    assert_ne!(first, second);

    // Exactly one submission moved the state; the other was informational.
    match fixture.kit.activation_state(&account).await? {
        ActivationState::Activated {
            operation: Some(op),
        } => assert!(op == first || op == second),
        other => panic!("unexpected state {:?}", other),
    }

    let redeemer = fixture.kit.session_address(&account).await?.unwrap();
    assert!(fixture.store.is_activated(&account, &redeemer, &grant.id()?).await?);
    assert!(fixture.kit.engine().pending_operations().is_empty());

    // Subsequent use works after the race.
    let context = fixture.kit.build_context(&account).await?;
    let op = fixture
        .kit
        .use_permission(&context, UsageMode::SubsequentUse, vec![action_by()])
        .await?;
    assert!(fixture.kit.wait_for_receipt(&context, &op, None).await?.is_confirmed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_delegations_run_in_parallel() -> anyhow::Result<()> {
    let fixtures: Vec<Arc<TestFixture>> = (0..4).map(|_| Arc::new(TestFixture::new())).collect();

    let mut handles = Vec::new();
    for fixture in &fixtures {
        let fixture = fixture.clone();
        handles.push(tokio::spawn(async move {
            let (account, _grant) = fixture.granted_two().await?;
            activate(&fixture.kit, account).await?;
            Ok::<_, SessionError>(account)
        }));
    }

    for (fixture, handle) in fixtures.iter().zip(handles) {
        let account = handle.await??;
        assert!(fixture.kit.activation_state(&account).await?.is_activated());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_only_the_wait() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let (account, _grant) = fixture.granted_two().await?;
    let context = fixture.kit.build_context(&account).await?;
    fixture.chain.set_inclusion_delay(10_000);

    let op = fixture
        .kit
        .use_permission(&context, UsageMode::FirstActivation, vec![action_ax()])
        .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(50);
    let err = fixture
        .kit
        .wait_for_receipt(&context, &op, Some(deadline))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::WaitElapsed { operation, .. } if operation == op));
    assert!(err.is_retryable_wait());

    // Unknown-pending: the submission stands and nothing was resubmitted.
    assert!(matches!(
        fixture.kit.activation_state(&account).await?,
        ActivationState::ActivationPending { .. }
    ));
    assert_eq!(fixture.kit.engine().pending_operations(), vec![op]);

    // Waiting again, without a deadline, settles it.
    let receipt = fixture.kit.wait_for_receipt(&context, &op, None).await?;
    assert!(receipt.is_confirmed());
    assert!(fixture.kit.activation_state(&account).await?.is_activated());
    Ok(())
}

#[tokio::test]
async fn prepare_waits_are_independent_of_deadlines() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let account = fixture
        .kit
        .resolve_account(fixture.owner.address())
        .await?
        .handle;
    fixture.chain.set_inclusion_delay(2);

    let PrepareOutcome::Submitted(op) = fixture.kit.prepare(&fixture.owner, &account).await? else {
        anyhow::bail!("expected a submission");
    };
    // The deadline is already past: the wait ends, the operation does not.
    let past = tokio::time::Instant::now();
    let err = fixture
        .kit
        .wait_for_prepare(&account, &op, Some(past))
        .await
        .unwrap_err();
    assert!(err.is_retryable_wait());

    assert!(fixture.kit.wait_for_prepare(&account, &op, None).await?.is_confirmed());
    assert_eq!(
        fixture.kit.prepare(&fixture.owner, &account).await?,
        PrepareOutcome::AlreadyInstalled
    );
    Ok(())
}
