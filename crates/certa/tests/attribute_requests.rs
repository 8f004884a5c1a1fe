//! End-to-end attribute request scenarios over the in-memory network.

use certa::ledger::{ChangeDescriptor, LedgerClient};
use certa::{ClientError, GrantOutcome, RejectReason, RequestStatus};
use certa_testkit::{attrs, init_tracing, TestNetwork};

#[tokio::test]
async fn test_rerequest_is_idempotent() {
    init_tracing();
    let network = TestNetwork::new();
    let registry = network.client("registry", 0xaa).await;
    let alice = network.client("alice", 1).await;
    registry.setup_authority(&attrs(&["member", "staff"])).await.unwrap();

    let first = alice
        .request_attributes(&registry.address(), &attrs(&["member", "staff"]))
        .await
        .unwrap();
    assert_eq!(first.submitted, attrs(&["member", "staff"]));

    let second = alice
        .request_attributes(&registry.address(), &attrs(&["staff", "member"]))
        .await
        .unwrap();
    assert!(second.submitted.is_empty());
    assert!(!second.was_submitted());
    assert_eq!(second.already_asked, attrs(&["staff", "member"]));

    let inbox = network
        .ledger
        .sync_pending_attribute_requests(&registry.address())
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].requests.len(), 1);
}

#[tokio::test]
async fn test_missing_secret_key_rejects_whole_request() {
    init_tracing();
    let network = TestNetwork::new();
    let authority = network.client("dmv", 0xaa).await;
    let alice = network.client("alice", 1).await;
    authority.setup_authority(&attrs(&["age>18"])).await.unwrap();

    alice
        .request_attributes(&authority.address(), &attrs(&["age>18", "citizen=US"]))
        .await
        .unwrap();
    let outcome = authority.grant_or_reject(alice.identity(), 0).await.unwrap();
    assert_eq!(
        outcome,
        GrantOutcome::Rejected {
            reason: RejectReason::MissingAuthorityKey(attrs(&["citizen=US"])[0].clone()),
            change: ChangeDescriptor::NoSwap,
        }
    );

    let bundle = authority
        .keystore()
        .load_dispatch(&authority.address(), &alice.address())
        .await
        .unwrap();
    assert!(bundle.is_empty());
    assert_eq!(authority.send_attributes(&alice.address()).await.unwrap(), 0);
    assert_eq!(alice.receive_personal_keys().await.unwrap(), 0);

    let updates = network.ledger.status_updates().await;
    assert_eq!(
        updates,
        vec![(authority.address(), alice.address(), RequestStatus::Rejected)]
    );

    let rejected = alice.request_history(RequestStatus::Rejected).await.unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].attributes, attrs(&["age>18", "citizen=US"]));
}

#[tokio::test]
async fn test_owned_attribute_not_resubmitted() {
    init_tracing();
    let network = TestNetwork::new();
    let authority = network.client("dmv", 0xaa).await;
    let alice = network.client("alice", 1).await;
    authority
        .setup_authority(&attrs(&["age>18", "citizen=US"]))
        .await
        .unwrap();

    alice
        .request_attributes(&authority.address(), &attrs(&["age>18"]))
        .await
        .unwrap();
    authority.grant_or_reject(alice.identity(), 0).await.unwrap();
    authority.send_attributes(&alice.address()).await.unwrap();
    assert_eq!(alice.receive_personal_keys().await.unwrap(), 1);

    let set = alice
        .request_attributes(&authority.address(), &attrs(&["age>18", "citizen=US"]))
        .await
        .unwrap();
    assert_eq!(set.already_owned, attrs(&["age>18"]));
    assert_eq!(set.submitted, attrs(&["citizen=US"]));

    let inbox = authority.pending_requests(RequestStatus::Pending).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].attributes, attrs(&["citizen=US"]));
}

#[tokio::test]
async fn test_double_grant_issues_one_key_per_attribute() {
    init_tracing();
    let network = TestNetwork::new();
    let registry = network.client("registry", 0xaa).await;
    let alice = network.client("alice", 1).await;
    registry.setup_authority(&attrs(&["member"])).await.unwrap();

    alice
        .request_attributes(&registry.address(), &attrs(&["member"]))
        .await
        .unwrap();
    let first = registry.grant_or_reject(alice.identity(), 0).await.unwrap();
    assert!(matches!(&first, GrantOutcome::Granted { issued, .. } if issued.len() == 1));

    // Keys not received yet and the old request is resolved, so the same
    // attribute can be asked for again.
    let again = alice
        .request_attributes(&registry.address(), &attrs(&["member"]))
        .await
        .unwrap();
    assert!(again.was_submitted());
    let second = registry.grant_or_reject(alice.identity(), 0).await.unwrap();
    match second {
        GrantOutcome::Granted { issued, skipped, .. } => {
            assert!(issued.is_empty());
            assert_eq!(skipped, attrs(&["member"]));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(registry.send_attributes(&alice.address()).await.unwrap(), 1);
    assert_eq!(alice.receive_personal_keys().await.unwrap(), 1);
    assert_eq!(alice.receive_personal_keys().await.unwrap(), 0);
    assert_eq!(alice.personal_keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_processed_request_cannot_be_resolved_again() {
    let network = TestNetwork::new();
    let registry = network.client("registry", 0xaa).await;
    let alice = network.client("alice", 1).await;
    registry.setup_authority(&attrs(&["member"])).await.unwrap();

    alice
        .request_attributes(&registry.address(), &attrs(&["member"]))
        .await
        .unwrap();
    registry.grant_or_reject(alice.identity(), 0).await.unwrap();

    let err = registry.grant_or_reject(alice.identity(), 0).await.unwrap_err();
    assert!(matches!(err, ClientError::RequestNotFound { .. }));
    assert_eq!(network.ledger.status_updates().await.len(), 1);
}

#[tokio::test]
async fn test_cached_inbox_follows_swaps_across_requesters() {
    let network = TestNetwork::new();
    let registry = network.client("registry", 0xaa).await;
    let alice = network.client("alice", 1).await;
    let bob = network.client("bob", 2).await;
    registry
        .setup_authority(&attrs(&["a", "b", "c"]))
        .await
        .unwrap();

    alice.request_attributes(&registry.address(), &attrs(&["a"])).await.unwrap();
    alice.request_attributes(&registry.address(), &attrs(&["b"])).await.unwrap();
    bob.request_attributes(&registry.address(), &attrs(&["c"])).await.unwrap();

    // Alice's first request goes; her second moves into slot 0.
    let outcome = registry.grant_or_reject(alice.identity(), 0).await.unwrap();
    assert_eq!(
        outcome.change(),
        ChangeDescriptor::RequestSwap {
            requester: alice.address(),
            from: 1,
            to: 0
        }
    );

    // Alice's last request goes; bob's slot moves into hers.
    let outcome = registry.grant_or_reject(alice.identity(), 0).await.unwrap();
    assert_eq!(
        outcome.change(),
        ChangeDescriptor::RequesterSwap {
            requester: bob.address(),
            from: 1,
            to: 0
        }
    );

    let cached = registry
        .keystore()
        .load_pending_inbox(&registry.address())
        .await
        .unwrap();
    let truth = network
        .ledger
        .sync_pending_attribute_requests(&registry.address())
        .await
        .unwrap();
    assert_eq!(cached.requesters(), truth.as_slice());
    assert_eq!(cached.requesters()[0].requests[0].requester_index, 0);

    let granted = alice.request_history(RequestStatus::Granted).await.unwrap();
    assert_eq!(granted.len(), 2);
}

#[tokio::test]
async fn test_keys_bound_to_other_identity_ignored() {
    let network = TestNetwork::new();
    let registry = network.client("registry", 0xaa).await;
    let alice = network.client("alice", 1).await;
    let mallory = network.client("mallory", 1).await;
    registry.setup_authority(&attrs(&["member"])).await.unwrap();

    // Same address, different name: keys carry mallory's binding.
    mallory
        .request_attributes(&registry.address(), &attrs(&["member"]))
        .await
        .unwrap();
    registry.grant_or_reject(mallory.identity(), 0).await.unwrap();
    registry.send_attributes(&mallory.address()).await.unwrap();

    assert_eq!(alice.receive_personal_keys().await.unwrap(), 0);
    assert_eq!(mallory.receive_personal_keys().await.unwrap(), 1);
}
