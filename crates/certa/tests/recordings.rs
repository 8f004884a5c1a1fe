//! Recording encryption and distribution between participants.

use certa::core::ContentDigest;
use certa::perms::PermsError;
use certa::{ClientError, RecordingState};
use certa_testkit::{attrs, init_tracing, TestClient, TestNetwork};

const NOTES: &[u8] = b"patient presented with mild symptoms; follow up in two weeks";

async fn grant(authority: &TestClient, user: &TestClient, names: &[&str]) {
    user.request_attributes(&authority.address(), &attrs(names))
        .await
        .unwrap();
    let pending = authority
        .pending_requests(certa::RequestStatus::Pending)
        .await
        .unwrap();
    let request = pending
        .iter()
        .find(|r| r.requester == user.address())
        .unwrap();
    authority
        .grant_or_reject(user.identity(), request.request_index)
        .await
        .unwrap();
    authority.send_attributes(&user.address()).await.unwrap();
    user.receive_personal_keys().await.unwrap();
}

#[tokio::test]
async fn test_owner_roundtrip_restores_identical_bytes() {
    init_tracing();
    let network = TestNetwork::new();
    let hospital = network.client("hospital", 0xaa).await;
    hospital.setup_authority(&attrs(&["doctor"])).await.unwrap();
    hospital.publish_authority_keys().await.unwrap();
    grant(&hospital, &hospital, &["doctor"]).await;

    let path = hospital.write_file("visit.txt", NOTES);
    let before = ContentDigest::digest_file(&path).unwrap();

    let recording = hospital
        .encrypt("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();
    assert_eq!(recording.state, RecordingState::Encrypted);
    assert_eq!(recording.plaintext_hash, Some(before));

    std::fs::remove_file(&path).unwrap();
    let recording = hospital
        .decrypt(&hospital.address(), "visit.txt")
        .await
        .unwrap();
    assert_eq!(recording.state, RecordingState::Decrypted);
    assert!(!recording.file_changed);
    assert_eq!(hospital.read_file(&hospital.address(), "visit.txt"), NOTES);
    assert_eq!(ContentDigest::digest_file(&path).unwrap(), before);
}

#[tokio::test]
async fn test_published_recording_reaches_satisfying_reader() {
    init_tracing();
    let network = TestNetwork::new();
    let hospital = network.client("hospital", 0xaa).await;
    let registry = network.client("registry", 0xbb).await;
    let owner = network.client("owner", 1).await;
    let doctor = network.client("doctor", 2).await;

    hospital.setup_authority(&attrs(&["doctor"])).await.unwrap();
    hospital.publish_authority_keys().await.unwrap();
    registry.setup_authority(&attrs(&["licensed"])).await.unwrap();
    registry.publish_authority_keys().await.unwrap();
    grant(&hospital, &doctor, &["doctor"]).await;
    grant(&registry, &doctor, &["licensed"]).await;

    owner
        .fetch_public_keys(&hospital.address(), &[])
        .await
        .unwrap();
    owner
        .fetch_public_keys(&registry.address(), &[])
        .await
        .unwrap();
    owner.write_file("scan.txt", NOTES);
    let published = owner
        .publish(
            "scan.txt",
            "doctor and licensed",
            &[hospital.address(), registry.address()],
        )
        .await
        .unwrap();
    assert_eq!(published.state, RecordingState::Distributed);
    assert!(published.ledger_index.is_some());
    assert!(!published.ciphertext_changed);

    let report = doctor
        .fetch(
            &owner.address(),
            &["scan.txt".to_string(), "missing.txt".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(report.fetched, vec!["scan.txt".to_string()]);
    assert_eq!(report.missing, vec!["missing.txt".to_string()]);

    doctor.decrypt(&owner.address(), "scan.txt").await.unwrap();
    assert_eq!(doctor.read_file(&owner.address(), "scan.txt"), NOTES);
}

#[tokio::test]
async fn test_same_attribute_name_scoped_to_its_authority() {
    init_tracing();
    let network = TestNetwork::new();
    let clinic = network.client("clinic", 0xaa).await;
    let hospital = network.client("hospital", 0xbb).await;
    let owner = network.client("owner", 1).await;
    let alice = network.client("alice", 2).await;
    let bob = network.client("bob", 3).await;

    for authority in [&clinic, &hospital] {
        authority.setup_authority(&attrs(&["doctor"])).await.unwrap();
        authority.publish_authority_keys().await.unwrap();
    }
    grant(&clinic, &alice, &["doctor"]).await;
    grant(&clinic, &bob, &["doctor"]).await;

    // Holding the clinic's doctor says nothing about the hospital's.
    let set = alice
        .request_attributes(&hospital.address(), &attrs(&["doctor"]))
        .await
        .unwrap();
    assert_eq!(set.submitted, attrs(&["doctor"]));
    assert!(set.already_owned.is_empty());
    grant(&hospital, &alice, &["doctor"]).await;
    assert_eq!(alice.personal_keys().await.unwrap().len(), 2);

    owner.fetch_public_keys(&clinic.address(), &[]).await.unwrap();
    owner.fetch_public_keys(&hospital.address(), &[]).await.unwrap();
    owner.write_file("chart.txt", NOTES);

    let err = owner
        .encrypt("chart.txt", "doctor", &[clinic.address(), hospital.address()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Perms(PermsError::AmbiguousAttribute { .. })
    ));
    assert!(!owner.path_of(&owner.address(), "chart.txt.enc").exists());

    owner
        .publish("chart.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();

    alice
        .fetch(&owner.address(), &["chart.txt".to_string()])
        .await
        .unwrap();
    alice.decrypt(&owner.address(), "chart.txt").await.unwrap();
    assert_eq!(alice.read_file(&owner.address(), "chart.txt"), NOTES);

    bob.fetch(&owner.address(), &["chart.txt".to_string()])
        .await
        .unwrap();
    let err = bob.decrypt(&owner.address(), "chart.txt").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Perms(PermsError::PolicyNotSatisfied)
    ));
}

#[tokio::test]
async fn test_unsatisfied_policy_leaves_plaintext_untouched() {
    init_tracing();
    let network = TestNetwork::new();
    let hospital = network.client("hospital", 0xaa).await;
    let owner = network.client("owner", 1).await;
    let nurse = network.client("nurse", 2).await;

    hospital
        .setup_authority(&attrs(&["doctor", "nurse"]))
        .await
        .unwrap();
    hospital.publish_authority_keys().await.unwrap();
    grant(&hospital, &nurse, &["nurse"]).await;

    owner.fetch_public_keys(&hospital.address(), &[]).await.unwrap();
    owner.write_file("visit.txt", NOTES);
    owner
        .publish("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();

    nurse
        .fetch(&owner.address(), &["visit.txt".to_string()])
        .await
        .unwrap();
    let err = nurse
        .decrypt(&owner.address(), "visit.txt")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Perms(PermsError::PolicyNotSatisfied)
    ));
    assert!(!nurse.path_of(&owner.address(), "visit.txt").exists());

    // An existing file is not overwritten either.
    let path = nurse.path_of(&owner.address(), "visit.txt");
    std::fs::write(&path, b"local draft").unwrap();
    assert!(nurse.decrypt(&owner.address(), "visit.txt").await.is_err());
    assert_eq!(std::fs::read(&path).unwrap(), b"local draft");
}

#[tokio::test]
async fn test_missing_public_key_writes_no_ciphertext() {
    let network = TestNetwork::new();
    let hospital = network.client("hospital", 0xaa).await;
    let owner = network.client("owner", 1).await;
    hospital.setup_authority(&attrs(&["doctor"])).await.unwrap();
    hospital.publish_authority_keys().await.unwrap();

    owner.write_file("visit.txt", NOTES);
    let err = owner
        .encrypt("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Perms(PermsError::MissingAuthorityPublicKey(_))
    ));
    assert!(!owner.path_of(&owner.address(), "visit.txt.enc").exists());
}

#[tokio::test]
async fn test_republish_reencrypts_only_after_change() {
    let network = TestNetwork::new();
    let hospital = network.client("hospital", 0xaa).await;
    let owner = network.client("owner", 1).await;
    hospital.setup_authority(&attrs(&["doctor"])).await.unwrap();
    hospital.publish_authority_keys().await.unwrap();
    owner.fetch_public_keys(&hospital.address(), &[]).await.unwrap();

    owner.write_file("visit.txt", NOTES);
    let first = owner
        .publish("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();
    let ciphertext = owner.read_file(&owner.address(), "visit.txt.enc");

    let unchanged = owner
        .publish("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();
    assert_eq!(owner.read_file(&owner.address(), "visit.txt.enc"), ciphertext);
    assert_eq!(unchanged.ledger_index, first.ledger_index);
    assert_eq!(network.blobs.reservations().await, 1);

    owner.write_file("visit.txt", b"amended notes");
    assert!(owner.has_file_changed("visit.txt").await.unwrap());
    owner
        .publish("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();
    assert_ne!(owner.read_file(&owner.address(), "visit.txt.enc"), ciphertext);
    assert_eq!(network.blobs.reservations().await, 2);
    assert!(!owner.has_file_changed("visit.txt").await.unwrap());
}

#[tokio::test]
async fn test_sqlite_client_survives_restart() {
    init_tracing();
    let network = TestNetwork::new();
    let hospital = network.sqlite_client("hospital", 0xaa).await;
    hospital.setup_authority(&attrs(&["doctor"])).await.unwrap();
    hospital.publish_authority_keys().await.unwrap();

    hospital
        .request_attributes(&hospital.address(), &attrs(&["doctor"]))
        .await
        .unwrap();
    hospital.grant_or_reject(hospital.identity(), 0).await.unwrap();
    hospital.send_attributes(&hospital.address()).await.unwrap();
    hospital.receive_personal_keys().await.unwrap();
    hospital.write_file("visit.txt", NOTES);
    hospital
        .encrypt("visit.txt", "doctor", &[hospital.address()])
        .await
        .unwrap();

    let gp = hospital.global_parameters().clone();
    let hospital = network.reopen_sqlite(hospital).await;
    assert_eq!(hospital.global_parameters(), &gp);
    assert_eq!(hospital.personal_keys().await.unwrap().len(), 1);

    let path = hospital.path_of(&hospital.address(), "visit.txt");
    std::fs::remove_file(&path).unwrap();
    hospital
        .decrypt(&hospital.address(), "visit.txt")
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), NOTES);
}
