//! A ref update or delete that names a stale expected value is rejected
//! without touching the ref; one that names the true current value succeeds.

use gitcore::error::RefError;
use testutils::TestRepo;

#[test]
fn update_with_a_stale_expected_value_is_rejected() {
    let repo = TestRepo::init();
    let first = repo.write_commit(&[], 1);
    let second = repo.write_commit(&[first], 2);
    repo.set_branch("main", first);

    let refs = repo.repo().refs();
    let err = refs
        .update("refs/heads/main", second.digest(), Some(gitcore::digest::Digest::NULL), None)
        .unwrap_err();
    assert!(matches!(err, RefError::Cas { .. }));

    let (_, digest, _) = refs.resolve("refs/heads/main", true).unwrap();
    assert_eq!(digest, first.digest());
}

#[test]
fn update_with_the_true_current_value_succeeds() {
    let repo = TestRepo::init();
    let first = repo.write_commit(&[], 1);
    let second = repo.write_commit(&[first], 2);
    repo.set_branch("main", first);

    let refs = repo.repo().refs();
    refs.update("refs/heads/main", second.digest(), Some(first.digest()), None)
        .unwrap();

    let (_, digest, _) = refs.resolve("refs/heads/main", true).unwrap();
    assert_eq!(digest, second.digest());
}

#[test]
fn delete_with_a_stale_expected_value_is_rejected() {
    let repo = TestRepo::init();
    let commit = repo.write_commit(&[], 1);
    repo.set_branch("main", commit);

    let refs = repo.repo().refs();
    let err = refs
        .delete("refs/heads/main", Some(gitcore::digest::Digest::NULL), None)
        .unwrap_err();
    assert!(matches!(err, RefError::Cas { .. }));
    let (_, digest, _) = refs.resolve("refs/heads/main", true).unwrap();
    assert_eq!(digest, commit.digest());
}
