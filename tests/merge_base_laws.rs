//! `merge_bases` obeys the laws a lowest-common-ancestor function must:
//! symmetry, a commit is its own merge base with itself, and on a linear
//! history the base is exactly the older commit.

use gitcore::graph::merge_base::merge_bases;
use testutils::TestRepo;

#[test]
fn merge_bases_is_symmetric() {
    let repo = TestRepo::init();
    let base = repo.write_commit(&[], 1);
    let left = repo.write_commit(&[base], 2);
    let right = repo.write_commit(&[base], 3);

    let forward = merge_bases(repo.repo(), left, right).unwrap();
    let backward = merge_bases(repo.repo(), right, left).unwrap();
    assert_eq!(
        forward.into_iter().collect::<std::collections::HashSet<_>>(),
        backward.into_iter().collect::<std::collections::HashSet<_>>(),
    );
}

#[test]
fn merge_bases_of_a_commit_with_itself_is_itself() {
    let repo = TestRepo::init();
    let commit = repo.write_commit(&[], 1);
    let bases = merge_bases(repo.repo(), commit, commit).unwrap();
    assert_eq!(bases, vec![commit]);
}

#[test]
fn merge_bases_on_a_linear_history_is_the_ancestor() {
    let repo = TestRepo::init();
    let ancestor = repo.write_commit(&[], 1);
    let middle = repo.write_commit(&[ancestor], 2);
    let descendant = repo.write_commit(&[middle], 3);

    let bases = merge_bases(repo.repo(), descendant, ancestor).unwrap();
    assert_eq!(bases, vec![ancestor]);
}
