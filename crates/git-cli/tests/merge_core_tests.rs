//! Integration tests comparing `gitr`'s merge/cherry-pick/revert/merge-base
//! behavior against C git, driven through the CLI binary.

mod common;
use common::*;

#[test]
fn merge_fast_forward_matches_git() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_scenarios(dir_git.path());
    setup_merge_scenarios(dir_gitr.path());

    let g = git(dir_git.path(), &["merge", "ff-branch"]);
    let m = gitr(dir_gitr.path(), &["merge", "ff-branch"]);

    assert_exit_code_eq(&g, &m);
    assert_head_eq(dir_git.path(), dir_gitr.path());
    assert_index_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
}

#[test]
fn merge_clean_three_way_matches_git() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_scenarios(dir_git.path());
    setup_merge_scenarios(dir_gitr.path());

    let g = git(dir_git.path(), &["merge", "merge-branch", "--no-edit"]);
    let m = gitr(dir_gitr.path(), &["merge", "merge-branch", "--no-edit"]);

    assert_exit_code_eq(&g, &m);
    assert_index_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
    assert_fsck_clean(dir_gitr.path());
}

#[test]
fn merge_conflicting_branch_leaves_conflict_markers_like_git() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_scenarios(dir_git.path());
    setup_merge_scenarios(dir_gitr.path());

    let g = git(dir_git.path(), &["merge", "conflict-branch"]);
    let m = gitr(dir_gitr.path(), &["merge", "conflict-branch"]);

    // Both sides should report a non-zero exit for an unresolved conflict.
    assert_ne!(g.exit_code, 0);
    assert_exit_code_eq(&g, &m);
    assert_index_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
}

#[test]
fn merge_abort_restores_pre_merge_state() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_scenarios(dir_git.path());
    setup_merge_scenarios(dir_gitr.path());

    git(dir_git.path(), &["merge", "conflict-branch"]);
    gitr(dir_gitr.path(), &["merge", "conflict-branch"]);

    let g = git(dir_git.path(), &["merge", "--abort"]);
    let m = gitr(dir_gitr.path(), &["merge", "--abort"]);

    assert_exit_code_eq(&g, &m);
    assert_head_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
}

#[test]
fn merge_base_finds_common_ancestor() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_branched_history(dir_git.path());
    setup_branched_history(dir_gitr.path());

    let g = git(dir_git.path(), &["merge-base", "main", "feature"]);
    let m = gitr(dir_gitr.path(), &["merge-base", "main", "feature"]);

    assert_output_eq(&g, &m);
}

#[test]
fn cherry_pick_non_conflicting_commit_matches_git() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_branched_history(dir_git.path());
    setup_branched_history(dir_gitr.path());

    let g = git(dir_git.path(), &["cherry-pick", "feature"]);
    let m = gitr(dir_gitr.path(), &["cherry-pick", "feature"]);

    assert_exit_code_eq(&g, &m);
    assert_index_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
    assert_fsck_clean(dir_gitr.path());
}

#[test]
fn cherry_pick_conflicting_commit_reports_conflict() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_conflict(dir_git.path());
    setup_merge_conflict(dir_gitr.path());

    let g = git(dir_git.path(), &["cherry-pick", "feature"]);
    let m = gitr(dir_gitr.path(), &["cherry-pick", "feature"]);

    assert_ne!(g.exit_code, 0);
    assert_exit_code_eq(&g, &m);
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
}

#[test]
fn cherry_pick_abort_restores_head() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_conflict(dir_git.path());
    setup_merge_conflict(dir_gitr.path());

    git(dir_git.path(), &["cherry-pick", "feature"]);
    gitr(dir_gitr.path(), &["cherry-pick", "feature"]);

    let g = git(dir_git.path(), &["cherry-pick", "--abort"]);
    let m = gitr(dir_gitr.path(), &["cherry-pick", "--abort"]);

    assert_exit_code_eq(&g, &m);
    assert_head_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
}

#[test]
fn revert_clean_commit_matches_git() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_branched_history(dir_git.path());
    setup_branched_history(dir_gitr.path());

    let g = git(dir_git.path(), &["revert", "--no-edit", "HEAD"]);
    let m = gitr(dir_gitr.path(), &["revert", "--no-edit", "HEAD"]);

    assert_exit_code_eq(&g, &m);
    assert_index_eq(dir_git.path(), dir_gitr.path());
    assert_worktree_eq(dir_git.path(), dir_gitr.path());
    assert_fsck_clean(dir_gitr.path());
}

#[test]
fn revert_conflicting_commit_reports_conflict() {
    let dir_git = tempfile::tempdir().unwrap();
    let dir_gitr = tempfile::tempdir().unwrap();
    setup_merge_conflict(dir_git.path());
    setup_merge_conflict(dir_gitr.path());

    // Revert the initial commit's conflicting region after the feature branch's
    // own edit has landed via cherry-pick, producing an overlapping change.
    git(dir_git.path(), &["checkout", "feature"]);
    gitr(dir_gitr.path(), &["checkout", "feature"]);

    let g = git(dir_git.path(), &["revert", "--no-edit", "HEAD~1"]);
    let m = gitr(dir_gitr.path(), &["revert", "--no-edit", "HEAD~1"]);

    assert_ne!(g.exit_code, 0);
    assert_exit_code_eq(&g, &m);
}
