//! Integration tests for three-way (diff3-style) content merging.

use git_merge::content::{merge_content, MergeLabels};
use git_merge::{ConflictStyle, MergeOptions};

fn labels() -> MergeLabels<'static> {
    MergeLabels {
        base: "base",
        ours: "HEAD",
        theirs: "feature",
    }
}

#[test]
fn edits_at_opposite_ends_of_the_file_both_survive() {
    let base = b"line1\nline2\nline3\nline4\nline5\n";
    let ours = b"CHANGED_TOP\nline2\nline3\nline4\nline5\n";
    let theirs = b"line1\nline2\nline3\nline4\nCHANGED_BOTTOM\n";

    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(result.is_clean());
    let content = String::from_utf8_lossy(result.content());
    assert!(content.contains("CHANGED_TOP"));
    assert!(content.contains("CHANGED_BOTTOM"));
}

#[test]
fn same_line_edited_differently_conflicts() {
    let base = b"a\nb\nc\n";
    let ours = b"a\nX\nc\n";
    let theirs = b"a\nY\nc\n";

    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(!result.is_clean());

    let content = String::from_utf8_lossy(result.content());
    assert!(content.contains("<<<<<<< HEAD"));
    assert!(content.contains("======="));
    assert!(content.contains(">>>>>>> feature"));
}

#[test]
fn diff3_style_carries_the_original_line_between_markers() {
    let base = b"a\noriginal\nc\n";
    let ours = b"a\nours_change\nc\n";
    let theirs = b"a\ntheirs_change\nc\n";

    let mut opts = MergeOptions::default();
    opts.conflict_style = ConflictStyle::Diff3;

    let result = merge_content(base, ours, theirs, &opts, &labels());
    assert!(!result.is_clean());

    let content = String::from_utf8_lossy(result.content());
    assert!(content.contains("||||||| base"));
    assert!(content.contains("original"));
}

#[test]
fn both_branches_making_the_same_edit_is_not_a_conflict() {
    let base = b"a\nold\nc\n";
    let ours = b"a\nnew\nc\n";
    let theirs = b"a\nnew\nc\n";

    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(result.is_clean());
    assert_eq!(result.content(), ours);
}

#[test]
fn unmodified_side_yields_to_the_other_branch() {
    let base = b"unchanged\n";
    let ours = b"unchanged\n";
    let theirs = b"modified\n";

    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(result.is_clean());
    assert_eq!(result.content(), theirs);

    let ours = b"modified\n";
    let theirs = b"unchanged\n";
    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(result.is_clean());
    assert_eq!(result.content(), ours);
}

#[test]
fn two_separate_conflicting_regions_each_get_their_own_markers() {
    let base = b"a\nb\nc\nd\ne\n";
    let ours = b"X\nb\nY\nd\ne\n";
    let theirs = b"A\nb\nB\nd\ne\n";

    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(!result.is_clean());

    let content = String::from_utf8_lossy(result.content());
    let conflict_marker_count = content.matches("<<<<<<< HEAD").count();
    assert_eq!(conflict_marker_count, 2, "expected 2 conflicts, got: {content}");
}

#[test]
fn a_deletion_next_to_an_unrelated_insertion_merges_cleanly() {
    let base = b"keep1\ndrop\nkeep2\n";
    let ours = b"keep1\nkeep2\n";
    let theirs = b"keep1\ndrop\nkeep2\nappended\n";

    let result = merge_content(base, ours, theirs, &MergeOptions::default(), &labels());
    assert!(result.is_clean());
    assert_eq!(result.content(), &b"keep1\nkeep2\nappended\n"[..]);
}
