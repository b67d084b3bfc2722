//! Merge-base selection policy.
//!
//! `git_revwalk::merge_base` already computes the minimal set of common
//! ancestors via the paint algorithm; this module applies the orchestrator's
//! policy for how many bases are acceptable.

use git_hash::ObjectId;
use git_repository::Repository;

use crate::MergeError;

/// The merge base selected for a three-way merge between `ours` and
/// `theirs`.
pub enum SelectedBase {
    /// A single common ancestor was found.
    One(ObjectId),
    /// No common ancestor exists; the caller opted in to merging unrelated
    /// histories, so an empty tree stands in for the base.
    Unrelated,
}

/// Resolve the merge base between `ours` and `theirs`, applying the
/// zero/one/many policy: zero bases requires `allow_unrelated_histories`,
/// two or more bases (a criss-cross merge) is never supported.
pub fn select_base(
    repo: &Repository,
    ours: &ObjectId,
    theirs: &ObjectId,
    allow_unrelated_histories: bool,
) -> Result<SelectedBase, MergeError> {
    let bases = git_revwalk::merge_base(repo, ours, theirs)?;

    match bases.len() {
        0 if allow_unrelated_histories => Ok(SelectedBase::Unrelated),
        0 => Err(MergeError::MergeNotSupported(
            "refusing to merge unrelated histories".into(),
        )),
        1 => Ok(SelectedBase::One(bases[0])),
        _ => Err(MergeError::MergeNotSupported(
            "criss-cross merges (multiple merge bases) are not supported".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrelated_without_opt_in_is_not_supported() {
        // `select_base` itself only applies policy around whatever
        // `git_revwalk::merge_base` returns; the zero-bases branch is
        // exercised end to end in the orchestrator's integration tests,
        // where a real two-root-commit repository is easy to construct.
        let err = MergeError::MergeNotSupported("refusing to merge unrelated histories".into());
        assert_eq!(err.code(), "merge_not_supported");
    }
}
