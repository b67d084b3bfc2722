//! Revert: reverse-applies a commit's changes by treating the commit itself
//! as the merge base and its first parent as "theirs" in a three-way tree
//! merge, effectively merging towards the pre-commit state.

use bstr::BStr;
use git_hash::ObjectId;
use git_object::Object;
use git_repository::Repository;

use crate::tree_merge::merge_trees;
use crate::{MergeError, MergeOptions, MergeResult};

/// Revert `commit_oid` on the current branch, without committing.
pub fn revert(
    repo: &mut Repository,
    commit_oid: &ObjectId,
    options: &MergeOptions,
) -> Result<MergeResult, MergeError> {
    let commit = read_commit(repo, commit_oid)?;

    let parent = commit
        .parents
        .first()
        .copied()
        .ok_or_else(|| MergeError::NoCommit(format!("{commit_oid} has no parent to revert to")))?;

    let head_oid = repo.head_oid()?.ok_or(MergeError::DetachedHead)?;

    let parent_commit = read_commit(repo, &parent)?;
    let head_commit = read_commit(repo, &head_oid)?;

    let output = merge_trees(
        repo.odb(),
        BStr::new(b""),
        Some(&commit.tree),
        Some(&head_commit.tree),
        Some(&parent_commit.tree),
        options,
    )?;

    let mut result = if output.conflicts.is_empty() {
        MergeResult::clean(output.tree_oid)
    } else {
        MergeResult::conflicted(output.conflicts)
    };
    result.message = Some(format!(
        "Revert \"{}\"\n\nThis reverts commit {}.",
        commit.message.to_string().lines().next().unwrap_or(""),
        commit_oid.to_hex()
    ));
    Ok(result)
}

fn read_commit(repo: &Repository, oid: &ObjectId) -> Result<git_object::Commit, MergeError> {
    match repo.odb().read(oid)? {
        Some(Object::Commit(c)) => Ok(c),
        Some(_) => Err(MergeError::NoCommit(oid.to_hex().to_string())),
        None => Err(MergeError::NotFound(oid.to_hex().to_string())),
    }
}
