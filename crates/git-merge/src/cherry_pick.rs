//! Cherry-pick: applies a single commit's changes onto the current branch
//! by treating the commit's first parent as the merge base and the commit
//! itself as "theirs" in a three-way tree merge.

use bstr::BStr;
use git_hash::ObjectId;
use git_object::Object;
use git_repository::Repository;

use crate::tree_merge::merge_trees;
use crate::{MergeError, MergeOptions, MergeResult};

/// Cherry-pick `commit_oid` onto the current branch, without committing.
///
/// Callers that want a full pick-and-commit flow (as `git cherry-pick` does
/// for a clean result) pair this with [`crate::orchestrator`]'s commit step,
/// passing this merge's tree and the original commit's author/message.
pub fn cherry_pick(
    repo: &mut Repository,
    commit_oid: &ObjectId,
    options: &MergeOptions,
) -> Result<MergeResult, MergeError> {
    let commit = read_commit(repo, commit_oid)?;

    let base = commit
        .parents
        .first()
        .copied()
        .ok_or_else(|| MergeError::NoCommit(format!("{commit_oid} has no parent to diff against")))?;

    let head_oid = repo
        .head_oid()?
        .ok_or(MergeError::DetachedHead)?;

    let base_commit = read_commit(repo, &base)?;
    let head_commit = read_commit(repo, &head_oid)?;

    let output = merge_trees(
        repo.odb(),
        BStr::new(b""),
        Some(&base_commit.tree),
        Some(&head_commit.tree),
        Some(&commit.tree),
        options,
    )?;

    let mut result = if output.conflicts.is_empty() {
        MergeResult::clean(output.tree_oid)
    } else {
        MergeResult::conflicted(output.conflicts)
    };
    result.message = Some(commit.message.to_string());
    Ok(result)
}

fn read_commit(repo: &Repository, oid: &ObjectId) -> Result<git_object::Commit, MergeError> {
    match repo.odb().read(oid)? {
        Some(Object::Commit(c)) => Ok(c),
        Some(_) => Err(MergeError::NoCommit(oid.to_hex().to_string())),
        None => Err(MergeError::NotFound(oid.to_hex().to_string())),
    }
}
