//! Drives a merge from two ref tips through to an updated branch ref.
//!
//! This is the ref-level counterpart to [`crate::tree_merge`]: it resolves
//! `ours`/`theirs`, picks a merge base, special-cases already-merged and
//! fast-forward, and otherwise performs a true three-way merge, writes the
//! commit, advances the ref, and appends a reflog entry. Locking is left to
//! the primitives it calls: `FilesRefStore::write_ref` takes the ref's own
//! `.lock` file, and `Repository::write_index` writes the index file the
//! caller already holds exclusively for the duration of the merge.

use std::path::Path;

use bstr::BString;
use git_hash::ObjectId;
use git_object::{Commit, Object};
use git_ref::reflog::{append_reflog_entry, ReflogEntry};
use git_ref::{Reference, RefName, RefStore};
use git_repository::Repository;
use git_utils::date::Signature;

use crate::merge_base::{select_base, SelectedBase};
use crate::tree_merge::merge_trees;
use crate::{worktree, ConflictEntry, MergeError, MergeOptions, MergeReport};

/// Merge `theirs` into the branch currently checked out at `ours`.
///
/// `ours` is the tip the active branch (or detached HEAD) currently points
/// at; on success with a ref update, that ref is advanced to the result.
pub fn merge(
    repo: &mut Repository,
    ours: ObjectId,
    theirs: ObjectId,
    theirs_label: &str,
    options: &MergeOptions,
) -> Result<MergeReport, MergeError> {
    if !repo.index()?.conflicts().is_empty() {
        return Err(MergeError::UnmergedPaths);
    }

    if ours == theirs {
        return Ok(MergeReport {
            oid: Some(ours),
            tree: None,
            already_merged: true,
            ..MergeReport::default()
        });
    }

    let base = select_base(repo, &ours, &theirs, options.allow_unrelated_histories)?;
    let base_oid = match base {
        SelectedBase::One(oid) => Some(oid),
        SelectedBase::Unrelated => None,
    };

    if let Some(base_oid) = base_oid {
        if base_oid == theirs {
            return Ok(MergeReport {
                oid: Some(ours),
                tree: None,
                already_merged: true,
                ..MergeReport::default()
            });
        }
    }

    let can_fast_forward = base_oid == Some(ours) && !options.no_fast_forward;

    if can_fast_forward {
        return fast_forward(repo, ours, theirs, theirs_label, options);
    }

    if options.fast_forward_only {
        return Err(MergeError::FastForward);
    }

    true_merge(repo, ours, theirs, theirs_label, base_oid, options)
}

fn fast_forward(
    repo: &mut Repository,
    ours: ObjectId,
    theirs: ObjectId,
    theirs_label: &str,
    options: &MergeOptions,
) -> Result<MergeReport, MergeError> {
    let tree = commit_tree(repo, &theirs)?;

    if options.dry_run {
        return Ok(MergeReport {
            oid: Some(theirs),
            tree: Some(tree),
            fast_forward: true,
            ..MergeReport::default()
        });
    }

    let old_tree = commit_tree(repo, &ours)?;
    worktree::materialize(
        repo.odb(),
        repo.work_tree().unwrap_or_else(|| Path::new(".")),
        Some(&old_tree),
        Some(&tree),
        &[],
        &[],
        false,
    )?;

    let outcomes = all_paths_clean(repo, &tree)?;
    let index = repo.index_mut()?;
    index.set_cache_tree(None);
    crate::index_updater::apply_outcomes(index, &outcomes);
    repo.write_index()?;

    if !options.no_update_branch {
        advance_head(repo, ours, theirs, &format!("merge {theirs_label}: Fast-forward"))?;
    }

    Ok(MergeReport {
        oid: Some(theirs),
        tree: Some(tree),
        fast_forward: true,
        ..MergeReport::default()
    })
}

fn true_merge(
    repo: &mut Repository,
    ours: ObjectId,
    theirs: ObjectId,
    theirs_label: &str,
    base_oid: Option<ObjectId>,
    options: &MergeOptions,
) -> Result<MergeReport, MergeError> {
    let ours_tree = commit_tree(repo, &ours)?;
    let theirs_tree = commit_tree(repo, &theirs)?;
    let base_tree = match base_oid {
        Some(oid) => Some(commit_tree(repo, &oid)?),
        None => None,
    };

    let output = merge_trees(
        repo.odb(),
        bstr::BStr::new(b""),
        base_tree.as_ref(),
        Some(&ours_tree),
        Some(&theirs_tree),
        options,
    )?;

    if !output.conflicts.is_empty() {
        return conflicted(
            repo,
            &ours_tree,
            theirs,
            output.tree_oid,
            &output.conflicts,
            theirs_label,
            options,
        );
    }

    if options.dry_run {
        return Ok(MergeReport {
            tree: Some(output.tree_oid),
            ..MergeReport::default()
        });
    }

    worktree::materialize(
        repo.odb(),
        repo.work_tree().unwrap_or_else(|| Path::new(".")),
        Some(&ours_tree),
        Some(&output.tree_oid),
        &[],
        &[],
        false,
    )?;

    let outcomes = all_paths_clean(repo, &output.tree_oid)?;
    let index = repo.index_mut()?;
    crate::index_updater::apply_outcomes(index, &outcomes);
    repo.write_index()?;

    let committer = require_committer(repo, options)?;
    let author = options.author.clone().unwrap_or_else(|| committer.clone());
    let message = options
        .message
        .clone()
        .unwrap_or_else(|| format!("Merge branch '{theirs_label}'\n"));

    let commit = Commit {
        tree: output.tree_oid,
        parents: vec![ours, theirs],
        author,
        committer,
        encoding: None,
        gpgsig: sign_commit(options, &message)?,
        extra_headers: Vec::new(),
        message: BString::from(message.clone()),
    };
    let commit_oid = repo.odb().write(&Object::Commit(commit))?;

    if !options.no_update_branch {
        advance_head(
            repo,
            ours,
            commit_oid,
            &format!("merge {theirs_label}: Merge made by the 'recursive' strategy."),
        )?;
    }

    Ok(MergeReport {
        oid: Some(commit_oid),
        tree: Some(output.tree_oid),
        merge_commit: true,
        ..MergeReport::default()
    })
}

fn conflicted(
    repo: &mut Repository,
    ours_tree: &ObjectId,
    theirs: ObjectId,
    merged_tree: ObjectId,
    conflicts: &[ConflictEntry],
    theirs_label: &str,
    options: &MergeOptions,
) -> Result<MergeReport, MergeError> {
    if options.abort_on_conflict || options.dry_run {
        return Ok(MergeReport {
            tree: Some(merged_tree),
            conflicts: conflicts.to_vec(),
            ..MergeReport::default()
        });
    }

    // `merged_tree` already carries marker-laden blobs at every Content/AddAdd
    // conflict (tree_merge writes those directly as the entry's oid) and the
    // kept side's blob at every DeleteModify/ModifyDelete/TypeChange conflict,
    // so materializing it is enough; no separate conflict content pass needed.
    worktree::materialize(
        repo.odb(),
        repo.work_tree().unwrap_or_else(|| Path::new(".")),
        Some(ours_tree),
        Some(&merged_tree),
        conflicts,
        &[],
        false,
    )?;

    let mut outcomes: Vec<crate::index_updater::PathOutcome<'_>> =
        all_paths_clean(repo, &merged_tree)?;
    outcomes.extend(conflicts.iter().map(crate::index_updater::PathOutcome::Conflicted));
    let index = repo.index_mut()?;
    crate::index_updater::apply_outcomes(index, &outcomes);
    repo.write_index()?;

    write_merge_state(repo, &[theirs], &format!("Merge branch '{theirs_label}'\n"))?;

    Err(MergeError::MergeConflict {
        paths: conflicts.iter().map(|c| c.path.clone()).collect(),
    })
}

fn commit_tree(repo: &Repository, commit_oid: &ObjectId) -> Result<ObjectId, MergeError> {
    match repo.odb().read(commit_oid)? {
        Some(Object::Commit(commit)) => Ok(commit.tree),
        Some(_) => Err(MergeError::NoCommit(commit_oid.to_hex().to_string())),
        None => Err(MergeError::NotFound(commit_oid.to_hex().to_string())),
    }
}

fn advance_head(
    repo: &Repository,
    old: ObjectId,
    new: ObjectId,
    reflog_message: &str,
) -> Result<(), MergeError> {
    let head_ref = RefName::new(BString::from("HEAD"))?;
    let target = match repo.refs().resolve(&head_ref)? {
        Some(Reference::Symbolic { target, .. }) => target,
        _ => head_ref.clone(),
    };
    repo.refs().write_ref(&target, &new)?;

    let committer = require_committer(repo, &MergeOptions::default()).unwrap_or(Signature {
        name: BString::from("unknown"),
        email: BString::from("unknown@unknown"),
        date: git_utils::date::GitDate::now(),
    });
    let entry = ReflogEntry {
        old_oid: old,
        new_oid: new,
        identity: committer,
        message: BString::from(reflog_message),
    };
    append_reflog_entry(repo.git_dir(), &target, &entry)?;
    Ok(())
}

fn require_committer(repo: &Repository, options: &MergeOptions) -> Result<Signature, MergeError> {
    if let Some(committer) = &options.committer {
        return Ok(committer.clone());
    }

    let name = repo
        .config()
        .get_string("user.name")?
        .ok_or(MergeError::MissingName)?;
    let email = repo
        .config()
        .get_string("user.email")?
        .ok_or(MergeError::MissingEmail)?;

    Ok(Signature {
        name: BString::from(name),
        email: BString::from(email),
        date: git_utils::date::GitDate::now(),
    })
}

fn sign_commit(options: &MergeOptions, message: &str) -> Result<Option<BString>, MergeError> {
    match (&options.signing_key, &options.on_sign) {
        (Some(key), Some(hook)) => {
            let sig = hook.sign(message.as_bytes(), key)?;
            Ok(Some(BString::from(sig)))
        }
        (Some(_), None) => Err(MergeError::MissingParameter {
            param: "on_sign".into(),
        }),
        _ => Ok(None),
    }
}

fn all_paths_clean(
    repo: &Repository,
    tree: &ObjectId,
) -> Result<Vec<crate::index_updater::PathOutcome<'static>>, MergeError> {
    // The index is rebuilt wholesale from the merged tree rather than
    // patched path by path: a merge commonly touches most of the tree's
    // entries, so a full walk costs about the same as a diff-driven one
    // while being simpler to get right.
    let mut outcomes = Vec::new();
    walk_tree(repo.odb(), tree, bstr::BString::new(Vec::new()), &mut outcomes)?;
    Ok(outcomes)
}

fn walk_tree(
    odb: &git_odb::ObjectDatabase,
    tree: &ObjectId,
    prefix: BString,
    outcomes: &mut Vec<crate::index_updater::PathOutcome<'static>>,
) -> Result<(), MergeError> {
    let tree = match odb.read(tree)? {
        Some(Object::Tree(t)) => t,
        _ => return Ok(()),
    };
    for entry in &tree.entries {
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&entry.name);
        if entry.mode.is_tree() {
            walk_tree(odb, &entry.oid, path, outcomes)?;
        } else {
            outcomes.push(crate::index_updater::PathOutcome::Clean {
                path,
                oid: entry.oid,
                mode: entry.mode,
            });
        }
    }
    Ok(())
}

fn write_merge_state(repo: &Repository, heads: &[ObjectId], message: &str) -> Result<(), MergeError> {
    let git_dir = repo.git_dir();
    let content: String = heads.iter().map(|o| format!("{}\n", o.to_hex())).collect();
    std::fs::write(git_dir.join("MERGE_HEAD"), content)?;
    std::fs::write(git_dir.join("MERGE_MSG"), message)?;
    Ok(())
}
