//! Materializes a merge result into the working tree.
//!
//! Writes and deletes files to bring the working tree from `old_tree`
//! (ours-tip) to `merged_tree`, then overwrites any conflicted paths with
//! their marker content. Mode bits and symlinks are applied where the host
//! filesystem supports them.

use std::fs;
use std::path::Path;

use bstr::{BStr, ByteSlice};
use git_hash::ObjectId;
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

use crate::{ConflictEntry, MergeError};

/// Bring `work_tree` from `old_tree` to `merged_tree`, then write conflict
/// marker content for every path in `conflicts`.
///
/// When `abort_on_conflict` is true and `conflicts` is non-empty, nothing
/// is written.
pub fn materialize(
    odb: &ObjectDatabase,
    work_tree: &Path,
    old_tree: Option<&ObjectId>,
    merged_tree: Option<&ObjectId>,
    conflicts: &[ConflictEntry],
    conflict_contents: &[(&BStr, Vec<u8>)],
    abort_on_conflict: bool,
) -> Result<(), MergeError> {
    if abort_on_conflict && !conflicts.is_empty() {
        return Ok(());
    }

    let options = git_diff::DiffOptions::default();
    let diff = git_diff::tree::diff_trees(odb, old_tree, merged_tree, &options)?;

    for file in &diff.files {
        match file.status {
            git_diff::FileStatus::Deleted => {
                if let Some(path) = &file.old_path {
                    remove_file(work_tree, path.as_ref());
                }
            }
            _ => {
                if let (Some(path), Some(oid), Some(mode)) =
                    (&file.new_path, file.new_oid, file.new_mode)
                {
                    let content = read_blob(odb, &oid)?;
                    write_entry(work_tree, path.as_ref(), &content, mode)?;
                }
            }
        }
    }

    for (path, content) in conflict_contents {
        write_entry(work_tree, path, content, FileMode::Regular)?;
    }

    Ok(())
}

fn read_blob(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Vec<u8>, MergeError> {
    match odb.read(oid)? {
        Some(Object::Blob(blob)) => Ok(blob.data),
        Some(_) => Err(MergeError::NotFound(format!("{oid} is not a blob"))),
        None => Err(MergeError::NotFound(oid.to_hex().to_string())),
    }
}

fn remove_file(work_tree: &Path, path: &BStr) {
    let fs_path = work_tree.join(path.to_str_lossy().as_ref());
    let _ = fs::remove_file(&fs_path);
    if let Some(parent) = fs_path.parent() {
        let _ = fs::remove_dir(parent);
    }
}

fn write_entry(work_tree: &Path, path: &BStr, content: &[u8], mode: FileMode) -> Result<(), MergeError> {
    let fs_path = work_tree.join(path.to_str_lossy().as_ref());
    if let Some(parent) = fs_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if mode.is_symlink() {
        #[cfg(unix)]
        {
            let target = String::from_utf8_lossy(content).into_owned();
            let _ = fs::remove_file(&fs_path);
            std::os::unix::fs::symlink(target, &fs_path)?;
            return Ok(());
        }
        #[cfg(not(unix))]
        {
            fs::write(&fs_path, content)?;
            return Ok(());
        }
    }

    fs::write(&fs_path, content)?;

    #[cfg(unix)]
    if mode == FileMode::Executable {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&fs_path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(&fs_path, perms)?;
    }

    Ok(())
}
