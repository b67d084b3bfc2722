use std::io::{self, Write};

use anyhow::{bail, Result};
use bstr::{BString, ByteSlice};
use clap::Args;
use git_hash::ObjectId;
use git_merge::orchestrator;
use git_merge::{ConflictStyle, ConflictType, MergeOptions};
use git_object::Object;
use git_ref::{RefName, RefStore};
use git_revwalk::resolve_revision;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct MergeArgs {
    /// Create a merge commit even when fast-forward is possible
    #[arg(long = "no-ff")]
    pub no_ff: bool,

    /// Only allow fast-forward merges (fail otherwise)
    #[arg(long)]
    pub ff_only: bool,

    /// Squash the merge into a single set of changes (don't commit)
    #[arg(long)]
    pub squash: bool,

    /// Abort the current in-progress merge
    #[arg(long)]
    pub abort: bool,

    /// Continue after resolving conflicts
    #[arg(long, name = "continue")]
    pub cont: bool,

    /// Perform the merge but don't create a commit
    #[arg(long = "no-commit")]
    pub no_commit: bool,

    /// Merge commit message
    #[arg(short = 'm')]
    pub message: Option<String>,

    /// Be quiet
    #[arg(short, long)]
    pub quiet: bool,

    /// Allow merging unrelated histories
    #[arg(long)]
    pub allow_unrelated_histories: bool,

    /// Branch(es) or commit(s) to merge
    #[arg(required_unless_present_any = ["abort", "continue"])]
    pub commit: Vec<String>,
}

pub fn run(args: &MergeArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    let stderr = io::stderr();
    let mut err = stderr.lock();

    if args.abort {
        return handle_abort(&mut repo, &mut err);
    }

    if args.cont {
        return handle_continue(&mut repo, &mut err);
    }

    let merge_head_path = repo.git_dir().join("MERGE_HEAD");
    if merge_head_path.exists() {
        bail!("you have not concluded your merge (MERGE_HEAD exists).\nPlease, commit your changes before you merge.\nExiting because of unfinished merge.");
    }

    let head_oid = repo
        .head_oid()?
        .ok_or_else(|| anyhow::anyhow!("cannot merge into an unborn branch"))?;

    if args.commit.is_empty() {
        bail!("no commit specified to merge");
    }
    if args.commit.len() > 1 {
        bail!("octopus merges (2+ branches) are not supported");
    }

    let theirs_label = &args.commit[0];
    let theirs_oid = resolve_revision(&repo, theirs_label)?;

    let options = build_merge_options(args, &repo)?;

    if args.squash {
        // Squash merges never advance HEAD or record a merge parent; the
        // orchestrator always does one or the other, so this path computes
        // the tree directly and stops short of any ref update.
        let mut squash_options = options.clone();
        squash_options.no_update_branch = true;
        squash_options.dry_run = false;
        let report = match orchestrator::merge(&mut repo, head_oid, theirs_oid, theirs_label, &squash_options) {
            Ok(report) => report,
            Err(git_merge::MergeError::MergeConflict { .. }) => {
                writeln!(err, "Automatic merge failed; fix conflicts and then commit the result.")?;
                writeln!(err, "Squash commit -- not updating HEAD")?;
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        };
        let _ = report;
        writeln!(err, "Squash commit -- not updating HEAD")?;
        std::fs::write(
            repo.git_dir().join("SQUASH_MSG"),
            format!(
                "Squashed commit of the following:\n\ncommit {}\n",
                theirs_oid.to_hex()
            ),
        )?;
        return Ok(0);
    }

    if head_oid == theirs_oid {
        writeln!(err, "Already up to date.")?;
        return Ok(0);
    }

    let mut merge_options = options;
    merge_options.no_update_branch = args.no_commit;

    match orchestrator::merge(&mut repo, head_oid, theirs_oid, theirs_label, &merge_options) {
        Ok(report) if report.already_merged => {
            writeln!(err, "Already up to date.")?;
            Ok(0)
        }
        Ok(report) if report.fast_forward => {
            writeln!(
                err,
                "Updating {}..{}",
                &head_oid.to_hex()[..7],
                &theirs_oid.to_hex()[..7]
            )?;
            writeln!(err, "Fast-forward")?;
            Ok(0)
        }
        Ok(report) if args.no_commit => {
            writeln!(err, "Automatic merge went well; stopped before committing as requested.")?;
            let _ = report;
            Ok(0)
        }
        Ok(_report) => {
            writeln!(err, "Merge made by the 'recursive' strategy.")?;
            Ok(0)
        }
        Err(git_merge::MergeError::MergeConflict { paths }) => {
            for path in &paths {
                writeln!(err, "Auto-merging {}", path.to_str_lossy())?;
            }
            writeln!(err, "Automatic merge failed; fix conflicts and then commit the result.")?;
            Ok(1)
        }
        Err(git_merge::MergeError::FastForward) => {
            writeln!(err, "fatal: Not possible to fast-forward, aborting.")?;
            Ok(128)
        }
        Err(e) => Err(e.into()),
    }
}

/// Build `MergeOptions` from CLI args and repository config.
///
/// Conflict style follows `merge.conflictStyle`; fast-forward policy
/// follows `--ff-only`/`--no-ff` with `merge.ff` as the config fallback.
fn build_merge_options(args: &MergeArgs, repo: &git_repository::Repository) -> Result<MergeOptions> {
    let mut options = MergeOptions::default();

    if let Some(style_name) = repo.config().get_string("merge.conflictStyle")?.as_deref() {
        if let Some(style) = ConflictStyle::from_name(style_name) {
            options.conflict_style = style;
        }
    }

    options.fast_forward_only = args.ff_only;
    options.no_fast_forward = args.no_ff
        || repo
            .config()
            .get_string("merge.ff")?
            .as_deref()
            == Some("false");
    options.allow_unrelated_histories = args.allow_unrelated_histories;
    options.message = args.message.clone();

    Ok(options)
}

/// Handle `git merge --abort`: reset to ORIG_HEAD and drop merge state.
fn handle_abort(repo: &mut git_repository::Repository, err: &mut impl Write) -> Result<i32> {
    let merge_head_path = repo.git_dir().join("MERGE_HEAD");
    if !merge_head_path.exists() {
        bail!("There is no merge to abort (MERGE_HEAD missing).");
    }

    let orig_head_path = repo.git_dir().join("ORIG_HEAD");
    let orig_head_hex = std::fs::read_to_string(&orig_head_path)?;
    let orig_head = ObjectId::from_hex(orig_head_hex.trim())?;

    let obj = repo
        .odb()
        .read(&orig_head)?
        .ok_or_else(|| anyhow::anyhow!("commit {} not found", orig_head.to_hex()))?;
    let tree_oid = match obj {
        Object::Commit(c) => c.tree,
        _ => bail!("ORIG_HEAD does not point at a commit"),
    };

    let work_tree = repo
        .work_tree()
        .ok_or_else(|| anyhow::anyhow!("this operation must be run in a work tree"))?
        .to_path_buf();
    git_merge::worktree::materialize(repo.odb(), &work_tree, None, Some(&tree_oid), &[], &[], false)?;

    let mut index = git_index::Index::new();
    rebuild_index(repo.odb(), &tree_oid, &BString::new(Vec::new()), &mut index)?;
    repo.set_index(index);
    repo.write_index()?;

    let head_ref = RefName::new(BString::from("HEAD"))?;
    match repo.refs().resolve(&head_ref)? {
        Some(git_ref::Reference::Symbolic { target, .. }) => repo.refs().write_ref(&target, &orig_head)?,
        _ => repo.refs().write_ref(&head_ref, &orig_head)?,
    }

    cleanup_merge_state(repo)?;
    writeln!(err, "Merge aborted.")?;
    Ok(0)
}

/// Handle `git merge --continue`: create the merge commit once conflicts
/// are resolved in the index.
fn handle_continue(repo: &mut git_repository::Repository, err: &mut impl Write) -> Result<i32> {
    let merge_head_path = repo.git_dir().join("MERGE_HEAD");
    if !merge_head_path.exists() {
        bail!("There is no merge in progress (MERGE_HEAD missing).");
    }

    {
        let index = repo.index()?;
        let conflicts = index.conflicts();
        if !conflicts.is_empty() {
            writeln!(err, "error: you need to resolve all merge conflicts before continuing.")?;
            writeln!(err, "Unmerged paths:")?;
            for path in &conflicts {
                writeln!(err, "\t{}", path.to_str_lossy())?;
            }
            return Ok(128);
        }
    }

    let merge_head_content = std::fs::read_to_string(&merge_head_path)?;
    let mut theirs_oids = Vec::new();
    for line in merge_head_content.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            theirs_oids.push(ObjectId::from_hex(trimmed)?);
        }
    }
    if theirs_oids.is_empty() {
        bail!("MERGE_HEAD is empty");
    }

    let head_oid = repo.head_oid()?.ok_or_else(|| anyhow::anyhow!("HEAD not found"))?;

    let index_path = repo.git_dir().join("index");
    let index = git_index::Index::read_from(&index_path)?;
    let tree_oid = index.write_tree(repo.odb())?;

    let merge_msg_path = repo.git_dir().join("MERGE_MSG");
    let message = if merge_msg_path.exists() {
        std::fs::read_to_string(&merge_msg_path)?
    } else {
        format!("Merge commit '{}'", theirs_oids[0].to_hex())
    };

    let committer = orchestrator_committer(repo)?;
    let commit = git_object::Commit {
        tree: tree_oid,
        parents: {
            let mut p = vec![head_oid];
            p.extend_from_slice(&theirs_oids);
            p
        },
        author: committer.clone(),
        committer,
        encoding: None,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: BString::from(message),
    };
    let commit_oid = repo.odb().write(&Object::Commit(commit))?;

    let head_ref = RefName::new(BString::from("HEAD"))?;
    match repo.refs().resolve(&head_ref)? {
        Some(git_ref::Reference::Symbolic { target, .. }) => repo.refs().write_ref(&target, &commit_oid)?,
        _ => repo.refs().write_ref(&head_ref, &commit_oid)?,
    }

    cleanup_merge_state(repo)?;
    writeln!(err, "Merge made by the 'recursive' strategy.")?;
    Ok(0)
}

fn orchestrator_committer(repo: &git_repository::Repository) -> Result<git_utils::date::Signature> {
    let name = repo
        .config()
        .get_string("user.name")?
        .ok_or_else(|| anyhow::anyhow!("missing committer name (set user.name)"))?;
    let email = repo
        .config()
        .get_string("user.email")?
        .ok_or_else(|| anyhow::anyhow!("missing committer email (set user.email)"))?;
    Ok(git_utils::date::Signature {
        name: BString::from(name),
        email: BString::from(email),
        date: git_utils::date::GitDate::now(),
    })
}

fn cleanup_merge_state(repo: &git_repository::Repository) -> Result<()> {
    let git_dir = repo.git_dir();
    for name in &["MERGE_HEAD", "MERGE_MSG", "ORIG_HEAD", "SQUASH_MSG"] {
        let path = git_dir.join(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn rebuild_index(
    odb: &git_odb::ObjectDatabase,
    tree_oid: &ObjectId,
    prefix: &BString,
    index: &mut git_index::Index,
) -> Result<()> {
    let obj = odb
        .read(tree_oid)?
        .ok_or_else(|| anyhow::anyhow!("tree {} not found", tree_oid.to_hex()))?;
    let tree = match obj {
        Object::Tree(t) => t,
        _ => bail!("expected tree, got {}", obj.object_type()),
    };
    for entry in &tree.entries {
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&entry.name);
        if entry.mode.is_tree() {
            rebuild_index(odb, &entry.oid, &path, index)?;
        } else {
            index.add(git_index::IndexEntry {
                path,
                oid: entry.oid,
                mode: entry.mode,
                stage: git_index::Stage::Normal,
                stat: git_index::StatData::default(),
                flags: git_index::EntryFlags::default(),
            });
        }
    }
    Ok(())
}

/// Human-readable label for a conflict type, matching `git merge`'s output.
pub fn conflict_type_label(conflict_type: ConflictType) -> &'static str {
    match conflict_type {
        ConflictType::Content => "content",
        ConflictType::DeleteModify => "delete/modify",
        ConflictType::ModifyDelete => "modify/delete",
        ConflictType::AddAdd => "add/add",
        ConflictType::TypeChange => "type change",
    }
}
