//! Merge engine: three-way content merge, tree merge, conflict handling,
//! cherry-pick, revert, and sequencer state.
//!
//! Provides the core merge machinery used by `git merge`, `git cherry-pick`,
//! and `git revert`. Implements a single, fixed tree-merge algorithm (no
//! pluggable strategies, no rename detection) against a three-way base/ours/
//! theirs input, with conflicts recorded into the index at stages 1-3 and
//! materialized into the working tree with standard conflict markers.

pub mod content;
pub mod index_updater;
pub mod merge_base;
pub mod orchestrator;
pub mod sequencer;
pub mod tree_merge;
pub mod worktree;

pub mod cherry_pick;
pub mod revert;

use std::sync::Arc;

use bstr::BString;
use git_diff::DiffAlgorithm;
use git_hash::ObjectId;
use git_object::FileMode;
use git_utils::date::Signature;

/// Options shared by the tree merger and the orchestrator.
#[derive(Clone)]
pub struct MergeOptions {
    /// Diff algorithm for content merge.
    pub diff_algorithm: DiffAlgorithm,
    /// Conflict marker style.
    pub conflict_style: ConflictStyle,
    /// Allow merging histories with zero common ancestors.
    pub allow_unrelated_histories: bool,
    /// Never create a merge commit; fail instead of doing a true merge.
    pub fast_forward_only: bool,
    /// Never fast-forward even when possible; always create a merge commit.
    pub no_fast_forward: bool,
    /// Compute and report the result without touching the index, the
    /// working tree, the ref, or the object database.
    pub dry_run: bool,
    /// Compute and write objects and the index, but do not advance the
    /// current branch ref.
    pub no_update_branch: bool,
    /// On the first conflict, leave the index and working tree untouched
    /// and return the conflict list instead of recording it.
    pub abort_on_conflict: bool,
    /// Explicit merge commit message; a default is synthesized when absent.
    pub message: Option<String>,
    /// Explicit author identity for the merge commit.
    pub author: Option<Signature>,
    /// Explicit committer identity for the merge commit.
    pub committer: Option<Signature>,
    /// Per-path custom merge driver, consulted before the built-in blob
    /// merger when present.
    pub merge_driver: Option<Arc<dyn MergeDriver>>,
    /// Key id to sign the merge commit with. Requires `on_sign`.
    pub signing_key: Option<String>,
    /// Callback invoked to produce a commit signature when `signing_key`
    /// is set.
    pub on_sign: Option<Arc<dyn SignHook>>,
}

impl std::fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeOptions")
            .field("diff_algorithm", &self.diff_algorithm)
            .field("conflict_style", &self.conflict_style)
            .field("allow_unrelated_histories", &self.allow_unrelated_histories)
            .field("fast_forward_only", &self.fast_forward_only)
            .field("no_fast_forward", &self.no_fast_forward)
            .field("dry_run", &self.dry_run)
            .field("no_update_branch", &self.no_update_branch)
            .field("abort_on_conflict", &self.abort_on_conflict)
            .field("message", &self.message)
            .field("author", &self.author)
            .field("committer", &self.committer)
            .field("has_merge_driver", &self.merge_driver.is_some())
            .field("signing_key", &self.signing_key)
            .field("has_on_sign", &self.on_sign.is_some())
            .finish()
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            diff_algorithm: DiffAlgorithm::Myers,
            conflict_style: ConflictStyle::Merge,
            allow_unrelated_histories: false,
            fast_forward_only: false,
            no_fast_forward: false,
            dry_run: false,
            no_update_branch: false,
            abort_on_conflict: false,
            message: None,
            author: None,
            committer: None,
            merge_driver: None,
            signing_key: None,
            on_sign: None,
        }
    }
}

/// The three versions of a path's content handed to a custom merge driver.
#[derive(Debug, Clone)]
pub struct MergeDriverContext {
    pub path: BString,
    pub base: Option<Vec<u8>>,
    pub ours: Vec<u8>,
    pub theirs: Vec<u8>,
}

/// Outcome reported back by a custom merge driver.
#[derive(Debug, Clone)]
pub struct MergeDriverOutput {
    pub clean_merge: bool,
    pub merged_text: Vec<u8>,
}

/// A single injection point for replacing the built-in blob merge for
/// specific paths (e.g. `.gitattributes`-driven `merge=<driver>`).
pub trait MergeDriver: Send + Sync {
    fn merge(&self, ctx: &MergeDriverContext) -> Result<MergeDriverOutput, MergeError>;
}

/// Produces a commit signature for a given payload and key id.
pub trait SignHook: Send + Sync {
    fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>, MergeError>;
}

/// Conflict marker style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStyle {
    /// Default: show ours and theirs only.
    Merge,
    /// Include base content between `|||||||` markers.
    Diff3,
}

impl ConflictStyle {
    /// Parse a conflict style name (as used by `merge.conflictStyle` config).
    ///
    /// Accepted values: "merge", "diff3".
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "merge" => Some(Self::Merge),
            "diff3" => Some(Self::Diff3),
            _ => None,
        }
    }

    /// Return the canonical config name for this style.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Diff3 => "diff3",
        }
    }
}

/// Result of a tree-level three-way merge (used by the tree merger,
/// cherry-pick, and revert, all of which operate below the ref level).
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The resulting tree OID, present only when the merge was clean.
    pub tree: Option<ObjectId>,
    /// Whether the merge was clean (no conflicts).
    pub is_clean: bool,
    /// List of conflicts (empty if clean).
    pub conflicts: Vec<ConflictEntry>,
    /// Commit message synthesized for a clean result, when applicable.
    pub message: Option<String>,
}

impl MergeResult {
    /// Create a clean merge result.
    pub fn clean(tree: ObjectId) -> Self {
        Self {
            tree: Some(tree),
            is_clean: true,
            conflicts: Vec::new(),
            message: None,
        }
    }

    /// Create a conflicted merge result.
    pub fn conflicted(conflicts: Vec<ConflictEntry>) -> Self {
        Self {
            tree: None,
            is_clean: false,
            conflicts,
            message: None,
        }
    }
}

/// Report of a ref-level merge operation performed by the orchestrator.
///
/// Exactly one of `already_merged`, `fast_forward`, or `merge_commit` is
/// true for any non-error outcome; `conflicts` is non-empty only when the
/// operation stopped with unresolved conflicts.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Commit OID the current branch now points at, when the ref was
    /// advanced (fast-forward or merge commit) and `no_update_branch` was
    /// not set.
    pub oid: Option<ObjectId>,
    /// Resulting tree OID, present whenever a merge tree was computed
    /// (clean true-merge or fast-forward), even under `dry_run`.
    pub tree: Option<ObjectId>,
    /// `theirs` was already an ancestor of `ours`; nothing was changed.
    pub already_merged: bool,
    /// The branch was advanced without creating a merge commit.
    pub fast_forward: bool,
    /// A merge commit was created (or would have been, under `dry_run`).
    pub merge_commit: bool,
    /// Unresolved conflicts, present only when the merge stopped short of
    /// producing a tree.
    pub conflicts: Vec<ConflictEntry>,
}

/// A file-level conflict.
#[derive(Debug, Clone)]
pub struct ConflictEntry {
    /// Path of the conflicted file.
    pub path: BString,
    /// Type of conflict.
    pub conflict_type: ConflictType,
    /// Base (common ancestor) side.
    pub base: Option<ConflictSide>,
    /// Our side (current branch).
    pub ours: Option<ConflictSide>,
    /// Their side (branch being merged).
    pub theirs: Option<ConflictSide>,
}

/// Kinds of merge conflict a tree merge can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Both sides changed the same path and the changes overlap.
    Content,
    /// Ours deleted the path, theirs modified it.
    DeleteModify,
    /// Ours modified the path, theirs deleted it.
    ModifyDelete,
    /// Both sides added the same path with different content.
    AddAdd,
    /// The path is a blob on one side and a tree (or a different object
    /// type) on the other.
    TypeChange,
}

/// One side of a conflict.
#[derive(Debug, Clone)]
pub struct ConflictSide {
    /// Object ID of this side's content.
    pub oid: ObjectId,
    /// File mode.
    pub mode: FileMode,
    /// Path (always equal to the `ConflictEntry` path; no rename support).
    pub path: BString,
}

/// Result of a three-way content merge.
#[derive(Debug, Clone)]
pub enum ContentMergeResult {
    /// Clean merge, no conflicts.
    Clean(Vec<u8>),
    /// Conflict with markers in the content.
    Conflict {
        /// Merged content including conflict markers.
        content: Vec<u8>,
        /// Number of conflict regions.
        conflict_count: usize,
    },
}

impl ContentMergeResult {
    /// Whether the merge was clean.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    /// Get the merged content (with or without conflict markers).
    pub fn content(&self) -> &[u8] {
        match self {
            Self::Clean(data) => data,
            Self::Conflict { content, .. } => content,
        }
    }
}

/// The closed set of errors the merge core can raise. Every variant is
/// surfaced to callers decorated with the `"git.merge"` operation tag via
/// [`MergeError::code`].
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("you have unmerged paths; fix them and then commit the result")]
    UnmergedPaths,

    #[error("merge conflict in {} path(s)", .paths.len())]
    MergeConflict { paths: Vec<BString> },

    #[error("cannot merge: {0}")]
    MergeNotSupported(String),

    #[error("not possible to fast-forward, aborting")]
    FastForward,

    #[error("missing committer/author name")]
    MissingName,

    #[error("missing committer/author email")]
    MissingEmail,

    #[error("missing required parameter: {param}")]
    MissingParameter { param: String },

    #[error("invalid ref: {0}")]
    InvalidRef(String),

    #[error("no commit: {0}")]
    NoCommit(String),

    #[error("HEAD is detached")]
    DetachedHead,

    #[error("checkout would overwrite local changes: {0}")]
    CheckoutConflict(String),

    #[error(transparent)]
    Diff(#[from] git_diff::DiffError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Repo(#[from] git_repository::RepoError),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    RevWalk(#[from] git_revwalk::RevWalkError),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Lock(#[from] git_utils::LockError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Stable, machine-checkable identifier for this error, independent of
    /// the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::UnmergedPaths => "unmerged_paths",
            Self::MergeConflict { .. } => "merge_conflict",
            Self::MergeNotSupported(_) => "merge_not_supported",
            Self::FastForward => "fast_forward",
            Self::MissingName => "missing_name",
            Self::MissingEmail => "missing_email",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::InvalidRef(_) => "invalid_ref",
            Self::NoCommit(_) => "no_commit",
            Self::DetachedHead => "detached_head",
            Self::CheckoutConflict(_) => "checkout_conflict",
            Self::Diff(_) => "diff",
            Self::Odb(_) => "odb",
            Self::Repo(_) => "repo",
            Self::Index(_) => "index",
            Self::Ref(_) => "ref",
            Self::RevWalk(_) => "revwalk",
            Self::Config(_) => "config",
            Self::Object(_) => "object",
            Self::Lock(_) => "lock",
            Self::Io(_) => "io",
        }
    }

    /// The operation tag every merge error is decorated with.
    pub fn operation(&self) -> &'static str {
        "git.merge"
    }
}
