//! Persists the state of a paused multi-commit operation (cherry-pick,
//! revert, or rebase) across process invocations.
//!
//! A cherry-pick or revert sequence lives under `.git/sequencer/`; a rebase
//! lives under `.git/rebase-merge/`. Either directory is either fully
//! present or fully absent — every mutator writes its files to a temporary
//! path first and renames them into place, so a process killed mid-write
//! leaves the previous complete state (or none) rather than a half-written
//! one.

use std::fs;
use std::path::{Path, PathBuf};

use bstr::BString;
use git_hash::ObjectId;
use git_repository::Repository;

use crate::cherry_pick;
use crate::revert;
use crate::{MergeError, MergeOptions, MergeResult};

const SEQUENCER_DIR: &str = "sequencer";
const REBASE_DIR: &str = "rebase-merge";
const TODO_FILE: &str = "git-rebase-todo";
const HEAD_NAME_FILE: &str = "head-name";
const ONTO_FILE: &str = "onto";
const ORIG_HEAD_FILE: &str = "orig-head";
const STOPPED_SHA_FILE: &str = "stopped-sha";

/// Which kind of paused sequence this store manages; determines the
/// on-disk directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    CherryPick,
    Revert,
    Rebase,
}

impl SequenceKind {
    fn dir_name(self) -> &'static str {
        match self {
            SequenceKind::CherryPick | SequenceKind::Revert => SEQUENCER_DIR,
            SequenceKind::Rebase => REBASE_DIR,
        }
    }
}

/// One line of a `git-rebase-todo` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoCommand {
    Pick(ObjectId),
    Reword(ObjectId),
    Edit(ObjectId),
    Squash(ObjectId),
    Fixup(ObjectId),
    Drop(ObjectId),
    Exec(String),
    Break,
    Label(String),
    Reset(String),
    Merge(ObjectId),
}

impl TodoCommand {
    fn to_line(&self) -> String {
        match self {
            TodoCommand::Pick(oid) => format!("pick {}", oid.to_hex()),
            TodoCommand::Reword(oid) => format!("reword {}", oid.to_hex()),
            TodoCommand::Edit(oid) => format!("edit {}", oid.to_hex()),
            TodoCommand::Squash(oid) => format!("squash {}", oid.to_hex()),
            TodoCommand::Fixup(oid) => format!("fixup {}", oid.to_hex()),
            TodoCommand::Drop(oid) => format!("drop {}", oid.to_hex()),
            TodoCommand::Exec(cmd) => format!("exec {cmd}"),
            TodoCommand::Break => "break".to_string(),
            TodoCommand::Label(name) => format!("label {name}"),
            TodoCommand::Reset(name) => format!("reset {name}"),
            TodoCommand::Merge(oid) => format!("merge {}", oid.to_hex()),
        }
    }

    fn from_line(line: &str) -> Result<Option<Self>, MergeError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut parts = line.splitn(2, ' ');
        let verb = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        let parse_oid = |s: &str| {
            ObjectId::from_hex(s.split_whitespace().next().unwrap_or(""))
                .map_err(|_| MergeError::InvalidRef(format!("bad oid in todo line: {line}")))
        };

        Ok(Some(match verb {
            "pick" | "p" => TodoCommand::Pick(parse_oid(rest)?),
            "reword" | "r" => TodoCommand::Reword(parse_oid(rest)?),
            "edit" | "e" => TodoCommand::Edit(parse_oid(rest)?),
            "squash" | "s" => TodoCommand::Squash(parse_oid(rest)?),
            "fixup" | "f" => TodoCommand::Fixup(parse_oid(rest)?),
            "drop" | "d" => TodoCommand::Drop(parse_oid(rest)?),
            "exec" | "x" => TodoCommand::Exec(rest.to_string()),
            "break" | "b" => TodoCommand::Break,
            "label" | "l" => TodoCommand::Label(rest.to_string()),
            "reset" | "t" => TodoCommand::Reset(rest.to_string()),
            "merge" | "m" => TodoCommand::Merge(parse_oid(rest)?),
            _ => return Err(MergeError::InvalidRef(format!("unknown todo command: {verb}"))),
        }))
    }
}

/// Outcome of running one more step of the sequence.
pub enum StepOutcome {
    /// The step applied cleanly; the sequence can continue.
    Continued,
    /// The step produced conflicts; the sequence is paused on disk.
    Paused(MergeResult),
    /// No commands remained; the state directory has been removed.
    Complete,
}

/// Reads and writes a paused sequence's on-disk state.
pub struct SequencerStore {
    git_dir: PathBuf,
    kind: SequenceKind,
}

impl SequencerStore {
    pub fn new(repo: &Repository, kind: SequenceKind) -> Self {
        Self {
            git_dir: repo.git_dir().to_path_buf(),
            kind,
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.git_dir.join(self.kind.dir_name())
    }

    /// True if a sequence of this kind has state on disk.
    pub fn is_in_progress(&self) -> bool {
        self.state_dir().exists()
    }

    /// Start a new sequence: writes `head-name`, `onto`, `orig-head`, and
    /// the initial todo list. Fails if a sequence is already in progress.
    pub fn init(
        &self,
        head_name: &str,
        onto: ObjectId,
        orig_head: ObjectId,
        commands: &[TodoCommand],
    ) -> Result<(), MergeError> {
        let dir = self.state_dir();
        if dir.exists() {
            return Err(MergeError::AlreadyExists(dir.display().to_string()));
        }

        let tmp_dir = self.git_dir.join(format!("{}.tmp", self.kind.dir_name()));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        fs::write(tmp_dir.join(HEAD_NAME_FILE), format!("{head_name}\n"))?;
        fs::write(tmp_dir.join(ONTO_FILE), format!("{}\n", onto.to_hex()))?;
        fs::write(tmp_dir.join(ORIG_HEAD_FILE), format!("{}\n", orig_head.to_hex()))?;
        self.write_todo_into(&tmp_dir, commands)?;

        fs::rename(&tmp_dir, &dir)?;
        Ok(())
    }

    /// Read the remaining todo list.
    pub fn read_todo(&self) -> Result<Vec<TodoCommand>, MergeError> {
        let path = self.state_dir().join(TODO_FILE);
        let content = fs::read_to_string(&path)?;
        let mut commands = Vec::new();
        for line in content.lines() {
            if let Some(cmd) = TodoCommand::from_line(line)? {
                commands.push(cmd);
            }
        }
        Ok(commands)
    }

    fn write_todo_into(&self, dir: &Path, commands: &[TodoCommand]) -> Result<(), MergeError> {
        let mut content = String::new();
        for cmd in commands {
            content.push_str(&cmd.to_line());
            content.push('\n');
        }
        let tmp = dir.join(format!("{TODO_FILE}.tmp"));
        fs::write(&tmp, &content)?;
        fs::rename(&tmp, dir.join(TODO_FILE))?;
        Ok(())
    }

    fn write_todo(&self, commands: &[TodoCommand]) -> Result<(), MergeError> {
        self.write_todo_into(&self.state_dir(), commands)
    }

    /// Run the next command in the todo list against `repo`.
    pub fn next(&self, repo: &mut Repository, options: &MergeOptions) -> Result<StepOutcome, MergeError> {
        let mut todo = self.read_todo()?;
        if todo.is_empty() {
            self.complete()?;
            return Ok(StepOutcome::Complete);
        }
        let command = todo.remove(0);

        let result = match &command {
            TodoCommand::Pick(oid) | TodoCommand::Reword(oid) | TodoCommand::Edit(oid) => {
                cherry_pick::cherry_pick(repo, oid, options)?
            }
            TodoCommand::Squash(oid) | TodoCommand::Fixup(oid) => {
                cherry_pick::cherry_pick(repo, oid, options)?
            }
            TodoCommand::Merge(oid) => revert::revert(repo, oid, options)?,
            TodoCommand::Drop(_) | TodoCommand::Label(_) | TodoCommand::Reset(_) => {
                self.write_todo(&todo)?;
                return Ok(StepOutcome::Continued);
            }
            TodoCommand::Exec(_) | TodoCommand::Break => {
                self.write_stopped_sha(None)?;
                self.write_todo(&todo)?;
                return Ok(StepOutcome::Paused(MergeResult::conflicted(Vec::new())));
            }
        };

        if !result.is_clean {
            let stopped = command_oid(&command);
            self.write_stopped_sha(stopped)?;
            self.write_todo(&todo)?;
            return Ok(StepOutcome::Paused(result));
        }

        self.write_todo(&todo)?;
        if todo.is_empty() {
            self.complete()?;
            return Ok(StepOutcome::Complete);
        }
        Ok(StepOutcome::Continued)
    }

    fn write_stopped_sha(&self, oid: Option<ObjectId>) -> Result<(), MergeError> {
        let path = self.state_dir().join(STOPPED_SHA_FILE);
        match oid {
            Some(oid) => fs::write(path, format!("{}\n", oid.to_hex()))?,
            None => {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    /// Read the commit the sequence started from.
    pub fn orig_head(&self) -> Result<ObjectId, MergeError> {
        let content = fs::read_to_string(self.state_dir().join(ORIG_HEAD_FILE))?;
        ObjectId::from_hex(content.trim())
            .map_err(|_| MergeError::InvalidRef("invalid orig-head".into()))
    }

    /// Read the branch name the sequence will restore HEAD to.
    pub fn head_name(&self) -> Result<BString, MergeError> {
        let content = fs::read_to_string(self.state_dir().join(HEAD_NAME_FILE))?;
        Ok(BString::from(content.trim()))
    }

    /// Abort the sequence: restore HEAD/index to `orig_head` and remove
    /// the state directory. A missing state directory is not an error —
    /// aborting with nothing in progress is a no-op, matching `git
    /// cherry-pick --abort` outside a cherry-pick.
    pub fn abort(&self, repo: &mut Repository) -> Result<(), MergeError> {
        if !self.is_in_progress() {
            return Ok(());
        }

        let orig_head = self.orig_head()?;
        let tree = match repo.odb().read(&orig_head)? {
            Some(git_object::Object::Commit(c)) => c.tree,
            _ => return Err(MergeError::NoCommit(orig_head.to_hex().to_string())),
        };

        let head_ref = git_ref::RefName::new(BString::from("HEAD"))?;
        use git_ref::RefStore;
        match repo.refs().resolve(&head_ref)? {
            Some(git_ref::Reference::Symbolic { target, .. }) => {
                repo.refs().write_ref(&target, &orig_head)?;
            }
            _ => repo.refs().write_ref(&head_ref, &orig_head)?,
        }

        let mut index = git_index::Index::new();
        rebuild_index_from_tree(repo.odb(), &tree, &BString::new(Vec::new()), &mut index)?;
        repo.set_index(index);
        repo.write_index()?;

        self.complete()
    }

    /// Remove the state directory. A missing directory is not an error.
    pub fn complete(&self) -> Result<(), MergeError> {
        let dir = self.state_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn command_oid(command: &TodoCommand) -> Option<ObjectId> {
    match command {
        TodoCommand::Pick(oid)
        | TodoCommand::Reword(oid)
        | TodoCommand::Edit(oid)
        | TodoCommand::Squash(oid)
        | TodoCommand::Fixup(oid)
        | TodoCommand::Drop(oid)
        | TodoCommand::Merge(oid) => Some(*oid),
        TodoCommand::Exec(_) | TodoCommand::Break | TodoCommand::Label(_) | TodoCommand::Reset(_) => None,
    }
}

fn rebuild_index_from_tree(
    odb: &git_odb::ObjectDatabase,
    tree_oid: &ObjectId,
    prefix: &BString,
    index: &mut git_index::Index,
) -> Result<(), MergeError> {
    let tree = match odb.read(tree_oid)? {
        Some(git_object::Object::Tree(t)) => t,
        _ => return Err(MergeError::NoCommit(tree_oid.to_hex().to_string())),
    };
    for entry in &tree.entries {
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&entry.name);
        if entry.mode.is_tree() {
            rebuild_index_from_tree(odb, &entry.oid, &path, index)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::Sha1([byte; 20])
    }

    #[test]
    fn todo_command_round_trips_through_text() {
        let commands = vec![
            TodoCommand::Pick(oid(1)),
            TodoCommand::Exec("make test".into()),
            TodoCommand::Break,
            TodoCommand::Label("onto".into()),
        ];
        for cmd in &commands {
            let line = cmd.to_line();
            let parsed = TodoCommand::from_line(&line).unwrap().unwrap();
            assert_eq!(&parsed, cmd);
        }
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(TodoCommand::from_line("").unwrap().is_none());
        assert!(TodoCommand::from_line("# a comment").unwrap().is_none());
    }

    #[test]
    fn sequence_kind_picks_directory_name() {
        assert_eq!(SequenceKind::Rebase.dir_name(), "rebase-merge");
        assert_eq!(SequenceKind::CherryPick.dir_name(), "sequencer");
    }
}
