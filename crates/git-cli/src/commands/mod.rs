pub mod cat_file;
pub mod cherry_pick;
pub mod commit_tree;
pub mod hash_object;
pub mod init;
pub mod merge;
pub mod merge_base;
pub mod read_tree;
pub mod revert;
pub mod symbolic_ref;
pub mod update_ref;
pub mod write_tree;

use anyhow::Result;
use clap::Subcommand;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Provide content or type and size information for repository objects
    CatFile(cat_file::CatFileArgs),
    /// Compute object ID and optionally create a blob from a file
    HashObject(hash_object::HashObjectArgs),
    /// Update the object name stored in a ref safely
    UpdateRef(update_ref::UpdateRefArgs),
    /// Read, modify and delete symbolic refs
    SymbolicRef(symbolic_ref::SymbolicRefArgs),
    /// Create a new commit object
    CommitTree(commit_tree::CommitTreeArgs),
    /// Create a tree object from the current index
    WriteTree(write_tree::WriteTreeArgs),
    /// Read tree information into the index
    ReadTree(read_tree::ReadTreeArgs),
    /// Create an empty Git repository or reinitialize an existing one
    Init(init::InitArgs),
    /// Join two or more development histories together
    Merge(merge::MergeArgs),
    /// Find as good common ancestors as possible for a merge
    MergeBase(merge_base::MergeBaseArgs),
    /// Apply the changes introduced by some existing commits
    CherryPick(cherry_pick::CherryPickArgs),
    /// Revert some existing commits
    Revert(revert::RevertArgs),
}

impl Commands {
    /// Get the command name as used in config keys (e.g., "merge", "cherry-pick").
    pub fn command_name(&self) -> &str {
        match self {
            Commands::CatFile(_) => "cat-file",
            Commands::HashObject(_) => "hash-object",
            Commands::UpdateRef(_) => "update-ref",
            Commands::SymbolicRef(_) => "symbolic-ref",
            Commands::CommitTree(_) => "commit-tree",
            Commands::WriteTree(_) => "write-tree",
            Commands::ReadTree(_) => "read-tree",
            Commands::Init(_) => "init",
            Commands::Merge(_) => "merge",
            Commands::MergeBase(_) => "merge-base",
            Commands::CherryPick(_) => "cherry-pick",
            Commands::Revert(_) => "revert",
        }
    }
}

/// Open a repository, respecting --git-dir override.
pub fn open_repo(cli: &Cli) -> Result<git_repository::Repository> {
    let repo = if let Some(ref git_dir) = cli.git_dir {
        git_repository::Repository::open(git_dir)?
    } else {
        git_repository::Repository::discover(".")?
    };
    Ok(repo)
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::CatFile(args) => cat_file::run(args, &cli),
        Commands::HashObject(args) => hash_object::run(args, &cli),
        Commands::UpdateRef(args) => update_ref::run(args, &cli),
        Commands::SymbolicRef(args) => symbolic_ref::run(args, &cli),
        Commands::CommitTree(args) => commit_tree::run(args, &cli),
        Commands::WriteTree(args) => write_tree::run(args, &cli),
        Commands::ReadTree(args) => read_tree::run(args, &cli),
        Commands::Init(args) => init::run(args, &cli),
        Commands::Merge(args) => merge::run(args, &cli),
        Commands::MergeBase(args) => merge_base::run(args, &cli),
        Commands::CherryPick(args) => cherry_pick::run(args, &cli),
        Commands::Revert(args) => revert::run(args, &cli),
    }
}
