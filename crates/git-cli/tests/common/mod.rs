//! Shared test harness for git-cli integration tests.
//!
//! Provides process runners, assertion helpers, and repo setup utilities
//! used by the merge/cherry-pick/revert/merge-base test suite. Environment
//! variables are fully pinned for deterministic output across machines and
//! CI runners.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

// ──────────────────────────── Types ────────────────────────────

/// Captured output from running a command.
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

// ──────────────────────────── Binary Discovery ────────────────────────────

/// Discover the path to the compiled `gitr` binary.
pub fn gitr_bin() -> PathBuf {
    let mut path = std::env::current_exe()
        .unwrap()
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    path.push("gitr");
    path
}

// ──────────────────────────── Process Runners ────────────────────────────

/// Apply the full set of pinned environment variables to a `Command`.
fn pin_env(cmd: &mut Command, dir: &Path) {
    cmd.env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_AUTHOR_DATE", "1234567890 +0000")
        .env("GIT_COMMITTER_NAME", "Test Committer")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_DATE", "1234567890 +0000")
        .env("TZ", "UTC")
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("HOME", dir.parent().unwrap_or(dir))
        .env("GIT_PROTOCOL_FROM_USER", "0")
        .env("GIT_CONFIG_COUNT", "1")
        .env("GIT_CONFIG_KEY_0", "protocol.file.allow")
        .env("GIT_CONFIG_VALUE_0", "always");
}

/// Run C git in `dir` with the given arguments. Returns a `CommandResult`.
pub fn git(dir: &Path, args: &[&str]) -> CommandResult {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    pin_env(&mut cmd, dir);
    let output = cmd.output().expect("failed to run git");
    CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(128),
    }
}

/// Run the gitr binary in `dir` with the given arguments. Returns a `CommandResult`.
pub fn gitr(dir: &Path, args: &[&str]) -> CommandResult {
    let mut cmd = Command::new(gitr_bin());
    cmd.args(args).current_dir(dir);
    pin_env(&mut cmd, dir);
    let output = cmd.output().expect("failed to run gitr");
    CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(128),
    }
}

/// Run C git with a specific date override (for multi-commit scenarios).
pub fn git_with_date(dir: &Path, args: &[&str], epoch: &str) -> CommandResult {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    pin_env(&mut cmd, dir);
    cmd.env("GIT_AUTHOR_DATE", epoch)
        .env("GIT_COMMITTER_DATE", epoch);
    let output = cmd.output().expect("failed to run git");
    CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(128),
    }
}

/// Run gitr with a specific date override (for multi-commit scenarios).
pub fn gitr_with_date(dir: &Path, args: &[&str], epoch: &str) -> CommandResult {
    let mut cmd = Command::new(gitr_bin());
    cmd.args(args).current_dir(dir);
    pin_env(&mut cmd, dir);
    cmd.env("GIT_AUTHOR_DATE", epoch)
        .env("GIT_COMMITTER_DATE", epoch);
    let output = cmd.output().expect("failed to run gitr");
    CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(128),
    }
}

/// Generate a deterministic date string. Returns `"(1234567890 + counter) +0000"`.
pub fn next_date(counter: &mut u64) -> String {
    *counter += 1;
    format!("{} +0000", 1234567890u64 + *counter)
}

// ──────────────────────────── Assertion Helpers ────────────────────────────

/// Assert that stdout and exit_code are identical between git and gitr results.
pub fn assert_output_eq(git_result: &CommandResult, gitr_result: &CommandResult) {
    if git_result.exit_code != gitr_result.exit_code {
        panic!(
            "Exit code mismatch:\n  git:  {}\n  gitr: {}\n\ngit stdout:\n{}\ngitr stdout:\n{}\ngit stderr:\n{}\ngitr stderr:\n{}",
            git_result.exit_code, gitr_result.exit_code,
            git_result.stdout, gitr_result.stdout,
            git_result.stderr, gitr_result.stderr,
        );
    }
    if git_result.stdout != gitr_result.stdout {
        panic!(
            "Stdout mismatch (exit codes both {}):\n--- git ---\n{}\n--- gitr ---\n{}\n--- end ---",
            git_result.exit_code, git_result.stdout, gitr_result.stdout,
        );
    }
}

/// Assert that only exit codes match.
pub fn assert_exit_code_eq(git_result: &CommandResult, gitr_result: &CommandResult) {
    if git_result.exit_code != gitr_result.exit_code {
        panic!(
            "Exit code mismatch:\n  git:  {} (stdout: {:?})\n  gitr: {} (stdout: {:?})",
            git_result.exit_code,
            git_result.stdout.chars().take(200).collect::<String>(),
            gitr_result.exit_code,
            gitr_result.stdout.chars().take(200).collect::<String>(),
        );
    }
}

/// Run a command expected to fail, verify both git and gitr fail with same exit code.
pub fn assert_both_fail(dir_git: &Path, dir_gitr: &Path, args: &[&str]) {
    let g = git(dir_git, args);
    let m = gitr(dir_gitr, args);
    assert_ne!(g.exit_code, 0, "Expected git to fail for args {:?}, but it succeeded", args);
    assert_exit_code_eq(&g, &m);
}

/// Assert that `git ls-files -s` output matches between two repo directories.
pub fn assert_index_eq(dir_git: &Path, dir_gitr: &Path) {
    let g = git(dir_git, &["ls-files", "-s"]);
    let m = git(dir_gitr, &["ls-files", "-s"]);
    if g.stdout != m.stdout {
        panic!(
            "Index mismatch (git ls-files -s):\n--- git repo ---\n{}\n--- gitr repo ---\n{}\n--- end ---",
            g.stdout, m.stdout,
        );
    }
}

/// Assert that `git status --porcelain` output matches between two repo directories.
pub fn assert_worktree_eq(dir_git: &Path, dir_gitr: &Path) {
    let g = git(dir_git, &["status", "--porcelain"]);
    let m = git(dir_gitr, &["status", "--porcelain"]);
    if g.stdout != m.stdout {
        panic!(
            "Worktree mismatch (git status --porcelain):\n--- git repo ---\n{}\n--- gitr repo ---\n{}\n--- end ---",
            g.stdout, m.stdout,
        );
    }
}

/// Assert that `git rev-parse HEAD` output matches between two repo directories.
pub fn assert_head_eq(dir_git: &Path, dir_gitr: &Path) {
    let g = git(dir_git, &["rev-parse", "HEAD"]);
    let m = git(dir_gitr, &["rev-parse", "HEAD"]);
    if g.stdout != m.stdout {
        panic!(
            "HEAD mismatch:\n--- git repo ---\n{}\n--- gitr repo ---\n{}\n--- end ---",
            g.stdout.trim(), m.stdout.trim(),
        );
    }
}

/// Run `git fsck --full` on the given directory.
pub fn fsck(dir: &Path) -> CommandResult {
    git(dir, &["fsck", "--full"])
}

/// Run fsck and assert it passes cleanly.
pub fn assert_fsck_clean(dir: &Path) {
    let result = fsck(dir);
    assert_eq!(
        result.exit_code, 0,
        "fsck failed (exit {}):\nstdout: {}\nstderr: {}",
        result.exit_code, result.stdout, result.stderr,
    );
}

// ──────────────────────────── Repo Setup Helpers ────────────────────────────

/// Initialize an empty repo with `git init -b main` and basic config. No commits.
pub fn setup_empty_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.name", "Test Author"]);
    git(dir, &["config", "user.email", "test@example.com"]);
}

/// Create a repo with main (3 commits) and feature (2 commits diverging from commit 2).
/// Non-conflicting changes to different files.
pub fn setup_branched_history(dir: &Path) {
    setup_empty_repo(dir);
    let mut counter = 0u64;

    // 3 commits on main
    for i in 0..3 {
        let filename = format!("main_{}.txt", i);
        std::fs::write(dir.join(&filename), format!("main content {}\n", i)).unwrap();
        let date = next_date(&mut counter);
        git_with_date(dir, &["add", &filename], &date);
        git_with_date(dir, &["commit", "-m", &format!("main commit {}", i)], &date);
    }

    // Branch from commit 2 (HEAD~1)
    git(dir, &["checkout", "-b", "feature", "HEAD~1"]);

    // 2 divergent commits on feature (different files than main commit 2)
    for i in 0..2 {
        let filename = format!("feature_{}.txt", i);
        std::fs::write(dir.join(&filename), format!("feature content {}\n", i)).unwrap();
        let date = next_date(&mut counter);
        git_with_date(dir, &["add", &filename], &date);
        git_with_date(
            dir,
            &["commit", "-m", &format!("feature commit {}", i)],
            &date,
        );
    }

    // Return to main
    git(dir, &["checkout", "main"]);
}

/// Create a merge conflict scenario: both branches modify the same lines of `conflict.txt`.
pub fn setup_merge_conflict(dir: &Path) {
    setup_empty_repo(dir);
    let mut counter = 0u64;

    // Initial commit with conflict.txt
    std::fs::write(dir.join("conflict.txt"), "line 1\nline 2\nline 3\n").unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "conflict.txt"], &date);
    git_with_date(dir, &["commit", "-m", "initial"], &date);

    // Main branch modifies conflict.txt
    std::fs::write(dir.join("conflict.txt"), "line 1\nmain change\nline 3\n").unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "conflict.txt"], &date);
    git_with_date(dir, &["commit", "-m", "main change"], &date);

    // Create feature branch from initial commit
    git(dir, &["checkout", "-b", "feature", "HEAD~1"]);

    // Feature branch modifies same line of conflict.txt
    std::fs::write(
        dir.join("conflict.txt"),
        "line 1\nfeature change\nline 3\n",
    )
    .unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "conflict.txt"], &date);
    git_with_date(dir, &["commit", "-m", "feature change"], &date);

    // Return to main
    git(dir, &["checkout", "main"]);
}

/// Create a repo with multiple merge scenario branches ready to merge into main.
///
/// - `main`: 3 commits
/// - `ff-branch`: fast-forward mergeable (extends main)
/// - `merge-branch`: 3-way merge (diverged, no conflict)
/// - `conflict-branch`: conflicting changes to `shared.txt`
pub fn setup_merge_scenarios(dir: &Path) {
    setup_empty_repo(dir);
    let mut counter = 0u64;

    // Initial shared file
    std::fs::write(dir.join("shared.txt"), "line 1\nline 2\nline 3\n").unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "shared.txt"], &date);
    git_with_date(dir, &["commit", "-m", "initial"], &date);

    // 2 more commits on main
    for i in 0..2 {
        let f = format!("main_{}.txt", i);
        std::fs::write(dir.join(&f), format!("main content {}\n", i)).unwrap();
        let date = next_date(&mut counter);
        git_with_date(dir, &["add", &f], &date);
        git_with_date(dir, &["commit", "-m", &format!("main commit {}", i)], &date);
    }

    // ff-branch: extends tip of main
    git(dir, &["branch", "ff-branch"]);
    git(dir, &["checkout", "ff-branch"]);
    std::fs::write(dir.join("ff_file.txt"), "ff content\n").unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "ff_file.txt"], &date);
    git_with_date(dir, &["commit", "-m", "ff commit"], &date);
    git(dir, &["checkout", "main"]);

    // merge-branch: diverges from HEAD~1, no conflict
    git(dir, &["checkout", "-b", "merge-branch", "HEAD~1"]);
    std::fs::write(dir.join("merge_file.txt"), "merge content\n").unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "merge_file.txt"], &date);
    git_with_date(dir, &["commit", "-m", "merge branch commit"], &date);
    git(dir, &["checkout", "main"]);

    // conflict-branch: modifies shared.txt line 2
    git(dir, &["checkout", "-b", "conflict-branch", "HEAD~2"]);
    std::fs::write(dir.join("shared.txt"), "line 1\nconflict change\nline 3\n").unwrap();
    let date = next_date(&mut counter);
    git_with_date(dir, &["add", "shared.txt"], &date);
    git_with_date(dir, &["commit", "-m", "conflict commit"], &date);
    git(dir, &["checkout", "main"]);
}
