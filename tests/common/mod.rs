#![allow(dead_code)]

use assert_fs::TempDir;
use fake::Fake;
use fake::faker::lorem::en::Words;
use geef::{EntryMode, FileMode, IndexEntry, ObjectId, Repository};
use std::path::Path;
use std::process::Command;

pub const HELLO_BLOB: &str = "ce013625030ba8dba906f756967f9e9ca394464a";
pub const NESTED_BLOB: &str = "79c53955ef856f16f2107446bc721c8879a1bd2e";
pub const DIR_TREE: &str = "a0bfcd746c0f863f39a713ec61daaf96aba0957f";
pub const ROOT_TREE: &str = "b565590018feef277dce26b3648c36a343f7f65e";
pub const INITIAL_COMMIT: &str = "936d42a6ab22d7fea546cc0c341545718254fd99";

pub fn oid(hex: &str) -> ObjectId {
    ObjectId::try_parse(hex).expect("valid object id fixture")
}

pub fn entry(path: &str, hex: &str) -> IndexEntry {
    IndexEntry::new(path.to_string(), oid(hex), EntryMode::File(FileMode::Regular))
}

pub fn random_content() -> String {
    Words(5..10).fake::<Vec<String>>().join(" ")
}

/// A fresh non-bare repository in its own temporary directory
pub fn init_repository() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repository = Repository::init(dir.path(), false).expect("Failed to init repository");

    (dir, repository)
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Run git in `dir` with a fixed identity and clock, returning its stdout
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_AUTHOR_DATE", "1700000000 +0000")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_DATE", "1700000000 +0000")
        .output()
        .expect("Failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8(output.stdout).expect("git output is not UTF-8")
}

/// Lay out `a.txt` and `dir/file.txt` and commit them with git
pub fn git_repository_with_commit() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    git(dir.path(), &["init", "--quiet"]);
    std::fs::write(dir.path().join("a.txt"), "hello\n").expect("Failed to write a.txt");
    std::fs::create_dir_all(dir.path().join("dir")).expect("Failed to create dir");
    std::fs::write(dir.path().join("dir/file.txt"), "nested\n").expect("Failed to write file");
    git(dir.path(), &["add", "a.txt", "dir/file.txt"]);
    git(dir.path(), &["commit", "--quiet", "-m", "initial"]);

    dir
}

// Helper function to create hexdump representation
pub fn to_hexdump(data: &[u8]) -> String {
    let mut result = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        result.push_str(&format!("{:08x}: ", i * 16));

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                result.push(' ');
            }
            result.push_str(&format!("{:02x} ", byte));
        }

        for j in chunk.len()..16 {
            if j == 8 {
                result.push(' ');
            }
            result.push_str("   ");
        }

        result.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() {
                result.push(*byte as char);
            } else {
                result.push('.');
            }
        }

        result.push_str("|\n");
    }
    result
}

// Macro to compare index contents with hexdump output on failure
#[macro_export]
macro_rules! assert_index_eq {
    ($geef_content:expr, $git_content:expr) => {
        if $geef_content != $git_content {
            pretty_assertions::assert_eq!(
                common::to_hexdump($geef_content),
                common::to_hexdump($git_content),
                "\n=== INDEX CONTENTS DIFFER ===\ngeef index ({} bytes) vs git index ({} bytes)",
                $geef_content.len(),
                $git_content.len()
            );
        }
    };
}
