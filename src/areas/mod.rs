//! Stateful stores of a repository
//!
//! - `config`: the git-format `config` file
//! - `database`: loose object database
//! - `index`: staging area (index file)
//! - `refs`: reference namespace (HEAD, branches, tags)
//! - `repository`: the aggregate root tying the stores to one git directory

pub mod config;
pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
