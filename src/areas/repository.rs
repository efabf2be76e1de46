//! Repository: the aggregate root owning the object database, the reference
//! namespace and the index of one git directory
//!
//! Handles given out by a repository ([`Odb`], [`RefDb`], references and the
//! shared [`Index`]) only hold weak pointers to its stores, so using them
//! after [`Repository::close`] fails with a closed handle error instead of
//! keeping the repository alive. Parsed objects and ids are plain values.

use crate::areas::config::{CONFIG_FILE, Config};
use crate::areas::database::{Database, Odb};
use crate::areas::index::Index;
use crate::areas::refs::{HEAD_REF_NAME, RefDb, Refs};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object::ParsedObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, IoContext, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const DEFAULT_BRANCH: &str = "master";

const GIT_DIR: &str = ".git";

const DESCRIPTION: &str =
    "Unnamed repository; edit this file 'description' to name the repository.\n";

#[derive(Debug)]
pub struct Repository {
    /// Path to the git directory
    path: Box<Path>,
    /// Working directory, `None` for a bare repository
    workdir: Option<Box<Path>>,
    config: Config,
    database: Arc<Database>,
    refs: Arc<Refs>,
    index: Arc<Mutex<Index>>,
}

impl Repository {
    /// Create the on-disk layout of a new repository at `path`
    ///
    /// A bare repository uses `path` itself as its git directory; otherwise
    /// the git directory is `path/.git` and `path` is the working directory.
    /// Initializing over an existing repository leaves its HEAD and config
    /// untouched.
    pub fn init(path: impl AsRef<Path>, bare: bool) -> Result<Self> {
        let path = path.as_ref();
        let git_dir = if bare {
            path.to_path_buf()
        } else {
            path.join(GIT_DIR)
        };

        for dir in ["objects/info", "objects/pack", "refs/heads", "refs/tags"] {
            let dir = git_dir.join(dir);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Unable to create directory {}", dir.display()))?;
        }

        Self::write_if_missing(
            &git_dir.join(HEAD_REF_NAME),
            &format!("ref: refs/heads/{DEFAULT_BRANCH}\n"),
        )?;
        Self::write_if_missing(&git_dir.join(CONFIG_FILE), &Config::initial(bare))?;
        Self::write_if_missing(&git_dir.join("description"), DESCRIPTION)?;

        let repository = Self::open_git_dir(&git_dir)?;
        info!(path = %repository.path.display(), bare, "initialized repository");

        Ok(repository)
    }

    fn write_if_missing(path: &Path, content: &str) -> Result<()> {
        if path.exists() {
            return Ok(());
        }

        fs::write(path, content).with_context(|| format!("Unable to write {}", path.display()))
    }

    /// Open an existing repository, given its working directory or its git
    /// directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("repository at {}", path.display())));
        }

        let dot_git = path.join(GIT_DIR);
        let git_dir = if dot_git.is_dir() {
            dot_git
        } else {
            path.to_path_buf()
        };

        let repository = Self::open_git_dir(&git_dir)?;
        info!(
            path = %repository.path.display(),
            bare = repository.is_bare(),
            "opened repository"
        );

        Ok(repository)
    }

    fn open_git_dir(git_dir: &Path) -> Result<Self> {
        let git_dir = git_dir
            .canonicalize()
            .with_context(|| format!("Unable to resolve {}", git_dir.display()))?;

        let layout_complete = git_dir.join(HEAD_REF_NAME).is_file()
            && git_dir.join("objects").is_dir()
            && git_dir.join("refs").is_dir();
        if !layout_complete {
            return Err(Error::NotFound(format!(
                "git repository at {}",
                git_dir.display()
            )));
        }

        let config = Config::load(&git_dir.join(CONFIG_FILE))?;
        let bare = match config.get_bool("core.bare")? {
            Some(bare) => bare,
            None => git_dir.file_name().is_none_or(|name| name != GIT_DIR),
        };
        let workdir = match bare {
            true => None,
            false => git_dir.parent().map(Into::into),
        };

        let database = Arc::new(Database::new(git_dir.join("objects").into_boxed_path()));
        let refs = Arc::new(Refs::new(git_dir.clone().into_boxed_path()));
        let index = Index::for_repository(git_dir.join("index").into_boxed_path(), &database)?;

        Ok(Repository {
            path: git_dir.into_boxed_path(),
            workdir,
            config,
            database,
            refs,
            index: Arc::new(Mutex::new(index)),
        })
    }

    /// Path to the git directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn workdir(&self) -> Result<&Path> {
        self.workdir.as_deref().ok_or_else(|| {
            Error::NotFound(format!(
                "working directory of bare repository {}",
                self.path.display()
            ))
        })
    }

    pub fn is_bare(&self) -> bool {
        self.workdir.is_none()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn odb(&self) -> Odb {
        Odb::bound(&self.database)
    }

    pub fn refs(&self) -> RefDb {
        RefDb::bound(&self.refs)
    }

    /// The repository's index, shared between callers
    ///
    /// The lock is a [`tokio::sync::Mutex`]: async code awaits
    /// [`Mutex::lock`]. Synchronous code outside a runtime uses
    /// [`Mutex::blocking_lock`], which panics when called from within an
    /// async context; there, use `lock().await` or move the work onto
    /// `tokio::task::spawn_blocking`.
    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    /// Read and decode an object, optionally requiring its type
    pub fn lookup(&self, oid: &ObjectId, expected: Option<ObjectType>) -> Result<ParsedObject> {
        let object = self.database.load(oid)?;
        if let Some(expected) = expected {
            object.expect_type(expected)?;
        }

        Ok(object)
    }

    /// The entry at a slash-separated `path` below a tree object
    pub fn tree_entry_bypath(&self, tree: &ParsedObject, path: &str) -> Result<DatabaseEntry> {
        tree.as_tree()?.entry_bypath(&self.odb(), path)
    }

    /// The tree object a commit points at
    pub fn commit_tree(&self, commit: &ParsedObject) -> Result<ParsedObject> {
        self.lookup(&commit.commit_tree_id()?, Some(ObjectType::Tree))
    }

    /// Release the repository
    ///
    /// Handles obtained from it stop working; objects read from it stay valid.
    pub fn close(self) {
        info!(path = %self.path.display(), "closed repository");
    }
}
