//! Git references (HEAD, branches, tags)
//!
//! References are human-readable names pointing at objects, either:
//! - Direct: the file holds a 40-character object id
//! - Symbolic: the file holds `ref: <name>` (e.g. HEAD -> refs/heads/master)
//!
//! Loose reference files under the git directory take precedence over the
//! entries of the `packed-refs` file.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::ref_name::RefName;
use crate::artifacts::refs::reference::{Reference, ReferenceTarget};
use crate::artifacts::refs::{MAX_SYMREF_DEPTH, SYMREF_REGEX};
use crate::errors::{Error, IoContext, Result};
use file_guard::Lock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Read, Seek, Write};
use std::ops::DerefMut;
use std::path::Path;
use regex::Regex;
use std::sync::{Arc, LazyLock, Weak};
use tracing::debug;
use walkdir::WalkDir;

static SYMREF: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(SYMREF_REGEX));

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Name of the packed references file
const PACKED_REFS_FILE: &str = "packed-refs";

/// Reference storage rooted at a git directory
#[derive(Debug)]
pub struct Refs {
    /// Path to the git directory (typically `.git`)
    path: Box<Path>,
}

impl Refs {
    pub fn new(path: Box<Path>) -> Self {
        Refs { path }
    }

    pub fn refs_path(&self) -> Box<Path> {
        self.path.join("refs").into_boxed_path()
    }

    fn packed_refs_path(&self) -> Box<Path> {
        self.path.join(PACKED_REFS_FILE).into_boxed_path()
    }

    /// Look up a reference by its full name
    pub fn lookup(self: &Arc<Self>, name: &str) -> Result<Reference> {
        let name = RefName::try_parse(name)?;

        match self.read_target(name.as_ref())? {
            Some(target) => Ok(self.reference(name.into_inner(), target)),
            None => Err(Error::NotFound(format!("reference {name}"))),
        }
    }

    pub fn head(self: &Arc<Self>) -> Result<Reference> {
        self.lookup(HEAD_REF_NAME)
    }

    /// Follow the symbolic chain of `reference` down to a direct reference
    ///
    /// Fails with a reference error on a cycle, a dangling target or a chain
    /// longer than [`MAX_SYMREF_DEPTH`].
    pub fn resolve(self: &Arc<Self>, reference: &Reference) -> Result<Reference> {
        let mut current = reference.clone();
        let mut seen = HashSet::from([current.name().to_string()]);

        for _ in 0..=MAX_SYMREF_DEPTH {
            let target = match current.target_value() {
                ReferenceTarget::Direct(oid) => {
                    debug!(ref_name = %reference.name(), oid = %oid, "resolved reference");
                    return Ok(current);
                }
                ReferenceTarget::Symbolic(target) => target.clone(),
            };

            if !seen.insert(target.clone()) {
                return Err(Error::Reference(format!(
                    "symbolic reference cycle through {target} starting at {}",
                    reference.name()
                )));
            }

            let target_name = RefName::try_parse(&target).map_err(|_| {
                Error::Reference(format!(
                    "{} points at invalid reference name {target:?}",
                    current.name()
                ))
            })?;
            current = match self.read_target(target_name.as_ref())? {
                Some(value) => self.reference(target_name.into_inner(), value),
                None => {
                    return Err(Error::Reference(format!(
                        "{} points at missing reference {target}",
                        current.name()
                    )));
                }
            };
        }

        Err(Error::Reference(format!(
            "symbolic reference chain from {} is deeper than {MAX_SYMREF_DEPTH}",
            reference.name()
        )))
    }

    /// The object id `name` finally points at
    pub fn name_to_id(self: &Arc<Self>, name: &str) -> Result<ObjectId> {
        let reference = self.lookup(name)?;

        match self.resolve(&reference)?.target_value() {
            ReferenceTarget::Direct(oid) => Ok(*oid),
            ReferenceTarget::Symbolic(target) => Err(Error::Reference(format!(
                "{name} resolved to symbolic reference {target}"
            ))),
        }
    }

    /// Every reference name under `refs/`, loose and packed, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = self.read_packed_refs()?.into_keys().collect::<BTreeSet<_>>();
        names.extend(self.list_loose_refs()?);

        Ok(names.into_iter().collect())
    }

    /// Reference names matching a shell glob such as `refs/tags/*`
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::Validation(format!("invalid glob pattern {pattern:?}: {e}")))?;

        Ok(self
            .list()?
            .into_iter()
            .filter(|name| pattern.matches(name))
            .collect())
    }

    pub fn create_direct(
        self: &Arc<Self>,
        name: &str,
        oid: ObjectId,
        force: bool,
    ) -> Result<Reference> {
        let name = self.check_writable(name, force)?;

        self.update_ref_file(name.as_ref(), format!("{oid}\n"))?;
        debug!(ref_name = %name, oid = %oid, "created reference");

        Ok(self.reference(name.into_inner(), ReferenceTarget::Direct(oid)))
    }

    pub fn create_symbolic(
        self: &Arc<Self>,
        name: &str,
        target: &str,
        force: bool,
    ) -> Result<Reference> {
        let name = self.check_writable(name, force)?;
        let target = RefName::try_parse(target)?;

        self.update_ref_file(name.as_ref(), format!("ref: {target}\n"))?;
        debug!(ref_name = %name, target = %target, "created symbolic reference");

        Ok(self.reference(
            name.into_inner(),
            ReferenceTarget::Symbolic(target.into_inner()),
        ))
    }

    /// Remove a reference from both the loose files and `packed-refs`
    pub fn delete(&self, name: &str) -> Result<()> {
        let name = RefName::try_parse(name)?;
        let ref_path = self.path.join(name.as_ref());

        let loose = ref_path.is_file();
        if loose {
            std::fs::remove_file(&ref_path)
                .with_context(|| format!("Unable to delete ref file {}", ref_path.display()))?;
            self.prune_empty_parent_dirs(&ref_path)?;
        }
        let packed = self.remove_packed_ref(name.as_ref())?;

        if !loose && !packed {
            return Err(Error::NotFound(format!("reference {name}")));
        }
        debug!(ref_name = %name, "deleted reference");

        Ok(())
    }

    fn reference(self: &Arc<Self>, name: String, target: ReferenceTarget) -> Reference {
        Reference::new(name, target, Arc::downgrade(self))
    }

    fn check_writable(&self, name: &str, force: bool) -> Result<RefName> {
        let name = RefName::try_parse(name)?;

        if !force && self.read_target(name.as_ref())?.is_some() {
            return Err(Error::Validation(format!("reference {name} already exists")));
        }

        Ok(name)
    }

    /// Read the value stored for `name`, loose file first, then `packed-refs`
    fn read_target(&self, name: &str) -> Result<Option<ReferenceTarget>> {
        let ref_path = self.path.join(name);

        if ref_path.is_file() {
            let content = std::fs::read_to_string(&ref_path)
                .with_context(|| format!("Unable to read ref file {}", ref_path.display()))?;
            return Self::parse_ref_content(name, content.trim()).map(Some);
        }

        Ok(self
            .read_packed_refs()?
            .remove(name)
            .map(ReferenceTarget::Direct))
    }

    fn parse_ref_content(name: &str, content: &str) -> Result<ReferenceTarget> {
        if content.is_empty() {
            return Err(Error::Corruption(format!("reference {name} is empty")));
        }

        let symref_regex = SYMREF
            .as_ref()
            .map_err(|e| Error::Corruption(format!("invalid symref pattern: {e}")))?;
        if let Some(symref_match) = symref_regex.captures(content) {
            return Ok(ReferenceTarget::Symbolic(symref_match[1].trim().to_string()));
        }

        ObjectId::try_parse(content)
            .map(ReferenceTarget::Direct)
            .map_err(|_| Error::Corruption(format!("reference {name} holds {content:?}")))
    }

    /// Parse `packed-refs`: `<oid> <name>` lines, skipping the `#` header and
    /// the `^<oid>` peeled lines of annotated tags
    fn read_packed_refs(&self) -> Result<BTreeMap<String, ObjectId>> {
        let packed_path = self.packed_refs_path();
        if !packed_path.is_file() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&packed_path)
            .with_context(|| format!("Unable to read {}", packed_path.display()))?;

        content
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('^'))
            .map(|line| {
                let (oid, name) = line.split_once(' ').ok_or_else(|| {
                    Error::Corruption(format!("malformed packed-refs line {line:?}"))
                })?;
                let oid = ObjectId::try_parse(oid).map_err(|_| {
                    Error::Corruption(format!("malformed packed-refs line {line:?}"))
                })?;

                Ok((name.to_string(), oid))
            })
            .collect()
    }

    /// Drop `name` (and its peeled line) from `packed-refs`
    ///
    /// # Returns
    ///
    /// Whether the file held the reference
    fn remove_packed_ref(&self, name: &str) -> Result<bool> {
        let packed_path = self.packed_refs_path();
        if !packed_path.is_file() {
            return Ok(false);
        }

        let mut packed_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&packed_path)
            .with_context(|| format!("Unable to open {}", packed_path.display()))?;
        let mut lock = file_guard::lock(&mut packed_file, Lock::Exclusive, 0, 1)
            .with_context(|| format!("Unable to lock {}", packed_path.display()))?;

        let mut content = String::new();
        lock.deref_mut()
            .read_to_string(&mut content)
            .with_context(|| format!("Unable to read {}", packed_path.display()))?;

        let mut found = false;
        let mut skipping_peeled = false;
        let mut kept = String::with_capacity(content.len());
        for line in content.lines() {
            if skipping_peeled && line.starts_with('^') {
                continue;
            }
            skipping_peeled = false;

            if line.split_once(' ').is_some_and(|(_, ref_name)| ref_name == name)
                && !line.starts_with('#')
            {
                found = true;
                skipping_peeled = true;
                continue;
            }
            kept.push_str(line);
            kept.push('\n');
        }

        if found {
            let file = lock.deref_mut();
            file.set_len(0)
                .with_context(|| format!("Unable to truncate {}", packed_path.display()))?;
            file.rewind()
                .with_context(|| format!("Unable to rewind {}", packed_path.display()))?;
            file.write_all(kept.as_bytes())
                .with_context(|| format!("Unable to write {}", packed_path.display()))?;
        }

        Ok(found)
    }

    fn list_loose_refs(&self) -> Result<Vec<String>> {
        let refs_path = self.refs_path();
        if !refs_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&refs_path) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative_path) = entry.path().strip_prefix(self.path.as_ref()) else {
                continue;
            };
            let name = relative_path
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            // lock files and other strays are not references
            if RefName::try_parse(name.as_str()).is_ok() {
                names.push(name);
            }
        }

        Ok(names)
    }

    fn update_ref_file(&self, name: &str, raw_ref: String) -> Result<()> {
        let path = self.path.join(name);

        // create all the parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Unable to create ref directory {}", parent.display())
            })?;
        }

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Unable to open ref file {}", path.display()))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)
            .with_context(|| format!("Unable to lock ref file {}", path.display()))?;
        lock.deref_mut()
            .write_all(raw_ref.as_bytes())
            .with_context(|| format!("Unable to write ref file {}", path.display()))?;

        Ok(())
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && parent.starts_with(self.refs_path())
            && parent != self.refs_path().as_ref()
            && parent
                .read_dir()
                .with_context(|| format!("Unable to list {}", parent.display()))?
                .next()
                .is_none()
        {
            std::fs::remove_dir(parent).with_context(|| {
                format!("Unable to remove empty ref directory {}", parent.display())
            })?;
            self.prune_empty_parent_dirs(parent)?;
        }

        Ok(())
    }
}

/// Handle to the reference namespace of a repository
///
/// Stops working once the repository is closed.
#[derive(Debug, Clone)]
pub struct RefDb {
    refs: Weak<Refs>,
}

impl RefDb {
    pub(crate) fn bound(refs: &Arc<Refs>) -> Self {
        RefDb {
            refs: Arc::downgrade(refs),
        }
    }

    fn refs(&self) -> Result<Arc<Refs>> {
        self.refs
            .upgrade()
            .ok_or(Error::ClosedHandle("reference namespace"))
    }

    pub fn lookup(&self, name: &str) -> Result<Reference> {
        self.refs()?.lookup(name)
    }

    pub fn head(&self) -> Result<Reference> {
        self.refs()?.head()
    }

    pub fn name_to_id(&self, name: &str) -> Result<ObjectId> {
        self.refs()?.name_to_id(name)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.refs()?.list()
    }

    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        self.refs()?.glob(pattern)
    }

    pub fn create_direct(&self, name: &str, oid: ObjectId, force: bool) -> Result<Reference> {
        self.refs()?.create_direct(name, oid, force)
    }

    pub fn create_symbolic(&self, name: &str, target: &str, force: bool) -> Result<Reference> {
        self.refs()?.create_symbolic(name, target, force)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.refs()?.delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::refs::reference::ReferenceKind;
    use crate::errors::ErrorKind;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const OID: &str = "936d42a6ab22d7fea546cc0c341545718254fd99";
    const OTHER_OID: &str = "ce013625030ba8dba906f756967f9e9ca394464a";

    struct Namespace {
        dir: TempDir,
        refs: Arc<Refs>,
    }

    impl Namespace {
        fn write(&self, name: &str, content: &str) {
            let path = self.dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[fixture]
    fn namespace() -> Namespace {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        let refs = Arc::new(Refs::new(dir.path().into()));

        Namespace { dir, refs }
    }

    fn oid(hex: &str) -> ObjectId {
        ObjectId::try_parse(hex).unwrap()
    }

    #[rstest]
    fn direct_reference_resolves_to_itself(namespace: Namespace) {
        namespace.write("refs/heads/main", &format!("{OID}\n"));

        let reference = namespace.refs.lookup("refs/heads/main").unwrap();
        let resolved = namespace.refs.resolve(&reference).unwrap();

        assert_eq!(reference.kind(), ReferenceKind::Direct);
        assert_eq!(resolved, reference);
        assert_eq!(resolved.target().unwrap(), oid(OID));
    }

    #[rstest]
    fn symbolic_chain_resolves_to_its_end(namespace: Namespace) {
        namespace.write("refs/heads/c", &format!("{OID}\n"));
        namespace.write("refs/heads/b", "ref: refs/heads/c\n");
        namespace.write("refs/heads/a", "ref: refs/heads/b\n");

        let reference = namespace.refs.lookup("refs/heads/a").unwrap();

        assert_eq!(reference.kind(), ReferenceKind::Symbolic);
        assert_eq!(reference.symbolic_target(), Some("refs/heads/b"));
        assert_eq!(reference.resolve().unwrap().name(), "refs/heads/c");
        assert_eq!(reference.target().unwrap(), oid(OID));
        assert_eq!(namespace.refs.name_to_id("refs/heads/a").unwrap(), oid(OID));
    }

    #[rstest]
    #[case::self_cycle(&[("refs/heads/a", "ref: refs/heads/a")])]
    #[case::two_cycle(&[("refs/heads/a", "ref: refs/heads/b"), ("refs/heads/b", "ref: refs/heads/a")])]
    #[case::dangling(&[("refs/heads/a", "ref: refs/heads/missing")])]
    #[case::escaping(&[("refs/heads/a", "ref: ../../outside")])]
    fn broken_chains_are_reference_errors(
        namespace: Namespace,
        #[case] files: &[(&str, &str)],
    ) {
        for (name, content) in files {
            namespace.write(name, content);
        }

        let reference = namespace.refs.lookup("refs/heads/a").unwrap();

        assert_eq!(
            reference.resolve().unwrap_err().kind(),
            ErrorKind::Reference
        );
    }

    #[rstest]
    fn overlong_chain_is_a_reference_error(namespace: Namespace) {
        for i in 0..=MAX_SYMREF_DEPTH {
            namespace.write(
                &format!("refs/heads/r{i}"),
                &format!("ref: refs/heads/r{}\n", i + 1),
            );
        }
        namespace.write(
            &format!("refs/heads/r{}", MAX_SYMREF_DEPTH + 1),
            &format!("{OID}\n"),
        );

        let error = namespace.refs.name_to_id("refs/heads/r0").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Reference);
    }

    #[rstest]
    fn missing_reference_is_not_found(namespace: Namespace) {
        assert_eq!(
            namespace.refs.lookup("refs/heads/nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[rstest]
    fn empty_and_garbage_ref_files_are_corrupt(namespace: Namespace) {
        namespace.write("refs/heads/empty", "\n");
        namespace.write("refs/heads/garbage", "not an id\n");

        for name in ["refs/heads/empty", "refs/heads/garbage"] {
            assert_eq!(
                namespace.refs.lookup(name).unwrap_err().kind(),
                ErrorKind::Corruption
            );
        }
    }

    #[rstest]
    fn packed_refs_are_read_and_shadowed_by_loose_files(namespace: Namespace) {
        namespace.write(
            "packed-refs",
            &format!(
                "# pack-refs with: peeled fully-peeled sorted \n\
                 {OID} refs/heads/main\n\
                 {OID} refs/tags/v1\n\
                 ^{OTHER_OID}\n"
            ),
        );
        namespace.write("refs/heads/main", &format!("{OTHER_OID}\n"));

        assert_eq!(namespace.refs.name_to_id("refs/tags/v1").unwrap(), oid(OID));
        assert_eq!(
            namespace.refs.name_to_id("refs/heads/main").unwrap(),
            oid(OTHER_OID)
        );
        assert_eq!(
            namespace.refs.list().unwrap(),
            vec!["refs/heads/main", "refs/tags/v1"]
        );
    }

    #[rstest]
    fn glob_filters_listed_names(namespace: Namespace) {
        namespace.write("refs/heads/main", &format!("{OID}\n"));
        namespace.write("refs/heads/feature/x", &format!("{OID}\n"));
        namespace.write("refs/tags/v1", &format!("{OID}\n"));
        namespace.write("HEAD", "ref: refs/heads/main\n");

        assert_eq!(
            namespace.refs.glob("refs/heads/*").unwrap(),
            vec!["refs/heads/feature/x", "refs/heads/main"]
        );
        assert_eq!(namespace.refs.glob("refs/tags/*").unwrap(), vec!["refs/tags/v1"]);
        assert_eq!(
            namespace.refs.glob("refs/heads/[").unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[rstest]
    fn created_references_need_force_to_be_replaced(namespace: Namespace) {
        let created = namespace
            .refs
            .create_direct("refs/heads/topic/one", oid(OID), false)
            .unwrap();

        assert_eq!(created.target().unwrap(), oid(OID));
        assert_eq!(
            std::fs::read_to_string(namespace.dir.path().join("refs/heads/topic/one")).unwrap(),
            format!("{OID}\n")
        );
        assert_eq!(
            namespace
                .refs
                .create_direct("refs/heads/topic/one", oid(OTHER_OID), false)
                .unwrap_err()
                .kind(),
            ErrorKind::Validation
        );

        namespace
            .refs
            .create_direct("refs/heads/topic/one", oid(OTHER_OID), true)
            .unwrap();
        assert_eq!(
            namespace.refs.name_to_id("refs/heads/topic/one").unwrap(),
            oid(OTHER_OID)
        );
    }

    #[rstest]
    fn symbolic_references_are_written_in_git_format(namespace: Namespace) {
        namespace.write("refs/heads/main", &format!("{OID}\n"));

        namespace
            .refs
            .create_symbolic("HEAD", "refs/heads/main", false)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(namespace.dir.path().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert_eq!(namespace.refs.head().unwrap().target().unwrap(), oid(OID));
    }

    #[rstest]
    fn delete_removes_loose_and_packed_entries(namespace: Namespace) {
        namespace.write(
            "packed-refs",
            &format!("{OID} refs/tags/v1\n^{OTHER_OID}\n{OID} refs/tags/v2\n"),
        );
        namespace.write("refs/heads/topic/one", &format!("{OID}\n"));

        namespace.refs.delete("refs/heads/topic/one").unwrap();
        namespace.refs.delete("refs/tags/v1").unwrap();

        assert!(!namespace.dir.path().join("refs/heads/topic").exists());
        assert!(namespace.dir.path().join("refs/heads").exists());
        assert_eq!(namespace.refs.list().unwrap(), vec!["refs/tags/v2"]);
        assert_eq!(
            namespace.refs.delete("refs/tags/v1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[rstest]
    fn references_outliving_their_namespace_are_closed(namespace: Namespace) {
        namespace.write("refs/heads/main", &format!("{OID}\n"));
        namespace.write("HEAD", "ref: refs/heads/main\n");
        let head = namespace.refs.head().unwrap();
        let handle = RefDb::bound(&namespace.refs);

        drop(namespace.refs);

        assert_eq!(head.resolve().unwrap_err().kind(), ErrorKind::ClosedHandle);
        assert_eq!(handle.list().unwrap_err().kind(), ErrorKind::ClosedHandle);
    }
}
