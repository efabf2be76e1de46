use geef::{ErrorKind, ReferenceKind};
use pretty_assertions::assert_eq;

mod common;

const COMMIT: &str = common::INITIAL_COMMIT;

#[test]
fn head_of_a_new_repository_is_an_unborn_branch() {
    let (_dir, repository) = common::init_repository();

    let head = repository.refs().head().unwrap();

    assert_eq!(head.kind(), ReferenceKind::Symbolic);
    assert_eq!(head.symbolic_target(), Some("refs/heads/master"));
    assert_eq!(head.resolve().unwrap_err().kind(), ErrorKind::Reference);
    assert!(repository.refs().list().unwrap().is_empty());
}

#[test]
fn head_follows_a_created_branch() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let refs = repository.refs();

    refs.create_direct("refs/heads/master", common::oid(COMMIT), false)?;

    assert_eq!(refs.head()?.target()?, common::oid(COMMIT));
    assert_eq!(refs.name_to_id("HEAD")?, common::oid(COMMIT));
    assert_eq!(refs.head()?.resolve()?.name(), "refs/heads/master");

    Ok(())
}

#[test]
fn chains_resolve_and_cycles_fail() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let refs = repository.refs();

    refs.create_direct("refs/heads/c", common::oid(COMMIT), false)?;
    refs.create_symbolic("refs/heads/b", "refs/heads/c", false)?;
    let a = refs.create_symbolic("refs/heads/a", "refs/heads/b", false)?;
    let looped = refs.create_symbolic("refs/heads/loop", "refs/heads/loop", false)?;

    assert_eq!(a.resolve()?.name(), "refs/heads/c");
    assert_eq!(a.target()?, common::oid(COMMIT));
    assert_eq!(looped.resolve().unwrap_err().kind(), ErrorKind::Reference);
    assert_eq!(
        refs.name_to_id("refs/heads/loop").unwrap_err().kind(),
        ErrorKind::Reference
    );

    Ok(())
}

#[test]
fn listing_and_globbing_cover_refs() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let refs = repository.refs();
    for name in ["refs/heads/master", "refs/heads/feature/x", "refs/tags/v1.0"] {
        refs.create_direct(name, common::oid(COMMIT), false)?;
    }

    assert_eq!(
        refs.list()?,
        vec!["refs/heads/feature/x", "refs/heads/master", "refs/tags/v1.0"]
    );
    assert_eq!(refs.glob("refs/tags/*")?, vec!["refs/tags/v1.0"]);
    assert_eq!(refs.glob("refs/heads/feature/*")?, vec!["refs/heads/feature/x"]);
    assert!(refs.glob("refs/remotes/*")?.is_empty());

    Ok(())
}

#[test]
fn invalid_names_are_rejected() {
    let (_dir, repository) = common::init_repository();
    let refs = repository.refs();

    for name in ["refs/heads/a..b", "refs/heads/x.lock", "master", "refs/heads/a b"] {
        assert_eq!(
            refs.create_direct(name, common::oid(COMMIT), false)
                .unwrap_err()
                .kind(),
            ErrorKind::Validation,
            "{name} should be rejected"
        );
    }
}

#[test]
fn deleted_references_are_gone() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let refs = repository.refs();
    refs.create_direct("refs/heads/topic", common::oid(COMMIT), false)?;

    refs.delete("refs/heads/topic")?;

    assert_eq!(
        refs.lookup("refs/heads/topic").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        refs.delete("refs/heads/topic").unwrap_err().kind(),
        ErrorKind::NotFound
    );

    Ok(())
}

#[test]
fn references_fail_after_the_repository_is_closed() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let refs = repository.refs();
    let head = refs.head()?;

    repository.close();

    assert_eq!(head.resolve().unwrap_err().kind(), ErrorKind::ClosedHandle);
    assert_eq!(refs.list().unwrap_err().kind(), ErrorKind::ClosedHandle);
    // the name is plain data
    assert_eq!(head.name(), "HEAD");

    Ok(())
}
