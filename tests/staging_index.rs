use futures::future::join_all;
use geef::artifacts::objects::blob::Blob;
use geef::{EntryMode, ErrorKind, Index, ObjectId, ObjectType, Repository};
use pretty_assertions::{assert_eq, assert_ne};
use std::sync::Arc;

mod common;

#[test]
fn empty_index_writes_the_empty_tree() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let odb = repository.odb();
    let mut index = Index::new();

    assert_eq!(index.write_tree_to(&odb)?, ObjectId::EMPTY_TREE);

    index.add(common::entry("a.txt", common::HELLO_BLOB))?;
    index.clear();

    assert_eq!(index.write_tree_to(&odb)?, ObjectId::EMPTY_TREE);
    assert_eq!(
        repository
            .lookup(&ObjectId::EMPTY_TREE, Some(ObjectType::Tree))?
            .as_tree()?
            .len(),
        0
    );

    Ok(())
}

#[test]
fn identical_entries_give_identical_trees() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let odb = repository.odb();
    let build = |paths: &[(&str, &str)]| -> geef::Result<ObjectId> {
        let mut index = Index::new();
        for (path, hex) in paths {
            index.add(common::entry(path, hex))?;
        }
        index.write_tree_to(&odb)
    };

    let first = build(&[("a.txt", common::HELLO_BLOB), ("dir/file.txt", common::NESTED_BLOB)])?;
    let reordered = build(&[("dir/file.txt", common::NESTED_BLOB), ("a.txt", common::HELLO_BLOB)])?;
    let renamed = build(&[("b.txt", common::HELLO_BLOB), ("dir/file.txt", common::NESTED_BLOB)])?;
    let other_oid = build(&[("a.txt", common::NESTED_BLOB), ("dir/file.txt", common::NESTED_BLOB)])?;

    assert_eq!(first, common::oid(common::ROOT_TREE));
    assert_eq!(first, reordered);
    assert_ne!(first, renamed);
    assert_ne!(first, other_oid);

    Ok(())
}

#[tokio::test]
async fn repository_index_persists_across_opens() -> Result<(), Box<dyn std::error::Error>> {
    let (dir, repository) = common::init_repository();
    {
        let index = repository.index();
        let mut index = index.lock().await;
        index.add(common::entry("a.txt", common::HELLO_BLOB))?;
        index.add(common::entry("dir/file.txt", common::NESTED_BLOB))?;
        index.write()?;
    }
    repository.close();

    let reopened = Repository::open(dir.path())?;
    let index = reopened.index();
    let index = index.lock().await;

    assert_eq!(index.len(), 2);
    assert_eq!(
        index.get("dir/file.txt").map(|entry| entry.oid),
        Some(common::oid(common::NESTED_BLOB))
    );
    assert_eq!(index.write_tree()?, common::oid(common::ROOT_TREE));

    Ok(())
}

#[tokio::test]
async fn read_tree_uses_the_repository_store() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let tree_oid = {
        let mut index = Index::new();
        index.add(common::entry("a.txt", common::HELLO_BLOB))?;
        index.add(common::entry("dir/file.txt", common::NESTED_BLOB))?;
        index.write_tree_to(&repository.odb())?
    };
    let tree = repository.lookup(&tree_oid, Some(ObjectType::Tree))?;

    let index = repository.index();
    let mut index = index.lock().await;
    index.add(common::entry("stale.txt", common::HELLO_BLOB))?;
    index.read_tree(&tree)?;

    let paths = index.entries().map(|entry| entry.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths, vec!["a.txt", "dir/file.txt"]);
    assert!(
        index
            .entries()
            .all(|entry| entry.mode != EntryMode::Directory)
    );

    Ok(())
}

#[test]
fn in_memory_index_cannot_read_nested_trees_alone() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let mut index = Index::new();
    index.add(common::entry("dir/file.txt", common::NESTED_BLOB))?;
    let tree = repository.lookup(&index.write_tree_to(&repository.odb())?, None)?;

    let error = Index::new().read_tree(&tree).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn index_fails_after_the_repository_is_closed() {
    let (_dir, repository) = common::init_repository();
    let index = repository.index();

    repository.close();

    let index = index.lock().await;
    assert_eq!(index.write_tree().unwrap_err().kind(), ErrorKind::ClosedHandle);
}

#[tokio::test]
async fn concurrent_lookups_see_the_same_objects() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, repository) = common::init_repository();
    let odb = repository.odb();
    let contents = (0..8).map(|_| common::random_content()).collect::<Vec<_>>();
    let oids = contents
        .iter()
        .map(|content| odb.write(&Blob::from(content.as_str())))
        .collect::<geef::Result<Vec<_>>>()?;
    let repository = Arc::new(repository);

    let lookups = oids.iter().map(|oid| {
        let repository = repository.clone();
        let oid = *oid;
        tokio::task::spawn_blocking(move || {
            repository
                .lookup(&oid, Some(ObjectType::Blob))
                .map(|object| object.as_blob().map(|blob| blob.content().to_vec()))
        })
    });
    let results = join_all(lookups).await;

    for (result, content) in results.into_iter().zip(&contents) {
        assert_eq!(result???, content.as_bytes());
    }

    Ok(())
}
