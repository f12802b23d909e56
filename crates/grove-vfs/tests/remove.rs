//! Unlink and rmdir semantics across every child lifecycle state, and
//! their interaction with in-flight loads.

use std::sync::Arc;

use grove_vfs::{InodeHandle, VfsError};

use grove_testutil::{FakeBackingStore, TestWorkspace, TreeBuilder};

/// The directory structure most tests below start from.
async fn unlink_fixture() -> TestWorkspace {
    let mut builder = TreeBuilder::new();
    builder.set_files(&[
        ("dir/a.txt", "This is a.txt.\n"),
        ("dir/b.txt", "This is b.txt.\n"),
        ("dir/c.txt", "This is c.txt.\n"),
        ("readme.txt", "File in the root directory.\n"),
    ]);
    TestWorkspace::new(&builder).await
}

#[tokio::test]
async fn unlink_missing_entry() {
    let t = unlink_fixture().await;
    let dir = t.tree_inode("dir").await;
    assert!(matches!(
        dir.unlink("notpresent.txt"),
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn unlink_never_loaded_child() {
    let t = unlink_fixture().await;
    let dir = t.tree_inode("dir").await;

    dir.unlink("a.txt").expect("unlink");

    assert!(matches!(
        dir.child_inode_number("a.txt"),
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn unlink_number_assigned_child() {
    let t = unlink_fixture().await;
    let dir = t.tree_inode("dir").await;

    dir.child_inode_number("a.txt").expect("assign number");
    dir.unlink("a.txt").expect("unlink");

    assert!(matches!(
        dir.child_inode_number("a.txt"),
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn unlink_loaded_child() {
    let t = unlink_fixture().await;
    let dir = t.tree_inode("dir").await;

    let file = t.file_inode("dir/a.txt").await;
    assert_eq!(
        file.number(),
        dir.child_inode_number("a.txt").expect("number")
    );

    dir.unlink("a.txt").expect("unlink");

    assert!(matches!(
        dir.child_inode_number("a.txt"),
        Err(VfsError::NotFound(_))
    ));
    // The held reference still reads its contents.
    assert_eq!(file.read().await.unwrap(), b"This is a.txt.\n");
    assert_eq!(file.perms(), 0o644);
}

#[tokio::test]
async fn unlink_materialized_child() {
    let t = unlink_fixture().await;
    let dir = t.tree_inode("dir").await;

    let file = t.file_inode("dir/a.txt").await;
    file.materialize_for_write().await.expect("materialize");
    let new_contents = b"new contents for the file\ntesting testing\n123\ntesting testing\n";
    let written = file.write_at(0, new_contents).expect("write");
    assert_eq!(written, new_contents.len());

    dir.unlink("a.txt").expect("unlink");

    assert!(matches!(
        dir.child_inode_number("a.txt"),
        Err(VfsError::NotFound(_))
    ));
    assert_eq!(file.read().await.unwrap(), new_contents);
}

#[tokio::test]
async fn unlink_locally_created_child() {
    let t = unlink_fixture().await;
    let dir = t.tree_inode("dir").await;

    let contents = "This is a new file that does not exist in source control\n";
    t.add_file("dir/new.txt", contents).await;
    let file = t.file_inode("dir/new.txt").await;

    dir.unlink("new.txt").expect("unlink");

    assert!(matches!(
        dir.child_inode_number("new.txt"),
        Err(VfsError::NotFound(_))
    ));
    assert_eq!(file.read().await.unwrap(), contents.as_bytes());
}

#[tokio::test]
async fn unlink_refuses_directories() {
    let t = unlink_fixture().await;
    let root = t.workspace().root();
    assert!(matches!(
        root.unlink("dir"),
        Err(VfsError::IsADirectory(_))
    ));
    // The directory is untouched.
    assert!(root.contains("dir"));
}

// ---------------------------------------------------------------------------
// rmdir
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rmdir_missing_entry() {
    let t = unlink_fixture().await;
    let root = t.workspace().root();
    assert!(matches!(
        root.rmdir("nope").await,
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn rmdir_refuses_files() {
    let t = unlink_fixture().await;
    let root = t.workspace().root();
    assert!(matches!(
        root.rmdir("readme.txt").await,
        Err(VfsError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn rmdir_refuses_non_empty_directories() {
    let t = unlink_fixture().await;
    let root = t.workspace().root();
    assert!(matches!(
        root.rmdir("dir").await,
        Err(VfsError::DirectoryNotEmpty(_))
    ));
    assert!(root.contains("dir"));
}

#[tokio::test]
async fn rmdir_removes_empty_tracked_directory() {
    let mut builder = TreeBuilder::new();
    builder.set_file("readme.txt", "root file\n");
    builder.mkdir("emptydir");
    let t = TestWorkspace::new(&builder).await;

    let root = t.workspace().root();
    root.rmdir("emptydir").await.expect("rmdir");
    assert!(!root.contains("emptydir"));
    assert!(matches!(
        t.workspace().resolve("emptydir").await,
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn rmdir_removes_empty_untracked_directory() {
    let t = unlink_fixture().await;
    let root = t.workspace().root();
    root.mkdir("scratch", 0o755).expect("mkdir");

    root.rmdir("scratch").await.expect("rmdir");
    assert!(!root.contains("scratch"));
}

#[tokio::test]
async fn rmdir_refuses_directory_with_untracked_file() {
    let t = unlink_fixture().await;
    let root = t.workspace().root();
    let scratch = root.mkdir("scratch", 0o755).expect("mkdir");
    scratch
        .create_file("kept.txt", b"keep me\n", 0o644)
        .expect("create file");

    assert!(matches!(
        root.rmdir("scratch").await,
        Err(VfsError::DirectoryNotEmpty(_))
    ));
    assert_eq!(t.read_file("scratch/kept.txt").await, b"keep me\n");
}

// ---------------------------------------------------------------------------
// Concurrent load and removal
// ---------------------------------------------------------------------------

/// A load and a removal of the same still-loading directory must resolve
/// deterministically in one of two ways: the load links first and the
/// removal takes the loaded object out, or the removal wins and the load's
/// result is discarded instead of being linked back.
#[tokio::test]
async fn rmdir_racing_in_flight_load() {
    grove_testutil::init_tracing();

    let mut builder = TreeBuilder::new();
    builder.set_file("dir/other.txt", "other\n");
    builder.mkdir("dir/sub");

    let backing = Arc::new(FakeBackingStore::new());
    let root_hash = builder.finalize(&backing, true);
    let t = TestWorkspace::open(Arc::clone(&backing), root_hash).await;

    // Gate the subdirectory's tree so its load stays in flight.
    let sub_hash = builder.hash_of("dir/sub");
    backing.set_unready(&sub_hash);

    let dir = t.tree_inode("dir").await;
    let load_dir = Arc::clone(&dir);
    let load_task =
        tokio::spawn(async move { load_dir.load_child("sub").await });

    // Let the load reach its suspension point, then start the removal,
    // which suspends on the same gated fetch.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let rmdir_dir = Arc::clone(&dir);
    let rmdir_task = tokio::spawn(async move { rmdir_dir.rmdir("sub").await });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    backing.set_ready(&sub_hash);

    let load_result = load_task.await.expect("load task");
    let rmdir_result = rmdir_task.await.expect("rmdir task");

    rmdir_result.expect("rmdir of an empty directory succeeds");
    match load_result {
        // The load linked first and the removal took the object out; the
        // held handle stays usable.
        Ok(InodeHandle::Tree(sub)) => assert!(sub.is_empty()),
        Ok(other) => panic!("unexpected handle: {other:?}"),
        // The removal won and the load's result was discarded.
        Err(VfsError::NotFound(_)) => {}
        Err(other) => panic!("unexpected load error: {other}"),
    }

    // Either way the name is gone and never reappears.
    assert!(!dir.contains("sub"));
    assert!(matches!(
        dir.child_inode_number("sub"),
        Err(VfsError::NotFound(_))
    ));
}

/// An unlink completing while the sibling file's blob is still gated: the
/// file inode constructs immediately, so the reference obtained before the
/// unlink keeps working once the blob becomes ready.
#[tokio::test]
async fn unlink_while_blob_fetch_pending() {
    let mut builder = TreeBuilder::new();
    builder.set_file("dir/slow.txt", "slow blob contents\n");
    builder.set_file("dir/fast.txt", "fast\n");

    let backing = Arc::new(FakeBackingStore::new());
    let root_hash = builder.finalize(&backing, true);
    let t = TestWorkspace::open(Arc::clone(&backing), root_hash).await;

    let blob_hash = builder.hash_of("dir/slow.txt");
    backing.set_unready(&blob_hash);

    let dir = t.tree_inode("dir").await;
    let file = t.file_inode("dir/slow.txt").await;

    let read_file = Arc::clone(&file);
    let read_task = tokio::spawn(async move { read_file.read().await });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    dir.unlink("slow.txt").expect("unlink");
    backing.set_ready(&blob_hash);

    // The read started before the unlink still returns the contents.
    let contents = read_task.await.expect("read task").expect("read");
    assert_eq!(contents, b"slow blob contents\n");
    assert!(!dir.contains("slow.txt"));
}

/// Coalescing: two concurrent loads of the same gated directory issue one
/// backing-store fetch and resolve to the same inode.
#[tokio::test]
async fn concurrent_loads_coalesce() {
    let mut builder = TreeBuilder::new();
    builder.set_file("dir/sub/inner.txt", "inner\n");

    let backing = Arc::new(FakeBackingStore::new());
    let root_hash = builder.finalize(&backing, true);
    let t = TestWorkspace::open(Arc::clone(&backing), root_hash).await;

    let sub_hash = builder.hash_of("dir/sub");
    backing.set_unready(&sub_hash);

    let dir = t.tree_inode("dir").await;
    let fetches_before = t.backing().tree_fetch_count();

    let first_dir = Arc::clone(&dir);
    let first = tokio::spawn(async move { first_dir.load_child("sub").await });
    let second_dir = Arc::clone(&dir);
    let second = tokio::spawn(async move { second_dir.load_child("sub").await });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    backing.set_ready(&sub_hash);

    let first = first.await.expect("task").expect("load");
    let second = second.await.expect("task").expect("load");
    assert_eq!(first.number(), second.number());

    // A single fetch reached the backing store for the subdirectory.
    assert_eq!(t.backing().tree_fetch_count(), fetches_before + 1);
}
