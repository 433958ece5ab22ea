//! Concurrent save and delete behaviour

use std::sync::Arc;

use blossom_core::Digest;
use blossom_storage::{BlobStore, FilesystemStore, InMemoryStore, SaveRequest, StorageError};
use tempfile::TempDir;

const WRITERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_saves_produce_one_object() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FilesystemStore::open(temp.path()).await.unwrap());
    let data: Arc<Vec<u8>> = Arc::new((0..256 * 1024).map(|i| (i % 251) as u8).collect());

    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let store = store.clone();
        let data = data.clone();
        handles.push(tokio::spawn(async move {
            store.save_bytes(&data, SaveRequest::new()).await
        }));
    }

    let mut descriptors = Vec::new();
    for handle in handles {
        descriptors.push(handle.await.unwrap().unwrap());
    }

    assert!(descriptors.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(descriptors[0].digest, Digest::of(&data));
    assert_eq!(store.object_count().await.unwrap(), 1);
    assert_eq!(store.index_count().unwrap(), 1);
    assert_eq!(std::fs::read_dir(temp.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_saves_all_land() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FilesystemStore::open(temp.path()).await.unwrap());

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .save_bytes(format!("blob number {i}").as_bytes(), SaveRequest::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.object_count().await.unwrap(), WRITERS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_succeed_once() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FilesystemStore::open(temp.path()).await.unwrap());
    let desc = store.save_bytes(b"contested", SaveRequest::new()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let digest = desc.digest;
            tokio::spawn(async move { store.delete(&digest).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StorageError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert!(!store.exists(&desc.digest).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_memory_concurrent_identical_saves() {
    let store = Arc::new(InMemoryStore::new());

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.save_bytes(b"shared", SaveRequest::new()).await })
        })
        .collect();

    let mut descriptors = Vec::new();
    for handle in handles {
        descriptors.push(handle.await.unwrap().unwrap());
    }
    assert!(descriptors.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.len(), 1);
}
