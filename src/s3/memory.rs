//! In-process object store
//!
//! [`MemoryClient`] implements [`ObjectClient`] over a map held in memory. It
//! behaves like a single S3 server with any number of buckets and is useful
//! for tests and for running the storage layer without a network.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::client::{ObjectBody, ObjectClient, ObjectEntry, ObjectStat};
use super::error::S3Error;

/// Size of the chunks a GET body is split into
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

type ObjectKey = (String, String);

/// [`ObjectClient`] that keeps objects in memory
#[derive(Debug)]
pub struct MemoryClient {
    objects: Mutex<BTreeMap<ObjectKey, Bytes>>,
    chunk_size: usize,
    open_bodies: Arc<AtomicUsize>,
    presign_requests: AtomicUsize,
    last_part_size: AtomicU64,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            chunk_size: chunk_size.max(1),
            open_bodies: Arc::new(AtomicUsize::new(0)),
            presign_requests: AtomicUsize::new(0),
            last_part_size: AtomicU64::new(0),
        }
    }

    /// Store an object directly, bypassing the upload path
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.lock()
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of GET bodies that have not been dropped yet
    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }

    /// Number of pre-signed URLs handed out so far
    pub fn presign_requests(&self) -> usize {
        self.presign_requests.load(Ordering::SeqCst)
    }

    /// Part size passed to the most recent upload, 0 before any upload
    pub fn last_part_size(&self) -> u64 {
        self.last_part_size.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ObjectKey, Bytes>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Bytes, S3Error> {
        self.object(bucket, key)
            .ok_or_else(|| S3Error::no_such_key(bucket, key))
    }
}

/// Counts itself as an open connection until dropped
struct OpenBody {
    open: Arc<AtomicUsize>,
}

impl OpenBody {
    fn new(open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { open }
    }
}

impl Drop for OpenBody {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        part_size: u64,
    ) -> Result<(), S3Error> {
        self.last_part_size.store(part_size, Ordering::SeqCst);
        let data = tokio::fs::read(local_path).await?;
        self.insert(bucket, key, data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, S3Error> {
        let data = self.get(bucket, key)?;
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(self.chunk_size)
            .map(|start| data.slice(start..(start + self.chunk_size).min(data.len())))
            .collect();

        // The guard travels with the stream and is dropped together with it
        let guard = OpenBody::new(self.open_bodies.clone());
        let body = stream::iter(chunks).map(move |chunk| {
            let _open = &guard;
            Ok::<_, S3Error>(chunk)
        });

        Ok(body.boxed())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, S3Error> {
        let data = self.get(bucket, key)?;
        Ok(ObjectStat {
            size: data.len() as u64,
        })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), S3Error> {
        self.lock()
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| S3Error::no_such_key(bucket, key))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, S3Error> {
        let objects = self.lock();
        let matching = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix));

        if recursive {
            return Ok(matching
                .map(|((_, key), data)| ObjectEntry {
                    object_name: key.clone(),
                    size: data.len() as u64,
                    is_dir: false,
                })
                .collect());
        }

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for ((_, key), data) in matching {
            match key[prefix.len()..].find('/') {
                Some(pos) => {
                    dirs.insert(key[..prefix.len() + pos + 1].to_string());
                }
                None => entries.push(ObjectEntry {
                    object_name: key.clone(),
                    size: data.len() as u64,
                    is_dir: false,
                }),
            }
        }

        let mut listing: Vec<ObjectEntry> = dirs
            .into_iter()
            .map(|name| ObjectEntry {
                object_name: name,
                size: 0,
                is_dir: true,
            })
            .collect();
        listing.extend(entries);

        Ok(listing)
    }

    async fn presigned_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, S3Error> {
        self.presign_requests.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "memory://{}/{}?X-Amz-Expires={}",
            bucket,
            key,
            expires.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_get_object_is_chunked() {
        let client = MemoryClient::with_chunk_size(4);
        client.insert("b", "k", "0123456789");

        let chunks: Vec<Bytes> = client
            .get_object("b", "k")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks, vec!["0123", "4567", "89"]);
    }

    #[tokio::test]
    async fn test_open_bodies_tracks_drop() {
        let client = MemoryClient::new();
        client.insert("b", "k", "data");

        let body = client.get_object("b", "k").await.unwrap();
        assert_eq!(client.open_bodies(), 1);

        drop(body);
        assert_eq!(client.open_bodies(), 0);
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let client = MemoryClient::new();

        assert!(client.stat_object("b", "nope").await.unwrap_err().is_no_such_key());
        assert!(client.remove_object("b", "nope").await.unwrap_err().is_no_such_key());
        assert!(client.get_object("b", "nope").await.err().unwrap().is_no_such_key());
    }

    #[tokio::test]
    async fn test_list_objects_recursive_and_flat() {
        let client = MemoryClient::new();
        client.insert("b", "a/1", "x");
        client.insert("b", "a/sub/2", "y");
        client.insert("b", "a/sub/3", "z");
        client.insert("other", "a/4", "w");

        let names = |entries: Vec<ObjectEntry>| -> Vec<String> {
            entries.into_iter().map(|e| e.object_name).collect()
        };

        let recursive = client.list_objects("b", "a/", true).await.unwrap();
        assert_eq!(names(recursive), vec!["a/1", "a/sub/2", "a/sub/3"]);

        let flat = client.list_objects("b", "a/", false).await.unwrap();
        assert!(flat[0].is_dir);
        assert_eq!(names(flat), vec!["a/sub/", "a/1"]);
    }
}
