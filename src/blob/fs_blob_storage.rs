use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bytes::Bytes;
use futures::StreamExt;
use futures_core::Stream;
use sha1::{Digest, Sha1};
use tokio::fs::{create_dir_all, remove_file, rename, try_exists, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, trace};
use uuid::Uuid;

/// A file that was written to the storage, with the checksums of its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: PathBuf,
    pub size: u64,
    pub sha1: [u8;20],
    pub md5: [u8;16],
}

/// Stores files in a directory tree under their repository-relative path, i.e. in the layout of
///  a local Maven repository.
///
/// Files are written to a uniquely named temporary file first and renamed when complete, so a
///  file that exists under its final name is always complete.
pub struct FsBlobStorage {
    root: PathBuf,
}
impl FsBlobStorage {
    pub fn new(root: PathBuf) -> FsBlobStorage {
        FsBlobStorage { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(relative_path.trim_start_matches('/'));
        if relative.components().any(|c| !matches!(c, std::path::Component::Normal(_))) {
            bail!("invalid relative path {:?}", relative_path);
        }
        Ok(self.root.join(relative))
    }

    pub async fn get(&self, relative_path: &str) -> anyhow::Result<Option<PathBuf>> {
        let path = self.path_for(relative_path)?;
        if try_exists(&path).await? {
            trace!("found {} in local storage", path.display());
            Ok(Some(path))
        }
        else {
            Ok(None)
        }
    }

    pub async fn insert(&self, relative_path: &str, data: impl Stream<Item=anyhow::Result<Bytes>> + Send) -> anyhow::Result<StoredBlob> {
        let path = self.path_for(relative_path)?;
        let file_name = path.file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("no file name in {:?}", relative_path))?;
        let temp_path = path.with_file_name(format!("{}.{}.inserting", file_name, Uuid::new_v4().as_hyphenated()));

        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }
        trace!("inserting {} via {}", path.display(), temp_path.display());

        match Self::do_insert(&temp_path, data).await {
            Ok((size, sha1, md5)) => {
                rename(&temp_path, &path).await?;
                Ok(StoredBlob { path, size, sha1, md5 })
            }
            Err(e) => {
                if let Err(cleanup_error) = remove_file(&temp_path).await {
                    error!("error cleaning up {} after failed attempt to insert: {}", temp_path.display(), cleanup_error);
                }
                Err(e)
            }
        }
    }

    async fn do_insert(temp_path: &Path, data: impl Stream<Item=anyhow::Result<Bytes>> + Send) -> anyhow::Result<(u64, [u8;20], [u8;16])> {
        let mut data = Box::pin(data);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp_path)
            .await?;

        let mut size = 0u64;
        let mut sha1_hasher: Sha1 = Default::default();
        let mut md5_hasher = md5::Context::new();

        while let Some(bytes) = data.next().await {
            let bytes = bytes?;
            size += bytes.len() as u64;
            sha1_hasher.update(&bytes);
            md5_hasher.consume(&bytes);
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        Ok((size, sha1_hasher.finalize().into(), md5_hasher.compute().into()))
    }

    /// Returns `false` if there was no such file
    pub async fn delete(&self, path: &Path) -> anyhow::Result<bool> {
        if !path.starts_with(&self.root) {
            bail!("{} is outside of {}", path.display(), self.root.display());
        }
        trace!("deleting {}", path.display());
        match remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use anyhow::anyhow;
    use hex::ToHex;
    use super::*;

    fn chunks(chunks: Vec<anyhow::Result<&'static str>>) -> impl Stream<Item=anyhow::Result<Bytes>> + Send {
        futures::stream::iter(chunks.into_iter().map(|c| c.map(Bytes::from)))
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf());
        let relative_path = "org/acme/lib/1.0/lib-1.0.jar";

        assert_eq!(storage.get(relative_path).await.unwrap(), None);

        let stored = storage.insert(relative_path, chunks(vec![Ok("hello"), Ok(" world")])).await.unwrap();
        assert_eq!(stored.path, dir.path().join(relative_path));
        assert_eq!(stored.size, 11);
        assert_eq!(stored.sha1.encode_hex::<String>(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(std::fs::read_to_string(&stored.path).unwrap(), "hello world");

        assert_eq!(storage.get(relative_path).await.unwrap(), Some(stored.path.clone()));
        assert!(storage.delete(&stored.path).await.unwrap());
        assert!(!storage.delete(&stored.path).await.unwrap());
        assert_eq!(storage.get(relative_path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf());
        let relative_path = "g/a/1/a-1.jar";

        let result = storage.insert(relative_path, chunks(vec![Ok("partial"), Err(anyhow!("connection reset"))])).await;
        assert!(result.is_err());
        assert_eq!(storage.get(relative_path).await.unwrap(), None);

        let leftovers = std::fs::read_dir(dir.path().join("g/a/1")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_path_for_rejects_escaping_paths() {
        let storage = FsBlobStorage::new(PathBuf::from("/tmp/repo"));
        assert!(storage.path_for("../etc/passwd").is_err());
        assert!(storage.path_for("/g/a/1/a-1.jar").is_ok());
    }

    #[tokio::test]
    async fn test_delete_refuses_files_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().join("repo"));
        let outside = dir.path().join("other.jar");
        std::fs::write(&outside, "x").unwrap();

        assert!(storage.delete(&outside).await.is_err());
        assert!(outside.exists());
    }
}
