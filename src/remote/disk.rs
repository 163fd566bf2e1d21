/// Filesystem-backed remote cache
///
/// Layout:
/// - `<dir>/cas/ab/abcd1234...` - content-addressed blobs (first 2 chars = subdir)
/// - `<dir>/ac/ab/abcd1234...` - JSON action results keyed by action key
///
/// Writes go through a temp file in the destination directory followed by a
/// rename, so readers never observe a partially written blob or entry, and a
/// download only touches the exec root once every blob was fetched.
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{ActionResult, OutputFile, RemoteActionCache, RequestMetadata};
use crate::context::FileOutErr;
use crate::digest::{ActionKey, DigestUtil};
use crate::error::CacheError;
use crate::logging::{operations, services, status};
use crate::proto::Digest;

pub struct DiskCache {
    cas_dir: PathBuf,
    ac_dir: PathBuf,
    digest_util: DigestUtil,
}

impl DiskCache {
    /// Open (and create if needed) a disk cache rooted at `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref();
        let cas_dir = dir.join("cas");
        let ac_dir = dir.join("ac");

        fs::create_dir_all(&cas_dir)?;
        fs::create_dir_all(&ac_dir)?;

        Ok(Self {
            cas_dir,
            ac_dir,
            digest_util: DigestUtil::new(),
        })
    }

    fn cas_path(&self, digest: &Digest) -> PathBuf {
        sharded(&self.cas_dir, &digest.hash)
    }

    fn ac_path(&self, key: &ActionKey) -> PathBuf {
        sharded(&self.ac_dir, key.hash())
    }

    /// Whether an action result is registered for `key`
    pub fn contains_action(&self, key: &ActionKey) -> bool {
        self.ac_path(key).is_file()
    }

    pub fn contains_blob(&self, digest: &Digest) -> bool {
        self.cas_path(digest).is_file()
    }

    fn put_blob_file(&self, path: &Path) -> Result<Digest, CacheError> {
        let mut source = File::open(path)?;
        self.put_blob_reader(&mut source)
    }

    /// Stream a blob into the CAS, hashing the bytes as they are written
    ///
    /// The blob lands under the digest of what was actually copied, so an
    /// output rewritten mid-upload can never be stored under a stale digest.
    fn put_blob_reader<R: Read>(&self, source: &mut R) -> Result<Digest, CacheError> {
        let mut tmp = NamedTempFile::new_in(&self.cas_dir)?;
        let digest = self.digest_util.copy_and_compute(source, &mut tmp)?;

        let dest = self.cas_path(&digest);
        if !dest.exists() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| CacheError::from(e.error))?;
        }
        Ok(digest)
    }

    fn put_blob_bytes(&self, data: &[u8]) -> Result<Digest, CacheError> {
        let digest = self.digest_util.compute(data);
        let dest = self.cas_path(&digest);
        if !dest.exists() {
            write_atomically(&dest, |tmp| tmp.write_all(data))?;
        }
        Ok(digest)
    }

    /// Copy a blob into a temp file next to `dest`; persisted by the caller
    fn stage_blob(
        &self,
        digest: &Digest,
        dest: &Path,
        executable: bool,
    ) -> Result<NamedTempFile, CacheError> {
        let blob = self.cas_path(digest);
        let mut source = match File::open(&blob) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CacheError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        io::copy(&mut source, &mut tmp)?;
        set_mode(tmp.as_file(), executable)?;
        Ok(tmp)
    }
}

impl RemoteActionCache for DiskCache {
    fn get_cached_action_result(
        &self,
        key: &ActionKey,
        _metadata: &RequestMetadata,
    ) -> Result<ActionResult, CacheError> {
        let path = self.ac_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    service = services::DISK_CACHE,
                    operation = operations::GET,
                    status = status::MISS,
                    action_id = %key.hash(),
                    "cache miss"
                );
                return Err(CacheError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let result: ActionResult = serde_json::from_slice(&data).map_err(|e| {
            CacheError::Transport(format!(
                "corrupt action result {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(
            service = services::DISK_CACHE,
            operation = operations::GET,
            status = status::SUCCESS,
            action_id = %key.hash(),
            "cache hit"
        );

        Ok(result)
    }

    fn download(
        &self,
        result: &ActionResult,
        exec_root: &Path,
        out_err: &FileOutErr,
        _metadata: &RequestMetadata,
    ) -> Result<(), CacheError> {
        let mut staged = Vec::with_capacity(result.output_files.len() + 2);

        for output in &result.output_files {
            let relative = checked_relative(&output.path)?;
            let dest = exec_root.join(relative);
            let tmp = self.stage_blob(&output.digest, &dest, output.is_executable)?;
            staged.push((tmp, dest));
        }

        if let Some(digest) = &result.stdout_digest {
            let dest = out_err.stdout_path().to_path_buf();
            staged.push((self.stage_blob(digest, &dest, false)?, dest));
        }
        if let Some(digest) = &result.stderr_digest {
            let dest = out_err.stderr_path().to_path_buf();
            staged.push((self.stage_blob(digest, &dest, false)?, dest));
        }

        // A failed persist removes what this download already committed, so
        // the exec root never holds a partial result
        let count = staged.len();
        let mut committed: Vec<PathBuf> = Vec::with_capacity(count);
        for (tmp, dest) in staged {
            if let Err(e) = tmp.persist(&dest) {
                for path in &committed {
                    if let Err(remove_err) = fs::remove_file(path) {
                        warn!(
                            service = services::DISK_CACHE,
                            operation = operations::DOWNLOAD,
                            path = %path.display(),
                            "failed to roll back output: {}",
                            remove_err
                        );
                    }
                }
                return Err(CacheError::from(e.error));
            }
            committed.push(dest);
        }

        debug!(
            service = services::DISK_CACHE,
            operation = operations::DOWNLOAD,
            status = status::SUCCESS,
            entry_count = count,
            "outputs materialized"
        );

        Ok(())
    }

    fn upload(
        &self,
        key: &ActionKey,
        exec_root: &Path,
        files: &[PathBuf],
        out_err: &FileOutErr,
        upload_action: bool,
        _metadata: &RequestMetadata,
    ) -> Result<(), CacheError> {
        let mut result = ActionResult::default();

        for file in files {
            let stat = match fs::metadata(file) {
                Ok(stat) => stat,
                // Failed actions may not produce every declared output
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !stat.is_file() {
                continue;
            }

            let digest = self.put_blob_file(file)?;
            let relative = file.strip_prefix(exec_root).unwrap_or(file);
            result.output_files.push(OutputFile {
                path: relative.to_string_lossy().into_owned(),
                digest,
                is_executable: is_executable(&stat),
            });
        }

        let stdout = out_err.read_stdout()?;
        if !stdout.is_empty() {
            result.stdout_digest = Some(self.put_blob_bytes(&stdout)?);
        }
        let stderr = out_err.read_stderr()?;
        if !stderr.is_empty() {
            result.stderr_digest = Some(self.put_blob_bytes(&stderr)?);
        }

        if upload_action {
            let json = serde_json::to_vec_pretty(&result)
                .map_err(|e| CacheError::Transport(format!("failed to encode action result: {}", e)))?;
            write_atomically(&self.ac_path(key), |tmp| tmp.write_all(&json))?;
        }

        info!(
            service = services::DISK_CACHE,
            operation = operations::UPLOAD,
            status = status::SUCCESS,
            action_id = %key.hash(),
            entry_count = result.output_files.len(),
            upload_action,
            "uploaded outputs"
        );

        Ok(())
    }
}

fn sharded(dir: &Path, hash: &str) -> PathBuf {
    let prefix = hash.get(..2).unwrap_or(hash);
    dir.join(prefix).join(hash)
}

fn write_atomically<F>(dest: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    write(&mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Output paths in a result must stay inside the exec root
fn checked_relative(path: &str) -> Result<&Path, CacheError> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.is_empty() {
        return Err(CacheError::Transport(format!(
            "action result contains invalid output path: {}",
            path
        )));
    }
    Ok(relative)
}

#[cfg(unix)]
fn set_mode(file: &File, executable: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _executable: bool) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata_for(key: &ActionKey) -> RequestMetadata {
        RequestMetadata::new("build", "command", key)
    }

    fn key(name: &str) -> ActionKey {
        ActionKey::new(DigestUtil::new().compute(name.as_bytes()))
    }

    #[test]
    fn test_miss_is_not_found() {
        let cache_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(cache_dir.path()).unwrap();
        let key = key("missing");

        let err = cache
            .get_cached_action_result(&key, &metadata_for(&key))
            .unwrap_err();
        assert!(matches!(err, CacheError::NotFound));
    }

    #[test]
    fn test_upload_then_download() {
        let cache_dir = TempDir::new().unwrap();
        let exec_root = TempDir::new().unwrap();
        let cache = DiskCache::new(cache_dir.path()).unwrap();
        let key = key("compile");
        let metadata = metadata_for(&key);

        fs::create_dir_all(exec_root.path().join("out")).unwrap();
        let output = exec_root.path().join("out/a.o");
        fs::write(&output, "object code").unwrap();
        let out_err = FileOutErr::in_dir(exec_root.path(), "compile");
        fs::write(out_err.stdout_path(), "compiled a.c").unwrap();

        cache
            .upload(&key, exec_root.path(), &[output.clone()], &out_err, true, &metadata)
            .unwrap();
        assert!(cache.contains_action(&key));

        fs::remove_file(&output).unwrap();
        fs::remove_file(out_err.stdout_path()).unwrap();

        let result = cache.get_cached_action_result(&key, &metadata).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output_files[0].path, "out/a.o");

        cache
            .download(&result, exec_root.path(), &out_err, &metadata)
            .unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "object code");
        assert_eq!(out_err.read_stdout().unwrap(), b"compiled a.c");
    }

    #[test]
    fn test_upload_without_action_only_stores_blobs() {
        let cache_dir = TempDir::new().unwrap();
        let exec_root = TempDir::new().unwrap();
        let cache = DiskCache::new(cache_dir.path()).unwrap();
        let key = key("failed");

        let output = exec_root.path().join("partial.log");
        fs::write(&output, "partial").unwrap();
        let out_err = FileOutErr::in_dir(exec_root.path(), "failed");

        cache
            .upload(
                &key,
                exec_root.path(),
                &[output, exec_root.path().join("never-written.o")],
                &out_err,
                false,
                &metadata_for(&key),
            )
            .unwrap();

        assert!(!cache.contains_action(&key));
        assert!(cache.contains_blob(&DigestUtil::new().compute(b"partial")));
    }

    #[test]
    fn test_missing_blob_leaves_exec_root_untouched() {
        let cache_dir = TempDir::new().unwrap();
        let exec_root = TempDir::new().unwrap();
        let cache = DiskCache::new(cache_dir.path()).unwrap();
        let key = key("broken");
        let util = DigestUtil::new();

        let present = cache.put_blob_bytes(b"present").unwrap();
        let result = ActionResult {
            exit_code: 0,
            output_files: vec![
                OutputFile {
                    path: "first.txt".into(),
                    digest: present,
                    is_executable: false,
                },
                OutputFile {
                    path: "second.txt".into(),
                    digest: util.compute(b"never uploaded"),
                    is_executable: false,
                },
            ],
            stdout_digest: None,
            stderr_digest: None,
        };

        let out_err = FileOutErr::in_dir(exec_root.path(), "broken");
        let err = cache
            .download(&result, exec_root.path(), &out_err, &metadata_for(&key))
            .unwrap_err();

        assert!(matches!(err, CacheError::NotFound));
        assert!(!exec_root.path().join("first.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_persist_rolls_back_committed_outputs() {
        let cache_dir = TempDir::new().unwrap();
        let exec_root = TempDir::new().unwrap();
        let cache = DiskCache::new(cache_dir.path()).unwrap();
        let key = key("blocked");

        let first = cache.put_blob_bytes(b"first").unwrap();
        let second = cache.put_blob_bytes(b"second").unwrap();
        // A directory cannot be replaced by a file rename
        fs::create_dir_all(exec_root.path().join("blocked/child")).unwrap();

        let result = ActionResult {
            exit_code: 0,
            output_files: vec![
                OutputFile {
                    path: "a.txt".into(),
                    digest: first,
                    is_executable: false,
                },
                OutputFile {
                    path: "blocked".into(),
                    digest: second,
                    is_executable: false,
                },
            ],
            stdout_digest: None,
            stderr_digest: None,
        };

        let out_err = FileOutErr::in_dir(exec_root.path(), "blocked");
        let err = cache
            .download(&result, exec_root.path(), &out_err, &metadata_for(&key))
            .unwrap_err();

        assert!(matches!(err, CacheError::Transport(_)));
        assert!(!exec_root.path().join("a.txt").exists());
        assert!(exec_root.path().join("blocked/child").is_dir());
    }

    #[test]
    fn test_blob_stored_under_digest_of_copied_bytes() {
        let cache_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(cache_dir.path()).unwrap();

        let mut source = io::Cursor::new(vec![3u8; 150_000]);
        let digest = cache.put_blob_reader(&mut source).unwrap();

        let stored = fs::read(cache.cas_path(&digest)).unwrap();
        assert_eq!(DigestUtil::new().compute(&stored), digest);
        assert_eq!(digest.size_bytes, 150_000);
    }

    #[test]
    fn test_escaping_output_path_rejected() {
        assert!(checked_relative("../etc/passwd").is_err());
        assert!(checked_relative("/etc/passwd").is_err());
        assert!(checked_relative("").is_err());
        assert!(checked_relative("bazel-out/a.o").is_ok());
    }
}
