/// Digest computation for blobs, files and protobuf messages
///
/// All digests are SHA-256, hex-encoded, paired with the byte size of the
/// digested content.
use prost::Message;
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::proto::{Action, Digest};

/// Key under which an action result is stored in the remote cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey(Digest);

impl ActionKey {
    pub fn new(digest: Digest) -> Self {
        Self(digest)
    }

    pub fn digest(&self) -> &Digest {
        &self.0
    }

    pub fn hash(&self) -> &str {
        &self.0.hash
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Computes digests with the build's hash function
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestUtil;

impl DigestUtil {
    pub fn new() -> Self {
        Self
    }

    /// Digest of a byte slice
    pub fn compute(&self, data: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest {
            hash: hex::encode(hasher.finalize()),
            size_bytes: data.len() as i64,
        }
    }

    /// Digest of the canonical protobuf encoding of a message
    pub fn compute_message<M: Message>(&self, message: &M) -> Digest {
        self.compute(&message.encode_to_vec())
    }

    /// Digest of a file's contents, streamed in chunks
    pub fn compute_file(&self, path: &Path) -> io::Result<Digest> {
        let mut file = File::open(path)?;
        self.copy_and_compute(&mut file, &mut io::sink())
    }

    /// Copy `reader` into `writer` and digest the bytes that were copied
    ///
    /// The digest always describes exactly what `writer` received, even if
    /// the source changes while it is being read.
    pub fn copy_and_compute<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> io::Result<Digest> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut size: i64 = 0;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n])?;
            size += n as i64;
        }

        Ok(Digest {
            hash: hex::encode(hasher.finalize()),
            size_bytes: size,
        })
    }

    pub fn compute_action_key(&self, action: &Action) -> ActionKey {
        ActionKey(self.compute_message(action))
    }

    pub fn empty(&self) -> Digest {
        self.compute(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_compute_known_value() {
        let digest = DigestUtil::new().compute(b"hello world");
        assert_eq!(
            digest.hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(digest.size_bytes, 11);
    }

    #[test]
    fn test_compute_file_matches_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.txt");
        let content = vec![7u8; 200_000];
        fs::write(&path, &content).unwrap();

        let util = DigestUtil::new();
        assert_eq!(util.compute_file(&path).unwrap(), util.compute(&content));
    }

    #[test]
    fn test_copy_and_compute_matches_copied_bytes() {
        let mut copied = Vec::new();
        let digest = DigestUtil::new()
            .copy_and_compute(&mut &b"blob contents"[..], &mut copied)
            .unwrap();

        assert_eq!(copied, b"blob contents");
        assert_eq!(digest, DigestUtil::new().compute(&copied));
    }

    #[test]
    fn test_empty_digest() {
        let empty = DigestUtil::new().empty();
        assert_eq!(empty.size_bytes, 0);
        assert!(empty.hash.starts_with("e3b0c442"));
    }
}
