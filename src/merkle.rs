/// Merkle tree over a spawn's input mapping
///
/// Inputs are grouped into a directory hierarchy. Each directory is encoded as
/// a `Directory` message (entries sorted by name) and digested bottom-up, so
/// the root digest depends only on paths and contents, never on the order in
/// which inputs were enumerated.
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path};

use crate::digest::DigestUtil;
use crate::metadata::MetadataProvider;
use crate::proto::{Digest, Directory, DirectoryNode, FileNode};
use crate::spawn::InputMapping;

/// Result of building the input tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTree {
    root_digest: Digest,
    file_count: usize,
    directory_count: usize,
}

impl InputTree {
    pub fn root_digest(&self) -> &Digest {
        &self.root_digest
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn directory_count(&self) -> usize {
        self.directory_count
    }
}

/// Builds the input tree digest for an input mapping
pub trait TreeBuilder: Send + Sync {
    fn build_tree(
        &self,
        inputs: &InputMapping,
        metadata: &dyn MetadataProvider,
    ) -> io::Result<InputTree>;
}

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, (Digest, bool)>,
    dirs: BTreeMap<String, DirNode>,
}

/// Default tree builder; per-file digests come from the metadata provider
#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleTreeBuilder {
    digest_util: DigestUtil,
}

impl MerkleTreeBuilder {
    pub fn new(digest_util: DigestUtil) -> Self {
        Self { digest_util }
    }

    fn digest_dir(&self, node: &DirNode, directory_count: &mut usize) -> Digest {
        *directory_count += 1;

        let directories = node
            .dirs
            .iter()
            .map(|(name, child)| DirectoryNode {
                name: name.clone(),
                digest: Some(self.digest_dir(child, directory_count)),
            })
            .collect();

        let files = node
            .files
            .iter()
            .map(|(name, (digest, is_executable))| FileNode {
                name: name.clone(),
                digest: Some(digest.clone()),
                is_executable: *is_executable,
            })
            .collect();

        self.digest_util
            .compute_message(&Directory { files, directories })
    }
}

impl TreeBuilder for MerkleTreeBuilder {
    fn build_tree(
        &self,
        inputs: &InputMapping,
        metadata: &dyn MetadataProvider,
    ) -> io::Result<InputTree> {
        let mut root = DirNode::default();

        for (path, input) in inputs {
            let input_metadata = metadata.metadata(input)?;
            let mut components = split_path(path)?;
            let file_name = components.pop().ok_or_else(|| invalid_path(path))?;

            let mut node = &mut root;
            for dir in components {
                if node.files.contains_key(&dir) {
                    return Err(conflict(path));
                }
                node = node.dirs.entry(dir).or_default();
            }

            if node.dirs.contains_key(&file_name) {
                return Err(conflict(path));
            }
            node.files.insert(
                file_name,
                (
                    input_metadata.digest().clone(),
                    input_metadata.is_executable(),
                ),
            );
        }

        let mut directory_count = 0;
        let root_digest = self.digest_dir(&root, &mut directory_count);

        Ok(InputTree {
            root_digest,
            file_count: inputs.len(),
            directory_count,
        })
    }
}

/// Split a relative exec path into its normal components
fn split_path(path: &Path) -> io::Result<Vec<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(invalid_path(path)),
        }
    }
    Ok(parts)
}

fn invalid_path(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid input path: {}", path.display()),
    )
}

fn conflict(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("input path conflicts with a directory or file: {}", path.display()),
    )
}
