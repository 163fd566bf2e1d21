/// Remote spawn cache: lookup before execution, store after
///
/// `RemoteSpawnCache::lookup` derives the action key of a spawn and, when
/// allowed, asks the remote cache for a result. The returned `CacheHandle`
/// either carries the cached result, or promises a store the executor
/// performs after running the spawn locally, or does neither.
///
/// Remote cache problems never fail the build. They surface as warnings
/// (each distinct message once per build) and the spawn runs locally.
/// Interruption is the only remote condition that propagates.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::action::spawn_action_key;
use crate::config::RemoteOptions;
use crate::context::{FileOutErr, ProgressStatus, SpawnExecutionContext};
use crate::digest::{ActionKey, DigestUtil};
use crate::error::{CacheError, SpawnCacheError};
use crate::logging::{operations, services, status};
use crate::merkle::{MerkleTreeBuilder, TreeBuilder};
use crate::metadata::InputMetadata;
use crate::remote::{RemoteActionCache, RequestMetadata};
use crate::reporter::{DedupingReporter, Event, Reporter};
use crate::spawn::{ActionInput, Spawn, SpawnResult, Status};

/// Name reported with progress events
pub const STRATEGY_NAME: &str = "remote-cache";

/// Coordinates cache lookups and stores for all spawns of one build
///
/// Safe to share between executor threads; the only mutable state is the
/// reporter's set of already reported messages.
pub struct RemoteSpawnCache {
    exec_root: PathBuf,
    options: RemoteOptions,
    remote_cache: Arc<dyn RemoteActionCache>,
    build_request_id: String,
    command_id: String,
    reporter: Arc<DedupingReporter>,
    digest_util: DigestUtil,
    tree_builder: Arc<dyn TreeBuilder>,
}

impl RemoteSpawnCache {
    pub fn new(
        exec_root: impl Into<PathBuf>,
        options: RemoteOptions,
        remote_cache: Arc<dyn RemoteActionCache>,
        build_request_id: impl Into<String>,
        command_id: impl Into<String>,
        cmdline_reporter: Option<Arc<dyn Reporter>>,
        digest_util: DigestUtil,
    ) -> Self {
        Self {
            exec_root: exec_root.into(),
            options,
            remote_cache,
            build_request_id: build_request_id.into(),
            command_id: command_id.into(),
            reporter: Arc::new(DedupingReporter::new(cmdline_reporter)),
            digest_util,
            tree_builder: Arc::new(MerkleTreeBuilder::new(digest_util)),
        }
    }

    /// Replace the default Merkle tree builder
    pub fn with_tree_builder(mut self, tree_builder: Arc<dyn TreeBuilder>) -> Self {
        self.tree_builder = tree_builder;
        self
    }

    pub fn exec_root(&self) -> &Path {
        &self.exec_root
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }

    /// Compute the action key of a spawn without touching the remote cache
    pub fn action_key(
        &self,
        spawn: &Spawn,
        context: &dyn SpawnExecutionContext,
    ) -> Result<ActionKey, SpawnCacheError> {
        Ok(spawn_action_key(
            spawn,
            context,
            self.tree_builder.as_ref(),
            self.digest_util,
        )?)
    }

    /// Look up a spawn in the remote cache
    ///
    /// Errors are limited to interruption and failures to hash the inputs;
    /// a broken remote cache yields a non-hit handle instead.
    pub fn lookup(
        &self,
        spawn: &Spawn,
        context: &dyn SpawnExecutionContext,
    ) -> Result<CacheHandle, SpawnCacheError> {
        let check_cache = self.options.accept_cached && spawn.may_be_cached();

        if check_cache {
            context.report(ProgressStatus::CheckingCache, STRATEGY_NAME);
        }

        let action_key = self.action_key(spawn, context)?;
        let metadata = RequestMetadata::new(&self.build_request_id, &self.command_id, &action_key);

        if check_cache {
            let _entered = metadata.span().entered();

            match self.fetch_cached_result(&action_key, &metadata, context.file_out_err()) {
                Ok(Some(result)) => return Ok(CacheHandle::Hit(result)),
                Ok(None) => {}
                Err(CacheError::Interrupted) => return Err(SpawnCacheError::Interrupted),
                Err(e) => {
                    debug!(
                        service = services::SPAWN_CACHE,
                        operation = operations::LOOKUP,
                        status = status::ERROR,
                        error = %e,
                        "remote cache read failed"
                    );
                    self.reporter.report(Event::warn(format!(
                        "Error reading from the remote cache:\n{}",
                        e.describe()
                    )));
                }
            }
        }

        if !self.options.upload_local_results {
            return Ok(CacheHandle::NoStore);
        }

        let provider = context.metadata_provider();
        let inputs = context
            .input_mapping()
            .values()
            .map(|input| -> Result<RecordedInput, SpawnCacheError> {
                Ok(RecordedInput {
                    input: input.clone(),
                    metadata: provider.metadata(input)?,
                })
            })
            .collect::<Result<Vec<_>, SpawnCacheError>>()?;

        Ok(CacheHandle::PendingStore(PendingStore {
            exec_root: self.exec_root.clone(),
            options: self.options,
            remote_cache: Arc::clone(&self.remote_cache),
            reporter: Arc::clone(&self.reporter),
            spawn: spawn.clone(),
            action_key,
            metadata,
            inputs,
            out_err: context.file_out_err().clone(),
        }))
    }

    /// `Ok(None)` on a miss
    fn fetch_cached_result(
        &self,
        action_key: &ActionKey,
        metadata: &RequestMetadata,
        out_err: &FileOutErr,
    ) -> Result<Option<SpawnResult>, CacheError> {
        let result = match self.remote_cache.get_cached_action_result(action_key, metadata) {
            Ok(result) => result,
            Err(CacheError::NotFound) => {
                debug!(
                    service = services::SPAWN_CACHE,
                    operation = operations::LOOKUP,
                    status = status::MISS,
                    "cache miss"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Failed actions are never registered, so the outputs exist. A blob
        // evicted between the two calls is still just a miss.
        match self
            .remote_cache
            .download(&result, &self.exec_root, out_err, metadata)
        {
            Ok(()) => {}
            Err(CacheError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        }

        info!(
            service = services::SPAWN_CACHE,
            operation = operations::LOOKUP,
            status = status::SUCCESS,
            exit_code = result.exit_code,
            "cache hit"
        );

        Ok(Some(SpawnResult::remote_cache_hit(result.exit_code)))
    }

    /// Number of distinct warnings reported during this build
    pub fn reported_warning_count(&self) -> usize {
        self.reporter.reported_count()
    }
}

/// Outcome of a lookup
#[derive(Debug)]
pub enum CacheHandle {
    /// The remote cache had a result; outputs are already in the exec root
    Hit(SpawnResult),
    /// No result; run the spawn and pass its result to `store`
    PendingStore(PendingStore),
    /// No result and nothing will be stored
    NoStore,
}

impl CacheHandle {
    pub fn has_result(&self) -> bool {
        matches!(self, CacheHandle::Hit(_))
    }

    /// The cached result; `NoResult` unless this is a hit
    pub fn result(&self) -> Result<&SpawnResult, SpawnCacheError> {
        match self {
            CacheHandle::Hit(result) => Ok(result),
            _ => Err(SpawnCacheError::NoResult),
        }
    }

    pub fn will_store(&self) -> bool {
        matches!(self, CacheHandle::PendingStore(_))
    }

    /// Store the result of a local execution
    ///
    /// Consumes the handle, so a second store cannot be expressed. Calling it
    /// on a handle that does not store is a caller bug and returns
    /// `StoreNotExpected`.
    pub fn store(self, result: &SpawnResult) -> Result<(), SpawnCacheError> {
        match self {
            CacheHandle::PendingStore(pending) => pending.store(result),
            CacheHandle::Hit(_) | CacheHandle::NoStore => Err(SpawnCacheError::StoreNotExpected),
        }
    }
}

struct RecordedInput {
    input: ActionInput,
    metadata: InputMetadata,
}

/// Deferred store captured at lookup time
pub struct PendingStore {
    exec_root: PathBuf,
    options: RemoteOptions,
    remote_cache: Arc<dyn RemoteActionCache>,
    reporter: Arc<DedupingReporter>,
    spawn: Spawn,
    action_key: ActionKey,
    metadata: RequestMetadata,
    inputs: Vec<RecordedInput>,
    out_err: FileOutErr,
}

impl PendingStore {
    pub fn action_key(&self) -> &ActionKey {
        &self.action_key
    }

    pub fn store(self, result: &SpawnResult) -> Result<(), SpawnCacheError> {
        let _entered = self.metadata.span().entered();

        if self.options.guard_against_concurrent_changes {
            if let Err(e) = self.check_for_concurrent_modifications() {
                self.reporter.report(Event::warn(e.to_string()));
                return Ok(());
            }
        }

        let upload_action = self.spawn.may_be_cached()
            && result.status == Status::Success
            && result.exit_code == 0;

        let files = resolve_outputs(&self.exec_root, self.spawn.output_files());

        match self.remote_cache.upload(
            &self.action_key,
            &self.exec_root,
            &files,
            &self.out_err,
            upload_action,
            &self.metadata,
        ) {
            Ok(()) => {
                debug!(
                    service = services::SPAWN_CACHE,
                    operation = operations::STORE,
                    status = status::SUCCESS,
                    upload_action,
                    "stored local result"
                );
                Ok(())
            }
            Err(CacheError::Interrupted) => Err(SpawnCacheError::Interrupted),
            Err(e) => {
                debug!(
                    service = services::SPAWN_CACHE,
                    operation = operations::STORE,
                    status = status::ERROR,
                    error = %e,
                    "remote cache write failed"
                );
                self.reporter.report(Event::warn(format!(
                    "Error writing to the remote cache:\n{}",
                    e.describe()
                )));
                Ok(())
            }
        }
    }

    /// Fails on the first real input that changed since it was digested
    fn check_for_concurrent_modifications(&self) -> Result<(), SpawnCacheError> {
        for recorded in &self.inputs {
            if recorded.input.is_virtual() {
                continue;
            }

            let path = self.exec_root.join(recorded.input.exec_path());
            match recorded.metadata.was_modified_since_digest(&path) {
                Ok(false) => {}
                Ok(true) => return Err(SpawnCacheError::ConcurrentModification { path }),
                Err(source) => return Err(SpawnCacheError::InputCheck { path, source }),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PendingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingStore")
            .field("action_key", &self.action_key)
            .field("inputs", &self.inputs.len())
            .finish()
    }
}

fn resolve_outputs(exec_root: &Path, outputs: &[PathBuf]) -> Vec<PathBuf> {
    outputs.iter().map(|output| exec_root.join(output)).collect()
}
