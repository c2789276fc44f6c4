//! IndexController — orchestrates one indexing run: discovery, diff against
//! the hash cache, chunk, embed, upsert, verify, persist (spec.md §4.7).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::collection_namer;
use crate::config::ProjectConfig;
use crate::embedding::EmbeddingClient;
use crate::error::IndexError;
use crate::filter;
use crate::git_identity;
use crate::hash_cache::HashCache;
use crate::logger::IndexLogger;
use crate::lock::ProjectLock;
use crate::progress::{Phase, ProgressEvent, ProgressReporter};
use crate::project_metadata::ProjectMetadata;
use crate::types::{Chunk, EmbeddedChunk};
use crate::vector_store::VectorStore;
use crate::{chunker, walker};

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    pub clean: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationSummary {
    pub expected: usize,
    pub observed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub skipped_unchanged: usize,
    pub deleted: usize,
    pub failures: Vec<FileFailure>,
    pub verification: VerificationSummary,
    pub duration_ms: u128,
    pub status: RunStatus,
}

/// A cooperative cancellation flag, checked between files (spec.md §5
/// "Cancellation and timeouts"). Cheap to clone and share with a signal
/// handler.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct IndexController {
    project_path: PathBuf,
    context_dir: PathBuf,
    config: ProjectConfig,
    embedding: EmbeddingClient,
    store: VectorStore,
    logger: IndexLogger,
    progress: ProgressReporter,
}

impl IndexController {
    pub fn new(
        project_path: PathBuf,
        context_dir: PathBuf,
        config: ProjectConfig,
        embedding: EmbeddingClient,
        store: VectorStore,
        logger: IndexLogger,
        progress: ProgressReporter,
    ) -> Self {
        Self { project_path, context_dir, config, embedding, store, logger, progress }
    }

    pub async fn run(
        &self,
        options: IndexOptions,
        cancellation: CancellationToken,
    ) -> Result<RunSummary, IndexError> {
        let start = Instant::now();
        let _lock = ProjectLock::acquire(&self.context_dir).map_err(|e| IndexError::Configuration(e.to_string()))?;

        let project_path_str = self.project_path.to_string_lossy().to_string();
        let git_identifier = git_identity::resolve(&self.project_path);

        // Step 1: resolve collectionName.
        let existing_metadata = ProjectMetadata::load(&self.context_dir)
            .map_err(|e| IndexError::Io { path: self.context_dir.clone(), source: e })?;
        let collection_name = match &existing_metadata {
            Some(meta) if meta.is_hybrid == self.config.hybrid => meta.collection_name.clone(),
            _ => collection_namer::collection_name(git_identifier.as_deref(), &project_path_str, self.config.hybrid),
        };

        self.logger.info(&format!("starting run for collection {collection_name}"));

        // Step 2: load HashCache; --clean (or a stale/mismatched cache, which
        // HashCache::load already treats as empty) forces a full index.
        let mut cache = HashCache::load(&self.context_dir, &self.project_path, &collection_name)
            .map_err(|e| IndexError::Io { path: self.context_dir.clone(), source: e })?;

        if options.clean {
            info!("clean requested: dropping collection {collection_name}");
            self.store.drop_collection(&collection_name).await?;
            cache.clear().map_err(|e| IndexError::Io { path: self.context_dir.clone(), source: e })?;
        }

        // Step 3: discover.
        self.progress.emit(ProgressEvent::new(Phase::Discovering, 0, 1));
        let walk_opts = walker::WalkOptions {
            extensions: self.config.extensions.clone(),
            exclude_globs: self.config.exclude_globs.clone(),
            max_file_bytes: self.config.max_file_bytes,
        };
        let outcome = walker::walk(&self.project_path, &walk_opts);
        self.progress.emit(
            ProgressEvent::new(Phase::Discovering, 1, 1)
                .with_detail(format!("oversize: {}, unreadable: {}", outcome.stats.oversize, outcome.stats.unreadable)),
        );

        let mut current_files: HashSet<String> = HashSet::new();
        let mut file_bytes: Vec<(String, Vec<u8>)> = Vec::new();
        let mut failures: Vec<FileFailure> = Vec::new();
        for abs_path in &outcome.files {
            let rel_path = relative_path(&self.project_path, abs_path);
            match walker::read_file_lossy(abs_path) {
                Some(bytes) => {
                    current_files.insert(rel_path.clone());
                    file_bytes.push((rel_path, bytes));
                }
                None => failures.push(FileFailure { path: rel_path, reason: "unreadable or binary".into() }),
            }
        }

        // Step 4: diff.
        self.progress.emit(ProgressEvent::new(Phase::Diffing, 0, 1));
        let mut changed: Vec<(String, Vec<u8>)> = Vec::new();
        for (rel_path, bytes) in file_bytes {
            let hash = crate::types::sha256_hex(&bytes);
            if cache.has_file_changed(&rel_path, &hash) {
                changed.push((rel_path, bytes));
            }
        }
        let deleted = cache.get_deleted_files(&current_files);
        let skipped_unchanged = current_files.len().saturating_sub(changed.len());
        self.progress.emit(ProgressEvent::new(Phase::Diffing, 1, 1).with_detail(format!(
            "changed: {}, deleted: {}, unchanged: {}",
            changed.len(),
            deleted.len(),
            skipped_unchanged
        )));

        if changed.is_empty() && deleted.is_empty() {
            self.logger.info("nothing to do: no changed or deleted files");
            self.progress.emit(ProgressEvent::new(Phase::Done, 1, 1));
            return Ok(RunSummary {
                indexed_files: 0,
                total_chunks: cache.total_chunks(),
                skipped_unchanged,
                deleted: 0,
                failures,
                verification: VerificationSummary::default(),
                duration_ms: start.elapsed().as_millis(),
                status: RunStatus::Completed,
            });
        }

        // Step 5: deletions.
        self.progress.emit(ProgressEvent::new(Phase::Deleting, 0, deleted.len().max(1)));
        for (idx, path) in deleted.iter().enumerate() {
            let expr = filter::relative_path_equals(path).to_string();
            self.store.delete_by_filter(&collection_name, &expr).await?;
            cache.remove_file(path);
            self.progress.emit(ProgressEvent::new(Phase::Deleting, idx + 1, deleted.len()));
        }

        // Step 6: chunk + embed + upsert changed files. Deleting a changed
        // file's previous chunks happens-before inserting its new ones
        // (spec.md §5 ordering guarantee 1): "replace whole file".
        self.progress.emit(ProgressEvent::new(Phase::Chunking, 0, changed.len().max(1)));
        let mut files_chunks: Vec<(String, String, Vec<Chunk>)> = Vec::new();
        let chunker_opts = chunker::ChunkerOptions {
            max_chunk_chars: self.config.chunking.max_chunk_chars,
            window_chars: self.config.chunking.window_chars,
            overlap_chars: self.config.chunking.overlap_chars,
        };
        for (idx, (rel_path, bytes)) in changed.iter().enumerate() {
            let content_hash = crate::types::sha256_hex(bytes);
            let text = match String::from_utf8(bytes.clone()) {
                Ok(t) => t,
                Err(_) => {
                    failures.push(FileFailure { path: rel_path.clone(), reason: "not valid UTF-8".into() });
                    continue;
                }
            };
            let ext = rel_path.rsplit('.').next().unwrap_or("").to_string();
            let spans = chunker::chunk_file(&text, &ext, &chunker_opts);
            let chunks: Vec<Chunk> = spans
                .into_iter()
                .map(|span| Chunk {
                    id: Chunk::derive_id(&project_path_str, rel_path, span.start_line, span.end_line, &content_hash),
                    content: span.content,
                    relative_path: rel_path.clone(),
                    start_line: span.start_line,
                    end_line: span.end_line,
                    file_extension: ext.clone(),
                    metadata: Default::default(),
                })
                .collect();
            files_chunks.push((rel_path.clone(), content_hash, chunks));
            self.progress.emit(ProgressEvent::new(Phase::Chunking, idx + 1, changed.len()));

            if cancellation.is_cancelled() {
                warn!("cancellation requested during chunking, stopping early");
                break;
            }
        }

        let total_new_chunks: usize = files_chunks.iter().map(|(_, _, c)| c.len()).sum();

        // Step 7/8: embed and upsert per file, so a failure on one file
        // leaves only that file's cache entry stale (spec.md §7 "Propagation
        // policy").
        self.progress.emit(ProgressEvent::new(Phase::Embedding, 0, files_chunks.len().max(1)));
        let mut indexed_files = 0usize;
        let mut inserted_chunk_count = 0usize;

        // Ensure the collection exists before any inserts, at the dimension
        // the embedding client resolves to (spec.md §4.7 step 7).
        if !files_chunks.is_empty() {
            let dimension = self.resolve_dimension(&files_chunks).await?;
            if !self.store.has_collection(&collection_name).await? {
                self.store.create_collection(&collection_name, dimension, self.config.hybrid).await.map_err(
                    |e| match e {
                        IndexError::SchemaMismatch { expected, got } => IndexError::Configuration(format!(
                            "dimension mismatch: collection {collection_name} was created with {expected}, current embedding model produces {got}; run with --clean"
                        )),
                        other => other,
                    },
                )?;
            }
        }

        for (idx, (rel_path, content_hash, chunks)) in files_chunks.iter().enumerate() {
            if cancellation.is_cancelled() {
                warn!("cancellation requested during embedding, stopping early");
                break;
            }
            if chunks.is_empty() {
                cache.update_file(rel_path, content_hash.clone(), 0);
                indexed_files += 1;
                continue;
            }

            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let embed_result = self.embedding.embed_batch(&texts).await;
            let embedded = match embed_result {
                Ok(v) => v,
                Err(e) => {
                    failures.push(FileFailure { path: rel_path.clone(), reason: e.to_string() });
                    continue;
                }
            };

            let embedded_chunks: Vec<EmbeddedChunk> = chunks
                .iter()
                .cloned()
                .zip(embedded.into_iter())
                .map(|(chunk, e)| EmbeddedChunk { chunk, dense_vector: e.vector, sparse_representation: None })
                .collect();

            // "Replace whole file": delete this file's existing chunks
            // before inserting the freshly chunked ones.
            let expr = filter::relative_path_equals(rel_path).to_string();
            if let Err(e) = self.store.delete_by_filter(&collection_name, &expr).await {
                failures.push(FileFailure { path: rel_path.clone(), reason: e.to_string() });
                continue;
            }

            let insert_result = if self.config.hybrid {
                self.store.insert_hybrid(&collection_name, &embedded_chunks).await
            } else {
                self.store.insert(&collection_name, &embedded_chunks).await
            };
            if let Err(e) = insert_result {
                failures.push(FileFailure { path: rel_path.clone(), reason: e.to_string() });
                continue;
            }

            cache.update_file(rel_path, content_hash.clone(), chunks.len());
            inserted_chunk_count += chunks.len();
            indexed_files += 1;
            self.progress.emit(ProgressEvent::new(Phase::IndexingFiles, idx + 1, files_chunks.len()));
        }

        // Step 9 (verify).
        self.progress.emit(ProgressEvent::new(Phase::Verifying, 0, 1));
        let verification = if inserted_chunk_count > 0 {
            let result = self.store.verify_inserted_data(&collection_name, inserted_chunk_count).await?;
            if result.below_threshold() {
                self.logger.warn(&format!(
                    "verification below threshold: expected {}, observed {}",
                    result.expected, result.observed
                ));
            }
            VerificationSummary { expected: result.expected, observed: result.observed }
        } else {
            VerificationSummary::default()
        };
        self.progress.emit(ProgressEvent::new(Phase::Verifying, 1, 1));

        // Step 10 (persist): cache first, then metadata; if the cache write
        // fails, metadata must not be updated (spec.md §4.7 step 9).
        self.progress.emit(ProgressEvent::new(Phase::Persisting, 0, 1));
        cache.save().map_err(|e| IndexError::Io { path: self.context_dir.clone(), source: e })?;

        let mut metadata = existing_metadata.unwrap_or_else(|| {
            ProjectMetadata::new(
                &self.context_dir,
                self.project_path.clone(),
                collection_name.clone(),
                git_identifier.clone(),
                self.config.hybrid,
                self.embedding.model().to_string(),
                0,
            )
        });
        metadata.collection_name = collection_name.clone();
        metadata.is_hybrid = self.config.hybrid;
        metadata.embedding_model = self.embedding.model().to_string();
        if let Some(dim) = self.embedding.get_dimension().await {
            metadata.embedding_dimension = dim;
        }
        metadata.indexed_file_count = current_files.len();
        metadata.total_chunks = cache.total_chunks();
        metadata.save().map_err(|e| IndexError::Io { path: self.context_dir.clone(), source: e })?;
        self.progress.emit(ProgressEvent::new(Phase::Persisting, 1, 1));

        let status = if cancellation.is_cancelled() || !failures.is_empty() {
            if indexed_files == 0 && total_new_chunks > 0 {
                RunStatus::Failed
            } else {
                RunStatus::Partial
            }
        } else {
            RunStatus::Completed
        };
        self.progress.emit(ProgressEvent::new(Phase::Done, 1, 1));
        self.logger.info(&format!("run finished: status={status:?}, indexed_files={indexed_files}"));

        Ok(RunSummary {
            indexed_files,
            total_chunks: cache.total_chunks(),
            skipped_unchanged,
            deleted: deleted.len(),
            failures,
            verification,
            duration_ms: start.elapsed().as_millis(),
            status,
        })
    }

    /// Resolves the embedding dimension, issuing a one-time probe call
    /// against the first chunk's text if not already cached or configured
    /// (spec.md §4.5 `detectDimension`).
    async fn resolve_dimension(&self, files_chunks: &[(String, String, Vec<Chunk>)]) -> Result<usize, IndexError> {
        if let Some(dim) = self.embedding.get_dimension().await {
            return Ok(dim);
        }
        let probe = files_chunks
            .iter()
            .find_map(|(_, _, chunks)| chunks.first())
            .map(|c| c.content.as_str())
            .unwrap_or("probe");
        self.embedding.detect_dimension(probe).await
    }
}

fn relative_path(root: &Path, abs_path: &Path) -> String {
    abs_path.strip_prefix(root).unwrap_or(abs_path).to_string_lossy().replace('\\', "/")
}
