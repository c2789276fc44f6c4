//! hybridex CLI — a thin, scriptable shell over `hybridex-core`.
//!
//! Not a full product CLI: no progress bars, no interactive prompts. It
//! exercises the core's `index`, `search`, and `clean` operations to the
//! depth the core requires (spec.md §1).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hybridex_core::collection_namer;
use hybridex_core::config::{ProjectConfig, Secrets};
use hybridex_core::controller::{CancellationToken, IndexController, IndexOptions};
use hybridex_core::embedding::{EmbeddingClient, EmbeddingConfig, ResponseShape};
use hybridex_core::filter;
use hybridex_core::git_identity;
use hybridex_core::hash_cache::HashCache;
use hybridex_core::logger::IndexLogger;
use hybridex_core::progress::ProgressReporter;
use hybridex_core::project_metadata::ProjectMetadata;
use hybridex_core::search::{HybridSearch, SearchOptions};
use hybridex_core::vector_store::{VectorStore, VectorStoreConfig};

#[derive(Parser)]
#[command(name = "hybridex", version, about = "Incremental codebase indexing and hybrid code search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the vector store's collection in sync with the working tree.
    Index {
        /// Project root (default: current directory).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Drop the collection and clear the cache first, then do a full index.
        #[arg(long)]
        clean: bool,
    },
    /// Run a hybrid search against an already-indexed project.
    Search {
        query: String,

        #[arg(long)]
        root: Option<PathBuf>,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// A filter expression (spec.md §6.3), e.g. `fileExtension == "ts"`.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Drop the project's collection and local cache/metadata.
    Clean {
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"))
        .canonicalize()
        .expect("project root not found")
}

fn context_dir(root: &std::path::Path) -> PathBuf {
    root.join(".context")
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("hybridex=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Index { root, clean } => run_index(root, clean, cli.json).await,
        Commands::Search { query, root, limit, filter } => run_search(query, root, limit, filter, cli.json).await,
        Commands::Clean { root } => run_clean(root, cli.json).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run_index(root: Option<PathBuf>, clean: bool, json: bool) -> Result<(), String> {
    let root = resolve_root(root);
    let ctx = context_dir(&root);
    let config = ProjectConfig::load(&ctx).map_err(|e| e.to_string())?;
    let secrets = Secrets::from_env().map_err(|e| e.to_string())?;

    let home = dirs_home();
    let basename = root.file_name().and_then(|n| n.to_str()).unwrap_or("project");
    IndexLogger::prune_old_logs(&home).ok();
    let logger = IndexLogger::open(&home, basename).map_err(|e| e.to_string())?;

    let embedding = EmbeddingClient::new(EmbeddingConfig {
        base_url: secrets.embedding_base_url,
        api_key: secrets.embedding_api_key,
        model: config.embedding_model.clone(),
        bearer_auth: secrets.embedding_bearer_auth,
        response_shape: ResponseShape::OpenAi,
        provider_batch_ceiling: None,
        custom_dimension: config.custom_dimension,
        request_timeout: std::time::Duration::from_secs(30),
    })
    .map_err(|e| e.to_string())?;

    let store = VectorStore::new(VectorStoreConfig {
        base_url: secrets.vector_store_base_url,
        api_token: secrets.vector_store_api_token,
        request_timeout: std::time::Duration::from_secs(30),
    })
    .map_err(|e| e.to_string())?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = ProgressReporter::new(tx);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !json {
                let detail = event.detail.clone().unwrap_or_default();
                eprintln!("[{:?}] {}/{} {detail}", event.phase, event.current, event.total);
            }
        }
    });

    let controller = IndexController::new(root, ctx, config, embedding, store, logger, progress);
    let summary = controller.run(IndexOptions { clean }, CancellationToken::new()).await.map_err(|e| e.to_string())?;
    drop(controller);
    let _ = progress_task.await;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "indexedFiles": summary.indexed_files,
                "totalChunks": summary.total_chunks,
                "skippedUnchanged": summary.skipped_unchanged,
                "deleted": summary.deleted,
                "failures": summary.failures.iter().map(|f| serde_json::json!({"path": f.path, "reason": f.reason})).collect::<Vec<_>>(),
                "verification": {"expected": summary.verification.expected, "observed": summary.verification.observed},
                "durationMs": summary.duration_ms,
                "status": format!("{:?}", summary.status).to_lowercase(),
            })
        );
    } else {
        println!(
            "indexed {} files, {} chunks ({} unchanged, {} deleted) in {}ms — {:?}",
            summary.indexed_files,
            summary.total_chunks,
            summary.skipped_unchanged,
            summary.deleted,
            summary.duration_ms,
            summary.status
        );
        for failure in &summary.failures {
            eprintln!("  failed: {} ({})", failure.path, failure.reason);
        }
    }
    Ok(())
}

async fn run_search(
    query: String,
    root: Option<PathBuf>,
    limit: usize,
    filter_expr: Option<String>,
    json: bool,
) -> Result<(), String> {
    let root = resolve_root(root);
    let ctx = context_dir(&root);
    let metadata = ProjectMetadata::load(&ctx)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "project has not been indexed yet (run `hybridex index` first)".to_string())?;
    let secrets = Secrets::from_env().map_err(|e| e.to_string())?;

    let embedding = EmbeddingClient::new(EmbeddingConfig {
        base_url: secrets.embedding_base_url,
        api_key: secrets.embedding_api_key,
        model: metadata.embedding_model.clone(),
        bearer_auth: secrets.embedding_bearer_auth,
        response_shape: ResponseShape::OpenAi,
        provider_batch_ceiling: None,
        custom_dimension: Some(metadata.embedding_dimension),
        request_timeout: std::time::Duration::from_secs(30),
    })
    .map_err(|e| e.to_string())?;

    let store = VectorStore::new(VectorStoreConfig {
        base_url: secrets.vector_store_base_url,
        api_token: secrets.vector_store_api_token,
        request_timeout: std::time::Duration::from_secs(30),
    })
    .map_err(|e| e.to_string())?;

    let parsed_filter = filter_expr.as_deref().map(filter::parse).transpose().map_err(|e| e.to_string())?;

    let search = HybridSearch::new(&embedding, &store);
    let outcome = search
        .search(
            &metadata.collection_name,
            &query,
            metadata.embedding_dimension,
            metadata.is_hybrid,
            SearchOptions { limit, filter_expr: parsed_filter },
        )
        .await
        .map_err(|e| e.to_string())?;

    if json {
        let items: Vec<serde_json::Value> = outcome
            .hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "id": h.document.id,
                    "relativePath": h.document.relative_path,
                    "startLine": h.document.start_line,
                    "endLine": h.document.end_line,
                    "score": h.score,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({"degradedMode": outcome.degraded_mode, "hits": items}).to_string()
        );
    } else {
        if outcome.degraded_mode {
            eprintln!("(dense-only: collection has no sparse index)");
        }
        for hit in &outcome.hits {
            println!(
                "{:>8.5}  {}:{}-{}",
                hit.score, hit.document.relative_path, hit.document.start_line, hit.document.end_line
            );
        }
    }
    Ok(())
}

async fn run_clean(root: Option<PathBuf>, json: bool) -> Result<(), String> {
    let root = resolve_root(root);
    let ctx = context_dir(&root);
    let secrets = Secrets::from_env().map_err(|e| e.to_string())?;
    let store = VectorStore::new(VectorStoreConfig {
        base_url: secrets.vector_store_base_url,
        api_token: secrets.vector_store_api_token,
        request_timeout: std::time::Duration::from_secs(30),
    })
    .map_err(|e| e.to_string())?;

    let metadata = ProjectMetadata::load(&ctx).map_err(|e| e.to_string())?;
    let collection_name = match &metadata {
        Some(m) => m.collection_name.clone(),
        None => {
            let git_id = git_identity::resolve(&root);
            collection_namer::collection_name(git_id.as_deref(), &root.to_string_lossy(), false)
        }
    };

    store.drop_collection(&collection_name).await.map_err(|e| e.to_string())?;
    let mut cache = HashCache::load(&ctx, &root, &collection_name).map_err(|e| e.to_string())?;
    cache.clear().map_err(|e| e.to_string())?;
    let _ = std::fs::remove_file(ctx.join(hybridex_core::project_metadata::PROJECT_METADATA_FILENAME));

    if json {
        println!("{}", serde_json::json!({"collection": collection_name, "status": "cleaned"}));
    } else {
        println!("cleaned collection {collection_name}");
    }
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}
