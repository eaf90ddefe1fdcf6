//! Persistent vector index over chunks.
//!
//! An [`Index`] knows where the store lives and which embedder fills it.
//! Building or opening one yields an [`IndexHandle`], a cheap clonable
//! reference to the open store that the retriever searches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::chunker::Chunk;
use crate::db::search::SearchResult;
use crate::db::{Db, IndexMeta};
use crate::embedder::{Embedder, EmbedderError};
use crate::executor::{OffloadError, offload_io};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedderError),

    #[error("vector store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("could not prepare index directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Offload(#[from] OffloadError),

    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index was built with model '{stored}', current embedder is '{current}'")]
    ModelMismatch { stored: String, current: String },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("no index has been built at {0}")]
    NotBuilt(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

const MEMORY_PATH: &str = ":memory:";

/// Builds, extends and reopens the store at one path.
pub struct Index {
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
}

impl Index {
    /// `path` may be `:memory:` for a store that lives only as long as its handle.
    pub fn new(embedder: Arc<dyn Embedder>, path: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The same index scoped to one session: a sibling store named
    /// `<stem>-<session_id>.<ext>`. In-memory stores are already private
    /// to their handle and are returned unchanged.
    pub fn for_session(&self, session_id: &str) -> Index {
        Index {
            embedder: self.embedder.clone(),
            path: session_store_path(&self.path, session_id),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed every chunk and overwrite the store with them.
    ///
    /// All embeddings are computed before the store is touched, and the write
    /// is a single transaction, so a failure leaves the previous contents.
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<IndexHandle> {
        let embeddings = self.embed_chunks(&chunks).await?;
        let meta = IndexMeta {
            model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
            built_at: Utc::now(),
        };

        let path = self.path.clone();
        let stored_meta = meta.clone();
        let db = offload_io(move || -> Result<Db> {
            let mut db = open_store(&path)?;
            db.replace_all(&stored_meta, &chunks, &embeddings)?;
            Ok(db)
        })
        .await??;

        info!(
            "Built index at {} ({} dims, model {})",
            self.path.display(),
            meta.dimensions,
            meta.model
        );
        Ok(IndexHandle::new(db, self.path.clone(), meta))
    }

    /// Embed `chunks` and append them to the store behind `handle`.
    pub async fn add(&self, handle: &IndexHandle, chunks: Vec<Chunk>) -> Result<usize> {
        self.check_compatible(handle.meta())?;
        let embeddings = self.embed_chunks(&chunks).await?;

        let db = handle.db.clone();
        let added = offload_io(move || -> Result<usize> {
            let mut db = db.blocking_lock();
            Ok(db.append(&chunks, &embeddings)?)
        })
        .await??;

        info!("Added {} chunks to {}", added, self.path.display());
        Ok(added)
    }

    /// Reopen a store written by an earlier [`build`](Self::build).
    ///
    /// Fails if nothing was built there, or if it was built by a different
    /// embedding model or width.
    pub async fn open(&self) -> Result<IndexHandle> {
        let path = self.path.clone();
        let (db, meta) = offload_io(move || -> Result<(Db, Option<IndexMeta>)> {
            let db = Db::open(&path)?;
            let meta = db.meta()?;
            Ok((db, meta))
        })
        .await??;

        let meta = meta.ok_or_else(|| IndexError::NotBuilt(self.path.display().to_string()))?;
        self.check_compatible(&meta)?;

        info!(
            "Opened index at {} (built {})",
            self.path.display(),
            meta.built_at.to_rfc3339()
        );
        Ok(IndexHandle::new(db, self.path.clone(), meta))
    }

    fn check_compatible(&self, meta: &IndexMeta) -> Result<()> {
        if meta.dimensions != self.embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: meta.dimensions,
                actual: self.embedder.dimensions(),
            });
        }
        if meta.model != self.embedder.model_name() {
            return Err(IndexError::ModelMismatch {
                stored: meta.model.clone(),
                current: self.embedder.model_name().to_string(),
            });
        }
        Ok(())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        debug!("Embedding {} chunks", texts.len());
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(IndexError::CountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }
        let expected = self.embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(embeddings)
    }
}

fn session_store_path(base: &Path, session_id: &str) -> PathBuf {
    if base.as_os_str() == MEMORY_PATH {
        return base.to_path_buf();
    }
    let id: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}-{id}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{id}"),
    };
    base.with_file_name(file_name)
}

fn open_store(path: &Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Db::open(path)?)
}

/// Shared reference to an open store.
#[derive(Clone)]
pub struct IndexHandle {
    db: Arc<TokioMutex<Db>>,
    path: PathBuf,
    meta: IndexMeta,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("path", &self.path)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl IndexHandle {
    fn new(db: Db, path: PathBuf, meta: IndexMeta) -> Self {
        Self {
            db: Arc::new(TokioMutex::new(db)),
            path,
            meta,
        }
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> Result<usize> {
        let db = self.db.clone();
        offload_io(move || -> Result<usize> { Ok(db.blocking_lock().count_chunks()?) }).await?
    }

    /// Nearest `top_k` chunks to `query_vector`, best first.
    pub async fn search(&self, query_vector: Vec<f32>, top_k: usize) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.meta.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.meta.dimensions,
                actual: query_vector.len(),
            });
        }
        let db = self.db.clone();
        offload_io(move || -> Result<Vec<SearchResult>> {
            Ok(db.blocking_lock().search(&query_vector, top_k)?)
        })
        .await?
    }
}
