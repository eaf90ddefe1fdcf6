//! Session-level pipeline: ingest files into an index, answer questions over it.
//!
//! A [`Session`] is `Empty` until a batch of files yields at least one
//! document, then `Ready`. Ingesting into a `Ready` session appends to its
//! index. Any failure leaves the session exactly as it was.

pub mod prompt;
pub mod session;

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::config::Config;
use crate::embedder::Embedder;
use crate::executor::{OffloadError, WorkerPool};
use crate::index::{Index, IndexError};
use crate::llm::{LanguageModel, LlmError};
use crate::parser::{Document, ParseError, Parser, RawFile};
use crate::retriever::Retriever;

pub use session::{ConversationState, Session, SessionStatus, Turn};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("no valid documents: every file was unsupported or empty")]
    NoValidDocuments,

    #[error("session is not ready: ingest documents before asking")]
    NotReady,

    #[error("ingestion failed: {0}")]
    Ingestion(#[source] IngestionError),

    #[error("generation failed: {0}")]
    Generation(#[source] GenerationError),
}

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("could not parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    #[error("chunking failed: {0}")]
    Chunk(#[from] OffloadError),

    #[error("indexing failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error("language model failed: {0}")]
    Model(#[from] LlmError),
}

impl From<IngestionError> for OrchestratorError {
    fn from(err: IngestionError) -> Self {
        OrchestratorError::Ingestion(err)
    }
}

impl From<GenerationError> for OrchestratorError {
    fn from(err: GenerationError) -> Self {
        OrchestratorError::Generation(err)
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// What one successful ingest produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
}

pub struct Orchestrator {
    parser: Parser,
    chunker: Chunker,
    index: Index,
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        parser: Parser,
        chunker: Chunker,
        index: Index,
        model: Arc<dyn LanguageModel>,
        top_k: usize,
    ) -> Self {
        let retriever = Retriever::new(index.embedder().clone());
        Self {
            parser,
            chunker,
            index,
            retriever,
            model,
            top_k: top_k.max(1),
        }
    }

    /// Wire the pipeline from configuration. Parsing and chunking share one
    /// worker pool of `parse_workers` threads.
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let pool = WorkerPool::new(config.parse_workers);
        let parser = Parser::new(pool.clone(), config.scratch_dir());
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap, pool);
        let index = Index::new(embedder, &config.index_path);
        Self::new(parser, chunker, index, model, config.search_top_k)
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Parse `files` concurrently, chunk the documents and index them.
    ///
    /// Files that are unsupported or blank are skipped. If nothing is left the
    /// call fails with [`OrchestratorError::NoValidDocuments`].
    pub async fn ingest(&self, session: &Session, files: Vec<RawFile>) -> Result<IngestSummary> {
        let mut state = session.lock().await;
        let file_count = files.len();

        let documents = self.parse_all(files).await?;
        if documents.is_empty() {
            warn!("No valid documents in batch of {} files", file_count);
            return Err(OrchestratorError::NoValidDocuments);
        }
        let document_count = documents.len();

        let chunks = self
            .chunker
            .split(documents)
            .await
            .map_err(IngestionError::from)?;
        let chunk_count = chunks.len();

        let index = self.index.for_session(session.id());
        if let Some(handle) = state.index.clone() {
            index
                .add(&handle, chunks)
                .await
                .map_err(IngestionError::from)?;
        } else {
            let handle = index
                .build(chunks)
                .await
                .map_err(IngestionError::from)?;
            state.index = Some(handle);
        }

        info!(
            "Ingested {} of {} files as {} chunks",
            document_count, file_count, chunk_count
        );
        Ok(IngestSummary {
            files: file_count,
            documents: document_count,
            chunks: chunk_count,
        })
    }

    /// Re-attach the store persisted for this session id, making an
    /// `Empty` session `Ready` without re-ingesting.
    pub async fn resume(&self, session: &Session) -> Result<()> {
        let mut state = session.lock().await;
        let handle = self
            .index
            .for_session(session.id())
            .open()
            .await
            .map_err(IngestionError::from)?;
        state.index = Some(handle);
        Ok(())
    }

    /// Parse `files` concurrently. Documents come back in submission order;
    /// unsupported and blank files are dropped.
    pub(crate) async fn parse_all(&self, files: Vec<RawFile>) -> Result<Vec<Document>> {
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let parsed = join_all(files.into_iter().map(|file| self.parser.parse(file))).await;

        let mut documents = Vec::with_capacity(parsed.len());
        for (name, result) in names.into_iter().zip(parsed) {
            match result {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => {}
                Err(source) => {
                    warn!("Ingestion failed on {}: {}", name, source);
                    return Err(IngestionError::Parse { file: name, source }.into());
                }
            }
        }
        Ok(documents)
    }

    /// Answer `query` from the session's index and recent history.
    pub async fn ask(&self, session: &Session, query: &str) -> Result<String> {
        let mut state = session.lock().await;
        let Some(handle) = state.index.clone() else {
            return Err(OrchestratorError::NotReady);
        };

        let chunks = self
            .retriever
            .retrieve(&handle, query, self.top_k)
            .await
            .map_err(GenerationError::from)?;

        let context = prompt::render_context(&chunks);
        let chat_history = prompt::render_history(state.conversation.turns());
        let rendered = prompt::render_prompt(&context, &chat_history, query);

        info!(
            "Generating answer with {} ({} context chunks)",
            self.model.name(),
            chunks.len()
        );
        let raw = self
            .model
            .generate(&rendered)
            .await
            .map_err(GenerationError::from)?;
        let answer = raw.trim().to_string();

        state.conversation.push(query, answer.clone());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hashing::HashingEmbedder;
    use crate::llm::mock::MockLanguageModel;
    use crate::parser::{MIME_CSV, MIME_PDF};

    fn orchestrator(model: Arc<dyn LanguageModel>) -> Orchestrator {
        let pool = WorkerPool::new(2);
        Orchestrator::new(
            Parser::new(pool.clone(), None),
            Chunker::new(1500, 200, pool),
            Index::new(Arc::new(HashingEmbedder::new(128)), ":memory:"),
            model,
            3,
        )
    }

    fn on_disk_orchestrator(dir: &std::path::Path, model: Arc<dyn LanguageModel>) -> Orchestrator {
        let pool = WorkerPool::new(2);
        Orchestrator::new(
            Parser::new(pool.clone(), None),
            Chunker::new(1500, 200, pool),
            Index::new(Arc::new(HashingEmbedder::new(128)), dir.join("store.db")),
            model,
            3,
        )
    }

    fn csv(name: &str, body: &str) -> RawFile {
        RawFile::new(name, MIME_CSV, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_ask_before_ingest_is_not_ready() {
        let model = Arc::new(MockLanguageModel::fixed("unused"));
        let orchestrator = orchestrator(model.clone());
        let session = Session::new();

        let err = orchestrator.ask(&session, "anything?").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotReady));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_only_unsupported_files() {
        let orchestrator = orchestrator(Arc::new(MockLanguageModel::fixed("x")));
        let session = Session::new();

        let err = orchestrator
            .ingest(
                &session,
                vec![
                    RawFile::new("notes.txt", "text/plain", b"hello".to_vec()),
                    RawFile::new("pic.png", "image/png", vec![0x89, 0x50]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoValidDocuments));
        assert_eq!(session.status().await, SessionStatus::Empty);
    }

    #[tokio::test]
    async fn test_ingest_then_ask_records_history() {
        let model = Arc::new(MockLanguageModel::echo_context());
        let orchestrator = orchestrator(model.clone());
        let session = Session::new();

        let summary = orchestrator
            .ingest(
                &session,
                vec![
                    csv("people.csv", "name,age\nAlice,30"),
                    RawFile::new("skip.bin", "application/octet-stream", vec![1, 2, 3]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                files: 2,
                documents: 1,
                chunks: 1
            }
        );
        assert_eq!(session.status().await, SessionStatus::Ready);

        let answer = orchestrator
            .ask(&session, "How old is Alice?")
            .await
            .unwrap();
        assert!(answer.contains("30"));
        assert_eq!(answer, answer.trim());

        let history = session.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "How old is Alice?");
        assert_eq!(history[0].answer, answer);
    }

    #[tokio::test]
    async fn test_prompt_history_capped_at_three() {
        let model = Arc::new(MockLanguageModel::fixed("ok"));
        let orchestrator = orchestrator(model.clone());
        let session = Session::new();
        orchestrator
            .ingest(&session, vec![csv("a.csv", "x,y\n1,2")])
            .await
            .unwrap();

        for i in 1..=5 {
            orchestrator.ask(&session, &format!("question {i}")).await.unwrap();
        }
        let last = model.last_prompt().unwrap();
        assert!(!last.contains("Q: question 1\n"));
        assert!(last.contains("Q: question 2\nA: ok\nQ: question 3\nA: ok\nQ: question 4\nA: ok\n"));
        assert!(last.contains("Question: question 5\n"));
        assert_eq!(session.history().await.len(), 5);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_state() {
        let model = Arc::new(MockLanguageModel::failing("quota exceeded"));
        let orchestrator = orchestrator(model.clone());
        let session = Session::new();
        orchestrator
            .ingest(&session, vec![csv("a.csv", "x,y\n1,2")])
            .await
            .unwrap();

        let err = orchestrator.ask(&session, "q?").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Generation(GenerationError::Model(_))
        ));
        assert!(err.to_string().starts_with("generation failed"));
        assert_eq!(session.status().await, SessionStatus::Ready);
        assert!(session.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_is_ingestion_error() {
        let orchestrator = orchestrator(Arc::new(MockLanguageModel::fixed("x")));
        let session = Session::new();

        let err = orchestrator
            .ingest(
                &session,
                vec![RawFile::new("broken.pdf", MIME_PDF, b"not a pdf".to_vec())],
            )
            .await
            .unwrap_err();
        match err {
            OrchestratorError::Ingestion(IngestionError::Parse { file, .. }) => {
                assert_eq!(file, "broken.pdf");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.status().await, SessionStatus::Empty);
    }

    #[tokio::test]
    async fn test_second_ingest_adds_to_index() {
        let orchestrator = orchestrator(Arc::new(MockLanguageModel::fixed("x")));
        let session = Session::new();
        orchestrator
            .ingest(&session, vec![csv("a.csv", "x,y\n1,2")])
            .await
            .unwrap();
        orchestrator
            .ingest(&session, vec![csv("b.csv", "p,q\n3,4")])
            .await
            .unwrap();

        let handle = session.index().await.unwrap();
        assert_eq!(handle.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_asks_are_serialized() {
        let orchestrator = Arc::new(orchestrator(Arc::new(MockLanguageModel::fixed("ok"))));
        let session = Arc::new(Session::new());
        orchestrator
            .ingest(&session, vec![csv("a.csv", "x,y\n1,2")])
            .await
            .unwrap();

        let asks = (0..4).map(|i| {
            let orchestrator = orchestrator.clone();
            let session = session.clone();
            tokio::spawn(async move { orchestrator.ask(&session, &format!("q{i}")).await })
        });
        for result in join_all(asks).await {
            result.unwrap().unwrap();
        }
        assert_eq!(session.history().await.len(), 4);
    }

    #[tokio::test]
    async fn test_sessions_keep_their_own_documents() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            on_disk_orchestrator(dir.path(), Arc::new(MockLanguageModel::echo_context()));
        let first = Session::new();
        let second = Session::new();

        orchestrator
            .ingest(&first, vec![csv("cities.csv", "city,country\nParis,France")])
            .await
            .unwrap();
        orchestrator
            .ingest(&second, vec![csv("people.csv", "name,age\nAlice,30")])
            .await
            .unwrap();

        let answer = orchestrator
            .ask(&first, "Which country is Paris in?")
            .await
            .unwrap();
        assert!(answer.contains("Paris"), "answer was: {answer}");
        assert!(!answer.contains("Alice"), "answer was: {answer}");

        let answer = orchestrator.ask(&second, "How old is Alice?").await.unwrap();
        assert!(answer.contains("30"), "answer was: {answer}");
        assert!(!answer.contains("Paris"), "answer was: {answer}");
    }

    #[tokio::test]
    async fn test_named_session_resumes_its_own_store() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            on_disk_orchestrator(dir.path(), Arc::new(MockLanguageModel::echo_context()));
        orchestrator
            .ingest(&Session::with_id("alice"), vec![csv("a.csv", "k,v\nalpha,1")])
            .await
            .unwrap();
        orchestrator
            .ingest(&Session::with_id("bob"), vec![csv("b.csv", "k,v\nbeta,2")])
            .await
            .unwrap();

        let resumed = Session::with_id("alice");
        orchestrator.resume(&resumed).await.unwrap();
        assert_eq!(resumed.index().await.unwrap().len().await.unwrap(), 1);
        let answer = orchestrator.ask(&resumed, "alpha?").await.unwrap();
        assert!(answer.contains("alpha"), "answer was: {answer}");
        assert!(!answer.contains("beta"), "answer was: {answer}");

        let stranger = Session::with_id("carol");
        assert!(orchestrator.resume(&stranger).await.is_err());
        assert_eq!(stranger.status().await, SessionStatus::Empty);
    }

    #[tokio::test]
    async fn test_documents_keep_submission_order() {
        let orchestrator = orchestrator(Arc::new(MockLanguageModel::fixed("x")));
        let mut big = String::from("id,name\n");
        for i in 0..20_000 {
            big.push_str(&format!("{i},row {i}\n"));
        }

        let documents = orchestrator
            .parse_all(vec![
                csv("big.csv", &big),
                RawFile::new("skip.txt", "text/plain", b"x".to_vec()),
                csv("small.csv", "a,b\n1,2"),
            ])
            .await
            .unwrap();
        let names: Vec<&str> = documents.iter().map(|d| d.file_name()).collect();
        assert_eq!(names, ["big.csv", "small.csv"]);

        let session = Session::new();
        orchestrator
            .ingest(&session, vec![csv("big.csv", &big), csv("small.csv", "a,b\n1,2")])
            .await
            .unwrap();
        // Chunk ids follow insertion order, so the small file's chunk is last.
        let handle = session.index().await.unwrap();
        let query = orchestrator.index().embedder().embed("a | b 1 | 2").await.unwrap();
        let results = handle.search(query, 1).await.unwrap();
        assert_eq!(results[0].file_name, "small.csv");
        assert_eq!(results[0].chunk_id, handle.len().await.unwrap() as i64);
    }
}
