//! Raw upload → plain-text [`Document`] conversion.
//!
//! Dispatch is on the *declared* content type only; bytes are never sniffed.
//! Every decode runs on the CPU [`WorkerPool`] and goes through a
//! [`scratch::ScratchFile`] that is removed on every exit path.
pub mod pdf;
pub mod scratch;
pub mod tabular;

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::executor::{OffloadError, WorkerPool};
use scratch::ScratchFile;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLS: &str = "application/vnd.ms-excel";

/// Metadata key carrying the originating file name.
pub const FILE_NAME_KEY: &str = "file_name";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to write scratch file: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("PDF decode failed: {0}")]
    Pdf(String),

    #[error("CSV decode failed: {0}")]
    Csv(String),

    #[error("spreadsheet decode failed: {0}")]
    Spreadsheet(String),

    #[error(transparent)]
    Offload(#[from] OffloadError),
}

/// An uploaded file as handed over by the upload collaborator.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Extracted text plus string metadata; always carries [`FILE_NAME_KEY`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(file_name: &str, text: String) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(FILE_NAME_KEY.to_string(), file_name.to_string());
        Self { text, metadata }
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        self.metadata
            .get(FILE_NAME_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// The formats the parser understands, keyed by declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Pdf,
    Csv,
    Spreadsheet,
    Unsupported,
}

impl ContentKind {
    /// Classify a declared content type. Parameters such as `; charset=utf-8`
    /// are ignored, as is letter case.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            MIME_PDF => ContentKind::Pdf,
            MIME_CSV => ContentKind::Csv,
            MIME_XLSX | MIME_XLS => ContentKind::Spreadsheet,
            _ => ContentKind::Unsupported,
        }
    }

    /// Suffix given to the scratch file; calamine picks its reader by it.
    fn scratch_suffix(self, file_name: &str) -> &'static str {
        match self {
            ContentKind::Pdf => ".pdf",
            ContentKind::Csv => ".csv",
            ContentKind::Spreadsheet if file_name.to_ascii_lowercase().ends_with(".xls") => ".xls",
            ContentKind::Spreadsheet => ".xlsx",
            ContentKind::Unsupported => "",
        }
    }
}

/// Guess a content type from a file extension, for callers that only have a
/// path on disk.
#[must_use]
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "csv" => MIME_CSV,
        "xlsx" => MIME_XLSX,
        "xls" => MIME_XLS,
        _ => "application/octet-stream",
    }
}

#[derive(Clone, Debug)]
pub struct Parser {
    pool: WorkerPool,
    scratch_dir: Option<PathBuf>,
}

impl Parser {
    pub fn new(pool: WorkerPool, scratch_dir: Option<PathBuf>) -> Self {
        Self { pool, scratch_dir }
    }

    /// Parse one file into a [`Document`].
    ///
    /// Returns `Ok(None)` for unsupported content types and for files whose
    /// decoded text is blank. Decoder failures on a supported type are errors.
    pub async fn parse(&self, file: RawFile) -> Result<Option<Document>, ParseError> {
        let kind = ContentKind::from_content_type(&file.content_type);
        if kind == ContentKind::Unsupported {
            info!(
                "Skipping {}: unsupported content type {}",
                file.name, file.content_type
            );
            return Ok(None);
        }

        let scratch_dir = self.scratch_dir.clone();
        self.pool
            .run(move || decode(kind, &file, scratch_dir))
            .await?
    }
}

/// Blocking part of [`Parser::parse`]. The scratch file lives exactly as
/// long as this call.
fn decode(
    kind: ContentKind,
    file: &RawFile,
    scratch_dir: Option<PathBuf>,
) -> Result<Option<Document>, ParseError> {
    let scratch = ScratchFile::create(
        scratch_dir.as_deref(),
        kind.scratch_suffix(&file.name),
        &file.bytes,
    )?;
    debug!("Decoding {} as {:?}", file.name, kind);

    let text = match kind {
        ContentKind::Pdf => pdf::extract_text(scratch.path())?,
        ContentKind::Csv => tabular::render_csv(scratch.path())?,
        ContentKind::Spreadsheet => tabular::render_spreadsheet(scratch.path())?,
        ContentKind::Unsupported => return Ok(None),
    };

    if text.trim().is_empty() {
        warn!("No text extracted from {}, skipping", file.name);
        return Ok(None);
    }

    info!("Parsed {} ({} chars)", file.name, text.chars().count());
    Ok(Some(Document::new(&file.name, text)))
}
