//! Document loading and page-level chunking.
//!
//! A chunk is one PDF page. Sources are enumerated in file-name order so the
//! same directory always produces the same chunk sequence.


use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use crate::config::FailurePolicy;
use crate::{Result, RetrievalError};

/// One unit of extracted text, stored as a single embeddable record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// File name of the source document
    pub source: String,
    /// 1-based position of the chunk within its source (the page number for PDFs)
    pub chunk_number: u32,
    pub text: String,
}

impl TextChunk {
    #[inline]
    pub fn new(source: impl Into<String>, chunk_number: u32, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            chunk_number,
            text: text.into(),
        }
    }

    /// Identifier that is unique within a collection
    #[inline]
    pub fn unique_identifier(&self) -> String {
        format!("{}#{}", self.source, self.chunk_number)
    }
}

/// A source file that could not be read and was left out of the extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a [`ChunkSource`] produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub chunks: Vec<TextChunk>,
    pub files_processed: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Where chunks come from
pub trait ChunkSource {
    fn extract_chunks(&self) -> Result<Extraction>;
}

impl ChunkSource for [TextChunk] {
    #[inline]
    fn extract_chunks(&self) -> Result<Extraction> {
        let mut sources: Vec<&str> = self.iter().map(|c| c.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();

        Ok(Extraction {
            chunks: self.to_vec(),
            files_processed: sources.len(),
            skipped: Vec::new(),
        })
    }
}

impl ChunkSource for Vec<TextChunk> {
    #[inline]
    fn extract_chunks(&self) -> Result<Extraction> {
        self.as_slice().extract_chunks()
    }
}

/// Every PDF file directly inside a directory, one chunk per page
#[derive(Debug, Clone)]
pub struct PdfDirectory {
    path: PathBuf,
    on_error: FailurePolicy,
}

impl PdfDirectory {
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            on_error: FailurePolicy::default(),
        }
    }

    #[inline]
    pub fn with_failure_policy(mut self, on_error: FailurePolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// PDF files in the directory, sorted by path
    #[inline]
    pub fn pdf_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.path).map_err(|e| RetrievalError::io(&self.path, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| RetrievalError::io(&self.path, e))?.path();

            if !path.is_file() {
                debug!("Skipping {} as it is not a file", path.display());
                continue;
            }
            if !is_pdf(&path) {
                info!("Skipping {} as it is not a PDF file", path.display());
                continue;
            }
            files.push(path);
        }

        files.sort();
        Ok(files)
    }
}

impl ChunkSource for PdfDirectory {
    fn extract_chunks(&self) -> Result<Extraction> {
        let files = self.pdf_files()?;
        info!(
            "Extracting pages from {} PDF files in {}",
            files.len(),
            self.path.display()
        );

        let mut extraction = Extraction::default();

        for path in files {
            match extract_pdf_chunks(&path) {
                Ok(chunks) => {
                    debug!("Extracted {} pages from {}", chunks.len(), path.display());
                    extraction.files_processed += 1;
                    extraction.chunks.extend(chunks);
                }
                Err(e) => match self.on_error {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!("Skipping {}: {}", path.display(), e);
                        extraction.skipped.push(SkippedFile {
                            path,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        Ok(extraction)
    }
}

/// Extract one chunk per page of the PDF at `path`
///
/// Pages without text are left out; the remaining chunks keep their page numbers.
#[inline]
pub fn extract_pdf_chunks(path: &Path) -> Result<Vec<TextChunk>> {
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RetrievalError::Pdf {
            path: path.to_path_buf(),
            message: "path has no file name".to_string(),
        })?;

    let pages = extract_pdf_pages(path)?;

    Ok(pages
        .into_iter()
        .zip(1..)
        .filter_map(|(text, page_number)| {
            if text.is_empty() {
                debug!("Skipping blank page {} of {}", page_number, source);
                None
            } else {
                Some(TextChunk::new(source.as_str(), page_number, text))
            }
        })
        .collect())
}

/// Extract the text of every page, in page order
#[inline]
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| RetrievalError::io(path, e))?;

    // pdf-extract panics on some malformed fonts and encodings
    let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }))
    .map_err(|_| RetrievalError::Pdf {
        path: path.to_path_buf(),
        message: "text extraction panicked".to_string(),
    })?;

    let pages = extracted.map_err(|e| RetrievalError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(pages
        .into_iter()
        .map(|page| page.trim().to_string())
        .collect())
}

/// Rough token estimate used for record metadata
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // 1 token ≈ 0.75 words for English text, plus a little for punctuation
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
