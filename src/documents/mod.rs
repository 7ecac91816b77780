//! Plain-text extraction for uploaded or on-disk documents.
//!
//! Upload paths use [`extract_document`], which never fails: read or parse
//! errors become placeholder text so the surrounding chat turn continues.
//! The knowledge-base builder uses the strict [`read_path`] instead.

mod table;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use table::render_csv;

pub const WORD_PLACEHOLDER: &str =
    "Arquivo do Word anexado (processamento de conteúdo não disponível)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Txt,
    Csv,
    Word,
    Unsupported,
}

impl DocumentKind {
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "txt" => DocumentKind::Txt,
            "csv" | "xls" | "xlsx" => DocumentKind::Csv,
            "doc" | "docx" => DocumentKind::Word,
            _ => DocumentKind::Unsupported,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Txt => "TXT",
            DocumentKind::Csv => "CSV",
            DocumentKind::Word => "Word",
            DocumentKind::Unsupported => "arquivo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub text: String,
}

impl ExtractedDocument {
    /// Source label used when this document is injected as retrieval context.
    pub fn context_label(&self) -> String {
        format!("Contexto do arquivo {}: {}", self.kind.label(), self.name)
    }
}

/// Wraps text with a labeled source header for inclusion in a prompt.
pub fn format_context(context: &str, source: &str) -> String {
    format!("{source}:\n{context}")
}

/// Failure to turn a document into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Pdf(String),
    #[error("{0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("Tipo de arquivo não suportado: {0}")]
    Unsupported(String),
}

/// Strict extraction: returns the text or the reason it could not be read.
pub fn read_document(file_name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
    match DocumentKind::from_file_name(file_name) {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Pdf(e.to_string())),
        DocumentKind::Txt => Ok(String::from_utf8(bytes.to_vec())?),
        DocumentKind::Csv => Ok(render_csv(bytes)?),
        DocumentKind::Word => Ok(WORD_PLACEHOLDER.to_string()),
        DocumentKind::Unsupported => {
            let ext = file_name.rsplit_once('.').map(|(_, e)| e).unwrap_or(file_name);
            Err(ExtractionError::Unsupported(ext.to_string()))
        }
    }
}

/// Lenient extraction used for uploads: failures become placeholder text.
pub fn extract_document(file_name: &str, bytes: &[u8]) -> ExtractedDocument {
    let kind = DocumentKind::from_file_name(file_name);
    let text = match read_document(file_name, bytes) {
        Ok(text) => text,
        Err(e @ ExtractionError::Unsupported(_)) => e.to_string(),
        Err(e) => {
            warn!("Failed to extract {file_name}: {e}");
            format!("Erro ao ler {}: {e}", kind.label())
        }
    };
    ExtractedDocument { name: file_name.to_string(), kind, text }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Strict on-disk extraction.
pub fn read_path(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path)?;
    read_document(&file_name_of(path), &bytes)
}

/// Reads `path` from disk and extracts it with the same rules as uploads.
pub fn extract_path(path: &Path) -> ExtractedDocument {
    let name = file_name_of(path);
    match std::fs::read(path) {
        Ok(bytes) => extract_document(&name, &bytes),
        Err(e) => {
            let kind = DocumentKind::from_file_name(&name);
            warn!("Failed to read {}: {e}", path.display());
            ExtractedDocument {
                text: format!("Erro ao ler {}: {e}", kind.label()),
                name,
                kind,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_picked_from_extension_case_insensitively() {
        assert_eq!(DocumentKind::from_file_name("Manual.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_file_name("notes.txt"), DocumentKind::Txt);
        assert_eq!(DocumentKind::from_file_name("plan.xlsx"), DocumentKind::Csv);
        assert_eq!(DocumentKind::from_file_name("memo.docx"), DocumentKind::Word);
        assert_eq!(DocumentKind::from_file_name("img.png"), DocumentKind::Unsupported);
        assert_eq!(DocumentKind::from_file_name("README"), DocumentKind::Unsupported);
    }

    #[test]
    fn txt_is_returned_verbatim() {
        let doc = extract_document("a.txt", "porta 22 liberada".as_bytes());
        assert_eq!(doc.text, "porta 22 liberada");
        assert_eq!(doc.context_label(), "Contexto do arquivo TXT: a.txt");
    }

    #[test]
    fn invalid_utf8_becomes_placeholder() {
        let doc = extract_document("bad.txt", &[0xff, 0xfe, 0x00]);
        assert!(doc.text.starts_with("Erro ao ler TXT:"));
    }

    #[test]
    fn broken_pdf_becomes_placeholder() {
        let doc = extract_document("broken.pdf", b"not a pdf");
        assert!(doc.text.starts_with("Erro ao ler PDF:"));
    }

    #[test]
    fn word_and_unknown_types_get_descriptive_text() {
        assert_eq!(extract_document("x.doc", b"..").text, WORD_PLACEHOLDER);
        assert_eq!(
            extract_document("x.png", b"..").text,
            "Tipo de arquivo não suportado: png"
        );
    }

    #[test]
    fn missing_file_becomes_placeholder() {
        let doc = extract_path(Path::new("/definitely/not/here.txt"));
        assert_eq!(doc.name, "here.txt");
        assert!(doc.text.starts_with("Erro ao ler TXT:"));
    }

    #[test]
    fn strict_reader_reports_errors() {
        assert!(matches!(read_document("x.png", b".."), Err(ExtractionError::Unsupported(_))));
        assert!(matches!(read_document("x.txt", &[0xff]), Err(ExtractionError::Utf8(_))));
        assert!(matches!(
            read_path(Path::new("/definitely/not/here.pdf")),
            Err(ExtractionError::Io(_))
        ));
    }

    #[test]
    fn csv_upload_is_flattened() {
        let doc = extract_document("hosts.csv", b"host,ip\nfw01,10.0.0.1\n");
        assert_eq!(doc.kind, DocumentKind::Csv);
        assert!(doc.text.contains("fw01"));
        assert!(doc.text.lines().next().unwrap().contains("host"));
    }

    #[test]
    fn context_is_labeled() {
        assert_eq!(format_context("abc", "Contexto do Usuário"), "Contexto do Usuário:\nabc");
    }
}
