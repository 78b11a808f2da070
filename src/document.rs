//! Uploaded document bookkeeping and text extraction.
//!
//! Uploads are written to the configured directory under a server-chosen name and registered
//! by a fresh document identifier. The store keeps every upload addressable by id rather than
//! a single process-wide slot, so concurrent sessions over different documents do not clobber
//! each other; a "latest" pointer remains for clients that create an index against a
//! conversation id without naming a document.
//!
//! PDF extraction shells out to the `pdftotext` binary; plain-text files are read directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors raised by the document store and text extraction.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// No file has ever been uploaded to this process.
    #[error("No document has been uploaded")]
    NoDocumentUploaded,
    /// The supplied document identifier was never issued by this server.
    #[error("Unknown document: {0}")]
    NotFound(String),
    /// Filesystem interaction failed while persisting or reading a document.
    #[error("Document I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Text extraction produced no usable content.
    #[error("Failed to extract text from {path}: {reason}")]
    Extraction {
        /// Path of the document we attempted to read.
        path: String,
        /// Short description of what went wrong.
        reason: String,
    },
}

/// A stored upload: server identifier, submitted filename, and on-disk path.
#[derive(Debug, Clone)]
pub struct DocumentReference {
    /// Identifier issued at upload time, referenced by index creation.
    pub id: String,
    /// Filename as submitted by the client.
    pub filename: String,
    /// Server-chosen path under the uploads directory.
    pub path: PathBuf,
}

/// Registry of uploaded files keyed by document identifier.
pub struct DocumentStore {
    upload_dir: PathBuf,
    documents: RwLock<HashMap<String, DocumentReference>>,
    latest: RwLock<Option<String>>,
}

impl DocumentStore {
    /// Create a store rooted at the given uploads directory.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            documents: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
        }
    }

    /// Persist an upload and register it under a fresh document identifier.
    pub async fn save(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<DocumentReference, DocumentError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let id = Uuid::new_v4().to_string();
        let stored_name = format!("{id}-{}", sanitize_filename(filename));
        let path = self.upload_dir.join(stored_name);

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        let reference = DocumentReference {
            id: id.clone(),
            filename: filename.to_string(),
            path,
        };

        self.documents
            .write()
            .await
            .insert(id.clone(), reference.clone());
        *self.latest.write().await = Some(id.clone());

        tracing::info!(
            document = %id,
            filename = %reference.filename,
            bytes = bytes.len(),
            "Document stored"
        );
        Ok(reference)
    }

    /// Look up a document by identifier.
    pub async fn get(&self, id: &str) -> Result<DocumentReference, DocumentError> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    /// Return the most recently uploaded document.
    pub async fn latest(&self) -> Result<DocumentReference, DocumentError> {
        let latest = self.latest.read().await.clone();
        match latest {
            Some(id) => self.get(&id).await,
            None => Err(DocumentError::NoDocumentUploaded),
        }
    }
}

/// Extract the text content of a stored document.
///
/// PDFs go through the `pdftotext` system binary; anything else is treated as UTF-8 text.
pub async fn load_document_text(path: &Path) -> Result<String, DocumentError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let text = if is_pdf {
        extract_pdf_text(path).await?
    } else {
        tokio::fs::read_to_string(path).await?
    };

    if text.trim().is_empty() {
        return Err(DocumentError::Extraction {
            path: path.display().to_string(),
            reason: "no text content".to_string(),
        });
    }
    Ok(text)
}

async fn extract_pdf_text(path: &Path) -> Result<String, DocumentError> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|err| DocumentError::Extraction {
            path: path.display().to_string(),
            reason: format!("failed to run pdftotext: {err}"),
        })?;

    if !output.status.success() {
        return Err(DocumentError::Extraction {
            path: path.display().to_string(),
            reason: format!(
                "pdftotext exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> DocumentStore {
        let dir = std::env::temp_dir().join(format!("docchat-test-{}", Uuid::new_v4()));
        DocumentStore::new(dir)
    }

    #[tokio::test]
    async fn save_registers_and_updates_latest() {
        let store = temp_store();
        let first = store.save("report.pdf", b"%PDF-fake").await.unwrap();
        let second = store.save("notes.txt", b"hello world").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.get(&first.id).await.unwrap().filename, "report.pdf");
        assert_eq!(store.latest().await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn empty_store_reports_no_document() {
        let store = temp_store();
        assert!(matches!(
            store.latest().await.unwrap_err(),
            DocumentError::NoDocumentUploaded
        ));
        assert!(matches!(
            store.get("nope").await.unwrap_err(),
            DocumentError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn plain_text_documents_load_directly() {
        let store = temp_store();
        let doc = store.save("notes.txt", b"chunk me please").await.unwrap();
        let text = load_document_text(&doc.path).await.unwrap();
        assert_eq!(text, "chunk me please");
    }

    #[tokio::test]
    async fn blank_documents_fail_extraction() {
        let store = temp_store();
        let doc = store.save("empty.txt", b"   \n ").await.unwrap();
        let err = load_document_text(&doc.path).await.unwrap_err();
        assert!(matches!(err, DocumentError::Extraction { .. }));
    }

    #[test]
    fn filenames_are_sanitized_for_storage() {
        assert_eq!(sanitize_filename("my file (1).pdf"), "my_file__1_.pdf");
        assert_eq!(sanitize_filename(""), "document");
    }
}
