//! The local file handle for an upload.
//!
//! Created when the user chooses a file, destroyed on terminal state or
//! navigation away. The handle is the sole owner of the file's object
//! URL: the URL is revoked exactly once, either right after the base64
//! contents are produced or at teardown, whichever comes first. Preview
//! surfaces receive the URL read-only and never revoke it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use docflow_host::ObjectUrlStore;

/// Maximum accepted upload size.
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

/// The only accepted MIME type.
pub const PDF_MIME: &str = "application/pdf";

/// Magic prefix of a PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// What the upload panel hands to the job client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    /// Object URL of the chosen file.
    pub file_url: String,
    /// Original file name.
    pub file_name: String,
    /// Document type code chosen in the upload panel.
    pub document_type: String,
}

/// Validation failures on the selected file. These are local errors: the
/// user sees a warning and the state machine navigates back to the
/// dashboard.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The object URL resolved to nothing (already revoked or bogus).
    #[error("the selected file is no longer available")]
    Missing,

    /// The file is not a PDF.
    #[error("'{file_name}' is not a PDF file")]
    NotAPdf {
        /// Name of the offending file.
        file_name: String,
    },

    /// The file exceeds [`MAX_FILE_BYTES`].
    #[error("'{file_name}' is {size} bytes, above the {MAX_FILE_BYTES} byte limit")]
    TooLarge {
        /// Name of the offending file.
        file_name: String,
        /// Actual size in bytes.
        size: usize,
    },
}

/// The job client's owned handle on the selected file.
#[derive(Debug)]
pub struct FileHandle {
    /// Object URL of the file. Kept for the revoke bookkeeping after the
    /// contents have been read.
    file_url: String,
    /// Original file name, submitted with the job.
    file_name: String,
    /// Document type code.
    document_type: String,
    /// Base64 contents, filled by [`FileHandle::read`].
    base64: Option<String>,
    /// Whether the object URL has been revoked. Guarantees the revoke
    /// happens exactly once across read and teardown.
    revoked: bool,
}

impl FileHandle {
    /// Wraps a selection into an owned handle.
    #[must_use]
    pub fn new(selection: FileSelection) -> Self {
        Self {
            file_url: selection.file_url,
            file_name: selection.file_name,
            document_type: selection.document_type,
            base64: None,
            revoked: false,
        }
    }

    /// Original file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Document type code.
    #[must_use]
    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    /// Base64 contents, once read.
    #[must_use]
    pub fn base64(&self) -> Option<&str> {
        self.base64.as_deref()
    }

    /// Resolves the object URL, validates MIME type and size, encodes the
    /// contents as base64, and revokes the URL.
    ///
    /// # Errors
    ///
    /// Returns [`FileError`] when the URL no longer resolves, the file is
    /// not a PDF, or it is too large. The URL is only revoked on success;
    /// failed validation leaves it for [`FileHandle::release`] so the
    /// revoke still happens exactly once.
    pub fn read(&mut self, store: &dyn ObjectUrlStore) -> Result<&str, FileError> {
        if self.base64.is_some() {
            // Already read; the URL is gone.
            return Ok(self.base64.as_deref().unwrap_or_default());
        }

        let blob = store.resolve(&self.file_url).ok_or(FileError::Missing)?;

        let looks_like_pdf = blob.mime == PDF_MIME && blob.bytes.starts_with(PDF_MAGIC);
        if !looks_like_pdf {
            return Err(FileError::NotAPdf {
                file_name: self.file_name.clone(),
            });
        }
        if blob.bytes.len() > MAX_FILE_BYTES {
            return Err(FileError::TooLarge {
                file_name: self.file_name.clone(),
                size: blob.bytes.len(),
            });
        }

        self.base64 = Some(BASE64.encode(&blob.bytes));
        drop(blob);
        self.revoke(store);

        Ok(self.base64.as_deref().unwrap_or_default())
    }

    /// Releases the object URL if it is still held. Safe to call any
    /// number of times; the underlying revoke happens at most once.
    pub fn release(&mut self, store: &dyn ObjectUrlStore) {
        if !self.revoked {
            self.revoke(store);
        }
    }

    fn revoke(&mut self, store: &dyn ObjectUrlStore) {
        self.revoked = true;
        if !store.revoke(&self.file_url) {
            log::warn!("object URL {} was already revoked", self.file_url);
        }
    }
}
