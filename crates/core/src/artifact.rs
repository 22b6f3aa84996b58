//! Source and result artifacts.
//!
//! [`SourceArtifact`] is the text document the caller picked;
//! [`ArtifactHandle`] is the locally addressable audio file produced by a
//! finished job. A handle owns its backing file and removes it when
//! dropped, so releasing a superseded result is just dropping its job.

use std::fmt;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::CoreError;
use crate::types::JobId;

/// Media type sent for `.txt` sources.
pub const MEDIA_TYPE_TEXT: &str = "text/plain";
/// Media type sent for anything else.
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";
/// Media type of the rendered result.
pub const MEDIA_TYPE_AUDIO: &str = "audio/wav";
/// File name offered when the result is downloaded.
pub const DEFAULT_DOWNLOAD_NAME: &str = "speech.wav";

/// Guess the media type of a source from its file name.
pub fn media_type_for(file_name: &str) -> &'static str {
    let is_txt = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if is_txt {
        MEDIA_TYPE_TEXT
    } else {
        MEDIA_TYPE_OCTET_STREAM
    }
}

// ---------------------------------------------------------------------------
// SourceArtifact
// ---------------------------------------------------------------------------

/// The document submitted for conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    file_name: String,
    content: Vec<u8>,
    media_type: String,
}

impl SourceArtifact {
    /// Build a source artifact, rejecting empty names and empty content.
    pub fn new(
        file_name: impl Into<String>,
        content: Vec<u8>,
        media_type: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Source file name must not be empty".to_string(),
            ));
        }
        if content.is_empty() {
            return Err(CoreError::Validation(format!(
                "Source file '{file_name}' is empty"
            )));
        }
        Ok(Self {
            file_name,
            content,
            media_type: media_type.into(),
        })
    }

    /// Build a source artifact with the media type derived from the name.
    pub fn from_file_name(file_name: impl Into<String>, content: Vec<u8>) -> Result<Self, CoreError> {
        let file_name = file_name.into();
        let media_type = media_type_for(&file_name);
        Self::new(file_name, content, media_type)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Always `false`: construction rejects empty content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl fmt::Debug for SourceArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceArtifact")
            .field("file_name", &self.file_name)
            .field("len", &self.content.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ArtifactHandle
// ---------------------------------------------------------------------------

/// A fetched result spooled to a temporary file.
///
/// The file lives exactly as long as the handle.
#[derive(Debug)]
pub struct ArtifactHandle {
    job_id: JobId,
    file: NamedTempFile,
    len: u64,
}

impl ArtifactHandle {
    /// Write `bytes` to a fresh temp file inside `dir`.
    pub fn spool(job_id: JobId, bytes: &[u8], dir: &Path) -> Result<Self, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::Validation(format!(
                "Result for job {job_id} is empty"
            )));
        }

        let mut file = tempfile::Builder::new()
            .prefix("sonictwin-")
            .suffix(".wav")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(Self {
            job_id,
            file,
            len: bytes.len() as u64,
        })
    }

    /// The job this result belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Local path of the spooled file, valid until the handle is dropped.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn media_type(&self) -> &'static str {
        MEDIA_TYPE_AUDIO
    }

    /// Read the full result back into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(std::fs::read(self.path())?)
    }

    /// Copy the result to `dest`, returning the number of bytes written.
    pub fn save_to(&self, dest: &Path) -> Result<u64, CoreError> {
        Ok(std::fs::copy(self.path(), dest)?)
    }
}
