use crate::config::StorageConfig;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Prefix of every generated upload filename
const FILENAME_PREFIX: &str = "upload";

/// Length of the random hex token in generated filenames
const TOKEN_LEN: usize = 4;

/// Attempts at finding a free filename before giving up
const MAX_NAME_ATTEMPTS: usize = 16;

/// Reasons an upload is refused before anything touches the disk
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("No file name given")]
    MissingFilename,

    #[error("Invalid file type: {extension:?}")]
    InvalidType { extension: Option<String> },

    #[error("File too large: {size} bytes > max {max} bytes")]
    TooLarge { size: usize, max: usize },
}

/// Errors raised while writing or removing stored uploads
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create upload directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write upload {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove upload {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No free upload filename after {0} attempts")]
    NameExhausted(usize),
}

/// Size and type checks an upload must pass before it is persisted
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    allowed_extensions: Vec<String>,
    max_bytes: usize,
}

impl AdmissionPolicy {
    pub fn new(allowed_extensions: &[String], max_bytes: usize) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    fn allows(&self, extension: &str) -> bool {
        self.allowed_extensions.iter().any(|e| e == extension)
    }
}

/// An upload that passed admission. Carries nothing of the declared
/// filename except its lower-cased extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    extension: String,
}

impl Admitted {
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// A file written to the upload directory
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// Generated filename
    pub filename: String,
    /// Full path on disk
    pub path: PathBuf,
    /// When the file was written
    pub created_at: DateTime<Utc>,
    /// Number of bytes written
    pub size_bytes: u64,
}

/// Owner of the flat upload directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    public_prefix: String,
    policy: AdmissionPolicy,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str, policy: AdmissionPolicy) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            policy,
        }
    }

    /// Create a store from the storage section and the API upload limit
    pub fn from_config(config: &StorageConfig, max_upload_bytes: usize) -> Self {
        Self::new(
            config.upload_dir.clone(),
            &config.public_prefix,
            AdmissionPolicy::new(&config.allowed_extensions, max_upload_bytes),
        )
    }

    /// Upload directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check a declared filename and payload size against the admission policy
    pub fn admit(&self, declared_filename: &str, size_bytes: usize) -> Result<Admitted, AdmissionError> {
        if declared_filename.is_empty() {
            return Err(AdmissionError::MissingFilename);
        }

        let extension = match declared_extension(declared_filename) {
            Some(ext) if self.policy.allows(&ext) => ext,
            other => return Err(AdmissionError::InvalidType { extension: other }),
        };

        if size_bytes > self.policy.max_bytes {
            return Err(AdmissionError::TooLarge {
                size: size_bytes,
                max: self.policy.max_bytes,
            });
        }

        Ok(Admitted { extension })
    }

    /// Write an admitted upload under a freshly generated name.
    ///
    /// The file is created with exclusive-create semantics, so a token clash
    /// within the same second regenerates the name instead of overwriting.
    #[instrument(skip_all, fields(extension = %admitted.extension, size_bytes = bytes.len()))]
    pub async fn persist(&self, admitted: &Admitted, bytes: &[u8]) -> Result<UploadRecord, StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })?;

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let created_at = Utc::now();
            let filename = generate_filename(&admitted.extension, created_at.timestamp());
            let path = self.root.join(&filename);

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(filename = %filename, attempt, "Upload filename taken, regenerating");
                    continue;
                }
                Err(source) => return Err(StorageError::Write { path, source }),
            };

            if let Err(source) = write_all(&mut file, bytes).await {
                drop(file);
                if let Err(cleanup) = self.remove(&path).await {
                    warn!(error = %cleanup, "Failed to remove partially written upload");
                }
                return Err(StorageError::Write { path, source });
            }

            info!(filename = %filename, size_bytes = bytes.len(), "Upload stored");

            return Ok(UploadRecord {
                filename,
                path,
                created_at,
                size_bytes: bytes.len() as u64,
            });
        }

        Err(StorageError::NameExhausted(MAX_NAME_ATTEMPTS))
    }

    /// Delete a stored upload. A file that is already gone is not an error.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!("Upload removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Upload already gone, nothing to remove");
                Ok(())
            }
            Err(source) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// URL under which a stored upload is served
    pub fn public_url(&self, record: &UploadRecord) -> String {
        format!("{}/{}", self.public_prefix, record.filename)
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

/// Lower-cased text after the last `.` of a declared filename
fn declared_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Generate an upload filename: `upload_<unix seconds>_<hex token>.<ext>`
pub fn generate_filename(extension: &str, unix_seconds: i64) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}_{ts}_{token}.{ext}",
        prefix = FILENAME_PREFIX,
        ts = unix_seconds,
        token = &token[..TOKEN_LEN],
        ext = extension
    )
}
