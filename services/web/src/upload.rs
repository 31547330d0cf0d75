//! Upload flow: `Received → Validated → Stored → Classified → Responded`.
//!
//! Input problems exit as [`UploadError::Rejected`] before anything is
//! written. A classification failure after the file is stored exits as
//! [`UploadError::Inference`], and the stored file is removed first.

use crate::classifier::{InferenceAdapter, InferenceError};
use crate::i18n::Bundle;
use crate::presenter::{present, PredictionView};
use crate::storage::{AdmissionError, StorageError, UploadStore};
use crate::sweeper::RetentionSweeper;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Stage of the upload flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    Validated,
    Stored,
    Classified,
    Responded,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Received => "received",
            UploadStage::Validated => "validated",
            UploadStage::Stored => "stored",
            UploadStage::Classified => "classified",
            UploadStage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Why an upload was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No `file` field, or an empty filename
    NoImage,
    InvalidType,
    TooLarge,
}

/// Errors leaving the upload flow
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload rejected: {0:?}")]
    Rejected(RejectReason),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Inference(#[from] InferenceError),
}

/// A file field as received from the client
#[derive(Debug, Clone)]
pub struct IncomingUpload {
    pub filename: String,
    pub bytes: Bytes,
}

/// Composes storage, retention and inference for one upload
pub struct UploadService {
    store: UploadStore,
    sweeper: Arc<RetentionSweeper>,
    adapter: InferenceAdapter,
    sweep_on_upload: bool,
}

impl UploadService {
    pub fn new(
        store: UploadStore,
        sweeper: Arc<RetentionSweeper>,
        adapter: InferenceAdapter,
        sweep_on_upload: bool,
    ) -> Self {
        Self {
            store,
            sweeper,
            adapter,
            sweep_on_upload,
        }
    }

    /// Run one upload through the flow and build the response payload
    #[instrument(skip_all)]
    pub async fn handle(
        &self,
        upload: Option<IncomingUpload>,
        bundle: &Bundle,
    ) -> Result<PredictionView, UploadError> {
        debug!(stage = %UploadStage::Received, has_file = upload.is_some(), "Upload received");

        // Received -> Validated
        let upload = match upload {
            Some(upload) if !upload.filename.is_empty() => upload,
            _ => return Err(reject(RejectReason::NoImage)),
        };

        let admitted = self
            .store
            .admit(&upload.filename, upload.bytes.len())
            .map_err(|e| {
                info!(filename = %upload.filename, reason = %e, "Upload rejected");
                match e {
                    AdmissionError::MissingFilename => reject(RejectReason::NoImage),
                    AdmissionError::InvalidType { .. } => reject(RejectReason::InvalidType),
                    AdmissionError::TooLarge { .. } => reject(RejectReason::TooLarge),
                }
            })?;
        debug!(stage = %UploadStage::Validated, extension = admitted.extension(), "Upload admitted");

        // Validated -> Stored
        let record = self.store.persist(&admitted, &upload.bytes).await.map_err(|e| {
            error!(error = %e, "Failed to store upload");
            metrics::counter!("dermascan_uploads_total", "outcome" => "storage_failed").increment(1);
            e
        })?;
        debug!(stage = %UploadStage::Stored, filename = %record.filename, "Upload persisted");

        if self.sweep_on_upload {
            // Never awaited; the sweep logs its own outcome
            drop(self.sweeper.spawn());
        }

        // Stored -> Classified
        let classification = match self.adapter.classify(upload.bytes).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(filename = %record.filename, error = %e, "Classification failed, removing upload");
                if let Err(cleanup) = self.store.remove(&record.path).await {
                    warn!(error = %cleanup, "Failed to remove upload after classification failure");
                }
                metrics::counter!("dermascan_uploads_total", "outcome" => "inference_failed").increment(1);
                return Err(e.into());
            }
        };
        debug!(stage = %UploadStage::Classified, top_class = %classification.top_class(), "Upload classified");

        // Classified -> Responded
        let mut view = present(&classification, bundle);
        view.image_url = Some(self.store.public_url(&record));

        metrics::counter!("dermascan_uploads_total", "outcome" => "classified").increment(1);
        info!(
            stage = %UploadStage::Responded,
            filename = %record.filename,
            top_class = %classification.top_class(),
            confidence = classification.confidence(),
            "Upload classified"
        );

        Ok(view)
    }
}

fn reject(reason: RejectReason) -> UploadError {
    metrics::counter!("dermascan_uploads_total", "outcome" => "rejected").increment(1);
    UploadError::Rejected(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::SkinClass;
    use crate::classifier::MockImageClassifier;
    use crate::i18n::Catalog;
    use crate::storage::AdmissionPolicy;
    use crate::sweeper::RetentionPolicy;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::time::Duration;

    fn png() -> Bytes {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        Bytes::from(buf.into_inner())
    }

    fn service(dir: &Path, classifier: MockImageClassifier) -> UploadService {
        service_with_sweep(dir, classifier, false)
    }

    fn service_with_sweep(dir: &Path, classifier: MockImageClassifier, sweep_on_upload: bool) -> UploadService {
        let extensions = vec!["png".to_string(), "jpg".to_string()];
        let store = UploadStore::new(dir, "/static/uploads", AdmissionPolicy::new(&extensions, 1024 * 1024));
        let sweeper = Arc::new(RetentionSweeper::new(dir, RetentionPolicy::new(Duration::from_secs(3600))));
        let adapter = InferenceAdapter::new(Arc::new(classifier), None);
        UploadService::new(store, sweeper, adapter, sweep_on_upload)
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut classifier = MockImageClassifier::new();
        classifier
            .expect_predict()
            .returning(|_| Ok(vec![0.1, 0.1, 0.1, 0.1, 0.6]));
        let service = service(dir.path(), classifier);
        let catalog = Catalog::builtin(None).unwrap();

        let upload = IncomingUpload {
            filename: "photo.JPG".to_string(),
            bytes: png(),
        };
        let view = service
            .handle(Some(upload), catalog.resolve(None).bundle)
            .await
            .unwrap();

        assert_eq!(view.sorted_probs[0].0, SkinClass::Rosacea);
        let url = view.image_url.unwrap();
        assert!(url.starts_with("/static/uploads/upload_"));
        assert!(url.ends_with(".jpg"));
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_missing_file_and_empty_filename() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), MockImageClassifier::new());
        let catalog = Catalog::builtin(None).unwrap();
        let bundle = catalog.resolve(None).bundle;

        let err = service.handle(None, bundle).await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected(RejectReason::NoImage)));

        let upload = IncomingUpload {
            filename: String::new(),
            bytes: png(),
        };
        let err = service.handle(Some(upload), bundle).await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected(RejectReason::NoImage)));
    }

    #[tokio::test]
    async fn test_disallowed_extension_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut classifier = MockImageClassifier::new();
        classifier.expect_predict().never();
        let service = service(dir.path(), classifier);
        let catalog = Catalog::builtin(None).unwrap();

        let upload = IncomingUpload {
            filename: "setup.exe".to_string(),
            bytes: Bytes::from_static(b"MZ"),
        };
        let err = service
            .handle(Some(upload), catalog.resolve(None).bundle)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Rejected(RejectReason::InvalidType)));
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_inference_failure_removes_stored_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut classifier = MockImageClassifier::new();
        classifier.expect_predict().returning(|_| Ok(Vec::new()));
        let service = service(dir.path(), classifier);
        let catalog = Catalog::builtin(None).unwrap();

        let upload = IncomingUpload {
            filename: "photo.png".to_string(),
            bytes: png(),
        };
        let err = service
            .handle(Some(upload), catalog.resolve(None).bundle)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Model output format not recognized");
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_accepted_upload_sweeps_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let expired = dir.path().join("upload_1_aaaa.png");
        std::fs::File::create(&expired)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(2 * 3600))
            .unwrap();

        let mut classifier = MockImageClassifier::new();
        classifier
            .expect_predict()
            .returning(|_| Ok(vec![0.6, 0.1, 0.1, 0.1, 0.1]));
        let service = service_with_sweep(dir.path(), classifier, true);
        let catalog = Catalog::builtin(None).unwrap();

        let upload = IncomingUpload {
            filename: "photo.png".to_string(),
            bytes: png(),
        };
        let view = service
            .handle(Some(upload), catalog.resolve(None).bundle)
            .await
            .unwrap();

        // The sweep runs detached from the request
        for _ in 0..100 {
            if !expired.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(!expired.exists());
        let url = view.image_url.unwrap();
        let stored = url.trim_start_matches("/static/uploads/");
        assert!(dir.path().join(stored).exists());
        assert_eq!(file_count(dir.path()), 1);
    }
}
