use super::{ClassificationResult, ImageClassifier, InferenceError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Decodes uploads and runs them through the classifier on the blocking pool
#[derive(Clone)]
pub struct InferenceAdapter {
    classifier: Arc<dyn ImageClassifier>,
    timeout: Option<Duration>,
}

impl InferenceAdapter {
    pub fn new(classifier: Arc<dyn ImageClassifier>, timeout: Option<Duration>) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    /// Classify encoded image bytes.
    ///
    /// The timeout only bounds how long the caller waits: the blocking
    /// computation cannot be cancelled and runs to completion regardless.
    #[instrument(skip_all, fields(size_bytes = image_bytes.len()))]
    pub async fn classify(&self, image_bytes: Bytes) -> Result<ClassificationResult, InferenceError> {
        let classifier = Arc::clone(&self.classifier);
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || classify_bytes(classifier.as_ref(), &image_bytes));

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| InferenceError::Timeout(limit))?,
            None => task.await,
        };
        let result = joined.map_err(|e| InferenceError::Task(e.to_string()))?;

        let elapsed = started.elapsed();
        metrics::histogram!("dermascan_inference_duration_seconds").record(elapsed.as_secs_f64());

        if let Ok(ref classification) = result {
            debug!(
                top_class = %classification.top_class(),
                confidence = classification.confidence(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Image classified"
            );
        }

        result
    }
}

/// Decode to three-channel RGB and classify, synchronously
pub fn classify_bytes(
    classifier: &dyn ImageClassifier,
    image_bytes: &[u8],
) -> Result<ClassificationResult, InferenceError> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| InferenceError::Decode(e.to_string()))?
        .to_rgb8();

    let scores = classifier.predict(&image)?;
    ClassificationResult::from_scores(&scores)
}
