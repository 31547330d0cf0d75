//! Dermascan Web Service
//!
//! Upload-and-classify web service for the Dermascan skin condition
//! classifier. A user uploads a photo of a skin lesion; the service stores
//! it, runs it through a pretrained ONNX model that distinguishes five
//! conditions, and answers with the predicted condition, a confidence
//! score, descriptive text in the session language and the full ranked
//! probability list.
//!
//! ## Features
//!
//! - **Safe upload storage**: extension and size checks before anything is
//!   written, generated `upload_<ts>_<hex>.<ext>` names created exclusively
//! - **Time-based retention**: uploads older than the retention window are
//!   swept in the background after each accepted upload
//! - **Inference adapter**: decode, preprocess and classify on the blocking
//!   pool, normalizing the raw scores into a probability distribution
//! - **Localized results**: English and Indonesian text bundles selected per
//!   session by cookie, with fallback to the default language
//!
//! ## Architecture
//!
//! ```text
//!  POST /predict
//!        │
//!        ▼
//! ┌──────────────┐   admit/persist   ┌──────────────┐
//! │ Upload       │──────────────────▶│ Upload       │──── static/uploads/
//! │ Service      │                   │ Store        │           ▲
//! └──────────────┘                   └──────────────┘           │
//!        │  │                                                   │
//!        │  │ spawn (fire-and-forget)  ┌──────────────┐         │
//!        │  └─────────────────────────▶│ Retention    │─────────┘
//!        │                             │ Sweeper      │
//!        ▼                             └──────────────┘
//! ┌──────────────┐  spawn_blocking   ┌──────────────┐
//! │ Inference    │──────────────────▶│ ONNX         │
//! │ Adapter      │                   │ Classifier   │
//! └──────────────┘                   └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐                   ┌──────────────┐
//! │ Presenter    │◀──────────────────│ Catalog      │
//! └──────────────┘   language bundle └──────────────┘
//! ```

pub mod api;
pub mod classes;
pub mod classifier;
pub mod config;
pub mod i18n;
pub mod model_info;
pub mod presenter;
pub mod storage;
pub mod sweeper;
pub mod upload;

pub use api::{create_router, start_api_server, AppState};
pub use classes::SkinClass;
pub use classifier::{ClassificationResult, ImageClassifier, InferenceAdapter, InferenceError, OnnxClassifier};
pub use config::Config;
pub use i18n::{Bundle, Catalog};
pub use model_info::{format_model_info, ModelInfo};
pub use presenter::{present, PredictionView};
pub use storage::{UploadRecord, UploadStore};
pub use sweeper::{RetentionPolicy, RetentionSweeper, SweepReport};
pub use upload::{UploadError, UploadService};
