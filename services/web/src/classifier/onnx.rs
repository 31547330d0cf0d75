use super::{ImageClassifier, InferenceError};
use crate::config::{ModelConfig, Normalization};
use crate::model_info::locate_model;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use tracing::info;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// ONNX Runtime session for the exported skin classification model
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    input_size: u32,
    normalization: Normalization,
}

impl OnnxClassifier {
    /// Load the model from disk. Called once at startup; failure is fatal.
    ///
    /// Falls back to the first `.onnx` file in `models_dir` when the
    /// configured path does not exist.
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let model_path = locate_model(&config.path, &config.models_dir).ok_or_else(|| InferenceError::ModelLoad {
            path: config.path.display().to_string(),
            message: format!("file not found, and no .onnx file in {}", config.models_dir.display()),
        })?;
        let path = model_path.as_path();
        let load_err = |message: String| InferenceError::ModelLoad {
            path: path.display().to_string(),
            message,
        };

        let _ = ort::init().with_name("dermascan").commit();

        let session = Session::builder()
            .map_err(|e| load_err(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| load_err(format!("Failed to set intra threads: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| load_err(format!("Failed to load ONNX model: {}", e)))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| load_err("model declares no inputs".to_string()))?;

        info!(
            path = %path.display(),
            input = %input_name,
            input_size = config.input_size,
            "Classifier model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_size: config.input_size,
            normalization: config.normalization,
        })
    }
}

impl ImageClassifier for OnnxClassifier {
    fn predict(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError> {
        let tensor = preprocess(image, self.input_size, self.normalization)?;

        let input = Value::from_array(tensor)
            .map_err(|e| InferenceError::Preprocess(format!("Failed to create tensor value: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let output = outputs.values().next().ok_or(InferenceError::NoPredictions)?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|_| InferenceError::UnrecognizedOutput)?;

        Ok(data.to_vec())
    }
}

/// Center crop to the largest square, resize it to `size`×`size`, and lay
/// the normalized pixels out as a 1×3×H×W tensor.
///
/// Cropping first keeps the working buffer bounded by the source image,
/// whatever its aspect ratio.
fn preprocess(image: &RgbImage, size: u32, normalization: Normalization) -> Result<Array4<f32>, InferenceError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(InferenceError::Preprocess("image has no pixels".to_string()));
    }

    let edge = w.min(h);
    let square = imageops::crop_imm(image, (w - edge) / 2, (h - edge) / 2, edge, edge).to_image();
    let rgb = DynamicImage::ImageRgb8(square)
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let side = size as usize;
    let hw = side * side;
    let mut data = vec![0f32; 3 * hw];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            let unit = pixel.0[c] as f32 / 255.0;
            data[c * hw + i] = match normalization {
                Normalization::Unit => unit,
                Normalization::Imagenet => (unit - MEAN[c]) / STD[c],
            };
        }
    }

    Array4::from_shape_vec((1, 3, side, side), data)
        .map_err(|e| InferenceError::Preprocess(format!("Failed to create tensor: {}", e)))
}
