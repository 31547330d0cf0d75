use crate::classes::{ClassColors, SkinClass};
use crate::classifier::ClassificationResult;
use crate::i18n::Bundle;
use serde::Serialize;

/// Prediction payload returned by `/predict`
#[derive(Debug, Clone, Serialize)]
pub struct PredictionView {
    pub confidence: f32,
    pub color: &'static str,
    pub name: String,
    pub description: String,
    pub severity: String,
    pub action: String,
    /// `[class, probability]` pairs, most likely first
    pub sorted_probs: Vec<(SkinClass, f32)>,
    pub translations: Bundle,
    pub class_colors: ClassColors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Join a classification with the active language bundle
pub fn present(result: &ClassificationResult, bundle: &Bundle) -> PredictionView {
    let top = result.top_class();
    let text = bundle.class_text(top);

    PredictionView {
        confidence: result.confidence(),
        color: top.color(),
        name: text.map_or_else(|| top.as_str().to_string(), |t| t.name.clone()),
        description: text.map(|t| t.desc.clone()).unwrap_or_default(),
        severity: text.map(|t| t.severity.clone()).unwrap_or_default(),
        action: text.map(|t| t.action.clone()).unwrap_or_default(),
        sorted_probs: sorted_probabilities(result),
        translations: bundle.clone(),
        class_colors: ClassColors,
        image_url: None,
    }
}

/// Probabilities in descending order; ties keep label order
fn sorted_probabilities(result: &ClassificationResult) -> Vec<(SkinClass, f32)> {
    let mut probs: Vec<(SkinClass, f32)> = result.iter().collect();
    // sort_by is stable and `iter` yields label order
    probs.sort_by(|a, b| b.1.total_cmp(&a.1));
    probs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Catalog;

    #[test]
    fn test_present_uses_top_class_text() {
        let catalog = Catalog::builtin(None).unwrap();
        let bundle = catalog.resolve(Some("id")).bundle;
        let result = ClassificationResult::from_scores(&[0.05, 0.8, 0.05, 0.05, 0.05]).unwrap();

        let view = present(&result, bundle);

        assert_eq!(view.confidence, 0.8);
        assert_eq!(view.color, "#f97316");
        assert_eq!(view.name, "Eksim (Dermatitis)");
        assert_eq!(view.severity, "Sedang hingga Kronis");
        assert_eq!(view.translations.title, "Klasifikasi Penyakit Kulit");
        assert!(view.image_url.is_none());
    }

    #[test]
    fn test_sorted_probs_descending_with_stable_ties() {
        let result = ClassificationResult::from_scores(&[0.1, 0.3, 0.1, 0.3, 0.2]).unwrap();

        let sorted = sorted_probabilities(&result);
        let classes: Vec<SkinClass> = sorted.iter().map(|(c, _)| *c).collect();

        assert_eq!(
            classes,
            vec![
                SkinClass::Eksim,
                SkinClass::Panu,
                SkinClass::Rosacea,
                SkinClass::Acne,
                SkinClass::Herpes,
            ]
        );
    }

    #[test]
    fn test_serialized_shape() {
        let catalog = Catalog::builtin(None).unwrap();
        let result = ClassificationResult::from_scores(&[0.5, 0.125, 0.125, 0.125, 0.125]).unwrap();

        let mut view = present(&result, catalog.resolve(Some("en")).bundle);
        view.image_url = Some("/static/uploads/upload_1_abcd.jpg".to_string());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["name"], "Acne Vulgaris");
        assert_eq!(json["sorted_probs"][0], serde_json::json!(["acne", 0.5]));
        assert_eq!(json["class_colors"]["rosacea"], "#f43f5e");
        assert_eq!(json["image_url"], "/static/uploads/upload_1_abcd.jpg");
        assert!(json["translations"]["classes"]["panu"].is_object());
    }
}
