//! Localized text catalog.
//!
//! Bundles are loaded once at startup from the embedded JSON asset and
//! validated: the default language must exist and every bundle must carry
//! text for every [`SkinClass`]. Lookups never fail; an unknown language
//! resolves to the default bundle and says so.

use crate::classes::SkinClass;
use crate::model_info::{format_model_info, ModelInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const BUILTIN_CATALOG: &str = include_str!("../assets/translations.json");

/// Errors raised while loading the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Default language {0:?} has no bundle")]
    MissingDefault(String),

    #[error("Language {language:?} has no text for class {class}")]
    MissingClass { language: String, class: SkinClass },
}

/// Per-class descriptive text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassText {
    pub name: String,
    pub desc: String,
    pub severity: String,
    pub action: String,
}

/// Tab titles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tabs {
    pub examples: String,
    pub info: String,
}

/// All user-facing text for one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub title: String,
    pub header: String,
    pub header_subtitle: String,
    pub description_short: String,
    pub input_label: String,
    pub analyze_btn: String,
    pub tips_title: String,
    pub tips_content: String,
    pub output_title: String,
    pub confidence_label: String,
    pub severity_label: String,
    pub consult_label: String,
    pub disclaimer_title: String,
    pub disclaimer_text: String,
    pub model_stats: String,
    /// Template with `{model_name}` and `{model_size}` placeholders
    pub model_info_text: String,
    pub error_no_image: String,
    pub error_invalid_type: String,
    pub error_too_large: String,
    pub tabs: Tabs,
    pub classes: BTreeMap<SkinClass, ClassText>,
    pub table_cols: Vec<String>,
}

impl Bundle {
    pub fn class_text(&self, class: SkinClass) -> Option<&ClassText> {
        self.classes.get(&class)
    }

    /// Copy of the bundle with model details filled into the info text
    pub fn with_model_info(&self, info: &ModelInfo) -> Bundle {
        let mut bundle = self.clone();
        bundle.model_info_text = format_model_info(&self.model_info_text, &info.file_name, &info.size);
        bundle
    }
}

/// One row of the model performance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub class: SkinClass,
    pub precision: String,
    pub recall: String,
    pub f1: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    default_language: String,
    languages: BTreeMap<String, Bundle>,
    #[serde(default)]
    model_performance: Vec<PerformanceRow>,
}

/// A language lookup result
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    /// Language code actually used
    pub code: &'a str,
    pub bundle: &'a Bundle,
    /// The requested code was missing or unknown
    pub fell_back: bool,
}

/// Localized bundles keyed by language code
#[derive(Debug, Clone)]
pub struct Catalog {
    default_language: String,
    bundles: BTreeMap<String, Bundle>,
    model_performance: Vec<PerformanceRow>,
}

impl Catalog {
    /// Load the catalog compiled into the binary.
    ///
    /// `default_language` overrides the default declared in the asset when set.
    pub fn builtin(default_language: Option<&str>) -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG, default_language)
    }

    pub fn from_json(json: &str, default_language: Option<&str>) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let default_language = default_language
            .map(str::to_string)
            .unwrap_or(file.default_language);

        if !file.languages.contains_key(&default_language) {
            return Err(CatalogError::MissingDefault(default_language));
        }

        for (language, bundle) in &file.languages {
            if let Some(class) = SkinClass::ALL.iter().find(|c| !bundle.classes.contains_key(*c)) {
                return Err(CatalogError::MissingClass {
                    language: language.clone(),
                    class: *class,
                });
            }
        }

        Ok(Self {
            default_language,
            bundles: file.languages,
            model_performance: file.model_performance,
        })
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Supported language codes
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn model_performance(&self) -> &[PerformanceRow] {
        &self.model_performance
    }

    /// Bundle for `code`, falling back to the default language
    pub fn resolve(&self, code: Option<&str>) -> Resolved<'_> {
        if let Some((code, bundle)) = code.and_then(|c| self.bundles.get_key_value(c)) {
            return Resolved {
                code: code.as_str(),
                bundle,
                fell_back: false,
            };
        }

        if let Some(requested) = code {
            debug!(
                requested = %requested,
                fallback = %self.default_language,
                "Unsupported language, using default"
            );
        }

        let (code, bundle) = self.default_bundle();
        Resolved {
            code,
            bundle,
            fell_back: true,
        }
    }

    fn default_bundle(&self) -> (&str, &Bundle) {
        // Presence of the default language is checked in `from_json`
        (self.default_language.as_str(), &self.bundles[&self.default_language])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_complete() {
        let catalog = Catalog::builtin(None).unwrap();

        assert_eq!(catalog.default_language(), "en");
        assert_eq!(catalog.languages().collect::<Vec<_>>(), vec!["en", "id"]);
        assert_eq!(catalog.model_performance().len(), SkinClass::COUNT);

        for code in ["en", "id"] {
            let resolved = catalog.resolve(Some(code));
            assert!(!resolved.fell_back);
            for class in SkinClass::ALL {
                assert!(resolved.bundle.class_text(class).is_some());
            }
            assert!(resolved.bundle.model_info_text.contains("{model_name}"));
        }
    }

    #[test]
    fn test_unknown_language_falls_back_to_default() {
        let catalog = Catalog::builtin(None).unwrap();

        let resolved = catalog.resolve(Some("fr"));
        assert!(resolved.fell_back);
        assert_eq!(resolved.code, "en");
        assert_eq!(resolved.bundle.title, "Skin Disease Classifier");

        let resolved = catalog.resolve(None);
        assert!(resolved.fell_back);
        assert_eq!(resolved.code, "en");
    }

    #[test]
    fn test_default_language_override() {
        let catalog = Catalog::builtin(Some("id")).unwrap();

        let resolved = catalog.resolve(Some("xx"));
        assert_eq!(resolved.code, "id");
        assert_eq!(resolved.bundle.error_no_image, "Silakan unggah gambar terlebih dahulu untuk dianalisis.");
    }

    #[test]
    fn test_unknown_default_language_is_rejected() {
        assert!(matches!(
            Catalog::builtin(Some("fr")),
            Err(CatalogError::MissingDefault(lang)) if lang == "fr"
        ));
    }

    #[test]
    fn test_incomplete_bundle_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(BUILTIN_CATALOG).unwrap();
        value["languages"]["id"]["classes"]
            .as_object_mut()
            .unwrap()
            .remove("panu");

        let err = Catalog::from_json(&value.to_string(), None).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::MissingClass { ref language, class: SkinClass::Panu } if language == "id"
        ));
    }

    #[test]
    fn test_with_model_info_fills_template() {
        let catalog = Catalog::builtin(None).unwrap();
        let info = ModelInfo {
            file_name: "yolo-skin.onnx".to_string(),
            size: "9.8 MB".to_string(),
        };

        let bundle = catalog.resolve(Some("en")).bundle.with_model_info(&info);
        assert!(bundle.model_info_text.contains("<strong>Model File:</strong> yolo-skin.onnx"));
        assert!(bundle.model_info_text.contains("<strong>Model Size:</strong> 9.8 MB"));
    }
}
