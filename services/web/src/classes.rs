//! The closed label set of the skin condition classifier.
//!
//! The declaration order of [`SkinClass`] is the classifier's output index
//! order. Model and label set must be kept in lockstep when a new model is
//! deployed; nothing here is inferred at runtime.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A skin condition the classifier can predict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinClass {
    Acne,
    Eksim,
    Herpes,
    Panu,
    Rosacea,
}

impl SkinClass {
    /// Number of classes the model outputs
    pub const COUNT: usize = 5;

    /// All classes in model output order
    pub const ALL: [SkinClass; Self::COUNT] = [
        SkinClass::Acne,
        SkinClass::Eksim,
        SkinClass::Herpes,
        SkinClass::Panu,
        SkinClass::Rosacea,
    ];

    /// Class at a model output index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position in the model output
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire name, as used in the catalog and in responses
    pub fn as_str(self) -> &'static str {
        match self {
            SkinClass::Acne => "acne",
            SkinClass::Eksim => "eksim",
            SkinClass::Herpes => "herpes",
            SkinClass::Panu => "panu",
            SkinClass::Rosacea => "rosacea",
        }
    }

    /// Display color used by the front end
    pub fn color(self) -> &'static str {
        match self {
            SkinClass::Acne => "#ef4444",    // red
            SkinClass::Eksim => "#f97316",   // orange
            SkinClass::Herpes => "#ec4899",  // pink
            SkinClass::Panu => "#8b5cf6",    // violet
            SkinClass::Rosacea => "#f43f5e", // rose
        }
    }
}

impl fmt::Display for SkinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class to color mapping, serialized as a JSON object in label order
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassColors;

impl Serialize for ClassColors {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(SkinClass::COUNT))?;
        for class in SkinClass::ALL {
            map.serialize_entry(class.as_str(), class.color())?;
        }
        map.end()
    }
}
