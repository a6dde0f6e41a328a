//! Font registry for text watermarks.
//!
//! Holds an embedded default face (DejaVu Sans) plus any font files added
//! from configuration. Family lookup follows canvas font-string rules: a
//! comma-separated list is tried in order and unknown families fall back to
//! the default face.

use super::WatermarkError;
use ab_glyph::FontArc;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Embedded default font data (DejaVu Sans, see assets/fonts/LICENSE-DejaVu.txt).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Family name of the embedded face.
pub const DEFAULT_FONT_FAMILY: &str = "DejaVu Sans";

/// Generic CSS family names that resolve to the default face.
const GENERIC_FAMILIES: &[&str] = &[
    "sans-serif",
    "serif",
    "monospace",
    "system-ui",
    "cursive",
    "fantasy",
];

/// Registry of loaded font faces keyed by lowercase family name.
#[derive(Clone)]
pub struct FontRegistry {
    faces: HashMap<String, FontArc>,
    default_family: String,
    default_face: FontArc,
}

impl std::fmt::Debug for FontRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut families: Vec<&String> = self.faces.keys().collect();
        families.sort();
        f.debug_struct("FontRegistry")
            .field("families", &families)
            .field("default_family", &self.default_family)
            .finish()
    }
}

impl FontRegistry {
    /// Create a registry containing only the embedded face.
    pub fn new() -> Result<Self, WatermarkError> {
        let face = FontArc::try_from_slice(EMBEDDED_FONT_DATA).map_err(|e| {
            WatermarkError::Environment(format!("embedded font failed to parse: {}", e))
        })?;

        let mut faces = HashMap::new();
        faces.insert(normalize_family(DEFAULT_FONT_FAMILY), face.clone());

        Ok(Self {
            faces,
            default_family: normalize_family(DEFAULT_FONT_FAMILY),
            default_face: face,
        })
    }

    /// Register a face from raw font bytes.
    pub fn register_bytes(&mut self, family: &str, data: Vec<u8>) -> Result<(), WatermarkError> {
        let family_key = normalize_family(family);
        if family_key.is_empty() {
            return Err(WatermarkError::ConfigError(
                "font family name cannot be empty".to_string(),
            ));
        }

        let face = FontArc::try_from_vec(data).map_err(|e| {
            WatermarkError::ConfigError(format!("font '{}' failed to parse: {}", family, e))
        })?;

        self.faces.insert(family_key, face);
        Ok(())
    }

    /// Register a face from a TTF/OTF file.
    pub fn register_file(&mut self, family: &str, path: &Path) -> Result<(), WatermarkError> {
        let data = std::fs::read(path).map_err(|e| {
            WatermarkError::ConfigError(format!(
                "failed to read font file {}: {}",
                path.display(),
                e
            ))
        })?;
        self.register_bytes(family, data)?;
        info!(family = %family, path = %path.display(), "Registered font family");
        Ok(())
    }

    /// Make a registered family the fallback face.
    pub fn set_default_family(&mut self, family: &str) -> Result<(), WatermarkError> {
        let family_key = normalize_family(family);
        let face = self.faces.get(&family_key).cloned().ok_or_else(|| {
            WatermarkError::ConfigError(format!(
                "default font family '{}' is not registered",
                family
            ))
        })?;
        self.default_family = family_key;
        self.default_face = face;
        Ok(())
    }

    pub fn default_family(&self) -> &str {
        &self.default_family
    }

    pub fn contains(&self, family: &str) -> bool {
        self.faces.contains_key(&normalize_family(family))
    }

    /// Resolve a family list (e.g. `"Brand Sans, Arial, sans-serif"`) to a face.
    pub fn resolve(&self, families: &str) -> FontArc {
        let family = self.resolve_family(families);
        self.faces
            .get(family)
            .cloned()
            .unwrap_or_else(|| self.default_face.clone())
    }

    /// Registered family that [`resolve`](Self::resolve) picks for
    /// `families`.
    ///
    /// Candidates are tried in order. The first registered one wins; a
    /// generic family ends the search and selects the default face.
    pub fn resolve_family(&self, families: &str) -> &str {
        for candidate in families.split(',') {
            let key = normalize_family(candidate);
            if key.is_empty() {
                continue;
            }
            if let Some((family, _)) = self.faces.get_key_value(&key) {
                return family;
            }
            if GENERIC_FAMILIES.contains(&key.as_str()) {
                break;
            }
        }

        debug!(
            requested = %families,
            fallback = %self.default_family,
            "Font family not registered, using default face"
        );
        &self.default_family
    }
}

/// Lowercase, trim whitespace and surrounding quotes.
fn normalize_family(family: &str) -> String {
    family
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}
