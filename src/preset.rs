//! Mapping file: saved code mappings that make a scramble repeatable

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codespace::Code;
use crate::error::Result;
use crate::permute::{CodeMapping, Permutation, UnscrambledReason};

/// Saved mapping of one font, codes as hex strings (`"0041": "00C8"`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFont {
    pub font: String,
    pub base_font: String,
    pub codes: BTreeMap<String, String>,
    /// Why codes mapped to themselves were left in place
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unscrambled: BTreeMap<String, UnscrambledReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFile {
    pub fonts: Vec<SavedFont>,
}

impl MappingFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Store a font's mapping, replacing any earlier entry for it
    pub fn insert(&mut self, font: &str, base_font: &str, mapping: &CodeMapping) {
        let codes = mapping.iter().map(|(from, to)| (from.to_hex(), to.to_hex())).collect();
        self.store(SavedFont {
            font: font.to_string(),
            base_font: base_font.to_string(),
            codes,
            unscrambled: BTreeMap::new(),
        });
    }

    /// Store a permutation together with the reasons of its fixed codes
    pub fn record(&mut self, font: &str, base_font: &str, permutation: &Permutation) {
        let mapping = &permutation.mapping;
        let codes = mapping.iter().map(|(from, to)| (from.to_hex(), to.to_hex())).collect();
        let unscrambled = permutation
            .unscrambled
            .iter()
            .map(|(code, reason)| (code.to_hex(), *reason))
            .collect();
        self.store(SavedFont {
            font: font.to_string(),
            base_font: base_font.to_string(),
            codes,
            unscrambled,
        });
    }

    fn store(&mut self, saved: SavedFont) {
        match self
            .fonts
            .iter_mut()
            .find(|f| f.font == saved.font && f.base_font == saved.base_font)
        {
            Some(existing) => *existing = saved,
            None => self.fonts.push(saved),
        }
    }

    /// Recorded reasons for the fixed codes of a saved mapping
    pub fn lookup_reasons(&self, font: &str, base_font: &str) -> BTreeMap<Code, UnscrambledReason> {
        self.fonts
            .iter()
            .find(|f| f.font == font && f.base_font == base_font)
            .map(|saved| {
                saved
                    .unscrambled
                    .iter()
                    .filter_map(|(code, reason)| Some((Code::parse_hex(code)?, *reason)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Saved mapping for the font with this object reference and BaseFont
    pub fn lookup(&self, font: &str, base_font: &str) -> Option<CodeMapping> {
        let saved = self.fonts.iter().find(|f| f.font == font && f.base_font == base_font)?;
        let mut mapping = CodeMapping::new();
        for (from, to) in &saved.codes {
            match (Code::parse_hex(from), Code::parse_hex(to)) {
                (Some(from), Some(to)) => mapping.insert(from, to),
                _ => {
                    warn!(font, "ignoring saved mapping with malformed entry {:?} -> {:?}", from, to);
                    return None;
                }
            }
        }
        Some(mapping)
    }

    /// Add every font of `other`, replacing entries for the same font
    pub fn merge(&mut self, other: &MappingFile) {
        for saved in &other.fonts {
            match self
                .fonts
                .iter_mut()
                .find(|f| f.font == saved.font && f.base_font == saved.base_font)
            {
                Some(existing) => *existing = saved.clone(),
                None => self.fonts.push(saved.clone()),
            }
        }
    }
}
