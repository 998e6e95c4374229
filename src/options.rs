//! Scrambling options

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::font::strip_subset_prefix;
use crate::preset::MappingFile;

/// What the ToUnicode entry of a moved code becomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToUnicodePolicy {
    /// The original text of another used code
    #[default]
    Decoy,
    /// No entry
    Omit,
}

/// Class of characters a selection matches
#[derive(Debug, Clone, Default)]
pub enum CharClass {
    /// Every code, including codes with no known text
    #[default]
    All,
    Letters,
    NonLetters,
    Pattern(Regex),
}

/// Which codes are eligible for scrambling, judged by their original text
#[derive(Debug, Clone, Default)]
pub struct CharSelection {
    pub class: CharClass,
    /// Scramble only matching characters; otherwise matching characters
    /// are the ones left alone
    pub whitelist: bool,
}

impl CharSelection {
    pub fn pattern(expr: &str, whitelist: bool) -> Result<Self> {
        let regex = Regex::new(expr).map_err(|e| Error::InvalidSelector(e.to_string()))?;
        Ok(Self {
            class: CharClass::Pattern(regex),
            whitelist,
        })
    }

    pub fn is_eligible(&self, text: Option<&str>) -> bool {
        let matches = match (&self.class, text) {
            (CharClass::All, _) => return true,
            (_, None) => return false,
            (CharClass::Letters, Some(t)) => is_letters(t),
            (CharClass::NonLetters, Some(t)) => !is_letters(t),
            (CharClass::Pattern(re), Some(t)) => re.is_match(t),
        };
        matches == self.whitelist
    }
}

fn is_letters(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_alphabetic)
}

/// Per-font opt-in/opt-out by BaseFont glob patterns
#[derive(Debug, Clone, Default)]
pub struct FontSelection {
    /// When non-empty, only matching fonts are scrambled
    pub include: Vec<Pattern>,
    pub exclude: Vec<Pattern>,
}

impl FontSelection {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| Pattern::new(p).map_err(|e| Error::InvalidPattern(format!("{}: {}", p, e))))
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Whether a font with this BaseFont takes part. Patterns are tried
    /// against the name with and without its subset tag.
    pub fn is_selected(&self, base_font: &str) -> bool {
        let names = [base_font, strip_subset_prefix(base_font)];
        let matches = |patterns: &[Pattern]| patterns.iter().any(|p| names.iter().any(|n| p.matches(n)));
        (self.include.is_empty() || matches(&self.include)) && !matches(&self.exclude)
    }
}

/// Options for [`crate::scramble`]
#[derive(Debug, Clone)]
pub struct ScrambleOptions {
    pub seed: u64,
    /// Fraction of eligible codes to move, clamped to 0.0..=1.0
    pub ratio: f64,
    pub chars: CharSelection,
    pub fonts: FontSelection,
    pub to_unicode: ToUnicodePolicy,
    /// Mappings from an earlier run to reuse
    pub presets: MappingFile,
    /// Worker threads; defaults to the number of CPUs
    pub workers: Option<usize>,
}

impl Default for ScrambleOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            ratio: 1.0,
            chars: CharSelection::default(),
            fonts: FontSelection::default(),
            to_unicode: ToUnicodePolicy::Decoy,
            presets: MappingFile::default(),
            workers: None,
        }
    }
}

impl ScrambleOptions {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.ratio.is_nan() {
            return 0.0;
        }
        self.ratio.clamp(0.0, 1.0)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}
