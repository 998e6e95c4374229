//! Scramble report

use std::fmt;

use serde::Serialize;

use crate::error::ScrambleError;
use crate::permute::{Permutation, UnscrambledReason};
use crate::preset::MappingFile;

/// Outcome of a run over one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrambleReport {
    pub seed: u64,
    pub fonts: Vec<FontReport>,
    pub skipped_streams: Vec<SkippedStream>,
    pub rewritten_streams: usize,
    /// Literal operands re-emitted at a different byte length
    pub resized_operands: usize,
    /// Mappings of this run, for `--mapping`
    #[serde(skip)]
    pub mappings: MappingFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FontOutcome {
    FullyScrambled,
    /// Some used codes kept their value
    PartiallyScrambled,
    /// No used code moved
    Unscrambled,
    Unsupported { reason: String },
    OptedOut,
    Unused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnscrambledCode {
    /// Hex digits of the code
    pub code: String,
    pub reason: UnscrambledReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FontReport {
    pub font: String,
    pub base_font: String,
    pub outcome: FontOutcome,
    pub used_codes: usize,
    pub scrambled_codes: usize,
    pub unscrambled: Vec<UnscrambledCode>,
    /// Whether a saved mapping was reused
    pub preset: bool,
    /// False when a failed stream may draw codes the scan did not see
    pub complete_usage: bool,
}

impl FontReport {
    pub fn new(font: &str, base_font: &str, outcome: FontOutcome) -> Self {
        Self {
            font: font.to_string(),
            base_font: base_font.to_string(),
            outcome,
            used_codes: 0,
            scrambled_codes: 0,
            unscrambled: Vec::new(),
            preset: false,
            complete_usage: true,
        }
    }

    /// Report for a font whose permutation was built
    pub fn from_permutation(font: &str, base_font: &str, permutation: &Permutation, complete_usage: bool) -> Self {
        let used_codes = permutation.mapping.len();
        let scrambled_codes = permutation.mapping.moved_count();
        let outcome = if scrambled_codes == used_codes {
            FontOutcome::FullyScrambled
        } else if scrambled_codes == 0 {
            FontOutcome::Unscrambled
        } else {
            FontOutcome::PartiallyScrambled
        };
        Self {
            used_codes,
            scrambled_codes,
            unscrambled: permutation
                .unscrambled
                .iter()
                .map(|(code, reason)| UnscrambledCode {
                    code: code.to_hex(),
                    reason: *reason,
                })
                .collect(),
            preset: permutation.from_preset,
            complete_usage,
            ..Self::new(font, base_font, outcome)
        }
    }

    pub fn count(&self, reason: UnscrambledReason) -> usize {
        self.unscrambled.iter().filter(|u| u.reason == reason).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStream {
    pub stream: String,
    pub offset: usize,
    pub reason: String,
}

impl ScrambleReport {
    /// Every non-fatal problem of the run
    pub fn issues(&self) -> Vec<ScrambleError> {
        let mut issues = Vec::new();
        for font in &self.fonts {
            if let FontOutcome::Unsupported { reason } = &font.outcome {
                issues.push(ScrambleError::UnsupportedFont {
                    font: font.font.clone(),
                    reason: reason.clone(),
                });
            }
            let saturated = font.count(UnscrambledReason::CodespaceSaturated);
            if saturated > 0 {
                issues.push(ScrambleError::CodespaceSaturated {
                    font: font.font.clone(),
                    codes: saturated,
                });
            }
        }
        for skipped in &self.skipped_streams {
            issues.push(ScrambleError::StreamTokenization {
                stream: skipped.stream.clone(),
                offset: skipped.offset,
                reason: skipped.reason.clone(),
            });
        }
        issues
    }

    pub fn font(&self, label: &str) -> Option<&FontReport> {
        self.fonts.iter().find(|f| f.font == label)
    }

    pub fn scrambled_codes(&self) -> usize {
        self.fonts.iter().map(|f| f.scrambled_codes).sum()
    }
}

impl fmt::Display for FontOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontOutcome::FullyScrambled => write!(f, "scrambled"),
            FontOutcome::PartiallyScrambled => write!(f, "partially scrambled"),
            FontOutcome::Unscrambled => write!(f, "unscrambled"),
            FontOutcome::Unsupported { reason } => write!(f, "not remappable ({})", reason),
            FontOutcome::OptedOut => write!(f, "opted out"),
            FontOutcome::Unused => write!(f, "unused"),
        }
    }
}

impl fmt::Display for ScrambleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f, "Fonts:")?;
        for font in &self.fonts {
            write!(f, "  {} {}: {}", font.font, font.base_font, font.outcome)?;
            if font.used_codes > 0 {
                write!(f, ", {}/{} codes moved", font.scrambled_codes, font.used_codes)?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "Streams rewritten: {} ({} operands resized)",
            self.rewritten_streams, self.resized_operands
        )?;
        if !self.skipped_streams.is_empty() {
            writeln!(f, "Streams skipped: {}", self.skipped_streams.len())?;
            for skipped in &self.skipped_streams {
                writeln!(f, "  {} at byte {}: {}", skipped.stream, skipped.offset, skipped.reason)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codespace::Code;

    fn permutation(moved: &[(u8, u8)], fixed: &[(u8, UnscrambledReason)]) -> Permutation {
        let mut perm = Permutation::default();
        for (a, b) in moved {
            perm.mapping.insert(Code::single(*a), Code::single(*b));
        }
        for (a, reason) in fixed {
            perm.mapping.insert(Code::single(*a), Code::single(*a));
            perm.unscrambled.insert(Code::single(*a), *reason);
        }
        perm
    }

    #[test]
    fn test_outcome_classification() {
        let full = FontReport::from_permutation("1 0 R", "F", &permutation(&[(1, 2), (2, 1)], &[]), true);
        assert_eq!(full.outcome, FontOutcome::FullyScrambled);

        let partial = FontReport::from_permutation(
            "1 0 R",
            "F",
            &permutation(&[(1, 9)], &[(2, UnscrambledReason::CodespaceSaturated)]),
            true,
        );
        assert_eq!(partial.outcome, FontOutcome::PartiallyScrambled);
        assert_eq!(partial.unscrambled[0].code, "02");

        let none = FontReport::from_permutation(
            "1 0 R",
            "F",
            &permutation(&[], &[(2, UnscrambledReason::NotSelected)]),
            true,
        );
        assert_eq!(none.outcome, FontOutcome::Unscrambled);
    }

    #[test]
    fn test_issues_collects_non_fatal_errors() {
        let report = ScrambleReport {
            fonts: vec![
                FontReport::new("1 0 R", "Symbol", FontOutcome::Unsupported { reason: "symbolic".to_string() }),
                FontReport::from_permutation(
                    "2 0 R",
                    "F",
                    &permutation(&[], &[(1, UnscrambledReason::CodespaceSaturated), (2, UnscrambledReason::CodespaceSaturated)]),
                    true,
                ),
            ],
            skipped_streams: vec![SkippedStream {
                stream: "7 0 R".to_string(),
                offset: 3,
                reason: "bad".to_string(),
            }],
            ..Default::default()
        };
        let issues = report.issues();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|e| !e.is_fatal()));
        assert_eq!(
            issues[1],
            ScrambleError::CodespaceSaturated {
                font: "2 0 R".to_string(),
                codes: 2
            }
        );
    }

    #[test]
    fn test_report_serializes_outcome_tag() {
        let report = FontReport::new("1 0 R", "F", FontOutcome::OptedOut);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "opted_out");
    }
}
