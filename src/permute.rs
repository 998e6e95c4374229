//! Permutation builder
//!
//! Produces, per font, a width- and glyph-preserving injective mapping of
//! the used codes. Codes are grouped by (glyph, byte width); each group is
//! deranged onto spare codes outside the used set where possible and onto
//! itself otherwise.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codespace::Code;
use crate::font::{Font, GlyphRef};

/// Maximum number of codes enumerated per byte width when looking for spares
pub const SPARE_LIMIT: usize = 65_536;

/// Mapping of a font's used codes to their new codes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMapping {
    entries: BTreeMap<Code, Code>,
}

impl CodeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity<'a>(codes: impl IntoIterator<Item = &'a Code>) -> Self {
        Self {
            entries: codes.into_iter().map(|c| (*c, *c)).collect(),
        }
    }

    pub fn insert(&mut self, from: Code, to: Code) {
        self.entries.insert(from, to);
    }

    pub fn get(&self, code: Code) -> Option<Code> {
        self.entries.get(&code).copied()
    }

    /// New code for `code`; codes without an entry stay put
    pub fn map(&self, code: Code) -> Code {
        self.get(code).unwrap_or(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Code, Code)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    /// Entries whose code actually changes
    pub fn moved(&self) -> impl Iterator<Item = (Code, Code)> + '_ {
        self.iter().filter(|(from, to)| from != to)
    }

    pub fn moved_count(&self) -> usize {
        self.moved().count()
    }

    pub fn is_identity(&self) -> bool {
        self.moved().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_injective(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.entries.values().all(|to| seen.insert(*to))
    }

    /// Keep only the entries for `codes`
    pub fn restricted_to(&self, codes: &BTreeSet<Code>) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(from, _)| codes.contains(from))
                .map(|(k, v)| (*k, *v))
                .collect(),
        }
    }
}

impl FromIterator<(Code, Code)> for CodeMapping {
    fn from_iter<I: IntoIterator<Item = (Code, Code)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Used codes grouped by the glyph they draw and their byte width
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphPartition {
    groups: BTreeMap<(GlyphRef, u8), Vec<Code>>,
    no_glyph: Vec<Code>,
}

impl GlyphPartition {
    pub fn new(font: &Font, codes: &BTreeSet<Code>) -> Self {
        let mut partition = Self::default();
        for &code in codes {
            match font.glyph(code) {
                Some(glyph) => partition.groups.entry((glyph, code.width)).or_default().push(code),
                None => partition.no_glyph.push(code),
            }
        }
        partition
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GlyphRef, u8, &[Code])> {
        self.groups.iter().map(|((glyph, width), codes)| (glyph, *width, codes.as_slice()))
    }

    /// Codes drawing the same glyph as `code` at the same width
    pub fn group_of(&self, font: &Font, code: Code) -> Option<&[Code]> {
        let glyph = font.glyph(code)?;
        self.groups.get(&(glyph, code.width)).map(Vec::as_slice)
    }

    pub fn no_glyph(&self) -> &[Code] {
        &self.no_glyph
    }
}

/// Why a used code kept its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscrambledReason {
    /// No partner code drawing the same glyph was available
    CodespaceSaturated,
    /// Rejected by the character selector or the ratio
    NotSelected,
    /// The code draws no known glyph
    NoGlyph,
}

/// Builder output for one font
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permutation {
    pub mapping: CodeMapping,
    pub unscrambled: BTreeMap<Code, UnscrambledReason>,
    /// True when a saved mapping was reused
    pub from_preset: bool,
}

impl Permutation {
    pub fn count(&self, reason: UnscrambledReason) -> usize {
        self.unscrambled.values().filter(|r| **r == reason).count()
    }
}

#[derive(Debug, Clone)]
pub struct BuildParams<'a> {
    pub seed: u64,
    /// Fraction of eligible codes to move
    pub ratio: f64,
    /// Whether codes outside the used set may be re-targeted
    pub trusted: bool,
    pub preset: Option<&'a CodeMapping>,
    /// Why the preset left its fixed codes in place, when it was recorded
    pub preset_reasons: Option<&'a BTreeMap<Code, UnscrambledReason>>,
}

impl Default for BuildParams<'_> {
    fn default() -> Self {
        Self {
            seed: 0,
            ratio: 1.0,
            trusted: true,
            preset: None,
            preset_reasons: None,
        }
    }
}

/// Build the permutation of `used` for `font`.
///
/// `eligible` filters codes by what they mean (the character selector);
/// ineligible codes keep their value.
pub fn build_permutation(
    font: &Font,
    used: &BTreeSet<Code>,
    params: &BuildParams<'_>,
    eligible: impl Fn(Code) -> bool,
) -> Permutation {
    let partition = GlyphPartition::new(font, used);

    if let Some(preset) = params.preset {
        match check_preset(font, used, &partition, preset, params.trusted) {
            Ok(mapping) => {
                debug!(font = %font.label, moved = mapping.moved_count(), "reusing saved mapping");
                let unscrambled = mapping
                    .iter()
                    .filter(|(from, to)| from == to)
                    .map(|(code, _)| {
                        let saved = params.preset_reasons.and_then(|reasons| reasons.get(&code)).copied();
                        let reason = match font.glyph(code) {
                            None => UnscrambledReason::NoGlyph,
                            Some(_) => saved.unwrap_or(UnscrambledReason::NotSelected),
                        };
                        (code, reason)
                    })
                    .collect();
                return Permutation {
                    mapping,
                    unscrambled,
                    from_preset: true,
                };
            }
            Err(reason) => {
                warn!(font = %font.label, "saved mapping not reusable ({}), building a new one", reason);
            }
        }
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut permutation = Permutation::default();

    for &code in partition.no_glyph() {
        permutation.mapping.insert(code, code);
        permutation.unscrambled.insert(code, UnscrambledReason::NoGlyph);
    }

    // Step 1: eligibility and ratio
    let mut candidates: Vec<Code> = Vec::new();
    for (_, _, codes) in partition.groups() {
        for &code in codes {
            if eligible(code) {
                candidates.push(code);
            } else {
                permutation.mapping.insert(code, code);
                permutation.unscrambled.insert(code, UnscrambledReason::NotSelected);
            }
        }
    }
    candidates.shuffle(&mut rng);
    let ratio = params.ratio.clamp(0.0, 1.0);
    let quota = ((ratio * candidates.len() as f64).ceil() as usize).min(candidates.len());
    for &code in &candidates[quota..] {
        permutation.mapping.insert(code, code);
        permutation.unscrambled.insert(code, UnscrambledReason::NotSelected);
    }
    let chosen: BTreeSet<Code> = candidates[..quota].iter().copied().collect();

    // Step 2: derange each group onto spares, then onto itself
    let mut spares = SparePools::new(font, used, params.trusted);
    for (glyph, width, codes) in partition.groups() {
        let mut selected: Vec<Code> = codes.iter().copied().filter(|c| chosen.contains(c)).collect();
        if selected.is_empty() {
            continue;
        }
        selected.shuffle(&mut rng);
        let picked = spares.take(glyph, width, selected.len(), &mut rng);

        if picked.is_empty() && selected.len() == 1 {
            permutation.mapping.insert(selected[0], selected[0]);
            permutation
                .unscrambled
                .insert(selected[0], UnscrambledReason::CodespaceSaturated);
            continue;
        }

        if picked.is_empty() {
            // Cyclic rotation, no fixed point for two or more codes
            for (i, &code) in selected.iter().enumerate() {
                permutation.mapping.insert(code, selected[(i + 1) % selected.len()]);
            }
        } else {
            // Spares first, then the codes vacated by earlier members: the
            // i-th code maps either to a spare or to a code before it
            let vacated = selected.len() - picked.len();
            let images: Vec<Code> = picked.iter().chain(&selected[..vacated]).copied().collect();
            for (&code, &image) in selected.iter().zip(&images) {
                permutation.mapping.insert(code, image);
            }
        }
    }

    debug!(
        font = %font.label,
        used = used.len(),
        moved = permutation.mapping.moved_count(),
        saturated = permutation.count(UnscrambledReason::CodespaceSaturated),
        "built permutation"
    );
    permutation
}

/// Check a saved mapping against the current usage and return the part
/// covering `used`.
fn check_preset(
    font: &Font,
    used: &BTreeSet<Code>,
    partition: &GlyphPartition,
    preset: &CodeMapping,
    trusted: bool,
) -> Result<CodeMapping, String> {
    let mapping = preset.restricted_to(used);
    if let Some(missing) = used.iter().find(|c| mapping.get(**c).is_none()) {
        return Err(format!("no entry for used code {}", missing));
    }
    if !mapping.is_injective() {
        return Err("not injective".to_string());
    }
    for (from, to) in mapping.moved() {
        if to.width != from.width || !font.codespace.contains(to) {
            return Err(format!("{} maps outside the codespace", from));
        }
        let glyph = font.glyph(from).ok_or_else(|| format!("{} draws no glyph", from))?;
        let same_glyph = font.glyph(to).as_ref() == Some(&glyph);
        if used.contains(&to) {
            let in_group = partition
                .group_of(font, from)
                .is_some_and(|group| group.contains(&to));
            if !in_group {
                return Err(format!("{} maps onto used code {} of another glyph", from, to));
            }
        } else if !trusted && !same_glyph {
            return Err(format!("{} re-targets {} while usage is incomplete", from, to));
        }
    }
    Ok(mapping)
}

/// Unused codes by byte width, ready to hand out as derangement targets
struct SparePools<'a> {
    font: &'a Font,
    used: &'a BTreeSet<Code>,
    enabled: bool,
    by_width: BTreeMap<u8, WidthPool>,
    taken: BTreeSet<Code>,
}

#[derive(Default)]
struct WidthPool {
    siblings: BTreeMap<GlyphRef, Vec<Code>>,
    free: Vec<Code>,
    vacant: Vec<Code>,
}

impl<'a> SparePools<'a> {
    fn new(font: &'a Font, used: &'a BTreeSet<Code>, enabled: bool) -> Self {
        Self {
            font,
            used,
            enabled,
            by_width: BTreeMap::new(),
            taken: BTreeSet::new(),
        }
    }

    /// Take up to `count` spares for codes of `glyph`, preferring codes that
    /// already draw it, then codes drawing nothing, then any unused code.
    fn take(&mut self, glyph: &GlyphRef, width: u8, count: usize, rng: &mut StdRng) -> Vec<Code> {
        if !self.enabled {
            return Vec::new();
        }
        if !self.by_width.contains_key(&width) {
            let pool = self.enumerate(width, rng);
            self.by_width.insert(width, pool);
        }
        let Some(pool) = self.by_width.get_mut(&width) else {
            return Vec::new();
        };

        let mut picked = Vec::with_capacity(count);
        let taken = &mut self.taken;
        let mut draw = |source: &mut Vec<Code>, picked: &mut Vec<Code>| {
            while picked.len() < count {
                let Some(code) = source.pop() else { break };
                if taken.insert(code) {
                    picked.push(code);
                }
            }
        };
        if let Some(siblings) = pool.siblings.get_mut(glyph) {
            draw(siblings, &mut picked);
        }
        draw(&mut pool.free, &mut picked);
        draw(&mut pool.vacant, &mut picked);
        picked
    }

    fn enumerate(&self, width: u8, rng: &mut StdRng) -> WidthPool {
        let mut pool = WidthPool::default();
        for code in self.font.codespace.codes_of_width(width, SPARE_LIMIT) {
            if self.used.contains(&code) {
                continue;
            }
            match self.font.glyph(code) {
                Some(glyph) => {
                    pool.siblings.entry(glyph).or_default().push(code);
                    pool.vacant.push(code);
                }
                None => pool.free.push(code),
            }
        }
        for codes in pool.siblings.values_mut() {
            codes.shuffle(rng);
        }
        pool.free.shuffle(rng);
        pool.vacant.shuffle(rng);
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codespace::{Codespace, CodespaceRange};
    use crate::font::tests::simple_font;
    use crate::font::{FontKind, SimpleEncoding, SimpleFont};

    fn codes(values: &[u8]) -> BTreeSet<Code> {
        values.iter().map(|v| Code::single(*v)).collect()
    }

    fn all(_: Code) -> bool {
        true
    }

    /// Simple font whose only codes are the given differences
    fn tiny_font(names: &[(u8, &str)], high: u8) -> Font {
        let mut font = simple_font("9 0 R");
        font.codespace = Codespace::new(vec![CodespaceRange::new(vec![0], vec![high]).unwrap()]);
        font.kind = FontKind::Simple(SimpleFont {
            subtype: "Type3".to_string(),
            encoding: SimpleEncoding {
                base: None,
                differences: names.iter().map(|(c, n)| (*c, n.to_string())).collect(),
            },
            widths: None,
        });
        font
    }

    fn assert_width_preserving(font: &Font, perm: &Permutation) {
        for (from, to) in perm.mapping.moved() {
            assert_eq!(from.width, to.width);
            assert!(font.codespace.contains(to));
        }
        assert!(perm.mapping.is_injective());
    }

    #[test]
    fn test_abc_is_deranged_and_deterministic() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66, 67]);
        let params = BuildParams { seed: 42, ..Default::default() };

        let first = build_permutation(&font, &used, &params, all);
        let second = build_permutation(&font, &used, &params, all);
        assert_eq!(first, second);
        assert_eq!(first.mapping.len(), 3);
        assert_eq!(first.mapping.moved_count(), 3);
        assert!(first.unscrambled.is_empty());
        assert_width_preserving(&font, &first);
    }

    #[test]
    fn test_different_seeds_usually_differ() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66, 67, 68, 69, 70]);
        let a = build_permutation(&font, &used, &BuildParams { seed: 1, ..Default::default() }, all);
        let b = build_permutation(&font, &used, &BuildParams { seed: 2, ..Default::default() }, all);
        assert_ne!(a.mapping, b.mapping);
    }

    #[test]
    fn test_saturated_codespace_leaves_codes_in_place() {
        let font = tiny_font(&[(0, "A"), (1, "B")], 1);
        let used = codes(&[0, 1]);
        let perm = build_permutation(&font, &used, &BuildParams::default(), all);
        assert!(perm.mapping.is_identity());
        assert_eq!(perm.count(UnscrambledReason::CodespaceSaturated), 2);
    }

    #[test]
    fn test_ligature_group_rotates_without_spares() {
        let font = tiny_font(&[(0, "f_i"), (1, "f_i")], 1);
        let used = codes(&[0, 1]);
        let perm = build_permutation(&font, &used, &BuildParams::default(), all);
        assert_eq!(perm.mapping.get(Code::single(0)), Some(Code::single(1)));
        assert_eq!(perm.mapping.get(Code::single(1)), Some(Code::single(0)));
        assert!(perm.unscrambled.is_empty());
    }

    #[test]
    fn test_single_spare_moves_whole_group() {
        // Codes 0 and 1 draw "x", code 2 is free
        let font = tiny_font(&[(0, "x"), (1, "x")], 2);
        let used = codes(&[0, 1]);
        let perm = build_permutation(&font, &used, &BuildParams::default(), all);
        assert_eq!(perm.mapping.moved_count(), 2);
        let images: BTreeSet<Code> = perm.mapping.iter().map(|(_, to)| to).collect();
        assert!(images.contains(&Code::single(2)));
        assert!(perm.mapping.is_injective());
    }

    #[test]
    fn test_sibling_spares_are_preferred() {
        let font = tiny_font(&[(0, "a"), (5, "a"), (6, "b")], 9);
        let used = codes(&[0, 6]);
        let perm = build_permutation(&font, &used, &BuildParams::default(), all);
        assert_eq!(perm.mapping.get(Code::single(0)), Some(Code::single(5)));
    }

    #[test]
    fn test_untrusted_usage_uses_no_spares() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66]);
        let params = BuildParams { trusted: false, ..Default::default() };
        let perm = build_permutation(&font, &used, &params, all);
        assert!(perm.mapping.is_identity());
        assert_eq!(perm.count(UnscrambledReason::CodespaceSaturated), 2);
    }

    #[test]
    fn test_ratio_and_selector() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66, 67, 68]);
        let none = build_permutation(&font, &used, &BuildParams { ratio: 0.0, ..Default::default() }, all);
        assert!(none.mapping.is_identity());
        assert_eq!(none.count(UnscrambledReason::NotSelected), 4);

        let half = build_permutation(&font, &used, &BuildParams { ratio: 0.5, ..Default::default() }, all);
        assert_eq!(half.mapping.moved_count(), 2);

        let only_a = build_permutation(&font, &used, &BuildParams::default(), |c| c.value == 65);
        assert_eq!(only_a.mapping.moved_count(), 1);
        assert_eq!(only_a.count(UnscrambledReason::NotSelected), 3);
    }

    #[test]
    fn test_codes_without_glyph_are_reported() {
        let font = simple_font("1 0 R");
        let used = codes(&[0x01, 65]);
        let perm = build_permutation(&font, &used, &BuildParams::default(), all);
        assert_eq!(perm.unscrambled.get(&Code::single(1)), Some(&UnscrambledReason::NoGlyph));
        assert_eq!(perm.mapping.get(Code::single(1)), Some(Code::single(1)));
    }

    #[test]
    fn test_valid_preset_is_reused() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66]);
        let preset: CodeMapping = [(Code::single(65), Code::single(200)), (Code::single(66), Code::single(201))]
            .into_iter()
            .collect();
        let params = BuildParams { preset: Some(&preset), ..Default::default() };
        let perm = build_permutation(&font, &used, &params, all);
        assert!(perm.from_preset);
        assert_eq!(perm.mapping, preset);
    }

    #[test]
    fn test_preset_keeps_recorded_reasons() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66, 67]);
        let preset: CodeMapping = [
            (Code::single(65), Code::single(200)),
            (Code::single(66), Code::single(66)),
            (Code::single(67), Code::single(67)),
        ]
        .into_iter()
        .collect();
        let reasons: BTreeMap<Code, UnscrambledReason> =
            [(Code::single(66), UnscrambledReason::CodespaceSaturated)].into_iter().collect();
        let params = BuildParams {
            preset: Some(&preset),
            preset_reasons: Some(&reasons),
            ..Default::default()
        };
        let perm = build_permutation(&font, &used, &params, all);
        assert!(perm.from_preset);
        assert_eq!(perm.unscrambled.get(&Code::single(66)), Some(&UnscrambledReason::CodespaceSaturated));
        // Nothing recorded for 67: the selector is the only other cause
        assert_eq!(perm.unscrambled.get(&Code::single(67)), Some(&UnscrambledReason::NotSelected));
    }

    #[test]
    fn test_preset_missing_codes_is_rebuilt() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66, 67]);
        let preset: CodeMapping = [(Code::single(65), Code::single(200))].into_iter().collect();
        let params = BuildParams { preset: Some(&preset), ..Default::default() };
        let perm = build_permutation(&font, &used, &params, all);
        assert!(!perm.from_preset);
        assert_eq!(perm.mapping.len(), 3);
    }

    #[test]
    fn test_preset_onto_used_code_of_other_glyph_is_rejected() {
        let font = simple_font("1 0 R");
        let used = codes(&[65, 66]);
        let preset: CodeMapping = [(Code::single(65), Code::single(66)), (Code::single(66), Code::single(65))]
            .into_iter()
            .collect();
        let params = BuildParams { preset: Some(&preset), ..Default::default() };
        assert!(!build_permutation(&font, &used, &params, all).from_preset);
    }
}
