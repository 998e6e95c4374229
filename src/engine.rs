//! Orchestration: scan, build, patch, rewrite, validate, assemble
//!
//! Per-font and per-stream work runs on scoped worker threads; the document
//! is only mutated after every worker has joined and every check passed, so
//! a fatal error leaves it exactly as it was.

use std::collections::BTreeMap;
use std::thread;

use tracing::{debug, info, warn};

use crate::document::{Document, StreamHandle};
use crate::error::ScrambleError;
use crate::font::{Font, FontHandle};
use crate::options::ScrambleOptions;
use crate::patch::patch_font;
use crate::permute::{build_permutation, BuildParams, CodeMapping, Permutation};
use crate::report::{FontOutcome, FontReport, ScrambleReport, SkippedStream};
use crate::rewrite::{rewrite_stream, RewrittenStream};
use crate::scan::{scan_document, FontUsage, ScanResult};
use crate::validate::{validate_font, validate_stream};

const FONT_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const TO_UNICODE_SALT: u64 = 0xD1B5_4A32_D192_ED03;

/// Apply `f` to every item on up to `workers` threads, keeping order
pub fn parallel_map<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter().map(f).collect();
    }
    let chunk_size = items.len().div_ceil(workers);
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(f).collect::<Vec<R>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

/// Seed of one font's permutation, derived from the run seed
fn font_seed(seed: u64, font: FontHandle) -> u64 {
    seed ^ (font.0 as u64 + 1).wrapping_mul(FONT_SALT)
}

/// A font that takes part in remapping
struct FontJob<'a> {
    handle: FontHandle,
    font: &'a Font,
    usage: &'a FontUsage,
}

struct FontResult {
    handle: FontHandle,
    permutation: Permutation,
    /// Patched tables, `None` when nothing moved
    patched: Option<Font>,
}

/// Scramble the text of `doc` in place.
///
/// Returns the report on success. On [`ScrambleError::ConsistencyViolation`]
/// the document is left untouched.
pub fn scramble(doc: &mut Document, options: &ScrambleOptions) -> Result<ScrambleReport, ScrambleError> {
    let workers = options.workers();
    info!(fonts = doc.fonts.len(), streams = doc.streams.len(), workers, "scrambling document");

    // Step 1: scan
    let scan = scan_document(doc, workers);

    let mut report = ScrambleReport {
        seed: options.seed,
        ..Default::default()
    };
    for failed in scan.failures() {
        if let Err(ScrambleError::StreamTokenization { stream, offset, reason }) = &failed.result {
            report.skipped_streams.push(SkippedStream {
                stream: stream.clone(),
                offset: *offset,
                reason: reason.clone(),
            });
        }
    }

    // Step 2: per-font build, patch and validate
    let mut outcomes: BTreeMap<FontHandle, FontReport> = BTreeMap::new();
    let mut jobs = Vec::new();
    for handle in doc.font_handles() {
        let font = doc.font(handle);
        let outcome = match scan.usage(handle) {
            None => Some(FontOutcome::Unused),
            Some(usage) if usage.operands == 0 => Some(FontOutcome::Unused),
            Some(_) if !font.is_supported() => Some(FontOutcome::Unsupported {
                reason: font.unsupported_reason().unwrap_or_default().to_string(),
            }),
            Some(_) if !options.fonts.is_selected(&font.base_font) => Some(FontOutcome::OptedOut),
            Some(usage) if usage.codes.is_empty() => Some(FontOutcome::Unused),
            Some(usage) => {
                jobs.push(FontJob { handle, font, usage });
                None
            }
        };
        if let Some(outcome) = outcome {
            if let FontOutcome::Unsupported { reason } = &outcome {
                warn!(font = %font.label, base_font = %font.base_font, "not remappable: {}", reason);
            }
            outcomes.insert(handle, FontReport::new(&font.label, &font.base_font, outcome));
        }
    }

    let font_results = parallel_map(&jobs, workers, |job| process_font(job, options));
    let mut mappings: BTreeMap<FontHandle, CodeMapping> = BTreeMap::new();
    let mut patched_fonts: Vec<(FontHandle, Font)> = Vec::new();
    for (job, result) in jobs.iter().zip(font_results) {
        let result = match result {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{}", e);
                let reason = match &e {
                    ScrambleError::UnsupportedFont { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                outcomes.insert(
                    job.handle,
                    FontReport::new(&job.font.label, &job.font.base_font, FontOutcome::Unsupported { reason }),
                );
                continue;
            }
        };
        report
            .mappings
            .record(&job.font.label, &job.font.base_font, &result.permutation);
        outcomes.insert(
            job.handle,
            FontReport::from_permutation(
                &job.font.label,
                &job.font.base_font,
                &result.permutation,
                job.usage.trusted,
            ),
        );
        if let Some(patched) = result.patched {
            mappings.insert(result.handle, result.permutation.mapping);
            patched_fonts.push((result.handle, patched));
        }
    }
    report.fonts = outcomes.into_values().collect();

    // Step 3: per-stream rewrite and validate
    let rewritten = rewrite_streams(doc, &scan, &mappings, workers)?;

    // Step 4: assemble; single writer after all workers joined
    for (handle, font) in patched_fonts {
        doc.replace_font(handle, font);
    }
    for (handle, stream) in rewritten {
        report.rewritten_streams += 1;
        report.resized_operands += stream.resized_operands;
        doc.replace_stream_bytes(handle, stream.bytes);
    }

    info!(
        scrambled_codes = report.scrambled_codes(),
        rewritten_streams = report.rewritten_streams,
        skipped_streams = report.skipped_streams.len(),
        "scramble complete"
    );
    Ok(report)
}

/// Rewrite every scanned stream that shows text in a remapped font.
///
/// Any failure is fatal: the stream's fonts are already patched, so leaving
/// it unchanged would draw the wrong glyphs.
fn rewrite_streams(
    doc: &Document,
    scan: &ScanResult,
    mappings: &BTreeMap<FontHandle, CodeMapping>,
    workers: usize,
) -> Result<Vec<(StreamHandle, RewrittenStream)>, ScrambleError> {
    let stream_jobs: Vec<StreamHandle> = scan
        .streams
        .values()
        .filter(|s| match &s.result {
            Ok(usage) => usage.operands.keys().any(|f| mappings.contains_key(f)),
            Err(_) => false,
        })
        .map(|s| s.stream)
        .collect();
    let results = parallel_map(&stream_jobs, workers, |handle| process_stream(doc, scan, *handle, mappings));

    let mut rewritten = Vec::new();
    for (handle, result) in stream_jobs.iter().zip(results) {
        match result {
            Ok(Some(stream)) => rewritten.push((*handle, stream)),
            Ok(None) => {}
            Err(ScrambleError::StreamTokenization { stream, offset, reason }) => {
                return Err(ScrambleError::ConsistencyViolation {
                    subject: format!("stream {}", stream),
                    detail: format!("scanned but not rewritable at byte {}: {}", offset, reason),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(rewritten)
}

fn process_font(job: &FontJob<'_>, options: &ScrambleOptions) -> Result<FontResult, ScrambleError> {
    let font = job.font;
    let preset = options.presets.lookup(&font.label, &font.base_font);
    let preset_reasons = options.presets.lookup_reasons(&font.label, &font.base_font);
    let seed = font_seed(options.seed, job.handle);
    let params = BuildParams {
        seed,
        ratio: options.ratio(),
        trusted: job.usage.trusted,
        preset: preset.as_ref(),
        preset_reasons: Some(&preset_reasons),
    };
    let permutation = build_permutation(font, &job.usage.codes, &params, |code| {
        options.chars.is_eligible(font.unicode(code).as_deref())
    });

    if permutation.mapping.is_identity() {
        debug!(font = %font.label, "nothing moved");
        return Ok(FontResult {
            handle: job.handle,
            permutation,
            patched: None,
        });
    }

    let patched = patch_font(
        font,
        &permutation.mapping,
        &job.usage.codes,
        options.to_unicode,
        seed ^ TO_UNICODE_SALT,
    )?;
    validate_font(font, &patched, &permutation.mapping)?;
    Ok(FontResult {
        handle: job.handle,
        permutation,
        patched: Some(patched),
    })
}

fn process_stream(
    doc: &Document,
    scan: &ScanResult,
    handle: StreamHandle,
    mappings: &BTreeMap<FontHandle, CodeMapping>,
) -> Result<Option<RewrittenStream>, ScrambleError> {
    let stream = doc.stream(handle);
    let Some(stream_scan) = scan.streams.get(&handle) else {
        return Ok(None);
    };
    let Some(rewritten) = rewrite_stream(stream, &stream_scan.entry, &doc.fonts, mappings)? else {
        return Ok(None);
    };
    validate_stream(
        &stream.label,
        &stream.bytes,
        &rewritten.bytes,
        &stream_scan.entry,
        &stream.fonts,
        &doc.fonts,
        mappings,
    )?;
    debug!(
        stream = %stream.label,
        operands = rewritten.changed_operands,
        resized = rewritten.resized_operands,
        "rewrote stream"
    );
    Ok(Some(rewritten))
}
