//! Parallel batch generation and output writing.
//!
//! Every captcha gets its own generator and RNG context, so workers share
//! nothing but the immutable glyph catalog.

use anyhow::{Context, Result};
use clap::ValueEnum;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use svgcaptcha::{CaptchaGenerator, DifficultyProfile, GlyphCatalog, to_data_uri};
use svgcaptcha_common::CaptchaResult;

use crate::config::CaptchaSettings;

/// How results are printed when no output directory is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Svg,
    Json,
    DataUri,
}

/// Batch statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub generated: usize,
    pub failed: usize,
    pub degraded: usize,
}

/// One entry of `answers.json`
#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    file: String,
    answer: &'a str,
    degraded_randomness: bool,
}

/// Generate `count` captchas on `threads` workers (0 = one per core)
pub fn generate_batch(
    profile: &DifficultyProfile,
    settings: &CaptchaSettings,
    count: usize,
    threads: usize,
) -> Result<(Vec<CaptchaResult>, BatchSummary)> {
    let generator = CaptchaGenerator::new(
        GlyphCatalog::builtin(),
        *profile,
        settings.length,
        settings.width,
        settings.height,
    )?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to build worker pool")?;

    let start = Instant::now();
    let outcomes: Vec<_> = pool.install(|| {
        (0..count)
            .into_par_iter()
            .map(|_| generator.generate())
            .collect()
    });

    let mut summary = BatchSummary::default();
    let mut results = Vec::with_capacity(count);
    for outcome in outcomes {
        match outcome {
            Ok(result) => {
                summary.generated += 1;
                if result.degraded_randomness {
                    summary.degraded += 1;
                }
                results.push(result);
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!(error = %e, "Captcha generation failed");
            }
        }
    }

    tracing::info!(
        generated = summary.generated,
        failed = summary.failed,
        degraded = summary.degraded,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Batch complete"
    );
    if summary.degraded > 0 {
        tracing::warn!(degraded = summary.degraded, "Some captchas used degraded randomness");
    }

    Ok((results, summary))
}

/// Write `captcha-XXXX.svg` files plus an `answers.json` manifest.
/// Returns the manifest path.
pub fn write_outputs(dir: &Path, results: &[CaptchaResult]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut manifest = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let file = format!("captcha-{i:04}.svg");
        let path = dir.join(&file);
        std::fs::write(&path, &result.markup)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        manifest.push(ManifestEntry {
            file,
            answer: &result.answer,
            degraded_randomness: result.degraded_randomness,
        });
    }

    let manifest_path = dir.join("answers.json");
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&manifest_path, json)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    tracing::debug!(files = results.len(), dir = %dir.display(), "Wrote batch output");
    Ok(manifest_path)
}

/// Render results for stdout
pub fn render(results: &[CaptchaResult], format: OutputFormat) -> Result<String> {
    let out = match format {
        OutputFormat::Svg => results
            .iter()
            .map(|r| r.markup.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(results)?,
        OutputFormat::DataUri => results
            .iter()
            .map(|r| format!("{}\t{}", r.answer, to_data_uri(&r.markup)))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CaptchaSettings {
        CaptchaSettings::default()
    }

    #[test]
    fn test_generate_batch_counts() {
        let (results, summary) =
            generate_batch(&DifficultyProfile::medium(), &settings(), 12, 2).unwrap();
        assert_eq!(results.len(), 12);
        assert_eq!(summary.generated, 12);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.degraded, 0);
        assert!(results.iter().all(|r| r.answer.chars().count() == 4));
    }

    #[test]
    fn test_generate_batch_rejects_bad_settings() {
        let mut bad = settings();
        bad.length = 0;
        assert!(generate_batch(&DifficultyProfile::easy(), &bad, 1, 1).is_err());
    }

    #[test]
    fn test_write_outputs() {
        let dir = std::env::temp_dir().join(format!("svgcaptcha-batch-{}", std::process::id()));
        let (results, _) = generate_batch(&DifficultyProfile::easy(), &settings(), 3, 1).unwrap();

        let manifest = write_outputs(&dir, &results).unwrap();
        assert!(dir.join("captcha-0000.svg").exists());
        assert!(dir.join("captcha-0002.svg").exists());

        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&manifest).unwrap()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1]["file"], "captcha-0001.svg");
        assert_eq!(entries[1]["answer"], results[1].answer.as_str());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_formats() {
        let results = vec![CaptchaResult {
            answer: "abc".to_string(),
            markup: "<svg/>".to_string(),
            degraded_randomness: false,
        }];
        assert_eq!(render(&results, OutputFormat::Svg).unwrap(), "<svg/>");
        assert_eq!(
            render(&results, OutputFormat::DataUri).unwrap(),
            "abc\tdata:image/svg+xml;base64,PHN2Zy8+"
        );
        let json = render(&results, OutputFormat::Json).unwrap();
        assert!(json.contains("\"answer\": \"abc\""));
    }
}
