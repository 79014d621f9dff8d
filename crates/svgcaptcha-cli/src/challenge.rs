//! Interactive challenge loop: show a captcha, read answers, verify.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

use svgcaptcha_common::constants::USER_FACING_FAILURE;
use svgcaptcha_common::{CaptchaError, CaptchaResult};

use crate::session::{AnswerStore, Verification};

/// Typed at the prompt to get a new image for the same token
const REGENERATE: &str = "r";

/// Run until an answer passes or input ends.
///
/// A failed or expired answer is consumed, so a new captcha is issued after
/// each miss. Returns the last verification outcome, or `None` if input
/// ended before any answer was checked.
pub fn run<R, W, G>(
    input: R,
    mut output: W,
    svg_path: &Path,
    store: &AnswerStore,
    mut generate: G,
) -> Result<Option<Verification>>
where
    R: BufRead,
    W: Write,
    G: FnMut() -> Result<CaptchaResult, CaptchaError>,
{
    let mut token = issue(&mut generate, &mut output, svg_path, store, None)?;
    let mut last = None;

    for line in input.lines() {
        let line = line.context("Failed to read answer")?;
        let answer = line.trim();

        if answer.eq_ignore_ascii_case(REGENERATE) {
            token = issue(&mut generate, &mut output, svg_path, store, Some(token))?;
            continue;
        }

        let outcome = store.verify(&token, answer);
        last = Some(outcome);
        match outcome {
            Verification::Passed => {
                writeln!(output, "Correct.")?;
                return Ok(last);
            }
            Verification::Failed => writeln!(output, "Incorrect, here is a new one.")?,
            Verification::Expired => writeln!(output, "Captcha expired, here is a new one.")?,
            Verification::Unknown => writeln!(output, "Unknown captcha, here is a new one.")?,
        }
        token = issue(&mut generate, &mut output, svg_path, store, None)?;
    }

    Ok(last)
}

/// Generate, store the answer and write the image. With `reuse`, the answer
/// behind that token is replaced instead of issuing a new token.
fn issue<G, W>(
    generate: &mut G,
    output: &mut W,
    svg_path: &Path,
    store: &AnswerStore,
    reuse: Option<String>,
) -> Result<String>
where
    G: FnMut() -> Result<CaptchaResult, CaptchaError>,
    W: Write,
{
    let result = match generate() {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "Captcha generation failed");
            writeln!(output, "{}", e.user_message())?;
            return Err(e).context(USER_FACING_FAILURE);
        }
    };

    let token = match reuse {
        Some(token) if store.regenerate(&token, &result.answer) => token,
        _ => store.issue(&result.answer),
    };

    std::fs::write(svg_path, &result.markup)
        .with_context(|| format!("Failed to write {}", svg_path.display()))?;
    writeln!(
        output,
        "Captcha written to {}. Type the characters, or '{}' for a new image:",
        svg_path.display(),
        REGENERATE
    )?;
    Ok(token)
}
