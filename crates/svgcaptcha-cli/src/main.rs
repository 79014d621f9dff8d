//! # svgcaptcha
//!
//! Command line front end for the captcha engine.
//!
//! ## Commands
//! ```text
//! generate   N captchas in parallel, to stdout or a directory
//! challenge  interactive solve loop backed by the answer store
//! profile    print the resolved difficulty profile as JSON
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod batch;
mod challenge;
mod config;
mod session;

use batch::OutputFormat;
use config::{AppConfig, DifficultySetting};
use session::AnswerStore;
use svgcaptcha::{CaptchaGenerator, DifficultyProfile, GlyphCatalog};
use svgcaptcha_common::constants::config_keys::DEFAULT_CONFIG_PATH;

/// SVG captcha generator
#[derive(Parser, Debug)]
#[command(name = "svgcaptcha")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,

    /// Difficulty (overrides config)
    #[arg(short, long, value_enum, env = "SVGCAPTCHA_DIFFICULTY", global = true)]
    difficulty: Option<DifficultySetting>,

    /// Number of glyphs (overrides config)
    #[arg(short, long, global = true)]
    length: Option<usize>,

    /// Declared image width (overrides config)
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Declared image height (overrides config)
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Accept answers regardless of case
    #[arg(long, global = true)]
    case_insensitive: bool,

    /// JSON profile replacing the difficulty level
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "LOG_LEVEL", global = true)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate captchas in parallel
    Generate {
        /// How many captchas
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Worker threads (overrides config, 0 = one per core)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Write captcha-XXXX.svg files and answers.json here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stdout format when no output directory is given
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Svg)]
        format: OutputFormat,
    },

    /// Solve captchas interactively
    Challenge {
        /// Where the current captcha image is written
        #[arg(long, default_value = "captcha.svg")]
        svg: PathBuf,
    },

    /// Print the resolved difficulty profile
    Profile,
}

fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    let config = AppConfig::load(&args.config, &args)?;
    let settings = &config.captcha;
    let profile = settings.resolve_profile()?;
    info!(
        difficulty = ?settings.difficulty,
        length = settings.length,
        width = settings.width,
        height = settings.height,
        "Configuration loaded"
    );

    match args.command {
        Command::Generate {
            count,
            threads,
            output,
            format,
        } => {
            let threads = threads.unwrap_or(config.threads);
            let (results, summary) = batch::generate_batch(&profile, settings, count, threads)?;

            if let Some(dir) = output {
                let manifest = batch::write_outputs(&dir, &results)?;
                info!(manifest = %manifest.display(), "Batch written");
            } else {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", batch::render(&results, format)?)?;
            }

            eprintln!(
                "Generated {} captcha(s), {} failed, {} with degraded randomness",
                summary.generated, summary.failed, summary.degraded
            );
        }

        Command::Challenge { svg } => {
            let store = AnswerStore::new(settings.answer_ttl_secs, settings.case_sensitive);
            // Same profile and dimensions for every image, fresh generator each time
            let generate = || {
                CaptchaGenerator::new(
                    GlyphCatalog::builtin(),
                    profile,
                    settings.length,
                    settings.width,
                    settings.height,
                )?
                .generate()
            };

            let outcome = challenge::run(io::stdin().lock(), io::stdout(), &svg, &store, generate)?;
            info!(?outcome, purged = store.purge_expired(), "Challenge finished");
        }

        Command::Profile => {
            print_profile(&profile)?;
        }
    }

    Ok(())
}

fn print_profile(profile: &DifficultyProfile) -> Result<()> {
    let json = serde_json::to_string_pretty(profile).context("Failed to serialize profile")?;
    println!("{json}");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for generated output
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }

    Ok(())
}
