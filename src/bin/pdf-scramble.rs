//! PDF Scramble CLI tool
//!
//! A command-line tool for scrambling the extractable text of PDFs.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_scramble::pdf::{inspect_fonts, scramble_file, FileOptions};
use pdf_scramble::{CharClass, CharSelection, FontSelection, ScrambleOptions, ToUnicodePolicy};

/// PDF Scramble - Scramble the text of a PDF without changing how it looks
#[derive(Parser)]
#[command(name = "pdf-scramble")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Scramble every font with a random seed
    pdf-scramble scramble notes.pdf -o notes-scrambled.pdf

    # Repeatable run that keeps digits readable
    pdf-scramble scramble notes.pdf -o out.pdf --seed 42 --select \"[0-9]\"

    # Reuse and update a mapping file, write a report
    pdf-scramble scramble notes.pdf -o out.pdf --mapping map.json --report report.json

    # List the fonts of a PDF and whether they can be remapped
    pdf-scramble info notes.pdf")]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scramble the extractable text of a PDF
    #[command(group(ArgGroup::new("chars").args(["letters", "non_letters", "select"])))]
    Scramble {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Seed for the permutation (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of eligible codes to scramble, 0 to 1
        #[arg(long, default_value_t = 1.0)]
        ratio: f64,

        /// Select letters
        #[arg(long)]
        letters: bool,

        /// Select everything except letters
        #[arg(long)]
        non_letters: bool,

        /// Select characters matching a regular expression
        #[arg(long, value_name = "REGEX")]
        select: Option<String>,

        /// Scramble only the selected characters (default: leave them alone)
        #[arg(long)]
        whitelist: bool,

        /// Only scramble fonts whose BaseFont matches (glob, repeatable)
        #[arg(long, value_name = "GLOB")]
        include: Vec<String>,

        /// Never scramble fonts whose BaseFont matches (glob, repeatable)
        #[arg(long, value_name = "GLOB")]
        exclude: Vec<String>,

        /// Drop ToUnicode entries of moved codes instead of writing decoys
        #[arg(long)]
        omit_unicode: bool,

        /// Mapping file to reuse and update
        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,

        /// Write a JSON report
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Worker threads (default: number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show the fonts of a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Scramble {
            input,
            output,
            seed,
            ratio,
            letters,
            non_letters,
            select,
            whitelist,
            include,
            exclude,
            omit_unicode,
            mapping,
            report,
            workers,
        } => build_options(
            seed,
            ratio,
            letters,
            non_letters,
            select,
            whitelist,
            &include,
            &exclude,
            omit_unicode,
            workers,
        )
        .and_then(|scramble| {
            cmd_scramble(FileOptions {
                input,
                output,
                report,
                mapping,
                scramble,
            })
        }),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[allow(clippy::too_many_arguments)]
fn build_options(
    seed: Option<u64>,
    ratio: f64,
    letters: bool,
    non_letters: bool,
    select: Option<String>,
    whitelist: bool,
    include: &[String],
    exclude: &[String],
    omit_unicode: bool,
    workers: Option<usize>,
) -> Result<ScrambleOptions> {
    if !(0.0..=1.0).contains(&ratio) {
        bail!("--ratio must be between 0 and 1, got {}", ratio);
    }

    let chars = match (letters, non_letters, select) {
        (_, _, Some(expr)) => CharSelection::pattern(&expr, whitelist)?,
        (true, _, _) => CharSelection {
            class: CharClass::Letters,
            whitelist,
        },
        (_, true, _) => CharSelection {
            class: CharClass::NonLetters,
            whitelist,
        },
        _ => CharSelection::default(),
    };

    Ok(ScrambleOptions {
        seed: seed.unwrap_or_else(rand::random),
        ratio,
        chars,
        fonts: FontSelection::new(include, exclude)?,
        to_unicode: if omit_unicode {
            ToUnicodePolicy::Omit
        } else {
            ToUnicodePolicy::Decoy
        },
        workers,
        ..Default::default()
    })
}

/// Scramble one PDF
fn cmd_scramble(options: FileOptions) -> Result<()> {
    eprintln!("Scrambling {} (seed {})...", options.input.display(), options.scramble.seed);

    let report = scramble_file(&options).with_context(|| format!("scrambling {}", options.input.display()))?;

    eprint!("{}", report);
    for issue in report.issues() {
        eprintln!("Warning: {}", issue);
    }
    eprintln!("Output: {}", options.output.display());
    if let Some(path) = &options.mapping {
        eprintln!("Mapping: {}", path.display());
    }
    if let Some(path) = &options.report {
        eprintln!("Report: {}", path.display());
    }
    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let info = inspect_fonts(&input)?;
    println!("File: {}", input.display());
    print!("{}", info);
    Ok(())
}
