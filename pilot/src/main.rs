//! `pilot`: report where images appear on screen.
//!
//! ```text
//! pilot [--screen FILE] [--precision P] [--save] PATH...
//! ```
//!
//! Each PATH is an image or a folder of images. Results are matched against
//! one capture of the primary monitor, or against FILE when given.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use ie::{Engine, FrameSource, MemorySource, Needle, SearchConfig, Template};
use pilot::{Config, ScreenSource};

#[derive(Parser, Debug)]
#[command(name = "pilot", version, about = "Report where images appear on screen")]
struct Args {
    /// Match against this screenshot instead of the primary monitor.
    #[arg(long, value_name = "FILE")]
    screen: Option<PathBuf>,

    /// Minimum match score in (0, 1], overriding the config file.
    #[arg(long, value_name = "P")]
    precision: Option<f64>,

    /// Write the effective config back to the config file.
    #[arg(long)]
    save: bool,

    /// Images, or folders of images, to look for.
    #[arg(value_name = "PATH", required_unless_present = "save")]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    // Structured logging. Use `RUST_LOG=info` etc.
    pilot::init_logging();

    // Usage errors exit with clap's code 2, like other failures.
    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "pilot failed");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(true)` when every image was found.
fn run(args: Args) -> Result<bool> {
    let mut config = Config::load_or_default();
    if let Some(precision) = args.precision {
        config.search.precision = precision;
    }
    config.search.validate()?;

    if args.save {
        config.save()?;
        tracing::info!(path = ?Config::path().ok(), "config saved");
    }
    if args.paths.is_empty() {
        return Ok(true);
    }

    match &args.screen {
        Some(file) => scan(&Engine::new(MemorySource::open(file)?), &args.paths, &config.search),
        None => scan(&Engine::new(ScreenSource::new()), &args.paths, &config.search),
    }
}

fn scan<S: FrameSource>(engine: &Engine<S>, paths: &[PathBuf], search: &SearchConfig) -> Result<bool> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(ie::image_files(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let templates = files
        .iter()
        .map(Template::open)
        .collect::<ie::Result<Vec<_>>>()?;
    let needles: Vec<Needle<'_>> = templates.iter().map(Needle::from).collect();
    let found = engine.find_any(&needles, None, search)?;

    let mut all = true;
    for (file, hit) in files.iter().zip(found) {
        match hit {
            Some(m) => println!("{}\t{},{}\t{:.3}", file.display(), m.target().x, m.target().y, m.score()),
            None => {
                all = false;
                println!("{}\tnot found", file.display());
            }
        }
    }
    Ok(all)
}
