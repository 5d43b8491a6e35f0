//! Translation file maintenance.
//!
//! Commands run in the order given; `scan` is the default.

use clap::{Parser, ValueEnum};
use historical_stats::locales::{self, Catalog, UpdateOutcome, DEFAULT_SOURCES, MASTER_FILE};
use std::path::PathBuf;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    /// Report missing, redundant and unknown keys
    Scan,
    /// Print a block of missing keys to translate
    Gen,
    /// Merge a translated block into the language files
    Update,
    /// Delete keys not present in the master file
    Clean,
}

/// Keep translation files in line with the English master
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(value_enum)]
    commands: Vec<Command>,

    /// Translated block for `update`
    #[arg(long)]
    file: Option<PathBuf>,

    /// Overwrite existing values on `update`
    #[arg(short, long)]
    force: bool,

    /// Translations directory
    #[arg(long, default_value = "translations")]
    dir: PathBuf,

    /// Source files or directories scanned for translation keys
    #[arg(long, num_args = 1.., default_values = DEFAULT_SOURCES)]
    source: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("historical_stats=warn")),
        )
        .init();

    let args = Args::parse();
    let commands = if args.commands.is_empty() {
        vec![Command::Scan]
    } else {
        args.commands.clone()
    };

    for command in commands {
        match command {
            Command::Scan => scan(&args)?,
            Command::Gen => gen(&args)?,
            Command::Update => update(&args)?,
            Command::Clean => clean(&args)?,
        }
    }
    Ok(())
}

fn scan(args: &Args) -> Result<()> {
    let report = locales::scan(&args.dir, &args.source)?;

    if !report.unknown_in_sources.is_empty() {
        println!("⚠️ Keys used in sources but missing in {}:", MASTER_FILE);
        for key in &report.unknown_in_sources {
            println!("  ⚠️ '{}'", key);
        }
    }

    if report.missing.is_empty() {
        println!("✅ All language files contain all keys from the master file.");
    } else {
        println!("➕ Missing keys:");
        for (lang, keys) in &report.missing {
            println!("  {}: {}", lang, keys.join(", "));
        }
    }

    if !report.redundant.is_empty() {
        println!("\n❌ Redundant keys (not in {}):", MASTER_FILE);
        for (lang, keys) in &report.redundant {
            println!("  {}: {}", lang, keys.join(", "));
        }
    }
    Ok(())
}

fn gen(args: &Args) -> Result<()> {
    let block = Catalog::load(&args.dir)?.generate();
    if block.is_empty() {
        println!("✅ All language files already contain every key from the master file.");
        return Ok(());
    }

    println!("\n# Translate the block below for each language:\n");
    println!("{}", serde_json::to_string_pretty(&block)?);
    println!("\n---\nSave the translations to a file and run:\n");
    println!("  historical-stats-locales update --file path/to/translation.json\n");
    Ok(())
}

fn update(args: &Args) -> Result<()> {
    let Some(file) = &args.file else {
        println!("⚠️ No translation file provided for update (use --file).");
        return Ok(());
    };

    let block = locales::load_block(file)?;
    for outcome in locales::update(&args.dir, &block, args.force)? {
        match outcome {
            UpdateOutcome::Updated {
                lang,
                added,
                overwritten,
            } => {
                let mut line = format!("✅ {}.json: {} new keys added", lang, added);
                if overwritten > 0 {
                    line.push_str(&format!(", {} updated (force)", overwritten));
                }
                println!("{}", line);
            }
            UpdateOutcome::Unchanged { lang } => {
                println!("✅ {}.json: no new keys added", lang);
            }
            UpdateOutcome::MissingFile { lang } => {
                println!("⚠️ Language file missing: {}.json", lang);
            }
        }
    }
    Ok(())
}

fn clean(args: &Args) -> Result<()> {
    let removed = locales::clean(&args.dir)?;
    if removed.is_empty() {
        println!("✅ No redundant keys to remove.");
        return Ok(());
    }

    let mut total = 0;
    for (lang, keys) in &removed {
        println!(
            "❌ {}.json: removed {} redundant keys: {}",
            lang,
            keys.len(),
            keys.join(", ")
        );
        total += keys.len();
    }
    println!("❌ Total removed keys: {}", total);
    Ok(())
}
