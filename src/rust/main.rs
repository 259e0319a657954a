use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::json;

use phishguard::config::{default_artifact_path, default_cache_path};
use phishguard::dataset::{DEFAULT_LABEL_COLUMN, DEFAULT_TEXT_COLUMN};
use phishguard::{
    load_dataset, CachePolicy, Detector, DetectorConfig, KeywordLabelMapper, Language, MemoCache,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a detector on a labelled CSV file and save it
    Train {
        /// CSV file with a header row
        #[arg(short, long)]
        dataset: PathBuf,
        /// Where to write the trained artifact
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, default_value = "english")]
        language: Language,
        #[arg(long, default_value_t = phishguard::config::DEFAULT_MAX_FEATURES)]
        max_features: usize,
        #[arg(long, default_value = DEFAULT_TEXT_COLUMN)]
        text_column: String,
        #[arg(long, default_value = DEFAULT_LABEL_COLUMN)]
        label_column: String,
        /// Skip k-fold cross-validation
        #[arg(long)]
        no_cv: bool,
    },
    /// Classify a single text
    Classify {
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Include the signal features in the output
        #[arg(short, long)]
        features: bool,
        text: String,
    },
    /// List the terms that weigh most toward each verdict
    Explain {
        #[arg(short, long)]
        model: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 20)]
        top: usize,
    },
    /// Inspect or clear the normalization cache snapshot
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Entry count and approximate size
    Stats,
    /// Empty the cache and delete its snapshot
    Clear,
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_cache() -> MemoCache {
    MemoCache::open(default_cache_path(), CachePolicy::Unbounded)
}

fn load_detector(model: Option<PathBuf>) -> Result<Detector> {
    let path = model.unwrap_or_else(default_artifact_path);
    let detector = Detector::load(&path)
        .with_context(|| format!("Failed to load detector from {:?}", path))?;
    Ok(detector.with_cache(open_cache()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Train {
            dataset,
            output,
            language,
            max_features,
            text_column,
            label_column,
            no_cv,
        } => {
            let start_time = Instant::now();
            let data = load_dataset(&dataset, &text_column, &label_column, &KeywordLabelMapper::new())
                .with_context(|| format!("Failed to load dataset {:?}", dataset))?;
            let (legitimate, phishing) = data.class_counts();
            if legitimate == 0 || phishing == 0 {
                bail!("Dataset must contain both phishing and legitimate examples");
            }

            let mut config = DetectorConfig::default()
                .with_language(language)
                .with_max_features(max_features);
            if no_cv {
                config = config.with_cv_folds(None);
            }
            let detector = Detector::builder()
                .with_config(config)
                .with_cache(open_cache())
                .train(&data.texts, &data.labels)?;

            let output = output.unwrap_or_else(default_artifact_path);
            detector.save(&output)?;
            detector.flush_cache()?;
            info!("Training finished in {:.2?}", start_time.elapsed());
            print_json(&json!({
                "artifact": output,
                "metrics": detector.metrics(),
            }))?;
        }
        Command::Classify { model, features, text } => {
            let detector = load_detector(model)?;
            let result = if features {
                detector.classify_with_features(&text)?
            } else {
                detector.classify(&text)?
            };
            detector.flush_cache()?;
            print_json(&result)?;
        }
        Command::Explain { model, top } => {
            let detector = load_detector(model)?;
            print_json(&detector.explain_top_features(top))?;
        }
        Command::Cache { action } => {
            let mut cache = open_cache();
            match action {
                CacheAction::Stats => print_json(&cache.stats())?,
                CacheAction::Clear => {
                    cache.clear()?;
                    println!("Cache cleared");
                }
            }
        }
    }

    Ok(())
}
