//! HMP recognizer CLI
//!
//! Trains motion models from a labeled corpus and classifies recordings.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hmp_recognizer::{
    config::Config,
    core::{
        ArtifactBuilder, ModelArtifact, ModelBuilder, SignalSeparator, StreamClassifier,
        StreamState,
    },
    ingest::{discover_classes, read_class_dir, read_trial, Trial},
    report::create_shared_log_with_persistence,
    VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hmp")]
#[command(version = VERSION)]
#[command(about = "Human motion primitive recognition from accelerometer data", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build class models from a directory of class sub-directories
    Train {
        /// Corpus root; each sub-directory holds the trials of one class
        #[arg(long)]
        data: PathBuf,

        /// Comma-separated subset of classes to train
        #[arg(long, value_delimiter = ',')]
        classes: Option<Vec<String>>,

        /// Where to write the model artifact
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Seed for reproducible clustering
        #[arg(long)]
        seed: Option<u64>,

        /// Build classes one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Stream a recorded trial through the classifier
    Classify {
        /// Trial file with one raw sample per line
        #[arg(long)]
        trial: PathBuf,

        /// Model artifact (defaults to the configured model path)
        #[arg(long)]
        models: Option<PathBuf>,

        /// Print every Nth classified sample
        #[arg(long, default_value = "1")]
        every: usize,
    },

    /// Show the contents of a model artifact
    Inspect {
        /// Model artifact (defaults to the configured model path)
        #[arg(long)]
        models: Option<PathBuf>,
    },

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };

    match cli.command {
        Commands::Train {
            data,
            classes,
            output,
            seed,
            sequential,
        } => cmd_train(config, &data, classes, output, seed, sequential),
        Commands::Classify {
            trial,
            models,
            every,
        } => cmd_classify(&config, &trial, models, every),
        Commands::Inspect { models } => cmd_inspect(&config, models),
        Commands::Config => cmd_config(&config),
    }
}

fn load_corpus(config: &Config, root: &Path, only: Option<&[String]>) -> Result<Vec<(String, Vec<Trial>)>> {
    let mut corpus = Vec::new();
    for (name, dir) in discover_classes(root)? {
        if let Some(only) = only {
            if !only.iter().any(|c| c == &name) {
                continue;
            }
        }
        let trials = read_class_dir(&dir, &config.ingest)
            .with_context(|| format!("reading class '{name}'"))?;
        info!(class = %name, trials = trials.len(), "Loaded class");
        corpus.push((name, trials));
    }

    if let Some(only) = only {
        for wanted in only {
            if !corpus.iter().any(|(name, _)| name == wanted) {
                bail!("class '{wanted}' not found under {}", root.display());
            }
        }
    }
    if corpus.is_empty() {
        bail!("no class directories found under {}", root.display());
    }
    Ok(corpus)
}

fn cmd_train(
    mut config: Config,
    data: &Path,
    classes: Option<Vec<String>>,
    output: Option<PathBuf>,
    seed: Option<u64>,
    sequential: bool,
) -> Result<()> {
    if seed.is_some() {
        config.seed = seed;
    }
    if sequential {
        config.parallel_training = false;
    }

    let corpus = load_corpus(&config, data, classes.as_deref())?;
    println!("Training {} classes from {}", corpus.len(), data.display());

    let builder = ModelBuilder::new(&config)?;
    let trained = builder.build_all(&corpus)?;

    let output = match output {
        Some(path) => path,
        None => {
            config.ensure_directories()?;
            config.model_path.clone()
        }
    };
    let artifact = ArtifactBuilder::new()
        .with_diagnostics(trained.diagnostics.clone())
        .build(&trained.models);
    artifact
        .save(&output)
        .with_context(|| format!("writing models to {}", output.display()))?;

    println!();
    for diag in &trained.diagnostics {
        println!(
            "  {:<20} trials: {:>3}  K(gravity/body): {}/{}  threshold: {:.4}{}",
            diag.class,
            diag.trials,
            diag.gravity.components,
            diag.body.components,
            diag.threshold,
            if diag.converged() { "" } else { "  (EM not converged)" }
        );
    }
    println!();
    println!(
        "Window size: {} samples (filter delay {})",
        trained.models.window_size(),
        trained.models.filter_delay()
    );
    println!("Saved models to {}", output.display());
    Ok(())
}

fn load_artifact(config: &Config, models: Option<PathBuf>) -> Result<(PathBuf, ModelArtifact)> {
    let path = models.unwrap_or_else(|| config.model_path.clone());
    let artifact = ModelArtifact::load(&path)
        .with_context(|| format!("loading models from {}", path.display()))?;
    Ok((path, artifact))
}

fn cmd_classify(config: &Config, trial: &Path, models: Option<PathBuf>, every: usize) -> Result<()> {
    let (_, artifact) = load_artifact(config, models)?;
    let models = Arc::new(artifact.into_model_set()?);
    let separator = SignalSeparator::new(&config.separation)?;
    let mut classifier = StreamClassifier::new(Arc::clone(&models), separator)?;

    let trial = read_trial(trial, &config.ingest)?;
    let names = models.names();
    let log = create_shared_log_with_persistence(names.as_slice(), config.data_path.join("validation.json"));

    println!(
        "Classifying '{}' ({} samples, window {})",
        trial.name,
        trial.len(),
        models.window_size()
    );
    if trial.len() < models.window_size() {
        println!("Trial is shorter than the window; no sample will be classified.");
    }

    let every = every.max(1);
    let mut classified = 0usize;
    for (n, sample) in trial.samples.iter().enumerate() {
        let possibilities = classifier.push(*sample)?;
        if classifier.state() == StreamState::Filling {
            log.record_sample();
            continue;
        }

        log.record_classification(&possibilities);
        if classified % every == 0 {
            let scores: Vec<String> = names
                .iter()
                .zip(&possibilities)
                .map(|(name, p)| format!("{name}={p:.3}"))
                .collect();
            let best = classifier
                .best_match()
                .map(|(name, _)| name.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:>6}  {}  best: {}", n + 1, scores.join(" "), best);
        }
        classified += 1;
    }

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save validation log: {e}");
    }

    println!();
    println!("{}", log.summary());
    Ok(())
}

fn cmd_inspect(config: &Config, models: Option<PathBuf>) -> Result<()> {
    let (path, artifact) = load_artifact(config, models)?;

    println!("Model artifact {}", path.display());
    println!("==============");
    println!("  Version: {}", artifact.artifact_version);
    println!(
        "  Producer: {} {}",
        artifact.producer.name, artifact.producer.version
    );
    if let Some(ref id) = artifact.producer.instance_id {
        println!("  Instance ID: {id}");
    }
    println!("  Created: {}", artifact.created_at_utc);
    println!("  Filter delay: {}", artifact.filter_delay);
    println!();

    let diagnostics = artifact.diagnostics.clone().unwrap_or_default();
    let set = artifact.into_model_set()?;
    println!("Classes (window size {}):", set.window_size());
    for model in set.iter() {
        println!(
            "  {:<20} curve points: {:>4}  threshold: {:.4}",
            model.name,
            model.curve_len(),
            model.threshold
        );
        if let Some(diag) = diagnostics.iter().find(|d| d.class == model.name) {
            println!(
                "    gravity: K={} EM iterations={} converged={}",
                diag.gravity.components, diag.gravity.em_iterations, diag.gravity.em_converged
            );
            println!(
                "    body:    K={} EM iterations={} converged={}",
                diag.body.components, diag.body.em_iterations, diag.body.em_converged
            );
        }
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Configuration file: {}", Config::config_path().display());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
