//! SkillPath simulator: replays a synthetic learner population against the
//! contextual-bandit recommender and the baseline recommenders.

mod baselines;
mod simulation;

use anyhow::Context;
use clap::Parser;
use skillpath_bandit::SkillRecommender;
use skillpath_core::{AppConfig, Policy, SkillCatalog};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "skillpath-sim")]
#[command(about = "Compare the skill recommender against baseline strategies")]
#[command(version)]
struct Cli {
    /// Config file (TOML/JSON); environment variables still apply on top
    #[arg(long, env = "SKILLPATH_CONFIG")]
    config: Option<PathBuf>,

    /// Skill catalog file (overrides config)
    #[arg(long, env = "SKILLPATH__CATALOG_PATH")]
    catalog: Option<PathBuf>,

    /// Scoring policy: linucb, thompson, neural, or ensemble (overrides config)
    #[arg(long)]
    policy: Option<Policy>,

    /// Number of synthetic learners (overrides config)
    #[arg(long)]
    learners: Option<usize>,

    /// Recommendation rounds per learner (overrides config)
    #[arg(long)]
    rounds: Option<usize>,

    /// Seed for the engine and the simulated population
    #[arg(long)]
    seed: Option<u64>,

    /// Write the engine's learned state here when the run finishes
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Print the report as JSON instead of a table
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillpath=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(policy) = cli.policy {
        config.bandit.policy = policy;
    }
    if let Some(learners) = cli.learners {
        config.simulation.learners = learners;
    }
    if let Some(rounds) = cli.rounds {
        config.simulation.rounds = rounds;
    }
    if cli.seed.is_some() {
        config.bandit.seed = cli.seed;
    }
    let catalog_path = cli
        .catalog
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.catalog_path));

    info!(
        policy = config.bandit.policy.as_str(),
        catalog = %catalog_path.display(),
        learners = config.simulation.learners,
        rounds = config.simulation.rounds,
        "Configuration loaded"
    );

    let catalog = SkillCatalog::from_file(&catalog_path)
        .with_context(|| format!("loading catalog from {}", catalog_path.display()))?;
    let engine = SkillRecommender::new(catalog, config.bandit.clone())?;

    let seed = config.bandit.seed.unwrap_or_else(rand::random);
    let mut simulator = simulation::Simulator::new(engine, config.simulation.noise, seed)?;
    let report = simulator.run(config.simulation.learners, config.simulation.rounds)?;

    if let Some(path) = &cli.snapshot_out {
        let snapshot = simulator.engine().snapshot();
        std::fs::write(path, snapshot.to_json()?)
            .with_context(|| format!("writing snapshot to {}", path.display()))?;
        info!(path = %path.display(), "Snapshot written");
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "policy={} learners={} rounds={} noise={}",
            report.policy.as_str(),
            report.learners,
            report.rounds,
            report.noise
        );
        println!(
            "{:<18} {:>10} {:>12} {:>14} {:>14}",
            "method", "decisions", "mean_reward", "cumulative", "regret"
        );
        for method in &report.methods {
            println!(
                "{:<18} {:>10} {:>12.4} {:>14.2} {:>14.2}",
                method.method,
                method.decisions,
                method.mean_reward,
                method.cumulative_reward,
                method.cumulative_regret
            );
        }
    }

    let engine_name = format!("engine:{}", report.policy.as_str());
    if let (Some(engine), Some(random)) = (report.method(&engine_name), report.method("random")) {
        info!(
            engine_regret = engine.cumulative_regret,
            random_regret = random.cumulative_regret,
            "Regret versus random baseline"
        );
    }

    if let Some(weights) = simulator.engine().ensemble_weights() {
        for (variant, weight) in weights {
            info!(variant = variant.as_str(), weight, "Final ensemble weight");
        }
    }

    info!("Simulation complete");
    Ok(())
}
