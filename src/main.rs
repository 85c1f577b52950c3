use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gapx::config::RunConfig;
use gapx::engines::generation::{GaController, LogProgressCallback};
use gapx::error::{GapxError, EXIT_RUN_FAILED};
use gapx::model::{CandidateUniverse, ModelBundle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the GA and write the manifest
    Run {
        #[arg(short, long)]
        config: PathBuf,

        /// Override `run.seed`
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Check a configuration and its model bundle without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,

        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { config, seed } => run(config, seed),
        Command::Validate { config, print } => validate(config, print),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            let code = err
                .downcast_ref::<GapxError>()
                .map_or(EXIT_RUN_FAILED, GapxError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

fn load(path: &Path, seed: Option<u64>) -> Result<(RunConfig, ModelBundle)> {
    let mut config = RunConfig::load_from_file(path)
        .with_context(|| format!("loading configuration {}", path.display()))?;
    if let Some(seed) = seed {
        config.run.seed = seed;
    }
    let bundle = ModelBundle::load_from_file(&config.model.bundle)
        .with_context(|| format!("loading model bundle {}", config.model.bundle.display()))?;
    Ok((config, bundle))
}

fn run(path: PathBuf, seed: Option<u64>) -> Result<ExitCode> {
    let (config, bundle) = load(&path, seed)?;
    let config = config.validate().context("validating configuration")?;
    let controller = GaController::from_bundle(config, &bundle)?;

    let cancel = controller.cancellation_token();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, finishing the current generation");
        cancel.cancel();
    })
    .context("installing interrupt handler")?;

    let outcome = controller.run(LogProgressCallback)?;

    println!("termination: {}", outcome.termination);
    println!("generations: {}", outcome.generations_completed);
    if let Some(best) = &outcome.best {
        let edits = best.genome.edits();
        println!("best fitness: {:.6}", best.result.fitness);
        println!("best growth: {:.6}", best.result.growth_rate);
        println!("added: {}", edits.added.join(", "));
        println!("removed: {}", edits.removed.join(", "));
        println!("genome: {}", best.genome.encode());
    }
    println!("manifest: {}", outcome.manifest_path.display());
    if let Some(path) = &outcome.best_model_path {
        println!("best model: {}", path.display());
    }

    Ok(ExitCode::from(outcome.exit_code() as u8))
}

fn validate(path: PathBuf, print: bool) -> Result<ExitCode> {
    let (config, bundle) = load(&path, None)?;
    if print {
        print!("{}", config.to_toml()?);
    }
    config.validate().context("validating configuration")?;
    let universe = CandidateUniverse::build(&bundle.model, &bundle.database)?;
    println!(
        "ok: model '{}' with {} genes ({} toggle-eligible), universe {}",
        bundle.model.id,
        universe.len(),
        universe.toggle_eligible_count(),
        universe.id().short()
    );
    Ok(ExitCode::SUCCESS)
}
