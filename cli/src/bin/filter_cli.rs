use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use filter_cli::{CliError, RunSettings};
use filter_pipeline::{
    FilterRegistry, MessageCollector, PipelineObserver, RunOutcome, TracingObserver, io, runner,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Validate and run filter pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preflight and execute a pipeline file
    Run {
        /// Pipeline file (.json or .toml)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Run settings file (.json or .toml)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Data snapshot to start from
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Directory relative output files are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Write the final data context to this file
        #[arg(long)]
        save_data: Option<PathBuf>,

        /// Execute without preflighting first
        #[arg(long)]
        skip_preflight: bool,

        /// Execute even when the preflight reports errors
        #[arg(long)]
        force: bool,
    },
    /// Validate a pipeline file without running it
    Preflight {
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Data snapshot to validate against
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// List the filters a pipeline file can use
    ListFilters {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the parameter schema of a filter
    Schema {
        /// Filter class name, e.g. CreateDataArray
        name: String,
    },
    /// Rewrite a pipeline file in another format
    Convert {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let mut settings = match &cli.command {
        Commands::Run { settings: Some(path), .. } => RunSettings::from_file(path)?,
        _ => RunSettings::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)))
        .init();

    let registry = FilterRegistry::with_core_filters();

    match cli.command {
        Commands::Run {
            pipeline,
            seed,
            output_dir,
            save_data,
            skip_preflight,
            force,
            ..
        } => {
            if seed.is_some() {
                settings.seed_file = seed;
            }
            if output_dir.is_some() {
                settings.output_dir = output_dir;
            }
            if save_data.is_some() {
                settings.save_data_to = save_data;
            }
            if skip_preflight {
                settings.preflight_first = false;
            }
            if force {
                settings.stop_on_preflight_errors = false;
            }
            run(&pipeline, &settings, &registry).await?;
        }
        Commands::Preflight { pipeline, seed } => {
            settings.seed_file = seed;
            preflight(&pipeline, &settings, &registry)?;
        }
        Commands::ListFilters { json } => {
            let filters = registry.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&filters)?);
            } else {
                for group in registry.groups() {
                    println!("{}", group);
                    for filter in filters.iter().filter(|f| f.group == group) {
                        println!("  {:<24} {:<28} {}", filter.name, filter.human_label, filter.sub_group);
                    }
                }
            }
        }
        Commands::Schema { name } => {
            let schema = registry.schema(&name)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Convert { input, output } => {
            let pipeline = io::load_pipeline(&input, &registry)?;
            io::save_pipeline(&pipeline, &output)?;
            info!("Converted {} -> {}", input.display(), output.display());
        }
    }

    Ok(())
}

fn preflight(path: &Path, settings: &RunSettings, registry: &FilterRegistry) -> Result<(), CliError> {
    let mut pipeline = settings.load_pipeline(path, registry)?;
    pipeline.add_observer(TracingObserver);
    let report = pipeline.preflight_with(&settings.load_seed()?);

    for (index, node) in pipeline.iter().enumerate() {
        let status = if !node.is_enabled() {
            "disabled".to_string()
        } else if node.error_code() < 0 {
            format!("error {}", node.error_code())
        } else if node.warning_code() < 0 {
            format!("warning {}", node.warning_code())
        } else {
            "ok".to_string()
        };
        println!("{:>3}  {:<32} {}", index, node.human_label(), status);
    }
    println!("{} error(s), {} warning(s)", report.error_count, report.warning_count);

    if report.is_ok() {
        Ok(())
    } else {
        Err(CliError::PreflightFailed(report.error_count))
    }
}

async fn run(path: &Path, settings: &RunSettings, registry: &FilterRegistry) -> Result<(), CliError> {
    let mut pipeline = settings.load_pipeline(path, registry)?;
    let data = settings.load_seed()?;

    let mut tracer = TracingObserver;

    if settings.preflight_first {
        let collector = MessageCollector::new();
        pipeline.add_observer(collector.clone());
        let report = pipeline.preflight_with(&data);
        pipeline.pop_observer();
        for message in collector.errors().iter().chain(collector.warnings().iter()) {
            tracer.on_message(message);
        }
        info!(errors = report.error_count, warnings = report.warning_count, "Preflight finished");
        if !report.is_ok() {
            if settings.stop_on_preflight_errors {
                return Err(CliError::PreflightFailed(report.error_count));
            }
            warn!("Executing despite preflight errors");
        }
    }

    info!("Running pipeline '{}' ({} filters)", pipeline.name(), pipeline.len());
    let mut handle = runner::spawn(pipeline, data)?;
    let canceller = handle.canceller();
    let mut cancelling = false;

    loop {
        tokio::select! {
            message = handle.next_message() => match message {
                Some(message) => tracer.on_message(&message),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                warn!("Cancelling pipeline");
                if let Err(e) = canceller.cancel() {
                    warn!(error = %e, "Could not cancel pipeline");
                }
                cancelling = true;
            }
        }
    }

    let completed = handle.wait().await?;
    match completed.outcome {
        RunOutcome::Completed => info!("Pipeline completed"),
        RunOutcome::Cancelled { .. } => warn!("Pipeline {}", completed.outcome),
        RunOutcome::Failed { .. } => return Err(CliError::RunFailed(completed.outcome.to_string())),
    }

    if let Some(target) = &settings.save_data_to {
        completed.data.to_json_file(target)?;
        info!("Data written to {}", target.display());
    }
    Ok(())
}
