//! basalt CLI - inspect and run serialized models.

mod inspect;

use anyhow::{Context, Result};
use basalt_core::Accelerator;
use basalt_runtime::{DeviceKind, Runtime, RuntimeConfig, Tensor};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "basalt")]
#[command(about = "Compile and run neural-network inference graphs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a model's tensors, nodes and resolved edges
    Inspect {
        /// Path to the model JSON file
        #[arg(value_name = "MODEL")]
        model: PathBuf,
    },
    /// Run a model once with every input filled with one value
    Run {
        /// Path to the model JSON file
        #[arg(value_name = "MODEL")]
        model: PathBuf,

        /// Value written to every input element
        #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
        fill: f64,

        /// Device to run on
        #[arg(long, value_enum, default_value = "host")]
        device: DeviceArg,

        /// Submission timeout in milliseconds (0 waits forever)
        #[arg(long, value_name = "MS", default_value = "30000")]
        timeout_ms: u64,

        /// Inputs combined per dispatch by variadic operators
        #[arg(long, value_name = "N", default_value = "4")]
        fan_in: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DeviceArg {
    Host,
    Gpu,
}

impl From<DeviceArg> for DeviceKind {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Host => DeviceKind::Host,
            DeviceArg::Gpu => DeviceKind::Gpu,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { model } => {
            inspect::inspect_model(&model)?;
        }
        Commands::Run {
            model,
            fill,
            device,
            timeout_ms,
            fan_in,
        } => {
            let config = RuntimeConfig::default()
                .with_device(device.into())
                .with_device_timeout((timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)))
                .with_max_variadic_fan_in(fan_in);
            cmd_run(&model, fill, config)?;
        }
    }

    Ok(())
}

/// Compile, fill the inputs with `fill`, run once and print the outputs.
fn cmd_run(model_path: &Path, fill: f64, config: RuntimeConfig) -> Result<()> {
    let model = basalt_model::load_model(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))?;

    let runtime = Runtime::new(config).context("Failed to initialize device")?;
    println!("Device: {}", runtime.device().name());

    let mut instance = runtime
        .load_model(&model)
        .with_context(|| format!("Failed to load model '{}'", model.metadata.name))?;
    let graph = instance.graph().context("Model instance is not configured")?;

    let inputs = graph
        .model_inputs()
        .iter()
        .map(|&i| {
            let tensor = &graph.tensors()[i];
            Tensor::filled(tensor.dtype, &tensor.shape, fill)
                .with_context(|| format!("Cannot fill input '{}'", tensor.name))
        })
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<String> = graph
        .model_outputs()
        .iter()
        .map(|&i| graph.tensors()[i].name.clone())
        .collect();

    let shapes: Vec<&[usize]> = inputs.iter().map(|t| t.shape()).collect();
    instance.set_input_shapes(&shapes)?;
    let outputs = instance.run_tensors(&inputs).context("Run failed")?;
    tracing::info!(outputs = outputs.len(), "run complete");

    for (name, output) in names.iter().zip(&outputs) {
        println!("{} {:?} {:?}:", name, output.dtype(), output.shape());
        println!("  {:?}", output.to_f64_vec()?);
    }
    Ok(())
}
