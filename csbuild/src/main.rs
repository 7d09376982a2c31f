#![deny(clippy::pedantic, unsafe_code)]

use clap::Parser;
use csbuild::config::BuildConfig;
use csbuild::errors::Result;
use csbuild::observability::{init_logging, LogFormat};
use csbuild::pipeline::{BuildTask, Pipeline};
use csbuild::platform::{Arch, Target};
use std::process::ExitCode;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "csbuild")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, package and watch code-server", long_about = None)]
struct Cli {
    /// Task to run: binary, package, build or watch
    task: Option<String>,

    /// Release target (darwin, alpine or linux); detected when unset
    #[arg(long, value_name = "TARGET")]
    target: Option<String>,

    /// Architecture label; detected when unset
    #[arg(long, value_name = "ARCH")]
    arch: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "CSBUILD_LOG_JSON")]
    log_json: bool,

    /// Arguments forwarded to the development server in watch mode
    #[arg(last = true)]
    server_args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging("info", format);

    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!(error = %e, "Build failed");
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let task = BuildTask::parse(cli.task.as_deref())?;
    let target = cli.target.as_deref().map(str::parse::<Target>).transpose()?;
    let arch = cli.arch.as_deref().map(str::parse::<Arch>).transpose()?;

    let root = std::env::current_dir()?;
    let config = BuildConfig::from_env(root)?.with_server_args(cli.server_args);
    tracing::debug!(config = ?config, "Loaded configuration");

    Pipeline::system(config, target, arch).run(task).await
}
