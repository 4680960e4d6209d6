//! Binary entry point for the `kitchen-linode` CLI.
//!
//! Acts as a minimal host for the driver: it loads configuration, loads and
//! persists the state file, and reports failures with a non-zero exit code.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kitchen_linode::{
    DriverError, Entropy, ErrorCategory, HostIdentity, HttpLinodeApi, InstanceState,
    LinodeConfig, LinodeDriver, SshTransport, StateFile, TokioSleeper, TracingLogSink,
    config::job_name_from_env,
};

mod cli;

use cli::{Cli, InstanceArgs, ShellType};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("state file error: {0}")]
    State(String),
    #[error("invalid path: {0}")]
    Path(String),
    #[error("{0}")]
    Driver(#[from] DriverError),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Driver(err) if matches!(err.category(), ErrorCategory::UserError) => 2,
            Self::Config(_) | Self::Path(_) => 2,
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Create(args) => create(args).await,
        Cli::Destroy(args) => destroy(args).await,
    }
}

async fn create(args: InstanceArgs) -> Result<(), CliError> {
    let state_file = state_file(&args)?;
    let mut state = load_state(&state_file)?;
    let config = load_config()?;
    let identity = host_identity(&args)?;
    let spec = config
        .to_spec(&identity)
        .map_err(|err| CliError::Config(err.to_string()))?;

    let driver = build_driver(&config)?;
    let outcome = driver.create(&spec, &mut state).await;
    // An instance that was created but never became ready must still be
    // destroyable on the next run.
    save_state(&state_file, &state)?;
    outcome.map_err(CliError::from)
}

async fn destroy(args: InstanceArgs) -> Result<(), CliError> {
    let state_file = state_file(&args)?;
    let mut state = load_state(&state_file)?;
    let config = load_config()?;

    let driver = build_driver(&config)?;
    let outcome = driver.destroy(config.retry_policy(), &mut state).await;
    save_state(&state_file, &state)?;
    outcome.map_err(CliError::from)
}

fn load_config() -> Result<LinodeConfig, CliError> {
    let config =
        LinodeConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(config)
}

type Driver = LinodeDriver<
    HttpLinodeApi,
    SshTransport<kitchen_linode::transport::ProcessCommandRunner>,
    TracingLogSink,
    TokioSleeper,
>;

fn build_driver(config: &LinodeConfig) -> Result<Driver, CliError> {
    let api = HttpLinodeApi::new(config.token.clone())
        .map_err(|err| CliError::Config(err.to_string()))?
        .with_base_url(config.api_base_url.clone());
    Ok(LinodeDriver::new(
        api,
        SshTransport::with_process_runner(),
        TracingLogSink,
        TokioSleeper,
        Entropy::from_os(),
    ))
}

fn host_identity(args: &InstanceArgs) -> Result<HostIdentity, CliError> {
    let kitchen_root = args
        .kitchen_root
        .clone()
        .map(utf8_path)
        .transpose()?;
    let platform = args
        .platform
        .clone()
        .unwrap_or_else(|| args.instance.clone());
    Ok(HostIdentity::new(args.instance.clone(), platform)
        .with_kitchen_root(kitchen_root)
        .with_job_name(job_name_from_env())
        .with_bourne_shell(args.shell == ShellType::Bourne))
}

fn state_file(args: &InstanceArgs) -> Result<StateFile, CliError> {
    utf8_path(args.state.clone()).map(StateFile::new)
}

fn utf8_path(path: std::path::PathBuf) -> Result<Utf8PathBuf, CliError> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| CliError::Path(path.display().to_string()))
}

fn load_state(file: &StateFile) -> Result<InstanceState, CliError> {
    file.load().map_err(|err| CliError::State(err.to_string()))
}

fn save_state(file: &StateFile, state: &InstanceState) -> Result<(), CliError> {
    file.save(state)
        .map_err(|err| CliError::State(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
