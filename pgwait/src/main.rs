//! Hold a service's startup until its PostgreSQL server accepts connections,
//! then exec the service.
use clap::Parser;
use envconfig::Envconfig;
use tracing::{error, info};

use pgwait::config::{Cli, Config};
use pgwait::error::{BootstrapError, ConfigError};
use pgwait::{exec, wait};

fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), BootstrapError> {
    let config = Config::init_from_env().map_err(ConfigError::from)?;
    let target = config.target(&cli.host)?;
    let policy = config.policy(cli.timeout);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(wait::wait_until_ready(&target, &policy))?;
    // Nothing of the runtime may survive into the exec'd image.
    drop(runtime);

    if cli.command.is_empty() {
        info!("server is up, no command to run");
        return Ok(());
    }

    info!(command = ?cli.command, "server is up, executing command");
    match exec::exec_command(&cli.command)? {}
}
