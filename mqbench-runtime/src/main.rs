use clap::Parser;
use mqbench_runtime::{BenchCli, BenchRuntime};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> ExitCode {
    let cli = BenchCli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    FmtSubscriber::builder().with_env_filter(filter).init();

    let runtime = match BenchRuntime::new().with_cli(&cli) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let res = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(runtime.worker_threads())
        .enable_all()
        .build()
        .map_err(Into::into)
        .and_then(|rt| rt.block_on(runtime.run()));

    match res {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
