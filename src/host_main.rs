// This runs the host on windows without creating a console. The browser talks to it through
// stdin and stdout only.
#![windows_subsystem = "windows"]

use std::time::Duration;

use anyhow::Result;
use blackhole_debt::{
    background::{args::HostArgs, start_host},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use clap::Parser;
use tracing::{debug, error};

fn main() -> Result<()> {
    run(HostArgs::parse())
}

fn run(args: HostArgs) -> Result<()> {
    let check_interval = args.check_interval();
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(HOST_PREFIX, &app_dir.join("logs"), args.log, args.log_console)?;
    debug!("Launched with {:?}", args.browser_args);

    let runtime = single_thread_runtime()?;
    let result = runtime
        .block_on(async move { start_host(app_dir, check_interval).await })
        .inspect_err(|e| error!("Host failed {e:?}"));
    // Reading stdin parks a blocking thread that never returns on its own.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
