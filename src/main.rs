use crate::args::{Args, Config};
use crate::az::{AzCli, ProcessRunner};
use crate::prompt::TerminalPrompt;
use anyhow::Result;
use tracing::{debug, error, info, warn, Level};

mod args;
mod az;
mod cleanup;
mod prompt;

fn main() {
    let args = Args::new();
    configure_tracing(args.debug, args.trace);

    if args.dry_run {
        warn!("Dry run is enabled. No images will be deleted!");
    }

    let start = std::time::Instant::now();

    if let Err(e) = process(&args) {
        error!("{e:#}");
        std::process::exit(1);
    }

    let delta = time::Duration::try_from(start.elapsed()).unwrap_or(time::Duration::MAX);
    info!("Done. Took {}", fmt_duration(delta));
}

fn fmt_duration(duration: time::Duration) -> String {
    if duration.whole_seconds() > 0 {
        format!("{}s", duration.whole_seconds())
    } else if duration.whole_milliseconds() > 0 {
        format!("{}ms", duration.whole_milliseconds())
    } else {
        format!("{}µs", duration.whole_microseconds())
    }
}

fn process(args: &Args) -> Result<()> {
    info!(
        "The script arguments are as follow. resource_group={:?} registry={:?} repositories={:?}",
        args.resource_group, args.registry, args.repositories
    );
    let config = Config::from_args(args)?;

    warn!("The script requires you to be already logged in with the subscription you want to manage!");

    let mut az = AzCli::new(
        ProcessRunner::new(&args.az),
        &config.resource_group,
        &config.registry,
    );
    let stdin = std::io::stdin();
    let mut prompt = TerminalPrompt::new(stdin.lock(), std::io::stdout());

    let summary = cleanup::run(&config, &mut az, &mut prompt, args.dry_run)?;
    debug!(
        "Removed {} images, reclaimed {:?} bytes",
        summary.removed, summary.reclaimed_bytes
    );
    Ok(())
}

fn configure_tracing(debug: bool, trace: bool) {
    let level = if trace {
        Level::TRACE
    } else if debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Setting tracing subscriber");
}
