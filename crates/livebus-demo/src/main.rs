#![forbid(unsafe_code)]

//! livebus walkthrough binary entry point.

use livebus_demo::cli;
use livebus_demo::walkthrough;
use livebus_runtime::BusConfig;
use tracing_subscriber::EnvFilter;

fn init_logging(json: bool) {
    if json && livebus_core::logging::init_json_subscriber() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init();
}

fn main() {
    let opts = cli::Opts::parse();
    init_logging(opts.log_json);

    match walkthrough::run(BusConfig::from_env(), opts.async_posts) {
        Ok(summary) => {
            if !opts.quiet {
                for line in &summary.lines {
                    println!("{line}");
                }
            }
            println!(
                "greeting at {}, progress at {}, {} greeting subscriber(s) left",
                summary.greeting_version, summary.progress_version, summary.greeting_subscribers
            );
        }
        Err(e) => {
            eprintln!("Walkthrough failed: {e}");
            std::process::exit(1);
        }
    }
}
