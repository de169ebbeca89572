#![forbid(unsafe_code)]

//! Command-line argument parsing for the walkthrough.
//!
//! Parses args manually. Supports environment variable overrides via the
//! `LIVEBUS_DEMO_*` prefix; explicit flags win over the environment.

use std::env;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
livebus walkthrough

USAGE:
    livebus-demo [OPTIONS]

OPTIONS:
    --async-posts=N      Publishes issued by the background thread (default: 100)
    --log-json           Emit logs as JSON lines instead of compact text
    --quiet              Print only the final summary
    --help, -h           Show this help message
    --version, -V        Show version

ENVIRONMENT VARIABLES:
    LIVEBUS_DEMO_ASYNC_POSTS  Override --async-posts
    LIVEBUS_DEMO_LOG_JSON     Override --log-json (1/true to enable)
    LIVEBUS_ACTIVATION_STATE  Bus activation threshold (initialized|created|started|resumed)
    LIVEBUS_MAX_STATE_POLLS   Re-poll bound for changing liveness sources
    LIVEBUS_COMPACT_THRESHOLD Removed slots tolerated before compaction
    RUST_LOG                  Log filter (default: info)";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Number of background publishes.
    pub async_posts: u32,
    /// Use the JSON log formatter.
    pub log_json: bool,
    /// Suppress the transcript.
    pub quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            async_posts: 100,
            log_json: false,
            quiet: false,
        }
    }
}

fn is_enabled(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

impl Opts {
    /// Parse command-line arguments and environment variables, exiting on
    /// `--help`, `--version`, or invalid input.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(ParseError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(ParseError::Version) => {
                println!("livebus-demo {VERSION}");
                process::exit(0);
            }
            Err(ParseError::InvalidValue { flag, value }) => {
                eprintln!("Invalid {flag} value: {value}");
                process::exit(1);
            }
            Err(ParseError::UnknownArg(arg)) => {
                eprintln!("Unknown argument: {arg}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(val) = get_env("LIVEBUS_DEMO_ASYNC_POSTS")
            && let Ok(n) = val.trim().parse()
        {
            opts.async_posts = n;
        }
        if let Some(val) = get_env("LIVEBUS_DEMO_LOG_JSON") {
            opts.log_json = is_enabled(&val);
        }

        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "--help" | "-h" => return Err(ParseError::Help),
                "--version" | "-V" => return Err(ParseError::Version),
                "--log-json" => opts.log_json = true,
                "--quiet" => opts.quiet = true,
                other => {
                    if let Some(val) = other.strip_prefix("--async-posts=") {
                        opts.async_posts =
                            val.parse().map_err(|_| ParseError::InvalidValue {
                                flag: "--async-posts",
                                value: val.to_string(),
                            })?;
                    } else {
                        return Err(ParseError::UnknownArg(other.to_string()));
                    }
                }
            }
        }
        Ok(opts)
    }
}
