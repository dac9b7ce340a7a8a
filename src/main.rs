use clap::{Parser, Subcommand};
use colored::Colorize;
use dotenv::dotenv;
use log::{error, info, LevelFilter};

use gitlab_size_report::config::Config;
use gitlab_size_report::runner::{self, DiffOptions, Thresholds};

#[derive(Parser)]
#[command(name = "gitlab-size-report", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compares the file size of the targeted files and reports changes to your merge request / CI pipeline
    Diff {
        /// The file path patterns to diff
        #[arg(value_name = "file-path-pattern", required = true)]
        file_patterns: Vec<String>,

        /// The GitLab access token used to communicate with the API of your GitLab instance
        #[arg(long, value_name = "token")]
        auth: String,

        /// The file path where the size report will be written to
        #[arg(long, value_name = "file-path")]
        out_file: String,

        /// Optional list of reporters to execute after computing the results
        #[arg(long, value_name = "reporter-id", num_args = 1..)]
        reporters: Option<Vec<String>>,

        /// An optional size each file should respect, e.g. "200 KiB"; if exceeded the run fails
        #[arg(long, value_name = "size")]
        threshold: Option<String>,

        /// An optional size for the sum of all files; if exceeded the run fails
        #[arg(long, value_name = "size")]
        threshold_overall: Option<String>,

        /// Silence all log output
        #[arg(long)]
        silent: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Diff {
            file_patterns,
            auth,
            out_file,
            reporters,
            threshold,
            threshold_overall,
            silent,
        } => {
            init_logger(silent);

            let version = env!("CARGO_PKG_VERSION");
            info!("{}", format!("Starting gitlab-size-report {}", version).green());

            let config = match Config::from_env() {
                Ok(config) => config,
                Err(err) => {
                    error!("{}", format!("Invalid CI environment: {:#}", err).red());
                    std::process::exit(1);
                }
            };

            let options = DiffOptions {
                file_patterns,
                out_file,
                auth,
                reporters: reporters.unwrap_or_else(runner::default_reporters),
                thresholds: Thresholds {
                    each: threshold,
                    overall: threshold_overall,
                },
            };

            if let Err(err) = runner::diff(options, &config).await {
                error!("{}", format!("{:#}", err).red());
                std::process::exit(1);
            }
        }
    }
}

fn init_logger(silent: bool) {
    if silent {
        env_logger::Builder::new().filter_level(LevelFilter::Off).init();
    } else {
        env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    }
}
