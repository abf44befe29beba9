pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::cli::commands::CrawlOverrides;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the configuration comes from
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigSource {
    /// Named configuration profile
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Explicit configuration file (takes precedence over --profile)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every pending note of every category
    Crawl {
        #[command(flatten)]
        source: ConfigSource,

        /// Directory whose subdirectories hold the search-result manifests
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Directory that receives the fetched records
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Attempts per note before giving up
        #[arg(short, long)]
        retries: Option<u32>,

        /// Lower bound of the delay before each request, in seconds
        #[arg(long)]
        min_delay: Option<f64>,

        /// Upper bound of the delay before each request, in seconds
        #[arg(long)]
        max_delay: Option<f64>,

        /// Show the signing browser window
        #[arg(long)]
        headed: bool,
    },

    /// Show discovered, fetched and pending counts per category
    Status {
        #[command(flatten)]
        source: ConfigSource,

        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a manifest from raw search-result exports
    Extract {
        /// Directory of exported search-result JSON files
        #[arg(required = true)]
        input_dir: PathBuf,

        /// Manifest file to write
        #[arg(short, long, default_value = "export/manifest.json")]
        output: PathBuf,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to show, or create with defaults
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl { source, input, output, retries, min_delay, max_delay, headed } => {
            let overrides = CrawlOverrides { input, output, retries, min_delay, max_delay, headed };
            let config = commands::load_config(&source)?;
            commands::crawl(overrides.apply(config)).await
        },
        Commands::Status { source, input, output } => {
            let overrides = CrawlOverrides { input, output, ..Default::default() };
            let config = commands::load_config(&source)?;
            commands::status(overrides.apply(config)).await
        },
        Commands::Extract { input_dir, output } => {
            info!("Extracting note ids from {}", input_dir.display());
            commands::extract(&input_dir, &output).await
        },
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles()
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(&profile_name)
            } else {
                info!("Showing current configuration");
                commands::show_config()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_parse_crawl_flags() {
        let cli = Cli::try_parse_from([
            "harvester", "crawl", "--profile", "cafes", "-i", "in", "--retries", "10", "--min-delay", "1.5", "--headed", "-v",
        ]).unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Crawl { source, input, retries, min_delay, max_delay, headed, .. } => {
                assert_eq!(source.profile.as_deref(), Some("cafes"));
                assert_eq!(input, Some(PathBuf::from("in")));
                assert_eq!(retries, Some(10));
                assert_eq!(min_delay, Some(1.5));
                assert_eq!(max_delay, None);
                assert!(headed);
            },
            _ => panic!("expected crawl command"),
        }
    }
}
