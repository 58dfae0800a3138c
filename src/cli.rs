//! Command-line interface definitions.
//!
//! Two subcommands are exposed:
//! - `grab`: build queues for one or more sites, grab them, and write XMLTV guides
//! - `load`: download the reference data (channel catalog and lookup tables)
//!
//! The base directory and the reference date can be supplied through the
//! `BASE_DIR` and `CURR_DATE` environment variables.

use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_MS};
use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the EPG grabber.
///
/// # Examples
///
/// ```sh
/// # Grab one site into the default guides/{lang}/<site>.xml layout
/// epg_grab grab --site example.com
///
/// # Two sites, three concurrent jobs, gzip copies, every six hours
/// epg_grab grab --site alpha.tv,beta.tv --gzip --cron "0 */6 * * *"
///
/// # Refresh the channel catalog
/// epg_grab load
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Root directory for sites/, guides/ and tmp/data/
    #[arg(long, env = "BASE_DIR", default_value = ".", global = true)]
    pub base_dir: String,

    /// Override the current date (RFC 3339 or YYYY-MM-DD)
    #[arg(long, env = "CURR_DATE", global = true)]
    pub curr_date: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Grab program guides for the given sites
    Grab(GrabArgs),
    /// Download reference data used to enrich channels
    Load,
}

#[derive(Args, Debug)]
pub struct GrabArgs {
    /// Site name(s) to grab, comma separated without spaces
    #[arg(short, long)]
    pub site: String,

    /// Only grab channels in this language
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Output path template(s), comma separated, in the same order as the sites
    #[arg(short, long)]
    pub output: Option<String>,

    /// Cron expression to run the grab on a schedule
    #[arg(long)]
    pub cron: Option<String>,

    /// Number of sites grabbed concurrently
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Also write a gzip-compressed copy of each guide
    #[arg(long)]
    pub gzip: bool,

    /// Per-channel-day grab timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_grab_parsing() {
        let cli = Cli::parse_from([
            "epg_grab",
            "--base-dir",
            "/srv/epg",
            "grab",
            "--site",
            "alpha.tv,beta.tv",
            "--lang",
            "en",
            "--gzip",
        ]);

        assert_eq!(cli.base_dir, "/srv/epg");
        match cli.command {
            Command::Grab(args) => {
                assert_eq!(args.site, "alpha.tv,beta.tv");
                assert_eq!(args.lang.as_deref(), Some("en"));
                assert!(args.gzip);
                assert_eq!(args.concurrency, 3);
                assert!(args.cron.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "epg_grab", "grab", "-s", "alpha.tv", "-c", "5", "-o", "out.xml",
        ]);

        match cli.command {
            Command::Grab(args) => {
                assert_eq!(args.concurrency, 5);
                assert_eq!(args.output.as_deref(), Some("out.xml"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_load() {
        let cli = Cli::parse_from(["epg_grab", "load"]);
        assert!(matches!(cli.command, Command::Load));
    }
}
