use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::ranking::SortKey;

#[derive(Parser, Debug)]
#[command(author, version, about = "Course review and ranking backend")]
pub struct Cli {
    /// Command
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Start the backend server
    Serve {
        /// Port number (optional, defaults to 3000)
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Import course metadata from a census JSON export
    ImportCatalog {
        /// Path to the JSON file
        path: PathBuf,
    },
    /// Rebuild every course aggregate from the stored reviews
    Recompute,
    /// Print the course ranking
    Rank {
        /// State code, e.g. SP
        #[arg(long)]
        region: Option<String>,
        /// General knowledge area
        #[arg(long)]
        area: Option<String>,
        /// bachelor, licentiate or technologist
        #[arg(long)]
        degree: Option<String>,
        /// Only free courses
        #[arg(long)]
        free: bool,
        /// Minimum composite score
        #[arg(long)]
        min_score: Option<f64>,
        /// Substring of university, course or campus
        #[arg(long)]
        search: Option<String>,
        /// score, reviews or name
        #[arg(long, default_value = "score")]
        sort: SortKey,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Print review statistics
    Stats,
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rank_arguments() {
        let cli = Cli::parse_from(["course_ranking", "rank", "--region", "SP", "--min-score", "4", "--sort", "reviews", "--free"]);
        match cli.command {
            Command::Rank { region, min_score, sort, free, page, .. } => {
                assert_eq!(region.as_deref(), Some("SP"));
                assert_eq!(min_score, Some(4.0));
                assert_eq!(sort, SortKey::ByReviewCountDesc);
                assert!(free);
                assert_eq!(page, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_import_catalog() {
        let cli = Cli::parse_from(["course_ranking", "import-catalog", "cursos.json"]);
        assert_eq!(cli.command, Command::ImportCatalog { path: PathBuf::from("cursos.json") });
    }
}
