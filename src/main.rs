use anyhow::Result;

use course_ranking::cli::Command;
use course_ranking::{
    handle_completions, handle_import_catalog, handle_rank, handle_recompute, handle_serve,
    handle_stats, interpret, RankArgs,
};

fn main() {
    setup_logging();
    parse_and_execute().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
}

fn setup_logging() {
    sensible_env_logger::init!();
}

fn parse_and_execute() -> Result<()> {
    let command = interpret();
    execute_command(&command)
}

fn execute_command(command: &Command) -> Result<()> {
    match command {
        Command::Serve { port } => handle_serve(*port),
        Command::ImportCatalog { path } => handle_import_catalog(path),
        Command::Recompute => handle_recompute(),
        Command::Rank { region, area, degree, free, min_score, search, sort, page } => handle_rank(RankArgs {
            region: region.as_deref(),
            area: area.as_deref(),
            degree: degree.as_deref(),
            free: *free,
            min_score: *min_score,
            search: search.as_deref(),
            sort: *sort,
            page: *page,
        }),
        Command::Stats => handle_stats(),
        Command::Completions { shell } => handle_completions(*shell),
    }
}
