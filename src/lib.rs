pub mod api;
pub mod cli;
pub mod config;
pub mod database;
pub mod domain;
pub mod errors;
pub mod output;
pub mod pagination;
pub mod ranking;
pub mod rating;
pub mod services;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use cli::Cli;
use std::path::Path;

use crate::cli::Command;
use crate::config::AppConfig;
use crate::domain::Degree;
use crate::ranking::{RankingFilter, SortKey};
use crate::services::catalog;
use crate::services::reviews::ReviewService;
use crate::services::server::ServerService;

pub fn interpret() -> Command {
    let cli = Cli::parse();
    cli.command
}

pub fn handle_serve(port: u16) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = AppConfig::from_env()?;
        let service = ServerService::new(port, config);
        service.run().await
    })
}

pub fn handle_import_catalog(path: &Path) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let service = ReviewService::open(AppConfig::from_env()?)?;
        let imported = catalog::import_catalog(&service, path).await?;
        println!("Imported {} courses", imported);
        Ok(())
    })
}

pub fn handle_recompute() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let service = ReviewService::open(AppConfig::from_env()?)?;
        let recomputed = service.recompute_all().await?;
        println!("Recomputed {} course aggregates", recomputed);
        Ok(())
    })
}

pub struct RankArgs<'a> {
    pub region: Option<&'a str>,
    pub area: Option<&'a str>,
    pub degree: Option<&'a str>,
    pub free: bool,
    pub min_score: Option<f64>,
    pub search: Option<&'a str>,
    pub sort: SortKey,
    pub page: usize,
}

pub fn handle_rank(args: RankArgs<'_>) -> Result<()> {
    let degree = args
        .degree
        .map(|d| Degree::parse(d).with_context(|| format!("Unknown degree '{}'", d)))
        .transpose()?;
    let filter = RankingFilter {
        region: args.region.map(str::to_string),
        area: args.area.map(str::to_string),
        degree,
        is_free: args.free.then_some(true),
        min_score: args.min_score,
        text_search: args.search.map(str::to_string),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let service = ReviewService::open(AppConfig::from_env()?)?;
        let page = service.rank(filter, args.sort, args.page).await?;
        println!("{}", output::format_ranking(&page));
        Ok(())
    })
}

pub fn handle_stats() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let service = ReviewService::open(AppConfig::from_env()?)?;
        let stats = service.stats().await?;
        println!("{}", output::format_stats(&stats));
        Ok(())
    })
}

pub fn handle_completions(shell: Shell) -> Result<()> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
    Ok(())
}
