use colored::Colorize;

use crate::database::DashboardStats;
use crate::ranking::RankingPage;

/// Format a ranking page as one line per course
pub fn format_ranking(page: &RankingPage) -> String {
    if page.items.is_empty() {
        return "No ranked courses match.".to_string();
    }

    let mut lines: Vec<String> = page
        .items
        .iter()
        .map(|ranked| {
            let entry = &ranked.entry;
            let degree = entry.degree.map(|d| format!(" ({})", d)).unwrap_or_default();
            let region = entry.region.as_deref().unwrap_or("--");
            format!(
                "{:>4}. {} {} | {}{} | {} | {} reviews",
                ranked.rank,
                format!("{:.2}", entry.score).green().bold(),
                entry.course.bold(),
                entry.university,
                degree,
                region.cyan(),
                entry.review_count
            )
        })
        .collect();

    lines.push(format!(
        "Page {}/{} ({} courses)",
        page.page,
        page.total_pages.max(1),
        page.total
    ));
    lines.join("\n")
}

pub fn format_stats(stats: &DashboardStats) -> String {
    let mut lines = vec![
        format!("{} {}", "Reviews:".bold(), stats.total_reviews),
        format!("{} {}", "Ranked courses:".bold(), stats.ranked_courses),
        format!("{} {}", "Catalog courses:".bold(), stats.catalog_courses),
    ];

    for mean in &stats.criterion_means {
        let value = match mean.mean {
            Some(mean) => format!("{:.2}", mean).green().to_string(),
            None => "no reviews yet".dimmed().to_string(),
        };
        lines.push(format!("  {:<15} {}", mean.criterion.as_str(), value));
    }

    if let Some(share) = stats.recommend_percentage {
        lines.push(format!("{} {:.1}%", "Would recommend:".bold(), share));
    }
    lines.join("\n")
}
