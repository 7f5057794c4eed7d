use log::warn;

use crate::rating::CriterionWeights;

#[derive(Debug, Clone, Default)]
pub struct ScoringSettings {
    /// `None` means the composite is the plain mean of all criteria
    pub weights: Option<CriterionWeights>,
}

#[derive(Debug, Clone)]
pub struct RankingSettings {
    pub page_size: usize,
    pub featured_count: usize,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            featured_count: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub database_path: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    pub max_fold_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: "course_ranking.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 5_000,
            max_fold_attempts: 3,
            retry_backoff_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Bearer token for admin endpoints; admin endpoints are disabled when unset
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub scoring: ScoringSettings,
    pub ranking: RankingSettings,
    pub store: StoreSettings,
    pub server: ServerSettings,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `DATABASE_PATH`, `ADMIN_TOKEN`,
    /// `RANKING_PAGE_SIZE` and `SCORE_WEIGHTS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new();

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.store.database_path = path;
        }

        config.server.admin_token = std::env::var("ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        if config.server.admin_token.is_none() {
            warn!("ADMIN_TOKEN not set, admin endpoints are disabled");
        }

        if let Ok(size) = std::env::var("RANKING_PAGE_SIZE") {
            config.ranking.page_size = size
                .parse()
                .map_err(|_| anyhow::anyhow!("RANKING_PAGE_SIZE must be a positive integer, got '{}'", size))?;
        }

        if let Ok(spec) = std::env::var("SCORE_WEIGHTS") {
            let weights = CriterionWeights::parse(&spec)
                .map_err(|e| anyhow::anyhow!("Invalid SCORE_WEIGHTS: {}", e))?;
            config.scoring.weights = Some(weights);
        }

        Ok(config)
    }

    /// Point the store at a different database file
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.store.database_path = path.into();
        self
    }
}
