pub mod settings;

pub use settings::{AppConfig, RankingSettings, ScoringSettings, ServerSettings, StoreSettings};
