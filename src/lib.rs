pub mod config;
pub mod models;

mod league_scraper;
mod leagues;
mod match_report_scraper;
mod match_store;
mod memory_store;
mod pg_store;
mod pipeline;
mod player_store;
mod points_engine;
mod pricing_engine;
mod ratelimit;
mod requests;
mod scheduler;
mod scrape_error;
mod scraping_context;
mod source_session;
mod text_manipulators;
mod utils;

pub use config::{AppConfig, MarketConfig, PointsConfig, ScrapingConfig};
pub use league_scraper::{LeagueScraper, extract_league_matches};
pub use leagues::{LeagueConfig, default_leagues, load_leagues, parse_leagues};
pub use match_report_scraper::{
    MatchReportScraper, ScrapedReport, extract_player_stats, scrape_reports_batch,
};
pub use match_store::{INTERRUPTED_ERROR, MatchStore};
pub use memory_store::MemoryStore;
pub use pg_store::PgStore;
pub use pipeline::{Pipeline, RunSummary, StageSummary, group_by_gameweek};
pub use player_store::PlayerStore;
pub use points_engine::{PointsEngine, calculate_gameweek_points, guess_position};
pub use pricing_engine::{compute_price, update_price};
pub use scheduler::{parse_schedule, run_scheduled};
pub use scrape_error::ScrapeError;
pub use scraping_context::ScrapingContext;
pub use source_session::{Fetcher, SourceSession};
