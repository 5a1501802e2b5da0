use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

use crate::models::PositionTable;

/// Points knobs as they appear in the environment, one flat variable each.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PointsEnv {
    points_for_playing: i32,
    points_per_goal: i32,
    points_per_assist: i32,
    points_yellow_card: i32,
    points_red_card: i32,
    goal_bonus_goalkeeper: i32,
    goal_bonus_defender: i32,
    goal_bonus_midfielder: i32,
    goal_bonus_forward: i32,
    clean_sheet_goalkeeper: i32,
    clean_sheet_defender: i32,
    clean_sheet_midfielder: i32,
    clean_sheet_forward: i32,
}

impl Default for PointsEnv {
    fn default() -> Self {
        Self {
            points_for_playing: 2,
            points_per_goal: 4,
            points_per_assist: 3,
            points_yellow_card: -1,
            points_red_card: -3,
            goal_bonus_goalkeeper: 8,
            goal_bonus_defender: 6,
            goal_bonus_midfielder: 2,
            goal_bonus_forward: 0,
            clean_sheet_goalkeeper: 5,
            clean_sheet_defender: 4,
            clean_sheet_midfielder: 1,
            clean_sheet_forward: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsConfig {
    pub playing: i32,
    pub goal: i32,
    pub assist: i32,
    /// Negative: a penalty per card.
    pub yellow_card: i32,
    pub red_card: i32,
    pub goal_bonus: PositionTable<i32>,
    pub clean_sheet: PositionTable<i32>,
}

impl From<PointsEnv> for PointsConfig {
    fn from(env: PointsEnv) -> Self {
        Self {
            playing: env.points_for_playing,
            goal: env.points_per_goal,
            assist: env.points_per_assist,
            yellow_card: env.points_yellow_card,
            red_card: env.points_red_card,
            goal_bonus: PositionTable {
                goalkeeper: env.goal_bonus_goalkeeper,
                defender: env.goal_bonus_defender,
                midfielder: env.goal_bonus_midfielder,
                forward: env.goal_bonus_forward,
            },
            clean_sheet: PositionTable {
                goalkeeper: env.clean_sheet_goalkeeper,
                defender: env.clean_sheet_defender,
                midfielder: env.clean_sheet_midfielder,
                forward: env.clean_sheet_forward,
            },
        }
    }
}

impl Default for PointsConfig {
    fn default() -> Self {
        PointsEnv::default().into()
    }
}

/// Market knobs. Field names double as the env var names.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Not used by the pipeline; read by the squad layer.
    pub initial_budget: i64,
    pub min_player_price: i64,
    pub max_player_price: i64,
    pub price_change_factor: f64,
    /// Net transfers that move the demand factor by 1.0.
    pub demand_sensitivity: f64,
    /// Price given to players created from a match report.
    pub initial_player_price: i64,
    pub max_transfers_per_week: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_budget: 100_000_000,
            min_player_price: 100_000,
            max_player_price: 50_000_000,
            price_change_factor: 0.1,
            demand_sensitivity: 1000.0,
            initial_player_price: 1_000_000,
            max_transfers_per_week: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Milliseconds.
    pub scraping_timeout: u64,
    pub requests_per_second: u32,
    pub report_batch_size: usize,
    /// Milliseconds between report batches.
    pub report_pause_ms: u64,
    pub update_schedule: Option<String>,
    pub database_url: Option<String>,
    pub leagues_file: Option<String>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            scraping_timeout: 30_000,
            requests_per_second: 2,
            report_batch_size: 3,
            report_pause_ms: 2_000,
            update_schedule: None,
            database_url: None,
            leagues_file: None,
        }
    }
}

impl ScrapingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.scraping_timeout)
    }

    pub fn report_pause(&self) -> Duration {
        Duration::from_millis(self.report_pause_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub points: PointsConfig,
    pub market: MarketConfig,
    pub scraping: ScrapingConfig,
}

impl AppConfig {
    pub fn new() -> anyhow::Result<Self> {
        let points = PointsEnv::load_from_env()?.into();
        let market = MarketConfig::load_from_env()?;
        let scraping = ScrapingConfig::load_from_env()?;
        let config = Self {
            points,
            market,
            scraping,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            0 < self.market.min_player_price
                && self.market.min_player_price <= self.market.max_player_price,
            "MIN_PLAYER_PRICE ({}) must be positive and not above MAX_PLAYER_PRICE ({})",
            self.market.min_player_price,
            self.market.max_player_price
        );
        anyhow::ensure!(
            self.market.demand_sensitivity > 0.0,
            "DEMAND_SENSITIVITY must be positive"
        );
        anyhow::ensure!(
            self.scraping.report_batch_size > 0,
            "REPORT_BATCH_SIZE must be at least 1"
        );
        anyhow::ensure!(
            self.scraping.requests_per_second > 0,
            "REQUESTS_PER_SECOND must be at least 1"
        );
        Ok(())
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
