use anyhow::Context;
use chrono::Utc;
use log::error;

use crate::{
    leagues::LeagueConfig,
    models::{Match, MatchId, PlayerStatLine, ScrapedMatch},
    pipeline::StageSummary,
};

pub const INTERRUPTED_ERROR: &str = "interrupted before completion";

/// Persistence for matches and the only owner of their scraping lifecycle.
///
/// Implementors provide plain reads and writes; the lifecycle transitions are
/// provided methods so every backend enforces the same state machine.
#[allow(async_fn_in_trait)]
pub trait MatchStore {
    /// Inserts or refreshes a fixture keyed by league, home team, away team
    /// and date. New fixtures start `pending`; known ones keep their
    /// scraping state, attempts and player stats.
    async fn upsert_scraped(
        &self,
        league: &LeagueConfig,
        scraped: &ScrapedMatch,
    ) -> anyhow::Result<MatchId>;

    async fn get(&self, id: MatchId) -> anyhow::Result<Option<Match>>;

    /// Writes back `scraping_status`, `player_stats` and `last_updated`.
    async fn save_scraping(&self, m: &Match) -> anyhow::Result<()>;

    /// Finished or live matches whose report is still pending or failed and
    /// under the attempt ceiling, newest first.
    async fn pending_scraping(&self) -> anyhow::Result<Vec<Match>>;

    /// Finished matches with a completed report, oldest first.
    async fn completed_matches(&self) -> anyhow::Result<Vec<Match>>;

    async fn in_progress_matches(&self) -> anyhow::Result<Vec<Match>>;

    async fn load(&self, id: MatchId) -> anyhow::Result<Match> {
        self.get(id)
            .await?
            .with_context(|| format!("match {id} not found"))
    }

    /// Charges an attempt and persists `in_progress` before any fetch starts.
    async fn begin_report_scrape(&self, id: MatchId) -> anyhow::Result<Match> {
        let mut m = self.load(id).await?;
        m.begin_report_scrape(Utc::now())?;
        self.save_scraping(&m).await?;
        Ok(m)
    }

    async fn complete_report_scrape(
        &self,
        id: MatchId,
        player_stats: Vec<PlayerStatLine>,
    ) -> anyhow::Result<Match> {
        let mut m = self.load(id).await?;
        m.record_report(player_stats, Utc::now())?;
        self.save_scraping(&m).await?;
        Ok(m)
    }

    async fn fail_report_scrape(&self, id: MatchId, error: &str) -> anyhow::Result<Match> {
        let mut m = self.load(id).await?;
        m.record_report_failure(error, Utc::now())?;
        self.save_scraping(&m).await?;
        Ok(m)
    }

    /// Marks reports left `in_progress` by a dead run as failed so they are
    /// retried. Only valid while no other run is active. A match whose write
    /// fails is logged, counted and left as it was.
    async fn recover_interrupted(&self) -> anyhow::Result<StageSummary> {
        let stuck = self.in_progress_matches().await?;
        let mut summary = StageSummary::default();
        for m in &stuck {
            match self.fail_report_scrape(m.id, INTERRUPTED_ERROR).await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    error!(
                        "Could not recover interrupted scrape of {} vs {}: {e:#}",
                        m.home_team, m.away_team
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
