use std::collections::BTreeMap;

use chrono::Utc;
use log::{error, info, warn};

use crate::{
    config::AppConfig,
    league_scraper::LeagueScraper,
    leagues::LeagueConfig,
    match_report_scraper::MatchReportScraper,
    match_store::MatchStore,
    models::Match,
    player_store::PlayerStore,
    points_engine::PointsEngine,
    pricing_engine::update_price,
    source_session::Fetcher,
    utils::in_batches,
};

/// Matches without a gameweek are numbered in blocks of this many, in date
/// order.
pub const SYNTHETIC_GAMEWEEK_SIZE: usize = 10;

/// Per-stage outcome counts. Items are leagues, matches, stat lines or
/// players depending on the stage. League scraping counts a league as
/// succeeded only when all its matches were saved, and one failure per
/// match that was not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StageSummary {
    pub fn merge(&mut self, other: StageSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for StageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ok, {} failed, {} skipped",
            self.succeeded, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub leagues: StageSummary,
    pub reports: StageSummary,
    pub points: StageSummary,
    pub prices: StageSummary,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "leagues [{}], reports [{}], points [{}], prices [{}]",
            self.leagues, self.reports, self.points, self.prices
        )
    }
}

/// Buckets matches by gameweek, keeping each bucket in input order. Matches
/// without an explicit gameweek get `index / 10 + 1`, which is only right if
/// the input is in calendar order.
///
/// The index runs over every league's completed matches together. When an
/// older match completes late (a report that only succeeded on a retry),
/// every later match moves up a position and can land in a different
/// synthetic gameweek, which the duplicate guard sees as a new entry. Only
/// an explicit `gameweek` on the match avoids this.
pub fn group_by_gameweek(matches: Vec<Match>) -> BTreeMap<u32, Vec<Match>> {
    let mut gameweeks: BTreeMap<u32, Vec<Match>> = BTreeMap::new();
    for (index, m) in matches.into_iter().enumerate() {
        let gameweek = m
            .gameweek
            .unwrap_or((index / SYNTHETIC_GAMEWEEK_SIZE) as u32 + 1);
        gameweeks.entry(gameweek).or_default().push(m);
    }
    gameweeks
}

/// Scrape leagues, scrape reports, award points, reprice. One run at a time.
pub struct Pipeline<'a, F, M, P> {
    config: &'a AppConfig,
    leagues: &'a [LeagueConfig],
    fetcher: &'a F,
    matches: &'a M,
    players: &'a P,
}

impl<'a, F, M, P> Pipeline<'a, F, M, P>
where
    F: Fetcher,
    M: MatchStore,
    P: PlayerStore,
{
    pub fn new(
        config: &'a AppConfig,
        leagues: &'a [LeagueConfig],
        fetcher: &'a F,
        matches: &'a M,
        players: &'a P,
    ) -> Self {
        Self {
            config,
            leagues,
            fetcher,
            matches,
            players,
        }
    }

    /// Runs all four stages and releases the fetcher whatever the outcome.
    pub async fn run_full_update(&self) -> anyhow::Result<RunSummary> {
        info!("Starting full points update");
        let result = self.run_stages().await;
        self.fetcher.release().await;
        match &result {
            Ok(summary) => info!("Points update completed: {summary}"),
            Err(e) => error!("Points update failed: {e:#}"),
        }
        result
    }

    async fn run_stages(&self) -> anyhow::Result<RunSummary> {
        let leagues = self.scrape_all_leagues().await;
        let reports = self.scrape_match_reports().await?;
        let points = self.update_player_points().await?;
        let prices = self.update_market_prices().await?;
        Ok(RunSummary {
            leagues,
            reports,
            points,
            prices,
        })
    }

    pub async fn scrape_all_leagues(&self) -> StageSummary {
        info!("Scraping all leagues");
        let mut summary = StageSummary::default();
        for league in self.leagues {
            if !league.active {
                summary.skipped += 1;
                continue;
            }
            let scraped = match LeagueScraper::new(league).scrape(self.fetcher).await {
                Ok(scraped) => scraped,
                Err(e) => {
                    error!("Error scraping league {}: {e:#}", league.name);
                    summary.failed += 1;
                    continue;
                }
            };
            let mut unsaved = 0;
            for m in &scraped {
                if let Err(e) = self.matches.upsert_scraped(league, m).await {
                    error!(
                        "Error saving {} vs {} for {}: {e:#}",
                        m.home_team, m.away_team, league.name
                    );
                    unsaved += 1;
                }
            }
            info!(
                "Saved {} of {} matches for {}",
                scraped.len() - unsaved,
                scraped.len(),
                league.name
            );
            if unsaved == 0 {
                summary.succeeded += 1;
            } else {
                summary.failed += unsaved;
            }
        }
        info!("League scraping done: {summary}");
        summary
    }

    pub async fn scrape_match_reports(&self) -> anyhow::Result<StageSummary> {
        info!("Scraping match reports");
        let recovery = self.matches.recover_interrupted().await?;
        if recovery.succeeded > 0 {
            warn!(
                "Marked {} interrupted report scrapes as failed",
                recovery.succeeded
            );
        }

        let pending = self.matches.pending_scraping().await?;
        info!("Found {} matches pending scraping", pending.len());

        let mut summary = StageSummary {
            failed: recovery.failed,
            ..StageSummary::default()
        };
        let (with_report, without_report): (Vec<Match>, Vec<Match>) = pending
            .into_iter()
            .partition(|m| m.match_report_url.is_some());
        for m in &without_report {
            warn!("No report URL for match {} vs {}", m.home_team, m.away_team);
            summary.skipped += 1;
        }

        let scraping = &self.config.scraping;
        let outcomes = in_batches(
            &with_report,
            scraping.report_batch_size,
            scraping.report_pause(),
            |m| self.scrape_report(m),
        )
        .await;
        for outcome in outcomes {
            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err(_) => summary.failed += 1,
            }
        }
        info!("Report scraping done: {summary}");
        Ok(summary)
    }

    async fn scrape_report(&self, m: &Match) -> anyhow::Result<()> {
        let url = m
            .match_report_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("match {} has no report URL", m.id))?;
        if let Err(e) = self.matches.begin_report_scrape(m.id).await {
            error!(
                "Could not start report scrape for {} vs {}: {e:#}",
                m.home_team, m.away_team
            );
            return Err(e);
        }

        let scraped = MatchReportScraper::new(url).scrape(self.fetcher).await;
        let recorded = match scraped {
            Ok(player_stats) => self
                .matches
                .complete_report_scrape(m.id, player_stats)
                .await
                .map(|_| ()),
            Err(e) => {
                error!(
                    "Error scraping match report for {} vs {}: {e:#}",
                    m.home_team, m.away_team
                );
                let message = format!("{e:#}");
                match self.matches.fail_report_scrape(m.id, &message).await {
                    Ok(failed) if failed.scraping_status.is_terminal() => warn!(
                        "Giving up on report for {} vs {} after {} attempts",
                        m.home_team, m.away_team, failed.scraping_status.attempts
                    ),
                    Ok(_) => {}
                    Err(save) => error!("Could not record failure for match {}: {save:#}", m.id),
                }
                return Err(e);
            }
        };
        match &recorded {
            Ok(()) => info!("Scraped stats for {} vs {}", m.home_team, m.away_team),
            Err(e) => error!("Could not save stats for match {}: {e:#}", m.id),
        }
        recorded
    }

    pub async fn update_player_points(&self) -> anyhow::Result<StageSummary> {
        info!("Updating player points");
        let completed = self.matches.completed_matches().await?;
        info!("Processing {} completed matches", completed.len());

        let engine = PointsEngine::new(
            &self.config.points,
            self.config.market.initial_player_price,
        );
        let mut summary = StageSummary::default();
        for (gameweek, matches) in group_by_gameweek(completed) {
            info!("Processing gameweek {gameweek}");
            for m in &matches {
                summary.merge(engine.process_match(self.players, m, gameweek).await);
            }
        }
        info!("Player points done: {summary}");
        Ok(summary)
    }

    pub async fn update_market_prices(&self) -> anyhow::Result<StageSummary> {
        info!("Updating market prices");
        let players = self.players.available_players().await?;
        let now = Utc::now();
        let mut summary = StageSummary::default();
        for mut player in players {
            update_price(&mut player, &self.config.market, now);
            match self.players.save_player(&mut player).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    error!("Error updating price for {}: {e:#}", player.name);
                    summary.failed += 1;
                }
            }
        }
        info!("Market prices done: {summary}");
        Ok(summary)
    }
}
