use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    leagues::LeagueConfig,
    match_store::MatchStore,
    models::{Match, MatchId, MatchStatus, Player, PlayerId, ScrapedMatch, ScrapingState},
    player_store::PlayerStore,
    utils::sort_by_key_ref,
};

#[derive(Debug, Default)]
struct Tables {
    matches: Vec<Match>,
    players: Vec<Player>,
    next_match_id: MatchId,
    next_player_id: PlayerId,
}

/// Process-local store for dry runs and tests. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn matches(&self) -> Vec<Match> {
        self.tables.lock().await.matches.clone()
    }

    pub async fn players(&self) -> Vec<Player> {
        self.tables.lock().await.players.clone()
    }

    /// Direct write access for seeding and for collaborators such as the
    /// transfer layer that own fields this pipeline only reads.
    pub async fn update_match(&self, id: MatchId, f: impl FnOnce(&mut Match)) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.matches.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                f(m);
                true
            }
            None => false,
        }
    }
}

impl MatchStore for MemoryStore {
    async fn upsert_scraped(
        &self,
        league: &LeagueConfig,
        scraped: &ScrapedMatch,
    ) -> anyhow::Result<MatchId> {
        let now = Utc::now();
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.matches.iter_mut().find(|m| m.same_fixture(scraped)) {
            existing.apply_scraped(scraped, now);
            return Ok(existing.id);
        }
        tables.next_match_id += 1;
        let id = tables.next_match_id;
        tables
            .matches
            .push(Match::from_scraped(id, league.reference(), scraped, now));
        Ok(id)
    }

    async fn get(&self, id: MatchId) -> anyhow::Result<Option<Match>> {
        let tables = self.tables.lock().await;
        Ok(tables.matches.iter().find(|m| m.id == id).cloned())
    }

    async fn save_scraping(&self, m: &Match) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .matches
            .iter_mut()
            .find(|stored| stored.id == m.id)
            .ok_or_else(|| anyhow::anyhow!("match {} not found", m.id))?;
        stored.scraping_status = m.scraping_status.clone();
        stored.player_stats = m.player_stats.clone();
        stored.last_updated = m.last_updated;
        Ok(())
    }

    async fn pending_scraping(&self) -> anyhow::Result<Vec<Match>> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<Match> = tables
            .matches
            .iter()
            .filter(|m| m.needs_report_scrape())
            .cloned()
            .collect();
        sort_by_key_ref(&mut pending, |m| &m.date);
        pending.reverse();
        Ok(pending)
    }

    async fn completed_matches(&self) -> anyhow::Result<Vec<Match>> {
        let tables = self.tables.lock().await;
        let mut completed: Vec<Match> = tables
            .matches
            .iter()
            .filter(|m| {
                m.status == MatchStatus::Finished
                    && m.scraping_status.status == ScrapingState::Completed
            })
            .cloned()
            .collect();
        sort_by_key_ref(&mut completed, |m| &m.date);
        Ok(completed)
    }

    async fn in_progress_matches(&self) -> anyhow::Result<Vec<Match>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .matches
            .iter()
            .filter(|m| m.scraping_status.status == ScrapingState::InProgress)
            .cloned()
            .collect())
    }
}

impl PlayerStore for MemoryStore {
    async fn find_player(&self, name: &str, team: &str) -> anyhow::Result<Option<Player>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .players
            .iter()
            .find(|p| p.name == name && p.team == team)
            .cloned())
    }

    async fn save_player(&self, player: &mut Player) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        match player.id {
            Some(id) => {
                let stored = tables
                    .players
                    .iter_mut()
                    .find(|p| p.id == Some(id))
                    .ok_or_else(|| anyhow::anyhow!("player {id} not found"))?;
                *stored = player.clone();
            }
            None => {
                if tables
                    .players
                    .iter()
                    .any(|p| p.name == player.name && p.team == player.team)
                {
                    anyhow::bail!("player {} of {} already exists", player.name, player.team);
                }
                tables.next_player_id += 1;
                player.id = Some(tables.next_player_id);
                tables.players.push(player.clone());
            }
        }
        Ok(())
    }

    async fn available_players(&self) -> anyhow::Result<Vec<Player>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .players
            .iter()
            .filter(|p| p.is_available)
            .cloned()
            .collect())
    }
}
