use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::scrape_error::ScrapeError;

pub type MatchId = i64;
pub type PlayerId = i64;
pub type LeagueId = String;

/// Report scraping gives up on a match after this many attempts.
pub const MAX_SCRAPING_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Division {
    Elite,
    Primera,
    Segunda,
    Tercera,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueRef {
    pub id: LeagueId,
    pub name: String,
    pub division: Division,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapingState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> anyhow::Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(anyhow::anyhow!(
                        "unknown {} value: {}",
                        stringify!($ty),
                        other
                    )),
                }
            }
        }
    };
}

text_enum!(Division {
    Elite => "elite",
    Primera => "primera",
    Segunda => "segunda",
    Tercera => "tercera",
});

text_enum!(MatchStatus {
    Scheduled => "scheduled",
    Live => "live",
    Finished => "finished",
    Postponed => "postponed",
    Cancelled => "cancelled",
});

text_enum!(ScrapingState {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
});

text_enum!(Position {
    Goalkeeper => "goalkeeper",
    Defender => "defender",
    Midfielder => "midfielder",
    Forward => "forward",
});

/// One value per position, used for the position-dependent points knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionTable<T> {
    pub goalkeeper: T,
    pub defender: T,
    pub midfielder: T,
    pub forward: T,
}

impl<T: Copy> PositionTable<T> {
    pub fn get(&self, position: Position) -> T {
        match position {
            Position::Goalkeeper => self.goalkeeper,
            Position::Defender => self.defender,
            Position::Midfielder => self.midfielder,
            Position::Forward => self.forward,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatLine {
    pub player_name: String,
    pub team: String,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingStatus {
    pub status: ScrapingState,
    pub last_attempt: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl Default for ScrapingStatus {
    fn default() -> Self {
        Self {
            status: ScrapingState::Pending,
            last_attempt: None,
            attempts: 0,
            error: None,
        }
    }
}

impl ScrapingStatus {
    /// Pending or failed, and still under the attempt ceiling.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, ScrapingState::Pending | ScrapingState::Failed)
            && self.attempts < MAX_SCRAPING_ATTEMPTS
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            ScrapingState::Completed => true,
            ScrapingState::Failed => self.attempts >= MAX_SCRAPING_ATTEMPTS,
            _ => false,
        }
    }

    /// `pending | failed -> in_progress`, charging one attempt.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<(), ScrapeError> {
        match self.status {
            ScrapingState::Pending | ScrapingState::Failed => {}
            from => {
                return Err(ScrapeError::InvalidTransition {
                    from,
                    to: ScrapingState::InProgress,
                });
            }
        }
        if self.attempts >= MAX_SCRAPING_ATTEMPTS {
            return Err(ScrapeError::AttemptsExhausted {
                attempts: self.attempts,
            });
        }
        self.status = ScrapingState::InProgress;
        self.attempts += 1;
        self.last_attempt = Some(now);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), ScrapeError> {
        self.require_in_progress(ScrapingState::Completed)?;
        self.status = ScrapingState::Completed;
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ScrapeError> {
        self.require_in_progress(ScrapingState::Failed)?;
        self.status = ScrapingState::Failed;
        self.error = Some(error.into());
        Ok(())
    }

    fn require_in_progress(&self, to: ScrapingState) -> Result<(), ScrapeError> {
        if self.status == ScrapingState::InProgress {
            Ok(())
        } else {
            Err(ScrapeError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

/// A finished fixture as read off a league results page, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedMatch {
    pub league_id: LeagueId,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub date: NaiveDate,
    pub status: MatchStatus,
    pub match_report_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub league: LeagueRef,
    pub gameweek: Option<u32>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub date: NaiveDate,
    pub status: MatchStatus,
    pub match_report_url: Option<String>,
    pub player_stats: Vec<PlayerStatLine>,
    pub scraping_status: ScrapingStatus,
    pub last_updated: DateTime<Utc>,
}

impl Match {
    pub fn from_scraped(
        id: MatchId,
        league: LeagueRef,
        scraped: &ScrapedMatch,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            league,
            gameweek: None,
            home_team: scraped.home_team.clone(),
            away_team: scraped.away_team.clone(),
            home_score: Some(scraped.home_score),
            away_score: Some(scraped.away_score),
            date: scraped.date,
            status: scraped.status,
            match_report_url: scraped.match_report_url.clone(),
            player_stats: vec![],
            scraping_status: ScrapingStatus::default(),
            last_updated: now,
        }
    }

    /// Refreshes the result fields of an already known match. Scraping state
    /// and player stats are left alone.
    pub fn apply_scraped(&mut self, scraped: &ScrapedMatch, now: DateTime<Utc>) {
        self.home_score = Some(scraped.home_score);
        self.away_score = Some(scraped.away_score);
        self.status = scraped.status;
        if scraped.match_report_url.is_some() {
            self.match_report_url = scraped.match_report_url.clone();
        }
        self.last_updated = now;
    }

    pub fn same_fixture(&self, scraped: &ScrapedMatch) -> bool {
        self.league.id == scraped.league_id
            && self.home_team == scraped.home_team
            && self.away_team == scraped.away_team
            && self.date == scraped.date
    }

    pub fn needs_report_scrape(&self) -> bool {
        matches!(self.status, MatchStatus::Finished | MatchStatus::Live)
            && self.scraping_status.is_retryable()
    }

    pub fn begin_report_scrape(&mut self, now: DateTime<Utc>) -> Result<(), ScrapeError> {
        self.scraping_status.begin_attempt(now)?;
        self.last_updated = now;
        Ok(())
    }

    pub fn record_report(
        &mut self,
        player_stats: Vec<PlayerStatLine>,
        now: DateTime<Utc>,
    ) -> Result<(), ScrapeError> {
        self.scraping_status.complete()?;
        self.player_stats = player_stats;
        self.last_updated = now;
        Ok(())
    }

    pub fn record_report_failure(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ScrapeError> {
        self.scraping_status.fail(error)?;
        self.last_updated = now;
        Ok(())
    }

    /// Teams whose opponent failed to score. Only finished matches count.
    pub fn clean_sheet_teams(&self) -> Vec<&str> {
        let mut teams = vec![];
        if self.status != MatchStatus::Finished {
            return teams;
        }
        if self.away_score == Some(0) {
            teams.push(self.home_team.as_str());
        }
        if self.home_score == Some(0) {
            teams.push(self.away_team.as_str());
        }
        teams
    }

    pub fn player_stats_for(&self, player_name: &str) -> Option<&PlayerStatLine> {
        let wanted = player_name.to_lowercase();
        self.player_stats
            .iter()
            .find(|line| line.player_name.to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameweekStat {
    pub gameweek: u32,
    pub match_id: MatchId,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub clean_sheet: bool,
    pub points: i32,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonStats {
    pub matches_played: u32,
    pub minutes_played: u32,
    pub goals: u32,
    pub assists: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub clean_sheets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub price: i64,
    pub date: DateTime<Utc>,
    pub gameweek: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// `None` until the player has been persisted for the first time.
    pub id: Option<PlayerId>,
    pub name: String,
    pub team: String,
    pub league: LeagueRef,
    pub position: Position,
    pub current_price: i64,
    pub initial_price: i64,
    pub price_history: Vec<PricePoint>,
    pub total_points: i32,
    pub average_points: f64,
    pub form: f64,
    pub gameweek_stats: Vec<GameweekStat>,
    pub season_stats: SeasonStats,
    pub selected_by: f64,
    pub transfers_in: i64,
    pub transfers_out: i64,
    pub is_available: bool,
    pub last_updated: DateTime<Utc>,
}

impl Player {
    pub fn new(
        name: impl Into<String>,
        team: impl Into<String>,
        league: LeagueRef,
        position: Position,
        price: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            team: team.into(),
            league,
            position,
            current_price: price,
            initial_price: price,
            price_history: vec![],
            total_points: 0,
            average_points: 0.0,
            form: 0.0,
            gameweek_stats: vec![],
            season_stats: SeasonStats::default(),
            selected_by: 0.0,
            transfers_in: 0,
            transfers_out: 0,
            is_available: true,
            last_updated: now,
        }
    }
}
