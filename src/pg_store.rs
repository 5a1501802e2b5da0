use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use sqlx::{
    FromRow,
    postgres::{PgPool, PgPoolOptions},
    types::Json,
};

use crate::{
    leagues::LeagueConfig,
    match_store::MatchStore,
    models::{
        GameweekStat, LeagueRef, MAX_SCRAPING_ATTEMPTS, Match, MatchId, Player, PlayerStatLine,
        PricePoint, ScrapedMatch, ScrapingStatus, SeasonStats,
    },
    player_store::PlayerStore,
};

const MATCHES_UP: &str = include_str!("../sql/matches/up.sql");
const PLAYERS_UP: &str = include_str!("../sql/players/up.sql");

const MATCH_COLUMNS: &str = "id, league_id, league_name, league_division, gameweek, \
     home_team, away_team, home_score, away_score, match_date, status, match_report_url, \
     player_stats, scraping_status, last_attempt, attempts, scraping_error, last_updated";

const PLAYER_COLUMNS: &str = "id, name, team, league_id, league_name, league_division, \
     position, current_price, initial_price, price_history, total_points, average_points, \
     form, gameweek_stats, season_stats, selected_by, transfers_in, transfers_out, \
     is_available, last_updated";

fn to_i32(value: u32) -> anyhow::Result<i32> {
    i32::try_from(value).context("value does not fit an INTEGER column")
}

fn to_u32(value: i32) -> anyhow::Result<u32> {
    u32::try_from(value).context("negative value in an unsigned column")
}

#[derive(Debug, FromRow)]
struct MatchRow {
    id: i64,
    league_id: String,
    league_name: String,
    league_division: String,
    gameweek: Option<i32>,
    home_team: String,
    away_team: String,
    home_score: Option<i32>,
    away_score: Option<i32>,
    match_date: NaiveDate,
    status: String,
    match_report_url: Option<String>,
    player_stats: Json<Vec<PlayerStatLine>>,
    scraping_status: String,
    last_attempt: Option<DateTime<Utc>>,
    attempts: i32,
    scraping_error: Option<String>,
    last_updated: DateTime<Utc>,
}

impl TryFrom<MatchRow> for Match {
    type Error = anyhow::Error;

    fn try_from(row: MatchRow) -> anyhow::Result<Self> {
        Ok(Match {
            id: row.id,
            league: LeagueRef {
                id: row.league_id,
                name: row.league_name,
                division: row.league_division.parse()?,
            },
            gameweek: row.gameweek.map(to_u32).transpose()?,
            home_team: row.home_team,
            away_team: row.away_team,
            home_score: row.home_score.map(to_u32).transpose()?,
            away_score: row.away_score.map(to_u32).transpose()?,
            date: row.match_date,
            status: row.status.parse()?,
            match_report_url: row.match_report_url,
            player_stats: row.player_stats.0,
            scraping_status: ScrapingStatus {
                status: row.scraping_status.parse()?,
                last_attempt: row.last_attempt,
                attempts: to_u32(row.attempts)?,
                error: row.scraping_error,
            },
            last_updated: row.last_updated,
        })
    }
}

#[derive(Debug, FromRow)]
struct PlayerRow {
    id: i64,
    name: String,
    team: String,
    league_id: String,
    league_name: String,
    league_division: String,
    position: String,
    current_price: i64,
    initial_price: i64,
    price_history: Json<Vec<PricePoint>>,
    total_points: i32,
    average_points: f64,
    form: f64,
    gameweek_stats: Json<Vec<GameweekStat>>,
    season_stats: Json<SeasonStats>,
    selected_by: f64,
    transfers_in: i64,
    transfers_out: i64,
    is_available: bool,
    last_updated: DateTime<Utc>,
}

impl TryFrom<PlayerRow> for Player {
    type Error = anyhow::Error;

    fn try_from(row: PlayerRow) -> anyhow::Result<Self> {
        Ok(Player {
            id: Some(row.id),
            name: row.name,
            team: row.team,
            league: LeagueRef {
                id: row.league_id,
                name: row.league_name,
                division: row.league_division.parse()?,
            },
            position: row.position.parse()?,
            current_price: row.current_price,
            initial_price: row.initial_price,
            price_history: row.price_history.0,
            total_points: row.total_points,
            average_points: row.average_points,
            form: row.form,
            gameweek_stats: row.gameweek_stats.0,
            season_stats: row.season_stats.0,
            selected_by: row.selected_by,
            transfers_in: row.transfers_in,
            transfers_out: row.transfers_out,
            is_available: row.is_available,
            last_updated: row.last_updated,
        })
    }
}

fn into_matches(rows: Vec<MatchRow>) -> anyhow::Result<Vec<Match>> {
    rows.into_iter().map(Match::try_from).collect()
}

/// Matches and players in Postgres. List-valued fields live in JSONB
/// columns.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and creates the tables if they are missing.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to the database")?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        info!("Connected to the database");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(MATCHES_UP)
            .execute(&self.pool)
            .await
            .context("failed to create matches table")?;
        sqlx::raw_sql(PLAYERS_UP)
            .execute(&self.pool)
            .await
            .context("failed to create players table")?;
        Ok(())
    }

    async fn select_matches(&self, filter: &str) -> anyhow::Result<Vec<Match>> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches {filter}");
        let rows = sqlx::query_as::<_, MatchRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }
}

impl MatchStore for PgStore {
    async fn upsert_scraped(
        &self,
        league: &LeagueConfig,
        scraped: &ScrapedMatch,
    ) -> anyhow::Result<MatchId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO matches (
                league_id, league_name, league_division, home_team, away_team,
                home_score, away_score, match_date, status, match_report_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (league_id, home_team, away_team, match_date) DO UPDATE SET
                league_name = EXCLUDED.league_name,
                league_division = EXCLUDED.league_division,
                home_score = EXCLUDED.home_score,
                away_score = EXCLUDED.away_score,
                status = EXCLUDED.status,
                match_report_url = COALESCE(EXCLUDED.match_report_url, matches.match_report_url),
                last_updated = now()
            RETURNING id
            "#,
        )
        .bind(&league.id)
        .bind(&league.name)
        .bind(league.division.as_str())
        .bind(&scraped.home_team)
        .bind(&scraped.away_team)
        .bind(to_i32(scraped.home_score)?)
        .bind(to_i32(scraped.away_score)?)
        .bind(scraped.date)
        .bind(scraped.status.as_str())
        .bind(&scraped.match_report_url)
        .fetch_one(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to upsert {} vs {} on {}",
                scraped.home_team, scraped.away_team, scraped.date
            )
        })?;
        Ok(id)
    }

    async fn get(&self, id: MatchId) -> anyhow::Result<Option<Match>> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1");
        let row = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Match::try_from).transpose()
    }

    async fn save_scraping(&self, m: &Match) -> anyhow::Result<()> {
        let status = &m.scraping_status;
        let result = sqlx::query(
            r#"
            UPDATE matches SET
                scraping_status = $2,
                last_attempt = $3,
                attempts = $4,
                scraping_error = $5,
                player_stats = $6,
                last_updated = $7
            WHERE id = $1
            "#,
        )
        .bind(m.id)
        .bind(status.status.as_str())
        .bind(status.last_attempt)
        .bind(to_i32(status.attempts)?)
        .bind(&status.error)
        .bind(Json(&m.player_stats))
        .bind(m.last_updated)
        .execute(&self.pool)
        .await?;
        anyhow::ensure!(result.rows_affected() == 1, "match {} not found", m.id);
        Ok(())
    }

    async fn pending_scraping(&self) -> anyhow::Result<Vec<Match>> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches \
             WHERE status IN ('finished', 'live') \
               AND scraping_status IN ('pending', 'failed') \
               AND attempts < $1 \
             ORDER BY match_date DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(to_i32(MAX_SCRAPING_ATTEMPTS)?)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }

    async fn completed_matches(&self) -> anyhow::Result<Vec<Match>> {
        self.select_matches(
            "WHERE status = 'finished' AND scraping_status = 'completed' \
             ORDER BY match_date ASC, id ASC",
        )
        .await
    }

    async fn in_progress_matches(&self) -> anyhow::Result<Vec<Match>> {
        self.select_matches("WHERE scraping_status = 'in_progress' ORDER BY id")
            .await
    }
}

impl PlayerStore for PgStore {
    async fn find_player(&self, name: &str, team: &str) -> anyhow::Result<Option<Player>> {
        let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE name = $1 AND team = $2");
        let row = sqlx::query_as::<_, PlayerRow>(&sql)
            .bind(name)
            .bind(team)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Player::try_from).transpose()
    }

    async fn save_player(&self, player: &mut Player) -> anyhow::Result<()> {
        match player.id {
            Some(id) => {
                let result = sqlx::query(
                    r#"
                    UPDATE players SET
                        position = $2,
                        current_price = $3,
                        price_history = $4,
                        total_points = $5,
                        average_points = $6,
                        form = $7,
                        gameweek_stats = $8,
                        season_stats = $9,
                        is_available = $10,
                        last_updated = $11
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(player.position.as_str())
                .bind(player.current_price)
                .bind(Json(&player.price_history))
                .bind(player.total_points)
                .bind(player.average_points)
                .bind(player.form)
                .bind(Json(&player.gameweek_stats))
                .bind(Json(&player.season_stats))
                .bind(player.is_available)
                .bind(player.last_updated)
                .execute(&self.pool)
                .await?;
                anyhow::ensure!(result.rows_affected() == 1, "player {id} not found");
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO players (
                        name, team, league_id, league_name, league_division, position,
                        current_price, initial_price, price_history, total_points,
                        average_points, form, gameweek_stats, season_stats, selected_by,
                        transfers_in, transfers_out, is_available, last_updated
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                            $11, $12, $13, $14, $15, $16, $17, $18, $19)
                    RETURNING id
                    "#,
                )
                .bind(&player.name)
                .bind(&player.team)
                .bind(&player.league.id)
                .bind(&player.league.name)
                .bind(player.league.division.as_str())
                .bind(player.position.as_str())
                .bind(player.current_price)
                .bind(player.initial_price)
                .bind(Json(&player.price_history))
                .bind(player.total_points)
                .bind(player.average_points)
                .bind(player.form)
                .bind(Json(&player.gameweek_stats))
                .bind(Json(&player.season_stats))
                .bind(player.selected_by)
                .bind(player.transfers_in)
                .bind(player.transfers_out)
                .bind(player.is_available)
                .bind(player.last_updated)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("failed to insert {} of {}", player.name, player.team))?;
                player.id = Some(id);
            }
        }
        Ok(())
    }

    async fn available_players(&self) -> anyhow::Result<Vec<Player>> {
        let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE is_available ORDER BY id");
        let rows = sqlx::query_as::<_, PlayerRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Player::try_from).collect()
    }
}
