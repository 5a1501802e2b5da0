use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::{
    config::PointsConfig,
    models::{GameweekStat, Match, MatchId, Player, PlayerStatLine, Position, SeasonStats},
    pipeline::StageSummary,
    player_store::PlayerStore,
};

/// Form is the mean award over this many most recently appended gameweeks.
pub const FORM_WINDOW: usize = 5;
/// Minutes a player must be on the pitch for a clean sheet to count.
pub const CLEAN_SHEET_MINUTES: u32 = 60;

fn count(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Points for one gameweek. Pure: the position and config decide everything.
pub fn calculate_gameweek_points(
    position: Position,
    stat: &GameweekStat,
    config: &PointsConfig,
) -> i32 {
    let mut points = 0i32;
    if stat.minutes > 0 {
        points += config.playing;
    }
    if stat.goals > 0 {
        let per_goal = config.goal + config.goal_bonus.get(position);
        points = points.saturating_add(count(stat.goals).saturating_mul(per_goal));
    }
    if stat.assists > 0 {
        points = points.saturating_add(count(stat.assists).saturating_mul(config.assist));
    }
    if stat.clean_sheet && stat.minutes >= CLEAN_SHEET_MINUTES {
        points += config.clean_sheet.get(position);
    }
    points = points.saturating_add(count(stat.yellow_cards).saturating_mul(config.yellow_card));
    points.saturating_add(count(stat.red_cards).saturating_mul(config.red_card))
}

/// Rough position for a player we have never seen, from one stat line.
/// Scorers up front, creators in midfield, anyone else who played at the
/// back. It is a guess and will misplace goalkeepers.
pub fn guess_position(line: &PlayerStatLine) -> Position {
    if line.goals >= 2 {
        Position::Forward
    } else if line.assists >= 2 {
        Position::Midfielder
    } else if line.minutes > 0 {
        Position::Defender
    } else {
        Position::Midfielder
    }
}

impl Player {
    pub fn has_gameweek(&self, match_id: MatchId, gameweek: u32) -> bool {
        self.gameweek_stats
            .iter()
            .any(|gw| gw.match_id == match_id && gw.gameweek == gameweek)
    }

    /// Recomputes season totals, average and form from `gameweek_stats`.
    pub fn refresh_aggregates(&mut self) {
        let stats = &self.gameweek_stats;
        self.season_stats = SeasonStats {
            matches_played: stats.len() as u32,
            minutes_played: stats.iter().map(|gw| gw.minutes).sum(),
            goals: stats.iter().map(|gw| gw.goals).sum(),
            assists: stats.iter().map(|gw| gw.assists).sum(),
            yellow_cards: stats.iter().map(|gw| gw.yellow_cards).sum(),
            red_cards: stats.iter().map(|gw| gw.red_cards).sum(),
            clean_sheets: stats.iter().filter(|gw| gw.clean_sheet).count() as u32,
        };
        if stats.is_empty() {
            return;
        }
        self.average_points = f64::from(self.total_points) / stats.len() as f64;
        let recent = &stats[stats.len().saturating_sub(FORM_WINDOW)..];
        let recent_points: i64 = recent.iter().map(|gw| i64::from(gw.points)).sum();
        self.form = recent_points as f64 / recent.len() as f64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Awarded { points: i32, created: bool },
    Duplicate,
}

pub struct PointsEngine<'a> {
    pub config: &'a PointsConfig,
    /// Price for players first seen in a match report.
    pub initial_price: i64,
}

impl<'a> PointsEngine<'a> {
    pub fn new(config: &'a PointsConfig, initial_price: i64) -> Self {
        Self {
            config,
            initial_price,
        }
    }

    pub fn gameweek_stat(&self, m: &Match, line: &PlayerStatLine, gameweek: u32) -> GameweekStat {
        let clean_sheet = m.clean_sheet_teams().contains(&line.team.as_str())
            && line.minutes >= CLEAN_SHEET_MINUTES;
        GameweekStat {
            gameweek,
            match_id: m.id,
            minutes: line.minutes,
            goals: line.goals,
            assists: line.assists,
            yellow_cards: line.yellow_cards,
            red_cards: line.red_cards,
            clean_sheet,
            points: 0,
            date: m.date,
        }
    }

    /// Scores and appends `stat` unless the player already has an entry for
    /// the same match and gameweek, in which case nothing changes.
    pub fn apply(&self, player: &mut Player, mut stat: GameweekStat, now: DateTime<Utc>) -> Option<i32> {
        if player.has_gameweek(stat.match_id, stat.gameweek) {
            return None;
        }
        stat.points = calculate_gameweek_points(player.position, &stat, self.config);
        let points = stat.points;
        player.gameweek_stats.push(stat);
        player.total_points = player.total_points.saturating_add(points);
        player.refresh_aggregates();
        player.last_updated = now;
        Some(points)
    }

    /// Applies every stat line of a completed match, one player at a time.
    pub async fn process_match(
        &self,
        store: &impl PlayerStore,
        m: &Match,
        gameweek: u32,
    ) -> StageSummary {
        let mut summary = StageSummary::default();
        for line in &m.player_stats {
            match self.process_line(store, m, line, gameweek).await {
                Ok(LineOutcome::Awarded { points, created }) => {
                    if created {
                        info!("Created player {} ({})", line.player_name, line.team);
                    }
                    info!("Updated {}: {} points", line.player_name, points);
                    summary.succeeded += 1;
                }
                Ok(LineOutcome::Duplicate) => {
                    warn!(
                        "Gameweek {} of match {} already counted for {}, skipping",
                        gameweek, m.id, line.player_name
                    );
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("Error updating player {}: {e:#}", line.player_name);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    pub async fn process_line(
        &self,
        store: &impl PlayerStore,
        m: &Match,
        line: &PlayerStatLine,
        gameweek: u32,
    ) -> anyhow::Result<LineOutcome> {
        let now = Utc::now();
        let (mut player, created) = match store.find_player(&line.player_name, &line.team).await? {
            Some(player) => (player, false),
            None => {
                let player = Player::new(
                    &line.player_name,
                    &line.team,
                    m.league.clone(),
                    guess_position(line),
                    self.initial_price,
                    now,
                );
                (player, true)
            }
        };

        let stat = self.gameweek_stat(m, line, gameweek);
        let Some(points) = self.apply(&mut player, stat, now) else {
            return Ok(LineOutcome::Duplicate);
        };
        store.save_player(&mut player).await?;
        Ok(LineOutcome::Awarded { points, created })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Division, LeagueRef, MatchStatus, ScrapedMatch};

    const POSITIONS: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    fn stat(minutes: u32, goals: u32, assists: u32, clean_sheet: bool) -> GameweekStat {
        GameweekStat {
            gameweek: 1,
            match_id: 1,
            minutes,
            goals,
            assists,
            yellow_cards: 0,
            red_cards: 0,
            clean_sheet,
            points: 0,
            date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        }
    }

    fn league() -> LeagueRef {
        LeagueRef {
            id: "l".to_string(),
            name: "L".to_string(),
            division: Division::Segunda,
        }
    }

    fn player(position: Position) -> Player {
        Player::new("Ana", "A", league(), position, 1_000_000, Utc::now())
    }

    #[test]
    fn no_minutes_no_playing_points() {
        let config = PointsConfig::default();
        for position in POSITIONS {
            let mut s = stat(0, 1, 1, false);
            s.yellow_cards = 1;
            let expected = (config.goal + config.goal_bonus.get(position)) + config.assist
                + config.yellow_card;
            assert_eq!(calculate_gameweek_points(position, &s, &config), expected);
        }
    }

    #[test]
    fn brace_award_by_position() {
        let config = PointsConfig::default();
        let award = |p| calculate_gameweek_points(p, &stat(90, 2, 0, false), &config);
        for position in POSITIONS {
            assert_eq!(
                award(position),
                config.playing + 2 * (config.goal + config.goal_bonus.get(position))
            );
        }
        let defensive = award(Position::Goalkeeper).min(award(Position::Defender));
        let attacking = award(Position::Midfielder).max(award(Position::Forward));
        assert!(defensive > attacking);
    }

    #[test]
    fn clean_sheet_needs_sixty_minutes() {
        let config = PointsConfig::default();
        let full = calculate_gameweek_points(Position::Defender, &stat(60, 0, 0, true), &config);
        let short = calculate_gameweek_points(Position::Defender, &stat(59, 0, 0, true), &config);
        assert_eq!(full, config.playing + config.clean_sheet.defender);
        assert_eq!(short, config.playing);
    }

    #[test]
    fn cards_are_penalties() {
        let config = PointsConfig::default();
        let mut s = stat(90, 0, 0, false);
        s.yellow_cards = 2;
        s.red_cards = 1;
        assert_eq!(
            calculate_gameweek_points(Position::Forward, &s, &config),
            config.playing + 2 * config.yellow_card + config.red_card
        );
    }

    #[test]
    fn position_guess() {
        let line = |minutes, goals, assists| PlayerStatLine {
            minutes,
            goals,
            assists,
            ..Default::default()
        };
        assert_eq!(guess_position(&line(90, 2, 3)), Position::Forward);
        assert_eq!(guess_position(&line(90, 1, 2)), Position::Midfielder);
        assert_eq!(guess_position(&line(30, 1, 1)), Position::Defender);
        assert_eq!(guess_position(&line(0, 0, 0)), Position::Midfielder);
    }

    #[test]
    fn reapplying_same_match_changes_nothing() {
        let config = PointsConfig::default();
        let engine = PointsEngine::new(&config, 1_000_000);
        let mut p = player(Position::Forward);

        assert!(engine.apply(&mut p, stat(90, 1, 0, false), Utc::now()).is_some());
        let before = p.clone();
        assert_eq!(engine.apply(&mut p, stat(90, 1, 0, false), Utc::now()), None);
        assert_eq!(p, before);

        let mut other_match = stat(90, 1, 0, false);
        other_match.match_id = 2;
        assert!(engine.apply(&mut p, other_match, Utc::now()).is_some());
        assert_eq!(p.gameweek_stats.len(), 2);
    }

    #[test]
    fn aggregates_and_trailing_form() {
        let config = PointsConfig::default();
        let engine = PointsEngine::new(&config, 1_000_000);
        let mut p = player(Position::Forward);
        // Forward, 90 minutes: 2 points for playing plus 4 per goal.
        for (i, goals) in [0, 0, 1, 2, 0, 1].into_iter().enumerate() {
            let mut s = stat(90, goals, 0, false);
            s.match_id = i as MatchId + 1;
            s.gameweek = i as u32 + 1;
            engine.apply(&mut p, s, Utc::now());
        }
        let awards: Vec<i32> = p.gameweek_stats.iter().map(|gw| gw.points).collect();
        assert_eq!(awards, vec![2, 2, 6, 10, 2, 6]);
        assert_eq!(p.total_points, 28);
        assert_eq!(p.season_stats.matches_played, 6);
        assert_eq!(p.season_stats.goals, 4);
        assert_eq!(p.season_stats.minutes_played, 540);
        assert!((p.average_points - 28.0 / 6.0).abs() < 1e-9);
        assert!((p.form - 26.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn clean_sheet_flag_follows_scoreline() {
        let config = PointsConfig::default();
        let engine = PointsEngine::new(&config, 1_000_000);
        let scraped = ScrapedMatch {
            league_id: "l".to_string(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            home_score: 3,
            away_score: 0,
            date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            status: MatchStatus::Finished,
            match_report_url: None,
        };
        let m = Match::from_scraped(7, league(), &scraped, Utc::now());
        let line = |team: &str, minutes| PlayerStatLine {
            player_name: "X".to_string(),
            team: team.to_string(),
            minutes,
            ..Default::default()
        };
        assert!(engine.gameweek_stat(&m, &line("Home", 90), 1).clean_sheet);
        assert!(!engine.gameweek_stat(&m, &line("Home", 45), 1).clean_sheet);
        assert!(!engine.gameweek_stat(&m, &line("Away", 90), 1).clean_sheet);
    }
}
