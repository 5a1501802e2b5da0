use chrono::{NaiveDate, Utc};
use log::{info, warn};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::{
    leagues::LeagueConfig,
    models::{MatchStatus, ScrapedMatch},
    scrape_error::ScrapeError,
    source_session::Fetcher,
    text_manipulators::{extract_text, parse_date, parse_score, resolve_report_url},
};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("table tr").expect("valid selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));
static REPORT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="acta_partido"]"#).expect("valid selector"));

#[derive(Debug)]
pub struct LeagueScraper<'a> {
    pub league: &'a LeagueConfig,
}

impl<'a> LeagueScraper<'a> {
    pub fn new(league: &'a LeagueConfig) -> Self {
        Self { league }
    }

    pub async fn scrape(&self, fetcher: &impl Fetcher) -> anyhow::Result<Vec<ScrapedMatch>> {
        info!("Scraping league {} from {}", self.league.name, self.league.url);
        let html = fetcher.fetch(&self.league.url).await?;
        let matches = extract_league_matches(
            &html,
            &self.league.id,
            &self.league.url,
            Utc::now().date_naive(),
        )?;
        info!("Found {} matches for league {}", matches.len(), self.league.id);
        Ok(matches)
    }
}

/// Turns a league results page into finished matches.
///
/// Each row needs `date | home | result | away` cells and a `"<n> - <n>"`
/// result; anything else (headers, separators, unplayed fixtures) is skipped.
/// Only a page without any table is an error.
pub fn extract_league_matches(
    html: &str,
    league_id: &str,
    page_url: &str,
    today: NaiveDate,
) -> Result<Vec<ScrapedMatch>, ScrapeError> {
    let document = Html::parse_document(html);
    if document.select(&TABLE).next().is_none() {
        return Err(ScrapeError::MissingResultsTable {
            url: page_url.to_string(),
        });
    }

    let mut matches = vec![];
    for row in document.select(&ROW) {
        let cells: Vec<String> = row.select(&CELL).map(extract_text).collect();
        if cells.len() < 4 {
            continue;
        }
        let (date_text, home_team, result, away_team) = (&cells[0], &cells[1], &cells[2], &cells[3]);
        if home_team.is_empty() || away_team.is_empty() {
            continue;
        }
        let Some((home_score, away_score)) = parse_score(result) else {
            continue;
        };

        let match_report_url = row
            .select(&REPORT_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| match resolve_report_url(href, page_url) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring report link for {home_team} vs {away_team}: {e}");
                    None
                }
            });

        matches.push(ScrapedMatch {
            league_id: league_id.to_string(),
            home_team: home_team.clone(),
            away_team: away_team.clone(),
            home_score,
            away_score,
            date: parse_date(date_text, today),
            status: MatchStatus::Finished,
            match_report_url,
        });
    }

    Ok(matches)
}
