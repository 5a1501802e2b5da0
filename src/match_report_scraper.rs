use std::time::Duration;

use log::{error, info};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::{
    models::PlayerStatLine,
    scrape_error::ScrapeError,
    source_session::Fetcher,
    text_manipulators::{StatKind, extract_minutes, extract_stat, extract_text, is_header_name},
    utils::in_batches,
};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));

const HEADING_TAGS: [&str; 4] = ["h3", "h4", "strong", "b"];
const UNKNOWN_TEAM: &str = "Unknown";

#[derive(Debug)]
pub struct MatchReportScraper<'a> {
    pub url: &'a str,
}

impl<'a> MatchReportScraper<'a> {
    pub fn new(url: &'a str) -> Self {
        Self { url }
    }

    pub async fn scrape(&self, fetcher: &impl Fetcher) -> anyhow::Result<Vec<PlayerStatLine>> {
        info!("Scraping match report: {}", self.url);
        let html = fetcher.fetch(self.url).await?;
        let player_stats = extract_player_stats(&html, self.url)?;
        info!("Extracted stats for {} players", player_stats.len());
        Ok(player_stats)
    }
}

/// Reads every table on a match report as a lineup. The team is taken from
/// the heading right before each table and carries over to following tables
/// that have none.
pub fn extract_player_stats(html: &str, page_url: &str) -> Result<Vec<PlayerStatLine>, ScrapeError> {
    let document = Html::parse_document(html);
    let mut tables = document.select(&TABLE).peekable();
    if tables.peek().is_none() {
        return Err(ScrapeError::MissingResultsTable {
            url: page_url.to_string(),
        });
    }

    let mut player_stats = vec![];
    let mut current_team: Option<String> = None;
    for table in tables {
        if let Some(team) = preceding_heading(table) {
            current_team = Some(team);
        }
        let team = current_team.as_deref().unwrap_or(UNKNOWN_TEAM);
        for row in table.select(&ROW).filter(|row| owned_by(*row, table)) {
            let cells: Vec<String> = row.select(&CELL).map(extract_text).collect();
            if let Some(line) = stat_line(&cells, team) {
                player_stats.push(line);
            }
        }
    }

    Ok(player_stats)
}

fn stat_line(cells: &[String], team: &str) -> Option<PlayerStatLine> {
    let (player_name, rest) = cells.split_first()?;
    if rest.is_empty() || player_name.is_empty() || is_header_name(player_name) {
        return None;
    }
    let minutes = rest
        .iter()
        .find_map(|cell| extract_minutes(cell))
        .unwrap_or(90);
    let text = rest.join(" ");
    Some(PlayerStatLine {
        player_name: player_name.clone(),
        team: team.to_string(),
        minutes,
        goals: extract_stat(&text, StatKind::Goals),
        assists: extract_stat(&text, StatKind::Assists),
        yellow_cards: extract_stat(&text, StatKind::YellowCards),
        red_cards: extract_stat(&text, StatKind::RedCards),
    })
}

fn preceding_heading(table: ElementRef) -> Option<String> {
    let sibling = table.prev_siblings().find_map(ElementRef::wrap)?;
    if !HEADING_TAGS.contains(&sibling.value().name()) {
        return None;
    }
    let text = extract_text(sibling);
    (!text.is_empty()).then_some(text)
}

// Rows of a nested table belong to the inner table only.
fn owned_by(row: ElementRef, table: ElementRef) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
        .is_some_and(|owner| owner.id() == table.id())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedReport {
    pub url: String,
    pub player_stats: Vec<PlayerStatLine>,
}

/// Scrapes reports `width` at a time with `pause` between batches. Failed
/// pages are logged and left out; they are not retried here.
pub async fn scrape_reports_batch(
    fetcher: &impl Fetcher,
    urls: &[String],
    width: usize,
    pause: Duration,
) -> Vec<ScrapedReport> {
    let results = in_batches(urls, width, pause, |url| async move {
        let stats = MatchReportScraper::new(url).scrape(fetcher).await;
        (url, stats)
    })
    .await;

    results
        .into_iter()
        .filter_map(|(url, result)| match result {
            Ok(player_stats) => Some(ScrapedReport {
                url: url.clone(),
                player_stats,
            }),
            Err(e) => {
                error!("Failed to scrape {url}: {e:#}");
                None
            }
        })
        .collect()
}
