//! Small, pure text heuristics used by the page extractors.
//!
//! Everything here is best effort: results pages are hand-maintained HTML and
//! the same information shows up in several spellings. Each helper takes plain
//! text and never fails, so a single odd cell cannot take a whole page down.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use url::Url;

use crate::scrape_error::ScrapeError;

static SCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*-\s*(\d+)").expect("valid regex"));
static DATE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/\-\s]+").expect("valid regex"));
// 90' / 90’ / 90 min
static MINUTE_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,3})\s*(?:['’′]|min)").expect("valid regex"));
// A cell that only holds "(90)".
static MINUTE_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\((\d{1,3})\)\s*$").expect("valid regex"));

pub const MAX_MINUTES: u32 = 90;

pub fn extract_text(node: ElementRef) -> String {
    node.text()
        .collect::<String>()
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// `"2 - 1"` -> `(2, 1)`.
pub fn parse_score(text: &str) -> Option<(u32, u32)> {
    let caps = SCORE.captures(text)?;
    let home = caps.get(1)?.as_str().parse().ok()?;
    let away = caps.get(2)?.as_str().parse().ok()?;
    Some((home, away))
}

/// Reads `day month year` from the first three tokens split on `/`, `-` or
/// whitespace. Anything unreadable becomes `today`.
pub fn parse_date(text: &str, today: NaiveDate) -> NaiveDate {
    let parts: Vec<&str> = DATE_SEPARATORS
        .split(text.trim())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() < 3 {
        return today;
    }
    let (Ok(day), Ok(month), Ok(year)) = (
        parts[0].parse::<u32>(),
        parts[1].parse::<u32>(),
        parts[2].parse::<i32>(),
    ) else {
        return today;
    };
    let year = if year < 100 { year + 2000 } else { year };
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
}

/// Minutes played from a single cell, clamped to a full match.
pub fn extract_minutes(text: &str) -> Option<u32> {
    let caps = MINUTE_MARK
        .captures(text)
        .or_else(|| MINUTE_PAREN.captures(text))?;
    let minutes: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(minutes.min(MAX_MINUTES))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Goals,
    Assists,
    YellowCards,
    RedCards,
}

struct KeywordPattern {
    keyword: &'static str,
    regex: Regex,
}

fn keyword_patterns(keywords: &[&'static str]) -> Vec<KeywordPattern> {
    keywords
        .iter()
        .map(|&keyword| KeywordPattern {
            keyword,
            regex: Regex::new(&format!(r"(\d+)\s*{keyword}|{keyword}\w*\s*\(?(\d+)\)?"))
                .expect("valid regex"),
        })
        .collect()
}

static GOAL_PATTERNS: Lazy<Vec<KeywordPattern>> = Lazy::new(|| keyword_patterns(&["gol", "goles"]));
static ASSIST_PATTERNS: Lazy<Vec<KeywordPattern>> =
    Lazy::new(|| keyword_patterns(&["asist", "pase"]));
static YELLOW_PATTERNS: Lazy<Vec<KeywordPattern>> =
    Lazy::new(|| keyword_patterns(&["amarilla", "yellow"]));
static RED_PATTERNS: Lazy<Vec<KeywordPattern>> =
    Lazy::new(|| keyword_patterns(&["roja", "red", "expuls"]));

impl StatKind {
    fn patterns(self) -> &'static [KeywordPattern] {
        match self {
            StatKind::Goals => &GOAL_PATTERNS,
            StatKind::Assists => &ASSIST_PATTERNS,
            StatKind::YellowCards => &YELLOW_PATTERNS,
            StatKind::RedCards => &RED_PATTERNS,
        }
    }
}

/// Counts a stat from keyword-adjacent digits (`"2 goles"`, `"gol (2)"`).
/// A bare keyword counts once, no keyword counts zero. Minute markers are
/// dropped first so `"gol 34'"` is one goal, not thirty-four.
pub fn extract_stat(text: &str, kind: StatKind) -> u32 {
    let lowered = text.to_lowercase();
    let text = MINUTE_MARK.replace_all(&lowered, " ");
    for pattern in kind.patterns() {
        if let Some(caps) = pattern.regex.captures(&text) {
            let count = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            if let Some(count) = count {
                return count;
            }
        }
        if text.contains(pattern.keyword) {
            return 1;
        }
    }
    0
}

/// Header rows repeat the column title where a player name would be.
pub fn is_header_name(name: &str) -> bool {
    name.to_lowercase().contains("jugador")
}

/// Makes a report link absolute against the origin of the page it came from.
pub fn resolve_report_url(href: &str, page_url: &str) -> Result<String, ScrapeError> {
    let href = href.trim();
    if href.starts_with("http") {
        return Ok(href.to_string());
    }
    let page = Url::parse(page_url).map_err(|_| ScrapeError::InvalidUrl(page_url.to_string()))?;
    let origin = Url::parse(&page.origin().ascii_serialization())
        .map_err(|_| ScrapeError::InvalidUrl(page_url.to_string()))?;
    origin
        .join(href)
        .map(String::from)
        .map_err(|_| ScrapeError::InvalidUrl(href.to_string()))
}
