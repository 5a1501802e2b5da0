use crate::models::ScrapingState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    /// The page has no results table at all, so nothing on it can be trusted.
    MissingResultsTable { url: String },
    InvalidUrl(String),
    InvalidTransition {
        from: ScrapingState,
        to: ScrapingState,
    },
    AttemptsExhausted { attempts: u32 },
}

impl std::fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeError::MissingResultsTable { url } => {
                write!(f, "no results table found on page: {url}")
            }
            ScrapeError::InvalidUrl(url) => write!(f, "the supplied URL is not valid: {url}"),
            ScrapeError::InvalidTransition { from, to } => {
                write!(f, "cannot move scraping status from {from} to {to}")
            }
            ScrapeError::AttemptsExhausted { attempts } => {
                write!(f, "scraping attempts exhausted after {attempts} tries")
            }
        }
    }
}

impl std::error::Error for ScrapeError {}
