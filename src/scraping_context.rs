use crate::{
    config::AppConfig,
    leagues::{LeagueConfig, load_leagues},
    source_session::SourceSession,
};

/// Everything a run needs that comes from the environment.
pub struct ScrapingContext {
    pub config: AppConfig,
    pub leagues: Vec<LeagueConfig>,
    pub session: SourceSession,
}

impl ScrapingContext {
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::new()?;
        let leagues = load_leagues(config.scraping.leagues_file.as_deref())?;
        let session = SourceSession::new(&config.scraping)?;
        Ok(ScrapingContext {
            config,
            leagues,
            session,
        })
    }
}
