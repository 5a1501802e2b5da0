use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ffcv_points::{
    AppConfig, Fetcher, INTERRUPTED_ERROR, LeagueConfig, MatchStore, MemoryStore, Pipeline,
    PlayerStore, StageSummary,
    models::{Division, Match, MatchId, MatchStatus, Player, Position, ScrapedMatch, ScrapingState},
    scrape_reports_batch,
};

const ORIGIN: &str = "https://resultadosffcv.isquad.es";

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn league_url(competition: u32) -> String {
    format!("{ORIGIN}/total_partidos.php?id_competicion={competition}")
}

fn report_url(id: u32) -> String {
    format!("{ORIGIN}/acta_partido.php?id_partido={id}")
}

/// Serves canned pages and fails every other URL.
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
    releases: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| *requested == url)
            .count()
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("HTTP 500 for {url}"))
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// A `MemoryStore` whose writes can be made to fail for a single match.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_upsert_home: Option<String>,
    fail_recovery_of: Mutex<Option<MatchId>>,
}

impl MatchStore for FlakyStore {
    async fn upsert_scraped(
        &self,
        league: &LeagueConfig,
        scraped: &ScrapedMatch,
    ) -> anyhow::Result<MatchId> {
        if self.fail_upsert_home.as_deref() == Some(scraped.home_team.as_str()) {
            anyhow::bail!("db write failed");
        }
        self.inner.upsert_scraped(league, scraped).await
    }

    async fn get(&self, id: MatchId) -> anyhow::Result<Option<Match>> {
        self.inner.get(id).await
    }

    async fn save_scraping(&self, m: &Match) -> anyhow::Result<()> {
        let recovering = m.scraping_status.error.as_deref() == Some(INTERRUPTED_ERROR);
        if recovering && *self.fail_recovery_of.lock().unwrap() == Some(m.id) {
            anyhow::bail!("db write failed");
        }
        self.inner.save_scraping(m).await
    }

    async fn pending_scraping(&self) -> anyhow::Result<Vec<Match>> {
        self.inner.pending_scraping().await
    }

    async fn completed_matches(&self) -> anyhow::Result<Vec<Match>> {
        self.inner.completed_matches().await
    }

    async fn in_progress_matches(&self) -> anyhow::Result<Vec<Match>> {
        self.inner.in_progress_matches().await
    }
}

impl PlayerStore for FlakyStore {
    async fn find_player(&self, name: &str, team: &str) -> anyhow::Result<Option<Player>> {
        self.inner.find_player(name, team).await
    }

    async fn save_player(&self, player: &mut Player) -> anyhow::Result<()> {
        self.inner.save_player(player).await
    }

    async fn available_players(&self) -> anyhow::Result<Vec<Player>> {
        self.inner.available_players().await
    }
}

fn league(id: &str, competition: u32) -> LeagueConfig {
    LeagueConfig {
        id: id.to_string(),
        name: format!("Liga {id}"),
        url: league_url(competition),
        division: Division::Elite,
        active: true,
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scraping.report_pause_ms = 0;
    config
}

fn elite_fetcher() -> ScriptedFetcher {
    ScriptedFetcher::default()
        .with_page(league_url(1), fixture("league_elite.html"))
        .with_page(report_url(101), fixture("report_101.html"))
        .with_page(report_url(102), fixture("report_102.html"))
}

async fn player(store: &MemoryStore, name: &str) -> Player {
    store
        .players()
        .await
        .into_iter()
        .find(|p| p.name == name)
        .unwrap_or_else(|| panic!("no player {name}"))
}

#[tokio::test]
async fn full_update_scores_and_prices_players() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    let fetcher = elite_fetcher();
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    let summary = pipeline.run_full_update().await.unwrap();

    assert_eq!(summary.leagues.succeeded, 1);
    assert_eq!(summary.reports.succeeded, 2);
    assert_eq!(summary.reports.failed, 0);
    assert_eq!(summary.points.succeeded, 6);
    assert_eq!(summary.prices.succeeded, 4);
    assert_eq!(fetcher.releases.load(Ordering::SeqCst), 1);

    let matches = store.matches().await;
    assert_eq!(matches.len(), 2);
    assert!(matches.iter().all(|m| m.status == MatchStatus::Finished));
    assert!(
        matches
            .iter()
            .all(|m| m.scraping_status.status == ScrapingState::Completed)
    );

    // Defender on the home side of a 3-0 win keeps a clean sheet.
    let marc = player(&store, "Marc Soler").await;
    assert_eq!(marc.team, "CD Olimpic");
    assert_eq!(marc.position, Position::Defender);
    assert_eq!(marc.gameweek_stats.len(), 2);
    assert!(marc.gameweek_stats[0].clean_sheet);
    assert_eq!(marc.gameweek_stats[0].points, 6);
    assert!(!marc.gameweek_stats[1].clean_sheet);
    assert_eq!(marc.total_points, 8);
    assert_eq!(marc.season_stats.clean_sheets, 1);
    assert!((marc.form - 4.0).abs() < 1e-9);
    assert_eq!(marc.current_price, 1_080_000);
    assert_eq!(marc.price_history.len(), 1);

    // Came on for 45 minutes: the clean sheet does not count.
    let hugo = player(&store, "Hugo Marti").await;
    assert!(!hugo.gameweek_stats[0].clean_sheet);
    assert_eq!(hugo.total_points, 2 + 4 + 6);

    let pablo = player(&store, "Pablo Ferrer").await;
    assert_eq!(pablo.position, Position::Forward);
    assert_eq!(pablo.total_points, 10);
    assert_eq!(pablo.current_price, 1_200_000);

    let jon = player(&store, "Jon Vidal").await;
    assert_eq!(jon.team, "UD Alzira");
    assert_eq!(jon.season_stats.yellow_cards, 1);
    assert_eq!(jon.total_points, 1 + 12);
}

#[tokio::test]
async fn rerunning_does_not_double_count() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    let fetcher = elite_fetcher();
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    pipeline.run_full_update().await.unwrap();
    let second = pipeline.run_full_update().await.unwrap();

    assert_eq!(second.reports, StageSummary::default());
    assert_eq!(second.points.succeeded, 0);
    assert_eq!(second.points.skipped, 6);
    assert_eq!(store.matches().await.len(), 2);
    assert_eq!(fetcher.requests_for(&report_url(101)), 1);
    assert_eq!(fetcher.releases.load(Ordering::SeqCst), 2);

    let marc = player(&store, "Marc Soler").await;
    assert_eq!(marc.total_points, 8);
    assert_eq!(marc.gameweek_stats.len(), 2);
    assert_eq!(marc.price_history.len(), 2);
}

#[tokio::test]
async fn failing_league_does_not_stop_the_others() {
    let config = config();
    let mut dormant = league("dormant", 3);
    dormant.active = false;
    let leagues = vec![league("broken", 2), league("elite", 1), dormant];
    let fetcher = elite_fetcher();
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    let summary = pipeline.run_full_update().await.unwrap();

    assert_eq!(
        summary.leagues,
        StageSummary {
            succeeded: 1,
            failed: 1,
            skipped: 1,
        }
    );
    assert_eq!(fetcher.requests_for(&league_url(3)), 0);
    assert_eq!(store.matches().await.len(), 2);
    assert_eq!(store.players().await.len(), 4);
}

#[tokio::test]
async fn failed_report_is_recorded_and_retried_until_exhausted() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    // Report 102 is missing, so every fetch of it fails.
    let fetcher = ScriptedFetcher::default()
        .with_page(league_url(1), fixture("league_elite.html"))
        .with_page(report_url(101), fixture("report_101.html"));
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    let first = pipeline.run_full_update().await.unwrap();
    assert_eq!(first.reports.succeeded, 1);
    assert_eq!(first.reports.failed, 1);

    let failed = store
        .matches()
        .await
        .into_iter()
        .find(|m| m.match_report_url.as_deref() == Some(report_url(102).as_str()))
        .unwrap();
    assert_eq!(failed.scraping_status.status, ScrapingState::Failed);
    assert_eq!(failed.scraping_status.attempts, 1);
    assert!(
        failed
            .scraping_status
            .error
            .as_deref()
            .is_some_and(|e| e.contains("HTTP 500"))
    );
    assert!(failed.player_stats.is_empty());

    for _ in 1..5 {
        pipeline.run_full_update().await.unwrap();
    }
    assert_eq!(fetcher.requests_for(&report_url(102)), 5);
    let exhausted = store.load(failed.id).await.unwrap();
    assert_eq!(exhausted.scraping_status.attempts, 5);

    let after = pipeline.run_full_update().await.unwrap();
    assert_eq!(after.reports, StageSummary::default());
    assert_eq!(fetcher.requests_for(&report_url(102)), 5);
    // Points from the good report were only counted once across six runs.
    assert_eq!(player(&store, "Marc Soler").await.total_points, 6);
}

#[tokio::test]
async fn matches_without_a_report_link_are_skipped_uncharged() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    let page = r#"<table>
        <tr><td>22/09/2024</td><td>CD Olimpic</td><td>0 - 2</td><td>UD Alzira</td></tr>
    </table>"#;
    let fetcher = ScriptedFetcher::default().with_page(league_url(1), page);
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    let summary = pipeline.run_full_update().await.unwrap();

    assert_eq!(summary.reports.skipped, 1);
    let matches = store.matches().await;
    assert_eq!(matches[0].scraping_status.status, ScrapingState::Pending);
    assert_eq!(matches[0].scraping_status.attempts, 0);
    assert!(store.players().await.is_empty());
}

#[tokio::test]
async fn interrupted_scrape_is_picked_up_next_run() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    let fetcher = elite_fetcher();
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    pipeline.scrape_all_leagues().await;
    let stuck = store.pending_scraping().await.unwrap()[0].id;
    // A crash right after the attempt was charged leaves the match in progress.
    store.begin_report_scrape(stuck).await.unwrap();

    let summary = pipeline.run_full_update().await.unwrap();
    assert_eq!(summary.reports.succeeded, 2);
    let m = store.load(stuck).await.unwrap();
    assert_eq!(m.scraping_status.status, ScrapingState::Completed);
    assert_eq!(m.scraping_status.attempts, 2);
    assert_eq!(m.scraping_status.error, None);
}

#[tokio::test]
async fn failed_recovery_write_does_not_abort_the_run() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    let fetcher = elite_fetcher();
    let store = FlakyStore::default();
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    pipeline.scrape_all_leagues().await;
    let stuck = store.pending_scraping().await.unwrap()[0].id;
    store.begin_report_scrape(stuck).await.unwrap();
    *store.fail_recovery_of.lock().unwrap() = Some(stuck);

    let summary = pipeline.run_full_update().await.unwrap();

    assert_eq!(summary.reports.succeeded, 1);
    assert_eq!(summary.reports.failed, 1);
    let m = store.load(stuck).await.unwrap();
    assert_eq!(m.scraping_status.status, ScrapingState::InProgress);
    assert_eq!(m.scraping_status.attempts, 1);

    // The other report was still scored and priced.
    assert_eq!(store.inner.players().await.len(), 4);
    let marc = player(&store.inner, "Marc Soler").await;
    assert_eq!(marc.gameweek_stats.len(), 1);
    assert_eq!(marc.price_history.len(), 1);
}

#[tokio::test]
async fn unsaved_matches_count_as_league_failures() {
    let config = config();
    let leagues = vec![league("elite", 1)];
    let fetcher = elite_fetcher();
    let store = FlakyStore {
        fail_upsert_home: Some("UD Alzira".to_string()),
        ..FlakyStore::default()
    };
    let pipeline = Pipeline::new(&config, &leagues, &fetcher, &store, &store);

    let summary = pipeline.scrape_all_leagues().await;

    assert_eq!(
        summary,
        StageSummary {
            succeeded: 0,
            failed: 1,
            skipped: 0,
        }
    );
    let matches = store.inner.matches().await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].home_team, "CD Olimpic");
}

#[tokio::test]
async fn report_batch_leaves_out_failed_pages() {
    let fetcher = ScriptedFetcher::default()
        .with_page(report_url(101), fixture("report_101.html"))
        .with_page(report_url(102), fixture("report_102.html"));
    let urls = vec![report_url(101), report_url(999), report_url(102)];

    let reports = scrape_reports_batch(&fetcher, &urls, 2, Duration::ZERO).await;

    assert_eq!(reports.len(), urls.len() - 1);
    assert_eq!(reports[0].url, report_url(101));
    assert_eq!(reports[0].player_stats.len(), 4);
    assert_eq!(reports[1].url, report_url(102));
    assert_eq!(fetcher.requests_for(&report_url(999)), 1);
}
