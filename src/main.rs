use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ffcv_points::{
    MatchStore, MemoryStore, PgStore, Pipeline, PlayerStore, ScrapingContext, parse_schedule,
    run_scheduled,
};
use log::{LevelFilter, info, warn};

#[derive(Parser)]
#[command(name = "ffcv_points", about = "FFCV fantasy points and prices updater")]
struct Cli {
    /// Keep matches and players in memory instead of Postgres.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run one full update and exit.
    Run,
    /// Run an update on every tick of UPDATE_SCHEDULE.
    Schedule,
}

async fn execute(
    command: Command,
    context: &ScrapingContext,
    matches: &impl MatchStore,
    players: &impl PlayerStore,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(
        &context.config,
        &context.leagues,
        &context.session,
        matches,
        players,
    );
    match command {
        Command::Run => {
            pipeline.run_full_update().await?;
            Ok(())
        }
        Command::Schedule => {
            let Some(expr) = context.config.scraping.update_schedule.as_deref() else {
                warn!("UPDATE_SCHEDULE is not set, automatic updates are disabled");
                return Ok(());
            };
            let schedule = parse_schedule(expr)?;
            info!("Automatic updates scheduled with {expr:?}");
            run_scheduled(&pipeline, &schedule).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let context = ScrapingContext::new()?;
    info!("Loaded {} leagues", context.leagues.len());

    if cli.dry_run {
        info!("Dry run: nothing will be persisted");
        let store = MemoryStore::new();
        execute(cli.command, &context, &store, &store).await
    } else {
        let database_url = context
            .config
            .scraping
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set unless --dry-run is given")?;
        let store = PgStore::connect(database_url).await?;
        execute(cli.command, &context, &store, &store).await
    }
}
