use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use cron::Schedule;
use log::{error, info, warn};

use crate::{
    match_store::MatchStore, pipeline::Pipeline, player_store::PlayerStore,
    source_session::Fetcher,
};

/// Parses `UPDATE_SCHEDULE`. Classic five-field crontab expressions get a
/// seconds field of `0` and have their day-of-week numbers (0 or 7 = Sunday)
/// moved to the `cron` crate's numbering (1 = Sunday). Six and seven field
/// expressions are taken as they are.
pub fn parse_schedule(expr: &str) -> anyhow::Result<Schedule> {
    let expr = expr.trim();
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, day, month, weekday] => {
            let weekday = crontab_weekdays(weekday)
                .with_context(|| format!("invalid update schedule {expr:?}"))?;
            format!("0 {minute} {hour} {day} {month} {weekday}")
        }
        _ => expr.to_string(),
    };
    Schedule::from_str(&normalized).with_context(|| format!("invalid update schedule {expr:?}"))
}

fn cron_weekday(crontab: u32) -> anyhow::Result<u32> {
    anyhow::ensure!(crontab <= 7, "day of week {crontab} is out of range");
    Ok(crontab % 7 + 1)
}

/// Renumbers a crontab day-of-week field. Names and `*` pass through.
fn crontab_weekdays(field: &str) -> anyhow::Result<String> {
    let mut parts = vec![];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        let suffix = step.map(|step| format!("/{step}")).unwrap_or_default();
        let converted = match range.split_once('-') {
            None => match range.parse::<u32>() {
                Ok(day) => format!("{}{suffix}", cron_weekday(day)?),
                Err(_) => part.to_string(),
            },
            Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
                // Ranges ending on Sunday-as-7 wrap past Saturday.
                (Ok(start), Ok(7)) if start > 0 => {
                    anyhow::ensure!(step.is_none(), "stepped range ending on 7 in {field:?}");
                    match cron_weekday(start)? {
                        7 => "7,1".to_string(),
                        start => format!("{start}-7,1"),
                    }
                }
                (Ok(start), Ok(end)) => {
                    let end = if end == 7 { 7 } else { cron_weekday(end)? };
                    format!("{}-{end}{suffix}", cron_weekday(start)?)
                }
                _ => part.to_string(),
            },
        };
        parts.push(converted);
    }
    Ok(parts.join(","))
}

/// Runs the pipeline at every tick of `schedule` until Ctrl-C. A failed run
/// is logged and the next tick still fires.
pub async fn run_scheduled<F, M, P>(
    pipeline: &Pipeline<'_, F, M, P>,
    schedule: &Schedule,
) -> anyhow::Result<()>
where
    F: Fetcher,
    M: MatchStore,
    P: PlayerStore,
{
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Update schedule has no upcoming runs, stopping");
            return Ok(());
        };
        info!("Next points update at {next}");
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down scheduler");
                return Ok(());
            }
        }

        info!("Running scheduled points update...");
        match pipeline.run_full_update().await {
            Ok(_) => info!("Scheduled update completed"),
            Err(e) => error!("Scheduled update failed: {e:#}"),
        }
    }
}
