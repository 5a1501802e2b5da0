use std::fs;

use anyhow::Context;
use serde::Deserialize;

use crate::models::{Division, LeagueId, LeagueRef};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeagueConfig {
    pub id: LeagueId,
    pub name: String,
    pub url: String,
    pub division: Division,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl LeagueConfig {
    pub fn reference(&self) -> LeagueRef {
        LeagueRef {
            id: self.id.clone(),
            name: self.name.clone(),
            division: self.division,
        }
    }
}

const RESULTS_BASE: &str =
    "https://resultadosffcv.isquad.es/total_partidos.php?id_temp=21&id_modalidad=33327";

fn league(id: &str, name: &str, competition: u64, division: Division) -> LeagueConfig {
    LeagueConfig {
        id: id.to_string(),
        name: name.to_string(),
        url: format!("{RESULTS_BASE}&id_competicion={competition}"),
        division,
        active: true,
    }
}

pub fn default_leagues() -> Vec<LeagueConfig> {
    vec![
        league(
            "lliga-comunitat-norte",
            "Lliga Comunitat G.Norte",
            29509377,
            Division::Elite,
        ),
        league("primera-ffcv-g2", "1ª FFCV G2", 29509166, Division::Primera),
        league("segunda-ffcv-g4", "2ª FFCV G4", 29509171, Division::Segunda),
        league("tercera-ffcv-g7", "3ª FFCV G7", 29509180, Division::Tercera),
    ]
}

/// Reads the league table from a JSON array file, or falls back to the
/// built-in FFCV leagues.
pub fn load_leagues(path: Option<&str>) -> anyhow::Result<Vec<LeagueConfig>> {
    let Some(path) = path else {
        return Ok(default_leagues());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_leagues(&raw).with_context(|| format!("invalid league file {path}"))
}

pub fn parse_leagues(raw: &str) -> anyhow::Result<Vec<LeagueConfig>> {
    let leagues: Vec<LeagueConfig> = serde_json::from_str(raw)?;
    for (i, league) in leagues.iter().enumerate() {
        if leagues[..i].iter().any(|other| other.id == league.id) {
            anyhow::bail!("duplicate league id: {}", league.id);
        }
    }
    Ok(leagues)
}
