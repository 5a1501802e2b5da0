use chrono::{DateTime, Utc};

use crate::{
    config::MarketConfig,
    models::{Player, PricePoint},
};

/// Form of this many points per game counts as a performance factor of 1.
pub const EXPECTED_FORM: f64 = 5.0;

/// Next market price from form and net transfers, clamped to the market
/// bounds.
///
/// `delta = price * change_factor * (form / 5 + (in - out) / sensitivity)`
pub fn compute_price(
    current_price: i64,
    form: f64,
    transfers_in: i64,
    transfers_out: i64,
    config: &MarketConfig,
) -> i64 {
    let min = config.min_player_price;
    let max = config.max_player_price;

    let performance_factor = form / EXPECTED_FORM;
    let net_transfers = transfers_in as f64 - transfers_out as f64;
    let demand_factor = net_transfers / config.demand_sensitivity;
    let delta = (current_price as f64
        * config.price_change_factor
        * (performance_factor + demand_factor))
        .round();

    let next = current_price as f64 + delta;
    if next.is_nan() {
        return current_price.clamp(min, max);
    }
    // Clamp as float first: an extreme delta can be far outside i64.
    next.clamp(min as f64, max as f64) as i64
}

/// Reprices `player` and appends the result to its history. Points and stats
/// are not touched.
pub fn update_price(player: &mut Player, config: &MarketConfig, now: DateTime<Utc>) -> i64 {
    let price = compute_price(
        player.current_price,
        player.form,
        player.transfers_in,
        player.transfers_out,
        config,
    );
    player.current_price = price;
    player.price_history.push(PricePoint {
        price,
        date: now,
        gameweek: player.gameweek_stats.last().map(|gw| gw.gameweek),
    });
    player.last_updated = now;
    price
}
