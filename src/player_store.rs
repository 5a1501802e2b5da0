use crate::models::Player;

#[allow(async_fn_in_trait)]
pub trait PlayerStore {
    async fn find_player(&self, name: &str, team: &str) -> anyhow::Result<Option<Player>>;

    /// Inserts a new player (assigning its id) or overwrites an existing one.
    async fn save_player(&self, player: &mut Player) -> anyhow::Result<()>;

    async fn available_players(&self) -> anyhow::Result<Vec<Player>>;
}
