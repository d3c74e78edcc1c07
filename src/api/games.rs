use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;
use crate::core::{
    Game,
    GameId,
    GameMetadata,
    GameQuery,
    GameRegistry,
    Page,
    Result,
    StatusResponse,
    UploadTarget,
    ZipStatus,
};
use super::client::ApiClient;

const GAMES_PATH: &str = "/api/games";

impl ApiClient {
    pub async fn list_games(&self, query: &GameQuery) -> Result<Page<Game>> {
        self.get_json(GAMES_PATH, &query.to_params()).await
    }

    pub async fn delete_game(&self, game_id: GameId) -> Result<()> {
        self.execute(Method::DELETE, &format!("{GAMES_PATH}/{game_id}")).await
    }

    /// 后端没有单个游戏的查询接口，逐页查找
    pub async fn find_game(&self, game_id: GameId) -> Result<Option<Game>> {
        let mut query = GameQuery {
            size: 50,
            ..Default::default()
        };

        loop {
            let page = self.list_games(&query).await?;
            if let Some(game) = page.content.into_iter().find(|game| game.id == game_id) {
                return Ok(Some(game));
            }

            query.page += 1;
            if query.page >= page.total_pages {
                debug!(%game_id, pages = query.page, "game not found in listing");
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl GameRegistry for ApiClient {
    async fn create_game(&self, metadata: &GameMetadata) -> Result<Game> {
        self.send_json(Method::POST, GAMES_PATH, Some(metadata)).await
    }

    async fn update_game(&self, game_id: GameId, metadata: &GameMetadata) -> Result<Game> {
        self.send_json(Method::PUT, &format!("{GAMES_PATH}/{game_id}/update"), Some(metadata))
            .await
    }

    async fn request_upload_target(&self, game_id: GameId) -> Result<UploadTarget> {
        self.send_json::<(), _>(Method::POST, &format!("{GAMES_PATH}/{game_id}/upload"), None)
            .await
    }

    async fn complete_upload(&self, game_id: GameId) -> Result<()> {
        self.execute(Method::POST, &format!("{GAMES_PATH}/{game_id}/upload/complete"))
            .await
    }

    async fn game_status(&self, game_id: GameId) -> Result<StatusResponse> {
        self.get_json(&format!("{GAMES_PATH}/{game_id}/status"), &[]).await
    }

    async fn zip_status(&self, game_id: GameId) -> Result<ZipStatus> {
        self.get_json(&format!("{GAMES_PATH}/{game_id}/zip-status"), &[]).await
    }
}
