use reqwest::Method;
use crate::core::{Page, Result, User, UserQuery};
use super::client::ApiClient;

const USERS_PATH: &str = "/admin/users";

impl ApiClient {
    pub async fn list_users(&self, query: &UserQuery) -> Result<Page<User>> {
        self.get_json(USERS_PATH, &query.to_params()).await
    }

    pub async fn get_user(&self, user_id: u64) -> Result<User> {
        self.get_json(&format!("{USERS_PATH}/{user_id}"), &[]).await
    }

    pub async fn delete_user(&self, user_id: u64) -> Result<()> {
        self.execute(Method::DELETE, &format!("{USERS_PATH}/{user_id}")).await
    }
}
