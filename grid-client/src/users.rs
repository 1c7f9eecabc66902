//! Account-related API endpoints

use grid_core::dto::queue::UserInfo;
use tracing::error;

use crate::GridClient;
use crate::error::Result;

impl GridClient {
    // =============================================================================
    // Account
    // =============================================================================

    /// Look up the account that owns the configured API key
    ///
    /// Best effort: any failure is logged and yields `None`.
    pub async fn find_user(&self) -> Option<UserInfo> {
        match self.try_find_user().await {
            Ok(user) => Some(user),
            Err(e) => {
                error!("find_user error: {}", e);
                None
            }
        }
    }

    async fn try_find_user(&self) -> Result<UserInfo> {
        let response = self
            .client
            .get(self.url("/v2/find_user"))
            .header("apikey", &self.api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
