use crate::domain::model::{AccessScope, RawSurveyPayload};
use crate::utils::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;

/// Destination for exported artifacts. Paths are relative to the storage root.
pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Remote survey platform.
#[async_trait]
pub trait SurveySource: Send + Sync {
    /// Survey id to survey name, in server order.
    async fn list_available(
        &self,
        token: &str,
        scope: AccessScope,
    ) -> Result<IndexMap<String, String>>;

    /// Never fails on an HTTP status: a non-200 answer yields `RawSurveyPayload::empty()`.
    async fn fetch_survey(&self, survey_id: &str, token: &str) -> Result<RawSurveyPayload>;
}

pub trait CredentialStore {
    fn load_token(&self, username: &str) -> Result<String>;
    fn list_users(&self) -> Result<Vec<String>>;
}
