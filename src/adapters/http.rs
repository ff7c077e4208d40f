use crate::config::ApiConfig;
use crate::domain::model::{AccessScope, RawSurveyPayload};
use crate::domain::ports::SurveySource;
use crate::utils::error::{Result, SurveyError};
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const TOKEN_HEADER: &str = "oauthToken";
const TOKEN_KEY_NAME: &str = "access_token";

#[derive(Debug, Deserialize)]
struct SurveyListing {
    #[serde(default)]
    surveys: Vec<SurveyListingEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SurveyListingEntry {
    survey_id: String,
    survey_name: String,
}

/// HTTP client for the survey platform API.
pub struct PavloviaGateway {
    client: Client,
    config: ApiConfig,
}

impl PavloviaGateway {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    fn surveys_url(&self) -> String {
        format!("{}/surveys", self.config.base_url.trim_end_matches('/'))
    }

    /// Exchanges a username and password for an access token (password grant).
    pub async fn request_access_token(&self, username: &str, password: &str) -> Result<String> {
        tracing::debug!("Requesting access token for {}", username);

        let response = self
            .client
            .post(&self.config.oauth_url)
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        match body.get(TOKEN_KEY_NAME).and_then(|v| v.as_str()) {
            Some(token) if status.is_success() => Ok(token.to_string()),
            _ => Err(SurveyError::AuthError {
                status: status.as_u16(),
                message: "Please check the username and password.".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SurveySource for PavloviaGateway {
    async fn list_available(
        &self,
        token: &str,
        scope: AccessScope,
    ) -> Result<IndexMap<String, String>> {
        let url = self.surveys_url();
        tracing::debug!("Listing surveys ({}) from {}", scope.as_query(), url);

        let mut request = self
            .client
            .get(&url)
            .query(&[("accessRights", scope.as_query())])
            .header(TOKEN_HEADER, token);

        if let Some(referer) = &self.config.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("Listing response status: {}", status);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SurveyError::AuthError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unauthorized").to_string(),
            });
        }

        if !status.is_success() {
            return Err(SurveyError::TransportError {
                status: Some(status.as_u16()),
                message: format!("Listing surveys failed for {}", url),
            });
        }

        let listing: SurveyListing = response.json().await?;
        Ok(listing
            .surveys
            .into_iter()
            .map(|s| (s.survey_id, s.survey_name))
            .collect())
    }

    async fn fetch_survey(&self, survey_id: &str, token: &str) -> Result<RawSurveyPayload> {
        let url = format!("{}/{}", self.surveys_url(), survey_id);
        tracing::debug!("Fetching survey from {}", url);

        let response = match self.client.get(&url).header(TOKEN_HEADER, token).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Request for survey {} failed: {}", survey_id, e);
                return Ok(RawSurveyPayload::empty());
            }
        };

        if response.status() != StatusCode::OK {
            tracing::warn!(
                "The following HTTP error occurred for survey {}: {}",
                survey_id,
                response.status().as_u16()
            );
            return Ok(RawSurveyPayload::empty());
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<RawSurveyPayload>(&body).map_err(|e| {
            SurveyError::schema(format!("survey {} returned an unexpected body: {}", survey_id, e))
        })
    }
}
