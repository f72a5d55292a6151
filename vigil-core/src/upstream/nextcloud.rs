//! Direct access to the Nextcloud serverinfo API.

use super::{http_client, json_body, MetricsSource};
use crate::config::NextcloudConfig;
use crate::error::{Result, VigilError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

const SERVERINFO_PATH: &str = "/ocs/v2.php/apps/serverinfo/api/v1/info?format=json";

pub struct NextcloudSource {
    client: Client,
    url: String,
    auth: NextcloudAuth,
}

enum NextcloudAuth {
    Token(String),
    Basic { username: String, password: Option<String> },
    None,
}

impl NextcloudSource {
    pub fn new(config: &NextcloudConfig, timeout: Duration) -> Result<Self> {
        let auth = match (&config.token, &config.username) {
            (Some(token), _) => NextcloudAuth::Token(token.clone()),
            (None, Some(username)) => NextcloudAuth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => NextcloudAuth::None,
        };

        Ok(Self {
            client: http_client(timeout, config.verify_ssl)?,
            url: format!("{}{}", config.url.trim_end_matches('/'), SERVERINFO_PATH),
            auth,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            NextcloudAuth::Token(token) => request.header("NC-Token", token),
            NextcloudAuth::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
            NextcloudAuth::None => request,
        }
    }
}

#[async_trait]
impl MetricsSource for NextcloudSource {
    fn name(&self) -> &str {
        "nextcloud"
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Value> {
        let request = self
            .client
            .get(&self.url)
            .header("OCS-APIRequest", "true")
            .header("Accept", "application/json");
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| VigilError::upstream("nextcloud", e))?;
        json_body("nextcloud", response).await
    }
}
