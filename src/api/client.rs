use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::types::{
    extract_detail, AuthResponse, ChatRequest, ChatResponse, CurrentUser,
    PersonalizeChapterRequest, PersonalizeChapterResponse, PersonalizeRequest,
    PreferencesRequest, SignInRequest, SignUpRequest, TranslateRequest, TranslateResponse,
};
use super::{
    AuthRoutes, Backend, CHAT_ROUTE, LOGOUT_ROUTE, ME_ROUTE, PERSONALIZE_CHAPTER_ROUTE,
    PERSONALIZE_ROUTE, PREFERENCES_ROUTE, TRANSLATE_ROUTE,
};
use crate::config::{BackendConfig, RequestConfig};
use crate::error::{ApiError, ApiResult};
use crate::profile::Background;

/// HTTP client for the companion backend
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    auth_routes: AuthRoutes,
    request_config: RequestConfig,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: &BackendConfig, request_config: RequestConfig) -> ApiResult<Self> {
        let mut builder = Client::builder();
        if request_config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(request_config.timeout_ms));
        }
        let client = builder.build().map_err(ApiError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_routes: AuthRoutes::for_layout(config.layout),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    fn with_token(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) if !token.is_empty() => {
                builder.header("Authorization", format!("Bearer {}", token))
            }
            _ => builder,
        }
    }

    /// Send a request and decode a JSON body
    async fn fetch<T: DeserializeOwned>(&self, route: &str, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.execute(route, builder).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse {
                message: format!("Failed to parse {} response: {}", route, e),
            })
    }

    /// Send a request whose body only acknowledges success
    async fn acknowledge(&self, route: &str, builder: RequestBuilder) -> ApiResult<()> {
        self.execute(route, builder).await?;
        Ok(())
    }

    /// Execute a single request (internal)
    async fn execute(&self, route: &str, builder: RequestBuilder) -> ApiResult<reqwest::Response> {
        debug!(route = %route, "Calling backend");
        let start = Instant::now();

        let response = builder
            .send()
            .await
            .map_err(|e| {
                error!(
                    route = %route,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Backend request failed"
                );
                if e.is_timeout() {
                    ApiError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    ApiError::Http(e)
                }
            })?;

        let status = response.status();
        let latency = start.elapsed();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = extract_detail(&body);
            error!(
                route = %route,
                status = status.as_u16(),
                detail = ?detail,
                latency_ms = latency.as_millis(),
                "Backend returned an error"
            );
            return Err(ApiError::Api {
                status: status.as_u16(),
                detail,
                body,
            });
        }

        info!(
            route = %route,
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            "Backend call succeeded"
        );
        Ok(response)
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn sign_in(&self, request: &SignInRequest) -> ApiResult<AuthResponse> {
        let route = self.auth_routes.signin;
        let builder = self.client.post(self.url(route)).json(request);
        self.fetch(route, builder).await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> ApiResult<AuthResponse> {
        let route = self.auth_routes.signup;
        let builder = self.client.post(self.url(route)).json(request);
        self.fetch(route, builder).await
    }

    async fn sign_out(&self, token: &str) -> ApiResult<()> {
        let builder = Self::with_token(self.client.post(self.url(LOGOUT_ROUTE)), Some(token));
        self.acknowledge(LOGOUT_ROUTE, builder).await
    }

    async fn current_user(&self, token: &str) -> ApiResult<CurrentUser> {
        let builder = Self::with_token(self.client.get(self.url(ME_ROUTE)), Some(token));
        self.fetch(ME_ROUTE, builder).await
    }

    async fn save_preferences(&self, token: &str, background: &Background) -> ApiResult<()> {
        let builder = Self::with_token(self.client.put(self.url(PREFERENCES_ROUTE)), Some(token))
            .json(&PreferencesRequest { background });
        self.acknowledge(PREFERENCES_ROUTE, builder).await
    }

    async fn personalize(&self, request: &PersonalizeRequest) -> ApiResult<()> {
        let builder = self.client.post(self.url(PERSONALIZE_ROUTE)).json(request);
        self.acknowledge(PERSONALIZE_ROUTE, builder).await
    }

    async fn personalize_chapter(
        &self,
        token: &str,
        request: &PersonalizeChapterRequest,
    ) -> ApiResult<PersonalizeChapterResponse> {
        let builder = Self::with_token(
            self.client.post(self.url(PERSONALIZE_CHAPTER_ROUTE)),
            Some(token),
        )
        .json(request);
        self.fetch(PERSONALIZE_CHAPTER_ROUTE, builder).await
    }

    async fn translate(
        &self,
        token: Option<&str>,
        request: &TranslateRequest,
    ) -> ApiResult<TranslateResponse> {
        let builder =
            Self::with_token(self.client.post(self.url(TRANSLATE_ROUTE)), token).json(request);
        self.fetch(TRANSLATE_ROUTE, builder).await
    }

    async fn chat(&self, token: Option<&str>, request: &ChatRequest) -> ApiResult<ChatResponse> {
        let builder = Self::with_token(self.client.post(self.url(CHAT_ROUTE)), token).json(request);
        self.fetch(CHAT_ROUTE, builder).await
    }
}
