//! Typed wrapper over the backend's HTTP surface.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    cookie::{CookieStore, Jar},
    header::ACCEPT,
    redirect::Policy,
    Client, Method, RequestBuilder, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use shared::{
    domain::{ExerciseKind, Language},
    error::{ApiError, ErrorCode},
    protocol::{
        ChatbotSendRequest, ChatbotSendResponse, ErrorBody, LoginForm, StartWorkoutRequest,
        WorkoutStatus,
    },
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{config::ClientSettings, video_feed::VideoFeed, ChatBackend, WorkoutBackend};

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_HEADER: &str = "X-CSRFToken";

const CHATBOT_SEND_PATH: &str = "/patient/chatbot/send/";
const EXERCISE_START_PATH: &str = "/exercise/start/";
const EXERCISE_STATUS_PATH: &str = "/exercise/status/";
const EXERCISE_RESET_PATH: &str = "/exercise/reset/";
pub(crate) const VIDEO_FEED_PATH: &str = "/exercise/video_feed/";
const DEMO_VIDEO_DIR: &str = "/static/Patients/videos/";
const LOGIN_PATH: &str = "/login/";
const LOGOUT_PATH: &str = "/patient/logout/";
const DASHBOARD_PATH: &str = "/patient/dashboard/";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("unexpected response body from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn api_error(&self) -> ApiError {
        match self {
            ClientError::Status {
                status, message, ..
            } => ApiError::from_status(*status, message.clone()),
            ClientError::Transport { source, .. } => {
                ApiError::new(ErrorCode::Network, source.to_string())
            }
            ClientError::Decode { source, .. } => {
                ApiError::new(ErrorCode::InvalidResponse, source.to_string())
            }
            ClientError::InvalidBaseUrl { .. } | ClientError::Build(_) => {
                ApiError::new(ErrorCode::Rejected, self.to_string())
            }
        }
    }

    pub fn user_message(&self) -> String {
        self.api_error().user_message()
    }
}

/// Normalizes the configured origin so relative endpoint paths join beneath it.
pub fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.is_empty() {
        crate::config::DEFAULT_API_BASE_URL.to_string()
    } else if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&candidate).map_err(|source| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })
}

fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Builds the error for a non-2xx answer, preferring the body's `message`.
fn rejected(path: &str, status: StatusCode, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| {
            format!(
                "API Error: {}",
                status.canonical_reason().unwrap_or("unexpected status")
            )
        });
    error!(endpoint = path, status = status.as_u16(), %message, "api call rejected");
    ClientError::Status {
        endpoint: path.to_string(),
        status: status.as_u16(),
        message,
    }
}

/// Session-aware HTTP client shared by the chat and workout controllers.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    cookies: Arc<Jar>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::from_settings(&ClientSettings {
            api_base_url: base_url.to_string(),
            ..ClientSettings::default()
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let base_url = parse_base_url(&settings.api_base_url)?;
        let cookies = Arc::new(Jar::default());
        // Login success is signalled by a redirect, so redirects are never followed.
        let mut builder = Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .redirect(Policy::none());
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Build)?;
        Ok(Self {
            http,
            base_url,
            cookies,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}{}",
            self.base_url.path().trim_end_matches('/'),
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        );
        url.set_path(&joined);
        url
    }

    pub fn csrf_token(&self) -> Option<String> {
        let header = self.cookies.cookies(&self.base_url)?;
        cookie_value(header.to_str().ok()?, CSRF_COOKIE)
    }

    fn with_csrf(&self, request: RequestBuilder) -> RequestBuilder {
        match self.csrf_token() {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ClientError> {
        let url = self.endpoint(path);
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if method != Method::GET {
            request = self.with_csrf(request);
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        let response = request.send().await.map_err(|source| {
            error!(endpoint = path, error = %source, "api call failed");
            ClientError::Transport {
                endpoint: path.to_string(),
                source,
            }
        })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(json!({ "success": true }));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: path.to_string(),
                source,
            })?;
        if !status.is_success() {
            return Err(rejected(path, status, &bytes));
        }
        let body: Value =
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::Object(Map::new()));

        debug!(endpoint = path, status = status.as_u16(), "api call ok");
        Ok(body)
    }

    async fn call_typed<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let value = self.call(method, path, body).await?;
        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }

    /// Hits the site root so the backend issues a `csrftoken` cookie.
    pub async fn fetch_csrf_token(&self) {
        if let Err(err) = self.http.get(self.endpoint("/")).send().await {
            warn!(error = %err, "failed to fetch csrf token");
        }
    }

    /// Email-only patient login. The backend answers with a redirect on success
    /// and renders a page otherwise; both leave the session cookie in the jar.
    pub async fn login(&self, email: &str) -> Result<(), ClientError> {
        self.fetch_csrf_token().await;

        let request = self
            .http
            .post(self.endpoint(LOGIN_PATH))
            .form(&LoginForm {
                email: email.to_string(),
            });
        let response = self
            .with_csrf(request)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: LOGIN_PATH.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_redirection() {
            info!(status = status.as_u16(), "login accepted");
        } else {
            warn!(
                status = status.as_u16(),
                "login did not redirect; continuing with whatever session was issued"
            );
        }
        Ok(())
    }

    pub async fn logout(&self) -> Result<Value, ClientError> {
        self.call(Method::POST, LOGOUT_PATH, None::<&()>).await
    }

    pub async fn dashboard(&self) -> Result<Value, ClientError> {
        self.call(Method::GET, DASHBOARD_PATH, None::<&()>).await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.dashboard().await.is_ok()
    }

    pub async fn send_chat_message(
        &self,
        message: &str,
        language: Language,
    ) -> Result<ChatbotSendResponse, ClientError> {
        let body = ChatbotSendRequest {
            message: message.to_string(),
            language,
        };
        self.call_typed(Method::POST, CHATBOT_SEND_PATH, Some(&body))
            .await
    }

    pub async fn start_workout(
        &self,
        target_reps: u32,
        exercise: ExerciseKind,
    ) -> Result<Value, ClientError> {
        let body = StartWorkoutRequest {
            target_reps,
            exercise_type: exercise,
        };
        self.call(Method::POST, EXERCISE_START_PATH, Some(&body))
            .await
    }

    pub async fn workout_status(&self) -> Result<WorkoutStatus, ClientError> {
        self.call_typed(Method::GET, EXERCISE_STATUS_PATH, None::<&()>)
            .await
    }

    pub async fn reset_workout(&self) -> Result<Value, ClientError> {
        self.call(Method::POST, EXERCISE_RESET_PATH, None::<&()>)
            .await
    }

    pub fn video_feed_url(&self) -> Url {
        self.endpoint(VIDEO_FEED_PATH)
    }

    pub fn demo_video_url(&self, exercise: ExerciseKind) -> Url {
        self.endpoint(&format!("{DEMO_VIDEO_DIR}{}", exercise.demo_video_file()))
    }

    /// Opens the camera stream. Any non-2xx answer, including the login
    /// redirect served to anonymous callers, is an error.
    pub async fn open_video_feed(&self) -> Result<VideoFeed, ClientError> {
        let transport = |source| ClientError::Transport {
            endpoint: VIDEO_FEED_PATH.to_string(),
            source,
        };
        let response = self
            .http
            .get(self.video_feed_url())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map_err(transport)?;
            return Err(rejected(VIDEO_FEED_PATH, status, &body));
        }
        Ok(VideoFeed::from_response(response))
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_chat(&self, message: &str, language: Language) -> Result<ChatbotSendResponse> {
        Ok(self.send_chat_message(message, language).await?)
    }
}

#[async_trait]
impl WorkoutBackend for ApiClient {
    async fn start_workout(&self, target_reps: u32, exercise: ExerciseKind) -> Result<()> {
        ApiClient::start_workout(self, target_reps, exercise).await?;
        Ok(())
    }

    async fn workout_status(&self) -> Result<WorkoutStatus> {
        Ok(ApiClient::workout_status(self).await?)
    }

    async fn reset_workout(&self) -> Result<()> {
        ApiClient::reset_workout(self).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
