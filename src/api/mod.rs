//! Client for the companion backend's REST API.
//!
//! [`Backend`] is the seam every flow talks through; [`BackendClient`] is
//! the `reqwest` implementation used in production.

mod client;
mod types;


pub use client::BackendClient;
pub use types::*;

use async_trait::async_trait;

use crate::config::ApiLayout;
use crate::error::ApiResult;
use crate::profile::Background;

/// Route used to fetch the signed-in user.
pub const ME_ROUTE: &str = "/api/auth/me";
/// Route used to store the reader's background.
pub const PREFERENCES_ROUTE: &str = "/api/auth/preferences";
/// Route used to end the backend session.
pub const LOGOUT_ROUTE: &str = "/api/auth/logout";
/// Route notified of new personalization preferences.
pub const PERSONALIZE_ROUTE: &str = "/api/personalize";
/// Route that rewrites a chapter for the reader.
pub const PERSONALIZE_CHAPTER_ROUTE: &str = "/api/personalize-chapter";
/// Route that translates text.
pub const TRANSLATE_ROUTE: &str = "/api/translate";
/// Route of the book assistant.
pub const CHAT_ROUTE: &str = "/api/chat";

/// Sign-in/sign-up paths for an [`ApiLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRoutes {
    pub signin: &'static str,
    pub signup: &'static str,
}

impl AuthRoutes {
    /// Routes exposed by the backend for `layout`.
    pub fn for_layout(layout: ApiLayout) -> Self {
        match layout {
            ApiLayout::Site => Self {
                signin: "/api/signin",
                signup: "/api/signup",
            },
            ApiLayout::Widget => Self {
                signin: "/api/auth/signin",
                signup: "/api/auth/signup",
            },
        }
    }
}

/// Operations the backend offers to the widgets.
///
/// Implementations make exactly one attempt per call.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST` sign-in credentials.
    async fn sign_in(&self, request: &SignInRequest) -> ApiResult<AuthResponse>;

    /// `POST` sign-up credentials and questionnaire.
    async fn sign_up(&self, request: &SignUpRequest) -> ApiResult<AuthResponse>;

    /// `POST /api/auth/logout`.
    async fn sign_out(&self, token: &str) -> ApiResult<()>;

    /// `GET /api/auth/me`.
    async fn current_user(&self, token: &str) -> ApiResult<CurrentUser>;

    /// `PUT /api/auth/preferences`.
    async fn save_preferences(&self, token: &str, background: &Background) -> ApiResult<()>;

    /// `POST /api/personalize`.
    async fn personalize(&self, request: &PersonalizeRequest) -> ApiResult<()>;

    /// `POST /api/personalize-chapter`.
    async fn personalize_chapter(
        &self,
        token: &str,
        request: &PersonalizeChapterRequest,
    ) -> ApiResult<PersonalizeChapterResponse>;

    /// `POST /api/translate`.
    async fn translate(
        &self,
        token: Option<&str>,
        request: &TranslateRequest,
    ) -> ApiResult<TranslateResponse>;

    /// `POST /api/chat`.
    async fn chat(&self, token: Option<&str>, request: &ChatRequest) -> ApiResult<ChatResponse>;
}
