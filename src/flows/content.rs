use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::unless_cancelled;
use crate::api::{Backend, PersonalizeChapterRequest, TranslateRequest};
use crate::error::{ApiError, ApiResult};
use crate::session::SessionStore;

/// Notice shown when the chapter rewrite fails.
pub const PERSONALIZE_FAILED_NOTICE: &str = "Failed to personalize content. Please try again.";
/// Notice shown when the chapter translation fails.
pub const TRANSLATE_FAILED_NOTICE: &str = "Failed to translate content. Please try again.";

/// Which rendering of the chapter is visible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContentVariant {
    #[default]
    Original,
    Personalized,
    Translated,
}

impl std::fmt::Display for ContentVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentVariant::Original => write!(f, "original"),
            ContentVariant::Personalized => write!(f, "personalized"),
            ContentVariant::Translated => write!(f, "translated"),
        }
    }
}

/// Result of [`ContentFlow::show`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentOutcome {
    /// The variant is now visible.
    Shown(ContentVariant),
    /// No session; the host should open the sign-in dialog.
    AuthRequired,
    /// This variant's fetch is already running.
    Busy,
    /// The fetch failed; the visible variant did not change.
    Failed(String),
    /// The flow was torn down mid-fetch.
    Cancelled,
}

#[derive(Debug, Default)]
struct ContentState {
    current: ContentVariant,
    personalized: Option<String>,
    translated: Option<String>,
    personalizing: bool,
    translating: bool,
}

impl ContentState {
    fn cached(&self, variant: ContentVariant) -> Option<&String> {
        match variant {
            ContentVariant::Original => None,
            ContentVariant::Personalized => self.personalized.as_ref(),
            ContentVariant::Translated => self.translated.as_ref(),
        }
    }

    fn in_flight(&mut self, variant: ContentVariant) -> Option<&mut bool> {
        match variant {
            ContentVariant::Original => None,
            ContentVariant::Personalized => Some(&mut self.personalizing),
            ContentVariant::Translated => Some(&mut self.translating),
        }
    }

    fn store(&mut self, variant: ContentVariant, body: String) {
        match variant {
            ContentVariant::Original => {}
            ContentVariant::Personalized => self.personalized = Some(body),
            ContentVariant::Translated => self.translated = Some(body),
        }
    }
}

/// Original / personalized / translated views of one chapter.
///
/// Derived bodies are fetched at most once per instance and cached.
#[derive(Clone)]
pub struct ContentFlow {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    title: Arc<str>,
    original: Arc<str>,
    target_language: Arc<str>,
    state: Arc<RwLock<ContentState>>,
    cancel: CancellationToken,
}

impl ContentFlow {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: SessionStore,
        title: &str,
        original: &str,
        target_language: &str,
    ) -> Self {
        Self {
            backend,
            session,
            title: Arc::from(title),
            original: Arc::from(original),
            target_language: Arc::from(target_language),
            state: Arc::new(RwLock::new(ContentState::default())),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn current(&self) -> ContentVariant {
        self.state.read().await.current
    }

    /// Body of the visible variant
    pub async fn visible_body(&self) -> String {
        let state = self.state.read().await;
        state
            .cached(state.current)
            .cloned()
            .unwrap_or_else(|| self.original.to_string())
    }

    /// Whether the button for `variant` accepts clicks
    pub async fn is_action_enabled(&self, variant: ContentVariant) -> bool {
        let state = self.state.read().await;
        match variant {
            ContentVariant::Original => true,
            ContentVariant::Personalized => !state.personalizing,
            ContentVariant::Translated => !state.translating,
        }
    }

    /// Switch to `variant`, fetching it first if it has never been loaded.
    pub async fn show(&self, variant: ContentVariant) -> ContentOutcome {
        {
            let mut state = self.state.write().await;
            if variant == ContentVariant::Original || state.cached(variant).is_some() {
                state.current = variant;
                return ContentOutcome::Shown(variant);
            }
            if state.in_flight(variant).map(|flag| *flag).unwrap_or(false) {
                return ContentOutcome::Busy;
            }
        }

        let session = self.session.get().await;
        let Some(token) = session.token.filter(|t| !t.is_empty()) else {
            debug!(variant = %variant, "Sign-in required for content action");
            return ContentOutcome::AuthRequired;
        };

        {
            let mut state = self.state.write().await;
            match state.in_flight(variant) {
                Some(flag) if *flag => return ContentOutcome::Busy,
                Some(flag) => *flag = true,
                None => {}
            }
        }

        let result = unless_cancelled(
            &self.cancel,
            self.fetch(variant, &token, session.profile.as_ref()),
        )
        .await;

        let mut state = self.state.write().await;
        if let Some(flag) = state.in_flight(variant) {
            *flag = false;
        }

        match result {
            None => ContentOutcome::Cancelled,
            Some(Ok(body)) => {
                info!(variant = %variant, bytes = body.len(), "Content variant loaded");
                state.store(variant, body);
                state.current = variant;
                ContentOutcome::Shown(variant)
            }
            Some(Err(e)) => {
                error!(variant = %variant, error = %e, "Content action failed");
                let notice = match variant {
                    ContentVariant::Translated => TRANSLATE_FAILED_NOTICE,
                    _ => PERSONALIZE_FAILED_NOTICE,
                };
                ContentOutcome::Failed(notice.to_string())
            }
        }
    }

    async fn fetch(
        &self,
        variant: ContentVariant,
        token: &str,
        profile: Option<&crate::profile::Background>,
    ) -> ApiResult<String> {
        match variant {
            ContentVariant::Original => Ok(self.original.to_string()),
            ContentVariant::Personalized => {
                let request =
                    PersonalizeChapterRequest::new(&*self.title, &*self.original, profile);
                let response = self.backend.personalize_chapter(token, &request).await?;
                Ok(response.personalized_content)
            }
            ContentVariant::Translated => {
                let request = TranslateRequest::new(&*self.original, &*self.target_language)
                    .preserving_code();
                let response = self.backend.translate(Some(token), &request).await?;
                response
                    .text()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::InvalidResponse {
                        message: "translation response carried no text".to_string(),
                    })
            }
        }
    }

    pub fn teardown(&self) {
        self.cancel.cancel();
    }
}
