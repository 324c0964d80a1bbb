use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::unless_cancelled;
use crate::api::{Backend, PersonalizeRequest};
use crate::profile::{Background, ExperienceLevel, HardwareLevel};
use crate::session::SessionStore;

/// Message shown when saving without a session.
pub const SIGN_IN_FIRST_MESSAGE: &str = "Please sign in first";
/// Message shown after both save calls succeed.
pub const SAVED_MESSAGE: &str = "Preferences saved successfully!";
/// Fallback when a save call fails without a backend detail.
pub const SAVE_FAILED_MESSAGE: &str = "Error saving preferences";

/// Callback that closes the hosting panel.
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

/// Result of [`PersonalizationFlow::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    NotSignedIn,
    Failed(String),
    Cancelled,
}

/// Background preferences panel.
pub struct PersonalizationFlow {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    background: Background,
    saving: bool,
    message: Option<String>,
    user_id: Option<String>,
    close_delay: Duration,
    on_close: Option<CloseCallback>,
    cancel: CancellationToken,
}

impl PersonalizationFlow {
    pub fn new(backend: Arc<dyn Backend>, session: SessionStore) -> Self {
        Self {
            backend,
            session,
            background: Background::panel_default(),
            saving: false,
            message: None,
            user_id: None,
            close_delay: Duration::from_millis(1500),
            on_close: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Identifier sent to the personalization endpoint. Defaults to the
    /// session email.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn with_on_close(mut self, on_close: CloseCallback) -> Self {
        self.on_close = Some(on_close);
        self
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Inline status line under the save button
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_experience(&mut self, level: ExperienceLevel) {
        self.background.experience_level = level;
    }

    pub fn set_hardware(&mut self, level: HardwareLevel) {
        self.background.hardware_knowledge = Some(level);
    }

    /// Returns whether `language` is selected afterwards.
    pub fn toggle_language(&mut self, language: &str) -> bool {
        self.background.programming_languages.toggle(language)
    }

    /// Returns whether `interest` is selected afterwards.
    pub fn toggle_interest(&mut self, interest: &str) -> bool {
        self.background.interests.toggle(interest)
    }

    /// Replace the edit state with the background remembered by the backend.
    ///
    /// Failures are logged and the current edit state is kept. Returns
    /// whether anything was loaded.
    pub async fn load(&mut self) -> bool {
        let Some(token) = self.session.token().await else {
            debug!("No session, keeping default background");
            return false;
        };

        match unless_cancelled(&self.cancel, self.backend.current_user(&token)).await {
            Some(Ok(user)) => match user.background {
                Some(background) => {
                    self.background = background;
                    true
                }
                None => false,
            },
            Some(Err(e)) => {
                warn!(error = %e, "Failed to load saved background");
                false
            }
            None => false,
        }
    }

    /// Persist the background, then ask the backend to re-personalize.
    ///
    /// Both calls must succeed for the save to count. On success the panel
    /// closes after the configured delay.
    pub async fn save(&mut self) -> SaveOutcome {
        self.saving = true;
        self.message = None;
        let outcome = self.run_save().await;
        self.saving = false;
        outcome
    }

    async fn run_save(&mut self) -> SaveOutcome {
        let session = self.session.get().await;
        let Some(token) = session.token.filter(|t| !t.is_empty()) else {
            self.message = Some(SIGN_IN_FIRST_MESSAGE.to_string());
            return SaveOutcome::NotSignedIn;
        };

        let saved = unless_cancelled(
            &self.cancel,
            self.backend.save_preferences(&token, &self.background),
        )
        .await;
        match saved {
            None => return SaveOutcome::Cancelled,
            Some(Err(e)) => {
                error!(error = %e, "Failed to save preferences");
                return self.fail(e.user_message(SAVE_FAILED_MESSAGE));
            }
            Some(Ok(())) => {}
        }

        if let Err(e) = self.session.set_profile(&self.background).await {
            warn!(error = %e, "Failed to update stored profile");
        }
        self.message = Some(SAVED_MESSAGE.to_string());

        let user_id = self.user_id.clone().or(session.email);
        let request = PersonalizeRequest::new(user_id, self.background.clone());
        match unless_cancelled(&self.cancel, self.backend.personalize(&request)).await {
            None => return SaveOutcome::Cancelled,
            Some(Err(e)) => {
                error!(error = %e, "Failed to notify personalization endpoint");
                return self.fail(e.user_message(SAVE_FAILED_MESSAGE));
            }
            Some(Ok(())) => {}
        }

        info!("Preferences saved");
        self.schedule_close();
        SaveOutcome::Saved
    }

    fn fail(&mut self, message: String) -> SaveOutcome {
        self.message = Some(message.clone());
        SaveOutcome::Failed(message)
    }

    fn schedule_close(&self) {
        let Some(on_close) = self.on_close.clone() else {
            return;
        };
        let delay = self.close_delay;
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("Panel close cancelled"),
                _ = tokio::time::sleep(delay) => on_close(),
            }
        });
    }

    /// Drop in-flight calls and any pending close.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }
}
