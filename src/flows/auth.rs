use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::unless_cancelled;
use crate::api::{Backend, SignInRequest, SignUpRequest};
use crate::error::{FlowError, FlowResult, StorageResult};
use crate::profile::{split_interests, Background, ExperienceLevel, HardwareLevel, SelectionSet};
use crate::session::{Session, SessionStore};

/// Shown when the backend gives no usable reason for a failure.
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed";

/// Which form is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

impl AuthMode {
    fn toggled(self) -> Self {
        match self {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::SignIn => write!(f, "signin"),
            AuthMode::SignUp => write!(f, "signup"),
        }
    }
}

/// Where the form is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    CollectingCredentials,
    /// Sign-up step 2
    CollectingBackground,
    Submitting,
    Succeeded,
    Failed(String),
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::CollectingCredentials => write!(f, "collecting credentials"),
            AuthState::CollectingBackground => write!(f, "collecting background"),
            AuthState::Submitting => write!(f, "submitting"),
            AuthState::Succeeded => write!(f, "signed in"),
            AuthState::Failed(_) => write!(f, "showing an error"),
        }
    }
}

/// Result of [`AuthFlow::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Session stored; the hosting dialog may close.
    Succeeded(Session),
    /// Message to show inline.
    Failed(String),
    /// The flow was torn down before the backend answered.
    Cancelled,
}

/// Sign-up step 2 answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Questionnaire {
    pub experience: ExperienceLevel,
    pub hardware: Option<HardwareLevel>,
    pub languages: SelectionSet,
    pub interests: SelectionSet,
    /// Comma-separated free-text interests
    pub interests_text: String,
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self {
            experience: ExperienceLevel::Beginner,
            hardware: None,
            languages: ["python"].into_iter().collect(),
            interests: SelectionSet::new(),
            interests_text: String::new(),
        }
    }
}

impl Questionnaire {
    pub fn toggle_language(&mut self, language: impl Into<String>) -> bool {
        self.languages.toggle(language)
    }

    pub fn toggle_interest(&mut self, interest: impl Into<String>) -> bool {
        self.interests.toggle(interest)
    }

    /// The background as submitted: picked interests followed by the
    /// split, trimmed free-text ones.
    pub fn to_background(&self) -> Background {
        let mut interests = self.interests.clone();
        for interest in split_interests(&self.interests_text) {
            interests.insert(interest);
        }

        Background {
            experience_level: self.experience,
            hardware_knowledge: self.hardware,
            programming_languages: self.languages.clone(),
            interests,
        }
    }
}

/// Callback run after a successful sign-in/sign-up.
pub type AuthCompletion = Arc<dyn Fn(&Session) + Send + Sync>;

/// Sign-in / two-step sign-up form.
///
/// Sign-in submits straight from the credentials step. Sign-up validates
/// name, email and password before moving to the questionnaire, and submits
/// both together.
pub struct AuthFlow {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    mode: AuthMode,
    state: AuthState,
    step: u8,
    name: String,
    email: String,
    password: String,
    questionnaire: Questionnaire,
    on_success: Option<AuthCompletion>,
    cancel: CancellationToken,
}

impl AuthFlow {
    pub fn new(backend: Arc<dyn Backend>, session: SessionStore, mode: AuthMode) -> Self {
        Self {
            backend,
            session,
            mode,
            state: AuthState::CollectingCredentials,
            step: 1,
            name: String::new(),
            email: String::new(),
            password: String::new(),
            questionnaire: Questionnaire::default(),
            on_success: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Run `callback` once the session has been stored.
    pub fn with_on_success(mut self, callback: impl Fn(&Session) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Start from a prefilled questionnaire.
    pub fn with_questionnaire(mut self, questionnaire: Questionnaire) -> Self {
        self.questionnaire = questionnaire;
        self
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// 1 for credentials, 2 for the sign-up questionnaire.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Inline error, if the last submit failed.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            AuthState::Failed(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.state == AuthState::Submitting
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    pub fn questionnaire_mut(&mut self) -> &mut Questionnaire {
        &mut self.questionnaire
    }

    /// Switch between sign-in and sign-up.
    ///
    /// Only allowed on step 1. Resets to step 1 and clears the error; typed
    /// fields are kept.
    pub fn set_mode(&mut self, mode: AuthMode) -> FlowResult<()> {
        if self.step != 1 || matches!(self.state, AuthState::Submitting | AuthState::Succeeded) {
            return Err(self.invalid("switch mode"));
        }
        self.mode = mode;
        self.step = 1;
        self.state = AuthState::CollectingCredentials;
        Ok(())
    }

    pub fn toggle_mode(&mut self) -> FlowResult<()> {
        self.set_mode(self.mode.toggled())
    }

    /// Sign-up step 1 → step 2.
    pub fn advance(&mut self) -> FlowResult<()> {
        if self.mode != AuthMode::SignUp
            || self.step != 1
            || matches!(self.state, AuthState::Submitting | AuthState::Succeeded)
        {
            return Err(self.invalid("continue to the questionnaire"));
        }

        require("name", &self.name)?;
        require("email", &self.email)?;
        require("password", &self.password)?;

        self.step = 2;
        self.state = AuthState::CollectingBackground;
        Ok(())
    }

    /// Sign-up step 2 → step 1, keeping everything typed so far.
    pub fn back(&mut self) -> FlowResult<()> {
        if self.step != 2 || matches!(self.state, AuthState::Submitting | AuthState::Succeeded) {
            return Err(self.invalid("go back"));
        }
        self.step = 1;
        self.state = AuthState::CollectingCredentials;
        Ok(())
    }

    /// Send the form to the backend.
    ///
    /// Backend failures become [`AuthOutcome::Failed`]; only misuse of the
    /// state machine is an `Err`.
    pub async fn submit(&mut self) -> FlowResult<AuthOutcome> {
        if matches!(self.state, AuthState::Submitting | AuthState::Succeeded) {
            return Err(self.invalid("submit"));
        }
        match self.mode {
            AuthMode::SignIn => {
                require("email", &self.email)?;
                require("password", &self.password)?;
            }
            AuthMode::SignUp if self.step != 2 => {
                return Err(self.invalid("submit before the questionnaire"));
            }
            AuthMode::SignUp => {}
        }

        let previous = std::mem::replace(&mut self.state, AuthState::Submitting);
        let resume = match previous {
            AuthState::CollectingBackground => AuthState::CollectingBackground,
            _ if self.step == 2 => AuthState::CollectingBackground,
            _ => AuthState::CollectingCredentials,
        };

        let submitted_profile = match self.mode {
            AuthMode::SignUp => Some(self.questionnaire.to_background()),
            AuthMode::SignIn => None,
        };

        let call = async {
            match &submitted_profile {
                Some(background) => {
                    self.backend
                        .sign_up(&SignUpRequest {
                            email: self.email.clone(),
                            password: self.password.clone(),
                            name: self.name.clone(),
                            background: background.clone(),
                        })
                        .await
                }
                None => {
                    self.backend
                        .sign_in(&SignInRequest {
                            email: self.email.clone(),
                            password: self.password.clone(),
                        })
                        .await
                }
            }
        };

        let result = match unless_cancelled(&self.cancel, call).await {
            Some(result) => result,
            None => {
                self.state = resume;
                return Ok(AuthOutcome::Cancelled);
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let message = e.user_message(AUTH_FAILED_MESSAGE);
                warn!(mode = %self.mode, error = %e, "Authentication rejected");
                return Ok(self.fail(message));
            }
        };

        let Some(token) = response.bearer_token() else {
            error!(mode = %self.mode, "Authentication response carried no token");
            return Ok(self.fail(AUTH_FAILED_MESSAGE.to_string()));
        };

        let profile = submitted_profile.or_else(|| {
            response
                .user
                .as_ref()
                .and_then(|user| user.background.clone())
        });

        if let Err(e) = self
            .session
            .set_authenticated(token, &self.email, profile.as_ref())
            .await
        {
            error!(error = %e, "Failed to store session");
            return Ok(self.fail(AUTH_FAILED_MESSAGE.to_string()));
        }

        self.state = AuthState::Succeeded;
        let session = Session {
            token: Some(token.to_string()),
            email: Some(self.email.clone()),
            profile,
        };
        info!(mode = %self.mode, "Signed in");

        if let Some(on_success) = &self.on_success {
            on_success(&session);
        }

        Ok(AuthOutcome::Succeeded(session))
    }

    /// Drop any in-flight submit.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this flow's requests.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn fail(&mut self, message: String) -> AuthOutcome {
        self.state = AuthState::Failed(message.clone());
        AuthOutcome::Failed(message)
    }

    fn invalid(&self, action: &str) -> FlowError {
        FlowError::InvalidTransition {
            from: self.state.to_string(),
            action: action.to_string(),
        }
    }
}

fn require(field: &str, value: &str) -> FlowResult<()> {
    if value.trim().is_empty() {
        return Err(FlowError::Validation {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Forget the session.
///
/// The backend is told first on a best-effort basis; its failure never
/// keeps the local session alive.
pub async fn sign_out(backend: &dyn Backend, session: &SessionStore) -> StorageResult<()> {
    if let Some(token) = session.token().await {
        if let Err(e) = backend.sign_out(&token).await {
            warn!(error = %e, "Backend logout failed, clearing local session anyway");
        }
    }

    session.clear().await?;
    info!("Signed out");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::ScriptedBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn build(backend: ScriptedBackend, mode: AuthMode) -> (AuthFlow, Arc<ScriptedBackend>, SessionStore) {
        let backend = Arc::new(backend);
        let session = SessionStore::in_memory();
        let flow = AuthFlow::new(backend.clone(), session.clone(), mode);
        (flow, backend, session)
    }

    #[test]
    fn test_advance_requires_all_credentials() {
        let cases = [
            ("", "a@b.c", "pw", "name"),
            ("Ada", "", "pw", "email"),
            ("Ada", "a@b.c", "", "password"),
            ("  ", "a@b.c", "pw", "name"),
        ];

        for (name, email, password, missing) in cases {
            let (mut flow, _, _) = build(ScriptedBackend::new(), AuthMode::SignUp);
            flow.set_name(name);
            flow.set_email(email);
            flow.set_password(password);

            assert_eq!(
                flow.advance(),
                Err(FlowError::Validation {
                    field: missing.to_string()
                })
            );
            assert_eq!(flow.step(), 1);
            assert_eq!(flow.state(), &AuthState::CollectingCredentials);
        }
    }

    #[test]
    fn test_back_preserves_entered_values() {
        let (mut flow, _, _) = build(ScriptedBackend::new(), AuthMode::SignUp);
        flow.set_name("Ada");
        flow.set_email("ada@example.com");
        flow.set_password("secret");
        flow.advance().unwrap();
        assert_eq!(flow.state(), &AuthState::CollectingBackground);

        flow.back().unwrap();
        assert_eq!(flow.step(), 1);
        assert_eq!(flow.name(), "Ada");
        assert_eq!(flow.email(), "ada@example.com");
        flow.advance().unwrap();
    }

    #[test]
    fn test_mode_toggle_only_on_step_one() {
        let (mut flow, _, _) = build(ScriptedBackend::new(), AuthMode::SignUp);
        flow.set_name("Ada");
        flow.set_email("ada@example.com");
        flow.set_password("secret");
        flow.advance().unwrap();

        assert!(matches!(
            flow.toggle_mode(),
            Err(FlowError::InvalidTransition { .. })
        ));

        flow.back().unwrap();
        flow.toggle_mode().unwrap();
        assert_eq!(flow.mode(), AuthMode::SignIn);
        // Typed fields survive the toggle.
        assert_eq!(flow.email(), "ada@example.com");
    }

    #[test]
    fn test_advance_is_sign_up_only() {
        let (mut flow, _, _) = build(ScriptedBackend::new(), AuthMode::SignIn);
        flow.set_name("Ada");
        flow.set_email("ada@example.com");
        flow.set_password("secret");
        assert!(matches!(flow.advance(), Err(FlowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_sign_up_cannot_submit_from_step_one() {
        let (mut flow, backend, _) = build(ScriptedBackend::new(), AuthMode::SignUp);
        assert!(matches!(
            flow.submit().await,
            Err(FlowError::InvalidTransition { .. })
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_success_stores_session() {
        let (mut flow, backend, session) = build(
            ScriptedBackend::new().reply(json!({"token": "tok-1"})),
            AuthMode::SignIn,
        );
        flow.set_email("Reader@Example.com");
        flow.set_password("pw");

        let outcome = flow.submit().await.unwrap();

        assert!(matches!(outcome, AuthOutcome::Succeeded(_)));
        assert_eq!(flow.state(), &AuthState::Succeeded);
        assert!(session.is_authenticated().await);
        let stored = session.get().await;
        assert_eq!(stored.email.as_deref(), Some("Reader@Example.com"));
        assert_eq!(stored.profile, None);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].body,
            json!({"email": "Reader@Example.com", "password": "pw"})
        );
    }

    #[tokio::test]
    async fn test_sign_in_uses_background_from_response() {
        let (mut flow, _, session) = build(
            ScriptedBackend::new().reply(json!({
                "access_token": "tok",
                "user": {"email": "a@b.c", "background": {"softwareExperience": "advanced"}}
            })),
            AuthMode::SignIn,
        );
        flow.set_email("a@b.c");
        flow.set_password("pw");
        flow.submit().await.unwrap();

        let profile = session.get().await.profile.unwrap();
        assert_eq!(profile.experience_level, ExperienceLevel::Advanced);
    }

    #[tokio::test]
    async fn test_sign_in_tolerates_unexpected_user_record() {
        let (mut flow, _, session) = build(
            ScriptedBackend::new().reply(json!({"token": "tok", "user": {"id": 7}})),
            AuthMode::SignIn,
        );
        flow.set_email("a@b.c");
        flow.set_password("pw");

        let outcome = flow.submit().await.unwrap();

        assert!(matches!(outcome, AuthOutcome::Succeeded(_)), "{:?}", outcome);
        assert!(session.is_authenticated().await);
        assert_eq!(session.get().await.profile, None);
    }

    #[tokio::test]
    async fn test_sign_up_sends_split_interests() {
        let (mut flow, backend, session) = build(
            ScriptedBackend::new().reply(json!({"token": "tok"})),
            AuthMode::SignUp,
        );
        flow.set_name("Ada");
        flow.set_email("ada@example.com");
        flow.set_password("secret");
        flow.advance().unwrap();
        flow.questionnaire_mut().interests_text = "web dev, AI".to_string();

        let outcome = flow.submit().await.unwrap();
        assert!(matches!(outcome, AuthOutcome::Succeeded(_)));

        let calls = backend.calls();
        assert_eq!(
            calls[0].body,
            json!({
                "email": "ada@example.com",
                "password": "secret",
                "name": "Ada",
                "background": {
                    "experience_level": "beginner",
                    "programming_languages": ["python"],
                    "interests": ["web dev", "AI"]
                }
            })
        );

        let profile = session.get().await.profile.unwrap();
        assert_eq!(profile.interests.as_slice(), &["web dev".to_string(), "AI".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_shows_backend_detail() {
        let (mut flow, _, session) = build(
            ScriptedBackend::new().fail(400, Some("Email already registered")),
            AuthMode::SignIn,
        );
        flow.set_email("a@b.c");
        flow.set_password("pw");

        let outcome = flow.submit().await.unwrap();

        assert_eq!(outcome, AuthOutcome::Failed("Email already registered".to_string()));
        assert_eq!(flow.error(), Some("Email already registered"));
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_failure_without_detail_uses_fallback() {
        let (mut flow, _, _) = build(ScriptedBackend::new().fail(500, None), AuthMode::SignIn);
        flow.set_email("a@b.c");
        flow.set_password("pw");

        let outcome = flow.submit().await.unwrap();
        assert_eq!(outcome, AuthOutcome::Failed(AUTH_FAILED_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_response_without_token_fails() {
        let (mut flow, _, session) = build(
            ScriptedBackend::new().reply(json!({"user": {}})),
            AuthMode::SignIn,
        );
        flow.set_email("a@b.c");
        flow.set_password("pw");

        assert_eq!(
            flow.submit().await.unwrap(),
            AuthOutcome::Failed(AUTH_FAILED_MESSAGE.to_string())
        );
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_retry_after_failure_and_toggle_clears_error() {
        let (mut flow, _, _) = build(
            ScriptedBackend::new()
                .fail(401, Some("Invalid credentials"))
                .reply(json!({"token": "tok"})),
            AuthMode::SignIn,
        );
        flow.set_email("a@b.c");
        flow.set_password("wrong");
        flow.submit().await.unwrap();
        assert!(flow.error().is_some());

        flow.toggle_mode().unwrap();
        assert_eq!(flow.error(), None);
        flow.toggle_mode().unwrap();

        flow.set_password("right");
        assert!(matches!(flow.submit().await.unwrap(), AuthOutcome::Succeeded(_)));
    }

    #[tokio::test]
    async fn test_on_success_callback_runs() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let (flow, _, _) = build(
            ScriptedBackend::new().reply(json!({"token": "tok"})),
            AuthMode::SignIn,
        );
        let mut flow = flow.with_on_success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        flow.set_email("a@b.c");
        flow.set_password("pw");
        flow.submit().await.unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_drops_late_response() {
        let (mut flow, _, session) = build(
            ScriptedBackend::new()
                .with_delay(Duration::from_millis(200))
                .reply(json!({"token": "tok"})),
            AuthMode::SignIn,
        );
        flow.set_email("a@b.c");
        flow.set_password("pw");

        let cancel = flow.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        assert_eq!(flow.submit().await.unwrap(), AuthOutcome::Cancelled);
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_even_if_backend_fails() {
        let backend = ScriptedBackend::new().fail(500, None);
        let session = SessionStore::in_memory();
        session
            .set_authenticated("tok", "a@b.c", Some(&Background::default()))
            .await
            .unwrap();

        sign_out(&backend, &session).await.unwrap();

        assert_eq!(session.get().await, Session::default());
        assert_eq!(backend.calls()[0].token.as_deref(), Some("tok"));
    }
}
