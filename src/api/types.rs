use serde::{Deserialize, Serialize};

use crate::profile::{Background, ExperienceLevel};

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Sign-in body
#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Sign-up body: credentials plus the background questionnaire
#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub background: Background,
}

/// User record returned alongside a token.
///
/// Only the background is read; every other field is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthUser {
    #[serde(default, deserialize_with = "lenient")]
    pub background: Option<Background>,
}

/// Sign-in/sign-up response.
///
/// The site backend answers with `token`, the widget backend with
/// `access_token`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<AuthUser>,
}

impl AuthResponse {
    /// Whichever non-empty token field the backend filled in.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.access_token.as_deref().filter(|t| !t.is_empty()))
    }
}

/// `GET /api/auth/me` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentUser {
    #[serde(default, deserialize_with = "lenient")]
    pub background: Option<Background>,
}

/// Decode an optional field, treating a malformed value as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// `PUT /api/auth/preferences` body
#[derive(Debug, Clone, Serialize)]
pub struct PreferencesRequest<'a> {
    pub background: &'a Background,
}

/// `preferences` object of [`PersonalizeRequest`]
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceEnvelope {
    pub background: Background,
}

/// `POST /api/personalize` body
#[derive(Debug, Clone, Serialize)]
pub struct PersonalizeRequest {
    pub user_id: Option<String>,
    pub preferences: PreferenceEnvelope,
    pub background: Background,
}

impl PersonalizeRequest {
    pub fn new(user_id: Option<String>, background: Background) -> Self {
        Self {
            user_id,
            preferences: PreferenceEnvelope {
                background: background.clone(),
            },
            background,
        }
    }
}

/// Reader preferences sent with a chapter rewrite
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPreferences {
    pub experience_level: ExperienceLevel,
    pub preferred_languages: Vec<String>,
    pub interests: Vec<String>,
}

/// Reader background sent with a chapter rewrite
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBackground {
    pub programming_experience: ExperienceLevel,
    pub topics_of_interest: Vec<String>,
}

/// `POST /api/personalize-chapter` body
#[derive(Debug, Clone, Serialize)]
pub struct PersonalizeChapterRequest {
    pub chapter_title: String,
    pub chapter_content: String,
    pub user_preferences: UserPreferences,
    pub user_background: UserBackground,
}

impl PersonalizeChapterRequest {
    /// Build the request from a stored profile.
    ///
    /// Without a profile the reader is treated as a Python beginner with no
    /// stated interests.
    pub fn new(
        chapter_title: impl Into<String>,
        chapter_content: impl Into<String>,
        profile: Option<&Background>,
    ) -> Self {
        let (level, languages, interests) = match profile {
            Some(profile) => {
                let languages: Vec<String> = if profile.programming_languages.is_empty() {
                    vec!["python".to_string()]
                } else {
                    profile.programming_languages.as_slice().to_vec()
                };
                (
                    profile.experience_level,
                    languages,
                    profile.interests.as_slice().to_vec(),
                )
            }
            None => (
                ExperienceLevel::Beginner,
                vec!["python".to_string()],
                Vec::new(),
            ),
        };

        Self {
            chapter_title: chapter_title.into(),
            chapter_content: chapter_content.into(),
            user_preferences: UserPreferences {
                experience_level: level,
                preferred_languages: languages,
                interests: interests.clone(),
            },
            user_background: UserBackground {
                programming_experience: level,
                topics_of_interest: interests,
            },
        }
    }
}

/// `POST /api/personalize-chapter` response
#[derive(Debug, Clone, Deserialize)]
pub struct PersonalizeChapterResponse {
    /// Rewritten chapter as HTML
    pub personalized_content: String,
}

/// `POST /api/translate` body
#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_code: Option<bool>,
}

impl TranslateRequest {
    pub fn new(text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_language: target_language.into(),
            preserve_code: None,
        }
    }

    /// Ask the backend to leave code blocks untranslated
    pub fn preserving_code(mut self) -> Self {
        self.preserve_code = Some(true);
        self
    }
}

/// `POST /api/translate` response.
///
/// The chapter endpoint answers with `translated_text`, the snippet
/// endpoint with `translated`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslateResponse {
    pub translated_text: Option<String>,
    pub translated: Option<String>,
    pub timestamp: Option<String>,
}

impl TranslateResponse {
    /// The translated text, whichever field carried it.
    pub fn text(&self) -> Option<&str> {
        self.translated_text
            .as_deref()
            .or(self.translated.as_deref())
    }
}

/// One prior turn sent as conversation context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// `POST /api/chat` body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    pub conversation_history: Vec<HistoryEntry>,
}

/// `POST /api/chat` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    pub message: Option<String>,
    pub response: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    pub timestamp: Option<String>,
}

impl ChatResponse {
    /// The assistant's reply, whichever field carried it.
    pub fn text(&self) -> Option<&str> {
        non_blank(&self.message).or_else(|| non_blank(&self.response))
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|t| !t.trim().is_empty())
}

/// FastAPI-style error body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}

/// Pull a human-readable `detail` string out of an error body.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(detail) if !detail.trim().is_empty() => Some(detail),
        _ => None,
    }
}
