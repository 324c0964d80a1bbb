//! Command-line host for the flows.
//!
//! Each subcommand drives one flow end to end against the configured
//! backend, using the durable session so sign-in survives between runs.

use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use crate::api::Backend;
use crate::config::Config;
use crate::flows::{
    sign_out, AuthFlow, AuthMode, AuthOutcome, ChatFlow, ContentFlow, ContentOutcome,
    ContentVariant, PersonalizationFlow, Questionnaire, SaveOutcome, SelectionSource,
    SendOutcome, TranslateOutcome,
};
use crate::profile::{ExperienceLevel, HardwareLevel};
use crate::session::SessionStore;

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the stored session
    Status,

    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account and answer the background questionnaire
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// beginner, intermediate, advanced or expert
        #[arg(long)]
        experience: Option<ExperienceLevel>,
        /// beginner, intermediate or advanced
        #[arg(long)]
        hardware: Option<HardwareLevel>,
        /// Programming language (repeatable, default python)
        #[arg(long = "language")]
        languages: Vec<String>,
        /// Comma-separated interests
        #[arg(long)]
        interests: Option<String>,
    },

    /// Forget the stored session
    Signout,

    /// Load, edit and save background preferences
    Preferences {
        #[arg(long)]
        experience: Option<ExperienceLevel>,
        #[arg(long)]
        hardware: Option<HardwareLevel>,
        /// Toggle a programming language (repeatable)
        #[arg(long = "language")]
        languages: Vec<String>,
        /// Toggle an interest (repeatable)
        #[arg(long = "interest")]
        interests: Vec<String>,
        /// Identifier sent to the personalization endpoint
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Talk to the book assistant (reads lines from stdin)
    Chat,

    /// Personalize or translate a chapter file
    Chapter {
        #[arg(long)]
        title: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum)]
        action: ChapterAction,
    },
}

/// Chapter rewrite to request.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterAction {
    Personalize,
    Translate,
}

impl From<ChapterAction> for ContentVariant {
    fn from(action: ChapterAction) -> Self {
        match action {
            ChapterAction::Personalize => ContentVariant::Personalized,
            ChapterAction::Translate => ContentVariant::Translated,
        }
    }
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Shared handles every command needs.
#[derive(Clone)]
pub struct CliContext {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub session: SessionStore,
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, ctx: &CliContext) -> CliResult {
    match command {
        Commands::Status => execute_status(ctx).await,
        Commands::Signin { email, password } => execute_signin(ctx, email, password).await,
        Commands::Signup {
            name,
            email,
            password,
            experience,
            hardware,
            languages,
            interests,
        } => {
            let mut questionnaire = Questionnaire::default();
            if let Some(level) = experience {
                questionnaire.experience = level;
            }
            if hardware.is_some() {
                questionnaire.hardware = hardware;
            }
            if !languages.is_empty() {
                questionnaire.languages = languages.into_iter().collect();
            }
            questionnaire.interests_text = interests.unwrap_or_default();
            execute_signup(ctx, name, email, password, questionnaire).await
        }
        Commands::Signout => execute_signout(ctx).await,
        Commands::Preferences {
            experience,
            hardware,
            languages,
            interests,
            user_id,
        } => {
            let edits = PreferenceEdits {
                experience,
                hardware,
                languages,
                interests,
            };
            execute_preferences(ctx, edits, user_id).await
        }
        Commands::Chat => execute_chat(ctx).await,
        Commands::Chapter {
            title,
            file,
            action,
        } => execute_chapter(ctx, &title, &file, action).await,
    }
}

async fn execute_status(ctx: &CliContext) -> CliResult {
    let session = ctx.session.get().await;
    if !session.is_authenticated() {
        return CliResult::success("Not signed in");
    }

    let mut output = format!(
        "Signed in as {}\n",
        session.email.as_deref().unwrap_or("(unknown)")
    );
    match session.profile {
        Some(profile) => {
            output.push_str(&format!(
                "Experience: {} ({})\n",
                profile.experience_level,
                profile.experience_level.description()
            ));
            if let Some(hardware) = profile.hardware_knowledge {
                output.push_str(&format!("Hardware: {}\n", hardware));
            }
            output.push_str(&format!(
                "Languages: {}\n",
                join_or_dash(profile.programming_languages.as_slice())
            ));
            output.push_str(&format!(
                "Interests: {}",
                join_or_dash(profile.interests.as_slice())
            ));
        }
        None => output.push_str("No profile stored"),
    }
    CliResult::success(output)
}

async fn execute_signin(ctx: &CliContext, email: String, password: String) -> CliResult {
    let mut flow = AuthFlow::new(ctx.backend.clone(), ctx.session.clone(), AuthMode::SignIn);
    flow.set_email(email);
    flow.set_password(password);
    finish_auth(flow.submit().await)
}

async fn execute_signup(
    ctx: &CliContext,
    name: String,
    email: String,
    password: String,
    questionnaire: Questionnaire,
) -> CliResult {
    let mut flow = AuthFlow::new(ctx.backend.clone(), ctx.session.clone(), AuthMode::SignUp)
        .with_questionnaire(questionnaire);
    flow.set_name(name);
    flow.set_email(email);
    flow.set_password(password);

    if let Err(e) = flow.advance() {
        return CliResult::error(e.to_string());
    }
    finish_auth(flow.submit().await)
}

fn finish_auth(result: crate::error::FlowResult<AuthOutcome>) -> CliResult {
    match result {
        Ok(AuthOutcome::Succeeded(session)) => CliResult::success(format!(
            "Signed in as {}",
            session.email.as_deref().unwrap_or("(unknown)")
        )),
        Ok(AuthOutcome::Failed(message)) => CliResult::error(message),
        Ok(AuthOutcome::Cancelled) => CliResult::error("Cancelled"),
        Err(e) => CliResult::error(e.to_string()),
    }
}

async fn execute_signout(ctx: &CliContext) -> CliResult {
    match sign_out(ctx.backend.as_ref(), &ctx.session).await {
        Ok(()) => CliResult::success("Signed out"),
        Err(e) => CliResult::error(format!("Failed to clear session: {}", e)),
    }
}

struct PreferenceEdits {
    experience: Option<ExperienceLevel>,
    hardware: Option<HardwareLevel>,
    languages: Vec<String>,
    interests: Vec<String>,
}

async fn execute_preferences(
    ctx: &CliContext,
    edits: PreferenceEdits,
    user_id: Option<String>,
) -> CliResult {
    let close_delay = Duration::from_millis(ctx.config.ui.save_close_delay_ms);
    let closed = Arc::new(Notify::new());
    let notify = closed.clone();
    let mut flow = PersonalizationFlow::new(ctx.backend.clone(), ctx.session.clone())
        .with_close_delay(close_delay)
        .with_on_close(Arc::new(move || notify.notify_one()));
    if let Some(user_id) = user_id {
        flow = flow.with_user_id(user_id);
    }

    flow.load().await;
    if let Some(level) = edits.experience {
        flow.set_experience(level);
    }
    if let Some(level) = edits.hardware {
        flow.set_hardware(level);
    }
    for language in &edits.languages {
        flow.toggle_language(language);
    }
    for interest in &edits.interests {
        flow.toggle_interest(interest);
    }

    let outcome = flow.save().await;
    let message = flow.message().unwrap_or_default().to_string();
    match outcome {
        SaveOutcome::Saved => {
            // The panel stays open for the configured delay before closing.
            closed.notified().await;
            CliResult::success(format!("{}\nPanel closed", message))
        }
        SaveOutcome::Cancelled => CliResult::error("Cancelled"),
        SaveOutcome::NotSignedIn | SaveOutcome::Failed(_) => CliResult::error(message),
    }
}

async fn execute_chat(ctx: &CliContext) -> CliResult {
    let selection = SelectionSource::new();
    let flow = ChatFlow::new(
        ctx.backend.clone(),
        ctx.session.clone(),
        ctx.config.ui.target_language.clone(),
    );
    flow.attach_selection(&selection).await;

    println!("Ask a question about the book. /select <text>, /translate, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => return CliResult::error(format!("Failed to read input: {}", e)),
        };
        let line = line.trim();

        if line == "/quit" {
            break;
        } else if let Some(text) = select_command(line) {
            selection.publish(text);
        } else if line == "/translate" {
            match flow.translate_selection().await {
                TranslateOutcome::Translated => print_last_turn(&flow).await,
                TranslateOutcome::Notice(notice) => println!("! {}", notice),
                TranslateOutcome::Cancelled => break,
            }
        } else {
            match flow.send_message(line).await {
                SendOutcome::Replied | SendOutcome::Failed => print_last_turn(&flow).await,
                SendOutcome::Ignored | SendOutcome::Busy => {}
                SendOutcome::Cancelled => break,
            }
        }
    }

    flow.teardown();
    CliResult::success("Goodbye")
}

/// Text of a `/select` command, or `None` for any other input.
fn select_command(line: &str) -> Option<&str> {
    line.strip_prefix("/select")
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        .map(str::trim)
}

async fn print_last_turn(flow: &ChatFlow) {
    if let Some(turn) = flow.transcript().await.last() {
        println!("{}: {}", turn.role, turn.content);
        if let Some(sources) = turn.sources.as_ref().filter(|s| !s.is_empty()) {
            println!("  sources: {}", sources.join(", "));
        }
    }
}

async fn execute_chapter(
    ctx: &CliContext,
    title: &str,
    file: &Path,
    action: ChapterAction,
) -> CliResult {
    let original = match tokio::fs::read_to_string(file).await {
        Ok(text) => text,
        Err(e) => return CliResult::error(format!("Failed to read {}: {}", file.display(), e)),
    };

    let flow = ContentFlow::new(
        ctx.backend.clone(),
        ctx.session.clone(),
        title,
        &original,
        &ctx.config.ui.target_language,
    );

    match flow.show(action.into()).await {
        ContentOutcome::Shown(_) => CliResult::success(flow.visible_body().await),
        ContentOutcome::AuthRequired => {
            CliResult::error("Sign in first: book-companion signin --email <email> --password <password>")
        }
        ContentOutcome::Failed(notice) => CliResult::error(notice),
        ContentOutcome::Busy | ContentOutcome::Cancelled => CliResult::error("Cancelled"),
    }
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
