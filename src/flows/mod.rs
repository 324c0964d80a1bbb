//! View-state machines behind the site's widgets.
//!
//! - [`AuthFlow`]: sign-in and two-step sign-up
//! - [`PersonalizationFlow`]: edit and save the reader's background
//! - [`ChatFlow`]: book assistant transcript and text-selection capture
//! - [`ContentFlow`]: original / personalized / translated chapter views
//!
//! Every flow owns a [`CancellationToken`]. Calling `teardown()` drops any
//! request still in flight so its result never reaches a view that is gone.

mod auth;
mod chat;
mod content;
mod personalization;

pub use auth::*;
pub use chat::*;
pub use content::*;
pub use personalization::*;

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `future` unless `cancel` fires first.
///
/// Returns `None` when cancelled; the future is dropped at that point.
pub(crate) async fn unless_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}
