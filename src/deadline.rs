//! Deadline/cancel token (§4.5, §5): the out-of-band cancellation signal
//! passed into every blocking broker operation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A deadline fires either at a fixed instant, when an external
/// [`CancellationToken`] is cancelled, or never.
///
/// Composing a timer and a cancellation token behind one type lets
/// `Broker::request_response`/`await_message` select on a single `wait()`
/// future instead of threading two separate branches through every
/// transaction.
#[derive(Clone)]
pub struct Deadline {
    at: Option<Instant>,
    token: Option<CancellationToken>,
}

impl Deadline {
    /// Fires after `duration` has elapsed from now.
    pub fn after(duration: Duration) -> Self {
        Self { at: Some(Instant::now() + duration), token: None }
    }

    /// Fires at the given `tokio::time::Instant`.
    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant), token: None }
    }

    /// Fires when `token` is cancelled; never fires on its own otherwise.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { at: None, token: Some(token) }
    }

    /// Fires after `duration`, or when `token` is cancelled — whichever
    /// comes first.
    pub fn after_or_cancelled(duration: Duration, token: CancellationToken) -> Self {
        Self { at: Some(Instant::now() + duration), token: Some(token) }
    }

    /// Never fires. Blocking transactions given this deadline rely solely on
    /// a matching frame or write error to complete.
    pub fn never() -> Self {
        Self { at: None, token: None }
    }

    /// Resolves when this deadline fires. Never resolves for [`Deadline::never`].
    pub async fn wait(&self) {
        match (&self.at, &self.token) {
            (Some(at), Some(token)) => {
                tokio::select! {
                    () = tokio::time::sleep_until(*at) => {}
                    () = token.cancelled() => {}
                }
            }
            (Some(at), None) => tokio::time::sleep_until(*at).await,
            (None, Some(token)) => token.cancelled().await,
            (None, None) => std::future::pending().await,
        }
    }
}
