//! User confirmation prompts.
//!
//! The control watchdog sometimes needs a blocking user decision ("fall back
//! to software brightness?").  Instead of blocking a thread, the ask is an
//! explicit suspend point: the request travels over a channel to whatever UI
//! surface is attached, and the watchdog task awaits the response with a
//! timeout.  With no UI attached, prompts auto-resolve to the first (default)
//! button so headless deployments never hang.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// A prompt presented to the user.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// Correlation id for the UI surface.
    pub id: Uuid,
    pub message: String,
    pub info: String,
    /// Button labels; index 0 is the default used on timeout.
    pub buttons: Vec<String>,
    /// Optional suppression checkbox label ("always do this...").
    pub suppression: Option<String>,
    pub timeout: Duration,
}

/// The user's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptResponse {
    /// Index into [`PromptRequest::buttons`].
    pub button: usize,
    /// Whether the suppression checkbox was ticked.
    pub suppressed: bool,
}

impl PromptResponse {
    /// The non-interactive default: first button, no suppression.
    pub fn default_choice() -> Self {
        Self {
            button: 0,
            suppressed: false,
        }
    }
}

/// Prompt seam.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Asks the user and returns their decision, or the default response
    /// when the timeout elapses or no UI surface is attached.
    async fn ask(&self, request: PromptRequest) -> PromptResponse;
}

/// Headless prompter: every prompt resolves to the default immediately.
pub struct AutoPrompter;

#[async_trait]
impl Prompter for AutoPrompter {
    async fn ask(&self, request: PromptRequest) -> PromptResponse {
        debug!(id = %request.id, message = %request.message, "auto-resolving prompt");
        PromptResponse::default_choice()
    }
}

/// A prompt in flight towards a UI surface.
pub type PromptDelivery = (PromptRequest, oneshot::Sender<PromptResponse>);

/// Channel-backed prompter for deployments with a UI surface.
///
/// The UI end receives `(request, responder)` pairs and answers via the
/// oneshot sender.  A dropped responder or an elapsed timeout both resolve
/// to the default response.
pub struct ChannelPrompter {
    tx: mpsc::Sender<PromptDelivery>,
}

impl ChannelPrompter {
    /// Creates the prompter together with the receiver the UI surface reads.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PromptDelivery>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Prompter for ChannelPrompter {
    async fn ask(&self, request: PromptRequest) -> PromptResponse {
        let timeout = request.timeout;
        let (responder, response) = oneshot::channel();
        if self.tx.send((request, responder)).await.is_err() {
            // UI surface went away; behave as headless.
            return PromptResponse::default_choice();
        }
        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(response)) => response,
            _ => PromptResponse::default_choice(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
