//! Conversation store: the message log and the single in-flight request.
//!
//! A submit is split in three steps so an interactive front end can keep drawing
//! while the request runs:
//!
//! 1. [`ConversationStore::begin_submit`] validates the input, appends the user
//!    message plus a pending placeholder and hands back a [`PendingTurn`].
//! 2. [`PendingTurn::dispatch`] calls the gateway. It owns everything it needs,
//!    including the mode captured at submit time, so it can run on another task.
//! 3. [`ConversationStore::resolve`] swaps the placeholder (found by id) for the
//!    final message and clears the loading flag.
//!
//! [`ConversationStore::submit`] runs all three in sequence.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Result, SubmitRejected};
use crate::gateway::{GenerationGateway, ImageOutcome};
use crate::media::PendingImage;
use crate::mode::Mode;
use crate::state::{Message, MessageId, Part, Role};

/// Shown in place of the reply when the dispatch itself fails.
pub const DISPATCH_ERROR_TEXT: &str = "Something went wrong. Please try again.";

pub const GREETING: &str = "Hello! I'm Gemini. How can I help you today? You can ask me questions or switch to image mode to generate images.";

pub struct ConversationStore {
    gateway: Arc<dyn GenerationGateway>,
    messages: Vec<Message>,
    mode: Mode,
    is_loading: bool,
    next_id: u64,
}

/// A submitted request that has not been sent yet.
pub struct PendingTurn {
    placeholder: MessageId,
    mode: Mode,
    prompt: String,
    image: Option<PendingImage>,
    gateway: Arc<dyn GenerationGateway>,
}

/// What came back for a turn, ready to be folded into the log.
#[derive(Debug)]
pub struct TurnReply {
    pub placeholder: MessageId,
    pub outcome: Result<Vec<Part>>,
}

impl ConversationStore {
    pub fn new(gateway: Arc<dyn GenerationGateway>) -> Self {
        Self {
            gateway,
            messages: Vec::new(),
            mode: Mode::default(),
            is_loading: false,
            next_id: 1,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Seed the log with an opening model message.
    pub fn with_greeting(mut self, text: &str) -> Self {
        let id = self.next_id();
        self.messages.push(Message::model(id, vec![Part::Text(text.to_string())]));
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// The placeholder of the request in flight, if any.
    pub fn pending(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_pending)
    }

    /// Most recent image produced by the model.
    pub fn last_image(&self) -> Option<(MessageId, &str)> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Model)
            .find_map(|m| m.image_urls().next().map(|url| (m.id, url)))
    }

    /// Switching mode never touches a request already in flight.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> Mode {
        self.mode = self.mode.toggled();
        self.mode
    }

    /// Submit and wait for the reply. Returns the id of the model message.
    pub async fn submit(
        &mut self,
        prompt: &str,
        image: Option<PendingImage>,
    ) -> std::result::Result<MessageId, SubmitRejected> {
        let turn = self.begin_submit(prompt, image)?;
        let placeholder = turn.placeholder_id();
        let reply = turn.dispatch().await;
        self.resolve(reply);
        Ok(placeholder)
    }

    /// Record the user's message and a placeholder for the reply.
    pub fn begin_submit(
        &mut self,
        prompt: &str,
        image: Option<PendingImage>,
    ) -> std::result::Result<PendingTurn, SubmitRejected> {
        let has_text = !prompt.trim().is_empty();
        if !has_text && image.is_none() {
            return Err(SubmitRejected::Empty);
        }
        if self.is_loading {
            return Err(SubmitRejected::Busy);
        }

        self.is_loading = true;

        let mut parts = Vec::new();
        if has_text {
            parts.push(Part::Text(prompt.to_string()));
        }
        if let Some(image) = &image {
            parts.push(Part::ImageUrl(image.data_uri()));
        }
        let user_id = self.next_id();
        self.messages.push(Message::user(user_id, parts));

        let placeholder = self.next_id();
        self.messages.push(Message::placeholder(placeholder));

        debug!(%placeholder, mode = self.mode.as_str(), with_image = image.is_some(), "submit");

        Ok(PendingTurn {
            placeholder,
            mode: self.mode,
            prompt: prompt.to_string(),
            image,
            gateway: Arc::clone(&self.gateway),
        })
    }

    /// Replace the placeholder named by `reply` with its final content.
    /// Returns false if no such placeholder is pending.
    pub fn resolve(&mut self, reply: TurnReply) -> bool {
        let parts = match reply.outcome {
            Ok(parts) => parts,
            Err(e) => {
                error!(placeholder = %reply.placeholder, error = %e, "dispatch failed");
                vec![Part::Text(DISPATCH_ERROR_TEXT.to_string())]
            }
        };
        self.finish(reply.placeholder, parts)
    }

    /// Resolve a placeholder whose dispatch never produced a reply.
    pub fn abandon(&mut self, placeholder: MessageId) -> bool {
        self.finish(placeholder, vec![Part::Text(DISPATCH_ERROR_TEXT.to_string())])
    }

    fn finish(&mut self, id: MessageId, parts: Vec<Part>) -> bool {
        let Some(slot) = self.messages.iter_mut().find(|m| m.id == id && m.is_pending) else {
            warn!(placeholder = %id, "no pending message to resolve");
            return false;
        };

        *slot = Message::model(id, parts);
        self.is_loading = false;
        true
    }

    fn next_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl PendingTurn {
    pub fn placeholder_id(&self) -> MessageId {
        self.placeholder
    }

    /// Mode captured when the turn was submitted.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub async fn dispatch(self) -> TurnReply {
        let outcome = match self.mode {
            Mode::Chat => self
                .gateway
                .generate_text(&self.prompt, self.image.as_ref())
                .await
                .map(|text| {
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        vec![Part::Text(text)]
                    }
                }),
            Mode::Image => self.gateway.generate_image(&self.prompt).await.map(|outcome| match outcome {
                ImageOutcome::Image(image) => vec![Part::ImageUrl(image.data_uri())],
                ImageOutcome::Failure(reason) => vec![Part::Text(reason)],
            }),
        };

        TurnReply {
            placeholder: self.placeholder,
            outcome,
        }
    }
}

impl fmt::Debug for PendingTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTurn")
            .field("placeholder", &self.placeholder)
            .field("mode", &self.mode)
            .field("prompt", &self.prompt)
            .field("with_image", &self.image.is_some())
            .finish()
    }
}
