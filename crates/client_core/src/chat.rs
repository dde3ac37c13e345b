//! Chat session with the remote medical assistant.

use std::sync::Arc;

use chrono::Local;
use shared::{
    domain::{Language, MessageId, Origin, SeverityScore},
    protocol::ChatbotSendResponse,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::{locale, ChatBackend};

const GREETING_ID: MessageId = MessageId(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub origin: Origin,
    pub timestamp: String,
    pub severity: Option<SeverityScore>,
}

impl ChatMessage {
    pub fn is_assistant(&self) -> bool {
        self.origin == Origin::Assistant
    }

    pub fn displayed_severity(&self) -> Option<SeverityScore> {
        self.severity.filter(|score| score.is_displayable())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Blank input; nothing was appended.
    Ignored,
    /// Another message is still awaiting its reply.
    Busy,
    Replied(ChatMessage),
    FellBack(ChatMessage),
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    MessageAppended(ChatMessage),
    GreetingReplaced(ChatMessage),
    TypingChanged(bool),
}

struct ChatState {
    language: Language,
    messages: Vec<ChatMessage>,
    awaiting_reply: bool,
}

impl ChatState {
    fn append(&mut self, text: String, origin: Origin, severity: Option<SeverityScore>) -> ChatMessage {
        let message = ChatMessage {
            id: MessageId(self.messages.len() as u64 + 1),
            text,
            origin,
            timestamp: display_timestamp(),
            severity,
        };
        self.messages.push(message.clone());
        message
    }

    fn only_greeting(&self) -> bool {
        matches!(self.messages.as_slice(), [only] if only.id == GREETING_ID && only.is_assistant())
    }
}

fn display_timestamp() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Maps a backend answer to reply text, or `None` when the fallback applies.
fn accepted_reply(response: ChatbotSendResponse) -> Option<(String, Option<SeverityScore>)> {
    if !response.success {
        warn!(message = ?response.message, "chatbot reported an unsuccessful response");
        return None;
    }
    let Some(text) = response.response.filter(|text| !text.trim().is_empty()) else {
        warn!("chatbot response carried no reply text");
        return None;
    };
    Some((text, response.seriousness_score.and_then(SeverityScore::new)))
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    inner: Mutex<ChatState>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, language: Language) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let greeting = ChatMessage {
            id: GREETING_ID,
            text: locale::greeting(language).to_string(),
            origin: Origin::Assistant,
            timestamp: display_timestamp(),
            severity: None,
        };
        Arc::new(Self {
            backend,
            inner: Mutex::new(ChatState {
                language,
                messages: vec![greeting],
                awaiting_reply: false,
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.messages.clone()
    }

    pub async fn language(&self) -> Language {
        self.inner.lock().await.language
    }

    pub async fn is_awaiting_reply(&self) -> bool {
        self.inner.lock().await.awaiting_reply
    }

    /// Replaces the greeting when nothing has been said yet; earlier messages
    /// are never rewritten.
    pub async fn set_language(&self, language: Language) {
        let mut guard = self.inner.lock().await;
        if guard.language == language {
            return;
        }
        guard.language = language;
        if guard.only_greeting() {
            let greeting = &mut guard.messages[0];
            greeting.text = locale::greeting(language).to_string();
            greeting.timestamp = display_timestamp();
            let _ = self.events.send(ChatEvent::GreetingReplaced(greeting.clone()));
        }
    }

    /// Sends one user message and always appends exactly one reply, either the
    /// assistant's answer or the localized fallback.
    pub async fn send_user_message(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let language = {
            let mut guard = self.inner.lock().await;
            if guard.awaiting_reply {
                return SendOutcome::Busy;
            }
            guard.awaiting_reply = true;
            let sent = guard.append(text.to_string(), Origin::User, None);
            let _ = self.events.send(ChatEvent::MessageAppended(sent));
            guard.language
        };
        let _ = self.events.send(ChatEvent::TypingChanged(true));

        let reply = match self.backend.send_chat(text, language).await {
            Ok(response) => accepted_reply(response),
            Err(err) => {
                error!(error = %err, "chatbot request failed");
                None
            }
        };

        let outcome = {
            let mut guard = self.inner.lock().await;
            guard.awaiting_reply = false;
            let outcome = match reply {
                Some((text, severity)) => {
                    if let Some(level) = severity.map(|score| score.level()) {
                        info!(severity = level.label(), "assistant replied");
                    }
                    SendOutcome::Replied(guard.append(text, Origin::Assistant, severity))
                }
                None => SendOutcome::FellBack(guard.append(
                    locale::connection_fallback(language).to_string(),
                    Origin::Assistant,
                    None,
                )),
            };
            if let SendOutcome::Replied(message) | SendOutcome::FellBack(message) = &outcome {
                let _ = self.events.send(ChatEvent::MessageAppended(message.clone()));
            }
            outcome
        };
        let _ = self.events.send(ChatEvent::TypingChanged(false));

        outcome
    }
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
