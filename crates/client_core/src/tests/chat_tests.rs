use super::*;

use std::sync::Mutex as StdMutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::Severity;
use tokio::sync::Notify;

enum Reply {
    Answer(&'static str, Option<f64>),
    Unsuccessful,
    Unreachable,
}

struct FakeAssistant {
    reply: Reply,
    sent: StdMutex<Vec<(String, Language)>>,
    gate: Option<Arc<Notify>>,
}

impl FakeAssistant {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            sent: StdMutex::new(Vec::new()),
            gate: None,
        }
    }

    fn gated(reply: Reply, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(reply)
        }
    }
}

#[async_trait]
impl ChatBackend for FakeAssistant {
    async fn send_chat(&self, message: &str, language: Language) -> Result<ChatbotSendResponse> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((message.to_string(), language));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.reply {
            Reply::Answer(text, score) => Ok(ChatbotSendResponse {
                success: true,
                response: Some(text.to_string()),
                seriousness_score: score,
                message: None,
            }),
            Reply::Unsuccessful => Ok(ChatbotSendResponse {
                success: false,
                response: None,
                seriousness_score: None,
                message: Some("model offline".to_string()),
            }),
            Reply::Unreachable => Err(anyhow!("connection refused")),
        }
    }
}

fn session_with(assistant: &Arc<FakeAssistant>, language: Language) -> Arc<ChatSession> {
    ChatSession::new(Arc::clone(assistant) as Arc<dyn ChatBackend>, language)
}

#[tokio::test]
async fn new_session_starts_with_localized_greeting() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Unreachable));
    let session = session_with(&assistant, Language::Hindi);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId(1));
    assert!(messages[0].is_assistant());
    assert_eq!(messages[0].text, locale::greeting(Language::Hindi));
    assert!(messages[0].severity.is_none());
}

#[tokio::test]
async fn reply_is_appended_with_severity() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Answer(
        "Please rest and keep the wound dry.",
        Some(0.82),
    )));
    let session = session_with(&assistant, Language::English);
    let mut rx = session.subscribe();

    let outcome = session.send_user_message("My wound is bleeding").await;
    let SendOutcome::Replied(reply) = outcome else {
        panic!("expected a reply, got {outcome:?}");
    };
    assert_eq!(reply.text, "Please rest and keep the wound dry.");
    let score = reply.displayed_severity().expect("severity shown");
    assert_eq!(score.level(), Severity::High);
    assert_eq!(score.percent(), 82);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].origin, Origin::User);
    assert_eq!(messages[1].text, "My wound is bleeding");
    assert_eq!(
        messages.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![MessageId(1), MessageId(2), MessageId(3)]
    );
    assert_eq!(
        assistant.sent.lock().expect("sent lock").as_slice(),
        &[("My wound is bleeding".to_string(), Language::English)]
    );

    let mut typing = Vec::new();
    let mut appended = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            ChatEvent::TypingChanged(on) => typing.push(on),
            ChatEvent::MessageAppended(_) => appended += 1,
            ChatEvent::GreetingReplaced(_) => panic!("greeting must not change"),
        }
    }
    assert_eq!(typing, vec![true, false]);
    assert_eq!(appended, 2);
    assert!(!session.is_awaiting_reply().await);
}

#[tokio::test]
async fn zero_score_is_stored_but_not_displayed() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Answer("Glad to hear it.", Some(0.0))));
    let session = session_with(&assistant, Language::English);

    let SendOutcome::Replied(reply) = session.send_user_message("I feel fine").await else {
        panic!("expected a reply");
    };
    assert!(reply.severity.is_some());
    assert!(reply.displayed_severity().is_none());
}

#[tokio::test]
async fn transport_failure_appends_localized_fallback() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Unreachable));
    let session = session_with(&assistant, Language::Hindi);

    let outcome = session.send_user_message("दर्द हो रहा है").await;
    let SendOutcome::FellBack(reply) = outcome else {
        panic!("expected the fallback, got {outcome:?}");
    };
    assert_eq!(reply.text, locale::connection_fallback(Language::Hindi));
    assert!(reply.severity.is_none());
    assert_eq!(session.messages().await.len(), 3);
    assert!(!session.is_awaiting_reply().await);
}

#[tokio::test]
async fn unsuccessful_response_falls_back() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Unsuccessful));
    let session = session_with(&assistant, Language::English);

    let outcome = session.send_user_message("Can I exercise today?").await;
    assert!(matches!(
        outcome,
        SendOutcome::FellBack(ref reply)
            if reply.text == locale::connection_fallback(Language::English)
    ));
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Unreachable));
    let session = session_with(&assistant, Language::English);

    assert_eq!(session.send_user_message("   \n\t").await, SendOutcome::Ignored);
    assert_eq!(session.messages().await.len(), 1);
    assert!(assistant.sent.lock().expect("sent lock").is_empty());
}

#[tokio::test]
async fn second_send_is_rejected_while_awaiting_reply() {
    let gate = Arc::new(Notify::new());
    let assistant = Arc::new(FakeAssistant::gated(
        Reply::Answer("Take it slow.", None),
        Arc::clone(&gate),
    ));
    let session = session_with(&assistant, Language::English);

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_user_message("first").await }
    });
    while !session.is_awaiting_reply().await {
        tokio::task::yield_now().await;
    }

    assert_eq!(session.send_user_message("second").await, SendOutcome::Busy);
    assert_eq!(session.messages().await.len(), 2);

    gate.notify_one();
    let outcome = pending.await.expect("send task");
    assert!(matches!(outcome, SendOutcome::Replied(_)));
    assert_eq!(session.messages().await.len(), 3);
    assert_eq!(assistant.sent.lock().expect("sent lock").len(), 1);
}

#[tokio::test]
async fn fallback_uses_language_captured_at_send_time() {
    let gate = Arc::new(Notify::new());
    let assistant = Arc::new(FakeAssistant::gated(Reply::Unreachable, Arc::clone(&gate)));
    let session = session_with(&assistant, Language::Hindi);

    let pending = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_user_message("hello").await }
    });
    while !session.is_awaiting_reply().await {
        tokio::task::yield_now().await;
    }
    session.set_language(Language::English).await;
    gate.notify_one();

    let SendOutcome::FellBack(reply) = pending.await.expect("send task") else {
        panic!("expected the fallback");
    };
    assert_eq!(reply.text, locale::connection_fallback(Language::Hindi));
}

#[tokio::test]
async fn language_switch_replaces_greeting_only_before_first_message() {
    let assistant = Arc::new(FakeAssistant::new(Reply::Answer("Noted.", None)));
    let session = session_with(&assistant, Language::English);
    let mut rx = session.subscribe();

    session.set_language(Language::Hindi).await;
    let messages = session.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, locale::greeting(Language::Hindi));
    assert!(matches!(rx.try_recv(), Ok(ChatEvent::GreetingReplaced(_))));

    session.send_user_message("namaste").await;
    assert_eq!(assistant.sent.lock().expect("sent lock")[0].1, Language::Hindi);

    session.set_language(Language::English).await;
    let messages = session.messages().await;
    assert_eq!(messages[0].text, locale::greeting(Language::Hindi));
    assert_eq!(session.language().await, Language::English);
}
