use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{ExerciseKind, Language},
    protocol::{ChatbotSendResponse, WorkoutStatus},
};

pub mod api;
pub mod chat;
pub mod config;
pub mod locale;
pub mod video_feed;
pub mod workout;

pub use api::{ApiClient, ClientError};
pub use chat::{ChatEvent, ChatMessage, ChatSession, SendOutcome};
pub use config::{load_settings, ClientSettings};
pub use video_feed::VideoFeed;
pub use workout::{Phase, WorkoutConfig, WorkoutError, WorkoutEvent, WorkoutSession, WorkoutSnapshot};

/// Remote side of the chat session.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_chat(&self, message: &str, language: Language) -> Result<ChatbotSendResponse>;
}

/// Remote rep-counting service driven by the workout session.
#[async_trait]
pub trait WorkoutBackend: Send + Sync {
    async fn start_workout(&self, target_reps: u32, exercise: ExerciseKind) -> Result<()>;
    async fn workout_status(&self) -> Result<WorkoutStatus>;
    async fn reset_workout(&self) -> Result<()>;
}
