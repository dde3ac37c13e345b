use serde::{Deserialize, Serialize};

use crate::domain::{ExerciseKind, Language};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotSendRequest {
    pub message: String,
    pub language: Language,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatbotSendResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seriousness_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkoutRequest {
    pub target_reps: u32,
    pub exercise_type: ExerciseKind,
}

/// Latest rep-counting snapshot reported by the tracking service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutStatus {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub reps_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginForm {
    pub email: String,
}

/// Body shape the backend uses when it rejects a JSON call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
