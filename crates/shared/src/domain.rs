use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(MessageId);

/// Suggested reps per set until the patient picks their own target.
pub const DEFAULT_TARGET_REPS: u32 = 12;

pub const HIGH_SEVERITY_THRESHOLD: f64 = 0.7;
pub const MODERATE_SEVERITY_THRESHOLD: f64 = 0.4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseDomainError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    English,
    Hindi,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Hindi];

    /// Wire code understood by the chatbot endpoint.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Hindi => "hindi",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "हिंदी (Hindi)",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "hindi" | "hi" => Ok(Language::Hindi),
            _ => Err(ParseDomainError {
                kind: "language",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExerciseKind {
    BicepCurl,
    ShoulderExtension,
    JumpingJacks,
    ArmRaises,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 4] = [
        ExerciseKind::BicepCurl,
        ExerciseKind::ShoulderExtension,
        ExerciseKind::JumpingJacks,
        ExerciseKind::ArmRaises,
    ];

    /// Identifier sent as `exercise_type` when starting a workout.
    pub fn id(self) -> &'static str {
        match self {
            ExerciseKind::BicepCurl => "bicep-curl",
            ExerciseKind::ShoulderExtension => "shoulder-extension",
            ExerciseKind::JumpingJacks => "jumping-jacks",
            ExerciseKind::ArmRaises => "arm-raises",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ExerciseKind::BicepCurl => "Bicep Curl",
            ExerciseKind::ShoulderExtension => "Shoulder Extension",
            ExerciseKind::JumpingJacks => "Jumping Jacks",
            ExerciseKind::ArmRaises => "Arm Raises",
        }
    }

    /// File name of the demo clip served under the backend's static videos directory.
    pub fn demo_video_file(self) -> &'static str {
        match self {
            ExerciseKind::BicepCurl => "bc.mp4",
            ExerciseKind::ShoulderExtension => "sl.mp4",
            ExerciseKind::JumpingJacks => "jj.mp4",
            ExerciseKind::ArmRaises => "ar.mp4",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ExerciseKind {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ExerciseKind::ALL
            .into_iter()
            .find(|kind| kind.id() == wanted)
            .ok_or_else(|| ParseDomainError {
                kind: "exercise",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn classify(score: f64) -> Self {
        if score >= HIGH_SEVERITY_THRESHOLD {
            Severity::High
        } else if score >= MODERATE_SEVERITY_THRESHOLD {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
        }
    }
}

/// Backend-computed seriousness of a chat message, kept within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SeverityScore(f64);

impl SeverityScore {
    /// Returns `None` for non-finite input; finite values are clamped into range.
    pub fn new(raw: f64) -> Option<Self> {
        if !raw.is_finite() {
            return None;
        }
        Some(Self(raw.clamp(0.0, 1.0)))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn level(self) -> Severity {
        Severity::classify(self.0)
    }

    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round() as u8
    }

    /// A zero score is carried but not rendered.
    pub fn is_displayable(self) -> bool {
        self.0 > 0.0
    }

    /// Number of filled cells when drawing the score as a bar of `width` cells.
    pub fn filled_cells(self, width: usize) -> usize {
        ((self.0 * width as f64).round() as usize).min(width)
    }
}
