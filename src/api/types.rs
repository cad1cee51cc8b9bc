//! Request and response DTOs.

use serde::{Deserialize, Serialize};

use crate::nlp::Dispatch;

pub const NOT_LOADED: &str = "Model not loaded.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub message: String,
}

impl MessageDto {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Task output, or the not-loaded message in place of it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskResponse<T> {
    Output(T),
    Message(MessageDto),
}

impl<T> From<Dispatch<T>> for TaskResponse<T> {
    fn from(value: Dispatch<T>) -> Self {
        match value {
            Dispatch::Completed(output) => Self::Output(output),
            Dispatch::NotLoaded => Self::Message(MessageDto::new(NOT_LOADED)),
        }
    }
}

/// Accepts either `"text"` or `["text", ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationInput {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZeroShotInput {
    pub documents: OneOrMany,
    pub topics: OneOrMany,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinaryZeroShotInput {
    pub documents: OneOrMany,
    pub topic: String,
}
