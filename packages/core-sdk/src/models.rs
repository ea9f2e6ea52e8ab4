use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, DispatchError};

/** \brief Prefix written in front of the failure description of a failed attempt. */
pub const ERROR_MARKER: &str = "Error: ";

/**
 * \brief Chat message aligned with the OpenAI chat format.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief Role: system/user/assistant */
    pub role: String,
    /** \brief Content */
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/**
 * \brief Fixed catalogue of models a batch may target.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
}

impl Model {
    pub const ALL: [Model; 3] = [Model::Gpt35Turbo, Model::Gpt4, Model::Gpt4Turbo];

    /** \brief Identifier sent to the remote service. */
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Gpt35Turbo => "gpt-3.5-turbo",
            Model::Gpt4 => "gpt-4",
            Model::Gpt4Turbo => "gpt-4-turbo",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| BatchError::UnknownModel(s.to_string()))
    }
}

/**
 * \brief One row of the result table, produced by a single dispatch attempt.
 * \details `response` holds the answer text, or `"Error: <description>"` when the attempt failed.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /** \brief Prompt text sent */
    pub request: String,
    /** \brief Model used */
    pub model: Model,
    /** \brief Answer or error description */
    pub response: String,
}

impl ResultRecord {
    pub fn answered(request: &str, model: Model, answer: impl Into<String>) -> Self {
        Self {
            request: request.to_string(),
            model,
            response: answer.into(),
        }
    }

    pub fn failed(request: &str, model: Model, err: &DispatchError) -> Self {
        Self {
            request: request.to_string(),
            model,
            response: format!("{}{}", ERROR_MARKER, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parse_roundtrip() {
        for model in Model::ALL {
            assert_eq!(model.as_str().parse::<Model>().unwrap(), model);
        }
        assert_eq!(Model::default(), Model::Gpt35Turbo);
    }

    #[test]
    fn test_model_parse_rejects_unknown() {
        let err = "gpt-4o".parse::<Model>().unwrap_err();
        assert!(matches!(err, BatchError::UnknownModel(ref m) if m == "gpt-4o"));
        assert!(" gpt-4 ".parse::<Model>().is_err());
        assert!("GPT-4".parse::<Model>().is_err());
        assert!("".parse::<Model>().is_err());
    }

    #[test]
    fn test_model_serializes_as_identifier() {
        let json = serde_json::to_string(&Model::Gpt4Turbo).unwrap();
        assert_eq!(json, "\"gpt-4-turbo\"");
    }

    #[test]
    fn test_failed_record_carries_marker() {
        let err = DispatchError::Transport("timeout".to_string());
        let record = ResultRecord::failed("X", Model::Gpt4, &err);
        assert_eq!(record.response, "Error: timeout");
        assert_eq!(record.request, "X");
        assert_eq!(record.model, Model::Gpt4);
    }
}
