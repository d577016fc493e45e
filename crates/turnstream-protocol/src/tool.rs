//! Tool-call lifecycle as seen from the client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Executing,
    Completed,
    Failed,
}

impl ToolStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Completed
        } else {
            Self::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Executing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One named tool invocation within a turn. The name is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    pub fn executing(
        name: impl Into<String>,
        reason: Option<String>,
        arguments: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            reason,
            arguments,
            status: ToolStatus::Executing,
            result: None,
        }
    }

    /// A terminal entry for a result that arrived without its invocation.
    pub fn orphan_result(name: impl Into<String>, result: String, success: bool) -> Self {
        Self {
            name: name.into(),
            reason: None,
            arguments: None,
            status: ToolStatus::from_success(success),
            result: Some(result),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == ToolStatus::Executing
    }

    /// Move to `completed` or `failed`, keeping the invocation details.
    pub fn finish(&mut self, result: String, success: bool) {
        self.status = ToolStatus::from_success(success);
        self.result = Some(result);
    }
}
