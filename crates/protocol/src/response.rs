use serde::{Deserialize, Serialize};

/// Standard status messages.
pub mod messages {
    pub const COMPLETED: &str = "Completed";
    pub const RUNNING: &str = "Running";
    pub const TASK_CANCELLED: &str = "Task cancelled";
    pub const INCORRECT_QUERY_PARAMETERS: &str = "Incorrect query parameters";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The underlying analysis is still producing data; the model is partial.
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Envelope returned by every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub status: Status,
    pub message: String,
    #[serde(default = "Option::default")]
    pub model: Option<T>,
}

impl<T> Response<T> {
    pub fn completed(model: T) -> Self {
        Self {
            status: Status::Completed,
            message: messages::COMPLETED.to_string(),
            model: Some(model),
        }
    }

    pub fn running(model: T) -> Self {
        Self {
            status: Status::Running,
            message: messages::RUNNING.to_string(),
            model: Some(model),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: Status::Cancelled,
            message: messages::TASK_CANCELLED.to_string(),
            model: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            message: message.into(),
            model: None,
        }
    }

    pub fn incorrect_parameters() -> Self {
        Self::failed(messages::INCORRECT_QUERY_PARAMETERS)
    }

    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    /// Transform the model, keeping status and message.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            status: self.status,
            message: self.message,
            model: self.model.map(f),
        }
    }
}
