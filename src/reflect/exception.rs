//! 异常值
//!
//! Backend-reported failures travel as values so that callers can inspect
//! them without the dispatch layer swallowing anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;

/// 后端异常
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    pub message: String,
    /// Kind of the error in the originating language (e.g. `TypeError`).
    pub label: String,
    pub code: i64,
    pub stacktrace: String,
    /// Thread that raised the exception.
    pub thread_id: String,
}

impl Exception {
    pub fn new(
        message: impl Into<String>,
        label: impl Into<String>,
        code: i64,
        stacktrace: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            label: label.into(),
            code,
            stacktrace: stacktrace.into(),
            thread_id: format!("{:?}", thread::current().id()),
        }
    }

    /// Wraps a Rust error, chaining its sources into the stack trace.
    pub fn from_error(label: impl Into<String>, error: &dyn std::error::Error) -> Self {
        let mut trace = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        Self::new(error.to_string(), label, -1, trace.join("\n"))
    }

    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "label": self.label,
            "code": self.code,
            "stacktrace": self.stacktrace,
        })
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.label, self.message)
        }
    }
}
