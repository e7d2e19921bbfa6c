// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// The outcome of attempting to send one event.
///
/// Exactly one response is produced for every event accepted into the
/// pipeline. A `status_code` of 0 means the event never reached the
/// remote end (validation, serialization, or transport failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub duration: Duration,
    /// The originating event's metadata, copied verbatim.
    pub metadata: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Response {
    /// A response for an event that never left the process.
    pub fn local_error(error: impl Into<String>, metadata: Option<serde_json::Value>) -> Self {
        Self {
            status_code: 0,
            duration: Duration::ZERO,
            metadata,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_error_has_no_status() {
        let response = Response::local_error("nope", Some(serde_json::json!(1)));
        assert_eq!(response.status_code, 0);
        assert_eq!(response.duration, Duration::ZERO);
        assert_eq!(response.error.as_deref(), Some("nope"));
        assert_eq!(response.metadata, Some(serde_json::json!(1)));
    }
}
