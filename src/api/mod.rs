//! REST API shared response types

pub mod admin;
pub mod context;
pub mod health;

use serde::{Deserialize, Serialize};

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response (for delete, invalidate, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = SuccessResponse::new("payload");
        assert_eq!(response.data, "payload");
    }

    #[test]
    fn test_success_response_serialization() {
        #[derive(Serialize)]
        struct TestData {
            id: u32,
        }

        let json = serde_json::to_string(&SuccessResponse::new(TestData { id: 7 })).unwrap();
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"id\":7"));
    }

    #[test]
    fn test_message_response() {
        let response = MessageResponse::new("Context invalidated.");
        assert_eq!(response.message, "Context invalidated.");
    }
}
