//! 错误处理单元测试
//!
//! 测试应用错误类型的状态码、消息与响应体

use axum::{http::StatusCode, response::IntoResponse};
use election_service::error::{AppError, FieldError};
use http_body_util::BodyExt;

// ==================== 错误状态码测试 ====================

#[test]
fn test_error_status_codes() {
    assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(AppError::not_found("Ballot").status_code(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::bad_request("invalid").status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        AppError::field("code", "required").status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::Conflict("stale".to_string()).status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        AppError::Database(sqlx::Error::RowNotFound).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        AppError::Config("bad".to_string()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

// ==================== 用户消息测试 ====================

#[test]
fn test_user_messages_no_sensitive_info() {
    let message = AppError::Database(sqlx::Error::RowNotFound).user_message();
    assert_eq!(message, "Database error occurred");
    assert!(!message.to_lowercase().contains("row"));

    let message = AppError::Config("Missing JWT secret".to_string()).user_message();
    assert_eq!(message, "Configuration error");
    assert!(!message.contains("JWT"));
}

#[test]
fn test_user_messages_for_client_errors() {
    assert_eq!(AppError::Unauthorized.user_message(), "Authentication failed");
    assert_eq!(AppError::Forbidden.user_message(), "Access denied");
    assert_eq!(AppError::not_found("Voter").user_message(), "Voter not found");
    assert_eq!(
        AppError::bad_request("Voter has already voted").user_message(),
        "Voter has already voted"
    );
}

// ==================== 响应体测试 ====================

async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
    let response = error.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_error_response_shape() {
    let (status, json) = body_json(AppError::not_found("Candidate")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], 404);
    assert_eq!(json["error"]["message"], "Candidate not found");
    assert!(json["error"]["request_id"].is_string());
    assert!(json["error"].get("errors").is_none());
}

#[tokio::test]
async fn test_validation_response_lists_fields() {
    let error = AppError::Validation(vec![
        FieldError::new("nationalId", "must be 7 or 8 digits"),
        FieldError::new("dateOfBirth", "must be at least 18 years old"),
    ]);

    let (status, json) = body_json(error).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["message"], "Validation failed");
    let errors = json["error"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["field"], "nationalId");
}

#[tokio::test]
async fn test_internal_error_hides_details() {
    let (status, json) = body_json(AppError::Internal("hash mismatch on row 12".to_string())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["message"], "Internal server error");
}
