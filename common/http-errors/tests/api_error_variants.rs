use common_http_errors::ApiError;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use uuid::Uuid;

#[test]
fn bad_request_variant() {
    let err = ApiError::BadRequest { code: "invalid_quantity", trace_id: None, message: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_quantity");
}

#[test]
fn not_found_variant() {
    let err = ApiError::NotFound { code: "medicine_not_found", trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "medicine_not_found");
}

#[test]
fn conflict_variant() {
    let err = ApiError::Conflict { code: "alert_not_active", trace_id: None, message: Some("already resolved".into()) };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "alert_not_active");
}

#[test]
fn internal_variant() {
    let trace = Some(Uuid::new_v4());
    let err = ApiError::Internal { trace_id: trace, message: Some("boom".into()) };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
}

#[test]
fn internal_helper_carries_display_message() {
    let err = ApiError::internal("db unreachable", None);
    match err {
        ApiError::Internal { message, .. } => assert_eq!(message.as_deref(), Some("db unreachable")),
        other => panic!("unexpected variant: {other:?}"),
    }
}
