//! Structured denial responses: 401 bodies and 429 bodies with
//! rate-limit headers.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::auth::DenyReason;
use crate::ratelimit::{AccessTier, Category, WindowSnapshot};

/// Wire body for an authentication/authorization denial.
///
/// Uniform 401 with a terse reason string; the diagnostic detail stays
/// in the server logs.
#[derive(Debug, Serialize)]
pub struct AuthErrorBody {
    pub code: u16,
    #[serde(rename = "resultMessage")]
    pub result_message: &'static str,
}

/// Build the 401 response for a deny reason.
pub fn auth_denied(reason: DenyReason) -> Response {
    let body = AuthErrorBody {
        code: 401,
        result_message: reason.message(),
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Wire body for a rate-limit refusal.
#[derive(Debug, Serialize)]
pub struct RateLimitErrorBody {
    pub code: u16,
    #[serde(rename = "resultMessage")]
    pub result_message: String,
    #[serde(rename = "debugMessage")]
    pub debug_message: String,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
    /// Epoch milliseconds at which this response was produced.
    pub timestamp: i64,
    #[serde(rename = "rateLimitType")]
    pub rate_limit_type: &'static str,
    #[serde(rename = "accessLevel", skip_serializing_if = "Option::is_none")]
    pub access_level: Option<&'static str>,
    #[serde(rename = "remainingRequests", skip_serializing_if = "Option::is_none")]
    pub remaining_requests: Option<u64>,
    #[serde(rename = "resetTime", skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<u64>,
}

fn result_message(category: Category) -> String {
    format!("{}_rate_limit_exceeded", category.as_str())
}

fn debug_message(category: Category, retry_after_secs: u64) -> String {
    let what = match category {
        Category::Global => "requests",
        Category::Login => "login attempts",
        Category::Signup => "signup attempts",
        Category::Api | Category::Tiered(_) => "API requests",
    };
    format!("Too many {what}. Retry in {retry_after_secs} seconds.")
}

/// Build the 429 response for a refused request, including the
/// `Retry-After` and `X-RateLimit-*` headers.
pub fn rate_limited(category: Category, snapshot: &WindowSnapshot) -> Response {
    let tier: Option<AccessTier> = match category {
        Category::Tiered(tier) => Some(tier),
        _ => None,
    };

    let body = RateLimitErrorBody {
        code: 429,
        result_message: result_message(category),
        debug_message: debug_message(category, snapshot.retry_after_secs),
        retry_after: snapshot.retry_after_secs,
        timestamp: Utc::now().timestamp_millis(),
        rate_limit_type: category.as_str(),
        access_level: tier.map(|t| t.as_str()),
        remaining_requests: Some(0),
        reset_time: Some(snapshot.reset_at_ms),
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, int_header(snapshot.retry_after_secs));
    headers.insert("x-ratelimit-limit", int_header(snapshot.limit));
    headers.insert("x-ratelimit-remaining", int_header(snapshot.remaining));
    headers.insert("x-ratelimit-reset", int_header(snapshot.reset_at_ms / 1000));

    response
}

fn int_header(value: u64) -> HeaderValue {
    // Decimal digits are always a valid header value.
    HeaderValue::from_str(&value.to_string()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> WindowSnapshot {
        WindowSnapshot {
            allowed: false,
            window_started_at_ms: 1_700_000_000_000,
            limit: 5,
            remaining: 0,
            reset_at_ms: 1_700_000_060_000,
            retry_after_secs: 42,
        }
    }

    #[test]
    fn test_auth_denied_status() {
        let response = auth_denied(DenyReason::NoCredential);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = rate_limited(Category::Login, &snapshot());
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers[header::RETRY_AFTER], "42");
        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1700000060");
    }

    #[test]
    fn test_body_carries_tier_for_tiered_category() {
        let body = RateLimitErrorBody {
            code: 429,
            result_message: result_message(Category::Tiered(AccessTier::Admin)),
            debug_message: debug_message(Category::Tiered(AccessTier::Admin), 10),
            retry_after: 10,
            timestamp: 0,
            rate_limit_type: Category::Tiered(AccessTier::Admin).as_str(),
            access_level: Some(AccessTier::Admin.as_str()),
            remaining_requests: Some(0),
            reset_time: Some(0),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["resultMessage"], "admin_rate_limit_exceeded");
        assert_eq!(json["accessLevel"], "admin");
        assert_eq!(json["rateLimitType"], "admin");
    }

    #[test]
    fn test_optional_fields_omitted_when_absent() {
        let body = RateLimitErrorBody {
            code: 429,
            result_message: result_message(Category::Global),
            debug_message: debug_message(Category::Global, 1),
            retry_after: 1,
            timestamp: 0,
            rate_limit_type: Category::Global.as_str(),
            access_level: None,
            remaining_requests: None,
            reset_time: None,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("accessLevel").is_none());
        assert!(json.get("remainingRequests").is_none());
    }
}
