//! HTTP error responses

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use spendlocal_core::CoreError;
use spendlocal_payments::{PaymentError, PurchaseError};
use tracing::error;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// Set when a reservation exists even though the request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
            subscription_id: None,
        }),
    )
}

pub fn from_core(e: &CoreError) -> ApiError {
    let (status, code) = match e {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        CoreError::Storage(_) | CoreError::Timeout(_) | CoreError::Http(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
        }
        CoreError::Decode(_) | CoreError::Json(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };
    if status.is_server_error() {
        error!(error = %e, "Request failed");
    }
    api_error(status, e.user_message(), code)
}

pub fn from_purchase(e: &PurchaseError) -> ApiError {
    let status = match e {
        PurchaseError::Validation(_) => StatusCode::BAD_REQUEST,
        PurchaseError::Reservation(_) => StatusCode::SERVICE_UNAVAILABLE,
        PurchaseError::PaymentDispatch { .. } => StatusCode::BAD_GATEWAY,
    };
    let (status, Json(mut body)) = api_error(status, e.user_message(), e.code());
    if let PurchaseError::PaymentDispatch {
        subscription_id, ..
    } = e
    {
        body.subscription_id = Some(subscription_id.clone());
    }
    (status, Json(body))
}

/// Mapping for activation paths (webhook and manual confirmation)
pub fn from_payment(e: &PaymentError) -> ApiError {
    let (status, code) = match e {
        PaymentError::Core(core) => return from_core(core),
        PaymentError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        PaymentError::Correlation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CORRELATION_FAILED"),
        PaymentError::InvalidAmount(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT"),
        PaymentError::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        PaymentError::Stripe(_) | PaymentError::Dispatch(_) | PaymentError::Timeout(_) => {
            (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR")
        }
        PaymentError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
    };
    api_error(status, e.user_message(), code)
}

/// Webhook deliveries: anything not clearly the sender's fault is a 500 so
/// Stripe redelivers
pub fn from_webhook(e: &PaymentError) -> ApiError {
    match e {
        PaymentError::WebhookSignature(_)
        | PaymentError::WebhookParse(_)
        | PaymentError::Correlation(_)
        | PaymentError::InvalidAmount(_)
        | PaymentError::InvalidTransition(_) => from_payment(e),
        other => {
            error!(error = %other, "Webhook processing failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                other.user_message(),
                "WEBHOOK_FAILED",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_codes() {
        let (status, Json(body)) = from_purchase(&PurchaseError::Reservation(CoreError::Timeout(10)));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "RESERVATION_FAILED");
        assert!(body.subscription_id.is_none());

        let (status, Json(body)) = from_purchase(&PurchaseError::PaymentDispatch {
            subscription_id: "sub-1".into(),
            source: PaymentError::Dispatch("launcher refused".into()),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "PAYMENT_DISPATCH_FAILED");
        assert_eq!(body.subscription_id.as_deref(), Some("sub-1"));
    }

    #[test]
    fn test_invalid_amount_is_client_error() {
        let (status, Json(body)) = from_payment(&PaymentError::InvalidAmount("-5".into()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, "INVALID_AMOUNT");
    }

    #[test]
    fn test_webhook_statuses() {
        let status = |e: PaymentError| from_webhook(&e).0;
        assert_eq!(status(PaymentError::WebhookSignature("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(PaymentError::Correlation("unknown".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status(PaymentError::InvalidTransition("expired".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(PaymentError::InvalidAmount("0".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(PaymentError::Core(CoreError::Storage("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
