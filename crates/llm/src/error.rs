//! The pipeline's error taxonomy and its HTTP surface.
//!
//! One enum, one status-code mapping, one body shape per ingress dialect. Google never
//! appears on the ingress side so there is no Google error body to render.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::messages::anthropic::{AnthropicError, AnthropicErrorDetails};

/// Which ingress dialect's error body shape to render a [`PipelineError`] as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDialect {
    /// `{"error": {"message", "type", "param", "code"}}`.
    Openai,
    /// `{"type": "error", "error": {"type", "message"}}`.
    Anthropic,
}

/// Everything that can go wrong while a request moves through the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// No bearer token / `x-api-key` was presented.
    #[error("missing credentials")]
    AuthMissing,
    /// The presented token matched neither `model_token` nor `virtual_model_token`.
    #[error("invalid credentials")]
    AuthInvalid,
    /// No active rule resolves `(request_model, scenario)`.
    #[error("no rule resolves model '{0}'")]
    UnknownModel(String),
    /// The vault could not produce a usable credential for the routed provider.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(#[from] vault::VaultError),
    /// The unified request used a feature the target dialect has no representation for.
    #[error("'{feature}' cannot be translated to the upstream dialect")]
    TranslationUnsupported {
        /// Name of the unsupported feature, surfaced verbatim in the response body.
        feature: String,
    },
    /// The provider didn't answer within its configured timeout.
    #[error("upstream request timed out")]
    UpstreamTimeout,
    /// The provider answered with a non-2xx status.
    #[error("upstream returned {status}")]
    UpstreamStatus {
        /// The upstream's HTTP status code.
        status: StatusCode,
        /// The upstream's raw response body, passed through verbatim to the client.
        body: String,
    },
    /// The client closed the connection before a response could be sent.
    #[error("client disconnected")]
    ClientDisconnected,
    /// A broken invariant in this process, never the upstream's fault.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthMissing | Self::AuthInvalid => StatusCode::UNAUTHORIZED,
            Self::UnknownModel(_) => StatusCode::NOT_FOUND,
            Self::CredentialUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::TranslationUnsupported { .. } => StatusCode::BAD_REQUEST,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamStatus { status, .. } => {
                if status.is_client_error() || status.is_server_error() {
                    *status
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            Self::ClientDisconnected => StatusCode::from_u16(499).expect("499 is a valid three-digit status code"),
            Self::InternalInvariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::AuthMissing => "auth_missing",
            Self::AuthInvalid => "auth_invalid",
            Self::UnknownModel(_) => "unknown_model",
            Self::CredentialUnavailable(_) => "credential_unavailable",
            Self::TranslationUnsupported { .. } => "translation_unsupported",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamStatus { .. } => "upstream_error",
            Self::ClientDisconnected => "client_disconnected",
            Self::InternalInvariant(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            // Never echo internals: the invariant reason is logged, not returned.
            Self::InternalInvariant(_) => "an internal error occurred".to_string(),
            Self::UpstreamStatus { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }

    /// Renders this error as a single SSE data payload for a stream that has already
    /// started (so a non-2xx status is no longer an option): `dialect`'s normal error
    /// body shape, ready to hand to `Event::default().data`.
    pub(crate) fn mid_stream_event_json(&self, dialect: ErrorDialect) -> serde_json::Value {
        let error_type = self.error_type();
        let message = self.client_message();

        match dialect {
            ErrorDialect::Openai => json!({
                "error": {
                    "message": message,
                    "type": error_type,
                    "param": serde_json::Value::Null,
                    "code": serde_json::Value::Null,
                }
            }),
            ErrorDialect::Anthropic => json!({
                "type": "error",
                "error": {
                    "type": error_type,
                    "message": message,
                }
            }),
        }
    }

    /// Render this error as an HTTP response shaped for `dialect`'s ingress clients.
    pub fn into_response_for(self, dialect: ErrorDialect) -> Response {
        if let Self::InternalInvariant(reason) = &self {
            log::error!("internal invariant violated: {reason}");
        }

        if matches!(self, Self::ClientDisconnected) {
            log::debug!("client disconnected before the response could be sent");
            return self.status_code().into_response();
        }

        let status = self.status_code();
        let error_type = self.error_type();
        let feature = match &self {
            Self::TranslationUnsupported { feature } => Some(feature.clone()),
            _ => None,
        };
        let message = self.client_message();

        let mut body = match dialect {
            ErrorDialect::Openai => json!({
                "error": {
                    "message": message,
                    "type": error_type,
                    "param": serde_json::Value::Null,
                    "code": serde_json::Value::Null,
                }
            }),
            ErrorDialect::Anthropic => serde_json::to_value(AnthropicError {
                error_type: "error".to_string(),
                error: AnthropicErrorDetails {
                    error_type: error_type.to_string(),
                    message,
                },
            })
            .unwrap_or_default(),
        };

        if let Some(feature) = feature {
            body["error"]["feature"] = json!(feature);
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Default rendering for call sites that haven't resolved an ingress dialect yet (e.g.
/// a failure before the scenario stage runs).
impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        self.into_response_for(ErrorDialect::Openai)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_unsupported_names_the_feature_in_both_dialects() {
        for dialect in [ErrorDialect::Openai, ErrorDialect::Anthropic] {
            let error = PipelineError::TranslationUnsupported {
                feature: "parallel_tool_calls".to_string(),
            };

            let response = error.into_response_for(dialect);
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn upstream_status_below_400_is_wrapped_as_bad_gateway() {
        let error = PipelineError::UpstreamStatus {
            status: StatusCode::MOVED_PERMANENTLY,
            body: "redirect".to_string(),
        };

        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn upstream_status_at_or_above_400_passes_through() {
        let error = PipelineError::UpstreamStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "rate limited".to_string(),
        };

        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn client_disconnected_is_499_with_no_body() {
        let response = PipelineError::ClientDisconnected.into_response_for(ErrorDialect::Openai);
        assert_eq!(response.status().as_u16(), 499);
    }
}
