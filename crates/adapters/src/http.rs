use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use sqlpad_core::query_runner::{QueryBackend, QueryBackendError, QueryResponse};
use sqlpad_core::statements::QueryRequest;
use tracing::debug;

pub const QUERY_PATH: &str = "/api/main";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends statement batches to a playground server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpQueryBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpQueryBackend {
    /// `endpoint` is the server origin; the query path is appended.
    pub fn new(endpoint: &str) -> Result<Self, QueryBackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| QueryBackendError::Transport(error.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            url: format!("{}{QUERY_PATH}", endpoint.trim_end_matches('/')),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResponse, QueryBackendError> {
        debug!(url = self.url.as_str(), statements = request.stmts.len(), "posting query");
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|error| QueryBackendError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| QueryBackendError::Transport(error.to_string()))?;
        classify_response(status, &body)
    }
}

/// Maps a server reply onto the backend contract.
///
/// 200 carries the result payload; 400 carries `{ "message": ... }` which is
/// surfaced verbatim; any other status is reported with its body.
pub fn classify_response(status: StatusCode, body: &str) -> Result<QueryResponse, QueryBackendError> {
    match status {
        StatusCode::OK => serde_json::from_str(body)
            .map_err(|error| QueryBackendError::Decode(error.to_string())),
        StatusCode::BAD_REQUEST => Err(QueryBackendError::Rejected {
            message: rejection_message(body),
        }),
        other => Err(QueryBackendError::UnexpectedStatus {
            status: other.as_u16(),
            body: body.to_string(),
        }),
    }
}

fn rejection_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use sqlpad_core::query_runner::QueryBackendError;

    use super::{classify_response, HttpQueryBackend};

    #[test]
    fn ok_body_decodes_into_response() {
        let response = classify_response(
            StatusCode::OK,
            r#"{"columns":[["n","Int64"]],"rows":[["1"]],"logical_plan":"Projection"}"#,
        )
        .expect("ok response decodes");

        assert_eq!(response.column_names(), vec!["n"]);
        assert_eq!(response.rows, vec![vec!["1".to_string()]]);
        assert_eq!(response.logical_plan(), Some("Projection"));
    }

    #[test]
    fn ok_with_garbage_body_is_a_decode_error() {
        let error = classify_response(StatusCode::OK, "<html>").expect_err("must fail");
        assert!(matches!(error, QueryBackendError::Decode(_)));
    }

    #[test]
    fn bad_request_surfaces_message_verbatim() {
        let error = classify_response(
            StatusCode::BAD_REQUEST,
            r#"{"message":"Schema error: No field named nope"}"#,
        )
        .expect_err("must fail");

        assert_eq!(error.to_string(), "Schema error: No field named nope");
    }

    #[test]
    fn bad_request_without_message_uses_raw_body() {
        let error = classify_response(StatusCode::BAD_REQUEST, "plain text").expect_err("must fail");
        assert_eq!(
            error,
            QueryBackendError::Rejected {
                message: "plain text".to_string()
            }
        );
    }

    #[test]
    fn other_statuses_report_code_and_body() {
        let error =
            classify_response(StatusCode::BAD_GATEWAY, "upstream down").expect_err("must fail");
        assert_eq!(error.to_string(), "unexpected status 502: upstream down");

        let error = classify_response(StatusCode::CREATED, "{}").expect_err("must fail");
        assert_eq!(error.to_string(), "unexpected status 201: {}");
    }

    #[test]
    fn query_path_is_appended_to_endpoint() {
        let backend = HttpQueryBackend::with_client(reqwest::Client::new(), "http://host:3000/");
        assert_eq!(backend.url(), "http://host:3000/api/main");
    }
}
