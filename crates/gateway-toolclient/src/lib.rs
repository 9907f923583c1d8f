use std::time::{Duration, Instant};

use gateway_core::{CallerContext, ToolMetadata, ToolResponse, ToolResult, ToolServer, ToolStatus};
use serde::Serialize;
use tracing::{instrument, warn};

/// Hard safety cap on auto-pagination rounds, independent of configuration,
/// so a misbehaving tool server cannot spin the fan-out forever even if the
/// configured `max_pages` is mis-set very high.
const ABSOLUTE_MAX_PAGES: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ToolClientConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_pages: u32,
}

pub struct ToolClient {
    http: reqwest::Client,
    config: ToolClientConfig,
}

#[derive(Serialize)]
struct UserContext<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    username: &'a str,
    email: &'a str,
    roles: Vec<&'a str>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "userContext")]
    user_context: UserContext<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

impl ToolClient {
    pub fn new(config: ToolClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Query a single tool server, auto-paginating the read path when
    /// `auto_paginate` is set and the server reports more pages.
    #[instrument(skip(self, caller), fields(server = %server.name))]
    pub async fn query(
        &self,
        server: &ToolServer,
        text: &str,
        caller: &CallerContext,
        cursor: Option<String>,
        auto_paginate: bool,
        is_write: bool,
        request_id: &str,
    ) -> ToolResult {
        let start = Instant::now();
        let timeout = if is_write {
            self.config.write_timeout
        } else {
            self.config.read_timeout
        };

        let mut cursor = cursor;
        let mut accumulated: Vec<serde_json::Value> = Vec::new();
        let mut aggregating = false;
        let mut pages_retrieved: u32 = 0;
        let max_pages = self.config.max_pages.min(ABSOLUTE_MAX_PAGES);

        loop {
            pages_retrieved += 1;
            let single = self
                .fetch_page(server, text, caller, cursor.as_deref(), timeout, request_id)
                .await;

            let (status, payload, error) = match single {
                Ok(resp) => (ToolStatus::Ok, Some(resp), None),
                Err(FetchError::Timeout) => (
                    ToolStatus::Timeout,
                    None,
                    Some(format!("Service did not respond within {}ms", timeout.as_millis())),
                ),
                Err(FetchError::Other(msg)) => (ToolStatus::Error, None, Some(msg)),
            };

            let Some(ToolResponse::Ok { data, metadata }) = payload.clone() else {
                return ToolResult {
                    server: server.name.clone(),
                    status,
                    payload,
                    error,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            };

            match data {
                serde_json::Value::Array(items) => {
                    aggregating = true;
                    accumulated.extend(items);
                }
                other => {
                    if !aggregating {
                        return ToolResult {
                            server: server.name.clone(),
                            status: ToolStatus::Ok,
                            payload: Some(ToolResponse::Ok { data: other, metadata }),
                            error: None,
                            duration_ms: start.elapsed().as_millis() as u64,
                        };
                    }
                    warn!("non-sequence page received mid-pagination, stopping");
                }
            }

            let has_more = metadata.as_ref().and_then(|m| m.has_more).unwrap_or(false);
            let next_cursor = metadata.as_ref().and_then(|m| m.next_cursor.clone());

            let keep_going =
                auto_paginate && has_more && next_cursor.is_some() && pages_retrieved < max_pages;

            if !keep_going {
                let returned_count = accumulated.len() as u64;
                let final_metadata = ToolMetadata {
                    has_more: Some(has_more && pages_retrieved >= max_pages),
                    next_cursor: if pages_retrieved >= max_pages { next_cursor } else { None },
                    hint: None,
                    truncated: None,
                    returned_count: Some(returned_count),
                    total_count: Some(returned_count),
                    pages_retrieved: Some(pages_retrieved),
                };
                return ToolResult {
                    server: server.name.clone(),
                    status: ToolStatus::Ok,
                    payload: Some(ToolResponse::Ok {
                        data: serde_json::Value::Array(accumulated),
                        metadata: Some(final_metadata),
                    }),
                    error: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }

            cursor = next_cursor;
        }
    }

    async fn fetch_page(
        &self,
        server: &ToolServer,
        text: &str,
        caller: &CallerContext,
        cursor: Option<&str>,
        timeout: Duration,
        request_id: &str,
    ) -> std::result::Result<ToolResponse, FetchError> {
        let roles: Vec<&str> = caller.roles.iter().map(|s| s.as_str()).collect();
        let body = QueryRequest {
            query: text,
            user_context: UserContext {
                user_id: &caller.user_id,
                username: &caller.username,
                email: &caller.email,
                roles: roles.clone(),
            },
            cursor,
        };

        let resp = self
            .http
            .post(format!("{}/query", server.endpoint.trim_end_matches('/')))
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .header("X-User-ID", &caller.user_id)
            .header("X-User-Roles", roles.join(","))
            .header("X-Request-ID", request_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Other(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Other(format!(
                "tool server returned status {}",
                resp.status()
            )));
        }

        resp.json::<ToolResponse>()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))
    }
}

enum FetchError {
    Timeout,
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn caller() -> CallerContext {
        CallerContext {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: HashSet::from(["finance".to_string()]),
            groups: vec![],
            department_code: None,
            token_id: None,
        }
    }

    fn tool_server(endpoint: String) -> ToolServer {
        ToolServer {
            name: "billing".to_string(),
            endpoint,
            required_roles: HashSet::from(["finance".to_string()]),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn single_page_non_sequence_returns_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": {"total": 42}
            })))
            .mount(&server)
            .await;

        let client = ToolClient::new(ToolClientConfig {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            max_pages: 10,
        });

        let result = client
            .query(&tool_server(server.uri()), "q", &caller(), None, true, false, "req-1")
            .await;

        assert_eq!(result.status, ToolStatus::Ok);
        match result.payload {
            Some(ToolResponse::Ok { data, .. }) => assert_eq!(data["total"], 42),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn auto_paginates_sequences_until_has_more_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": [1, 2],
                "metadata": {"hasMore": true, "nextCursor": "page2"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": [3],
                "metadata": {"hasMore": false}
            })))
            .mount(&server)
            .await;

        let client = ToolClient::new(ToolClientConfig {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            max_pages: 10,
        });

        let result = client
            .query(&tool_server(server.uri()), "q", &caller(), None, true, false, "req-1")
            .await;

        match result.payload {
            Some(ToolResponse::Ok { data, metadata }) => {
                assert_eq!(data.as_array().unwrap().len(), 3);
                assert_eq!(metadata.unwrap().pages_retrieved, Some(2));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_at_max_pages_even_if_has_more_true() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": [1],
                "metadata": {"hasMore": true, "nextCursor": "next"}
            })))
            .mount(&server)
            .await;

        let client = ToolClient::new(ToolClientConfig {
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            max_pages: 2,
        });

        let result = client
            .query(&tool_server(server.uri()), "q", &caller(), None, true, false, "req-1")
            .await;

        match result.payload {
            Some(ToolResponse::Ok { data, metadata }) => {
                assert_eq!(data.as_array().unwrap().len(), 2);
                let m = metadata.unwrap();
                assert_eq!(m.pages_retrieved, Some(2));
                assert_eq!(m.has_more, Some(true));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
