use crate::error::{AdapterError, AdapterResult};
use crate::models::{AdapterHealth, AdapterResponse, DateRange, RequestContext};
use crate::PayerAdapter;
use async_trait::async_trait;
use broker_common::{DataScope, HealthState};
use chrono::Utc;
use credential_vault::CredentialPayload;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Reference adapter for payers exposing a JSON-over-HTTP API.
///
/// Insurer-specific adapters differ in endpoint paths and payload mapping;
/// the credential handling, timeout discipline, and status-code-to-error
/// mapping here are the template they follow.
pub struct RestPayerAdapter {
    payer_code: String,
    base_url: String,
    client: Client,
    timeout: Duration,
    capabilities: Vec<DataScope>,
}

impl RestPayerAdapter {
    pub fn new(payer_code: &str, base_url: &str) -> AdapterResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::ServiceUnavailable(e.to_string()))?;

        Ok(Self {
            payer_code: payer_code.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout: DEFAULT_TIMEOUT,
            capabilities: DataScope::ALL.to_vec(),
        })
    }

    /// Restrict the advertised capabilities (default: all four).
    pub fn with_capabilities(mut self, capabilities: Vec<DataScope>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn apply_credential(
        &self,
        request: RequestBuilder,
        credential: &CredentialPayload,
    ) -> AdapterResult<RequestBuilder> {
        match credential {
            CredentialPayload::ApiKey { api_key, .. } => Ok(request.bearer_auth(api_key)),
            CredentialPayload::UsernamePassword { username, password } => {
                Ok(request.basic_auth(username, Some(password)))
            }
            CredentialPayload::OauthClient { client_id, .. } => {
                // Token exchange happens in `authenticate`; data calls carry
                // the client id so the payer can correlate the session.
                Ok(request.header("X-Client-Id", client_id.clone()))
            }
            CredentialPayload::Certificate { .. } => Err(AdapterError::InvalidRequest(
                "certificate credentials require an mTLS-capable adapter".to_string(),
            )),
        }
    }

    fn map_status(status: StatusCode, body: &str) -> AdapterError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AdapterError::AuthFailed(format!("payer returned {status}"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                AdapterError::RateLimited(format!("payer returned {status}"))
            }
            StatusCode::NOT_FOUND => {
                AdapterError::MemberNotFound("no matching member".to_string())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                AdapterError::InvalidRequest(format!("payer returned {status}: {body}"))
            }
            _ => AdapterError::ServiceUnavailable(format!("payer returned {status}")),
        }
    }

    fn map_transport(err: reqwest::Error) -> AdapterError {
        if err.is_timeout() {
            AdapterError::ServiceUnavailable("payer API timed out".to_string())
        } else {
            AdapterError::ServiceUnavailable(err.to_string())
        }
    }

    /// POST a data request and normalize the outcome into the envelope.
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: serde_json::Value,
    ) -> AdapterResult<AdapterResponse> {
        let url = format!("{}{path}", self.base_url);
        let started = Instant::now();

        let request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("X-Request-Id", ctx.request_id.to_string())
            .json(&body);
        let request = self.apply_credential(request, &ctx.credential)?;

        debug!(payer_code = %self.payer_code, %url, request_id = %ctx.request_id, "payer API call");

        let response = request.send().await.map_err(Self::map_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(Self::map_transport)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(Self::map_status(status, &text));
        }

        let raw: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| AdapterError::ServiceUnavailable(format!("unparseable payer response: {e}")))?;

        // The payer's "data" member is the normalized payload; the whole
        // body is preserved verbatim for the cache's raw column.
        let data = raw.get("data").cloned().unwrap_or_else(|| raw.clone());

        Ok(AdapterResponse::ok(ctx.request_id, data, Some(raw), elapsed_ms))
    }

    fn member_body(&self, ctx: &RequestContext) -> serde_json::Value {
        json!({
            "member_id": ctx.patient.member_id,
            "first_name": ctx.patient.first_name,
            "last_name": ctx.patient.last_name,
            "date_of_birth": ctx.patient.date_of_birth,
            "group_number": ctx.patient.group_number,
        })
    }
}

#[async_trait]
impl PayerAdapter for RestPayerAdapter {
    fn payer_code(&self) -> &str {
        &self.payer_code
    }

    fn supports_capability(&self, scope: DataScope) -> bool {
        self.capabilities.contains(&scope)
    }

    async fn authenticate(&self, credential: &CredentialPayload) -> AdapterResult<()> {
        match credential {
            CredentialPayload::OauthClient {
                client_id,
                client_secret,
                token_url,
            } => {
                let response = self
                    .client
                    .post(token_url)
                    .timeout(self.timeout)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(Self::map_transport)?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(AdapterError::AuthFailed(format!(
                        "token endpoint returned {}",
                        response.status()
                    )))
                }
            }
            // Key- and password-style credentials are verified by the first
            // data call; a lightweight ping avoids burning rate limit here.
            _ => self.health_check().await.map(|_| ()),
        }
    }

    async fn health_check(&self) -> AdapterResult<AdapterHealth> {
        let url = format!("{}/health", self.base_url);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let latency_ms = started.elapsed().as_millis() as u64;
        let state = if response.status().is_success() {
            HealthState::Healthy
        } else if response.status().is_server_error() {
            HealthState::Down
        } else {
            HealthState::Degraded
        };

        Ok(AdapterHealth {
            state,
            message: format!("payer returned {}", response.status()),
            latency_ms,
            checked_at: Utc::now(),
        })
    }

    async fn check_eligibility(&self, ctx: &RequestContext) -> AdapterResult<AdapterResponse> {
        self.dispatch(ctx, "/eligibility", self.member_body(ctx)).await
    }

    async fn get_benefits(&self, ctx: &RequestContext) -> AdapterResult<AdapterResponse> {
        self.dispatch(ctx, "/benefits", self.member_body(ctx)).await
    }

    async fn get_claims_history(
        &self,
        ctx: &RequestContext,
        date_range: Option<DateRange>,
    ) -> AdapterResult<AdapterResponse> {
        let mut body = self.member_body(ctx);
        if let (Some(range), Some(map)) = (date_range, body.as_object_mut()) {
            map.insert("from_date".to_string(), json!(range.from));
            map.insert("to_date".to_string(), json!(range.to));
        }
        self.dispatch(ctx, "/claims", body).await
    }

    async fn check_prior_auth(
        &self,
        ctx: &RequestContext,
        service_code: &str,
    ) -> AdapterResult<AdapterResponse> {
        let mut body = self.member_body(ctx);
        if let Some(map) = body.as_object_mut() {
            map.insert("service_code".to_string(), json!(service_code));
        }
        self.dispatch(ctx, "/prior-auth", body).await
    }
}
