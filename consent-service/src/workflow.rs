use crate::error::{ConsentError, ConsentResult};
use crate::models::{
    AuthorizationStatus, ConsentDecision, DeliveryMethod, PatientAuthorization,
    GRANT_VALIDITY_DAYS, MAX_LINK_ATTEMPTS, MAX_REQUESTS_PER_WINDOW, MAX_RESEND_COUNT,
    TOKEN_VALIDITY_DAYS,
};
use crate::notify::{NotificationMessage, NotificationSender};
use crate::rate_limit::IssuanceRateLimiter;
use crate::store::AuthorizationRepository;
use crate::tokens::mint_token;
use async_trait::async_trait;
use audit_trail::{AuditEvent, AuditTrail, EventCategory};
use broker_common::{ActorType, DataScope};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cross-cutting hook: revoking a grant flags every cache entry for the
/// patient stale. The broker's cache implements this.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn mark_patient_stale(&self, patient_id: Uuid) -> Result<(), String>;
}

/// No-op invalidator for deployments without a data cache.
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn mark_patient_stale(&self, _patient_id: Uuid) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuthorizationRequest {
    pub practice_id: Uuid,
    pub patient_id: Uuid,
    pub scopes: Vec<DataScope>,
    pub delivery_method: DeliveryMethod,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub requested_by: String,
}

/// Client metadata captured from patient-facing requests.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// What the patient-facing link page gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationView {
    pub authorization_id: Uuid,
    pub practice_id: Uuid,
    pub scopes: Vec<DataScope>,
    pub token_expires_at: DateTime<Utc>,
}

/// The consent workflow: issuance, patient decision, resend, revocation.
pub struct ConsentService {
    repository: Arc<dyn AuthorizationRepository>,
    limiter: IssuanceRateLimiter,
    sender: Arc<dyn NotificationSender>,
    audit: Arc<AuditTrail>,
    cache_invalidator: Arc<dyn CacheInvalidator>,
    base_url: String,
}

impl ConsentService {
    pub fn new(
        repository: Arc<dyn AuthorizationRepository>,
        sender: Arc<dyn NotificationSender>,
        audit: Arc<AuditTrail>,
        cache_invalidator: Arc<dyn CacheInvalidator>,
        base_url: &str,
    ) -> Self {
        Self {
            repository,
            limiter: IssuanceRateLimiter::new(MAX_REQUESTS_PER_WINDOW, Duration::hours(24)),
            sender,
            audit,
            cache_invalidator,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authorization_link(&self, token: &str) -> String {
        format!("{}/authorize/{token}", self.base_url)
    }

    /// Issue a new authorization request and attempt link delivery.
    ///
    /// Delivery failure does not roll the record back: the grant exists with
    /// `notification_sent = false` and can be resent.
    pub async fn create_authorization(
        &self,
        request: CreateAuthorizationRequest,
    ) -> ConsentResult<PatientAuthorization> {
        if request.scopes.is_empty() {
            return Err(ConsentError::EmptyScopes);
        }

        let recipient = match request.delivery_method {
            DeliveryMethod::Email => request.email.clone(),
            DeliveryMethod::Sms => request.phone.clone(),
        }
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| {
            ConsentError::DeliveryUnreachable(match request.delivery_method {
                DeliveryMethod::Email => "no email address on file".to_string(),
                DeliveryMethod::Sms => "no phone number on file".to_string(),
            })
        })?;

        if let Err(count) = self.limiter.check_and_increment(request.patient_id) {
            self.audit
                .record(
                    AuditEvent::new(
                        EventCategory::Consent,
                        "authorization_request_rate_limited",
                        "patient",
                        &request.patient_id.to_string(),
                    )
                    .actor(ActorType::User, &request.requested_by)
                    .practice(request.practice_id)
                    .patient(request.patient_id)
                    .outcome(false),
                )
                .await?;
            return Err(ConsentError::RateLimited(count));
        }

        let now = Utc::now();
        let token = mint_token();
        let mut authorization = PatientAuthorization {
            id: Uuid::new_v4(),
            practice_id: request.practice_id,
            patient_id: request.patient_id,
            scopes: request.scopes.clone(),
            status: AuthorizationStatus::Pending,
            token: token.clone(),
            token_expires_at: now + Duration::days(TOKEN_VALIDITY_DAYS),
            token_used_at: None,
            expires_at: now + Duration::days(GRANT_VALIDITY_DAYS),
            delivery_method: request.delivery_method,
            delivery_recipient: recipient.clone(),
            notification_sent: false,
            consent_given_at: None,
            consent_signature: None,
            consent_ip_address: None,
            consent_user_agent: None,
            revoked_at: None,
            revoked_reason: None,
            resend_count: 0,
            link_attempt_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.repository.insert(authorization.clone()).await?;

        let outcome = self
            .sender
            .send(NotificationMessage {
                method: request.delivery_method,
                recipient,
                template: "insurance_authorization_request".to_string(),
                data: json!({
                    "authorization_link": self.authorization_link(&token),
                    "scopes": request.scopes,
                    "link_expires_at": authorization.token_expires_at,
                }),
            })
            .await;

        if outcome.success {
            authorization.notification_sent = true;
            authorization.updated_at = Utc::now();
            self.repository.update(authorization.clone()).await?;
        } else {
            warn!(
                authorization_id = %authorization.id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "authorization link delivery failed; record kept for resend"
            );
        }

        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::Consent,
                    "authorization_requested",
                    "authorization",
                    &authorization.id.to_string(),
                )
                .actor(ActorType::User, &request.requested_by)
                .practice(request.practice_id)
                .patient(request.patient_id)
                .details(json!({
                    "scopes": request.scopes,
                    "delivery_method": request.delivery_method,
                    "notification_sent": authorization.notification_sent,
                }))
                .outcome(true),
            )
            .await?;

        info!(authorization_id = %authorization.id, "authorization request created");
        Ok(authorization)
    }

    /// Patient opens the authorization link.
    ///
    /// Rejections, in order: unknown token, expired token (transitions the
    /// record to `expired`), consumed token, more than 5 views on this link.
    pub async fn view_by_token(
        &self,
        token: &str,
        client: &ClientInfo,
    ) -> ConsentResult<AuthorizationView> {
        let mut authorization = self
            .repository
            .get_by_token(token)
            .await?
            .ok_or(ConsentError::NotFound)?;

        self.expire_if_stale(&mut authorization).await?;

        if authorization.token_used_at.is_some() {
            return Err(ConsentError::TokenAlreadyUsed);
        }

        if authorization.link_attempt_count >= MAX_LINK_ATTEMPTS {
            warn!(
                authorization_id = %authorization.id,
                attempts = authorization.link_attempt_count,
                "authorization link locked after repeated views"
            );
            return Err(ConsentError::TooManyLinkAttempts);
        }

        authorization.link_attempt_count += 1;
        authorization.updated_at = Utc::now();
        self.repository.update(authorization.clone()).await?;

        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::Consent,
                    "consent_link_viewed",
                    "authorization",
                    &authorization.id.to_string(),
                )
                .actor(ActorType::Patient, &authorization.patient_id.to_string())
                .practice(authorization.practice_id)
                .patient(authorization.patient_id)
                .client(client.ip_address.clone(), client.user_agent.clone())
                .details(json!({ "attempt": authorization.link_attempt_count }))
                .outcome(true),
            )
            .await?;

        Ok(AuthorizationView {
            authorization_id: authorization.id,
            practice_id: authorization.practice_id,
            scopes: authorization.scopes.clone(),
            token_expires_at: authorization.token_expires_at,
        })
    }

    /// Patient submits a decision. Exactly-once per token: whichever call
    /// claims the token first wins, the second fails with "already used".
    pub async fn decide_by_token(
        &self,
        token: &str,
        decision: ConsentDecision,
        client: &ClientInfo,
    ) -> ConsentResult<PatientAuthorization> {
        let mut authorization = self
            .repository
            .get_by_token(token)
            .await?
            .ok_or(ConsentError::NotFound)?;

        self.expire_if_stale(&mut authorization).await?;

        if authorization.token_used_at.is_some() {
            return Err(ConsentError::TokenAlreadyUsed);
        }
        if authorization.status != AuthorizationStatus::Pending {
            return Err(ConsentError::InvalidState {
                expected: "pending".to_string(),
                found: authorization.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        if !self.repository.claim_token(authorization.id, now).await? {
            return Err(ConsentError::TokenAlreadyUsed);
        }
        authorization.token_used_at = Some(now);

        let (event_type, template) = match &decision {
            ConsentDecision::Authorize { signature } => {
                authorization.status = AuthorizationStatus::Authorized;
                authorization.consent_given_at = Some(now);
                authorization.consent_signature = Some(signature.clone());
                authorization.consent_ip_address = client.ip_address.clone();
                authorization.consent_user_agent = client.user_agent.clone();
                ("consent_given", "insurance_authorization_confirmed")
            }
            ConsentDecision::Deny => {
                authorization.status = AuthorizationStatus::Denied;
                ("consent_denied", "insurance_authorization_denied")
            }
        };
        authorization.updated_at = now;
        self.repository.update(authorization.clone()).await?;

        {
            let outcome = self
                .sender
                .send(NotificationMessage {
                    method: authorization.delivery_method,
                    recipient: authorization.delivery_recipient.clone(),
                    template: template.to_string(),
                    data: json!({
                        "scopes": authorization.scopes,
                        "expires_at": authorization.expires_at,
                    }),
                })
                .await;
            if !outcome.success {
                warn!(
                    authorization_id = %authorization.id,
                    "consent confirmation delivery failed"
                );
            }
        }

        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::Consent,
                    event_type,
                    "authorization",
                    &authorization.id.to_string(),
                )
                .actor(ActorType::Patient, &authorization.patient_id.to_string())
                .practice(authorization.practice_id)
                .patient(authorization.patient_id)
                .client(client.ip_address.clone(), client.user_agent.clone())
                .details(json!({ "scopes": authorization.scopes }))
                .outcome(true),
            )
            .await?;

        info!(
            authorization_id = %authorization.id,
            status = authorization.status.as_str(),
            "patient decision recorded"
        );
        Ok(authorization)
    }

    /// Resend the authorization link. Only while `pending`, at most 3 times;
    /// a token within 24h of expiry is re-minted first.
    pub async fn resend(&self, authorization_id: Uuid, requested_by: &str) -> ConsentResult<PatientAuthorization> {
        let mut authorization = self
            .repository
            .get(authorization_id)
            .await?
            .ok_or(ConsentError::NotFound)?;

        if authorization.status != AuthorizationStatus::Pending {
            return Err(ConsentError::InvalidState {
                expected: "pending".to_string(),
                found: authorization.status.as_str().to_string(),
            });
        }
        if authorization.resend_count >= MAX_RESEND_COUNT {
            return Err(ConsentError::ResendLimitReached);
        }

        let now = Utc::now();
        let reminted = authorization.token_near_expiry(now);
        if reminted {
            authorization.token = mint_token();
            authorization.token_expires_at = now + Duration::days(TOKEN_VALIDITY_DAYS);
            authorization.link_attempt_count = 0;
        }

        let outcome = self
            .sender
            .send(NotificationMessage {
                method: authorization.delivery_method,
                recipient: authorization.delivery_recipient.clone(),
                template: "insurance_authorization_request".to_string(),
                data: json!({
                    "authorization_link": self.authorization_link(&authorization.token),
                    "scopes": authorization.scopes,
                    "link_expires_at": authorization.token_expires_at,
                }),
            })
            .await;

        authorization.resend_count += 1;
        authorization.notification_sent = authorization.notification_sent || outcome.success;
        authorization.updated_at = now;
        self.repository.update(authorization.clone()).await?;

        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::Consent,
                    "authorization_resent",
                    "authorization",
                    &authorization.id.to_string(),
                )
                .actor(ActorType::User, requested_by)
                .practice(authorization.practice_id)
                .patient(authorization.patient_id)
                .details(json!({
                    "resend_count": authorization.resend_count,
                    "token_reminted": reminted,
                    "delivered": outcome.success,
                }))
                .outcome(outcome.success),
            )
            .await?;

        Ok(authorization)
    }

    /// Administrative revocation of an `authorized` grant. Flags every cache
    /// entry for the patient stale within the same operation.
    pub async fn revoke(
        &self,
        authorization_id: Uuid,
        reason: &str,
        revoked_by: &str,
    ) -> ConsentResult<PatientAuthorization> {
        let mut authorization = self
            .repository
            .get(authorization_id)
            .await?
            .ok_or(ConsentError::NotFound)?;

        if authorization.status != AuthorizationStatus::Authorized {
            return Err(ConsentError::InvalidState {
                expected: "authorized".to_string(),
                found: authorization.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        authorization.status = AuthorizationStatus::Revoked;
        authorization.revoked_at = Some(now);
        authorization.revoked_reason = Some(reason.to_string());
        authorization.updated_at = now;
        self.repository.update(authorization.clone()).await?;

        self.cache_invalidator
            .mark_patient_stale(authorization.patient_id)
            .await
            .map_err(ConsentError::Storage)?;

        let outcome = self
            .sender
            .send(NotificationMessage {
                method: authorization.delivery_method,
                recipient: authorization.delivery_recipient.clone(),
                template: "insurance_authorization_revoked".to_string(),
                data: json!({ "revoked_at": now }),
            })
            .await;
        if !outcome.success {
            warn!(
                authorization_id = %authorization.id,
                "revocation notice delivery failed"
            );
        }

        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::Consent,
                    "authorization_revoked",
                    "authorization",
                    &authorization.id.to_string(),
                )
                .actor(ActorType::User, revoked_by)
                .practice(authorization.practice_id)
                .patient(authorization.patient_id)
                .details(json!({ "reason": reason }))
                .outcome(true),
            )
            .await?;

        info!(authorization_id = %authorization.id, "authorization revoked");
        Ok(authorization)
    }

    /// Fetch a grant by id (broker entry point).
    pub async fn get_authorization(
        &self,
        authorization_id: Uuid,
    ) -> ConsentResult<Option<PatientAuthorization>> {
        self.repository.get(authorization_id).await
    }

    /// All `authorized` grants for a patient (stale-refresh sweep input).
    pub async fn authorized_grants_for_patient(
        &self,
        patient_id: Uuid,
    ) -> ConsentResult<Vec<PatientAuthorization>> {
        self.repository
            .list_for_patient(patient_id, Some(AuthorizationStatus::Authorized))
            .await
    }

    /// Lazily transition a pending grant whose token aged out.
    async fn expire_if_stale(
        &self,
        authorization: &mut PatientAuthorization,
    ) -> ConsentResult<()> {
        let now = Utc::now();
        if authorization.status == AuthorizationStatus::Pending
            && authorization.token_used_at.is_none()
            && authorization.token_expired(now)
        {
            authorization.status = AuthorizationStatus::Expired;
            authorization.updated_at = now;
            self.repository.update(authorization.clone()).await?;

            self.audit
                .record(
                    AuditEvent::new(
                        EventCategory::Consent,
                        "authorization_expired",
                        "authorization",
                        &authorization.id.to_string(),
                    )
                    .patient(authorization.patient_id)
                    .practice(authorization.practice_id)
                    .outcome(true),
                )
                .await?;
            return Err(ConsentError::TokenExpired);
        }
        if authorization.status == AuthorizationStatus::Expired {
            return Err(ConsentError::TokenExpired);
        }
        Ok(())
    }
}
