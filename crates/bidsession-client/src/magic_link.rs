//! Magic link requests.
//!
//! One-shot messaging action against the tenant's admin console. Unlike
//! session calls, the counterpart key is the community public key from the
//! tenant context, so no key fetch is involved.

use bidsession_crypto::derive_shared_key_from_base64;
use serde::Serialize;
use serde_json::Value;

use crate::{
    env::Environment,
    envelope::EnvelopeBuilder,
    error::SessionError,
    session::{Outcome, SessionClient, SoftFailure},
    tenant::TenantContext,
    transport::Method,
};

const LINK_VERSION: &str = "v0";
const VERIFICATION_LINK: &str = "verification_link";

/// Parameters of an email verification link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLinkRequest {
    /// User the link is issued for
    pub user_id: String,
    /// Recipient address
    pub email_to: String,
    /// Base64 email body template
    pub email_template_b64: String,
    /// Email subject line
    pub email_subject: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerificationLinkPayload<'a> {
    created_by: &'a str,
    version: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    user_id: &'a str,
    email_to: &'a str,
    #[serde(rename = "emailTemplateB64")]
    email_template_b64: &'a str,
    email_subject: &'a str,
}

impl<E: Environment> SessionClient<E> {
    /// Ask the admin console to email a verification link.
    ///
    /// Any 2xx answer completes with the response JSON (`null` for an empty
    /// body). Other statuses are soft failures.
    pub async fn request_email_verification_link(
        &self,
        ctx: &TenantContext,
        request: &MagicLinkRequest,
    ) -> Result<Outcome<Value>, SessionError> {
        let shared_key = derive_shared_key_from_base64(
            ctx.key_pair.secret(),
            &ctx.community.community_public_key,
        )?;

        let payload = VerificationLinkPayload {
            created_by: &self.config().created_by,
            version: LINK_VERSION,
            kind: VERIFICATION_LINK,
            user_id: &request.user_id,
            email_to: &request.email_to,
            email_template_b64: &request.email_template_b64,
            email_subject: &request.email_subject,
        };

        let public_key = ctx.key_pair.public_key_base64();
        let envelope = EnvelopeBuilder::new(&shared_key, &public_key, &self.config().app_id)
            .license_key(ctx.license_key())
            .tenant_tag(&ctx.community.tenant_tag)
            .build(self.env(), &payload)?;

        let url = format!(
            "{}/api/r2/acr/community/{}/code",
            ctx.services.admin_console_url, ctx.community.community_name
        );
        let response = self.dispatch(Method::Put, url, envelope).await?;

        if !(200..300).contains(&response.status) {
            tracing::warn!("verification link request rejected with status {}", response.status);
            return Ok(Outcome::Rejected(SoftFailure {
                status: response.status,
                message: response.body,
            }));
        }

        if response.body.trim().is_empty() {
            return Ok(Outcome::Completed(Value::Null));
        }

        let value = serde_json::from_str(&response.body)
            .map_err(|e| SessionError::MalformedResponse { reason: e.to_string() })?;

        tracing::info!(
            "verification link requested for community {}",
            ctx.community.community_name
        );

        Ok(Outcome::Completed(value))
    }
}
