//! Out-of-band counters fetched over HTTP.
//!
//! Two lookups feed optional snapshot fields:
//!
//! - the store's product counter → `users.subscriber_count`
//! - the identity provider's stats → the `blender_id` block
//!
//! Both are plain GETs returning JSON. Any failure (network, non-2xx, body
//! that does not decode) is a [`RemoteLookupError`]; the assembler logs it and
//! leaves the field out.

use crate::config::RemoteLookupConfig;
use crate::error::RemoteLookupError;
use crate::metrics;
use crate::stats::{IdentityProviderStats, PrivacyPolicyAgreement};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    total_sold: i64,
}

#[derive(Debug, Deserialize)]
struct IdentityProviderResponse {
    users: IdentityProviderUsers,
}

#[derive(Debug, Deserialize)]
struct IdentityProviderUsers {
    confirmed: i64,
    unconfirmed: i64,
    total: i64,
    #[serde(default)]
    privacy_policy_agreed: Option<PrivacyPolicyAgreement>,
}

/// HTTP client plus the two lookup endpoints.
///
/// Cloning is cheap; the assembler moves a clone into each lookup task.
#[derive(Debug, Clone)]
pub struct RemoteLookups {
    client: reqwest::Client,
    subscription_url: String,
    identity_provider_url: String,
}

impl RemoteLookups {
    pub fn new(config: &RemoteLookupConfig) -> Result<Self, RemoteLookupError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout_duration())
            .build()
            .map_err(|source| RemoteLookupError::Network {
                url: config.subscription_url.clone(),
                source,
            })?;
        Ok(Self::with_client(
            client,
            &config.subscription_url,
            &config.identity_provider_url,
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        subscription_url: &str,
        identity_provider_url: &str,
    ) -> Self {
        Self {
            client,
            subscription_url: subscription_url.to_string(),
            identity_provider_url: identity_provider_url.to_string(),
        }
    }

    /// Active subscription count reported by the store.
    pub async fn subscription_count(&self) -> Result<i64, RemoteLookupError> {
        let result = self
            .get_json::<SubscriptionResponse>(&self.subscription_url)
            .await
            .map(|body| body.total_sold);
        metrics::record_remote_lookup("subscription", result.is_ok());
        result
    }

    /// User counters reported by the identity provider.
    pub async fn identity_provider_stats(&self) -> Result<IdentityProviderStats, RemoteLookupError> {
        let result = self
            .get_json::<IdentityProviderResponse>(&self.identity_provider_url)
            .await
            .map(|body| IdentityProviderStats {
                confirmed_email_count: body.users.confirmed,
                unconfirmed_email_count: body.users.unconfirmed,
                privacy_policy_agreed: body.users.privacy_policy_agreed,
                total_user_count: body.users.total,
            });
        metrics::record_remote_lookup("identity_provider", result.is_ok());
        result
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteLookupError> {
        info!(url, "Connecting to remote lookup");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| RemoteLookupError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteLookupError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RemoteLookupError::Network {
                url: url.to_string(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|e| RemoteLookupError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
