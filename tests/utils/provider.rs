//! In-memory provider implementation backed by shared maps, with a canned
//! gateway whose responses each test configures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use trainee_credentials::broker::provider::{
    Clock, CredentialStore, Gateway, Metadata, ModificationLog, StateStore,
};
use trainee_credentials::broker::types::{
    Broker, CredentialMetadata, CredentialType, ModificationRecord, Signing,
};
use trainee_credentials::gateway::{
    ParRequest, ParResponse, RevokeRequest, TokenRequest, TokenResponse,
};

use crate::utils::token;
use crate::utils::{ENVELOPE_SECRET, GATEWAY_HOST};

#[derive(Clone, Debug)]
pub struct ProviderImpl {
    state: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    credentials: Arc<Mutex<Vec<CredentialMetadata>>>,
    modifications: Arc<Mutex<HashMap<(String, CredentialType), ModificationRecord>>>,
    now: Arc<Mutex<Option<DateTime<Utc>>>>,
    pub gateway: StubGateway,
}

impl ProviderImpl {
    #[must_use]
    pub fn new() -> Self {
        let gateway = StubGateway::default();
        gateway.set_jwks(token::jwk_set());

        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            credentials: Arc::new(Mutex::new(Vec::new())),
            modifications: Arc::new(Mutex::new(HashMap::new())),
            now: Arc::new(Mutex::new(None)),
            gateway,
        }
    }

    /// Freeze the provider's clock.
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("should lock") = Some(now);
    }

    /// All persisted credential metadata.
    pub fn credentials(&self) -> Vec<CredentialMetadata> {
        self.credentials.lock().expect("should lock").clone()
    }

    /// Seed persisted credential metadata.
    pub fn seed_credential(&self, credential: CredentialMetadata) {
        self.credentials.lock().expect("should lock").push(credential);
    }

    /// The modification record for a pair, if any.
    pub fn modification(
        &self, entity_id: &str, credential_type: CredentialType,
    ) -> Option<ModificationRecord> {
        self.modifications
            .lock()
            .expect("should lock")
            .get(&(entity_id.to_string(), credential_type))
            .cloned()
    }
}

impl Default for ProviderImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl Metadata for ProviderImpl {
    async fn broker(&self) -> Result<Broker> {
        Ok(Broker {
            host: GATEWAY_HOST.to_string(),
            client_id: "broker-client".to_string(),
            client_secret: "broker-secret".to_string(),
            organisation_id: "ORG-1".to_string(),
            par_endpoint: format!("{GATEWAY_HOST}/oauth2/par"),
            authorize_endpoint: format!("{GATEWAY_HOST}/oauth2/authorize"),
            token_endpoint: format!("{GATEWAY_HOST}/oauth2/token"),
            jwks_endpoint: format!("{GATEWAY_HOST}/oauth2/jwks"),
            revoke_endpoint: format!("{GATEWAY_HOST}/api/revoke"),
            verify_redirect_uri: "https://broker.example.com/api/verify/callback".to_string(),
            issue_redirect_uri: "https://broker.example.com/api/issue/callback".to_string(),
            token_issuers: vec![GATEWAY_HOST.to_string()],
            signing: Signing {
                secret: Base64::encode_string(b"a shared signing secret"),
                issuer: "https://broker.example.com".to_string(),
                audience: GATEWAY_HOST.to_string(),
                programme_lifetime_days: None,
                placement_lifetime_days: None,
            },
            envelope_secret: ENVELOPE_SECRET.to_string(),
        })
    }
}

impl Clock for ProviderImpl {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().expect("should lock").unwrap_or_else(Utc::now)
    }
}

impl StateStore for ProviderImpl {
    async fn put(
        &self, key: &str, state: impl Serialize + Send, _expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let state = serde_json::to_vec(&state)?;
        self.state.lock().expect("should lock").insert(key.to_string(), state);
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(state) = self.state.lock().expect("should lock").get(key).cloned() else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&state)?))
    }

    async fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(state) = self.state.lock().expect("should lock").remove(key) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&state)?))
    }
}

impl CredentialStore for ProviderImpl {
    async fn save(&self, credential: &CredentialMetadata) -> Result<()> {
        self.credentials.lock().expect("should lock").push(credential.clone());
        Ok(())
    }

    async fn find_by_entity(
        &self, credential_type: CredentialType, entity_id: &str,
    ) -> Result<Vec<CredentialMetadata>> {
        let credentials = self.credentials.lock().expect("should lock");
        Ok(credentials
            .iter()
            .filter(|c| c.credential_type == credential_type && c.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn find_by_subject(
        &self, credential_type: CredentialType, subject_id: &str,
    ) -> Result<Vec<CredentialMetadata>> {
        let credentials = self.credentials.lock().expect("should lock");
        Ok(credentials
            .iter()
            .filter(|c| c.credential_type == credential_type && c.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn mark_revoked(&self, credential_id: &str, revoked_at: DateTime<Utc>) -> Result<()> {
        let mut credentials = self.credentials.lock().expect("should lock");
        for credential in credentials.iter_mut() {
            if credential.credential_id == credential_id && credential.revoked_at.is_none() {
                credential.revoked_at = Some(revoked_at);
            }
        }
        Ok(())
    }
}

impl ModificationLog for ProviderImpl {
    async fn upsert(&self, record: &ModificationRecord) -> Result<()> {
        self.modifications
            .lock()
            .expect("should lock")
            .insert((record.entity_id.clone(), record.credential_type), record.clone());
        Ok(())
    }

    async fn get(
        &self, entity_id: &str, credential_type: CredentialType,
    ) -> Result<Option<ModificationRecord>> {
        Ok(self
            .modifications
            .lock()
            .expect("should lock")
            .get(&(entity_id.to_string(), credential_type))
            .cloned())
    }
}

impl Gateway for ProviderImpl {
    async fn par(&self, broker: &Broker, request: &ParRequest) -> Result<ParResponse> {
        self.gateway.par(broker, request).await
    }

    async fn exchange(&self, broker: &Broker, request: &TokenRequest) -> Result<TokenResponse> {
        self.gateway.exchange(broker, request).await
    }

    async fn revoke(&self, broker: &Broker, request: &RevokeRequest) -> Result<()> {
        self.gateway.revoke(broker, request).await
    }

    async fn jwks(&self, broker: &Broker) -> Result<JwkSet> {
        self.gateway.jwks(broker).await
    }
}

/// A gateway whose responses are canned per-test and whose requests are
/// recorded for assertion.
#[derive(Clone, Debug, Default)]
pub struct StubGateway {
    inner: Arc<Mutex<StubState>>,
}

#[derive(Debug, Default)]
struct StubState {
    request_uri: Option<String>,
    id_token: Option<String>,
    fail_revocation: bool,
    jwks: Option<JwkSet>,
    par_requests: Vec<ParRequest>,
    token_requests: Vec<TokenRequest>,
    revocations: Vec<RevokeRequest>,
    jwks_fetches: usize,
}

impl StubGateway {
    /// Configure the `request_uri` returned by the PAR endpoint.
    pub fn set_request_uri(&self, request_uri: &str) {
        self.inner.lock().expect("should lock").request_uri = Some(request_uri.to_string());
    }

    /// Configure the ID token returned by the token endpoint.
    pub fn set_id_token(&self, id_token: &str) {
        self.inner.lock().expect("should lock").id_token = Some(id_token.to_string());
    }

    /// Make revocation requests fail.
    pub fn fail_revocations(&self) {
        self.inner.lock().expect("should lock").fail_revocation = true;
    }

    /// Configure the JWKS document.
    pub fn set_jwks(&self, jwks: JwkSet) {
        self.inner.lock().expect("should lock").jwks = Some(jwks);
    }

    /// Recorded PAR requests.
    pub fn par_requests(&self) -> Vec<ParRequest> {
        self.inner.lock().expect("should lock").par_requests.clone()
    }

    /// Recorded token-exchange requests.
    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.inner.lock().expect("should lock").token_requests.clone()
    }

    /// Recorded revocation requests.
    pub fn revocations(&self) -> Vec<RevokeRequest> {
        self.inner.lock().expect("should lock").revocations.clone()
    }

    /// Number of JWKS fetches served.
    pub fn jwks_fetches(&self) -> usize {
        self.inner.lock().expect("should lock").jwks_fetches
    }
}

impl Gateway for StubGateway {
    async fn par(&self, _broker: &Broker, request: &ParRequest) -> Result<ParResponse> {
        let mut state = self.inner.lock().expect("should lock");
        state.par_requests.push(request.clone());
        let request_uri =
            state.request_uri.clone().ok_or_else(|| anyhow!("no PAR response configured"))?;
        Ok(ParResponse { request_uri })
    }

    async fn exchange(&self, _broker: &Broker, request: &TokenRequest) -> Result<TokenResponse> {
        let mut state = self.inner.lock().expect("should lock");
        state.token_requests.push(request.clone());
        let id_token =
            state.id_token.clone().ok_or_else(|| anyhow!("no token response configured"))?;
        Ok(TokenResponse { id_token })
    }

    async fn revoke(&self, _broker: &Broker, request: &RevokeRequest) -> Result<()> {
        let mut state = self.inner.lock().expect("should lock");
        if state.fail_revocation {
            bail!("revocation failed with status 502 Bad Gateway");
        }
        state.revocations.push(request.clone());
        Ok(())
    }

    async fn jwks(&self, _broker: &Broker) -> Result<JwkSet> {
        let mut state = self.inner.lock().expect("should lock");
        state.jwks_fetches += 1;
        state.jwks.clone().ok_or_else(|| anyhow!("no JWKS configured"))
    }
}
