pub mod models;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures_util::{future::BoxFuture, FutureExt};
use reqwest::{header, Client, Response};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthError, IdentityProvider},
    config::Config,
    sensors::models::SensorRecord,
    session::Identity,
    source::simulated::ReadingSink,
};

use self::models::{ErrorResponse, OobCodeRequest, PasswordRequest, PasswordResponse};

/// Client for the hosted backend: the identity toolkit REST API for
/// email/password auth and the realtime database REST API for sensor data.
#[derive(Debug, Clone)]
pub struct FirebaseClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    api_key: String,
    auth_url: String,
    db_url: String,
    timeout: Duration,
}

impl FirebaseClient {
    pub fn new(config: &Config, http: Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                api_key: config.firebase_api_key.clone(),
                auth_url: config.firebase_auth_url.trim_end_matches('/').to_owned(),
                db_url: config.firebase_db_url.trim_end_matches('/').to_owned(),
                timeout: config.request_timeout,
            }),
        }
    }

    /// Location of the per-user latest reading in the realtime database.
    pub fn latest_url(&self, uid: &str) -> String {
        format!("{}/users/{}/sensorData/latest.json", self.inner.db_url, uid)
    }

    // -----------------------------------------------------------------------
    // Identity toolkit
    // -----------------------------------------------------------------------

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let url = format!("{}/accounts:{endpoint}", self.inner.auth_url);
        debug!(endpoint = %endpoint, "Calling identity toolkit");

        let resp = self
            .inner
            .http
            .post(&url)
            .query(&[("key", &self.inner.api_key)])
            .timeout(self.inner.timeout)
            .json(&PasswordRequest { email, password, return_secure_token: true })
            .send()
            .await?;

        let body: PasswordResponse = check_auth_response(resp).await?.json().await?;

        info!(uid = %body.local_id, endpoint = %endpoint, "Identity toolkit call succeeded");
        Ok(Identity {
            uid: body.local_id,
            email: body.email.or_else(|| Some(email.to_owned())),
            id_token: Some(body.id_token),
        })
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.password_call("signInWithPassword", email, password).await
    }

    pub async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.password_call("signUp", email, password).await
    }

    pub async fn send_password_reset_email(&self, email: &str) -> Result<(), AuthError> {
        let url = format!("{}/accounts:sendOobCode", self.inner.auth_url);
        let resp = self
            .inner
            .http
            .post(&url)
            .query(&[("key", &self.inner.api_key)])
            .timeout(self.inner.timeout)
            .json(&OobCodeRequest { request_type: "PASSWORD_RESET", email })
            .send()
            .await?;

        check_auth_response(resp).await?;
        info!("Password reset email requested");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Realtime database
    // -----------------------------------------------------------------------

    /// Overwrite `users/{uid}/sensorData/latest` with `record`.
    pub async fn put_latest(&self, identity: &Identity, record: &SensorRecord) -> Result<()> {
        let url = self.latest_url(&identity.uid);
        let mut req = self.inner.http.put(&url).timeout(self.inner.timeout).json(record);
        if let Some(token) = &identity.id_token {
            req = req.query(&[("auth", token)]);
        }

        req.send()
            .await
            .context("Realtime database write failed")?
            .error_for_status()
            .context("Realtime database write returned error status")?;

        debug!(uid = %identity.uid, "Sensor record written");
        Ok(())
    }

    /// Open the server-sent event stream for `users/{uid}/sensorData/latest`.
    ///
    /// No overall timeout is applied; the stream is expected to stay open.
    pub async fn open_latest_stream(&self, identity: &Identity) -> Result<Response> {
        let url = self.latest_url(&identity.uid);
        let mut req = self
            .inner
            .http
            .get(&url)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = &identity.id_token {
            req = req.query(&[("auth", token)]);
        }

        let resp = req
            .send()
            .await
            .context("Realtime database stream request failed")?
            .error_for_status()
            .context("Realtime database stream returned error status")?;

        info!(uid = %identity.uid, "Realtime database stream opened");
        Ok(resp)
    }
}

/// Pass successful responses through; map provider error bodies onto
/// [`AuthError`].
async fn check_auth_response(resp: Response) -> Result<Response, AuthError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => {
            warn!(status = %status, code = %body.error.code_str(), "Identity toolkit rejected request");
            Err(AuthError::from_provider_code(body.error.code_str()))
        }
        Err(_) => Err(AuthError::Rejected(format!("status {status}"))),
    }
}

impl IdentityProvider for FirebaseClient {
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>> {
        self.sign_in_with_password(email, password).boxed()
    }

    fn sign_up<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>> {
        self.sign_up_with_password(email, password).boxed()
    }

    fn send_password_reset<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        self.send_password_reset_email(email).boxed()
    }
}

impl ReadingSink for FirebaseClient {
    fn name(&self) -> &'static str {
        "realtime_database"
    }

    fn write(&self, identity: &Identity, record: SensorRecord) -> BoxFuture<'static, Result<()>> {
        let client = self.clone();
        let identity = identity.clone();
        async move { client.put_latest(&identity, &record).await }.boxed()
    }
}
