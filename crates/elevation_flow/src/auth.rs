//! Authentication-service client for verification flows.
//!
//! The orchestrator only needs four calls: enrollment status, begin
//! enrollment, confirm enrollment, verify step-up. The wire format beyond
//! that contract is the service's business. The enrollment secret is held in
//! a [`SecretString`] and must never be logged.

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use console_client::{ClientError, ConsoleTransport, RequestDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EnrollmentStatus {
    pub enrolled: bool,
}

/// Secret and otpauth payload handed to the user during enrollment.
#[derive(Clone)]
pub struct EnrollmentChallenge {
    secret: SecretString,
    otpauth_url: String,
}

impl EnrollmentChallenge {
    #[must_use]
    pub fn new(secret: SecretString, otpauth_url: String) -> Self {
        Self {
            secret,
            otpauth_url,
        }
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Payload the view renders as a QR code for authenticator apps.
    #[must_use]
    pub fn otpauth_url(&self) -> &str {
        &self.otpauth_url
    }
}

impl std::fmt::Debug for EnrollmentChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentChallenge")
            .field("secret", &"***")
            .field("otpauth_url", &"***")
            .finish()
    }
}

/// Four-call contract the orchestrator drives.
#[allow(async_fn_in_trait)]
pub trait AuthService {
    /// # Errors
    /// Returns a `ClientError` when the service cannot be queried.
    async fn enrollment_status(&self) -> Result<EnrollmentStatus, ClientError>;

    /// Request an enrollment secret/challenge. Idempotent: re-requesting
    /// before a confirm invalidates nothing.
    ///
    /// # Errors
    /// Returns a `ClientError` when the service cannot be queried.
    async fn begin_enrollment(&self) -> Result<EnrollmentChallenge, ClientError>;

    /// # Errors
    /// Returns a `ClientError` when the service rejects the code.
    async fn confirm_enrollment(&self, code: &str) -> Result<(), ClientError>;

    /// # Errors
    /// Returns a `ClientError` when the service rejects the code.
    async fn verify_step_up(&self, code: &str) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct ChallengeWire {
    secret: String,
    otpauth_url: String,
}

/// HTTP implementation over the console transport.
#[derive(Debug, Clone)]
pub struct HttpAuthService {
    transport: ConsoleTransport,
}

impl HttpAuthService {
    #[must_use]
    pub fn new(transport: ConsoleTransport) -> Self {
        Self { transport }
    }

    async fn call(&self, descriptor: RequestDescriptor) -> Result<serde_json::Value, ClientError> {
        self.transport.send(&descriptor).await?.into_result()
    }
}

impl AuthService for HttpAuthService {
    async fn enrollment_status(&self) -> Result<EnrollmentStatus, ClientError> {
        let body = self
            .call(RequestDescriptor::get("/v1/auth/mfa/status"))
            .await?;
        serde_json::from_value(body).map_err(|err| {
            ClientError::Parse(format!("failed to decode enrollment status: {err}"))
        })
    }

    async fn begin_enrollment(&self) -> Result<EnrollmentChallenge, ClientError> {
        let body = self
            .call(RequestDescriptor::post(
                "/v1/auth/mfa/totp/enroll/start",
                json!({}),
            ))
            .await?;
        let wire: ChallengeWire = serde_json::from_value(body).map_err(|err| {
            ClientError::Parse(format!("failed to decode enrollment challenge: {err}"))
        })?;
        Ok(EnrollmentChallenge::new(
            SecretString::from(wire.secret),
            wire.otpauth_url,
        ))
    }

    async fn confirm_enrollment(&self, code: &str) -> Result<(), ClientError> {
        self.call(RequestDescriptor::post(
            "/v1/auth/mfa/totp/enroll/finish",
            json!({"code": code}),
        ))
        .await
        .map(|_| ())
    }

    async fn verify_step_up(&self, code: &str) -> Result<(), ClientError> {
        self.call(RequestDescriptor::post(
            "/v1/auth/mfa/totp/verify",
            json!({"code": code}),
        ))
        .await
        .map(|_| ())
    }
}
