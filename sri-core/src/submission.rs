//! Two-phase submission: reception, then authorization.
//!
//! One [`SubmissionStateMachine`] drives one signed document. Every remote call is
//! bounded by the configured request timeout and aborted on cancellation. Neither
//! phase retries by itself; callers re-invoke a phase after a transport failure.
use crate::access_key::AccessKey;
use crate::api::{
    AuthorityMessage, AuthorizationStatus, GatewayError, ReceptionStatus, SriGateway,
};
use crate::config::Config;
use crate::sign::SignedXml;

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of one issuance attempt.
///
/// `Built` precedes signing and is never held by a state machine, which starts in
/// `Signed`. `Submitted` and `PollingAuth` are held while a remote call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubmissionState {
    Built,
    Signed,
    Submitted,
    Received,
    Returned,
    SubmitError,
    PollingAuth,
    Authorized,
    NotAuthorized,
    AuthError,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Built => "BUILT",
            SubmissionState::Signed => "SIGNED",
            SubmissionState::Submitted => "SUBMITTED",
            SubmissionState::Received => "RECEIVED",
            SubmissionState::Returned => "RETURNED",
            SubmissionState::SubmitError => "SUBMIT_ERROR",
            SubmissionState::PollingAuth => "POLLING_AUTH",
            SubmissionState::Authorized => "AUTHORIZED",
            SubmissionState::NotAuthorized => "NOT_AUTHORIZED",
            SubmissionState::AuthError => "AUTH_ERROR",
        }
    }

    /// No further remote call is allowed.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SubmissionState::Returned | SubmissionState::Authorized | SubmissionState::NotAuthorized
        )
    }

    fn can_submit(&self) -> bool {
        matches!(self, SubmissionState::Signed | SubmissionState::SubmitError)
    }

    fn can_authorize(&self) -> bool {
        matches!(
            self,
            SubmissionState::Received | SubmissionState::PollingAuth | SubmissionState::AuthError
        )
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SubmissionState,
    },
}

/// Result of one reception round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SubmissionOutcome {
    /// `RECIBIDA`; authorization may proceed.
    Received { messages: Vec<AuthorityMessage> },
    /// `DEVUELTA`; the document must be fixed and reissued.
    Returned { messages: Vec<AuthorityMessage> },
    /// Transport failure or an unexpected status. Reception may be retried.
    SubmitError { messages: Vec<AuthorityMessage> },
}

impl SubmissionOutcome {
    pub fn messages(&self) -> &[AuthorityMessage] {
        match self {
            SubmissionOutcome::Received { messages }
            | SubmissionOutcome::Returned { messages }
            | SubmissionOutcome::SubmitError { messages } => messages,
        }
    }

    pub fn state(&self) -> SubmissionState {
        match self {
            SubmissionOutcome::Received { .. } => SubmissionState::Received,
            SubmissionOutcome::Returned { .. } => SubmissionState::Returned,
            SubmissionOutcome::SubmitError { .. } => SubmissionState::SubmitError,
        }
    }
}

/// Result of one authorization query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AuthorizationOutcome {
    Authorized {
        authorization_number: String,
        authorized_at: Option<String>,
        authorized_xml: String,
        messages: Vec<AuthorityMessage>,
    },
    NotAuthorized {
        messages: Vec<AuthorityMessage>,
    },
    /// `EN PROCESAMIENTO`; query again later.
    Processing {
        messages: Vec<AuthorityMessage>,
    },
    /// Transport failure, malformed answer or unknown status. The query may be retried.
    AuthError {
        messages: Vec<AuthorityMessage>,
    },
}

impl AuthorizationOutcome {
    pub fn messages(&self) -> &[AuthorityMessage] {
        match self {
            AuthorizationOutcome::Authorized { messages, .. }
            | AuthorizationOutcome::NotAuthorized { messages }
            | AuthorizationOutcome::Processing { messages }
            | AuthorizationOutcome::AuthError { messages } => messages,
        }
    }

    pub fn state(&self) -> SubmissionState {
        match self {
            AuthorizationOutcome::Authorized { .. } => SubmissionState::Authorized,
            AuthorizationOutcome::NotAuthorized { .. } => SubmissionState::NotAuthorized,
            AuthorizationOutcome::Processing { .. } => SubmissionState::PollingAuth,
            AuthorizationOutcome::AuthError { .. } => SubmissionState::AuthError,
        }
    }
}

/// Bounded re-polling while the authority answers `EN PROCESAMIENTO`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Delay multiplier; values below 1 count as 1. Grown delays stop at
    /// [`MAX_POLL_DELAY`].
    pub backoff: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(3),
            backoff: 2.0,
        }
    }
}

/// Why a guarded remote call produced no answer.
#[derive(Debug)]
enum CallFailure {
    Gateway(GatewayError),
    Timeout(Duration),
    Cancelled,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Gateway(err) => write!(f, "{err}"),
            CallFailure::Timeout(after) => write!(f, "no answer within {} ms", after.as_millis()),
            CallFailure::Cancelled => f.write_str("request cancelled"),
        }
    }
}

/// Resolves once the flag turns true. A dropped sender never cancels.
async fn cancelled(mut signal: watch::Receiver<bool>) {
    let closed = signal.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Longest sleep between two authorization queries.
pub const MAX_POLL_DELAY: Duration = Duration::from_secs(300);

/// Grow `delay` by `backoff` (never below 1), saturating at [`MAX_POLL_DELAY`].
fn next_delay(delay: Duration, backoff: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * backoff.max(1.0))
        .map_or(MAX_POLL_DELAY, |next| next.min(MAX_POLL_DELAY))
}

/// Run one remote call under the request timeout, aborting it on cancellation.
async fn guarded<T, F>(
    request_timeout: Duration,
    cancellation: Option<watch::Receiver<bool>>,
    call: F,
) -> Result<T, CallFailure>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let timed = async {
        match tokio::time::timeout(request_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(CallFailure::Gateway(err)),
            Err(_) => Err(CallFailure::Timeout(request_timeout)),
        }
    };
    match cancellation {
        Some(signal) => tokio::select! {
            result = timed => result,
            _ = cancelled(signal) => Err(CallFailure::Cancelled),
        },
        None => timed.await,
    }
}

/// Holds the in-flight state for the duration of a remote call. Dropped before
/// [`InFlight::land`] (the caller dropped the future), it leaves the error state
/// of the phase so the call can be re-invoked.
struct InFlight<'a> {
    state: &'a mut SubmissionState,
    abandoned: SubmissionState,
    landed: bool,
}

impl<'a> InFlight<'a> {
    fn take_off(
        state: &'a mut SubmissionState,
        in_flight: SubmissionState,
        abandoned: SubmissionState,
    ) -> Self {
        *state = in_flight;
        Self {
            state,
            abandoned,
            landed: false,
        }
    }

    fn land(mut self, next: SubmissionState) {
        *self.state = next;
        self.landed = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.landed {
            *self.state = self.abandoned;
        }
    }
}

/// Reception and authorization of one signed document.
///
/// # Examples
/// ```rust,no_run
/// use sri_core::api::SriGateway;
/// use sri_core::config::Config;
/// use sri_core::sign::SignedXml;
/// use sri_core::submission::{SubmissionOutcome, SubmissionStateMachine};
///
/// # async fn run<G: SriGateway>(gateway: G, signed: SignedXml) -> Result<(), sri_core::Error> {
/// let mut machine = SubmissionStateMachine::new(gateway, &Config::default(), signed);
/// if let SubmissionOutcome::Received { .. } = machine.submit().await? {
///     let outcome = machine.authorize().await?;
///     println!("{:?}", outcome.state());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubmissionStateMachine<G> {
    gateway: G,
    request_timeout: Duration,
    signed: SignedXml,
    state: SubmissionState,
    cancellation: Option<watch::Receiver<bool>>,
}

impl<G: SriGateway> SubmissionStateMachine<G> {
    pub fn new(gateway: G, config: &Config, signed: SignedXml) -> Self {
        Self {
            gateway,
            request_timeout: config.request_timeout(),
            signed,
            state: SubmissionState::Signed,
            cancellation: None,
        }
    }

    /// Abort in-flight calls once `signal` turns true.
    pub fn with_cancellation(mut self, signal: watch::Receiver<bool>) -> Self {
        self.cancellation = Some(signal);
        self
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn access_key(&self) -> &AccessKey {
        self.signed.access_key()
    }

    pub fn signed_xml(&self) -> &SignedXml {
        &self.signed
    }

    pub fn into_signed_xml(self) -> SignedXml {
        self.signed
    }

    /// Send the signed document to the reception service.
    ///
    /// Allowed from `Signed`, and again from `SubmitError`.
    pub async fn submit(&mut self) -> Result<SubmissionOutcome, SubmissionError> {
        if !self.state.can_submit() {
            return Err(SubmissionError::InvalidState {
                operation: "submit",
                state: self.state,
            });
        }
        let key = self.signed.access_key().clone();
        debug!(access_key = %key, "submitting document for reception");

        let payload = self.signed.to_base64();
        let flight = InFlight::take_off(
            &mut self.state,
            SubmissionState::Submitted,
            SubmissionState::SubmitError,
        );
        let result = guarded(
            self.request_timeout,
            self.cancellation.clone(),
            self.gateway.submit_receipt(&payload),
        )
        .await;
        let outcome = match result {
            Ok(response) => {
                let status = response.status().clone();
                let messages = response.into_messages();
                match status {
                    ReceptionStatus::Received => {
                        info!(access_key = %key, "document received");
                        SubmissionOutcome::Received { messages }
                    }
                    ReceptionStatus::Returned => {
                        warn!(access_key = %key, messages = messages.len(), "document returned");
                        SubmissionOutcome::Returned { messages }
                    }
                    ReceptionStatus::Other(status) => {
                        warn!(access_key = %key, %status, "unexpected reception status");
                        SubmissionOutcome::SubmitError { messages }
                    }
                }
            }
            Err(failure) => {
                warn!(access_key = %key, error = %failure, "reception call failed");
                SubmissionOutcome::SubmitError {
                    messages: vec![AuthorityMessage::connection_error(&failure)],
                }
            }
        };
        flight.land(outcome.state());
        Ok(outcome)
    }

    /// Query the authorization service once.
    ///
    /// Allowed from `Received`, `PollingAuth` and `AuthError`.
    pub async fn authorize(&mut self) -> Result<AuthorizationOutcome, SubmissionError> {
        if !self.state.can_authorize() {
            return Err(SubmissionError::InvalidState {
                operation: "authorize",
                state: self.state,
            });
        }
        let key = self.signed.access_key().clone();
        debug!(access_key = %key, "querying authorization");

        let flight = InFlight::take_off(
            &mut self.state,
            SubmissionState::PollingAuth,
            SubmissionState::AuthError,
        );
        let result = guarded(
            self.request_timeout,
            self.cancellation.clone(),
            self.gateway.query_authorization(&key),
        )
        .await;
        let outcome = match result {
            Ok(response) => match response.status().clone() {
                AuthorizationStatus::Authorized => match response.document() {
                    Some(xml) => {
                        let number = response
                            .authorization_number()
                            .unwrap_or(key.as_str())
                            .to_string();
                        info!(access_key = %key, authorization_number = %number, "document authorized");
                        AuthorizationOutcome::Authorized {
                            authorization_number: number,
                            authorized_at: response.authorization_date().map(str::to_string),
                            authorized_xml: xml.to_string(),
                            messages: response.messages().to_vec(),
                        }
                    }
                    None => {
                        warn!(access_key = %key, "authorized answer carries no document");
                        let mut messages = response.messages().to_vec();
                        messages.push(AuthorityMessage {
                            identifier: None,
                            message: "authorized response did not include the document"
                                .to_string(),
                            additional_info: None,
                            kind: Some("ERROR".to_string()),
                        });
                        AuthorizationOutcome::AuthError { messages }
                    }
                },
                AuthorizationStatus::NotAuthorized => {
                    warn!(access_key = %key, "document not authorized");
                    AuthorizationOutcome::NotAuthorized {
                        messages: response.messages().to_vec(),
                    }
                }
                AuthorizationStatus::Processing => {
                    info!(access_key = %key, "authorization still processing");
                    AuthorizationOutcome::Processing {
                        messages: response.messages().to_vec(),
                    }
                }
                AuthorizationStatus::Other(status) => {
                    warn!(access_key = %key, %status, "unexpected authorization status");
                    AuthorizationOutcome::AuthError {
                        messages: response.messages().to_vec(),
                    }
                }
            },
            Err(failure) => {
                warn!(access_key = %key, error = %failure, "authorization call failed");
                AuthorizationOutcome::AuthError {
                    messages: vec![AuthorityMessage::connection_error(&failure)],
                }
            }
        };
        flight.land(outcome.state());
        Ok(outcome)
    }

    /// Query authorization up to `policy.max_attempts` times, sleeping between
    /// attempts only while the answer is `EN PROCESAMIENTO`.
    pub async fn authorize_with_polling(
        &mut self,
        policy: PollPolicy,
    ) -> Result<AuthorizationOutcome, SubmissionError> {
        let attempts = policy.max_attempts.max(1);
        let mut delay = policy.initial_delay;
        let mut attempt = 1;
        loop {
            let outcome = self.authorize().await?;
            if !matches!(outcome, AuthorizationOutcome::Processing { .. }) || attempt >= attempts {
                return Ok(outcome);
            }
            debug!(
                access_key = %self.signed.access_key(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "waiting before next authorization query"
            );
            if !self.pause(delay).await {
                self.state = SubmissionState::AuthError;
                return Ok(AuthorizationOutcome::AuthError {
                    messages: vec![AuthorityMessage::connection_error(&CallFailure::Cancelled)],
                });
            }
            delay = next_delay(delay, policy.backoff);
            attempt += 1;
        }
    }

    /// Sleep for `delay`; false when cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        match self.cancellation.clone() {
            Some(signal) => tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = cancelled(signal) => false,
            },
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}
