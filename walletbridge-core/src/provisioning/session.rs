//! The provisioning handshake state machine.
//!
//! A single slot holds the active session. Caller commands and platform
//! delegate callbacks arrive on different threads, so every transition happens
//! under the slot mutex; the mutex is never held across an `await`, a platform
//! call or a listener notification.
//!
//! Handing the encrypted payload to the platform does not end a session. It
//! stays in the slot until the platform reports the outcome through
//! [`Provisioner::platform_did_finish`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::card_data::CardDataService;
use super::platform::{PlatformOutcome, ProvisioningListener, ProvisioningPlatform};
use super::types::{
    EncryptedPassData, ProvisioningCertificateChallenge, ProvisioningRequest, ProvisioningState,
    SessionSnapshot,
};
use crate::error::{BridgeError, ErrorKind};
use crate::runtime::blocking;

enum Phase {
    AwaitingChallenge,
    FetchingEncryptedData,
    ReadyToComplete { data: EncryptedPassData },
    /// The payload is with the platform; waiting for its acknowledgment.
    Completing {
        ack: Option<oneshot::Sender<SessionSnapshot>>,
    },
}

impl Phase {
    const fn state(&self) -> ProvisioningState {
        match self {
            Self::AwaitingChallenge => ProvisioningState::AwaitingChallenge,
            Self::FetchingEncryptedData => ProvisioningState::FetchingEncryptedData,
            Self::ReadyToComplete { .. } | Self::Completing { .. } => {
                ProvisioningState::ReadyToComplete
            }
        }
    }
}

struct ActiveSession {
    id: String,
    request: ProvisioningRequest,
    phase: Phase,
    fetch: Option<AbortHandle>,
}

impl ActiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            state: self.phase.state(),
            error_kind: None,
            message: None,
        }
    }

    /// Stops any fetch and wakes a caller waiting on the platform.
    fn settle(mut self, outcome: &SessionSnapshot) {
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
        if let Phase::Completing { ack: Some(ack) } = self.phase {
            let _ = ack.send(outcome.clone());
        }
    }
}

struct Slot {
    active: Option<ActiveSession>,
    /// Outcome of the most recent terminal session.
    last: SessionSnapshot,
}

/// Owns the single provisioning slot of a gateway.
pub struct Provisioner {
    platform: Arc<dyn ProvisioningPlatform>,
    card_data: Arc<dyn CardDataService>,
    listener: Option<Arc<dyn ProvisioningListener>>,
    runtime: Handle,
    challenge_timeout: Duration,
    auto_complete: bool,
    slot: Mutex<Slot>,
}

impl Provisioner {
    pub(crate) fn new(
        platform: Arc<dyn ProvisioningPlatform>,
        card_data: Arc<dyn CardDataService>,
        listener: Option<Arc<dyn ProvisioningListener>>,
        runtime: Handle,
        challenge_timeout: Duration,
        auto_complete: bool,
    ) -> Self {
        Self {
            platform,
            card_data,
            listener,
            runtime,
            challenge_timeout,
            auto_complete,
            slot: Mutex::new(Slot {
                active: None,
                last: SessionSnapshot::idle(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, snapshot: &SessionSnapshot) {
        if let Some(listener) = &self.listener {
            listener.on_provisioning_event(snapshot.clone());
        }
    }

    /// Current session state, or the outcome of the last session.
    pub fn status(&self) -> SessionSnapshot {
        let slot = self.lock();
        slot.active
            .as_ref()
            .map_or_else(|| slot.last.clone(), ActiveSession::snapshot)
    }

    /// Reserves the slot and presents the platform flow.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed request, `AlreadyInProgress` while
    /// another session holds the slot, or the translated platform error when
    /// the flow cannot be presented (the slot is released again).
    pub fn start(&self, request: ProvisioningRequest) -> Result<SessionSnapshot, BridgeError> {
        request.validate()?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let snapshot = {
            let mut slot = self.lock();
            if let Some(active) = &slot.active {
                return Err(BridgeError::AlreadyInProgress {
                    session_id: active.id.clone(),
                });
            }
            let active = ActiveSession {
                id: session_id.clone(),
                request: request.clone(),
                phase: Phase::AwaitingChallenge,
                fetch: None,
            };
            let snapshot = active.snapshot();
            slot.active = Some(active);
            snapshot
        };
        log::info!("provisioning session {session_id} started");
        self.emit(&snapshot);

        if let Err(e) = self
            .platform
            .present_add_payment_pass(session_id.clone(), request)
        {
            let err = BridgeError::from(e);
            self.finish_failed(&session_id, &err);
            return Err(err);
        }
        Ok(snapshot)
    }

    /// Handles the platform's certificate challenge for `session_id`.
    ///
    /// The card-data call runs in the background, bounded by the challenge
    /// timeout. Whenever the session cannot proceed the platform is answered
    /// with "no data" so its UI never waits on a dead session.
    ///
    /// # Errors
    ///
    /// `InvalidState` when no matching session awaits a challenge, or the
    /// validation error that failed the session.
    pub fn deliver_challenge(
        self: &Arc<Self>,
        session_id: &str,
        challenge: ProvisioningCertificateChallenge,
    ) -> Result<(), BridgeError> {
        // The fetch waits on `go` so the FetchingEncryptedData event is
        // always emitted before anything the fetch reports.
        let (go, ready) = oneshot::channel::<()>();
        let checked = {
            let mut slot = self.lock();
            match slot.active.as_mut() {
                Some(active) if active.id == session_id => {
                    if !matches!(active.phase, Phase::AwaitingChallenge) {
                        return Err(BridgeError::InvalidState(format!(
                            "session {session_id} is not awaiting a challenge"
                        )));
                    }
                    let checked = check_challenge(&active.request, &challenge);
                    if checked.is_ok() {
                        let this = Arc::clone(self);
                        let id = session_id.to_string();
                        let request = active.request.clone();
                        let challenge = challenge.clone();
                        let task = self.runtime.spawn(async move {
                            if ready.await.is_ok() {
                                this.run_fetch(id, request, challenge).await;
                            }
                        });
                        active.phase = Phase::FetchingEncryptedData;
                        active.fetch = Some(task.abort_handle());
                    }
                    checked
                }
                _ => {
                    drop(slot);
                    log::warn!("challenge for unknown session {session_id}; answering with no data");
                    self.answer_platform(session_id, None);
                    return Err(BridgeError::InvalidState(format!(
                        "no active session {session_id}"
                    )));
                }
            }
        };
        if let Err(err) = checked {
            if self.finish_failed(session_id, &err).is_some() {
                self.answer_platform(session_id, None);
            }
            return Err(err);
        }

        self.emit(&SessionSnapshot {
            session_id: session_id.to_string(),
            state: ProvisioningState::FetchingEncryptedData,
            error_kind: None,
            message: None,
        });
        log::debug!(
            "forwarding challenge for {session_id} (nonce {}…) to card-data service",
            hex::encode(&challenge.nonce[..challenge.nonce.len().min(4)])
        );
        let _ = go.send(());
        Ok(())
    }

    async fn run_fetch(
        self: Arc<Self>,
        session_id: String,
        request: ProvisioningRequest,
        challenge: ProvisioningCertificateChallenge,
    ) {
        let account = request.account_reference();
        let fetched = tokio::time::timeout(
            self.challenge_timeout,
            self.card_data.fetch_encrypted_pass_data(&challenge, &account),
        )
        .await;

        let result = match fetched {
            Ok(Ok(data)) => data.validate().map(|()| data).map_err(|e| {
                BridgeError::ExternalServiceFailure(format!("unusable pass data: {e}"))
            }),
            Ok(Err(e)) => Err(BridgeError::from(e)),
            Err(_) => Err(BridgeError::ExternalServiceFailure(format!(
                "card-data service did not answer within {:?}",
                self.challenge_timeout
            ))),
        };

        match result {
            Ok(data) => self.on_pass_data(&session_id, data),
            Err(err) => {
                log::warn!("encrypted data for {session_id} unavailable: {err}");
                if self.finish_failed(&session_id, &err).is_some() {
                    self.answer_platform(&session_id, None);
                }
            }
        }
    }

    fn on_pass_data(&self, session_id: &str, data: EncryptedPassData) {
        let snapshot = {
            let mut slot = self.lock();
            match slot.active.as_mut() {
                Some(active)
                    if active.id == session_id
                        && matches!(active.phase, Phase::FetchingEncryptedData) =>
                {
                    active.fetch = None;
                    active.phase = if self.auto_complete {
                        Phase::Completing { ack: None }
                    } else {
                        Phase::ReadyToComplete { data: data.clone() }
                    };
                    active.snapshot()
                }
                _ => {
                    log::debug!("session {session_id} ended while fetching; dropping pass data");
                    return;
                }
            }
        };
        self.emit(&snapshot);

        if self.auto_complete {
            if let Err(e) = self.hand_over(session_id, data) {
                log::warn!("automatic completion of {session_id} failed: {e}");
            }
        }
    }

    /// Hands the encrypted payload to the platform and waits for its verdict.
    ///
    /// `data` overrides the payload fetched from the card-data service. The
    /// session is `Completed` only once the platform reports the pass as added;
    /// a platform that stays silent past the challenge timeout fails it.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the session is `ReadyToComplete` (the state is
    /// left untouched), `InvalidArgument` for an unusable payload, or the
    /// error that failed the session.
    pub async fn complete(
        self: &Arc<Self>,
        data: Option<EncryptedPassData>,
    ) -> Result<SessionSnapshot, BridgeError> {
        let (ack, outcome) = oneshot::channel();
        let (session_id, data) = {
            let mut slot = self.lock();
            let Some(active) = slot.active.as_mut() else {
                return Err(BridgeError::InvalidState(
                    "no provisioning session is active".to_string(),
                ));
            };
            let data = match &active.phase {
                Phase::ReadyToComplete { data: fetched } => {
                    data.unwrap_or_else(|| fetched.clone())
                }
                Phase::Completing { .. } => {
                    return Err(BridgeError::InvalidState(format!(
                        "session {} is already completing",
                        active.id
                    )));
                }
                Phase::AwaitingChallenge | Phase::FetchingEncryptedData => {
                    return Err(BridgeError::InvalidState(format!(
                        "session {} is {:?}, not ready to complete",
                        active.id,
                        active.phase.state()
                    )));
                }
            };
            data.validate()?;
            active.phase = Phase::Completing { ack: Some(ack) };
            (active.id.clone(), data)
        };

        let this = Arc::clone(self);
        let id = session_id.clone();
        let handed = blocking("platform hand-over", move || this.hand_over(&id, data))
            .await
            .and_then(|handed| handed);
        if let Err(err) = handed {
            self.finish_failed(&session_id, &err);
            return Err(err);
        }

        match tokio::time::timeout(self.challenge_timeout, outcome).await {
            Ok(Ok(snapshot)) => settled(snapshot),
            Ok(Err(_)) => Err(BridgeError::InvalidState(format!(
                "session {session_id} ended before the platform reported an outcome"
            ))),
            Err(_) => {
                let err = BridgeError::PlatformRejected(format!(
                    "platform did not acknowledge the pass within {:?}",
                    self.challenge_timeout
                ));
                if self.finish_failed(&session_id, &err).is_some() {
                    self.platform.dismiss_add_payment_pass(session_id);
                    return Err(err);
                }
                // the report raced the timeout
                self.outcome_of(&session_id).map_or(Err(err), settled)
            }
        }
    }

    /// Gives `data` to the platform. A refusal fails the session.
    fn hand_over(&self, session_id: &str, data: EncryptedPassData) -> Result<(), BridgeError> {
        self.platform
            .finish_add_payment_pass_request(session_id.to_string(), Some(data))
            .map_err(|e| {
                let err = BridgeError::from(e);
                self.finish_failed(session_id, &err);
                err
            })
    }

    /// Applies the platform's final report for `session_id`.
    ///
    /// Reports for sessions that already ended are ignored.
    pub fn platform_did_finish(&self, session_id: &str, outcome: PlatformOutcome) {
        match outcome {
            PlatformOutcome::Added => {
                if self.finish_completed(session_id).is_none() {
                    log::debug!("ignoring late success report for {session_id}");
                }
            }
            PlatformOutcome::Cancelled => {
                if self
                    .finish_failed(session_id, &BridgeError::UserCancelled)
                    .is_none()
                {
                    log::debug!("ignoring late cancellation for {session_id}");
                }
            }
            PlatformOutcome::Failed { message } => {
                if self
                    .finish_failed(session_id, &BridgeError::PlatformRejected(message))
                    .is_none()
                {
                    log::debug!("ignoring late failure report for {session_id}");
                }
            }
        }
    }

    /// Aborts the active session from the caller side.
    ///
    /// When `session_id` is given it must name the active session.
    ///
    /// # Errors
    ///
    /// `InvalidState` when there is nothing (matching) to cancel.
    pub fn cancel(&self, session_id: Option<&str>) -> Result<SessionSnapshot, BridgeError> {
        let snapshot = {
            let mut slot = self.lock();
            let matches = slot
                .active
                .as_ref()
                .is_some_and(|a| session_id.is_none_or(|id| id == a.id));
            let Some(active) = slot.active.take_if(|_| matches) else {
                return Err(BridgeError::InvalidState(
                    "no matching provisioning session to cancel".to_string(),
                ));
            };
            slot.last = failed_snapshot(&active.id, &BridgeError::UserCancelled);
            active.settle(&slot.last);
            slot.last.clone()
        };
        log::info!("provisioning session {} cancelled by caller", snapshot.session_id);
        self.platform
            .dismiss_add_payment_pass(snapshot.session_id.clone());
        self.emit(&snapshot);
        Ok(snapshot)
    }

    fn finish_completed(&self, session_id: &str) -> Option<SessionSnapshot> {
        let snapshot = {
            let mut slot = self.lock();
            let active = take_if_active(&mut slot, session_id)?;
            slot.last = SessionSnapshot {
                session_id: active.id.clone(),
                state: ProvisioningState::Completed,
                error_kind: None,
                message: None,
            };
            active.settle(&slot.last);
            slot.last.clone()
        };
        log::info!("provisioning session {session_id} completed");
        self.emit(&snapshot);
        Some(snapshot)
    }

    fn finish_failed(&self, session_id: &str, err: &BridgeError) -> Option<SessionSnapshot> {
        let snapshot = {
            let mut slot = self.lock();
            let active = take_if_active(&mut slot, session_id)?;
            slot.last = failed_snapshot(&active.id, err);
            active.settle(&slot.last);
            slot.last.clone()
        };
        log::error!("provisioning session {session_id} failed: {err}");
        self.emit(&snapshot);
        Some(snapshot)
    }

    fn outcome_of(&self, session_id: &str) -> Option<SessionSnapshot> {
        let slot = self.lock();
        (slot.last.session_id == session_id).then(|| slot.last.clone())
    }

    fn answer_platform(&self, session_id: &str, data: Option<EncryptedPassData>) {
        if let Err(e) = self
            .platform
            .finish_add_payment_pass_request(session_id.to_string(), data)
        {
            log::warn!("platform refused challenge answer for {session_id}: {e}");
        }
    }
}

fn check_challenge(
    request: &ProvisioningRequest,
    challenge: &ProvisioningCertificateChallenge,
) -> Result<(), BridgeError> {
    challenge.validate()?;
    if challenge.encryption_scheme == request.encryption_scheme {
        Ok(())
    } else {
        Err(BridgeError::PlatformRejected(format!(
            "encryption scheme mismatch: requested {:?}, platform used {:?}",
            request.encryption_scheme, challenge.encryption_scheme
        )))
    }
}

/// Maps a terminal snapshot onto the caller's result.
fn settled(snapshot: SessionSnapshot) -> Result<SessionSnapshot, BridgeError> {
    match snapshot.state {
        ProvisioningState::Completed => Ok(snapshot),
        _ => Err(BridgeError::from_kind(
            snapshot.error_kind.unwrap_or(ErrorKind::Internal),
            snapshot.message.unwrap_or_default(),
        )),
    }
}

fn take_if_active(slot: &mut Slot, session_id: &str) -> Option<ActiveSession> {
    slot.active.take_if(|a| a.id == session_id)
}

fn failed_snapshot(session_id: &str, err: &BridgeError) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session_id.to_string(),
        state: ProvisioningState::Failed,
        error_kind: Some(err.kind()),
        message: Some(err.to_string()),
    }
}
