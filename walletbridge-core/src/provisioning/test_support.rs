use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    CardAccountReference, CardDataError, CardDataService, EncryptedPassData, EncryptionScheme,
    PlatformError, ProvisioningCertificateChallenge, ProvisioningListener, ProvisioningPlatform,
    ProvisioningRequest, ProvisioningState, SessionSnapshot,
};

pub fn request() -> ProvisioningRequest {
    ProvisioningRequest {
        card_suffix: "1234".to_string(),
        cardholder_name: "A B".to_string(),
        primary_account_identifier: Some("acct-1".to_string()),
        localized_description: Some("Everyday Card".to_string()),
        payment_network: Some("Visa".to_string()),
        encryption_scheme: EncryptionScheme::EccV2,
    }
}

pub fn challenge(nonce: &[u8]) -> ProvisioningCertificateChallenge {
    ProvisioningCertificateChallenge {
        certificates: vec![vec![0x30, 0x82, 0x01], vec![0x30, 0x82, 0x02]],
        nonce: nonce.to_vec(),
        nonce_signature: vec![0x5A; 8],
        encryption_scheme: EncryptionScheme::EccV2,
    }
}

pub fn pass_data() -> EncryptedPassData {
    EncryptedPassData {
        activation_data: vec![1],
        encrypted_pass_data: vec![2, 2],
        ephemeral_public_key: vec![3, 3, 3],
    }
}

#[derive(Default)]
pub struct RecordingPlatform {
    refuse_presentation: bool,
    refuse_hand_over: bool,
    presented: Mutex<Vec<String>>,
    answers: Mutex<Vec<(String, bool)>>,
    dismissed: Mutex<Vec<String>>,
}

impl RecordingPlatform {
    pub fn refusing_presentation() -> Self {
        Self {
            refuse_presentation: true,
            ..Self::default()
        }
    }

    /// Accepts "no data" answers but refuses every payload.
    pub fn refusing_hand_over() -> Self {
        Self {
            refuse_hand_over: true,
            ..Self::default()
        }
    }

    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }

    /// `(session id, whether data was supplied)` for every challenge answer.
    pub fn answers(&self) -> Vec<(String, bool)> {
        self.answers.lock().unwrap().clone()
    }

    pub fn dismissed(&self) -> Vec<String> {
        self.dismissed.lock().unwrap().clone()
    }
}

impl ProvisioningPlatform for RecordingPlatform {
    fn present_add_payment_pass(
        &self,
        session_id: String,
        _request: ProvisioningRequest,
    ) -> Result<(), PlatformError> {
        if self.refuse_presentation {
            return Err(PlatformError::Rejected("cannot present".to_string()));
        }
        self.presented.lock().unwrap().push(session_id);
        Ok(())
    }

    fn finish_add_payment_pass_request(
        &self,
        session_id: String,
        data: Option<EncryptedPassData>,
    ) -> Result<(), PlatformError> {
        let supplied = data.is_some();
        self.answers.lock().unwrap().push((session_id, supplied));
        if supplied && self.refuse_hand_over {
            return Err(PlatformError::Rejected("secure element unavailable".to_string()));
        }
        Ok(())
    }

    fn dismiss_add_payment_pass(&self, session_id: String) {
        self.dismissed.lock().unwrap().push(session_id);
    }
}

pub struct StubCardData {
    answer: Option<EncryptedPassData>,
    calls: Mutex<Vec<(Vec<u8>, CardAccountReference)>>,
}

impl StubCardData {
    pub fn answering(data: EncryptedPassData) -> Self {
        Self {
            answer: Some(data),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Vec<u8>, CardAccountReference)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardDataService for StubCardData {
    async fn fetch_encrypted_pass_data(
        &self,
        challenge: &ProvisioningCertificateChallenge,
        account: &CardAccountReference,
    ) -> Result<EncryptedPassData, CardDataError> {
        self.calls
            .lock()
            .unwrap()
            .push((challenge.nonce.clone(), account.clone()));
        match &self.answer {
            Some(data) => Ok(data.clone()),
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CardDataError::InvalidResponse("unreachable".to_string()))
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<SessionSnapshot>>,
}

impl RecordingListener {
    pub fn states(&self) -> Vec<ProvisioningState> {
        self.events.lock().unwrap().iter().map(|e| e.state).collect()
    }
}

impl ProvisioningListener for RecordingListener {
    fn on_provisioning_event(&self, snapshot: SessionSnapshot) {
        self.events.lock().unwrap().push(snapshot);
    }
}
