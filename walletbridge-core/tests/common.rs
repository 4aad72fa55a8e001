//! Common test utilities shared across integration tests.
#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;
use walletbridge_core::{
    default_bridge_config, BridgeConfig, CardAccountReference, CardDataError, CardDataService,
    CommandCallback, CommandGateway, EncryptedPassData, EncryptionScheme, ErrorKind, Keychain,
    MemoryStatusStore, PassLibrary, PaymentPassInfo, PlatformError, PlatformProvider,
    ProvisioningCertificateChallenge, ProvisioningListener, ProvisioningPlatform,
    ProvisioningRequest, SessionSnapshot, StatusStore, StorageResult,
};

#[derive(Default)]
pub struct InMemoryPassLibrary {
    pub unavailable: bool,
    pub local: Mutex<Vec<PaymentPassInfo>>,
    pub remote: Mutex<Option<Vec<PaymentPassInfo>>>,
}

impl PassLibrary for InMemoryPassLibrary {
    fn is_pass_library_available(&self) -> bool {
        !self.unavailable
    }

    fn can_add_payment_pass(&self) -> bool {
        !self.unavailable
    }

    fn is_remote_pass_library_available(&self) -> bool {
        self.remote.lock().unwrap().is_some()
    }

    fn local_payment_passes(&self) -> Result<Vec<PaymentPassInfo>, PlatformError> {
        Ok(self.local.lock().unwrap().clone())
    }

    fn remote_payment_passes(&self) -> Result<Vec<PaymentPassInfo>, PlatformError> {
        self.remote
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlatformError::Unavailable("no paired device".to_string()))
    }
}

/// Records every call the provisioning flow makes into the host.
#[derive(Default)]
pub struct RecordingPlatform {
    pub presented: Mutex<Vec<(String, ProvisioningRequest)>>,
    pub answers: Mutex<Vec<(String, Option<EncryptedPassData>)>>,
    pub dismissed: Mutex<Vec<String>>,
}

impl ProvisioningPlatform for RecordingPlatform {
    fn present_add_payment_pass(
        &self,
        session_id: String,
        request: ProvisioningRequest,
    ) -> Result<(), PlatformError> {
        self.presented.lock().unwrap().push((session_id, request));
        Ok(())
    }

    fn finish_add_payment_pass_request(
        &self,
        session_id: String,
        data: Option<EncryptedPassData>,
    ) -> Result<(), PlatformError> {
        self.answers.lock().unwrap().push((session_id, data));
        Ok(())
    }

    fn dismiss_add_payment_pass(&self, session_id: String) {
        self.dismissed.lock().unwrap().push(session_id);
    }
}

#[derive(Default)]
pub struct InMemoryKeychain {
    pub items: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl Keychain for InMemoryKeychain {
    fn save_item(&self, service: String, account: String, data: Vec<u8>) -> StorageResult<()> {
        self.items.lock().unwrap().insert((service, account), data);
        Ok(())
    }
}

pub struct TestProvider {
    pub library: Arc<InMemoryPassLibrary>,
    pub platform: Arc<RecordingPlatform>,
    pub store: Arc<dyn StatusStore>,
    pub keychain: Arc<InMemoryKeychain>,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStatusStore::new()))
    }

    pub fn with_store(store: Arc<dyn StatusStore>) -> Self {
        Self {
            library: Arc::new(InMemoryPassLibrary::default()),
            platform: Arc::new(RecordingPlatform::default()),
            store,
            keychain: Arc::new(InMemoryKeychain::default()),
        }
    }
}

impl PlatformProvider for TestProvider {
    fn pass_library(&self) -> Arc<dyn PassLibrary> {
        self.library.clone()
    }

    fn provisioning(&self) -> Arc<dyn ProvisioningPlatform> {
        self.platform.clone()
    }

    fn status_store(&self) -> Arc<dyn StatusStore> {
        Arc::clone(&self.store)
    }

    fn keychain(&self) -> Arc<dyn Keychain> {
        self.keychain.clone()
    }
}

/// Card-data service double that records each challenge it is asked about.
pub struct MockCardData {
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<(Vec<u8>, CardAccountReference)>>,
}

impl MockCardData {
    pub fn answering() -> Self {
        Self {
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CardDataService for MockCardData {
    async fn fetch_encrypted_pass_data(
        &self,
        challenge: &ProvisioningCertificateChallenge,
        account: &CardAccountReference,
    ) -> Result<EncryptedPassData, CardDataError> {
        self.calls
            .lock()
            .unwrap()
            .push((challenge.nonce.clone(), account.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(pass_data_for(&challenge.nonce))
    }
}

/// Payload bound to `nonce` so tests can tell which challenge produced it.
pub fn pass_data_for(nonce: &[u8]) -> EncryptedPassData {
    EncryptedPassData {
        activation_data: b"activation".to_vec(),
        encrypted_pass_data: [b"encrypted:".as_slice(), nonce].concat(),
        ephemeral_public_key: vec![4; 65],
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<SessionSnapshot>>,
}

impl ProvisioningListener for RecordingListener {
    fn on_provisioning_event(&self, snapshot: SessionSnapshot) {
        self.events.lock().unwrap().push(snapshot);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(ErrorKind, String),
}

impl Outcome {
    #[allow(dead_code, reason = "used in tests")]
    pub fn unwrap_success(self) -> Value {
        match self {
            Self::Success(value) => value,
            Self::Failure(kind, message) => panic!("expected success, got {kind}: {message}"),
        }
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn unwrap_failure(self) -> ErrorKind {
        match self {
            Self::Failure(kind, _) => kind,
            Self::Success(value) => panic!("expected failure, got {value}"),
        }
    }
}

/// Collects every resolution, keyed by callback id.
#[derive(Default)]
pub struct RecordingCallback {
    pub resolutions: Mutex<Vec<(String, Outcome)>>,
}

impl RecordingCallback {
    pub fn outcome(&self, callback_id: &str) -> Option<Outcome> {
        self.resolutions
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == callback_id)
            .map(|(_, outcome)| outcome.clone())
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn count(&self, callback_id: &str) -> usize {
        self.resolutions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == callback_id)
            .count()
    }

    pub async fn wait(&self, callback_id: &str) -> Outcome {
        for _ in 0..500 {
            if let Some(outcome) = self.outcome(callback_id) {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("callback {callback_id} was never resolved");
    }
}

impl CommandCallback for RecordingCallback {
    fn on_success(&self, callback_id: String, payload_json: String) {
        let payload = serde_json::from_str(&payload_json).expect("payload is JSON");
        self.resolutions
            .lock()
            .unwrap()
            .push((callback_id, Outcome::Success(payload)));
    }

    fn on_failure(&self, callback_id: String, kind: ErrorKind, message: String) {
        self.resolutions
            .lock()
            .unwrap()
            .push((callback_id, Outcome::Failure(kind, message)));
    }
}

pub fn test_config() -> BridgeConfig {
    default_bridge_config("https://issuer.example/payload".to_string())
}

#[allow(dead_code, reason = "used in tests")]
pub struct Harness {
    pub gateway: Arc<CommandGateway>,
    pub provider: Arc<TestProvider>,
    pub card_data: Arc<MockCardData>,
    pub listener: Arc<RecordingListener>,
    pub callback: Arc<RecordingCallback>,
}

impl Harness {
    pub fn new(config: &BridgeConfig, card_data: MockCardData) -> Self {
        Self::with_provider(config, card_data, TestProvider::new())
    }

    pub fn with_provider(
        config: &BridgeConfig,
        card_data: MockCardData,
        provider: TestProvider,
    ) -> Self {
        let provider = Arc::new(provider);
        let card_data = Arc::new(card_data);
        let listener = Arc::new(RecordingListener::default());
        let dyn_provider: Arc<dyn PlatformProvider> = provider.clone();
        let gateway = CommandGateway::with_card_data_service(
            &dyn_provider,
            config,
            Some(listener.clone()),
            card_data.clone(),
        )
        .expect("gateway");
        Self {
            gateway: Arc::new(gateway),
            provider,
            card_data,
            listener,
            callback: Arc::new(RecordingCallback::default()),
        }
    }

    /// Invokes a command without waiting for its resolution.
    pub fn send(&self, name: &str, arguments: Value) -> String {
        let callback_id = Uuid::new_v4().to_string();
        Arc::clone(&self.gateway).invoke(
            name.to_string(),
            arguments.to_string(),
            callback_id.clone(),
            self.callback.clone(),
        );
        callback_id
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Outcome {
        let callback_id = self.send(name, arguments);
        self.callback.wait(&callback_id).await
    }
}

pub fn challenge(nonce: &[u8]) -> ProvisioningCertificateChallenge {
    ProvisioningCertificateChallenge {
        certificates: vec![b"leaf-cert".to_vec(), b"intermediate-cert".to_vec()],
        nonce: nonce.to_vec(),
        nonce_signature: b"nonce-signature".to_vec(),
        encryption_scheme: EncryptionScheme::EccV2,
    }
}

#[allow(dead_code, reason = "used in tests")]
pub fn temp_root() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("walletbridge-test-{}", Uuid::new_v4()))
}
