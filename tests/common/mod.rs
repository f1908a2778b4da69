//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::Mutex;
use sitekey_core::{
    ExtractionCallback, ExtractionCoordinator, ExtractionStrategy, KeyCandidate, KeyVerifier,
    PageSession, RequestId, ResourceRequest, SessionBinding, SignedKeyVerifier, Url, Verdict,
};

pub const USER_AGENT: &str = "TestBrowser/1.0";

/// Routes `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn main_frame(id: u64, url: &str) -> ResourceRequest {
    ResourceRequest::new(RequestId(id), url)
        .expect("valid test url")
        .main_frame(true)
        .with_header("User-Agent", USER_AGENT)
}

/// Runs a check on its own thread, like an interception hook would.
pub fn spawn_check(
    coordinator: &Arc<ExtractionCoordinator>,
    session: &Arc<PageSession>,
    request: ResourceRequest,
) -> thread::JoinHandle<(Verdict, Duration)> {
    let coordinator = Arc::clone(coordinator);
    let session = Arc::clone(session);
    thread::spawn(move || {
        let started = Instant::now();
        let verdict = coordinator.obtain_and_check_site_key(&session, &request);
        (verdict, started.elapsed())
    })
}

/// Holds on to callbacks so a test decides when, and whether, to report.
#[derive(Default)]
pub struct ParkedStrategy {
    callbacks: Mutex<Vec<ExtractionCallback>>,
    invocations: AtomicUsize,
    main_frame_only: bool,
}

impl ParkedStrategy {
    /// A parked strategy that leaves subresources to the page's check.
    pub fn main_frame_only() -> Self {
        Self {
            main_frame_only: true,
            ..Self::default()
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Waits until the strategy has been handed a callback and takes it.
    pub fn next_callback(&self) -> ExtractionCallback {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(callback) = self.callbacks.lock().pop() {
                return callback;
            }
            assert!(Instant::now() < deadline, "strategy was never invoked");
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl ExtractionStrategy for ParkedStrategy {
    fn name(&self) -> &'static str {
        "parked"
    }

    fn accepts(&self, request: &ResourceRequest) -> bool {
        !self.main_frame_only || request.is_main_frame()
    }

    fn extract(&self, _: &SessionBinding, _: &ResourceRequest, on_result: ExtractionCallback) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().push(on_result);
    }
}

/// Reports a fixed candidate from another thread after a delay.
pub struct DelayedStrategy {
    pub candidate: Option<&'static str>,
    pub delay: Duration,
}

impl ExtractionStrategy for DelayedStrategy {
    fn name(&self) -> &'static str {
        "delayed"
    }

    fn extract(&self, _: &SessionBinding, _: &ResourceRequest, on_result: ExtractionCallback) {
        let candidate = self.candidate;
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            on_result.report(candidate.and_then(KeyCandidate::new));
        });
    }
}

/// Reports a fixed candidate synchronously from inside `extract`.
pub struct ImmediateStrategy(pub &'static str);

impl ExtractionStrategy for ImmediateStrategy {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn extract(&self, _: &SessionBinding, _: &ResourceRequest, on_result: ExtractionCallback) {
        on_result.report(KeyCandidate::new(self.0));
    }
}

/// Accepts every key after sleeping, and counts calls.
pub struct SlowVerifier {
    pub delay: Duration,
    calls: AtomicUsize,
}

impl SlowVerifier {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeyVerifier for SlowVerifier {
    fn verify(&self, _candidate: &str, _domain: &str, _url: &Url) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        true
    }
}

/// Accepts exactly one key and records every call.
pub struct RecordingVerifier {
    accept: &'static str,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl RecordingVerifier {
    pub fn accepting(accept: &'static str) -> Arc<Self> {
        Arc::new(Self {
            accept,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().clone()
    }
}

impl KeyVerifier for RecordingVerifier {
    fn verify(&self, candidate: &str, domain: &str, url: &Url) -> bool {
        self.calls
            .lock()
            .push((candidate.to_string(), domain.to_string(), url.to_string()));
        candidate == self.accept
    }
}

/// Verifier that parks inside `verify` until the test releases it.
pub struct GatedVerifier {
    pub entered: Barrier,
    pub release: Barrier,
}

impl GatedVerifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        })
    }
}

impl KeyVerifier for GatedVerifier {
    fn verify(&self, _candidate: &str, _domain: &str, _url: &Url) -> bool {
        self.entered.wait();
        self.release.wait();
        true
    }
}

/// Deterministic Ed25519 key for test site owners.
pub fn site_owner(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn public_key_b64(key: &SigningKey) -> String {
    B64.encode(key.verifying_key().to_bytes())
}

/// Produces the `<public key>_<signature>` value a site would serve.
pub fn sign_site_key(key: &SigningKey, url: &str, user_agent: &str) -> String {
    let url = Url::parse(url).expect("valid test url");
    let domain = url.host_str().unwrap_or_default().to_string();
    let message = SignedKeyVerifier::signed_message(&domain, &url, user_agent);
    let signature = key.sign(&message);
    format!("{}_{}", public_key_b64(key), B64.encode(signature.to_bytes()))
}
