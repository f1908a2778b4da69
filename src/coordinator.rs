//! The extraction/verification coordinator.
//!
//! # Protocol
//!
//! ```text
//! interception thread                      strategy thread(s)
//! -------------------                      ------------------
//! obtain_and_check_site_key
//!   lock: insert PendingExtraction
//!         (supersedes older one)
//!   strategy.extract(..) ------------------> work
//!   wait (bounded) <-+                        |
//!                    |                      ExtractionCallback::report
//!                    |                        lock: check ticket, generation, enabled
//!                    |                        unlock: verify with current config
//!                    +--- resolve ----------- lock: re-check, remove, resolve
//! ```
//!
//! A pending extraction is removed from the map and its waiter resolved in
//! the same critical section, on every path: result, navigation,
//! supersession, detach, timeout. A waiter that timed out therefore either
//! removes its own entry or finds its slot already filled.
//!
//! A strategy may report from inside `extract`, on the interception thread
//! itself. Such a report is verified on a worker thread so a slow verifier
//! cannot hold the caller past its wait bound.
//!
//! Requests the strategy does not handle (subresources, by default) never
//! start an extraction of their own; they wait for the session's pending
//! check to settle through [`ExtractionCoordinator::wait_for_site_key_check`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::candidate::KeyCandidate;
use crate::config::{CoordinatorConfig, DEFAULT_TIMEOUT_MS};
use crate::error::Result;
use crate::logging::ExtractionLog;
use crate::rendezvous::{self, Resolver, WaitOutcome};
use crate::request::ResourceRequest;
use crate::session::{PageSession, SessionBinding, SessionId};
use crate::stats::{ExtractionStats, StatsSnapshot};
use crate::strategy::{self, Collaborators, ExtractionStrategy};
use crate::verdict::{NoVerdictReason, Verdict};
use crate::verified::VerifiedSiteKey;
use crate::verifier::VerificationConfig;

/// In-flight check for one session.
struct PendingExtraction {
    ticket: u64,
    request: Arc<ResourceRequest>,
    generation: u64,
    binding: SessionBinding,
    resolver: Resolver<Verdict>,
}

impl PendingExtraction {
    fn resolve(self, verdict: Verdict) {
        self.resolver.resolve(verdict);
    }
}

struct Shared {
    pending: Mutex<HashMap<SessionId, PendingExtraction>>,
    /// Notified whenever a session's pending extraction is removed.
    settled: Condvar,
    next_ticket: AtomicU64,
    enabled: AtomicBool,
    verification: RwLock<Option<VerificationConfig>>,
    strategy: RwLock<Arc<dyn ExtractionStrategy>>,
    stats: ExtractionStats,
}

/// Coordinates site key extraction and verification for page sessions.
///
/// One coordinator can serve any number of sessions; it keeps at most one
/// pending extraction per session. All methods take `&self` and may be
/// called from any thread.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use sitekey_core::{
///     ExtractionCallback, ExtractionCoordinator, ExtractionStrategy, KeyCandidate,
///     PageSession, RequestId, ResourceRequest, SessionBinding, VerificationConfig,
/// };
///
/// struct FixedKey;
///
/// impl ExtractionStrategy for FixedKey {
///     fn name(&self) -> &'static str {
///         "fixed"
///     }
///
///     fn extract(&self, _: &SessionBinding, _: &ResourceRequest, on_result: ExtractionCallback) {
///         on_result.report(KeyCandidate::new("abc"));
///     }
/// }
///
/// let coordinator = ExtractionCoordinator::new(Arc::new(FixedKey))
///     .with_timeout(Duration::from_millis(500));
/// coordinator.set_verification_config(VerificationConfig::new(Arc::new(
///     |key: &str, _domain: &str, _url: &sitekey_core::Url| key == "abc",
/// )));
///
/// let session = PageSession::new();
/// let request = ResourceRequest::new(RequestId(1), "https://example.com/").unwrap();
///
/// let verdict = coordinator.obtain_and_check_site_key(&session, &request);
/// assert!(verdict.is_verified());
/// ```
pub struct ExtractionCoordinator {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl ExtractionCoordinator {
    /// Creates an enabled coordinator with the default 2000 ms wait bound
    /// and no verification config.
    pub fn new(strategy: Arc<dyn ExtractionStrategy>) -> Self {
        Self::with_parts(strategy, Duration::from_millis(DEFAULT_TIMEOUT_MS), true)
    }

    /// Builds a coordinator and its strategy from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// config does not validate, or
    /// [`Error::MissingCollaborator`](crate::Error::MissingCollaborator) if
    /// the selected strategy lacks its collaborator.
    pub fn from_config(config: &CoordinatorConfig, collaborators: &Collaborators) -> Result<Self> {
        config.validate()?;
        let strategy = strategy::build(config, collaborators)?;
        Ok(Self::with_parts(strategy, config.timeout(), config.enabled))
    }

    fn with_parts(strategy: Arc<dyn ExtractionStrategy>, timeout: Duration, enabled: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                settled: Condvar::new(),
                next_ticket: AtomicU64::new(1),
                enabled: AtomicBool::new(enabled),
                verification: RwLock::new(None),
                strategy: RwLock::new(strategy),
                stats: ExtractionStats::default(),
            }),
            timeout,
        }
    }

    /// Replaces the wait bound.
    ///
    /// A bound too large to form a deadline (such as `Duration::MAX`) means
    /// the caller waits until the check is released by some other path.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extracts and verifies the site key for `request`, blocking the
    /// calling thread until a verdict is known.
    ///
    /// Returns within the configured wait bound in every case. A newer call
    /// for the same session, [`notify_loading_started`](Self::notify_loading_started)
    /// or [`detach`](Self::detach) release the wait early with a
    /// `NoVerdict`.
    ///
    /// A request the strategy does not handle starts no extraction. It waits
    /// for the session's pending check, if any, to settle and then returns
    /// `NoVerdict(NotApplicable)`; the host reads the outcome of that check
    /// from [`VerifiedKeys`](crate::VerifiedKeys).
    pub fn obtain_and_check_site_key(
        &self,
        session: &Arc<PageSession>,
        request: &ResourceRequest,
    ) -> Verdict {
        let log = ExtractionLog::new(request.id(), session.id());
        let verdict = self.run_check(session, request, &log);
        log.debug(format_args!("site key check finished: {}", verdict));
        self.shared.stats.record(&verdict);
        verdict
    }

    fn run_check(
        &self,
        session: &Arc<PageSession>,
        request: &ResourceRequest,
        log: &ExtractionLog,
    ) -> Verdict {
        if !self.is_enabled() {
            return Verdict::NoVerdict(NoVerdictReason::Disabled);
        }
        if session.is_destroyed() {
            return Verdict::NoVerdict(NoVerdictReason::SessionGone);
        }

        let strategy = self.shared.strategy.read().clone();
        if !strategy.accepts(request) {
            self.wait_for_site_key_check(session, request);
            return Verdict::NoVerdict(NoVerdictReason::NotApplicable);
        }

        let session_id = session.id();
        let binding = session.binding();
        let ticket = self.shared.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (resolver, waiter) = rendezvous::channel();

        {
            let mut pending = self.shared.pending.lock();
            let generation = session.generation();
            let entry = PendingExtraction {
                ticket,
                request: Arc::new(request.clone()),
                generation,
                binding: binding.clone(),
                resolver,
            };
            if let Some(previous) = pending.insert(session_id, entry) {
                log.debug(format_args!(
                    "superseding pending check for {}",
                    previous.request.id()
                ));
                previous.resolve(Verdict::NoVerdict(NoVerdictReason::Superseded));
            }
            log.debug(format_args!(
                "starting {} extraction at generation {}",
                strategy.name(),
                generation
            ));
        }

        let callback = ExtractionCallback {
            shared: Arc::downgrade(&self.shared),
            session_id,
            ticket,
            caller: thread::current().id(),
            reported: false,
        };
        strategy.extract(&binding, request, callback);

        match waiter.wait_timeout(self.timeout) {
            WaitOutcome::Resolved(verdict) => verdict,
            WaitOutcome::Abandoned => Verdict::NoVerdict(NoVerdictReason::NoKeyPresent),
            WaitOutcome::TimedOut => {
                let mut pending = self.shared.pending.lock();
                if pending
                    .get(&session_id)
                    .is_some_and(|entry| entry.ticket == ticket)
                {
                    self.shared.take_pending(&mut pending, session_id);
                    drop(pending);
                    log.warn(format_args!(
                        "{} extraction did not report within {:?}",
                        strategy.name(),
                        self.timeout
                    ));
                    return Verdict::NoVerdict(NoVerdictReason::Timeout);
                }
                drop(pending);
                // Someone else removed the entry, and resolved it while
                // holding the lock.
                match waiter.wait_timeout(Duration::ZERO) {
                    WaitOutcome::Resolved(verdict) => verdict,
                    _ => Verdict::NoVerdict(NoVerdictReason::Timeout),
                }
            }
        }
    }

    /// Blocks until `session` has no pending check, bounded by the wait bound.
    ///
    /// Starts no extraction. Returns `true` if no check is pending on return,
    /// `false` if the bound elapsed first. Hosts call this for requests that
    /// must not be answered before the page's site key is known, typically
    /// subresources of a page whose main-frame check is still running.
    pub fn wait_for_site_key_check(&self, session: &PageSession, request: &ResourceRequest) -> bool {
        let session_id = session.id();
        let deadline = Instant::now().checked_add(self.timeout);
        let mut pending = self.shared.pending.lock();
        if pending.contains_key(&session_id) {
            ExtractionLog::new(request.id(), session_id)
                .debug(format_args!("waiting for the pending site key check"));
        }
        while pending.contains_key(&session_id) {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .settled
                        .wait_until(&mut pending, deadline)
                        .timed_out()
                    {
                        return !pending.contains_key(&session_id);
                    }
                }
                None => self.shared.settled.wait(&mut pending),
            }
        }
        true
    }

    /// Signals that `session` started a new navigation.
    ///
    /// Advances the session's generation and immediately releases any
    /// pending check for it with `NoVerdict(Navigated)`. Results that arrive
    /// later for the old generation are discarded, and keys verified for the
    /// previous page are forgotten.
    pub fn notify_loading_started(&self, session: &Arc<PageSession>) {
        let mut pending = self.shared.pending.lock();
        let generation = session.advance_generation();
        self.shared.forget_keys(session.id());
        if let Some(entry) = self.shared.take_pending(&mut pending, session.id()) {
            ExtractionLog::new(entry.request.id(), session.id()).debug(format_args!(
                "navigation to generation {} aborts check from generation {}",
                generation, entry.generation
            ));
            entry.resolve(Verdict::NoVerdict(NoVerdictReason::Navigated));
        }
    }

    /// Releases any pending check for a session that is going away and
    /// forgets the keys verified for it.
    pub fn detach(&self, session: &PageSession) {
        let mut pending = self.shared.pending.lock();
        self.shared.forget_keys(session.id());
        if let Some(entry) = self.shared.take_pending(&mut pending, session.id()) {
            ExtractionLog::new(entry.request.id(), session.id())
                .debug(format_args!("session detached with a pending check"));
            entry.resolve(Verdict::NoVerdict(NoVerdictReason::SessionGone));
        }
    }

    /// Enables or disables checking.
    ///
    /// Disabling does not interrupt running strategies, but their results are
    /// discarded and the waiting caller gets `NoVerdict(Disabled)`.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        tracing::info!(enabled, "site key checking toggled");
    }

    /// Returns whether checking is enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Replaces the verification capability.
    ///
    /// Takes effect for the next verification step, including one for a
    /// check that is already pending.
    pub fn set_verification_config(&self, config: VerificationConfig) {
        *self.shared.verification.write() = Some(config);
    }

    /// Removes the verification capability; checks then fail closed with
    /// `NoVerdict(NotConfigured)`.
    pub fn clear_verification_config(&self) {
        *self.shared.verification.write() = None;
    }

    /// Returns the current verification capability, if any.
    pub fn verification_config(&self) -> Option<VerificationConfig> {
        self.shared.verification.read().clone()
    }

    /// Replaces the extraction strategy for future checks.
    pub fn set_strategy(&self, strategy: Arc<dyn ExtractionStrategy>) {
        *self.shared.strategy.write() = strategy;
    }

    /// Name of the current strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.shared.strategy.read().name()
    }

    /// Bound on the blocking wait.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of sessions with a check in flight.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Returns a copy of the verdict counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl fmt::Debug for ExtractionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionCoordinator")
            .field("strategy", &self.strategy_name())
            .field("enabled", &self.is_enabled())
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Shared {
    /// Removes a session's pending extraction and wakes anyone waiting for
    /// it to settle. Callers hold the `pending` lock.
    fn take_pending(
        &self,
        pending: &mut HashMap<SessionId, PendingExtraction>,
        session_id: SessionId,
    ) -> Option<PendingExtraction> {
        let entry = pending.remove(&session_id);
        if entry.is_some() {
            self.settled.notify_all();
        }
        entry
    }

    fn forget_keys(&self, session_id: SessionId) {
        if let Some(config) = self.verification.read().as_ref() {
            config.verified_keys().clear_session(session_id);
        }
    }

    fn resolve(&self, session_id: SessionId, ticket: u64, candidate: Option<KeyCandidate>) {
        // Phase 1: is this result still wanted?
        let request = {
            let mut pending = self.pending.lock();
            match self.check_current(&mut pending, session_id, ticket) {
                Some(entry) => Arc::clone(&entry.request),
                None => return,
            }
        };
        let log = ExtractionLog::new(request.id(), session_id);

        let Some(candidate) = candidate else {
            self.finish(session_id, ticket, |_| {
                Verdict::NoVerdict(NoVerdictReason::NoKeyPresent)
            });
            return;
        };

        // Phase 2: verify outside the lock against the config current now.
        let config = self.verification.read().clone();
        let accepted = match &config {
            Some(config) => {
                let accepted =
                    config
                        .verifier()
                        .verify(candidate.as_raw(), request.domain(), request.url());
                log.debug(format_args!(
                    "verifier {} {}-byte candidate for {}",
                    if accepted { "accepted" } else { "rejected" },
                    candidate.len(),
                    request.domain()
                ));
                Some(accepted)
            }
            None => {
                log.warn(format_args!("no verification config set; not verifying"));
                None
            }
        };

        // Phase 3: re-check and publish.
        self.finish(session_id, ticket, move |entry| match (accepted, config) {
            (Some(true), Some(config)) => {
                let key = VerifiedSiteKey::new_unchecked(candidate.into_raw());
                config
                    .verified_keys()
                    .record(session_id, entry.request.url(), key.public_key());
                log.info(format_args!("site key verified for {}", entry.request.domain()));
                Verdict::Verified(key)
            }
            (Some(false), _) => {
                log.info(format_args!("site key rejected for {}", entry.request.domain()));
                Verdict::Rejected
            }
            _ => Verdict::NoVerdict(NoVerdictReason::NotConfigured),
        });
    }

    /// Re-validates the entry, removes it and resolves it with `decide`'s verdict.
    fn finish<F>(&self, session_id: SessionId, ticket: u64, decide: F)
    where
        F: FnOnce(&PendingExtraction) -> Verdict,
    {
        let mut pending = self.pending.lock();
        if self
            .check_current(&mut pending, session_id, ticket)
            .is_none()
        {
            return;
        }
        if let Some(entry) = self.take_pending(&mut pending, session_id) {
            let verdict = decide(&entry);
            entry.resolve(verdict);
        }
    }

    /// Returns the entry if the result for `ticket` should still be applied.
    ///
    /// Otherwise the result is discarded; if the entry itself is dead
    /// (session gone, generation moved, checking disabled) it is removed and
    /// its waiter released.
    fn check_current<'a>(
        &self,
        pending: &'a mut HashMap<SessionId, PendingExtraction>,
        session_id: SessionId,
        ticket: u64,
    ) -> Option<&'a PendingExtraction> {
        let release = match pending.get(&session_id) {
            Some(entry) if entry.ticket == ticket => {
                match entry.binding.current_generation() {
                    None => Some(NoVerdictReason::SessionGone),
                    Some(generation) if generation != entry.generation => {
                        Some(NoVerdictReason::Navigated)
                    }
                    Some(_) if !self.enabled.load(Ordering::Acquire) => {
                        Some(NoVerdictReason::Disabled)
                    }
                    Some(_) => None,
                }
            }
            _ => {
                tracing::debug!(session = %session_id, ticket, "discarding result for a released check");
                self.stats.discard_stale();
                return None;
            }
        };

        match release {
            None => pending.get(&session_id),
            Some(reason) => {
                if reason == NoVerdictReason::Disabled {
                    self.stats.discard_disabled();
                } else {
                    self.stats.discard_stale();
                }
                tracing::debug!(session = %session_id, ticket, %reason, "discarding site key result");
                if let Some(entry) = self.take_pending(pending, session_id) {
                    entry.resolve(Verdict::NoVerdict(reason));
                }
                None
            }
        }
    }
}

/// One-shot result channel handed to an [`ExtractionStrategy`].
///
/// [`report`](Self::report) consumes the callback, so a strategy can report
/// at most once. Dropping it unreported resolves the check as "no key"
/// rather than leaving the caller waiting for the timeout. The callback
/// holds no strong reference to the coordinator or the session.
pub struct ExtractionCallback {
    shared: Weak<Shared>,
    session_id: SessionId,
    ticket: u64,
    /// Thread blocked in `obtain_and_check_site_key` for this check.
    caller: ThreadId,
    reported: bool,
}

impl ExtractionCallback {
    /// Delivers the strategy's result: a candidate, or `None` when no key
    /// was found or extraction failed.
    ///
    /// May be called from any thread, including from inside
    /// [`ExtractionStrategy::extract`].
    pub fn report(mut self, candidate: Option<KeyCandidate>) {
        self.reported = true;
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let (session_id, ticket) = (self.session_id, self.ticket);
        if candidate.is_none() || thread::current().id() != self.caller {
            shared.resolve(session_id, ticket, candidate);
            return;
        }

        // Reported on the blocked caller's own thread: verify elsewhere so
        // the caller reaches its bounded wait.
        let worker = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("sitekey-verify".to_string())
            .spawn(move || worker.resolve(session_id, ticket, candidate));
        if let Err(err) = spawned {
            tracing::warn!(session = %session_id, error = %err, "failed to spawn site key verify worker");
            shared.resolve(session_id, ticket, None);
        }
    }

    /// Consumes the callback without resolving anything.
    ///
    /// For strategies that observed [`is_current`](Self::is_current) turn
    /// `false`; the check was already released elsewhere.
    pub(crate) fn dismiss(mut self) {
        self.reported = true;
    }

    /// Returns `false` once the check this callback belongs to has been
    /// released, so long-running strategies can skip pointless work.
    pub fn is_current(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let pending = shared.pending.lock();
        pending
            .get(&self.session_id)
            .is_some_and(|entry| entry.ticket == self.ticket && entry.binding.is_valid())
    }
}

impl Drop for ExtractionCallback {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            tracing::debug!(session = %self.session_id, ticket = self.ticket, "strategy dropped its callback");
            shared.resolve(self.session_id, self.ticket, None);
        }
    }
}

impl fmt::Debug for ExtractionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionCallback")
            .field("session", &self.session_id)
            .field("ticket", &self.ticket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestId;
    use std::thread;
    use std::time::Instant;
    use url::Url;

    /// Parks callbacks so tests decide when (and whether) to report.
    #[derive(Default)]
    struct Parked {
        callbacks: Mutex<Vec<ExtractionCallback>>,
    }

    impl Parked {
        fn take(&self) -> Option<ExtractionCallback> {
            self.callbacks.lock().pop()
        }

        fn wait_for_callback(&self) -> ExtractionCallback {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                if let Some(callback) = self.take() {
                    return callback;
                }
                assert!(Instant::now() < deadline, "strategy was never invoked");
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    impl ExtractionStrategy for Parked {
        fn name(&self) -> &'static str {
            "parked"
        }

        fn extract(&self, _: &SessionBinding, _: &ResourceRequest, on_result: ExtractionCallback) {
            self.callbacks.lock().push(on_result);
        }
    }

    fn accept_abc() -> VerificationConfig {
        VerificationConfig::new(Arc::new(|key: &str, _: &str, _: &Url| key == "abc"))
    }

    fn request(id: u64) -> ResourceRequest {
        ResourceRequest::new(RequestId(id), "https://example.com/page")
            .unwrap()
            .main_frame(true)
    }

    fn setup(timeout_ms: u64) -> (Arc<ExtractionCoordinator>, Arc<Parked>) {
        let parked = Arc::new(Parked::default());
        let coordinator = ExtractionCoordinator::new(parked.clone())
            .with_timeout(Duration::from_millis(timeout_ms));
        coordinator.set_verification_config(accept_abc());
        (Arc::new(coordinator), parked)
    }

    fn spawn_check(
        coordinator: &Arc<ExtractionCoordinator>,
        session: &Arc<PageSession>,
        id: u64,
    ) -> thread::JoinHandle<Verdict> {
        let coordinator = Arc::clone(coordinator);
        let session = Arc::clone(session);
        thread::spawn(move || coordinator.obtain_and_check_site_key(&session, &request(id)))
    }

    #[test]
    fn disabled_returns_immediately() {
        let (coordinator, parked) = setup(5_000);
        coordinator.set_enabled(false);
        let session = PageSession::new();

        let verdict = coordinator.obtain_and_check_site_key(&session, &request(1));

        assert_eq!(verdict, Verdict::NoVerdict(NoVerdictReason::Disabled));
        assert!(parked.take().is_none());
    }

    #[test]
    fn destroyed_session_is_not_checked() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        session.destroy();

        let verdict = coordinator.obtain_and_check_site_key(&session, &request(1));

        assert_eq!(verdict, Verdict::NoVerdict(NoVerdictReason::SessionGone));
        assert!(parked.take().is_none());
    }

    #[test]
    fn report_resolves_waiter() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);

        parked.wait_for_callback().report(KeyCandidate::new("abc"));

        let verdict = handle.join().unwrap();
        assert!(verdict.is_verified());
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn dropped_callback_means_no_key() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);

        drop(parked.wait_for_callback());

        assert_eq!(
            handle.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::NoKeyPresent)
        );
    }

    #[test]
    fn missing_config_fails_closed() {
        let (coordinator, parked) = setup(5_000);
        coordinator.clear_verification_config();
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);

        parked.wait_for_callback().report(KeyCandidate::new("abc"));

        assert_eq!(
            handle.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::NotConfigured)
        );
    }

    #[test]
    fn callback_is_current_until_released() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);

        let callback = parked.wait_for_callback();
        assert!(callback.is_current());

        coordinator.notify_loading_started(&session);
        assert!(!callback.is_current());

        assert_eq!(
            handle.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::Navigated)
        );
        callback.report(KeyCandidate::new("abc"));
        assert_eq!(coordinator.stats().discarded_stale, 1);
    }

    #[test]
    fn detach_releases_waiter() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);
        let _callback = parked.wait_for_callback();

        coordinator.detach(&session);

        assert_eq!(
            handle.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::SessionGone)
        );
    }

    #[test]
    fn report_after_destroy_releases_with_session_gone() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);
        let callback = parked.wait_for_callback();

        session.destroy();
        callback.report(KeyCandidate::new("abc"));

        assert_eq!(
            handle.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::SessionGone)
        );
    }

    #[test]
    fn verified_key_is_recorded_in_config() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);

        parked.wait_for_callback().report(KeyCandidate::new("abc"));
        assert!(handle.join().unwrap().is_verified());

        let config = coordinator.verification_config().unwrap();
        let url = Url::parse("https://example.com/page").unwrap();
        assert_eq!(
            config.verified_keys().public_key_for(session.id(), &url),
            Some("abc".to_string())
        );
    }

    fn verify_once(
        coordinator: &Arc<ExtractionCoordinator>,
        parked: &Parked,
        session: &Arc<PageSession>,
    ) {
        let handle = spawn_check(coordinator, session, 1);
        parked.wait_for_callback().report(KeyCandidate::new("abc"));
        assert!(handle.join().unwrap().is_verified());
    }

    #[test]
    fn navigation_forgets_verified_keys() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let other = PageSession::new();
        verify_once(&coordinator, &parked, &session);
        verify_once(&coordinator, &parked, &other);

        coordinator.notify_loading_started(&session);

        let keys = Arc::clone(coordinator.verification_config().unwrap().verified_keys());
        let url = Url::parse("https://example.com/page").unwrap();
        assert_eq!(keys.public_key_for(session.id(), &url), None);
        assert_eq!(keys.public_key_for(other.id(), &url), Some("abc".to_string()));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn detach_forgets_verified_keys() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        verify_once(&coordinator, &parked, &session);

        session.destroy();
        coordinator.detach(&session);

        let config = coordinator.verification_config().unwrap();
        assert!(config.verified_keys().is_empty());
    }

    #[test]
    fn unbounded_timeout_does_not_panic() {
        let parked = Arc::new(Parked::default());
        let coordinator = Arc::new(
            ExtractionCoordinator::new(parked.clone()).with_timeout(Duration::MAX),
        );
        coordinator.set_verification_config(accept_abc());
        let session = PageSession::new();
        let handle = spawn_check(&coordinator, &session, 1);

        drop(parked.wait_for_callback());

        assert_eq!(
            handle.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::NoKeyPresent)
        );
    }

    #[test]
    fn wait_without_pending_check_returns_at_once() {
        let (coordinator, _parked) = setup(5_000);
        let session = PageSession::new();

        let started = Instant::now();
        assert!(coordinator.wait_for_site_key_check(&session, &request(1)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_joins_pending_check() {
        let (coordinator, parked) = setup(5_000);
        let session = PageSession::new();
        let main = spawn_check(&coordinator, &session, 1);
        let callback = parked.wait_for_callback();

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            let session = Arc::clone(&session);
            thread::spawn(move || coordinator.wait_for_site_key_check(&session, &request(2)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        callback.report(KeyCandidate::new("abc"));

        assert!(main.join().unwrap().is_verified());
        assert!(waiter.join().unwrap());
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn wait_settles_when_pending_check_times_out() {
        let (coordinator, parked) = setup(100);
        let session = PageSession::new();
        let main = spawn_check(&coordinator, &session, 1);
        let _callback = parked.wait_for_callback();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        // The main check started waiting first, so its bound elapses first.
        assert!(coordinator.wait_for_site_key_check(&session, &request(2)));
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(
            main.join().unwrap(),
            Verdict::NoVerdict(NoVerdictReason::Timeout)
        );
    }

    #[test]
    fn sessions_do_not_supersede_each_other() {
        let (coordinator, parked) = setup(5_000);
        let first = PageSession::new();
        let second = PageSession::new();

        let a = spawn_check(&coordinator, &first, 1);
        let cb_a = parked.wait_for_callback();
        let b = spawn_check(&coordinator, &second, 2);
        let cb_b = parked.wait_for_callback();

        assert_eq!(coordinator.pending_count(), 2);
        cb_a.report(KeyCandidate::new("abc"));
        cb_b.report(KeyCandidate::new("xyz"));

        assert!(a.join().unwrap().is_verified());
        assert!(b.join().unwrap().is_rejected());
    }

    #[test]
    fn from_config_applies_settings() {
        struct NoFetch;
        impl crate::strategy::ResourceFetcher for NoFetch {
            fn fetch_header(&self, _: &ResourceRequest, _: &str) -> Result<Option<String>> {
                Ok(None)
            }
        }

        let config = CoordinatorConfig::default()
            .with_timeout_ms(300)
            .with_enabled(false);
        let collaborators = Collaborators::new().with_fetcher(Arc::new(NoFetch));
        let coordinator = ExtractionCoordinator::from_config(&config, &collaborators).unwrap();

        assert_eq!(coordinator.timeout(), Duration::from_millis(300));
        assert!(!coordinator.is_enabled());
        assert_eq!(coordinator.strategy_name(), "header");
        assert!(coordinator.verification_config().is_none());
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let config = CoordinatorConfig::default().with_timeout_ms(0);
        let result = ExtractionCoordinator::from_config(&config, &Collaborators::new());
        assert!(matches!(result, Err(crate::Error::InvalidConfig(_))));
    }

    #[test]
    fn set_strategy_replaces_strategy() {
        let (coordinator, _parked) = setup(5_000);
        let other = Arc::new(Parked::default());

        coordinator.set_strategy(other);
        assert_eq!(coordinator.strategy_name(), "parked");
        assert!(format!("{:?}", coordinator).contains("parked"));
    }
}
