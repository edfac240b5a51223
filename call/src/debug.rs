// SPDX-License-Identifier: MIT

//! Process-wide debug and evaluation context.
//!
//! A singleton store, partitioned by *scope key* (the empty string is the
//! global scope), holding configuration overrides, armed fault rules,
//! workaround flags, named counters and a bounded trace ring.
//! Instrumentation points throughout the codec, packet, session, method
//! and discovery layers consult it through [`DebugContext::check_fault`]
//! and [`DebugContext::check_site`].
//!
//! Thread safety: the store sits behind a `parking_lot::RwLock`. Reads
//! (config, workaround and counter queries) take the read lock; arming,
//! firing, counter bumps and trace records take the write lock. The write
//! lock is held across fault-action execution — including `DelayMs` — so a
//! sleeping fault serializes other instrumented threads. Scope faults to a
//! session key if that trade-off is unacceptable.
//!
//! While the context is disabled (the default) every query short-circuits
//! to its default and `check_fault` unconditionally succeeds.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::Rng;

use crate::error::{Result, SedError};

/// Scope key of the global partition.
pub const GLOBAL_SCOPE: &str = "";

/// Cap on retained trace events per scope; the oldest are dropped first.
const MAX_TRACE_EVENTS: usize = 4096;

/// A configuration override value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Instrumented firing sites across the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    // Transport
    BeforeIfSend,
    AfterIfSend,
    BeforeIfRecv,
    AfterIfRecv,
    // Packet
    BeforePacketBuild,
    AfterPacketParse,
    // Codec
    BeforeTokenEncode,
    AfterTokenDecode,
    // Session
    BeforeStartSession,
    AfterStartSession,
    BeforeSendMethod,
    AfterRecvMethod,
    BeforeCloseSession,
    // Method
    BeforeMethodBuild,
    AfterMethodParse,
    // Discovery
    BeforeDiscovery,
    AfterDiscovery,
    // SSC operations
    BeforeOpalOp,
    BeforeEnterpriseOp,
    BeforePyriteOp,
}

/// User callback for [`FaultAction::Callback`]; may mutate the payload and
/// its returned error aborts the host operation.
pub type FaultCallback = Arc<dyn Fn(&mut Vec<u8>) -> Result<()> + Send + Sync>;

/// What an armed fault does when it fires.
#[derive(Clone)]
pub enum FaultAction {
    /// Abort the host operation with this error.
    ReturnError(SedError),
    /// XOR one payload byte at `offset` with `mask`; a negative offset
    /// selects a random position. Non-fatal.
    CorruptPayload { offset: i32, mask: u8 },
    /// Sleep the calling thread. Non-fatal.
    DelayMs(u64),
    /// Clear the payload and fail the send.
    DropPacket,
    /// Overwrite the payload.
    ReplacePayload(Vec<u8>),
    /// Invoke a user callback with the mutable payload.
    Callback(FaultCallback),
}

impl core::fmt::Debug for FaultAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FaultAction::ReturnError(err) => write!(f, "ReturnError({err:?})"),
            FaultAction::CorruptPayload { offset, mask } => {
                write!(f, "CorruptPayload {{ offset: {offset}, mask: {mask:#04x} }}")
            }
            FaultAction::DelayMs(ms) => write!(f, "DelayMs({ms})"),
            FaultAction::DropPacket => write!(f, "DropPacket"),
            FaultAction::ReplacePayload(data) => {
                write!(f, "ReplacePayload({} bytes)", data.len())
            }
            FaultAction::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// One armed fault rule.
#[derive(Debug, Clone)]
pub struct FaultRule {
    /// Rule name; auto-generated when armed empty.
    pub id: String,
    pub site: FaultSite,
    pub action: FaultAction,
    /// Remaining firings; negative means unlimited, zero means spent.
    remaining: i32,
    total_hits: u64,
}

impl FaultRule {
    #[must_use]
    pub fn new(site: FaultSite, action: FaultAction) -> Self {
        FaultRule {
            id: String::new(),
            site,
            action,
            remaining: -1,
            total_hits: 0,
        }
    }

    /// Name the rule.
    #[must_use]
    pub fn named(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Limit the rule to `n` firings.
    #[must_use]
    pub fn times(mut self, n: u32) -> Self {
        self.remaining = i32::try_from(n).unwrap_or(i32::MAX);
        self
    }

    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    fn is_spent(&self) -> bool {
        self.remaining == 0
    }
}

/// Well-known workaround flag identifiers. Any string is accepted as a
/// flag; these are the ones the library itself consults.
pub mod workaround {
    /// Retry a method when the SP reports busy (caller-driven policy).
    pub const RETRY_ON_SP_BUSY: &str = "wa.retry_on_sp_busy";
    /// Substitute the `timeout_extend_ms` config for the session timeout.
    pub const EXTEND_TIMEOUT: &str = "wa.extend_timeout";
    /// Do not close the session when a response carries EndOfSession.
    pub const IGNORE_END_OF_SESSION: &str = "wa.ignore_end_of_session";
    /// Tolerate non-canonical token streams where possible.
    pub const RELAX_TOKEN_VALIDATION: &str = "wa.relax_token_validation";
    /// Issue a ComID stack reset before opening sessions.
    pub const FORCE_COMID_RESET: &str = "wa.force_comid_reset";
    /// Skip locked-state checks before data operations.
    pub const BYPASS_LOCKING_CHECK: &str = "wa.bypass_locking_check";
    /// Override the negotiated max ComPacket size.
    pub const OVERRIDE_MAX_COMPACKET: &str = "wa.override_max_compacket";
    /// Pad small payloads to the transfer granule.
    pub const PAD_SMALL_PAYLOADS: &str = "wa.pad_small_payloads";
    /// Do not validate the SyncSession echo fields.
    pub const SKIP_SYNC_SESSION_CHECK: &str = "wa.skip_sync_session_check";
    /// Force a fixed security protocol ID on the transport.
    pub const FORCE_PROTOCOL_ID: &str = "wa.force_protocol_id";
}

/// One recorded trace event.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub timestamp: Instant,
    /// Scope the event was recorded under ("" = global).
    pub scope: String,
    pub site: FaultSite,
    /// Short label, e.g. `IF-SEND` or `FAULT:<rule>`.
    pub tag: String,
    pub detail: String,
    /// Optional payload snapshot.
    pub snapshot: Vec<u8>,
    /// Error produced at this point, if any.
    pub result: Option<SedError>,
}

type TraceObserver = Box<dyn Fn(&TraceEvent) + Send + Sync>;

#[derive(Default)]
struct ScopeState {
    config: HashMap<String, ConfigValue>,
    faults: Vec<FaultRule>,
    workarounds: HashMap<String, bool>,
    counters: HashMap<String, u64>,
    trace: VecDeque<TraceEvent>,
}

#[derive(Default)]
struct Inner {
    scopes: HashMap<String, ScopeState>,
    observers: Vec<TraceObserver>,
    rule_id_gen: u32,
}

impl Inner {
    fn push_trace(&mut self, scope: &str, event: TraceEvent) {
        let state = self.scopes.entry(scope.to_owned()).or_default();
        if state.trace.len() >= MAX_TRACE_EVENTS {
            state.trace.pop_front();
        }
        state.trace.push_back(event);
        if let Some(last) = state.trace.back() {
            for observer in &self.observers {
                observer(last);
            }
        }
    }
}

/// The process-wide debug context.
pub struct DebugContext {
    enabled: AtomicBool,
    inner: RwLock<Inner>,
}

static CONTEXT: Lazy<DebugContext> = Lazy::new(|| DebugContext {
    enabled: AtomicBool::new(false),
    inner: RwLock::new(Inner::default()),
});

/// The singleton instance.
#[must_use]
pub fn context() -> &'static DebugContext {
    &CONTEXT
}

impl DebugContext {
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Drop all scopes, observers and generated ids.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.scopes.clear();
        inner.observers.clear();
        inner.rule_id_gen = 0;
    }

    // ── Scope management ────────────────────────────────────────────

    pub fn create_scope(&self, key: &str) {
        self.inner.write().scopes.entry(key.to_owned()).or_default();
    }

    /// Destroy a scope and everything stored under it. The global scope
    /// is never destroyed.
    pub fn destroy_scope(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.inner.write().scopes.remove(key);
        log::debug!("debug scope '{key}' destroyed");
    }

    #[must_use]
    pub fn has_scope(&self, key: &str) -> bool {
        self.inner.read().scopes.contains_key(key)
    }

    #[must_use]
    pub fn scope_keys(&self) -> Vec<String> {
        self.inner.read().scopes.keys().cloned().collect()
    }

    // ── Config overrides ────────────────────────────────────────────

    pub fn set_config(&self, key: &str, scope: &str, value: ConfigValue) {
        self.inner
            .write()
            .scopes
            .entry(scope.to_owned())
            .or_default()
            .config
            .insert(key.to_owned(), value);
    }

    pub fn set_global_config(&self, key: &str, value: ConfigValue) {
        self.set_config(key, GLOBAL_SCOPE, value);
    }

    /// Look up a config value: session scope first, then global.
    #[must_use]
    pub fn config(&self, key: &str, scope: &str) -> Option<ConfigValue> {
        if !self.is_enabled() {
            return None;
        }
        let inner = self.inner.read();
        if !scope.is_empty() {
            if let Some(value) = inner.scopes.get(scope).and_then(|s| s.config.get(key)) {
                return Some(value.clone());
            }
        }
        inner
            .scopes
            .get(GLOBAL_SCOPE)
            .and_then(|s| s.config.get(key))
            .cloned()
    }

    #[must_use]
    pub fn config_bool(&self, key: &str, scope: &str, default: bool) -> bool {
        match self.config(key, scope) {
            Some(ConfigValue::Bool(v)) => v,
            Some(ConfigValue::Int(v)) => v != 0,
            Some(ConfigValue::Uint(v)) => v != 0,
            _ => default,
        }
    }

    #[must_use]
    pub fn config_int(&self, key: &str, scope: &str, default: i64) -> i64 {
        match self.config(key, scope) {
            Some(ConfigValue::Int(v)) => v,
            Some(ConfigValue::Uint(v)) => i64::try_from(v).unwrap_or(default),
            Some(ConfigValue::Bool(v)) => i64::from(v),
            _ => default,
        }
    }

    #[must_use]
    pub fn config_uint(&self, key: &str, scope: &str, default: u64) -> u64 {
        match self.config(key, scope) {
            Some(ConfigValue::Uint(v)) => v,
            Some(ConfigValue::Int(v)) => u64::try_from(v).unwrap_or(default),
            Some(ConfigValue::Bool(v)) => u64::from(v),
            _ => default,
        }
    }

    #[must_use]
    pub fn config_float(&self, key: &str, scope: &str, default: f64) -> f64 {
        match self.config(key, scope) {
            Some(ConfigValue::Float(v)) => v,
            _ => default,
        }
    }

    #[must_use]
    pub fn config_str(&self, key: &str, scope: &str, default: &str) -> String {
        match self.config(key, scope) {
            Some(ConfigValue::Str(v)) => v,
            _ => default.to_owned(),
        }
    }

    #[must_use]
    pub fn config_bytes(&self, key: &str, scope: &str, default: &[u8]) -> Vec<u8> {
        match self.config(key, scope) {
            Some(ConfigValue::Bytes(v)) => v,
            _ => default.to_vec(),
        }
    }

    // ── Fault injection ─────────────────────────────────────────────

    /// Arm a fault rule in the given scope, returning its id.
    pub fn arm_fault(&self, mut rule: FaultRule, scope: &str) -> String {
        let mut inner = self.inner.write();
        if rule.id.is_empty() {
            rule.id = format!("fault_{}", inner.rule_id_gen);
            inner.rule_id_gen += 1;
        }
        let id = rule.id.clone();
        log::info!("armed fault '{id}' at {:?} on scope '{scope}'", rule.site);
        inner
            .scopes
            .entry(scope.to_owned())
            .or_default()
            .faults
            .push(rule);
        id
    }

    pub fn disarm_fault(&self, rule_id: &str, scope: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.scopes.get_mut(scope) {
            state.faults.retain(|r| r.id != rule_id);
        }
    }

    pub fn disarm_all_faults(&self, scope: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.scopes.get_mut(scope) {
            state.faults.clear();
        }
    }

    /// Evaluate armed faults for a site against a mutable payload.
    ///
    /// Session-scoped rules are checked before global rules. Each
    /// matching, unspent rule fires: its countdown decrements, its action
    /// executes (possibly mutating `payload`), a trace event is recorded
    /// and spent rules are collected.
    ///
    /// # Errors
    ///
    /// The armed action's error for `ReturnError`, `DropPacket`
    /// (`TransportSendFailed`) and failing callbacks; `Ok` otherwise, and
    /// always `Ok` while the context is disabled.
    pub fn check_fault(&self, site: FaultSite, payload: &mut Vec<u8>, scope: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let mut inner = self.inner.write();
        if !scope.is_empty() {
            Self::fire_scope(&mut inner, site, payload, scope)?;
        }
        Self::fire_scope(&mut inner, site, payload, GLOBAL_SCOPE)
    }

    /// Payload-less fault check for lifecycle sites.
    ///
    /// # Errors
    ///
    /// Same as [`DebugContext::check_fault`].
    pub fn check_site(&self, site: FaultSite, scope: &str) -> Result<()> {
        let mut empty = Vec::new();
        self.check_fault(site, &mut empty, scope)
    }

    fn fire_scope(
        inner: &mut Inner,
        site: FaultSite,
        payload: &mut Vec<u8>,
        scope: &str,
    ) -> Result<()> {
        let Some(state) = inner.scopes.get_mut(scope) else {
            return Ok(());
        };

        let mut outcome = Ok(());
        let mut events = Vec::new();

        for rule in &mut state.faults {
            if rule.site != site || rule.is_spent() {
                continue;
            }
            if rule.remaining > 0 {
                rule.remaining -= 1;
            }
            rule.total_hits += 1;

            let fired = fire_rule(rule, payload);
            events.push(TraceEvent {
                timestamp: Instant::now(),
                scope: scope.to_owned(),
                site,
                tag: format!("FAULT:{}", rule.id),
                detail: format!("action={:?} hits={}", rule.action, rule.total_hits),
                snapshot: Vec::new(),
                result: fired.err(),
            });

            if fired.is_err() {
                outcome = fired;
                break;
            }
        }

        state.faults.retain(|r| !r.is_spent());
        for event in events {
            inner.push_trace(scope, event);
        }
        outcome
    }

    // ── Workarounds ─────────────────────────────────────────────────

    pub fn activate_workaround(&self, id: &str, scope: &str) {
        log::info!("workaround '{id}' activated (scope '{scope}')");
        self.inner
            .write()
            .scopes
            .entry(scope.to_owned())
            .or_default()
            .workarounds
            .insert(id.to_owned(), true);
    }

    pub fn deactivate_workaround(&self, id: &str, scope: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.scopes.get_mut(scope) {
            state.workarounds.remove(id);
        }
    }

    /// Query a workaround flag: session scope first, then global.
    #[must_use]
    pub fn workaround_active(&self, id: &str, scope: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let inner = self.inner.read();
        if !scope.is_empty() {
            if let Some(active) = inner.scopes.get(scope).and_then(|s| s.workarounds.get(id)) {
                return *active;
            }
        }
        inner
            .scopes
            .get(GLOBAL_SCOPE)
            .and_then(|s| s.workarounds.get(id))
            .copied()
            .unwrap_or(false)
    }

    // ── Counters ────────────────────────────────────────────────────

    pub fn bump_counter(&self, name: &str, delta: u64, scope: &str) {
        if !self.is_enabled() {
            return;
        }
        *self
            .inner
            .write()
            .scopes
            .entry(scope.to_owned())
            .or_default()
            .counters
            .entry(name.to_owned())
            .or_insert(0) += delta;
    }

    /// Read a counter: session scope first, then global, else zero.
    #[must_use]
    pub fn counter(&self, name: &str, scope: &str) -> u64 {
        if !self.is_enabled() {
            return 0;
        }
        let inner = self.inner.read();
        if !scope.is_empty() {
            if let Some(value) = inner.scopes.get(scope).and_then(|s| s.counters.get(name)) {
                return *value;
            }
        }
        inner
            .scopes
            .get(GLOBAL_SCOPE)
            .and_then(|s| s.counters.get(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_counter(&self, name: &str, scope: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.scopes.get_mut(scope) {
            state.counters.remove(name);
        }
    }

    /// Snapshot of all counters in a scope.
    #[must_use]
    pub fn counters(&self, scope: &str) -> HashMap<String, u64> {
        self.inner
            .read()
            .scopes
            .get(scope)
            .map(|s| s.counters.clone())
            .unwrap_or_default()
    }

    // ── Trace ───────────────────────────────────────────────────────

    /// Record a trace event under its scope and notify observers.
    pub fn record_trace(&self, event: TraceEvent) {
        if !self.is_enabled() {
            return;
        }
        let scope = event.scope.clone();
        self.inner.write().push_trace(&scope, event);
    }

    /// Convenience recorder used by the instrumentation points.
    pub fn trace(
        &self,
        site: FaultSite,
        tag: &str,
        detail: String,
        snapshot: &[u8],
        result: Option<SedError>,
        scope: &str,
    ) {
        if !self.is_enabled() {
            return;
        }
        self.record_trace(TraceEvent {
            timestamp: Instant::now(),
            scope: scope.to_owned(),
            site,
            tag: tag.to_owned(),
            detail,
            snapshot: snapshot.to_vec(),
            result,
        });
    }

    /// Register an observer invoked synchronously for every recorded
    /// event, in all scopes.
    pub fn add_trace_observer(&self, observer: impl Fn(&TraceEvent) + Send + Sync + 'static) {
        self.inner.write().observers.push(Box::new(observer));
    }

    #[must_use]
    pub fn trace_events(&self, scope: &str) -> Vec<TraceEvent> {
        self.inner
            .read()
            .scopes
            .get(scope)
            .map(|s| s.trace.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_trace(&self, scope: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.scopes.get_mut(scope) {
            state.trace.clear();
        }
    }
}

fn fire_rule(rule: &FaultRule, payload: &mut Vec<u8>) -> Result<()> {
    match &rule.action {
        FaultAction::ReturnError(err) => {
            log::warn!("fault '{}': returning {err}", rule.id);
            Err(*err)
        }
        FaultAction::CorruptPayload { offset, mask } => {
            if payload.is_empty() {
                return Ok(());
            }
            let index = if *offset < 0 {
                rand::thread_rng().gen_range(0..payload.len())
            } else {
                usize::try_from(*offset).unwrap_or(0)
            };
            if let Some(byte) = payload.get_mut(index) {
                *byte ^= mask;
                log::warn!("fault '{}': corrupted byte at offset {index}", rule.id);
            }
            Ok(())
        }
        FaultAction::DelayMs(ms) => {
            log::warn!("fault '{}': delaying {ms} ms", rule.id);
            std::thread::sleep(Duration::from_millis(*ms));
            Ok(())
        }
        FaultAction::DropPacket => {
            log::warn!("fault '{}': dropping packet", rule.id);
            payload.clear();
            Err(SedError::TransportSendFailed)
        }
        FaultAction::ReplacePayload(replacement) => {
            log::warn!(
                "fault '{}': replacing payload ({} -> {} bytes)",
                rule.id,
                payload.len(),
                replacement.len()
            );
            payload.clear();
            payload.extend_from_slice(replacement);
            Ok(())
        }
        FaultAction::Callback(callback) => callback(payload),
    }
}

/// RAII guard for a scoped debug session: the scope is created on
/// construction and its config, faults, workarounds, counters and trace
/// are dropped with the guard.
pub struct DebugScope {
    key: String,
}

impl DebugScope {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        context().create_scope(&key);
        DebugScope { key }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for DebugScope {
    fn drop(&mut self) {
        context().destroy_scope(&self.key);
    }
}
