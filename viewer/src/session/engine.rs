//! Native engine seam: the lifecycle API the session bridge drives.
//!
//! `SessionHandle` is an index into an engine-owned resource table, never a
//! pointer. `HeadlessEngine` is the in-process implementation used when no
//! device runtime is linked: an arena of session slots with generation
//! counters, so a destroyed handle can never alias a later session.

use std::num::NonZeroU64;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::loader::AssetSource;

/// Opaque, non-zero handle to a native rendering/tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(NonZeroU64);

impl SessionHandle {
    /// Wrap a raw native value. Zero is the null sentinel.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// Native engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("native session creation failed: {0}")]
    CreateFailed(String),
}

/// Lifecycle API of the native rendering/head-tracking engine.
///
/// `create` is the only call that allocates a handle. The remaining calls
/// must only be made with a handle returned by `create` and not yet passed
/// to `destroy`.
pub trait NativeEngine {
    fn create(&mut self, assets: &dyn AssetSource) -> Result<SessionHandle, EngineError>;
    fn resume(&mut self, handle: SessionHandle);
    fn pause(&mut self, handle: SessionHandle);
    fn destroy(&mut self, handle: SessionHandle);
    fn switch_viewer(&mut self, handle: SessionHandle);
}

// ── Call log ─────────────────────────────────────────────────

/// One call observed by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    Create(SessionHandle),
    Resume(SessionHandle),
    Pause(SessionHandle),
    Destroy(SessionHandle),
    SwitchViewer(SessionHandle),
}

impl EngineCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Resume(_) => "resume",
            Self::Pause(_) => "pause",
            Self::Destroy(_) => "destroy",
            Self::SwitchViewer(_) => "switch-viewer",
        }
    }

    pub fn handle(&self) -> SessionHandle {
        match *self {
            Self::Create(h)
            | Self::Resume(h)
            | Self::Pause(h)
            | Self::Destroy(h)
            | Self::SwitchViewer(h) => h,
        }
    }
}

/// Check that `calls` is a prefix of `create, (resume, pause)*, destroy`
/// against a single handle. `switch_viewer` may appear anywhere between
/// `create` and `destroy`.
pub fn is_lifecycle_prefix(calls: &[EngineCall]) -> bool {
    enum Expect {
        Create,
        ResumeOrDestroy,
        Pause,
        Nothing,
    }

    let mut expect = Expect::Create;
    let mut handle = None;
    for call in calls {
        if let Some(h) = handle {
            if call.handle() != h {
                return false;
            }
        }
        expect = match (expect, call) {
            (Expect::Create, EngineCall::Create(h)) => {
                handle = Some(*h);
                Expect::ResumeOrDestroy
            }
            (Expect::ResumeOrDestroy, EngineCall::Resume(_)) => Expect::Pause,
            (Expect::Pause, EngineCall::Pause(_)) => Expect::ResumeOrDestroy,
            (Expect::ResumeOrDestroy, EngineCall::Destroy(_)) => Expect::Nothing,
            (e @ (Expect::ResumeOrDestroy | Expect::Pause), EngineCall::SwitchViewer(_)) => e,
            _ => return false,
        };
    }
    true
}

/// Format a call log as an s-expression list of call names.
pub fn call_log_sexp(calls: &[EngineCall]) -> String {
    let names: Vec<&str> = calls.iter().map(|c| c.as_str()).collect();
    format!("({})", names.join(" "))
}

// ── Headless engine ──────────────────────────────────────────

#[derive(Debug, Default)]
struct SessionSlot {
    generation: u32,
    live: bool,
    resumed: bool,
    viewer_switches: u32,
}

/// In-process engine backed by a slot arena.
///
/// Handle layout: high 32 bits generation, low 32 bits slot index + 1.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    slots: Vec<SessionSlot>,
    calls: Vec<EngineCall>,
    stale_calls: u32,
    fail_next_create: Option<String>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made against this engine, in order.
    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// Calls that arrived with a handle that was not live.
    pub fn stale_calls(&self) -> u32 {
        self.stale_calls
    }

    pub fn live_sessions(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    pub fn is_live(&self, handle: SessionHandle) -> bool {
        self.slot(handle).is_some()
    }

    pub fn is_resumed(&self, handle: SessionHandle) -> bool {
        self.slot(handle).map(|s| s.resumed).unwrap_or(false)
    }

    pub fn viewer_switches(&self, handle: SessionHandle) -> u32 {
        self.slot(handle).map(|s| s.viewer_switches).unwrap_or(0)
    }

    /// Make the next `create` fail with `reason`.
    pub fn fail_next_create(&mut self, reason: impl Into<String>) {
        self.fail_next_create = Some(reason.into());
    }

    fn encode(index: usize, generation: u32) -> Option<SessionHandle> {
        let low = u64::try_from(index).ok()?.checked_add(1)?;
        if low > u64::from(u32::MAX) {
            return None;
        }
        SessionHandle::from_raw((u64::from(generation) << 32) | low)
    }

    fn decode(handle: SessionHandle) -> (usize, u32) {
        let raw = handle.raw();
        let index = ((raw & u64::from(u32::MAX)) as usize).wrapping_sub(1);
        (index, (raw >> 32) as u32)
    }

    fn slot(&self, handle: SessionHandle) -> Option<&SessionSlot> {
        let (index, generation) = Self::decode(handle);
        self.slots
            .get(index)
            .filter(|s| s.live && s.generation == generation)
    }

    fn slot_mut(&mut self, handle: SessionHandle, op: &'static str) -> Option<&mut SessionSlot> {
        let (index, generation) = Self::decode(handle);
        match self.slots.get_mut(index) {
            Some(slot) if slot.live && slot.generation == generation => Some(slot),
            _ => {
                warn!(handle = handle.raw(), op, "engine: call on stale session handle");
                self.stale_calls += 1;
                None
            }
        }
    }
}

impl NativeEngine for HeadlessEngine {
    fn create(&mut self, assets: &dyn AssetSource) -> Result<SessionHandle, EngineError> {
        if let Some(reason) = self.fail_next_create.take() {
            return Err(EngineError::CreateFailed(reason));
        }

        let index = match self.slots.iter().position(|s| !s.live) {
            Some(i) => i,
            None => {
                self.slots.push(SessionSlot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let handle = Self::encode(index, generation).ok_or_else(|| {
            EngineError::CreateFailed(format!("session table exhausted at slot {index}"))
        })?;

        let slot = &mut self.slots[index];
        slot.live = true;
        slot.resumed = false;
        slot.viewer_switches = 0;
        self.calls.push(EngineCall::Create(handle));
        info!(
            handle = handle.raw(),
            assets = %assets.label(),
            "engine: session created"
        );
        Ok(handle)
    }

    fn resume(&mut self, handle: SessionHandle) {
        self.calls.push(EngineCall::Resume(handle));
        if let Some(slot) = self.slot_mut(handle, "resume") {
            slot.resumed = true;
            debug!(handle = handle.raw(), "engine: resumed");
        }
    }

    fn pause(&mut self, handle: SessionHandle) {
        self.calls.push(EngineCall::Pause(handle));
        if let Some(slot) = self.slot_mut(handle, "pause") {
            slot.resumed = false;
            debug!(handle = handle.raw(), "engine: paused");
        }
    }

    fn destroy(&mut self, handle: SessionHandle) {
        self.calls.push(EngineCall::Destroy(handle));
        if let Some(slot) = self.slot_mut(handle, "destroy") {
            slot.live = false;
            slot.resumed = false;
            info!(handle = handle.raw(), "engine: session destroyed");
        }
    }

    fn switch_viewer(&mut self, handle: SessionHandle) {
        self.calls.push(EngineCall::SwitchViewer(handle));
        if let Some(slot) = self.slot_mut(handle, "switch-viewer") {
            slot.viewer_switches += 1;
            info!(handle = handle.raw(), "engine: switching viewer configuration");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryAssets;

    fn h(raw: u64) -> SessionHandle {
        SessionHandle::from_raw(raw).unwrap()
    }

    #[test]
    fn test_null_handle_is_none() {
        assert!(SessionHandle::from_raw(0).is_none());
        assert_eq!(h(7).raw(), 7);
    }

    #[test]
    fn test_create_destroy_invalidates() {
        let mut engine = HeadlessEngine::new();
        let handle = engine.create(&MemoryAssets::new()).unwrap();
        assert!(engine.is_live(handle));
        assert_eq!(engine.live_sessions(), 1);

        engine.destroy(handle);
        assert!(!engine.is_live(handle));
        assert_eq!(engine.live_sessions(), 0);
        assert_eq!(engine.stale_calls(), 0);
    }

    #[test]
    fn test_handles_never_reused() {
        let mut engine = HeadlessEngine::new();
        let first = engine.create(&MemoryAssets::new()).unwrap();
        engine.destroy(first);
        let second = engine.create(&MemoryAssets::new()).unwrap();
        assert_ne!(first, second);
        assert!(!engine.is_live(first));
        assert!(engine.is_live(second));
    }

    #[test]
    fn test_stale_handle_detected() {
        let mut engine = HeadlessEngine::new();
        let handle = engine.create(&MemoryAssets::new()).unwrap();
        engine.destroy(handle);
        engine.resume(handle);
        engine.destroy(handle);
        assert_eq!(engine.stale_calls(), 2);
    }

    #[test]
    fn test_resume_pause_tracking() {
        let mut engine = HeadlessEngine::new();
        let handle = engine.create(&MemoryAssets::new()).unwrap();
        engine.resume(handle);
        assert!(engine.is_resumed(handle));
        engine.pause(handle);
        assert!(!engine.is_resumed(handle));
        engine.switch_viewer(handle);
        assert_eq!(engine.viewer_switches(handle), 1);
    }

    #[test]
    fn test_fail_next_create() {
        let mut engine = HeadlessEngine::new();
        engine.fail_next_create("no GL context");
        assert!(engine.create(&MemoryAssets::new()).is_err());
        assert!(engine.calls().is_empty());
        assert!(engine.create(&MemoryAssets::new()).is_ok());
    }

    #[test]
    fn test_lifecycle_prefix_accepts() {
        let a = h(1);
        assert!(is_lifecycle_prefix(&[]));
        assert!(is_lifecycle_prefix(&[EngineCall::Create(a)]));
        assert!(is_lifecycle_prefix(&[
            EngineCall::Create(a),
            EngineCall::Resume(a),
            EngineCall::SwitchViewer(a),
            EngineCall::Pause(a),
            EngineCall::Resume(a),
            EngineCall::Destroy(a),
        ]));
        assert!(is_lifecycle_prefix(&[EngineCall::Create(a), EngineCall::Destroy(a)]));
    }

    #[test]
    fn test_lifecycle_prefix_rejects() {
        let a = h(1);
        let b = h(2);
        assert!(!is_lifecycle_prefix(&[EngineCall::Resume(a)]));
        assert!(!is_lifecycle_prefix(&[EngineCall::Create(a), EngineCall::Pause(a)]));
        assert!(!is_lifecycle_prefix(&[
            EngineCall::Create(a),
            EngineCall::Resume(a),
            EngineCall::Resume(a),
        ]));
        assert!(!is_lifecycle_prefix(&[
            EngineCall::Create(a),
            EngineCall::Destroy(a),
            EngineCall::Destroy(a),
        ]));
        assert!(!is_lifecycle_prefix(&[
            EngineCall::Create(a),
            EngineCall::Destroy(a),
            EngineCall::SwitchViewer(a),
        ]));
        assert!(!is_lifecycle_prefix(&[EngineCall::Create(a), EngineCall::Resume(b)]));
        // a resumed session is paused before it is destroyed
        assert!(!is_lifecycle_prefix(&[
            EngineCall::Create(a),
            EngineCall::Resume(a),
            EngineCall::Destroy(a),
        ]));
    }

    #[test]
    fn test_call_log_sexp() {
        let a = h(1);
        let s = call_log_sexp(&[EngineCall::Create(a), EngineCall::Resume(a)]);
        assert_eq!(s, "(create resume)");
    }
}
