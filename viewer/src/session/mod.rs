//! Session lifecycle bridge: owns the native session handle.
//!
//! Host lifecycle callbacks map 1:1 onto guarded transitions:
//! Uncreated -> Created -> Resumed <-> Paused -> Destroyed
//!
//! The engine only ever observes a prefix of
//! `create, (resume, pause)*, destroy`. Resume is gated by the permission
//! gate; a denied resume is remembered as pending and re-driven when a
//! granted result arrives while the host is still in the foreground.

pub mod engine;

pub use engine::{
    call_log_sexp, is_lifecycle_prefix, EngineCall, EngineError, HeadlessEngine, NativeEngine,
    SessionHandle,
};

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::loader::{AssetSource, LoadFailure, PanoramaLoader, PanoramaRequest, ProjectionMode};
use crate::permission::{PermissionGate, PermissionHost, PermissionVerdict};
use crate::surface::RenderSurface;

/// Lifecycle state of the native session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uncreated,
    Created,
    Resumed,
    Paused,
    Destroyed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncreated => "uncreated",
            Self::Created => "created",
            Self::Resumed => "resumed",
            Self::Paused => "paused",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle callback arrived outside its precondition, or the engine
/// refused to create a session.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{op} is not valid in state {state}")]
    InvalidTransition {
        op: &'static str,
        state: LifecycleState,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of activation. The session exists either way; only the panorama
/// may be missing.
#[derive(Debug)]
pub enum ActivationOutcome {
    Loaded {
        width: u32,
        height: u32,
        mode: ProjectionMode,
    },
    LoadFailed(LoadFailure),
}

/// Result of a foreground drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundOutcome {
    Resumed,
    /// Permission missing; a request was issued.
    PermissionRequested,
    /// Permission missing; a request is already outstanding.
    AwaitingPermission,
}

/// Result of a permission callback, as seen by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Granted and a pending resume was carried out.
    Resumed,
    /// Granted with nothing pending; the next foreground drive resumes.
    Granted,
    Denied,
    /// The caller must open settings and end the session.
    PermanentlyDenied,
}

/// Owns one native session and keeps it in lockstep with the host.
pub struct SessionBridge<E, S, P> {
    engine: E,
    surface: S,
    gate: PermissionGate<P>,
    handle: Option<SessionHandle>,
    state: LifecycleState,
    resume_pending: bool,
    activated: bool,
}

impl<E, S, P> SessionBridge<E, S, P>
where
    E: NativeEngine,
    S: RenderSurface,
    P: PermissionHost,
{
    pub fn new(engine: E, surface: S, gate: PermissionGate<P>) -> Self {
        Self {
            engine,
            surface,
            gate,
            handle: None,
            state: LifecycleState::Uncreated,
            resume_pending: false,
            activated: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    /// Foreground was requested but is blocked on permission.
    pub fn is_resume_pending(&self) -> bool {
        self.resume_pending
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn gate(&self) -> &PermissionGate<P> {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut PermissionGate<P> {
        &mut self.gate
    }

    fn misuse(&self, op: &'static str) -> LifecycleError {
        warn!(op, state = %self.state, "lifecycle callback outside its precondition");
        LifecycleError::InvalidTransition {
            op,
            state: self.state,
        }
    }

    /// Create the native session and show the requested panorama.
    pub fn on_activate<A: AssetSource>(
        &mut self,
        loader: &PanoramaLoader<A>,
        request: &PanoramaRequest,
    ) -> Result<ActivationOutcome, LifecycleError> {
        if self.state != LifecycleState::Uncreated || self.activated {
            return Err(self.misuse("activate"));
        }
        self.activated = true;

        let handle = self.engine.create(loader.assets())?;
        self.handle = Some(handle);
        self.state = LifecycleState::Created;
        info!(handle = handle.raw(), "session created");

        // Decode before the first resume so frames never precede the image.
        let outcome = match loader.load_request(request) {
            Ok(panorama) => {
                self.surface.load_image(&panorama);
                ActivationOutcome::Loaded {
                    width: panorama.width(),
                    height: panorama.height(),
                    mode: panorama.mode,
                }
            }
            Err(e) => {
                error!(error = %e, "panorama load failed, surface left unchanged");
                ActivationOutcome::LoadFailed(e)
            }
        };
        Ok(outcome)
    }

    /// Host entered the foreground. Resumes only with permission.
    pub fn on_foreground(&mut self) -> Result<ForegroundOutcome, LifecycleError> {
        let handle = match (self.state, self.handle) {
            (LifecycleState::Created | LifecycleState::Paused, Some(h)) => h,
            _ => return Err(self.misuse("foreground")),
        };

        if !self.gate.is_granted() {
            self.resume_pending = true;
            let outcome = if self.gate.request() {
                ForegroundOutcome::PermissionRequested
            } else {
                ForegroundOutcome::AwaitingPermission
            };
            info!(state = %self.state, "resume deferred until permission is granted");
            return Ok(outcome);
        }

        self.resume_pending = false;
        self.surface.resume_rendering();
        self.engine.resume(handle);
        self.state = LifecycleState::Resumed;
        info!(handle = handle.raw(), "session resumed");
        Ok(ForegroundOutcome::Resumed)
    }

    /// Host left the foreground. Returns whether the engine was paused;
    /// before any successful resume this is a no-op.
    pub fn on_background(&mut self) -> Result<bool, LifecycleError> {
        self.resume_pending = false;
        match (self.state, self.handle) {
            (LifecycleState::Resumed, Some(handle)) => {
                self.engine.pause(handle);
                self.surface.pause_rendering();
                self.state = LifecycleState::Paused;
                info!(handle = handle.raw(), "session paused");
                Ok(true)
            }
            (LifecycleState::Created | LifecycleState::Paused, Some(_)) => {
                debug!(state = %self.state, "background without active resume, nothing to pause");
                Ok(false)
            }
            _ => Err(self.misuse("background")),
        }
    }

    /// Host is tearing down. Returns whether this call destroyed anything;
    /// a second call is a no-op. A resumed session is paused first.
    pub fn on_deactivate(&mut self) -> bool {
        if self.state == LifecycleState::Destroyed {
            debug!("deactivate on destroyed session ignored");
            return false;
        }

        if let (LifecycleState::Resumed, Some(handle)) = (self.state, self.handle) {
            self.engine.pause(handle);
            self.surface.pause_rendering();
            self.state = LifecycleState::Paused;
            info!(handle = handle.raw(), "session paused before teardown");
        }

        self.surface.shutdown();
        if let Some(handle) = self.handle.take() {
            self.engine.destroy(handle);
            info!(handle = handle.raw(), "session destroyed");
        }
        self.state = LifecycleState::Destroyed;
        self.resume_pending = false;
        true
    }

    /// Forward a "switch viewer" command to the engine.
    pub fn on_switch_viewer_requested(&mut self) -> Result<(), LifecycleError> {
        match self.handle {
            Some(handle) => {
                self.engine.switch_viewer(handle);
                Ok(())
            }
            None => Err(self.misuse("switch-viewer")),
        }
    }

    /// A permission result arrived. Re-drives a pending resume on grant.
    pub fn on_permission_result(
        &mut self,
        granted: bool,
        can_ask_again: bool,
    ) -> Result<PermissionOutcome, LifecycleError> {
        match self.gate.on_result(granted, can_ask_again) {
            PermissionVerdict::Granted => {
                let waiting = matches!(
                    self.state,
                    LifecycleState::Created | LifecycleState::Paused
                );
                if self.resume_pending && waiting {
                    match self.on_foreground()? {
                        ForegroundOutcome::Resumed => Ok(PermissionOutcome::Resumed),
                        _ => Ok(PermissionOutcome::Granted),
                    }
                } else {
                    Ok(PermissionOutcome::Granted)
                }
            }
            PermissionVerdict::Denied => Ok(PermissionOutcome::Denied),
            PermissionVerdict::PermanentlyDenied => {
                self.resume_pending = false;
                Ok(PermissionOutcome::PermanentlyDenied)
            }
        }
    }

    /// Format bridge state as an s-expression for status reporting.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:state :{} :handle {} :resume-pending {} :permission {})",
            self.state.as_str(),
            self.handle
                .map(|h| h.raw().to_string())
                .unwrap_or_else(|| "nil".to_string()),
            if self.resume_pending { "t" } else { "nil" },
            if self.gate.is_granted() { "t" } else { "nil" },
        )
    }
}

// ── Tests ────────────────────────────────────────────────────
