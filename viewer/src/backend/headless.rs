//! Headless backend: runs the viewer without a device runtime.
//!
//! Host events are queued on a calloop channel and dispatched one at a
//! time on the loop thread, so the session bridge never sees concurrent
//! callbacks. The engine, surface, display and permission host are the
//! in-process implementations. When no script is given, permission prompts
//! are answered from the configured preset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::channel::{self, Sender};
use calloop::EventLoop;
use tracing::{error, info, warn};

use crate::activity::{HostEvent, LogNotifier, ViewerActivity};
use crate::config::ViewerConfig;
use crate::immersion::HeadlessDisplay;
use crate::loader::{AssetDir, PanoramaLoader};
use crate::permission::{HeadlessPermissions, PermissionGate};
use crate::script::ScriptedEvent;
use crate::session::{
    call_log_sexp, is_lifecycle_prefix, EngineCall, HeadlessEngine, LifecycleError,
    LifecycleState, SessionBridge,
};
use crate::surface::HeadlessSurface;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub type HeadlessActivity = ViewerActivity<
    HeadlessEngine,
    HeadlessSurface,
    HeadlessPermissions,
    AssetDir,
    HeadlessDisplay,
    LogNotifier,
>;

/// Loop-owned state.
pub struct HeadlessState {
    pub activity: HeadlessActivity,
    /// Events sent but not yet dispatched.
    pub pending: usize,
    pub dispatched: u64,
    pub misuse: u64,
    pub auto_answer: bool,
}

impl HeadlessState {
    pub fn new(activity: HeadlessActivity, auto_answer: bool) -> Self {
        Self {
            activity,
            pending: 0,
            dispatched: 0,
            misuse: 0,
            auto_answer,
        }
    }

    /// Dispatch one event. Permission results first update the simulated
    /// host, as the user's answer would, unless the step overrides it.
    pub fn dispatch(&mut self, step: ScriptedEvent) -> Option<ScriptedEvent> {
        let ScriptedEvent {
            event,
            host_granted,
        } = step;
        let callback_granted = match event {
            HostEvent::PermissionResult { granted, .. } => Some(granted),
            _ => None,
        };
        if let Some(granted) = host_granted.or(callback_granted) {
            self.activity
                .bridge_mut()
                .gate_mut()
                .host_mut()
                .set_granted(granted);
        }

        let name = event.as_str();
        match self.activity.handle_event(event) {
            Ok(()) => {}
            Err(e @ LifecycleError::InvalidTransition { .. }) => {
                warn!(event = name, error = %e, "host event rejected");
                self.misuse += 1;
            }
            Err(e) => error!(event = name, error = %e, "host event failed"),
        }
        self.dispatched += 1;

        let gate = self.activity.bridge().gate();
        if self.auto_answer && gate.is_request_outstanding() {
            let (granted, can_ask_again) = gate.host().prompt_answer();
            info!(granted, can_ask_again, "simulated user answers permission prompt");
            return Some(
                HostEvent::PermissionResult {
                    granted,
                    can_ask_again,
                }
                .into(),
            );
        }
        None
    }
}

/// Final state of a headless run.
#[derive(Debug)]
pub struct HeadlessReport {
    pub status: String,
    pub calls: Vec<EngineCall>,
    pub order_ok: bool,
    pub dispatched: u64,
    pub misuse: u64,
    pub notifications: Vec<String>,
}

/// Build the in-process activity for `config`.
pub fn build_activity(config: &ViewerConfig) -> HeadlessActivity {
    let bridge = SessionBridge::new(
        HeadlessEngine::new(),
        HeadlessSurface::new(),
        PermissionGate::new(HeadlessPermissions::from_preset(config.permission)),
    );
    ViewerActivity::new(
        bridge,
        PanoramaLoader::new(AssetDir::new(&config.asset_root)),
        HeadlessDisplay::new(),
        LogNotifier::default(),
        config.clone(),
    )
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn send(sender: &Sender<ScriptedEvent>, state: &mut HeadlessState, step: ScriptedEvent) {
    let name = step.event.as_str();
    match sender.send(step) {
        Ok(()) => state.pending += 1,
        Err(e) => error!(event = name, error = %e, "host event channel closed"),
    }
}

/// Run `events` through a headless viewer.
///
/// `auto_answer` answers permission prompts from the configured preset.
pub fn run<I>(config: ViewerConfig, events: I, auto_answer: bool) -> anyhow::Result<HeadlessReport>
where
    I: IntoIterator,
    I::Item: Into<ScriptedEvent>,
{
    let mut event_loop = EventLoop::<HeadlessState>::try_new()?;
    let mut state = HeadlessState::new(build_activity(&config), auto_answer);

    let (sender, receiver) = channel::channel::<ScriptedEvent>();
    let answer_sender = sender.clone();
    event_loop
        .handle()
        .insert_source(receiver, move |event, _, state: &mut HeadlessState| {
            if let channel::Event::Msg(step) = event {
                state.pending = state.pending.saturating_sub(1);
                if let Some(answer) = state.dispatch(step) {
                    send(&answer_sender, state, answer);
                }
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to register host event channel: {}", e.error))?;

    for event in events {
        send(&sender, &mut state, event.into());
    }
    info!(queued = state.pending, "host events queued");

    install_signal_handlers();

    let start_time = Instant::now();
    let exit_duration = config.exit_after.map(Duration::from_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    while state.pending > 0 {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            break;
        }
        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Headless exit timer fired after {}s", dur.as_secs());
                break;
            }
        }
        event_loop.dispatch(Some(poll_interval), &mut state)?;
    }

    if state.activity.bridge().state() != LifecycleState::Destroyed {
        info!("tearing down live session");
        state.activity.finish();
    }

    let calls = state.activity.bridge().engine().calls().to_vec();
    let order_ok = is_lifecycle_prefix(&calls);
    if !order_ok {
        error!(calls = %call_log_sexp(&calls), "engine observed an invalid call order");
    }
    let status = format!(
        "(:type :status :activity {} :surface {} :engine-calls {} :order-ok {} :events {} :rejected {})",
        state.activity.status_sexp(),
        state.activity.bridge().surface().status_sexp(),
        call_log_sexp(&calls),
        if order_ok { "t" } else { "nil" },
        state.dispatched,
        state.misuse,
    );
    info!(
        dispatched = state.dispatched,
        rejected = state.misuse,
        "Headless backend shutting down"
    );

    Ok(HeadlessReport {
        status,
        calls,
        order_ok,
        dispatched: state.dispatched,
        misuse: state.misuse,
        notifications: state.activity.notifier().messages.clone(),
    })
}
