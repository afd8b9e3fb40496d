//! Viewer activity: wires the session bridge to the rest of the host.
//!
//! Host events arrive here one at a time. The activity owns the bridge, the
//! panorama loader, the immersion controller and the notifier, and turns
//! permission verdicts into user-visible outcomes (notification, settings
//! deep link, finishing the session).

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::config::ViewerConfig;
use crate::immersion::{DisplayHost, ImmersionController, ImmersionTrigger};
use crate::loader::{AssetSource, PanoramaLoader, PanoramaRequest};
use crate::permission::PermissionHost;
use crate::session::{
    ActivationOutcome, LifecycleError, NativeEngine, PermissionOutcome, SessionBridge,
};
use crate::surface::RenderSurface;

/// Intent extra naming the panorama asset to show.
pub const FILE_NAME_EXTRA: &str = "fileName";

pub const NO_PERMISSIONS_MESSAGE: &str = "Storage permission is required to show panoramas";

pub const ENGINE_UNAVAILABLE_MESSAGE: &str = "VR session could not be started";

/// Activation request from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationIntent {
    extras: HashMap<String, String>,
}

impl ActivationIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        let mut intent = Self::new();
        intent.put_extra(FILE_NAME_EXTRA, file_name);
        intent
    }

    pub fn put_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extras.insert(key.into(), value.into());
    }

    pub fn get_string_extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.get_string_extra(FILE_NAME_EXTRA)
    }
}

/// Host lifecycle signals, permission callbacks and user commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Activate(ActivationIntent),
    Foreground,
    Background,
    Deactivate,
    FocusChanged { has_focus: bool },
    SystemUiVisibility { visibility: u32 },
    PermissionResult { granted: bool, can_ask_again: bool },
    SwitchViewer,
    Close,
}

impl HostEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate(_) => "activate",
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::Deactivate => "deactivate",
            Self::FocusChanged { .. } => "focus",
            Self::SystemUiVisibility { .. } => "system-ui-visibility",
            Self::PermissionResult { .. } => "permission-result",
            Self::SwitchViewer => "switch-viewer",
            Self::Close => "close",
        }
    }
}

/// Single non-blocking channel for user-visible messages.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

/// Notifier that writes messages to the log and keeps them.
#[derive(Debug, Default)]
pub struct LogNotifier {
    pub messages: Vec<String>,
}

impl Notifier for LogNotifier {
    fn notify(&mut self, message: &str) {
        info!(message, "notify");
        self.messages.push(message.to_string());
    }
}

/// The single viewer window and everything it owns.
pub struct ViewerActivity<E, S, P, A, D, N> {
    bridge: SessionBridge<E, S, P>,
    loader: PanoramaLoader<A>,
    immersion: ImmersionController,
    display: D,
    notifier: N,
    config: ViewerConfig,
    finished: bool,
}

impl<E, S, P, A, D, N> ViewerActivity<E, S, P, A, D, N>
where
    E: NativeEngine,
    S: RenderSurface,
    P: PermissionHost,
    A: AssetSource,
    D: DisplayHost,
    N: Notifier,
{
    pub fn new(
        bridge: SessionBridge<E, S, P>,
        loader: PanoramaLoader<A>,
        display: D,
        notifier: N,
        config: ViewerConfig,
    ) -> Self {
        Self {
            bridge,
            loader,
            immersion: ImmersionController::new(),
            display,
            notifier,
            config,
            finished: false,
        }
    }

    pub fn bridge(&self) -> &SessionBridge<E, S, P> {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut SessionBridge<E, S, P> {
        &mut self.bridge
    }

    pub fn immersion(&self) -> &ImmersionController {
        &self.immersion
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Dispatch one host event. Lifecycle misuse is returned, not hidden.
    pub fn handle_event(&mut self, event: HostEvent) -> Result<(), LifecycleError> {
        if self.finished {
            debug!(event = event.as_str(), "activity finished, event ignored");
            return Ok(());
        }
        debug!(event = event.as_str(), "host event");

        match event {
            HostEvent::Activate(intent) => self.on_activate(&intent),
            HostEvent::Foreground => self.bridge.on_foreground().map(|_| ()),
            HostEvent::Background => self.bridge.on_background().map(|_| ()),
            HostEvent::Deactivate => {
                self.bridge.on_deactivate();
                Ok(())
            }
            HostEvent::FocusChanged { has_focus } => {
                self.immersion.on_focus_changed(has_focus, &mut self.display);
                Ok(())
            }
            HostEvent::SystemUiVisibility { visibility } => {
                self.immersion
                    .on_system_ui_visibility_change(visibility, &mut self.display);
                Ok(())
            }
            HostEvent::PermissionResult {
                granted,
                can_ask_again,
            } => self.on_permission_result(granted, can_ask_again),
            HostEvent::SwitchViewer => self.bridge.on_switch_viewer_requested(),
            HostEvent::Close => {
                info!("leaving VR mode");
                self.finish();
                Ok(())
            }
        }
    }

    fn on_activate(&mut self, intent: &ActivationIntent) -> Result<(), LifecycleError> {
        let reference = match intent.file_name() {
            Some(name) => name.to_string(),
            None => {
                warn!("activation intent carries no {FILE_NAME_EXTRA} extra");
                String::new()
            }
        };
        let request = PanoramaRequest::new(reference, self.config.projection_mode);

        let outcome = match self.bridge.on_activate(&self.loader, &request) {
            Ok(outcome) => outcome,
            Err(LifecycleError::Engine(e)) => {
                error!(error = %e, "native session could not be created, ending session");
                self.notifier.notify(ENGINE_UNAVAILABLE_MESSAGE);
                self.finish();
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if let ActivationOutcome::LoadFailed(e) = outcome {
            self.notifier
                .notify(&format!("Could not load panorama \"{}\"", e.reference));
        }
        self.immersion
            .assert_immersive(&mut self.display, ImmersionTrigger::Activation);
        Ok(())
    }

    fn on_permission_result(
        &mut self,
        granted: bool,
        can_ask_again: bool,
    ) -> Result<(), LifecycleError> {
        match self.bridge.on_permission_result(granted, can_ask_again)? {
            PermissionOutcome::Resumed | PermissionOutcome::Granted => {}
            PermissionOutcome::Denied => {
                self.notifier.notify(NO_PERMISSIONS_MESSAGE);
            }
            PermissionOutcome::PermanentlyDenied => {
                self.notifier.notify(NO_PERMISSIONS_MESSAGE);
                let package_id = self.config.package_id.clone();
                self.bridge.gate_mut().open_app_settings(&package_id);
                error!("storage permission permanently denied, ending session");
                self.finish();
            }
        }
        Ok(())
    }

    /// End the session; the bridge pauses a running session before
    /// destroying it. Later events are ignored.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.bridge.on_deactivate();
        self.finished = true;
        info!("activity finished");
    }

    /// Format activity state as an s-expression for status reporting.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:session {} :finished {} :immersion-assertions {})",
            self.bridge.status_sexp(),
            if self.finished { "t" } else { "nil" },
            self.immersion.assertions(),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immersion::HeadlessDisplay;
    use crate::loader::tests::sample_assets;
    use crate::loader::MemoryAssets;
    use crate::permission::{HeadlessPermissions, PermissionGate};
    use crate::session::{is_lifecycle_prefix, HeadlessEngine, LifecycleState};
    use crate::surface::HeadlessSurface;

    type Activity = ViewerActivity<
        HeadlessEngine,
        HeadlessSurface,
        HeadlessPermissions,
        MemoryAssets,
        HeadlessDisplay,
        LogNotifier,
    >;

    fn activity(granted: bool) -> Activity {
        let bridge = SessionBridge::new(
            HeadlessEngine::new(),
            HeadlessSurface::new(),
            PermissionGate::new(HeadlessPermissions::new(granted)),
        );
        ViewerActivity::new(
            bridge,
            PanoramaLoader::new(sample_assets()),
            HeadlessDisplay::new(),
            LogNotifier::default(),
            ViewerConfig::default(),
        )
    }

    fn calls(a: &Activity) -> Vec<&'static str> {
        a.bridge().engine().calls().iter().map(|c| c.as_str()).collect()
    }

    #[test]
    fn test_activate_shows_panorama_and_immerses() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        let shown = a.bridge().surface().shown().unwrap();
        assert_eq!(shown.reference, "sample.jpg");
        assert!(a.display().is_immersive());
        assert_eq!(a.immersion().assertions(), 1);
        assert!(a.notifier().messages.is_empty());
    }

    #[test]
    fn test_activate_missing_asset_notifies() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("missing.jpg")))
            .unwrap();
        assert!(a.bridge().surface().shown().is_none());
        assert_eq!(a.bridge().state(), LifecycleState::Created);
        assert_eq!(a.notifier().messages.len(), 1);
        assert!(a.notifier().messages[0].contains("missing.jpg"));
    }

    #[test]
    fn test_activate_without_file_name() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::new())).unwrap();
        assert_eq!(a.bridge().state(), LifecycleState::Created);
        assert_eq!(a.notifier().messages.len(), 1);
    }

    #[test]
    fn test_denial_notifies_and_keeps_session() {
        let mut a = activity(false);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        a.handle_event(HostEvent::Foreground).unwrap();
        a.handle_event(HostEvent::PermissionResult {
            granted: false,
            can_ask_again: true,
        })
        .unwrap();
        assert!(!a.is_finished());
        assert_eq!(a.notifier().messages, vec![NO_PERMISSIONS_MESSAGE.to_string()]);
        assert_eq!(calls(&a), vec!["create"]);
    }

    #[test]
    fn test_permanent_denial_finishes() {
        let mut a = activity(false);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        a.handle_event(HostEvent::Foreground).unwrap();
        a.handle_event(HostEvent::PermissionResult {
            granted: false,
            can_ask_again: false,
        })
        .unwrap();

        assert!(a.is_finished());
        assert_eq!(a.bridge().state(), LifecycleState::Destroyed);
        assert_eq!(
            a.bridge().gate().host().opened_settings,
            vec![format!("package:{}", ViewerConfig::default().package_id)]
        );
        assert_eq!(calls(&a), vec!["create", "destroy"]);

        // Host still delivers teardown callbacks; they are ignored.
        a.handle_event(HostEvent::Foreground).unwrap();
        a.handle_event(HostEvent::Deactivate).unwrap();
        assert_eq!(calls(&a), vec!["create", "destroy"]);
    }

    #[test]
    fn test_close_while_resumed() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        a.handle_event(HostEvent::Foreground).unwrap();
        a.handle_event(HostEvent::SwitchViewer).unwrap();
        a.handle_event(HostEvent::Close).unwrap();
        assert!(a.is_finished());
        assert_eq!(
            calls(&a),
            vec!["create", "resume", "switch-viewer", "pause", "destroy"]
        );
        assert!(is_lifecycle_prefix(a.bridge().engine().calls()));
    }

    #[test]
    fn test_deactivate_event_while_resumed() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        a.handle_event(HostEvent::Foreground).unwrap();
        a.handle_event(HostEvent::Deactivate).unwrap();
        assert_eq!(calls(&a), vec!["create", "resume", "pause", "destroy"]);
        assert!(is_lifecycle_prefix(a.bridge().engine().calls()));
    }

    #[test]
    fn test_engine_create_failure_notifies_and_finishes() {
        let mut engine = HeadlessEngine::new();
        engine.fail_next_create("no display");
        let bridge = SessionBridge::new(
            engine,
            HeadlessSurface::new(),
            PermissionGate::new(HeadlessPermissions::new(true)),
        );
        let mut a = ViewerActivity::new(
            bridge,
            PanoramaLoader::new(sample_assets()),
            HeadlessDisplay::new(),
            LogNotifier::default(),
            ViewerConfig::default(),
        );

        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        assert_eq!(
            a.notifier().messages,
            vec![ENGINE_UNAVAILABLE_MESSAGE.to_string()]
        );
        assert!(a.is_finished());
        assert_eq!(a.bridge().state(), LifecycleState::Destroyed);
        assert!(a.bridge().surface().shown().is_none());
        assert!(calls(&a).is_empty());

        // The host keeps delivering lifecycle callbacks; none reach the engine.
        a.handle_event(HostEvent::Foreground).unwrap();
        a.handle_event(HostEvent::Deactivate).unwrap();
        assert!(calls(&a).is_empty());
    }

    #[test]
    fn test_immersion_self_heals() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        let visibility = a.display_mut().reveal_chrome();
        assert!(!a.display().is_immersive());
        a.handle_event(HostEvent::SystemUiVisibility { visibility })
            .unwrap();
        assert!(a.display().is_immersive());
        a.handle_event(HostEvent::FocusChanged { has_focus: false })
            .unwrap();
        a.handle_event(HostEvent::FocusChanged { has_focus: true })
            .unwrap();
        assert_eq!(a.immersion().assertions(), 3);
    }

    #[test]
    fn test_misuse_surfaces_error() {
        let mut a = activity(true);
        assert!(a.handle_event(HostEvent::Foreground).is_err());
        assert!(a.handle_event(HostEvent::SwitchViewer).is_err());
    }

    #[test]
    fn test_status_sexp() {
        let mut a = activity(true);
        a.handle_event(HostEvent::Activate(ActivationIntent::with_file_name("sample.jpg")))
            .unwrap();
        let s = a.status_sexp();
        assert!(s.contains(":session (:state :created"));
        assert!(s.contains(":finished nil"));
        assert!(s.contains(":immersion-assertions 1"));
    }
}
