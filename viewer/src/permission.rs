//! Permission gate: storage-read access required before a session resumes.
//!
//! The host owns the authorization state; the gate only queries it, keeps at
//! most one request outstanding, and classifies results:
//! - granted: resume may proceed
//! - denied: resume stays blocked, the user may be asked again
//! - permanently denied: the host will not prompt again, the session ends

use tracing::{debug, info, warn};

/// The single capability the viewer needs.
pub const READ_EXTERNAL_STORAGE: &str = "android.permission.READ_EXTERNAL_STORAGE";

/// Request code attached to permission requests.
pub const PERMISSIONS_REQUEST_CODE: i32 = 2;

/// Host authorization subsystem.
pub trait PermissionHost {
    fn check_self_permission(&self, permission: &str) -> bool;
    fn request_permissions(&mut self, permissions: &[&str], request_code: i32);
    /// Open the system settings screen addressed by `deep_link`.
    fn open_settings(&mut self, deep_link: &str);
}

/// Outcome of a permission result callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionVerdict {
    Granted,
    Denied,
    PermanentlyDenied,
}

impl PermissionVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::PermanentlyDenied => "permanently-denied",
        }
    }
}

/// Settings deep link for the application with `package_id`.
pub fn settings_deep_link(package_id: &str) -> String {
    format!("package:{package_id}")
}

/// Gate over the host's storage-read authorization.
#[derive(Debug)]
pub struct PermissionGate<H> {
    host: H,
    outstanding: bool,
    requests_issued: u32,
}

impl<H: PermissionHost> PermissionGate<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            outstanding: false,
            requests_issued: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Whether storage-read access is currently granted.
    pub fn is_granted(&self) -> bool {
        self.host.check_self_permission(READ_EXTERNAL_STORAGE)
    }

    pub fn is_request_outstanding(&self) -> bool {
        self.outstanding
    }

    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }

    /// Ask the host for access. Returns false if a request is already
    /// outstanding and nothing was issued.
    pub fn request(&mut self) -> bool {
        if self.outstanding {
            debug!("permission request already outstanding");
            return false;
        }
        self.outstanding = true;
        self.requests_issued += 1;
        info!(
            permission = READ_EXTERNAL_STORAGE,
            request_code = PERMISSIONS_REQUEST_CODE,
            "requesting permission"
        );
        self.host
            .request_permissions(&[READ_EXTERNAL_STORAGE], PERMISSIONS_REQUEST_CODE);
        true
    }

    /// Classify a permission result. The host state is re-read and is
    /// authoritative over the callback's `granted` flag.
    pub fn on_result(&mut self, granted: bool, can_ask_again: bool) -> PermissionVerdict {
        self.outstanding = false;
        let host_granted = self.is_granted();
        if granted != host_granted {
            warn!(granted, host_granted, "permission result disagrees with host state");
        }

        let verdict = if host_granted {
            PermissionVerdict::Granted
        } else if can_ask_again {
            PermissionVerdict::Denied
        } else {
            PermissionVerdict::PermanentlyDenied
        };
        info!(verdict = verdict.as_str(), "permission result");
        verdict
    }

    /// Send the user to this application's settings page.
    pub fn open_app_settings(&mut self, package_id: &str) {
        let link = settings_deep_link(package_id);
        info!(link = %link, "opening application settings");
        self.host.open_settings(&link);
    }
}

// ── Simulated host ───────────────────────────────────────────

/// How a simulated user answers permission prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPreset {
    Granted,
    Denied,
    NeverAsk,
}

impl PermissionPreset {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "never-ask" => Some(Self::NeverAsk),
            _ => None,
        }
    }
}

/// In-process permission host. Records requests and settings launches.
#[derive(Debug)]
pub struct HeadlessPermissions {
    granted: bool,
    preset: PermissionPreset,
    pub requests: Vec<i32>,
    pub opened_settings: Vec<String>,
}

impl HeadlessPermissions {
    pub fn new(granted: bool) -> Self {
        let preset = if granted {
            PermissionPreset::Granted
        } else {
            PermissionPreset::Denied
        };
        Self {
            granted,
            preset,
            requests: Vec::new(),
            opened_settings: Vec::new(),
        }
    }

    pub fn from_preset(preset: PermissionPreset) -> Self {
        let mut host = Self::new(preset == PermissionPreset::Granted);
        host.preset = preset;
        host
    }

    /// The `(granted, can_ask_again)` pair a user with this preset answers
    /// a prompt with.
    pub fn prompt_answer(&self) -> (bool, bool) {
        match self.preset {
            PermissionPreset::Granted => (true, true),
            PermissionPreset::Denied => (false, true),
            PermissionPreset::NeverAsk => (false, false),
        }
    }

    /// Change the authorization state, as the user would from a prompt.
    pub fn set_granted(&mut self, granted: bool) {
        self.granted = granted;
    }
}

impl PermissionHost for HeadlessPermissions {
    fn check_self_permission(&self, permission: &str) -> bool {
        permission == READ_EXTERNAL_STORAGE && self.granted
    }

    fn request_permissions(&mut self, _permissions: &[&str], request_code: i32) {
        self.requests.push(request_code);
    }

    fn open_settings(&mut self, deep_link: &str) {
        self.opened_settings.push(deep_link.to_string());
    }
}
