//! Display immersion: sticky full-screen, maximum brightness, no auto-dim.
//!
//! Immersion is self-healing: whenever the host reports that system chrome
//! came back (fullscreen flag cleared) or that input focus was regained, the
//! full immersive state is asserted again.

use tracing::{debug, info};

/// System UI visibility flags understood by the host window.
pub mod ui_flags {
    pub const HIDE_NAVIGATION: u32 = 0x0000_0002;
    pub const FULLSCREEN: u32 = 0x0000_0004;
    pub const LAYOUT_STABLE: u32 = 0x0000_0100;
    pub const LAYOUT_HIDE_NAVIGATION: u32 = 0x0000_0200;
    pub const LAYOUT_FULLSCREEN: u32 = 0x0000_0400;
    pub const IMMERSIVE_STICKY: u32 = 0x0000_1000;
}

/// Edge-to-edge, chrome-hidden, sticky immersive mode.
pub const IMMERSIVE_STICKY_FLAGS: u32 = ui_flags::LAYOUT_STABLE
    | ui_flags::LAYOUT_HIDE_NAVIGATION
    | ui_flags::LAYOUT_FULLSCREEN
    | ui_flags::HIDE_NAVIGATION
    | ui_flags::FULLSCREEN
    | ui_flags::IMMERSIVE_STICKY;

pub const MAX_BRIGHTNESS: f32 = 1.0;

/// Host window controls.
pub trait DisplayHost {
    fn set_system_ui_visibility(&mut self, flags: u32);
    fn set_screen_brightness(&mut self, level: f32);
    fn set_keep_screen_on(&mut self, keep_on: bool);
}

/// Why immersion was (re)asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmersionTrigger {
    Activation,
    ChromeRevealed,
    FocusRegained,
}

impl ImmersionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::ChromeRevealed => "chrome-revealed",
            Self::FocusRegained => "focus-regained",
        }
    }
}

#[derive(Debug, Default)]
pub struct ImmersionController {
    assertions: u64,
    last_trigger: Option<ImmersionTrigger>,
}

impl ImmersionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assertions(&self) -> u64 {
        self.assertions
    }

    pub fn last_trigger(&self) -> Option<ImmersionTrigger> {
        self.last_trigger
    }

    /// Apply the full immersive display state. Idempotent.
    pub fn assert_immersive(&mut self, display: &mut dyn DisplayHost, trigger: ImmersionTrigger) {
        display.set_system_ui_visibility(IMMERSIVE_STICKY_FLAGS);
        display.set_screen_brightness(MAX_BRIGHTNESS);
        display.set_keep_screen_on(true);
        self.assertions += 1;
        self.last_trigger = Some(trigger);
        info!(
            trigger = trigger.as_str(),
            count = self.assertions,
            "immersive display asserted"
        );
    }

    /// Host reported a system UI visibility change. Reasserts if the
    /// fullscreen flag was cleared. Returns whether it reasserted.
    pub fn on_system_ui_visibility_change(
        &mut self,
        visibility: u32,
        display: &mut dyn DisplayHost,
    ) -> bool {
        if visibility & ui_flags::FULLSCREEN == 0 {
            self.assert_immersive(display, ImmersionTrigger::ChromeRevealed);
            true
        } else {
            debug!(visibility, "system UI still fullscreen");
            false
        }
    }

    /// Host reported an input focus change. Reasserts on focus gain.
    pub fn on_focus_changed(&mut self, has_focus: bool, display: &mut dyn DisplayHost) -> bool {
        if has_focus {
            self.assert_immersive(display, ImmersionTrigger::FocusRegained);
        }
        has_focus
    }
}

// ── Simulated display ────────────────────────────────────────

/// In-process display that records the state applied to it.
#[derive(Debug, Clone)]
pub struct HeadlessDisplay {
    pub visibility: u32,
    pub brightness: f32,
    pub keep_screen_on: bool,
    pub applied: u32,
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self {
            visibility: 0,
            brightness: 0.5,
            keep_screen_on: false,
            applied: 0,
        }
    }
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_immersive(&self) -> bool {
        self.visibility == IMMERSIVE_STICKY_FLAGS
            && self.brightness == MAX_BRIGHTNESS
            && self.keep_screen_on
    }

    /// Simulate a transient system gesture that reveals the chrome.
    /// Returns the visibility the host would report.
    pub fn reveal_chrome(&mut self) -> u32 {
        self.visibility &= !(ui_flags::FULLSCREEN | ui_flags::HIDE_NAVIGATION);
        self.visibility
    }
}

impl DisplayHost for HeadlessDisplay {
    fn set_system_ui_visibility(&mut self, flags: u32) {
        self.visibility = flags;
        self.applied += 1;
    }

    fn set_screen_brightness(&mut self, level: f32) {
        self.brightness = level;
    }

    fn set_keep_screen_on(&mut self, keep_on: bool) {
        self.keep_screen_on = keep_on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_immersive() {
        let mut ctl = ImmersionController::new();
        let mut display = HeadlessDisplay::new();
        assert!(!display.is_immersive());
        ctl.assert_immersive(&mut display, ImmersionTrigger::Activation);
        assert!(display.is_immersive());
        assert_eq!(ctl.assertions(), 1);
    }

    #[test]
    fn test_assert_is_idempotent() {
        let mut ctl = ImmersionController::new();
        let mut display = HeadlessDisplay::new();
        ctl.assert_immersive(&mut display, ImmersionTrigger::Activation);
        let first = display.clone();
        ctl.assert_immersive(&mut display, ImmersionTrigger::Activation);
        assert_eq!(display.visibility, first.visibility);
        assert_eq!(display.brightness, first.brightness);
        assert_eq!(display.keep_screen_on, first.keep_screen_on);
    }

    #[test]
    fn test_self_healing_after_chrome_reveal_and_focus() {
        let mut ctl = ImmersionController::new();
        let mut display = HeadlessDisplay::new();
        ctl.assert_immersive(&mut display, ImmersionTrigger::Activation);

        let vis = display.reveal_chrome();
        assert!(!display.is_immersive());
        assert!(ctl.on_system_ui_visibility_change(vis, &mut display));
        assert!(display.is_immersive());
        assert_eq!(ctl.last_trigger(), Some(ImmersionTrigger::ChromeRevealed));

        assert!(ctl.on_focus_changed(true, &mut display));
        assert!(display.is_immersive());
        assert_eq!(ctl.assertions(), 3);
        assert_eq!(ctl.last_trigger(), Some(ImmersionTrigger::FocusRegained));
    }

    #[test]
    fn test_fullscreen_visibility_ignored() {
        let mut ctl = ImmersionController::new();
        let mut display = HeadlessDisplay::new();
        assert!(!ctl.on_system_ui_visibility_change(IMMERSIVE_STICKY_FLAGS, &mut display));
        assert_eq!(ctl.assertions(), 0);
    }

    #[test]
    fn test_focus_loss_ignored() {
        let mut ctl = ImmersionController::new();
        let mut display = HeadlessDisplay::new();
        assert!(!ctl.on_focus_changed(false, &mut display));
        assert_eq!(ctl.assertions(), 0);
        assert_eq!(display.applied, 0);
    }

    #[test]
    fn test_sticky_flag_values() {
        assert_eq!(IMMERSIVE_STICKY_FLAGS, 0x1706);
    }
}
