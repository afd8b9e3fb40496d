//! Render surface seam: where a decoded panorama is displayed.

use tracing::{debug, info};

use crate::loader::{DecodedPanorama, ProjectionMode};

/// Panorama display surface owned by the host view hierarchy.
pub trait RenderSurface {
    /// Upload a panorama. The surface keeps its own copy.
    fn load_image(&mut self, panorama: &DecodedPanorama);
    fn pause_rendering(&mut self);
    fn resume_rendering(&mut self);
    fn shutdown(&mut self);
}

/// Summary of what a surface is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownPanorama {
    pub reference: String,
    pub width: u32,
    pub height: u32,
    pub mode: ProjectionMode,
}

/// Surface that keeps the uploaded raster in memory and tracks render state.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    current: Option<DecodedPanorama>,
    rendering: bool,
    shut_down: bool,
    uploads: u32,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Option<ShownPanorama> {
        self.current.as_ref().map(|p| ShownPanorama {
            reference: p.reference.clone(),
            width: p.width(),
            height: p.height(),
            mode: p.mode,
        })
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn uploads(&self) -> u32 {
        self.uploads
    }

    /// Format surface state as an s-expression for status reporting.
    pub fn status_sexp(&self) -> String {
        let shown = match self.shown() {
            Some(p) => format!(
                "(:reference \"{}\" :w {} :h {} :mode :{})",
                p.reference.replace('\\', "\\\\").replace('"', "\\\""),
                p.width,
                p.height,
                p.mode.as_str()
            ),
            None => "nil".to_string(),
        };
        format!(
            "(:rendering {} :shut-down {} :uploads {} :panorama {})",
            if self.rendering { "t" } else { "nil" },
            if self.shut_down { "t" } else { "nil" },
            self.uploads,
            shown,
        )
    }
}

impl RenderSurface for HeadlessSurface {
    fn load_image(&mut self, panorama: &DecodedPanorama) {
        self.current = Some(panorama.clone());
        self.uploads += 1;
        info!(
            reference = %panorama.reference,
            width = panorama.width(),
            height = panorama.height(),
            mode = %panorama.mode,
            "surface: panorama uploaded"
        );
    }

    fn pause_rendering(&mut self) {
        self.rendering = false;
        debug!("surface: rendering paused");
    }

    fn resume_rendering(&mut self) {
        self.rendering = true;
        debug!("surface: rendering resumed");
    }

    fn shutdown(&mut self) {
        self.rendering = false;
        self.shut_down = true;
        self.current = None;
        info!("surface: shut down");
    }
}
