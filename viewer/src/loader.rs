//! Panorama loader: bundled asset reference to a validated RGBA raster.
//!
//! The pipeline is strictly:
//! - resolve the reference inside the bundled asset namespace
//! - open a byte stream and read it fully
//! - decode into an RGBA raster
//! - validate the raster against the caller-supplied projection mode
//!
//! The projection mode is never inferred from the image. A stereo request
//! stays stereo, a mono request stays mono.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Projection mode ──────────────────────────────────────────

/// Equirectangular projection layout of a panorama.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// One image shown to both eyes.
    #[default]
    Mono,
    /// Over/under stereo pair: left eye on top, right eye below.
    Stereo,
}

impl ProjectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Stereo => "stereo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mono" => Some(Self::Mono),
            "stereo" | "stereo-over-under" => Some(Self::Stereo),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Asset namespace ──────────────────────────────────────────

/// Read-only namespace of bundled assets, addressed by logical name.
pub trait AssetSource {
    /// Open the named asset for reading.
    ///
    /// A missing asset is reported as `io::ErrorKind::NotFound`.
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + '_>>;

    /// Short label for logging.
    fn label(&self) -> String;
}

/// Assets bundled in a directory. Names are relative to the root and may
/// not escape it.
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical asset name to a path under the root.
    /// Returns None for empty, absolute, or parent-relative names.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        let rel = Path::new(name);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(rel))
    }
}

impl AssetSource for AssetDir {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + '_>> {
        let path = self.resolve(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name:?} is not a bundled asset name"),
            )
        })?;
        let file = File::open(&path)?;
        Ok(Box::new(file))
    }

    fn label(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}

/// In-memory asset table, used for embedded assets and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemoryAssets {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + '_>> {
        match self.files.get(name) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no embedded asset {name:?}"),
            )),
        }
    }

    fn label(&self) -> String {
        format!("memory:{} asset(s)", self.files.len())
    }
}

// ── Requests and results ─────────────────────────────────────

/// What to show: an asset reference and the projection it is encoded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanoramaRequest {
    pub reference: String,
    pub mode: ProjectionMode,
}

impl PanoramaRequest {
    pub fn new(reference: impl Into<String>, mode: ProjectionMode) -> Self {
        Self {
            reference: reference.into(),
            mode,
        }
    }
}

/// A decoded, validated panorama ready for upload.
#[derive(Debug, Clone)]
pub struct DecodedPanorama {
    pub reference: String,
    pub image: RgbaImage,
    pub mode: ProjectionMode,
}

impl DecodedPanorama {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Height of the region shown to one eye.
    pub fn eye_height(&self) -> u32 {
        match self.mode {
            ProjectionMode::Mono => self.image.height(),
            ProjectionMode::Stereo => self.image.height() / 2,
        }
    }
}

/// Why a load failed.
#[derive(Debug, Error)]
pub enum LoadCause {
    #[error("asset not found")]
    NotFound(#[source] io::Error),
    #[error("stream read failed")]
    Io(#[source] io::Error),
    #[error("image decode failed")]
    Decode(#[source] image::ImageError),
    #[error("{width}x{height} raster is not a valid {mode} panorama")]
    InvalidRaster {
        width: u32,
        height: u32,
        mode: ProjectionMode,
    },
}

/// A panorama could not be produced. Carries the reference and the cause.
#[derive(Debug, Error)]
#[error("cannot load panorama {reference:?}: {cause}")]
pub struct LoadFailure {
    pub reference: String,
    #[source]
    pub cause: LoadCause,
}

impl LoadFailure {
    fn new(reference: &str, cause: LoadCause) -> Self {
        Self {
            reference: reference.to_string(),
            cause,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause, LoadCause::NotFound(_))
    }
}

// ── Loader ───────────────────────────────────────────────────

/// Loads panoramas from one asset namespace.
#[derive(Debug)]
pub struct PanoramaLoader<A> {
    assets: A,
}

impl<A: AssetSource> PanoramaLoader<A> {
    pub fn new(assets: A) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Resolve, read, decode and validate `reference` as a `mode` panorama.
    /// Runs on the calling thread.
    pub fn load(
        &self,
        reference: &str,
        mode: ProjectionMode,
    ) -> Result<DecodedPanorama, LoadFailure> {
        debug!(reference, %mode, assets = %self.assets.label(), "loading panorama");

        let mut stream = self.assets.open(reference).map_err(|e| {
            let cause = if e.kind() == io::ErrorKind::NotFound {
                LoadCause::NotFound(e)
            } else {
                LoadCause::Io(e)
            };
            LoadFailure::new(reference, cause)
        })?;

        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|e| LoadFailure::new(reference, LoadCause::Io(e)))?;

        let image = image::load_from_memory(&bytes)
            .map_err(|e| LoadFailure::new(reference, LoadCause::Decode(e)))?
            .to_rgba8();

        validate_raster(image.width(), image.height(), mode)
            .map_err(|cause| LoadFailure::new(reference, cause))?;

        info!(
            reference,
            width = image.width(),
            height = image.height(),
            %mode,
            "panorama decoded"
        );
        Ok(DecodedPanorama {
            reference: reference.to_string(),
            image,
            mode,
        })
    }

    /// Load a prepared request.
    pub fn load_request(&self, request: &PanoramaRequest) -> Result<DecodedPanorama, LoadFailure> {
        self.load(&request.reference, request.mode)
    }
}

fn validate_raster(width: u32, height: u32, mode: ProjectionMode) -> Result<(), LoadCause> {
    let ok = match mode {
        ProjectionMode::Mono => width > 0 && height > 0,
        // Each eye needs a non-empty, equal half.
        ProjectionMode::Stereo => width > 0 && height >= 2 && height % 2 == 0,
    };
    if ok {
        Ok(())
    } else {
        warn!(width, height, %mode, "rejecting panorama raster");
        Err(LoadCause::InvalidRaster {
            width,
            height,
            mode,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    pub(crate) fn sample_assets() -> MemoryAssets {
        let mut assets = MemoryAssets::new();
        assets.insert("sample.jpg", jpeg_bytes(64, 32));
        assets.insert("stereo.png", png_bytes(64, 64));
        assets.insert("corrupt.jpg", b"definitely not a jpeg".to_vec());
        assets
    }

    #[test]
    fn test_load_mono_sample() {
        let loader = PanoramaLoader::new(sample_assets());
        let pano = loader.load("sample.jpg", ProjectionMode::Mono).unwrap();
        assert_eq!(pano.mode, ProjectionMode::Mono);
        assert_eq!(pano.width(), 64);
        assert_eq!(pano.height(), 32);
        assert_eq!(pano.eye_height(), 32);
        assert_eq!(pano.reference, "sample.jpg");
    }

    #[test]
    fn test_stereo_mode_is_kept() {
        let loader = PanoramaLoader::new(sample_assets());
        let pano = loader.load("stereo.png", ProjectionMode::Stereo).unwrap();
        assert_eq!(pano.mode, ProjectionMode::Stereo);
        assert_eq!(pano.eye_height(), 32);
    }

    #[test]
    fn test_mono_request_not_reinterpreted() {
        // A square image could be a stereo pair; a mono request stays mono.
        let loader = PanoramaLoader::new(sample_assets());
        let pano = loader.load("stereo.png", ProjectionMode::Mono).unwrap();
        assert_eq!(pano.mode, ProjectionMode::Mono);
        assert_eq!(pano.eye_height(), 64);
    }

    #[test]
    fn test_missing_asset() {
        let loader = PanoramaLoader::new(sample_assets());
        let err = loader.load("missing.jpg", ProjectionMode::Mono).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.reference, "missing.jpg");
        assert!(err.to_string().contains("missing.jpg"));
    }

    #[test]
    fn test_corrupt_asset() {
        let loader = PanoramaLoader::new(sample_assets());
        let err = loader.load("corrupt.jpg", ProjectionMode::Mono).unwrap_err();
        assert!(matches!(err.cause, LoadCause::Decode(_)));
    }

    #[test]
    fn test_stereo_odd_height_rejected() {
        let mut assets = MemoryAssets::new();
        assets.insert("odd.png", png_bytes(8, 5));
        let loader = PanoramaLoader::new(assets);
        let err = loader.load("odd.png", ProjectionMode::Stereo).unwrap_err();
        assert!(matches!(
            err.cause,
            LoadCause::InvalidRaster { width: 8, height: 5, mode: ProjectionMode::Stereo }
        ));
        // Same bytes are fine as mono.
        assert!(loader.load("odd.png", ProjectionMode::Mono).is_ok());
    }

    #[test]
    fn test_load_request() {
        let loader = PanoramaLoader::new(sample_assets());
        let req = PanoramaRequest::new("sample.jpg", ProjectionMode::Mono);
        assert!(loader.load_request(&req).is_ok());
    }

    #[test]
    fn test_asset_dir_resolve() {
        let dir = AssetDir::new("/bundle");
        assert_eq!(dir.resolve("pano/a.jpg"), Some(PathBuf::from("/bundle/pano/a.jpg")));
        assert_eq!(dir.resolve(""), None);
        assert_eq!(dir.resolve("/etc/passwd"), None);
        assert_eq!(dir.resolve("../secret.jpg"), None);
        assert_eq!(dir.resolve("./a.jpg"), None);
    }

    #[test]
    fn test_asset_dir_load() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("sample.jpg"), jpeg_bytes(16, 8)).unwrap();
        let loader = PanoramaLoader::new(AssetDir::new(tmp.path()));

        let pano = loader.load("sample.jpg", ProjectionMode::Mono).unwrap();
        assert_eq!((pano.width(), pano.height()), (16, 8));

        let err = loader.load("missing.jpg", ProjectionMode::Mono).unwrap_err();
        assert!(err.is_not_found());

        let err = loader.load("../sample.jpg", ProjectionMode::Mono).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_projection_mode_from_str() {
        assert_eq!(ProjectionMode::from_str("mono"), Some(ProjectionMode::Mono));
        assert_eq!(ProjectionMode::from_str("stereo"), Some(ProjectionMode::Stereo));
        assert_eq!(ProjectionMode::from_str("stereo-over-under"), Some(ProjectionMode::Stereo));
        assert_eq!(ProjectionMode::from_str("cubemap"), None);
        assert_eq!(ProjectionMode::default(), ProjectionMode::Mono);
    }
}
