//! Source image validation and display sizing.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, EditorError, Size};

/// File extensions accepted as source images (lowercase, no dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Slack added before flooring so that exact fits are not lost to
/// floating-point error (e.g. `600 * (1/3) * 3`).
const FIT_EPSILON: f64 = 1e-9;

/// Upload limits for source images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    /// Largest accepted file, in bytes.
    pub max_bytes: u64,
    /// Longest side the source is downscaled to before upload.
    pub max_dimension: u32,
}

impl ImageLimits {
    /// Default size limit: 10 MiB.
    pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
    /// Default pre-upload downscale bound.
    pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

    /// Check extension and size together.
    ///
    /// # Errors
    ///
    /// See [`validate_format`] and [`validate_size`].
    pub fn validate(&self, path: &Path, len: u64) -> Result<(), EditorError> {
        validate_format(path)?;
        validate_size(len, self.max_bytes)
    }
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: Self::DEFAULT_MAX_BYTES,
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Reject paths whose extension is not one of [`SUPPORTED_EXTENSIONS`].
/// The comparison ignores case.
///
/// # Errors
///
/// Returns [`EditorError::UnsupportedFormat`] with the offending
/// extension (empty when the path has none).
pub fn validate_format(path: &Path) -> Result<(), EditorError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(EditorError::UnsupportedFormat(ext))
    }
}

/// Reject files larger than `max` bytes. A file of exactly `max` bytes
/// is accepted.
///
/// # Errors
///
/// Returns [`EditorError::ImageTooLarge`].
pub const fn validate_size(len: u64, max: u64) -> Result<(), EditorError> {
    if len <= max {
        Ok(())
    } else {
        Err(EditorError::ImageTooLarge { size: len, max })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_side(side: u32, scale: f64) -> u32 {
    let scaled = f64::from(side).mul_add(scale, FIT_EPSILON).floor();
    (scaled as u32).max(1)
}

/// Fit `natural` entirely inside `container`, preserving aspect ratio.
///
/// The result may be larger than `natural` (small images are scaled
/// up). Each side is floored and at least 1 pixel.
///
/// # Errors
///
/// Returns [`EditorError::InvalidDimensions`] for an empty image and
/// [`EditorError::InvalidContainer`] for an empty or non-finite
/// container.
pub fn contain_fit(natural: Dimensions, container: Size) -> Result<Dimensions, EditorError> {
    if natural.is_empty() {
        return Err(EditorError::InvalidDimensions {
            width: natural.width,
            height: natural.height,
        });
    }
    let valid = container.width.is_finite()
        && container.height.is_finite()
        && container.width >= 1.0
        && container.height >= 1.0;
    if !valid {
        return Err(EditorError::InvalidContainer {
            width: container.width,
            height: container.height,
        });
    }
    let scale = (container.width / f64::from(natural.width))
        .min(container.height / f64::from(natural.height));
    Ok(Dimensions::new(
        scaled_side(natural.width, scale),
        scaled_side(natural.height, scale),
    ))
}

/// Shrink `natural` so neither side exceeds `max`, preserving aspect
/// ratio. Images that already fit are returned unchanged; this never
/// scales up.
#[must_use]
pub fn fit_within(natural: Dimensions, max: Dimensions) -> Dimensions {
    if natural.width <= max.width && natural.height <= max.height {
        return natural;
    }
    if natural.is_empty() || max.is_empty() {
        return natural;
    }
    let scale = (f64::from(max.width) / f64::from(natural.width))
        .min(f64::from(max.height) / f64::from(natural.height));
    Dimensions::new(
        scaled_side(natural.width, scale).min(max.width),
        scaled_side(natural.height, scale).min(max.height),
    )
}

/// Read an encoded image's dimensions from its header without decoding
/// the pixel data.
///
/// # Errors
///
/// Returns [`EditorError::Image`] if the format is not recognized or
/// the header is malformed.
pub fn probe_dimensions(bytes: &[u8]) -> Result<Dimensions, EditorError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    let (width, height) = reader.into_dimensions()?;
    Ok(Dimensions::new(width, height))
}

/// A loaded source image and the size it is displayed at.
///
/// Computed once per load. The display size is the logical canvas size:
/// strokes, the viewport and the exported mask are all expressed in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    source_path: PathBuf,
    natural: Dimensions,
    display: Dimensions,
}

impl ImageDescriptor {
    /// Describe an image displayed with a contain fit inside `container`.
    ///
    /// # Errors
    ///
    /// See [`contain_fit`].
    pub fn contain(
        source_path: impl Into<PathBuf>,
        natural: Dimensions,
        container: Size,
    ) -> Result<Self, EditorError> {
        let display = contain_fit(natural, container)?;
        Ok(Self {
            source_path: source_path.into(),
            natural,
            display,
        })
    }

    /// Where the image was loaded from.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Pixel size of the source file.
    #[must_use]
    pub const fn natural(&self) -> Dimensions {
        self.natural
    }

    /// Size the image is displayed at; also the mask size.
    #[must_use]
    pub const fn display(&self) -> Dimensions {
        self.display
    }

    /// File name component of the source path, for upload metadata.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map_or_else(|| "image".to_owned(), |n| n.to_string_lossy().into_owned())
    }
}
