//! Geometric normalization of a drawn digit onto the 28x28 classifier canvas.
//!
//! The content is cropped to its bounding box, scaled with nearest-neighbour
//! sampling so that its longer side is exactly [`CONTENT_SIZE`] pixels, and
//! pasted in the middle of a [`CANVAS_SIZE`] square canvas. In
//! [`CenteringMode::CenterOfMass`] the canvas is additionally shifted so that
//! the intensity centroid lands on the canvas centre pixel.

use crate::error::InfernumError;
use crate::observer::{PipelineObserver, Stage};
use image::{GrayImage, imageops};

/// Side length of the output canvas.
pub const CANVAS_SIZE: u32 = 28;
/// Side length of the box the content is scaled into.
pub const CONTENT_SIZE: u32 = 20;
/// Pixel the centre of mass is moved onto in mass-centred mode.
pub const MASS_TARGET: f64 = 14.0;

/// How the rescaled content is positioned on the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CenteringMode {
    /// Centre the content's bounding box.
    Geometric,
    /// Centre the bounding box, then shift the intensity centroid onto (14, 14).
    #[default]
    CenterOfMass,
}

impl CenteringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CenteringMode::Geometric => "geometric",
            CenteringMode::CenterOfMass => "mass",
        }
    }
}

impl std::str::FromStr for CenteringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "geometric" => Ok(CenteringMode::Geometric),
            "mass" | "center_of_mass" => Ok(CenteringMode::CenterOfMass),
            other => Err(format!("unknown centering mode: {other}")),
        }
    }
}

/// Ink polarity of the incoming drawing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Light strokes on a dark background; background is already 0.
    #[default]
    LightOnDark,
    /// Dark strokes on a light background; inverted before geometry work.
    DarkOnLight,
}

/// Brings a raster into the background-is-zero convention.
pub fn apply_polarity(raster: &mut GrayImage, polarity: Polarity) {
    if polarity == Polarity::DarkOnLight {
        imageops::invert(raster);
    }
}

/// Smallest rectangle holding every non-zero pixel.
///
/// `right` and `bottom` are exclusive, so `right - left` is the width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Computes the bounding box of non-background pixels, or `None` for a blank
/// raster.
pub fn bounding_box(raster: &GrayImage) -> Option<BoundingBox> {
    let mut bbox: Option<BoundingBox> = None;
    for (x, y, pixel) in raster.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        bbox = Some(match bbox {
            None => BoundingBox {
                left: x,
                top: y,
                right: x + 1,
                bottom: y + 1,
            },
            Some(b) => BoundingBox {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x + 1),
                bottom: b.bottom.max(y + 1),
            },
        });
    }
    bbox
}

/// Size of the content after the aspect-preserving rescale.
///
/// The longer side becomes exactly [`CONTENT_SIZE`]; the shorter side is
/// floored and never collapses below one pixel.
pub fn scaled_size(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height).max(1) as u64;
    let scale = |side: u32| -> u32 {
        let scaled = side as u64 * CONTENT_SIZE as u64 / longest;
        (scaled as u32).clamp(1, CONTENT_SIZE)
    };
    (scale(width), scale(height))
}

/// Top-left paste offset that centres content of the given size on the canvas.
pub fn centering_offset(width: u32, height: u32) -> (u32, u32) {
    (
        (CANVAS_SIZE - width) / 2,
        (CANVAS_SIZE - height) / 2,
    )
}

/// Intensity-weighted centroid `(x, y)` of a raster, `None` if it has no mass.
pub fn center_of_mass(raster: &GrayImage) -> Option<(f64, f64)> {
    let (mut total, mut sum_x, mut sum_y) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y, pixel) in raster.enumerate_pixels() {
        let v = pixel.0[0] as f64;
        total += v;
        sum_x += v * x as f64;
        sum_y += v * y as f64;
    }
    (total > 0.0).then(|| (sum_x / total, sum_y / total))
}

/// Translates a raster by whole pixels, filling the uncovered edge with 0.
pub fn shift(raster: &GrayImage, dx: i64, dy: i64) -> GrayImage {
    let (width, height) = raster.dimensions();
    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let sx = x as i64 - dx;
        let sy = y as i64 - dy;
        if sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64 {
            *pixel = *raster.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}

/// Shifts the canvas so its centre of mass lands on ([`MASS_TARGET`], [`MASS_TARGET`]).
///
/// Half-pixel shifts round to even, so a centroid at 13.5 stays put.
pub fn recenter_by_mass(canvas: &GrayImage) -> GrayImage {
    let Some((cx, cy)) = center_of_mass(canvas) else {
        return canvas.clone();
    };
    let dx = (MASS_TARGET - cx).round_ties_even() as i64;
    let dy = (MASS_TARGET - cy).round_ties_even() as i64;
    log::debug!("Center of mass: ({cx:.3}, {cy:.3}), shift: ({dx}, {dy})");
    if dx == 0 && dy == 0 {
        return canvas.clone();
    }
    shift(canvas, dx, dy)
}

/// Crops, rescales and centres drawn content onto the 28x28 canvas.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeometryNormalizer {
    pub centering: CenteringMode,
}

impl GeometryNormalizer {
    pub fn new(centering: CenteringMode) -> Self {
        Self { centering }
    }

    /// Normalizes a grayscale raster of any size.
    ///
    /// # Errors
    ///
    /// Returns [`InfernumError::EmptyContent`] when the raster has no
    /// non-background pixel. Nothing else in this step can fail.
    pub fn normalize(
        &self,
        raster: &GrayImage,
        observer: &dyn PipelineObserver,
    ) -> Result<GrayImage, InfernumError> {
        let bbox = bounding_box(raster).ok_or(InfernumError::EmptyContent)?;
        log::debug!("Image cropped to bbox: {:?}", bbox);

        let cropped =
            imageops::crop_imm(raster, bbox.left, bbox.top, bbox.width(), bbox.height())
                .to_image();
        observer.on_stage(Stage::Cropped, &cropped);

        let (new_width, new_height) = scaled_size(bbox.width(), bbox.height());
        log::debug!("Content rescaled to: {}x{}", new_width, new_height);
        let resized = imageops::resize(
            &cropped,
            new_width,
            new_height,
            imageops::FilterType::Nearest,
        );
        observer.on_stage(Stage::Resized, &resized);

        let (offset_x, offset_y) = centering_offset(new_width, new_height);
        log::debug!("Offset for centering: ({}, {})", offset_x, offset_y);
        let mut canvas = GrayImage::new(CANVAS_SIZE, CANVAS_SIZE);
        imageops::replace(&mut canvas, &resized, offset_x as i64, offset_y as i64);

        let canvas = match self.centering {
            CenteringMode::Geometric => canvas,
            CenteringMode::CenterOfMass => recenter_by_mass(&canvas),
        };
        observer.on_stage(Stage::Normalized, &canvas);

        Ok(canvas)
    }
}
