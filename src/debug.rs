use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use log::{debug, warn};

use crate::image_utils::{BLUE, GREEN, PINK, RED};
use crate::marks::{ContourShape, RegionAnalysis};

/// Creates a path for a debug image.
pub fn debug_image_path(base: &Path, label: &str) -> PathBuf {
    let mut result = PathBuf::from(base);
    result.set_file_name(format!(
        "{}_debug_{}.png",
        base.file_stem().unwrap_or_default().to_string_lossy(),
        label
    ));
    result
}

/// Writes annotated copies of the ballot image next to `base_path`, or does
/// nothing when disabled.
#[derive(Debug, Clone)]
pub struct ImageDebugWriter {
    base_path: PathBuf,
    image: Option<GrayImage>,
}

impl ImageDebugWriter {
    pub fn new(base_path: PathBuf, image: GrayImage) -> Self {
        Self {
            base_path,
            image: Some(image),
        }
    }

    pub fn disabled() -> Self {
        Self {
            base_path: PathBuf::new(),
            image: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.image.is_some()
    }

    /// Draws on a colour copy of the image and saves it under `label`.
    /// Returns the path written, if any.
    pub fn write(&self, label: &str, draw: impl FnOnce(&mut RgbImage)) -> Option<PathBuf> {
        let image = self.image.as_ref()?;
        let mut canvas = DynamicImage::ImageLuma8(image.clone()).into_rgb8();
        draw(&mut canvas);

        let path = debug_image_path(&self.base_path, label);
        match canvas.save(&path) {
            Ok(()) => {
                debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("unable to write debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn shape_color(shape: ContourShape) -> Rgb<u8> {
    match shape {
        ContourShape::EmptyOutline => GREEN,
        ContourShape::Mark => RED,
    }
}

/// Outlines every crop window: red if the checkbox is marked, green if not.
pub fn draw_crop_windows_debug_image_mut(canvas: &mut RgbImage, regions: &[RegionAnalysis]) {
    for region in regions {
        let color = if region.marked { RED } else { GREEN };
        draw_hollow_rect_mut(canvas, region.window, color);
    }
}

/// Draws every surviving contour in image coordinates, coloured by its
/// classification, with a cross on each vertex.
pub fn draw_contours_debug_image_mut(canvas: &mut RgbImage, regions: &[RegionAnalysis]) {
    for region in regions {
        draw_hollow_rect_mut(canvas, region.window, BLUE);
        let (dx, dy) = (region.window.left() as f32, region.window.top() as f32);
        for contour in &region.contours {
            let color = shape_color(contour.shape);
            let n = contour.polygon.len();
            for (i, start) in contour.polygon.iter().enumerate() {
                let end = &contour.polygon[(i + 1) % n];
                draw_line_segment_mut(
                    canvas,
                    (start.x as f32 + dx, start.y as f32 + dy),
                    (end.x as f32 + dx, end.y as f32 + dy),
                    color,
                );
                draw_cross_mut(
                    canvas,
                    PINK,
                    start.x + region.window.left(),
                    start.y + region.window.top(),
                );
            }
        }
    }
}
