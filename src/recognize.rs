use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use log::info;
use logging_timer::time;
use thiserror::Error;

use crate::affine::{RansacConfig, TransformResult};
use crate::debug::{draw_contours_debug_image_mut, draw_crop_windows_debug_image_mut, ImageDebugWriter};
use crate::image_utils::grayscale_bt601;
use crate::layout_provider::{analyze_with_deadline, LayoutProviderError, TextLayoutProvider};
use crate::marks::{detect_marks, ImageLoadError, RegionAnalysis};
use crate::selector::{select_template, NoSuitableTemplateError};
use crate::templates::{load_templates, Template, TemplateRepository, TemplateStoreError};
use crate::types::TemplateId;
use crate::validator::{validate_ballot, MarkResult};

pub const DEFAULT_LAYOUT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RecognizeOptions {
    /// How long to wait for the text-layout provider.
    pub layout_deadline: Duration,
    /// Base path for debug images; `None` disables them.
    pub debug: Option<PathBuf>,
    pub ransac: RansacConfig,
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        Self {
            layout_deadline: DEFAULT_LAYOUT_DEADLINE,
            debug: None,
            ransac: RansacConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognizeBallotError {
    #[error(transparent)]
    NoSuitableTemplate(#[from] NoSuitableTemplateError),
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),
    #[error(transparent)]
    Layout(#[from] LayoutProviderError),
    #[error(transparent)]
    TemplateStore(#[from] TemplateStoreError),
}

#[derive(Debug, Clone)]
pub struct BallotRecognition {
    pub template_id: TemplateId,
    pub transform: TransformResult,
    pub regions: Vec<RegionAnalysis>,
    pub result: MarkResult,
}

/// Decodes ballot image bytes into a grayscale image.
pub fn decode_ballot_image(bytes: &[u8]) -> Result<GrayImage, ImageLoadError> {
    Ok(grayscale_bt601(&image::load_from_memory(bytes)?.into_rgb8()))
}

/// Recognizes a ballot against already-loaded templates.
///
/// The text-layout provider is asked exactly once; its result is shared by
/// every template comparison.
#[time]
pub fn recognize_ballot_with_templates(
    image_bytes: Arc<[u8]>,
    provider: Arc<dyn TextLayoutProvider>,
    templates: &[Template],
    options: &RecognizeOptions,
) -> Result<BallotRecognition, RecognizeBallotError> {
    let image = decode_ballot_image(&image_bytes)?;
    let target = analyze_with_deadline(provider, image_bytes, options.layout_deadline)?;

    let selection = select_template(templates, &target, &options.ransac)?;
    let regions = detect_marks(&image, &selection.template.rectangles, &selection.transform.matrix)?;

    let debug = match &options.debug {
        Some(base_path) => ImageDebugWriter::new(base_path.clone(), image),
        None => ImageDebugWriter::disabled(),
    };
    debug.write("crop_windows", |canvas| draw_crop_windows_debug_image_mut(canvas, &regions));
    debug.write("contours", |canvas| draw_contours_debug_image_mut(canvas, &regions));

    let result = validate_ballot(
        regions.iter().map(|region| region.marked).collect(),
        selection.transform.mean_error,
    );
    info!(
        "template {}: {} of {} checkboxes marked, invalid: {}",
        selection.template.id,
        result.marked_count(),
        result.marks.len(),
        result.invalid
    );

    Ok(BallotRecognition {
        template_id: selection.template.id.clone(),
        transform: selection.transform,
        regions,
        result,
    })
}

/// Loads the templates from `repository` and recognizes the ballot.
pub fn recognize_ballot(
    image_bytes: Arc<[u8]>,
    provider: Arc<dyn TextLayoutProvider>,
    repository: &dyn TemplateRepository,
    options: &RecognizeOptions,
) -> Result<BallotRecognition, RecognizeBallotError> {
    let templates = load_templates(repository)?;
    recognize_ballot_with_templates(image_bytes, provider, &templates, options)
}
