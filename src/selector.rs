use log::{debug, info};
use logging_timer::time;
use rayon::prelude::*;
use thiserror::Error;

use crate::affine::{estimate_affine, AlignmentError, RansacConfig, TransformResult};
use crate::keywords::find_anchor_words;
use crate::layout::LayoutDocument;
use crate::templates::Template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("could not find a suitable template")]
pub struct NoSuitableTemplateError;

/// How well one template registers onto the target document.
#[derive(Debug, Clone)]
pub struct TemplateScore<'a> {
    pub template: &'a Template,
    pub alignment: Result<TransformResult, AlignmentError>,
}

impl TemplateScore<'_> {
    /// Mean transform error, or `+∞` when the template could not be aligned.
    pub fn mean_error(&self) -> f64 {
        match &self.alignment {
            Ok(transform) => transform.mean_error,
            Err(_) => f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateSelection<'a> {
    pub template: &'a Template,
    pub transform: TransformResult,
}

pub fn score_template<'a>(
    template: &'a Template,
    target: &LayoutDocument,
    config: &RansacConfig,
) -> TemplateScore<'a> {
    let reference_anchors = find_anchor_words(&template.reference, &template.anchor_words);
    let target_anchors = find_anchor_words(target, &template.anchor_words);
    let alignment = estimate_affine(&reference_anchors, &target_anchors, &template.anchor_words, config);

    match &alignment {
        Ok(transform) => info!(
            "template {}: mean error = {:.3}, inlier ratio = {:?}, common anchors = {}",
            template.id, transform.mean_error, transform.inlier_ratio, transform.common_anchors
        ),
        Err(e) => info!("template {}: {}", template.id, e),
    }

    TemplateScore { template, alignment }
}

/// Scores every template against the target in parallel. Scores come back
/// in template order.
#[time]
pub fn score_templates<'a>(
    templates: &'a [Template],
    target: &LayoutDocument,
    config: &RansacConfig,
) -> Vec<TemplateScore<'a>> {
    templates
        .par_iter()
        .map(|template| score_template(template, target, config))
        .collect()
}

/// Picks the template with the lowest finite mean error. On equal error the
/// earlier template wins.
pub fn select_best<'a>(
    scores: Vec<TemplateScore<'a>>,
) -> Result<TemplateSelection<'a>, NoSuitableTemplateError> {
    let mut best: Option<TemplateSelection<'a>> = None;
    for score in scores {
        let Ok(transform) = score.alignment else {
            continue;
        };
        if !transform.mean_error.is_finite() {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |b| transform.mean_error < b.transform.mean_error)
        {
            best = Some(TemplateSelection {
                template: score.template,
                transform,
            });
        }
    }

    let selection = best.ok_or(NoSuitableTemplateError)?;
    info!(
        "using template {} with mean error = {:.3}",
        selection.template.id, selection.transform.mean_error
    );
    Ok(selection)
}

pub fn select_template<'a>(
    templates: &'a [Template],
    target: &LayoutDocument,
    config: &RansacConfig,
) -> Result<TemplateSelection<'a>, NoSuitableTemplateError> {
    debug!("evaluating {} templates", templates.len());
    select_best(score_templates(templates, target, config))
}
