//! Robust registration of one anchor-word map onto another.
//!
//! Every corner of every anchor word common to both maps becomes a point
//! correspondence. A similarity transform (rotation, uniform scale and
//! translation) is fitted with RANSAC over two-point hypotheses, refined by
//! least squares on the inliers, and scored by the mean reprojection error
//! over *all* correspondences.

use std::collections::BTreeSet;

use imageproc::point::Point;
use log::{info, warn};
use logging_timer::time;
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::geometry::distance_from_point_to_point;
use crate::keywords::{fold_case, AnchorMap};

/// Fewer common anchors than this still produce a transform, but the result
/// is logged as low confidence.
pub const MIN_CONFIDENT_ANCHORS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error("no anchor words in common between the two documents")]
    MissingAnchors,
    #[error("anchor correspondences are degenerate, no transform fits them")]
    DegenerateCorrespondences,
}

/// A 2×3 affine matrix mapping template coordinates to target-image
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix(pub [[f64; 3]; 2]);

impl AffineMatrix {
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    /// `[a -b tx; b a ty]`: rotation by `atan2(b, a)` with scale `hypot(a, b)`.
    pub fn similarity(a: f64, b: f64, tx: f64, ty: f64) -> Self {
        Self([[a, -b, tx], [b, a, ty]])
    }

    pub fn apply(&self, point: &Point<f64>) -> Point<f64> {
        let [r0, r1] = &self.0;
        Point::new(
            r0[0] * point.x + r0[1] * point.y + r0[2],
            r1[0] * point.x + r1[1] * point.y + r1[2],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub matrix: AffineMatrix,
    /// Fraction of correspondences the robust fit kept; `None` when it kept
    /// none.
    pub inlier_ratio: Option<f64>,
    /// Mean reprojection error over every correspondence.
    pub mean_error: f64,
    pub common_anchors: usize,
}

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Reprojection error (pixels) below which a correspondence is an inlier.
    pub inlier_threshold: f64,
    /// Probability of drawing an all-inlier sample at least once, used to
    /// stop early.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 3.0,
            confidence: 0.99,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub matrix: AffineMatrix,
    pub n_inliers: usize,
}

pub fn reprojection_error(matrix: &AffineMatrix, src: &Point<f64>, dst: &Point<f64>) -> f64 {
    distance_from_point_to_point(&matrix.apply(src), dst)
}

pub fn mean_reprojection_error(matrix: &AffineMatrix, src: &[Point<f64>], dst: &[Point<f64>]) -> f64 {
    if src.is_empty() {
        return f64::INFINITY;
    }
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(matrix, s, d))
        .sum::<f64>()
        / src.len() as f64
}

/// Least-squares similarity transform taking `src` onto `dst`. Returns
/// `None` if the source points all coincide.
pub fn fit_similarity_least_squares(src: &[Point<f64>], dst: &[Point<f64>]) -> Option<AffineMatrix> {
    let n = src.len().min(dst.len());
    if n == 0 {
        return None;
    }
    let centroid = |points: &[Point<f64>]| {
        let (sx, sy) = points[..n]
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n as f64, sy / n as f64)
    };
    let cs = centroid(src);
    let cd = centroid(dst);

    let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
    for (s, d) in src.iter().zip(dst) {
        let (xs, ys) = (s.x - cs.x, s.y - cs.y);
        let (xd, yd) = (d.x - cd.x, d.y - cd.y);
        dot += xs * xd + ys * yd;
        cross += xs * yd - ys * xd;
        norm += xs * xs + ys * ys;
    }
    if norm <= f64::EPSILON {
        return None;
    }

    let a = dot / norm;
    let b = cross / norm;
    let tx = cd.x - (a * cs.x - b * cs.y);
    let ty = cd.y - (b * cs.x + a * cs.y);
    Some(AffineMatrix::similarity(a, b, tx, ty))
}

fn inlier_mask(matrix: &AffineMatrix, src: &[Point<f64>], dst: &[Point<f64>], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(matrix, s, d) < threshold)
        .collect()
}

/// Fits a similarity transform robustly. Returns `None` when no hypothesis
/// could be formed (fewer than two distinct source points).
pub fn fit_similarity_ransac(
    src: &[Point<f64>],
    dst: &[Point<f64>],
    config: &RansacConfig,
) -> Option<RansacFit> {
    let n = src.len().min(dst.len());
    if n < 2 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(AffineMatrix, usize)> = None;
    let mut iteration_limit = config.max_iters;
    let mut iteration = 0;

    while iteration < iteration_limit {
        iteration += 1;

        let i = rng.gen_range(0..n);
        let mut j = rng.gen_range(0..n - 1);
        if j >= i {
            j += 1;
        }

        let Some(matrix) = fit_similarity_least_squares(&[src[i], src[j]], &[dst[i], dst[j]]) else {
            continue;
        };

        let count = inlier_mask(&matrix, &src[..n], &dst[..n], config.inlier_threshold)
            .into_iter()
            .filter(|&inlier| inlier)
            .count();

        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((matrix, count));

            let inlier_fraction = count as f64 / n as f64;
            if inlier_fraction >= 1.0 {
                break;
            }
            let miss = (1.0 - inlier_fraction * inlier_fraction).ln();
            if miss < 0.0 {
                let needed = ((1.0 - config.confidence).ln() / miss).ceil();
                if needed.is_finite() && needed >= 0.0 {
                    iteration_limit = iteration_limit.min(needed as usize);
                }
            }
        }
    }

    let (hypothesis, _) = best?;
    let mask = inlier_mask(&hypothesis, &src[..n], &dst[..n], config.inlier_threshold);
    let inlier_src = src.iter().zip(&mask).filter(|&(_, &m)| m).map(|(p, _)| *p).collect::<Vec<_>>();
    let inlier_dst = dst.iter().zip(&mask).filter(|&(_, &m)| m).map(|(p, _)| *p).collect::<Vec<_>>();

    let matrix = fit_similarity_least_squares(&inlier_src, &inlier_dst).unwrap_or(hypothesis);
    let n_inliers = inlier_mask(&matrix, &src[..n], &dst[..n], config.inlier_threshold)
        .into_iter()
        .filter(|&inlier| inlier)
        .count();

    Some(RansacFit { matrix, n_inliers })
}

/// Computes the transform taking `reference` anchor coordinates onto
/// `target` coordinates, using only the texts listed in `anchors`.
#[time]
pub fn estimate_affine(
    reference: &AnchorMap,
    target: &AnchorMap,
    anchors: &[String],
    config: &RansacConfig,
) -> Result<TransformResult, AlignmentError> {
    let common = anchors
        .iter()
        .map(|a| fold_case(a))
        .filter(|a| reference.contains_key(a) && target.contains_key(a))
        .collect::<BTreeSet<_>>();

    if common.is_empty() {
        return Err(AlignmentError::MissingAnchors);
    }

    let src = common
        .iter()
        .flat_map(|word| reference[word].iter().copied())
        .collect::<Vec<_>>();
    let dst = common
        .iter()
        .flat_map(|word| target[word].iter().copied())
        .collect::<Vec<_>>();

    let fit = fit_similarity_ransac(&src, &dst, config).ok_or(AlignmentError::DegenerateCorrespondences)?;
    let inlier_ratio = (fit.n_inliers > 0).then(|| fit.n_inliers as f64 / src.len() as f64);
    let mean_error = mean_reprojection_error(&fit.matrix, &src, &dst);

    if let Some(ratio) = inlier_ratio {
        info!("inlier ratio: {:.3}", ratio);
    }
    info!("mean transform error: {:.3}", mean_error);
    if common.len() < MIN_CONFIDENT_ANCHORS {
        warn!(
            "low confidence alignment: only {} of {} anchor words found in both documents",
            common.len(),
            anchors.len()
        );
    }

    Ok(TransformResult {
        matrix: fit.matrix,
        inlier_ratio,
        mean_error,
        common_anchors: common.len(),
    })
}
