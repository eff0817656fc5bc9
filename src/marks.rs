//! Decides, per checkbox, whether it holds a handwritten mark.
//!
//! Each checkbox rectangle is mapped into the photographed ballot, cropped,
//! binarized and broken into contours. A contour that simplifies to a
//! quadrilateral with near-right angles is the printed box outline; anything
//! else in the box is a mark.

use std::ops::RangeInclusive;

use image::GrayImage;
use imageproc::{contours::find_contours, point::Point, rect::Rect};
use log::debug;
use logging_timer::time;
use thiserror::Error;

use crate::affine::AffineMatrix;
use crate::geometry::{
    approximate_closed_polygon, closed_perimeter, distance_from_point_to_point, interior_angles, polygon_area,
    to_f64,
};
use crate::image_utils::{count_pixels, crop, threshold_inverse, WHITE};
use crate::templates::CheckboxRect;

/// Pixels at or below this intensity are ink.
pub const INK_THRESHOLD: u8 = 127;
/// Polygon simplification tolerance as a fraction of the contour perimeter.
pub const APPROXIMATION_EPSILON_RATIO: f64 = 0.02;
/// Simplified contours with a perimeter at or below this are noise.
pub const MIN_CONTOUR_PERIMETER: f64 = 10.0;
/// Two contours whose points all lie this close to each other are one shape.
pub const DUPLICATE_CONTOUR_DISTANCE: f64 = 10.0;
/// Interior angles, in degrees, of an unmarked box outline.
pub const EMPTY_OUTLINE_ANGLES: RangeInclusive<f64> = 80.0..=100.0;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("unable to decode ballot image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(
        "checkbox {region} maps to ({left:.1}, {top:.1})-({right:.1}, {bottom:.1}), \
         outside the {width}x{height} image"
    )]
    CropOutOfBounds {
        region: usize,
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        width: u32,
        height: u32,
    },
    #[error("checkbox {region} maps to an empty crop window")]
    EmptyCrop { region: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourShape {
    /// The printed checkbox outline.
    EmptyOutline,
    Mark,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedContour {
    /// Simplified polygon in crop coordinates.
    pub polygon: Vec<Point<i32>>,
    pub shape: ContourShape,
}

#[derive(Debug, Clone)]
pub struct RegionAnalysis {
    /// Crop window in target-image coordinates.
    pub window: Rect,
    pub contours: Vec<ClassifiedContour>,
    pub marked: bool,
}

/// Maps a checkbox into target-image space and returns the integer crop
/// window covering it. `region` is only used for error reporting.
pub fn crop_window(
    rect: &CheckboxRect,
    matrix: &AffineMatrix,
    image_size: (u32, u32),
    region: usize,
) -> Result<Rect, ImageLoadError> {
    let [a, b] = rect.corners.map(|corner| matrix.apply(&corner));
    let (left, right) = (a.x.min(b.x), a.x.max(b.x));
    let (top, bottom) = (a.y.min(b.y), a.y.max(b.y));
    let (width, height) = image_size;

    if !(left >= 0.0 && top >= 0.0 && right <= width as f64 && bottom <= height as f64) {
        return Err(ImageLoadError::CropOutOfBounds {
            region,
            left,
            top,
            right,
            bottom,
            width,
            height,
        });
    }

    let (x0, y0) = (left.trunc() as i32, top.trunc() as i32);
    let (x1, y1) = (right.trunc() as i32, bottom.trunc() as i32);
    if x1 <= x0 || y1 <= y0 {
        return Err(ImageLoadError::EmptyCrop { region });
    }
    Ok(Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Extracts contours from a binary image, simplifies each one, and drops
/// those that collapse to a point or are too short to be ink.
pub fn simplified_contours(binary: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter_map(|contour| {
            let epsilon = APPROXIMATION_EPSILON_RATIO * closed_perimeter(&contour.points);
            let polygon = approximate_closed_polygon(&contour.points, epsilon);
            if polygon.len() <= 1 || closed_perimeter(&polygon) <= MIN_CONTOUR_PERIMETER {
                return None;
            }
            Some(polygon)
        })
        .collect()
}

/// Whether every point of `a` lies within `DUPLICATE_CONTOUR_DISTANCE` of
/// some point of `b`.
pub fn is_near_duplicate(a: &[Point<i32>], b: &[Point<i32>]) -> bool {
    a.iter().all(|pa| {
        b.iter()
            .any(|pb| distance_from_point_to_point(&to_f64(pa), &to_f64(pb)) <= DUPLICATE_CONTOUR_DISTANCE)
    })
}

/// Collapses clusters of near-duplicate contours to one representative.
///
/// Contours are visited from largest to smallest enclosed area (earlier
/// contour first on equal area) and a contour is kept only if it is not a
/// near-duplicate, in either direction, of one already kept. Survivors are
/// returned in their original order.
pub fn deduplicate_contours(contours: Vec<Vec<Point<i32>>>) -> Vec<Vec<Point<i32>>> {
    let areas = contours.iter().map(|c| polygon_area(c)).collect::<Vec<_>>();
    let mut order = (0..contours.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| areas[b].total_cmp(&areas[a]).then(a.cmp(&b)));

    let mut kept: Vec<usize> = vec![];
    for candidate in order {
        let duplicate = kept.iter().any(|&k| {
            is_near_duplicate(&contours[candidate], &contours[k]) || is_near_duplicate(&contours[k], &contours[candidate])
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept.sort_unstable();

    contours
        .into_iter()
        .enumerate()
        .filter_map(|(i, c)| kept.binary_search(&i).is_ok().then_some(c))
        .collect()
}

pub fn classify_contour(polygon: &[Point<i32>]) -> ContourShape {
    if polygon.len() == 4
        && interior_angles(polygon)
            .iter()
            .all(|angle| EMPTY_OUTLINE_ANGLES.contains(angle))
    {
        ContourShape::EmptyOutline
    } else {
        ContourShape::Mark
    }
}

/// Classifies every contour in a cropped checkbox.
pub fn analyze_crop(crop: &GrayImage) -> Vec<ClassifiedContour> {
    let binary = threshold_inverse(crop, INK_THRESHOLD);
    let candidates = simplified_contours(&binary);
    let candidate_count = candidates.len();
    let survivors = deduplicate_contours(candidates);
    debug!(
        "{} ink pixels, {} contours after filtering, {} after de-duplication",
        count_pixels(&binary, &WHITE),
        candidate_count,
        survivors.len()
    );

    survivors
        .into_iter()
        .map(|polygon| {
            let shape = classify_contour(&polygon);
            debug!("contour with {} vertices: {:?}", polygon.len(), shape);
            ClassifiedContour { polygon, shape }
        })
        .collect()
}

/// Analyzes one checkbox of the target image.
pub fn analyze_region(
    image: &GrayImage,
    rect: &CheckboxRect,
    matrix: &AffineMatrix,
    region: usize,
) -> Result<RegionAnalysis, ImageLoadError> {
    let window = crop_window(rect, matrix, image.dimensions(), region)?;
    let cropped = crop(image, &window).ok_or(ImageLoadError::EmptyCrop { region })?;
    let contours = analyze_crop(&cropped);
    let marked = contours.iter().any(|c| c.shape == ContourShape::Mark);
    debug!("checkbox {}: {} contours, marked: {}", region, contours.len(), marked);
    Ok(RegionAnalysis {
        window,
        contours,
        marked,
    })
}

/// Analyzes every checkbox, in order. Regions are numbered from 1.
#[time]
pub fn detect_marks(
    image: &GrayImage,
    rectangles: &[CheckboxRect],
    matrix: &AffineMatrix,
) -> Result<Vec<RegionAnalysis>, ImageLoadError> {
    rectangles
        .iter()
        .enumerate()
        .map(|(i, rect)| analyze_region(image, rect, matrix, i + 1))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use image::Luma;
    use imageproc::drawing::{
        draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    };

    use super::*;
    use crate::image_utils::BLACK;

    /// Draws a square checkbox outline `thickness` pixels wide.
    pub(crate) fn draw_box(img: &mut GrayImage, left: i32, top: i32, size: u32, thickness: u32) {
        for i in 0..thickness {
            draw_hollow_rect_mut(
                img,
                Rect::at(left + i as i32, top + i as i32).of_size(size - 2 * i, size - 2 * i),
                BLACK,
            );
        }
    }

    /// Draws a thick X centred in a box drawn by `draw_box`.
    pub(crate) fn draw_cross(img: &mut GrayImage, left: i32, top: i32, size: u32) {
        let (start, end) = ((left + 10) as f32, (left + size as i32 - 11) as f32);
        let (y_start, y_end) = ((top + 10) as f32, (top + size as i32 - 11) as f32);
        for offset in 0..2 {
            let dx = offset as f32;
            draw_line_segment_mut(img, (start + dx, y_start), (end + dx, y_end), BLACK);
            draw_line_segment_mut(img, (end + dx, y_start), (start + dx, y_end), BLACK);
        }
    }

    /// Corners of a square of half-side `half` centred on `center`, rotated
    /// by `degrees`.
    fn rotated_square(center: (f64, f64), half: f64, degrees: f64) -> Vec<Point<i32>> {
        let (sin, cos) = degrees.to_radians().sin_cos();
        [(-half, -half), (half, -half), (half, half), (-half, half)]
            .iter()
            .map(|&(dx, dy)| {
                Point::new(
                    (center.0 + dx * cos - dy * sin).round() as i32,
                    (center.1 + dx * sin + dy * cos).round() as i32,
                )
            })
            .collect()
    }

    /// Draws a checkbox outline as it looks in a photo taken at an angle.
    pub(crate) fn draw_rotated_box(img: &mut GrayImage, center: (f64, f64), size: f64, thickness: f64, degrees: f64) {
        draw_polygon_mut(img, &rotated_square(center, size / 2.0, degrees), BLACK);
        draw_polygon_mut(img, &rotated_square(center, size / 2.0 - thickness, degrees), WHITE);
    }

    /// Draws a two pixel wide X with arms reaching `arm` pixels from
    /// `center` along each axis, rotated by `degrees`.
    pub(crate) fn draw_rotated_cross(img: &mut GrayImage, center: (f64, f64), arm: f64, degrees: f64) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let at = |dx: f64, dy: f64| {
            (
                (center.0 + dx * cos - dy * sin) as f32,
                (center.1 + dx * sin + dy * cos) as f32,
            )
        };
        for offset in 0..2 {
            let dx = offset as f32;
            for (from, to) in [(at(-arm, -arm), at(arm, arm)), (at(arm, -arm), at(-arm, arm))] {
                draw_line_segment_mut(img, (from.0 + dx, from.1), (to.0 + dx, to.1), BLACK);
            }
        }
    }

    const TILTS: [f64; 10] = [-6.0, -5.0, -4.0, -3.0, -2.0, 2.0, 3.0, 4.0, 5.0, 6.0];

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, WHITE)
    }

    fn square(left: i32, top: i32, size: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(left, top),
            Point::new(left + size, top),
            Point::new(left + size, top + size),
            Point::new(left, top + size),
        ]
    }

    #[test]
    fn test_empty_box_is_not_marked() {
        let mut img = blank(60, 60);
        draw_box(&mut img, 10, 10, 40, 3);
        let contours = analyze_crop(&img);
        assert_eq!(contours.len(), 1, "{:?}", contours);
        assert_eq!(contours[0].shape, ContourShape::EmptyOutline);
        assert_eq!(contours[0].polygon.len(), 4);
    }

    #[test]
    fn test_crossed_box_is_marked() {
        let mut img = blank(60, 60);
        draw_box(&mut img, 10, 10, 40, 3);
        draw_cross(&mut img, 10, 10, 40);
        let contours = analyze_crop(&img);
        assert!(contours.iter().any(|c| c.shape == ContourShape::Mark), "{:?}", contours);
    }

    #[test]
    fn test_tilted_empty_box_is_not_marked() {
        for degrees in TILTS {
            let mut img = blank(80, 80);
            draw_rotated_box(&mut img, (40.0, 40.0), 40.0, 3.0, degrees);
            let contours = analyze_crop(&img);
            assert_eq!(contours.len(), 1, "{}°: {:?}", degrees, contours);
            assert_eq!(contours[0].polygon.len(), 4, "{}°: {:?}", degrees, contours);
            assert_eq!(contours[0].shape, ContourShape::EmptyOutline, "{}°: {:?}", degrees, contours);
        }
    }

    #[test]
    fn test_tilted_crossed_box_is_marked() {
        for degrees in TILTS {
            let mut img = blank(80, 80);
            draw_rotated_box(&mut img, (40.0, 40.0), 40.0, 3.0, degrees);
            draw_rotated_cross(&mut img, (40.0, 40.0), 9.0, degrees);
            let contours = analyze_crop(&img);
            assert!(
                contours.iter().any(|c| c.shape == ContourShape::EmptyOutline),
                "{}°: {:?}",
                degrees,
                contours
            );
            assert!(
                contours.iter().any(|c| c.shape == ContourShape::Mark),
                "{}°: {:?}",
                degrees,
                contours
            );
        }
    }

    #[test]
    fn test_filled_dot_is_marked() {
        let mut img = blank(60, 60);
        draw_box(&mut img, 10, 10, 40, 3);
        draw_filled_circle_mut(&mut img, (30, 30), 7, BLACK);
        let contours = analyze_crop(&img);
        assert!(contours.iter().any(|c| c.shape == ContourShape::Mark), "{:?}", contours);
        assert!(contours.iter().any(|c| c.shape == ContourShape::EmptyOutline), "{:?}", contours);
    }

    #[test]
    fn test_blank_crop_has_no_contours() {
        assert!(analyze_crop(&blank(30, 30)).is_empty());
    }

    #[test]
    fn test_light_ink_is_ignored() {
        let mut img = blank(60, 60);
        draw_filled_circle_mut(&mut img, (30, 30), 7, Luma([200u8]));
        assert!(analyze_crop(&img).is_empty());
    }

    #[test]
    fn test_specks_are_noise() {
        let mut img = blank(30, 30);
        img.put_pixel(5, 5, BLACK);
        img.put_pixel(20, 20, BLACK);
        img.put_pixel(21, 20, BLACK);
        assert!(simplified_contours(&threshold_inverse(&img, INK_THRESHOLD)).is_empty());
    }

    #[test]
    fn test_classify_contour() {
        assert_eq!(classify_contour(&square(0, 0, 20)), ContourShape::EmptyOutline);

        let slanted = vec![
            Point::new(0, 0),
            Point::new(20, 0),
            Point::new(30, 20),
            Point::new(10, 20),
        ];
        assert_eq!(classify_contour(&slanted), ContourShape::Mark);

        let triangle = vec![Point::new(0, 0), Point::new(20, 0), Point::new(0, 20)];
        assert_eq!(classify_contour(&triangle), ContourShape::Mark);

        let slightly_skewed = vec![
            Point::new(0, 0),
            Point::new(40, 0),
            Point::new(43, 40),
            Point::new(3, 40),
        ];
        assert_eq!(classify_contour(&slightly_skewed), ContourShape::EmptyOutline);
    }

    #[test]
    fn test_near_duplicates_collapse_to_largest() {
        let outer = square(0, 0, 40);
        let middle = square(3, 3, 34);
        let inner = square(6, 6, 28);
        let elsewhere = square(100, 100, 20);

        let survivors = deduplicate_contours(vec![inner, elsewhere.clone(), middle, outer.clone()]);
        assert_eq!(survivors, vec![elsewhere, outer]);
    }

    #[test]
    fn test_near_duplicate_is_directional() {
        let corner_tick = vec![Point::new(2, 2), Point::new(8, 2), Point::new(2, 8)];
        let outline = square(0, 0, 100);
        assert!(is_near_duplicate(&corner_tick, &outline));
        assert!(!is_near_duplicate(&outline, &corner_tick));
        assert_eq!(deduplicate_contours(vec![corner_tick, outline.clone()]), vec![outline]);
    }

    #[test]
    fn test_crop_window_follows_transform() {
        let rect = CheckboxRect::new(10.0, 20.0, 30.0, 50.0);
        let matrix = AffineMatrix::similarity(2.0, 0.0, 5.0, 7.0);
        let window = crop_window(&rect, &matrix, (200, 200), 1).expect("window");
        assert_eq!(window, Rect::at(25, 47).of_size(40, 60));

        let flipped = AffineMatrix::similarity(-1.0, 0.0, 100.0, 100.0);
        let window = crop_window(&rect, &flipped, (200, 200), 1).expect("window");
        assert_eq!(window, Rect::at(70, 50).of_size(20, 30));
    }

    #[test]
    fn test_crop_window_outside_image_fails() {
        let rect = CheckboxRect::new(10.0, 20.0, 30.0, 50.0);
        let shifted = AffineMatrix::similarity(1.0, 0.0, -15.0, 0.0);
        assert!(matches!(
            crop_window(&rect, &shifted, (200, 200), 3),
            Err(ImageLoadError::CropOutOfBounds { region: 3, .. })
        ));
        assert!(matches!(
            crop_window(&rect, &AffineMatrix::identity(), (25, 200), 1),
            Err(ImageLoadError::CropOutOfBounds { .. })
        ));

        let degenerate = CheckboxRect::new(10.0, 20.0, 10.5, 50.0);
        assert!(matches!(
            crop_window(&degenerate, &AffineMatrix::identity(), (200, 200), 2),
            Err(ImageLoadError::EmptyCrop { region: 2 })
        ));
    }

    #[test]
    fn test_detect_marks_through_transform() {
        let mut img = blank(400, 160);
        let lefts = [30, 120, 210, 300];
        for left in lefts {
            draw_box(&mut img, left, 60, 40, 3);
        }
        draw_cross(&mut img, 210, 60, 40);

        // template coordinates are the image shifted by (-20, -40) and halved
        let rectangles = lefts
            .iter()
            .map(|&left| {
                let (x, y) = ((left - 10 - 20) as f64 / 2.0, (50 - 40) as f64 / 2.0);
                CheckboxRect::new(x, y, x + 30.0, y + 30.0)
            })
            .collect::<Vec<_>>();
        let matrix = AffineMatrix::similarity(2.0, 0.0, 20.0, 40.0);

        let regions = detect_marks(&img, &rectangles, &matrix).expect("regions");
        assert_eq!(
            regions.iter().map(|r| r.marked).collect::<Vec<_>>(),
            vec![false, false, true, false]
        );
        assert_eq!(regions[0].window, Rect::at(20, 50).of_size(60, 60));
    }
}
