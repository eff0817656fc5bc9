use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;

const EXTREME_POINT_HOPS: usize = 3;

/// Converts an integer pixel point into floating point space.
pub fn to_f64(point: &Point<i32>) -> Point<f64> {
    Point::new(point.x as f64, point.y as f64)
}

pub fn distance_from_point_to_point(p1: &Point<f64>, p2: &Point<f64>) -> f64 {
    ((p1.x - p2.x).powi(2) + (p1.y - p2.y).powi(2)).sqrt()
}

/// Perimeter of a closed polygon, including the edge from the last vertex
/// back to the first. A two-vertex polygon is walked there and back.
pub fn closed_perimeter(points: &[Point<i32>]) -> f64 {
    match points.len() {
        2 => 2.0 * arc_length(points, false),
        _ => arc_length(points, true),
    }
}

/// Absolute enclosed area of a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64)
        .sum();
    twice_area.abs() / 2.0
}

/// Angle in degrees at `vertex` between the vectors pointing to `previous`
/// and `next`. Always in `[0, 180]`; degenerate zero-length edges yield 0.
pub fn interior_angle(previous: &Point<i32>, vertex: &Point<i32>, next: &Point<i32>) -> f64 {
    let (ax, ay) = ((previous.x - vertex.x) as f64, (previous.y - vertex.y) as f64);
    let (bx, by) = ((next.x - vertex.x) as f64, (next.y - vertex.y) as f64);
    let norms = ((ax * ax + ay * ay) * (bx * bx + by * by)).sqrt();
    if norms == 0.0 {
        return 0.0;
    }
    let cos = ((ax * bx + ay * by) / norms).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Interior angles of a closed polygon, one per vertex, in vertex order.
pub fn interior_angles(points: &[Point<i32>]) -> Vec<f64> {
    let n = points.len();
    (0..n)
        .map(|i| interior_angle(&points[(i + n - 1) % n], &points[i], &points[(i + 1) % n]))
        .collect()
}

/// Index of the point of `curve` farthest from `curve[from]`, with its
/// distance.
fn farthest_point(curve: &[Point<i32>], from: usize) -> (usize, f64) {
    let origin = to_f64(&curve[from]);
    curve
        .iter()
        .enumerate()
        .map(|(i, p)| (i, distance_from_point_to_point(&origin, &to_f64(p))))
        .fold((from, 0.0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
}

/// Simplifies a closed curve with the Douglas-Peucker algorithm.
///
/// The curve is split into two open halves at a pair of mutually distant
/// extreme points, found by hopping to the farthest point a few times, and
/// each half is simplified on its own. Where the curve happens to start has
/// no effect on which vertices survive.
pub fn approximate_closed_polygon(curve: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if curve.len() <= 2 || epsilon <= 0.0 {
        return curve.to_vec();
    }

    let mut start = 0;
    for _ in 0..EXTREME_POINT_HOPS {
        start = farthest_point(curve, start).0;
    }
    let (end, span) = farthest_point(curve, start);
    if span == 0.0 {
        return vec![curve[0]];
    }

    let mut rotated = curve.to_vec();
    rotated.rotate_left(start);
    let split = (end + curve.len() - start) % curve.len();

    let mut closing_half = rotated[split..].to_vec();
    closing_half.push(rotated[0]);

    let mut polygon = approximate_polygon_dp(&rotated[..=split], epsilon, false);
    let closing = approximate_polygon_dp(&closing_half, epsilon, false);
    polygon.extend_from_slice(&closing[1..closing.len() - 1]);
    polygon
}
