//! 带弯折检测的包络生成。
//!
//! 输入多边形先求最小面积外接矩形（MBR）。面积占比过低说明形状有明显弯折，
//! 此时在最尖锐的凹顶点处切开，分别求包络后合并；否则沿 MBR 轴向外扩 `padding`
//! 得到矩形或胶囊形包络。

use std::f64::consts::PI;

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, ConvexHull, Coord, LineString, MultiPolygon,
    Polygon,
};
use mapsync_config::CapStyle;
use mapsync_core::feature::PolygonRings;
use mapsync_core::geometry::Point2;
use tracing::debug;

/// 面积 / MBR 面积低于该值时视为弯折。
pub const BEND_THRESHOLD: f64 = 0.8;
/// 弯折切分的最大递归深度。
pub const MAX_DEPTH: usize = 3;
/// 面积不超过该值的切分部分被丢弃。
pub const MIN_PART_AREA: f64 = 1e-3;
/// 圆头包络每个端圆的分段数。
const CIRCLE_SEGMENTS: usize = 64;

/// 任意旋转角下的最小面积外接矩形。`axis` 为长边方向的单位向量。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedRect {
    pub center: Coord<f64>,
    pub axis: Coord<f64>,
    pub half_length: f64,
    pub half_width: f64,
}

impl OrientedRect {
    pub fn area(&self) -> f64 {
        4.0 * self.half_length * self.half_width
    }

    /// 长边 / 短边。退化为线段时为无穷大。
    pub fn aspect_ratio(&self) -> f64 {
        if self.half_width <= f64::EPSILON {
            f64::INFINITY
        } else {
            self.half_length / self.half_width
        }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        rectangle(self.center, self.axis, self.half_length, self.half_width)
    }
}

/// 旋转卡壳：对凸包的每条边求该方向上的外接矩形，取面积最小者。
pub fn minimum_bounding_rect(polygon: &Polygon<f64>) -> Option<OrientedRect> {
    let hull = polygon.convex_hull();
    let points = &hull.exterior().0;
    if points.len() < 2 {
        return None;
    }

    let mut best: Option<(f64, OrientedRect)> = None;
    for pair in points.windows(2) {
        let edge = pair[1] - pair[0];
        let length = edge.x.hypot(edge.y);
        if length <= f64::EPSILON {
            continue;
        }
        let u = Coord {
            x: edge.x / length,
            y: edge.y / length,
        };
        let v = perpendicular(u);
        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for point in points {
            let pu = dot(*point, u);
            let pv = dot(*point, v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }
        let area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().is_some_and(|(current, _)| area >= *current - 1e-12) {
            continue;
        }
        let mid_u = (min_u + max_u) / 2.0;
        let mid_v = (min_v + max_v) / 2.0;
        let center = Coord {
            x: u.x * mid_u + v.x * mid_v,
            y: u.y * mid_u + v.y * mid_v,
        };
        let (extent_u, extent_v) = ((max_u - min_u) / 2.0, (max_v - min_v) / 2.0);
        let rect = if extent_u >= extent_v {
            OrientedRect {
                center,
                axis: u,
                half_length: extent_u,
                half_width: extent_v,
            }
        } else {
            OrientedRect {
                center,
                axis: v,
                half_length: extent_v,
                half_width: extent_u,
            }
        };
        best = Some((area, rect));
    }
    best.map(|(_, rect)| rect)
}

/// 生成多边形的包络。空的、退化的或含非有限坐标的输入返回 `None`。
///
/// 结果可能由两个不相连的子包络组成，因此返回多多边形。
pub fn envelope(
    polygon: &Polygon<f64>,
    padding: f64,
    min_ratio: Option<f64>,
    cap_style: CapStyle,
) -> Option<MultiPolygon<f64>> {
    envelope_at(polygon, padding, min_ratio, cap_style, 0)
}

fn envelope_at(
    polygon: &Polygon<f64>,
    padding: f64,
    min_ratio: Option<f64>,
    cap_style: CapStyle,
    depth: usize,
) -> Option<MultiPolygon<f64>> {
    if !is_usable(polygon) {
        return None;
    }
    let mbr = minimum_bounding_rect(polygon)?;
    let below_ratio = |rect: &OrientedRect| min_ratio.is_some_and(|ratio| rect.aspect_ratio() < ratio);
    if below_ratio(&mbr) {
        return Some(MultiPolygon::new(vec![polygon.clone()]));
    }

    let area = polygon.unsigned_area();
    let bent = mbr.area() > 0.0 && area / mbr.area() < BEND_THRESHOLD;
    if bent && depth < MAX_DEPTH && area > MIN_PART_AREA {
        if let Some((first, second)) = split_at_bend(polygon) {
            let parts = (
                envelope_at(&first, padding, min_ratio, cap_style, depth + 1),
                envelope_at(&second, padding, min_ratio, cap_style, depth + 1),
            );
            if let (Some(first), Some(second)) = parts {
                debug!(depth, "弯折切分后合并子包络");
                return Some(first.union(&second));
            }
        }
    }

    // 两段式长宽比检查：此处与入口处使用同一个 MBR，当前不会命中。
    // 保留该分支以维持“原多边形 / MBR 回退”两道判断的结构，不要合并或删除。
    if below_ratio(&mbr) {
        return Some(MultiPolygon::new(vec![polygon.clone()]));
    }

    Some(padded_shape(polygon, &mbr, padding, cap_style).unwrap_or_else(|| {
        debug!("包络构造失败，退回 MBR");
        MultiPolygon::new(vec![mbr.to_polygon()])
    }))
}

fn padded_shape(
    polygon: &Polygon<f64>,
    mbr: &OrientedRect,
    padding: f64,
    cap_style: CapStyle,
) -> Option<MultiPolygon<f64>> {
    let centroid = polygon.centroid()?.0;
    let axis = mbr.axis;
    let normal = perpendicular(axis);
    let (mut half_main, mut half_perp) = (0.0f64, 0.0f64);
    for point in polygon.exterior().coords() {
        let offset = *point - centroid;
        half_main = half_main.max(dot(offset, axis).abs());
        half_perp = half_perp.max(dot(offset, normal).abs());
    }
    let padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
    let half_main = half_main + padding;
    let half_perp = half_perp + padding;

    match cap_style {
        CapStyle::Square => Some(MultiPolygon::new(vec![rectangle(
            centroid, axis, half_main, half_perp,
        )])),
        CapStyle::Round => {
            let radius = half_perp;
            if radius > half_main {
                return Some(MultiPolygon::new(vec![mbr.to_polygon()]));
            }
            if radius <= f64::EPSILON {
                return None;
            }
            let core = half_main - radius;
            let ends = [
                centroid + axis * core,
                centroid - axis * core,
            ];
            let mut shape = MultiPolygon::new(vec![circle(ends[0], radius)]);
            shape = shape.union(&MultiPolygon::new(vec![circle(ends[1], radius)]));
            if core > f64::EPSILON {
                shape = shape.union(&MultiPolygon::new(vec![rectangle(
                    centroid, axis, core, radius,
                )]));
            }
            (!shape.0.is_empty()).then_some(shape)
        }
    }
}

/// 在最尖锐的凹顶点处切开多边形，返回面积最大的两部分。
fn split_at_bend(polygon: &Polygon<f64>) -> Option<(Polygon<f64>, Polygon<f64>)> {
    let ring = open_ring(polygon.exterior());
    let count = ring.len();
    if count < 4 {
        return None;
    }
    let counter_clockwise = signed_area(&ring) > 0.0;

    let mut sharpest: Option<(usize, f64)> = None;
    for index in 0..count {
        let previous = ring[(index + count - 1) % count];
        let current = ring[index];
        let next = ring[(index + 1) % count];
        let incoming = current - previous;
        let outgoing = next - current;
        let turn = cross(incoming, outgoing);
        let reflex = if counter_clockwise { turn < 0.0 } else { turn > 0.0 };
        if !reflex {
            continue;
        }
        let angle = turn.abs().atan2(dot(incoming, outgoing));
        if sharpest.is_none_or(|(_, best)| angle > best) {
            sharpest = Some((index, angle));
        }
    }
    let (index, _) = sharpest?;

    let vertex = ring[index];
    let back = normalized(ring[(index + count - 1) % count] - vertex)?;
    let forward = normalized(ring[(index + 1) % count] - vertex)?;
    let bisector = normalized(back + forward).unwrap_or_else(|| perpendicular(back));
    let direction = perpendicular(bisector);

    let bounds = polygon.bounding_rect()?;
    let diagonal = (bounds.width()).hypot(bounds.height());
    let reach = diagonal * 2.0;
    let epsilon = (diagonal * 1e-6).max(1e-9);
    let cutter = rectangle(vertex, direction, reach, epsilon);

    let mut parts: Vec<Polygon<f64>> = polygon
        .difference(&cutter)
        .0
        .into_iter()
        .filter(|part| part.unsigned_area() > MIN_PART_AREA)
        .collect();
    if parts.len() < 2 {
        return None;
    }
    parts.sort_by(|a, b| b.unsigned_area().total_cmp(&a.unsigned_area()));
    let mut parts = parts.into_iter();
    Some((parts.next()?, parts.next()?))
}

fn is_usable(polygon: &Polygon<f64>) -> bool {
    let ring = open_ring(polygon.exterior());
    ring.len() >= 3
        && ring.iter().all(|point| point.x.is_finite() && point.y.is_finite())
        && polygon.unsigned_area() > 0.0
}

/// 去掉与首点重合的闭合点。
fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut points = ring.0.clone();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let count = ring.len();
    (0..count)
        .map(|index| cross(ring[index], ring[(index + 1) % count]))
        .sum::<f64>()
        / 2.0
}

fn rectangle(center: Coord<f64>, axis: Coord<f64>, half_length: f64, half_width: f64) -> Polygon<f64> {
    let along = axis * half_length;
    let across = perpendicular(axis) * half_width;
    Polygon::new(
        LineString::from(vec![
            center - along - across,
            center + along - across,
            center + along + across,
            center - along + across,
        ]),
        Vec::new(),
    )
}

fn circle(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let points = (0..CIRCLE_SEGMENTS)
        .map(|step| {
            let angle = 2.0 * PI * step as f64 / CIRCLE_SEGMENTS as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect::<Vec<_>>();
    Polygon::new(LineString::from(points), Vec::new())
}

#[inline]
fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

#[inline]
fn cross(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

#[inline]
fn perpendicular(v: Coord<f64>) -> Coord<f64> {
    Coord { x: -v.y, y: v.x }
}

fn normalized(v: Coord<f64>) -> Option<Coord<f64>> {
    let length = v.x.hypot(v.y);
    (length > f64::EPSILON).then(|| Coord {
        x: v.x / length,
        y: v.y / length,
    })
}

/// 要素多边形转为 geo 多边形。
pub fn to_geo_polygon(rings: &PolygonRings) -> Polygon<f64> {
    let ring = |points: &[Point2]| {
        LineString::from(
            points
                .iter()
                .map(|point| Coord {
                    x: point.x(),
                    y: point.y(),
                })
                .collect::<Vec<_>>(),
        )
    };
    Polygon::new(
        ring(rings.exterior.as_slice()),
        rings
            .interiors
            .iter()
            .map(|interior| ring(interior.as_slice()))
            .collect(),
    )
}

/// geo 多边形转回要素多边形，环不重复首点。
pub fn from_geo_polygon(polygon: &Polygon<f64>) -> PolygonRings {
    let ring = |line: &LineString<f64>| {
        open_ring(line)
            .into_iter()
            .map(|coord| Point2::new(coord.x, coord.y))
            .collect::<Vec<_>>()
    };
    PolygonRings::new(
        ring(polygon.exterior()),
        polygon.interiors().iter().map(ring).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon(points: &[(f64, f64)]) -> Polygon<f64> {
        Polygon::new(LineString::from(points.to_vec()), Vec::new())
    }

    fn total_area(shape: &MultiPolygon<f64>) -> f64 {
        shape.unsigned_area()
    }

    fn rotated_rectangle(width: f64, height: f64, degrees: f64) -> Polygon<f64> {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let corners = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];
        polygon(
            &corners
                .iter()
                .map(|(x, y)| (x * cos - y * sin + 3.0, x * sin + y * cos - 2.0))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn mbr_of_rotated_rectangle_matches_its_sides() {
        let rect = minimum_bounding_rect(&rotated_rectangle(2.0, 8.0, 30.0)).unwrap();
        assert!((rect.half_length - 4.0).abs() < 1e-9);
        assert!((rect.half_width - 1.0).abs() < 1e-9);
        assert!((rect.aspect_ratio() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn near_square_input_is_returned_unchanged() {
        let square = polygon(&[(0.0, 0.0), (10.0, 0.0), (10.0, 9.5), (0.0, 10.0)]);
        let result = envelope(&square, 2.0, Some(2.0), CapStyle::Square).unwrap();
        assert_eq!(result.0.len(), 1);
        assert_eq!(result.0[0], square);
    }

    #[test]
    fn thin_rectangle_gets_square_padding() {
        let strip = polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 10.0), (0.0, 10.0)]);
        let result = envelope(&strip, 1.0, Some(2.0), CapStyle::Square).unwrap();
        assert_eq!(result.0.len(), 1);

        let bounds = result.bounding_rect().unwrap();
        assert!((bounds.min().x + 1.0).abs() < 1e-9);
        assert!((bounds.min().y + 1.0).abs() < 1e-9);
        assert!((bounds.max().x - 2.0).abs() < 1e-9);
        assert!((bounds.max().y - 11.0).abs() < 1e-9);
        // 面积等于外接框面积，说明结果就是轴向不变的 3×12 矩形
        assert!((total_area(&result) - 36.0).abs() < 1e-9);

        let centroid = result.centroid().unwrap();
        assert!((centroid.x() - 0.5).abs() < 1e-9);
        assert!((centroid.y() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn l_shape_is_split_into_two_sub_envelopes() {
        let l_shape = polygon(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 2.0),
            (2.0, 2.0),
            (2.0, 10.0),
            (0.0, 10.0),
        ]);
        let mbr = minimum_bounding_rect(&l_shape).unwrap();
        assert!((mbr.area() - 100.0).abs() < 1e-9);
        assert!(l_shape.unsigned_area() / mbr.area() < BEND_THRESHOLD);

        let (first, second) = split_at_bend(&l_shape).unwrap();
        assert!((first.unsigned_area() - 14.0).abs() < 1e-3);
        assert!((second.unsigned_area() - 14.0).abs() < 1e-3);

        let result = envelope(&l_shape, 0.0, None, CapStyle::Square).unwrap();
        let area = total_area(&result);
        // 两臂都被覆盖，但远小于整个 L 的 MBR
        assert!(area >= 28.0, "area {area}");
        assert!(area < 50.0, "area {area}");
        let bounds = result.bounding_rect().unwrap();
        assert!(bounds.max().x >= 10.0 - 1e-6);
        assert!(bounds.max().y >= 10.0 - 1e-6);
    }

    #[test]
    fn padding_never_shrinks_the_envelope() {
        let shapes = [
            rotated_rectangle(2.0, 8.0, 30.0),
            polygon(&[(0.0, 0.0), (12.0, 0.0), (12.0, 3.0), (6.0, 4.0), (0.0, 3.0)]),
        ];
        for shape in &shapes {
            for cap_style in [CapStyle::Square, CapStyle::Round] {
                let mut previous = 0.0;
                for padding in [0.0, 0.25, 1.0, 3.0] {
                    let area = total_area(&envelope(shape, padding, Some(1.5), cap_style).unwrap());
                    assert!(
                        area + 1e-6 >= previous,
                        "{cap_style:?} padding {padding}: {area} < {previous}"
                    );
                    previous = area;
                }
            }
        }
    }

    #[test]
    fn round_cap_builds_a_capsule() {
        let strip = polygon(&[(0.0, 0.0), (10.0, 0.0), (10.0, 2.0), (0.0, 2.0)]);
        let result = envelope(&strip, 0.0, None, CapStyle::Round).unwrap();
        let expected = 8.0 * 2.0 + PI;
        assert!((total_area(&result) - expected).abs() < 0.05);
        let bounds = result.bounding_rect().unwrap();
        assert!((bounds.width() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn negative_padding_is_clamped() {
        let strip = polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 10.0), (0.0, 10.0)]);
        let result = envelope(&strip, -5.0, None, CapStyle::Square).unwrap();
        assert!((total_area(&result) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_input_yields_nothing() {
        let empty = Polygon::new(LineString::new(Vec::new()), Vec::new());
        assert!(envelope(&empty, 1.0, None, CapStyle::Square).is_none());
        let collinear = polygon(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        assert!(envelope(&collinear, 1.0, None, CapStyle::Square).is_none());
        let infinite = polygon(&[(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0)]);
        assert!(envelope(&infinite, 1.0, None, CapStyle::Square).is_none());
    }

    #[test]
    fn rings_convert_both_ways() {
        let rings = PolygonRings::new(
            vec![Point2::new(0.0, 0.0), Point2::new(4.0, 0.0), Point2::new(4.0, 4.0)],
            vec![vec![
                Point2::new(1.0, 1.0),
                Point2::new(2.0, 1.0),
                Point2::new(2.0, 2.0),
            ]],
        );
        assert_eq!(from_geo_polygon(&to_geo_polygon(&rings)), rings);
    }
}
