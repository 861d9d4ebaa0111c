//! 要素几何到 CAD 实体的转换。
//!
//! 每个要素先完整校验、生成实体列表，再逐个打标记写入模型空间；
//! 校验失败的要素整体跳过，不会留下半个要素。

use geo::{Centroid, InteriorPoint};
use mapsync_config::{LayerConfig, PointSymbolConfig};
use mapsync_core::document::{
    Arc, Circle, Document, Entity, EntityKind, Hatch, HatchPath, HatchPathKind, HatchPattern,
    Insert, MText, Point, Polyline, Text,
};
use mapsync_core::feature::{AttributeValue, FeatureGeometry, GeometryFeature, PolygonRings};
use mapsync_core::geometry::{Point2, Vector2, path_length, point_along};
use tracing::{debug, warn};

use crate::decorations::path_block_inserts;
use crate::envelope::{envelope, from_geo_polygon, to_geo_polygon};
use crate::errors::GeometryError;
use crate::lifecycle::label_layer_name;
use crate::ownership::{OwnershipTag, attach};
use crate::style::ResolvedStyle;

/// 判断首尾点重合的容差。
const CLOSE_TOLERANCE: f64 = 1e-9;

/// 未配置标注列时依次尝试的属性名。
const LABEL_COLUMNS: [&str; 5] = ["label", "name", "id", "text", "description"];

/// 一次渲染的新增与跳过计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub added: usize,
    pub skipped: usize,
}

/// 单个图层的渲染器，持有该图层已解析的样式。
pub struct GeometryRenderer<'a> {
    layer: &'a LayerConfig,
    style: &'a ResolvedStyle,
    tag: &'a OwnershipTag,
    label_layer: String,
}

impl<'a> GeometryRenderer<'a> {
    pub fn new(layer: &'a LayerConfig, style: &'a ResolvedStyle, tag: &'a OwnershipTag) -> Self {
        Self {
            layer,
            style,
            tag,
            label_layer: label_layer_name(&layer.name),
        }
    }

    /// 渲染全部要素。单个要素失败只记录告警。
    pub fn render_layer(&self, document: &mut Document, features: &[GeometryFeature]) -> RenderStats {
        if let Some(path_blocks) = &self.layer.path_blocks {
            if !document.blocks().has(&path_blocks.block) {
                warn!(layer = %self.layer.name, block = %path_blocks.block, "沿线插入的块不存在，已忽略");
            }
        }

        let mut stats = RenderStats::default();
        for (index, feature) in features.iter().enumerate() {
            match self.render_feature(document, feature) {
                Ok(added) => stats.added += added,
                Err(err) => {
                    stats.skipped += 1;
                    warn!(
                        layer = %self.layer.name,
                        feature = feature.id.as_deref().unwrap_or("-"),
                        index,
                        error = %err,
                        "要素几何无效，已跳过"
                    );
                }
            }
        }
        debug!(layer = %self.layer.name, added = stats.added, skipped = stats.skipped, "图层渲染完成");
        stats
    }

    /// 渲染单个要素，返回写入的实体数。
    pub fn render_feature(
        &self,
        document: &mut Document,
        feature: &GeometryFeature,
    ) -> Result<usize, GeometryError> {
        let geometry = feature
            .geometry
            .as_ref()
            .filter(|geometry| !geometry.is_empty())
            .ok_or(GeometryError::Empty)?;
        validate(geometry)?;

        let mut entities = Vec::new();
        self.build(document, feature, geometry, &mut entities);
        if let Some(label) = self.label_entity(feature, geometry) {
            entities.push(label);
        }

        let count = entities.len();
        for mut entity in entities {
            attach(&mut entity, self.tag)?;
            document.add_model_entity(entity)?;
        }
        Ok(count)
    }

    fn build(
        &self,
        document: &Document,
        feature: &GeometryFeature,
        geometry: &FeatureGeometry,
        out: &mut Vec<Entity>,
    ) {
        match geometry {
            FeatureGeometry::Point(point) => out.push(self.point_symbol(document, feature, *point)),
            FeatureGeometry::LineString(points) => self.line(document, points, out),
            FeatureGeometry::Polygon(rings) => self.polygon(rings, out),
            FeatureGeometry::MultiPoint(points) => {
                for point in points {
                    out.push(self.point_symbol(document, feature, *point));
                }
            }
            FeatureGeometry::MultiLineString(lines) => {
                for line in lines {
                    self.line(document, line, out);
                }
            }
            FeatureGeometry::MultiPolygon(polygons) => {
                for rings in polygons {
                    self.polygon(rings, out);
                }
            }
            FeatureGeometry::Collection(parts) => {
                for part in parts.iter().filter(|part| !part.is_empty()) {
                    self.build(document, feature, part, out);
                }
            }
        }
    }

    fn entity(&self, kind: EntityKind) -> Entity {
        Entity::new(self.layer.name.as_str(), kind)
    }

    fn point_symbol(&self, document: &Document, feature: &GeometryFeature, location: Point2) -> Entity {
        match &self.layer.point_symbol {
            PointSymbolConfig::Point => self.entity(EntityKind::Point(Point { location })),
            PointSymbolConfig::Circle {
                radius,
                radius_column,
                start_angle_column,
                end_angle_column,
            } => {
                let radius = numeric(feature, radius_column.as_deref())
                    .filter(|value| *value > 0.0)
                    .unwrap_or(*radius);
                let start = numeric(feature, start_angle_column.as_deref());
                let end = numeric(feature, end_angle_column.as_deref());
                match (start, end) {
                    (Some(start), Some(end)) => self.entity(EntityKind::Arc(Arc {
                        center: location,
                        radius,
                        start_angle: start.to_radians(),
                        end_angle: end.to_radians(),
                    })),
                    _ => self.entity(EntityKind::Circle(Circle {
                        center: location,
                        radius,
                    })),
                }
            }
            PointSymbolConfig::Block {
                name,
                scale,
                rotation_column,
            } => {
                if !document.blocks().has(name) {
                    warn!(layer = %self.layer.name, block = %name, "点符号块不存在，退回为点");
                    return self.entity(EntityKind::Point(Point { location }));
                }
                let rotation = numeric(feature, rotation_column.as_deref()).unwrap_or(0.0);
                self.entity(EntityKind::Insert(Insert {
                    block_name: name.clone(),
                    insert: location,
                    scale: Vector2::new(*scale, *scale),
                    rotation: rotation.to_radians(),
                }))
            }
            PointSymbolConfig::Text { column } => {
                match label_text(feature, column.as_deref()) {
                    Some(content) => self.text_entity(&self.layer.name, location, content),
                    None => self.entity(EntityKind::Point(Point { location })),
                }
            }
        }
    }

    fn line(&self, document: &Document, points: &[Point2], out: &mut Vec<Entity>) {
        let mut vertices = points.to_vec();
        let mut closed = false;
        if self.layer.close_linestrings && vertices.len() > 3 {
            if let (Some(first), Some(last)) = (vertices.first(), vertices.last()) {
                if first.coincides(*last, CLOSE_TOLERANCE) {
                    vertices.pop();
                    closed = true;
                }
            }
        }
        out.push(self.entity(EntityKind::Polyline(Polyline::from_points(
            vertices, closed,
        ))));

        if let Some(config) = &self.layer.path_blocks {
            if document.blocks().has(&config.block) {
                out.extend(
                    path_block_inserts(points, config)
                        .into_iter()
                        .map(|insert| self.entity(EntityKind::Insert(insert))),
                );
            }
        }
    }

    fn polygon(&self, rings: &PolygonRings, out: &mut Vec<Entity>) {
        let Some(config) = &self.layer.envelope else {
            self.polygon_entities(rings, out);
            return;
        };
        match envelope(&to_geo_polygon(rings), config.padding, config.min_ratio, config.cap_style) {
            Some(shape) => {
                for part in &shape.0 {
                    self.polygon_entities(&from_geo_polygon(part), out);
                }
            }
            None => {
                warn!(layer = %self.layer.name, "包络计算失败，保留原始多边形");
                self.polygon_entities(rings, out);
            }
        }
    }

    fn polygon_entities(&self, rings: &PolygonRings, out: &mut Vec<Entity>) {
        let exterior = open_ring(&rings.exterior);
        let interiors: Vec<Vec<Point2>> = rings.interiors.iter().map(|ring| open_ring(ring)).collect();

        if !self.layer.hatch_only {
            for ring in std::iter::once(&exterior).chain(interiors.iter()) {
                out.push(self.entity(EntityKind::Polyline(Polyline::from_points(
                    ring.iter().copied(),
                    true,
                ))));
            }
        }

        let (pattern, color) = match &self.style.hatch {
            Some(hatch) => (hatch.pattern.clone(), hatch.color),
            None if self.layer.hatch_only => (HatchPattern::Solid, Default::default()),
            None => return,
        };
        let mut paths = vec![HatchPath {
            kind: HatchPathKind::External,
            vertices: exterior,
        }];
        paths.extend(interiors.into_iter().map(|vertices| HatchPath {
            kind: HatchPathKind::Hole,
            vertices,
        }));
        let mut hatch = self.entity(EntityKind::Hatch(Hatch { pattern, paths }));
        hatch.common.color = color;
        out.push(hatch);
    }

    fn label_entity(&self, feature: &GeometryFeature, geometry: &FeatureGeometry) -> Option<Entity> {
        let config = self.layer.label.as_ref().filter(|label| label.enabled)?;
        let content = label_text(feature, config.column.as_deref())?;
        let mut position = label_position(geometry)?;
        if matches!(geometry, FeatureGeometry::Point(_) | FeatureGeometry::MultiPoint(_)) {
            let [dx, dy] = config.offset;
            position = position.translate(Vector2::new(dx, dy));
        }
        Some(self.text_entity(&self.label_layer, position, content))
    }

    /// 多行内容用 MTEXT 保留精确附着点，单行用 TEXT 近似对齐。
    fn text_entity(&self, layer: &str, insert: Point2, content: String) -> Entity {
        let text = &self.style.text;
        let kind = if content.contains('\n') {
            EntityKind::MText(MText {
                insert,
                content,
                height: text.height,
                reference_width: text.max_width,
                attachment: text.attachment,
                rotation: 0.0,
                style: Some(text.style.clone()),
            })
        } else {
            let (halign, valign) = text.attachment.text_alignment();
            EntityKind::Text(Text {
                insert,
                content,
                height: text.height,
                rotation: 0.0,
                style: Some(text.style.clone()),
                halign,
                valign,
            })
        };
        let mut entity = Entity::new(layer, kind);
        entity.common.color = text.color;
        entity
    }
}

/// 递归校验几何：坐标必须有限，线至少 2 点，环至少 3 个不同顶点。
pub fn validate(geometry: &FeatureGeometry) -> Result<(), GeometryError> {
    let kind = geometry.type_name();
    let finite = |points: &[Point2]| {
        if points.iter().all(|point| point.is_finite()) {
            Ok(())
        } else {
            Err(GeometryError::NonFinite(kind))
        }
    };
    let line = |points: &[Point2]| {
        finite(points)?;
        if points.len() < 2 {
            return Err(GeometryError::TooFewPoints {
                kind,
                count: points.len(),
                required: 2,
            });
        }
        Ok(())
    };
    let polygon = |rings: &PolygonRings| {
        for ring in std::iter::once(&rings.exterior).chain(rings.interiors.iter()) {
            finite(ring.as_slice())?;
            let count = open_ring(ring).len();
            if count < 3 {
                return Err(GeometryError::TooFewPoints {
                    kind,
                    count,
                    required: 3,
                });
            }
        }
        Ok(())
    };

    match geometry {
        FeatureGeometry::Point(point) => finite(std::slice::from_ref(point)),
        FeatureGeometry::MultiPoint(points) => finite(points.as_slice()),
        FeatureGeometry::LineString(points) => line(points.as_slice()),
        FeatureGeometry::MultiLineString(lines) => {
            lines.iter().try_for_each(|points| line(points.as_slice()))
        }
        FeatureGeometry::Polygon(rings) => polygon(rings),
        FeatureGeometry::MultiPolygon(polygons) => {
            polygons.iter().try_for_each(|rings| polygon(rings))
        }
        FeatureGeometry::Collection(parts) => parts
            .iter()
            .filter(|part| !part.is_empty())
            .try_for_each(validate),
    }
}

/// 读取数值属性，缺失或非有限值返回 `None`。
fn numeric(feature: &GeometryFeature, column: Option<&str>) -> Option<f64> {
    column
        .and_then(|column| feature.attribute(column))
        .and_then(AttributeValue::as_f64)
        .filter(|value| value.is_finite())
}

/// 标注文字：指定列 → 要素自带标注 → 常见属性名 → 要素 ID。
pub fn label_text(feature: &GeometryFeature, column: Option<&str>) -> Option<String> {
    if let Some(column) = column {
        if let Some(value) = feature.attribute(column).filter(|value| !value.is_blank()) {
            return Some(value.to_string());
        }
    }
    if let Some(label) = feature.label.as_deref().filter(|label| !label.trim().is_empty()) {
        return Some(label.to_string());
    }
    LABEL_COLUMNS
        .iter()
        .find_map(|name| feature.attribute(name).filter(|value| !value.is_blank()))
        .map(ToString::to_string)
        .or_else(|| feature.id.clone().filter(|id| !id.trim().is_empty()))
}

/// 标注位置：点取自身，线取弧长中点，面取内部点（退回质心、外包框中心）。
/// 多部件几何取最长或面积最大的部件。
pub fn label_position(geometry: &FeatureGeometry) -> Option<Point2> {
    match geometry {
        FeatureGeometry::Point(point) => Some(*point),
        FeatureGeometry::MultiPoint(points) => points.first().copied(),
        FeatureGeometry::LineString(points) => line_midpoint(points),
        FeatureGeometry::MultiLineString(lines) => lines
            .iter()
            .max_by(|a, b| path_length(a).total_cmp(&path_length(b)))
            .and_then(|line| line_midpoint(line)),
        FeatureGeometry::Polygon(rings) => polygon_label_point(rings),
        FeatureGeometry::MultiPolygon(polygons) => polygons
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
            .and_then(polygon_label_point),
        FeatureGeometry::Collection(parts) => parts.iter().find_map(label_position),
    }
}

fn line_midpoint(points: &[Point2]) -> Option<Point2> {
    let half = path_length(points) / 2.0;
    point_along(points, half)
        .map(|(point, _)| point)
        .or_else(|| points.first().copied())
}

fn polygon_label_point(rings: &PolygonRings) -> Option<Point2> {
    let polygon = to_geo_polygon(rings);
    polygon
        .interior_point()
        .or_else(|| polygon.centroid())
        .map(|point| Point2::new(point.x(), point.y()))
        .or_else(|| {
            let bounds = FeatureGeometry::Polygon(rings.clone()).bounds();
            (!bounds.is_empty()).then(|| bounds.center())
        })
}

fn open_ring(ring: &[Point2]) -> Vec<Point2> {
    match ring {
        [first, .., last] if first.coincides(*last, CLOSE_TOLERANCE) => {
            ring[..ring.len() - 1].to_vec()
        }
        _ => ring.to_vec(),
    }
}
