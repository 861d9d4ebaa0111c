//! 外部数据源提供的要素模型。核心只读不写。

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2};

/// 属性值。数值统一为 `f64`，与 GeoJSON/Shapefile 的常见取值保持一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(value) => Some(*value),
            AttributeValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// 空值与空白字符串视为无内容，不参与标注。
    pub fn is_blank(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(value) => write!(f, "{value}"),
            // 整数值不带小数点输出
            AttributeValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            AttributeValue::Number(value) => write!(f, "{value}"),
            AttributeValue::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRings {
    pub exterior: Vec<Point2>,
    pub interiors: Vec<Vec<Point2>>,
}

impl PolygonRings {
    pub fn new(exterior: Vec<Point2>, interiors: Vec<Vec<Point2>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// 外环面积减去孔洞面积（鞋带公式）。
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|ring| ring_area(ring).abs()).sum();
        ring_area(&self.exterior).abs() - holes
    }
}

/// 环的有向面积，逆时针为正。
pub fn ring_area(ring: &[Point2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (index, current) in ring.iter().enumerate() {
        let next = ring[(index + 1) % ring.len()];
        sum += current.x() * next.y() - next.x() * current.y();
    }
    sum * 0.5
}

/// 几何值的封闭变体集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    Point(Point2),
    LineString(Vec<Point2>),
    Polygon(PolygonRings),
    MultiPoint(Vec<Point2>),
    MultiLineString(Vec<Vec<Point2>>),
    MultiPolygon(Vec<PolygonRings>),
    Collection(Vec<FeatureGeometry>),
}

impl FeatureGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureGeometry::Point(_) => "Point",
            FeatureGeometry::LineString(_) => "LineString",
            FeatureGeometry::Polygon(_) => "Polygon",
            FeatureGeometry::MultiPoint(_) => "MultiPoint",
            FeatureGeometry::MultiLineString(_) => "MultiLineString",
            FeatureGeometry::MultiPolygon(_) => "MultiPolygon",
            FeatureGeometry::Collection(_) => "GeometryCollection",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FeatureGeometry::Point(_) => false,
            FeatureGeometry::LineString(points) | FeatureGeometry::MultiPoint(points) => {
                points.is_empty()
            }
            FeatureGeometry::Polygon(rings) => rings.exterior.is_empty(),
            FeatureGeometry::MultiLineString(lines) => lines.iter().all(Vec::is_empty),
            FeatureGeometry::MultiPolygon(polygons) => {
                polygons.iter().all(|rings| rings.exterior.is_empty())
            }
            FeatureGeometry::Collection(parts) => parts.iter().all(FeatureGeometry::is_empty),
        }
    }

    pub fn bounds(&self) -> Bounds2D {
        let mut bounds = Bounds2D::empty();
        self.visit_points(&mut |point| bounds.include_point(point));
        bounds
    }

    fn visit_points(&self, visit: &mut dyn FnMut(Point2)) {
        match self {
            FeatureGeometry::Point(point) => visit(*point),
            FeatureGeometry::LineString(points) | FeatureGeometry::MultiPoint(points) => {
                points.iter().copied().for_each(&mut *visit)
            }
            FeatureGeometry::Polygon(rings) => rings.exterior.iter().copied().for_each(visit),
            FeatureGeometry::MultiLineString(lines) => {
                for line in lines {
                    line.iter().copied().for_each(&mut *visit);
                }
            }
            FeatureGeometry::MultiPolygon(polygons) => {
                for rings in polygons {
                    rings.exterior.iter().copied().for_each(&mut *visit);
                }
            }
            FeatureGeometry::Collection(parts) => {
                for part in parts {
                    part.visit_points(visit);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFeature {
    pub id: Option<String>,
    pub geometry: Option<FeatureGeometry>,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub label: Option<String>,
}

impl GeometryFeature {
    pub fn new(geometry: FeatureGeometry) -> Self {
        Self {
            id: None,
            geometry: Some(geometry),
            attributes: BTreeMap::new(),
            label: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// 属性名按大小写不敏感匹配，优先精确匹配。
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key).or_else(|| {
            self.attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value)
        })
    }
}

/// 单个数据源图层：要素集合、坐标参考系以及“请求更新”标记。
#[derive(Debug, Clone, Default)]
pub struct SourceLayer {
    pub name: String,
    pub crs: Option<String>,
    pub features: Vec<GeometryFeature>,
    pub update_requested: bool,
}

impl SourceLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// 数据源协作方接口，按图层名提供要素。
pub trait FeatureSource {
    fn layer(&self, name: &str) -> Option<&SourceLayer>;
    fn layer_names(&self) -> Vec<&str>;
}

/// 内存数据源，测试与 GeoJSON 加载器共用。
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    layers: HashMap<String, SourceLayer>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: SourceLayer) {
        self.layers.insert(layer.name.clone(), layer);
    }

    pub fn with_layer(mut self, layer: SourceLayer) -> Self {
        self.insert(layer);
        self
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut SourceLayer> {
        self.layers.get_mut(name)
    }
}

impl FeatureSource for InMemorySource {
    fn layer(&self, name: &str) -> Option<&SourceLayer> {
        self.layers.get(name)
    }

    fn layer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Point2> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ]
    }

    #[test]
    fn polygon_area_subtracts_holes() {
        let mut hole = square(2.0);
        hole.reverse();
        let rings = PolygonRings::new(square(10.0), vec![hole]);
        assert!((rings.area() - 96.0).abs() < 1e-9);
        assert!(ring_area(&square(1.0)) > 0.0);
    }

    #[test]
    fn attribute_lookup_is_case_insensitive() {
        let feature = GeometryFeature::new(FeatureGeometry::Point(Point2::new(0.0, 0.0)))
            .with_attribute("NAME", AttributeValue::Text("Main St".into()));
        assert_eq!(
            feature.attribute("name").map(ToString::to_string),
            Some("Main St".to_string())
        );
        assert!(feature.attribute("missing").is_none());
    }

    #[test]
    fn number_display_drops_integral_fraction() {
        assert_eq!(AttributeValue::Number(42.0).to_string(), "42");
        assert_eq!(AttributeValue::Number(2.5).to_string(), "2.5");
        assert!(AttributeValue::Text("  ".into()).is_blank());
        assert_eq!(AttributeValue::Text("3.5".into()).as_f64(), Some(3.5));
    }

    #[test]
    fn geometry_emptiness_and_bounds() {
        let collection = FeatureGeometry::Collection(vec![
            FeatureGeometry::LineString(Vec::new()),
            FeatureGeometry::Point(Point2::new(3.0, 4.0)),
        ]);
        assert!(!collection.is_empty());
        let bounds = collection.bounds();
        assert!((bounds.min().x() - 3.0).abs() < 1e-9);
        assert!(FeatureGeometry::MultiPolygon(Vec::new()).is_empty());
    }
}
