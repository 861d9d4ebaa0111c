//! GeoJSON FeatureCollection 数据源。
//!
//! 坐标只取前两维；多边形环去掉与首点重合的闭合点。几何无效的要素单独跳过并告警。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use mapsync_core::feature::{
    AttributeValue, FeatureGeometry, GeometryFeature, PolygonRings, SourceLayer,
};
use mapsync_core::geometry::Point2;
use serde_json::{Map, Value};
use tracing::warn;

use crate::IoError;

/// 读取 GeoJSON 文件为一个数据源图层。
pub fn read_geojson_layer(path: &Path, name: &str) -> Result<SourceLayer, IoError> {
    let content = fs::read_to_string(path).map_err(|source| IoError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_geojson_layer(name, &content).map_err(|message| IoError::InvalidGeoJson {
        path: path.to_path_buf(),
        message,
    })
}

/// 解析 GeoJSON 文本。接受 FeatureCollection、单个 Feature 或裸几何。
pub fn parse_geojson_layer(name: &str, content: &str) -> Result<SourceLayer, String> {
    let root: Value = serde_json::from_str(content).map_err(|err| err.to_string())?;
    let object = root
        .as_object()
        .ok_or_else(|| "顶层必须是 JSON 对象".to_string())?;

    let mut layer = SourceLayer::new(name);
    layer.crs = crs_name(object);

    match type_of(object)? {
        "FeatureCollection" => {
            let features = object
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| "FeatureCollection 缺少 features 数组".to_string())?;
            for (index, feature) in features.iter().enumerate() {
                match parse_feature(feature) {
                    Ok(feature) => layer.features.push(feature),
                    Err(reason) => {
                        warn!(layer = name, index, %reason, "跳过无效要素");
                    }
                }
            }
        }
        "Feature" => layer.features.push(parse_feature(&root)?),
        _ => layer
            .features
            .push(GeometryFeature::new(parse_geometry(object)?)),
    }
    Ok(layer)
}

fn type_of(object: &Map<String, Value>) -> Result<&str, String> {
    object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "缺少 type 成员".to_string())
}

/// 旧式 `crs.properties.name` 成员。
fn crs_name(object: &Map<String, Value>) -> Option<String> {
    object
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn parse_feature(value: &Value) -> Result<GeometryFeature, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "要素必须是 JSON 对象".to_string())?;
    if type_of(object)? != "Feature" {
        return Err("要素的 type 必须为 Feature".to_string());
    }

    let geometry = match object.get("geometry") {
        None | Some(Value::Null) => None,
        Some(Value::Object(geometry)) => Some(parse_geometry(geometry)?),
        Some(_) => return Err("geometry 必须是对象或 null".to_string()),
    };

    let id = match object.get("id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    let mut attributes = BTreeMap::new();
    if let Some(Value::Object(properties)) = object.get("properties") {
        for (key, value) in properties {
            attributes.insert(key.clone(), attribute_value(value));
        }
    }

    Ok(GeometryFeature {
        id,
        geometry,
        attributes,
        label: None,
    })
}

fn attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => number
            .as_f64()
            .map(AttributeValue::Number)
            .unwrap_or_else(|| AttributeValue::Text(number.to_string())),
        Value::String(text) => AttributeValue::Text(text.clone()),
        other => AttributeValue::Text(other.to_string()),
    }
}

fn parse_geometry(object: &Map<String, Value>) -> Result<FeatureGeometry, String> {
    let kind = type_of(object)?;
    if kind == "GeometryCollection" {
        let parts = object
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| "GeometryCollection 缺少 geometries 数组".to_string())?;
        return parts
            .iter()
            .map(|part| {
                part.as_object()
                    .ok_or_else(|| "geometries 的元素必须是对象".to_string())
                    .and_then(parse_geometry)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FeatureGeometry::Collection);
    }

    let coordinates = object
        .get("coordinates")
        .ok_or_else(|| format!("{kind} 缺少 coordinates"))?;
    match kind {
        "Point" => Ok(FeatureGeometry::Point(position(coordinates)?)),
        "LineString" => Ok(FeatureGeometry::LineString(positions(coordinates)?)),
        "Polygon" => Ok(FeatureGeometry::Polygon(polygon(coordinates)?)),
        "MultiPoint" => Ok(FeatureGeometry::MultiPoint(positions(coordinates)?)),
        "MultiLineString" => Ok(FeatureGeometry::MultiLineString(
            array(coordinates)?
                .iter()
                .map(positions)
                .collect::<Result<_, _>>()?,
        )),
        "MultiPolygon" => Ok(FeatureGeometry::MultiPolygon(
            array(coordinates)?
                .iter()
                .map(polygon)
                .collect::<Result<_, _>>()?,
        )),
        other => Err(format!("不支持的几何类型 {other}")),
    }
}

fn array(value: &Value) -> Result<&Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("期望坐标数组，实际为 {value}"))
}

fn position(value: &Value) -> Result<Point2, String> {
    let items = array(value)?;
    let x = items.first().and_then(Value::as_f64);
    let y = items.get(1).and_then(Value::as_f64);
    match (x, y) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Point2::new(x, y)),
        _ => Err(format!("无效的坐标 {value}")),
    }
}

fn positions(value: &Value) -> Result<Vec<Point2>, String> {
    array(value)?.iter().map(position).collect()
}

fn polygon(value: &Value) -> Result<PolygonRings, String> {
    let mut rings = array(value)?.iter().map(|ring| positions(ring).map(open_ring));
    let exterior = rings
        .next()
        .transpose()?
        .ok_or_else(|| "Polygon 缺少外环".to_string())?;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(PolygonRings::new(exterior, interiors))
}

fn open_ring(mut ring: Vec<Point2>) -> Vec<Point2> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}
