//! 文本 DXF 读取器。
//!
//! 每个实体先整体收集组码，再拆出句柄、102 应用数据组和扩展数据，
//! 最后按类型解析；无法完整表达的实体以 [`RawEntity`] 原样保留。

use std::collections::HashSet;
use std::convert::TryFrom;

use mapsync_core::{
    document::{
        Arc, AttachmentPoint, BlockDefinition, Circle, Color, DEFAULT_PAPER_LAYOUT, DEFAULT_LAYER,
        Document, DxfVersion, Entity, EntityCommon, EntityId, EntityKind, HYPERLINK_APP_ID, Hatch,
        HatchPath, HatchPathKind, HatchPattern, HorizontalAlign, Insert, Layer,
        LayerOverride, Linetype, MODEL_SPACE, MText, Point, Polyline, PolylineVertex,
        RawEntity, Text, TextStyle, VerticalAlign, Viewport, XDataValue,
    },
    geometry::{Point2, Vector2},
};
use tracing::debug;

use crate::{LAYER_TRANSPARENCY_APP, VIEWPORT_OVERRIDE_APP, decode_transparency};

type Pairs = Vec<(i32, String)>;

#[derive(Debug)]
pub(crate) enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// 拆分后的实体/表项组码。
struct SplitPairs {
    handle: Option<u64>,
    app_data: Vec<(String, Pairs)>,
    xdata: Vec<(String, Pairs)>,
    body: Pairs,
}

struct ParsedEntity {
    handle: Option<u64>,
    layout: Option<String>,
    entity: Entity,
}

pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
    /// 布局块（*Model_Space / *Paper_Space*）的块记录句柄，实体的 330 指向它们时不再保留。
    layout_records: HashSet<u64>,
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
            layout_records: HashSet::new(),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::empty(DxfVersion::default());
        document.ensure_layout(MODEL_SPACE);
        let mut terminated = false;
        while let Some((code, value)) = self.reader.next_pair()? {
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.as_str() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.as_str() {
                        "HEADER" => self.parse_header(&mut document)?,
                        "TABLES" => self.parse_tables(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        "OBJECTS" => self.parse_objects(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => {
                    terminated = true;
                    break;
                }
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        if !terminated {
            return Err(DxfError::invalid("文件缺少 EOF 标记"));
        }
        document.ensure_defaults();
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    /// 读取到下一个组码 0 之前的全部组码。
    fn collect_body(&mut self) -> Result<Pairs, DxfError> {
        let mut pairs = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some(pair) => pairs.push(pair),
                None => break,
            }
        }
        Ok(pairs)
    }

    /// 读取段内下一条记录的类型名，段结束时返回 `None`。
    fn next_record(&mut self, section: &str) -> Result<Option<String>, DxfError> {
        let (code, value) = self
            .reader
            .next_pair()?
            .ok_or_else(|| DxfError::invalid(format!("{section} 段提前结束")))?;
        if code != 0 {
            return Err(DxfError::invalid(format!(
                "{section} 段遇到组码 {code}（期望 0 表示记录起始）"
            )));
        }
        Ok(if value == "ENDSEC" { None } else { Some(value) })
    }

    fn parse_header(&mut self, document: &mut Document) -> Result<(), DxfError> {
        let mut variable = String::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some((9, name)) => variable = name.trim().to_string(),
                Some((1, value)) if variable == "$ACADVER" => {
                    let version = DxfVersion::from_acad_code(&value).ok_or_else(|| {
                        DxfError::unsupported(format!("DXF 版本 {}（需要 AC1015 及以上）", value.trim()))
                    })?;
                    document.set_version(version);
                }
                Some(_) => continue,
                None => return Err(DxfError::invalid("HEADER 段提前结束")),
            }
        }
        Ok(())
    }

    fn parse_tables(&mut self, document: &mut Document) -> Result<(), DxfError> {
        while let Some(record) = self.next_record("TABLES")? {
            let pairs = self.collect_body()?;
            match record.as_str() {
                "LAYER" => {
                    let layer = parse_layer_record(pairs)?;
                    document
                        .layers_mut()
                        .replace(layer)
                        .map_err(|err| DxfError::invalid(format!("LAYER 表项无效: {err}")))?;
                }
                "LTYPE" => {
                    let linetype = parse_linetype_record(&pairs);
                    document
                        .linetypes_mut()
                        .replace(linetype)
                        .map_err(|err| DxfError::invalid(format!("LTYPE 表项无效: {err}")))?;
                }
                "STYLE" => {
                    // 形文件条目没有名称
                    if let Some(style) = parse_style_record(&pairs) {
                        document
                            .text_styles_mut()
                            .replace(style)
                            .map_err(|err| DxfError::invalid(format!("STYLE 表项无效: {err}")))?;
                    }
                }
                "APPID" => {
                    if let Some(name) = find_value(&pairs, 2) {
                        document.register_app_id(name);
                    }
                }
                "BLOCK_RECORD" => {
                    if let (Some(name), Some(handle)) = (find_value(&pairs, 2), find_value(&pairs, 5)) {
                        if is_layout_block(name) {
                            if let Some(handle) = parse_handle(handle) {
                                self.layout_records.insert(handle);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        while let Some(record) = self.next_record("BLOCKS")? {
            if record != "BLOCK" {
                // 游离的 ENDBLK 或其他条目
                self.collect_body()?;
                continue;
            }
            let header = split_pairs(self.collect_body()?);
            let name = find_value(&header.body, 2)
                .map(|name| name.to_string())
                .ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
            let base_x = find_f64(&header.body, 10, "BLOCK 基点 X")?.unwrap_or(0.0);
            let base_y = find_f64(&header.body, 20, "BLOCK 基点 Y")?.unwrap_or(0.0);

            let mut entities = Vec::new();
            loop {
                let kind = self
                    .next_record("BLOCKS")?
                    .ok_or_else(|| DxfError::invalid(format!("块 {name} 缺少 ENDBLK")))?;
                if kind == "ENDBLK" {
                    self.collect_body()?;
                    break;
                }
                entities.push(self.parse_entity(&kind)?);
            }

            if is_layout_block(&name) {
                let default_layout = if name.eq_ignore_ascii_case("*Model_Space") {
                    MODEL_SPACE
                } else {
                    DEFAULT_PAPER_LAYOUT
                };
                for parsed in entities {
                    store_entity(document, parsed, default_layout)?;
                }
                continue;
            }

            let mut definition = BlockDefinition::new(name, Point2::new(base_x, base_y));
            definition.entities = entities.into_iter().map(|parsed| parsed.entity).collect();
            for (app, values) in header.xdata {
                definition
                    .xdata
                    .set(&app, convert_xdata(values))
                    .map_err(|err| DxfError::invalid(format!("BLOCK 扩展数据无效: {err}")))?;
            }
            document
                .blocks_mut()
                .replace(definition)
                .map_err(|err| DxfError::invalid(format!("BLOCK 定义无效: {err}")))?;
        }
        Ok(())
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        while let Some(kind) = self.next_record("ENTITIES")? {
            let parsed = self.parse_entity(&kind)?;
            store_entity(document, parsed, MODEL_SPACE)?;
        }
        Ok(())
    }

    fn parse_objects(&mut self, document: &mut Document) -> Result<(), DxfError> {
        while let Some(kind) = self.next_record("OBJECTS")? {
            let pairs = self.collect_body()?;
            if kind != "LAYOUT" {
                continue;
            }
            // 布局名是 AcDbLayout 子类标记之后的组码 1
            let name = pairs
                .iter()
                .skip_while(|(code, value)| !(*code == 100 && value == "AcDbLayout"))
                .find(|(code, _)| *code == 1)
                .map(|(_, value)| value.trim().to_string());
            if let Some(name) = name.filter(|name| !name.is_empty()) {
                document.ensure_layout(&name);
            }
        }
        Ok(())
    }

    fn parse_entity(&mut self, kind: &str) -> Result<ParsedEntity, DxfError> {
        let split = split_pairs(self.collect_body()?);
        let mut common = EntityCommon::on_layer(DEFAULT_LAYER);
        let mut layout = None;
        let mut paper_space = false;
        for (code, value) in &split.body {
            match code {
                8 => common.layer = value.trim().to_string(),
                6 => {
                    let linetype = value.trim();
                    if !linetype.eq_ignore_ascii_case("BYLAYER") {
                        common.linetype = Some(linetype.to_string());
                    }
                }
                62 => common.color = Color::from_aci_code(parse_i16(value, "实体颜色")?),
                420 => common.color = Color::from_true_color(parse_i32(value, "实体真彩色")?),
                370 => common.lineweight = parse_i16(value, "实体线宽")?,
                440 => common.transparency = decode_transparency(parse_i32(value, "实体透明度")?),
                67 => paper_space = parse_i16(value, "图纸空间标志")? == 1,
                410 => layout = Some(value.trim().to_string()),
                _ => {}
            }
        }
        if layout.is_none() && paper_space {
            layout = Some(DEFAULT_PAPER_LAYOUT.to_string());
        }

        for (name, pairs) in split.app_data {
            common.app_data.insert(name, pairs);
        }
        for (app, values) in split.xdata {
            if app.eq_ignore_ascii_case(HYPERLINK_APP_ID) {
                common.hyperlink = values
                    .iter()
                    .find(|(code, _)| *code == 1000)
                    .map(|(_, value)| value.clone());
                continue;
            }
            common
                .xdata
                .set(&app, convert_xdata(values))
                .map_err(|err| DxfError::invalid(format!("{kind} 扩展数据无效: {err}")))?;
        }

        let parsed_kind = match kind {
            "POINT" => Some(parse_point(&split.body)?),
            "CIRCLE" => Some(parse_circle(&split.body)?),
            "ARC" => Some(parse_arc(&split.body)?),
            "LWPOLYLINE" => Some(parse_lwpolyline(&split.body)?),
            "TEXT" => Some(parse_text(&split.body)?),
            "MTEXT" => Some(parse_mtext(&split.body)?),
            "HATCH" => parse_hatch(&split.body)?,
            "INSERT" => parse_insert(&split.body)?,
            "VIEWPORT" => Some(parse_viewport(&split.body)?),
            _ => None,
        };

        let kind = match parsed_kind {
            Some(kind) => kind,
            None => {
                let pairs = split
                    .body
                    .into_iter()
                    .filter(|(code, value)| {
                        !(*code == 330
                            && parse_handle(value)
                                .is_some_and(|owner| self.layout_records.contains(&owner)))
                    })
                    .collect();
                EntityKind::Unknown(RawEntity {
                    kind: kind.to_string(),
                    pairs,
                })
            }
        };

        Ok(ParsedEntity {
            handle: split.handle,
            layout,
            entity: Entity { common, kind },
        })
    }
}

fn store_entity(
    document: &mut Document,
    parsed: ParsedEntity,
    default_layout: &str,
) -> Result<(), DxfError> {
    let layout = parsed.layout.unwrap_or_else(|| default_layout.to_string());
    document.ensure_layout(&layout);
    document
        .ensure_layer(parsed.entity.layer_name())
        .map_err(|err| DxfError::invalid(format!("实体图层无效: {err}")))?;
    let store = document.entity_store_mut();
    // 句柄冲突时重新分配
    let id = parsed
        .handle
        .map(EntityId::new)
        .filter(|id| store.get(*id).is_none());
    match id {
        Some(id) => store
            .insert_with_id(id, layout, parsed.entity)
            .map_err(|err| DxfError::invalid(format!("实体句柄无效: {err}")))?,
        None => {
            if let Some(handle) = parsed.handle {
                debug!(handle = %EntityId::new(handle), "句柄冲突，重新分配");
            }
            store.insert(layout, parsed.entity);
        }
    }
    Ok(())
}

fn is_layout_block(name: &str) -> bool {
    let upper = name.trim().to_ascii_uppercase();
    upper == "*MODEL_SPACE" || upper.starts_with("*PAPER_SPACE")
}

/// 拆出句柄（组码 5）、102 应用数据组与 1001 起始的扩展数据。
fn split_pairs(pairs: Pairs) -> SplitPairs {
    let mut split = SplitPairs {
        handle: None,
        app_data: Vec::new(),
        xdata: Vec::new(),
        body: Vec::new(),
    };
    let mut group: Option<(String, Pairs)> = None;
    let mut pairs = pairs.into_iter();
    while let Some((code, value)) = pairs.next() {
        if code == 1001 {
            split.xdata.push((value.trim().to_string(), Vec::new()));
            continue;
        }
        if let Some((_, values)) = split.xdata.last_mut() {
            if code >= 1000 {
                values.push((code, value));
                continue;
            }
        }
        if code == 102 {
            let marker = value.trim();
            if let Some(name) = marker.strip_prefix('{') {
                group = Some((name.to_string(), Vec::new()));
            } else if marker == "}" {
                if let Some(done) = group.take() {
                    split.app_data.push(done);
                }
            }
            continue;
        }
        if let Some((_, values)) = group.as_mut() {
            values.push((code, value));
            continue;
        }
        if code == 5 && split.handle.is_none() {
            split.handle = parse_handle(&value);
            continue;
        }
        split.body.push((code, value));
    }
    split
}

fn convert_xdata(values: Pairs) -> Vec<XDataValue> {
    values
        .into_iter()
        .map(|(code, raw)| {
            let trimmed = raw.trim();
            let parsed = match code {
                1000 => Some(XDataValue::String(raw.clone())),
                1070 => trimmed.parse().ok().map(XDataValue::Integer),
                1071 => trimmed.parse().ok().map(XDataValue::Long),
                1040 => trimmed.parse().ok().map(XDataValue::Real),
                _ => None,
            };
            parsed.unwrap_or(XDataValue::Raw(code, raw))
        })
        .collect()
}

fn parse_layer_record(pairs: Pairs) -> Result<Layer, DxfError> {
    let split = split_pairs(pairs);
    let name = find_value(&split.body, 2).ok_or_else(|| DxfError::invalid("LAYER 缺少名称（组码 2）"))?;
    let mut layer = Layer::new(name.trim());
    let mut true_color = None;
    for (code, value) in &split.body {
        match code {
            62 => {
                let aci = parse_i16(value, "LAYER 颜色")?;
                if aci < 0 {
                    layer.off();
                }
                layer.set_color(Color::from_aci_code(aci));
            }
            420 => true_color = Some(parse_i32(value, "LAYER 真彩色")?),
            6 => layer.set_linetype(value.trim()),
            70 => {
                let flags = parse_i16(value, "LAYER 标志")?;
                if flags & 1 != 0 {
                    layer.freeze();
                }
                if flags & 4 != 0 {
                    layer.lock();
                }
            }
            290 => layer.set_plot(parse_i16(value, "LAYER 打印标志")? != 0),
            370 => layer.set_lineweight(parse_i16(value, "LAYER 线宽")?),
            _ => {}
        }
    }
    if let Some(true_color) = true_color {
        layer.set_color(Color::from_true_color(true_color));
    }

    for (app, values) in &split.xdata {
        if app.eq_ignore_ascii_case(LAYER_TRANSPARENCY_APP) {
            let raw = values.iter().find(|(code, _)| *code == 1071);
            if let Some((_, raw)) = raw {
                layer.set_transparency(decode_transparency(parse_i32(raw, "LAYER 透明度")?));
            }
        } else if app.eq_ignore_ascii_case(VIEWPORT_OVERRIDE_APP) {
            for (viewport_id, layer_override) in decode_overrides(values)? {
                layer.set_viewport_override(viewport_id, layer_override);
            }
        }
    }
    Ok(layer)
}

fn decode_overrides(values: &[(i32, String)]) -> Result<Vec<(i16, LayerOverride)>, DxfError> {
    let mut overrides: Vec<(i16, LayerOverride)> = Vec::new();
    for (code, value) in values {
        match code {
            1070 => overrides.push((parse_i16(value, "视口 ID")?, LayerOverride::default())),
            1000 => {
                let Some((_, current)) = overrides.last_mut() else {
                    continue;
                };
                let Some((key, raw)) = value.split_once('=') else {
                    continue;
                };
                match key {
                    "color" => current.color = decode_override_color(raw),
                    "linetype" => current.linetype = Some(raw.to_string()),
                    "lineweight" => current.lineweight = raw.trim().parse().ok(),
                    "transparency" => current.transparency = raw.trim().parse().ok(),
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(overrides)
}

fn decode_override_color(raw: &str) -> Option<Color> {
    if let Some(aci) = raw.strip_prefix("aci:") {
        return aci.trim().parse().ok().map(Color::from_aci_code);
    }
    let rgb = raw.strip_prefix("rgb:")?;
    let parts: Vec<u8> = rgb
        .split(',')
        .map(|part| part.trim().parse())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [r, g, b] => Some(Color::Rgb(*r, *g, *b)),
        _ => None,
    }
}

fn parse_linetype_record(pairs: &[(i32, String)]) -> Linetype {
    let name = find_value(pairs, 2).unwrap_or_default().trim().to_string();
    let description = find_value(pairs, 3).unwrap_or_default().to_string();
    let pattern = pairs
        .iter()
        .filter(|(code, _)| *code == 49)
        .filter_map(|(_, value)| value.trim().parse().ok())
        .collect();
    Linetype::new(name, description, pattern)
}

fn parse_style_record(pairs: &[(i32, String)]) -> Option<TextStyle> {
    let name = find_value(pairs, 2)?.trim();
    if name.is_empty() {
        return None;
    }
    let mut style = TextStyle::new(name, find_value(pairs, 3).unwrap_or_default().trim());
    for (code, value) in pairs {
        match code {
            40 => style.height = value.trim().parse().unwrap_or(0.0),
            41 => style.width_factor = value.trim().parse().unwrap_or(1.0),
            _ => {}
        }
    }
    Some(style)
}

fn parse_point(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    let location = require_point(pairs, 10, "POINT 位置")?;
    Ok(EntityKind::Point(Point { location }))
}

fn parse_circle(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    let center = require_point(pairs, 10, "CIRCLE 圆心")?;
    let radius = find_f64(pairs, 40, "CIRCLE 半径")?
        .ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;
    Ok(EntityKind::Circle(Circle { center, radius }))
}

fn parse_arc(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    let center = require_point(pairs, 10, "ARC 圆心")?;
    let radius = find_f64(pairs, 40, "ARC 半径")?
        .ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
    let start_angle = find_f64(pairs, 50, "ARC 起始角")?
        .ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
    let end_angle = find_f64(pairs, 51, "ARC 终止角")?
        .ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;
    Ok(EntityKind::Arc(Arc {
        center,
        radius,
        start_angle: start_angle.to_radians(),
        end_angle: end_angle.to_radians(),
    }))
}

fn parse_lwpolyline(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    let mut vertices: Vec<PolylineVertex> = Vec::new();
    let mut is_closed = false;
    let mut constant_width = None;
    let mut pending_x: Option<f64> = None;
    for (code, value) in pairs {
        match code {
            70 => is_closed = parse_i16(value, "LWPOLYLINE 标志")? & 1 != 0,
            43 => constant_width = Some(parse_f64(value, "LWPOLYLINE 全局宽度")?),
            10 => {
                if pending_x.is_some() {
                    return Err(DxfError::invalid("LWPOLYLINE 顶点缺少 Y 坐标（组码 20）"));
                }
                pending_x = Some(parse_f64(value, "LWPOLYLINE 顶点 X")?);
            }
            20 => {
                let x = pending_x
                    .take()
                    .ok_or_else(|| DxfError::invalid("LWPOLYLINE 顶点缺少 X 坐标（组码 10）"))?;
                let y = parse_f64(value, "LWPOLYLINE 顶点 Y")?;
                vertices.push(PolylineVertex::new(Point2::new(x, y)));
            }
            42 => {
                let vertex = vertices
                    .last_mut()
                    .ok_or_else(|| DxfError::invalid("LWPOLYLINE 凸度出现在顶点之前"))?;
                vertex.bulge = parse_f64(value, "LWPOLYLINE 凸度")?;
            }
            _ => {}
        }
    }
    if pending_x.is_some() {
        return Err(DxfError::invalid("LWPOLYLINE 顶点缺少 Y 坐标（组码 20）"));
    }
    Ok(EntityKind::Polyline(Polyline {
        vertices,
        is_closed,
        constant_width,
    }))
}

fn parse_text(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    let insert = require_point(pairs, 10, "TEXT 插入点")?;
    let alignment_point = optional_point(pairs, 11, "TEXT 对齐点")?;
    let height = find_f64(pairs, 40, "TEXT 字高")?.unwrap_or(1.0);
    let content = find_value(pairs, 1).map(decode_inline_text).unwrap_or_default();
    let rotation = find_f64(pairs, 50, "TEXT 旋转角")?.unwrap_or(0.0).to_radians();
    let style = find_value(pairs, 7).map(|style| style.trim().to_string());
    let halign = HorizontalAlign::from_code(find_i16(pairs, 72, "TEXT 水平对齐")?.unwrap_or(0));
    let valign = VerticalAlign::from_code(find_i16(pairs, 73, "TEXT 垂直对齐")?.unwrap_or(0));
    let aligned = halign != HorizontalAlign::Left || valign != VerticalAlign::Baseline;
    Ok(EntityKind::Text(Text {
        insert: match alignment_point {
            Some(point) if aligned => point,
            _ => insert,
        },
        content,
        height,
        rotation,
        style,
        halign,
        valign,
    }))
}

fn parse_mtext(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    let insert = require_point(pairs, 10, "MTEXT 插入点")?;
    let height = find_f64(pairs, 40, "MTEXT 字高")?.unwrap_or(1.0);
    let reference_width = find_f64(pairs, 41, "MTEXT 参考宽度")?.filter(|width| *width > 0.0);
    let attachment = find_i16(pairs, 71, "MTEXT 附着点")?
        .and_then(AttachmentPoint::from_code)
        .unwrap_or(AttachmentPoint::TopLeft);

    let mut raw = String::new();
    for (code, value) in pairs {
        if *code == 3 {
            raw.push_str(value);
        }
    }
    if let Some(last) = find_value(pairs, 1) {
        raw.push_str(last);
    }

    let rotation = match find_f64(pairs, 50, "MTEXT 旋转角")? {
        Some(degrees) => degrees.to_radians(),
        None => match optional_point(pairs, 11, "MTEXT 方向")? {
            Some(direction) => Vector2::new(direction.x(), direction.y()).angle(),
            None => 0.0,
        },
    };

    Ok(EntityKind::MText(MText {
        insert,
        content: decode_mtext_content(&raw),
        height,
        reference_width,
        attachment,
        rotation,
        style: find_value(pairs, 7).map(|style| style.trim().to_string()),
    }))
}

/// 只解析多段线边界（组码 92 含位 2）的填充；边界含凸度或为边集合时返回 `None`。
fn parse_hatch(pairs: &[(i32, String)]) -> Result<Option<EntityKind>, DxfError> {
    let start = pairs
        .iter()
        .position(|(code, value)| *code == 100 && value == "AcDbHatch")
        .map(|index| index + 1)
        .unwrap_or(0);
    let pairs = &pairs[start..];

    let mut name = String::from("SOLID");
    let mut solid = false;
    let mut index = 0;
    let mut path_count = None;
    while index < pairs.len() {
        let (code, value) = &pairs[index];
        index += 1;
        match code {
            2 => name = value.trim().to_string(),
            70 => solid = parse_i16(value, "HATCH 实体填充标志")? == 1,
            91 => {
                path_count = Some(parse_i32(value, "HATCH 边界数量")?);
                break;
            }
            _ => {}
        }
    }
    let Some(path_count) = path_count else {
        return Ok(None);
    };

    let mut paths = Vec::new();
    for _ in 0..path_count {
        let flags = expect_code(pairs, &mut index, 92, "HATCH 边界标志")?;
        let flags = parse_i32(&flags, "HATCH 边界标志")?;
        if flags & 2 == 0 {
            return Ok(None);
        }
        let has_bulge = parse_i16(&expect_code(pairs, &mut index, 72, "HATCH 凸度标志")?, "HATCH 凸度标志")? != 0;
        expect_code(pairs, &mut index, 73, "HATCH 闭合标志")?;
        let count = parse_i32(&expect_code(pairs, &mut index, 93, "HATCH 顶点数量")?, "HATCH 顶点数量")?;
        let mut vertices = Vec::new();
        for _ in 0..count {
            let x = parse_f64(&expect_code(pairs, &mut index, 10, "HATCH 顶点 X")?, "HATCH 顶点 X")?;
            let y = parse_f64(&expect_code(pairs, &mut index, 20, "HATCH 顶点 Y")?, "HATCH 顶点 Y")?;
            if has_bulge {
                let bulge = parse_f64(&expect_code(pairs, &mut index, 42, "HATCH 凸度")?, "HATCH 凸度")?;
                if bulge != 0.0 {
                    return Ok(None);
                }
            }
            vertices.push(Point2::new(x, y));
        }
        let sources = parse_i32(&expect_code(pairs, &mut index, 97, "HATCH 源对象数量")?, "HATCH 源对象数量")?;
        index += usize::try_from(sources.max(0)).unwrap_or(0);
        paths.push(HatchPath {
            kind: HatchPathKind::from_flags(flags),
            vertices,
        });
    }

    let rest = &pairs[index.min(pairs.len())..];
    let pattern = if solid || name.eq_ignore_ascii_case("SOLID") {
        HatchPattern::Solid
    } else {
        HatchPattern::Predefined {
            name,
            scale: find_f64(rest, 41, "HATCH 图案比例")?.unwrap_or(1.0),
            angle: find_f64(rest, 52, "HATCH 图案角度")?.unwrap_or(0.0),
        }
    };
    Ok(Some(EntityKind::Hatch(Hatch { pattern, paths })))
}

/// 带属性（组码 66 = 1）的块参照连同后续 ATTRIB/SEQEND 原样保留。
fn parse_insert(pairs: &[(i32, String)]) -> Result<Option<EntityKind>, DxfError> {
    if find_i16(pairs, 66, "INSERT 属性标志")?.unwrap_or(0) != 0 {
        return Ok(None);
    }
    let block_name = find_value(pairs, 2)
        .ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?
        .trim()
        .to_string();
    let insert = require_point(pairs, 10, "INSERT 插入点")?;
    let scale = Vector2::new(
        find_f64(pairs, 41, "INSERT X 比例")?.unwrap_or(1.0),
        find_f64(pairs, 42, "INSERT Y 比例")?.unwrap_or(1.0),
    );
    let rotation = find_f64(pairs, 50, "INSERT 旋转角")?.unwrap_or(0.0).to_radians();
    Ok(Some(EntityKind::Insert(Insert {
        block_name,
        insert,
        scale,
        rotation,
    })))
}

fn parse_viewport(pairs: &[(i32, String)]) -> Result<EntityKind, DxfError> {
    Ok(EntityKind::Viewport(Viewport {
        center: require_point(pairs, 10, "VIEWPORT 中心")?,
        width: find_f64(pairs, 40, "VIEWPORT 宽度")?.unwrap_or(0.0),
        height: find_f64(pairs, 41, "VIEWPORT 高度")?.unwrap_or(0.0),
        view_center: optional_point(pairs, 12, "VIEWPORT 视图中心")?.unwrap_or(Point2::new(0.0, 0.0)),
        view_height: find_f64(pairs, 45, "VIEWPORT 视图高度")?.unwrap_or(0.0),
        id: find_i16(pairs, 69, "VIEWPORT ID")?.unwrap_or(0),
    }))
}

fn expect_code(
    pairs: &[(i32, String)],
    index: &mut usize,
    expected: i32,
    context: &str,
) -> Result<String, DxfError> {
    match pairs.get(*index) {
        Some((code, value)) if *code == expected => {
            *index += 1;
            Ok(value.clone())
        }
        Some((code, _)) => Err(DxfError::invalid(format!(
            "{context} 期望组码 {expected}，实际为 {code}"
        ))),
        None => Err(DxfError::invalid(format!("{context} 缺少组码 {expected}"))),
    }
}

fn find_value(pairs: &[(i32, String)], code: i32) -> Option<&str> {
    pairs
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, value)| value.as_str())
}

fn find_f64(pairs: &[(i32, String)], code: i32, context: &str) -> Result<Option<f64>, DxfError> {
    find_value(pairs, code)
        .map(|raw| parse_f64(raw, context))
        .transpose()
}

fn find_i16(pairs: &[(i32, String)], code: i32, context: &str) -> Result<Option<i16>, DxfError> {
    find_value(pairs, code)
        .map(|raw| parse_i16(raw, context))
        .transpose()
}

fn optional_point(pairs: &[(i32, String)], code: i32, context: &str) -> Result<Option<Point2>, DxfError> {
    let x = find_f64(pairs, code, context)?;
    let y = find_f64(pairs, code + 10, context)?;
    match (x, y) {
        (Some(x), Some(y)) => Ok(Some(Point2::new(x, y))),
        (None, None) => Ok(None),
        _ => Err(DxfError::invalid(format!("{context} 缺少完整的 XY 坐标"))),
    }
}

fn require_point(pairs: &[(i32, String)], code: i32, context: &str) -> Result<Point2, DxfError> {
    optional_point(pairs, code, context)?.ok_or_else(|| {
        DxfError::invalid(format!("{context} 缺失（组码 {code}/{}）", code + 10))
    })
}

fn parse_handle(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim(), 16).ok().filter(|handle| *handle != 0)
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

fn decode_mtext_content(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('P') | Some('p') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

fn decode_inline_text(raw: &str) -> String {
    raw.replace("%%d", "°").replace("%%p", "±").replace("%%c", "Ø")
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 容忍文件末尾的空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) -> Result<(), DxfError> {
        if self.buffer.is_some() {
            return Err(DxfError::invalid("内部错误：尝试多次回退 DXF 组码"));
        }
        self.buffer = Some(pair);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_handle_groups_and_xdata() {
        let pairs: Pairs = vec![
            (5, "2A".into()),
            (102, "{ACAD_REACTORS".into()),
            (330, "1F".into()),
            (102, "}".into()),
            (8, "Roads".into()),
            (1001, "MAPSYNC".into()),
            (1000, "MAPSYNC".into()),
            (1001, "PE_URL".into()),
            (1000, "mapsync://MAPSYNC".into()),
        ];
        let split = split_pairs(pairs);
        assert_eq!(split.handle, Some(0x2A));
        assert_eq!(split.app_data.len(), 1);
        assert_eq!(split.app_data[0].0, "ACAD_REACTORS");
        assert_eq!(split.body, vec![(8, "Roads".to_string())]);
        assert_eq!(split.xdata.len(), 2);
        assert_eq!(split.xdata[1].1, vec![(1000, "mapsync://MAPSYNC".to_string())]);
    }

    #[test]
    fn xdata_codes_map_to_typed_values() {
        let values = convert_xdata(vec![
            (1000, "text".into()),
            (1070, "7".into()),
            (1071, "70000".into()),
            (1040, "1.5".into()),
            (1002, "{".into()),
        ]);
        assert_eq!(
            values,
            vec![
                XDataValue::String("text".into()),
                XDataValue::Integer(7),
                XDataValue::Long(70000),
                XDataValue::Real(1.5),
                XDataValue::Raw(1002, "{".into()),
            ]
        );
    }

    #[test]
    fn reader_rejects_double_put_back() {
        let mut reader = DxfReader::new("0\nEOF\n");
        let pair = reader.next_pair().unwrap().unwrap();
        reader.put_back(pair.clone()).unwrap();
        assert!(reader.put_back(pair).is_err());
    }

    #[test]
    fn override_colors_decode_both_forms() {
        assert_eq!(decode_override_color("aci:3"), Some(Color::Aci(3)));
        assert_eq!(decode_override_color("rgb:1,2,3"), Some(Color::Rgb(1, 2, 3)));
        assert_eq!(decode_override_color("rgb:1,2"), None);
    }
}
