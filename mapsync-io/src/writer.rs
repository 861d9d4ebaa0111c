//! 文本 DXF 写出器。
//!
//! 表项、块记录与对象的句柄在写出时重新分配，起点为实体存储的下一个句柄，
//! 因此不会与实体句柄冲突。`$HANDSEED` 在正文写完后才能确定，所以先写正文再拼接 HEADER。

use std::fmt::{Display, Write as _};

use mapsync_core::document::{
    Color, DEFAULT_LAYER, Document, Entity, EntityKind, HYPERLINK_APP_ID, Hatch, HatchPattern,
    LINEWEIGHT_BYLAYER, Layer, LayerOverride, MODEL_SPACE, RawEntity, XDataValue, canonical_name,
};

use crate::{LAYER_TRANSPARENCY_APP, VIEWPORT_OVERRIDE_APP, encode_transparency};

/// MTEXT 单个组码值的最大长度，超出部分拆到组码 3。
const MTEXT_CHUNK: usize = 250;

struct LayoutPlan {
    name: String,
    block_name: String,
    record: u64,
    block: u64,
    end_block: u64,
    layout_object: u64,
    is_model: bool,
}

struct BlockPlan {
    record: u64,
    block: u64,
    end_block: u64,
}

pub(crate) struct DxfWriter<'a> {
    document: &'a Document,
    out: String,
    next_handle: u64,
}

impl<'a> DxfWriter<'a> {
    pub(crate) fn new(document: &'a Document) -> Self {
        Self {
            document,
            out: String::new(),
            next_handle: document.entity_store().next_handle(),
        }
    }

    pub(crate) fn write(mut self) -> String {
        let document = self.document;
        let layouts = self.plan_layouts();
        let blocks: Vec<BlockPlan> = (0..document.blocks().len())
            .map(|_| BlockPlan {
                record: self.alloc(),
                block: self.alloc(),
                end_block: self.alloc(),
            })
            .collect();
        let root_dictionary = self.alloc();
        let layout_dictionary = self.alloc();

        self.write_tables(&layouts, &blocks);
        self.write_blocks(&layouts, &blocks);
        self.write_entities(&layouts);
        self.write_objects(&layouts, root_dictionary, layout_dictionary);
        self.pair(0, "EOF");

        let mut header = String::new();
        for (code, value) in [
            (0, "SECTION".to_string()),
            (2, "HEADER".to_string()),
            (9, "$ACADVER".to_string()),
            (1, document.version().acad_code().to_string()),
            (9, "$HANDSEED".to_string()),
            (5, format!("{:X}", self.next_handle)),
            (0, "ENDSEC".to_string()),
        ] {
            push_pair(&mut header, code, value);
        }
        header.push_str(&self.out);
        header
    }

    fn alloc(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn pair(&mut self, code: i32, value: impl Display) {
        push_pair(&mut self.out, code, value);
    }

    fn handle(&mut self, code: i32, handle: u64) {
        self.pair(code, format!("{handle:X}"));
    }

    fn point(&mut self, code: i32, x: f64, y: f64) {
        self.pair(code, x);
        self.pair(code + 10, y);
        self.pair(code + 20, 0.0);
    }

    fn plan_layouts(&mut self) -> Vec<LayoutPlan> {
        let names: Vec<String> = self.document.layouts().map(str::to_string).collect();
        let mut paper_index = 0usize;
        let mut plans = Vec::with_capacity(names.len());
        for name in names {
            let is_model = canonical_name(&name) == canonical_name(MODEL_SPACE);
            let block_name = if is_model {
                "*Model_Space".to_string()
            } else {
                let block = match paper_index {
                    0 => "*Paper_Space".to_string(),
                    n => format!("*Paper_Space{}", n - 1),
                };
                paper_index += 1;
                block
            };
            plans.push(LayoutPlan {
                name,
                block_name,
                record: self.alloc(),
                block: self.alloc(),
                end_block: self.alloc(),
                layout_object: self.alloc(),
                is_model,
            });
        }
        plans
    }

    fn begin_section(&mut self, name: &str) {
        self.pair(0, "SECTION");
        self.pair(2, name);
    }

    fn end_section(&mut self) {
        self.pair(0, "ENDSEC");
    }

    fn begin_table(&mut self, name: &str, count: usize) -> u64 {
        let handle = self.alloc();
        self.pair(0, "TABLE");
        self.pair(2, name);
        self.handle(5, handle);
        self.pair(330, "0");
        self.pair(100, "AcDbSymbolTable");
        self.pair(70, count);
        handle
    }

    fn begin_record(&mut self, kind: &str, owner: u64, subclass: &str) {
        let handle = self.alloc();
        self.pair(0, kind);
        self.handle(5, handle);
        self.handle(330, owner);
        self.pair(100, "AcDbSymbolTableRecord");
        self.pair(100, subclass);
    }

    fn write_tables(&mut self, layouts: &[LayoutPlan], blocks: &[BlockPlan]) {
        let document = self.document;
        self.begin_section("TABLES");

        let table = self.begin_table("VPORT", 1);
        self.begin_record("VPORT", table, "AcDbViewportTableRecord");
        self.pair(2, "*Active");
        self.pair(70, 0);
        let (center, height) = match document.bounds() {
            Some(bounds) => (bounds.center(), bounds.height().max(bounds.width()).max(1.0)),
            None => (mapsync_core::geometry::Point2::new(0.0, 0.0), 100.0),
        };
        self.pair(12, center.x());
        self.pair(22, center.y());
        self.pair(40, height * 1.1);
        self.pair(41, 1.5);
        self.pair(0, "ENDTAB");

        let table = self.begin_table("LTYPE", document.linetypes().len());
        for linetype in document.linetypes().iter() {
            self.begin_record("LTYPE", table, "AcDbLinetypeTableRecord");
            self.pair(2, &linetype.name);
            self.pair(70, 0);
            self.pair(3, &linetype.description);
            self.pair(72, 65);
            self.pair(73, linetype.pattern.len());
            self.pair(40, linetype.total_length());
            for element in &linetype.pattern {
                self.pair(49, element);
                self.pair(74, 0);
            }
        }
        self.pair(0, "ENDTAB");

        let table = self.begin_table("LAYER", document.layers().len());
        for layer in document.layers().iter() {
            self.write_layer(table, layer);
        }
        self.pair(0, "ENDTAB");

        let table = self.begin_table("STYLE", document.text_styles().len());
        for style in document.text_styles().iter() {
            self.begin_record("STYLE", table, "AcDbTextStyleTableRecord");
            self.pair(2, &style.name);
            self.pair(70, 0);
            self.pair(40, style.height);
            self.pair(41, style.width_factor);
            self.pair(50, 0.0);
            self.pair(71, 0);
            self.pair(42, 2.5);
            self.pair(3, &style.font);
            self.pair(4, "");
        }
        self.pair(0, "ENDTAB");

        let app_ids = self.collect_app_ids();
        let table = self.begin_table("APPID", app_ids.len());
        for name in &app_ids {
            self.begin_record("APPID", table, "AcDbRegAppTableRecord");
            self.pair(2, name);
            self.pair(70, 0);
        }
        self.pair(0, "ENDTAB");

        let table = self.begin_table("BLOCK_RECORD", layouts.len() + blocks.len());
        for layout in layouts {
            self.write_block_record(table, layout.record, &layout.block_name, Some(layout.layout_object));
        }
        for (definition, plan) in document.blocks().iter().zip(blocks) {
            self.write_block_record(table, plan.record, &definition.name, None);
        }
        self.pair(0, "ENDTAB");

        self.end_section();
    }

    fn write_block_record(&mut self, table: u64, record: u64, name: &str, layout: Option<u64>) {
        self.pair(0, "BLOCK_RECORD");
        self.handle(5, record);
        self.handle(330, table);
        self.pair(100, "AcDbSymbolTableRecord");
        self.pair(100, "AcDbBlockTableRecord");
        self.pair(2, name);
        if let Some(layout) = layout {
            self.handle(340, layout);
        }
        self.pair(70, 0);
        self.pair(280, 1);
        self.pair(281, 0);
    }

    fn write_layer(&mut self, table: u64, layer: &Layer) {
        self.begin_record("LAYER", table, "AcDbLayerTableRecord");
        self.pair(2, &layer.name);
        let mut flags = 0;
        if layer.is_frozen {
            flags |= 1;
        }
        if layer.is_locked {
            flags |= 4;
        }
        self.pair(70, flags);
        let aci = layer.color.aci_code();
        self.pair(62, if layer.is_on { aci } else { -aci });
        if let Some(true_color) = layer.color.true_color() {
            self.pair(420, true_color);
        }
        self.pair(6, &layer.linetype);
        self.pair(290, u8::from(layer.plot));
        self.pair(370, layer.lineweight);

        if let Some(transparency) = layer.transparency {
            self.pair(1001, LAYER_TRANSPARENCY_APP);
            self.pair(1071, encode_transparency(transparency));
        }
        if !layer.viewport_overrides.is_empty() {
            self.pair(1001, VIEWPORT_OVERRIDE_APP);
            for (viewport_id, layer_override) in &layer.viewport_overrides {
                self.pair(1070, viewport_id);
                for field in encode_override(layer_override) {
                    self.pair(1000, field);
                }
            }
        }
    }

    /// 文档登记的 APPID 加上实体与图层实际用到但尚未登记的应用名。
    fn collect_app_ids(&self) -> Vec<String> {
        let document = self.document;
        let mut names: Vec<String> = document.app_ids().iter().map(|app| app.name.clone()).collect();
        let mut push = |name: &str| {
            if !names.iter().any(|known| known.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        };

        let block_entities = document
            .blocks()
            .iter()
            .flat_map(|block| block.entities.iter());
        let store_entities = document.entity_store().iter().map(|stored| &stored.entity);
        for entity in store_entities.chain(block_entities) {
            if entity.hyperlink().is_some() {
                push(HYPERLINK_APP_ID);
            }
            for (app, _) in entity.common.xdata.iter() {
                push(app);
            }
        }
        for block in document.blocks().iter() {
            for (app, _) in block.xdata.iter() {
                push(app);
            }
        }
        for layer in document.layers().iter() {
            if layer.transparency.is_some() {
                push(LAYER_TRANSPARENCY_APP);
            }
            if !layer.viewport_overrides.is_empty() {
                push(VIEWPORT_OVERRIDE_APP);
            }
        }
        names
    }

    fn write_blocks(&mut self, layouts: &[LayoutPlan], blocks: &[BlockPlan]) {
        let document = self.document;
        self.begin_section("BLOCKS");
        for layout in layouts {
            self.pair(0, "BLOCK");
            self.handle(5, layout.block);
            self.handle(330, layout.record);
            self.pair(100, "AcDbEntity");
            if !layout.is_model {
                self.pair(67, 1);
            }
            self.pair(8, DEFAULT_LAYER);
            self.pair(100, "AcDbBlockBegin");
            self.pair(2, &layout.block_name);
            self.pair(70, 0);
            self.point(10, 0.0, 0.0);
            self.pair(3, &layout.block_name);
            self.pair(1, "");
            self.write_end_block(layout.end_block, layout.record, !layout.is_model);
        }

        for (definition, plan) in document.blocks().iter().zip(blocks) {
            self.pair(0, "BLOCK");
            self.handle(5, plan.block);
            self.handle(330, plan.record);
            self.pair(100, "AcDbEntity");
            self.pair(8, DEFAULT_LAYER);
            self.pair(100, "AcDbBlockBegin");
            self.pair(2, &definition.name);
            self.pair(70, 0);
            self.point(10, definition.base_point.x(), definition.base_point.y());
            self.pair(3, &definition.name);
            self.pair(1, "");
            for (app, values) in definition.xdata.iter() {
                self.write_xdata_group(app, values);
            }
            for entity in &definition.entities {
                let handle = self.alloc();
                self.write_entity(handle, plan.record, None, entity);
            }
            self.write_end_block(plan.end_block, plan.record, false);
        }
        self.end_section();
    }

    fn write_end_block(&mut self, handle: u64, record: u64, paper: bool) {
        self.pair(0, "ENDBLK");
        self.handle(5, handle);
        self.handle(330, record);
        self.pair(100, "AcDbEntity");
        if paper {
            self.pair(67, 1);
        }
        self.pair(8, DEFAULT_LAYER);
        self.pair(100, "AcDbBlockEnd");
    }

    fn write_entities(&mut self, layouts: &[LayoutPlan]) {
        let document = self.document;
        self.begin_section("ENTITIES");
        for stored in document.entity_store().iter() {
            let key = canonical_name(&stored.layout);
            let plan = layouts
                .iter()
                .find(|plan| canonical_name(&plan.name) == key);
            let (owner, paper_layout) = match plan {
                Some(plan) if plan.is_model => (plan.record, None),
                Some(plan) => (plan.record, Some(plan.name.as_str())),
                None => (0, Some(stored.layout.as_str())),
            };
            self.write_entity(stored.id.get(), owner, paper_layout, &stored.entity);
        }
        self.end_section();
    }

    fn write_objects(&mut self, layouts: &[LayoutPlan], root: u64, layout_dictionary: u64) {
        self.begin_section("OBJECTS");
        self.pair(0, "DICTIONARY");
        self.handle(5, root);
        self.pair(330, "0");
        self.pair(100, "AcDbDictionary");
        self.pair(281, 1);
        self.pair(3, "ACAD_LAYOUT");
        self.handle(350, layout_dictionary);

        self.pair(0, "DICTIONARY");
        self.handle(5, layout_dictionary);
        self.handle(330, root);
        self.pair(100, "AcDbDictionary");
        self.pair(281, 1);
        for layout in layouts {
            self.pair(3, &layout.name);
            self.handle(350, layout.layout_object);
        }

        for (tab_order, layout) in layouts.iter().enumerate() {
            self.pair(0, "LAYOUT");
            self.handle(5, layout.layout_object);
            self.handle(330, layout_dictionary);
            self.pair(100, "AcDbPlotSettings");
            self.pair(1, "");
            self.pair(100, "AcDbLayout");
            self.pair(1, &layout.name);
            self.pair(70, 1);
            self.pair(71, tab_order);
            self.handle(330, layout.record);
        }
        self.end_section();
    }

    fn write_entity(&mut self, handle: u64, owner: u64, paper_layout: Option<&str>, entity: &Entity) {
        if let EntityKind::Unknown(raw) = &entity.kind {
            self.write_raw_entity(handle, owner, entity, raw);
            return;
        }

        self.pair(0, entity.dxf_type());
        self.handle(5, handle);
        self.write_app_data(entity);
        self.handle(330, owner);
        self.pair(100, "AcDbEntity");
        if let Some(layout) = paper_layout {
            self.pair(67, 1);
            self.pair(410, layout);
        }
        self.pair(8, &entity.common.layer);
        if let Some(linetype) = &entity.common.linetype {
            self.pair(6, linetype);
        }
        if entity.common.color != Color::ByLayer {
            self.pair(62, entity.common.color.aci_code());
        }
        if let Some(true_color) = entity.common.color.true_color() {
            self.pair(420, true_color);
        }
        if entity.common.lineweight != LINEWEIGHT_BYLAYER {
            self.pair(370, entity.common.lineweight);
        }
        if let Some(transparency) = entity.common.transparency {
            self.pair(440, encode_transparency(transparency));
        }

        match &entity.kind {
            EntityKind::Point(point) => {
                self.pair(100, "AcDbPoint");
                self.point(10, point.location.x(), point.location.y());
            }
            EntityKind::Circle(circle) => {
                self.pair(100, "AcDbCircle");
                self.point(10, circle.center.x(), circle.center.y());
                self.pair(40, circle.radius);
            }
            EntityKind::Arc(arc) => {
                self.pair(100, "AcDbCircle");
                self.point(10, arc.center.x(), arc.center.y());
                self.pair(40, arc.radius);
                self.pair(100, "AcDbArc");
                self.pair(50, arc.start_angle.to_degrees());
                self.pair(51, arc.end_angle.to_degrees());
            }
            EntityKind::Polyline(polyline) => {
                self.pair(100, "AcDbPolyline");
                self.pair(90, polyline.vertices.len());
                self.pair(70, u8::from(polyline.is_closed));
                if let Some(width) = polyline.constant_width {
                    self.pair(43, width);
                }
                for vertex in &polyline.vertices {
                    self.pair(10, vertex.position.x());
                    self.pair(20, vertex.position.y());
                    if vertex.bulge != 0.0 {
                        self.pair(42, vertex.bulge);
                    }
                }
            }
            EntityKind::Text(text) => {
                self.pair(100, "AcDbText");
                self.point(10, text.insert.x(), text.insert.y());
                self.pair(40, text.height);
                self.pair(1, text.content.replace(['\r', '\n'], " "));
                if text.rotation != 0.0 {
                    self.pair(50, text.rotation.to_degrees());
                }
                if let Some(style) = &text.style {
                    self.pair(7, style);
                }
                let aligned = text.halign.code() != 0 || text.valign.code() != 0;
                if text.halign.code() != 0 {
                    self.pair(72, text.halign.code());
                }
                if aligned {
                    self.point(11, text.insert.x(), text.insert.y());
                }
                self.pair(100, "AcDbText");
                if text.valign.code() != 0 {
                    self.pair(73, text.valign.code());
                }
            }
            EntityKind::MText(mtext) => {
                self.pair(100, "AcDbMText");
                self.point(10, mtext.insert.x(), mtext.insert.y());
                self.pair(40, mtext.height);
                if let Some(width) = mtext.reference_width {
                    self.pair(41, width);
                }
                self.pair(71, mtext.attachment.code());
                self.pair(72, 1);
                let encoded = encode_mtext_content(&mtext.content);
                let chunks = split_chunks(&encoded, MTEXT_CHUNK);
                let last = chunks.len().saturating_sub(1);
                for (index, chunk) in chunks.iter().enumerate() {
                    self.pair(if index == last { 1 } else { 3 }, chunk);
                }
                if let Some(style) = &mtext.style {
                    self.pair(7, style);
                }
                if mtext.rotation != 0.0 {
                    self.pair(50, mtext.rotation.to_degrees());
                }
            }
            EntityKind::Hatch(hatch) => self.write_hatch(hatch),
            EntityKind::Insert(insert) => {
                self.pair(100, "AcDbBlockReference");
                self.pair(2, &insert.block_name);
                self.point(10, insert.insert.x(), insert.insert.y());
                self.pair(41, insert.scale.x());
                self.pair(42, insert.scale.y());
                self.pair(43, 1.0);
                if insert.rotation != 0.0 {
                    self.pair(50, insert.rotation.to_degrees());
                }
            }
            EntityKind::Viewport(viewport) => {
                self.pair(100, "AcDbViewport");
                self.point(10, viewport.center.x(), viewport.center.y());
                self.pair(40, viewport.width);
                self.pair(41, viewport.height);
                self.pair(68, 1);
                self.pair(69, viewport.id);
                self.pair(12, viewport.view_center.x());
                self.pair(22, viewport.view_center.y());
                self.pair(45, viewport.view_height);
            }
            EntityKind::Unknown(_) => {}
        }

        self.write_xdata(entity);
    }

    fn write_hatch(&mut self, hatch: &Hatch) {
        self.pair(100, "AcDbHatch");
        self.point(10, 0.0, 0.0);
        self.pair(210, 0.0);
        self.pair(220, 0.0);
        self.pair(230, 1.0);
        self.pair(2, hatch.pattern.name());
        self.pair(70, u8::from(matches!(hatch.pattern, HatchPattern::Solid)));
        self.pair(71, 0);
        self.pair(91, hatch.paths.len());
        for path in &hatch.paths {
            self.pair(92, path.kind.flags());
            self.pair(72, 0);
            self.pair(73, 1);
            self.pair(93, path.vertices.len());
            for vertex in &path.vertices {
                self.pair(10, vertex.x());
                self.pair(20, vertex.y());
            }
            self.pair(97, 0);
        }
        self.pair(75, 1);
        self.pair(76, 1);
        if let HatchPattern::Predefined { scale, angle, .. } = &hatch.pattern {
            self.pair(52, angle);
            self.pair(41, scale);
            self.pair(77, 0);
            self.pair(78, 0);
        }
        self.pair(98, 0);
    }

    /// 未识别实体按原组码回写，只替换图层名并补写句柄、应用数据与扩展数据。
    fn write_raw_entity(&mut self, handle: u64, owner: u64, entity: &Entity, raw: &RawEntity) {
        self.pair(0, &raw.kind);
        self.handle(5, handle);
        self.write_app_data(entity);
        if !raw.pairs.iter().any(|(code, _)| *code == 330) {
            self.handle(330, owner);
        }
        let mut layer_written = false;
        for (code, value) in &raw.pairs {
            if *code == 8 {
                self.pair(8, &entity.common.layer);
                layer_written = true;
            } else {
                self.pair(*code, value);
            }
        }
        if !layer_written {
            self.pair(8, &entity.common.layer);
        }
        self.write_xdata(entity);
    }

    fn write_app_data(&mut self, entity: &Entity) {
        for (name, pairs) in &entity.common.app_data {
            self.pair(102, format!("{{{name}"));
            for (code, value) in pairs {
                self.pair(*code, value);
            }
            self.pair(102, "}");
        }
    }

    fn write_xdata(&mut self, entity: &Entity) {
        if let Some(link) = entity.hyperlink() {
            self.pair(1001, HYPERLINK_APP_ID);
            self.pair(1000, link);
        }
        for (app, values) in entity.common.xdata.iter() {
            if entity.hyperlink().is_some() && app.eq_ignore_ascii_case(HYPERLINK_APP_ID) {
                continue;
            }
            self.write_xdata_group(app, values);
        }
    }

    fn write_xdata_group(&mut self, app: &str, values: &[XDataValue]) {
        self.pair(1001, app);
        for value in values {
            let code = value.group_code();
            match value {
                XDataValue::String(text) => self.pair(code, text),
                XDataValue::Integer(number) => self.pair(code, number),
                XDataValue::Long(number) => self.pair(code, number),
                XDataValue::Real(number) => self.pair(code, number),
                XDataValue::Raw(_, text) => self.pair(code, text),
            }
        }
    }
}

fn push_pair(out: &mut String, code: i32, value: impl Display) {
    let _ = writeln!(out, "{code:>3}");
    let _ = writeln!(out, "{value}");
}

fn encode_override(layer_override: &LayerOverride) -> Vec<String> {
    let mut fields = Vec::new();
    match layer_override.color {
        Some(Color::Rgb(r, g, b)) => fields.push(format!("color=rgb:{r},{g},{b}")),
        Some(color) => fields.push(format!("color=aci:{}", color.aci_code())),
        None => {}
    }
    if let Some(linetype) = &layer_override.linetype {
        fields.push(format!("linetype={linetype}"));
    }
    if let Some(lineweight) = layer_override.lineweight {
        fields.push(format!("lineweight={lineweight}"));
    }
    if let Some(transparency) = layer_override.transparency {
        fields.push(format!("transparency={transparency}"));
    }
    fields
}

fn encode_mtext_content(content: &str) -> String {
    let mut encoded = String::with_capacity(content.len());
    for ch in content.chars() {
        match ch {
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\P"),
            '\r' => {}
            other => encoded.push(other),
        }
    }
    encoded
}

/// 按字符数切分，且不会把 `\\` 转义序列拆到两个组码中。
fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        current.push(ch);
        count += 1;
        if ch == '\\' {
            if let Some(next) = chars.next() {
                current.push(next);
                count += 1;
            }
        }
        if count >= size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtext_content_escapes_newlines_and_backslashes() {
        assert_eq!(encode_mtext_content("a\\b\nc"), "a\\\\b\\Pc");
    }

    #[test]
    fn chunks_do_not_split_escape_sequences() {
        let chunks = split_chunks("ab\\Pcd", 3);
        assert_eq!(chunks, vec!["ab\\P".to_string(), "cd".to_string()]);
        assert_eq!(split_chunks("", 250), vec![String::new()]);
    }

    #[test]
    fn override_fields_are_key_value_strings() {
        let fields = encode_override(&LayerOverride {
            color: Some(Color::Rgb(1, 2, 3)),
            linetype: Some("DASHED".into()),
            lineweight: Some(35),
            transparency: None,
        });
        assert_eq!(
            fields,
            vec!["color=rgb:1,2,3", "linetype=DASHED", "lineweight=35"]
        );
    }
}
