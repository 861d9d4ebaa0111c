//! 样式解析：把配置中的样式定义层叠解析为一个不可变的 [`ResolvedStyle`]。
//!
//! 解析顺序：图层内联样式 → 命名样式引用 → 与图层同名的注册表条目 → 系统默认。
//! 线型与文字样式在解析时登记到文档，登记失败时退回默认资源。

use std::path::Path;

use mapsync_config::{
    ColorSpec, HatchProperties, LayerConfig, LayerProperties, StyleDefinition, StyleRef,
    StyleRegistry, TextProperties,
};
use mapsync_core::document::{
    AttachmentPoint, Color, Document, HatchPattern, LINETYPE_BYBLOCK, LINETYPE_BYLAYER,
    LINETYPE_CONTINUOUS, LINEWEIGHT_DEFAULT, Layer, LayerOverride, Linetype, STANDARD_TEXT_STYLE,
    TextStyle, is_valid_lineweight,
};
use tracing::{debug, warn};

use crate::errors::ResourceError;

pub const DEFAULT_TEXT_HEIGHT: f64 = 2.5;

/// 已知线型的虚线模式（正值为实线段，负值为空白，0 为点）。
const KNOWN_LINETYPES: &[(&str, &str, &[f64])] = &[
    ("DASHED", "Dashed __ __ __ __", &[0.5, -0.25]),
    ("DOTTED", "Dotted . . . . .", &[0.0, -0.25]),
    ("DASHDOT", "Dash dot __ . __ .", &[0.5, -0.25, 0.0, -0.25]),
    ("CENTER", "Center ____ _ ____ _", &[1.25, -0.25, 0.25, -0.25]),
    (
        "PHANTOM",
        "Phantom ____ _ _ ____",
        &[1.25, -0.25, 0.25, -0.25, 0.25, -0.25],
    ),
];

const GENERIC_DASH: &[f64] = &[0.5, -0.25];

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedText {
    /// 已在文档中登记的文字样式名。
    pub style: String,
    pub height: f64,
    pub color: Color,
    pub attachment: AttachmentPoint,
    pub max_width: Option<f64>,
}

impl Default for ResolvedText {
    fn default() -> Self {
        Self {
            style: STANDARD_TEXT_STYLE.to_string(),
            height: DEFAULT_TEXT_HEIGHT,
            color: Color::ByLayer,
            attachment: AttachmentPoint::default(),
            max_width: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHatch {
    pub pattern: HatchPattern,
    pub color: Color,
}

/// 一个图层的完整样式，解析一次后按引用传递。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub color: Color,
    pub linetype: String,
    pub lineweight: i16,
    pub transparency: Option<f64>,
    pub plot: Option<bool>,
    pub visible: Option<bool>,
    pub frozen: Option<bool>,
    pub locked: Option<bool>,
    pub text: ResolvedText,
    pub hatch: Option<ResolvedHatch>,
}

impl Default for ResolvedStyle {
    fn default() -> Self {
        Self {
            color: Color::ByLayer,
            linetype: LINETYPE_CONTINUOUS.to_string(),
            lineweight: LINEWEIGHT_DEFAULT,
            transparency: None,
            plot: None,
            visible: None,
            frozen: None,
            locked: None,
            text: ResolvedText::default(),
            hatch: None,
        }
    }
}

impl ResolvedStyle {
    /// 原地更新图层属性；未配置的开关保持图层现状。
    pub fn apply_to_layer(&self, layer: &mut Layer) {
        // 图层表项不接受 ByLayer/ByBlock
        if matches!(self.color, Color::Aci(_) | Color::Rgb(..)) {
            layer.set_color(self.color);
        }
        layer.set_linetype(self.linetype.as_str());
        layer.set_lineweight(self.lineweight);
        if self.transparency.is_some() {
            layer.set_transparency(self.transparency);
        }
        if let Some(plot) = self.plot {
            layer.set_plot(plot);
        }
        match self.visible {
            Some(true) => layer.on(),
            Some(false) => layer.off(),
            None => {}
        }
        match self.frozen {
            Some(true) => layer.freeze(),
            Some(false) => layer.thaw(),
            None => {}
        }
        match self.locked {
            Some(true) => layer.lock(),
            Some(false) => layer.unlock(),
            None => {}
        }
    }
}

/// 基于样式注册表的解析器。
#[derive(Debug, Clone, Copy)]
pub struct StyleResolver<'a> {
    registry: &'a StyleRegistry,
}

impl<'a> StyleResolver<'a> {
    pub fn new(registry: &'a StyleRegistry) -> Self {
        Self { registry }
    }

    /// 按层叠顺序查找图层的样式定义。
    pub fn definition_for<'b>(&self, layer: &'b LayerConfig) -> Option<&'b StyleDefinition>
    where
        'a: 'b,
    {
        match &layer.style {
            Some(StyleRef::Inline(style)) => return Some(style),
            Some(StyleRef::Named(name)) => match self.registry.style(name) {
                Some(style) => return Some(style),
                None => warn!(layer = %layer.name, style = %name, "命名样式不存在，尝试同名样式"),
            },
            None => {}
        }
        self.registry.style(&layer.name)
    }

    pub fn named(&self, name: &str) -> Option<&'a StyleDefinition> {
        self.registry.style(name)
    }

    /// 解析样式定义，并把需要的线型与文字样式登记到文档。
    pub fn resolve(&self, document: &mut Document, definition: Option<&StyleDefinition>) -> ResolvedStyle {
        let mut resolved = ResolvedStyle::default();
        let Some(definition) = definition else {
            return resolved;
        };
        if let Some(layer) = &definition.layer {
            self.resolve_layer_properties(document, layer, &mut resolved);
        }
        if let Some(text) = &definition.text {
            resolved.text = self.resolve_text(document, text);
        }
        if let Some(hatch) = &definition.hatch {
            resolved.hatch = Some(self.resolve_hatch(hatch));
        }
        resolved
    }

    fn resolve_layer_properties(
        &self,
        document: &mut Document,
        properties: &LayerProperties,
        resolved: &mut ResolvedStyle,
    ) {
        if let Some(color) = &properties.color {
            resolved.color = self.resolve_color(color);
        }
        if let Some(name) = &properties.linetype {
            resolved.linetype = ensure_linetype_or_default(document, name);
        }
        if let Some(lineweight) = properties.lineweight {
            resolved.lineweight = checked_lineweight(lineweight);
        }
        resolved.transparency = properties.transparency.map(|value| value.clamp(0.0, 1.0));
        resolved.plot = properties.plot;
        resolved.visible = properties.visible;
        resolved.frozen = properties.frozen;
        resolved.locked = properties.locked;
    }

    fn resolve_text(&self, document: &mut Document, text: &TextProperties) -> ResolvedText {
        let mut resolved = ResolvedText::default();
        if let Some(font) = &text.font {
            resolved.style = match ensure_text_style(document, font) {
                Ok(style) => style,
                Err(err) => {
                    warn!(font = %font, error = %err, "文字样式登记失败，使用 Standard");
                    STANDARD_TEXT_STYLE.to_string()
                }
            };
        }
        if let Some(height) = text.height.filter(|height| height.is_finite() && *height > 0.0) {
            resolved.height = height;
        }
        if let Some(color) = &text.color {
            resolved.color = self.resolve_color(color);
        }
        if let Some(point) = text.attachment_point {
            resolved.attachment = i16::try_from(point)
                .ok()
                .and_then(AttachmentPoint::from_code)
                .unwrap_or_default();
        }
        resolved.max_width = text.max_width.filter(|width| width.is_finite() && *width > 0.0);
        resolved
    }

    /// 缺省或 `SOLID` 为实体填充，否则为图案填充。
    pub fn resolve_hatch(&self, hatch: &HatchProperties) -> ResolvedHatch {
        let color = hatch
            .color
            .as_ref()
            .map(|color| self.resolve_color(color))
            .unwrap_or(Color::ByLayer);
        let pattern = match hatch.pattern.as_deref().map(str::trim) {
            None | Some("") => HatchPattern::Solid,
            Some(name) if name.eq_ignore_ascii_case("SOLID") => HatchPattern::Solid,
            Some(name) => HatchPattern::Predefined {
                name: name.to_ascii_uppercase(),
                scale: hatch.scale.unwrap_or(1.0),
                angle: hatch.angle.unwrap_or(0.0),
            },
        };
        ResolvedHatch { pattern, color }
    }

    /// 颜色解析是全函数：任何输入都得到一个具体颜色，无法识别的名称退回 ACI 7。
    pub fn resolve_color(&self, spec: &ColorSpec) -> Color {
        match spec {
            ColorSpec::Index(index) => match i16::try_from(*index) {
                Ok(code) if (0..=256).contains(&code) => Color::from_aci_code(code),
                _ => {
                    warn!(index, "ACI 索引超出范围，使用白色");
                    Color::WHITE
                }
            },
            ColorSpec::Rgb([r, g, b]) => Color::Rgb(channel(*r), channel(*g), channel(*b)),
            ColorSpec::Name(name) => self.resolve_color_name(name),
        }
    }

    fn resolve_color_name(&self, name: &str) -> Color {
        let trimmed = name.trim();
        if let Some([r, g, b]) = parse_rgb_triple(trimmed) {
            return Color::Rgb(r, g, b);
        }
        if trimmed.eq_ignore_ascii_case("bylayer") {
            return Color::ByLayer;
        }
        if trimmed.eq_ignore_ascii_case("byblock") {
            return Color::ByBlock;
        }
        if let Ok(index) = trimmed.parse::<i64>() {
            return self.resolve_color(&ColorSpec::Index(index));
        }
        match self.registry.aci_for_name(trimmed) {
            Some(aci) => Color::from_aci_code(i16::from(aci)),
            None => {
                warn!(color = %name, "未知颜色名，使用 ACI 7");
                Color::WHITE
            }
        }
    }

    /// 把配置中的视口覆盖转换为图层覆盖，顺带登记线型。
    pub fn resolve_override(&self, document: &mut Document, properties: &LayerProperties) -> LayerOverride {
        LayerOverride {
            color: properties.color.as_ref().map(|color| self.resolve_color(color)),
            linetype: properties
                .linetype
                .as_ref()
                .map(|name| ensure_linetype_or_default(document, name)),
            lineweight: properties.lineweight.map(checked_lineweight),
            transparency: properties.transparency.map(|value| value.clamp(0.0, 1.0)),
        }
    }
}

fn channel(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// 识别 `"r,g,b"`（可带括号）形式的颜色字符串。
fn parse_rgb_triple(text: &str) -> Option<[u8; 3]> {
    let inner = text
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();
    let mut parts = inner.split(',');
    let mut rgb = [0u8; 3];
    for slot in &mut rgb {
        let value: i64 = parts.next()?.trim().parse().ok()?;
        *slot = u8::try_from(value).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(rgb)
}

fn checked_lineweight(value: i64) -> i16 {
    match i16::try_from(value) {
        Ok(lineweight) if is_valid_lineweight(value) => lineweight,
        _ => {
            warn!(lineweight = value, "非法线宽，使用默认线宽");
            LINEWEIGHT_DEFAULT
        }
    }
}

fn ensure_linetype_or_default(document: &mut Document, name: &str) -> String {
    match ensure_linetype(document, name) {
        Ok(linetype) => linetype,
        Err(err) => {
            warn!(linetype = %name, error = %err, "线型登记失败，使用 Continuous");
            LINETYPE_CONTINUOUS.to_string()
        }
    }
}

/// 确保线型存在并返回文档中使用的名称。重复调用不会重复登记。
pub fn ensure_linetype(document: &mut Document, name: &str) -> Result<String, ResourceError> {
    let name = name.trim();
    for standard in [LINETYPE_BYLAYER, LINETYPE_BYBLOCK, LINETYPE_CONTINUOUS] {
        if name.eq_ignore_ascii_case(standard) {
            return Ok(standard.to_string());
        }
    }
    if let Some(existing) = document.linetypes().get(name) {
        return Ok(existing.name.clone());
    }

    let known = KNOWN_LINETYPES
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(name));
    let linetype = match known {
        Some((known, description, pattern)) => Linetype::new(*known, *description, pattern.to_vec()),
        None => {
            warn!(linetype = %name, "未知线型，按通用虚线登记");
            Linetype::new(name, format!("{name} __ __ __"), GENERIC_DASH.to_vec())
        }
    };
    let registered = linetype.name.clone();
    document
        .linetypes_mut()
        .add(linetype)
        .map_err(|source| ResourceError::Linetype {
            name: name.to_string(),
            source,
        })?;
    debug!(linetype = %registered, "已登记线型");
    Ok(registered)
}

/// 字体名到文字样式名的确定性映射：`fonts/Arial Bold.ttf` → `Style_Arial_Bold`。
pub fn text_style_name(font: &str) -> String {
    let stem = Path::new(font.trim())
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let sanitized = sanitized.trim_matches('_');
    if sanitized.is_empty() {
        STANDARD_TEXT_STYLE.to_string()
    } else {
        format!("Style_{sanitized}")
    }
}

/// 确保字体对应的文字样式存在，已存在时直接复用。
pub fn ensure_text_style(document: &mut Document, font: &str) -> Result<String, ResourceError> {
    let name = text_style_name(font);
    if let Some(existing) = document.text_styles().get(&name) {
        return Ok(existing.name.clone());
    }
    document
        .text_styles_mut()
        .add(TextStyle::new(name.as_str(), font.trim()))
        .map_err(|source| ResourceError::TextStyle {
            name: name.clone(),
            source,
        })?;
    debug!(style = %name, font = %font, "已登记文字样式");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn registry() -> StyleRegistry {
        let mut styles = BTreeMap::new();
        styles.insert(
            "major_road".to_string(),
            StyleDefinition {
                layer: Some(LayerProperties {
                    color: Some(ColorSpec::Name("red".into())),
                    linetype: Some("dashed".into()),
                    lineweight: Some(50),
                    ..LayerProperties::default()
                }),
                ..StyleDefinition::default()
            },
        );
        styles.insert(
            "Parks".to_string(),
            StyleDefinition {
                hatch: Some(HatchProperties {
                    pattern: Some("ansi31".into()),
                    color: Some(ColorSpec::Index(3)),
                    scale: Some(2.0),
                    angle: None,
                }),
                ..StyleDefinition::default()
            },
        );
        let mut colors = BTreeMap::new();
        colors.insert("forest".to_string(), 94);
        StyleRegistry::new(styles, colors)
    }

    #[test]
    fn color_resolution_is_total() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        for index in 0..=255 {
            let _ = resolver.resolve_color(&ColorSpec::Index(index));
        }
        assert_eq!(resolver.resolve_color(&ColorSpec::Index(1)), Color::Aci(1));
        assert_eq!(resolver.resolve_color(&ColorSpec::Index(999)), Color::WHITE);
        assert_eq!(
            resolver.resolve_color(&ColorSpec::Rgb([10, 20, 300])),
            Color::Rgb(10, 20, 255)
        );
        assert_eq!(
            resolver.resolve_color(&ColorSpec::Name(" 12, 34 ,56".into())),
            Color::Rgb(12, 34, 56)
        );
        assert_eq!(
            resolver.resolve_color(&ColorSpec::Name("FOREST".into())),
            Color::Aci(94)
        );
        assert_eq!(
            resolver.resolve_color(&ColorSpec::Name("ByLayer".into())),
            Color::ByLayer
        );
        for junk in ["", "no-such-colour", "1,2", "1,2,3,4", "300,0,0", "🙂"] {
            assert_eq!(
                resolver.resolve_color(&ColorSpec::Name(junk.into())),
                Color::WHITE,
                "input {junk:?}"
            );
        }
    }

    #[test]
    fn cascade_prefers_inline_then_named_then_layer_name() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);

        let mut inline = LayerConfig::new("Parks");
        inline.style = Some(StyleRef::Inline(StyleDefinition::default()));
        assert_eq!(
            resolver.definition_for(&inline),
            Some(&StyleDefinition::default())
        );

        let mut named = LayerConfig::new("Roads");
        named.style = Some(StyleRef::Named("MAJOR_ROAD".into()));
        assert!(resolver.definition_for(&named).unwrap().layer.is_some());

        let by_name = LayerConfig::new("parks");
        assert!(resolver.definition_for(&by_name).unwrap().hatch.is_some());

        let mut dangling = LayerConfig::new("Parks");
        dangling.style = Some(StyleRef::Named("missing".into()));
        assert!(resolver.definition_for(&dangling).unwrap().hatch.is_some());

        assert!(resolver.definition_for(&LayerConfig::new("Rivers")).is_none());
    }

    #[test]
    fn resolve_registers_resources_once() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let mut doc = Document::default();
        let definition = registry.style("major_road").cloned();

        let first = resolver.resolve(&mut doc, definition.as_ref());
        let count = doc.linetypes().len();
        let second = resolver.resolve(&mut doc, definition.as_ref());

        assert_eq!(first, second);
        assert_eq!(doc.linetypes().len(), count);
        assert_eq!(first.color, Color::Aci(1));
        assert_eq!(first.linetype, "DASHED");
        assert_eq!(first.lineweight, 50);
        assert_eq!(doc.linetypes().get("dashed").unwrap().pattern, vec![0.5, -0.25]);
    }

    #[test]
    fn defaults_apply_without_definition() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let resolved = resolver.resolve(&mut Document::default(), None);
        assert_eq!(resolved, ResolvedStyle::default());
        assert_eq!(resolved.color, Color::ByLayer);
        assert_eq!(resolved.linetype, LINETYPE_CONTINUOUS);
        assert_eq!(resolved.lineweight, LINEWEIGHT_DEFAULT);
    }

    #[test]
    fn unknown_linetype_gets_generic_dash() {
        let mut doc = Document::default();
        let name = ensure_linetype(&mut doc, "RAILWAY").unwrap();
        assert_eq!(name, "RAILWAY");
        assert_eq!(doc.linetypes().get("railway").unwrap().pattern, GENERIC_DASH);
        assert_eq!(ensure_linetype(&mut doc, "continuous").unwrap(), LINETYPE_CONTINUOUS);
    }

    #[test]
    fn invalid_linetype_name_degrades_to_continuous() {
        let mut doc = Document::default();
        assert!(ensure_linetype(&mut doc, "bad|name").is_err());
        assert_eq!(ensure_linetype_or_default(&mut doc, "bad|name"), LINETYPE_CONTINUOUS);
    }

    #[test]
    fn text_style_names_are_sanitized_and_reused() {
        assert_eq!(text_style_name("fonts/Arial Bold.ttf"), "Style_Arial_Bold");
        assert_eq!(text_style_name("simsun.shx"), "Style_simsun");
        assert_eq!(text_style_name("   "), STANDARD_TEXT_STYLE);

        let mut doc = Document::default();
        let first = ensure_text_style(&mut doc, "Arial.ttf").unwrap();
        let count = doc.text_styles().len();
        let second = ensure_text_style(&mut doc, "arial.ttf").unwrap();
        assert_eq!(first, second);
        assert_eq!(doc.text_styles().len(), count);
    }

    #[test]
    fn hatch_pattern_resolution() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let solid = resolver.resolve_hatch(&HatchProperties {
            pattern: Some("solid".into()),
            ..HatchProperties::default()
        });
        assert_eq!(solid.pattern, HatchPattern::Solid);
        assert_eq!(solid.color, Color::ByLayer);

        let parks = resolver.resolve_hatch(registry.style("parks").unwrap().hatch.as_ref().unwrap());
        assert_eq!(
            parks.pattern,
            HatchPattern::Predefined {
                name: "ANSI31".into(),
                scale: 2.0,
                angle: 0.0
            }
        );
        assert_eq!(parks.color, Color::Aci(3));
    }

    #[test]
    fn layer_update_is_in_place() {
        let mut layer = Layer::new("Roads");
        layer.lock();
        let style = ResolvedStyle {
            color: Color::Rgb(1, 2, 3),
            lineweight: 35,
            visible: Some(false),
            ..ResolvedStyle::default()
        };
        style.apply_to_layer(&mut layer);
        assert_eq!(layer.color, Color::Rgb(1, 2, 3));
        assert_eq!(layer.lineweight, 35);
        assert!(!layer.is_on);
        assert!(layer.is_locked);
    }
}
