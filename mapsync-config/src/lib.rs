pub mod style;

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mapsync_core::document::{DxfVersion, is_valid_lineweight};
use serde::Deserialize;
use thiserror::Error;

pub use style::{
    ColorSpec, HatchProperties, LayerProperties, StyleDefinition, StyleRef, StyleRegistry,
    TextProperties,
};

/// 同步配置的根结构。
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    /// 写入归属标记的脚本标识，同时作为 XData 的 APPID。
    #[serde(default = "SyncConfig::default_script_id")]
    pub script_id: String,
    #[serde(default)]
    pub colors: BTreeMap<String, u8>,
    #[serde(default)]
    pub styles: BTreeMap<String, StyleDefinition>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub legends: Vec<LegendConfig>,
    #[serde(default)]
    pub viewports: Vec<ViewportConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            document: DocumentConfig::default(),
            script_id: Self::default_script_id(),
            colors: BTreeMap::new(),
            styles: BTreeMap::new(),
            layers: Vec::new(),
            legends: Vec::new(),
            viewports: Vec::new(),
        }
    }
}

impl SyncConfig {
    fn default_script_id() -> String {
        "MAPSYNC".to_string()
    }

    /// 从显式路径加载并校验配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: SyncConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `MAPSYNC_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("MAPSYNC_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 相对路径以配置文件所在目录为基准。
    fn resolve_relative_paths(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(input) = self.document.input.as_mut() {
            rebase(input);
        }
        rebase(&mut self.document.output);
        for layer in &mut self.layers {
            if let Some(source) = layer.source.as_mut() {
                rebase(source);
            }
        }
    }

    /// 解析目标 DXF 版本。`validate` 已保证可解析。
    pub fn dxf_version(&self) -> DxfVersion {
        self.document.version.parse().unwrap_or_default()
    }

    /// 在修改任何文档之前执行的配置期校验。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let script_id = self.script_id.trim();
        if script_id.is_empty() {
            return Err(ConfigError::invalid("script_id", "不能为空"));
        }
        if !script_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(ConfigError::invalid(
                "script_id",
                "只能包含 ASCII 字母、数字、下划线或连字符",
            ));
        }
        if self.document.version.parse::<DxfVersion>().is_err() {
            return Err(ConfigError::invalid(
                "document.version",
                format!("不支持的 DXF 版本 {:?}", self.document.version),
            ));
        }

        for (name, style) in &self.styles {
            validate_style(&format!("styles.{name}"), style)?;
        }

        let mut seen = HashSet::new();
        for (index, layer) in self.layers.iter().enumerate() {
            let field = format!("layers[{index}]");
            if layer.name.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{field}.name"), "不能为空"));
            }
            if !seen.insert(layer.name.trim().to_lowercase()) {
                return Err(ConfigError::invalid(
                    format!("{field}.name"),
                    format!("图层 {:?} 重复定义", layer.name),
                ));
            }
            layer.validate(&field)?;
        }

        for (index, legend) in self.legends.iter().enumerate() {
            legend.validate(&format!("legends[{index}]"))?;
        }
        for (index, viewport) in self.viewports.iter().enumerate() {
            let field = format!("viewports[{index}]");
            for (layer, properties) in &viewport.overrides {
                validate_layer_properties(&format!("{field}.overrides.{layer}"), properties)?;
            }
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// 已有图纸；缺省时读取 `output`，两者都不存在则新建。
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default = "DocumentConfig::default_output")]
    pub output: PathBuf,
    #[serde(default = "DocumentConfig::default_version")]
    pub version: String,
}

impl DocumentConfig {
    fn default_output() -> PathBuf {
        PathBuf::from("output.dxf")
    }

    fn default_version() -> String {
        "R2010".to_string()
    }

    /// 本次运行要打开的图纸路径。
    pub fn source_path(&self) -> &Path {
        self.input.as_deref().unwrap_or(&self.output)
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: Self::default_output(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapStyle {
    Square,
    Round,
}

impl Default for CapStyle {
    fn default() -> Self {
        CapStyle::Square
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvelopeConfig {
    #[serde(default)]
    pub padding: f64,
    #[serde(default)]
    pub min_ratio: Option<f64>,
    #[serde(default)]
    pub cap_style: CapStyle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 标注取值的属性列；缺省时按 label/name/id/text/description 依次回退。
    #[serde(default)]
    pub column: Option<String>,
    /// 点要素标注相对插入点的偏移。
    #[serde(default)]
    pub offset: [f64; 2],
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            column: None,
            offset: [0.0, 0.0],
        }
    }
}

/// 点要素的符号化方式。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointSymbolConfig {
    Point,
    Circle {
        #[serde(default = "PointSymbolConfig::default_radius")]
        radius: f64,
        #[serde(default)]
        radius_column: Option<String>,
        /// 同时给出起止角（度）列时绘制圆弧。
        #[serde(default)]
        start_angle_column: Option<String>,
        #[serde(default)]
        end_angle_column: Option<String>,
    },
    Block {
        name: String,
        #[serde(default = "PointSymbolConfig::default_scale")]
        scale: f64,
        #[serde(default)]
        rotation_column: Option<String>,
    },
    Text {
        #[serde(default)]
        column: Option<String>,
    },
}

impl PointSymbolConfig {
    fn default_radius() -> f64 {
        1.0
    }

    fn default_scale() -> f64 {
        1.0
    }
}

impl Default for PointSymbolConfig {
    fn default() -> Self {
        PointSymbolConfig::Point
    }
}

/// 沿线按固定间距重复插入块。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathBlockConfig {
    pub block: String,
    pub interval: f64,
    #[serde(default = "PointSymbolConfig::default_scale")]
    pub scale: f64,
    /// 是否按所在线段方向旋转。
    #[serde(default = "default_true")]
    pub align: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// 为 false 时只更新图层属性，不替换几何。
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default)]
    pub style: Option<StyleRef>,
    #[serde(default)]
    pub label: Option<LabelConfig>,
    #[serde(default)]
    pub close_linestrings: bool,
    #[serde(default)]
    pub hatch_only: bool,
    #[serde(default)]
    pub envelope: Option<EnvelopeConfig>,
    #[serde(default)]
    pub point_symbol: PointSymbolConfig,
    #[serde(default)]
    pub path_blocks: Option<PathBlockConfig>,
}

impl LayerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            update: true,
            style: None,
            label: None,
            close_linestrings: false,
            hatch_only: false,
            envelope: None,
            point_symbol: PointSymbolConfig::Point,
            path_blocks: None,
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if let Some(StyleRef::Inline(style)) = &self.style {
            validate_style(&format!("{field}.style"), style)?;
        }
        if let Some(envelope) = &self.envelope {
            if !envelope.padding.is_finite() {
                return Err(ConfigError::invalid(
                    format!("{field}.envelope.padding"),
                    "必须是有限数值",
                ));
            }
            if let Some(ratio) = envelope.min_ratio {
                if !ratio.is_finite() || ratio < 1.0 {
                    return Err(ConfigError::invalid(
                        format!("{field}.envelope.min_ratio"),
                        "必须是不小于 1 的有限数值",
                    ));
                }
            }
        }
        match &self.point_symbol {
            PointSymbolConfig::Circle { radius, .. } if !(radius.is_finite() && *radius > 0.0) => {
                return Err(ConfigError::invalid(
                    format!("{field}.point_symbol.radius"),
                    "必须为正数",
                ));
            }
            PointSymbolConfig::Block { name, scale, .. } => {
                if name.trim().is_empty() {
                    return Err(ConfigError::invalid(
                        format!("{field}.point_symbol.name"),
                        "不能为空",
                    ));
                }
                if !(scale.is_finite() && *scale > 0.0) {
                    return Err(ConfigError::invalid(
                        format!("{field}.point_symbol.scale"),
                        "必须为正数",
                    ));
                }
            }
            _ => {}
        }
        if let Some(path_blocks) = &self.path_blocks {
            if !(path_blocks.interval.is_finite() && path_blocks.interval > 0.0) {
                return Err(ConfigError::invalid(
                    format!("{field}.path_blocks.interval"),
                    "必须为正数",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegendItem {
    pub label: String,
    pub style: String,
}

/// 图例：生成一个块定义并在模型空间插入一次。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegendConfig {
    pub name: String,
    #[serde(default = "LegendConfig::default_layer")]
    pub layer: String,
    #[serde(default)]
    pub position: [f64; 2],
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "LegendConfig::default_swatch")]
    pub swatch_size: [f64; 2],
    #[serde(default = "LegendConfig::default_spacing")]
    pub spacing: f64,
    #[serde(default = "LegendConfig::default_text_height")]
    pub text_height: f64,
    #[serde(default)]
    pub items: Vec<LegendItem>,
}

impl LegendConfig {
    fn default_layer() -> String {
        "Legend".to_string()
    }

    fn default_swatch() -> [f64; 2] {
        [10.0, 5.0]
    }

    fn default_spacing() -> f64 {
        2.0
    }

    fn default_text_height() -> f64 {
        2.5
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid(format!("{field}.name"), "不能为空"));
        }
        let [width, height] = self.swatch_size;
        if !(width > 0.0 && height > 0.0 && self.text_height > 0.0 && self.spacing >= 0.0) {
            return Err(ConfigError::invalid(
                field.to_string(),
                "色块尺寸与字高必须为正数，间距不能为负",
            ));
        }
        Ok(())
    }
}

/// 图纸空间视口的图层覆盖。`viewport_ids` 为空时作用于该布局的全部视口。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewportConfig {
    pub layout: String,
    #[serde(default)]
    pub viewport_ids: Vec<i16>,
    #[serde(default)]
    pub overrides: BTreeMap<String, LayerProperties>,
}

fn default_true() -> bool {
    true
}

fn validate_style(field: &str, style: &StyleDefinition) -> Result<(), ConfigError> {
    if let Some(layer) = &style.layer {
        validate_layer_properties(&format!("{field}.layer"), layer)?;
    }
    if let Some(text) = &style.text {
        if let Some(color) = &text.color {
            validate_color(&format!("{field}.text.color"), color)?;
        }
        if let Some(height) = text.height {
            if !(height.is_finite() && height > 0.0) {
                return Err(ConfigError::invalid(format!("{field}.text.height"), "必须为正数"));
            }
        }
        if let Some(point) = text.attachment_point {
            if !(1..=9).contains(&point) {
                return Err(ConfigError::invalid(
                    format!("{field}.text.attachment_point"),
                    format!("{point} 不在 1..=9 范围内"),
                ));
            }
        }
    }
    if let Some(hatch) = &style.hatch {
        if let Some(color) = &hatch.color {
            validate_color(&format!("{field}.hatch.color"), color)?;
        }
        if let Some(scale) = hatch.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ConfigError::invalid(format!("{field}.hatch.scale"), "必须为正数"));
            }
        }
    }
    Ok(())
}

fn validate_layer_properties(field: &str, properties: &LayerProperties) -> Result<(), ConfigError> {
    if let Some(color) = &properties.color {
        validate_color(&format!("{field}.color"), color)?;
    }
    if let Some(lineweight) = properties.lineweight {
        if !is_valid_lineweight(lineweight) {
            return Err(ConfigError::invalid(
                format!("{field}.lineweight"),
                format!("{lineweight} 不是合法的 DXF 线宽"),
            ));
        }
    }
    if let Some(transparency) = properties.transparency {
        if !(0.0..=1.0).contains(&transparency) {
            return Err(ConfigError::invalid(
                format!("{field}.transparency"),
                "必须位于 0.0..=1.0",
            ));
        }
    }
    Ok(())
}

fn validate_color(field: &str, color: &ColorSpec) -> Result<(), ConfigError> {
    match color {
        ColorSpec::Index(index) if !(0..=255).contains(index) => Err(ConfigError::invalid(
            field.to_string(),
            format!("ACI 索引 {index} 不在 0..=255 范围内"),
        )),
        ColorSpec::Rgb(rgb) if rgb.iter().any(|c| !(0..=255).contains(c)) => Err(
            ConfigError::invalid(field.to_string(), format!("RGB 分量 {rgb:?} 超出 0..=255")),
        ),
        _ => Ok(()),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: String, reason: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(content: &str) -> SyncConfig {
        toml::from_str(content).expect("parse config")
    }

    #[test]
    fn defaults_are_sensible() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.script_id, "MAPSYNC");
        assert_eq!(cfg.document.output, PathBuf::from("output.dxf"));
        assert_eq!(cfg.dxf_version(), DxfVersion::R2010);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            script_id = "CITYSYNC"

            [logging]
            level = "debug"

            [document]
            output = "city.dxf"
            version = "R2013"

            [colors]
            forest = 94

            [styles.roads]
            layer = {{ color = "red", linetype = "DASHED", lineweight = 35 }}
            text = {{ font = "Arial", height = 2.0, attachment_point = 5 }}

            [styles.parks]
            layer = {{ color = [0, 128, 0] }}
            hatch = {{ pattern = "ANSI31", scale = 0.5, color = "forest" }}

            [[layers]]
            name = "Roads"
            source = "roads.geojson"
            style = "roads"
            label = {{ column = "NAME" }}

            [[layers]]
            name = "Parks"
            update = false
            style = {{ layer = {{ color = 3 }} }}
            envelope = {{ padding = 2.0, min_ratio = 1.5, cap_style = "round" }}
            point_symbol = {{ kind = "circle", radius = 0.5 }}
            "#
        )
        .unwrap();

        let cfg = SyncConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.script_id, "CITYSYNC");
        assert_eq!(cfg.dxf_version(), DxfVersion::R2013);
        assert_eq!(cfg.colors.get("forest"), Some(&94));
        assert_eq!(cfg.layers.len(), 2);

        let base = file.path().parent().unwrap();
        assert_eq!(cfg.document.output, base.join("city.dxf"));
        assert_eq!(cfg.layers[0].source.as_deref(), Some(base.join("roads.geojson").as_path()));
        assert_eq!(cfg.layers[0].style, Some(StyleRef::Named("roads".into())));
        assert_eq!(
            cfg.layers[0].label.as_ref().and_then(|l| l.column.as_deref()),
            Some("NAME")
        );

        let parks = &cfg.layers[1];
        assert!(!parks.update);
        assert!(matches!(parks.style, Some(StyleRef::Inline(_))));
        let envelope = parks.envelope.as_ref().unwrap();
        assert_eq!(envelope.cap_style, CapStyle::Round);
        assert_eq!(envelope.min_ratio, Some(1.5));
        assert!(matches!(parks.point_symbol, PointSymbolConfig::Circle { radius, .. } if radius == 0.5));

        let roads = cfg.styles.get("roads").unwrap();
        let layer = roads.layer.as_ref().unwrap();
        assert_eq!(layer.color, Some(ColorSpec::Name("red".into())));
        assert_eq!(layer.lineweight, Some(35));
        let parks_style = cfg.styles.get("parks").unwrap();
        assert_eq!(
            parks_style.layer.as_ref().unwrap().color,
            Some(ColorSpec::Rgb([0, 128, 0]))
        );
    }

    #[test]
    fn invalid_lineweight_is_rejected_at_load_time() {
        let cfg = parse(
            r#"
            [styles.bad]
            layer = { lineweight = 12 }
            "#,
        );
        let err = cfg.validate().unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "styles.bad.layer.lineweight"),
            other => panic!("unexpected error: {other}"),
        }

        for ok in [-3, -2, -1, 0, 9, 211] {
            let cfg = parse(&format!("[styles.ok]\nlayer = {{ lineweight = {ok} }}\n"));
            assert!(cfg.validate().is_ok(), "lineweight {ok} should be accepted");
        }
    }

    #[test]
    fn out_of_range_colors_are_rejected() {
        let cfg = parse(
            r#"
            [[layers]]
            name = "A"
            style = { layer = { color = 300 } }
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));

        let cfg = parse(
            r#"
            [styles.s]
            hatch = { color = [0, 256, 0] }
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn duplicate_layer_names_are_rejected() {
        let cfg = parse(
            r#"
            [[layers]]
            name = "Roads"
            [[layers]]
            name = "ROADS"
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn envelope_and_script_id_are_checked() {
        let cfg = parse(
            r#"
            [[layers]]
            name = "Blocks"
            envelope = { padding = 1.0, min_ratio = 0.5 }
            "#,
        );
        assert!(cfg.validate().is_err());

        let cfg = parse("script_id = \"has space\"\n");
        assert!(cfg.validate().is_err());

        let cfg = parse("[document]\nversion = \"R12\"\n");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = SyncConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
