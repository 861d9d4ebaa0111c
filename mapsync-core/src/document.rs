//! 图纸文档模型：图层表、线型表、文字样式、块定义以及跨布局的实体存储。
//!
//! 实体删除采用“回收站”两阶段方式：先在扫描期间把句柄收集进 [`Trashcan`]，
//! 扫描结束后再统一 [`EntityStore::commit`]，最后 [`EntityStore::purge`] 压缩存储。

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Bounds2D, Point2, Vector2};

pub const MODEL_SPACE: &str = "Model";
pub const DEFAULT_PAPER_LAYOUT: &str = "Layout1";
pub const DEFAULT_LAYER: &str = "0";
pub const HYPERLINK_APP_ID: &str = "PE_URL";
pub const STANDARD_TEXT_STYLE: &str = "Standard";

pub const LINETYPE_BYLAYER: &str = "ByLayer";
pub const LINETYPE_BYBLOCK: &str = "ByBlock";
pub const LINETYPE_CONTINUOUS: &str = "Continuous";

pub const LINEWEIGHT_BYLAYER: i16 = -1;
pub const LINEWEIGHT_BYBLOCK: i16 = -2;
pub const LINEWEIGHT_DEFAULT: i16 = -3;

/// DXF 允许的线宽取值（单位 1/100 mm）。
pub const VALID_LINEWEIGHTS: [i16; 24] = [
    0, 5, 9, 13, 15, 18, 20, 25, 30, 35, 40, 50, 53, 60, 70, 80, 90, 100, 106, 120, 140, 158,
    200, 211,
];

/// 组码 1000 字符串的最大长度。
pub const MAX_STRING_LENGTH: usize = 255;

const INVALID_NAME_CHARS: &[char] = &['<', '>', '/', '\\', '"', ':', ';', '?', '*', '|', '=', '`'];

/// 判断线宽是否为 DXF 合法值（含 ByLayer/ByBlock/Default 三个哨兵值）。
pub fn is_valid_lineweight(value: i64) -> bool {
    matches!(value, -3..=-1) || VALID_LINEWEIGHTS.iter().any(|&lw| i64::from(lw) == value)
}

/// 表项名称的规范键：去除首尾空白并转为小写，与 DXF 的大小写不敏感语义一致。
pub fn canonical_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentError {
    #[error("entity {0:#X} not found")]
    EntityNotFound(u64),
    #[error("duplicate entity handle {0:#X}")]
    DuplicateHandle(u64),
    #[error("invalid table entry name {0:?}")]
    InvalidName(String),
    #[error("table entry {0:?} already exists")]
    DuplicateName(String),
    #[error("layout {0:?} not found")]
    LayoutNotFound(String),
    #[error("string value of {0} characters exceeds the {MAX_STRING_LENGTH} character limit")]
    StringTooLong(usize),
    #[error("unsupported DXF version {0:?}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 提供原始数值，便于序列化或日志输出。
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// 支持写出的 DXF 版本（AC1015 起才有 XData 与 LWPOLYLINE 的完整支持）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DxfVersion {
    R2000,
    R2004,
    R2007,
    R2010,
    R2013,
    R2018,
}

impl DxfVersion {
    pub fn acad_code(self) -> &'static str {
        match self {
            DxfVersion::R2000 => "AC1015",
            DxfVersion::R2004 => "AC1018",
            DxfVersion::R2007 => "AC1021",
            DxfVersion::R2010 => "AC1024",
            DxfVersion::R2013 => "AC1027",
            DxfVersion::R2018 => "AC1032",
        }
    }

    pub fn from_acad_code(code: &str) -> Option<Self> {
        [
            DxfVersion::R2000,
            DxfVersion::R2004,
            DxfVersion::R2007,
            DxfVersion::R2010,
            DxfVersion::R2013,
            DxfVersion::R2018,
        ]
        .into_iter()
        .find(|version| version.acad_code().eq_ignore_ascii_case(code.trim()))
    }
}

impl Default for DxfVersion {
    fn default() -> Self {
        DxfVersion::R2010
    }
}

impl FromStr for DxfVersion {
    type Err = DocumentError;

    /// 接受 `R2010` 形式的发布名或 `AC1024` 形式的版本码。
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Some(version) = Self::from_acad_code(trimmed) {
            return Ok(version);
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "R2000" => Ok(DxfVersion::R2000),
            "R2004" => Ok(DxfVersion::R2004),
            "R2007" => Ok(DxfVersion::R2007),
            "R2010" => Ok(DxfVersion::R2010),
            "R2013" => Ok(DxfVersion::R2013),
            "R2018" => Ok(DxfVersion::R2018),
            _ => Err(DocumentError::UnsupportedVersion(trimmed.to_string())),
        }
    }
}

/// 已解析的颜色值。图层颜色只会是 `Aci` 或 `Rgb`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    ByLayer,
    ByBlock,
    Aci(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub const WHITE: Color = Color::Aci(7);

    /// 组码 62 的取值；真彩色同时写出 420，此处给出最接近的兜底索引。
    pub fn aci_code(self) -> i16 {
        match self {
            Color::ByLayer => 256,
            Color::ByBlock => 0,
            Color::Aci(index) => i16::from(index),
            Color::Rgb(..) => 7,
        }
    }

    /// 组码 420 的 24 位真彩色值。
    pub fn true_color(self) -> Option<i32> {
        match self {
            Color::Rgb(r, g, b) => Some((i32::from(r) << 16) | (i32::from(g) << 8) | i32::from(b)),
            _ => None,
        }
    }

    pub fn from_true_color(value: i32) -> Self {
        Color::Rgb(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        )
    }

    pub fn from_aci_code(code: i16) -> Self {
        match code {
            256 => Color::ByLayer,
            0 => Color::ByBlock,
            // 负值表示图层关闭，颜色本身取绝对值
            other => Color::Aci(other.unsigned_abs().min(255) as u8),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::ByLayer
    }
}

/// 表项公共接口，供 [`NamedTable`] 取规范键。
pub trait TableEntry {
    fn name(&self) -> &str;
}

/// 以规范键索引、保持插入顺序的具名表（图层、线型、文字样式、APPID、块）。
#[derive(Debug, Clone)]
pub struct NamedTable<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: TableEntry> NamedTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(&canonical_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index
            .get(&canonical_name(name))
            .map(|&slot| &self.entries[slot])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.index.get(&canonical_name(name)) {
            Some(&slot) => Some(&mut self.entries[slot]),
            None => None,
        }
    }

    /// 新增表项；名称非法或已存在时返回错误。
    pub fn add(&mut self, entry: T) -> Result<&mut T, DocumentError> {
        validate_table_name(entry.name())?;
        let key = canonical_name(entry.name());
        if self.index.contains_key(&key) {
            return Err(DocumentError::DuplicateName(entry.name().to_string()));
        }
        let slot = self.entries.len();
        self.entries.push(entry);
        self.index.insert(key, slot);
        Ok(&mut self.entries[slot])
    }

    /// 取已有表项，不存在时用 `make` 创建。
    pub fn get_or_insert_with(
        &mut self,
        name: &str,
        make: impl FnOnce() -> T,
    ) -> Result<&mut T, DocumentError> {
        let key = canonical_name(name);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let entry = make();
                validate_table_name(entry.name())?;
                let slot = self.entries.len();
                self.entries.push(entry);
                self.index.insert(key, slot);
                slot
            }
        };
        Ok(&mut self.entries[slot])
    }

    /// 以同名新值覆盖（不存在时新增），返回是否发生了替换。
    pub fn replace(&mut self, entry: T) -> Result<bool, DocumentError> {
        validate_table_name(entry.name())?;
        let key = canonical_name(entry.name());
        match self.index.get(&key) {
            Some(&slot) => {
                self.entries[slot] = entry;
                Ok(true)
            }
            None => {
                self.add(entry)?;
                Ok(false)
            }
        }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: TableEntry> Default for NamedTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_table_name(name: &str) -> Result<(), DocumentError> {
    if name.trim().is_empty() || name.contains(INVALID_NAME_CHARS) {
        return Err(DocumentError::InvalidName(name.to_string()));
    }
    if name.chars().count() > MAX_STRING_LENGTH {
        return Err(DocumentError::StringTooLong(name.chars().count()));
    }
    Ok(())
}

/// 视口级别的图层外观覆盖。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerOverride {
    pub color: Option<Color>,
    pub linetype: Option<String>,
    pub lineweight: Option<i16>,
    pub transparency: Option<f64>,
}

impl LayerOverride {
    pub fn is_empty(&self) -> bool {
        self.color.is_none()
            && self.linetype.is_none()
            && self.lineweight.is_none()
            && self.transparency.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub color: Color,
    pub linetype: String,
    pub lineweight: i16,
    /// 透明度，0.0 为不透明，1.0 为完全透明。
    pub transparency: Option<f64>,
    pub plot: bool,
    pub is_on: bool,
    pub is_frozen: bool,
    pub is_locked: bool,
    /// 以视口 ID（组码 69）为键。
    pub viewport_overrides: BTreeMap<i16, LayerOverride>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: Color::WHITE,
            linetype: LINETYPE_CONTINUOUS.to_string(),
            lineweight: LINEWEIGHT_DEFAULT,
            transparency: None,
            plot: true,
            is_on: true,
            is_frozen: false,
            is_locked: false,
            viewport_overrides: BTreeMap::new(),
        }
    }

    /// 图层颜色不接受 ByLayer/ByBlock，这两种情况回落到白色。
    pub fn set_color(&mut self, color: Color) {
        self.color = match color {
            Color::ByLayer | Color::ByBlock => Color::WHITE,
            other => other,
        };
    }

    pub fn set_linetype(&mut self, linetype: impl Into<String>) {
        self.linetype = linetype.into();
    }

    pub fn set_lineweight(&mut self, lineweight: i16) {
        self.lineweight = lineweight;
    }

    pub fn set_transparency(&mut self, transparency: Option<f64>) {
        self.transparency = transparency.map(|value| value.clamp(0.0, 1.0));
    }

    pub fn set_plot(&mut self, plot: bool) {
        self.plot = plot;
    }

    pub fn on(&mut self) {
        self.is_on = true;
    }

    pub fn off(&mut self) {
        self.is_on = false;
    }

    pub fn freeze(&mut self) {
        self.is_frozen = true;
    }

    pub fn thaw(&mut self) {
        self.is_frozen = false;
    }

    pub fn lock(&mut self) {
        self.is_locked = true;
    }

    pub fn unlock(&mut self) {
        self.is_locked = false;
    }

    /// 设置（或在覆盖为空时移除）某视口的图层覆盖。
    pub fn set_viewport_override(&mut self, viewport_id: i16, layer_override: LayerOverride) {
        if layer_override.is_empty() {
            self.viewport_overrides.remove(&viewport_id);
        } else {
            self.viewport_overrides.insert(viewport_id, layer_override);
        }
    }
}

impl TableEntry for Layer {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linetype {
    pub name: String,
    pub description: String,
    /// 正值为实线段，负值为空白，0 为点。
    pub pattern: Vec<f64>,
}

impl Linetype {
    pub fn new(name: impl Into<String>, description: impl Into<String>, pattern: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            pattern,
        }
    }

    pub fn total_length(&self) -> f64 {
        self.pattern.iter().map(|element| element.abs()).sum()
    }
}

impl TableEntry for Linetype {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub name: String,
    pub font: String,
    /// 0 表示可变字高。
    pub height: f64,
    pub width_factor: f64,
}

impl TextStyle {
    pub fn new(name: impl Into<String>, font: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            font: font.into(),
            height: 0.0,
            width_factor: 1.0,
        }
    }
}

impl TableEntry for TextStyle {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppId {
    pub name: String,
}

impl TableEntry for AppId {
    fn name(&self) -> &str {
        &self.name
    }
}

/// 扩展数据（XData）中的单个值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum XDataValue {
    /// 组码 1000
    String(String),
    /// 组码 1070
    Integer(i16),
    /// 组码 1071
    Long(i32),
    /// 组码 1040
    Real(f64),
    /// 其他扩展数据组码（1002 控制串、1005 句柄、1010 点等），原样保留。
    Raw(i32, String),
}

impl XDataValue {
    /// 写出时使用的组码。
    pub fn group_code(&self) -> i32 {
        match self {
            XDataValue::String(_) => 1000,
            XDataValue::Integer(_) => 1070,
            XDataValue::Long(_) => 1071,
            XDataValue::Real(_) => 1040,
            XDataValue::Raw(code, _) => *code,
        }
    }

    fn validate(&self) -> Result<(), DocumentError> {
        if let XDataValue::String(value) = self {
            let length = value.chars().count();
            if length > MAX_STRING_LENGTH {
                return Err(DocumentError::StringTooLong(length));
            }
        }
        Ok(())
    }
}

/// 按应用名（不区分大小写）分组的扩展数据。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XData(BTreeMap<String, Vec<XDataValue>>);

impl XData {
    fn key(app: &str) -> String {
        app.trim().to_ascii_uppercase()
    }

    /// 不存在该应用的数据时返回 `None`。
    pub fn get(&self, app: &str) -> Option<&[XDataValue]> {
        self.0.get(&Self::key(app)).map(Vec::as_slice)
    }

    pub fn set(&mut self, app: &str, values: Vec<XDataValue>) -> Result<(), DocumentError> {
        for value in &values {
            value.validate()?;
        }
        self.0.insert(Self::key(app), values);
        Ok(())
    }

    /// 删除该应用的数据，返回之前是否存在。
    pub fn discard(&mut self, app: &str) -> bool {
        self.0.remove(&Self::key(app)).is_some()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[XDataValue])> {
        self.0
            .iter()
            .map(|(app, values)| (app.as_str(), values.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCommon {
    pub layer: String,
    pub color: Color,
    /// `None` 表示 BYLAYER。
    pub linetype: Option<String>,
    pub lineweight: i16,
    pub transparency: Option<f64>,
    /// 超链接，DXF 中以 `PE_URL` 扩展数据保存，作为对用户可见的次级标记。
    pub hyperlink: Option<String>,
    pub xdata: XData,
    /// 组码 102 的应用自定义数据组，按组名保存原始组码。
    pub app_data: BTreeMap<String, Vec<(i32, String)>>,
}

impl EntityCommon {
    pub fn on_layer(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            color: Color::ByLayer,
            linetype: None,
            lineweight: LINEWEIGHT_BYLAYER,
            transparency: None,
            hyperlink: None,
            xdata: XData::default(),
            app_data: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineVertex {
    pub position: Point2,
    pub bulge: f64,
}

impl PolylineVertex {
    #[inline]
    pub fn new(position: Point2) -> Self {
        Self {
            position,
            bulge: 0.0,
        }
    }

    #[inline]
    pub fn with_bulge(position: Point2, bulge: f64) -> Self {
        Self { position, bulge }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

impl HorizontalAlign {
    pub fn code(self) -> i16 {
        match self {
            HorizontalAlign::Left => 0,
            HorizontalAlign::Center => 1,
            HorizontalAlign::Right => 2,
        }
    }

    pub fn from_code(code: i16) -> Self {
        match code {
            1 | 4 => HorizontalAlign::Center,
            2 => HorizontalAlign::Right,
            _ => HorizontalAlign::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAlign {
    Baseline,
    Bottom,
    Middle,
    Top,
}

impl VerticalAlign {
    pub fn code(self) -> i16 {
        match self {
            VerticalAlign::Baseline => 0,
            VerticalAlign::Bottom => 1,
            VerticalAlign::Middle => 2,
            VerticalAlign::Top => 3,
        }
    }

    pub fn from_code(code: i16) -> Self {
        match code {
            1 => VerticalAlign::Bottom,
            2 => VerticalAlign::Middle,
            3 => VerticalAlign::Top,
            _ => VerticalAlign::Baseline,
        }
    }
}

/// MTEXT 附着点（组码 71，1..=9）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentPoint {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl AttachmentPoint {
    pub fn code(self) -> i16 {
        match self {
            AttachmentPoint::TopLeft => 1,
            AttachmentPoint::TopCenter => 2,
            AttachmentPoint::TopRight => 3,
            AttachmentPoint::MiddleLeft => 4,
            AttachmentPoint::MiddleCenter => 5,
            AttachmentPoint::MiddleRight => 6,
            AttachmentPoint::BottomLeft => 7,
            AttachmentPoint::BottomCenter => 8,
            AttachmentPoint::BottomRight => 9,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            1 => AttachmentPoint::TopLeft,
            2 => AttachmentPoint::TopCenter,
            3 => AttachmentPoint::TopRight,
            4 => AttachmentPoint::MiddleLeft,
            5 => AttachmentPoint::MiddleCenter,
            6 => AttachmentPoint::MiddleRight,
            7 => AttachmentPoint::BottomLeft,
            8 => AttachmentPoint::BottomCenter,
            9 => AttachmentPoint::BottomRight,
            _ => return None,
        })
    }

    /// 单行文字只支持离散的水平/垂直对齐组合，这里给出最接近的一组。
    pub fn text_alignment(self) -> (HorizontalAlign, VerticalAlign) {
        let horizontal = match self {
            AttachmentPoint::TopLeft | AttachmentPoint::MiddleLeft | AttachmentPoint::BottomLeft => {
                HorizontalAlign::Left
            }
            AttachmentPoint::TopCenter
            | AttachmentPoint::MiddleCenter
            | AttachmentPoint::BottomCenter => HorizontalAlign::Center,
            AttachmentPoint::TopRight
            | AttachmentPoint::MiddleRight
            | AttachmentPoint::BottomRight => HorizontalAlign::Right,
        };
        let vertical = match self {
            AttachmentPoint::TopLeft | AttachmentPoint::TopCenter | AttachmentPoint::TopRight => {
                VerticalAlign::Top
            }
            AttachmentPoint::MiddleLeft
            | AttachmentPoint::MiddleCenter
            | AttachmentPoint::MiddleRight => VerticalAlign::Middle,
            AttachmentPoint::BottomLeft
            | AttachmentPoint::BottomCenter
            | AttachmentPoint::BottomRight => VerticalAlign::Bottom,
        };
        (horizontal, vertical)
    }
}

impl Default for AttachmentPoint {
    fn default() -> Self {
        AttachmentPoint::MiddleCenter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub location: Point2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

/// 圆弧实体，角度以弧度形式储存，遵循数学正方向。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

/// 轻量多段线（LWPOLYLINE）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    pub is_closed: bool,
    pub constant_width: Option<f64>,
}

impl Polyline {
    pub fn from_points<I>(points: I, is_closed: bool) -> Self
    where
        I: IntoIterator<Item = Point2>,
    {
        Self {
            vertices: points.into_iter().map(PolylineVertex::new).collect(),
            is_closed,
            constant_width: None,
        }
    }
}

/// 单行文字。`rotation` 以弧度表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub insert: Point2,
    pub content: String,
    pub height: f64,
    pub rotation: f64,
    pub style: Option<String>,
    pub halign: HorizontalAlign,
    pub valign: VerticalAlign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MText {
    pub insert: Point2,
    pub content: String,
    pub height: f64,
    pub reference_width: Option<f64>,
    pub attachment: AttachmentPoint,
    pub rotation: f64,
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HatchPattern {
    Solid,
    /// 图案角度以度为单位，与 DXF 组码 52 一致。
    Predefined { name: String, scale: f64, angle: f64 },
}

impl HatchPattern {
    pub fn name(&self) -> &str {
        match self {
            HatchPattern::Solid => "SOLID",
            HatchPattern::Predefined { name, .. } => name,
        }
    }
}

/// 填充边界类型：外边界或内部孔洞。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HatchPathKind {
    External,
    Hole,
}

impl HatchPathKind {
    /// 组码 92 的边界标志位（2 = 多段线边界）。
    pub fn flags(self) -> i32 {
        match self {
            HatchPathKind::External => 1 | 2,
            HatchPathKind::Hole => 2,
        }
    }

    pub fn from_flags(flags: i32) -> Self {
        if flags & 1 != 0 {
            HatchPathKind::External
        } else {
            HatchPathKind::Hole
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchPath {
    pub kind: HatchPathKind,
    pub vertices: Vec<Point2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hatch {
    pub pattern: HatchPattern,
    pub paths: Vec<HatchPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub block_name: String,
    pub insert: Point2,
    pub scale: Vector2,
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Point2,
    pub width: f64,
    pub height: f64,
    pub view_center: Point2,
    pub view_height: f64,
    /// 组码 69 的视口 ID，1 保留给图纸空间本身。
    pub id: i16,
}

/// 未识别的实体，原样保存组码以便回写。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub kind: String,
    pub pairs: Vec<(i32, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    Point(Point),
    Circle(Circle),
    Arc(Arc),
    Polyline(Polyline),
    Text(Text),
    MText(MText),
    Hatch(Hatch),
    Insert(Insert),
    Viewport(Viewport),
    Unknown(RawEntity),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub common: EntityCommon,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(layer: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            common: EntityCommon::on_layer(layer),
            kind,
        }
    }

    #[inline]
    pub fn layer_name(&self) -> &str {
        &self.common.layer
    }

    /// DXF 实体类型名。
    pub fn dxf_type(&self) -> &str {
        match &self.kind {
            EntityKind::Point(_) => "POINT",
            EntityKind::Circle(_) => "CIRCLE",
            EntityKind::Arc(_) => "ARC",
            EntityKind::Polyline(_) => "LWPOLYLINE",
            EntityKind::Text(_) => "TEXT",
            EntityKind::MText(_) => "MTEXT",
            EntityKind::Hatch(_) => "HATCH",
            EntityKind::Insert(_) => "INSERT",
            EntityKind::Viewport(_) => "VIEWPORT",
            EntityKind::Unknown(raw) => &raw.kind,
        }
    }

    #[inline]
    pub fn xdata(&self, app: &str) -> Option<&[XDataValue]> {
        self.common.xdata.get(app)
    }

    pub fn set_xdata(&mut self, app: &str, values: Vec<XDataValue>) -> Result<(), DocumentError> {
        self.common.xdata.set(app, values)
    }

    pub fn discard_xdata(&mut self, app: &str) -> bool {
        self.common.xdata.discard(app)
    }

    #[inline]
    pub fn hyperlink(&self) -> Option<&str> {
        self.common.hyperlink.as_deref()
    }

    pub fn set_hyperlink(&mut self, link: impl Into<String>) -> Result<(), DocumentError> {
        let link = link.into();
        let length = link.chars().count();
        if length > MAX_STRING_LENGTH {
            return Err(DocumentError::StringTooLong(length));
        }
        self.common.hyperlink = Some(link);
        Ok(())
    }

    pub fn clear_hyperlink(&mut self) -> bool {
        self.common.hyperlink.take().is_some()
    }

    /// 清除所有组码 102 应用数据组，返回清除的组数。
    pub fn clear_app_data(&mut self) -> usize {
        let count = self.common.app_data.len();
        self.common.app_data.clear();
        count
    }

    /// 计算实体的 2D 轴对齐范围；文字与块参照退化为插入点。
    pub fn bounds(&self) -> Option<Bounds2D> {
        let mut bounds = Bounds2D::empty();
        match &self.kind {
            EntityKind::Point(point) => bounds.include_point(point.location),
            EntityKind::Circle(circle) => {
                include_circle(&mut bounds, circle.center, circle.radius);
            }
            EntityKind::Arc(arc) => {
                for angle in arc_sample_angles(arc.start_angle, arc.end_angle) {
                    bounds.include_point(Point2::new(
                        arc.center.x() + arc.radius * angle.cos(),
                        arc.center.y() + arc.radius * angle.sin(),
                    ));
                }
            }
            EntityKind::Polyline(polyline) => {
                for vertex in &polyline.vertices {
                    bounds.include_point(vertex.position);
                }
            }
            EntityKind::Text(text) => bounds.include_point(text.insert),
            EntityKind::MText(mtext) => bounds.include_point(mtext.insert),
            EntityKind::Hatch(hatch) => {
                for path in &hatch.paths {
                    for vertex in &path.vertices {
                        bounds.include_point(*vertex);
                    }
                }
            }
            EntityKind::Insert(insert) => bounds.include_point(insert.insert),
            EntityKind::Viewport(viewport) => {
                let half = Vector2::new(viewport.width * 0.5, viewport.height * 0.5);
                bounds.include_point(viewport.center.translate(half));
                bounds.include_point(viewport.center.translate(half.scale(-1.0)));
            }
            EntityKind::Unknown(_) => {}
        }
        if bounds.is_empty() { None } else { Some(bounds) }
    }
}

fn include_circle(bounds: &mut Bounds2D, center: Point2, radius: f64) {
    let radius = radius.abs();
    bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
    bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
}

/// 圆弧端点加上落在区间内的象限点。
fn arc_sample_angles(start: f64, end: f64) -> Vec<f64> {
    let start = start.rem_euclid(TAU);
    let mut end = end.rem_euclid(TAU);
    if end <= start {
        end += TAU;
    }
    let mut angles = vec![start, end];
    let mut quadrant = (start / (TAU / 4.0)).ceil() * (TAU / 4.0);
    while quadrant < end {
        angles.push(quadrant);
        quadrant += TAU / 4.0;
    }
    angles
}

/// 块定义。由本工具生成的块通过 `xdata` 携带归属标记。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub base_point: Point2,
    pub entities: Vec<Entity>,
    pub xdata: XData,
}

impl BlockDefinition {
    pub fn new(name: impl Into<String>, base_point: Point2) -> Self {
        Self {
            name: name.into(),
            base_point,
            entities: Vec::new(),
            xdata: XData::default(),
        }
    }
}

impl TableEntry for BlockDefinition {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub id: EntityId,
    pub layout: String,
    pub entity: Entity,
}

/// 一次批量删除的暂存区。只记录句柄，不持有对存储的借用。
#[derive(Debug, Default)]
pub struct Trashcan {
    staged: Vec<EntityId>,
}

impl Trashcan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: EntityId) {
        self.staged.push(id);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.staged.iter().copied()
    }
}

/// 提交回收站后的结果：成功删除数与逐个失败原因。
#[derive(Debug, Default)]
pub struct TrashReport {
    pub removed: usize,
    pub failed: Vec<(EntityId, DocumentError)>,
}

/// 跨所有布局的实体存储。删除只留下墓碑，直到 [`EntityStore::purge`] 才真正压缩。
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    slots: Vec<Option<StoredEntity>>,
    index: HashMap<EntityId, usize>,
    next_id: u64,
}

/// 句柄 0 在 DXF 中无效，小于该值的句柄预留给表项与对象。
const FIRST_ENTITY_HANDLE: u64 = 0x100;

impl EntityStore {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            next_id: FIRST_ENTITY_HANDLE,
        }
    }

    pub fn insert(&mut self, layout: impl Into<String>, entity: Entity) -> EntityId {
        let id = EntityId(self.next_id.max(FIRST_ENTITY_HANDLE));
        self.next_id = id.0 + 1;
        self.push(id, layout.into(), entity);
        id
    }

    /// 以既有句柄插入（读取已有文件时使用）。
    pub fn insert_with_id(
        &mut self,
        id: EntityId,
        layout: impl Into<String>,
        entity: Entity,
    ) -> Result<(), DocumentError> {
        if self.index.contains_key(&id) {
            return Err(DocumentError::DuplicateHandle(id.0));
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.push(id, layout.into(), entity);
        Ok(())
    }

    fn push(&mut self, id: EntityId, layout: String, entity: Entity) {
        self.index.insert(id, self.slots.len());
        self.slots.push(Some(StoredEntity { id, layout, entity }));
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.stored(id).map(|stored| &stored.entity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut().map(|stored| &mut stored.entity)
    }

    pub fn stored(&self, id: EntityId) -> Option<&StoredEntity> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_ref()
    }

    /// 遍历所有布局中的存活实体。
    pub fn iter(&self) -> impl Iterator<Item = &StoredEntity> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_layout<'a>(&'a self, layout: &'a str) -> impl Iterator<Item = &'a StoredEntity> {
        let key = canonical_name(layout);
        self.iter()
            .filter(move |stored| canonical_name(&stored.layout) == key)
    }

    /// 存活实体数量（不含墓碑）。
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 等待 [`EntityStore::purge`] 回收的墓碑数量。
    pub fn tombstones(&self) -> usize {
        self.slots.len() - self.index.len()
    }

    /// 下一次插入将使用的句柄，写出 `$HANDSEED` 时需要。
    #[inline]
    pub fn next_handle(&self) -> u64 {
        self.next_id.max(FIRST_ENTITY_HANDLE)
    }

    /// 提交回收站：逐个删除，单个失败不影响其余句柄。
    pub fn commit(&mut self, trashcan: Trashcan) -> TrashReport {
        let mut report = TrashReport::default();
        for id in trashcan.staged {
            match self.index.remove(&id) {
                Some(slot) => {
                    self.slots[slot] = None;
                    report.removed += 1;
                }
                None => report.failed.push((id, DocumentError::EntityNotFound(id.0))),
            }
        }
        report
    }

    /// 压缩存储，移除墓碑并重建索引，返回回收的槽位数。
    pub fn purge(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (slot, stored) in self.slots.iter().enumerate() {
            if let Some(stored) = stored {
                self.index.insert(stored.id, slot);
            }
        }
        before - self.slots.len()
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    version: DxfVersion,
    layers: NamedTable<Layer>,
    linetypes: NamedTable<Linetype>,
    text_styles: NamedTable<TextStyle>,
    app_ids: NamedTable<AppId>,
    blocks: NamedTable<BlockDefinition>,
    layouts: Vec<String>,
    entities: EntityStore,
}

impl Document {
    /// 新建空文档，带有 DXF 要求的默认表项与模型/图纸布局。
    pub fn new(version: DxfVersion) -> Self {
        let mut doc = Self::empty(version);
        doc.ensure_defaults();
        doc
    }

    /// 不含任何默认表项的文档，供读取器逐项填充后调用 [`Document::ensure_defaults`]。
    pub fn empty(version: DxfVersion) -> Self {
        Self {
            version,
            layers: NamedTable::new(),
            linetypes: NamedTable::new(),
            text_styles: NamedTable::new(),
            app_ids: NamedTable::new(),
            blocks: NamedTable::new(),
            layouts: Vec::new(),
            entities: EntityStore::new(),
        }
    }

    /// 补齐缺失的默认表项，已存在的不做修改。
    pub fn ensure_defaults(&mut self) {
        let _ = self.ensure_layer(DEFAULT_LAYER);
        for (name, description) in [
            (LINETYPE_BYBLOCK, ""),
            (LINETYPE_BYLAYER, ""),
            (LINETYPE_CONTINUOUS, "Solid line"),
        ] {
            if !self.linetypes.has(name) {
                let _ = self
                    .linetypes
                    .add(Linetype::new(name, description, Vec::new()));
            }
        }
        if !self.text_styles.has(STANDARD_TEXT_STYLE) {
            let _ = self
                .text_styles
                .add(TextStyle::new(STANDARD_TEXT_STYLE, "txt"));
        }
        self.register_app_id("ACAD");
        self.ensure_layout(MODEL_SPACE);
        self.ensure_layout(DEFAULT_PAPER_LAYOUT);
    }

    #[inline]
    pub fn version(&self) -> DxfVersion {
        self.version
    }

    pub fn set_version(&mut self, version: DxfVersion) {
        self.version = version;
    }

    #[inline]
    pub fn layers(&self) -> &NamedTable<Layer> {
        &self.layers
    }

    #[inline]
    pub fn layers_mut(&mut self) -> &mut NamedTable<Layer> {
        &mut self.layers
    }

    /// 确保图层存在（首次引用时创建），返回可变引用以便原地更新。
    pub fn ensure_layer(&mut self, name: impl AsRef<str>) -> Result<&mut Layer, DocumentError> {
        let name = name.as_ref();
        self.layers.get_or_insert_with(name, || Layer::new(name))
    }

    #[inline]
    pub fn linetypes(&self) -> &NamedTable<Linetype> {
        &self.linetypes
    }

    #[inline]
    pub fn linetypes_mut(&mut self) -> &mut NamedTable<Linetype> {
        &mut self.linetypes
    }

    #[inline]
    pub fn text_styles(&self) -> &NamedTable<TextStyle> {
        &self.text_styles
    }

    #[inline]
    pub fn text_styles_mut(&mut self) -> &mut NamedTable<TextStyle> {
        &mut self.text_styles
    }

    #[inline]
    pub fn app_ids(&self) -> &NamedTable<AppId> {
        &self.app_ids
    }

    /// 注册 APPID，已注册时不做任何事。返回是否新注册。
    pub fn register_app_id(&mut self, name: &str) -> bool {
        if self.app_ids.has(name) {
            return false;
        }
        self.app_ids
            .add(AppId {
                name: name.trim().to_ascii_uppercase(),
            })
            .is_ok()
    }

    #[inline]
    pub fn blocks(&self) -> &NamedTable<BlockDefinition> {
        &self.blocks
    }

    #[inline]
    pub fn blocks_mut(&mut self) -> &mut NamedTable<BlockDefinition> {
        &mut self.blocks
    }

    pub fn layouts(&self) -> impl Iterator<Item = &str> {
        self.layouts.iter().map(String::as_str)
    }

    pub fn has_layout(&self, name: &str) -> bool {
        let key = canonical_name(name);
        self.layouts.iter().any(|layout| canonical_name(layout) == key)
    }

    pub fn ensure_layout(&mut self, name: &str) {
        if !self.has_layout(name) {
            self.layouts.push(name.to_string());
        }
    }

    #[inline]
    pub fn entity_store(&self) -> &EntityStore {
        &self.entities
    }

    #[inline]
    pub fn entity_store_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    /// 在指定布局中添加实体，自动创建实体所在图层。
    pub fn add_entity(&mut self, layout: &str, entity: Entity) -> Result<EntityId, DocumentError> {
        if !self.has_layout(layout) {
            return Err(DocumentError::LayoutNotFound(layout.to_string()));
        }
        self.ensure_layer(entity.layer_name())?;
        Ok(self.entities.insert(layout, entity))
    }

    /// 在模型空间添加实体。
    pub fn add_model_entity(&mut self, entity: Entity) -> Result<EntityId, DocumentError> {
        self.add_entity(MODEL_SPACE, entity)
    }

    /// 模型空间实体的总范围。
    pub fn bounds(&self) -> Option<Bounds2D> {
        let mut bounds = Bounds2D::empty();
        let mut has = false;
        for stored in self.entities.iter_layout(MODEL_SPACE) {
            if let Some(entity_bounds) = stored.entity.bounds() {
                bounds.include_bounds(&entity_bounds);
                has = true;
            }
        }
        if has { Some(bounds) } else { None }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DxfVersion::default())
    }
}
