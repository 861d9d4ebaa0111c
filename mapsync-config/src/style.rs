//! 样式定义与样式注册表。
//!
//! 样式按名称存放在 `[styles.<name>]` 中，图层可内联样式、引用命名样式，
//! 或者依赖与图层同名的注册表条目。

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::SyncConfig;

/// 颜色的三种配置写法：ACI 索引、RGB 三元组或颜色名/`"r,g,b"` 字符串。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Index(i64),
    Rgb([i64; 3]),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerProperties {
    #[serde(default)]
    pub color: Option<ColorSpec>,
    #[serde(default)]
    pub linetype: Option<String>,
    #[serde(default)]
    pub lineweight: Option<i64>,
    /// 0.0（不透明）到 1.0（完全透明）。
    #[serde(default)]
    pub transparency: Option<f64>,
    #[serde(default)]
    pub plot: Option<bool>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub frozen: Option<bool>,
    #[serde(default)]
    pub locked: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextProperties {
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub color: Option<ColorSpec>,
    /// MTEXT 附着点 1..=9（1 = 左上，5 = 正中，9 = 右下）。
    #[serde(default)]
    pub attachment_point: Option<i64>,
    /// 多行文字的参考宽度。
    #[serde(default)]
    pub max_width: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HatchProperties {
    /// 缺省或 `"SOLID"` 表示实体填充。
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub color: Option<ColorSpec>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub angle: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StyleDefinition {
    #[serde(default)]
    pub layer: Option<LayerProperties>,
    #[serde(default)]
    pub text: Option<TextProperties>,
    #[serde(default)]
    pub hatch: Option<HatchProperties>,
}

/// 图层上的样式写法：命名引用或内联定义。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StyleRef {
    Named(String),
    Inline(StyleDefinition),
}

/// 内建颜色名，可被 `[colors]` 覆盖或扩充。
const BUILTIN_COLOR_NAMES: &[(&str, u8)] = &[
    ("red", 1),
    ("yellow", 2),
    ("green", 3),
    ("cyan", 4),
    ("blue", 5),
    ("magenta", 6),
    ("white", 7),
    ("black", 7),
    ("gray", 8),
    ("grey", 8),
    ("darkgray", 8),
    ("lightgray", 9),
    ("lightgrey", 9),
];

/// 样式注册表：命名样式 + 颜色名到 ACI 的映射。名称均不区分大小写。
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    styles: HashMap<String, StyleDefinition>,
    color_names: HashMap<String, u8>,
}

impl StyleRegistry {
    pub fn new(styles: BTreeMap<String, StyleDefinition>, colors: BTreeMap<String, u8>) -> Self {
        let mut color_names: HashMap<String, u8> = BUILTIN_COLOR_NAMES
            .iter()
            .map(|(name, aci)| (name.to_string(), *aci))
            .collect();
        for (name, aci) in colors {
            color_names.insert(normalize(&name), aci);
        }
        Self {
            styles: styles
                .into_iter()
                .map(|(name, style)| (normalize(&name), style))
                .collect(),
            color_names,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.styles.clone(), config.colors.clone())
    }

    pub fn style(&self, name: &str) -> Option<&StyleDefinition> {
        self.styles.get(&normalize(name))
    }

    pub fn aci_for_name(&self, name: &str) -> Option<u8> {
        self.color_names.get(&normalize(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookups_ignore_case() {
        let mut styles = BTreeMap::new();
        styles.insert("Roads".to_string(), StyleDefinition::default());
        let mut colors = BTreeMap::new();
        colors.insert("Forest".to_string(), 94);
        colors.insert("Red".to_string(), 10);

        let registry = StyleRegistry::new(styles, colors);
        assert!(registry.style("ROADS").is_some());
        assert_eq!(registry.aci_for_name("forest"), Some(94));
        assert_eq!(registry.aci_for_name("RED"), Some(10));
        assert_eq!(registry.aci_for_name("blue"), Some(5));
        assert_eq!(registry.aci_for_name("chartreuse"), None);
    }
}
