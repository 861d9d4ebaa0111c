//! 附属内容：沿线块插入、图例块、视口图层覆盖。
//!
//! 三者都沿用“带标记、先删后建”的做法，重复执行不会累积实体。

use mapsync_config::{LegendConfig, PathBlockConfig, ViewportConfig};
use mapsync_core::document::{
    BlockDefinition, Color, DEFAULT_LAYER, Document, Entity, EntityKind, Hatch, HatchPath,
    HatchPathKind, HorizontalAlign, Insert, LINETYPE_CONTINUOUS, Polyline, Text, VerticalAlign,
    canonical_name,
};
use mapsync_core::geometry::{Point2, Vector2, path_length, point_along};
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::lifecycle::{ReplaceOutcome, remove_owned_matching};
use crate::ownership::{OwnershipTag, attach, is_owned};
use crate::style::{ResolvedStyle, StyleResolver};

/// 单条线上允许的最大插入数。
const MAX_PATH_INSERTS: usize = 10_000;
/// 图例标题字高相对条目字高的倍数。
const TITLE_SCALE: f64 = 1.2;

/// 沿折线按固定间距生成块插入，第一个位于半个间距处。
///
/// `align` 为真时按所在线段方向旋转。
pub fn path_block_inserts(points: &[Point2], config: &PathBlockConfig) -> Vec<Insert> {
    let interval = config.interval;
    if !(interval.is_finite() && interval > 0.0) {
        return Vec::new();
    }
    let total = path_length(points);
    if !(total.is_finite() && total > f64::EPSILON) {
        return Vec::new();
    }

    let mut inserts = Vec::new();
    let mut distance = interval / 2.0;
    while distance <= total {
        if inserts.len() == MAX_PATH_INSERTS {
            warn!(block = %config.block, interval, total, "沿线插入数超过上限，已截断");
            break;
        }
        let Some((position, direction)) = point_along(points, distance) else {
            break;
        };
        inserts.push(Insert {
            block_name: config.block.clone(),
            insert: position,
            scale: Vector2::new(config.scale, config.scale),
            rotation: if config.align { direction.angle() } else { 0.0 },
        });
        distance += interval;
    }
    inserts
}

/// 生成或替换图例块，并在模型空间的图例图层上插入一次。
///
/// 同名块存在且不归本脚本所有时返回 [`EngineError::ForeignBlock`]，文档保持不变。
pub fn sync_legend(
    document: &mut Document,
    legend: &LegendConfig,
    resolver: &StyleResolver<'_>,
    tag: &OwnershipTag,
) -> Result<ReplaceOutcome, EngineError> {
    if let Some(existing) = document.blocks().get(&legend.name) {
        if !is_owned(existing, tag) {
            return Err(EngineError::ForeignBlock(legend.name.clone()));
        }
    }

    let mut block = BlockDefinition::new(legend.name.as_str(), Point2::new(0.0, 0.0));
    let mut entities = legend_entities(document, legend, resolver);
    for entity in &mut entities {
        attach(entity, tag)?;
    }
    block.entities = entities;
    attach(&mut block, tag)?;
    let replaced = document.blocks_mut().replace(block)?;
    debug!(legend = %legend.name, replaced, "图例块已写入");

    let key = canonical_name(&legend.name);
    let removed = remove_owned_matching(document, tag, |entity| match &entity.kind {
        EntityKind::Insert(insert) => canonical_name(&insert.block_name) == key,
        _ => false,
    });

    let [x, y] = legend.position;
    let mut entity = Entity::new(
        legend.layer.as_str(),
        EntityKind::Insert(Insert {
            block_name: legend.name.clone(),
            insert: Point2::new(x, y),
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
        }),
    );
    attach(&mut entity, tag)?;
    document.add_model_entity(entity)?;

    info!(legend = %legend.name, items = legend.items.len(), removed, "图例已更新");
    Ok(ReplaceOutcome { removed, added: 1 })
}

/// 图例块内容：标题在上，条目自上而下排列，每行左侧色块、右侧说明。
fn legend_entities(
    document: &mut Document,
    legend: &LegendConfig,
    resolver: &StyleResolver<'_>,
) -> Vec<Entity> {
    let [swatch_width, swatch_height] = legend.swatch_size;
    let mut entities = Vec::new();
    let mut top = 0.0;

    if let Some(title) = legend.title.as_deref().filter(|title| !title.trim().is_empty()) {
        let height = legend.text_height * TITLE_SCALE;
        entities.push(text_entity(
            title,
            Point2::new(0.0, top),
            height,
            VerticalAlign::Top,
        ));
        top -= height + legend.spacing;
    }

    for item in &legend.items {
        let definition = resolver.named(&item.style);
        if definition.is_none() {
            warn!(legend = %legend.name, style = %item.style, "图例条目引用的样式不存在，使用默认样式");
        }
        let style = resolver.resolve(document, definition);
        let corners = [
            Point2::new(0.0, top - swatch_height),
            Point2::new(swatch_width, top - swatch_height),
            Point2::new(swatch_width, top),
            Point2::new(0.0, top),
        ];
        entities.extend(swatch_entities(&style, &corners));
        entities.push(text_entity(
            &item.label,
            Point2::new(swatch_width + legend.spacing, top - swatch_height / 2.0),
            legend.text_height,
            VerticalAlign::Middle,
        ));
        top -= swatch_height + legend.spacing;
    }
    entities
}

fn swatch_entities(style: &ResolvedStyle, corners: &[Point2; 4]) -> Vec<Entity> {
    let mut entities = Vec::with_capacity(2);
    if let Some(hatch) = &style.hatch {
        let mut fill = Entity::new(
            DEFAULT_LAYER,
            EntityKind::Hatch(Hatch {
                pattern: hatch.pattern.clone(),
                paths: vec![HatchPath {
                    kind: HatchPathKind::External,
                    vertices: corners.to_vec(),
                }],
            }),
        );
        fill.common.color = match hatch.color {
            Color::ByLayer => style.color,
            color => color,
        };
        entities.push(fill);
    }

    let mut outline = Entity::new(
        DEFAULT_LAYER,
        EntityKind::Polyline(Polyline::from_points(corners.iter().copied(), true)),
    );
    outline.common.color = style.color;
    if !style.linetype.eq_ignore_ascii_case(LINETYPE_CONTINUOUS) {
        outline.common.linetype = Some(style.linetype.clone());
    }
    outline.common.lineweight = style.lineweight;
    entities.push(outline);
    entities
}

fn text_entity(content: &str, insert: Point2, height: f64, valign: VerticalAlign) -> Entity {
    Entity::new(
        DEFAULT_LAYER,
        EntityKind::Text(Text {
            insert,
            content: content.to_string(),
            height,
            rotation: 0.0,
            style: None,
            halign: HorizontalAlign::Left,
            valign,
        }),
    )
}

/// 为图纸布局中的视口写入图层覆盖，返回写入的 (图层, 视口) 组合数。
///
/// 未指定视口 ID 时作用于该布局的全部视口（ID 1 为图纸空间本身，跳过）。
pub fn apply_viewport_overrides(
    document: &mut Document,
    config: &ViewportConfig,
    resolver: &StyleResolver<'_>,
) -> Result<usize, EngineError> {
    if !document.has_layout(&config.layout) {
        return Err(EngineError::LayoutNotFound(config.layout.clone()));
    }

    let viewport_ids = if config.viewport_ids.is_empty() {
        let mut ids: Vec<i16> = document
            .entity_store()
            .iter_layout(&config.layout)
            .filter_map(|stored| match &stored.entity.kind {
                EntityKind::Viewport(viewport) if viewport.id > 1 => Some(viewport.id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    } else {
        config.viewport_ids.clone()
    };
    if viewport_ids.is_empty() {
        warn!(layout = %config.layout, "布局中没有可覆盖的视口");
        return Ok(0);
    }

    let mut applied = 0;
    for (layer_name, properties) in &config.overrides {
        let layer_override = resolver.resolve_override(document, properties);
        let Some(layer) = document.layers_mut().get_mut(layer_name) else {
            warn!(layer = %layer_name, layout = %config.layout, "视口覆盖引用的图层不存在，跳过");
            continue;
        };
        for &id in &viewport_ids {
            layer.set_viewport_override(id, layer_override.clone());
            applied += 1;
        }
    }
    debug!(layout = %config.layout, viewports = viewport_ids.len(), applied, "视口覆盖已写入");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use mapsync_config::{
        ColorSpec, HatchProperties, LayerProperties, LegendItem, StyleDefinition, StyleRegistry,
    };
    use mapsync_core::document::{DEFAULT_PAPER_LAYOUT, LayerOverride, Viewport};

    fn path_config(interval: f64, align: bool) -> PathBlockConfig {
        PathBlockConfig {
            block: "ARROW".to_string(),
            interval,
            scale: 2.0,
            align,
        }
    }

    fn registry() -> StyleRegistry {
        let mut styles = BTreeMap::new();
        styles.insert(
            "park".to_string(),
            StyleDefinition {
                layer: Some(LayerProperties {
                    color: Some(ColorSpec::Index(3)),
                    ..LayerProperties::default()
                }),
                text: None,
                hatch: Some(HatchProperties {
                    pattern: Some("SOLID".to_string()),
                    ..HatchProperties::default()
                }),
            },
        );
        styles.insert(
            "road".to_string(),
            StyleDefinition {
                layer: Some(LayerProperties {
                    color: Some(ColorSpec::Index(1)),
                    ..LayerProperties::default()
                }),
                text: None,
                hatch: None,
            },
        );
        StyleRegistry::new(styles, BTreeMap::new())
    }

    fn legend() -> LegendConfig {
        LegendConfig {
            name: "MAP_LEGEND".to_string(),
            layer: "Legend".to_string(),
            position: [100.0, 50.0],
            title: Some("Legend".to_string()),
            swatch_size: [10.0, 5.0],
            spacing: 2.0,
            text_height: 2.5,
            items: vec![
                LegendItem {
                    label: "Parks".to_string(),
                    style: "park".to_string(),
                },
                LegendItem {
                    label: "Roads".to_string(),
                    style: "road".to_string(),
                },
            ],
        }
    }

    fn inserts_of<'a>(doc: &'a Document, block: &'a str) -> impl Iterator<Item = &'a Insert> + 'a {
        doc.entity_store().iter().filter_map(move |stored| match &stored.entity.kind {
            EntityKind::Insert(insert) if insert.block_name == block => Some(insert),
            _ => None,
        })
    }

    #[test]
    fn path_inserts_are_spaced_from_half_interval() {
        let path = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
        ];
        let inserts = path_block_inserts(&path, &path_config(5.0, true));
        assert_eq!(inserts.len(), 4);
        assert!((inserts[0].insert.x() - 2.5).abs() < 1e-9);
        assert!((inserts[1].insert.x() - 7.5).abs() < 1e-9);
        assert!(inserts[0].rotation.abs() < 1e-9);
        assert!((inserts[2].insert.y() - 2.5).abs() < 1e-9);
        assert!((inserts[2].rotation - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((inserts[0].scale.x() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn path_inserts_skip_rotation_when_not_aligned() {
        let path = [Point2::new(0.0, 0.0), Point2::new(0.0, 10.0)];
        let inserts = path_block_inserts(&path, &path_config(4.0, false));
        assert_eq!(inserts.len(), 3);
        assert!(inserts.iter().all(|insert| insert.rotation == 0.0));
    }

    #[test]
    fn short_or_degenerate_paths_get_no_inserts() {
        let short = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];
        assert!(path_block_inserts(&short, &path_config(5.0, true)).is_empty());
        assert!(path_block_inserts(&[Point2::new(0.0, 0.0)], &path_config(1.0, true)).is_empty());
        assert!(path_block_inserts(&short, &path_config(0.0, true)).is_empty());
    }

    #[test]
    fn legend_block_is_built_and_inserted_once() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let mut doc = Document::default();

        let first = sync_legend(&mut doc, &legend(), &resolver, &tag).unwrap();
        assert_eq!(first, ReplaceOutcome { removed: 0, added: 1 });
        let second = sync_legend(&mut doc, &legend(), &resolver, &tag).unwrap();
        assert_eq!(second, ReplaceOutcome { removed: 1, added: 1 });

        let block = doc.blocks().get("MAP_LEGEND").unwrap();
        assert!(is_owned(block, &tag));
        // 标题 + 公园(填充、边框、文字) + 道路(边框、文字)
        assert_eq!(block.entities.len(), 6);
        assert!(block.entities.iter().all(|entity| is_owned(entity, &tag)));
        let hatch = block
            .entities
            .iter()
            .find(|entity| matches!(entity.kind, EntityKind::Hatch(_)))
            .unwrap();
        assert_eq!(hatch.common.color, Color::Aci(3));

        let inserts: Vec<&Insert> = inserts_of(&doc, "MAP_LEGEND").collect();
        assert_eq!(inserts.len(), 1);
        assert!((inserts[0].insert.x() - 100.0).abs() < 1e-9);
        assert!(doc.layers().has("Legend"));
    }

    #[test]
    fn foreign_legend_block_is_left_alone() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let mut doc = Document::default();
        doc.blocks_mut()
            .add(BlockDefinition::new("MAP_LEGEND", Point2::new(0.0, 0.0)))
            .unwrap();

        let result = sync_legend(&mut doc, &legend(), &resolver, &tag);
        assert!(matches!(result, Err(EngineError::ForeignBlock(_))));
        assert!(doc.blocks().get("MAP_LEGEND").unwrap().entities.is_empty());
        assert_eq!(inserts_of(&doc, "MAP_LEGEND").count(), 0);
    }

    #[test]
    fn user_inserts_of_legend_block_survive() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let mut doc = Document::default();
        sync_legend(&mut doc, &legend(), &resolver, &tag).unwrap();
        doc.add_model_entity(Entity::new(
            "Legend",
            EntityKind::Insert(Insert {
                block_name: "MAP_LEGEND".to_string(),
                insert: Point2::new(0.0, 0.0),
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
            }),
        ))
        .unwrap();

        sync_legend(&mut doc, &legend(), &resolver, &tag).unwrap();
        assert_eq!(inserts_of(&doc, "MAP_LEGEND").count(), 2);
    }

    fn paper_viewport(id: i16) -> Entity {
        Entity::new(
            DEFAULT_LAYER,
            EntityKind::Viewport(Viewport {
                center: Point2::new(100.0, 100.0),
                width: 200.0,
                height: 150.0,
                view_center: Point2::new(0.0, 0.0),
                view_height: 150.0,
                id,
            }),
        )
    }

    fn road_override() -> BTreeMap<String, LayerProperties> {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Roads".to_string(),
            LayerProperties {
                color: Some(ColorSpec::Index(5)),
                lineweight: Some(50),
                ..LayerProperties::default()
            },
        );
        overrides.insert("Missing".to_string(), LayerProperties::default());
        overrides
    }

    #[test]
    fn overrides_apply_to_all_paper_viewports_by_default() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let mut doc = Document::default();
        doc.ensure_layer("Roads").unwrap();
        for id in [1, 2, 3] {
            doc.add_entity(DEFAULT_PAPER_LAYOUT, paper_viewport(id)).unwrap();
        }
        let config = ViewportConfig {
            layout: DEFAULT_PAPER_LAYOUT.to_string(),
            viewport_ids: Vec::new(),
            overrides: road_override(),
        };

        assert_eq!(apply_viewport_overrides(&mut doc, &config, &resolver).unwrap(), 2);
        let layer = doc.layers().get("Roads").unwrap();
        let expected = LayerOverride {
            color: Some(Color::Aci(5)),
            linetype: None,
            lineweight: Some(50),
            transparency: None,
        };
        assert_eq!(layer.viewport_overrides.get(&2), Some(&expected));
        assert_eq!(layer.viewport_overrides.get(&3), Some(&expected));
        assert!(!layer.viewport_overrides.contains_key(&1));
        assert!(!doc.layers().has("Missing"));
    }

    #[test]
    fn explicit_ids_and_missing_layouts() {
        let registry = registry();
        let resolver = StyleResolver::new(&registry);
        let mut doc = Document::default();
        doc.ensure_layer("Roads").unwrap();
        let config = ViewportConfig {
            layout: DEFAULT_PAPER_LAYOUT.to_string(),
            viewport_ids: vec![7],
            overrides: road_override(),
        };
        assert_eq!(apply_viewport_overrides(&mut doc, &config, &resolver).unwrap(), 1);
        assert!(doc.layers().get("Roads").unwrap().viewport_overrides.contains_key(&7));

        let missing = ViewportConfig {
            layout: "Sheet9".to_string(),
            ..config
        };
        assert!(matches!(
            apply_viewport_overrides(&mut doc, &missing, &resolver),
            Err(EngineError::LayoutNotFound(_))
        ));
    }
}
