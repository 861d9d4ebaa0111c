//! 归属实体的批量删除与图层几何替换。

use std::collections::HashSet;

use mapsync_core::document::{Document, Entity, Trashcan, canonical_name};
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::ownership::{OwnershipTag, is_owned, release};

/// 标注图层名后缀。
pub const LABEL_SUFFIX: &str = " Label";

/// `Roads` → `Roads Label`。
pub fn label_layer_name(layer: &str) -> String {
    format!("{layer}{LABEL_SUFFIX}")
}

/// 一次替换的删除/新增计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub removed: usize,
    pub added: usize,
}

/// 删除指定图层上本脚本生成的实体，返回删除数量。
///
/// 扫描覆盖所有布局；未带标记的实体无论图层是否匹配都不会被删除。
pub fn remove_owned(document: &mut Document, layer_names: &[&str], tag: &OwnershipTag) -> usize {
    let keys: HashSet<String> = layer_names.iter().map(|name| canonical_name(name)).collect();
    remove_owned_matching(document, tag, |entity| {
        keys.contains(&canonical_name(entity.layer_name()))
    })
}

/// 删除满足 `predicate` 且归本脚本所有的实体。
///
/// 先把匹配项放入回收站，逐个清除标记、超链接与应用数据后统一提交，最后压缩存储。
pub fn remove_owned_matching<F>(document: &mut Document, tag: &OwnershipTag, predicate: F) -> usize
where
    F: Fn(&Entity) -> bool,
{
    let mut trashcan = Trashcan::new();
    for stored in document.entity_store().iter() {
        if predicate(&stored.entity) && is_owned(&stored.entity, tag) {
            trashcan.add(stored.id);
        }
    }
    if trashcan.is_empty() {
        return 0;
    }

    let store = document.entity_store_mut();
    for id in trashcan.iter() {
        match store.get_mut(id) {
            Some(entity) => {
                release(entity, tag);
                entity.clear_app_data();
            }
            None => warn!(entity = %id, "待删除实体已不存在，跳过清理"),
        }
    }

    let report = store.commit(trashcan);
    for (id, err) in &report.failed {
        warn!(entity = %id, error = %err, "删除实体失败");
    }
    let reclaimed = store.purge();
    debug!(removed = report.removed, reclaimed, "已提交回收站");
    report.removed
}

/// 删除图层及其标注图层上的归属实体，然后调用 `render` 重新生成。
///
/// 输入不变时重复执行得到等价的归属实体集合。
pub fn replace_layer_geometry<F>(
    document: &mut Document,
    layer_name: &str,
    tag: &OwnershipTag,
    render: F,
) -> Result<ReplaceOutcome, EngineError>
where
    F: FnOnce(&mut Document) -> Result<usize, EngineError>,
{
    let label_layer = label_layer_name(layer_name);
    let removed = remove_owned(document, &[layer_name, &label_layer], tag);
    let added = render(document)?;
    Ok(ReplaceOutcome { removed, added })
}
