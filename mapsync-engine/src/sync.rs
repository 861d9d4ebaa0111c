//! 同步编排：加载文档，逐图层解析样式、确保图层、替换几何，处理图例与视口覆盖，最后保存一次。

use std::fmt;

use mapsync_config::{LayerConfig, StyleRegistry, SyncConfig};
use mapsync_core::document::Document;
use mapsync_core::feature::{FeatureSource, InMemorySource};
use mapsync_io::{DocumentLoader, DocumentSaver, SaveOutcome, read_geojson_layer, save_with_backup};
use tracing::{debug, error, info, warn};

use crate::decorations::{apply_viewport_overrides, sync_legend};
use crate::errors::EngineError;
use crate::lifecycle::replace_layer_geometry;
use crate::ownership::OwnershipTag;
use crate::render::GeometryRenderer;
use crate::style::StyleResolver;

/// 单个图层在一次运行中的处理阶段。`Failed` 可从任意阶段进入。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Pending,
    StyleResolved,
    LayerEnsured,
    GeometryReplaced,
    Done,
    Failed,
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerState::Pending => "pending",
            LayerState::StyleResolved => "style_resolved",
            LayerState::LayerEnsured => "layer_ensured",
            LayerState::GeometryReplaced => "geometry_replaced",
            LayerState::Done => "done",
            LayerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerOutcome {
    pub name: String,
    pub state: LayerState,
    pub removed: usize,
    pub added: usize,
    pub skipped: usize,
    pub error: Option<String>,
}

impl LayerOutcome {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: LayerState::Pending,
            removed: 0,
            added: 0,
            skipped: 0,
            error: None,
        }
    }
}

/// 一次运行的汇总。
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub layers: Vec<LayerOutcome>,
    pub legends: usize,
    pub viewport_overrides: usize,
    pub saved: Option<SaveOutcome>,
}

impl SyncReport {
    pub fn processed(&self) -> usize {
        self.layers
            .iter()
            .filter(|layer| layer.state == LayerState::Done)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.layers
            .iter()
            .filter(|layer| layer.state == LayerState::Failed)
            .count()
    }

    pub fn removed(&self) -> usize {
        self.layers.iter().map(|layer| layer.removed).sum()
    }

    pub fn added(&self) -> usize {
        self.layers.iter().map(|layer| layer.added).sum()
    }

    pub fn layer(&self, name: &str) -> Option<&LayerOutcome> {
        self.layers.iter().find(|layer| layer.name == name)
    }
}

/// 绑定一份已校验配置的同步器。
pub struct Synchronizer<'a> {
    config: &'a SyncConfig,
    tag: OwnershipTag,
    registry: StyleRegistry,
}

impl<'a> Synchronizer<'a> {
    /// 校验配置并构造同步器；配置错误在修改任何文档之前返回。
    pub fn new(config: &'a SyncConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            tag: OwnershipTag::new(&config.script_id)?,
            registry: StyleRegistry::from_config(config),
        })
    }

    #[inline]
    pub fn tag(&self) -> &OwnershipTag {
        &self.tag
    }

    /// 在内存文档上执行全部图层、图例与视口处理。单项失败记录后继续。
    pub fn synchronize(&self, document: &mut Document, source: &dyn FeatureSource) -> SyncReport {
        self.tag.register(document);
        let resolver = StyleResolver::new(&self.registry);
        let mut report = SyncReport::default();

        for layer in &self.config.layers {
            let mut outcome = LayerOutcome::pending(&layer.name);
            match self.sync_layer(document, layer, &resolver, source, &mut outcome) {
                Ok(()) => {
                    outcome.state = LayerState::Done;
                    info!(
                        layer = %layer.name,
                        removed = outcome.removed,
                        added = outcome.added,
                        skipped = outcome.skipped,
                        "图层同步完成"
                    );
                }
                Err(err) => {
                    error!(layer = %layer.name, stage = %outcome.state, error = %err, "图层同步失败");
                    outcome.state = LayerState::Failed;
                    outcome.error = Some(err.to_string());
                }
            }
            report.layers.push(outcome);
        }

        for legend in &self.config.legends {
            match sync_legend(document, legend, &resolver, &self.tag) {
                Ok(_) => report.legends += 1,
                Err(err) => warn!(legend = %legend.name, error = %err, "图例未更新"),
            }
        }

        for viewport in &self.config.viewports {
            match apply_viewport_overrides(document, viewport, &resolver) {
                Ok(applied) => report.viewport_overrides += applied,
                Err(err) => warn!(layout = %viewport.layout, error = %err, "视口覆盖未应用"),
            }
        }
        report
    }

    fn sync_layer(
        &self,
        document: &mut Document,
        layer: &LayerConfig,
        resolver: &StyleResolver<'_>,
        source: &dyn FeatureSource,
        outcome: &mut LayerOutcome,
    ) -> Result<(), EngineError> {
        let style = resolver.resolve(document, resolver.definition_for(layer));
        outcome.state = LayerState::StyleResolved;

        style.apply_to_layer(document.ensure_layer(&layer.name)?);
        outcome.state = LayerState::LayerEnsured;

        let features = match source.layer(&layer.name) {
            Some(source_layer) if source_layer.update_requested => source_layer,
            Some(_) => {
                debug!(layer = %layer.name, "数据源未请求更新，保留现有几何");
                return Ok(());
            }
            None if layer.source.is_some() => {
                return Err(EngineError::SourceMissing(layer.name.clone()));
            }
            None => {
                debug!(layer = %layer.name, "未配置数据源，仅更新图层属性");
                return Ok(());
            }
        };
        if let Some(crs) = &features.crs {
            debug!(layer = %layer.name, crs = %crs, "数据源坐标参考系");
        }

        let renderer = GeometryRenderer::new(layer, &style, &self.tag);
        let mut skipped = 0;
        let replaced = replace_layer_geometry(document, &layer.name, &self.tag, |document| {
            let stats = renderer.render_layer(document, &features.features);
            skipped = stats.skipped;
            Ok(stats.added)
        })?;
        outcome.removed = replaced.removed;
        outcome.added = replaced.added;
        outcome.skipped = skipped;
        outcome.state = LayerState::GeometryReplaced;
        Ok(())
    }

    /// 完整的一次运行：加载（不存在时新建）、同步、备份后保存一次。
    ///
    /// 加载与保存失败是致命错误；图层级失败只体现在报告中。
    pub fn run(
        &self,
        loader: &dyn DocumentLoader,
        saver: &dyn DocumentSaver,
        source: &dyn FeatureSource,
    ) -> Result<SyncReport, EngineError> {
        let input = self.config.document.source_path();
        let mut document = if input.exists() {
            info!(path = %input.display(), "加载文档");
            loader.load(input)?
        } else {
            info!(path = %input.display(), version = self.config.dxf_version().acad_code(), "文档不存在，新建文档");
            Document::new(self.config.dxf_version())
        };

        let mut report = self.synchronize(&mut document, source);
        let saved = save_with_backup(saver, &document, &self.config.document.output)?;
        info!(
            path = %saved.path.display(),
            backup = saved.backup.as_ref().map(|path| path.display().to_string()).unwrap_or_default(),
            processed = report.processed(),
            failed = report.failed(),
            removed = report.removed(),
            added = report.added(),
            legends = report.legends,
            viewport_overrides = report.viewport_overrides,
            "同步完成"
        );
        report.saved = Some(saved);
        Ok(report)
    }
}

/// 读取配置中各图层的 GeoJSON 数据源。读取失败的图层记录告警，运行时按数据缺失处理。
pub fn load_sources(config: &SyncConfig) -> InMemorySource {
    let mut source = InMemorySource::new();
    for layer in &config.layers {
        let Some(path) = &layer.source else {
            continue;
        };
        match read_geojson_layer(path, &layer.name) {
            Ok(mut source_layer) => {
                source_layer.update_requested = layer.update;
                debug!(
                    layer = %layer.name,
                    features = source_layer.features.len(),
                    update = layer.update,
                    "已读取数据源"
                );
                source.insert(source_layer);
            }
            Err(err) => warn!(layer = %layer.name, path = %path.display(), error = %err, "数据源读取失败"),
        }
    }
    source
}
