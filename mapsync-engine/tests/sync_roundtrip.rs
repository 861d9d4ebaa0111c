use std::fs;
use std::path::Path;

use mapsync_config::{
    ColorSpec, DocumentConfig, HatchProperties, LabelConfig, LayerConfig, LegendConfig, LegendItem,
    StyleDefinition, StyleRef, SyncConfig,
};
use mapsync_core::document::{Document, DxfVersion, Entity, EntityKind, Polyline};
use mapsync_core::geometry::Point2;
use mapsync_engine::errors::EngineError;
use mapsync_engine::ownership::{OwnershipTag, is_owned};
use mapsync_engine::sync::{Synchronizer, load_sources};
use mapsync_io::{DocumentLoader, DocumentSaver, DxfFacade};
use tempfile::tempdir;

const ROADS: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "EPSG:3857" } },
  "features": [
    { "type": "Feature", "id": 1, "properties": { "name": "Main St" },
      "geometry": { "type": "LineString", "coordinates": [[0, 0], [100, 0], [100, 50]] } },
    { "type": "Feature", "id": 2, "properties": { "name": "Side St" },
      "geometry": { "type": "LineString", "coordinates": [[0, 20], [60, 20]] } },
    { "type": "Feature", "id": 3, "properties": {},
      "geometry": { "type": "LineString", "coordinates": [[5, 5]] } }
  ]
}"#;

const PARKS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature", "properties": { "name": "Central" },
      "geometry": { "type": "Polygon", "coordinates": [
        [[10, 10], [40, 10], [40, 40], [10, 40], [10, 10]],
        [[20, 20], [20, 25], [25, 25], [25, 20], [20, 20]]
      ] } }
  ]
}"#;

fn config(dir: &Path) -> SyncConfig {
    fs::write(dir.join("roads.geojson"), ROADS).unwrap();
    fs::write(dir.join("parks.geojson"), PARKS).unwrap();

    let mut roads = LayerConfig::new("Roads");
    roads.source = Some(dir.join("roads.geojson"));
    roads.label = Some(LabelConfig::default());

    let mut parks = LayerConfig::new("Parks");
    parks.source = Some(dir.join("parks.geojson"));
    parks.style = Some(StyleRef::Named("park".into()));

    let mut config = SyncConfig {
        script_id: "SYS".into(),
        document: DocumentConfig {
            input: None,
            output: dir.join("map.dxf"),
            version: "R2013".into(),
        },
        layers: vec![roads, parks],
        legends: vec![LegendConfig {
            name: "LEGEND".into(),
            layer: "Legend".into(),
            position: [200.0, 0.0],
            title: Some("Legend".into()),
            swatch_size: [10.0, 5.0],
            spacing: 2.0,
            text_height: 2.5,
            items: vec![LegendItem {
                label: "Parks".into(),
                style: "park".into(),
            }],
        }],
        ..SyncConfig::default()
    };
    config.styles.insert(
        "park".into(),
        StyleDefinition {
            hatch: Some(HatchProperties {
                pattern: Some("ANSI31".into()),
                color: Some(ColorSpec::Index(3)),
                scale: Some(0.5),
                angle: None,
            }),
            ..StyleDefinition::default()
        },
    );
    config
}

fn owned_entities(document: &Document, tag: &OwnershipTag) -> Vec<Entity> {
    document
        .entity_store()
        .iter()
        .filter(|stored| is_owned(&stored.entity, tag))
        .map(|stored| stored.entity.clone())
        .collect()
}

#[test]
fn repeated_runs_leave_identical_owned_entities() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let facade = DxfFacade::new();
    let sync = Synchronizer::new(&config).unwrap();

    let first = sync.run(&facade, &facade, &load_sources(&config)).unwrap();
    assert_eq!(first.failed(), 0);
    assert_eq!(first.processed(), 2);
    assert_eq!(first.layer("Roads").unwrap().skipped, 1);
    assert_eq!(first.legends, 1);
    assert!(first.saved.as_ref().unwrap().backup.is_none());
    let after_first = facade.load(&config.document.output).unwrap();

    let second = sync.run(&facade, &facade, &load_sources(&config)).unwrap();
    assert_eq!(second.removed(), first.added());
    assert_eq!(second.added(), first.added());
    assert!(second.saved.as_ref().unwrap().backup.as_ref().unwrap().exists());
    let after_second = facade.load(&config.document.output).unwrap();

    let tag = sync.tag();
    let owned = owned_entities(&after_first, tag);
    // 两条道路 + 两个标注 + 公园两个环 + 填充 + 图例插入
    assert_eq!(owned.len(), 8);
    assert_eq!(owned, owned_entities(&after_second, tag));
    assert_eq!(after_first.version(), DxfVersion::R2013);
    assert!(after_second.layers().has("Roads Label"));
    assert!(after_second.blocks().has("LEGEND"));
}

#[test]
fn hand_drawn_content_survives_runs() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let facade = DxfFacade::new();

    let mut existing = Document::new(DxfVersion::R2013);
    existing
        .add_model_entity(Entity::new(
            "Roads",
            EntityKind::Polyline(Polyline::from_points(
                [Point2::new(-10.0, -10.0), Point2::new(-20.0, -10.0)],
                false,
            )),
        ))
        .unwrap();
    facade.save(&existing, &config.document.output).unwrap();

    let sync = Synchronizer::new(&config).unwrap();
    for _ in 0..2 {
        sync.run(&facade, &facade, &load_sources(&config)).unwrap();
    }

    let document = facade.load(&config.document.output).unwrap();
    let foreign: Vec<&Entity> = document
        .entity_store()
        .iter()
        .map(|stored| &stored.entity)
        .filter(|entity| !is_owned(*entity, sync.tag()))
        .collect();
    assert_eq!(foreign.len(), 1);
    assert_eq!(foreign[0].layer_name(), "Roads");
}

#[test]
fn unreadable_document_aborts_without_writing() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    fs::write(&config.document.output, "not a drawing").unwrap();

    let facade = DxfFacade::new();
    let sync = Synchronizer::new(&config).unwrap();
    let result = sync.run(&facade, &facade, &load_sources(&config));

    assert!(matches!(result, Err(EngineError::Io(_))));
    assert_eq!(fs::read_to_string(&config.document.output).unwrap(), "not a drawing");
    assert!(!dir.path().join("map.dxf.bak").exists());
}

#[test]
fn missing_source_file_fails_only_that_layer() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config.layers[1].source = Some(dir.path().join("absent.geojson"));

    let facade = DxfFacade::new();
    let sync = Synchronizer::new(&config).unwrap();
    let report = sync.run(&facade, &facade, &load_sources(&config)).unwrap();

    assert_eq!(report.processed(), 1);
    assert_eq!(report.failed(), 1);
    assert!(config.document.output.exists());
}
