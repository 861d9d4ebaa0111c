use std::fs;

use mapsync_core::document::{
    AttachmentPoint, Color, DEFAULT_PAPER_LAYOUT, Document, DxfVersion, Entity, EntityKind, Hatch,
    HatchPath, HatchPathKind, HatchPattern, LayerOverride, MODEL_SPACE, MText, Point, Polyline,
    Viewport, XDataValue,
};
use mapsync_core::geometry::Point2;
use mapsync_io::{DocumentLoader, DocumentSaver, DxfFacade, read_geojson_layer};

fn sample_document() -> Document {
    let mut doc = Document::new(DxfVersion::R2013);
    doc.register_app_id("MAPSYNC");
    {
        let layer = doc.ensure_layer("Roads").unwrap();
        layer.set_color(Color::Rgb(200, 10, 10));
        layer.set_lineweight(35);
        layer.set_transparency(Some(0.5));
        layer.lock();
        layer.set_viewport_override(
            2,
            LayerOverride {
                color: Some(Color::Aci(3)),
                linetype: None,
                lineweight: Some(50),
                transparency: None,
            },
        );
    }

    let mut polyline = Entity::new(
        "Roads",
        EntityKind::Polyline(Polyline::from_points(
            [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), Point2::new(10.0, 5.0)],
            false,
        )),
    );
    polyline
        .set_xdata("MAPSYNC", vec![XDataValue::String("MAPSYNC".into())])
        .unwrap();
    polyline.set_hyperlink("mapsync://MAPSYNC").unwrap();
    polyline
        .common
        .app_data
        .insert("ACAD_REACTORS".into(), vec![(330, "1F".into())]);
    doc.add_model_entity(polyline).unwrap();

    doc.add_model_entity(Entity::new(
        "Parks",
        EntityKind::Hatch(Hatch {
            pattern: HatchPattern::Predefined {
                name: "ANSI31".into(),
                scale: 0.5,
                angle: 45.0,
            },
            paths: vec![
                HatchPath {
                    kind: HatchPathKind::External,
                    vertices: vec![
                        Point2::new(0.0, 0.0),
                        Point2::new(8.0, 0.0),
                        Point2::new(8.0, 8.0),
                        Point2::new(0.0, 8.0),
                    ],
                },
                HatchPath {
                    kind: HatchPathKind::Hole,
                    vertices: vec![
                        Point2::new(2.0, 2.0),
                        Point2::new(4.0, 2.0),
                        Point2::new(4.0, 4.0),
                    ],
                },
            ],
        }),
    ))
    .unwrap();

    doc.add_model_entity(Entity::new(
        "Parks Label",
        EntityKind::MText(MText {
            insert: Point2::new(4.0, 4.0),
            content: "Central\nPark".into(),
            height: 2.5,
            reference_width: Some(20.0),
            attachment: AttachmentPoint::MiddleCenter,
            rotation: 0.0,
            style: None,
        }),
    ))
    .unwrap();

    doc.add_entity(
        DEFAULT_PAPER_LAYOUT,
        Entity::new(
            "0",
            EntityKind::Viewport(Viewport {
                center: Point2::new(100.0, 80.0),
                width: 150.0,
                height: 100.0,
                view_center: Point2::new(5.0, 5.0),
                view_height: 40.0,
                id: 2,
            }),
        ),
    )
    .unwrap();
    doc
}

#[test]
fn written_document_reads_back_equivalent() {
    let facade = DxfFacade::new();
    let original = sample_document();
    let text = facade.to_dxf_string(&original);
    let loaded = facade.from_dxf_str(&text).expect("读取写出的 DXF 失败");

    assert_eq!(loaded.version(), DxfVersion::R2013);
    assert_eq!(loaded.entity_store().len(), original.entity_store().len());
    for stored in original.entity_store().iter() {
        let reloaded = loaded
            .entity_store()
            .stored(stored.id)
            .expect("句柄应保持不变");
        assert_eq!(reloaded.layout, stored.layout);
        assert_eq!(reloaded.entity, stored.entity, "实体 {} 不一致", stored.id);
    }

    let roads = loaded.layers().get("roads").expect("Roads 图层");
    assert_eq!(roads.color, Color::Rgb(200, 10, 10));
    assert_eq!(roads.lineweight, 35);
    assert!(roads.is_locked);
    assert!((roads.transparency.unwrap() - 0.5).abs() < 0.01);
    assert_eq!(
        roads.viewport_overrides.get(&2).and_then(|o| o.lineweight),
        Some(50)
    );
    assert!(loaded.app_ids().has("MAPSYNC"));
    assert!(loaded.app_ids().has("PE_URL"));
    assert!(loaded.has_layout(MODEL_SPACE));
}

#[test]
fn foreign_entities_survive_unchanged() {
    let source = "\
  0
SECTION
  2
HEADER
  9
$ACADVER
  1
AC1024
  0
ENDSEC
  0
SECTION
  2
ENTITIES
  0
SPLINE
  5
4F
100
AcDbEntity
  8
Contours
100
AcDbSpline
 70
8
 71
3
  0
POINT
  5
50
100
AcDbEntity
  8
Survey
100
AcDbPoint
 10
1.5
 20
2.5
 30
0.0
  0
ENDSEC
  0
EOF
";
    let facade = DxfFacade::new();
    let doc = facade.from_dxf_str(source).expect("读取失败");
    assert_eq!(doc.entity_store().len(), 2);

    let spline = doc
        .entity_store()
        .get(mapsync_core::document::EntityId::new(0x4F))
        .expect("SPLINE 保留");
    assert_eq!(spline.dxf_type(), "SPLINE");
    assert_eq!(spline.layer_name(), "Contours");
    match &spline.kind {
        EntityKind::Unknown(raw) => {
            assert!(raw.pairs.contains(&(71, "3".to_string())));
        }
        other => panic!("expected raw entity, got {other:?}"),
    }

    let rewritten = facade.to_dxf_string(&doc);
    let again = facade.from_dxf_str(&rewritten).unwrap();
    assert_eq!(
        again.entity_store().get(mapsync_core::document::EntityId::new(0x4F)),
        Some(spline)
    );
    match &again
        .entity_store()
        .get(mapsync_core::document::EntityId::new(0x50))
        .unwrap()
        .kind
    {
        EntityKind::Point(Point { location }) => {
            assert!((location.x() - 1.5).abs() < 1e-9);
        }
        other => panic!("expected point, got {other:?}"),
    }
}

#[test]
fn save_and_load_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.dxf");
    let facade = DxfFacade::new();
    facade.save(&sample_document(), &path).unwrap();
    let loaded = facade.load(&path).unwrap();
    assert_eq!(loaded.entity_store().len(), 4);
}

#[test]
fn truncated_file_is_rejected() {
    let facade = DxfFacade::new();
    assert!(facade.from_dxf_str("  0\nSECTION\n  2\nENTITIES\n  0\n").is_err());
    assert!(facade.from_dxf_str("  0\nSECTION\n  2\nHEADER\n  9\n$ACADVER\n  1\nAC1009\n  0\nENDSEC\n  0\nEOF\n").is_err());
    assert!(facade.from_dxf_str("").is_err());

    // 在任意一个 ENDSEC 之后截断，缺少 EOF 的文件不能被当作完整文档读入
    let text = facade.to_dxf_string(&sample_document());
    let cuts: Vec<usize> = text
        .match_indices("ENDSEC")
        .map(|(index, marker)| index + marker.len())
        .collect();
    assert!(cuts.len() >= 3);
    for cut in cuts {
        let result = facade.from_dxf_str(&text[..cut]);
        assert!(result.is_err(), "截断于 {cut} 的文件被接受");
    }
    assert!(facade.from_dxf_str(&text).is_ok());
}

#[test]
fn geojson_file_becomes_source_layer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roads.geojson");
    fs::write(
        &path,
        r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "EPSG:3857"}},
            "features": [
                {"type": "Feature", "id": 7,
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [10, 0]]},
                 "properties": {"name": "Main St", "lanes": 2}},
                {"type": "Feature", "geometry": null, "properties": {}}
            ]
        }"#,
    )
    .unwrap();

    let layer = read_geojson_layer(&path, "Roads").unwrap();
    assert_eq!(layer.name, "Roads");
    assert_eq!(layer.crs.as_deref(), Some("EPSG:3857"));
    assert_eq!(layer.features.len(), 2);
    assert_eq!(layer.features[0].id.as_deref(), Some("7"));
    assert!(layer.features[1].geometry.is_none());
}
