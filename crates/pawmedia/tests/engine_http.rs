//! End-to-end engine tests against a mock catalog and image host.

use std::path::PathBuf;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pawmedia::config::{EngineConfig, QuorumConfig, TierConfig};
use pawmedia::{EngineEvent, MediaEngine, MediaReference, SlotStatus, Tier};

async fn mount_image(server: &MockServer, image: &str) {
    Mock::given(method("HEAD"))
        .and(path(format!("/img/{image}")))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"))
        .mount(server)
        .await;
}

async fn dog_host() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/dogs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": [
                format!("{base}/img/1.jpg"),
                format!("{base}/img/2.jpg"),
                format!("{base}/img/3.jpg"),
                format!("{base}/img/4.jpg"),
            ],
            "status": "success"
        })))
        .mount(&server)
        .await;
    // 2.jpg is left unmounted and answers 404.
    for image in ["1.jpg", "3.jpg", "4.jpg"] {
        mount_image(&server, image).await;
    }
    server
}

fn config(assets: PathBuf, catalog: String) -> EngineConfig {
    EngineConfig {
        asset_root: assets,
        display_count: 4,
        quorum: QuorumConfig {
            sample_size: 3,
            min_available: 2,
        },
        tiers: vec![
            TierConfig::Local {
                dir: PathBuf::from("bundled"),
            },
            TierConfig::RemoteCatalog {
                url: catalog,
                limit: None,
                alt_text: "Dog photo".into(),
            },
            TierConfig::Static {
                items: vec![MediaReference::new("asset://spare.jpg", "Spare")],
            },
        ],
        backup: vec![MediaReference::new("asset://spare.jpg", "Spare")],
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn remote_tier_selected_and_broken_image_replaced() {
    let server = dog_host().await;
    let assets = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(assets.path().join("bundled")).unwrap();
    std::fs::write(assets.path().join("spare.jpg"), b"\xff\xd8\xff").unwrap();

    let engine = MediaEngine::from_config(config(
        assets.path().to_path_buf(),
        format!("{}/api/dogs", server.uri()),
    ))
    .unwrap();
    let mut events = engine.events().subscribe();

    let (selection, run) = engine.request_sequence().await.unwrap();
    assert_eq!(selection.tier, Tier::RemoteCatalog);
    assert_eq!(selection.reports.len(), 2);
    assert_eq!(selection.reports[0].tier, Tier::Local);
    assert_eq!(selection.reports[0].item_count, 0);
    assert_eq!(selection.reports[1].available, 2);

    let resolution = run.finish().await.into_resolution();
    let base = server.uri();
    assert_eq!(
        resolution.locators(),
        vec![
            format!("{base}/img/1.jpg").as_str(),
            "asset://spare.jpg",
            format!("{base}/img/3.jpg").as_str(),
            format!("{base}/img/4.jpg").as_str(),
        ]
    );
    assert_eq!(
        resolution.slots[1],
        SlotStatus::Substituted {
            replaced: format!("{base}/img/2.jpg")
        }
    );

    let mut probed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::TierProbed { .. }) {
            probed += 1;
        }
    }
    assert_eq!(probed, 2);
}

#[tokio::test]
async fn catalog_outage_falls_back_to_static_tier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dogs"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let assets = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(assets.path().join("bundled")).unwrap();
    std::fs::write(assets.path().join("spare.jpg"), b"\xff\xd8\xff").unwrap();

    let engine = MediaEngine::from_config(config(
        assets.path().to_path_buf(),
        format!("{}/api/dogs", server.uri()),
    ))
    .unwrap();

    let (selection, run) = engine.request_sequence().await.unwrap();
    assert_eq!(selection.tier, Tier::StaticFallback);
    assert!(selection.reports[1].fetch_error.is_some());

    let resolution = run.finish().await.into_resolution();
    assert_eq!(resolution.locators(), vec!["asset://spare.jpg"]);
    assert_eq!(resolution.slots, vec![SlotStatus::Available]);
}
