use std::path::Path;
use std::sync::Arc;

use launcher_core::core::downloader::{sha1_hex, Downloader};
use launcher_core::core::java::{installed_java, platform_key};
use launcher_core::core::loaders::{ManifestLoader, ManifestResolver};
use launcher_core::core::setup::SetupPhase;
use launcher_core::core::state::{Endpoints, LauncherSettings};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_JAR: &[u8] = b"client jar bytes";
const LIBRARY_JAR: &[u8] = b"library jar bytes";
const JAVA_BIN: &[u8] = b"#!/bin/sh\necho java\n";
const ASSET: &[u8] = b"asset bytes";
const RUNTIME: &str = "java-runtime-gamma";

async fn serve(server: &MockServer, route: &str, body: &[u8], times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()));
    match times {
        Some(n) => mock.expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

/// Mojang-shaped upstream for 1.20.1 with one library, one asset and a
/// two-entry Java runtime.
async fn upstream(server: &MockServer) {
    let base = server.uri();
    let asset_hash = sha1_hex(ASSET);
    let index = json!({
        "objects": {"icons/icon_16x16.png": {"hash": asset_hash, "size": ASSET.len()}}
    })
    .to_string();

    let versions = json!({
        "latest": {"release": "1.20.1", "snapshot": "1.20.1"},
        "versions": [{
            "id": "1.20.1",
            "type": "release",
            "url": format!("{}/v1/packages/1.20.1.json", base),
            "time": "2023-06-12T13:25:51+00:00",
            "releaseTime": "2023-06-12T13:25:51+00:00"
        }]
    });
    let client_manifest = json!({
        "id": "1.20.1",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "javaVersion": {"component": RUNTIME, "majorVersion": 17},
        "assetIndex": {
            "id": "5",
            "sha1": sha1_hex(index.as_bytes()),
            "size": index.len(),
            "totalSize": ASSET.len(),
            "url": format!("{}/indexes/5.json", base)
        },
        "downloads": {
            "client": {
                "sha1": sha1_hex(CLIENT_JAR),
                "size": CLIENT_JAR.len(),
                "url": format!("{}/objects/client.jar", base)
            }
        },
        "libraries": [{
            "name": "com.example:lib:1.0",
            "downloads": {"artifact": {
                "path": "com/example/lib/1.0/lib-1.0.jar",
                "sha1": sha1_hex(LIBRARY_JAR),
                "size": LIBRARY_JAR.len(),
                "url": format!("{}/maven/lib-1.0.jar", base)
            }}
        }, {
            "name": "com.example:elsewhere:1.0",
            "rules": [{"action": "allow", "os": {"name": "no-such-os"}}],
            "downloads": {"artifact": {
                "path": "com/example/elsewhere/1.0/elsewhere-1.0.jar",
                "url": format!("{}/maven/elsewhere-1.0.jar", base)
            }}
        }]
    });
    let runtime_index = json!({
        platform_key(): {
            RUNTIME: [{
                "availability": {"group": 1, "progress": 100},
                "manifest": {"sha1": "", "size": 0, "url": format!("{}/runtime/manifest.json", base)},
                "version": {"name": "17.0.8", "released": "2023-07-18T00:00:00+00:00"}
            }]
        }
    });
    let runtime_manifest = json!({
        "files": {
            "bin": {"type": "directory"},
            "bin/java": {"type": "file", "executable": true, "downloads": {"raw": {
                "sha1": sha1_hex(JAVA_BIN),
                "size": JAVA_BIN.len(),
                "url": format!("{}/runtime/java", base)
            }}},
            "bin/java.exe": {"type": "file", "executable": true, "downloads": {"raw": {
                "sha1": sha1_hex(JAVA_BIN),
                "size": JAVA_BIN.len(),
                "url": format!("{}/runtime/java", base)
            }}}
        }
    });

    serve(server, "/mc/version_manifest_v2.json", versions.to_string().as_bytes(), None).await;
    serve(server, "/v1/packages/1.20.1.json", client_manifest.to_string().as_bytes(), None).await;
    serve(server, "/runtime/all.json", runtime_index.to_string().as_bytes(), None).await;
    serve(server, "/runtime/manifest.json", runtime_manifest.to_string().as_bytes(), None).await;
    serve(server, "/runtime/java", JAVA_BIN, None).await;
    serve(server, "/indexes/5.json", index.as_bytes(), Some(1)).await;
    serve(server, "/objects/client.jar", CLIENT_JAR, Some(1)).await;
    serve(server, "/maven/lib-1.0.jar", LIBRARY_JAR, Some(1)).await;
    serve(
        server,
        &format!("/resources/{}/{}", &asset_hash[..2], asset_hash),
        ASSET,
        Some(1),
    )
    .await;
}

fn settings(server: &MockServer) -> LauncherSettings {
    let base = server.uri();
    LauncherSettings {
        max_workers: 4,
        max_retries: 1,
        retry_backoff_ms: 10,
        endpoints: Endpoints {
            version_manifest: format!("{}/mc/version_manifest_v2.json", base),
            resources: format!("{}/resources", base),
            java_runtime_index: format!("{}/runtime/all.json", base),
            ..Endpoints::default()
        },
        ..LauncherSettings::default()
    }
}

fn resolver(server: &MockServer, version: &str) -> ManifestResolver {
    ManifestResolver::new(
        ManifestLoader::vanilla(version),
        Downloader::new(reqwest::Client::new()),
        Arc::new(settings(server)),
    )
}

async fn run(resolver: &ManifestResolver, data: &Path) {
    resolver.start_setup(data.to_path_buf(), data.join("profiles/local/survival"));
    resolver.wait_setup().await;
}

#[tokio::test]
async fn vanilla_setup_installs_the_game_tree() {
    let server = MockServer::start().await;
    upstream(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path();

    let resolver = resolver(&server, "1.20.1");
    run(&resolver, data).await;

    assert_eq!(resolver.phase(), SetupPhase::Succeeded, "{:?}", resolver.error());
    assert_eq!(
        resolver.step_names(),
        vec!["java_setup", "client_download", "assets_download", "library_download"]
    );
    assert_eq!(resolver.total_progress(), 1.0);
    assert_eq!(resolver.current_progress(), 1.0);

    assert_eq!(
        std::fs::read(data.join("versions/1.20.1/1.20.1.jar")).unwrap(),
        CLIENT_JAR
    );
    assert!(data.join("versions/1.20.1/1.20.1.json").exists());
    assert!(data.join("libraries/com/example/lib/1.0/lib-1.0.jar").exists());
    assert!(!data.join("libraries/com/example/elsewhere").exists());
    assert!(data.join("assets/indexes/5.json").exists());
    let hash = sha1_hex(ASSET);
    assert!(data
        .join("assets/objects")
        .join(&hash[..2])
        .join(&hash)
        .exists());
    assert!(installed_java(data, RUNTIME).is_ok());
    assert_eq!(
        resolver.boot_manifest().map(|m| m.main_class.clone()).as_deref(),
        Some("net.minecraft.client.main.Main")
    );
}

#[tokio::test]
async fn second_setup_reuses_cached_files() {
    let server = MockServer::start().await;
    upstream(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let resolver = resolver(&server, "1.20.1");
    run(&resolver, dir.path()).await;
    assert_eq!(resolver.phase(), SetupPhase::Succeeded, "{:?}", resolver.error());

    // Every hashed download is mounted with `expect(1)`.
    run(&resolver, dir.path()).await;
    assert_eq!(resolver.phase(), SetupPhase::Succeeded, "{:?}", resolver.error());
}

#[tokio::test]
async fn unknown_version_fails_setup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mc/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latest": {"release": "1.20.1", "snapshot": "1.20.1"},
            "versions": []
        })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let resolver = resolver(&server, "0.0.1");
    run(&resolver, dir.path()).await;

    assert!(resolver.is_done());
    let message = resolver.error().unwrap_or_default();
    assert!(message.contains("0.0.1"), "{}", message);
    assert!(resolver.step_names().is_empty());
}
