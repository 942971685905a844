use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use launcher_core::core::downloader::{sha1_hex, Downloader};
use launcher_core::core::mods::{ModPack, PackSource};
use launcher_core::core::setup::{ModDownloadStep, SetupContext, Step};
use launcher_core::core::state::{Endpoints, LauncherSettings};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MOD_JAR: &[u8] = b"sodium jar bytes";

fn bundle_zip() -> Vec<u8> {
    let manifest = json!({
        "override": {"updated_at": "2024-05-01T00:00:00Z", "overrides": "overrides/"},
        "initialize": {"updated_at": "2024-05-01T00:00:00Z", "initializes": "initialize/"},
        "mods": [{
            "type": "modrinth",
            "project_id": "AANobbMI",
            "version_id": "OihdIimA",
            "file_name": "sodium-0.5.3.jar"
        }]
    });

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in [
        ("manifest.json", manifest.to_string()),
        ("overrides/config/sodium-options.json", "{\"quality\": \"fancy\"}".to_string()),
        ("overrides/config/stale.toml.delete", String::new()),
        ("initialize/options.txt", "fov:70".to_string()),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

async fn upstream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/packs/survival.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_zip()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/modrinth/project/AANobbMI/version/OihdIimA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "OihdIimA",
            "files": [{
                "url": format!("{}/cdn/sodium-0.5.3.jar", server.uri()),
                "filename": "sodium-0.5.3.jar",
                "hashes": {"sha1": sha1_hex(MOD_JAR)}
            }]
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/sodium-0.5.3.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MOD_JAR.to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

fn ctx(server: &MockServer, data: &Path) -> SetupContext {
    let settings = LauncherSettings {
        max_workers: 2,
        max_retries: 1,
        retry_backoff_ms: 10,
        endpoints: Endpoints {
            modrinth_api: format!("{}/modrinth", server.uri()),
            ..Endpoints::default()
        },
        ..LauncherSettings::default()
    };
    SetupContext::new(
        data.to_path_buf(),
        data.join("profiles/local/survival"),
        Downloader::new(reqwest::Client::new()),
        Arc::new(settings),
    )
}

async fn sync_once(server: &MockServer, ctx: &SetupContext) {
    let source = PackSource::Url(format!("{}/packs/survival.zip", server.uri()));
    let step = ModDownloadStep::new(source, "survival");
    assert_eq!(step.progress(), 0.0);
    step.run(ctx).await.unwrap();
    assert_eq!(step.progress(), 1.0);
}

#[tokio::test]
async fn pack_bundle_installs_mods_and_trees() {
    let server = MockServer::start().await;
    upstream(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(&server, dir.path());
    let profile = ctx.profile_path.clone();
    std::fs::create_dir_all(profile.join("config")).unwrap();
    std::fs::write(profile.join("config/stale.toml"), "old").unwrap();

    sync_once(&server, &ctx).await;

    assert_eq!(
        std::fs::read(profile.join("mods/sodium-0.5.3.jar")).unwrap(),
        MOD_JAR
    );
    assert_eq!(
        std::fs::read_to_string(profile.join("options.txt")).unwrap(),
        "fov:70"
    );
    assert!(profile.join("config/sodium-options.json").exists());
    assert!(!profile.join("config/stale.toml").exists());

    let installed = ModPack::load_installed(&profile).await.unwrap();
    assert_eq!(installed.mods.len(), 1);
    assert_eq!(installed.mods[0].current_file_name(), Some("sodium-0.5.3.jar"));
    assert!(installed.initialize.is_some());
    assert!(installed.overrides.is_some());
}

#[tokio::test]
async fn unchanged_pack_leaves_profile_alone() {
    let server = MockServer::start().await;
    upstream(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(&server, dir.path());
    let profile = ctx.profile_path.clone();

    sync_once(&server, &ctx).await;

    // Player edits after the first sync.
    std::fs::write(profile.join("options.txt"), "fov:110").unwrap();
    std::fs::write(profile.join("config/sodium-options.json"), "{}").unwrap();

    // Mod lookups and downloads are mounted with `expect(1)`.
    sync_once(&server, &ctx).await;

    assert_eq!(
        std::fs::read_to_string(profile.join("options.txt")).unwrap(),
        "fov:110"
    );
    assert_eq!(
        std::fs::read_to_string(profile.join("config/sodium-options.json")).unwrap(),
        "{}"
    );
    assert!(profile.join("mods/sodium-0.5.3.jar").exists());
}
