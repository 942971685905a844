// ─── Classpath & natives ───

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::version::{ClientManifest, Environment};

/// Platform-specific Java classpath separator.
pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Libraries dir of the shared data tree.
pub fn libraries_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("libraries")
}

/// `<data>/bin/<id>`, where native libraries are unpacked for a launch.
pub fn natives_dir(data_dir: &Path, manifest: &ClientManifest) -> PathBuf {
    data_dir.join("bin").join(&manifest.id)
}

/// Classpath entries in launch order: each allowed library's native
/// classifier and artifact, then the client jar.
pub fn classpath_entries(data_dir: &Path, manifest: &ClientManifest, env: &Environment) -> Vec<PathBuf> {
    let libs = libraries_dir(data_dir);
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for library in manifest.libraries.iter().filter(|l| l.is_allowed(env)) {
        let native = library.native_artifact(env).map(|a| a.path.clone());
        let artifact = library.artifact().map(|a| a.path);
        for path in native.into_iter().chain(artifact) {
            if seen.insert(path.clone()) {
                entries.push(libs.join(path));
            }
        }
    }
    entries.push(manifest.jar_path(data_dir));
    entries
}

pub fn build_classpath(data_dir: &Path, manifest: &ClientManifest, env: &Environment) -> String {
    classpath_entries(data_dir, manifest, env)
        .iter()
        .map(|p| safe_path_str(p))
        .collect::<Vec<_>>()
        .join(classpath_separator())
}

/// Unpack the native classifier jars of `manifest` into [`natives_dir`],
/// honouring each library's `extract.exclude` prefixes.
pub async fn extract_natives(
    data_dir: &Path,
    manifest: &ClientManifest,
    env: &Environment,
) -> LauncherResult<PathBuf> {
    let dest = natives_dir(data_dir, manifest);
    tokio::fs::create_dir_all(&dest)
        .await
        .map_err(io_at(&dest))?;

    let libs = libraries_dir(data_dir);
    for library in manifest.libraries.iter().filter(|l| l.is_allowed(env)) {
        let Some(native) = library.native_artifact(env) else {
            continue;
        };
        let jar = libs.join(&native.path);
        if !jar.exists() {
            warn!("Native jar {:?} is missing", jar);
            continue;
        }
        let exclude = library
            .extract
            .as_ref()
            .map(|e| e.exclude.clone())
            .unwrap_or_default();
        let dest_dir = dest.clone();
        let extracted = tokio::task::spawn_blocking(move || unpack_natives(&jar, &dest_dir, &exclude))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))??;
        debug!("Extracted {} native files from {}", extracted, library.name);
    }
    Ok(dest)
}

fn unpack_natives(jar: &Path, dest: &Path, exclude: &[String]) -> LauncherResult<usize> {
    let file = std::fs::File::open(jar).map_err(io_at(jar))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if exclude.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe native entry {}", name);
            continue;
        };
        let out_path = dest.join(relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(io_at(&out_path))?;
        std::io::copy(&mut entry, &mut out).map_err(io_at(&out_path))?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Path as a string, without the `\\?\` prefix Java chokes on.
pub fn safe_path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
