// ─── Launch arguments ───
// `${key}` substitution over the manifest's JVM and game argument templates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::process::LaunchCommand;
use super::classpath::{build_classpath, classpath_separator, libraries_dir, natives_dir, safe_path_str};
use crate::core::auth::GameCredential;
use crate::core::assets::AssetManager;
use crate::core::profile::Profile;
use crate::core::version::{features, Argument, ClientManifest, Environment};

pub const LAUNCHER_NAME: &str = "launcher-core";
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// G1 tuning applied ahead of the manifest's own JVM arguments.
pub const DEFAULT_JVM_ARGS: [&str; 6] = [
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+UseG1GC",
    "-XX:G1NewSizePercent=20",
    "-XX:G1ReservePercent=20",
    "-XX:MaxGCPauseMillis=50",
    "-XX:G1HeapRegionSize=32M",
];

const RESOLUTION: (&str, &str) = ("1280", "720");

pub type Vars = HashMap<&'static str, String>;

/// Replace every `${key}` known to `vars`; unknown placeholders stay as written.
/// Substituted values are never expanded again.
pub fn substitute(template: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let token = &rest[start..];
        let Some(end) = token.find('}') else {
            out.push_str(token);
            return out;
        };
        match vars.get(&token[2..end]) {
            Some(value) => out.push_str(value),
            None => out.push_str(&token[..=end]),
        }
        rest = &token[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Everything that ends up on the game's command line.
pub struct LaunchRequest<'a> {
    pub data_dir: &'a Path,
    pub profile: &'a Profile,
    pub manifest: &'a ClientManifest,
    pub credential: &'a GameCredential,
    pub memory_mb: u64,
}

impl LaunchRequest<'_> {
    /// Host environment with the features this launch enables.
    pub fn environment(&self) -> Environment {
        let env = Environment::current();
        if self.profile.server_address().is_some() {
            env.with_feature(features::IS_QUICK_PLAY_MULTIPLAYER)
        } else {
            env
        }
    }

    pub fn jvm_vars(&self, env: &Environment) -> Vars {
        let mut vars = Vars::new();
        vars.insert(
            "natives_directory",
            safe_path_str(&natives_dir(self.data_dir, self.manifest)),
        );
        vars.insert("launcher_name", LAUNCHER_NAME.to_string());
        vars.insert("launcher_version", LAUNCHER_VERSION.to_string());
        vars.insert("classpath", build_classpath(self.data_dir, self.manifest, env));
        vars.insert("library_directory", safe_path_str(&libraries_dir(self.data_dir)));
        vars.insert("classpath_separator", classpath_separator().to_string());
        vars
    }

    pub fn game_vars(&self) -> Vars {
        let profile = &self.credential.profile;
        let mut vars = Vars::new();
        vars.insert("auth_player_name", profile.name.clone());
        vars.insert("version_name", self.manifest.id.clone());
        vars.insert("game_directory", safe_path_str(&self.profile.path));
        vars.insert(
            "assets_root",
            safe_path_str(&AssetManager::assets_dir(self.data_dir)),
        );
        vars.insert(
            "assets_index_name",
            self.manifest
                .asset_index
                .as_ref()
                .map(|a| a.id.clone())
                .or_else(|| self.manifest.assets.clone())
                .unwrap_or_default(),
        );
        vars.insert("auth_uuid", profile.id.simple().to_string());
        vars.insert("auth_access_token", self.credential.access_token.clone());
        vars.insert("clientid", "launcher".to_string());
        vars.insert("auth_xuid", profile.id.simple().to_string());
        vars.insert("user_type", "msa".to_string());
        vars.insert(
            "version_type",
            self.manifest.version_type.clone().unwrap_or_default(),
        );
        vars.insert("resolution_width", RESOLUTION.0.to_string());
        vars.insert("resolution_height", RESOLUTION.1.to_string());
        vars.insert("quickPlayPath", String::new());
        vars.insert(
            "quickPlayMultiplayer",
            self.profile.server_address().unwrap_or_default().to_string(),
        );
        vars.insert("quickPlayRealms", String::new());
        vars.insert("quickPlaySingleplayer", String::new());
        vars
    }

    /// `-Xmx`, default tuning, manifest JVM args, main class, game args.
    pub fn arguments(&self) -> Vec<String> {
        let env = self.environment();
        let jvm_vars = self.jvm_vars(&env);
        let game_vars = self.game_vars();

        let mut args = vec![format!("-Xmx{}M", self.memory_mb)];
        args.extend(DEFAULT_JVM_ARGS.iter().map(|a| a.to_string()));
        args.extend(expand(&self.manifest.jvm_arguments(), &env, &jvm_vars));
        args.push(self.manifest.main_class.clone());
        args.extend(expand(&self.manifest.game_arguments(), &env, &game_vars));
        args
    }

    pub fn working_dir(&self) -> PathBuf {
        self.profile.path.clone()
    }

    pub fn command(&self, java: PathBuf) -> LaunchCommand {
        LaunchCommand {
            java,
            args: self.arguments(),
            working_dir: self.working_dir(),
        }
    }
}

fn expand(templates: &[Argument], env: &Environment, vars: &Vars) -> Vec<String> {
    templates
        .iter()
        .flat_map(|arg| arg.resolve(env))
        .map(|template| substitute(template, vars))
        .collect()
}
