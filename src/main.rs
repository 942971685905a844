// Headless driver: sign in, prepare a profile and play it.
//
//   launcher-core            list profiles
//   launcher-core <profile>  set up and launch <profile>

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use launcher_core::core::auth::{AccountClient, AuthSession, EntitlementVerifier, MinecraftAccount};
use launcher_core::core::downloader::Downloader;
use launcher_core::core::loaders::ManifestResolver;
use launcher_core::core::state::AppState;
use launcher_core::{init_tracing, LauncherError, LauncherResult};
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run(std::env::args().nth(1)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(profile_name: Option<String>) -> LauncherResult<()> {
    let state = AppState::new()?;
    info!("Launcher starting (data dir {:?})", state.data_dir);

    state.profiles.load_from(&state.profiles_path()).await?;
    let refreshed = state.profiles.refresh_sources(&state.http_client).await;
    if refreshed > 0 {
        state.profiles.save_to(&state.profiles_path()).await?;
    }

    let Some(profile_name) = profile_name else {
        for profile in state.profiles.list() {
            println!("{}\t{}", profile.name(), profile.display());
        }
        return Ok(());
    };
    let profile = state
        .profiles
        .find(&profile_name)
        .ok_or_else(|| LauncherError::Other(format!("Unknown profile {}", profile_name)))?;
    if !profile.check_memory() {
        warn!(
            "Profile {} recommends more memory than this machine can spare",
            profile.name()
        );
    }

    let settings = &state.launcher_settings;
    let api = AccountClient {
        client: &state.http_client,
        endpoints: &settings.endpoints,
        verifier: EntitlementVerifier::mojang()?,
        open_browser_on_remediation: settings.open_browser_on_remediation,
    };
    let mut account = match MinecraftAccount::load(&state.account_path())? {
        Some(account) => account,
        None => sign_in(&state, &api).await?,
    };

    let resolver = ManifestResolver::new(
        profile.manifest().clone(),
        Downloader::new(state.http_client.clone()),
        Arc::new(settings.clone()),
    );
    resolver.start_setup(state.data_dir.clone(), profile.path.clone());
    while !resolver.is_done() {
        info!(
            "[{:>3.0}%] {} ({:.0}%)",
            resolver.total_progress() * 100.0,
            resolver.current_status(),
            resolver.current_progress() * 100.0
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    resolver.wait_setup().await;
    if let Some(message) = resolver.error() {
        return Err(LauncherError::Other(format!("Setup failed: {}", message)));
    }

    let booted = resolver
        .boot(&state.data_dir, &profile, Some(&mut account), &api)
        .await;
    if let Err(LauncherError::ReloginRequired(_)) = &booted {
        warn!("Stored sign-in is no longer valid, removing it");
        if let Err(e) = MinecraftAccount::forget(&state.account_path()) {
            warn!("Could not remove stored sign-in: {}", e);
        }
    } else {
        account.save(&state.account_path())?;
    }
    booted
}

async fn sign_in(state: &AppState, api: &AccountClient<'_>) -> LauncherResult<MinecraftAccount> {
    let settings = &state.launcher_settings;
    let mut session = AuthSession::new(
        state.http_client.clone(),
        &settings.msa_client_id,
        &settings.endpoints.msa_authority,
    );
    let code = session.start_login().await?;
    if let Some(message) = &code.message {
        println!("{}", message);
    }
    println!("Open {} and enter {}", code.verification_uri, code.user_code);

    let token = session.auth_result().await?;
    let account = MinecraftAccount::sign_in(api, &token).await?;
    account.save(&state.account_path())?;
    info!("Signed in, account saved");
    Ok(account)
}
