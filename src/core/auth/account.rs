// ─── Minecraft account ───
// Xbox Live → XSTS → game token → entitlement check → game profile.

use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::browser::open_browser;
use super::session::MsaToken;
use crate::core::error::{io_at, AuthStep, LauncherError, LauncherResult};
use crate::core::state::Endpoints;

const XSTS_RELYING_PARTY: &str = "rp://api.minecraftservices.com/";

/// Mojang's key for the signatures on `entitlements/mcstore` items.
pub const MOJANG_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MIICIjANBgkqhkiG9w0BAQEFAAOCAg8AMIICCgKCAgEAtz7jy4jRH3psj5AbVS6W
NHjniqlr/f5JDly2M8OKGK81nPEq765tJuSILOWrC3KQRvHJIhf84+ekMGH7iGlO
4DPGDVb6hBGoMMBhCq2jkBjuJ7fVi3oOxy5EsA/IQqa69e55ugM+GJKUndLyHeNn
X6RzRzDT4tX/i68WJikwL8rR8Jq49aVJlIEFT6F+1rDQdU2qcpfT04CBYLM5gMxE
fWRl6u1PNQixz8vSOv8pA6hB2DU8Y08VvbK7X2ls+BiS3wqqj3nyVWqoxrwVKiXR
kIqIyIAedYDFSaIq5vbmnVtIonWQPeug4/0spLQoWnTUpXRZe2/+uAKN1RY9mmaB
pRFV/Osz3PDOoICGb5AZ0asLFf/qEvGJ+di6Ltt8/aaoBuVw+7fnTw2BhkhSq1S/
va6LxHZGXE9wsLj4CN8mZXHfwVD9QG0VNQTUgEGZ4ngf7+0u30p7mPt5sYy3H+Fm
sWXqFZn55pecmrgNLqtETPWMNpWc2fJu/qqnxE9o2tBGy/MqJiw3iLYxf7U+4le4
jM49AUKrO16bD1rdFwyVuNaTefObKjEMTX9gyVUF6o7oDEItp5NHxFm3CqnQRmch
HsMs+NxEnN4E9a8PDB23b4yjKOQ9VHDxBxuaZJU60GBCIOF9tslb7OAkheSJx5Xy
EYblHbogFGPRFU++NrSQRX0CAwEAAQ==
-----END PUBLIC KEY-----";

/// Persisted sign-in: enough to redo the XSTS → profile hops at boot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MinecraftAccount {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub xbl_token: String,
    pub user_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameProfile {
    pub id: Uuid,
    pub name: String,
}

/// Launch-ready token plus the profile it belongs to.
#[derive(Debug, Clone)]
pub struct GameCredential {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub profile: GameProfile,
    pub user_hash: String,
}

/// RS256 check of entitlement signatures; swappable so the chain can be
/// exercised against a test key.
#[derive(Clone)]
pub struct EntitlementVerifier {
    key: DecodingKey,
    algorithm: Algorithm,
}

impl EntitlementVerifier {
    pub fn mojang() -> LauncherResult<Self> {
        Self::rsa_pem(MOJANG_PUBLIC_KEY.as_bytes())
    }

    /// RS256 verifier for a PEM encoded public key.
    pub fn rsa_pem(pem: &[u8]) -> LauncherResult<Self> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(LauncherError::EntitlementKey)?;
        Ok(Self::new(key, Algorithm::RS256))
    }

    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        Self { key, algorithm }
    }

    pub fn verify(&self, token: &str) -> LauncherResult<()> {
        let mut validation = Validation::new(self.algorithm);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        jsonwebtoken::decode::<serde_json::Value>(token, &self.key, &validation)
            .map_err(LauncherError::EntitlementSignature)?;
        Ok(())
    }
}

// ── Wire shapes ──

#[derive(Deserialize)]
struct XboxResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims")]
    display_claims: DisplayClaims,
}

#[derive(Deserialize)]
struct DisplayClaims {
    xui: Vec<UserClaim>,
}

#[derive(Deserialize)]
struct UserClaim {
    uhs: String,
}

#[derive(Deserialize)]
struct XstsError {
    #[serde(rename = "XErr", default)]
    xerr: u64,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Redirect", default)]
    redirect: Option<String>,
}

#[derive(Deserialize)]
struct GameLoginResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct Entitlements {
    #[serde(default)]
    items: Vec<EntitlementItem>,
}

#[derive(Deserialize)]
struct EntitlementItem {
    name: String,
    signature: String,
}

/// Shared HTTP bits for the hops.
pub struct AccountClient<'a> {
    pub client: &'a reqwest::Client,
    pub endpoints: &'a Endpoints,
    pub verifier: EntitlementVerifier,
    pub open_browser_on_remediation: bool,
}

impl MinecraftAccount {
    /// Trade the federated token for an Xbox Live user token.
    pub async fn sign_in(api: &AccountClient<'_>, token: &MsaToken) -> LauncherResult<Self> {
        if token.access_token.is_empty() {
            return Err(LauncherError::auth(AuthStep::XboxLive, "empty access token"));
        }
        if token.is_expired() {
            return Err(LauncherError::auth(AuthStep::XboxLive, "access token expired"));
        }

        let body = json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={}", token.access_token),
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
        });
        let response = api
            .client
            .post(&api.endpoints.xbox_user_auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| LauncherError::auth(AuthStep::XboxLive, e.to_string()))?;
        let xbl: XboxResponse = read_json(response, AuthStep::XboxLive).await?;
        let user_hash = xbl
            .display_claims
            .xui
            .into_iter()
            .next()
            .map(|c| c.uhs)
            .ok_or_else(|| LauncherError::auth(AuthStep::XboxLive, "no user hash in response"))?;
        info!("Xbox Live sign-in succeeded");

        Ok(Self {
            username: String::new(),
            uuid: None,
            xbl_token: xbl.token,
            user_hash,
        })
    }

    /// Run the remaining hops and return a launch token. Fills in the
    /// username and uuid on first use.
    pub async fn authenticate(&mut self, api: &AccountClient<'_>) -> LauncherResult<GameCredential> {
        let xsts = self.xsts(api).await?;
        let login = self.game_login(api, &xsts).await?;
        check_entitlements(api, &login.access_token).await?;
        let profile = fetch_profile(api, &login.access_token).await?;

        if self.username.is_empty() {
            self.username = profile.name.clone();
        }
        if self.uuid.is_none() {
            self.uuid = Some(profile.id);
        }

        Ok(GameCredential {
            access_token: login.access_token,
            token_type: login.token_type,
            expires_in: login.expires_in,
            profile,
            user_hash: self.user_hash.clone(),
        })
    }

    async fn xsts(&self, api: &AccountClient<'_>) -> LauncherResult<String> {
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [self.xbl_token],
            },
            "RelyingParty": XSTS_RELYING_PARTY,
            "TokenType": "JWT",
        });
        let response = api
            .client
            .post(&api.endpoints.xsts_authorize)
            .json(&body)
            .send()
            .await
            .map_err(|e| LauncherError::auth(AuthStep::Xsts, e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| LauncherError::auth(AuthStep::Xsts, e.to_string()))?;

        // XErr comes back on a 401, so look for it before the status.
        if let Ok(err) = serde_json::from_str::<XstsError>(&raw) {
            if err.xerr != 0 {
                warn!("XSTS refused the account: XErr {}", err.xerr);
                if api.open_browser_on_remediation {
                    if let Some(redirect) = &err.redirect {
                        open_browser(redirect);
                    }
                }
                return Err(LauncherError::XstsRemediation {
                    code: err.xerr,
                    message: err.message,
                    redirect: err.redirect,
                });
            }
        }
        if !status.is_success() {
            return Err(LauncherError::auth(AuthStep::Xsts, format!("HTTP {}", status)));
        }
        let xsts: XboxResponse = serde_json::from_str(&raw)
            .map_err(|e| LauncherError::auth(AuthStep::Xsts, e.to_string()))?;
        Ok(xsts.token)
    }

    async fn game_login(&self, api: &AccountClient<'_>, xsts_token: &str) -> LauncherResult<GameLoginResponse> {
        let url = format!(
            "{}/authentication/login_with_xbox",
            api.endpoints.minecraft_services.trim_end_matches('/')
        );
        let body = json!({
            "identityToken": format!("XBL3.0 x={};{}", self.user_hash, xsts_token),
        });
        let response = api
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LauncherError::auth(AuthStep::GameLogin, e.to_string()))?;
        read_json(response, AuthStep::GameLogin).await
    }

    pub fn load(path: &Path) -> LauncherResult<Option<Self>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_at(path)(e)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_at(path))
    }

    /// Drop a stored sign-in. A missing file is already forgotten.
    pub fn forget(path: &Path) -> LauncherResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_at(path)(e)),
        }
    }
}

async fn check_entitlements(api: &AccountClient<'_>, access_token: &str) -> LauncherResult<()> {
    let url = format!(
        "{}/entitlements/mcstore",
        api.endpoints.minecraft_services.trim_end_matches('/')
    );
    let response = api
        .client
        .get(&url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| LauncherError::auth(AuthStep::Entitlements, e.to_string()))?;
    let entitlements: Entitlements = read_json(response, AuthStep::Entitlements).await?;

    let first = entitlements
        .items
        .first()
        .ok_or(LauncherError::EntitlementMissing)?;
    api.verifier.verify(&first.signature)?;
    debug!("Entitlement {} verified", first.name);
    Ok(())
}

async fn fetch_profile(api: &AccountClient<'_>, access_token: &str) -> LauncherResult<GameProfile> {
    let url = format!(
        "{}/minecraft/profile",
        api.endpoints.minecraft_services.trim_end_matches('/')
    );
    let response = api
        .client
        .get(&url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| LauncherError::auth(AuthStep::GameProfile, e.to_string()))?;
    let profile: GameProfile = read_json(response, AuthStep::GameProfile).await?;
    if profile.name.is_empty() {
        return Err(LauncherError::auth(AuthStep::GameProfile, "profile has no name"));
    }
    info!("Signed in as {}", profile.name);
    Ok(profile)
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    step: AuthStep,
) -> LauncherResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LauncherError::auth(step, format!("HTTP {}: {}", status, body)));
    }
    response
        .json()
        .await
        .map_err(|e| LauncherError::auth(step, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    #[test]
    fn mojang_key_parses() {
        assert!(EntitlementVerifier::mojang().is_ok());
    }

    #[test]
    fn malformed_key_is_not_a_signature_failure() {
        assert!(matches!(
            EntitlementVerifier::rsa_pem(b"not a pem key"),
            Err(LauncherError::EntitlementKey(_))
        ));
    }

    #[test]
    fn verifier_rejects_foreign_signatures() {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &json!({"signerId": "x"}),
            &EncodingKey::from_secret(b"one"),
        )
        .unwrap();
        let good = EntitlementVerifier::new(DecodingKey::from_secret(b"one"), Algorithm::HS256);
        let bad = EntitlementVerifier::new(DecodingKey::from_secret(b"two"), Algorithm::HS256);
        assert!(good.verify(&token).is_ok());
        assert!(matches!(
            bad.verify(&token),
            Err(LauncherError::EntitlementSignature(_))
        ));
        assert!(EntitlementVerifier::mojang().unwrap().verify(&token).is_err());
    }

    #[test]
    fn account_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        assert!(MinecraftAccount::load(&path).unwrap().is_none());

        let account = MinecraftAccount {
            username: "Steve".into(),
            uuid: Some(Uuid::nil()),
            xbl_token: "xbl".into(),
            user_hash: "uhs".into(),
        };
        account.save(&path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["xbl_token"], "xbl");
        assert_eq!(raw["user_hash"], "uhs");

        let loaded = MinecraftAccount::load(&path).unwrap().unwrap();
        assert_eq!(loaded.username, "Steve");

        MinecraftAccount::forget(&path).unwrap();
        assert!(MinecraftAccount::load(&path).unwrap().is_none());
        MinecraftAccount::forget(&path).unwrap();
    }

    #[test]
    fn forget_reports_real_failures() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MinecraftAccount::forget(dir.path()),
            Err(LauncherError::Io { .. })
        ));
    }
}
