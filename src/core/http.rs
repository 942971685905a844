use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use reqwest::{Client, Response};

use crate::core::error::{LauncherError, LauncherResult};

pub const APP_USER_AGENT: &str = concat!("launcher-core/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(30))
        .build()
}

/// Turn a non-2xx response into [`LauncherError::DownloadFailed`].
pub fn ensure_success(response: Response) -> LauncherResult<Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::DownloadFailed {
            url: response.url().to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

/// GET `url` and decode the body as JSON.
pub async fn get_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> LauncherResult<T> {
    let response = ensure_success(client.get(url).send().await?)?;
    Ok(response.json().await?)
}
