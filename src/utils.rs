use crate::error::{ClientError, ClientResult};
use crate::peer::types::ServerConfig;
use rand::Rng;
use url::Url;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Функция для добавления схемы протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    // Если url уже начинается с "turn:" или "stun:", возвращаем как есть
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
    {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

/// WebSocket URL бэкенда относительно origin страницы: wss только для https
pub fn signaling_url(origin: &str, relative_path: &str) -> ClientResult<String> {
    let parsed = Url::parse(origin)
        .map_err(|e| ClientError::config(format!("invalid origin '{}': {}", origin, e)))?;

    let scheme = match parsed.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ClientError::config(format!(
                "origin scheme must be http or https, got '{}'",
                other
            )))
        }
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| ClientError::config(format!("origin '{}' has no host", origin)))?;

    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok(format!(
        "{}://{}/{}",
        scheme,
        authority,
        relative_path.trim_start_matches('/')
    ))
}
