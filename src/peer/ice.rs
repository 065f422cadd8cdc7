use crate::error::{ClientError, ClientResult};
use crate::peer::types::ServerConfig;
use crate::utils::add_ice_url_scheme;
use tracing::{info, warn};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;

/// Серверы по умолчанию, как у веб-клиента
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        id: "default-stun".into(),
        r#type: "stun".into(),
        url: "stun:stun.l.google.com:19302".into(),
        username: None,
        credential: None,
    }]
}

/// Валидация пользовательских ICE серверов
pub fn validate_ice_servers(servers: &[ServerConfig]) -> ClientResult<()> {
    for server in servers {
        if server.url.is_empty() {
            return Err(ClientError::config("ICE server URL cannot be empty"));
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(ClientError::config(format!(
                "TURN server {} requires username and credential",
                server.url
            )));
        }
    }
    Ok(())
}

/// Разбор `--ice-server`: `url` или `url,username,credential`
pub fn parse_ice_server(spec: &str, index: usize) -> ClientResult<ServerConfig> {
    let mut parts = spec.split(',').map(str::trim);
    let url = parts.next().unwrap_or_default().to_string();
    let username = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    let credential = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    if parts.next().is_some() {
        return Err(ClientError::config(format!(
            "ICE server '{}' must be url[,username,credential]",
            spec
        )));
    }

    let r#type = if url.starts_with("turn:") || url.starts_with("turns:") || username.is_some() {
        "turn"
    } else {
        "stun"
    };
    Ok(ServerConfig {
        id: format!("user-{}", index),
        r#type: r#type.into(),
        url,
        username,
        credential,
    })
}

pub fn to_rtc_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: to_rtc_ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

/// Считает кандидатов в финальном SDP (кандидаты едут внутри описания, без trickle)
pub fn analyze_candidates(sdp: &str) -> CandidateSummary {
    let mut summary = CandidateSummary::default();

    for line in sdp.lines().filter(|l| l.starts_with("a=candidate:")) {
        if line.contains("typ host") {
            summary.host += 1;
        } else if line.contains("typ srflx") {
            summary.srflx += 1;
        } else if line.contains("typ relay") {
            summary.relay += 1;
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        summary.host, summary.srflx, summary.relay
    );
    if summary.host + summary.srflx + summary.relay == 0 {
        warn!("Final description carries no ICE candidates, connection will likely fail");
    }
    summary
}
