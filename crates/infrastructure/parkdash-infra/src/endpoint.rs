use parkdash_config::{ACTION_PATH, DEFAULT_HOST, DEFAULT_WS_PATH};

/// Builds the controller's WebSocket URL for a `host[:port]`. A `https://` or
/// `wss://` prefix selects a secure socket.
pub fn derive_endpoint(host: &str) -> String {
    let trimmed = host.trim();
    let scheme = if trimmed.starts_with("https://") || trimmed.starts_with("wss://") {
        "wss"
    } else {
        "ws"
    };
    format!("{scheme}://{}{DEFAULT_WS_PATH}", trim_host(host))
}

/// An explicit endpoint wins; otherwise one is derived from `host`, falling
/// back to the default host.
pub fn resolve_endpoint(endpoint: Option<&str>, host: Option<&str>) -> String {
    match endpoint {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => derive_endpoint(host.unwrap_or(DEFAULT_HOST)),
    }
}

/// REST URL for slot actions on `host`. A full `http(s)://` base is kept as is.
pub fn action_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}{ACTION_PATH}")
    } else {
        format!("http://{}{ACTION_PATH}", trim_host(host))
    }
}

fn trim_host(host: &str) -> &str {
    let host = host.trim();
    let host = ["wss://", "ws://", "https://", "http://"]
        .iter()
        .find_map(|scheme| host.strip_prefix(scheme))
        .unwrap_or(host);
    host.trim_end_matches('/')
}
