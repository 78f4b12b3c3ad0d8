//! Port conventions shared by servers and clients.
//!
//! With HTTP on `P`, the line-stream server listens on `P+1` and the gRPC
//! server on `P+2`. Non-numeric ports (named services) get a suffix instead.

pub const DEFAULT_STREAM_PORT: &str = "9001";
pub const DEFAULT_RPC_PORT: &str = "9002";

/// Line-stream port for an HTTP port.
pub fn derive_stream_port(http_port: &str) -> String {
    derive(http_port, 1, "-stream", DEFAULT_STREAM_PORT)
}

/// gRPC port for an HTTP port.
pub fn derive_rpc_port(http_port: &str) -> String {
    derive(http_port, 2, "-rpc", DEFAULT_RPC_PORT)
}

fn derive(port: &str, offset: u16, suffix: &str, default: &str) -> String {
    let port = port.trim();
    if port.is_empty() {
        return default.to_string();
    }
    match port.parse::<u16>() {
        Ok(p) => match p.checked_add(offset) {
            Some(derived) => derived.to_string(),
            None => format!("{port}{suffix}"),
        },
        Err(_) => format!("{port}{suffix}"),
    }
}

/// Splits `host:port`, tolerating an `http://` scheme and a trailing path.
pub fn split_host_port(address: &str) -> Option<(&str, &str)> {
    let address = address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"))
        .unwrap_or(address);
    let authority = address.split('/').next()?;
    authority.rsplit_once(':')
}

/// Same host, port replaced by `derive(port)`.
pub fn with_derived_port(address: &str, derive: fn(&str) -> String) -> Option<String> {
    let (host, port) = split_host_port(address)?;
    Some(format!("{host}:{}", derive(port)))
}
