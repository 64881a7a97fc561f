//! Startup probes: verifier reachability and device address discovery.

use serde::Deserialize;

/// Public-address lookup service.
pub const PUBLIC_IP_URL: &str = "https://api.ipify.org?format=json";

/// Shape of the verifier's root endpoint.
#[derive(Debug, Deserialize)]
struct RootResponse {
    #[serde(default)]
    mensaje: String,
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Ping the verifier's root endpoint and return its greeting.
///
/// Returns `Err(reason)` when the service is offline or answers with an
/// error status.
pub fn verifier_status(base_url: &str) -> Result<String, String> {
    let url = format!("{}/", base_url.trim_end_matches('/'));
    let response = reqwest::blocking::get(&url)
        .map_err(|e| format!("verifier unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("verifier returned HTTP {}", response.status()));
    }

    let root: RootResponse = response
        .json()
        .map_err(|e| format!("Failed to parse verifier greeting: {}", e))?;
    Ok(root.mensaje)
}

/// Look up the public address this access point reaches the verifier from.
pub fn resolve_public_ip() -> Result<String, String> {
    resolve_ip_from(PUBLIC_IP_URL)
}

pub(crate) fn resolve_ip_from(url: &str) -> Result<String, String> {
    let response = reqwest::blocking::get(url)
        .map_err(|e| format!("address lookup failed at {}: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!("address lookup returned HTTP {}", response.status()));
    }
    let body: IpResponse = response
        .json()
        .map_err(|e| format!("Failed to parse address lookup response: {}", e))?;
    let ip = body.ip.trim().to_string();
    if ip.is_empty() {
        return Err("address lookup returned an empty address".to_string());
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[test]
    fn offline_verifier_is_reported() {
        let err = verifier_status(&closed_port_url()).unwrap_err();
        assert!(err.contains("unreachable"));
    }

    #[test]
    fn failed_lookup_is_reported() {
        let err = resolve_ip_from(&closed_port_url()).unwrap_err();
        assert!(err.contains("address lookup failed"));
    }
}
