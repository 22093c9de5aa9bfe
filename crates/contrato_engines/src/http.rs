#![forbid(unsafe_code)]

use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "contrato/0.1";

pub fn build_http_agent(timeout_ms: u64, user_agent: &str) -> Result<ureq::Agent, String> {
    if timeout_ms == 0 {
        return Err("timeout must be > 0".to_string());
    }
    let timeout = Duration::from_millis(timeout_ms.max(100));
    Ok(ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .build())
}

pub fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

pub fn transport_error_kind(transport: &ureq::Transport) -> &'static str {
    classify_transport_error_kind(&format!("{:?} {}", transport.kind(), transport))
}
