//! Domain status checks and DNS fixes. No network calls are made.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::capability::{Capability, CapabilityHandler, Response, Slots, slot};
use crate::error::AgentError;
use crate::store::MemoryHandle;

/// Preference naming the user's own domain, used when a request names none.
pub const DEFAULT_DOMAIN: &str = "domain.default";

#[derive(Default)]
pub struct DomainCheckHandler;

impl DomainCheckHandler {
    pub fn new() -> Self {
        Self
    }
}

fn check(domain: &str) -> Response {
    let checks = json!({
        "dns_resolution": "skipped",
        "web_server": "skipped",
        "status": "unknown",
    });
    Response::simulated(format!(
        "Domain {domain} status: simulated check, no lookups were made"
    ))
    .with_payload(json!({ "domain": domain, "checks": checks }))
    .with_actions([
        format!("Starting domain check for {domain}"),
        "Would resolve DNS records".to_string(),
        "Would test the web server on port 80".to_string(),
    ])
}

fn fix(domain: &str, record_type: &str, value: &str) -> Response {
    Response::simulated(format!(
        "DNS record updated: {domain} {record_type} -> {value}"
    ))
    .with_payload(json!({
        "domain": domain,
        "record_type": record_type,
        "new_value": value,
        "propagation_time": "up to 24 hours",
    }))
    .with_actions([
        format!("Connecting to DNS provider for {domain}"),
        format!("Updating {record_type} record to {value}"),
        "DNS propagation initiated (may take up to 24 hours)".to_string(),
    ])
}

#[async_trait]
impl CapabilityHandler for DomainCheckHandler {
    fn capability(&self) -> Capability {
        Capability::DomainCheck
    }

    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        _timeout: Duration,
    ) -> Result<Response, AgentError> {
        let domain = match slot(slots, "domain") {
            Some(d) => d.to_string(),
            None => match memory.get_preference(DEFAULT_DOMAIN).await? {
                Some(d) => d,
                None => {
                    return Ok(Response::real(
                        "Which domain should I look at? Try \"check example.com\".",
                    ));
                }
            },
        };

        if slot(slots, "action") != Some("fix") {
            return Ok(check(&domain));
        }
        match (slot(slots, "record_type"), slot(slots, "value")) {
            (Some(record_type), Some(value)) => Ok(fix(&domain, record_type, value)),
            _ => Ok(Response::real(format!(
                "To fix DNS for {domain} I need a record type and a value, \
                 e.g. \"fix the A record for {domain} to 203.0.113.7\"."
            ))),
        }
    }
}
