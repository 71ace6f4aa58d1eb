use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Deserialize)]
struct OriginBody {
    origin: String,
}

/// Asks public "what is my IP" services for the current exit address
#[derive(Debug, Clone)]
pub struct PublicIpChecker {
    services: Vec<String>,
}

impl PublicIpChecker {
    pub fn new(services: Vec<String>) -> Self {
        Self { services }
    }

    /// The exit IP seen through `client`, from the first service that answers
    pub async fn current_ip(&self, client: &Client) -> Option<String> {
        for service in &self.services {
            match check_service(client, service).await {
                Ok(Some(ip)) => {
                    tracing::debug!("IP check via {} returned {}", service, ip);
                    return Some(ip);
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("IP check via {} failed: {}", service, e);
                }
            }
        }

        tracing::warn!("Could not determine public IP");
        None
    }
}

async fn check_service(client: &Client, service: &str) -> Result<Option<String>, reqwest::Error> {
    let response = client.get(service).send().await?;
    if response.status() != StatusCode::OK {
        return Ok(None);
    }

    let body = response.text().await?;
    Ok(parse_ip_response(&body))
}

/// Extracts the address from a plain-text or httpbin-style `{"origin": ...}` body
pub fn parse_ip_response(body: &str) -> Option<String> {
    let trimmed = body.trim();
    let ip = match serde_json::from_str::<OriginBody>(trimmed) {
        Ok(parsed) => parsed.origin.trim().to_string(),
        Err(_) => trimmed.to_string(),
    };

    if ip.is_empty() {
        None
    } else {
        Some(ip)
    }
}
