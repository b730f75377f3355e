//! Delivery of custom-resource responses
//!
//! CloudFormation waits on the pre-signed `ResponseURL` until it receives a
//! response document (or the resource times out after an hour). The URL is
//! signed without a content type, so the PUT must send an empty one.

use crate::custom_resource::CustomResourceResponse;
use crate::error::{ListenerPriorityError, Result};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for a single response delivery
const CALLBACK_TIMEOUT_SECS: u64 = 30;

/// PUTs response documents to CloudFormation
#[derive(Debug, Clone)]
pub struct CallbackResponder {
    client: reqwest::Client,
}

impl CallbackResponder {
    /// Create a responder with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(CALLBACK_TIMEOUT_SECS))
    }

    /// Create a responder with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Deliver `response` to `response_url`, returning the HTTP status
    ///
    /// A non-2xx answer is an error. Delivery is attempted once.
    pub async fn deliver(&self, response_url: &str, response: &CustomResourceResponse) -> Result<u16> {
        let url = parse_response_url(response_url)?;
        let body = serde_json::to_string(response)?;

        debug!(body = %body, "Response body");

        let reply = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?;

        let status = reply.status();
        info!(
            status = status.as_u16(),
            request_id = %response.request_id,
            "Delivered custom-resource response"
        );

        if !status.is_success() {
            return Err(ListenerPriorityError::callback(format!(
                "ResponseURL answered {}",
                status
            )));
        }

        Ok(status.as_u16())
    }
}

/// Validate the response URL before anything is sent
fn parse_response_url(response_url: &str) -> Result<reqwest::Url> {
    if response_url.trim().is_empty() {
        return Err(ListenerPriorityError::callback("event has no ResponseURL"));
    }

    let url = reqwest::Url::parse(response_url)
        .map_err(|e| ListenerPriorityError::callback(format!("invalid ResponseURL: {}", e)))?;

    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(ListenerPriorityError::callback(format!(
            "unsupported ResponseURL scheme: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_resource::{CustomResourceEvent, ResponseStatus};

    fn response() -> CustomResourceResponse {
        CustomResourceResponse::message(
            &CustomResourceEvent::default(),
            "stream",
            ResponseStatus::Success,
            "ok",
        )
    }

    #[test]
    fn test_parse_response_url() {
        assert!(parse_response_url("https://cloudformation.example.com/signed?x=1").is_ok());
        assert!(parse_response_url("").is_err());
        assert!(parse_response_url("not a url").is_err());
        assert!(parse_response_url("ftp://example.com/x").is_err());
    }

    #[tokio::test]
    async fn test_deliver_without_url_fails_before_sending() {
        let responder = CallbackResponder::new().unwrap();

        let err = responder.deliver("", &response()).await.unwrap_err();

        assert!(matches!(err, ListenerPriorityError::Callback(_)));
    }
}
