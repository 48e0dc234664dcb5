use std::time::Duration;

use taskdeck_core::Credential;
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::error::ClientError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const CHANNEL_PATH: [&str; 3] = ["api", "agent", "ws"];

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: Url,
    pub request_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub max_missed_heartbeats: u32,
    pub backoff: BackoffPolicy,
    pub max_message_bytes: usize,
    pub subscriber_backlog: usize,
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            request_timeout: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            max_missed_heartbeats: 3,
            backoff: BackoffPolicy::default(),
            max_message_bytes: taskdeck_core::wire::DEFAULT_MAX_MESSAGE_BYTES,
            subscriber_backlog: 1024,
        }
    }

    pub fn parse(api_url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(api_url.trim())
            .map_err(|err| ClientError::InvalidUrl(format!("{api_url}: {err}")))?;
        match url.scheme() {
            "http" | "https" => Ok(Self::new(url)),
            other => Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {api_url}"
            ))),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `ws(s)://<host>/<base path>/api/agent/ws/<token>`
    pub fn channel_url(&self, credential: &Credential) -> Result<Url, ClientError> {
        let mut url = self.api_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "cannot derive channel url from scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl("cannot switch to websocket scheme".to_string()))?;
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl("api url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.extend(CHANNEL_PATH);
            segments.push(credential.expose());
        }
        Ok(url)
    }
}

/// Channel URL with the token path segment replaced, for logs.
pub fn redact_channel_url(url: &Url) -> String {
    let mut redacted = url.clone();
    if let Ok(mut segments) = redacted.path_segments_mut() {
        segments.pop().push("<token>");
    }
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_url_switches_scheme_and_appends_token() {
        let config = ClientConfig::parse("http://localhost:8000").unwrap();
        let credential = Credential::new("abc.def").unwrap();
        let url = config.channel_url(&credential).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/agent/ws/abc.def");
        assert_eq!(
            redact_channel_url(&url),
            "ws://localhost:8000/api/agent/ws/%3Ctoken%3E"
        );
    }

    #[test]
    fn channel_url_keeps_base_path_and_uses_wss() {
        let config = ClientConfig::parse("https://ops.example.com/console/").unwrap();
        let credential = Credential::new("t/k").unwrap();
        let url = config.channel_url(&credential).unwrap();
        assert_eq!(url.as_str(), "wss://ops.example.com/console/api/agent/ws/t%2Fk");
        assert_eq!(
            config.endpoint("/api/agent/execute"),
            "https://ops.example.com/console/api/agent/execute"
        );
    }

    #[test]
    fn rejects_non_http_api_urls() {
        assert!(ClientConfig::parse("ftp://example.com").is_err());
        assert!(ClientConfig::parse("not a url").is_err());
    }
}
