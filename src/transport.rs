//! RESTCONF transport
//!
//! Sends each request to `<host>/restconf/<path>` with a bearer token.
//! Nothing is retried. A DELETE of something already gone (404) counts as
//! applied.

use crate::config::DeviceConfig;
use reconcile::{Error, Method, Request, Transport};
use serde_json::Value;
use std::time::Duration;
use ureq::tls::TlsConfig;
use ureq::{Agent, RequestBuilder};

const YANG_JSON: &str = "application/yang-data+json";

pub struct RestTransport {
    agent: Agent,
    root: String,
    token: Option<String>,
}

impl RestTransport {
    pub fn new(device: &DeviceConfig) -> Self {
        let mut config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(device.timeout_secs)))
            .http_status_as_error(false);
        if !device.verify_tls {
            log::warn!("TLS verification disabled for {}", device.host);
            config = config.tls_config(TlsConfig::builder().disable_verification(true).build());
        }

        let token = device.token();
        if token.is_none() {
            log::warn!(
                "{} is not set; requests go out unauthenticated",
                device.token_env
            );
        }

        Self {
            agent: Agent::new_with_config(config.build()),
            root: device.restconf_root(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    fn authorize<B>(&self, builder: RequestBuilder<B>) -> RequestBuilder<B> {
        let builder = builder.header("Accept", YANG_JSON);
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }
}

impl Transport for RestTransport {
    fn send(&self, request: &Request) -> reconcile::Result<()> {
        let url = self.url(&request.path);
        log::debug!("{} {url}", request.method);

        let result = match request.method {
            Method::Patch => {
                let body = request
                    .data
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "{}".to_string());
                self.authorize(self.agent.patch(&url))
                    .header("Content-Type", YANG_JSON)
                    .send(body.as_str())
            }
            Method::Delete => self.authorize(self.agent.delete(&url)).call(),
        };
        let mut response = result.map_err(|e| Error::transport(format!("{request}: {e}"), None))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(());
        }
        if request.method == Method::Delete && status == 404 {
            log::debug!("{request}: already absent");
            return Ok(());
        }

        let body = response.body_mut().read_to_string().unwrap_or_default();
        Err(rejection(request, status, &body))
    }
}

/// Turn an error response into a transport error
///
/// RESTCONF reports failures as `ietf-restconf:errors`; the first
/// `error-message` is used when present, the raw body otherwise.
fn rejection(request: &Request, status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/ietf-restconf:errors/error/0/error-message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body.chars().take(200).collect()
            }
        });
    Error::transport(format!("{request}: {message}"), Some(status))
}
