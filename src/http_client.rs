use rand::Rng;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Request};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::config::{ClientConfig, HttpMethod};
use crate::error::{CmqError, Result};
use crate::models::CmqResult;
use crate::signer::Signer;

/// Request parameters, kept in key order
pub type Params = BTreeMap<String, String>;

/// Value of the `RequestClient` parameter
pub const REQUEST_CLIENT: &str = concat!("SDK_RUST_", env!("CARGO_PKG_VERSION"));

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP client for one CMQ gateway endpoint
pub struct CmqClient {
    /// Underlying reqwest client
    client: Client,

    config: ClientConfig,

    /// Parsed endpoint
    url: Url,

    /// Host and path as they appear in the string to sign
    host: String,
    path: String,

    signer: Signer,

    /// Sent as `clientRequestId`, 0 disables it
    id: u64,
}

impl CmqClient {
    /// Create a new client for the configured endpoint
    pub fn new(config: ClientConfig) -> Result<Self> {
        let url = Url::parse(&config.uri).map_err(|source| CmqError::InvalidUri {
            uri: config.uri.clone(),
            source,
        })?;
        let host = signing_host(&config.uri).to_string();
        let path = signing_path(&config.uri, &url);

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure);
        if !config.keepalive {
            builder = builder.pool_max_idle_per_host(0);
        }
        let client = builder.build().map_err(CmqError::ClientBuild)?;

        let signer = Signer::new(config.secret_key.clone(), config.sign_method);
        let id = rand::thread_rng().gen_range(1..=u64::from(u32::MAX));

        tracing::debug!(
            uri = %config.uri,
            method = %config.method,
            sign_method = %config.sign_method,
            client_request_id = id,
            "CMQ client created"
        );

        Ok(Self {
            client,
            config,
            url,
            host,
            path,
            signer,
            id,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn uri(&self) -> &str {
        &self.config.uri
    }

    /// The `clientRequestId` attached to every request
    pub fn client_request_id(&self) -> u64 {
        self.id
    }

    pub fn set_client_request_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Execute an action and decode the typed response
    pub async fn call<T: CmqResult>(&self, params: Params) -> Result<T> {
        self.call_with_timeout(params, None).await
    }

    /// Same as `call`, optionally overriding the client timeout for this request
    pub async fn call_with_timeout<T: CmqResult>(
        &self,
        mut params: Params,
        timeout: Option<Duration>,
    ) -> Result<T> {
        self.prepare_params(&mut params);
        let request = self.build_request(&params, timeout)?;

        let action = params.get("Action").cloned().unwrap_or_default();
        tracing::debug!(curl = %curl_line(&request), "Sending CMQ request");

        let response = self.client.execute(request).await.map_err(|e| {
            let err = CmqError::transport(e);
            tracing::warn!(
                action = %action,
                uri = %self.config.uri,
                error = %err,
                "CMQ request failed"
            );
            err
        })?;

        let status = response.status();
        let raw = response.text().await.map_err(CmqError::transport)?;
        tracing::debug!(status = status.as_u16(), response = %raw, "Received CMQ response");

        let mut result: T = serde_json::from_str(&raw).map_err(|source| CmqError::Decode {
            raw: raw.clone(),
            source,
        })?;
        let envelope = result.envelope_mut();
        envelope.status = status.as_u16();
        envelope.raw = raw;

        if !result.is_success() {
            tracing::debug!(
                action = %action,
                code = result.code(),
                message = %result.message(),
                request_id = %result.request_id(),
                "CMQ business error"
            );
        }
        Ok(result)
    }

    /// Add protocol metadata and, unless app id auth is used, the signature
    pub fn prepare_params(&self, params: &mut Params) {
        params.insert("RequestClient".to_string(), REQUEST_CLIENT.to_string());
        if self.id > 0 {
            params.insert("clientRequestId".to_string(), self.id.to_string());
        }

        if self.config.uses_app_id() {
            params.insert("appId".to_string(), self.config.app_id.to_string());
            return;
        }

        let nonce: u32 = rand::thread_rng().gen();
        params.insert("SecretId".to_string(), self.config.secret_id.clone());
        params.insert(
            "SignatureMethod".to_string(),
            self.signer.method().as_str().to_string(),
        );
        params.insert("Nonce".to_string(), nonce.to_string());
        params.insert(
            "Timestamp".to_string(),
            chrono::Utc::now().timestamp().to_string(),
        );
        let signature = self.signer.signature(
            self.config.method.as_str(),
            &self.host,
            &self.path,
            params,
        );
        params.insert("Signature".to_string(), signature);
    }

    /// Put parameters in the GET query or the POST body, values unescaped
    pub fn build_request(&self, params: &Params, timeout: Option<Duration>) -> Result<Request> {
        let encoded = encode_params(params);

        let mut builder = match self.config.method {
            HttpMethod::Get => {
                let mut url = self.url.clone();
                url.set_query(Some(&encoded));
                self.client.get(url)
            }
            HttpMethod::Post => self.client.post(self.url.clone()).body(encoded),
        };
        builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);

        for (name, value) in &self.config.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!(header = %name, "Skipping invalid header"),
            }
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder.build().map_err(CmqError::transport)
    }

    /// Long polling must outlive the wait, extend the timeout past it
    pub fn polling_timeout(&self, wait_seconds: u64) -> Option<Duration> {
        let wait = Duration::from_secs(wait_seconds);
        if wait >= self.config.timeout {
            Some(wait + Duration::from_secs(1))
        } else {
            None
        }
    }
}

/// `k=v` pairs in key order joined by `&`, values sent as they are
///
/// The gateway verifies the signature against the raw values, so nothing
/// is percent-encoded here.
pub fn encode_params(params: &Params) -> String {
    let mut out = String::with_capacity(params.len() * 32);
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

/// Authority as written in the URI and whatever follows it
fn split_authority(uri: &str) -> (&str, &str) {
    let rest = uri.split_once("://").map(|(_, r)| r).unwrap_or(uri);
    let end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    rest.split_at(end)
}

/// Host used in the string to sign, byte for byte as configured
fn signing_host(uri: &str) -> &str {
    let (authority, _) = split_authority(uri);
    authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority)
}

/// Path used in the string to sign: empty when the URI has none
fn signing_path(uri: &str, url: &Url) -> String {
    let (_, tail) = split_authority(uri);
    if tail.starts_with('/') {
        url.path().to_string()
    } else {
        String::new()
    }
}

fn curl_line(request: &Request) -> String {
    let mut line = format!("curl -i -X {} '{}'", request.method(), request.url());
    if let Some(body) = request.body().and_then(|b| b.as_bytes()) {
        line.push_str(&format!(" -d '{}'", String::from_utf8_lossy(body)));
    }
    line
}
