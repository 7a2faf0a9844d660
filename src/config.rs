use anyhow::{Context, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CmqError;
use crate::signer::SignMethod;

/// HTTP verb used to carry the request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    /// Parameters in the URL query string
    Get,
    /// Parameters in a form encoded body
    #[default]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = CmqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            _ => Err(CmqError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Everything a `CmqClient` needs to reach one gateway
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Gateway endpoint, ex: https://cmq-gz.public.tencenttdmq.com
    pub uri: String,
    pub secret_id: String,
    pub secret_key: String,
    /// Privatized deployments may authenticate by app id instead of signature
    pub app_id: u64,
    pub method: HttpMethod,
    pub sign_method: SignMethod,
    pub timeout: Duration,
    /// Skip server certificate verification
    pub insecure: bool,
    /// Reuse connections between requests
    pub keepalive: bool,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            secret_id: String::new(),
            secret_key: String::new(),
            app_id: 0,
            method: HttpMethod::Post,
            sign_method: SignMethod::HmacSha256,
            timeout: Duration::from_secs(5),
            insecure: false,
            keepalive: false,
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(
        uri: impl Into<String>,
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            ..Default::default()
        }
    }

    /// Whether requests carry `appId` instead of a signature
    pub fn uses_app_id(&self) -> bool {
        self.app_id > 0 && self.secret_id.is_empty() && self.secret_key.is_empty()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            anyhow::bail!("endpoint uri is required (use --uri or set CMQ_URI env var)");
        }
        let url = url::Url::parse(&self.uri)
            .with_context(|| format!("invalid endpoint uri: {}", self.uri))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("endpoint uri must be http or https: {}", self.uri);
        }
        if !self.uses_app_id() && (self.secret_id.is_empty() || self.secret_key.is_empty()) {
            anyhow::bail!(
                "secret id and secret key are required (use --sid/--key or set CMQ_SECRET_ID/CMQ_SECRET_KEY env vars)"
            );
        }
        if self.timeout.is_zero() {
            anyhow::bail!("timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Connection flags shared by the CLI and the perf tool
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Secret id
    #[arg(long = "sid", short = 'i', global = true, env = "CMQ_SECRET_ID", default_value = "")]
    pub secret_id: String,

    /// Secret key
    #[arg(long = "key", short = 'k', global = true, env = "CMQ_SECRET_KEY", default_value = "")]
    pub secret_key: String,

    /// App id for privatized deployments (used when no secrets are given)
    #[arg(long, global = true, env = "CMQ_APP_ID", default_value = "0")]
    pub app_id: u64,

    /// Request method: GET or POST
    #[arg(long, global = true, env = "CMQ_METHOD", default_value = "POST")]
    pub method: String,

    /// Signature method: HmacSHA1 or HmacSHA256
    #[arg(long, global = true, env = "CMQ_SIGN_METHOD", default_value = "HmacSHA256")]
    pub sign_method: String,

    /// Client timeout in seconds
    #[arg(long, global = true, env = "CMQ_TIMEOUT", default_value = "5")]
    pub timeout: u64,

    /// Skip verification of the server's certificate
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Keep connections alive between requests
    #[arg(long, global = true)]
    pub keepalive: bool,

    /// Extra header as 'Name: value', repeat to set several
    #[arg(short = 'H', long = "header", global = true)]
    pub headers: Vec<String>,
}

impl ConnectionArgs {
    /// Build a client configuration for one endpoint
    pub fn client_config(&self, uri: &str) -> Result<ClientConfig> {
        let mut headers = BTreeMap::new();
        for h in &self.headers {
            match parse_header(h) {
                Some((name, value)) => {
                    headers.insert(name, value);
                }
                None => tracing::warn!(header = %h, "Ignoring malformed header"),
            }
        }

        let config = ClientConfig {
            uri: uri.to_string(),
            secret_id: self.secret_id.clone(),
            secret_key: self.secret_key.clone(),
            app_id: self.app_id,
            method: self.method.parse()?,
            sign_method: self.sign_method.parse()?,
            timeout: Duration::from_secs(self.timeout),
            insecure: self.insecure,
            keepalive: self.keepalive,
            headers,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Split a 'Name: value' header argument
pub fn parse_header(s: &str) -> Option<(String, String)> {
    let (name, value) = s.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Install the tracing subscriber, `-d` forces debug level
pub fn init_logging(log_level: &str, debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else {
        log_level.to_lowercase()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConnectionArgs {
        ConnectionArgs {
            secret_id: "AKIDtest".to_string(),
            secret_key: "secret".to_string(),
            app_id: 0,
            method: "post".to_string(),
            sign_method: "HmacSHA1".to_string(),
            timeout: 7,
            insecure: true,
            keepalive: false,
            headers: vec!["X-Trace: abc".to_string(), "broken".to_string()],
        }
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/cases/cases.json");
        assert!(path.to_string_lossy().contains("cases/cases.json"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Host: cmq.internal"),
            Some(("Host".to_string(), "cmq.internal".to_string()))
        );
        assert_eq!(
            parse_header("X-Url:http://a:1"),
            Some(("X-Url".to_string(), "http://a:1".to_string()))
        );
        assert_eq!(parse_header("no-colon"), None);
        assert_eq!(parse_header(": value"), None);
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("PUT".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_client_config_from_args() {
        let config = args().client_config("https://cmq.example.com").unwrap();
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.sign_method, SignMethod::HmacSha1);
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert!(config.insecure);
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.headers["X-Trace"], "abc");
    }

    #[test]
    fn test_client_config_rejects_bad_method() {
        let mut a = args();
        a.method = "DELETE".to_string();
        assert!(a.client_config("https://cmq.example.com").is_err());
    }

    #[test]
    fn test_validate_requires_uri_and_credentials() {
        assert!(ClientConfig::default().validate().is_err());
        assert!(ClientConfig::new("ftp://x", "id", "key").validate().is_err());
        assert!(ClientConfig::new("https://x", "", "").validate().is_err());
        assert!(ClientConfig::new("https://x", "id", "key").validate().is_ok());
    }

    #[test]
    fn test_app_id_replaces_credentials() {
        let mut config = ClientConfig::new("http://gateway.local", "", "");
        config.app_id = 1300000000;
        assert!(config.uses_app_id());
        assert!(config.validate().is_ok());

        config.secret_id = "AKID".to_string();
        assert!(!config.uses_app_id());
    }
}
