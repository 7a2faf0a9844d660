//! Request signing for the CMQ HTTP gateway.
//!
//! The string to sign is `METHOD + host + path + "?" + k1=v1&k2=v2...` with
//! parameter names in bytewise order and `_` written as `.` in the names.
//! The signature is the base64 encoded HMAC of that string under the secret key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::error::CmqError;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Keyed hash used for the `Signature` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMethod {
    HmacSha1,
    #[default]
    HmacSha256,
}

impl SignMethod {
    /// Wire name sent as `SignatureMethod`
    pub fn as_str(&self) -> &'static str {
        match self {
            SignMethod::HmacSha1 => "HmacSHA1",
            SignMethod::HmacSha256 => "HmacSHA256",
        }
    }
}

impl std::fmt::Display for SignMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignMethod {
    type Err = CmqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hmacsha1" | "sha1" => Ok(SignMethod::HmacSha1),
            "hmacsha256" | "sha256" => Ok(SignMethod::HmacSha256),
            _ => Err(CmqError::UnsupportedSignMethod(s.to_string())),
        }
    }
}

/// Build the plaintext that gets signed
pub fn string_to_sign(
    method: &str,
    host: &str,
    path: &str,
    params: &BTreeMap<String, String>,
) -> String {
    let mut plain = String::with_capacity(64 + params.len() * 32);
    plain.push_str(method);
    plain.push_str(host);
    let path = match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    };
    plain.push_str(path);
    plain.push('?');

    // BTreeMap iterates in bytewise key order. The value is read back under
    // the dotted name, so an underscore key with no dotted twin signs empty.
    for (i, key) in params.keys().enumerate() {
        if i > 0 {
            plain.push('&');
        }
        let key = key.replace('_', ".");
        let value = params.get(&key).map(String::as_str).unwrap_or_default();
        plain.push_str(&key);
        plain.push('=');
        plain.push_str(value);
    }
    plain
}

/// HMAC the plaintext with the secret key and base64 encode the digest
pub fn sign(secret_key: &str, method: SignMethod, plaintext: &str) -> String {
    let digest = match method {
        SignMethod::HmacSha1 => {
            let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(plaintext.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        SignMethod::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(plaintext.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };
    STANDARD.encode(digest)
}

/// Signs requests for one credential pair
#[derive(Clone)]
pub struct Signer {
    secret_key: String,
    method: SignMethod,
}

impl Signer {
    pub fn new(secret_key: impl Into<String>, method: SignMethod) -> Self {
        Self {
            secret_key: secret_key.into(),
            method,
        }
    }

    pub fn method(&self) -> SignMethod {
        self.method
    }

    /// Compute the `Signature` value for a request
    pub fn signature(
        &self,
        http_method: &str,
        host: &str,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> String {
        let plain = string_to_sign(http_method, host, path, params);
        tracing::debug!(string_to_sign = %plain, "Signing request");
        sign(&self.secret_key, self.method, &plain)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("secret_key", &"***")
            .field("method", &self.method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_string_to_sign_sorted() {
        let p = params(&[
            ("queueName", "orders"),
            ("Action", "SendMessage"),
            ("Nonce", "42"),
        ]);
        let plain = string_to_sign("POST", "cmq.example.com", "/v2/index.php", &p);
        assert_eq!(
            plain,
            "POSTcmq.example.com/v2/index.php?Action=SendMessage&Nonce=42&queueName=orders"
        );
    }

    #[test]
    fn test_string_to_sign_empty_path_and_host() {
        let p = params(&[("Action", "QueryQueueRoute")]);
        assert_eq!(string_to_sign("GET", "", "", &p), "GET?Action=QueryQueueRoute");
    }

    #[test]
    fn test_string_to_sign_cuts_query_from_path() {
        let p = params(&[("a", "1")]);
        assert_eq!(
            string_to_sign("POST", "h", "/index.php?x=y", &p),
            "POSTh/index.php?a=1"
        );
    }

    #[test]
    fn test_string_to_sign_no_params() {
        let p = BTreeMap::new();
        assert_eq!(string_to_sign("POST", "h", "/", &p), "POSTh/?");
    }

    #[test]
    fn test_underscore_key_reads_dotted_value() {
        let p = params(&[("msg_tag", "a_b"), ("zone", "gz")]);
        assert_eq!(string_to_sign("POST", "h", "/", &p), "POSTh/?msg.tag=&zone=gz");

        let p = params(&[("msg.tag", "x"), ("msg_tag", "a_b")]);
        assert_eq!(
            string_to_sign("POST", "h", "/", &p),
            "POSTh/?msg.tag=x&msg.tag=x"
        );
    }

    #[test]
    fn test_indexed_params_sort_bytewise() {
        let p = params(&[("msgBody.10", "k"), ("msgBody.2", "c"), ("msgBody.0", "a")]);
        assert_eq!(
            string_to_sign("POST", "h", "/", &p),
            "POSTh/?msgBody.0=a&msgBody.10=k&msgBody.2=c"
        );
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        let sig = sign(
            "key",
            SignMethod::HmacSha256,
            "The quick brown fox jumps over the lazy dog",
        );
        assert_eq!(sig, "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }

    #[test]
    fn test_hmac_sha1_known_vector() {
        let sig = sign(
            "key",
            SignMethod::HmacSha1,
            "The quick brown fox jumps over the lazy dog",
        );
        assert_eq!(sig, "3nybhbi3iqa8ino29wqQcBydtNk=");
    }

    #[test]
    fn test_signature_lengths() {
        let p = params(&[("Action", "SendMessage")]);
        let sha1 = Signer::new("secret", SignMethod::HmacSha1).signature("POST", "h", "/", &p);
        let sha256 = Signer::new("secret", SignMethod::HmacSha256).signature("POST", "h", "/", &p);
        assert_eq!(sha1.len(), 28);
        assert_eq!(sha256.len(), 44);
    }

    #[test]
    fn test_sign_method_parse() {
        assert_eq!("HmacSHA1".parse::<SignMethod>().unwrap(), SignMethod::HmacSha1);
        assert_eq!("hmacsha256".parse::<SignMethod>().unwrap(), SignMethod::HmacSha256);
        assert!("md5".parse::<SignMethod>().is_err());
        assert_eq!(SignMethod::default().to_string(), "HmacSHA256");
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = Signer::new("top-secret", SignMethod::HmacSha256);
        assert!(!format!("{:?}", signer).contains("top-secret"));
    }

    proptest! {
        #[test]
        fn prop_signature_independent_of_insertion_order(
            entries in proptest::collection::hash_map("[a-zA-Z_.]{1,12}", "[ -~]{0,24}", 1..12)
        ) {
            let signer = Signer::new("k", SignMethod::HmacSha256);
            let mut pairs: Vec<(String, String)> = entries.into_iter().collect();

            let forward: BTreeMap<String, String> = pairs.iter().cloned().collect();
            pairs.reverse();
            let backward: BTreeMap<String, String> = pairs.iter().cloned().collect();
            let hashed: std::collections::HashMap<String, String> = pairs.into_iter().collect();
            let from_hash: BTreeMap<String, String> = hashed.into_iter().collect();

            let expected = signer.signature("POST", "h", "/", &forward);
            prop_assert_eq!(&expected, &signer.signature("POST", "h", "/", &backward));
            prop_assert_eq!(&expected, &signer.signature("POST", "h", "/", &from_hash));
        }
    }
}
