//! Shared Key request signing.
//!
//! Both services authenticate control-plane requests the same way: the
//! client builds a canonical "string to sign" from the request, computes
//! `HMAC-SHA256` over it with the base64-decoded account key and sends
//!
//! ```text
//! Authorization: SharedKey <account>:<base64 signature>
//! ```
//!
//! The two services differ only in which header prefix takes part in the
//! canonicalized headers (`x-ms-` for storage, `ocp-` for batch). The same
//! HMAC primitive signs blob service SAS tokens in [`crate::storage::sas`].

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, Request, Url};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::{QuickstartError, QuickstartResult};

type HmacSha256 = Hmac<Sha256>;

/// Canonicalized header prefix used by the storage service.
pub const STORAGE_HEADER_PREFIX: &str = "x-ms-";

/// Canonicalized header prefix used by the batch service.
pub const BATCH_HEADER_PREFIX: &str = "ocp-";

/// Standard headers, in the order they appear in the string to sign.
const SIGNED_STANDARD_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Decode an account key exactly as signing uses it.
pub fn decode_account_key(key: &SecretString) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(key.expose_secret())
}

/// An account name paired with its symmetric account key.
#[derive(Debug, Clone)]
pub struct SharedKeyCredential {
    account_name: String,
    account_key: SecretString,
}

impl SharedKeyCredential {
    pub fn new(account_name: impl Into<String>, account_key: SecretString) -> Self {
        Self {
            account_name: account_name.into(),
            account_key,
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Compute the base64 HMAC-SHA256 signature of `string_to_sign`.
    pub fn sign(&self, string_to_sign: &str) -> QuickstartResult<String> {
        let key = decode_account_key(&self.account_key).map_err(|e| {
            QuickstartError::Signing(format!(
                "account key for `{}` is not valid base64: {e}",
                self.account_name
            ))
        })?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| QuickstartError::Signing(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Sign a fully built request in place by adding its `Authorization` header.
    ///
    /// The request must already carry every header that takes part in the
    /// signature, including `Content-Length` when it has a body.
    pub fn sign_request(&self, request: &mut Request, header_prefix: &str) -> QuickstartResult<()> {
        let string_to_sign = string_to_sign(
            request.method(),
            request.headers(),
            request.url(),
            &self.account_name,
            header_prefix,
        );
        let signature = self.sign(&string_to_sign)?;
        let value = HeaderValue::from_str(&format!("SharedKey {}:{signature}", self.account_name))
            .map_err(|e| QuickstartError::Signing(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Build the Shared Key string to sign for a request.
pub fn string_to_sign(
    method: &Method,
    headers: &HeaderMap,
    url: &Url,
    account_name: &str,
    header_prefix: &str,
) -> String {
    let mut out = String::new();
    out.push_str(method.as_str());
    out.push('\n');
    for name in SIGNED_STANDARD_HEADERS {
        let value = header_str(headers, name);
        // A zero length is signed as an empty line.
        if name == "content-length" && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(&canonicalized_headers(headers, header_prefix));
    out.push_str(&canonicalized_resource(account_name, url));
    out
}

/// Service-specific headers, lowercased, sorted, one `name:value\n` per line.
pub fn canonicalized_headers(headers: &HeaderMap, prefix: &str) -> String {
    let mut entries: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(prefix))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().trim().to_string(),
            )
        })
        .collect();
    entries.sort();

    let mut out = String::new();
    for (name, value) in entries {
        out.push_str(&name);
        out.push(':');
        out.push_str(&value);
        out.push('\n');
    }
    out
}

/// `/<account><path>` followed by each query parameter as `\nname:value`,
/// names lowercased and sorted, repeated names joined with commas.
pub fn canonicalized_resource(account_name: &str, url: &Url) -> String {
    let mut out = format!("/{account_name}{}", url.path());

    let mut params: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in url.query_pairs() {
        let name = name.to_lowercase();
        match params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value.into_owned()),
            None => params.push((name, vec![value.into_owned()])),
        }
    }
    params.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }
    out
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

    fn credential() -> SharedKeyCredential {
        // base64("quickstart-test-key")
        SharedKeyCredential::new(
            "myaccount",
            SecretString::from("cXVpY2tzdGFydC10ZXN0LWtleQ==".to_string()),
        )
    }

    #[test]
    fn test_canonicalized_resource_sorts_query() {
        let url = Url::parse("https://myaccount.blob.core.windows.net/input?restype=container&Comp=list")
            .unwrap();
        assert_eq!(
            canonicalized_resource("myaccount", &url),
            "/myaccount/input\ncomp:list\nrestype:container"
        );
    }

    #[test]
    fn test_canonicalized_headers_filters_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        headers.insert("x-ms-date", HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"));
        headers.insert("ocp-date", HeaderValue::from_static("ignored"));
        assert_eq!(
            canonicalized_headers(&headers, STORAGE_HEADER_PREFIX),
            "x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\nx-ms-version:2021-08-06\n"
        );
    }

    #[test]
    fn test_string_to_sign_layout() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("ocp-date", HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"));
        let url = Url::parse("https://acct.westus.batch.azure.com/pools?api-version=2023-05-01.17.0")
            .unwrap();

        let s = string_to_sign(&Method::POST, &headers, &url, "acct", BATCH_HEADER_PREFIX);
        assert_eq!(
            s,
            "POST\n\n\n\n\napplication/json\n\n\n\n\n\n\n\
             ocp-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
             /acct/pools\napi-version:2023-05-01.17.0"
        );
    }

    #[test]
    fn test_sign_is_deterministic_sha256() {
        let cred = credential();
        let a = cred.sign("hello").unwrap();
        let b = cred.sign("hello").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, cred.sign("world").unwrap());
        assert_eq!(STANDARD.decode(&a).unwrap().len(), 32);
    }

    #[test]
    fn test_sign_rejects_non_base64_key() {
        let cred = SharedKeyCredential::new("acct", SecretString::from("not base64!".to_string()));
        assert!(matches!(cred.sign("x"), Err(QuickstartError::Signing(_))));
    }

    #[test]
    fn test_sign_request_sets_authorization() {
        let client = reqwest::Client::new();
        let mut request = client
            .get("https://myaccount.blob.core.windows.net/input?restype=container")
            .header("x-ms-version", "2021-08-06")
            .build()
            .unwrap();
        credential()
            .sign_request(&mut request, STORAGE_HEADER_PREFIX)
            .unwrap();
        let auth = request.headers()[AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("SharedKey myaccount:"));
    }
}
