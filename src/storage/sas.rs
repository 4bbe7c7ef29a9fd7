//! Blob service shared access signatures.
//!
//! A service SAS is a set of query parameters appended to a blob URL. The
//! `sig` parameter is the HMAC-SHA256 (keyed by the account key) of a
//! newline-separated string built from the other parameters:
//!
//! ```text
//! sp \n st \n se \n /blob/<account>/<container>/<blob> \n si \n sip \n spr \n
//! sv \n sr \n snapshot \n ses \n rscc \n rscd \n rsce \n rscl \n rsct
//! ```
//!
//! Only read-only, expiry-bounded, https-only blob tokens are built here.
//! They start immediately and never name a stored access policy, so `st`
//! and `si` stay empty.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;

use crate::auth::SharedKeyCredential;
use crate::error::QuickstartResult;

/// Service version the signature layout belongs to.
pub const SAS_VERSION: &str = "2020-12-06";

/// Permissions granted by a blob SAS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobSasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
}

impl BlobSasPermissions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }
}

impl std::fmt::Display for BlobSasPermissions {
    /// Permission letters in the order the service requires (`racwd`).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (set, letter) in [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
        ] {
            if set {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// Builder for a service SAS scoped to a single blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSasBuilder {
    container: String,
    blob: String,
    permissions: BlobSasPermissions,
    expires_on: DateTime<Utc>,
}

impl BlobSasBuilder {
    /// A read-only token for `container/blob` that becomes valid immediately.
    pub fn new(
        container: impl Into<String>,
        blob: impl Into<String>,
        expires_on: DateTime<Utc>,
    ) -> Self {
        Self {
            container: container.into(),
            blob: blob.into(),
            permissions: BlobSasPermissions::read_only(),
            expires_on,
        }
    }

    /// The exact string whose HMAC becomes the `sig` parameter.
    pub fn string_to_sign(&self, account_name: &str) -> String {
        let permissions = self.permissions.to_string();
        let expiry = format_time(self.expires_on);
        let resource = format!("/blob/{account_name}/{}/{}", self.container, self.blob);
        [
            permissions.as_str(),
            "", // signed start
            expiry.as_str(),
            resource.as_str(),
            "", // signed identifier
            "", // signed ip
            "https",
            SAS_VERSION,
            "b",
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n")
    }

    /// Query parameters of the signed token, `sig` last.
    pub fn query_pairs(
        &self,
        credential: &SharedKeyCredential,
    ) -> QuickstartResult<Vec<(&'static str, String)>> {
        let signature = credential.sign(&self.string_to_sign(credential.account_name()))?;

        Ok(vec![
            ("sv", SAS_VERSION.to_string()),
            ("spr", "https".to_string()),
            ("se", format_time(self.expires_on)),
            ("sr", "b".to_string()),
            ("sp", self.permissions.to_string()),
            ("sig", signature),
        ])
    }

    /// Append the token to `blob_url`.
    pub fn sign_url(&self, blob_url: &Url, credential: &SharedKeyCredential) -> QuickstartResult<Url> {
        let mut url = blob_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in self.query_pairs(credential)? {
                query.append_pair(name, &value);
            }
        }
        Ok(url)
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use secrecy::SecretString;

    fn credential() -> SharedKeyCredential {
        SharedKeyCredential::new(
            "myaccount",
            SecretString::from("cXVpY2tzdGFydC10ZXN0LWtleQ==".to_string()),
        )
    }

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_permissions_display() {
        assert_eq!(BlobSasPermissions::read_only().to_string(), "r");
        let rw = BlobSasPermissions {
            read: true,
            write: true,
            ..Default::default()
        };
        assert_eq!(rw.to_string(), "rw");
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sas = BlobSasBuilder::new("input", "taskdata0.txt", expiry());
        let s = sas.string_to_sign("myaccount");
        let lines: Vec<&str> = s.split('\n').collect();
        assert_eq!(lines.len(), 16);
        assert_eq!(lines[0], "r");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "2024-01-01T13:00:00Z");
        assert_eq!(lines[3], "/blob/myaccount/input/taskdata0.txt");
        assert_eq!(lines[4], "");
        assert_eq!(lines[6], "https");
        assert_eq!(lines[7], SAS_VERSION);
        assert_eq!(lines[8], "b");
    }

    #[test]
    fn test_sign_url_is_read_only_and_expiring() {
        let blob_url =
            Url::parse("https://myaccount.blob.core.windows.net/input/taskdata0.txt").unwrap();
        let signed = BlobSasBuilder::new("input", "taskdata0.txt", expiry())
            .sign_url(&blob_url, &credential())
            .unwrap();

        let params: Vec<(String, String)> = signed.query_pairs().into_owned().collect();
        let get = |k: &str| params.iter().find(|(n, _)| n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("sp"), Some("r"));
        assert_eq!(get("sr"), Some("b"));
        assert_eq!(get("spr"), Some("https"));
        assert_eq!(get("se"), Some("2024-01-01T13:00:00Z"));
        assert!(get("sig").is_some());
        assert_eq!(signed.path(), "/input/taskdata0.txt");
    }

    #[test]
    fn test_signature_covers_expiry() {
        let cred = credential();
        let a = BlobSasBuilder::new("input", "a.txt", expiry())
            .query_pairs(&cred)
            .unwrap();
        let b = BlobSasBuilder::new("input", "a.txt", expiry() + chrono::TimeDelta::minutes(1))
            .query_pairs(&cred)
            .unwrap();
        assert_ne!(a.last(), b.last());
    }
}
