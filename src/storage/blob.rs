//! Blob REST API client.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::auth::{STORAGE_HEADER_PREFIX, SharedKeyCredential};
use crate::config::StorageCredentials;
use crate::error::{QuickstartError, QuickstartResult, Service, truncate_body};
use crate::outcome::{CreateOutcome, DeleteOutcome};
use crate::storage::sas::BlobSasBuilder;
use crate::storage::{
    ContainerHandle, InputFileReference, StorageGateway, blob_name_for, sas_expiry,
};

/// Storage service REST version sent with every request.
pub const STORAGE_API_VERSION: &str = "2021-08-06";

const CONTAINER_EXISTS: &str = "ContainerAlreadyExists";
const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";

/// How requests to the storage account are authorized.
#[derive(Debug, Clone)]
pub enum StorageAuth {
    /// Account name and key. Required for issuing signed URLs.
    SharedKey(SharedKeyCredential),
    /// An OAuth bearer token (managed identity, service principal).
    BearerToken(SecretString),
}

/// [`StorageGateway`] over the Blob REST API.
#[derive(Debug, Clone)]
pub struct BlobServiceClient {
    http: Client,
    endpoint: Url,
    auth: StorageAuth,
}

impl BlobServiceClient {
    /// Client for `https://<account>.blob.core.windows.net`.
    pub fn new(account_name: &str, auth: StorageAuth) -> QuickstartResult<Self> {
        let endpoint = Url::parse(&format!("https://{account_name}.blob.core.windows.net/"))
            .map_err(|e| QuickstartError::Decode(format!("invalid storage endpoint: {e}")))?;
        Ok(Self::with_endpoint(endpoint, auth))
    }

    /// Client for an explicit endpoint, e.g. a storage emulator.
    pub fn with_endpoint(endpoint: Url, auth: StorageAuth) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            auth,
        }
    }

    pub fn from_credentials(credentials: &StorageCredentials) -> QuickstartResult<Self> {
        let credential = SharedKeyCredential::new(
            credentials.account_name.clone(),
            credentials.account_key.clone(),
        );
        Self::new(&credentials.account_name, StorageAuth::SharedKey(credential))
    }

    /// Whether this connection can sign blob URLs.
    pub fn can_generate_sas(&self) -> bool {
        matches!(self.auth, StorageAuth::SharedKey(_))
    }

    fn resource_url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn container_url(&self, container: &str) -> Url {
        let mut url = self.resource_url(&[container]);
        url.query_pairs_mut().append_pair("restype", "container");
        url
    }

    fn blob_url(&self, container: &str, blob: &str) -> Url {
        self.resource_url(&[container, blob])
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        extra_headers: HeaderMap,
        body: Vec<u8>,
    ) -> QuickstartResult<Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut request = self
            .http
            .request(method, url)
            .headers(extra_headers)
            .header("x-ms-date", date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .build()?;

        match &self.auth {
            StorageAuth::SharedKey(credential) => {
                credential.sign_request(&mut request, STORAGE_HEADER_PREFIX)?
            }
            StorageAuth::BearerToken(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .map_err(|e| QuickstartError::authorization(e.to_string()))?;
                request
                    .headers_mut()
                    .insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        debug!(method = %request.method(), url = %request.url().path(), "Sending storage request");
        Ok(self.http.execute(request).await?)
    }

    fn sas_credential(&self) -> QuickstartResult<&SharedKeyCredential> {
        match &self.auth {
            StorageAuth::SharedKey(credential) => Ok(credential),
            StorageAuth::BearerToken(_) => Err(QuickstartError::authorization(
                "blob client must be authorized with shared key credentials to create a service SAS",
            )),
        }
    }
}

/// Error code the storage service reports in `x-ms-error-code`.
fn storage_error_code(response: &Response) -> Option<String> {
    response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn storage_error(response: Response) -> QuickstartError {
    let status = response.status().as_u16();
    let code = storage_error_code(&response).unwrap_or_else(|| "Unknown".to_string());
    let message = truncate_body(response.text().await.unwrap_or_default());
    QuickstartError::Service {
        service: Service::Storage,
        status,
        code,
        message,
    }
}

#[async_trait]
impl StorageGateway for BlobServiceClient {
    async fn ensure_container(
        &self,
        name: &str,
    ) -> QuickstartResult<(ContainerHandle, CreateOutcome)> {
        let response = self
            .send(Method::PUT, self.container_url(name), HeaderMap::new(), Vec::new())
            .await?;
        let code = storage_error_code(&response);
        match CreateOutcome::classify(response.status().as_u16(), code.as_deref(), CONTAINER_EXISTS) {
            Some(outcome) => Ok((ContainerHandle::new(name), outcome)),
            None => Err(storage_error(response).await),
        }
    }

    async fn upload_file(
        &self,
        container: &ContainerHandle,
        local_path: &Path,
    ) -> QuickstartResult<InputFileReference> {
        let credential = self.sas_credential()?;
        let blob_name = blob_name_for(local_path)?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| QuickstartError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));

        let size = bytes.len();
        let blob_url = self.blob_url(container.name(), &blob_name);
        let response = self
            .send(Method::PUT, blob_url.clone(), headers, bytes)
            .await?;
        if !response.status().is_success() {
            return Err(storage_error(response).await);
        }
        info!(blob = %blob_name, container = %container.name(), bytes = size, "Uploaded blob");

        let expires_on = sas_expiry(Utc::now());
        let signed_url = BlobSasBuilder::new(container.name(), &blob_name, expires_on)
            .sign_url(&blob_url, credential)?;

        Ok(InputFileReference {
            local_path: local_path.to_path_buf(),
            blob_name,
            signed_url: signed_url.to_string(),
            expires_on,
        })
    }

    async fn delete_container_if_exists(
        &self,
        container: &ContainerHandle,
    ) -> QuickstartResult<DeleteOutcome> {
        let response = self
            .send(
                Method::DELETE,
                self.container_url(container.name()),
                HeaderMap::new(),
                Vec::new(),
            )
            .await?;
        let code = storage_error_code(&response);
        match DeleteOutcome::classify(
            response.status().as_u16(),
            code.as_deref(),
            CONTAINER_NOT_FOUND,
        ) {
            Some(outcome) => Ok(outcome),
            None => Err(storage_error(response).await),
        }
    }
}
