use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{BlobStore, BlobStoreError};

const STORAGE_API: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const TOKEN_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Google Cloud Storage blob store.
///
/// Authenticates with a service account key when one is configured, otherwise
/// with the instance metadata server. Access tokens are cached and refreshed
/// shortly before expiry.
pub struct GcsBlobStore {
    bucket: String,
    client: Client,
    credentials: Option<ServiceAccountKey>,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

impl GcsBlobStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let credentials = match credentials_file {
            Some(path) => {
                let key_json = tokio::fs::read_to_string(path).await?;
                Some(serde_json::from_str::<ServiceAccountKey>(&key_json)?)
            }
            None => None,
        };

        let store = Self {
            bucket: bucket.to_string(),
            client,
            credentials,
            token: RwLock::new(None),
        };

        // Fail at startup rather than on the first transfer.
        store.access_token().await?;
        Ok(store)
    }

    async fn access_token(&self) -> Result<String, BlobStoreError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let fetched = match self.credentials {
            Some(ref key) => self.token_from_service_account(key).await,
            None => self.token_from_metadata_server().await,
        }
        .map_err(|e| BlobStoreError::Backend(format!("GCS authentication failed: {e}")))?;

        let token = CachedToken {
            value: fetched.access_token,
            expires_at: Utc::now() + Duration::seconds(fetched.expires_in),
        };
        let value = token.value.clone();
        *guard = Some(token);
        tracing::debug!(bucket = %self.bucket, "Refreshed GCS access token");
        Ok(value)
    }

    async fn token_from_service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<TokenResponse, anyhow::Error> {
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": TOKEN_SCOPE,
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");
        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let assertion = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, anyhow::Error> {
        let resp = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }

    /// Build a storage URL from path segments; each segment is percent-encoded,
    /// so object names containing `/` or spaces stay a single segment.
    fn storage_url(&self, segments: &[&str]) -> Result<Url, BlobStoreError> {
        let mut url =
            Url::parse(STORAGE_API).map_err(|e| BlobStoreError::Backend(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BlobStoreError::Backend("storage URL cannot be a base".to_string()))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    fn upload_url(&self, object_name: &str) -> Result<Url, BlobStoreError> {
        let mut url =
            self.storage_url(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name)
            // Reject the upload if the object already exists.
            .append_pair("ifGenerationMatch", "0");
        Ok(url)
    }

    fn download_url(&self, object_name: &str) -> Result<Url, BlobStoreError> {
        let mut url = self.storage_url(&[
            "storage",
            "v1",
            "b",
            self.bucket.as_str(),
            "o",
            object_name,
        ])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    /// The durable URL recorded on the document.
    fn public_url(&self, object_name: &str) -> Result<Url, BlobStoreError> {
        self.storage_url(&[self.bucket.as_str(), object_name])
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, object_name: &str, data: Bytes) -> Result<String, BlobStoreError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .post(self.upload_url(object_name)?)
            .bearer_auth(&token)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| BlobStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BlobStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(self.public_url(object_name)?.to_string())
    }

    async fn get(&self, object_name: &str) -> Result<Bytes, BlobStoreError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .get(self.download_url(object_name)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| BlobStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BlobStoreError::NotFound(object_name.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BlobStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        resp.bytes()
            .await
            .map_err(|e| BlobStoreError::Backend(e.to_string()))
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Sign `data` with a PKCS#8 PEM RSA key (RS256).
fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    use base64::Engine;

    let der_b64: String = private_key_pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::engine::general_purpose::STANDARD.decode(der_b64)?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}
