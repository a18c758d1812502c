use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{validate_key, BlobTags, ObjectStore, ObjectStoreError};

const API_BASE: &str = "https://storage.googleapis.com";
const MULTIPART_BOUNDARY: &str = "report_relay_part_boundary";

/// Google Cloud Storage object store backend.
/// Tags are written as custom object metadata in the same request as the content.
pub struct GcsStore {
    bucket: String,
    api_base: String,
    client: Client,
    access_token: tokio::sync::RwLock<String>,
    credentials_file: Option<String>,
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
}

#[derive(Deserialize)]
struct ObjectResource {
    #[serde(default)]
    metadata: BlobTags,
}

impl GcsStore {
    pub async fn new(
        bucket: &str,
        credentials_file: Option<&str>,
        client: Client,
    ) -> Result<Self, anyhow::Error> {
        let store = Self {
            bucket: bucket.to_string(),
            api_base: API_BASE.to_string(),
            client,
            access_token: tokio::sync::RwLock::new(String::new()),
            credentials_file: credentials_file.map(|s| s.to_string()),
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<(), anyhow::Error> {
        let token = if let Some(ref creds_path) = self.credentials_file {
            self.token_from_service_account(creds_path).await?
        } else {
            self.token_from_metadata_server().await?
        };

        let mut lock = self.access_token.write().await;
        *lock = token;
        Ok(())
    }

    async fn token_from_service_account(&self, path: &str) -> Result<String, anyhow::Error> {
        let key_json = tokio::fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)?;

        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
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
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    async fn token_from_metadata_server(&self) -> Result<String, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    /// `…/b/{bucket}/o/{key}` with the key as a single percent-encoded segment.
    fn object_url(&self, prefix: &str, key: &str) -> Result<Url, ObjectStoreError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend("Invalid GCS base URL".to_string()))?
            .pop_if_empty()
            .extend(prefix.split('/'))
            .extend(["b", self.bucket.as_str(), "o", key]);
        Ok(url)
    }

    fn upload_url(&self) -> Result<Url, ObjectStoreError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend("Invalid GCS base URL".to_string()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        url.query_pairs_mut().append_pair("uploadType", "multipart");
        Ok(url)
    }

    /// Public URL of an object, as stored in metadata records.
    pub fn public_url(&self, key: &str) -> String {
        format!("{API_BASE}/{}/{}", self.bucket, key)
    }

    async fn token(&self) -> String {
        self.access_token.read().await.clone()
    }
}

/// `multipart/related` body: JSON resource (name + metadata) followed by the content.
fn multipart_body(key: &str, data: &[u8], tags: &BlobTags) -> Result<Bytes, ObjectStoreError> {
    let resource = serde_json::json!({ "name": key, "metadata": tags });
    let resource = serde_json::to_vec(&resource)
        .map_err(|e| ObjectStoreError::Backend(format!("Failed to encode resource: {e}")))?;
    let content_type = mime_guess::from_path(key).first_or_octet_stream();

    let mut body = BytesMut::with_capacity(data.len() + resource.len() + 256);
    body.put_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(&resource);
    body.put_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.put_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.put_slice(data);
    body.put_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Ok(body.freeze())
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        tags: &BlobTags,
    ) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let token = self.token().await;
        let body = multipart_body(key, &data, tags)?;

        let resp = self
            .client
            .post(self.upload_url()?)
            .bearer_auth(&token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(self.public_url(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        validate_key(key)?;
        let token = self.token().await;
        let mut url = self.object_url("storage/v1", key)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        resp.bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        validate_key(key)?;
        let token = self.token().await;

        let resp = self
            .client
            .get(self.object_url("storage/v1", key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ObjectStoreError::Backend(format!(
                    "GCS object lookup failed ({status}): {body}"
                )))
            }
        }
    }

    async fn tags(&self, key: &str) -> Result<BlobTags, ObjectStoreError> {
        validate_key(key)?;
        let token = self.token().await;

        let resp = self
            .client
            .get(self.object_url("storage/v1", key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS metadata lookup failed ({status}): {body}"
            )));
        }

        let resource: ObjectResource = resp
            .json()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        Ok(resource.metadata)
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM armour and decode the PKCS#8 DER
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &der_b64)?;

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
