//! Google Sheets sink: appends one row per sighting via the Sheets REST API.
//!
//! Authenticates as a service account: a signed RS256 assertion is exchanged for an access
//! token, which is cached until shortly before it expires.

use crate::storage::{PlateRecord, RecordSink, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token's stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Fields of a service-account JSON key file that matter here.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

pub struct SheetsSink {
    spreadsheet_id: String,
    range: String,
    key: ServiceAccountKey,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
    client: reqwest::Client,
}

impl SheetsSink {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        key: ServiceAccountKey,
    ) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            key,
            api_base: SHEETS_API_BASE.to_string(),
            token: Mutex::new(None),
            client: reqwest::Client::new(),
        }
    }

    /// Build from a service-account key file.
    pub async fn from_key_file(
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        path: &Path,
    ) -> Result<Self, StorageError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            StorageError::Credentials(format!("reading {}: {}", path.display(), e))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            StorageError::Credentials(format!("parsing {}: {}", path.display(), e))
        })?;
        Ok(Self::new(spreadsheet_id, range, key))
    }

    fn assertion(&self, now: i64) -> Result<String, StorageError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| StorageError::Credentials(format!("private key: {}", e)))?;
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &key,
        )
        .map_err(|e| StorageError::Credentials(format!("signing assertion: {}", e)))
    }

    /// Cached access token, exchanging a fresh assertion when missing or near expiry.
    async fn access_token(&self) -> Result<String, StorageError> {
        let mut guard = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(t) = guard.as_ref() {
            if t.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(t.value.clone());
            }
        }
        let assertion = self.assertion(now)?;
        let res = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StorageError::Credentials(format!(
                "token exchange failed: {} {}",
                status, body
            )));
        }
        let token: TokenResponse = res.json().await?;
        let value = token.access_token.clone();
        *guard = Some(CachedToken {
            value: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(value)
    }

    fn append_url(&self) -> Result<reqwest::Url, StorageError> {
        let last = format!("{}:append", self.range);
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| StorageError::Sheets(format!("api base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Sheets("api base cannot be a base url".to_string()))?
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                last.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

/// Row layout: date, time (Thai local), plate, province, source.
fn row(record: &PlateRecord) -> Vec<String> {
    let local = record.local_time();
    vec![
        local.format("%Y-%m-%d").to_string(),
        local.format("%H:%M:%S").to_string(),
        record.reading.plate_number.clone(),
        record.reading.province.clone(),
        record.source_id.clone().unwrap_or_default(),
    ]
}

#[async_trait]
impl RecordSink for SheetsSink {
    fn name(&self) -> &str {
        "sheets"
    }

    /// POST /v4/spreadsheets/{id}/values/{range}:append
    async fn persist(&self, record: &PlateRecord) -> Result<(), StorageError> {
        let token = self.access_token().await?;
        let url = self.append_url()?;
        let body = serde_json::json!({ "values": [row(record)] });
        let res = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StorageError::Sheets(format!("append failed: {} {}", status, body)));
        }
        Ok(())
    }
}
