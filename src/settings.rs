//! Connection settings for the object store.
//!
//! Settings come from an `appsettings.json` file with an `S3Settings`
//! section, optionally overridden per field from the environment, and are
//! validated into a [`StoreConfig`] before any client is built.

use std::{fmt, fs, path::Path};

use serde::Deserialize;
use url::Url;

use crate::{
    config_paths,
    error::{LookupError, Result},
};

pub const DEFAULT_REGION: &str = "us-east-1";

const ENV_ACCESS_KEY: &str = "S3WEBURL_ACCESS_KEY";
const ENV_SECRET_KEY: &str = "S3WEBURL_SECRET_KEY";
const ENV_ENDPOINT: &str = "S3WEBURL_ENDPOINT";
const ENV_REGION: &str = "S3WEBURL_REGION";
const ENV_BUCKET: &str = "S3WEBURL_BUCKET";

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Settings {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub bucket_name: String,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .field("region_name", &self.region_name)
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SettingsFile {
    #[serde(rename = "S3Settings")]
    s3_settings: Option<S3Settings>,
}

/// Validated settings, ready to build a client from.
#[derive(Clone)]
pub struct StoreConfig {
    pub access_key: String,
    pub secret_key: String,
    /// Scheme and host (and port), no trailing slash.
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl S3Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: SettingsFile = serde_json::from_str(json)
            .map_err(|err| LookupError::ConfigInvalid(format!("Invalid settings JSON: {err}")))?;
        file.s3_settings
            .ok_or_else(|| LookupError::ConfigInvalid("S3Settings section is missing".to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|err| {
            LookupError::ConfigInvalid(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Reads the first settings file found and applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = config_paths::settings_path().map_err(LookupError::ConfigInvalid)?;
        tracing::info!(path = %path.display(), "loading settings");
        let mut settings = Self::from_path(&path)?;
        settings.apply_overrides(env_var_non_empty);
        Ok(settings)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 5] = [
            (ENV_ACCESS_KEY, &mut self.access_key),
            (ENV_SECRET_KEY, &mut self.secret_key),
            (ENV_ENDPOINT, &mut self.endpoint_url),
            (ENV_REGION, &mut self.region_name),
            (ENV_BUCKET, &mut self.bucket_name),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }
    }

    pub fn validate(&self) -> Result<StoreConfig> {
        let required = [
            ("AccessKey", &self.access_key),
            ("SecretKey", &self.secret_key),
            ("EndpointUrl", &self.endpoint_url),
            ("BucketName", &self.bucket_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(LookupError::ConfigInvalid(format!("{name} is missing")));
            }
        }

        let region = match self.region_name.trim() {
            "" => DEFAULT_REGION,
            region => region,
        };

        Ok(StoreConfig {
            access_key: self.access_key.trim().to_string(),
            secret_key: self.secret_key.trim().to_string(),
            endpoint: normalize_endpoint(&self.endpoint_url)?,
            region: region.to_string(),
            bucket: self.bucket_name.trim().to_string(),
        })
    }
}

/// Accepts a bare host (`storage.example.com`) or a full URL and returns
/// `scheme://host[:port]` with any path and trailing slash dropped.
pub fn normalize_endpoint(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let parsed = Url::parse(&candidate)
        .map_err(|err| LookupError::ConfigInvalid(format!("EndpointUrl is malformed: {err}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LookupError::ConfigInvalid(format!(
            "EndpointUrl must use http or https, got {}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| LookupError::ConfigInvalid("EndpointUrl has no host".to_string()))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}
