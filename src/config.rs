use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;

use crate::error::ConfigError;

/// Default part size for multipart uploads (64 MiB)
pub const DEFAULT_MULTIPART_CHUNKSIZE: u64 = 64 * 1024 * 1024;

/// Configuration for an S3-backed storage
///
/// Every field has a default, so a partial mapping can be merged over
/// [`S3Config::default`] with [`S3Config::from_overrides`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub name: String,
    pub bucket_name: String,
    /// Host and port of the S3 endpoint, with or without a scheme
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Use https when the endpoint carries no scheme
    pub secure: bool,
    pub region: String,
    /// Uploads larger than this are split into parts of this size
    pub multipart_chunksize: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            name: "S3 Storage".to_string(),
            bucket_name: "esperoj".to_string(),
            endpoint: "localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            secure: true,
            region: "eu-central-1".to_string(),
            multipart_chunksize: DEFAULT_MULTIPART_CHUNKSIZE,
        }
    }
}

impl S3Config {
    /// Merge user supplied options over the defaults
    ///
    /// Keys present in `overrides` win; absent keys keep their default value.
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a known key carries a value of the wrong type
    pub fn from_overrides(overrides: Map<String, Value>) -> Result<Self, ConfigError> {
        let mut merged = match serde_json::to_value(Self::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(overrides);

        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Load configuration from environment variables and .env file
    ///
    /// Recognised variables: `S3_NAME`, `S3_BUCKET_NAME`, `S3_ENDPOINT`,
    /// `S3_ACCESS_KEY`, `S3_SECRET_KEY`, `S3_SECURE`, `S3_REGION` and
    /// `S3_MULTIPART_CHUNKSIZE`. Unset variables keep their default.
    ///
    /// # Errors
    ///
    /// Returns an error if `S3_SECURE` or `S3_MULTIPART_CHUNKSIZE` cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("S3_NAME") {
            config.name = name;
        }
        if let Some(bucket_name) = lookup("S3_BUCKET_NAME") {
            config.bucket_name = bucket_name;
        }
        if let Some(endpoint) = lookup("S3_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(access_key) = lookup("S3_ACCESS_KEY") {
            config.access_key = access_key;
        }
        if let Some(secret_key) = lookup("S3_SECRET_KEY") {
            config.secret_key = secret_key;
        }
        if let Some(secure) = lookup("S3_SECURE") {
            config.secure = parse_bool(&secure).ok_or_else(|| ConfigError::Invalid {
                key: "S3_SECURE".to_string(),
                value: secure.clone(),
            })?;
        }
        if let Some(region) = lookup("S3_REGION") {
            config.region = region;
        }
        if let Some(chunksize) = lookup("S3_MULTIPART_CHUNKSIZE") {
            config.multipart_chunksize =
                chunksize.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "S3_MULTIPART_CHUNKSIZE".to_string(),
                    value: chunksize.clone(),
                })?;
        }

        Ok(config)
    }

    /// Endpoint URL handed to the S3 client
    ///
    /// An endpoint that already has a scheme is used as is, otherwise the
    /// scheme follows `secure`.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            format!("{}://{}", scheme, self.endpoint)
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn overrides(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = S3Config::default();

        assert_eq!(config.name, "S3 Storage");
        assert_eq!(config.bucket_name, "esperoj");
        assert_eq!(config.endpoint, "localhost:9000");
        assert!(config.secure);
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.multipart_chunksize, 64 * 1024 * 1024);
    }

    #[test]
    fn test_empty_overrides_keep_defaults() {
        let config = S3Config::from_overrides(Map::new()).unwrap();
        assert_eq!(config, S3Config::default());
    }

    #[test]
    fn test_overrides_are_right_biased() {
        let config = S3Config::from_overrides(overrides(json!({
            "bucket_name": "archive",
            "secure": false,
            "multipart_chunksize": 8388608,
        })))
        .unwrap();

        assert_eq!(config.bucket_name, "archive");
        assert!(!config.secure);
        assert_eq!(config.multipart_chunksize, 8 * 1024 * 1024);

        // Untouched keys keep their defaults
        assert_eq!(config.endpoint, "localhost:9000");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.access_key, "minioadmin");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = S3Config::from_overrides(overrides(json!({ "colour": "blue" }))).unwrap();
        assert_eq!(config, S3Config::default());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result = S3Config::from_overrides(overrides(json!({ "secure": "maybe" })));
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("S3_BUCKET_NAME", "media"),
            ("S3_ENDPOINT", "s3.example.com"),
            ("S3_SECURE", "false"),
            ("S3_MULTIPART_CHUNKSIZE", "10485760"),
        ]);

        let config = S3Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.bucket_name, "media");
        assert_eq!(config.endpoint, "s3.example.com");
        assert!(!config.secure);
        assert_eq!(config.multipart_chunksize, 10 * 1024 * 1024);
        assert_eq!(config.region, "eu-central-1");
    }

    #[test]
    fn test_env_lookup_invalid_values() {
        let bad_bool = S3Config::from_lookup(|key| (key == "S3_SECURE").then(|| "sure".to_string()));
        assert!(matches!(bad_bool, Err(ConfigError::Invalid { .. })));

        let bad_size = S3Config::from_lookup(|key| {
            (key == "S3_MULTIPART_CHUNKSIZE").then(|| "64MB".to_string())
        });
        assert!(matches!(bad_size, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_endpoint_url() {
        let mut config = S3Config::default();
        assert_eq!(config.endpoint_url(), "https://localhost:9000");

        config.secure = false;
        assert_eq!(config.endpoint_url(), "http://localhost:9000");

        config.endpoint = "https://s3.eu-central-1.amazonaws.com".to_string();
        assert_eq!(config.endpoint_url(), "https://s3.eu-central-1.amazonaws.com");
    }
}
