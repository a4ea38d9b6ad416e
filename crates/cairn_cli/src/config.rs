//! Environment configuration, read once at startup.

use std::env;
use std::path::PathBuf;

/// Object-storage credentials, present when the S3 provider is configured.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Access key ID.
    pub access_key: Option<String>,
    /// Secret access key.
    pub secret_key: Option<String>,
    /// Session token.
    pub session_token: Option<String>,
    /// Endpoint override.
    pub endpoint: Option<String>,
    /// Bucket name.
    pub bucket: Option<String>,
    /// Key prefix.
    pub prefix: Option<String>,
}

impl S3Config {
    /// Whether enough S3 configuration is present to name a bucket.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.bucket.is_some() && self.access_key.is_some() && self.secret_key.is_some()
    }
}

/// Everything the CLI reads from the environment.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// The M365 tenant ID paths are rooted at.
    pub tenant: String,
    /// M365 application client ID.
    pub client_id: Option<String>,
    /// M365 application client secret.
    pub client_secret: Option<String>,
    /// Repository passphrase.
    pub passphrase: Option<String>,
    /// Directory the repository stores under.
    pub repo_path: PathBuf,
    /// Object-storage credentials.
    pub s3: S3Config,
}

impl CliConfig {
    /// Reads the configuration from the environment.
    ///
    /// `CAIRN_TENANT_ID` is required; everything else has a default or is
    /// optional.
    pub fn from_env() -> Result<Self, String> {
        let tenant = env::var("CAIRN_TENANT_ID")
            .map_err(|_| "CAIRN_TENANT_ID must be set".to_string())?;

        if tenant.is_empty() {
            return Err("CAIRN_TENANT_ID must not be empty".to_string());
        }

        let repo_path = env::var("CAIRN_REPO_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./cairn-repo"));

        Ok(Self {
            tenant,
            client_id: env::var("CAIRN_CLIENT_ID").ok(),
            client_secret: env::var("CAIRN_CLIENT_SECRET").ok(),
            passphrase: env::var("CAIRN_PASSPHRASE").ok(),
            repo_path,
            s3: S3Config {
                access_key: env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                session_token: env::var("AWS_SESSION_TOKEN").ok(),
                endpoint: env::var("S3_ENDPOINT").ok(),
                bucket: env::var("S3_BUCKET").ok(),
                prefix: env::var("S3_PREFIX").ok(),
            },
        })
    }

    /// One-line description of the configured storage provider.
    #[must_use]
    pub fn provider_summary(&self) -> String {
        if self.s3.is_configured() {
            format!(
                "s3 bucket {} (not available in this build; using directory store {})",
                self.s3.bucket.as_deref().unwrap_or_default(),
                self.repo_path.display()
            )
        } else {
            format!("directory store {}", self.repo_path.display())
        }
    }
}
