//! Run configuration.
//!
//! A [`QuickstartConfig`] is built once at startup (the binary fills it from
//! flags and environment variables) and validated before any client is
//! created or any remote call is made.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::decode_account_key;
use crate::compute::{JobSpec, PoolSpec, VirtualMachineConfiguration, WaitOptions};
use crate::error::ConfigError;
use crate::resource::CommandTemplate;

pub const DEFAULT_POOL_ID: &str = "DotNetQuickstartPool";
pub const DEFAULT_JOB_ID: &str = "DotNetQuickstartJob";
pub const DEFAULT_POOL_NODE_COUNT: u32 = 2;
pub const DEFAULT_POOL_VM_SIZE: &str = "STANDARD_A1_v2";
pub const DEFAULT_CONTAINER_NAME: &str = "input";
pub const DEFAULT_INPUT_FILES: [&str; 3] = [
    "data/taskdata0.txt",
    "data/taskdata1.txt",
    "data/taskdata2.txt",
];

/// Storage account name and shared key.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub account_name: String,
    pub account_key: SecretString,
}

/// Batch account name, shared key and account URL.
#[derive(Debug, Clone)]
pub struct BatchCredentials {
    pub account_name: String,
    pub account_key: SecretString,
    /// e.g. `https://<account>.<region>.batch.azure.com`
    pub account_url: String,
}

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct QuickstartConfig {
    pub storage: StorageCredentials,
    pub batch: BatchCredentials,
    pub container_name: String,
    pub input_files: Vec<PathBuf>,
    pub pool: PoolSpec,
    pub job_id: String,
    pub command: CommandTemplate,
    pub wait: WaitOptions,
}

impl QuickstartConfig {
    /// Configuration with the quickstart defaults for everything but credentials.
    pub fn new(storage: StorageCredentials, batch: BatchCredentials) -> Self {
        Self {
            storage,
            batch,
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            input_files: DEFAULT_INPUT_FILES.iter().map(PathBuf::from).collect(),
            pool: PoolSpec {
                id: DEFAULT_POOL_ID.to_string(),
                vm_size: DEFAULT_POOL_VM_SIZE.to_string(),
                virtual_machine_configuration: VirtualMachineConfiguration::windows_server_2016(),
                target_dedicated_nodes: DEFAULT_POOL_NODE_COUNT,
            },
            job_id: DEFAULT_JOB_ID.to_string(),
            command: CommandTemplate::default(),
            wait: WaitOptions::default(),
        }
    }

    pub fn job(&self) -> JobSpec {
        JobSpec {
            id: self.job_id.clone(),
            pool_id: self.pool.id.clone(),
        }
    }

    /// Check every required field. Called before anything is contacted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("batch.account_name", &self.batch.account_name)?;
        require("batch.account_key", self.batch.account_key.expose_secret())?;
        require("batch.account_url", &self.batch.account_url)?;
        require("storage.account_name", &self.storage.account_name)?;
        require("storage.account_key", self.storage.account_key.expose_secret())?;
        require("container_name", &self.container_name)?;
        require("pool.id", &self.pool.id)?;
        require("pool.vm_size", &self.pool.vm_size)?;
        require("job_id", &self.job_id)?;

        require_base64("batch.account_key", &self.batch.account_key)?;
        require_base64("storage.account_key", &self.storage.account_key)?;

        let url = Url::parse(&self.batch.account_url).map_err(|e| ConfigError::Invalid {
            key: "batch.account_url",
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Invalid {
                key: "batch.account_url",
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        validate_container_name(&self.container_name)?;

        if self.pool.target_dedicated_nodes == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.target_dedicated_nodes",
                reason: "a pool needs at least one node to run tasks".into(),
            });
        }
        if self.input_files.is_empty() {
            return Err(ConfigError::Missing("input_files"));
        }
        if !self.command.as_str().contains(CommandTemplate::FILE_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                key: "command",
                reason: format!("must reference the input as `{}`", CommandTemplate::FILE_PLACEHOLDER),
            });
        }
        if self.wait.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "wait.poll_interval",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

fn require(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(key));
    }
    Ok(())
}

/// Checks the key bytes as given; surrounding whitespace is not base64.
fn require_base64(key: &'static str, value: &SecretString) -> Result<(), ConfigError> {
    decode_account_key(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("account keys are base64 encoded: {e}"),
        })
}

/// Container names: 3-63 chars of lowercase letters, digits and single
/// hyphens, starting and ending with a letter or digit.
fn validate_container_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "container_name",
        reason: reason.to_string(),
    };
    if !(3..=63).contains(&name.len()) {
        return Err(invalid("must be 3 to 63 characters long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("only lowercase letters, digits and hyphens are allowed"));
    }
    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(invalid("hyphens must separate letters or digits"));
    }
    Ok(())
}

/// Parse a duration given in whole seconds, as used by the CLI.
pub fn parse_seconds(s: &str) -> Result<Duration, String> {
    s.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("invalid number of seconds '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedKeyCredential;
    use crate::error::QuickstartError;

    const KEY: &str = "cXVpY2tzdGFydC10ZXN0LWtleQ==";

    fn config() -> QuickstartConfig {
        QuickstartConfig::new(
            StorageCredentials {
                account_name: "storageacct".into(),
                account_key: SecretString::from(KEY.to_string()),
            },
            BatchCredentials {
                account_name: "batchacct".into(),
                account_key: SecretString::from(KEY.to_string()),
                account_url: "https://batchacct.westus.batch.azure.com".into(),
            },
        )
    }

    #[test]
    fn test_defaults_validate() {
        let cfg = config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pool.id, DEFAULT_POOL_ID);
        assert_eq!(cfg.job().pool_id, DEFAULT_POOL_ID);
        assert_eq!(cfg.input_files.len(), 3);
    }

    #[test]
    fn test_each_empty_credential_is_missing() {
        let cases: [(&str, fn(&mut QuickstartConfig)); 5] = [
            ("batch.account_name", |c| c.batch.account_name.clear()),
            ("batch.account_key", |c| c.batch.account_key = SecretString::from(String::new())),
            ("batch.account_url", |c| c.batch.account_url.clear()),
            ("storage.account_name", |c| c.storage.account_name.clear()),
            ("storage.account_key", |c| {
                c.storage.account_key = SecretString::from(String::new())
            }),
        ];
        for (key, clear) in cases {
            let mut cfg = config();
            clear(&mut cfg);
            assert_eq!(cfg.validate(), Err(ConfigError::Missing(key)));
        }
    }

    #[test]
    fn test_invalid_values() {
        let mut cfg = config();
        cfg.batch.account_key = SecretString::from("***".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "batch.account_key", .. })
        ));

        let mut cfg = config();
        cfg.container_name = "Input".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "container_name", .. })
        ));

        let mut cfg = config();
        cfg.pool.target_dedicated_nodes = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.command = CommandTemplate::new("echo hi");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_key_that_fails_signing_fails_validation() {
        let key = SecretString::from(format!("{KEY}\n"));
        let credential = SharedKeyCredential::new("storageacct", key.clone());
        assert!(matches!(
            credential.sign("GET\n"),
            Err(QuickstartError::Signing(_))
        ));

        let mut cfg = config();
        cfg.storage.account_key = key;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "storage.account_key", .. })
        ));
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("90"), Ok(Duration::from_secs(90)));
        assert!(parse_seconds("soon").is_err());
    }
}
