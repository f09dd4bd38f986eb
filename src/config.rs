//! Initialization-file parsing.
//!
//! Modules are configured by INI-style files, one `[Section]` per
//! component. The core reads no environment variables; everything comes
//! through the file. Unknown keys are ignored so operator files can carry
//! sections for collaborators this crate does not implement.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File, FileFormat};

use crate::authentication::{Keys, SecurityLevel, ZapOptions};
use crate::domain::{MaxPackets, ModuleName};
use crate::error::{Error, Result};

/// `[General]` options.
#[derive(Debug, Clone)]
pub struct GeneralOptions {
    pub module_name: ModuleName,
    /// 0-4, mapped onto error/warn/info/debug/trace.
    pub verbose: u8,
    pub log_file_directory: Option<PathBuf>,
}

/// `[uOperator]` options: where the operator lives and how to prove
/// ourselves to it.
#[derive(Debug, Clone)]
pub struct OperatorOptions {
    pub address: String,
    pub security_level: SecurityLevel,
    pub server_public_key: Option<String>,
    pub client_public_key: Option<String>,
    pub client_private_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl OperatorOptions {
    /// Client-side ZAP options for connections brokered by this operator.
    #[must_use]
    pub fn zap_options(&self, handshake_endpoint: Option<String>) -> ZapOptions {
        ZapOptions {
            security_level: self.security_level,
            domain: String::new(),
            is_server: false,
            server_public_key: self.server_public_key.clone(),
            client_keys: self.client_public_key.as_ref().map(|public_key| Keys {
                public_key: public_key.clone(),
                private_key: self.client_private_key.clone(),
            }),
            username: self.username.clone(),
            password: self.password.clone(),
            handshake_endpoint,
        }
    }
}

/// `[Heartbeat]` options.
#[derive(Debug, Clone)]
pub struct HeartbeatOptions {
    /// Name of the heartbeat broadcast in the connection registry.
    pub broadcast: String,
    pub interval: Duration,
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            broadcast: "Heartbeat".to_string(),
            interval: Duration::from_secs(30),
        }
    }
}

/// `[PacketCache]` options.
#[derive(Debug, Clone)]
pub struct PacketCacheOptions {
    pub max_packets: MaxPackets,
    pub subscriber_address: Option<String>,
    pub replier_address: Option<String>,
}

/// A module's full configuration.
#[derive(Debug, Clone)]
pub struct ModuleConfiguration {
    pub general: GeneralOptions,
    pub operator: Option<OperatorOptions>,
    pub heartbeat: HeartbeatOptions,
    pub packet_cache: Option<PacketCacheOptions>,
}

/// Loads a configuration from an INI file on disk.
pub fn load(path: &Path) -> Result<ModuleConfiguration> {
    let source = File::from(path.to_path_buf()).format(FileFormat::Ini);
    let parsed = Config::builder()
        .add_source(source)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("cannot read {}: {e}", path.display())))?;
    from_config(&parsed)
}

/// Loads a configuration from INI text (used by tests and embedders).
pub fn load_from_str(contents: &str) -> Result<ModuleConfiguration> {
    let parsed = Config::builder()
        .add_source(File::from_str(contents, FileFormat::Ini))
        .build()
        .map_err(|e| Error::InvalidArgument(format!("cannot parse configuration: {e}")))?;
    from_config(&parsed)
}

fn optional_string(config: &Config, key: &str) -> Option<String> {
    config
        .get_string(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn from_config(config: &Config) -> Result<ModuleConfiguration> {
    let module_name = config
        .get_string("General.moduleName")
        .unwrap_or_else(|_| "unknown".to_string());
    let module_name = ModuleName::try_new(module_name)
        .map_err(|e| Error::InvalidArgument(format!("bad module name: {e}")))?;
    let verbose = config.get_int("General.verbose").unwrap_or(2).clamp(0, 4);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let general = GeneralOptions {
        module_name,
        verbose: verbose as u8,
        log_file_directory: optional_string(config, "General.logFileDirectory")
            .map(PathBuf::from),
    };

    let operator = match optional_string(config, "uOperator.address") {
        None => None,
        Some(address) => {
            let security_level = match optional_string(config, "uOperator.security_level") {
                None => SecurityLevel::Grasslands,
                Some(text) => SecurityLevel::parse(&text)?,
            };
            Some(OperatorOptions {
                address,
                security_level,
                server_public_key: optional_string(config, "uOperator.server_public_key"),
                client_public_key: optional_string(config, "uOperator.client_public_key"),
                client_private_key: optional_string(config, "uOperator.client_private_key"),
                username: optional_string(config, "uOperator.username"),
                password: optional_string(config, "uOperator.password"),
            })
        }
    };

    let mut heartbeat = HeartbeatOptions::default();
    if let Some(broadcast) = optional_string(config, "Heartbeat.broadcast") {
        heartbeat.broadcast = broadcast;
    }
    if let Ok(interval) = config.get_int("Heartbeat.interval") {
        if interval <= 0 {
            return Err(Error::InvalidArgument(format!(
                "heartbeat interval {interval} must be positive"
            )));
        }
        #[allow(clippy::cast_sign_loss)]
        {
            heartbeat.interval = Duration::from_secs(interval as u64);
        }
    }

    let packet_cache = match config.get_int("PacketCache.maxPackets") {
        Err(_) => None,
        Ok(max_packets) => {
            if max_packets <= 0 {
                return Err(Error::InvalidArgument(format!(
                    "maxPackets {max_packets} must be positive"
                )));
            }
            #[allow(clippy::cast_sign_loss)]
            let max_packets = MaxPackets::try_new(max_packets as usize)
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
            Some(PacketCacheOptions {
                max_packets,
                subscriber_address: optional_string(config, "PacketCache.subscriberAddress"),
                replier_address: optional_string(config, "PacketCache.replierAddress"),
            })
        }
    };

    Ok(ModuleConfiguration {
        general,
        operator,
        heartbeat,
        packet_cache,
    })
}
