//! Data-source endpoint selection.
//!
//! A process picks exactly one [`NetworkMode`] at start-up; [`ChainEndpoint::select`]
//! turns it (plus any `custom` overrides) into the endpoint the Electrum
//! client connects to. Selection is a pure function: reading the environment
//! is the caller's job (see [`EndpointOverrides::from_lookup`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default Electrum plaintext port.
pub const DEFAULT_ELECTRUM_PORT: u16 = 50001;

/// Default host used by `local-dev` and as the `custom` fallback.
pub const DEFAULT_ELECTRUM_HOST: &str = "localhost";

// ElectrumX. electrs-based servers (blockstream.info among them) refuse
// verbose `blockchain.transaction.get`, which the proof path needs.
const MAINNET_HOST: &str = "electrum.emzy.de";
const MAINNET_PORT: u16 = 50002;
const TESTNET_HOST: &str = "testnet.electrumx.hodlwallet.com";
const TESTNET_PORT: u16 = 51002;

pub const ENV_ELECTRUM_HOST: &str = "ELECTRUM_HOST";
pub const ENV_ELECTRUM_PORT: &str = "ELECTRUM_PORT";
pub const ENV_ELECTRUM_PROTOCOL: &str = "ELECTRUM_PROTOCOL";

// ==============================================================================
// Network Mode
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    Mainnet,
    Testnet,
    LocalDev,
    Custom,
}

impl NetworkMode {
    /// Base URL of the settlement-chain API used for height correlation.
    pub fn default_heights_api(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.hiro.so",
            Self::Testnet => "https://api.testnet.hiro.so",
            Self::LocalDev | Self::Custom => "http://localhost:3999",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::LocalDev => write!(f, "local-dev"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for NetworkMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "local-dev" | "localdev" | "mocknet" => Ok(Self::LocalDev),
            "custom" => Ok(Self::Custom),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown network mode `{other}`; expected mainnet, testnet, local-dev or custom"
            ))),
        }
    }
}

// ==============================================================================
// Transport
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Tls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
        }
    }
}

impl FromStr for Transport {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            // Electrum tooling conventionally calls TLS "ssl".
            "tls" | "ssl" => Ok(Self::Tls),
            other => Err(CoreError::InvalidConfig(format!(
                "unsupported transport `{other}`; expected tcp or tls"
            ))),
        }
    }
}

// ==============================================================================
// Endpoint
// ==============================================================================

/// Host/port/transport overrides honoured only in [`NetworkMode::Custom`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub transport: Option<Transport>,
}

impl EndpointOverrides {
    /// Read `ELECTRUM_HOST`, `ELECTRUM_PORT` and `ELECTRUM_PROTOCOL` through
    /// `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get(ENV_ELECTRUM_PORT) {
            None => None,
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                CoreError::InvalidConfig(format!("invalid {ENV_ELECTRUM_PORT} `{raw}`: {e}"))
            })?),
        };
        let transport = get(ENV_ELECTRUM_PROTOCOL)
            .map(|raw| raw.parse::<Transport>())
            .transpose()?;

        Ok(Self {
            host: get(ENV_ELECTRUM_HOST).map(|h| h.trim().to_owned()),
            port,
            transport,
        })
    }
}

/// Where the Electrum client connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

impl ChainEndpoint {
    /// Resolve the endpoint for `mode`. `overrides` are ignored for every
    /// mode except `custom`.
    pub fn select(mode: NetworkMode, overrides: &EndpointOverrides) -> Self {
        match mode {
            NetworkMode::Mainnet => Self {
                host: MAINNET_HOST.to_owned(),
                port: MAINNET_PORT,
                transport: Transport::Tls,
            },
            NetworkMode::Testnet => Self {
                host: TESTNET_HOST.to_owned(),
                port: TESTNET_PORT,
                transport: Transport::Tls,
            },
            NetworkMode::LocalDev => Self {
                host: DEFAULT_ELECTRUM_HOST.to_owned(),
                port: DEFAULT_ELECTRUM_PORT,
                transport: Transport::Tcp,
            },
            NetworkMode::Custom => Self {
                host: overrides
                    .host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ELECTRUM_HOST.to_owned()),
                port: overrides.port.unwrap_or(DEFAULT_ELECTRUM_PORT),
                transport: overrides.transport.unwrap_or(Transport::Tcp),
            },
        }
    }
}

impl fmt::Display for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.transport, self.host, self.port)
    }
}
