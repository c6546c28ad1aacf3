//! On-chain identity anchors: owner, metadata URI and optional wallet of an
//! agent token in an identity registry contract.
//!
//! Resolution is never cached; every call reads the latest chain state.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::abi::{
    decode_address_from_return_data, decode_dynamic_bytes_from_return_data,
    decode_string_from_return_data, encode_call_data_uint, encode_call_data_uint_string,
    normalize_address, SELECTOR_GET_METADATA, SELECTOR_OWNER_OF, SELECTOR_TOKEN_URI,
};
use crate::chain_rpc::ChainRpc;
use crate::config::Config;
use crate::error::{BestEffort, MeshgateError, Result};
use crate::registry::schema::ServiceCard;

pub const WALLET_METADATA_KEY: &str = "agentWallet";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAgent {
    pub registry: String,
    pub agent_id: String,
    pub owner: String,
    #[serde(rename = "agentURI")]
    pub agent_uri: String,
    pub agent_wallet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_wallet_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityVerification {
    Absent,
    Verified {
        agent: ResolvedAgent,
    },
    Mismatch {
        agent: ResolvedAgent,
        advertised_uri: String,
    },
    Error {
        message: String,
    },
}

/// Wallet metadata is either a raw 20-byte address or an ABI word with the
/// address right-aligned. All zeroes means unset.
pub fn decode_wallet_metadata(bytes: &[u8]) -> Result<Option<String>> {
    let address = match bytes.len() {
        0 => return Ok(None),
        20 => bytes,
        32 => {
            if bytes[..12].iter().any(|b| *b != 0) {
                return Err(MeshgateError::Decode(
                    "wallet metadata word has non-zero high bytes".to_string(),
                ));
            }
            &bytes[12..]
        }
        other => {
            return Err(MeshgateError::Decode(format!(
                "wallet metadata must be 20 or 32 bytes, got {other}"
            )))
        }
    };
    if address.iter().all(|b| *b == 0) {
        return Ok(None);
    }
    Ok(Some(format!("0x{}", hex::encode(address))))
}

/// Prefixes the failing contract call while keeping the error class.
fn name_call(call: &str, err: MeshgateError) -> MeshgateError {
    match err {
        MeshgateError::Http(message) => MeshgateError::Http(format!("{call}: {message}")),
        MeshgateError::Rpc(message) => MeshgateError::Rpc(format!("{call}: {message}")),
        MeshgateError::Decode(message) => MeshgateError::Decode(format!("{call}: {message}")),
        other => other,
    }
}

/// Accepts a bare address or a CAIP-10 style `namespace:chain:address`.
fn registry_address_from_anchor(raw: &str) -> Option<String> {
    let candidate = raw.rsplit(':').next().unwrap_or(raw);
    normalize_address(candidate).ok()
}

pub struct IdentityResolver {
    rpc: Option<ChainRpc>,
    default_registry: Option<String>,
}

impl IdentityResolver {
    pub fn from_config(config: &Config) -> Result<Self> {
        let rpc = match config.rpc_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Some(ChainRpc::new(
                url,
                Duration::from_millis(config.rpc_timeout_ms),
            )?),
            _ => None,
        };
        Ok(Self {
            rpc,
            default_registry: config.identity_registry.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.rpc.is_some()
    }

    fn rpc(&self) -> Result<&ChainRpc> {
        self.rpc.as_ref().ok_or_else(|| {
            MeshgateError::Config(
                "rpc_url is not configured; set it (or MESHGATE_RPC_URL) to resolve identities"
                    .to_string(),
            )
        })
    }

    fn registry_address(&self, registry_override: Option<&str>) -> Result<String> {
        let raw = registry_override
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| self.default_registry.as_deref().map(str::trim).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                MeshgateError::Config(
                    "identity_registry is not configured and no registry override was given"
                        .to_string(),
                )
            })?;
        normalize_address(raw)
    }

    pub async fn resolve_agent(
        &self,
        agent_id: &str,
        registry_override: Option<&str>,
    ) -> Result<ResolvedAgent> {
        let rpc = self.rpc()?;
        let registry = self.registry_address(registry_override)?;
        let agent_id = agent_id.trim().to_string();

        let owner_data = encode_call_data_uint(SELECTOR_OWNER_OF, &agent_id)?;
        let uri_data = encode_call_data_uint(SELECTOR_TOKEN_URI, &agent_id)?;
        let wallet_data =
            encode_call_data_uint_string(SELECTOR_GET_METADATA, &agent_id, WALLET_METADATA_KEY)?;

        let (owner, uri, wallet) = futures::join!(
            rpc.eth_call(&registry, &owner_data),
            rpc.eth_call(&registry, &uri_data),
            rpc.eth_call(&registry, &wallet_data),
        );

        let owner_call = format!("ownerOf({agent_id})");
        let owner = owner
            .and_then(|data| decode_address_from_return_data(&data))
            .map_err(|e| name_call(&owner_call, e))?;
        let uri_call = format!("tokenURI({agent_id})");
        let agent_uri = uri
            .and_then(|data| decode_string_from_return_data(&data))
            .map_err(|e| name_call(&uri_call, e))?;

        let wallet = BestEffort::from_result(wallet.and_then(|data| {
            decode_wallet_metadata(&decode_dynamic_bytes_from_return_data(&data)?)
        }));
        if wallet.is_error() {
            warn!(agent_id = %agent_id, error = ?wallet.error, "Wallet metadata unavailable");
        }

        debug!(agent_id = %agent_id, registry = %registry, owner = %owner, "Resolved agent identity");
        Ok(ResolvedAgent {
            registry,
            agent_id,
            owner,
            agent_uri,
            agent_wallet: wallet.value,
            agent_wallet_error: wallet.error,
        })
    }

    /// Compares the card's advertised anchor with chain state. Never fails.
    pub async fn verify_card(&self, card: &ServiceCard) -> IdentityVerification {
        let Some(anchor) = &card.identity else {
            return IdentityVerification::Absent;
        };
        let registry_override = anchor
            .agent_registry
            .as_deref()
            .and_then(registry_address_from_anchor);

        match self
            .resolve_agent(&anchor.agent_id, registry_override.as_deref())
            .await
        {
            Ok(agent) => match &anchor.agent_uri {
                Some(advertised) if advertised.trim() != agent.agent_uri.trim() => {
                    IdentityVerification::Mismatch {
                        agent,
                        advertised_uri: advertised.clone(),
                    }
                }
                _ => IdentityVerification::Verified { agent },
            },
            Err(err) => IdentityVerification::Error {
                message: err.to_string(),
            },
        }
    }
}
