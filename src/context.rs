use std::sync::Arc;

use tracing::warn;

use crate::cache::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::plan::PlanBuilder;
use crate::registry::RegistryClient;
use crate::shell::ShellDialect;

/// Everything a tool needs, built once per configured registry and shared by reference.
pub struct MeshContext {
    pub config: Config,
    pub registry: Arc<RegistryClient>,
    pub identity: Arc<IdentityResolver>,
    pub planner: PlanBuilder,
}

impl MeshContext {
    pub fn from_config(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock), None)
    }

    pub fn with_clock(
        config: Config,
        clock: Arc<dyn Clock>,
        dialect: Option<ShellDialect>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(RegistryClient::with_clock(&config, clock)?);
        let identity = Arc::new(IdentityResolver::from_config(&config)?);
        if config.verify_identity && !identity.is_configured() {
            warn!("verify_identity is on but rpc_url is unset; cards will report an identity error");
        }
        let mut planner = PlanBuilder::new(&config, registry.clone(), identity.clone());
        if let Some(dialect) = dialect {
            planner = planner.with_dialect(dialect);
        }
        Ok(Self {
            config,
            registry,
            identity,
            planner,
        })
    }
}
