//! Assembles a [`super::Pipeline`] from the resources `tingly`'s main wires up:
//! configuration, the credential vault, the usage recorder, and the load balancer's
//! durable rotation store.

use std::sync::Arc;

use config::Config;
use routing::{LoadBalancer, SqliteRotationStore};
use usage::Recorder;
use vault::Vault;

use super::Pipeline;

pub(crate) struct PipelineBuilder {
    config: Config,
    vault: Vault,
    recorder: Recorder,
    rotation_store: SqliteRotationStore,
}

impl PipelineBuilder {
    pub(crate) fn new(config: Config, vault: Vault, recorder: Recorder, rotation_store: SqliteRotationStore) -> Self {
        Self {
            config,
            vault,
            recorder,
            rotation_store,
        }
    }

    pub(crate) fn build(self) -> Pipeline {
        Pipeline {
            config: self.config,
            balancer: Arc::new(LoadBalancer::new(self.rotation_store)),
            vault: self.vault,
            recorder: self.recorder,
        }
    }
}
