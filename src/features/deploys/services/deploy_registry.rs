use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::core::error::{AppError, Result};
use crate::features::deploys::services::{
    DeployController, DeployControllerConfig, DeployStateStore, DeployTrigger,
};

type ControllerCell = Arc<OnceCell<Arc<DeployController>>>;

/// One controller per configured target, loaded on first use and kept for the process lifetime
pub struct DeployControllerRegistry {
    config: Arc<DeployControllerConfig>,
    store: Arc<dyn DeployStateStore>,
    trigger: Arc<dyn DeployTrigger>,
    controllers: Mutex<HashMap<String, ControllerCell>>,
}

impl DeployControllerRegistry {
    pub fn new(
        config: DeployControllerConfig,
        store: Arc<dyn DeployStateStore>,
        trigger: Arc<dyn DeployTrigger>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            trigger,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Controller for `target`. Concurrent first calls share a single load.
    ///
    /// Targets outside the configured set are rejected before anything is cached.
    pub async fn get(&self, target: &str) -> Result<Arc<DeployController>> {
        if !self.config.targets.contains(target) {
            return Err(AppError::NotFound(format!(
                "Deploy target '{}' is not configured",
                target
            )));
        }

        let cell = {
            let mut controllers = self
                .controllers
                .lock()
                .map_err(|_| AppError::Internal("Controller registry poisoned".to_string()))?;
            controllers.entry(target.to_string()).or_default().clone()
        };

        let controller = cell
            .get_or_try_init(|| async {
                DeployController::load(
                    target,
                    Arc::clone(&self.config),
                    Arc::clone(&self.store),
                    Arc::clone(&self.trigger),
                )
                .await
                .map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(controller))
    }

    #[cfg(test)]
    pub fn cached_targets(&self) -> usize {
        self.controllers.lock().map(|c| c.len()).unwrap_or(0)
    }
}
