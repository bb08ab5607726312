use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::error::{NavError, Result};
use crate::widget::WidgetHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Pending,
    Ready,
    Failed,
}

/// Process-wide widget runtime. The host's `load` runs at most once; every
/// viewer session awaits the same outcome, and a failure is never retried.
pub struct WidgetRuntime {
    host: Arc<dyn WidgetHost>,
    loaded: OnceCell<std::result::Result<(), String>>,
}

impl WidgetRuntime {
    pub fn new(host: Arc<dyn WidgetHost>) -> Arc<Self> {
        Arc::new(Self {
            host,
            loaded: OnceCell::new(),
        })
    }

    pub fn host(&self) -> &Arc<dyn WidgetHost> {
        &self.host
    }

    pub async fn ready(&self) -> Result<()> {
        let outcome = self
            .loaded
            .get_or_init(|| async {
                match self.host.load().await {
                    Ok(()) => {
                        info!("widget runtime loaded");
                        Ok(())
                    }
                    Err(err) => {
                        error!(error = %format!("{err:#}"), "failed to load widget runtime");
                        Err(format!("{err:#}"))
                    }
                }
            })
            .await;
        outcome.clone().map_err(NavError::WidgetLoadFailed)
    }

    pub fn state(&self) -> RuntimeState {
        match self.loaded.get() {
            None => RuntimeState::Pending,
            Some(Ok(())) => RuntimeState::Ready,
            Some(Err(_)) => RuntimeState::Failed,
        }
    }
}
