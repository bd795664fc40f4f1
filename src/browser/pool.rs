//! Fixed-size pool of long-lived browser instances.
//!
//! Instances are launched eagerly by [`BrowserResourcePool::init`]. Each request
//! leases a fresh isolated browsing context on one instance and gives it back
//! with [`BrowserResourcePool::release`], which closes only the context.

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BrowserEngine, BrowserInstance, PageDriver, SessionOptions};
use crate::config::BrowserConfig;
use crate::error::ScrapeError;

/// Snapshot of one pooled instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserHandle {
    pub id: u64,
    pub connected: bool,
    /// Advisory: the instance passed a challenge at some point
    pub authenticated: bool,
}

struct PooledInstance {
    id: u64,
    instance: Arc<dyn BrowserInstance>,
}

#[derive(Default)]
struct PoolState {
    instances: Vec<PooledInstance>,
    authenticated: HashSet<u64>,
    next_id: u64,
}

/// A page leased to exactly one request
pub struct PageLease {
    pub handle_id: u64,
    pub page: Box<dyn PageDriver>,
}

impl std::fmt::Debug for PageLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLease")
            .field("handle_id", &self.handle_id)
            .finish_non_exhaustive()
    }
}

/// Browser resource pool
pub struct BrowserResourcePool {
    engine: Arc<dyn BrowserEngine>,
    config: BrowserConfig,
    state: Mutex<PoolState>,
}

impl BrowserResourcePool {
    pub fn new(engine: Arc<dyn BrowserEngine>, config: BrowserConfig) -> Self {
        Self {
            engine,
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Launch the configured number of instances.
    ///
    /// Individual launch failures are logged; the call only fails when no
    /// instance could be started at all.
    pub async fn init(&self) -> Result<usize, ScrapeError> {
        let mut state = self.state.lock().await;
        let target = self.config.pool_size.max(1);

        while state.instances.len() < target {
            match self.engine.launch().await {
                Ok(instance) => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.instances.push(PooledInstance { id, instance });
                    debug!("Browser {} launched ({}/{})", id, state.instances.len(), target);
                }
                Err(e) => {
                    warn!("Failed to launch browser: {}", e);
                    break;
                }
            }
        }

        let launched = state.instances.len();
        if launched == 0 {
            return Err(ScrapeError::ResourceExhausted(
                "no browser instance could be launched".to_string(),
            ));
        }

        info!("Browser pool ready with {} instances", launched);
        Ok(launched)
    }

    /// Lease a fresh browsing context and page.
    ///
    /// Prefers a connected instance that already passed a challenge, then any
    /// connected instance, and otherwise launches a replacement.
    pub async fn acquire(&self) -> Result<PageLease, ScrapeError> {
        let (handle_id, instance) = {
            let mut state = self.state.lock().await;
            self.select_or_launch(&mut state).await?
        };

        let options = self.session_options();
        debug!(
            "Opening browsing context on browser {} (ua: {})",
            handle_id, options.user_agent
        );
        let page = instance.new_session(&options).await?;

        Ok(PageLease { handle_id, page })
    }

    async fn select_or_launch(
        &self,
        state: &mut PoolState,
    ) -> Result<(u64, Arc<dyn BrowserInstance>), ScrapeError> {
        let authenticated = state
            .instances
            .iter()
            .find(|p| p.instance.is_connected() && state.authenticated.contains(&p.id));
        if let Some(pooled) = authenticated {
            return Ok((pooled.id, Arc::clone(&pooled.instance)));
        }

        if let Some(pooled) = state.instances.iter().find(|p| p.instance.is_connected()) {
            return Ok((pooled.id, Arc::clone(&pooled.instance)));
        }

        warn!("No connected browser in pool, launching a replacement");
        let instance = self
            .engine
            .launch()
            .await
            .map_err(|e| ScrapeError::ResourceExhausted(e.to_string()))?;

        let id = state.next_id;
        state.next_id += 1;

        // Drop disconnected entries so the pool does not grow past its size
        let dead: Vec<u64> = state
            .instances
            .iter()
            .filter(|p| !p.instance.is_connected())
            .map(|p| p.id)
            .collect();
        state.instances.retain(|p| p.instance.is_connected());
        for dead_id in dead {
            state.authenticated.remove(&dead_id);
        }

        state.instances.push(PooledInstance {
            id,
            instance: Arc::clone(&instance),
        });

        Ok((id, instance))
    }

    fn session_options(&self) -> SessionOptions {
        let user_agent = self
            .config
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| crate::utils::DEFAULT_USER_AGENT.to_string());

        SessionOptions {
            user_agent,
            locale: self.config.locale.clone(),
            viewport_width: self.config.viewport_width,
            viewport_height: self.config.viewport_height,
        }
    }

    /// Close the leased page and its context; the instance stays in the pool
    pub async fn release(&self, lease: PageLease) {
        if let Err(e) = lease.page.close().await {
            warn!(
                "Failed to close browsing context on browser {}: {}",
                lease.handle_id, e
            );
        }
    }

    /// Remember that an instance passed a challenge
    pub async fn mark_authenticated(&self, handle_id: u64) {
        let mut state = self.state.lock().await;
        if state.instances.iter().any(|p| p.id == handle_id) {
            state.authenticated.insert(handle_id);
            info!("Browser {} marked as authenticated", handle_id);
        }
    }

    /// Current state of every pooled instance
    pub async fn handles(&self) -> Vec<BrowserHandle> {
        let state = self.state.lock().await;
        state
            .instances
            .iter()
            .map(|p| BrowserHandle {
                id: p.id,
                connected: p.instance.is_connected(),
                authenticated: state.authenticated.contains(&p.id),
            })
            .collect()
    }

    /// Close every instance
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let instances = std::mem::take(&mut state.instances);
        state.authenticated.clear();

        for pooled in instances {
            if let Err(e) = pooled.instance.close().await {
                warn!("Failed to close browser {}: {}", pooled.id, e);
            }
        }
        info!("Browser pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockBrowserEngine, MockScript};

    fn pool_with(engine: Arc<MockBrowserEngine>, size: usize) -> BrowserResourcePool {
        let config = BrowserConfig {
            pool_size: size,
            ..Default::default()
        };
        BrowserResourcePool::new(engine, config)
    }

    #[tokio::test]
    async fn test_init_launches_all() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        let pool = pool_with(engine.clone(), 3);

        assert_eq!(pool.init().await.unwrap(), 3);
        assert_eq!(engine.launch_count(), 3);
        assert_eq!(pool.handles().await.len(), 3);
    }

    #[tokio::test]
    async fn test_acquire_prefers_authenticated() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        let pool = pool_with(engine, 3);
        pool.init().await.unwrap();

        pool.mark_authenticated(2).await;
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.handle_id, 2);
        pool.release(lease).await;

        let handles = pool.handles().await;
        assert!(handles.iter().find(|h| h.id == 2).unwrap().authenticated);
    }

    #[tokio::test]
    async fn test_release_closes_context_not_instance() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        let pool = pool_with(engine.clone(), 1);
        pool.init().await.unwrap();

        let lease = pool.acquire().await.unwrap();
        pool.release(lease).await;

        assert_eq!(engine.sessions_opened(), 1);
        assert_eq!(engine.sessions_closed(), 1);
        assert!(pool.handles().await[0].connected);
    }

    #[tokio::test]
    async fn test_disconnected_instance_is_replaced() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        let pool = pool_with(engine.clone(), 1);
        pool.init().await.unwrap();
        pool.mark_authenticated(0).await;

        engine.disconnect_all();
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.handle_id, 1);
        pool.release(lease).await;

        let handles = pool.handles().await;
        assert_eq!(handles.len(), 1);
        assert!(!handles[0].authenticated);
        assert_eq!(engine.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_launch_failure_is_resource_exhausted() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        engine.fail_launches(true);
        let pool = pool_with(engine, 2);

        assert!(matches!(
            pool.init().await,
            Err(ScrapeError::ResourceExhausted(_))
        ));
        assert!(matches!(
            pool.acquire().await,
            Err(ScrapeError::ResourceExhausted(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_instances() {
        let engine = Arc::new(MockBrowserEngine::new(MockScript::default()));
        let pool = pool_with(engine.clone(), 2);
        pool.init().await.unwrap();

        pool.shutdown().await;
        assert!(pool.handles().await.is_empty());
        assert_eq!(engine.instances_closed(), 2);
    }
}
