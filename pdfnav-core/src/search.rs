use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::{NavError, Result};
use crate::session::{ViewerSession, ViewerStatus};
use crate::widget::{SearchHandle, SearchProgress};

/// Consumer view of a widget search. `cursor_index` is one-based and zero
/// when the query has no results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub query: String,
    pub cursor_index: usize,
    pub total_results: usize,
}

impl SearchSession {
    fn from_progress(query: &str, progress: SearchProgress) -> Self {
        Self {
            query: query.to_owned(),
            cursor_index: progress.current.unwrap_or(0),
            total_results: progress.total,
        }
    }
}

struct ActiveSearch {
    serial: u64,
    generation: u64,
    query: String,
    handle: Arc<dyn SearchHandle>,
    mirror: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<ActiveSearch>>>;

/// Text search over the bound document with a push-style cursor.
pub struct SearchController {
    session: Arc<ViewerSession>,
    active: Slot,
    updates: Arc<watch::Sender<Option<SearchSession>>>,
    serials: AtomicU64,
}

impl SearchController {
    pub fn new(session: Arc<ViewerSession>) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            session,
            active: Arc::new(Mutex::new(None)),
            updates: Arc::new(updates),
            serials: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Option<SearchSession> {
        self.updates.borrow().clone()
    }

    /// Receives a new value whenever the widget moves the cursor, reports a
    /// new total, or the search is disposed (`None`).
    pub fn subscribe(&self) -> watch::Receiver<Option<SearchSession>> {
        self.updates.subscribe()
    }

    /// Starts a search, disposing any previous one. A blank query only clears.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Option<SearchSession>> {
        let query = query.trim();
        if query.is_empty() {
            self.clear().await;
            return Ok(None);
        }

        let (generation, capability) = self.session.ready_capability()?;
        let viewer = self.session.subscribe();
        self.clear().await;

        let handle = capability
            .search(query)
            .await
            .map_err(NavError::widget_call)?;
        if !self.session.is_current(generation) {
            dispose_handle(&handle).await;
            return Err(NavError::NotReady);
        }

        let mut progress = handle.progress();
        let snapshot = SearchSession::from_progress(query, *progress.borrow_and_update());
        debug!(total = snapshot.total_results, "search started");

        let serial = self.serials.fetch_add(1, Ordering::Relaxed) + 1;
        let mirror = tokio::spawn(mirror_updates(
            Mirror {
                serial,
                generation,
                query: query.to_owned(),
                handle: Arc::clone(&handle),
                active: Arc::clone(&self.active),
                updates: Arc::clone(&self.updates),
            },
            progress,
            viewer,
        ));

        let replaced = {
            let mut active = self.active.lock();
            self.updates.send_replace(Some(snapshot.clone()));
            active.replace(ActiveSearch {
                serial,
                generation,
                query: query.to_owned(),
                handle,
                mirror,
            })
        };
        if let Some(replaced) = replaced {
            dispose(replaced).await;
        }
        Ok(Some(snapshot))
    }

    pub async fn next(&self) -> Result<SearchSession> {
        self.step(true).await
    }

    pub async fn previous(&self) -> Result<SearchSession> {
        self.step(false).await
    }

    async fn step(&self, forward: bool) -> Result<SearchSession> {
        let (generation, query, handle) = {
            let active = self.active.lock();
            let active = active.as_ref().ok_or(NavError::NoActiveSearch)?;
            (active.generation, active.query.clone(), Arc::clone(&active.handle))
        };
        if !self.session.is_current(generation) {
            self.clear().await;
            return Err(NavError::NoActiveSearch);
        }

        let moved = if forward {
            handle.next().await
        } else {
            handle.previous().await
        };
        moved.map_err(NavError::widget_call)?;

        let progress = *handle.progress().borrow();
        Ok(SearchSession::from_progress(&query, progress))
    }

    /// Disposes the widget search state, if any.
    pub async fn clear(&self) {
        let previous = {
            let mut active = self.active.lock();
            let previous = active.take();
            self.updates.send_replace(None);
            previous
        };
        if let Some(previous) = previous {
            dispose(previous).await;
        }
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        if let Some(active) = self.active.lock().take() {
            active.mirror.abort();
        }
    }
}

async fn dispose(search: ActiveSearch) {
    search.mirror.abort();
    dispose_handle(&search.handle).await;
}

async fn dispose_handle(handle: &Arc<dyn SearchHandle>) {
    if let Err(err) = handle.clear().await {
        debug!(error = %format!("{err:#}"), "failed to clear widget search");
    }
}

struct Mirror {
    serial: u64,
    generation: u64,
    query: String,
    handle: Arc<dyn SearchHandle>,
    active: Slot,
    updates: Arc<watch::Sender<Option<SearchSession>>>,
}

impl Mirror {
    fn publish(&self, progress: SearchProgress) {
        let active = self.active.lock();
        if active.as_ref().map(|search| search.serial) == Some(self.serial) {
            self.updates
                .send_replace(Some(SearchSession::from_progress(&self.query, progress)));
        }
    }

    /// Drops the slot entry if it still belongs to this search.
    fn detach(&self) -> bool {
        let mut active = self.active.lock();
        if active.as_ref().map(|search| search.serial) != Some(self.serial) {
            return false;
        }
        active.take();
        self.updates.send_replace(None);
        true
    }
}

// Forwards widget progress into `updates` until the search is replaced or
// the viewer is rebound, in which case the search is disposed here.
async fn mirror_updates(
    mirror: Mirror,
    mut progress: watch::Receiver<SearchProgress>,
    mut viewer: watch::Receiver<ViewerStatus>,
) {
    loop {
        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    debug!("widget dropped search updates");
                    return;
                }
                let current = *progress.borrow_and_update();
                mirror.publish(current);
            }
            changed = viewer.changed() => {
                let rebound = match changed {
                    Ok(()) => viewer.borrow_and_update().generation != mirror.generation,
                    Err(_) => true,
                };
                if rebound {
                    if mirror.detach() {
                        debug!(query = %mirror.query, "viewer rebound, disposing search");
                        dispose_handle(&mirror.handle).await;
                    }
                    return;
                }
            }
        }
    }
}
