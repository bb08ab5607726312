use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::error::{NavError, Result};
use crate::files::File;
use crate::runtime::WidgetRuntime;
use crate::widget::ViewerCapability;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Empty,
    Loading,
    Ready,
    /// The widget runtime itself failed to load. Not retried.
    Unavailable,
}

/// Snapshot of a [`ViewerSession`], pushed to subscribers on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerStatus {
    pub generation: u64,
    pub phase: ViewerPhase,
    pub file: Option<String>,
    pub page: u32,
    pub error: Option<NavError>,
}

impl ViewerStatus {
    /// Placeholder text for the viewer surface, `None` while a document is shown.
    pub fn message(&self) -> Option<String> {
        match (self.phase, &self.error) {
            (ViewerPhase::Ready, _) => None,
            (ViewerPhase::Loading, _) => Some("Loading PDF viewer...".to_owned()),
            (ViewerPhase::Unavailable, Some(err)) => Some(format!("PDF viewer unavailable: {err}")),
            (ViewerPhase::Unavailable, None) => Some("PDF viewer unavailable.".to_owned()),
            (ViewerPhase::Empty, Some(err)) => Some(err.to_string()),
            (ViewerPhase::Empty, None) => Some("Upload a PDF to view it here.".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Ready,
    /// A later bind or a teardown replaced this request; its completion was ignored.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Navigated,
    /// Stored while loading and replayed once the viewer is ready.
    Queued,
}

/// Handle to a detached bind. Dropping it does not cancel the load.
pub struct BindTicket {
    generation: u64,
    handle: JoinHandle<Result<BindOutcome>>,
}

impl BindTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(self) -> Result<BindOutcome> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(NavError::WidgetCall(format!("bind task failed: {err}"))),
        }
    }
}

struct Binding {
    generation: u64,
    phase: ViewerPhase,
    file: Option<File>,
    page: u32,
    capability: Option<Arc<dyn ViewerCapability>>,
    queued_page: Option<u32>,
    error: Option<NavError>,
}

impl Binding {
    fn status(&self) -> ViewerStatus {
        ViewerStatus {
            generation: self.generation,
            phase: self.phase,
            file: self.file.as_ref().map(|file| file.name().to_owned()),
            page: self.page,
            error: self.error.clone(),
        }
    }
}

/// Owns the single mounted widget instance and the file/page it shows.
///
/// Every bind takes a new generation number. A load only commits while its
/// generation is still the latest one, so a slow initialization that
/// resolves after a newer bind is dropped instead of overwriting it.
pub struct ViewerSession {
    runtime: Arc<WidgetRuntime>,
    binding: Mutex<Binding>,
    status: watch::Sender<ViewerStatus>,
}

impl ViewerSession {
    pub fn new(runtime: Arc<WidgetRuntime>) -> Arc<Self> {
        let binding = Binding {
            generation: 0,
            phase: ViewerPhase::Empty,
            file: None,
            page: 1,
            capability: None,
            queued_page: None,
            error: None,
        };
        let (status, _) = watch::channel(binding.status());
        Arc::new(Self {
            runtime,
            binding: Mutex::new(binding),
            status,
        })
    }

    pub fn status(&self) -> ViewerStatus {
        self.binding.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerStatus> {
        self.status.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.binding.lock().generation
    }

    pub fn bound_file_name(&self) -> Option<String> {
        self.binding
            .lock()
            .file
            .as_ref()
            .map(|file| file.name().to_owned())
    }

    /// Points the viewer at `file`/`page` and starts loading it in the background.
    pub fn bind(self: &Arc<Self>, file: File, page: u32) -> BindTicket {
        let page = page.max(1);
        let generation = {
            let mut binding = self.binding.lock();
            binding.generation += 1;
            if binding.capability.take().is_some() {
                debug!(generation = binding.generation, "releasing previous widget instance");
            }
            binding.phase = ViewerPhase::Loading;
            binding.file = Some(file.clone());
            binding.page = page;
            binding.queued_page = None;
            binding.error = None;
            self.publish(&binding);
            binding.generation
        };

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.load(generation, file, page).await });
        BindTicket { generation, handle }
    }

    #[instrument(skip(self, file), fields(file = %file.name()))]
    async fn load(&self, generation: u64, file: File, page: u32) -> Result<BindOutcome> {
        if let Err(err) = self.runtime.ready().await {
            return self.fail(generation, ViewerPhase::Unavailable, err);
        }

        let capability = match self
            .runtime
            .host()
            .preview_file(file.content(), file.name())
            .await
        {
            Ok(capability) => capability,
            Err(err) => return self.fail(generation, ViewerPhase::Empty, NavError::widget_load(err)),
        };

        if !self.is_current(generation) {
            debug!("discarding superseded preview");
            return Ok(BindOutcome::Superseded);
        }

        if let Err(err) = capability.goto_location(page).await {
            warn!(error = %format!("{err:#}"), page, "initial navigation failed");
        }

        let replay = {
            let mut binding = self.binding.lock();
            if binding.generation != generation {
                debug!("discarding superseded preview");
                return Ok(BindOutcome::Superseded);
            }
            // Only the current generation reaches the container.
            self.runtime.host().mount(file.name());
            binding.capability = Some(Arc::clone(&capability));
            binding.phase = ViewerPhase::Ready;
            let replay = binding.queued_page.take();
            self.publish(&binding);
            replay
        };

        if let Some(queued) = replay {
            debug!(page = queued, "replaying queued page request");
            if let Err(err) = self.navigate(generation, &capability, queued).await {
                warn!(%err, page = queued, "queued navigation failed");
            }
        }
        Ok(BindOutcome::Ready)
    }

    fn fail(&self, generation: u64, phase: ViewerPhase, err: NavError) -> Result<BindOutcome> {
        let mut binding = self.binding.lock();
        if binding.generation != generation {
            debug!(%err, "ignoring failure of superseded load");
            return Ok(BindOutcome::Superseded);
        }
        warn!(%err, "viewer load failed");
        binding.phase = phase;
        binding.file = None;
        binding.capability = None;
        binding.queued_page = None;
        binding.error = Some(err.clone());
        self.publish(&binding);
        Err(err)
    }

    /// Navigates within the bound document. While loading, the request is
    /// queued (latest wins) and replayed once on reaching `Ready`.
    pub async fn goto_page(&self, page: u32) -> Result<PageRequest> {
        let page = page.max(1);
        let (generation, capability) = {
            let mut binding = self.binding.lock();
            match (binding.phase, binding.capability.clone()) {
                (ViewerPhase::Ready, Some(capability)) => (binding.generation, capability),
                (ViewerPhase::Loading, _) => {
                    binding.queued_page = Some(page);
                    return Ok(PageRequest::Queued);
                }
                _ => return Err(NavError::NotReady),
            }
        };
        self.navigate(generation, &capability, page).await?;
        Ok(PageRequest::Navigated)
    }

    async fn navigate(
        &self,
        generation: u64,
        capability: &Arc<dyn ViewerCapability>,
        page: u32,
    ) -> Result<()> {
        capability
            .goto_location(page)
            .await
            .map_err(NavError::widget_call)?;
        let mut binding = self.binding.lock();
        if binding.generation == generation {
            binding.page = page;
            self.publish(&binding);
        }
        Ok(())
    }

    pub fn capability(&self) -> Result<Arc<dyn ViewerCapability>> {
        self.ready_capability().map(|(_, capability)| capability)
    }

    /// The ready capability together with the generation it belongs to.
    pub(crate) fn ready_capability(&self) -> Result<(u64, Arc<dyn ViewerCapability>)> {
        let binding = self.binding.lock();
        match (binding.phase, &binding.capability) {
            (ViewerPhase::Ready, Some(capability)) => {
                Ok((binding.generation, Arc::clone(capability)))
            }
            _ => Err(NavError::NotReady),
        }
    }

    /// Resolves once `generation` is ready. `Ok(None)` means a newer bind or
    /// a teardown replaced it first.
    pub async fn wait_ready(&self, generation: u64) -> Result<Option<Arc<dyn ViewerCapability>>> {
        let mut updates = self.status.subscribe();
        loop {
            {
                let binding = self.binding.lock();
                if binding.generation > generation {
                    return Ok(None);
                }
                if binding.generation == generation {
                    match (binding.phase, &binding.capability) {
                        (ViewerPhase::Ready, Some(capability)) => {
                            return Ok(Some(Arc::clone(capability)))
                        }
                        (ViewerPhase::Loading, _) => {}
                        _ => return Err(binding.error.clone().unwrap_or(NavError::NotReady)),
                    }
                }
            }
            if updates.changed().await.is_err() {
                return Err(NavError::NotReady);
            }
        }
    }

    /// Releases the mounted widget. Safe in any state; in-flight loads become stale.
    pub fn teardown(&self) {
        {
            let mut binding = self.binding.lock();
            binding.generation += 1;
            binding.phase = ViewerPhase::Empty;
            binding.file = None;
            binding.page = 1;
            binding.capability = None;
            binding.queued_page = None;
            binding.error = None;
            self.runtime.host().unmount();
            self.publish(&binding);
        }
        debug!("viewer torn down");
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.binding.lock().generation == generation
    }

    // Called with the binding lock held so snapshots are published in order.
    fn publish(&self, binding: &Binding) {
        self.status.send_replace(binding.status());
    }
}
