use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::annotate::{AnnotationSync, HighlightOutcome};
use crate::config::NavigatorConfig;
use crate::error::{NavError, Result};
use crate::files::{File, FileSetChange, FileSetManager, FileSetObserver};
use crate::resolve::resolve;
use crate::results::{ResultReference, SnippetQuery};
use crate::runtime::WidgetRuntime;
use crate::search::{SearchController, SearchSession};
use crate::session::{PageRequest, ViewerSession, ViewerStatus};
use crate::widget::Annotation;

#[derive(Debug, Clone, PartialEq)]
pub enum HighlightStatus {
    NotRequested,
    Placed(Annotation),
    /// Navigation stands; only the highlight was abandoned.
    Failed(NavError),
    /// A later navigation took over the viewer before the highlight landed.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GotoOutcome {
    pub file: String,
    pub page: u32,
    pub generation: u64,
    pub highlight: HighlightStatus,
}

/// Entry point for every result producer: resolves a document label to a
/// held file, points the viewer at it and places the optional highlight.
pub struct NavigationCoordinator {
    files: Arc<FileSetManager>,
    session: Arc<ViewerSession>,
    annotations: AnnotationSync,
    search: SearchController,
    ready_timeout: Duration,
}

impl NavigationCoordinator {
    /// Builds the coordinator and subscribes it to `files`, so removing the
    /// bound file (or resetting the set) tears the viewer down.
    pub fn new(
        files: Arc<FileSetManager>,
        runtime: Arc<WidgetRuntime>,
        config: &NavigatorConfig,
    ) -> Arc<Self> {
        let session = ViewerSession::new(runtime);
        let coordinator = Arc::new(Self {
            files: Arc::clone(&files),
            annotations: AnnotationSync::new(Arc::clone(&session), config.highlight_style()),
            search: SearchController::new(Arc::clone(&session)),
            session,
            ready_timeout: config.ready_timeout(),
        });
        let observer = Arc::downgrade(&coordinator);
        files.subscribe(observer);
        coordinator
    }

    pub fn files(&self) -> &Arc<FileSetManager> {
        &self.files
    }

    pub fn session(&self) -> &Arc<ViewerSession> {
        &self.session
    }

    pub fn status(&self) -> ViewerStatus {
        self.session.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerStatus> {
        self.session.subscribe()
    }

    #[instrument(skip(self))]
    pub async fn go_to(&self, label: &str, page: u32, highlight: Option<&str>) -> Result<GotoOutcome> {
        let files = self.files.list();
        let file = resolve(label, &files)
            .cloned()
            .ok_or_else(|| NavError::DocumentNotFound(label.to_owned()))?;
        let page = page.max(1);
        let name = file.name().to_owned();

        // The bind keeps running even if this call is dropped or times out.
        let generation = self.session.bind(file, page).generation();
        info!(file = %name, page, generation, "navigating");

        let highlight = match highlight.map(str::trim).filter(|text| !text.is_empty()) {
            None => HighlightStatus::NotRequested,
            Some(text) => self.highlight_when_ready(generation, page, text).await,
        };
        Ok(GotoOutcome {
            file: name,
            page,
            generation,
            highlight,
        })
    }

    pub async fn follow(&self, reference: &ResultReference) -> Result<GotoOutcome> {
        self.go_to(
            &reference.document_label,
            reference.page,
            reference.text.as_deref(),
        )
        .await
    }

    async fn highlight_when_ready(&self, generation: u64, page: u32, text: &str) -> HighlightStatus {
        match tokio::time::timeout(self.ready_timeout, self.session.wait_ready(generation)).await {
            Err(_) => {
                let waited = self.ready_timeout.as_millis() as u64;
                warn!(waited_ms = waited, "viewer not ready, abandoning highlight");
                return HighlightStatus::Failed(NavError::ReadyTimeout(waited));
            }
            Ok(Err(err)) => return HighlightStatus::Failed(err),
            Ok(Ok(None)) => return HighlightStatus::Superseded,
            Ok(Ok(Some(_))) => {}
        }

        match self.annotations.highlight_in(generation, page, text).await {
            Ok(HighlightOutcome::Placed(annotation)) => HighlightStatus::Placed(annotation),
            Ok(HighlightOutcome::NotFound) => {
                info!(page, text, "highlight text not found");
                HighlightStatus::Failed(NavError::HighlightNotFound {
                    page,
                    text: text.to_owned(),
                })
            }
            Ok(HighlightOutcome::Superseded) => HighlightStatus::Superseded,
            Err(err) => {
                warn!(%err, "highlight failed");
                HighlightStatus::Failed(err)
            }
        }
    }

    pub async fn goto_page(&self, page: u32) -> Result<PageRequest> {
        self.session.goto_page(page).await
    }

    pub async fn clear_highlight(&self) {
        self.annotations.clear().await;
    }

    pub async fn search(&self, query: &str) -> Result<Option<SearchSession>> {
        self.search.search(query).await
    }

    pub async fn search_next(&self) -> Result<SearchSession> {
        self.search.next().await
    }

    pub async fn search_previous(&self) -> Result<SearchSession> {
        self.search.previous().await
    }

    pub async fn clear_search(&self) {
        self.search.clear().await;
    }

    pub fn search_updates(&self) -> watch::Receiver<Option<SearchSession>> {
        self.search.subscribe()
    }

    /// The viewer's selected text with the bound document name, ready to be
    /// sent as a snippet search. `None` when nothing is selected.
    pub async fn selected_snippet_query(&self) -> Result<Option<SnippetQuery>> {
        let (generation, capability) = self.session.ready_capability()?;
        let selected = capability
            .get_selected_content()
            .await
            .map_err(NavError::widget_call)?;
        let Some(query_text) = selected
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
        else {
            return Ok(None);
        };

        let current_document_name = self
            .session
            .bound_file_name()
            .filter(|_| self.session.is_current(generation))
            .ok_or(NavError::NotReady)?;
        Ok(Some(SnippetQuery {
            query_text,
            current_document_name,
        }))
    }
}

impl FileSetObserver for NavigationCoordinator {
    fn files_changed(&self, change: &FileSetChange, _files: &[File]) {
        let Some(bound) = self.session.bound_file_name() else {
            return;
        };
        let stale = match change {
            FileSetChange::Added(_) => false,
            FileSetChange::Removed(name) => *name == bound,
            FileSetChange::Reset => true,
        };
        if stale {
            debug!(file = %bound, "bound file left the set");
            self.session.teardown();
        }
    }
}
