use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{NavError, Result};
use crate::session::ViewerSession;
use crate::widget::{Annotation, AnnotationId, AnnotationKind, AnnotationSpec, Rgb, ViewerCapability};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightStyle {
    pub color: Rgb,
    pub opacity: f32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            color: Rgb::default(),
            opacity: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HighlightOutcome {
    Placed(Annotation),
    /// The text has no usable region on the requested page.
    NotFound,
    /// The viewer was rebound while the highlight was being placed.
    Superseded,
}

struct LiveHighlight {
    generation: u64,
    id: AnnotationId,
    capability: Arc<dyn ViewerCapability>,
}

/// Keeps at most one highlight alive in a session's widget.
pub struct AnnotationSync {
    session: Arc<ViewerSession>,
    style: HighlightStyle,
    // Held across the whole highlight so calls never interleave.
    live: Mutex<Option<LiveHighlight>>,
}

impl AnnotationSync {
    pub fn new(session: Arc<ViewerSession>, style: HighlightStyle) -> Self {
        Self {
            session,
            style,
            live: Mutex::new(None),
        }
    }

    /// Replaces the current highlight with the first match of `text` on `page`.
    pub async fn highlight(&self, page: u32, text: &str) -> Result<HighlightOutcome> {
        self.place(None, page, text).await
    }

    /// Like [`AnnotationSync::highlight`], but only within the viewer bound
    /// as `generation`; any later bind makes it `Superseded`.
    pub(crate) async fn highlight_in(
        &self,
        generation: u64,
        page: u32,
        text: &str,
    ) -> Result<HighlightOutcome> {
        self.place(Some(generation), page, text).await
    }

    #[instrument(skip(self))]
    async fn place(&self, expected: Option<u64>, page: u32, text: &str) -> Result<HighlightOutcome> {
        let mut live = self.live.lock().await;
        Self::release(&mut live, self.session.generation()).await;

        if expected.is_some_and(|expected| !self.session.is_current(expected)) {
            return Ok(HighlightOutcome::Superseded);
        }
        let (generation, capability) = self.session.ready_capability()?;
        if expected.is_some_and(|expected| expected != generation) {
            return Ok(HighlightOutcome::Superseded);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(HighlightOutcome::NotFound);
        }

        let search = capability
            .search(text)
            .await
            .map_err(NavError::widget_call)?;
        let region = search
            .matches()
            .into_iter()
            .filter(|hit| hit.page == page)
            .find_map(|hit| hit.region());
        if let Err(err) = search.clear().await {
            debug!(error = %format!("{err:#}"), "failed to dispose highlight search");
        }

        let Some(quads) = region else {
            debug!("no highlightable match on page");
            return Ok(HighlightOutcome::NotFound);
        };
        if !self.session.is_current(generation) {
            return Ok(HighlightOutcome::Superseded);
        }

        let spec = AnnotationSpec {
            kind: AnnotationKind::Highlight,
            page,
            quads,
            color: self.style.color,
            opacity: self.style.opacity,
        };
        let annotation = capability
            .add_annotations(vec![spec])
            .await
            .map_err(NavError::widget_call)?
            .into_iter()
            .next()
            .ok_or_else(|| NavError::WidgetCall("widget returned no annotation".to_owned()))?;

        // The instance may have been released while adding; its overlay went with it.
        if !self.session.is_current(generation) {
            return Ok(HighlightOutcome::Superseded);
        }
        *live = Some(LiveHighlight {
            generation,
            id: annotation.id.clone(),
            capability,
        });
        Ok(HighlightOutcome::Placed(annotation))
    }

    pub async fn clear(&self) {
        let mut live = self.live.lock().await;
        Self::release(&mut live, self.session.generation()).await;
    }

    pub async fn current(&self) -> Option<AnnotationId> {
        self.live.lock().await.as_ref().map(|live| live.id.clone())
    }

    // Forgets the recorded highlight whatever the removal outcome.
    async fn release(live: &mut Option<LiveHighlight>, generation: u64) {
        let Some(recorded) = live.take() else {
            return;
        };
        if recorded.generation != generation {
            debug!(id = %recorded.id, "highlight belonged to a released widget instance");
            return;
        }
        if let Err(err) = recorded
            .capability
            .remove_annotations(std::slice::from_ref(&recorded.id))
            .await
        {
            warn!(id = %recorded.id, error = %format!("{err:#}"), "failed to remove highlight");
        }
    }
}
