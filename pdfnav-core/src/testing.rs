//! Scripted widget host used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use crate::widget::{
    Annotation, AnnotationId, AnnotationSpec, Quad, SearchHandle, SearchProgress, TextMatch,
    ViewerCapability, WidgetHost,
};

#[derive(Default)]
pub(crate) struct ScriptedHost {
    load_calls: AtomicUsize,
    load_failure: Mutex<Option<String>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    failing: Mutex<HashSet<String>>,
    pages: Mutex<HashMap<String, Vec<String>>>,
    viewers: Mutex<Vec<Arc<FakeViewer>>>,
    mounted: Mutex<Option<String>>,
    unmounts: AtomicUsize,
}

impl ScriptedHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_load(&self, message: &str) {
        *self.load_failure.lock() = Some(message.to_owned());
    }

    /// The next preview of `file_name` blocks until the returned sender fires.
    pub(crate) fn hold(&self, file_name: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(file_name.to_owned(), rx);
        tx
    }

    pub(crate) fn fail_preview(&self, file_name: &str) {
        self.failing.lock().insert(file_name.to_owned());
    }

    pub(crate) fn set_pages(&self, file_name: &str, pages: &[&str]) {
        self.pages.lock().insert(
            file_name.to_owned(),
            pages.iter().map(|page| (*page).to_owned()).collect(),
        );
    }

    pub(crate) fn viewers(&self) -> Vec<Arc<FakeViewer>> {
        self.viewers.lock().clone()
    }

    pub(crate) fn latest_viewer(&self) -> Option<Arc<FakeViewer>> {
        self.viewers.lock().last().cloned()
    }

    /// File the container currently shows.
    pub(crate) fn mounted(&self) -> Option<String> {
        self.mounted.lock().clone()
    }

    pub(crate) fn unmounts(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WidgetHost for ScriptedHost {
    async fn load(&self) -> Result<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let failure = self.load_failure.lock().clone();
        match failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    async fn preview_file(
        &self,
        _content: Bytes,
        file_name: &str,
    ) -> Result<Arc<dyn ViewerCapability>> {
        let gate = self.gates.lock().remove(file_name);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        tokio::task::yield_now().await;
        if self.failing.lock().contains(file_name) {
            bail!("cannot preview {file_name}");
        }
        let pages = self.pages.lock().get(file_name).cloned().unwrap_or_default();
        let viewer = Arc::new(FakeViewer::new(file_name, pages));
        self.viewers.lock().push(Arc::clone(&viewer));
        Ok(viewer)
    }

    fn mount(&self, file_name: &str) {
        *self.mounted.lock() = Some(file_name.to_owned());
    }

    fn unmount(&self) {
        self.mounted.lock().take();
        self.unmounts.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeViewer {
    pub(crate) file_name: String,
    pages: Vec<String>,
    gotos: Mutex<Vec<u32>>,
    live: Mutex<Vec<Annotation>>,
    next_id: AtomicUsize,
    fail_removals: AtomicBool,
    selection: Mutex<Option<String>>,
    searches: Mutex<Vec<Arc<FakeSearch>>>,
}

impl FakeViewer {
    fn new(file_name: &str, pages: Vec<String>) -> Self {
        Self {
            file_name: file_name.to_owned(),
            pages,
            gotos: Mutex::new(Vec::new()),
            live: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            fail_removals: AtomicBool::new(false),
            selection: Mutex::new(None),
            searches: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn gotos(&self) -> Vec<u32> {
        self.gotos.lock().clone()
    }

    pub(crate) fn live_annotations(&self) -> Vec<Annotation> {
        self.live.lock().clone()
    }

    pub(crate) fn fail_removals(&self) {
        self.fail_removals.store(true, Ordering::SeqCst);
    }

    pub(crate) fn select(&self, text: &str) {
        *self.selection.lock() = Some(text.to_owned());
    }

    pub(crate) fn searches(&self) -> Vec<Arc<FakeSearch>> {
        self.searches.lock().clone()
    }

    fn find(&self, query: &str) -> Vec<TextMatch> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for (index, text) in self.pages.iter().enumerate() {
            let haystack = text.to_lowercase();
            for (offset, _) in haystack.match_indices(&needle) {
                let left = offset as f32 * 6.0;
                let right = (offset + needle.len()) as f32 * 6.0;
                hits.push(TextMatch {
                    page: index as u32 + 1,
                    quads: vec![Quad::from_bounds(left, 700.0, right, 712.0)],
                });
            }
        }
        hits
    }
}

#[async_trait]
impl ViewerCapability for FakeViewer {
    async fn goto_location(&self, page: u32) -> Result<()> {
        tokio::task::yield_now().await;
        self.gotos.lock().push(page);
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Arc<dyn SearchHandle>> {
        tokio::task::yield_now().await;
        let search = Arc::new(FakeSearch::new(self.find(query)));
        self.searches.lock().push(Arc::clone(&search));
        Ok(search)
    }

    async fn add_annotations(&self, specs: Vec<AnnotationSpec>) -> Result<Vec<Annotation>> {
        tokio::task::yield_now().await;
        let mut added = Vec::new();
        for spec in specs {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let annotation = Annotation {
                id: AnnotationId(format!("annot-{id}")),
                page: spec.page,
                quads: spec.quads,
                color: spec.color,
            };
            self.live.lock().push(annotation.clone());
            added.push(annotation);
        }
        Ok(added)
    }

    async fn remove_annotations(&self, ids: &[AnnotationId]) -> Result<()> {
        tokio::task::yield_now().await;
        if self.fail_removals.load(Ordering::SeqCst) {
            bail!("annotation manager unavailable");
        }
        self.live.lock().retain(|annotation| !ids.contains(&annotation.id));
        Ok(())
    }

    async fn get_selected_content(&self) -> Result<Option<String>> {
        Ok(self.selection.lock().clone())
    }
}

pub(crate) struct FakeSearch {
    hits: Vec<TextMatch>,
    cursor: Mutex<Option<usize>>,
    progress: watch::Sender<SearchProgress>,
    cleared: AtomicBool,
}

impl FakeSearch {
    fn new(hits: Vec<TextMatch>) -> Self {
        let current = if hits.is_empty() { None } else { Some(1) };
        let (progress, _) = watch::channel(SearchProgress {
            current,
            total: hits.len(),
        });
        Self {
            hits,
            cursor: Mutex::new(current),
            progress,
            cleared: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }

    fn step(&self, forward: bool) {
        let total = self.hits.len();
        if total == 0 {
            return;
        }
        let mut cursor = self.cursor.lock();
        let next = match (*cursor, forward) {
            (Some(current), true) => current % total + 1,
            (Some(current), false) if current > 1 => current - 1,
            (_, false) => total,
            (None, true) => 1,
        };
        *cursor = Some(next);
        self.progress.send_replace(SearchProgress {
            current: Some(next),
            total,
        });
    }
}

#[async_trait]
impl SearchHandle for FakeSearch {
    fn matches(&self) -> Vec<TextMatch> {
        self.hits.clone()
    }

    fn progress(&self) -> watch::Receiver<SearchProgress> {
        self.progress.subscribe()
    }

    async fn next(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.step(true);
        Ok(())
    }

    async fn previous(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.step(false);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cleared.store(true, Ordering::SeqCst);
        self.progress.send_replace(SearchProgress::default());
        Ok(())
    }
}
