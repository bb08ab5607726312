use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfnav_core::{
    Annotation, AnnotationId, AnnotationSpec, Quad, SearchHandle, SearchProgress, TextMatch,
    ViewerCapability, WidgetHost,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const LIBRARY_PATH_ENV: &str = "PDFNAV_PDFIUM_LIBRARY_PATH";

/// Widget host backed by Pdfium. `load` binds the shared library once; each
/// preview opens the document from memory and keeps its annotations as an
/// in-memory overlay.
pub struct PdfiumWidgetHost {
    library_path: Option<PathBuf>,
    pdfium: OnceCell<Arc<Pdfium>>,
    mounted: Mutex<Option<String>>,
}

impl PdfiumWidgetHost {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self {
            library_path,
            pdfium: OnceCell::new(),
            mounted: Mutex::new(None),
        }
    }

    pub fn mounted_file(&self) -> Option<String> {
        self.mounted.lock().clone()
    }

    fn bound(&self) -> Result<Arc<Pdfium>> {
        self.pdfium
            .get()
            .cloned()
            .ok_or_else(|| anyhow!("pdfium runtime has not been loaded"))
    }
}

#[async_trait]
impl WidgetHost for PdfiumWidgetHost {
    async fn load(&self) -> Result<()> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os(LIBRARY_PATH_ENV).map(PathBuf::from));
        let pdfium = tokio::task::spawn_blocking(move || match configured {
            Some(path) => bind_pdfium_at(&path),
            None => bind_pdfium_default(),
        })
        .await
        .context("pdfium binding task failed")??;
        // A concurrent load may have won; either binding is equivalent.
        let _ = self.pdfium.set(Arc::new(pdfium));
        Ok(())
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn preview_file(
        &self,
        content: Bytes,
        file_name: &str,
    ) -> Result<Arc<dyn ViewerCapability>> {
        let pdfium = self.bound()?;
        let name = file_name.to_owned();
        let viewer = tokio::task::spawn_blocking(move || PdfiumViewer::open(pdfium, content, name))
            .await
            .context("pdf preview task failed")??;
        info!(pages = viewer.page_count, "document opened");
        Ok(Arc::new(viewer))
    }

    fn mount(&self, file_name: &str) {
        let previous = self.mounted.lock().replace(file_name.to_owned());
        debug!(file = %file_name, ?previous, "viewer mounted");
    }

    fn unmount(&self) {
        if let Some(name) = self.mounted.lock().take() {
            debug!(file = %name, "viewer unmounted");
        }
    }
}

/// An open document together with the bindings it borrows.
struct LoadedDocument {
    document: Mutex<PdfDocument<'static>>,
    #[allow(dead_code)] // owns the bindings `document` borrows
    pdfium: Arc<Pdfium>,
}

impl LoadedDocument {
    fn open(pdfium: Arc<Pdfium>, content: Bytes, file_name: &str) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_vec(content.to_vec(), None)
            .with_context(|| format!("failed to open {file_name}"))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. It is
        // stored in `self.document`, declared before `self.pdfium`, so it is
        // dropped first and the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(Self {
            document: Mutex::new(document),
            pdfium,
        })
    }

    fn page_count(&self) -> u32 {
        u32::try_from(self.document.lock().pages().len()).unwrap_or_default()
    }

    /// Every hit in reading order, with quads normalized to the page box.
    fn find_matches(&self, query: &str) -> Result<Vec<TextMatch>> {
        let document = self.document.lock();
        let options = PdfSearchOptions::new();
        let mut matches = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let page_width = page.width().value;
            let page_height = page.height().value;
            if page_width <= 0.0 || page_height <= 0.0 {
                continue;
            }
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", index + 1))?;
            let search = text
                .search(query, &options)
                .with_context(|| format!("failed to perform search on page {}", index + 1))?;
            let page_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            while let Some(segments) = search.find_next() {
                let quads = segments
                    .iter()
                    .map(|segment| {
                        let bounds = segment.bounds();
                        normalized_quad(
                            bounds.left().value,
                            bounds.top().value,
                            bounds.right().value,
                            bounds.bottom().value,
                            page_width,
                            page_height,
                        )
                    })
                    .collect();
                matches.push(TextMatch {
                    page: page_number,
                    quads,
                });
            }
        }
        Ok(matches)
    }
}

struct PdfiumViewer {
    file_name: String,
    page_count: u32,
    document: Arc<LoadedDocument>,
    location: Arc<Mutex<u32>>,
    overlay: Mutex<Vec<Annotation>>,
    selection: Arc<Mutex<Option<String>>>,
}

impl PdfiumViewer {
    fn open(pdfium: Arc<Pdfium>, content: Bytes, file_name: String) -> Result<Self> {
        let document = LoadedDocument::open(pdfium, content, &file_name)?;
        let page_count = document.page_count();
        if page_count == 0 {
            bail!("{file_name} has no pages");
        }
        Ok(Self {
            file_name,
            page_count,
            document: Arc::new(document),
            location: Arc::new(Mutex::new(1)),
            overlay: Mutex::new(Vec::new()),
            selection: Arc::new(Mutex::new(None)),
        })
    }

    fn check_page(&self, page: u32) -> Result<()> {
        check_page(&self.file_name, self.page_count, page)
    }
}

fn check_page(file_name: &str, page_count: u32, page: u32) -> Result<()> {
    if page == 0 || page > page_count {
        bail!("page {page} out of range for {file_name} ({page_count} pages)");
    }
    Ok(())
}

/// Maps a Pdfium box (origin bottom-left, points) onto the unit square with
/// the origin top-left.
fn normalized_quad(
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    page_width: f32,
    page_height: f32,
) -> Quad {
    let x = |value: f32| (value / page_width).clamp(0.0, 1.0);
    let y = |value: f32| (1.0 - value / page_height).clamp(0.0, 1.0);
    Quad::from_bounds(x(left), y(top), x(right), y(bottom))
}

#[async_trait]
impl ViewerCapability for PdfiumViewer {
    async fn goto_location(&self, page: u32) -> Result<()> {
        self.check_page(page)?;
        *self.location.lock() = page;
        debug!(file = %self.file_name, page, "moved to page");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Arc<dyn SearchHandle>> {
        let query = query.trim();
        let matches = if query.is_empty() {
            Vec::new()
        } else {
            let document = Arc::clone(&self.document);
            let needle = query.to_owned();
            tokio::task::spawn_blocking(move || document.find_matches(&needle))
                .await
                .context("pdf search task failed")??
        };
        debug!(hits = matches.len(), "search finished");
        Ok(Arc::new(PdfiumSearch::new(
            query.to_owned(),
            matches,
            Arc::clone(&self.location),
            Arc::clone(&self.selection),
        )))
    }

    async fn add_annotations(&self, specs: Vec<AnnotationSpec>) -> Result<Vec<Annotation>> {
        for spec in &specs {
            self.check_page(spec.page)?;
        }
        let added: Vec<Annotation> = specs
            .into_iter()
            .map(|spec| Annotation {
                id: AnnotationId(Uuid::new_v4().to_string()),
                page: spec.page,
                quads: spec.quads,
                color: spec.color,
            })
            .collect();
        self.overlay.lock().extend(added.iter().cloned());
        Ok(added)
    }

    async fn remove_annotations(&self, ids: &[AnnotationId]) -> Result<()> {
        let mut overlay = self.overlay.lock();
        let before = overlay.len();
        overlay.retain(|annotation| !ids.contains(&annotation.id));
        if before - overlay.len() != ids.len() {
            warn!(file = %self.file_name, "some annotations were already gone");
        }
        Ok(())
    }

    async fn get_selected_content(&self) -> Result<Option<String>> {
        Ok(self.selection.lock().clone())
    }
}

/// Cursor over one search. Starts on the first hit without moving the view;
/// stepping selects the hit and shows its page.
struct PdfiumSearch {
    query: String,
    matches: Vec<TextMatch>,
    cursor: Mutex<Cursor>,
    progress: watch::Sender<SearchProgress>,
    location: Arc<Mutex<u32>>,
    selection: Arc<Mutex<Option<String>>>,
}

impl PdfiumSearch {
    fn new(
        query: String,
        matches: Vec<TextMatch>,
        location: Arc<Mutex<u32>>,
        selection: Arc<Mutex<Option<String>>>,
    ) -> Self {
        let index = (!matches.is_empty()).then_some(1);
        let (progress, _) = watch::channel(SearchProgress {
            current: index,
            total: matches.len(),
        });
        Self {
            query,
            matches,
            cursor: Mutex::new(Cursor {
                index,
                selected: false,
            }),
            progress,
            location,
            selection,
        }
    }

    fn move_cursor(&self, forward: bool) {
        let mut cursor = self.cursor.lock();
        let Some(next) = step_cursor(cursor.index, self.matches.len(), forward) else {
            return;
        };
        cursor.index = Some(next);
        if let Some(hit) = self.matches.get(next - 1) {
            *self.location.lock() = hit.page;
            *self.selection.lock() = Some(self.query.clone());
            cursor.selected = true;
        }
        self.progress.send_replace(SearchProgress {
            current: Some(next),
            total: self.matches.len(),
        });
    }
}

#[async_trait]
impl SearchHandle for PdfiumSearch {
    fn matches(&self) -> Vec<TextMatch> {
        self.matches.clone()
    }

    fn progress(&self) -> watch::Receiver<SearchProgress> {
        self.progress.subscribe()
    }

    async fn next(&self) -> Result<()> {
        self.move_cursor(true);
        Ok(())
    }

    async fn previous(&self) -> Result<()> {
        self.move_cursor(false);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut cursor = self.cursor.lock();
        cursor.index = None;
        if std::mem::take(&mut cursor.selected) {
            self.selection.lock().take();
        }
        self.progress.send_replace(SearchProgress::default());
        Ok(())
    }
}

struct Cursor {
    index: Option<usize>,
    /// Whether this search put its query into the viewer selection.
    selected: bool,
}

/// One-based cursor movement that wraps at both ends.
fn step_cursor(cursor: Option<usize>, total: usize, forward: bool) -> Option<usize> {
    if total == 0 {
        return None;
    }
    Some(match (cursor, forward) {
        (None, true) => 1,
        (None, false) => total,
        (Some(current), true) => current % total + 1,
        (Some(current), false) if current > 1 => current - 1,
        (Some(_), false) => total,
    })
}

fn bind_pdfium_at(path: &Path) -> Result<Pdfium> {
    let library = if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    };
    let bindings = Pdfium::bind_to_library(&library)
        .map_err(|err| anyhow!("failed to load Pdfium from {}: {err}", library.display()))?;
    info!(path = %library.display(), "bound configured pdfium library");
    Ok(Pdfium::new(bindings))
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {LIBRARY_PATH_ENV} ({})",
                errors.join(", ")
            ))
        }
    }
}
