//! Capability surface of the embedded PDF widget.
//!
//! The widget is a black box: it is loaded once per process, previews one
//! file at a time inside the mounted container, and hands back a capability
//! object once the preview has initialized. Every call on it may suspend.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Corner points of one highlighted text run, in the widget's page coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub x3: f32,
    pub y3: f32,
    pub x4: f32,
    pub y4: f32,
}

impl Quad {
    /// Axis-aligned quad from a left/top/right/bottom box.
    pub fn from_bounds(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            x1: left,
            y1: top,
            x2: right,
            y2: top,
            x3: left,
            y3: bottom,
            x4: right,
            y4: bottom,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        let width = (self.x2 - self.x1).abs().max((self.x4 - self.x3).abs());
        let height = (self.y3 - self.y1).abs().max((self.y4 - self.y2).abs());
        width <= f32::EPSILON || height <= f32::EPSILON
    }
}

/// One search hit as reported by the widget. Pages are one-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub page: u32,
    pub quads: Vec<Quad>,
}

impl TextMatch {
    /// A hit is usable for highlighting when it has at least one non-empty quad.
    pub fn region(&self) -> Option<Vec<Quad>> {
        let quads: Vec<Quad> = self
            .quads
            .iter()
            .filter(|quad| !quad.is_degenerate())
            .copied()
            .collect();
        if quads.is_empty() {
            None
        } else {
            Some(quads)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Default for Rgb {
    fn default() -> Self {
        Rgb(255, 215, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    Highlight,
}

/// Annotation as requested by this crate; the widget assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSpec {
    pub kind: AnnotationKind,
    pub page: u32,
    pub quads: Vec<Quad>,
    pub color: Rgb,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationId(pub String);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page: u32,
    pub quads: Vec<Quad>,
    pub color: Rgb,
}

/// Cursor state pushed by a widget search. `current` is one-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchProgress {
    pub current: Option<usize>,
    pub total: usize,
}

/// Loads the widget runtime and mounts previews into the viewer container.
#[async_trait]
pub trait WidgetHost: Send + Sync {
    /// One-time runtime load. Called at most once per [`crate::WidgetRuntime`].
    async fn load(&self) -> Result<()>;

    /// Prepares a preview of `content` off-screen. The container keeps
    /// showing its current instance until [`WidgetHost::mount`] is called.
    async fn preview_file(
        &self,
        content: Bytes,
        file_name: &str,
    ) -> Result<Arc<dyn ViewerCapability>>;

    /// Shows the prepared preview of `file_name` in the container, replacing
    /// whatever it showed before.
    fn mount(&self, file_name: &str);

    /// Releases the mounted widget instance, if any.
    fn unmount(&self);
}

#[async_trait]
pub trait ViewerCapability: Send + Sync {
    async fn goto_location(&self, page: u32) -> Result<()>;
    async fn search(&self, query: &str) -> Result<Arc<dyn SearchHandle>>;
    async fn add_annotations(&self, specs: Vec<AnnotationSpec>) -> Result<Vec<Annotation>>;
    async fn remove_annotations(&self, ids: &[AnnotationId]) -> Result<()>;
    async fn get_selected_content(&self) -> Result<Option<String>>;
}

/// Widget-native search object returned by [`ViewerCapability::search`].
#[async_trait]
pub trait SearchHandle: Send + Sync {
    /// All hits in reading order.
    fn matches(&self) -> Vec<TextMatch>;
    fn progress(&self) -> watch::Receiver<SearchProgress>;
    async fn next(&self) -> Result<()>;
    async fn previous(&self) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}
