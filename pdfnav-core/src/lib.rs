//! Viewer synchronization and cross-reference navigation for an embedded,
//! asynchronously loaded PDF widget.
//!
//! [`NavigationCoordinator`] is the entry point: result producers hand it a
//! document label and page, it resolves the label against the
//! [`FileSetManager`] and drives the [`ViewerSession`], [`AnnotationSync`]
//! and [`SearchController`] of the single mounted viewer.

mod annotate;
mod config;
mod error;
mod files;
mod navigate;
mod resolve;
mod results;
mod runtime;
mod search;
mod session;
#[cfg(test)]
mod testing;
mod widget;

pub use annotate::{AnnotationSync, HighlightOutcome, HighlightStyle};
pub use config::{HighlightConfig, NavigatorConfig, RenderConfig};
pub use error::{NavError, Result};
pub use files::{File, FileSetChange, FileSetManager, FileSetObserver};
pub use navigate::{GotoOutcome, HighlightStatus, NavigationCoordinator};
pub use resolve::{normalize_label, resolve};
pub use results::{
    parse_references, Envelope, Heading, Outline, OutlineDocument, RankedSection, RankedSections,
    ResultReference, ResultSource, Snippet, SnippetQuery, SnippetResults, SubsectionAnalysis,
};
pub use runtime::{RuntimeState, WidgetRuntime};
pub use search::{SearchController, SearchSession};
pub use session::{BindOutcome, BindTicket, PageRequest, ViewerPhase, ViewerSession, ViewerStatus};
pub use widget::{
    Annotation, AnnotationId, AnnotationKind, AnnotationSpec, Quad, Rgb, SearchHandle,
    SearchProgress, TextMatch, ViewerCapability, WidgetHost,
};
