use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use pdfnav_core::{
    parse_references, File, FileSetManager, GotoOutcome, HighlightStatus, NavError,
    NavigationCoordinator, NavigatorConfig, ResultReference, ResultSource, SearchSession,
    WidgetRuntime,
};
use pdfnav_render::PdfiumWidgetHost;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pdfnav",
    version,
    about = "Follow outline, section and snippet results into a PDF viewer"
)]
struct Args {
    /// PDF files to load
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Document label to open; matched loosely against the loaded file names
    #[arg(short = 'g', long = "goto")]
    goto: Option<String>,

    /// Page to open (1-based)
    #[arg(short = 'p', long = "page", default_value_t = 1)]
    page: u32,

    /// Text to highlight on the target page
    #[arg(long)]
    highlight: Option<String>,

    /// Analysis backend response (JSON) whose references should be followed
    #[arg(short = 'r', long = "results", value_name = "FILE")]
    results: Option<PathBuf>,

    /// Kind of response passed with --results
    #[arg(long, value_enum, default_value_t = SourceArg::Section)]
    source: SourceArg,

    /// Follow only the N-th reference of --results (1-based)
    #[arg(long, value_name = "N")]
    pick: Option<usize>,

    /// Search the document left open after navigation
    #[arg(short = 's', long = "search")]
    search: Option<String>,

    /// Advance the search cursor this many times
    #[arg(long, default_value_t = 0)]
    next: usize,

    /// Print the snippet-search request for the current selection
    #[arg(long)]
    snippet_query: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pdfium shared library, or the directory containing it
    #[arg(long, value_name = "PATH")]
    pdfium: Option<PathBuf>,

    /// How long a highlight waits for the viewer, in milliseconds
    #[arg(long, value_name = "MS")]
    ready_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Outline,
    Section,
    Snippet,
}

impl From<SourceArg> for ResultSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Outline => ResultSource::Outline,
            SourceArg::Section => ResultSource::Section,
            SourceArg::Snippet => ResultSource::Snippet,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfnav", "pdfnav")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;
    let config = load_config(&args)?;

    let files = Arc::new(FileSetManager::new());
    let added = files.add(read_files(&args.files)?);
    if added.is_empty() {
        return Err(anyhow!("none of the given files is a readable PDF"));
    }
    info!(count = added.len(), "files loaded");

    let host = Arc::new(PdfiumWidgetHost::new(
        config.render.pdfium_library_path.clone(),
    ));
    let runtime = WidgetRuntime::new(host);
    let nav = NavigationCoordinator::new(Arc::clone(&files), runtime, &config);

    let mut last = None;
    for reference in references(&args, &added)? {
        match nav.follow(&reference).await {
            Ok(outcome) => {
                print_outcome(&outcome);
                last = Some(outcome.generation);
            }
            Err(err @ NavError::DocumentNotFound(_)) => println!("skipped: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(generation) = last {
        let waited = tokio::time::timeout(
            config.ready_timeout(),
            nav.session().wait_ready(generation),
        )
        .await;
        match waited {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!(%err, "viewer failed to load"),
            Err(_) => warn!("viewer still loading"),
        }
    }

    if let Some(query) = args.search.as_deref() {
        match nav.search(query).await? {
            Some(session) => print_search(&session),
            None => println!("search cleared"),
        }
        for _ in 0..args.next {
            print_search(&nav.search_next().await?);
        }
    }

    if args.snippet_query {
        match nav.selected_snippet_query().await? {
            Some(query) => println!("{}", serde_json::to_string_pretty(&query)?),
            None => println!("nothing selected"),
        }
    }

    let status = nav.status();
    match (status.file.as_deref(), status.message()) {
        (Some(file), None) => println!("viewing {file}, page {}", status.page),
        (_, Some(message)) => println!("{message}"),
        (None, None) => {}
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<NavigatorConfig> {
    let mut config = match &args.config {
        Some(path) => NavigatorConfig::load(path),
        None => NavigatorConfig::load_default(),
    }
    .context("failed to load configuration")?;

    if let Some(path) = &args.pdfium {
        config.render.pdfium_library_path = Some(path.clone());
    }
    if let Some(timeout) = args.ready_timeout_ms {
        config.highlight.ready_timeout_ms = timeout;
    }
    config.validate().context("invalid command line override")?;
    Ok(config)
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<File>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = File::from_path(path)?;
        if !file.is_pdf() {
            warn!(path = %path.display(), "not a PDF, skipping");
            continue;
        }
        files.push(file);
    }
    Ok(files)
}

fn references(args: &Args, loaded: &[String]) -> Result<Vec<ResultReference>> {
    if let Some(path) = &args.results {
        let mut references = read_results(path, args.source.into())?;
        if let Some(pick) = args.pick {
            let index = pick
                .checked_sub(1)
                .filter(|index| *index < references.len())
                .ok_or_else(|| {
                    anyhow!("--pick {pick} is out of range ({} references)", references.len())
                })?;
            references = vec![references.swap_remove(index)];
        }
        return Ok(references);
    }

    let label = match &args.goto {
        Some(label) => label.clone(),
        None => loaded
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("no document to open"))?,
    };
    let mut reference = ResultReference::new(label, args.page);
    if let Some(text) = &args.highlight {
        reference = reference.with_text(text.as_str());
    }
    Ok(vec![reference])
}

fn read_results(path: &Path, source: ResultSource) -> Result<Vec<ResultReference>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read results from {:?}", path))?;
    parse_references(source, &body).with_context(|| format!("failed to parse {:?}", path))
}

fn print_outcome(outcome: &GotoOutcome) {
    let target = format!("{} p.{}", outcome.file, outcome.page);
    match &outcome.highlight {
        HighlightStatus::NotRequested => println!("{target}"),
        HighlightStatus::Placed(annotation) => {
            println!("{target}: highlighted ({})", annotation.id)
        }
        HighlightStatus::Failed(err) => println!("{target}: highlight skipped, {err}"),
        HighlightStatus::Superseded => println!("{target}: superseded by a later request"),
    }
}

fn print_search(session: &SearchSession) {
    println!(
        "\"{}\": {}/{}",
        session.query, session.cursor_index, session.total_results
    );
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfnav.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["pdfnav", "invoice.pdf", "guide.pdf"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn loaded() -> Vec<String> {
        vec!["invoice.pdf".into(), "guide.pdf".into()]
    }

    #[test]
    fn defaults_to_first_loaded_file() {
        let refs = references(&args(&[]), &loaded()).unwrap();
        assert_eq!(refs, vec![ResultReference::new("invoice.pdf", 1)]);
    }

    #[test]
    fn goto_flags_build_one_reference() {
        let refs = references(
            &args(&["--goto", "Invoice", "-p", "3", "--highlight", "Total Due"]),
            &loaded(),
        )
        .unwrap();
        assert_eq!(
            refs,
            vec![ResultReference::new("Invoice", 3).with_text("Total Due")]
        );
    }

    #[test]
    fn pick_selects_from_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snippets.json");
        fs::write(
            &path,
            r#"{"snippets": [
                {"document": "guide.pdf", "page_number": 2, "text": "a"},
                {"document": "invoice.pdf", "page_number": 3, "text": "b"}
            ]}"#,
        )
        .unwrap();
        let results = path.to_string_lossy().into_owned();

        let refs = references(
            &args(&["--results", results.as_str(), "--source", "snippet", "--pick", "2"]),
            &loaded(),
        )
        .unwrap();
        assert_eq!(refs, vec![ResultReference::new("invoice.pdf", 3)]);

        let err = references(
            &args(&["--results", results.as_str(), "--source", "snippet", "--pick", "3"]),
            &loaded(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
