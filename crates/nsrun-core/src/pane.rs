use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Editor column an output pane is revealed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewColumn {
    #[default]
    Active,
    One,
    Two,
    Three,
}

/// Presentation surface receiving a run's output
#[async_trait]
pub trait OutputPane: Send + Sync {
    fn title(&self) -> &str;

    fn show(&self, column: ViewColumn);

    /// Hide the pane, keeping its content
    fn hide(&self);

    fn clear(&self);

    async fn append(&self, text: &str);

    async fn append_line(&self, text: &str) {
        self.append(&format!("{text}\n")).await;
    }
}

/// Creates one pane per run
pub trait PaneFactory: Send + Sync {
    fn create_pane(&self, title: &str) -> Arc<dyn OutputPane>;
}

/// User-visible notifications
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);

    fn warning(&self, message: &str);

    fn info(&self, message: &str);
}

/// Notifier that reports through the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        error!(target: "nsrun::notify", "{message}");
    }

    fn warning(&self, message: &str) {
        warn!(target: "nsrun::notify", "{message}");
    }

    fn info(&self, message: &str) {
        info!(target: "nsrun::notify", "{message}");
    }
}

/// Shared async writer several panes can print to
pub type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>;

/// Pane backed by an async writer such as the process stdout.
///
/// Text is written as it arrives; visibility is tracked but does not gate
/// writes, so hidden content stays available in the underlying stream.
pub struct WriterPane {
    title: String,
    visible: AtomicBool,
    out: SharedWriter,
}

impl WriterPane {
    pub fn new(title: impl Into<String>, out: SharedWriter) -> Self {
        Self {
            title: title.into(),
            visible: AtomicBool::new(false),
            out,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputPane for WriterPane {
    fn title(&self) -> &str {
        &self.title
    }

    fn show(&self, column: ViewColumn) {
        self.visible.store(true, Ordering::SeqCst);
        debug!(pane = %self.title, column = ?column, "Showing output pane");
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
        debug!(pane = %self.title, "Hiding output pane");
    }

    fn clear(&self) {
        debug!(pane = %self.title, "Clearing output pane");
    }

    async fn append(&self, text: &str) {
        let mut out = self.out.lock().await;
        if let Err(e) = out.write_all(text.as_bytes()).await {
            debug!(pane = %self.title, error = %e, "Failed to write pane output");
            return;
        }
        let _ = out.flush().await;
    }
}

/// Creates `WriterPane`s that share one writer
#[derive(Clone)]
pub struct WriterPaneFactory {
    out: SharedWriter,
}

impl WriterPaneFactory {
    pub fn new(out: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }
}

impl PaneFactory for WriterPaneFactory {
    fn create_pane(&self, title: &str) -> Arc<dyn OutputPane> {
        Arc::new(WriterPane::new(title, self.out.clone()))
    }
}
