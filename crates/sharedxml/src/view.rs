//! Live rendering of a document opened by id
//!
//! Change notifications feed two debounced stages: a short one that
//! re-attaches subscriptions so new records are covered, and a long one that
//! re-renders the tree and publishes the lines.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::debounce::{self, spawn_debounced};
use crate::document::SharedDocument;
use crate::error::Result;
use crate::load::DocumentId;
use crate::render::render;
use crate::service::DocumentService;
use crate::store::MapId;
use crate::subscribe::Subscriptions;

pub type Lines = Arc<Vec<String>>;

pub struct LiveView {
    document: Arc<SharedDocument>,
    root: MapId,
    subscriptions: Arc<Subscriptions>,
    lines: watch::Sender<Lines>,
    refreshes: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveView {
    /// Open an existing document and keep its rendering current. Waits for
    /// the tree root as configured.
    pub async fn open(service: &dyn DocumentService, id: DocumentId, config: &Config) -> Result<Self> {
        let document = service.acquire(id, false)?;
        let root = document
            .wait_tree_root(config.poll_interval, config.wait_timeout)
            .await?;
        let store = Arc::clone(document.store());

        let (refetch, refetch_rx) = debounce::channel();
        let (rerender, render_rx) = debounce::channel();

        let subscriptions = Arc::new(Subscriptions::new(Arc::clone(&store), move || {
            refetch.notify();
        }));
        let hooked = subscriptions.attach(root)?;
        debug!(document = %id, hooked, "live view subscribed");

        let (lines, _) = watch::channel(Arc::new(render(store.as_ref(), root, 0)));
        let refreshes = Arc::new(AtomicU64::new(0));

        let resubscribe = {
            let subscriptions = Arc::clone(&subscriptions);
            spawn_debounced(refetch_rx, config.refetch_debounce, move |absorbed| {
                match subscriptions.attach(root) {
                    Ok(hooked) => debug!(absorbed, hooked, "re-subscribed"),
                    Err(err) => warn!("failed to re-subscribe to {root}: {err}"),
                }
                rerender.notify();
                std::future::ready(())
            })
        };

        let publish = {
            let lines = lines.clone();
            let refreshes = Arc::clone(&refreshes);
            spawn_debounced(render_rx, config.render_debounce, move |_| {
                lines.send_replace(Arc::new(render(store.as_ref(), root, 0)));
                refreshes.fetch_add(1, Ordering::SeqCst);
                std::future::ready(())
            })
        };

        info!(document = %id, "live view open");
        Ok(Self {
            document,
            root,
            subscriptions,
            lines,
            refreshes,
            tasks: vec![resubscribe, publish],
        })
    }

    pub fn document(&self) -> &Arc<SharedDocument> {
        &self.document
    }

    pub fn root(&self) -> MapId {
        self.root
    }

    /// Render the tree as it is right now
    pub fn snapshot(&self) -> Vec<String> {
        render(self.document.store().as_ref(), self.root, 0)
    }

    /// Last published rendering
    pub fn published(&self) -> Lines {
        Arc::clone(&self.lines.borrow())
    }

    pub fn updates(&self) -> watch::Receiver<Lines> {
        self.lines.subscribe()
    }

    /// Re-renders published since opening
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.subscriptions.detach();
    }
}

impl fmt::Debug for LiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveView")
            .field("document", &self.document.id())
            .field("root", &self.root)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorCategory;
    use crate::service::{acquire_or_create, LocalDocumentService};
    use crate::xml;

    fn config() -> Config {
        Config {
            poll_interval: Duration::from_millis(10),
            wait_timeout: Some(Duration::from_millis(100)),
            refetch_debounce: Duration::from_millis(10),
            render_debounce: Duration::from_millis(50),
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_document_is_not_found() {
        let service = LocalDocumentService::default();
        let err = LiveView::open(&service, DocumentId::new(), &config())
            .await
            .err();
        assert_eq!(err.map(|e| e.category()), Some(ErrorCategory::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_root_times_out() -> Result<()> {
        let service = LocalDocumentService::default();
        let id = DocumentId::new();
        acquire_or_create(&service, id)?;
        let err = LiveView::open(&service, id, &config()).await.err();
        assert_eq!(err.map(|e| e.category()), Some(ErrorCategory::Timeout));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_follows_loading() -> Result<()> {
        let service = LocalDocumentService::default();
        let id = DocumentId::new();
        let document = acquire_or_create(&service, id)?;
        document.create_tree_root()?;

        let view = LiveView::open(&service, id, &config()).await?;
        assert!(view.published().is_empty());

        let mut updates = view.updates();
        document.load_xml(r#"<a x="1"><b>hello</b><c/></a>"#, xml::Config::default())?;
        let _ = updates.changed().await;

        assert_eq!(view.refresh_count(), 1);
        assert_eq!(view.published().as_slice(), view.snapshot().as_slice());
        assert_eq!(
            view.published().as_slice(),
            [
                "a",
                "  Attributes:",
                "    x: 1",
                "  Children:",
                "    b",
                "      Children:",
                "        Type: text, Value: hello",
                "    c",
            ]
        );
        Ok(())
    }
}
