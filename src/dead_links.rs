use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use crate::tree::{Bookmark, Folder, Node, Tree};

/// Name of the folder holding the survivors of a dead-link check.
pub const REACHABLE_FOLDER: &str = "Reachable links";

/// Reachability check for a single URL. `true` means reachable; any failure
/// is reported as `false`.
pub trait LinkProbe {
    fn probe(&self, url: &str) -> impl Future<Output = bool> + Send;
}

impl<F, Fut> LinkProbe for F
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = bool> + Send,
{
    fn probe(&self, url: &str) -> impl Future<Output = bool> + Send {
        self(url.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeadLinkReport {
    pub valid: Vec<Bookmark>,
    pub broken: Vec<Bookmark>,
    /// The run stopped early; the partition covers only the checked prefix.
    pub cancelled: bool,
}

impl DeadLinkReport {
    pub fn checked(&self) -> usize {
        self.valid.len() + self.broken.len()
    }

    /// The replacement tree: one folder holding only the reachable bookmarks.
    pub fn into_tree(self) -> Tree {
        vec![Node::Folder(Folder::new(
            REACHABLE_FOLDER,
            self.valid.into_iter().map(Node::Bookmark).collect(),
        ))]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeProgress {
    pub checked: usize,
    pub total: usize,
    pub broken: usize,
    pub url: String,
    pub reachable: bool,
}

/// Probe every bookmark one after another, waiting `pace` between probes.
///
/// `cancel` is checked before each probe; once set, the remaining bookmarks
/// are left unchecked and the report is marked cancelled.
pub async fn filter_dead_links<P, F>(
    bookmarks: Vec<Bookmark>,
    probe: &P,
    pace: Duration,
    mut on_progress: F,
    cancel: &AtomicBool,
) -> DeadLinkReport
where
    P: LinkProbe + ?Sized,
    F: FnMut(&ProbeProgress),
{
    let total = bookmarks.len();
    let mut report = DeadLinkReport::default();
    info!("Checking {} bookmarks for dead links", total);

    for (i, bookmark) in bookmarks.into_iter().enumerate() {
        if i > 0 && !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
        if cancel.load(Ordering::Relaxed) {
            info!("Dead-link check cancelled after {} of {}", i, total);
            report.cancelled = true;
            break;
        }

        let reachable = probe.probe(&bookmark.url).await;
        debug!(
            "{} {}",
            if reachable { "reachable" } else { "broken" },
            bookmark.url
        );

        let url = bookmark.url.clone();
        if reachable {
            report.valid.push(bookmark);
        } else {
            report.broken.push(bookmark);
        }
        on_progress(&ProbeProgress {
            checked: i + 1,
            total,
            broken: report.broken.len(),
            url,
            reachable,
        });
    }

    if !report.cancelled {
        info!(
            "Dead-link check finished: {} reachable, {} broken",
            report.valid.len(),
            report.broken.len()
        );
    }
    report
}

// ---- HTTP Probe ----

/// Probe backed by real HTTP requests. A 2xx or 3xx answer counts as
/// reachable; servers refusing `HEAD` are asked again with `GET`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("bookmark-shelf/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn check(&self, url: &str) -> Result<bool, reqwest::Error> {
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::METHOD_NOT_ALLOWED
            || status == reqwest::StatusCode::NOT_IMPLEMENTED
        {
            let response = self.client.get(url).send().await?;
            return Ok(is_reachable(response.status()));
        }
        Ok(is_reachable(status))
    }
}

fn is_reachable(status: reqwest::StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

impl LinkProbe for HttpProbe {
    fn probe(&self, url: &str) -> impl Future<Output = bool> + Send {
        let url = url.to_string();
        async move {
            match self.check(&url).await {
                Ok(reachable) => reachable,
                Err(e) => {
                    debug!("Probe failed for {}: {}", url, e);
                    false
                }
            }
        }
    }
}
