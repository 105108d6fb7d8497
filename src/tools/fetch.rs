//! Record fetcher: concurrent, district-filtered detail-page extraction over
//! an inclusive id range.
//!
//! Every id runs in its own task with its own browser instance, admitted
//! through a fixed-size semaphore. A task's failure is captured as a
//! [`FetchOutcome`] value, so one crashed or hung id never cancels its
//! siblings; the batch settles only when every id has.

use crate::core::types::Record;
use crate::core::{Emm11Config, PortalError, PortalResult, Progress};
use crate::scraping::extract;
use crate::scraping::portal::{BrowserProvider, PortalPage, RECORD_WAITS};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// What happened to one id.
#[derive(Debug)]
pub enum FetchOutcome {
    Accepted(Record),
    /// Extracted fine, but for another district.
    DistrictMismatch(String),
    Failed(PortalError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub attempted: usize,
    pub accepted: usize,
    pub mismatched: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

struct FetchContext {
    provider: Arc<dyn BrowserProvider>,
    detail_url: String,
    page_load: Duration,
    field_wait: Duration,
    label_wait: Duration,
    progress: Progress,
}

pub struct RecordFetcher {
    ctx: Arc<FetchContext>,
    concurrency: usize,
}

impl RecordFetcher {
    pub fn new(provider: Arc<dyn BrowserProvider>, cfg: &Emm11Config, progress: Progress) -> Self {
        Self {
            ctx: Arc::new(FetchContext {
                provider,
                detail_url: cfg.resolve_detail_url(),
                page_load: cfg.timing.page_load(),
                field_wait: cfg.timing.field_wait(),
                label_wait: cfg.timing.error_label(),
                progress,
            }),
            concurrency: cfg.resolve_fetch_concurrency(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch `[start, end]` and invoke `on_record` once per record whose
    /// destination district equals `district` (case-insensitive). Callback
    /// order across ids is unspecified.
    pub async fn fetch_each<F>(&self, start: u64, end: u64, district: &str, on_record: F) -> FetchSummary
    where
        F: Fn(Record) + Send + Sync + 'static,
    {
        let started = Instant::now();
        let mut summary = FetchSummary::default();
        if start > end {
            self.ctx
                .progress
                .warn(format!("⚠️ Empty range: start {start} is after end {end}"));
            return summary;
        }

        let on_record = Arc::new(on_record);
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let district: Arc<str> = Arc::from(district.trim());
        let mut tasks = JoinSet::new();

        for id in start..=end {
            let ctx = Arc::clone(&self.ctx);
            let gate = Arc::clone(&gate);
            let district = Arc::clone(&district);
            let on_record = Arc::clone(&on_record);
            tasks.spawn(async move {
                let _permit = match gate.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => return FetchOutcome::Failed(PortalError::PerUnit(format!("admission gate closed: {e}"))),
                };
                let outcome = fetch_single(&ctx, id, &district).await;
                match &outcome {
                    FetchOutcome::Accepted(record) => {
                        ctx.progress.line(format!("[{id}] ✅ Found: ISTP {} / OSTP {}", record.istp, record.ostp));
                        (*on_record)(record.clone());
                    }
                    FetchOutcome::DistrictMismatch(found) => {
                        ctx.progress.line(format!("[{id}] ⚠️ District mismatch: {found}"));
                    }
                    FetchOutcome::Failed(e) if e.is_timeout() => {
                        ctx.progress.warn(format!("[{id}] ⏱ Timeout while loading page: {e}"));
                    }
                    FetchOutcome::Failed(e) => {
                        ctx.progress.warn(format!("[{id}] ❌ Error: {e}"));
                    }
                }
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            summary.attempted += 1;
            match joined {
                Ok(FetchOutcome::Accepted(_)) => summary.accepted += 1,
                Ok(FetchOutcome::DistrictMismatch(_)) => summary.mismatched += 1,
                Ok(FetchOutcome::Failed(_)) => summary.failed += 1,
                Err(e) => {
                    error!("fetch task aborted: {}", e);
                    summary.failed += 1;
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.ctx.progress.line(format!(
            "[LOG] Fetch settled: {}/{} accepted, {} other district, {} failed, {}ms",
            summary.accepted, summary.attempted, summary.mismatched, summary.failed, summary.duration_ms
        ));
        summary
    }

    /// Like [`fetch_each`](Self::fetch_each) but collects the accepted records, ordered by id.
    pub async fn fetch(&self, start: u64, end: u64, district: &str) -> Vec<Record> {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        self.fetch_each(start, end, district, move |record| {
            if let Ok(mut records) = sink.lock() {
                records.push(record);
            }
        })
        .await;

        let mut records = collected
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default();
        records.sort_by_key(|r| r.id);
        self.ctx
            .progress
            .line(format!("[LOG] Total fetched entries: {}", records.len()));
        records
    }
}

/// Acquire a browser, run the extraction, release the browser on every path.
async fn fetch_single(ctx: &FetchContext, id: u64, district: &str) -> FetchOutcome {
    let mut browser = match ctx.provider.launch().await {
        Ok(b) => b,
        Err(e) => return FetchOutcome::Failed(e),
    };

    let outcome = match browser.new_page().await {
        Ok(mut page) => {
            let result = extract_record(ctx, page.as_mut(), id).await;
            page.close().await;
            match result {
                Ok(record) if record.in_district(district) => {
                    FetchOutcome::Accepted(record)
                }
                Ok(record) => FetchOutcome::DistrictMismatch(record.destination_district),
                Err(e) => FetchOutcome::Failed(e),
            }
        }
        Err(e) => FetchOutcome::Failed(e),
    };

    browser.close().await;
    outcome
}

async fn extract_record(ctx: &FetchContext, page: &mut dyn PortalPage, id: u64) -> PortalResult<Record> {
    let url = crate::core::config::detail_url(&ctx.detail_url, &id.to_string());
    debug!("[{id}] loading {}", url);
    page.goto(&url, ctx.page_load).await?;

    for (locator, short) in RECORD_WAITS {
        let wait = if short { ctx.label_wait } else { ctx.field_wait };
        if !page.wait_visible(locator, wait).await? {
            return Err(PortalError::timeout(format!("waiting for {locator}"), wait));
        }
    }

    let html = page.content().await?;
    extract::record_from_html(id, &html)
}
