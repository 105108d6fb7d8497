//! End-to-end run: fetch → login + probe → synthesize.
//!
//! Stages run strictly one after another; each consumes the previous stage's
//! output. Stage-level outcomes are reported as explicit notices instead of
//! leaving the caller to infer them from missing output.

use crate::core::config::Credentials;
use crate::core::types::{Record, TpPair};
use crate::core::{Emm11Config, PortalError, PortalResult, Progress};
use crate::features::captcha::CaptchaRecognizer;
use crate::scraping::{BrowserProvider, PortalSession};
use crate::tools::fetch::RecordFetcher;
use crate::tools::login::Authenticator;
use crate::tools::probe::ValidityProber;
use crate::tools::synthesize::{prepare_output_dir, DocumentSynthesizer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

pub const NOTICE_NO_DATA: &str = "no data found";
pub const NOTICE_NO_UNUSED: &str = "no unused pairs found";
pub const NOTICE_NO_OUTPUT: &str = "failed to generate merged output";

/// Probe pairs for `records`, excluding any record with an empty pass number.
pub fn derive_pairs(records: &[Record], progress: &Progress) -> Vec<TpPair> {
    records
        .iter()
        .filter_map(|r| {
            let pair = r.tp_pair();
            if pair.is_none() {
                progress.warn(format!("⚠️ [{}] missing ISTP or OSTP, not probed", r.id));
            }
            pair
        })
        .collect()
}

/// Flag every record by whether its inbound pass is among `unused`.
pub fn mark_unused(records: &mut [Record], unused: &[TpPair]) {
    let unused: HashSet<&str> = unused.iter().map(|p| p.istp.as_str()).collect();
    for record in records {
        record.unused = Some(unused.contains(record.istp.trim()));
    }
}

/// Inbound-pass identifiers of the records flagged unused, in record order.
pub fn unused_identifiers(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.unused == Some(true))
        .map(|r| r.istp.trim().to_string())
        .collect()
}

/// Open one session, log in, probe, and close the session on every path.
pub async fn authenticate_and_probe(
    provider: &dyn BrowserProvider,
    authenticator: &Authenticator,
    prober: &ValidityProber,
    credentials: &Credentials,
    pairs: &[TpPair],
) -> PortalResult<Vec<TpPair>> {
    let mut session = PortalSession::open(provider).await?;
    let result = match authenticator.login(&mut session, credentials).await {
        Ok(()) => Ok(prober.probe(&mut session, pairs).await),
        Err(e) => Err(e),
    };
    session.close().await;
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    NoData,
    NoUnusedPairs,
    NoMergedOutput,
}

impl RunOutcome {
    /// `NoData` when the fetch stage accepted nothing.
    pub fn after_fetch(records: &[Record]) -> Option<Self> {
        records.is_empty().then_some(Self::NoData)
    }

    /// `NoUnusedPairs` when no marked record came back unused.
    pub fn after_probe(records: &[Record]) -> Option<Self> {
        (!records.iter().any(|r| r.unused == Some(true))).then_some(Self::NoUnusedPairs)
    }

    pub fn notice(self) -> Option<&'static str> {
        match self {
            RunOutcome::Completed => None,
            RunOutcome::NoData => Some(NOTICE_NO_DATA),
            RunOutcome::NoUnusedPairs => Some(NOTICE_NO_UNUSED),
            RunOutcome::NoMergedOutput => Some(NOTICE_NO_OUTPUT),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub start_id: u64,
    pub end_id: u64,
    pub district: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<Record>,
    pub unused_identifiers: Vec<String>,
    pub merged_path: Option<PathBuf>,
    pub outcome: RunOutcome,
}

pub struct Pipeline {
    cfg: Emm11Config,
    provider: Arc<dyn BrowserProvider>,
    recognizer: Arc<dyn CaptchaRecognizer>,
    progress: Progress,
}

impl Pipeline {
    pub fn new(
        cfg: Emm11Config,
        provider: Arc<dyn BrowserProvider>,
        recognizer: Arc<dyn CaptchaRecognizer>,
        progress: Progress,
    ) -> Self {
        Self {
            cfg,
            provider,
            recognizer,
            progress,
        }
    }

    pub fn fetcher(&self) -> RecordFetcher {
        RecordFetcher::new(Arc::clone(&self.provider), &self.cfg, self.progress.clone())
    }

    pub fn synthesizer(&self) -> DocumentSynthesizer {
        DocumentSynthesizer::new(Arc::clone(&self.provider), &self.cfg, self.progress.clone())
    }

    /// Login and probe `pairs` in one scoped session.
    pub async fn probe(&self, pairs: &[TpPair]) -> PortalResult<Vec<TpPair>> {
        let credentials = self.cfg.resolve_credentials().ok_or_else(|| {
            PortalError::Config("portal credentials not configured (EMM11_LOGIN_ID / EMM11_PASSWORD)".into())
        })?;
        let authenticator = Authenticator::new(&self.cfg, Arc::clone(&self.recognizer), self.progress.clone());
        let prober = ValidityProber::new(&self.cfg, self.progress.clone());
        authenticate_and_probe(self.provider.as_ref(), &authenticator, &prober, &credentials, pairs).await
    }

    /// Run all stages for `[start, end]` filtered to `district`. `on_record`
    /// receives each accepted record as it is found.
    ///
    /// Authentication failures surface as `Err`; every other stage-level
    /// shortfall is reported through [`RunReport::outcome`].
    pub async fn run<F>(&self, start: u64, end: u64, district: &str, on_record: F) -> PortalResult<RunReport>
    where
        F: Fn(Record) + Send + Sync + 'static,
    {
        let mut report = RunReport {
            start_id: start,
            end_id: end,
            district: district.trim().to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            records: Vec::new(),
            unused_identifiers: Vec::new(),
            merged_path: None,
            outcome: RunOutcome::Completed,
        };

        let output_dir = self.cfg.resolve_output_dir();
        prepare_output_dir(&output_dir).await?;

        self.progress
            .line(format!("🔹 Fetching eMM11 data for {district} ({start}..={end})"));
        let collected = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        self.fetcher()
            .fetch_each(start, end, district, move |record| {
                on_record(record.clone());
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

        if let Some(shortfall) = RunOutcome::after_fetch(&records) {
            return Ok(self.finish(report, shortfall));
        }

        self.progress.line("🔹 Checking TP pairs...");
        let pairs = derive_pairs(&records, &self.progress);
        let unused = if pairs.is_empty() {
            Vec::new()
        } else {
            match self.probe(&pairs).await {
                Ok(unused) => unused,
                Err(e) => {
                    self.progress.warn(format!("❌ Failed to process entries: {e}"));
                    return Err(e);
                }
            }
        };
        mark_unused(&mut records, &unused);
        report.unused_identifiers = unused_identifiers(&records);
        report.records = records;

        if let Some(shortfall) = RunOutcome::after_probe(&report.records) {
            return Ok(self.finish(report, shortfall));
        }

        self.progress.line(format!(
            "📄 Generating PDFs for {} unused pass(es)",
            report.unused_identifiers.len()
        ));
        report.merged_path = self.synthesizer().synthesize(&report.unused_identifiers).await;
        let outcome = if report.merged_path.is_some() {
            RunOutcome::Completed
        } else {
            RunOutcome::NoMergedOutput
        };
        Ok(self.finish(report, outcome))
    }

    fn finish(&self, mut report: RunReport, outcome: RunOutcome) -> RunReport {
        report.outcome = outcome;
        report.finished_at = Utc::now();
        match (outcome.notice(), &report.merged_path) {
            (Some(notice), _) => self.progress.warn(format!("⚠️ {notice}")),
            (None, Some(path)) => self.progress.line(format!("✅ Merged output: {}", path.display())),
            (None, None) => {}
        }
        report
    }
}
