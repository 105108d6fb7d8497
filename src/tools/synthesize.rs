//! Document synthesizer: one PDF per unused pass, then one merged file.
//!
//! Each identifier moves through
//! `PageLoaded → FieldsExtracted → CodeEncoded → Rendered`; a failure at any
//! step excludes that identifier only. Identifiers that reach `Rendered` are
//! merged in processing order.

use crate::core::config::detail_url;
use crate::core::types::{DocField, DocumentFieldSet};
use crate::core::{Emm11Config, PortalError, PortalResult, Progress, SynthesisStrategy};
use crate::document::{merge_files, FormTemplate, VerificationCode};
use crate::scraping::extract::{fields_from_html, identifier_matches, normalize_text};
use crate::scraping::portal::{BrowserProvider, PortalBrowser, PortalPage, DETAIL_ISTP};
use async_trait::async_trait;
use lopdf::Document;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStage {
    PageLoaded,
    FieldsExtracted,
    CodeEncoded,
    Rendered,
    Merged,
}

/// Turns an extracted page into a single-form PDF.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(
        &self,
        page: &mut dyn PortalPage,
        fields: &DocumentFieldSet,
        code: &VerificationCode,
    ) -> PortalResult<Vec<u8>>;
}

/// Draws the fields onto the blank form template.
pub struct OverlayRenderer {
    template: FormTemplate,
}

impl OverlayRenderer {
    pub fn new(template: FormTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl PageRenderer for OverlayRenderer {
    fn name(&self) -> &'static str {
        "overlay"
    }

    async fn render(
        &self,
        _page: &mut dyn PortalPage,
        fields: &DocumentFieldSet,
        code: &VerificationCode,
    ) -> PortalResult<Vec<u8>> {
        self.template.render_bytes(fields, code)
    }
}

/// Prints the live detail page itself. The QR payload is the page URL, which
/// the printout already carries, so `code` only gates the stage.
pub struct RasterRenderer;

#[async_trait]
impl PageRenderer for RasterRenderer {
    fn name(&self) -> &'static str {
        "raster"
    }

    async fn render(
        &self,
        page: &mut dyn PortalPage,
        _fields: &DocumentFieldSet,
        _code: &VerificationCode,
    ) -> PortalResult<Vec<u8>> {
        page.print_pdf().await
    }
}

pub fn renderer_for(cfg: &Emm11Config) -> Arc<dyn PageRenderer> {
    match cfg.resolve_strategy() {
        SynthesisStrategy::Overlay => Arc::new(OverlayRenderer::new(FormTemplate::load_or_blank(
            &cfg.resolve_template_path(),
        ))),
        SynthesisStrategy::Raster => Arc::new(RasterRenderer),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub identifier: String,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct Exclusion {
    pub identifier: String,
    /// Last stage completed before the failure, if any.
    pub reached: Option<SynthesisStage>,
    pub error: PortalError,
}

#[derive(Debug, Default)]
pub struct SynthesisReport {
    pub rendered: Vec<RenderedPage>,
    pub excluded: Vec<Exclusion>,
    pub merged_path: Option<PathBuf>,
}

type PageCallback = Arc<dyn Fn(&RenderedPage) + Send + Sync>;

pub struct DocumentSynthesizer {
    provider: Arc<dyn BrowserProvider>,
    renderer: Arc<dyn PageRenderer>,
    detail_url: String,
    output_dir: PathBuf,
    merged_path: PathBuf,
    page_load: Duration,
    field_wait: Duration,
    on_page: Option<PageCallback>,
    progress: Progress,
}

impl DocumentSynthesizer {
    pub fn new(provider: Arc<dyn BrowserProvider>, cfg: &Emm11Config, progress: Progress) -> Self {
        Self::with_renderer(provider, renderer_for(cfg), cfg, progress)
    }

    pub fn with_renderer(
        provider: Arc<dyn BrowserProvider>,
        renderer: Arc<dyn PageRenderer>,
        cfg: &Emm11Config,
        progress: Progress,
    ) -> Self {
        Self {
            provider,
            renderer,
            detail_url: cfg.resolve_detail_url(),
            output_dir: cfg.resolve_output_dir(),
            merged_path: cfg.merged_path(),
            page_load: cfg.timing.page_load(),
            field_wait: cfg.timing.field_wait(),
            on_page: None,
            progress,
        }
    }

    /// Invoked after each identifier's PDF is written.
    pub fn on_page<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RenderedPage) + Send + Sync + 'static,
    {
        self.on_page = Some(Arc::new(callback));
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the merged document, or `None` when nothing could be rendered.
    pub async fn synthesize(&self, identifiers: &[String]) -> Option<PathBuf> {
        self.run(identifiers).await.merged_path
    }

    pub async fn run(&self, identifiers: &[String]) -> SynthesisReport {
        let mut report = SynthesisReport::default();
        if identifiers.is_empty() {
            self.progress.warn("⚠️ No identifiers to synthesize");
            return report;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            self.progress
                .warn(format!("❌ Cannot create {}: {e}", self.output_dir.display()));
            return report;
        }

        let mut browser = match self.provider.launch().await {
            Ok(b) => b,
            Err(e) => {
                self.progress.warn(format!("❌ Browser launch failed: {e}"));
                report.excluded = identifiers
                    .iter()
                    .map(|id| Exclusion {
                        identifier: id.clone(),
                        reached: None,
                        error: PortalError::browser(&e),
                    })
                    .collect();
                return report;
            }
        };

        self.progress.line(format!(
            "📄 Rendering {} document(s) with the {} renderer",
            identifiers.len(),
            self.renderer.name()
        ));
        let mut stems = HashSet::new();
        for identifier in identifiers {
            let mut reached = None;
            let stored = match self.render_identifier(browser.as_mut(), identifier, &mut reached).await {
                Ok(bytes) => self.store(identifier, &bytes, &mut stems).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(page) => {
                    self.progress.line(format!("✅ PDF generated: {}", page.path.display()));
                    if let Some(cb) = &self.on_page {
                        cb(&page);
                    }
                    report.rendered.push(page);
                }
                Err(error) => {
                    self.progress.warn(format!("⚠️ Skipping {identifier}: {error}"));
                    report.excluded.push(Exclusion {
                        identifier: identifier.clone(),
                        reached,
                        error,
                    });
                }
            }
        }
        browser.close().await;

        if report.rendered.is_empty() {
            self.progress.warn("❌ No documents rendered; nothing to merge");
            return report;
        }
        let paths: Vec<&Path> = report.rendered.iter().map(|p| p.path.as_path()).collect();
        match merge_files(&paths, &self.merged_path) {
            Ok(pages) => {
                self.progress.line(format!(
                    "📄 Merged {pages} page(s) into {} (stage {:?})",
                    self.merged_path.display(),
                    SynthesisStage::Merged
                ));
                report.merged_path = Some(self.merged_path.clone());
            }
            Err(e) => self.progress.warn(format!("❌ Merge failed: {e}")),
        }
        report
    }

    async fn render_identifier(
        &self,
        browser: &mut dyn PortalBrowser,
        identifier: &str,
        reached: &mut Option<SynthesisStage>,
    ) -> PortalResult<Vec<u8>> {
        let mut page = browser.new_page().await?;
        let result = self.render_on(page.as_mut(), identifier, reached).await;
        page.close().await;
        result
    }

    async fn render_on(
        &self,
        page: &mut dyn PortalPage,
        identifier: &str,
        reached: &mut Option<SynthesisStage>,
    ) -> PortalResult<Vec<u8>> {
        let url = detail_url(&self.detail_url, identifier);
        debug!("[{identifier}] loading {url}");
        page.goto(&url, self.page_load).await?;
        if !page.wait_visible(DETAIL_ISTP, self.field_wait).await? {
            return Err(PortalError::timeout(format!("waiting for {DETAIL_ISTP}"), self.field_wait));
        }
        *reached = Some(SynthesisStage::PageLoaded);

        let html = page.content().await?;
        let fields = fields_from_html(&html)?;
        let displayed = normalize_text(fields.get(DocField::IstpNo));
        if !identifier_matches(&displayed, identifier) {
            return Err(PortalError::ExtractionMismatch {
                expected: identifier.to_string(),
                found: displayed,
            });
        }
        *reached = Some(SynthesisStage::FieldsExtracted);

        let code = VerificationCode::encode(&url)?;
        *reached = Some(SynthesisStage::CodeEncoded);

        let bytes = self.renderer.render(page, &fields, &code).await?;
        Document::load_mem(&bytes)?;
        *reached = Some(SynthesisStage::Rendered);
        Ok(bytes)
    }

    async fn store(
        &self,
        identifier: &str,
        bytes: &[u8],
        stems: &mut HashSet<String>,
    ) -> PortalResult<RenderedPage> {
        let path = self
            .output_dir
            .join(format!("{}.pdf", unique_stem(identifier, stems)));
        tokio::fs::write(&path, bytes).await?;
        Ok(RenderedPage {
            identifier: identifier.to_string(),
            path,
        })
    }
}

/// Identifiers become file names; anything but ASCII alphanumerics, `-` and
/// `_` is replaced.
pub fn file_stem(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// [`file_stem`] made unique within one run: a stem already taken gets a
/// `-2`, `-3`, ... suffix so no identifier overwrites another's file.
pub fn unique_stem(identifier: &str, taken: &mut HashSet<String>) -> String {
    let base = file_stem(identifier);
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Empty `dir` (creating it if needed) so a run never merges stale output.
pub async fn prepare_output_dir(dir: &Path) -> PortalResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}
