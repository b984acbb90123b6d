//! Render Pool (RP): HTML template + data -> JPEG bytes, with structured
//! per-step latency logs. Grounded on `original_source/utils/browser.py`'s
//! `BrowserManager` for pool shape and the `[perf]` logging convention,
//! carried over as `tracing` events per SPEC_FULL §1.1.

pub mod pool;

use crate::error::{BotError, BotResult};
use pool::{PageRenderer, PagePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_VIEWPORT: (u32, u32) = (1200, 400);
const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 1.5;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 300;
const FULL_PAGE_HEIGHT_THRESHOLD: f64 = 2400.0;

const ANIMATION_DISABLING_CSS: &str = "* { animation: none !important; transition: none !important; caret-color: transparent !important; }";

pub struct RenderRequest {
    pub request_id: String,
    pub template_dir: String,
    /// File name ending in `.html` (loaded from `template_dir`) or an
    /// inline template string otherwise.
    pub template: String,
    pub template_data: serde_json::Value,
    pub wait_selectors: Vec<String>,
    pub quality: u8,
    pub screenshot_selector: Option<String>,
    pub full_page: Option<bool>,
    pub wait_timeout_ms: Option<u64>,
    pub disable_animations: bool,
}

pub struct RenderPool {
    pool: Arc<PagePool>,
    handlebars: handlebars::Handlebars<'static>,
}

impl RenderPool {
    pub async fn new(renderer: Arc<dyn PageRenderer>) -> BotResult<Self> {
        let pool = Arc::new(
            PagePool::new(renderer, DEFAULT_POOL_SIZE, DEFAULT_VIEWPORT, DEFAULT_DEVICE_SCALE_FACTOR).await?,
        );
        Ok(Self { pool, handlebars: handlebars::Handlebars::new() })
    }

    pub async fn render(&self, req: RenderRequest) -> BotResult<Vec<u8>> {
        let total_start = Instant::now();
        let mut step_start = Instant::now();

        let mut page = self.pool.acquire().await?;
        tracing::info!(request_id = %req.request_id, step = "acquire_page", latency_ms = step_start.elapsed().as_millis() as u64);

        step_start = Instant::now();
        let warmed_up = match page.warmup_if_needed(&req.template_dir).await {
            Ok(w) => w,
            Err(e) => {
                page.poison();
                return Err(e);
            }
        };
        tracing::info!(
            request_id = %req.request_id, step = "warmup_if_needed", warmed_up,
            latency_ms = step_start.elapsed().as_millis() as u64
        );

        step_start = Instant::now();
        let html = match self.render_template(&req) {
            Ok(h) => h,
            Err(e) => {
                page.poison();
                return Err(e);
            }
        };
        tracing::info!(request_id = %req.request_id, step = "render_template", latency_ms = step_start.elapsed().as_millis() as u64);

        let content_hash = content_hash(&html);
        let mut final_html = html;
        if req.disable_animations {
            final_html = format!("{final_html}<style>{ANIMATION_DISABLING_CSS}</style>");
        }

        step_start = Instant::now();
        if let Err(e) = page.page().set_content(&final_html).await {
            page.poison();
            return Err(e);
        }
        tracing::info!(request_id = %req.request_id, step = "page.set_content", latency_ms = step_start.elapsed().as_millis() as u64);

        step_start = Instant::now();
        let wait_timeout = req.wait_timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
        let page_ref = page.page();
        let waits = futures::future::join_all(req.wait_selectors.iter().map(|sel| async move {
            let ok = page_ref.wait_for_selector(sel, wait_timeout).await;
            if !ok {
                tracing::warn!(selector = %sel, "wait_selectors timed out");
            }
            ok
        }))
        .await;
        tracing::info!(
            request_id = %req.request_id, step = "wait_selectors",
            satisfied = waits.iter().filter(|w| **w).count(),
            total = waits.len(),
            latency_ms = step_start.elapsed().as_millis() as u64
        );

        step_start = Instant::now();
        let height = page.page().content_height().await.unwrap_or(0.0);
        tracing::info!(request_id = %req.request_id, step = "measure_content_height", height, latency_ms = step_start.elapsed().as_millis() as u64);

        let viewport_before = DEFAULT_VIEWPORT;
        let use_full_page = req
            .full_page
            .unwrap_or_else(|| req.screenshot_selector.is_none() && height > FULL_PAGE_HEIGHT_THRESHOLD);
        let mut viewport_after = viewport_before;

        if req.screenshot_selector.is_none() && !use_full_page {
            step_start = Instant::now();
            let new_height = height.max(1.0) as u32;
            if page.page().resize_viewport(viewport_before.0, new_height).await.is_ok() {
                viewport_after = (viewport_before.0, new_height);
            }
            tracing::info!(
                request_id = %req.request_id, step = "resize_viewport_to_content",
                latency_ms = step_start.elapsed().as_millis() as u64
            );
        }

        step_start = Instant::now();
        let screenshot = page
            .page()
            .screenshot(req.quality, req.screenshot_selector.as_deref(), use_full_page)
            .await;
        let screenshot_step = if req.screenshot_selector.is_some() { "locator.screenshot" } else { "page.screenshot" };
        let bytes = match screenshot {
            Ok(b) => b,
            Err(e) => {
                page.poison();
                return Err(e);
            }
        };
        tracing::info!(request_id = %req.request_id, step = screenshot_step, latency_ms = step_start.elapsed().as_millis() as u64);

        tracing::info!(
            request_id = %req.request_id,
            total_ms = total_start.elapsed().as_millis() as u64,
            template = %req.template,
            content_hash,
            viewport_before = ?viewport_before,
            viewport_after = ?viewport_after,
            final_full_page = use_full_page,
            "render complete"
        );

        Ok(bytes)
    }

    fn render_template(&self, req: &RenderRequest) -> BotResult<String> {
        if req.template.ends_with(".html") {
            let path = Path::new(&req.template_dir).join(&req.template);
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| BotError::RenderFailure(format!("failed to read template {}: {e}", path.display())))?;
            self.handlebars
                .render_template(&raw, &req.template_data)
                .map_err(|e| BotError::RenderFailure(format!("template render failed: {e}")))
        } else {
            self.handlebars
                .render_template(&req.template, &req.template_data)
                .map_err(|e| BotError::RenderFailure(format!("inline template render failed: {e}")))
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

fn content_hash(html: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    html.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pool::{Page, PageRenderer};
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    struct FakePage {
        id: u64,
        height: f64,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl Page for FakePage {
        fn id(&self) -> u64 {
            self.id
        }
        async fn navigate(&self, _url: &str) -> BotResult<()> {
            Ok(())
        }
        async fn set_content(&self, _html: &str) -> BotResult<()> {
            Ok(())
        }
        async fn wait_for_selector(&self, _selector: &str, _timeout_ms: u64) -> bool {
            true
        }
        async fn content_height(&self) -> BotResult<f64> {
            Ok(self.height)
        }
        async fn resize_viewport(&self, _width: u32, _height: u32) -> BotResult<()> {
            Ok(())
        }
        async fn screenshot(&self, _quality: u8, _selector: Option<&str>, _full_page: bool) -> BotResult<Vec<u8>> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
        fn is_closed(&self) -> bool {
            self.closed.load(std::sync::atomic::Ordering::SeqCst) > 0
        }
    }

    struct FakeRenderer {
        next_id: AtomicU64,
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn new_page(&self, _viewport: (u32, u32), _device_scale_factor: f64) -> BotResult<Box<dyn Page>> {
            let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Box::new(FakePage { id, height: 500.0, closed: AtomicUsize::new(0) }))
        }
    }

    fn fake_renderer() -> Arc<dyn PageRenderer> {
        Arc::new(FakeRenderer { next_id: AtomicU64::new(1) })
    }

    #[tokio::test]
    async fn render_inline_template_produces_jpeg_bytes() {
        let pool = RenderPool::new(fake_renderer()).await.unwrap();
        let req = RenderRequest {
            request_id: "req-1".into(),
            template_dir: "/tmp/templates".into(),
            template: "<h1>{{name}}</h1>".into(),
            template_data: serde_json::json!({"name": "Alpha#0001"}),
            wait_selectors: vec!["h1".into()],
            quality: 80,
            screenshot_selector: None,
            full_page: None,
            wait_timeout_ms: None,
            disable_animations: true,
        };
        let bytes = pool.render(req).await.unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn pool_acquire_is_fifo_bounded() {
        let pool = RenderPool::new(fake_renderer()).await.unwrap();
        assert_eq!(pool.pool_size(), DEFAULT_POOL_SIZE);
        let guard = pool.pool.acquire().await.unwrap();
        assert_eq!(pool.pool_size(), DEFAULT_POOL_SIZE - 1);
        drop(guard);
    }
}
