//! `PageRenderer`/`Page` traits abstracting a headless-browser page so RP's
//! pool/timeout/queueing logic is unit-testable without a real browser
//! process. Grounded on `original_source/utils/browser.py`'s
//! `BrowserManager` (the `asyncio.Queue`-backed page pool this mirrors with
//! a `Semaphore` + `Mutex<VecDeque>`).

use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

#[async_trait]
pub trait Page: Send + Sync {
    fn id(&self) -> u64;
    async fn navigate(&self, url: &str) -> BotResult<()>;
    async fn set_content(&self, html: &str) -> BotResult<()>;
    /// `true` if the selector appeared within `timeout_ms`.
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> bool;
    async fn content_height(&self) -> BotResult<f64>;
    async fn resize_viewport(&self, width: u32, height: u32) -> BotResult<()>;
    async fn screenshot(&self, quality: u8, selector: Option<&str>, full_page: bool) -> BotResult<Vec<u8>>;
    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn new_page(&self, viewport: (u32, u32), device_scale_factor: f64) -> BotResult<Box<dyn Page>>;
}

/// Headless Chromium backend via `headless_chrome`. Tabs are long-lived;
/// `new_page` opens a fresh browser tab per pool slot at startup.
pub struct ChromeRenderer {
    browser: headless_chrome::Browser,
}

impl ChromeRenderer {
    pub fn launch() -> BotResult<Self> {
        let options = headless_chrome::LaunchOptionsBuilder::default()
            .headless(true)
            .sandbox(false)
            .build()
            .map_err(|e| BotError::RenderFailure(format!("failed to build launch options: {e}")))?;
        let browser = headless_chrome::Browser::new(options)
            .map_err(|e| BotError::RenderFailure(format!("failed to launch chromium: {e}")))?;
        Ok(Self { browser })
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn new_page(&self, viewport: (u32, u32), device_scale_factor: f64) -> BotResult<Box<dyn Page>> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BotError::RenderFailure(format!("failed to open tab: {e}")))?;
        tab.set_bounds(headless_chrome::protocol::cdp::Browser::Bounds {
            left: None,
            top: None,
            width: Some(viewport.0 as f64 * device_scale_factor),
            height: Some(viewport.1 as f64 * device_scale_factor),
            window_state: None,
        })
        .ok();
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Ok(Box::new(ChromeTab { tab, id: NEXT_ID.fetch_add(1, Ordering::SeqCst) }))
    }
}

struct ChromeTab {
    tab: Arc<headless_chrome::Tab>,
    id: u64,
}

#[async_trait]
impl Page for ChromeTab {
    fn id(&self) -> u64 {
        self.id
    }

    async fn navigate(&self, url: &str) -> BotResult<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| BotError::RenderFailure(format!("navigate failed: {e}")))?;
        Ok(())
    }

    async fn set_content(&self, html: &str) -> BotResult<()> {
        let encoded = format!("data:text/html;charset=utf-8,{}", urlencoding::encode(html));
        self.tab
            .navigate_to(&encoded)
            .map_err(|e| BotError::RenderFailure(format!("set_content failed: {e}")))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| BotError::RenderFailure(format!("set_content navigation wait failed: {e}")))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> bool {
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        loop {
            if self.tab.find_element(selector).is_ok() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    async fn content_height(&self) -> BotResult<f64> {
        let result = self
            .tab
            .evaluate("document.body.scrollHeight", false)
            .map_err(|e| BotError::RenderFailure(format!("height measurement failed: {e}")))?;
        Ok(result.value.and_then(|v| v.as_f64()).unwrap_or(0.0))
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> BotResult<()> {
        self.tab
            .set_bounds(headless_chrome::protocol::cdp::Browser::Bounds {
                left: None,
                top: None,
                width: Some(width as f64),
                height: Some(height as f64),
                window_state: None,
            })
            .map_err(|e| BotError::RenderFailure(format!("resize failed: {e}")))?;
        Ok(())
    }

    async fn screenshot(&self, quality: u8, selector: Option<&str>, full_page: bool) -> BotResult<Vec<u8>> {
        use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
        let bytes = match selector {
            Some(sel) => {
                let element = self
                    .tab
                    .find_element(sel)
                    .map_err(|e| BotError::RenderFailure(format!("selector screenshot target missing: {e}")))?;
                element
                    .capture_screenshot(CaptureScreenshotFormatOption::Jpeg)
                    .map_err(|e| BotError::RenderFailure(format!("element screenshot failed: {e}")))?
            }
            None => self
                .tab
                .capture_screenshot(CaptureScreenshotFormatOption::Jpeg, Some(quality), None, full_page)
                .map_err(|e| BotError::RenderFailure(format!("screenshot failed: {e}")))?,
        };
        Ok(bytes)
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// Fixed-size FIFO page pool. Acquire blocks until a page is free; release
/// returns the same page (no state reset — callers overwrite content on
/// next use), matching the source's deliberate no-reset policy.
pub struct PagePool {
    renderer: Arc<dyn PageRenderer>,
    queue: Mutex<VecDeque<Box<dyn Page>>>,
    permits: Arc<Semaphore>,
    viewport: (u32, u32),
    device_scale_factor: f64,
    /// Which template directories each page has already warmed up against,
    /// keyed by page id (spec §4.8 step 1: sticky warm-up).
    warmed: Mutex<HashMap<u64, HashSet<String>>>,
}

impl PagePool {
    pub async fn new(
        renderer: Arc<dyn PageRenderer>,
        size: usize,
        viewport: (u32, u32),
        device_scale_factor: f64,
    ) -> BotResult<Self> {
        let mut queue = VecDeque::with_capacity(size);
        for _ in 0..size {
            queue.push_back(renderer.new_page(viewport, device_scale_factor).await?);
        }
        Ok(Self {
            renderer,
            queue: Mutex::new(queue),
            permits: Arc::new(Semaphore::new(size)),
            viewport,
            device_scale_factor,
            warmed: Mutex::new(HashMap::new()),
        })
    }

    pub async fn acquire(self: &Arc<Self>) -> BotResult<PooledPage> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BotError::Internal("render pool semaphore closed".into()))?;
        let page = self
            .queue
            .lock()
            .await
            .pop_front()
            .expect("semaphore permit implies a page is queued");
        Ok(PooledPage { pool: self.clone(), page: Some(page), _permit: permit })
    }

    /// Returns a page to the queue, or discards and replenishes on
    /// failure-isolation (spec §4.8 step 8).
    async fn release(&self, page: Box<dyn Page>) {
        if page.is_closed() {
            tracing::warn!(page_id = page.id(), "releasing closed page, replenishing pool");
            match self.renderer.new_page(self.viewport, self.device_scale_factor).await {
                Ok(fresh) => self.queue.lock().await.push_back(fresh),
                Err(e) => tracing::error!(error = %e, "failed to replenish render pool"),
            }
            return;
        }
        self.queue.lock().await.push_back(page);
    }

    async fn discard_and_replenish(&self) {
        match self.renderer.new_page(self.viewport, self.device_scale_factor).await {
            Ok(fresh) => self.queue.lock().await.push_back(fresh),
            Err(e) => tracing::error!(error = %e, "failed to replenish render pool after failure"),
        }
    }

    async fn needs_warmup(&self, page_id: u64, dir: &str) -> bool {
        let mut warmed = self.warmed.lock().await;
        let set = warmed.entry(page_id).or_default();
        if set.contains(dir) {
            false
        } else {
            set.insert(dir.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.permits.available_permits()
    }
}

pub struct PooledPage {
    pool: Arc<PagePool>,
    page: Option<Box<dyn Page>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledPage {
    pub fn page(&self) -> &dyn Page {
        self.page.as_deref().expect("page taken only on drop")
    }

    pub async fn warmup_if_needed(&self, dir: &str) -> BotResult<bool> {
        let page = self.page();
        if self.pool.needs_warmup(page.id(), dir).await {
            page.navigate(&format!("file://{dir}/")).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Marks this page as unusable; on drop it's discarded rather than
    /// recycled (spec §4.8 step 8: any exception discards the page).
    pub fn poison(&mut self) {
        self.page = None;
    }
}

impl Drop for PooledPage {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        match self.page.take() {
            Some(page) => {
                tokio::spawn(async move { pool.release(page).await });
            }
            None => {
                tokio::spawn(async move { pool.discard_and_replenish().await });
            }
        }
    }
}
