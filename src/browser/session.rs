//! Headless-browser session: one browser process, one active page (§4.2).
//!
//! Grounded on `examples/original_source/app/tools/browser/browser_manager.py`'s
//! `BrowserManager` (state machine, page-recreate-on-crash, dual screenshot
//! capture) and `browser_helpers.py`'s JS snippets (`src/browser/js.rs`). Driven
//! here via `chromiumoxide` since no example repo in the retrieval pack carries a
//! headless-browser crate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::browser::js;
use crate::browser::types::{BrowserAction, BrowserActionRequest, BrowserActionResult, BrowserStatus};
use crate::error::{HostError, HostResult};
use crate::storage::LocalStorage;

const ACTION_TIMEOUT: Duration = Duration::from_secs(45);
/// Bounds the whole request (`ensure_ready` + dispatch) per §6; strictly
/// longer than `ACTION_TIMEOUT` so the inner per-verb timeout fires first in
/// the common case and this one only catches a hung `ensure_ready`/launch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 800;
const DESKTOP_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

struct Inner {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

pub struct BrowserSession {
    chrome_instance_path: Option<String>,
    screenshots_dir: PathBuf,
    local_storage: LocalStorage,
    status: Mutex<BrowserStatus>,
    inner: Mutex<Option<Inner>>,
    screenshot_counter: AtomicU64,
}

impl BrowserSession {
    pub fn new(
        chrome_instance_path: Option<String>,
        screenshots_dir: PathBuf,
        local_storage: LocalStorage,
    ) -> Self {
        Self {
            chrome_instance_path,
            screenshots_dir,
            local_storage,
            status: Mutex::new(BrowserStatus::Started),
            inner: Mutex::new(None),
            screenshot_counter: AtomicU64::new(0),
        }
    }

    pub async fn status(&self) -> BrowserStatus {
        *self.status.lock().await
    }

    pub async fn initialize(&self) -> HostResult<()> {
        *self.status.lock().await = BrowserStatus::Initializing;

        let mut builder = BrowserConfig::builder()
            .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
            .viewport(None);
        if let Some(path) = &self.chrome_instance_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| HostError::Internal(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HostError::BrowserDead(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HostError::BrowserDead(format!("failed to open page: {e}")))?;
        page.set_user_agent(DESKTOP_UA).await.ok();
        let _ = page.evaluate(js::INIT_CONSOLE_LOGGING).await;

        tokio::fs::create_dir_all(&self.screenshots_dir).await.ok();

        *self.inner.lock().await = Some(Inner {
            browser,
            page,
            handler: handler_task,
        });
        *self.status.lock().await = BrowserStatus::Ready;
        Ok(())
    }

    async fn ensure_ready(&self) -> HostResult<()> {
        if *self.status.lock().await != BrowserStatus::Ready {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn page(&self) -> HostResult<Page> {
        let inner = self.inner.lock().await;
        inner
            .as_ref()
            .map(|i| i.page.clone())
            .ok_or_else(|| HostError::BrowserDead("no active page".into()))
    }

    /// Re-creates the page on the existing browser process after a crash.
    pub async fn recreate_page(&self) -> HostResult<()> {
        self.ensure_ready().await?;
        let mut inner_guard = self.inner.lock().await;
        let inner = inner_guard
            .as_mut()
            .ok_or_else(|| HostError::BrowserDead("no browser process".into()))?;
        let page = inner
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| HostError::BrowserDead(format!("failed to recreate page: {e}")))?;
        page.set_user_agent(DESKTOP_UA).await.ok();
        let _ = page.evaluate(js::INIT_CONSOLE_LOGGING).await;
        inner.page = page;
        Ok(())
    }

    /// Kills the browser process (best-effort OS-level restart first) and
    /// reinitializes from scratch.
    pub async fn restart_browser(&self, url: Option<&str>) -> HostResult<()> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(i) = inner.take() {
                i.handler.abort();
                let _ = i.browser.close().await;
            }
        }
        *self.status.lock().await = BrowserStatus::Started;

        let _ = tokio::process::Command::new("sudo")
            .args(["supervisorctl", "restart", "chrome"])
            .output()
            .await;

        self.initialize().await?;
        if let Some(url) = url {
            let page = self.page().await?;
            let _ = page.goto(url).await;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        let Ok(page) = self.page().await else {
            return false;
        };
        matches!(
            page.evaluate("1 + 1").await.ok().and_then(|r| r.into_value::<i64>().ok()),
            Some(2)
        )
    }

    /// Dispatches one action under the §6 request-level 60s timeout, which
    /// also bounds a cold `ensure_ready()`; on timeout the page is recreated
    /// and the action reported as failed.
    pub async fn execute_action(&self, request: BrowserActionRequest) -> HostResult<BrowserActionResult> {
        match tokio::time::timeout(REQUEST_TIMEOUT, self.execute_action_inner(&request)).await {
            Ok(result) => result,
            Err(_) => {
                self.recreate_page().await.ok();
                Err(HostError::Timeout(format!(
                    "browser action `{}` timed out after {}s",
                    request.action.name(),
                    REQUEST_TIMEOUT.as_secs()
                )))
            }
        }
    }

    /// Bounds just the verb dispatch with the 45s `ACTION_TIMEOUT`; Navigate
    /// degrades to a partial result on timeout instead of a hard error (§4.2).
    async fn execute_action_inner(&self, request: &BrowserActionRequest) -> HostResult<BrowserActionResult> {
        self.ensure_ready().await?;

        match tokio::time::timeout(ACTION_TIMEOUT, self.dispatch(&request.action)).await {
            Ok(Ok(mut result)) => {
                self.populate_elements(&mut result, &request.action).await;
                self.upload_screenshots(request, &mut result).await;
                Ok(result)
            }
            Ok(Err(e @ HostError::PageDead(_))) => {
                self.recreate_page().await?;
                Err(e)
            }
            Ok(Err(e)) => Err(e),
            Err(_) if matches!(request.action, BrowserAction::Navigate { .. }) => {
                Ok(self.partial_navigate_result().await)
            }
            Err(_) => {
                self.recreate_page().await.ok();
                Err(HostError::Timeout(format!(
                    "browser action `{}` timed out after {}s",
                    request.action.name(),
                    ACTION_TIMEOUT.as_secs()
                )))
            }
        }
    }

    /// Best-effort url/title off whatever page state Navigate reached before
    /// its wait-until timed out; the page itself is left alone.
    async fn partial_navigate_result(&self) -> BrowserActionResult {
        let mut result = BrowserActionResult::default();
        if let Ok(page) = self.page().await {
            result.url = page.url().await.ok().flatten();
            result.title = page.get_title().await.ok().flatten();
        }
        result
    }

    async fn dispatch(&self, action: &BrowserAction) -> HostResult<BrowserActionResult> {
        let page = self.page().await?;
        let mut result = BrowserActionResult::default();

        match action {
            BrowserAction::Navigate { url } => {
                page.goto(url)
                    .await
                    .map_err(|e| classify_page_error(e.to_string()))?;
                let _ = page.wait_for_navigation().await;
                let _ = page.evaluate(js::INIT_CONSOLE_LOGGING).await;
            }
            BrowserAction::Click {
                index,
                coordinate_x,
                coordinate_y,
            } => {
                let (x, y) = self.resolve_point(&page, *index, *coordinate_x, *coordinate_y, true).await?;
                click_at(&page, x, y).await?;
            }
            BrowserAction::Input {
                index,
                coordinate_x,
                coordinate_y,
                text,
                press_enter,
            } => {
                let (x, y) = self.resolve_point(&page, *index, *coordinate_x, *coordinate_y, false).await?;
                click_at(&page, x, y).await?;
                let _ = page
                    .evaluate("document.execCommand('selectAll', false, null)")
                    .await;
                page.execute(InsertTextParams::new(text.clone()))
                    .await
                    .map_err(|e| classify_page_error(e.to_string()))?;
                if *press_enter {
                    press_named_key(&page, "Enter").await?;
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
            }
            BrowserAction::PressKey { key } => {
                press_named_key(&page, key).await?;
            }
            BrowserAction::SelectOption { index, option } => {
                let _ = page
                    .evaluate(format!(
                        "(function(){{ const s = document.querySelectorAll('select')[{index}]; if (s) {{ s.selectedIndex = {option}; s.dispatchEvent(new Event('change', {{bubbles:true}})); }} }})();"
                    ))
                    .await;
            }
            BrowserAction::ScrollUp { to_top } => {
                let script = if *to_top {
                    "window.scrollTo(0, 0);".to_string()
                } else {
                    "window.scrollBy(0, -window.innerHeight);".to_string()
                };
                let _ = page.evaluate(script).await;
            }
            BrowserAction::ScrollDown { to_bottom } => {
                let script = if *to_bottom {
                    "window.scrollTo(0, document.body.scrollHeight);".to_string()
                } else {
                    "window.scrollBy(0, window.innerHeight);".to_string()
                };
                let _ = page.evaluate(script).await;
            }
            BrowserAction::MoveMouse { coordinate_x, coordinate_y } => {
                page.execute(
                    DispatchMouseEventParams::builder()
                        .r#type(DispatchMouseEventType::MouseMoved)
                        .x(*coordinate_x)
                        .y(*coordinate_y)
                        .build()
                        .map_err(HostError::Internal)?,
                )
                .await
                .map_err(|e| classify_page_error(e.to_string()))?;
            }
            BrowserAction::View { reload } => {
                if *reload {
                    let _ = page.reload().await;
                }
            }
            BrowserAction::Screenshot { file, reload } => {
                if *reload {
                    let _ = page.reload().await;
                }
                let path = self.save_screenshot(&page, Some(file.clone())).await?;
                result.result = Some(path.to_string_lossy().into_owned());
            }
            BrowserAction::ConsoleExec { javascript } => {
                let value = page
                    .evaluate(javascript.as_str())
                    .await
                    .map_err(|e| classify_page_error(e.to_string()))?;
                result.result = Some(stringify(value.into_value::<Value>().unwrap_or(Value::Null)));
            }
            BrowserAction::ConsoleView { max_lines } => {
                let value = page
                    .evaluate(js::console_logs_script(*max_lines))
                    .await
                    .map_err(|e| classify_page_error(e.to_string()))?;
                result.result = Some(
                    value
                        .into_value::<String>()
                        .unwrap_or_else(|_| String::new()),
                );
            }
            BrowserAction::Restart { url } => {
                self.restart_browser(url.as_deref()).await?;
            }
        }

        let page = self.page().await?;
        result.url = page.url().await.ok().flatten();
        result.title = page.get_title().await.ok().flatten();
        let scroll = self.scroll_metrics(&page).await;
        result.pixels_above = scroll.0;
        result.pixels_below = scroll.1;
        Ok(result)
    }

    async fn resolve_point(
        &self,
        page: &Page,
        index: Option<u32>,
        x: Option<f64>,
        y: Option<f64>,
        clickable: bool,
    ) -> HostResult<(f64, f64)> {
        if let (Some(x), Some(y)) = (x, y) {
            return Ok((x, y));
        }
        let idx = index.ok_or_else(|| {
            HostError::Validation("action requires either `index` or coordinates".into())
        })?;
        let script = if clickable { js::FIND_CLICKABLE } else { js::FIND_INPUTS };
        let value = page
            .evaluate(script)
            .await
            .map_err(|e| classify_page_error(e.to_string()))?;
        let elements: Vec<Value> = value
            .into_value::<String>()
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        let element = elements
            .get(idx as usize)
            .ok_or_else(|| HostError::Validation(format!("no element at index {idx}")))?;
        let x = element.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = element.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        Ok((x, y))
    }

    async fn populate_elements(&self, result: &mut BrowserActionResult, _action: &BrowserAction) {
        let Ok(page) = self.page().await else { return };
        let Ok(value) = page.evaluate(js::FIND_CLICKABLE).await else { return };
        let Some(json) = value.into_value::<String>().ok() else { return };
        let Ok(elements) = serde_json::from_str::<Vec<Value>>(&json) else { return };
        let summary = elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                let tag = el.get("tagName").and_then(Value::as_str).unwrap_or("");
                let text = el.get("text").and_then(Value::as_str).unwrap_or("");
                format!("{i}[:]<{tag}>{text}")
            })
            .collect::<Vec<_>>()
            .join("\n");
        result.elements = Some(summary);
    }

    async fn scroll_metrics(&self, page: &Page) -> (Option<i64>, Option<i64>) {
        let Ok(value) = page
            .evaluate(
                "JSON.stringify({above: window.scrollY, below: Math.max(0, document.body.scrollHeight - window.innerHeight - window.scrollY)})",
            )
            .await
        else {
            return (None, None);
        };
        let Some(json) = value.into_value::<String>().ok() else {
            return (None, None);
        };
        let parsed: Value = serde_json::from_str(&json).unwrap_or(Value::Null);
        (
            parsed.get("above").and_then(Value::as_i64),
            parsed.get("below").and_then(Value::as_i64),
        )
    }

    async fn save_screenshot(&self, page: &Page, filename: Option<String>) -> HostResult<PathBuf> {
        let bytes = page
            .screenshot(
                chromiumoxide::page::ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| HostError::Internal(format!("screenshot failed: {e}")))?;
        let name = filename.unwrap_or_else(|| self.default_screenshot_name(page));
        let path = self.screenshots_dir.join(name);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }

    fn default_screenshot_name(&self, _page: &Page) -> String {
        let n = self.screenshot_counter.fetch_add(1, Ordering::Relaxed);
        let suffix = fastrand::u32(1000..9999);
        format!("screenshot_{n}_{suffix}.webp")
    }

    async fn upload_screenshots(&self, request: &BrowserActionRequest, result: &mut BrowserActionResult) {
        let Ok(page) = self.page().await else { return };

        if request.clean_screenshot_presigned_url.is_some() {
            if let Ok(bytes) = page
                .screenshot(
                    chromiumoxide::page::ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(false)
                        .build(),
                )
                .await
            {
                let name = self.default_screenshot_name(&page);
                if let Ok(uploaded) = self.local_storage.upload(&name, &bytes).await {
                    result.clean_screenshot_path = Some(uploaded.path);
                    result.clean_screenshot_uploaded = true;
                }
            }
        }

        if request.screenshot_presigned_url.is_some() {
            if let Ok(bytes) = page
                .screenshot(
                    chromiumoxide::page::ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(true)
                        .build(),
                )
                .await
            {
                let name = self.default_screenshot_name(&page);
                if self.local_storage.upload(&name, &bytes).await.is_ok() {
                    result.screenshot_uploaded = true;
                }
            }
        }
    }
}

async fn click_at(page: &Page, x: f64, y: f64) -> HostResult<()> {
    page.execute(
        DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(HostError::Internal)?,
    )
    .await
    .map_err(|e| classify_page_error(e.to_string()))?;
    page.execute(
        DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(HostError::Internal)?,
    )
    .await
    .map_err(|e| classify_page_error(e.to_string()))?;
    Ok(())
}

/// Maps a handful of common key names to a raw CDP key-down/key-up pair.
/// Anything unrecognized falls back to inserting it as literal text.
async fn press_named_key(page: &Page, key: &str) -> HostResult<()> {
    let (code, vkey) = match key {
        "Enter" | "Return" => ("Enter", 13),
        "Tab" => ("Tab", 9),
        "Escape" | "Esc" => ("Escape", 27),
        "Backspace" => ("Backspace", 8),
        "ArrowUp" | "Up" => ("ArrowUp", 38),
        "ArrowDown" | "Down" => ("ArrowDown", 40),
        "ArrowLeft" | "Left" => ("ArrowLeft", 37),
        "ArrowRight" | "Right" => ("ArrowRight", 39),
        _ => {
            page.execute(InsertTextParams::new(key.to_string()))
                .await
                .map_err(|e| classify_page_error(e.to_string()))?;
            return Ok(());
        }
    };

    page.execute(
        DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::RawKeyDown)
            .key(code)
            .windows_virtual_key_code(vkey)
            .build()
            .map_err(HostError::Internal)?,
    )
    .await
    .map_err(|e| classify_page_error(e.to_string()))?;
    page.execute(
        DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(code)
            .windows_virtual_key_code(vkey)
            .build()
            .map_err(HostError::Internal)?,
    )
    .await
    .map_err(|e| classify_page_error(e.to_string()))?;
    Ok(())
}

fn classify_page_error(message: String) -> HostError {
    if message.contains("Target closed") || message.contains("target closed") {
        HostError::PageDead(message)
    } else {
        HostError::Internal(message)
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
