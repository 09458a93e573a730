//! Persistent, headed browser session.
//!
//! Generalized from the teacher's per-conversation `BrowserSessionManager`
//! to the spec's single-session model: the agent drives one real, visible
//! browser window with a persistent profile, reused across every task typed
//! at the CLI prompt for the life of the process.

use std::path::Path;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),
    #[error("browser operation failed: {0}")]
    OperationFailed(String),
    #[error("no open browser pages")]
    NoPages,
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::OperationFailed(err.to_string())
    }
}

const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 900;

/// A launched, persistent browser instance plus its CDP event-handler task.
pub struct BrowserSession {
    browser: Browser,
    // Keeps the CDP event loop alive for the life of the session; never
    // polled directly once spawned.
    _handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a headed Chrome/Chromium instance with a persistent profile
    /// directory and anti-automation launch flags.
    pub async fn launch(user_data_dir: &Path) -> Result<Self, BrowserError> {
        std::fs::create_dir_all(user_data_dir)
            .map_err(|e| BrowserError::LaunchFailed(format!("could not create user data dir: {e}")))?;

        let config = BrowserConfig::builder()
            .with_head()
            .no_sandbox()
            .user_data_dir(user_data_dir)
            .viewport(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer")
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            _handler_task: handler_task,
        })
    }

    /// The most-recently-active, not-closed page, closing every other open
    /// tab beyond it. If no page exists yet (fresh launch), creates a blank
    /// one.
    pub async fn active_page(&mut self) -> Result<Page, BrowserError> {
        let mut pages = self.browser.pages().await.map_err(BrowserError::from)?;

        if pages.is_empty() {
            let page = self.browser.new_page("about:blank").await.map_err(BrowserError::from)?;
            return Ok(page);
        }

        let latest = pages.pop().expect("checked non-empty above");
        for stale in pages {
            let _ = stale.close().await;
        }
        Ok(latest)
    }

    pub async fn close(&mut self) -> Result<(), BrowserError> {
        self.browser.close().await.map_err(BrowserError::from)?;
        Ok(())
    }
}
