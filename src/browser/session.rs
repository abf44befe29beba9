use anyhow::{Result, Context};
use serde_json::Value;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use std::time::Duration;
use tracing::{debug, error};

use crate::cli::config::BrowserSettings;

const SET_COOKIE_SCRIPT: &str =
    "document.cookie = arguments[0] + '=' + arguments[1] + '; domain=' + arguments[2] + '; path=/';";

/// Browser session manager
pub struct BrowserSession {
    /// Browser settings
    config: BrowserSettings,

    /// Script installed on every new document, if any
    stealth_script: Option<String>,

    /// WebDriver instance
    driver: Option<WebDriver>,
}

impl BrowserSession {
    /// Create a new browser session; nothing is launched until `initialize`
    pub fn new(config: BrowserSettings, stealth_script: Option<String>) -> Self {
        Self {
            config,
            stealth_script,
            driver: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.driver.is_some()
    }

    /// Initialize the browser session
    pub async fn initialize(&mut self) -> Result<()> {
        // Close any existing session
        self.close().await?;

        let mut caps = DesiredCapabilities::chrome();

        if self.config.headless {
            caps.set_headless()?;
        }

        caps.add_chrome_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--no-sandbox")?;

        let driver = WebDriver::new(&self.config.webdriver_url, caps).await
            .context(format!("Failed to connect to WebDriver at {}", self.config.webdriver_url))?;

        driver.set_page_load_timeout(Duration::from_secs(self.config.page_load_timeout_secs)).await?;

        if let Some(script) = &self.stealth_script {
            let dev_tools = ChromeDevTools::new(driver.handle.clone());
            dev_tools.execute_cdp_with_params(
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": script }),
            ).await
                .context("Failed to install stealth script")?;
        }

        debug!("Browser session initialized (headless: {})", self.config.headless);

        self.driver = Some(driver);

        Ok(())
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref()
            .context("Browser session not initialized")
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to: {}", url);
        self.driver()?.goto(url).await
            .context(format!("Failed to navigate to URL: {}", url))?;

        Ok(())
    }

    /// Reload the current page
    pub async fn refresh(&self) -> Result<()> {
        self.driver()?.refresh().await
            .context("Failed to reload page")?;

        Ok(())
    }

    /// Set a cookie on the given domain for the current page
    pub async fn add_cookie(&self, name: &str, value: &str, domain: &str) -> Result<()> {
        let args = vec![
            Value::String(name.to_string()),
            Value::String(value.to_string()),
            Value::String(domain.to_string()),
        ];

        self.driver()?.execute(SET_COOKIE_SCRIPT, args).await
            .context(format!("Failed to set cookie: {}", name))?;

        Ok(())
    }

    /// Execute JavaScript on the page and return its result as JSON
    pub async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let result = self.driver()?.execute(script, args).await
            .context("Failed to execute JavaScript")?;

        Ok(result.json().clone())
    }

    /// Close the browser session
    pub async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.quit().await {
                error!("Error closing browser session: {}", e);
            }
            debug!("Browser session closed");
        }

        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Quitting is async; only possible while a runtime is still around
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        error!("Error closing browser session during drop: {}", e);
                    }
                });
            }
        }
    }
}
