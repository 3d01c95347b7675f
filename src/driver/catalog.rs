//! Catalog driver
//!
//! Implements [`Driver`] for the catalog's search form on top of a
//! [`WebDriverSession`]. Everything site-specific (selectors, the result-count
//! pattern, the document format, timings) comes from configuration.

use crate::codes::Code;
use crate::config::{Config, SelectorConfig};
use crate::crawler::ScanDirection;
use crate::driver::archive::{snapshot_dir, wait_for_archive};
use crate::driver::webdriver::WebDriverSession;
use crate::driver::{Driver, DriverError, DriverFactory, DriverResult};
use crate::state::Variant;
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// Settings shared by every driver a factory launches
#[derive(Debug, Clone)]
struct CatalogSettings {
    base_url: String,
    format: String,
    selectors: SelectorConfig,
    count_pattern: Regex,
    element_timeout: Duration,
    settle: Duration,
    poll_interval: Duration,
}

/// Drives the catalog through one WebDriver session
pub struct CatalogDriver {
    session: WebDriverSession,
    settings: CatalogSettings,
    download_dir: Option<PathBuf>,
    baseline: HashSet<PathBuf>,
}

impl CatalogDriver {
    /// Waits for an element to appear, failing after the element timeout
    async fn wait_for(&self, css: &str) -> DriverResult<String> {
        let deadline = Instant::now() + self.settings.element_timeout;
        loop {
            if let Some(element) = self.session.find_element(css).await? {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Element(format!(
                    "'{}' not found within {}ms",
                    css,
                    self.settings.element_timeout.as_millis()
                )));
            }
            tokio::time::sleep(ELEMENT_POLL).await;
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(self.settings.settle).await;
    }

    async fn select_language(&self, variant: &Variant) -> DriverResult<()> {
        let select = self.wait_for(&self.settings.selectors.language_select).await?;
        let option_css = format!("option[value='{}']", variant);
        let option = self
            .session
            .find_child_element(&select, &option_css)
            .await?
            .ok_or_else(|| {
                DriverError::Element(format!("language option '{}' not offered", variant))
            })?;
        self.session.click(&option).await
    }

    async fn enter_query(&self, code: &Code) -> DriverResult<()> {
        let input = self.wait_for(&self.settings.selectors.search_input).await?;
        self.session.clear(&input).await?;
        self.session.send_keys(&input, code.as_str()).await?;

        let button = self.wait_for(&self.settings.selectors.search_button).await?;
        self.session.click(&button).await?;
        self.settle().await;
        Ok(())
    }

    /// Picks the largest results-per-page option, if the page offers one
    async fn maximize_page_size(&self) -> DriverResult<()> {
        let css = &self.settings.selectors.page_size;
        if css.trim().is_empty() {
            return Ok(());
        }

        let Some(select) = self.session.find_element(css).await? else {
            return Ok(());
        };

        let options = self.session.find_elements(&format!("{} option", css)).await?;
        let mut best: Option<(u32, String)> = None;
        for option in options {
            let size = self
                .session
                .attribute(&option, "value")
                .await?
                .and_then(|v| v.trim().parse::<u32>().ok());
            if let Some(size) = size {
                if best.as_ref().map_or(true, |(b, _)| size > *b) {
                    best = Some((size, option));
                }
            }
        }

        if let Some((size, option)) = best {
            tracing::debug!("Setting page size to {} via {}", size, select);
            self.session.click(&option).await?;
            self.settle().await;
        }
        Ok(())
    }

    async fn read_result_count(&self) -> DriverResult<u64> {
        let label = self.wait_for(&self.settings.selectors.result_count).await?;
        let text = self.session.text(&label).await?;
        parse_result_count(&self.settings.count_pattern, &text)
    }
}

/// Extracts the total result count from the results label
fn parse_result_count(pattern: &Regex, text: &str) -> DriverResult<u64> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .ok_or_else(|| DriverError::Element(format!("result count not found in '{}'", text.trim())))
}

impl Driver for CatalogDriver {
    async fn set_download_dir(&mut self, dir: &Path) -> DriverResult<()> {
        std::fs::create_dir_all(dir)?;
        let absolute = std::fs::canonicalize(dir)?;
        self.session.set_download_behavior(&absolute).await?;
        self.download_dir = Some(absolute);
        Ok(())
    }

    async fn search(&mut self, code: &Code, variant: &Variant) -> DriverResult<u64> {
        let attempt = async {
            self.session.navigate(&self.settings.base_url).await?;
            self.select_language(variant).await?;
            self.enter_query(code).await?;
            self.maximize_page_size().await?;
            self.read_result_count().await
        };

        attempt.await.map_err(|e| match e {
            DriverError::Navigation(_) => e,
            other => DriverError::Navigation(format!(
                "search for {} ({}) failed: {}",
                code, variant, other
            )),
        })
    }

    async fn select_format_and_all(&mut self) -> DriverResult<()> {
        let selectors = &self.settings.selectors;

        let select_all = self.wait_for(&selectors.select_all).await?;
        self.session.click(&select_all).await?;

        for checkbox in self.session.find_elements(&selectors.format_checkboxes).await? {
            if self.session.is_selected(&checkbox).await? {
                self.session.click(&checkbox).await?;
            }
        }

        let wanted = format!(
            "{}[value='{}']",
            selectors.format_checkboxes, self.settings.format
        );
        let checkbox = self.wait_for(&wanted).await?;
        self.session.click(&checkbox).await
    }

    async fn page_item_count(&mut self) -> DriverResult<u64> {
        let items = self
            .session
            .find_elements(&self.settings.selectors.items)
            .await?;
        Ok(items.len() as u64)
    }

    async fn trigger_archive_download(&mut self) -> DriverResult<()> {
        self.baseline = match &self.download_dir {
            Some(dir) => snapshot_dir(dir)?,
            None => HashSet::new(),
        };

        let button = self
            .wait_for(&self.settings.selectors.download_button)
            .await?;
        self.session.click(&button).await
    }

    async fn await_download_complete(
        &mut self,
        target_dir: &Path,
        timeout: Duration,
    ) -> DriverResult<()> {
        let archive = wait_for_archive(
            target_dir,
            &self.baseline,
            timeout,
            self.settings.poll_interval,
        )
        .await?;
        self.baseline.insert(archive);
        Ok(())
    }

    async fn has_next_page(&mut self) -> DriverResult<bool> {
        let next = self
            .session
            .find_elements(&self.settings.selectors.next_page)
            .await?;
        Ok(!next.is_empty())
    }

    async fn advance_page(&mut self) -> DriverResult<()> {
        let next = self
            .session
            .find_element(&self.settings.selectors.next_page)
            .await?
            .ok_or_else(|| DriverError::Element("no next-page control".to_string()))?;
        self.session.click(&next).await?;
        self.settle().await;
        Ok(())
    }

    async fn current_page(&mut self) -> DriverResult<u32> {
        // A single page of results has no pagination bar
        let Some(active) = self
            .session
            .find_element(&self.settings.selectors.active_page)
            .await?
        else {
            return Ok(0);
        };

        let text = self.session.text(&active).await?;
        let shown: u32 = text.trim().parse().map_err(|_| {
            DriverError::Element(format!("active page label '{}' is not a number", text.trim()))
        })?;
        Ok(shown.saturating_sub(1))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.session.quit().await
    }
}

/// Launches [`CatalogDriver`]s against the configured WebDriver endpoint
pub struct CatalogDriverFactory {
    webdriver_url: String,
    capabilities: serde_json::Value,
    settings: CatalogSettings,
}

impl CatalogDriverFactory {
    /// Builds a factory from the full configuration
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let count_pattern = Regex::new(&config.catalog.result_count_pattern)
            .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            webdriver_url: config.driver.webdriver_url.clone(),
            capabilities: WebDriverSession::chrome_capabilities(&config.driver),
            settings: CatalogSettings {
                base_url: config.catalog.base_url.clone(),
                format: config.catalog.format.clone(),
                selectors: config.driver.selectors.clone(),
                count_pattern,
                element_timeout: Duration::from_millis(config.driver.element_timeout_ms),
                settle: Duration::from_millis(config.driver.settle_ms),
                poll_interval: config.download.poll_interval(),
            },
        })
    }
}

impl DriverFactory for CatalogDriverFactory {
    type Driver = CatalogDriver;

    async fn launch(&self, direction: ScanDirection) -> DriverResult<CatalogDriver> {
        tracing::debug!("[{}] Opening WebDriver session at {}", direction, self.webdriver_url);
        let session = WebDriverSession::start(&self.webdriver_url, self.capabilities.clone()).await?;

        Ok(CatalogDriver {
            session,
            settings: self.settings.clone(),
            download_dir: None,
            baseline: HashSet::new(),
        })
    }
}
