use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub download: DownloadConfig,
    pub scan: ScanConfig,
    pub state: StateConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantEntry>,
}

/// Where the catalog lives and how its search results are read
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Search page URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Regex with one capture group that extracts the total result count
    #[serde(rename = "result-count-pattern", default = "default_result_count_pattern")]
    pub result_count_pattern: String,

    /// Document format selected before downloading (e.g. "doc")
    #[serde(rename = "format", default = "default_format")]
    pub format: String,
}

/// Archive download behavior
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Root directory; archives land in `<root>/<code>/<variant>/`
    pub root: PathBuf,

    /// Maximum time to wait for one page's archive (seconds)
    #[serde(rename = "timeout-secs", default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// How often the download directory is polled (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Scan scheduling and retry behavior
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Plain-text work list, one code per line
    #[serde(rename = "codes-path")]
    pub codes_path: PathBuf,

    /// Minimum number of dash-separated segments for a line to count as a code
    #[serde(rename = "min-segments", default = "default_min_segments")]
    pub min_segments: usize,

    /// Engine invocations per code per run before giving up until the next run
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds), doubled per further attempt
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for the retry delay (milliseconds)
    #[serde(rename = "retry-max-delay-ms", default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Politeness pause after each processed code (milliseconds)
    #[serde(rename = "pause-between-codes-ms", default = "default_pause_between_codes")]
    pub pause_between_codes_ms: u64,
}

/// Checkpoint persistence
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Which store backs the checkpoints
    #[serde(default)]
    pub backend: StateBackend,

    /// SQLite database (backend = "sqlite")
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,

    /// Progress mapping file (backend = "json")
    #[serde(rename = "progress-path", default = "default_progress_path")]
    pub progress_path: PathBuf,

    /// Failure mapping file (backend = "json")
    #[serde(rename = "failures-path", default = "default_failures_path")]
    pub failures_path: PathBuf,

    /// Append-only per-code report log
    #[serde(rename = "report-path", default = "default_report_path")]
    pub report_path: PathBuf,

    /// Markdown summary written by --export-summary
    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: PathBuf,
}

/// Checkpoint store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Sqlite,
    Json,
}

/// Browser driver launch settings
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// WebDriver endpoint (e.g. a local chromedriver)
    #[serde(rename = "webdriver-url", default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Browser binary, if not on the default path
    #[serde(rename = "binary-path", default)]
    pub binary_path: Option<String>,

    /// Run the browser without a window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Extra browser arguments appended to the built-in set
    #[serde(rename = "extra-args", default)]
    pub extra_args: Vec<String>,

    /// How long element lookups wait before failing (milliseconds)
    #[serde(rename = "element-timeout-ms", default = "default_element_timeout")]
    pub element_timeout_ms: u64,

    /// Settle time after navigation clicks (milliseconds)
    #[serde(rename = "settle-ms", default = "default_settle")]
    pub settle_ms: u64,

    /// Launch attempts before the worker gives up
    #[serde(rename = "init-retries", default = "default_init_retries")]
    pub init_retries: u32,

    /// Fixed delay between launch attempts (milliseconds)
    #[serde(rename = "init-retry-delay-ms", default = "default_init_retry_delay")]
    pub init_retry_delay_ms: u64,

    /// CSS selectors for the catalog's controls
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            binary_path: None,
            headless: true,
            extra_args: Vec::new(),
            element_timeout_ms: default_element_timeout(),
            settle_ms: default_settle(),
            init_retries: default_init_retries(),
            init_retry_delay_ms: default_init_retry_delay(),
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors used by the catalog driver
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    #[serde(rename = "language-select", default = "sel_language")]
    pub language_select: String,
    #[serde(rename = "search-input", default = "sel_search_input")]
    pub search_input: String,
    #[serde(rename = "search-button", default = "sel_search_button")]
    pub search_button: String,
    #[serde(rename = "result-count", default = "sel_result_count")]
    pub result_count: String,
    #[serde(rename = "format-checkboxes", default = "sel_format_checkboxes")]
    pub format_checkboxes: String,
    #[serde(rename = "select-all", default = "sel_select_all")]
    pub select_all: String,
    #[serde(rename = "items", default = "sel_items")]
    pub items: String,
    #[serde(rename = "download-button", default = "sel_download_button")]
    pub download_button: String,
    #[serde(rename = "next-page", default = "sel_next_page")]
    pub next_page: String,
    #[serde(rename = "active-page", default = "sel_active_page")]
    pub active_page: String,
    /// Results-per-page dropdown; the largest option is chosen. Empty disables it.
    #[serde(rename = "page-size", default = "sel_page_size")]
    pub page_size: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            language_select: sel_language(),
            search_input: sel_search_input(),
            search_button: sel_search_button(),
            result_count: sel_result_count(),
            format_checkboxes: sel_format_checkboxes(),
            select_all: sel_select_all(),
            items: sel_items(),
            download_button: sel_download_button(),
            next_page: sel_next_page(),
            active_page: sel_active_page(),
            page_size: sel_page_size(),
        }
    }
}

/// One language/format variant to download per code
#[derive(Debug, Clone, Deserialize)]
pub struct VariantEntry {
    /// Value sent to the catalog's language selector (e.g. "zh_TW")
    pub id: String,

    /// Human-readable name used in logs and reports
    #[serde(default)]
    pub label: Option<String>,
}

impl VariantEntry {
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

fn default_variants() -> Vec<VariantEntry> {
    vec![
        VariantEntry {
            id: "zh_TW".to_string(),
            label: Some("Traditional".to_string()),
        },
        VariantEntry {
            id: "zh_CN".to_string(),
            label: Some("Simplified".to_string()),
        },
    ]
}

fn default_result_count_pattern() -> String {
    r"共發現\s*(\d+)\s*筆資料".to_string()
}

fn default_format() -> String {
    "doc".to_string()
}

fn default_download_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_min_segments() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    5000
}

fn default_retry_max_delay() -> u64 {
    60_000
}

fn default_pause_between_codes() -> u64 {
    3000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./logs/harvest.db")
}

fn default_progress_path() -> PathBuf {
    PathBuf::from("./logs/download_progress.json")
}

fn default_failures_path() -> PathBuf {
    PathBuf::from("./logs/failed_downloads.json")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("./logs/download_stats.log")
}

fn default_summary_path() -> PathBuf {
    PathBuf::from("./logs/summary.md")
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_true() -> bool {
    true
}

fn default_element_timeout() -> u64 {
    10_000
}

fn default_settle() -> u64 {
    2000
}

fn default_init_retries() -> u32 {
    3
}

fn default_init_retry_delay() -> u64 {
    5000
}

fn sel_language() -> String {
    "select[name='lang']".to_string()
}

fn sel_search_input() -> String {
    "input[name='as_query_all_words']".to_string()
}

fn sel_search_button() -> String {
    "[name='searchButton']".to_string()
}

fn sel_result_count() -> String {
    "span#ctl00_CH_C_Label_ServerCostTime".to_string()
}

fn sel_format_checkboxes() -> String {
    "input[name='docstype[]']".to_string()
}

fn sel_select_all() -> String {
    "input[name='selectall'][value='ALL']".to_string()
}

fn sel_items() -> String {
    "input[name='sn[]']".to_string()
}

fn sel_download_button() -> String {
    "input#zipdownloadbutton".to_string()
}

fn sel_next_page() -> String {
    ".pagination li:last-child:not(.disabled) a".to_string()
}

fn sel_active_page() -> String {
    ".pagination li.active".to_string()
}

fn sel_page_size() -> String {
    "select[name='limit']".to_string()
}
