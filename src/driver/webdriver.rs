//! Minimal W3C WebDriver client
//!
//! Speaks just enough of the WebDriver wire protocol to drive the catalog's
//! search form through a local chromedriver: sessions, navigation, CSS element
//! lookup, clicks, typing, and chromium's download-directory command.

use crate::config::DriverConfig;
use crate::driver::{DriverError, DriverResult};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Key under which WebDriver returns element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Error payload of a failed WebDriver command
#[derive(Debug, Clone)]
struct WireError {
    error: String,
    message: String,
}

impl WireError {
    fn is_no_such_element(&self) -> bool {
        self.error == "no such element"
    }

    fn into_driver_error(self, context: &str) -> DriverError {
        let detail = format!("{}: {} ({})", context, self.error, self.message);
        match self.error.as_str() {
            "no such element"
            | "stale element reference"
            | "element not interactable"
            | "element click intercepted"
            | "invalid element state" => DriverError::Element(detail),
            _ => DriverError::Protocol(detail),
        }
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// An open WebDriver session
pub struct WebDriverSession {
    client: Client,
    endpoint: String,
    session_id: String,
}

impl WebDriverSession {
    /// Builds Chrome capabilities from the driver configuration
    pub fn chrome_capabilities(config: &DriverConfig) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1920,1080".to_string(),
        ];
        if config.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(config.extra_args.iter().cloned());

        let mut options = json!({
            "args": args,
            "prefs": {
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing.enabled": true
            }
        });
        if let Some(binary) = &config.binary_path {
            options["binary"] = json!(binary);
        }

        json!({
            "browserName": "chrome",
            "goog:chromeOptions": options
        })
    }

    /// Opens a new session against a WebDriver endpoint
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Base URL of the WebDriver server, e.g. `http://localhost:9515`
    /// * `capabilities` - Capabilities placed under `alwaysMatch`
    ///
    /// # Returns
    ///
    /// * `Ok(WebDriverSession)` - The new session
    /// * `Err(DriverError::Init)` - The server could not be reached or refused the session
    pub async fn start(endpoint: &str, capabilities: Value) -> DriverResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DriverError::Init(format!("failed to build HTTP client: {}", e)))?;

        let mut session = Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            session_id: String::new(),
        };

        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });
        let value = session
            .send(Method::POST, "session", Some(body))
            .await
            .map_err(|e| DriverError::Init(e.to_string()))?
            .map_err(|e| DriverError::Init(format!("new session refused: {}", e)))?;

        session.session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Init("new session response had no sessionId".to_string()))?
            .to_string();

        tracing::debug!("WebDriver session {} opened", session.session_id);
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> DriverResult<Result<Value, WireError>> {
        let url = format!("{}/{}", self.endpoint, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DriverError::Protocol(format!("{} {} failed: {}", method, url, e)))?;
        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            DriverError::Protocol(format!("{} {} returned invalid JSON: {}", method, url, e))
        })?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(Ok(value));
        }

        Ok(Err(WireError {
            error: value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }))
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        context: &str,
    ) -> DriverResult<Value> {
        self.send(method, &format!("session/{}/{}", self.session_id, path), body)
            .await?
            .map_err(|e| e.into_driver_error(context))
    }

    /// Navigates the session to `url`
    pub async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url })), "navigate")
            .await
            .map_err(|e| DriverError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    /// Finds the first element matching a CSS selector, or `None`
    pub async fn find_element(&self, css: &str) -> DriverResult<Option<String>> {
        self.locate("element", css).await
    }

    /// Finds the first element matching `css` below `parent`, or `None`
    pub async fn find_child_element(&self, parent: &str, css: &str) -> DriverResult<Option<String>> {
        self.locate(&format!("element/{}/element", parent), css).await
    }

    async fn locate(&self, path: &str, css: &str) -> DriverResult<Option<String>> {
        let body = json!({ "using": "css selector", "value": css });
        let full = format!("session/{}/{}", self.session_id, path);
        match self.send(Method::POST, &full, Some(body)).await? {
            Ok(value) => element_id(&value).map(Some),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e.into_driver_error(css)),
        }
    }

    /// Finds every element matching a CSS selector
    pub async fn find_elements(&self, css: &str) -> DriverResult<Vec<String>> {
        let body = json!({ "using": "css selector", "value": css });
        let value = self.command(Method::POST, "elements", Some(body), css).await?;
        value
            .as_array()
            .ok_or_else(|| DriverError::Protocol(format!("elements for '{}' not an array", css)))?
            .iter()
            .map(element_id)
            .collect()
    }

    pub async fn click(&self, element: &str) -> DriverResult<()> {
        self.command(
            Method::POST,
            &format!("element/{}/click", element),
            Some(json!({})),
            "click",
        )
        .await?;
        Ok(())
    }

    pub async fn clear(&self, element: &str) -> DriverResult<()> {
        self.command(
            Method::POST,
            &format!("element/{}/clear", element),
            Some(json!({})),
            "clear",
        )
        .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &str, text: &str) -> DriverResult<()> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element),
            Some(json!({ "text": text })),
            "send keys",
        )
        .await?;
        Ok(())
    }

    pub async fn text(&self, element: &str) -> DriverResult<String> {
        let value = self
            .command(Method::GET, &format!("element/{}/text", element), None, "text")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn is_selected(&self, element: &str) -> DriverResult<bool> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{}/selected", element),
                None,
                "selected",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn attribute(&self, element: &str, name: &str) -> DriverResult<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{}/attribute/{}", element, name),
                None,
                "attribute",
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Tells chromium to save downloads into `dir` without prompting
    pub async fn set_download_behavior(&self, dir: &Path) -> DriverResult<()> {
        let body = json!({
            "cmd": "Page.setDownloadBehavior",
            "params": { "behavior": "allow", "downloadPath": dir.to_string_lossy() }
        });
        self.command(Method::POST, "chromium/send_command", Some(body), "set download dir")
            .await?;
        Ok(())
    }

    /// Ends the session
    pub async fn quit(&self) -> DriverResult<()> {
        self.send(Method::DELETE, &format!("session/{}", self.session_id), None)
            .await?
            .map_err(|e| e.into_driver_error("delete session"))?;
        tracing::debug!("WebDriver session {} closed", self.session_id);
        Ok(())
    }
}

fn element_id(value: &Value) -> DriverResult<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol(format!("not an element reference: {}", value)))
}
