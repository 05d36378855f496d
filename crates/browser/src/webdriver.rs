//! W3C WebDriver session client
//!
//! Speaks the JSON wire protocol directly over HTTP. Only the handful of
//! commands the run workflow needs are implemented.

use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{BrowserError, BrowserResult};

/// Key under which W3C drivers return element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    /// Anchor whose visible text contains the given string
    PartialLinkText(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn link_containing(text: impl Into<String>) -> Self {
        Locator::PartialLinkText(text.into())
    }

    fn strategy(&self) -> (&'static str, &str) {
        match self {
            Locator::Css(s) => ("css selector", s),
            Locator::XPath(s) => ("xpath", s),
            Locator::PartialLinkText(s) => ("partial link text", s),
        }
    }

    fn to_json(&self) -> Value {
        let (using, value) = self.strategy();
        json!({ "using": using, "value": value })
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (using, value) = self.strategy();
        write!(f, "{}={}", using, value)
    }
}

/// Opaque reference to an element in the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(String);

impl ElementRef {
    fn from_json(value: &Value) -> BrowserResult<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementRef(id.to_string()))
            .ok_or_else(|| BrowserError::Protocol(format!("not an element reference: {}", value)))
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Browser session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,

    /// Where the browser saves downloads (made absolute before launch)
    pub download_dir: PathBuf,

    /// Per-request HTTP timeout towards the driver
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            download_dir: PathBuf::from("data"),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    /// `capabilities` payload for a new Chrome session
    pub fn capabilities(&self) -> Value {
        let mut args = Vec::new();
        if self.headless {
            args.extend([
                "--headless".to_string(),
                "--disable-gpu".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ]);
        }
        args.push(format!("--window-size={},{}", self.window_width, self.window_height));

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": self.download_dir.to_string_lossy(),
                            "download.prompt_for_download": false,
                        }
                    }
                }
            }
        })
    }
}

/// An open browser session
pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverSession {
    /// Open a new browser session on the given driver
    pub async fn start(driver_url: &str, config: &SessionConfig) -> BrowserResult<Self> {
        std::fs::create_dir_all(&config.download_dir)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let mut session = Self {
            client,
            base_url: driver_url.trim_end_matches('/').to_string(),
            session_id: String::new(),
        };

        let value = session
            .send(reqwest::Method::POST, "/session", Some(config.capabilities()))
            .await?;
        session.session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol(format!("no sessionId in {}", value)))?
            .to_string();

        info!("Browser session {} opened", session.session_id);
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a raw command and unwrap the `value` envelope
    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("WebDriver {} {}", method, path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let mut payload: Value = response.json().await?;
        let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        match serde_json::from_value::<WireError>(value) {
            Ok(wire) => Err(BrowserError::WebDriver {
                error: wire.error,
                message: wire.message,
            }),
            Err(_) => Err(BrowserError::Protocol(format!("{} from {}", status, path))),
        }
    }

    fn session_path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.send(reqwest::Method::POST, &self.session_path("/url"), Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    /// Look up the first matching element; `None` when nothing matches
    pub async fn find(&self, locator: &Locator) -> BrowserResult<Option<ElementRef>> {
        self.find_at(&self.session_path("/element"), locator).await
    }

    /// Look up the first match below `parent`
    pub async fn find_in(&self, parent: &ElementRef, locator: &Locator) -> BrowserResult<Option<ElementRef>> {
        let path = self.session_path(&format!("/element/{}/element", parent.id()));
        self.find_at(&path, locator).await
    }

    async fn find_at(&self, path: &str, locator: &Locator) -> BrowserResult<Option<ElementRef>> {
        match self.send(reqwest::Method::POST, path, Some(locator.to_json())).await {
            Ok(value) => Ok(Some(ElementRef::from_json(&value)?)),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`find`](Self::find) but a missing element is an error
    pub async fn require(&self, locator: &Locator) -> BrowserResult<ElementRef> {
        self.find(locator)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))
    }

    /// All matching elements, in document order
    pub async fn find_all(&self, locator: &Locator) -> BrowserResult<Vec<ElementRef>> {
        let value = self
            .send(reqwest::Method::POST, &self.session_path("/elements"), Some(locator.to_json()))
            .await?;
        elements_from_json(&value)
    }

    /// All matches below `parent`, in document order
    pub async fn find_all_in(&self, parent: &ElementRef, locator: &Locator) -> BrowserResult<Vec<ElementRef>> {
        let path = self.session_path(&format!("/element/{}/elements", parent.id()));
        let value = self.send(reqwest::Method::POST, &path, Some(locator.to_json())).await?;
        elements_from_json(&value)
    }

    pub async fn click(&self, element: &ElementRef) -> BrowserResult<()> {
        let path = self.session_path(&format!("/element/{}/click", element.id()));
        self.send(reqwest::Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    /// Replace the contents of an input
    pub async fn fill(&self, element: &ElementRef, text: &str) -> BrowserResult<()> {
        let clear = self.session_path(&format!("/element/{}/clear", element.id()));
        self.send(reqwest::Method::POST, &clear, Some(json!({}))).await?;

        let value = self.session_path(&format!("/element/{}/value", element.id()));
        self.send(reqwest::Method::POST, &value, Some(json!({ "text": text }))).await?;
        Ok(())
    }

    /// Rendered text of an element
    pub async fn text(&self, element: &ElementRef) -> BrowserResult<String> {
        let path = self.session_path(&format!("/element/{}/text", element.id()));
        let value = self.send(reqwest::Method::GET, &path, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn is_enabled(&self, element: &ElementRef) -> BrowserResult<bool> {
        let path = self.session_path(&format!("/element/{}/enabled", element.id()));
        let value = self.send(reqwest::Method::GET, &path, None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn is_displayed(&self, element: &ElementRef) -> BrowserResult<bool> {
        let path = self.session_path(&format!("/element/{}/displayed", element.id()));
        let value = self.send(reqwest::Method::GET, &path, None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// End the session; the browser window goes away with it
    pub async fn close(&self) -> BrowserResult<()> {
        self.send(reqwest::Method::DELETE, &self.session_path(""), None).await?;
        info!("Browser session {} closed", self.session_id);
        Ok(())
    }
}

fn elements_from_json(value: &Value) -> BrowserResult<Vec<ElementRef>> {
    value
        .as_array()
        .ok_or_else(|| BrowserError::Protocol(format!("expected element list, got {}", value)))?
        .iter()
        .map(ElementRef::from_json)
        .collect()
}
