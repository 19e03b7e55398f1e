use crate::crawlers::session::Session;
use crate::error::SessionError;
use async_trait::async_trait;
use fantoccini::error::{CmdError, NewSessionError};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};
use url::Url;

/// How long `wait_stable` polls `document.readyState` after its fixed delay
const READY_TIMEOUT: Duration = Duration::from_secs(15);
const READY_POLL: Duration = Duration::from_millis(100);

/// [`Session`] backed by a WebDriver client (ChromeDriver, geckodriver, ...)
pub struct WebDriverSession {
    client: Client,
    closed: bool,
}

impl WebDriverSession {
    /// Connects to the WebDriver instance, trying common fallback ports.
    ///
    /// With `debugger_address` (`host:port` of a Chrome started with
    /// `--remote-debugging-port`) the session attaches to that browser and
    /// starts on its active tab instead of opening a new one.
    pub async fn connect(
        webdriver_url: &str,
        debugger_address: Option<&str>,
    ) -> Result<Self, SessionError> {
        let capabilities = debugger_address.map(|address| {
            let mut caps = Map::new();
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({ "debuggerAddress": address }),
            );
            caps
        });

        let client = connect_to_webdriver(webdriver_url, capabilities.as_ref()).await?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            closed: false,
        }
    }

    /// Ends the WebDriver session
    pub async fn close(mut self) -> Result<(), SessionError> {
        self.closed = true;
        self.client
            .close()
            .await
            .map_err(|e| SessionError::Command {
                context: "closing the session".to_string(),
                message: e.to_string(),
            })
    }

    /// Converts a command error, marking the session closed if it was lost
    fn command_error(&mut self, error: CmdError, context: &str, url: &str) -> SessionError {
        let message = error.to_string();
        if message.contains("Unable to find session")
            || message.contains("invalid session id")
            || message.contains("no such window")
        {
            ::log::warn!("Lost session while {} {}", context, url);
            self.closed = true;
            return SessionError::Closed;
        }

        ::log::debug!("Failed {} {}: {}", context, url, message);
        SessionError::Command {
            context: format!("{context} {url}"),
            message,
        }
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let result = self.client.goto(url).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => match self.command_error(e, "accessing", url) {
                SessionError::Command { message, .. } => Err(SessionError::Navigation {
                    url: url.to_string(),
                    message,
                }),
                other => Err(other),
            },
        }
    }

    async fn go_back(&mut self) -> Result<(), SessionError> {
        self.client
            .back()
            .await
            .map_err(|e| self.command_error(e, "going back from", "current page"))
    }

    async fn wait_stable(&mut self, delay: Duration) -> Result<(), SessionError> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            let state = self
                .client
                .execute("return document.readyState", vec![])
                .await
                .map_err(|e| self.command_error(e, "reading readyState of", "current page"))?;

            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                ::log::debug!("Document still {:?} after {:?}", state, READY_TIMEOUT);
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, SessionError> {
        let found = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await;
        match found {
            Ok(_) => Ok(true),
            Err(CmdError::WaitTimeout) => Ok(false),
            Err(e) => Err(self.command_error(e, "waiting for", selector)),
        }
    }

    async fn source(&mut self) -> Result<String, SessionError> {
        self.client
            .source()
            .await
            .map_err(|e| self.command_error(e, "getting source for", "current page"))
    }

    async fn activate(&mut self, selector: &str) -> Result<bool, SessionError> {
        let controls = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(|e| self.command_error(e, "finding", selector))?;

        let Some(control) = controls.into_iter().next() else {
            ::log::debug!("No control matches {}", selector);
            return Ok(false);
        };

        let usable = async {
            let displayed = control.is_displayed().await?;
            let enabled = control.is_enabled().await?;
            let aria_disabled = control.attr("aria-disabled").await?;
            let class = control.attr("class").await?.unwrap_or_default();
            Ok::<bool, CmdError>(
                displayed
                    && enabled
                    && aria_disabled.as_deref() != Some("true")
                    && !class.split_whitespace().any(|c| c == "disabled"),
            )
        }
        .await
        .map_err(|e| self.command_error(e, "inspecting", selector))?;

        if !usable {
            ::log::debug!("Control {} is hidden or disabled", selector);
            return Ok(false);
        }

        control
            .click()
            .await
            .map_err(|e| self.command_error(e, "clicking", selector))?;
        Ok(true)
    }

    async fn current_url(&mut self) -> Result<Url, SessionError> {
        self.client
            .current_url()
            .await
            .map_err(|e| self.command_error(e, "reading URL of", "current page"))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Connects to the WebDriver instance
async fn connect_to_webdriver(
    webdriver_url: &str,
    capabilities: Option<&Map<String, Value>>,
) -> Result<Client, SessionError> {
    // Try to connect to the specified WebDriver URL
    match try_connect(webdriver_url, capabilities).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Ok(client);
        }
        Err(e) => {
            ::log::error!(
                "Failed to connect to WebDriver at {}: {}",
                webdriver_url,
                e
            );
        }
    }

    // If we couldn't connect, try with common alternative URLs
    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://localhost:4444", // Selenium / geckodriver default
        "http://127.0.0.1:4444", // Try with IP instead of localhost
    ];

    for url in fallback_urls.iter() {
        if *url == webdriver_url {
            continue; // Skip if it's the same as the one we already tried
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = try_connect(url, capabilities).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(SessionError::Command {
        context: "connecting to WebDriver".to_string(),
        message: format!("no WebDriver server reachable at {webdriver_url} or fallbacks"),
    })
}

async fn try_connect(
    url: &str,
    capabilities: Option<&Map<String, Value>>,
) -> Result<Client, NewSessionError> {
    let mut builder = ClientBuilder::native();
    if let Some(caps) = capabilities {
        builder.capabilities(caps.clone());
    }
    builder.connect(url).await
}
