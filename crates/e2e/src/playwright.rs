//! Playwright browser automation
//!
//! A long-lived `node` process runs a generated bridge script that owns one
//! browser page. Commands go to the bridge as JSON lines on stdin; replies
//! and the page's network events come back as JSON lines on stdout. Network
//! events are fed straight into the session's [`TrafficRecorder`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use signup_probe_common::{ObservedRequest, Payload, RequestKey, TrafficEvent, TrafficRecorder};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::browser::BrowserSession;
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    /// Parse a browser name; unknown names fall back to Chromium.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Per-command timeout, also passed to Playwright actions
    pub command_timeout: Duration,
    /// How long to wait for the browser to come up
    pub startup_timeout: Duration,
    pub node_binary: PathBuf,
    /// `NODE_PATH` for resolving the `playwright` package
    pub node_path: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            command_timeout: Duration::from_secs(15),
            startup_timeout: Duration::from_secs(30),
            node_binary: PathBuf::from("node"),
            node_path: None,
        }
    }
}

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeReply>>>>;

/// One browser page driven through the bridge process.
pub struct PlaywrightSession {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: PendingReplies,
    next_id: AtomicU64,
    command_timeout: Duration,
    reader: JoinHandle<()>,
    _workdir: TempDir,
}

impl PlaywrightSession {
    /// Start the bridge and wait until the page is ready. Every request the
    /// page sends is reported to `recorder`.
    pub async fn launch(config: &PlaywrightConfig, recorder: TrafficRecorder) -> E2eResult<Self> {
        Self::check_playwright_installed().await?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("bridge.js");
        std::fs::write(&script_path, render_bridge_script(config))?;

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Playwright(format!(
                "Failed to spawn {}: {}",
                config.node_binary.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[bridge] {}", line);
                }
            });
        }

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let reader = tokio::spawn(pump(stdout, pending.clone(), recorder, ready_tx));

        match tokio::time::timeout(config.startup_timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(E2eError::BridgeClosed(
                    "bridge exited before the browser was ready".to_string(),
                ))
            }
            Err(_) => return Err(E2eError::Timeout("browser startup".to_string())),
        }

        info!(
            "{} ready (headless: {})",
            config.browser.as_str(),
            config.headless
        );

        Ok(Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            command_timeout: config.command_timeout,
            reader,
            _workdir: workdir,
        })
    }

    /// Check if Playwright is installed
    async fn check_playwright_installed() -> E2eResult<()> {
        let status = TokioCommand::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn call(&self, command: Command<'_>) -> E2eResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let step = command.describe();
        trace!("-> {} {}", id, step);

        let mut message = serde_json::to_value(&command)?;
        message["id"] = id.into();
        let mut line = message.to_string();
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        {
            let mut stdin = self.stdin.lock().await;
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                self.pending.lock().remove(&id);
                return Err(E2eError::BridgeClosed(format!("{}: {}", step, e)));
            }
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(reply)) => reply.into_result(step),
            Ok(Err(_)) => Err(E2eError::BridgeClosed(format!("no reply to {}", step))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(E2eError::Timeout(step))
            }
        }
    }

    async fn call_bool(&self, command: Command<'_>) -> E2eResult<bool> {
        Ok(self.call(command).await?.as_bool().unwrap_or(false))
    }

    async fn call_string(&self, command: Command<'_>) -> E2eResult<String> {
        Ok(self
            .call(command)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn stop_process(&self) -> E2eResult<()> {
        let mut child = self.child.lock().await;

        if tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .is_ok()
        {
            return Ok(());
        }

        // Try graceful shutdown first
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            warn!("Bridge did not exit, sending SIGTERM to {}", pid);
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(Duration::from_millis(500), child.wait())
                    .await
                    .is_ok()
            {
                return Ok(());
            }
        }

        // Force kill if still running
        let _ = child.kill().await;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.call(Command::Goto { url }).await.map(drop)
    }

    async fn current_url(&self) -> E2eResult<String> {
        self.call_string(Command::Url).await
    }

    async fn clear_and_type(&self, selector: &str, text: &str) -> E2eResult<()> {
        self.call(Command::Type { selector, text }).await.map(drop)
    }

    async fn click(&self, selector: &str, clicks: u32) -> E2eResult<()> {
        self.call(Command::Click { selector, clicks }).await.map(drop)
    }

    async fn click_text(&self, tag: &str, text: &str) -> E2eResult<()> {
        self.call(Command::ClickText { tag, text }).await.map(drop)
    }

    async fn check(&self, selector: &str) -> E2eResult<()> {
        self.call(Command::Check { selector }).await.map(drop)
    }

    async fn focus(&self, selector: &str) -> E2eResult<()> {
        self.call(Command::Focus { selector }).await.map(drop)
    }

    async fn blur(&self) -> E2eResult<()> {
        self.call(Command::Blur).await.map(drop)
    }

    async fn input_value(&self, selector: &str) -> E2eResult<String> {
        self.call_string(Command::Value { selector }).await
    }

    async fn text_content(&self, selector: &str) -> E2eResult<String> {
        self.call_string(Command::Text { selector }).await
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        self.call_bool(Command::Visible { selector }).await
    }

    async fn has_visible_text(&self, text: &str) -> E2eResult<bool> {
        self.call_bool(Command::HasText { text }).await
    }

    async fn has_text_near(&self, selector: &str, text: &str) -> E2eResult<bool> {
        self.call_bool(Command::TextNear { selector, text }).await
    }

    async fn remove_attribute(&self, selector: &str, name: &str) -> E2eResult<()> {
        self.call(Command::RemoveAttribute { selector, name })
            .await
            .map(drop)
    }

    async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.call(Command::Close).await {
            debug!("Close command failed: {}", e);
        }
        self.stop_process().await
    }
}

impl Drop for PlaywrightSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read bridge output until it closes, routing replies to their callers and
/// network events to the recorder.
async fn pump(
    stdout: ChildStdout,
    pending: PendingReplies,
    recorder: TrafficRecorder,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Bridge output unreadable: {}", e);
                break;
            }
        };

        let message: BridgeMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(_) => {
                debug!("[bridge] {}", line);
                continue;
            }
        };

        match message {
            BridgeMessage::Ready => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(());
                }
            }
            BridgeMessage::Reply(reply) => {
                let waiter = pending.lock().remove(&reply.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!("Late reply {} dropped", reply.id),
                }
            }
            network => {
                if let Some(event) = network.into_event() {
                    recorder.ingest(event);
                }
            }
        }
    }

    // Dropping the senders fails every outstanding call.
    pending.lock().clear();
    debug!("Bridge output closed");
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command<'a> {
    Goto { url: &'a str },
    Url,
    Type { selector: &'a str, text: &'a str },
    Click { selector: &'a str, clicks: u32 },
    ClickText { tag: &'a str, text: &'a str },
    Check { selector: &'a str },
    Focus { selector: &'a str },
    Blur,
    Value { selector: &'a str },
    Text { selector: &'a str },
    Visible { selector: &'a str },
    HasText { text: &'a str },
    TextNear { selector: &'a str, text: &'a str },
    RemoveAttribute { selector: &'a str, name: &'a str },
    Close,
}

impl Command<'_> {
    /// Step name used in logs and errors
    fn describe(&self) -> String {
        match self {
            Command::Goto { url } => format!("goto:{}", url),
            Command::Url => "url".to_string(),
            Command::Type { selector, .. } => format!("type:{}", selector),
            Command::Click { selector, clicks } => format!("click:{}x{}", selector, clicks),
            Command::ClickText { tag, text } => format!("click:{}:{}", tag, text),
            Command::Check { selector } => format!("check:{}", selector),
            Command::Focus { selector } => format!("focus:{}", selector),
            Command::Blur => "blur".to_string(),
            Command::Value { selector } => format!("value:{}", selector),
            Command::Text { selector } => format!("text:{}", selector),
            Command::Visible { selector } => format!("visible:{}", selector),
            Command::HasText { text } => format!("has_text:{}", text),
            Command::TextNear { selector, .. } => format!("text_near:{}", selector),
            Command::RemoveAttribute { selector, name } => {
                format!("remove_attribute:{}[{}]", selector, name)
            }
            Command::Close => "close".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl BridgeReply {
    fn into_result(self, step: String) -> E2eResult<serde_json::Value> {
        if self.ok {
            Ok(self.value)
        } else {
            Err(E2eError::StepFailed {
                step,
                reason: self.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BridgeMessage {
    Ready,
    Reply(BridgeReply),
    Request {
        request_id: u64,
        method: String,
        url: String,
        #[serde(default)]
        body: Option<String>,
    },
    Response {
        request_id: u64,
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        body: Option<String>,
    },
    Failed {
        request_id: u64,
        error: String,
    },
}

impl BridgeMessage {
    fn into_event(self) -> Option<TrafficEvent> {
        match self {
            BridgeMessage::Request {
                request_id,
                method,
                url,
                body,
            } => Some(TrafficEvent::Request(ObservedRequest::new(
                RequestKey(request_id),
                method,
                url,
                Payload::from_text(body.as_deref()),
            ))),
            BridgeMessage::Response {
                request_id,
                status: Some(status),
                body,
            } => Some(TrafficEvent::Response {
                key: RequestKey(request_id),
                status,
                body: Payload::from_text(body.as_deref()),
            }),
            BridgeMessage::Response {
                request_id,
                status: None,
                ..
            } => Some(TrafficEvent::Failed {
                key: RequestKey(request_id),
                reason: "finished without a response".to_string(),
            }),
            BridgeMessage::Failed { request_id, error } => Some(TrafficEvent::Failed {
                key: RequestKey(request_id),
                reason: error,
            }),
            BridgeMessage::Ready | BridgeMessage::Reply(_) => None,
        }
    }
}

/// Fill the bridge template for this configuration.
pub fn render_bridge_script(config: &PlaywrightConfig) -> String {
    BRIDGE_TEMPLATE
        .replace("__BROWSER__", config.browser.as_str())
        .replace("__HEADLESS__", if config.headless { "true" } else { "false" })
        .replace("__WIDTH__", &config.viewport_width.to_string())
        .replace("__HEIGHT__", &config.viewport_height.to_string())
        .replace("__TIMEOUT__", &config.command_timeout.as_millis().to_string())
}

const BRIDGE_TEMPLATE: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const emit = (message) => process.stdout.write(JSON.stringify(message) + '\n');

(async () => {
  const browser = await __BROWSER__.launch({ headless: __HEADLESS__ });
  const context = await browser.newContext({
    viewport: { width: __WIDTH__, height: __HEIGHT__ }
  });
  const page = await context.newPage();
  page.setDefaultTimeout(__TIMEOUT__);

  const ids = new WeakMap();
  let nextRequest = 0;

  page.on('request', (request) => {
    const request_id = ++nextRequest;
    ids.set(request, request_id);
    emit({ kind: 'request', request_id, method: request.method(), url: request.url(), body: request.postData() });
  });
  page.on('requestfinished', async (request) => {
    const request_id = ids.get(request);
    if (request_id === undefined) return;
    const response = await request.response();
    let body = null;
    try { body = response ? await response.text() : null; } catch (e) { body = null; }
    emit({ kind: 'response', request_id, status: response ? response.status() : null, body });
  });
  page.on('requestfailed', (request) => {
    const request_id = ids.get(request);
    if (request_id === undefined) return;
    const failure = request.failure();
    emit({ kind: 'failed', request_id, error: failure ? failure.errorText : 'request failed' });
  });

  const first = (selector) => page.locator(selector).first();
  const ops = {
    goto: async ({ url }) => { await page.goto(url); },
    url: async () => page.url(),
    type: async ({ selector, text }) => {
      const el = first(selector);
      await el.fill('');
      await el.pressSequentially(text);
    },
    click: async ({ selector, clicks }) => {
      const el = first(selector);
      for (let i = 0; i < clicks; i++) {
        await el.click({ force: i > 0, noWaitAfter: true });
      }
    },
    click_text: async ({ tag, text }) => {
      await page.locator(tag, { hasText: text }).first().click({ force: true });
    },
    check: async ({ selector }) => { await first(selector).check({ force: true }); },
    focus: async ({ selector }) => {
      const el = first(selector);
      await el.scrollIntoViewIfNeeded();
      await el.focus();
    },
    blur: async () => { await page.mouse.click(0, 0); },
    value: async ({ selector }) => first(selector).inputValue(),
    text: async ({ selector }) => (await first(selector).textContent()) || '',
    visible: async ({ selector }) => first(selector).isVisible(),
    has_text: async ({ text }) => page.getByText(text).first().isVisible(),
    text_near: async ({ selector, text }) => first(selector).evaluate((el, text) => {
      for (let node = el.parentElement; node; node = node.parentElement) {
        if (node.innerText && node.innerText.includes(text)) return true;
      }
      return false;
    }, text),
    remove_attribute: async ({ selector, name }) => {
      await first(selector).evaluate((el, name) => el.removeAttribute(name), name);
    },
    close: async () => null,
  };

  emit({ kind: 'ready' });

  const input = readline.createInterface({ input: process.stdin });
  for await (const line of input) {
    if (!line.trim()) continue;
    const command = JSON.parse(line);
    try {
      const op = ops[command.op];
      if (!op) throw new Error(`unknown op ${command.op}`);
      const value = await op(command);
      emit({ kind: 'reply', id: command.id, ok: true, value: value === undefined ? null : value });
    } catch (error) {
      emit({ kind: 'reply', id: command.id, ok: false, error: error.message });
    }
    if (command.op === 'close') break;
  }

  await browser.close();
  process.exit(0);
})().catch((error) => {
  console.error(error.stack || error.message);
  process.exit(1);
});
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use signup_probe_common::{ExchangeState, RoutePattern};

    #[test]
    fn test_render_bridge_script() {
        let script = render_bridge_script(&PlaywrightConfig {
            browser: Browser::Firefox,
            headless: false,
            viewport_width: 1920,
            viewport_height: 1080,
            ..Default::default()
        });
        assert!(script.contains("await firefox.launch({ headless: false })"));
        assert!(script.contains("viewport: { width: 1920, height: 1080 }"));
        assert!(script.contains("page.setDefaultTimeout(15000)"));
        assert!(!script.contains("__"));
    }

    #[test]
    fn test_command_wire_format() {
        let mut message = serde_json::to_value(Command::Click {
            selector: "#go",
            clicks: 2,
        })
        .unwrap();
        message["id"] = 7.into();
        assert_eq!(
            message,
            serde_json::json!({"op": "click", "selector": "#go", "clicks": 2, "id": 7})
        );
        assert_eq!(serde_json::to_value(Command::Blur).unwrap(), serde_json::json!({"op": "blur"}));
    }

    #[test]
    fn test_reply_errors_name_the_step() {
        let reply: BridgeReply =
            serde_json::from_str(r#"{"kind":"reply","id":3,"ok":false,"error":"Timeout 15000ms exceeded"}"#)
                .unwrap();
        let err = reply.into_result("click:#go x1".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Step failed: click:#go x1 - Timeout 15000ms exceeded");
    }

    #[test]
    fn test_network_messages_feed_the_recorder() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.start_recording(RoutePattern::any_post());

        let lines = [
            r#"{"kind":"request","request_id":1,"method":"POST","url":"https://api.example.ca/accounts","body":"{\"email\":\"a@b.c\"}"}"#,
            r#"{"kind":"request","request_id":2,"method":"POST","url":"https://collector.example.io/v1","body":null}"#,
            r#"{"kind":"response","request_id":1,"status":201,"body":"{\"id\":1}"}"#,
            r#"{"kind":"failed","request_id":2,"error":"net::ERR_ABORTED"}"#,
        ];
        for line in lines {
            let message: BridgeMessage = serde_json::from_str(line).unwrap();
            recorder.ingest(message.into_event().unwrap());
        }

        let buffer = handle.snapshot();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[0].status, Some(201));
        assert_eq!(buffer[1].state(), ExchangeState::Failed);
        assert_eq!(buffer[1].failure.as_deref(), Some("net::ERR_ABORTED"));
    }

    #[test]
    fn test_response_without_status_is_a_failure() {
        let message: BridgeMessage =
            serde_json::from_str(r#"{"kind":"response","request_id":4,"status":null,"body":null}"#).unwrap();
        assert!(matches!(message.into_event(), Some(TrafficEvent::Failed { .. })));
    }

    #[test]
    fn test_browser_from_name() {
        assert!(matches!(Browser::from_name("WebKit"), Browser::Webkit));
        assert!(matches!(Browser::from_name("edge"), Browser::Chromium));
    }
}
