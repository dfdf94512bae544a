//! Playwright browser automation
//!
//! A session is one long-lived `node` process running a small driver script.
//! Commands go in as JSON lines on stdin, one reply per command comes back on
//! stdout. The child is killed if the session is dropped without `close`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shotdiff_common::{Error, Result, ScreenshotSize};

use super::{BrowserLauncher, BrowserSession};
use crate::config::BrowserKind;

const DRIVER_SCRIPT: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const engines = { chromium, firefox, webkit };
  const engine = engines[process.env.SHOTDIFF_BROWSER] || chromium;
  const browser = await engine.launch({ headless: true });
  const page = await browser.newPage();
  reply({ ok: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      reply({ ok: false, error: 'malformed command' });
      continue;
    }
    if (cmd.close) {
      break;
    }
    try {
      await page.setViewportSize({ width: cmd.width, height: cmd.height });
      await page.goto(cmd.url, { waitUntil: 'load' });
      await page.screenshot({ path: cmd.path });
      reply({ ok: true });
    } catch (error) {
      reply({ ok: false, error: error.message });
    }
  }

  await browser.close();
})().catch((error) => {
  reply({ ok: false, error: error.message });
  process.exit(1);
});
"#;

/// Launches Playwright-driven browser sessions through Node.js
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    node_binary: String,
    browser: BrowserKind,
    startup_timeout: Duration,
    command_timeout: Duration,
}

impl PlaywrightLauncher {
    pub fn new(node_binary: impl Into<String>, browser: BrowserKind) -> Self {
        Self {
            node_binary: node_binary.into(),
            browser,
            startup_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeouts(mut self, startup: Duration, command: Duration) -> Self {
        self.startup_timeout = startup;
        self.command_timeout = command;
        self
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        debug!("Starting {} via {}", self.browser.as_str(), self.node_binary);

        let mut child = Command::new(&self.node_binary)
            .arg("-e")
            .arg(DRIVER_SCRIPT)
            .env("SHOTDIFF_BROWSER", self.browser.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::CaptureUnavailable(format!("failed to spawn {}: {}", self.node_binary, e))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => return Err(Error::CaptureUnavailable("driver pipes unavailable".into())),
        };

        let mut session = PlaywrightSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            command_timeout: self.command_timeout,
        };

        match timeout(self.startup_timeout, session.read_reply()).await {
            Ok(Ok(())) => {
                info!("Browser session open ({})", self.browser.as_str());
                Ok(Box::new(session))
            }
            Ok(Err(e)) => Err(Error::CaptureUnavailable(e.to_string())),
            Err(_) => Err(Error::CaptureUnavailable(format!(
                "browser did not start within {}s",
                self.startup_timeout.as_secs()
            ))),
        }
    }
}

#[derive(Serialize)]
struct DriverCommand<'a> {
    url: &'a str,
    width: u32,
    height: u32,
    path: &'a str,
}

#[derive(Deserialize)]
struct DriverReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// One running driver process
struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    command_timeout: Duration,
}

impl PlaywrightSession {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<()> {
        let line = self
            .stdout
            .next_line()
            .await?
            .ok_or_else(|| Error::Capture("browser driver exited".into()))?;
        let reply: DriverReply = serde_json::from_str(&line)
            .map_err(|e| Error::Capture(format!("unexpected driver output {:?}: {}", line, e)))?;
        if reply.ok {
            Ok(())
        } else {
            Err(Error::Capture(
                reply.error.unwrap_or_else(|| "unknown driver error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn screenshot(&mut self, url: &str, size: &ScreenshotSize, output: &Path) -> Result<()> {
        let path = output.to_string_lossy();
        let command = serde_json::to_string(&DriverCommand {
            url,
            width: size.width,
            height: size.height,
            path: &path,
        })?;

        self.send_line(&command).await?;
        match timeout(self.command_timeout, self.read_reply()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Capture(format!(
                "screenshot at {} timed out after {}s",
                size,
                self.command_timeout.as_secs()
            ))),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Err(e) = self.send_line(r#"{"close":true}"#).await {
            debug!("Driver stdin already closed: {}", e);
        }
        match timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Browser driver exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!("Browser driver did not exit, killing it");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_node_is_unavailable() {
        let launcher = PlaywrightLauncher::new("/nonexistent/shotdiff-node", BrowserKind::Chromium);
        let result = launcher.open().await;
        assert!(matches!(result, Err(Error::CaptureUnavailable(_))));
    }

    #[test]
    fn test_command_encoding() {
        let json = serde_json::to_value(DriverCommand {
            url: "data:text/html;charset=utf-8,x",
            width: 320,
            height: 568,
            path: "/tmp/a.png",
        })
        .unwrap();
        assert_eq!(json["width"], 320);
        assert_eq!(json["path"], "/tmp/a.png");
    }

    #[test]
    fn test_driver_script_reads_browser_from_env() {
        assert!(DRIVER_SCRIPT.contains("SHOTDIFF_BROWSER"));
        assert!(DRIVER_SCRIPT.contains("page.screenshot"));
    }
}
