//! Clipboard adapters: a local command for the CLI and a browser script for the web.

use std::{
    io::{ErrorKind, Write},
    process::{Command, Stdio},
    time::Instant,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::export::{
    COPY_FAILURE_NOTICE, COPY_SUCCESS_NOTICE, Clipboard, ClipboardWrite, ExportError,
};
use crate::application::stream::{EventSender, js_string};

/// Pipes the text into a program such as `xclip -selection clipboard` or `pbcopy`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    command: Vec<String>,
}

impl CommandClipboard {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn pipe(&self, text: &str) -> Result<(), ExportError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(ExportError::clipboard("no clipboard command configured"));
        };
        let started_at = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                let message = if err.kind() == ErrorKind::NotFound {
                    format!("`{program}` not found")
                } else {
                    err.to_string()
                };
                ExportError::clipboard(message)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|err| ExportError::clipboard(err.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| ExportError::clipboard(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "bazi_coach::infra::clipboard",
                op = "copy",
                result = "error",
                program = program.as_str(),
                exit_code = output.status.code().map(i64::from).unwrap_or(-1),
                stderr = %stderr,
                "Clipboard command failed"
            );
            return Err(ExportError::clipboard(format!(
                "`{program}` exited with {}",
                output.status
            )));
        }

        debug!(
            target = "bazi_coach::infra::clipboard",
            op = "copy",
            result = "ok",
            program = program.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Clipboard command accepted text"
        );
        Ok(())
    }
}

#[async_trait]
impl Clipboard for CommandClipboard {
    async fn write_text(&self, text: &str) -> Result<ClipboardWrite, ExportError> {
        let clipboard = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || clipboard.pipe(&text))
            .await
            .map_err(|err| ExportError::clipboard(err.to_string()))??;
        Ok(ClipboardWrite::Done)
    }
}

/// Hands the text to the browser's async clipboard API over the open event stream.
///
/// The page reports success or failure itself, so writes settle as
/// [`ClipboardWrite::Deferred`].
#[derive(Clone)]
pub struct ScriptClipboard {
    sender: EventSender,
}

impl ScriptClipboard {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }
}

/// Script that copies `text` and alerts the outcome.
pub fn clipboard_script(text: &str) -> String {
    format!(
        "navigator.clipboard.writeText({}).then(() => alert({})).catch(() => alert({}))",
        js_string(text),
        js_string(COPY_SUCCESS_NOTICE),
        js_string(COPY_FAILURE_NOTICE)
    )
}

#[async_trait]
impl Clipboard for ScriptClipboard {
    async fn write_text(&self, text: &str) -> Result<ClipboardWrite, ExportError> {
        if self.sender.is_closed() {
            return Err(ExportError::clipboard("client disconnected"));
        }
        self.sender.script(clipboard_script(text));
        Ok(ClipboardWrite::Deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::stream::live_stream;

    #[test]
    fn script_quotes_text_and_notices() {
        let script = clipboard_script("【八字命盘概览】\n\"甲\"");
        assert!(script.starts_with("navigator.clipboard.writeText(\"【八字命盘概览】\\n\\\"甲\\\"\")"));
        assert!(script.contains("alert(\"报告已复制到剪贴板！\")"));
        assert!(script.contains("alert(\"复制报告失败，请手动复制\")"));
    }

    #[tokio::test]
    async fn script_clipboard_defers_while_client_is_connected() {
        let (sender, response) = live_stream();
        let clipboard = ScriptClipboard::new(sender.clone());
        assert_eq!(
            clipboard.write_text("text").await.expect("queued"),
            ClipboardWrite::Deferred
        );

        drop(response);
        assert!(clipboard.write_text("text").await.is_err());
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let clipboard = CommandClipboard::new(Vec::new());
        let err = clipboard.write_text("x").await.expect_err("no command");
        assert!(matches!(err, ExportError::Clipboard { .. }));
    }
}

#[cfg(all(test, unix))]
mod command_tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn command_receives_text_on_stdin() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let sink = dir.path().join("clipboard.txt");
        let clipboard = CommandClipboard::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat > '{}'", sink.display()),
        ]);

        let settled = clipboard.write_text("生成时间：2026/1/2").await.expect("copied");
        assert_eq!(settled, ClipboardWrite::Done);
        assert_eq!(fs::read_to_string(&sink).expect("read"), "生成时间：2026/1/2");
    }

    #[tokio::test]
    async fn failing_command_is_reported() {
        let clipboard = CommandClipboard::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat > /dev/null; exit 3".to_string(),
        ]);
        let err = clipboard.write_text("x").await.expect_err("failure");
        assert!(matches!(err, ExportError::Clipboard { .. }));
    }
}
