//! A single named, pty-backed shell (§3, §4.1).
//!
//! Grounded on `examples/yotaro-shimose-coder-mcp/src/runtime/terminal.rs`: a
//! `portable-pty` child with a background reader thread filling a shared byte
//! buffer, and the foreground async code polling that buffer on a short
//! deadline. The handshake there used OSC-133 semantic prompts; here the
//! command-boundary sentinel is the `[CMD_BEGIN]...[CMD_END]` template §4.1
//! mandates, matched with `PROMPT_RE`.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use portable_pty::{Child, CommandBuilder, NativePtySystem, PtySize, PtySystem};
use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{sleep, Duration};

use crate::error::{HostError, HostResult};
use crate::terminal::messages::{
    CommandMode, TerminalInputMessage, TerminalOutputMessage, TerminalOutputMessageType,
    TerminalStatus,
};
use crate::terminal::{output, splitter};

pub const PS1: &str = "[CMD_BEGIN]\\n\\u@\\h:\\w\\n[CMD_END]\\n";
pub const PS1_PATTERN: &str =
    r"\[CMD_BEGIN\]\s*(.*?)\s*([a-z0-9_-]*)@([a-zA-Z0-9.-]*):(.+)\s*\[CMD_END\]";

static PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PS1_PATTERN).unwrap());

const HISTORY_CAP: usize = 100;
const MAX_ENTRY_TEXT: usize = 5000;
const MAX_TOTAL_VIEW: usize = 10000;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub command: String,
    pub pre_prompt: String,
    pub after_prompt: String,
    pub output: String,
    pub finished: bool,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    fn rendered(&self, append_prompt_line: bool) -> String {
        let truncated = truncate_from_back(&self.output, MAX_ENTRY_TEXT);
        let mut s = format!("{} {}\n{}", self.pre_prompt, self.command, truncated);
        if self.finished && append_prompt_line {
            s.push('\n');
            s.push_str(&self.after_prompt);
        }
        s
    }
}

fn truncate_from_back(text: &str, max_len: usize) -> String {
    if text.len() > max_len {
        let tail_start = text.len() - max_len;
        // Walk forward to the nearest char boundary so we never slice mid-codepoint.
        let mut start = tail_start;
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
        format!("[previous content truncated]...{}", &text[start..])
    } else {
        text.to_string()
    }
}

/// Shared, thread-safe raw-byte inbox filled by the pty reader thread.
struct ReadBuffer {
    bytes: StdMutex<Vec<u8>>,
    alive: AtomicBool,
}

pub struct TerminalSession {
    pub name: String,
    workdir: PathBuf,
    writer: AsyncMutex<Box<dyn Write + Send>>,
    child: AsyncMutex<Box<dyn Child + Send>>,
    buffer: Arc<ReadBuffer>,
    history: AsyncMutex<VecDeque<HistoryEntry>>,
    running: AtomicBool,
    input_buffer: StdMutex<String>,
    prompt_cache: StdMutex<String>,
}

impl TerminalSession {
    pub async fn new(name: String, workdir: PathBuf) -> HostResult<Self> {
        let (writer, child, buffer) = spawn_shell(&workdir)?;
        let session = Self {
            name,
            workdir,
            writer: AsyncMutex::new(writer),
            child: AsyncMutex::new(child),
            buffer,
            history: AsyncMutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            input_buffer: StdMutex::new(String::new()),
            prompt_cache: StdMutex::new(String::new()),
        };
        session.await_first_prompt().await?;
        Ok(session)
    }

    async fn await_first_prompt(&self) -> HostResult<()> {
        let deadline = tokio::time::Instant::now() + PROMPT_TIMEOUT;
        loop {
            if !self.buffer.alive.load(Ordering::Relaxed) {
                return Err(HostError::Internal(
                    "shell exited during initialization".into(),
                ));
            }
            let snapshot = { self.buffer.bytes.lock().unwrap().clone() };
            let rendered = output::process(&snapshot);
            if let Some(m) = PROMPT_RE.find(&rendered) {
                self.prompt_cache
                    .lock()
                    .unwrap()
                    .push_str(&rendered[m.start()..m.end()]);
                self.buffer.bytes.lock().unwrap().clear();
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                return Err(HostError::Internal(
                    "timed out waiting for shell prompt".into(),
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn drain_buffer(&self) -> Vec<u8> {
        let mut locked = self.buffer.bytes.lock().unwrap();
        std::mem::take(&mut *locked)
    }

    /// Prepend any out-of-band characters queued by `send_line`/`send_key` so the
    /// next rendered update echoes them even if the foreground program doesn't.
    fn take_input_prefix(&self) -> String {
        let mut locked = self.input_buffer.lock().unwrap();
        std::mem::take(&mut *locked)
    }

    async fn write_raw(&self, bytes: &[u8]) -> HostResult<()> {
        let mut w = self.writer.lock().await;
        w.write_all(bytes)
            .map_err(|e| HostError::Internal(format!("pty write failed: {e}")))?;
        w.flush().ok();
        Ok(())
    }

    /// Execute a `run` command, streaming frames to `tx` until a terminating
    /// frame (`finish` or `error`) has been sent.
    pub async fn execute_command(
        &self,
        msg: &TerminalInputMessage,
        tx: mpsc::UnboundedSender<TerminalOutputMessage>,
    ) {
        if self.running.swap(true, Ordering::SeqCst) {
            let busy = HostError::Busy("a previous command is still running in this terminal".into());
            let _ = tx.send(msg.response(
                TerminalOutputMessageType::Error,
                busy.to_string(),
                vec![],
                TerminalStatus::Running,
                None,
            ));
            self.running.store(true, Ordering::SeqCst);
            return;
        }

        let raw_command = msg.command.clone().unwrap_or_default();
        let full_command = match &msg.exec_dir {
            Some(dir) => format!("cd {dir} && {raw_command}"),
            None => raw_command,
        };

        let statements = splitter::split_statements(&full_command);
        let last_idx = statements.len().saturating_sub(1);

        for (idx, statement) in statements.into_iter().enumerate() {
            let is_last = idx == last_idx;
            self.run_one_statement(msg, statement, idx as u32, is_last, &tx)
                .await;
            if !self.running.load(Ordering::SeqCst) {
                // Killed mid-stream or the shell died.
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    async fn run_one_statement(
        &self,
        msg: &TerminalInputMessage,
        statement: String,
        sub_index: u32,
        is_last: bool,
        tx: &mpsc::UnboundedSender<TerminalOutputMessage>,
    ) {
        let pre_prompt = self.prompt_cache.lock().unwrap().clone();
        let entry = HistoryEntry {
            command: statement.clone(),
            pre_prompt,
            after_prompt: String::new(),
            output: String::new(),
            finished: false,
            timestamp: Utc::now(),
        };
        self.push_history(entry).await;

        let prefix = self.take_input_prefix();
        let to_send = format!("{prefix}{statement}\n");
        if let Err(e) = self.write_raw(to_send.as_bytes()).await {
            self.finish_last_history(String::new(), true).await;
            let _ = tx.send(msg.response(
                TerminalOutputMessageType::Finish,
                e.to_string(),
                vec![],
                TerminalStatus::Idle,
                Some(sub_index),
            ));
            return;
        }

        let mut last_rendered = String::new();
        loop {
            if !self.buffer.alive.load(Ordering::Relaxed) {
                self.finish_last_history(String::new(), true).await;
                let _ = tx.send(msg.response(
                    TerminalOutputMessageType::Finish,
                    "shell exited",
                    vec![],
                    TerminalStatus::Idle,
                    Some(sub_index),
                ));
                self.running.store(false, Ordering::SeqCst);
                return;
            }

            let snapshot = { self.buffer.bytes.lock().unwrap().clone() };
            let rendered = output::process(&snapshot);

            if let Some(m) = PROMPT_RE.find(&rendered) {
                let command_output = rendered[..m.start()].to_string();
                let matched_prompt = rendered[m.start()..m.end()].to_string();
                *self.prompt_cache.lock().unwrap() = matched_prompt.clone();
                self.drain_buffer();

                self.set_last_history_output(command_output.clone()).await;
                self.finish_last_history(matched_prompt, true).await;

                let status = if is_last {
                    TerminalStatus::Idle
                } else {
                    TerminalStatus::Running
                };
                let kind = if is_last {
                    TerminalOutputMessageType::Finish
                } else {
                    TerminalOutputMessageType::PartialFinish
                };
                let _ = tx.send(msg.response(
                    kind,
                    "",
                    vec![command_output],
                    status,
                    Some(sub_index),
                ));
                return;
            }

            if rendered != last_rendered {
                last_rendered = rendered.clone();
                self.set_last_history_output(rendered.clone()).await;
                let _ = tx.send(msg.response(
                    TerminalOutputMessageType::Update,
                    "",
                    vec![rendered],
                    TerminalStatus::Running,
                    Some(sub_index),
                ));
            }

            if !self.running.load(Ordering::SeqCst) {
                // kill_process flipped this off while we were mid-read.
                self.finish_last_history(String::new(), true).await;
                let _ = tx.send(msg.response(
                    TerminalOutputMessageType::Finish,
                    "process killed",
                    vec![],
                    TerminalStatus::Idle,
                    Some(sub_index),
                ));
                return;
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    /// Out-of-band injection: characters land in the pty immediately and are
    /// echoed back to the caller on the next rendered update even if the
    /// foreground program doesn't echo them itself.
    pub async fn send_line(&self, text: &str) -> HostResult<()> {
        self.input_buffer.lock().unwrap().push_str(text);
        self.input_buffer.lock().unwrap().push('\n');
        self.write_raw(format!("{text}\n").as_bytes()).await
    }

    pub async fn send_key(&self, key: &str) -> HostResult<()> {
        let bytes = key_to_bytes(key);
        self.input_buffer
            .lock()
            .unwrap()
            .push_str(&String::from_utf8_lossy(&bytes));
        self.write_raw(&bytes).await
    }

    pub async fn send_control(&self, ctrl: &str) -> HostResult<()> {
        let bytes = control_to_bytes(ctrl);
        self.write_raw(&bytes).await
    }

    /// SIGTERM the shell, wait briefly, respawn in place, keep name/history.
    pub async fn kill_process(&self) -> HostResult<()> {
        {
            let mut child = self.child.lock().await;
            let _ = child.kill();
        }
        self.running.store(false, Ordering::SeqCst);
        sleep(Duration::from_millis(200)).await;
        self.reinit().await?;
        self.mark_unfinished_as_finished().await;
        Ok(())
    }

    /// Full reset: kill and reinitialize, preserving the session name. History
    /// is cleared (a fresh shell has a fresh scrollback contract with the
    /// caller).
    pub async fn reset(&self) -> HostResult<()> {
        {
            let mut child = self.child.lock().await;
            let _ = child.kill();
        }
        self.running.store(false, Ordering::SeqCst);
        self.reinit().await?;
        self.history.lock().await.clear();
        *self.prompt_cache.lock().unwrap() = String::new();
        self.await_first_prompt().await
    }

    async fn reinit(&self) -> HostResult<()> {
        let (writer, child, buffer) = spawn_shell(&self.workdir)?;
        *self.writer.lock().await = writer;
        *self.child.lock().await = child;
        // Re-point our buffer handle: since `buffer` is behind `Arc` on `self`
        // directly we can't swap the field, so we copy through the new
        // contents instead.
        let mut locked = self.buffer.bytes.lock().unwrap();
        locked.clear();
        self.buffer.alive.store(true, Ordering::Relaxed);
        drop(locked);
        // Spawn a forwarding task that feeds the freshly spawned reader's
        // output into the long-lived buffer this session exposes.
        forward_buffer(buffer, self.buffer.clone());
        Ok(())
    }

    async fn mark_unfinished_as_finished(&self) {
        let mut history = self.history.lock().await;
        for entry in history.iter_mut() {
            if !entry.finished {
                entry.finished = true;
                entry.after_prompt = self.prompt_cache.lock().unwrap().clone();
            }
        }
    }

    async fn push_history(&self, entry: HistoryEntry) {
        let mut history = self.history.lock().await;
        history.push_back(entry);
        while history.len() > HISTORY_CAP {
            history.pop_front();
        }
    }

    async fn set_last_history_output(&self, output: String) {
        let mut history = self.history.lock().await;
        if let Some(last) = history.back_mut() {
            last.output = output;
        }
    }

    async fn finish_last_history(&self, after_prompt: String, finished: bool) {
        let mut history = self.history.lock().await;
        if let Some(last) = history.back_mut() {
            last.finished = finished;
            last.after_prompt = after_prompt;
        }
    }

    /// `view`: full (capped) history plus the current prompt line, bounded by
    /// the aggregate 10000-char cap with oldest entries dropped first.
    pub async fn view_full(&self) -> Vec<String> {
        let history = self.history.lock().await;
        if history.is_empty() {
            return vec![self.prompt_cache.lock().unwrap().clone()];
        }

        let mut rendered: Vec<String> = history.iter().map(|e| e.rendered(true)).collect();
        let mut total: usize = rendered.iter().map(|s| s.len()).sum();
        while total > MAX_TOTAL_VIEW && rendered.len() > 1 {
            let dropped = rendered.remove(0);
            total -= dropped.len();
        }
        if total > MAX_TOTAL_VIEW {
            rendered[0] = "... earlier history truncated ...".to_string();
        } else if rendered.len() < history.len() {
            rendered.insert(0, "... earlier history truncated ...".to_string());
        }
        rendered
    }

    /// `view_last`: only the most recent entry.
    pub async fn view_last(&self) -> Vec<String> {
        let history = self.history.lock().await;
        match history.back() {
            Some(last) => vec![last.rendered(true)],
            None => vec![self.prompt_cache.lock().unwrap().clone()],
        }
    }
}

fn forward_buffer(source: Arc<ReadBuffer>, target: Arc<ReadBuffer>) {
    tokio::spawn(async move {
        loop {
            if !source.alive.load(Ordering::Relaxed) {
                target.alive.store(false, Ordering::Relaxed);
                return;
            }
            let chunk = {
                let mut locked = source.bytes.lock().unwrap();
                std::mem::take(&mut *locked)
            };
            if !chunk.is_empty() {
                target.bytes.lock().unwrap().extend_from_slice(&chunk);
            }
            sleep(POLL_INTERVAL).await;
        }
    });
}

type SpawnResult = (Box<dyn Write + Send>, Box<dyn Child + Send>, Arc<ReadBuffer>);

fn spawn_shell(workdir: &PathBuf) -> HostResult<SpawnResult> {
    let pty_system = NativePtySystem::default();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| HostError::Internal(format!("failed to open pty: {e}")))?;

    let mut cmd = CommandBuilder::new("bash");
    cmd.args(["--noprofile", "--norc", "-i"]);
    cmd.env("TERM", "xterm-256color");
    cmd.env("PS1", PS1);
    if workdir.exists() {
        cmd.cwd(workdir);
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| HostError::Internal(format!("failed to spawn shell: {e}")))?;
    drop(pair.slave);

    let writer = pair
        .master
        .take_writer()
        .map_err(|e| HostError::Internal(format!("failed to get pty writer: {e}")))?;
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| HostError::Internal(format!("failed to get pty reader: {e}")))?;

    let buffer = Arc::new(ReadBuffer {
        bytes: StdMutex::new(Vec::new()),
        alive: AtomicBool::new(true),
    });
    let buffer_clone = buffer.clone();

    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    buffer_clone.alive.store(false, Ordering::Relaxed);
                    break;
                }
                Ok(n) => {
                    buffer_clone.bytes.lock().unwrap().extend_from_slice(&buf[..n]);
                }
                Err(_) => {
                    buffer_clone.alive.store(false, Ordering::Relaxed);
                    break;
                }
            }
        }
    });

    Ok((writer, child, buffer))
}

fn key_to_bytes(key: &str) -> Vec<u8> {
    match key {
        "Enter" | "Return" => b"\r".to_vec(),
        "Tab" => b"\t".to_vec(),
        "Escape" | "Esc" => b"\x1b".to_vec(),
        "Up" | "ArrowUp" => b"\x1b[A".to_vec(),
        "Down" | "ArrowDown" => b"\x1b[B".to_vec(),
        "Right" | "ArrowRight" => b"\x1b[C".to_vec(),
        "Left" | "ArrowLeft" => b"\x1b[D".to_vec(),
        "Backspace" => b"\x7f".to_vec(),
        other => other.as_bytes().to_vec(),
    }
}

fn control_to_bytes(ctrl: &str) -> Vec<u8> {
    // "c" -> Ctrl-C (0x03), letters map to their 1-based position in the
    // control-character block.
    let letter = ctrl.trim_start_matches(['C', 'c', '-', '^']).to_ascii_lowercase();
    if let Some(c) = letter.chars().next() {
        if c.is_ascii_alphabetic() {
            let code = (c as u8 - b'a' + 1) & 0x1f;
            return vec![code];
        }
    }
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_tail() {
        let long = "a".repeat(6000);
        let out = truncate_from_back(&long, 100);
        assert!(out.starts_with("[previous content truncated]..."));
        assert_eq!(out.len(), "[previous content truncated]...".len() + 100);
    }

    #[test]
    fn control_c_maps_to_0x03() {
        assert_eq!(control_to_bytes("c"), vec![0x03]);
        assert_eq!(control_to_bytes("C-c"), vec![0x03]);
        assert_eq!(control_to_bytes("^C"), vec![0x03]);
    }

    #[tokio::test]
    async fn spawns_shell_and_echoes_command() {
        let dir = std::env::temp_dir();
        let session = TerminalSession::new("t1".into(), dir).await;
        assert!(session.is_ok());
    }
}
