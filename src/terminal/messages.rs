//! Wire types for the terminal WebSocket (§3, §6).
//!
//! Field names follow `examples/original_source/app/types/messages.py` so that an
//! agent client written against the original service needs no translation layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalInputMessageType {
    Command,
    View,
    ViewLast,
    KillProcess,
    Reset,
    ResetAll,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    Run,
    SendLine,
    SendKey,
    SendControl,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutputMessageType {
    Update,
    PartialFinish,
    Finish,
    ActionFinish,
    History,
    Error,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Idle,
    Running,
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalInputMessage {
    #[serde(rename = "type")]
    pub kind: TerminalInputMessageType,
    pub terminal: String,
    pub action_id: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub mode: Option<CommandMode>,
    #[serde(default)]
    pub exec_dir: Option<String>,
}

impl TerminalInputMessage {
    pub fn response(
        &self,
        kind: TerminalOutputMessageType,
        result: impl Into<String>,
        output: Vec<String>,
        terminal_status: TerminalStatus,
        sub_command_index: Option<u32>,
    ) -> TerminalOutputMessage {
        TerminalOutputMessage {
            kind,
            terminal: self.terminal.clone(),
            action_id: self.action_id.clone(),
            result: Some(result.into()),
            output,
            terminal_status,
            sub_command_index,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalOutputMessage {
    #[serde(rename = "type")]
    pub kind: TerminalOutputMessageType,
    pub terminal: String,
    pub action_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub output: Vec<String>,
    pub terminal_status: TerminalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_command_index: Option<u32>,
}

impl TerminalOutputMessage {
    pub fn protocol_error(action_id: &str, terminal: &str, message: impl Into<String>) -> Self {
        Self {
            kind: TerminalOutputMessageType::Error,
            terminal: terminal.to_string(),
            action_id: action_id.to_string(),
            result: Some(message.into()),
            output: vec![],
            terminal_status: TerminalStatus::Unknown,
            sub_command_index: None,
        }
    }
}
