//! Wire types for `POST /browser/action` (§3, §4.2).
//!
//! The source's `BrowserAction` is an optional-field bag (one field per verb,
//! all `Option`); per the Design Note on dynamic typing, this becomes a
//! discriminated union with one variant — and one schema — per verb.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserAction {
    Navigate {
        url: String,
    },
    Click {
        #[serde(default)]
        index: Option<u32>,
        #[serde(default)]
        coordinate_x: Option<f64>,
        #[serde(default)]
        coordinate_y: Option<f64>,
    },
    Input {
        #[serde(default)]
        index: Option<u32>,
        #[serde(default)]
        coordinate_x: Option<f64>,
        #[serde(default)]
        coordinate_y: Option<f64>,
        text: String,
        #[serde(default)]
        press_enter: bool,
    },
    PressKey {
        key: String,
    },
    SelectOption {
        index: u32,
        option: u32,
    },
    ScrollUp {
        #[serde(default)]
        to_top: bool,
    },
    ScrollDown {
        #[serde(default)]
        to_bottom: bool,
    },
    MoveMouse {
        coordinate_x: f64,
        coordinate_y: f64,
    },
    View {
        #[serde(default)]
        reload: bool,
    },
    Screenshot {
        file: String,
        #[serde(default)]
        reload: bool,
    },
    ConsoleExec {
        javascript: String,
    },
    ConsoleView {
        #[serde(default)]
        max_lines: Option<u32>,
    },
    Restart {
        #[serde(default)]
        url: Option<String>,
    },
}

impl BrowserAction {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Input { .. } => "input",
            BrowserAction::PressKey { .. } => "press_key",
            BrowserAction::SelectOption { .. } => "select_option",
            BrowserAction::ScrollUp { .. } => "scroll_up",
            BrowserAction::ScrollDown { .. } => "scroll_down",
            BrowserAction::MoveMouse { .. } => "move_mouse",
            BrowserAction::View { .. } => "view",
            BrowserAction::Screenshot { .. } => "screenshot",
            BrowserAction::ConsoleExec { .. } => "console_exec",
            BrowserAction::ConsoleView { .. } => "console_view",
            BrowserAction::Restart { .. } => "restart",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserActionRequest {
    #[serde(flatten)]
    pub action: BrowserAction,
    /// Opaque upload handle for the element-annotated screenshot.
    #[serde(default)]
    pub screenshot_presigned_url: Option<String>,
    /// Opaque upload handle for the unannotated screenshot.
    #[serde(default)]
    pub clean_screenshot_presigned_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserActionResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub screenshot_uploaded: bool,
    pub clean_screenshot_uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixels_above: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixels_below: Option<i64>,
}

impl Default for BrowserActionResult {
    fn default() -> Self {
        Self {
            status: "success",
            url: None,
            title: None,
            result: None,
            error: None,
            screenshot_uploaded: false,
            clean_screenshot_uploaded: false,
            clean_screenshot_path: None,
            elements: None,
            markdown: None,
            pixels_above: None,
            pixels_below: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserStatus {
    Started,
    Initializing,
    Ready,
}

#[derive(Debug, Serialize)]
pub struct BrowserStatusResponse {
    pub healthy: bool,
    pub tabs: u32,
}
