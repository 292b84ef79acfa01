//! Filesystem text editor (§4.3): a small, strict view/edit interface with
//! path validation and bounded outputs.
//!
//! Grounded on `examples/yotaro-shimose-coder-mcp/src/tools/file_tools.rs` for
//! the general shape (per-path error strings, cat-style numbered snippets)
//! but diverges from it in a few places the teacher gets wrong for this spec:
//! `str_replace` here replaces every occurrence (the teacher errors on more
//! than one), the line-number gutter is 8 characters wide, matching
//! `examples/original_source/app/tools/text_editor.py`'s `line_width = 8`
//! rather than the teacher's 6, and there is no undo stack — §4.3 specifies
//! the editor as stateless, so unlike the teacher's `history` field each
//! write simply reports the previous content in `old_content` and moves on.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

const GUTTER_WIDTH: usize = 8;
const MAX_RESPONSE_LEN: usize = 16_000;
const TRUNCATED_NOTICE: &str = "\n... [response clipped]";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextEditorCommand {
    ViewDir,
    View,
    Create,
    Write,
    StrReplace,
    FindContent,
    FindFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextEditorAction {
    pub command: TextEditorCommand,
    pub path: String,
    #[serde(default)]
    pub sudo: Option<bool>,
    #[serde(default)]
    pub file_text: Option<String>,
    #[serde(default)]
    pub view_range: Option<[i64; 2]>,
    #[serde(default)]
    pub old_str: Option<String>,
    #[serde(default)]
    pub new_str: Option<String>,
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub append: Option<bool>,
    #[serde(default)]
    pub trailing_newline: Option<bool>,
    #[serde(default)]
    pub leading_newline: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextEditorActionResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
}

impl TextEditorActionResult {
    fn ok(result: impl Into<String>, file_info: Option<FileInfo>) -> Self {
        Self {
            status: "success",
            error: None,
            result: result.into(),
            file_info,
        }
    }
}

pub struct TextEditor {
    workspace_dir: PathBuf,
}

impl TextEditor {
    pub fn new(workspace_dir: PathBuf) -> Self {
        Self { workspace_dir }
    }

    /// Resolves `path` relative to the workspace unless it is already
    /// absolute (the original service treats any absolute path as inside the
    /// single-tenant sandbox; there is no chroot to escape here).
    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace_dir.join(p)
        }
    }

    pub async fn run(&self, action: TextEditorAction) -> TextEditorActionResult {
        match self.dispatch(&action).await {
            Ok(result) => result,
            Err(e) => TextEditorActionResult {
                status: "error",
                error: Some(e.to_string()),
                result: String::new(),
                file_info: None,
            },
        }
    }

    async fn dispatch(&self, action: &TextEditorAction) -> HostResult<TextEditorActionResult> {
        let path = self.resolve(&action.path);
        self.validate_path(&path, action.command)?;

        match action.command {
            TextEditorCommand::ViewDir => self.view_dir(&path),
            TextEditorCommand::View => self.view(&path, action.view_range),
            TextEditorCommand::Create => self.create(&path, action.file_text.as_deref().unwrap_or("")),
            TextEditorCommand::Write => self.write(&path, action).await,
            TextEditorCommand::StrReplace => self.str_replace(&path, action).await,
            TextEditorCommand::FindContent => self.find_content(&path, action.regex.as_deref()),
            TextEditorCommand::FindFile => self.find_file(&path, action.glob.as_deref()),
        }
    }

    fn validate_path(&self, path: &Path, command: TextEditorCommand) -> HostResult<()> {
        let allows_missing = matches!(command, TextEditorCommand::Create | TextEditorCommand::Write);
        if !path.exists() {
            if allows_missing {
                return Ok(());
            }
            return Err(HostError::NotFound(format!(
                "the path {} does not exist",
                path.display()
            )));
        }

        let requires_dir = matches!(command, TextEditorCommand::ViewDir | TextEditorCommand::FindFile);
        if requires_dir && !path.is_dir() {
            return Err(HostError::Validation(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        if !requires_dir && command != TextEditorCommand::Create && path.is_dir() {
            return Err(HostError::Validation(format!(
                "{} is a directory",
                path.display()
            )));
        }
        Ok(())
    }

    fn view_dir(&self, path: &Path) -> HostResult<TextEditorActionResult> {
        let mut entries: Vec<String> = std::fs::read_dir(path)?
            .flatten()
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let is_dir = e.path().is_dir();
                let meta = e.metadata().ok();
                let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
                if is_dir {
                    format!("{name}/")
                } else {
                    format!("{name}\t{size}")
                }
            })
            .collect();
        entries.sort();
        Ok(TextEditorActionResult::ok(
            truncate(&entries.join("\n")),
            None,
        ))
    }

    fn view(&self, path: &Path, view_range: Option<[i64; 2]>) -> HostResult<TextEditorActionResult> {
        let content = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let num_lines = lines.len();

        let (start, end) = match view_range {
            Some([s, e]) => {
                let s = s.max(1) as usize;
                let e = if e < 0 { num_lines } else { (e as usize).min(num_lines) };
                if s > num_lines {
                    return Err(HostError::Validation(format!(
                        "start_line {s} is out of range [1, {num_lines}]"
                    )));
                }
                (s, e.max(s))
            }
            None => (1, num_lines),
        };

        let snippet = lines
            .iter()
            .skip(start - 1)
            .take(end.saturating_sub(start) + 1)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        Ok(TextEditorActionResult::ok(
            truncate(&numbered_output(&snippet, start)),
            Some(FileInfo {
                path: path.to_string_lossy().into_owned(),
                content,
                old_content: None,
            }),
        ))
    }

    fn create(&self, path: &Path, text: &str) -> HostResult<TextEditorActionResult> {
        if path.exists() {
            let existing = std::fs::read_to_string(path).unwrap_or_default();
            if !existing.is_empty() {
                return Err(HostError::Validation(format!(
                    "{} already exists and is not empty",
                    path.display()
                )));
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(TextEditorActionResult::ok(
            format!("file created at {}", path.display()),
            Some(FileInfo {
                path: path.to_string_lossy().into_owned(),
                content: text.to_string(),
                old_content: None,
            }),
        ))
    }

    async fn write(&self, path: &Path, action: &TextEditorAction) -> HostResult<TextEditorActionResult> {
        let text = action.file_text.clone().unwrap_or_default();
        let append = action.append.unwrap_or(false);
        let old_content = if path.exists() {
            Some(std::fs::read_to_string(path)?)
        } else {
            None
        };

        let mut body = text;
        if action.leading_newline.unwrap_or(false) && !body.starts_with('\n') {
            body.insert(0, '\n');
        }
        if action.trailing_newline.unwrap_or(false) && !body.ends_with('\n') {
            body.push('\n');
        }

        let new_content = if append {
            format!("{}{}", old_content.clone().unwrap_or_default(), body)
        } else {
            body
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &new_content)?;

        Ok(TextEditorActionResult::ok(
            format!("wrote {} bytes to {}", new_content.len(), path.display()),
            Some(FileInfo {
                path: path.to_string_lossy().into_owned(),
                content: new_content,
                old_content,
            }),
        ))
    }

    async fn str_replace(&self, path: &Path, action: &TextEditorAction) -> HostResult<TextEditorActionResult> {
        let old_str = action
            .old_str
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HostError::Validation("old_str must not be empty".into()))?;
        let new_str = action.new_str.as_deref().unwrap_or("");

        let content = std::fs::read_to_string(path)?;
        let count = content.matches(old_str).count();
        if count == 0 {
            return Ok(TextEditorActionResult::ok(
                format!("warning: old_str `{old_str}` was not found in {}; no changes made", path.display()),
                Some(FileInfo {
                    path: path.to_string_lossy().into_owned(),
                    content: content.clone(),
                    old_content: Some(content),
                }),
            ));
        }

        let new_content = content.replace(old_str, new_str);
        std::fs::write(path, &new_content)?;

        Ok(TextEditorActionResult::ok(
            format!(
                "replaced {count} occurrence{} of old_str in {}",
                if count == 1 { "" } else { "s" },
                path.display()
            ),
            Some(FileInfo {
                path: path.to_string_lossy().into_owned(),
                content: new_content,
                old_content: Some(content),
            }),
        ))
    }

    fn find_content(&self, path: &Path, pattern: Option<&str>) -> HostResult<TextEditorActionResult> {
        let pattern = pattern.ok_or_else(|| HostError::Validation("regex is required".into()))?;
        let re = Regex::new(pattern).map_err(|e| HostError::Validation(format!("invalid regex: {e}")))?;
        let content = std::fs::read_to_string(path)?;
        let matches: Vec<String> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| re.is_match(line))
            .map(|(i, line)| format!("Line {}: {}", i + 1, line))
            .collect();
        Ok(TextEditorActionResult::ok(truncate(&matches.join("\n")), None))
    }

    fn find_file(&self, path: &Path, pattern: Option<&str>) -> HostResult<TextEditorActionResult> {
        let pattern = pattern.unwrap_or("*");
        let full_pattern = path.join(pattern);
        let mut matches: Vec<String> = glob::glob(&full_pattern.to_string_lossy())
            .map_err(|e| HostError::Validation(format!("invalid glob: {e}")))?
            .flatten()
            .filter(|p| p.is_file())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        matches.sort();
        Ok(TextEditorActionResult::ok(truncate(&matches.join("\n")), None))
    }
}

fn numbered_output(content: &str, start_line: usize) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}\t{}", i + start_line, line, width = GUTTER_WIDTH))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_RESPONSE_LEN {
        return text.to_string();
    }
    let budget = MAX_RESPONSE_LEN - TRUNCATED_NOTICE.len();
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATED_NOTICE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> (TextEditor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (TextEditor::new(dir.path().to_path_buf()), dir)
    }

    #[tokio::test]
    async fn create_then_view_roundtrips_content() {
        let (ed, _dir) = editor();
        let create = TextEditorAction {
            command: TextEditorCommand::Create,
            path: "hello.txt".into(),
            sudo: None,
            file_text: Some("line one\nline two".into()),
            view_range: None,
            old_str: None,
            new_str: None,
            glob: None,
            regex: None,
            append: None,
            trailing_newline: None,
            leading_newline: None,
        };
        let result = ed.run(create).await;
        assert_eq!(result.status, "success");

        let view = TextEditorAction {
            command: TextEditorCommand::View,
            ..action_for("hello.txt")
        };
        let result = ed.run(view).await;
        assert!(result.result.contains("line one"));
        assert!(result.result.starts_with("       1\t"));
    }

    #[tokio::test]
    async fn create_refuses_to_overwrite_nonempty_file() {
        let (ed, dir) = editor();
        std::fs::write(dir.path().join("exists.txt"), "not empty").unwrap();
        let create = TextEditorAction {
            command: TextEditorCommand::Create,
            file_text: Some("new".into()),
            ..action_for("exists.txt")
        };
        let result = ed.run(create).await;
        assert_eq!(result.status, "error");
    }

    #[tokio::test]
    async fn str_replace_replaces_every_occurrence_and_counts_them() {
        let (ed, dir) = editor();
        std::fs::write(dir.path().join("f.txt"), "foo bar foo baz foo").unwrap();
        let replace = TextEditorAction {
            command: TextEditorCommand::StrReplace,
            old_str: Some("foo".into()),
            new_str: Some("qux".into()),
            ..action_for("f.txt")
        };
        let result = ed.run(replace).await;
        assert_eq!(result.status, "success");
        assert!(result.result.contains("replaced 3 occurrences"));
        assert_eq!(
            result.file_info.unwrap().content,
            "qux bar qux baz qux"
        );
    }

    #[tokio::test]
    async fn str_replace_on_missing_old_str_is_a_warning_not_an_error() {
        let (ed, dir) = editor();
        std::fs::write(dir.path().join("f.txt"), "nothing to see here").unwrap();
        let replace = TextEditorAction {
            command: TextEditorCommand::StrReplace,
            old_str: Some("absent".into()),
            new_str: Some("x".into()),
            ..action_for("f.txt")
        };
        let result = ed.run(replace).await;
        assert_eq!(result.status, "success");
        assert!(result.result.starts_with("warning:"));
    }

    #[tokio::test]
    async fn find_content_returns_matching_lines_with_numbers() {
        let (ed, dir) = editor();
        std::fs::write(dir.path().join("f.txt"), "alpha\nbeta\nalpha again").unwrap();
        let find = TextEditorAction {
            command: TextEditorCommand::FindContent,
            regex: Some("alpha".into()),
            ..action_for("f.txt")
        };
        let result = ed.run(find).await;
        assert!(result.result.contains("Line 1: alpha"));
        assert!(result.result.contains("Line 3: alpha again"));
    }

    fn action_for(path: &str) -> TextEditorAction {
        TextEditorAction {
            command: TextEditorCommand::View,
            path: path.to_string(),
            sudo: None,
            file_text: None,
            view_range: None,
            old_str: None,
            new_str: None,
            glob: None,
            regex: None,
            append: None,
            trailing_newline: None,
            leading_newline: None,
        }
    }
}
