//! Terminal output processor (§4.1.1).
//!
//! Pure byte-string-in, rendered-string-out transform. It does not emulate a
//! terminal: it collapses carriage-return line rewrites (progress bars, spinners)
//! and removes the narrow class of cursor-column moves (`ESC[<n>G`) within a line,
//! while leaving SGR/color escapes untouched so they reach the caller verbatim.

use regex::Regex;
use std::sync::LazyLock;

/// Matches `ESC[<n>G` (cursor absolute horizontal position) sequences.
static CURSOR_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[(\d*)G").unwrap());

/// Matches any SGR (`ESC[...m`) sequence, used to track "live" color state across
/// `\r`-delimited segments within one line.
static SGR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// Render raw pty bytes into display text.
///
/// `process(process(s)) == process(s)` for any `s` that is itself the output of
/// `process` (idempotence is exercised in the tests below): once `\r` rewrites are
/// collapsed and only the live SGR state is carried forward, re-running the
/// processor over its own output is a no-op because there are no more `\r`s left
/// to collapse and no color state has been dropped.
pub fn process(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = split_lines(&text);
    let rendered: Vec<String> = lines.iter().map(|l| process_line(l)).collect();
    rendered.join("\n")
}

/// Split on `\n` without producing a trailing synthetic empty line when the input
/// does not end in one, and without losing embedded `\r` (handled per-line).
fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

fn process_line(line: &str) -> String {
    let mut line = remove_cursor_column_moves(line);
    if !line.contains('\r') {
        return line;
    }

    // Split on \r: each segment overwrites the previous one in place. We keep
    // only the final segment's text, but prepend whatever SGR sequence was still
    // "live" (set but not reset) at the point an earlier segment ended, so color
    // state started before a redraw is not lost at the redraw boundary.
    let segments: Vec<&str> = line.split('\r').collect();
    let mut live_sgr = String::new();
    for seg in &segments[..segments.len() - 1] {
        update_live_sgr(&mut live_sgr, seg);
    }

    let last = segments.last().copied().unwrap_or("");
    line = format!("{live_sgr}{last}");
    line
}

fn update_live_sgr(live: &mut String, segment: &str) {
    for m in SGR_RE.find_iter(segment) {
        let code = m.as_str();
        if code == "\x1b[0m" || code == "\x1b[m" {
            live.clear();
        } else {
            live.push_str(code);
        }
    }
}

fn remove_cursor_column_moves(line: &str) -> String {
    if !CURSOR_COLUMN_RE.is_match(line) {
        return line.to_string();
    }

    // A cursor-column move repositions the write head to column n (1-based) and
    // everything written after it overwrites from there. As a simplification
    // (explicitly sanctioned — full emulation is out of scope) we treat the move
    // as "drop everything emitted so far on this line from column n onward" and
    // let subsequent writes replace the tail.
    let mut result = String::new();
    let mut last_end = 0;
    for m in CURSOR_COLUMN_RE.find_iter(line) {
        let col: usize = m.as_str()[2..m.as_str().len() - 1]
            .parse()
            .unwrap_or(1);
        let before = &line[last_end..m.start()];
        result.push_str(before);
        let target_len = col.saturating_sub(1);
        if result.chars().count() > target_len {
            result = result.chars().take(target_len).collect();
        }
        last_end = m.end();
    }
    result.push_str(&line[last_end..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_plain_text() {
        assert_eq!(process(b"hello\nworld"), "hello\nworld");
    }

    #[test]
    fn collapses_carriage_return_rewrite() {
        let raw = b"progress 10%\rprogress 100%";
        assert_eq!(process(raw), "progress 100%");
    }

    #[test]
    fn preserves_color_sequences() {
        let raw = b"\x1b[32mgreen\x1b[0m";
        let out = process(raw);
        assert!(out.contains("\x1b[32m"));
        assert!(out.contains("green"));
    }

    #[test]
    fn carries_live_sgr_across_carriage_return() {
        let raw = b"\x1b[31mred-partial\rfinal text";
        let out = process(raw);
        // color set before the \r was never reset, so it should prefix the final segment
        assert!(out.starts_with("\x1b[31m"));
        assert!(out.ends_with("final text"));
    }

    #[test]
    fn no_trailing_synthetic_newline() {
        let raw = b"a\nb\nc";
        let out = process(raw);
        assert!(!out.ends_with('\n'));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn is_idempotent() {
        let raw = b"\x1b[32mspin\r\x1b[32mspin.\r\x1b[32mspin..\x1b[0m\ndone";
        let once = process(raw);
        let twice = process(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn idempotent_on_arbitrary_plain_output() {
        let raw = b"line one\nline two with \x1b[1mbold\x1b[0m text\nline three";
        let once = process(raw);
        let twice = process(once.as_bytes());
        assert_eq!(once, twice);
    }
}
