//! Command splitting (§4.1.2).
//!
//! Splits a user-supplied multi-line command into the sequence of top-level shell
//! statements it represents, so each can be streamed and prompt-matched
//! independently. Splits on top-level newlines; `&&`, `||`, `|`, quoted strings,
//! and heredocs keep their statement intact. Best-effort: anything the scanner
//! can't make sense of falls back to a plain newline split.

#[derive(Debug, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split `input` into top-level shell statements.
pub fn split_statements(input: &str) -> Vec<String> {
    if input.is_empty() {
        return vec![String::new()];
    }

    match try_split(input) {
        Some(statements) if !statements.is_empty() => statements,
        _ => input.lines().map(|l| l.to_string()).collect(),
    }
}

fn try_split(input: &str) -> Option<Vec<String>> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut heredoc_delim: Option<String> = None;
    let mut paren_depth: i32 = 0;

    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if let Some(delim) = &heredoc_delim {
            // Consume through to a line that is exactly the delimiter.
            let line_start = i;
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            let line: String = chars[line_start..i].iter().collect();
            current.push_str(&line);
            if line.trim() == *delim {
                heredoc_delim = None;
            }
            if i < chars.len() {
                current.push('\n');
                i += 1;
            }
            continue;
        }

        match quote {
            Quote::Single => {
                current.push(c);
                if c == '\'' {
                    quote = Quote::None;
                }
                i += 1;
                continue;
            }
            Quote::Double => {
                current.push(c);
                if c == '\\' && i + 1 < chars.len() {
                    i += 1;
                    current.push(chars[i]);
                } else if c == '"' {
                    quote = Quote::None;
                }
                i += 1;
                continue;
            }
            Quote::None => {}
        }

        match c {
            '\'' => {
                quote = Quote::Single;
                current.push(c);
                i += 1;
            }
            '"' => {
                quote = Quote::Double;
                current.push(c);
                i += 1;
            }
            '(' | '{' => {
                paren_depth += 1;
                current.push(c);
                i += 1;
            }
            ')' | '}' => {
                paren_depth -= 1;
                current.push(c);
                i += 1;
            }
            '\\' if i + 1 < chars.len() && chars[i + 1] == '\n' => {
                // Line continuation: keep it part of the same statement, drop
                // the backslash-newline so downstream consumers see one logical
                // line.
                i += 2;
            }
            '<' if paren_depth == 0
                && i + 1 < chars.len()
                && chars[i + 1] == '<'
                && !matches!(chars.get(i + 2), Some('<')) =>
            {
                // Heredoc start: << or <<-, optionally quoted delimiter.
                current.push_str("<<");
                i += 2;
                if chars.get(i) == Some(&'-') {
                    current.push('-');
                    i += 1;
                }
                while i < chars.len() && chars[i] == ' ' {
                    current.push(' ');
                    i += 1;
                }
                let mut delim = String::new();
                let quoted = matches!(chars.get(i), Some('\'') | Some('"'));
                let quote_char = chars.get(i).copied();
                if quoted {
                    current.push(quote_char.unwrap());
                    i += 1;
                }
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && Some(chars[i]) != quote_char.filter(|_| quoted)
                {
                    delim.push(chars[i]);
                    current.push(chars[i]);
                    i += 1;
                }
                if quoted && i < chars.len() {
                    current.push(chars[i]);
                    i += 1;
                }
                heredoc_delim = Some(delim);
            }
            '\n' if paren_depth == 0 => {
                statements.push(std::mem::take(&mut current));
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }

    if quote != Quote::None || heredoc_delim.is_some() || paren_depth != 0 {
        // Unterminated construct: best-effort parse failed, let the caller fall
        // back to a plain newline split.
        return None;
    }

    statements.push(current);
    Some(
        statements
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_single_empty_statement() {
        assert_eq!(split_statements(""), vec!["".to_string()]);
    }

    #[test]
    fn splits_on_top_level_newline() {
        let stmts = split_statements("ls -l\necho hi");
        assert_eq!(stmts, vec!["ls -l".to_string(), "echo hi".to_string()]);
    }

    #[test]
    fn keeps_and_and_together() {
        let stmts = split_statements("echo a && echo b");
        assert_eq!(stmts, vec!["echo a && echo b".to_string()]);
    }

    #[test]
    fn keeps_pipe_together() {
        let stmts = split_statements("cat file | grep foo");
        assert_eq!(stmts, vec!["cat file | grep foo".to_string()]);
    }

    #[test]
    fn keeps_quoted_newline_inside_statement() {
        let stmts = split_statements("echo \"line1\nline2\"");
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("line1\nline2"));
    }

    #[test]
    fn keeps_heredoc_together() {
        let input = "cat <<EOF\nhello\nworld\nEOF\necho done";
        let stmts = split_statements(input);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("hello"));
        assert!(stmts[0].contains("EOF"));
        assert_eq!(stmts[1], "echo done");
    }

    #[test]
    fn falls_back_on_unterminated_quote() {
        let stmts = split_statements("echo \"unterminated\nnext line");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn keeps_subshell_group_together() {
        let stmts = split_statements("(echo a\necho b)");
        assert_eq!(stmts.len(), 1);
    }
}
