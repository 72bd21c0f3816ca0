//! Bracket-depth scanner for locating the end of a delimited block.
//!
//! A regex such as `\{([^}]*?)\}` stops at the first closing brace, which
//! truncates blocks whose default values contain their own braces
//! (`{Map x = const {},}`). The scanner below keeps a stack of expected
//! closers instead, so the block ends at the bracket that balances the opener.
//!
//! Brackets inside string literals and comments are ignored. Scanning works on
//! bytes: every delimiter is ASCII and UTF-8 continuation bytes never collide
//! with ASCII, so multi-byte text passes through untouched.

/// Return the closing bracket paired with `open`, if `open` is a bracket.
pub fn closing_bracket(open: u8) -> Option<u8> {
    match open {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        _ => None,
    }
}

/// Find the byte offset of the bracket that balances the opener at `open_at`.
///
/// Returns `None` when `open_at` is not an opening bracket, when a closer of
/// the wrong kind is found first, or when the text ends before the block is
/// balanced.
pub fn find_block_end(text: &str, open_at: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let first = closing_bracket(*bytes.get(open_at)?)?;

    let mut expected: Vec<u8> = vec![first];
    let mut i = open_at + 1;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_line_comment(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => {
                // closing_bracket cannot fail for these three
                if let Some(close) = closing_bracket(b) {
                    expected.push(close);
                }
            }
            b')' | b']' | b'}' => {
                if expected.last() != Some(&b) {
                    return None;
                }
                expected.pop();
                if expected.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Skip a quoted literal starting at `start`; returns the offset after it.
///
/// Handles triple-quoted literals (which may span lines) and backslash
/// escapes. Single-quoted literals stop at a newline so an unbalanced
/// apostrophe cannot swallow the rest of the file.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let triple = bytes.get(start + 1) == Some(&quote) && bytes.get(start + 2) == Some(&quote);

    if triple {
        let mut i = start + 3;
        while i < bytes.len() {
            if bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            if bytes[i] == quote
                && bytes.get(i + 1) == Some(&quote)
                && bytes.get(i + 2) == Some(&quote)
            {
                return i + 3;
            }
            i += 1;
        }
        return bytes.len();
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}
