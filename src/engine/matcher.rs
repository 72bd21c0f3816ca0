//! Matchers locate the insertion anchor for a rule.
//!
//! Two kinds exist: a structured-block matcher that finds a delimited
//! parameter/field list after a keyword + identifier prefix, and a line-anchor
//! matcher that finds a whole line matching a pattern. Both scan in file
//! order and stop at the first acceptable candidate.

use crate::engine::rule::RuleError;
use crate::engine::scanner::{closing_bracket, find_block_end};
use regex::Regex;

/// A compiled matcher.
#[derive(Debug, Clone)]
pub enum Matcher {
    Block(BlockMatcher),
    Line(LineAnchor),
}

/// Location of a match inside the scanned text (byte offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSpan {
    Block(BlockSpan),
    Line(LineSpan),
}

impl Matcher {
    /// Structured-block matcher.
    ///
    /// `prefix` must match the text right before the opening bracket (leading
    /// whitespace between the two is skipped). `suffix`, when given, must
    /// match immediately after the balancing closing bracket.
    pub fn block(prefix: &str, open: char, suffix: Option<&str>) -> Result<Self, RuleError> {
        Ok(Matcher::Block(BlockMatcher::new(prefix, open, suffix)?))
    }

    /// Line-anchor matcher picking the first matching line.
    pub fn first_line(pattern: &str) -> Result<Self, RuleError> {
        Ok(Matcher::Line(LineAnchor::new(pattern, LinePick::First)?))
    }

    /// Line-anchor matcher picking the last matching line.
    pub fn last_line(pattern: &str) -> Result<Self, RuleError> {
        Ok(Matcher::Line(LineAnchor::new(pattern, LinePick::Last)?))
    }

    pub fn find(&self, text: &str) -> Option<MatchSpan> {
        match self {
            Matcher::Block(m) => m.find(text).map(MatchSpan::Block),
            Matcher::Line(m) => m.find(text).map(MatchSpan::Line),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Matcher::Block(_) => "block",
            Matcher::Line(_) => "line",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockMatcher {
    prefix: Regex,
    open: u8,
    suffix: Option<Regex>,
}

/// Offsets of a structured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Start of the prefix match
    pub start: usize,
    /// Offset of the opening bracket
    pub open: usize,
    /// Offset of the balancing closing bracket
    pub close: usize,
    /// End of the suffix match (or one past `close` without a suffix)
    pub end: usize,
}

impl BlockSpan {
    /// Text between the brackets, exclusive.
    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open + 1..self.close]
    }
}

impl BlockMatcher {
    pub fn new(prefix: &str, open: char, suffix: Option<&str>) -> Result<Self, RuleError> {
        let open_byte = u8::try_from(open)
            .ok()
            .filter(|b| closing_bracket(*b).is_some())
            .ok_or(RuleError::UnsupportedBracket(open))?;

        let prefix = compile(prefix)?;
        // `^` without multi-line mode anchors at the start of the haystack,
        // which is the byte right after the closing bracket.
        let suffix = suffix
            .map(|s| {
                Regex::new(&format!("^(?:{s})")).map_err(|source| RuleError::InvalidPattern {
                    pattern: s.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            prefix,
            open: open_byte,
            suffix,
        })
    }

    /// Leftmost block whose prefix, balanced body and suffix all match.
    pub fn find(&self, text: &str) -> Option<BlockSpan> {
        let bytes = text.as_bytes();

        for m in self.prefix.find_iter(text) {
            let mut open = m.end();
            while open < bytes.len() && bytes[open].is_ascii_whitespace() {
                open += 1;
            }
            if bytes.get(open) != Some(&self.open) {
                continue;
            }

            let Some(close) = find_block_end(text, open) else {
                continue;
            };

            let end = match &self.suffix {
                Some(suffix) => match suffix.find(&text[close + 1..]) {
                    Some(s) => close + 1 + s.end(),
                    None => continue,
                },
                None => close + 1,
            };

            return Some(BlockSpan {
                start: m.start(),
                open,
                close,
                end,
            });
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePick {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct LineAnchor {
    pattern: Regex,
    pick: LinePick,
}

/// Offsets of an anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    /// First byte of the line
    pub start: usize,
    /// One past the line terminator, or the end of text on a final line
    pub end: usize,
    /// Whether the line is terminated by `\n`
    pub terminated: bool,
}

impl LineAnchor {
    /// Patterns are compiled in multi-line mode so `^` and `$` bind to lines.
    pub fn new(pattern: &str, pick: LinePick) -> Result<Self, RuleError> {
        let pattern = Regex::new(&format!("(?m){pattern}")).map_err(|source| {
            RuleError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self { pattern, pick })
    }

    pub fn find(&self, text: &str) -> Option<LineSpan> {
        let m = match self.pick {
            LinePick::First => self.pattern.find(text)?,
            LinePick::Last => self.pattern.find_iter(text).last()?,
        };

        let start = text[..m.start()].rfind('\n').map_or(0, |i| i + 1);
        let (end, terminated) = match text[m.end()..].find('\n') {
            Some(i) => (m.end() + i + 1, true),
            None => (text.len(), false),
        };

        Some(LineSpan {
            start,
            end,
            terminated,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
