//! Line parser for text/gemini documents.
//!
//! [`parse`] yields [`GemtextLine`]s lazily, one per source line, so the
//! renderer can consume a body in a single forward pass.

use std::str::Lines;

const PRE_TOGGLE: &str = "```";

/// One line of a gemtext document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GemtextLine {
    Empty,
    Heading { level: u8, text: String },
    Link { uri: String, text: Option<String> },
    ListItem { text: String },
    Quote { text: String },
    Text { text: String },
    PreformattedBegin { alt: Option<String> },
    PreformattedContent { text: String },
    PreformattedEnd,
}

/// Parse `body` into a forward-only sequence of lines.
pub fn parse(body: &str) -> GemtextLines<'_> {
    GemtextLines {
        lines: body.lines(),
        preformatted: false,
        finished: false,
    }
}

/// Iterator returned by [`parse`].
pub struct GemtextLines<'a> {
    lines: Lines<'a>,
    preformatted: bool,
    finished: bool,
}

impl Iterator for GemtextLines<'_> {
    type Item = GemtextLine;

    fn next(&mut self) -> Option<GemtextLine> {
        if self.finished {
            return None;
        }

        let Some(line) = self.lines.next() else {
            self.finished = true;
            // Close an unterminated block so consumers always see a balanced run
            if self.preformatted {
                self.preformatted = false;
                return Some(GemtextLine::PreformattedEnd);
            }
            return None;
        };

        if let Some(rest) = line.strip_prefix(PRE_TOGGLE) {
            if self.preformatted {
                self.preformatted = false;
                return Some(GemtextLine::PreformattedEnd);
            }
            self.preformatted = true;
            let alt = rest.trim();
            return Some(GemtextLine::PreformattedBegin {
                alt: (!alt.is_empty()).then(|| alt.to_string()),
            });
        }

        if self.preformatted {
            return Some(GemtextLine::PreformattedContent {
                text: line.to_string(),
            });
        }

        Some(parse_line(line))
    }
}

fn parse_line(line: &str) -> GemtextLine {
    if let Some(rest) = line.strip_prefix("=>") {
        return parse_link(rest);
    }
    if line.starts_with('#') {
        let level = line.chars().take_while(|&c| c == '#').count().min(3);
        return GemtextLine::Heading {
            level: level as u8,
            text: line[level..].trim().to_string(),
        };
    }
    if let Some(rest) = line.strip_prefix("* ") {
        return GemtextLine::ListItem {
            text: rest.trim().to_string(),
        };
    }
    if let Some(rest) = line.strip_prefix('>') {
        return GemtextLine::Quote {
            text: rest.trim().to_string(),
        };
    }
    if line.trim().is_empty() {
        return GemtextLine::Empty;
    }
    GemtextLine::Text {
        text: line.to_string(),
    }
}

/// `=>[<whitespace>]<URL>[<whitespace><text>]`
fn parse_link(rest: &str) -> GemtextLine {
    let rest = rest.trim();
    match rest.split_once(char::is_whitespace) {
        Some((uri, text)) => {
            let text = text.trim();
            GemtextLine::Link {
                uri: uri.to_string(),
                text: (!text.is_empty()).then(|| text.to_string()),
            }
        }
        None => GemtextLine::Link {
            uri: rest.to_string(),
            text: None,
        },
    }
}
