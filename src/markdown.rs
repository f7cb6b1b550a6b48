//! Token stream over a problem document.
//!
//! `pulldown-cmark` does the actual CommonMark work; this module only folds its
//! event stream into top-level blocks. Every byte of the source ends up in
//! exactly one token, so joining all `raw` values gives back the input.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Heading { level: u8, text: String, raw: String },
    Code { lang: Option<String>, text: String, raw: String },
    Paragraph { text: String, raw: String },
    /// Blank lines between blocks.
    Space { raw: String },
    /// Any other block (lists, quotes, tables, html, rules...).
    Raw { raw: String },
}

impl Token {
    /// Source text of the token, verbatim.
    pub fn raw(&self) -> &str {
        match self {
            Token::Heading { raw, .. }
            | Token::Code { raw, .. }
            | Token::Paragraph { raw, .. }
            | Token::Space { raw }
            | Token::Raw { raw } => raw,
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Token::Heading { .. })
    }

    pub fn is_space(&self) -> bool {
        matches!(self, Token::Space { .. })
    }
}

/// What kind of top-level block we are inside while folding events.
enum Block {
    Heading { level: u8, text: String },
    Code { lang: Option<String>, text: String },
    Paragraph,
    Other,
}

/// Split `source` into top-level block tokens.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0usize;
    let mut depth = 0usize;
    let mut current: Option<(Block, usize)> = None;

    for (event, range) in Parser::new_ext(source, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    push_gap(&mut tokens, source, cursor, range.start);
                    cursor = cursor.max(range.start);
                    current = Some((block_for(&tag), cursor));
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some((block, start)) = current.take() {
                        let end = block_end(source, range.end);
                        tokens.push(finish_block(block, &source[start..end]));
                        cursor = end;
                    }
                }
            }
            Event::Text(text) | Event::Code(text) if depth > 0 => {
                if let Some((block, _)) = current.as_mut() {
                    match block {
                        Block::Heading { text: acc, .. } | Block::Code { text: acc, .. } => {
                            acc.push_str(&text)
                        }
                        _ => {}
                    }
                }
            }
            Event::SoftBreak | Event::HardBreak if depth > 0 => {
                if let Some((Block::Heading { text, .. }, _)) = current.as_mut() {
                    text.push(' ');
                }
            }
            _ if depth == 0 => {
                // Standalone block-level events such as thematic breaks.
                push_gap(&mut tokens, source, cursor, range.start);
                let Range { start, end } = range;
                let start = start.max(cursor);
                if end > start {
                    tokens.push(Token::Raw { raw: source[start..end].to_string() });
                    cursor = end;
                }
            }
            _ => {}
        }
    }

    push_gap(&mut tokens, source, cursor, source.len());
    tokens
}

fn block_for(tag: &Tag<'_>) -> Block {
    match tag {
        Tag::Heading { level, .. } => Block::Heading { level: *level as u8, text: String::new() },
        Tag::CodeBlock(kind) => {
            let lang = match kind {
                CodeBlockKind::Fenced(info) => info
                    .split_whitespace()
                    .next()
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
                CodeBlockKind::Indented => None,
            };
            Block::Code { lang, text: String::new() }
        }
        Tag::Paragraph => Block::Paragraph,
        _ => Block::Other,
    }
}

/// Blocks own their line terminator so that the gap that follows is purely
/// the blank lines between blocks.
fn block_end(source: &str, end: usize) -> usize {
    if source[..end].ends_with('\n') {
        return end;
    }
    let rest = &source[end..];
    if rest.starts_with("\r\n") {
        end + 2
    } else if rest.starts_with('\n') {
        end + 1
    } else {
        end
    }
}

fn finish_block(block: Block, raw: &str) -> Token {
    let raw_owned = raw.to_string();
    match block {
        Block::Heading { level, text } => Token::Heading { level, text: text.trim().to_string(), raw: raw_owned },
        Block::Code { lang, mut text } => {
            if text.ends_with('\n') {
                text.pop();
                if text.ends_with('\r') {
                    text.pop();
                }
            }
            Token::Code { lang, text, raw: raw_owned }
        }
        Block::Paragraph => Token::Paragraph {
            text: raw.trim_end_matches(['\n', '\r']).to_string(),
            raw: raw_owned,
        },
        Block::Other => Token::Raw { raw: raw_owned },
    }
}

fn push_gap(tokens: &mut Vec<Token>, source: &str, from: usize, to: usize) {
    if to <= from {
        return;
    }
    let gap = &source[from..to];
    if gap.trim().is_empty() {
        tokens.push(Token::Space { raw: gap.to_string() });
    } else {
        // Link reference definitions and similar produce no events.
        tokens.push(Token::Raw { raw: gap.to_string() });
    }
}
