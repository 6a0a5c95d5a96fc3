//! Header-scoped markdown chunking.
//!
//! A document is parsed into top-level CommonMark blocks. Every header opens a
//! section that runs until the next header; the section text keeps the header
//! line. Sections over the character or token budget are split: plain prose by
//! a fixed window with overlap, sections holding code fences or tables by
//! packing whole blocks so the fence is not cut unless it alone breaks the
//! token ceiling.
use std::ops::Range;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{char_len, estimate_tokens, Chunk, Header};

pub struct Chunker {
    config: ChunkingConfig,
}

#[derive(Debug, Clone)]
enum BlockKind {
    Heading { level: u8, text: String },
    Body { atomic: bool },
}

#[derive(Debug, Clone)]
struct Block {
    kind: BlockKind,
    range: Range<usize>,
}

/// A block plus the whitespace that follows it, up to the next block.
#[derive(Debug, Clone)]
struct Unit {
    range: Range<usize>,
    atomic: bool,
}

#[derive(Debug)]
struct Section {
    headers: Vec<Header>,
    range: Range<usize>,
    units: Vec<Unit>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into ordered chunks tagged with `source`.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let blocks = parse_blocks(text);
        let mut chunks = Vec::new();
        for section in build_sections(text, &blocks) {
            let body = text[section.range.clone()].trim();
            if body.is_empty() {
                continue;
            }
            if self.fits(body) {
                chunks.push(Chunk {
                    text: body.to_string(),
                    headers: section.headers,
                    position: 0,
                    sub_position: None,
                    source: source.to_string(),
                });
                continue;
            }

            let pieces = if section.units.iter().any(|u| u.atomic) {
                self.pack_units(text, &section.units)
            } else {
                self.window_split(body)
            };
            for (sub_position, piece) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    text: piece,
                    headers: section.headers.clone(),
                    position: 0,
                    sub_position: Some(sub_position),
                    source: source.to_string(),
                });
            }
        }

        for (position, chunk) in chunks.iter_mut().enumerate() {
            chunk.position = position;
        }
        tracing::debug!(source, chunks = chunks.len(), "chunked document");
        chunks
    }

    fn fits(&self, text: &str) -> bool {
        char_len(text) <= self.config.max_chunk_size && estimate_tokens(text) <= self.config.max_tokens_per_chunk
    }

    fn fits_atomic(&self, text: &str) -> bool {
        char_len(text) <= self.config.max_chunk_size + self.config.atomic_block_tolerance
            && estimate_tokens(text) <= self.config.max_tokens_per_chunk
    }

    /// Fixed windows of `effective_max_size` characters whose starts are
    /// `effective_max_size - overlap` apart. The last window ends at the end
    /// of the text.
    fn window_split(&self, text: &str) -> Vec<String> {
        let window = self.config.effective_max_size();
        let step = window - self.config.overlap;
        let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let total = offsets.len() - 1;

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + window).min(total);
            pieces.push(text[offsets[start]..offsets[end]].to_string());
            if end == total {
                break;
            }
            start += step;
        }
        pieces
    }

    /// Greedily pack whole blocks into pieces within the budget. A block that
    /// cannot fit on its own is kept whole when it is atomic and within the
    /// tolerance, otherwise it is window-split.
    fn pack_units(&self, text: &str, units: &[Unit]) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current: Option<Range<usize>> = None;

        for unit in units {
            let start = current.as_ref().map_or(unit.range.start, |r| r.start);
            if self.fits(text[start..unit.range.end].trim()) {
                current = Some(start..unit.range.end);
                continue;
            }
            if let Some(done) = current.take() {
                push_trimmed(&mut pieces, &text[done]);
            }
            let alone = text[unit.range.clone()].trim();
            if self.fits(alone) {
                current = Some(unit.range.clone());
            } else if unit.atomic && self.fits_atomic(alone) {
                pieces.push(alone.to_string());
            } else {
                if unit.atomic {
                    tracing::warn!(chars = char_len(alone), "atomic block exceeds the chunk budget, splitting it");
                }
                pieces.extend(self.window_split(alone));
            }
        }
        if let Some(done) = current {
            push_trimmed(&mut pieces, &text[done]);
        }
        pieces
    }
}

fn push_trimmed(pieces: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn is_atomic(tag: &Tag<'_>) -> bool {
    matches!(tag, Tag::CodeBlock(_) | Tag::Table(_))
}

/// Top-level blocks in document order.
fn parse_blocks(text: &str) -> Vec<Block> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS | Options::ENABLE_FOOTNOTES;
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut heading: Option<(u8, String, Range<usize>)> = None;

    for (event, range) in Parser::new_ext(text, options).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    match &tag {
                        Tag::Heading { level, .. } => heading = Some((heading_level(*level), String::new(), range)),
                        other => blocks.push(Block { kind: BlockKind::Body { atomic: is_atomic(other) }, range }),
                    }
                }
                depth += 1;
            }
            Event::End(end) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && matches!(end, TagEnd::Heading(_)) {
                    if let Some((level, title, range)) = heading.take() {
                        blocks.push(Block { kind: BlockKind::Heading { level, text: title.trim().to_string() }, range });
                    }
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, title, _)) = heading.as_mut() {
                    title.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, title, _)) = heading.as_mut() {
                    title.push(' ');
                }
            }
            Event::Rule if depth == 0 => blocks.push(Block { kind: BlockKind::Body { atomic: false }, range }),
            _ => {}
        }
    }
    blocks
}

/// Group blocks into header-scoped sections, tracking the header-path stack.
fn build_sections(text: &str, blocks: &[Block]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<Header> = Vec::new();
    let mut current = Section { headers: Vec::new(), range: 0..text.len(), units: Vec::new() };

    for (i, block) in blocks.iter().enumerate() {
        let unit_end = blocks.get(i + 1).map_or(text.len(), |next| next.range.start);
        match &block.kind {
            BlockKind::Heading { level, text: title } => {
                current.range.end = block.range.start;
                sections.push(current);
                stack.retain(|h| h.level < *level);
                stack.push(Header::new(*level, title.clone()));
                current = Section {
                    headers: stack.clone(),
                    range: block.range.start..text.len(),
                    units: vec![Unit { range: block.range.start..unit_end, atomic: false }],
                };
            }
            BlockKind::Body { atomic } => {
                let start = if current.units.is_empty() { current.range.start } else { block.range.start };
                current.units.push(Unit { range: start..unit_end, atomic: *atomic });
            }
        }
    }
    sections.push(current);
    sections
}
