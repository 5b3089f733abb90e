use std::ops::Range;

use super::parsers::{
    closes_doubled, is_block_comment_end, is_block_comment_start, is_line_comment_start,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    Backtick,
    LineComment,
    BlockComment(u32),
}

/// What a stretch of SQL text is, as far as marker and separator
/// recognition is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Code,
    Literal,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub kind: SegmentKind,
    pub range: Range<usize>,
}

fn push(out: &mut Vec<Segment>, kind: SegmentKind, range: Range<usize>) {
    if !range.is_empty() {
        out.push(Segment { kind, range });
    }
}

fn closing_byte(state: State) -> u8 {
    match state {
        State::SingleQuoted => b'\'',
        State::DoubleQuoted => b'"',
        State::Bracketed => b']',
        _ => b'`',
    }
}

/// Split SQL into code, quoted-literal and comment segments.
///
/// Quoted identifiers (`"..."`, `[...]`, `` `...` ``) count as literals: a
/// marker or separator inside them is text. Doubled closing characters are
/// escapes. Block comments nest. An unterminated literal or comment runs to
/// the end of the input.
pub(crate) fn segments(sql: &str) -> Vec<Segment> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut state = State::Normal;
    let mut seg_start = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                let next = match b {
                    b'\'' => Some(State::SingleQuoted),
                    b'"' => Some(State::DoubleQuoted),
                    b'[' => Some(State::Bracketed),
                    b'`' => Some(State::Backtick),
                    _ if is_line_comment_start(bytes, idx) => Some(State::LineComment),
                    _ if is_block_comment_start(bytes, idx) => Some(State::BlockComment(1)),
                    _ => None,
                };
                if let Some(next) = next {
                    push(&mut out, SegmentKind::Code, seg_start..idx);
                    seg_start = idx;
                    state = next;
                    if matches!(next, State::LineComment | State::BlockComment(_)) {
                        idx += 2;
                        continue;
                    }
                }
            }
            State::SingleQuoted | State::DoubleQuoted | State::Bracketed | State::Backtick => {
                let close = closing_byte(state);
                if b == close {
                    if closes_doubled(bytes, idx, close) {
                        idx += 2;
                        continue;
                    }
                    idx += 1;
                    push(&mut out, SegmentKind::Literal, seg_start..idx);
                    seg_start = idx;
                    state = State::Normal;
                    continue;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    push(&mut out, SegmentKind::Comment, seg_start..idx);
                    seg_start = idx;
                    state = State::Normal;
                    continue;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 2;
                    continue;
                } else if is_block_comment_end(bytes, idx) {
                    idx += 2;
                    if depth == 1 {
                        push(&mut out, SegmentKind::Comment, seg_start..idx);
                        seg_start = idx;
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                    continue;
                }
            }
        }
        idx += 1;
    }

    let tail_kind = match state {
        State::Normal => SegmentKind::Code,
        State::LineComment | State::BlockComment(_) => SegmentKind::Comment,
        _ => SegmentKind::Literal,
    };
    push(&mut out, tail_kind, seg_start..bytes.len());
    out
}
