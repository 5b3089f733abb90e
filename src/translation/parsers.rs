pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// A closing quote followed by the same character is an escaped quote.
pub(super) fn closes_doubled(bytes: &[u8], idx: usize, close: u8) -> bool {
    bytes.get(idx + 1) == Some(&close)
}

pub(super) fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Tracks `BEGIN ... END` nesting inside a `CREATE TRIGGER` statement, where
/// separators belong to the body rather than ending the statement.
#[derive(Debug, Default)]
pub(super) struct TriggerBody {
    head: Vec<String>,
    trigger: bool,
    depth: usize,
}

impl TriggerBody {
    /// Feed the next keyword or identifier of the current statement.
    pub(super) fn word(&mut self, word: &str) {
        if self.head.len() < 4 {
            self.head.push(word.to_ascii_uppercase());
            self.trigger = self.head[0] == "CREATE" && self.head[1..].iter().any(|w| w == "TRIGGER");
        }
        if !self.trigger {
            return;
        }
        if word.eq_ignore_ascii_case("BEGIN") || word.eq_ignore_ascii_case("CASE") {
            self.depth += 1;
        } else if word.eq_ignore_ascii_case("END") {
            self.depth = self.depth.saturating_sub(1);
        }
    }

    /// Whether a separator at this point is part of an open body.
    pub(super) fn is_open(&self) -> bool {
        self.trigger && self.depth > 0
    }
}
