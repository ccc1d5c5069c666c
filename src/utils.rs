use std::{fmt::Write, ops::Range};

use imara_diff::{
    intern::{Interner, Token},
    Algorithm,
};

/// Split text into lines on `\n`, the way MediaWiki's text diff does.
///
/// Line terminators are not part of the lines, a trailing newline yields a trailing empty
/// line and empty text is a single empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut last_end = 0;
    for newline in memchr::memchr_iter(b'\n', text.as_bytes()) {
        lines.push(&text[last_end..newline]);
        last_end = newline + 1;
    }
    lines.push(&text[last_end..]);
    lines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTag {
    /// Lines only present in the new text.
    Insert,
    /// Lines only present in the old text.
    Delete,
    /// A block of old lines replaced by a block of new lines.
    Change,
}

/// One non-copy block of a line diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOp<'a> {
    pub tag: ChangeTag,
    pub orig: &'a [&'a str],
    pub closing: &'a [&'a str],
}

/// Line-level diff of two texts using the histogram algorithm.
pub struct LineDiff<'a> {
    old: Vec<&'a str>,
    new: Vec<&'a str>,
    hunks: Vec<(Range<u32>, Range<u32>)>,
}

impl<'a> LineDiff<'a> {
    pub fn compute(old: &'a str, new: &'a str) -> Self {
        let old = split_lines(old);
        let new = split_lines(new);

        let mut interner = Interner::new(old.len() + new.len());
        let old_tokens: Vec<Token> = old.iter().map(|line| interner.intern(*line)).collect();
        let new_tokens: Vec<Token> = new.iter().map(|line| interner.intern(*line)).collect();

        let mut hunks = Vec::new();
        imara_diff::diff_with_tokens(
            Algorithm::Histogram,
            &old_tokens,
            &new_tokens,
            interner.num_tokens(),
            |before: Range<u32>, after: Range<u32>| {
                hunks.push((before, after));
            },
        );

        Self { old, new, hunks }
    }

    pub fn ops(&self) -> impl Iterator<Item = DiffOp<'_>> + '_ {
        self.hunks.iter().map(|(before, after)| {
            let orig = &self.old[before.start as usize..before.end as usize];
            let closing = &self.new[after.start as usize..after.end as usize];
            let tag = match (orig.is_empty(), closing.is_empty()) {
                (true, _) => ChangeTag::Insert,
                (false, true) => ChangeTag::Delete,
                (false, false) => ChangeTag::Change,
            };
            DiffOp { tag, orig, closing }
        })
    }

    pub fn is_identical(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// Format an integer with `,` as the thousands separator.
pub fn format_number(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        result.push('-');
    }
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(digit);
    }
    result
}

/// Percent-encode a page title for use in a URL path.
///
/// Keeps the characters MediaWiki leaves readable in links, including `:` and `/`.
pub fn url_encode_title(title: &str) -> String {
    const KEEP: &[u8] = b"-_.~;:@$!*(),/";

    let mut encoded = String::with_capacity(title.len());
    for byte in title.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
