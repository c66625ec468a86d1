//! Title normalization for cross-catalog matching.
//!
//! Two distinct transforms live here and must not be confused:
//!
//! - [`normalize`] produces the canonical join key used by the reference
//!   index. It folds the width-variant and punctuation differences that are
//!   arbitrary between catalogs while leaving semantic content alone.
//! - [`clean_title`] strips catalog-specific metadata tags (`[1]`, `[無修]`,
//!   `(電影版)`…) from a raw scraped title. It is display/search cleaning and
//!   runs *before* any lookup or remote query.

use unicode_normalization::UnicodeNormalization;

/// Map a raw title to its canonical matching key.
///
/// Steps, in order:
/// 1. Unicode NFKC (full-width Latin/digits → ASCII, ideographic space → space)
/// 2. lowercase
/// 3. season-marker rewrites (`第2期` → ` 2 `)
/// 4. separator punctuation → space
/// 5. whitespace collapse + trim
///
/// Total and idempotent; returns an empty string for empty input. Distinct
/// works occasionally collide on the same key — the collision resolver, not
/// this function, is responsible for picking one.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let s = raw.nfkc().collect::<String>().to_lowercase();
    let s = rewrite_season_markers(&s);
    let s = replace_separators(&s);
    collapse_whitespace(&s)
}

// ── Season markers ──────────────────────────────────────────────────────

/// Rewrite native-language season idioms to a spaced digit token.
///
/// The primary catalog spells seasons as `第2期` while the reference corpus
/// writes `Title 2` / `Title Season 2`; this mismatch is the single largest
/// source of false negatives. `第 2 期` with stray spaces is accepted too.
fn rewrite_season_markers(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '第' {
            // 第 [ws] digits [ws] 期  →  " digits "
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let start = j;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            let end = j;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if end > start && j < chars.len() && chars[j] == '期' {
                result.push(' ');
                result.extend(&chars[start..end]);
                result.push(' ');
                i = j + 1;
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    // Idiomatic chapter forms seen in the catalog (炎炎ノ消防隊 style).
    result.replace("參之章", " 3 ").replace("弐ノ章", " 2 ")
}

// ── Separator punctuation ───────────────────────────────────────────────

/// Characters that differ arbitrarily between catalogs for the same title.
const SEPARATORS: &[char] = &[
    ':', '-', '–', '—', '!', '?', ',', '.', '~', '/', '"', '“', '”', '‘', '’',
    '「', '」', '『', '』',
];

fn replace_separators(s: &str) -> String {
    s.chars()
        .map(|c| if SEPARATORS.contains(&c) { ' ' } else { c })
        .collect()
}

// ── Whitespace collapse ─────────────────────────────────────────────────

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Raw-title cleaning ──────────────────────────────────────────────────

/// Parenthesized tags safe to strip. Years like `(2011)` are deliberately
/// not stripped — the reference corpus keeps the year in a separate field,
/// and a year in the title can be what distinguishes a remake.
const PAREN_TAGS: &[&str] = &[
    "電影版", "劇場版", "OVA", "OAD", "TV", "特別篇", "總集篇", "無修", "重製版",
];

/// Strip catalog metadata tags from a raw scraped title.
///
/// - `鬼滅之刃 柱訓練篇 [1]` → `鬼滅之刃 柱訓練篇`
/// - `SPY×FAMILY 間諜家家酒 (電影版)` → `SPY×FAMILY 間諜家家酒`
/// - `進擊的巨人 The Final Season [無修]` → `進擊的巨人 The Final Season`
pub fn clean_title(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut cleaned = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            // Episode/metadata brackets are always noise.
            '[' => {
                if let Some(close) = find_close(&chars, i, ']') {
                    trim_trailing_space(&mut cleaned);
                    i = close + 1;
                    continue;
                }
                cleaned.push('[');
            }
            '(' | '（' => {
                let close_char = if chars[i] == '(' { ')' } else { '）' };
                if let Some(close) = find_close(&chars, i, close_char) {
                    let inner: String = chars[i + 1..close].iter().collect();
                    let inner = inner.trim();
                    if PAREN_TAGS.iter().any(|tag| inner.starts_with(tag)) {
                        trim_trailing_space(&mut cleaned);
                        i = close + 1;
                        continue;
                    }
                }
                cleaned.push(chars[i]);
            }
            c => cleaned.push(c),
        }
        i += 1;
    }

    cleaned.trim().to_string()
}

fn find_close(chars: &[char], open: usize, close: char) -> Option<usize> {
    chars[open + 1..]
        .iter()
        .position(|&c| c == close)
        .map(|p| open + 1 + p)
}

fn trim_trailing_space(s: &mut String) {
    while s.ends_with(' ') || s.ends_with('\u{3000}') {
        s.pop();
    }
}
