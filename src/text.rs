//! Field text handling shared by the preview and export paths

/// Explicit line-break marker stored inside values
pub const LINE_BREAK_MARKER: &str = "<br>";

/// Script class used to pick a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cjk,
}

/// A value prepared for drawing
#[derive(Debug, Clone, PartialEq)]
pub struct FieldText {
    pub lines: Vec<String>,
    pub script: Script,
}

impl FieldText {
    /// Prepare a value for drawing; `None` when nothing visible would be drawn
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = normalize_breaks(value);
        if normalized.trim().is_empty() {
            return None;
        }

        let script = if normalized.chars().any(is_cjk) {
            Script::Cjk
        } else {
            Script::Latin
        };

        Some(Self {
            lines: normalized.split('\n').map(str::to_string).collect(),
            script,
        })
    }
}

/// Replace break markers and CRLF with `\n`
pub fn normalize_breaks(value: &str) -> String {
    value.replace(LINE_BREAK_MARKER, "\n").replace("\r\n", "\n")
}

/// Whether a codepoint needs the CJK-capable face
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x11FF      // Hangul Jamo
        | 0x2E80..=0x2FDF    // radicals
        | 0x3000..=0x303F    // CJK symbols and punctuation
        | 0x3040..=0x309F    // Hiragana
        | 0x30A0..=0x30FF    // Katakana
        | 0x3100..=0x31FF    // Bopomofo, Katakana extensions
        | 0x3200..=0x33FF    // enclosed / compatibility
        | 0x3400..=0x4DBF    // Extension A
        | 0x4E00..=0x9FFF    // Unified Ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // compatibility ideographs
        | 0xFE30..=0xFE4F    // compatibility forms
        | 0xFF00..=0xFFEF    // half/full width forms
        | 0x20000..=0x2FFFF  // supplementary ideographs
    )
}
