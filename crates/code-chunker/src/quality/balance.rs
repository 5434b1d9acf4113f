use crate::language::Language;

/// Tracks open delimiters across lines.
///
/// Quotes only count when they close on the same line; an unmatched quote is
/// treated as an ordinary character so prose apostrophes do not poison the
/// rest of the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolScanner {
    paren: i64,
    bracket: i64,
    brace: i64,
    in_template: bool,
    in_block_comment: bool,
    /// `'` only opens a char literal (`'a'`, `'\n'`); needed for Rust lifetimes
    char_literals_only: bool,
}

impl SymbolScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_language(language: Language) -> Self {
        Self {
            char_literals_only: matches!(language, Language::Rust),
            ..Self::default()
        }
    }

    pub fn scan(&mut self, text: &str) {
        for line in text.lines() {
            self.scan_line(line);
        }
    }

    pub fn scan_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.in_block_comment {
                if c == '*' && next == Some('/') {
                    self.in_block_comment = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            if self.in_template {
                match c {
                    '\\' => i += 2,
                    '`' => {
                        self.in_template = false;
                        i += 1;
                    }
                    _ => i += 1,
                }
                continue;
            }

            match c {
                '/' if next == Some('/') => break,
                '/' if next == Some('*') => {
                    self.in_block_comment = true;
                    i += 2;
                    continue;
                }
                '`' => self.in_template = true,
                '"' => {
                    if let Some(end) = closing_quote(&chars, i, '"', usize::MAX) {
                        i = end + 1;
                        continue;
                    }
                }
                '\'' => {
                    let reach = if self.char_literals_only { 4 } else { usize::MAX };
                    if let Some(end) = closing_quote(&chars, i, '\'', reach) {
                        i = end + 1;
                        continue;
                    }
                }
                '(' => self.paren += 1,
                ')' => self.paren -= 1,
                '[' => self.bracket += 1,
                ']' => self.bracket -= 1,
                '{' => self.brace += 1,
                '}' => self.brace -= 1,
                _ => {}
            }
            i += 1;
        }
    }

    /// Some delimiter, template or comment is still open
    pub fn needs_more(&self) -> bool {
        self.paren > 0 || self.bracket > 0 || self.brace > 0 || self.in_template || self.in_block_comment
    }

    /// Every opened delimiter has been closed and nothing extra was closed
    pub fn is_balanced(&self) -> bool {
        !self.needs_more() && self.paren == 0 && self.bracket == 0 && self.brace == 0
    }

    /// Sum of currently open delimiters
    pub fn open_depth(&self) -> i64 {
        self.paren.max(0) + self.bracket.max(0) + self.brace.max(0)
    }
}

/// Position of the quote closing the one at `open`, within `reach` chars
fn closing_quote(chars: &[char], open: usize, quote: char, reach: usize) -> Option<usize> {
    let mut j = open + 1;
    while j < chars.len() && j - open <= reach {
        match chars[j] {
            '\\' => j += 2,
            c if c == quote => return Some(j),
            _ => j += 1,
        }
    }
    None
}
