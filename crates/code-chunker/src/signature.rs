//! Line-level declaration heuristics shared by the text-based strategies and
//! the boundary-sensitive passes.

use crate::types::ChunkType;
use once_cell::sync::Lazy;
use regex::Regex;

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|unsafe|const|static)\s+)*(?:fn|function\*?|def|func)\s+(?:\([^)]*\)\s*)?([A-Za-z_$][\w$]*)",
    )
});

static ARROW_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
    )
});

static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|override|virtual|synchronized)\s+)+[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*\(",
    )
});

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:public|private|abstract|final|sealed|data)\s+)*(class|struct|enum|impl(?:<[^>]*>)?|object)\s+([A-Za-z_]\w*)",
    )
});

static INTERFACE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:export\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:public\s+)?(?:interface|trait|protocol)\s+([A-Za-z_]\w*)",
    )
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid signature pattern: {e}"))
}

/// Declaration found on a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub chunk_type: ChunkType,
    pub name: String,
}

/// Recognize a function, class or interface header on one line
pub fn detect_signature(line: &str) -> Option<Signature> {
    if let Some(caps) = INTERFACE_RE.captures(line) {
        return Some(Signature {
            chunk_type: ChunkType::Interface,
            name: caps[1].to_string(),
        });
    }
    if let Some(caps) = CLASS_RE.captures(line) {
        return Some(Signature {
            chunk_type: ChunkType::Class,
            name: caps[2].to_string(),
        });
    }
    for re in [&*FUNCTION_RE, &*ARROW_RE, &*METHOD_RE] {
        if let Some(caps) = re.captures(line) {
            return Some(Signature {
                chunk_type: ChunkType::Function,
                name: caps[1].to_string(),
            });
        }
    }
    None
}

pub fn is_signature(line: &str) -> bool {
    detect_signature(line).is_some()
}

/// Whether any line of the text declares a function or class
pub fn contains_signature(content: &str) -> bool {
    content.lines().any(is_signature)
}

/// Line that closes a block: `}`, `};`, `end`, `})` and friends
pub fn is_block_end(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == "end"
        || (trimmed.starts_with('}') && trimmed.len() <= 3)
        || (trimmed.starts_with(')') && trimmed.len() <= 2)
}

/// How good a place the end of `line` is to cut, given the line after it.
///
/// Blank lines and block ends score 2 each, a declaration on the next line
/// scores 3.
pub fn boundary_score(line: &str, next: Option<&str>) -> u32 {
    let mut score = 0;
    if line.trim().is_empty() {
        score += 2;
    }
    if is_block_end(line) {
        score += 2;
    }
    if next.is_some_and(is_signature) {
        score += 3;
    }
    score
}

/// Classify a block of text by its first declaration line
pub fn classify_block(content: &str) -> Option<Signature> {
    content
        .lines()
        .find(|l| !l.trim().is_empty() && !is_comment(l))
        .and_then(detect_signature)
}

fn is_comment(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("//") || t.starts_with('#') || t.starts_with("/*") || t.starts_with('*')
}
