//! Fast strategy-type classification and batch sizing.

use chunkflow_code_chunker::{resolve_language, Language};
use serde::{Deserialize, Serialize};

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 50;

const LARGE_FILE_BYTES: f64 = 100.0 * 1024.0;
const MEDIUM_FILE_BYTES: f64 = 50.0 * 1024.0;
const SMALL_FILE_BYTES: f64 = 5.0 * 1024.0;
const HIGH_COMPLEXITY: f64 = 50.0;
const LOW_COMPLEXITY: f64 = 10.0;

/// Which family of strategy a file is expected to go through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Ast,
    Semantic,
    Bracket,
    Line,
    Markdown,
    Config,
    Style,
}

impl StrategyKind {
    /// Lookup by language name, then by path extension
    pub fn classify(language: &str, file_path: Option<&str>) -> Self {
        let lang = resolve_language(language, file_path);
        match lang {
            Language::Markdown => StrategyKind::Markdown,
            l if l.is_structured() => StrategyKind::Config,
            l if l.is_style() => StrategyKind::Style,
            l if l.supports_ast() => StrategyKind::Ast,
            l if l.is_code() && l.uses_braces() => StrategyKind::Bracket,
            l if l.is_code() => StrategyKind::Semantic,
            _ => StrategyKind::Line,
        }
    }

    /// Starting batch size; parse-heavy kinds get small batches
    pub fn base_batch_size(self) -> usize {
        match self {
            StrategyKind::Ast => 5,
            StrategyKind::Semantic => 10,
            StrategyKind::Bracket => 15,
            StrategyKind::Line | StrategyKind::Markdown => 20,
            StrategyKind::Config | StrategyKind::Style => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Ast => "ast",
            StrategyKind::Semantic => "semantic",
            StrategyKind::Bracket => "bracket",
            StrategyKind::Line => "line",
            StrategyKind::Markdown => "markdown",
            StrategyKind::Config => "config",
            StrategyKind::Style => "style",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Averages over a representative sample of one group
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupProfile {
    pub avg_size: f64,
    pub avg_complexity: f64,
}

/// Batch size for a group: the base size scaled for file size and
/// complexity, clamped to `[1, 50]` and capped by `cap`.
pub fn adaptive_batch_size(kind: StrategyKind, profile: GroupProfile, cap: Option<usize>) -> usize {
    #[allow(clippy::cast_precision_loss)]
    let mut size = kind.base_batch_size() as f64;

    if profile.avg_size > LARGE_FILE_BYTES {
        size *= 0.5;
    } else if profile.avg_size > MEDIUM_FILE_BYTES {
        size *= 0.75;
    } else if profile.avg_size < SMALL_FILE_BYTES {
        size *= 1.5;
    }

    if profile.avg_complexity > HIGH_COMPLEXITY {
        size *= 0.5;
    } else if profile.avg_complexity < LOW_COMPLEXITY {
        size *= 1.25;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let size = (size.floor() as usize).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
    cap.map_or(size, |cap| size.min(cap.max(MIN_BATCH_SIZE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(avg_size: f64, avg_complexity: f64) -> GroupProfile {
        GroupProfile {
            avg_size,
            avg_complexity,
        }
    }

    #[test]
    fn classification_table() {
        let cases = [
            ("rust", None, StrategyKind::Ast),
            ("", Some("app/main.py"), StrategyKind::Ast),
            ("go", None, StrategyKind::Bracket),
            ("ruby", None, StrategyKind::Semantic),
            ("markdown", None, StrategyKind::Markdown),
            ("", Some("README.md"), StrategyKind::Markdown),
            ("", Some("Cargo.toml"), StrategyKind::Config),
            ("json", None, StrategyKind::Config),
            ("", Some("site.scss"), StrategyKind::Style),
            ("text", None, StrategyKind::Line),
            ("", Some("LICENSE"), StrategyKind::Line),
        ];
        for (language, path, expected) in cases {
            assert_eq!(StrategyKind::classify(language, path), expected, "{language:?} {path:?}");
        }
    }

    #[test]
    fn small_simple_files_get_bigger_batches() {
        // 5 * 1.5 * 1.25 = 9.375
        assert_eq!(adaptive_batch_size(StrategyKind::Ast, profile(1_000.0, 3.0), None), 9);
        assert_eq!(adaptive_batch_size(StrategyKind::Config, profile(1_000.0, 3.0), None), 50);
    }

    #[test]
    fn large_complex_files_get_smaller_batches() {
        // 5 * 0.5 * 0.5 = 1.25
        assert_eq!(adaptive_batch_size(StrategyKind::Ast, profile(200_000.0, 80.0), None), 1);
        // 20 * 0.75 = 15
        assert_eq!(adaptive_batch_size(StrategyKind::Line, profile(60_000.0, 20.0), None), 15);
    }

    #[test]
    fn explicit_cap_wins() {
        assert_eq!(adaptive_batch_size(StrategyKind::Style, profile(10_000.0, 20.0), Some(4)), 4);
        assert_eq!(adaptive_batch_size(StrategyKind::Style, profile(10_000.0, 20.0), Some(0)), 1);
        assert_eq!(adaptive_batch_size(StrategyKind::Ast, profile(10_000.0, 20.0), Some(40)), 5);
    }
}
