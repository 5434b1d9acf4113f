use crate::config::ProcessingConfig;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::syntax::SyntaxTree;
use crate::types::estimate_complexity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One file as handed to the coordinator
#[derive(Debug, Clone)]
pub struct FileInput {
    pub content: String,
    pub language: String,
    pub file_path: Option<String>,
    /// Pre-parsed tree supplied by the caller
    pub ast: Option<SyntaxTree>,
    /// Pre-computed features supplied by the caller
    pub features: Option<FileFeatures>,
}

impl FileInput {
    pub fn new(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            language: language.into(),
            file_path: None,
            ast: None,
            features: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ast(mut self, ast: SyntaxTree) -> Self {
        self.ast = Some(ast);
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: FileFeatures) -> Self {
        self.features = Some(features);
        self
    }
}

/// Cheap statistics about a file, derived from regex heuristics
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileFeatures {
    /// Content length in characters
    pub size: usize,
    pub line_count: usize,
    pub complexity: u32,
    pub has_imports: bool,
    pub has_exports: bool,
    pub has_functions: bool,
    pub has_classes: bool,
    pub is_code_file: bool,
    pub is_structured_file: bool,
}

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?m)^\s*(?:import\s|from\s+\S+\s+import\s|use\s+[\w:]|#include\s|require\(|using\s+[\w.]+;|extern\s+crate\s)")
});
static EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?m)^\s*(?:export\s|module\.exports|pub\s+(?:fn|struct|enum|trait|mod|use|const|static|type)\s)")
});
static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?m)^\s*(?:(?:pub(?:\([^)]*\))?|export|async|static|public|private|protected)\s+)*(?:fn|function|def|func)\s")
});
static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?m)^\s*(?:(?:pub(?:\([^)]*\))?|export|abstract|public|final)\s+)*(?:class|struct|interface|trait|impl|enum)\b")
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid feature pattern: {e}"))
}

const STRUCTURED_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "xml", "ini", "csv", "cfg", "conf"];

impl FileFeatures {
    /// Derive features from content, language name and optional path
    pub fn detect(content: &str, language: &str, file_path: Option<&str>) -> Self {
        let lang = resolve_language(language, file_path);
        let extension = file_path
            .and_then(|p| Path::new(p).extension())
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let is_structured_file = lang.is_structured()
            || extension
                .as_deref()
                .is_some_and(|ext| STRUCTURED_EXTENSIONS.contains(&ext));

        Self {
            size: content.chars().count(),
            line_count: content.lines().count(),
            complexity: estimate_complexity(content),
            has_imports: IMPORT_RE.is_match(content),
            has_exports: EXPORT_RE.is_match(content),
            has_functions: FUNCTION_RE.is_match(content),
            has_classes: CLASS_RE.is_match(content),
            is_code_file: lang.is_code(),
            is_structured_file,
        }
    }
}

/// Resolve the language from its name, falling back to the file extension
pub fn resolve_language(language: &str, file_path: Option<&str>) -> Language {
    match Language::from_name(language) {
        Language::Unknown => file_path.map_or(Language::Unknown, Language::from_path),
        known => known,
    }
}

/// Everything a strategy or pass may look at for one file.
///
/// Immutable once built; share it by reference.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    content: String,
    language: String,
    lang: Language,
    total_lines: usize,
    file_path: Option<String>,
    config: Arc<ProcessingConfig>,
    features: FileFeatures,
    metadata: BTreeMap<String, String>,
    ast: Option<SyntaxTree>,
}

impl ProcessingContext {
    pub fn builder() -> ProcessingContextBuilder {
        ProcessingContextBuilder::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Language name as supplied by the caller, lowercased
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Parsed language
    pub fn lang(&self) -> Language {
        self.lang
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn shared_config(&self) -> Arc<ProcessingConfig> {
        Arc::clone(&self.config)
    }

    pub fn features(&self) -> &FileFeatures {
        &self.features
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn ast(&self) -> Option<&SyntaxTree> {
        self.ast.as_ref()
    }

    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Content holds nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Builder for [`ProcessingContext`]; `content` and `language` are required
#[derive(Debug, Default)]
pub struct ProcessingContextBuilder {
    content: Option<String>,
    language: Option<String>,
    file_path: Option<String>,
    config: Option<Arc<ProcessingConfig>>,
    features: Option<FileFeatures>,
    metadata: BTreeMap<String, String>,
    ast: Option<SyntaxTree>,
}

impl ProcessingContextBuilder {
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn file_path(mut self, path: Option<String>) -> Self {
        self.file_path = path;
        self
    }

    #[must_use]
    pub fn config(mut self, config: Arc<ProcessingConfig>) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn features(mut self, features: Option<FileFeatures>) -> Self {
        self.features = features;
        self
    }

    #[must_use]
    pub fn ast(mut self, ast: Option<SyntaxTree>) -> Self {
        self.ast = ast;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ProcessingContext> {
        let content = self
            .content
            .ok_or_else(|| ChunkerError::context("content is required"))?;
        let language = self
            .language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ChunkerError::context("language is required"))?;

        let lang = resolve_language(&language, self.file_path.as_deref());
        let features = self
            .features
            .unwrap_or_else(|| FileFeatures::detect(&content, &language, self.file_path.as_deref()));

        Ok(ProcessingContext {
            total_lines: content.lines().count(),
            content,
            language,
            lang,
            file_path: self.file_path,
            config: self.config.unwrap_or_default(),
            features,
            metadata: self.metadata,
            ast: self.ast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_content_and_language() {
        let missing_content = ProcessingContext::builder().language("rust").build();
        assert!(matches!(missing_content, Err(ChunkerError::Context(_))));

        let blank_language = ProcessingContext::builder()
            .content("fn main() {}")
            .language("  ")
            .build();
        assert!(matches!(blank_language, Err(ChunkerError::Context(_))));
    }

    #[test]
    fn builder_fills_features() {
        let ctx = ProcessingContext::builder()
            .content("use std::io;\n\npub fn main() {\n    run();\n}\n")
            .language("Rust")
            .file_path(Some("src/main.rs".to_string()))
            .metadata("origin", "test")
            .build()
            .unwrap();

        assert_eq!(ctx.language(), "rust");
        assert_eq!(ctx.lang(), Language::Rust);
        assert_eq!(ctx.total_lines(), 5);
        let features = ctx.features();
        assert!(features.has_imports);
        assert!(features.has_exports);
        assert!(features.has_functions);
        assert!(!features.has_classes);
        assert!(features.is_code_file);
        assert!(!features.is_structured_file);
        assert_eq!(ctx.metadata().get("origin").map(String::as_str), Some("test"));
    }

    #[test]
    fn language_falls_back_to_extension() {
        assert_eq!(resolve_language("plain", Some("notes.md")), Language::Markdown);
        assert_eq!(resolve_language("python", Some("notes.md")), Language::Python);
    }

    #[test]
    fn structured_by_extension() {
        let features = FileFeatures::detect("key=value", "unknown", Some("app.ini"));
        assert!(features.is_structured_file);
        assert!(!features.is_code_file);
    }

    #[test]
    fn empty_content_builds() {
        let ctx = ProcessingContext::builder()
            .content("")
            .language("text")
            .build()
            .unwrap();
        assert!(ctx.is_blank());
        assert_eq!(ctx.total_lines(), 0);
    }
}
