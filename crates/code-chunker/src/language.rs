use crate::error::{ChunkerError, Result};
use std::path::Path;

/// Known language or file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Swift,
    Kotlin,
    Php,
    Shell,
    Sql,
    Markdown,
    Json,
    Yaml,
    Toml,
    Xml,
    Html,
    Css,
    Scss,
    Less,
    Text,
    Unknown,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "rb" => Language::Ruby,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "php" => Language::Php,
            "sh" | "bash" | "zsh" => Language::Shell,
            "sql" => Language::Sql,
            "md" | "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "xml" => Language::Xml,
            "html" | "htm" => Language::Html,
            "css" => Language::Css,
            "scss" | "sass" => Language::Scss,
            "less" => Language::Less,
            "txt" | "text" | "log" => Language::Text,
            _ => Language::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Resolve a language name as passed by callers ("rust", "ts", "Python", ...)
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "go" | "golang" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" => Language::CSharp,
            "ruby" => Language::Ruby,
            "swift" => Language::Swift,
            "kotlin" => Language::Kotlin,
            "php" => Language::Php,
            "shell" | "bash" => Language::Shell,
            "sql" => Language::Sql,
            "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            "xml" => Language::Xml,
            "html" => Language::Html,
            "css" => Language::Css,
            "scss" => Language::Scss,
            "less" => Language::Less,
            "text" | "plaintext" => Language::Text,
            other => Self::from_extension(other),
        }
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Php => "php",
            Language::Shell => "shell",
            Language::Sql => "sql",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Xml => "xml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Less => "less",
            Language::Text => "text",
            Language::Unknown => "unknown",
        }
    }

    /// Check if this language is supported for AST parsing
    pub fn supports_ast(self) -> bool {
        matches!(
            self,
            Language::Rust | Language::Python | Language::JavaScript | Language::TypeScript
        )
    }

    /// Programming languages, as opposed to markup, data and prose
    pub fn is_code(self) -> bool {
        !matches!(
            self,
            Language::Markdown
                | Language::Json
                | Language::Yaml
                | Language::Toml
                | Language::Xml
                | Language::Html
                | Language::Css
                | Language::Scss
                | Language::Less
                | Language::Text
                | Language::Unknown
        )
    }

    /// Data/config formats
    pub fn is_structured(self) -> bool {
        matches!(
            self,
            Language::Json | Language::Yaml | Language::Toml | Language::Xml
        )
    }

    /// Stylesheets
    pub fn is_style(self) -> bool {
        matches!(self, Language::Css | Language::Scss | Language::Less)
    }

    /// Languages whose blocks are delimited by braces
    pub fn uses_braces(self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::JavaScript
                | Language::TypeScript
                | Language::Go
                | Language::Java
                | Language::C
                | Language::Cpp
                | Language::CSharp
                | Language::Swift
                | Language::Kotlin
                | Language::Php
                | Language::Css
                | Language::Scss
                | Language::Less
                | Language::Json
        )
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Language::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            _ => Err(ChunkerError::unsupported_language(self.as_str())),
        }
    }

    /// Get import/use statement patterns for this language
    pub fn import_patterns(self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["use ", "extern crate "],
            Language::Python => &["import ", "from "],
            Language::JavaScript | Language::TypeScript => &["import ", "require("],
            Language::Go | Language::Java | Language::Swift | Language::Kotlin => &["import "],
            Language::CSharp => &["using "],
            Language::Ruby => &["require ", "include "],
            Language::Php => &["use ", "require ", "include "],
            Language::C | Language::Cpp => &["#include "],
            Language::Shell => &["source "],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("RS"), Language::Rust);
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("md"), Language::Markdown);
        assert_eq!(Language::from_extension("unknown"), Language::Unknown);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("test.rs"), Language::Rust);
        assert_eq!(Language::from_path("src/main.py"), Language::Python);
        assert_eq!(Language::from_path("index.ts"), Language::TypeScript);
        assert_eq!(Language::from_path("no_extension"), Language::Unknown);
    }

    #[test]
    fn test_from_name_accepts_aliases() {
        assert_eq!(Language::from_name("Rust"), Language::Rust);
        assert_eq!(Language::from_name("ts"), Language::TypeScript);
        assert_eq!(Language::from_name("c++"), Language::Cpp);
        assert_eq!(Language::from_name(" text "), Language::Text);
    }

    #[test]
    fn test_supports_ast() {
        assert!(Language::Rust.supports_ast());
        assert!(Language::TypeScript.supports_ast());
        assert!(!Language::Go.supports_ast());
        assert!(!Language::Unknown.supports_ast());
    }

    #[test]
    fn test_file_classes() {
        assert!(Language::Go.is_code());
        assert!(!Language::Markdown.is_code());
        assert!(Language::Yaml.is_structured());
        assert!(Language::Scss.is_style());
        assert!(Language::Java.uses_braces());
        assert!(!Language::Python.uses_braces());
    }

    #[test]
    fn test_tree_sitter_language() {
        assert!(Language::Rust.tree_sitter_language().is_ok());
        assert!(Language::Python.tree_sitter_language().is_ok());
        assert!(Language::Go.tree_sitter_language().is_err());
    }

    #[test]
    fn test_import_patterns() {
        assert!(Language::Rust.import_patterns().contains(&"use "));
        assert!(Language::Python.import_patterns().contains(&"import "));
        assert!(Language::Markdown.import_patterns().is_empty());
    }
}
