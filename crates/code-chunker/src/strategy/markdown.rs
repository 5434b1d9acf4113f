use super::{ensure_non_empty, line_windows, source_chunk, ChunkingStrategy};
use crate::context::ProcessingContext;
use crate::error::StrategyError;
use crate::language::Language;
use crate::types::{Chunk, ChunkType, SourceText};

const NAME: &str = "markdown";

/// One section per heading; fenced code blocks never split a section
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownStrategy;

impl MarkdownStrategy {
    fn heading_title(line: &str) -> Option<&str> {
        let trimmed = line.trim_start();
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
            Some(trimmed[hashes..].trim())
        } else {
            None
        }
    }

    fn is_fence(line: &str) -> bool {
        let trimmed = line.trim_start();
        trimmed.starts_with("```") || trimmed.starts_with("~~~")
    }
}

impl ChunkingStrategy for MarkdownStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn languages(&self) -> &[Language] {
        &[Language::Markdown]
    }

    fn file_patterns(&self) -> &[&str] {
        &["*.md", "*.markdown", "*.mdx"]
    }

    fn can_handle(&self, ctx: &ProcessingContext) -> bool {
        let is_markdown = ctx.lang() == Language::Markdown
            || ctx
                .file_path()
                .is_some_and(|p| p.ends_with(".md") || p.ends_with(".markdown") || p.ends_with(".mdx"));
        is_markdown && !ctx.is_blank()
    }

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError> {
        let source = SourceText::new(ctx.content());
        let chunking = &ctx.config().chunking;

        let mut sections: Vec<(usize, usize, Option<String>)> = Vec::new();
        let mut section_start = 1usize;
        let mut title: Option<String> = None;
        let mut in_fence = false;

        for (idx, line) in source.lines().iter().enumerate() {
            let n = idx + 1;
            if Self::is_fence(line) {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if let Some(heading) = Self::heading_title(line) {
                if n > section_start {
                    sections.push((section_start, n - 1, title.take()));
                }
                section_start = n;
                title = Some(heading.to_string());
            }
        }
        if section_start <= source.len() {
            sections.push((section_start, source.len(), title));
        }

        let mut chunks = Vec::new();
        for (start, end, heading) in sections {
            for (s, e) in line_windows(
                &source,
                start,
                end,
                chunking.max_chunk_size,
                chunking.max_lines_per_chunk,
            ) {
                let mut chunk = source_chunk(ctx, &source, s, e, ChunkType::Generic, NAME);
                chunk.metadata.class_name.clone_from(&heading);
                chunks.push(chunk);
            }
        }

        ensure_non_empty(ctx, &chunks, NAME)?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(content: &str) -> ProcessingContext {
        ProcessingContext::builder()
            .content(content)
            .language("markdown")
            .file_path(Some("README.md".to_string()))
            .build()
            .unwrap()
    }

    #[test]
    fn splits_at_headings() {
        let doc = "intro\n# One\ntext\n## Two\nmore";
        let chunks = MarkdownStrategy.chunk(&ctx(doc)).unwrap();
        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 1), (2, 3), (4, 5)]);
        assert_eq!(chunks[2].metadata.class_name.as_deref(), Some("Two"));
    }

    #[test]
    fn headings_inside_fences_are_ignored() {
        let doc = "# Title\n```sh\n# not a heading\n```\nafter";
        let chunks = MarkdownStrategy.chunk(&ctx(doc)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line(), 5);
    }

    #[test]
    fn hashtags_are_not_headings() {
        assert_eq!(MarkdownStrategy::heading_title("#tag"), None);
        assert_eq!(MarkdownStrategy::heading_title("### Deep "), Some("Deep"));
    }
}
