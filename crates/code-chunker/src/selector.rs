use crate::context::ProcessingContext;
use crate::error::{ChunkerError, Result};
use crate::strategy::{ChunkingStrategy, StrategyRegistry, LINE_STRATEGY};
use serde::Serialize;
use std::sync::Arc;

/// Which rule of the decision chain picked the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStep {
    FileType,
    Default,
    Language,
    Priority,
    LineFallback,
    Emergency,
}

#[derive(Clone)]
pub struct Selection {
    pub strategy: Arc<dyn ChunkingStrategy>,
    pub step: SelectionStep,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("strategy", &self.strategy.name())
            .field("step", &self.step)
            .finish()
    }
}

/// Deterministic strategy choice for a context.
///
/// Rules are tried in order: file type, configured default, language list by
/// priority, every strategy by priority, the line strategy, then any
/// registered strategy. Priority ties keep registration order.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    registry: Arc<StrategyRegistry>,
}

impl StrategySelector {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn select(&self, ctx: &ProcessingContext) -> Result<Selection> {
        if self.registry.is_empty() {
            return Err(ChunkerError::NoStrategyAvailable);
        }

        let pick = |strategy: Arc<dyn ChunkingStrategy>, step| Selection { strategy, step };

        if let Some(strategy) = ctx
            .file_path()
            .and_then(|path| self.registry.for_path(path))
            .filter(|s| s.can_handle(ctx))
        {
            return Ok(pick(strategy, SelectionStep::FileType));
        }

        if let Some(strategy) = ctx
            .config()
            .chunking
            .default_strategy
            .as_deref()
            .and_then(|name| self.registry.get(name))
            .filter(|s| s.can_handle(ctx))
        {
            return Ok(pick(strategy, SelectionStep::Default));
        }

        let language_list = self.registry.for_language(ctx.lang());
        if let Some(strategy) = first_usable(ctx, language_list) {
            return Ok(pick(strategy, SelectionStep::Language));
        }

        let all: Vec<_> = self.registry.iter().cloned().collect();
        if let Some(strategy) = first_usable(ctx, all) {
            return Ok(pick(strategy, SelectionStep::Priority));
        }

        if let Some(strategy) = self.registry.get(LINE_STRATEGY) {
            return Ok(pick(strategy, SelectionStep::LineFallback));
        }

        log::warn!(
            "No strategy accepts {}; using emergency choice",
            ctx.file_path().unwrap_or("<inline>")
        );
        self.registry
            .iter()
            .next()
            .cloned()
            .map(|strategy| pick(strategy, SelectionStep::Emergency))
            .ok_or(ChunkerError::NoStrategyAvailable)
    }
}

fn first_usable(
    ctx: &ProcessingContext,
    mut candidates: Vec<Arc<dyn ChunkingStrategy>>,
) -> Option<Arc<dyn ChunkingStrategy>> {
    let config = ctx.config();
    // Stable sort keeps registration order on ties
    candidates.sort_by_key(|s| config.strategy_priority(s.name()));
    candidates.into_iter().find(|s| s.can_handle(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_analyzer::TreeSitterBackend;
    use crate::cache::AuxiliaryCaches;
    use crate::config::ProcessingConfig;
    use crate::error::StrategyError;
    use crate::strategy::default_registry;
    use crate::types::Chunk;

    struct Picky(&'static str);

    impl ChunkingStrategy for Picky {
        fn name(&self) -> &str {
            self.0
        }
        fn can_handle(&self, _ctx: &ProcessingContext) -> bool {
            false
        }
        fn chunk(&self, _ctx: &ProcessingContext) -> std::result::Result<Vec<Chunk>, StrategyError> {
            Err(StrategyError::CannotHandle)
        }
    }

    fn selector() -> StrategySelector {
        let registry = default_registry(Arc::new(TreeSitterBackend::new()), AuxiliaryCaches::default().trees);
        StrategySelector::new(Arc::new(registry))
    }

    fn ctx(content: &str, language: &str, path: Option<&str>, config: ProcessingConfig) -> ProcessingContext {
        ProcessingContext::builder()
            .content(content)
            .language(language)
            .file_path(path.map(str::to_string))
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    fn chosen(selector: &StrategySelector, ctx: &ProcessingContext) -> (String, SelectionStep) {
        let selection = selector.select(ctx).unwrap();
        (selection.strategy.name().to_string(), selection.step)
    }

    #[test]
    fn file_type_wins() {
        let c = ctx("# Title\ntext", "text", Some("docs/intro.md"), ProcessingConfig::default());
        assert_eq!(chosen(&selector(), &c), ("markdown".into(), SelectionStep::FileType));
    }

    #[test]
    fn default_strategy_before_language() {
        let mut config = ProcessingConfig::default();
        config.chunking.default_strategy = Some("bracket".into());
        let c = ctx("fn main() {}", "rust", Some("main.rs"), config);
        assert_eq!(chosen(&selector(), &c), ("bracket".into(), SelectionStep::Default));
    }

    #[test]
    fn language_list_by_priority() {
        let c = ctx("fn main() {}", "rust", Some("main.rs"), ProcessingConfig::default());
        assert_eq!(chosen(&selector(), &c), ("ast".into(), SelectionStep::Language));

        let mut config = ProcessingConfig::default();
        config.chunking.strategy_priorities.insert("bracket".into(), 0);
        let c = ctx("fn main() {}", "rust", Some("main.rs"), config);
        assert_eq!(chosen(&selector(), &c), ("bracket".into(), SelectionStep::Language));
    }

    #[test]
    fn unknown_language_uses_global_priority() {
        let c = ctx("some words", "klingon", None, ProcessingConfig::default());
        assert_eq!(chosen(&selector(), &c), ("semantic".into(), SelectionStep::Priority));
    }

    #[test]
    fn line_then_emergency() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Picky("first")));
        registry.register(Arc::new(Picky(LINE_STRATEGY)));
        let selector = StrategySelector::new(Arc::new(registry));
        let c = ctx("x", "text", None, ProcessingConfig::default());
        assert_eq!(chosen(&selector, &c), ("line".into(), SelectionStep::LineFallback));

        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Picky("only")));
        let selector = StrategySelector::new(Arc::new(registry));
        assert_eq!(chosen(&selector, &c), ("only".into(), SelectionStep::Emergency));
    }

    #[test]
    fn empty_registry_fails() {
        let selector = StrategySelector::new(Arc::new(StrategyRegistry::new()));
        let c = ctx("x", "text", None, ProcessingConfig::default());
        assert!(matches!(selector.select(&c), Err(ChunkerError::NoStrategyAvailable)));
    }
}
