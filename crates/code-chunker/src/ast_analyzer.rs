use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::syntax::{LineSpan, NodeKind, SyntaxBackend, SyntaxNode, SyntaxTree};
use tree_sitter::{Node, Parser, Tree};

/// Parsed tree together with the text it was parsed from, so node names can
/// be resolved without the caller passing the content again
struct ParsedSource {
    tree: Tree,
    source: String,
}

/// Tree-sitter implementation of [`SyntaxBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterBackend;

impl TreeSitterBackend {
    pub fn new() -> Self {
        Self
    }

    fn parser_for(language: Language) -> Result<Parser> {
        let ts_language = language.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;
        Ok(parser)
    }

    /// Every declaration in the tree, in source order
    fn declarations(tree: &SyntaxTree) -> Vec<SyntaxNode> {
        let Some(parsed) = tree.downcast_ref::<ParsedSource>() else {
            log::warn!("Syntax tree was not produced by the tree-sitter backend");
            return Vec::new();
        };

        let src = parsed.source.as_str();
        let root = parsed.tree.root_node();
        let mut out = Vec::new();
        match tree.language() {
            Language::Rust => Self::walk_rust(src, root, &mut out),
            Language::Python => Self::walk_python(src, root, &mut out),
            Language::JavaScript | Language::TypeScript => Self::walk_js(src, root, &mut out),
            _ => {}
        }
        out.sort_by_key(|n| (n.start_byte, std::cmp::Reverse(n.end_byte)));
        out
    }

    fn walk_rust(src: &str, node: Node, out: &mut Vec<SyntaxNode>) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();

        for child in children {
            match child.kind() {
                "function_item" => out.push(Self::to_node(src, child, NodeKind::Function, None)),
                "struct_item" | "enum_item" | "union_item" => {
                    out.push(Self::to_node(src, child, NodeKind::Class, None));
                }
                "trait_item" => out.push(Self::to_node(src, child, NodeKind::Interface, None)),
                "impl_item" => {
                    let target = Self::extract_impl_target(src, child);
                    let mut impl_node = Self::to_node(src, child, NodeKind::Class, None);
                    impl_node.name.clone_from(&target);
                    out.push(impl_node);
                    Self::rust_impl_methods(src, child, target.as_deref(), out);
                }
                // Declarations nested in inline modules are chunked like top-level ones
                "mod_item" => {
                    let mut mod_cursor = child.walk();
                    for body in child.children(&mut mod_cursor) {
                        if body.kind() == "declaration_list" {
                            Self::walk_rust(src, body, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn rust_impl_methods(src: &str, impl_node: Node, target: Option<&str>, out: &mut Vec<SyntaxNode>) {
        let mut cursor = impl_node.walk();
        for child in impl_node.children(&mut cursor) {
            if child.kind() != "declaration_list" {
                continue;
            }
            let mut decl_cursor = child.walk();
            for method in child.children(&mut decl_cursor) {
                if method.kind() == "function_item" {
                    out.push(Self::to_node(
                        src,
                        method,
                        NodeKind::Method,
                        target.map(str::to_string),
                    ));
                }
            }
        }
    }

    /// Name of the type an impl block targets (`impl<T> Foo<T>` -> `Foo`)
    fn extract_impl_target(src: &str, impl_node: Node) -> Option<String> {
        let type_node = impl_node.child_by_field_name("type")?;
        match type_node.kind() {
            "type_identifier" => Some(Self::text(src, type_node).to_string()),
            "generic_type" | "scoped_type_identifier" => {
                let mut cursor = type_node.walk();
                let found = type_node
                    .children(&mut cursor)
                    .filter(|c| c.kind() == "type_identifier")
                    .last()
                    .map(|c| Self::text(src, c).to_string());
                found
            }
            _ => Some(Self::text(src, type_node).to_string()),
        }
    }

    fn walk_python(src: &str, node: Node, out: &mut Vec<SyntaxNode>) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();

        for child in children {
            // Decorators belong to the declaration span
            let (outer, inner) = if child.kind() == "decorated_definition" {
                match child.child_by_field_name("definition") {
                    Some(def) => (child, def),
                    None => continue,
                }
            } else {
                (child, child)
            };

            match inner.kind() {
                "function_definition" => {
                    let mut n = Self::to_node(src, outer, NodeKind::Function, None);
                    n.name = Self::extract_symbol_name(src, inner);
                    out.push(n);
                }
                "class_definition" => {
                    let class_name = Self::extract_symbol_name(src, inner);
                    let mut n = Self::to_node(src, outer, NodeKind::Class, None);
                    n.name.clone_from(&class_name);
                    out.push(n);
                    Self::python_class_methods(src, inner, class_name.as_deref(), out);
                }
                _ => {}
            }
        }
    }

    fn python_class_methods(src: &str, class_node: Node, class_name: Option<&str>, out: &mut Vec<SyntaxNode>) {
        let Some(body) = class_node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            let inner = if member.kind() == "decorated_definition" {
                member.child_by_field_name("definition")
            } else {
                Some(member)
            };
            if let Some(def) = inner.filter(|d| d.kind() == "function_definition") {
                let mut n = Self::to_node(src, member, NodeKind::Method, class_name.map(str::to_string));
                n.name = Self::extract_symbol_name(src, def);
                out.push(n);
            }
        }
    }

    fn walk_js(src: &str, node: Node, out: &mut Vec<SyntaxNode>) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();

        for child in children {
            match child.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    out.push(Self::to_node(src, child, NodeKind::Function, None));
                }
                "class_declaration" | "abstract_class_declaration" => {
                    let class_node = Self::to_node(src, child, NodeKind::Class, None);
                    let class_name = class_node.name.clone();
                    out.push(class_node);
                    Self::js_class_methods(src, child, class_name.as_deref(), out);
                }
                "interface_declaration" => {
                    out.push(Self::to_node(src, child, NodeKind::Interface, None));
                }
                // `const handler = async (req) => { ... }`
                "lexical_declaration" | "variable_declaration" => {
                    let mut decl_cursor = child.walk();
                    for declarator in child.children(&mut decl_cursor) {
                        let is_arrow = declarator
                            .child_by_field_name("value")
                            .is_some_and(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"));
                        if declarator.kind() == "variable_declarator" && is_arrow {
                            let mut n = Self::to_node(src, child, NodeKind::Function, None);
                            n.name = declarator
                                .child_by_field_name("name")
                                .map(|name| Self::text(src, name).to_string());
                            out.push(n);
                            break;
                        }
                    }
                }
                "export_statement" => Self::walk_js(src, child, out),
                _ => {}
            }
        }
    }

    fn js_class_methods(src: &str, class_node: Node, class_name: Option<&str>, out: &mut Vec<SyntaxNode>) {
        let Some(body) = class_node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            if member.kind() == "method_definition" {
                out.push(Self::to_node(
                    src,
                    member,
                    NodeKind::Method,
                    class_name.map(str::to_string),
                ));
            }
        }
    }

    fn to_node(src: &str, node: Node, kind: NodeKind, parent: Option<String>) -> SyntaxNode {
        let start = node.start_position();
        let end = node.end_position();
        // A node that swallows its trailing newline ends at column 0 of the next row
        let end_row = if end.column == 0 && end.row > start.row {
            end.row - 1
        } else {
            end.row
        };

        SyntaxNode {
            kind,
            name: Self::extract_symbol_name(src, node),
            parent,
            span: LineSpan::new(start.row + 1, end_row + 1),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
        }
    }

    /// Extract symbol name from AST node
    fn extract_symbol_name(src: &str, node: Node) -> Option<String> {
        if let Some(name) = node.child_by_field_name("name") {
            return Some(Self::text(src, name).to_string());
        }
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .find(|child| {
                matches!(
                    child.kind(),
                    "identifier" | "name" | "type_identifier" | "field_identifier" | "property_identifier"
                )
            })
            .map(|child| Self::text(src, child).to_string());
        found
    }

    fn text<'s>(src: &'s str, node: Node) -> &'s str {
        src.get(node.start_byte()..node.end_byte()).unwrap_or("")
    }

    /// Bytes covered by error nodes, outermost only
    fn error_bytes(root: Node) -> usize {
        let mut total = 0;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_error() {
                total += node.end_byte().saturating_sub(node.start_byte());
                continue;
            }
            if !node.has_error() {
                continue;
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
        total
    }
}

impl SyntaxBackend for TreeSitterBackend {
    fn name(&self) -> &str {
        "tree-sitter"
    }

    fn supports(&self, language: Language) -> bool {
        language.supports_ast()
    }

    fn parse(&self, content: &str, language: Language) -> Result<SyntaxTree> {
        if !self.supports(language) {
            return Err(ChunkerError::unsupported_language(language.as_str()));
        }

        let mut parser = Self::parser_for(language)?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::parse("Failed to parse source code"))?;

        let broken = Self::error_bytes(tree.root_node());
        if broken * 2 > content.len() {
            return Err(ChunkerError::parse(format!(
                "{broken} of {} bytes are unparseable {} source",
                content.len(),
                language.as_str()
            )));
        }

        Ok(SyntaxTree::new(
            language,
            ParsedSource {
                tree,
                source: content.to_string(),
            },
        ))
    }

    fn extract_functions(&self, tree: &SyntaxTree) -> Vec<SyntaxNode> {
        Self::declarations(tree)
            .into_iter()
            .filter(|n| matches!(n.kind, NodeKind::Function | NodeKind::Method))
            .collect()
    }

    fn extract_classes(&self, tree: &SyntaxTree) -> Vec<SyntaxNode> {
        Self::declarations(tree)
            .into_iter()
            .filter(|n| matches!(n.kind, NodeKind::Class | NodeKind::Interface))
            .collect()
    }
}
