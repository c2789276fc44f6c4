//! Syntax-aware chunk boundaries via tree-sitter (spec.md §4.2 "Syntax-aware").
//!
//! Grounded on the teacher's `server/src/ast.rs`: the same `language_for_ext`
//! table and the same declaration node-kind classification, trimmed down from
//! full symbol extraction (name index, signatures, parent links — used there
//! for `cs find`/`cs search`) to just the top-level/nested declaration line
//! ranges a chunk boundary needs.

use tree_sitter::{Language, Node, Parser};

use crate::chunker::ChunkSpan;

fn language_for_ext(ext: &str) -> Option<Language> {
    match ext {
        "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
        "ts" | "tsx" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "py" | "pyi" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" | "h" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

/// True if `kind` is a node that should become a chunk boundary (function,
/// class, method, struct/enum/trait/impl definitions, top-level statements
/// are left to the caller's statement-boundary subdivision instead).
fn is_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "function_item"
            | "struct_item"
            | "enum_item"
            | "trait_item"
            | "impl_item"
            | "function_declaration"
            | "method_definition"
            | "class_declaration"
            | "function_definition"
            | "class_definition"
            | "method_declaration"
    )
}

fn collect_declarations<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_declaration(child.kind()) {
            out.push(child);
        }
        collect_declarations(child, out);
    }
}

/// Returns `None` when the extension has no registered parser, or parsing
/// fails — both cases send the caller to the character-window fallback
/// (spec.md §4.2: "Used when the syntax parser is unavailable, returns an
/// error, or the extension is not recognized").
pub fn chunk_by_declarations(text: &str, ext: &str) -> Option<Vec<ChunkSpan>> {
    let language = language_for_ext(ext)?;
    let mut parser = Parser::new();
    parser.set_language(&language).ok()?;
    let tree = parser.parse(text, None)?;

    let mut decls = Vec::new();
    collect_declarations(tree.root_node(), &mut decls);
    if decls.is_empty() {
        return None;
    }

    decls.sort_by_key(|n| n.start_byte());

    let mut spans: Vec<ChunkSpan> = Vec::with_capacity(decls.len());
    for decl in decls {
        let start_line = decl.start_position().row + 1;
        let end_line = decl.end_position().row + 1;
        let content = text
            .get(decl.start_byte()..decl.end_byte())
            .unwrap_or_default()
            .to_string();
        if content.trim().is_empty() {
            continue;
        }
        spans.push(ChunkSpan { content, start_line, end_line });
    }

    // Tie-break (spec.md §4.2): when a declaration begins on the line the
    // previous one ends on, shrink the previous chunk's endLine so ranges
    // stay non-overlapping in line space even though byte ranges may touch.
    for i in 1..spans.len() {
        if spans[i].start_line <= spans[i - 1].end_line {
            let new_end = spans[i].start_line.saturating_sub(1).max(spans[i - 1].start_line);
            spans[i - 1].end_line = new_end;
        }
    }

    Some(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_function_spans() {
        let src = "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n";
        let spans = chunk_by_declarations(src, "rs").unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans[0].content.contains("fn a"));
        assert!(spans[1].content.contains("fn b"));
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[1].start_line, 5);
    }

    #[test]
    fn unrecognized_extension_returns_none() {
        assert!(chunk_by_declarations("whatever", "xyz").is_none());
    }
}
