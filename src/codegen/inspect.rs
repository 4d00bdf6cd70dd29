//! codegen/inspect.rs
//!
//! Static look at candidate source. Diagnostics only: whether a candidate
//! works is decided by running it.

use std::cell::RefCell;

use tree_sitter::{Node, Parser};

thread_local! {
    static PY_PARSER: RefCell<Option<Parser>> = RefCell::new(make_python_parser());
}

fn make_python_parser() -> Option<Parser> {
    let mut p = Parser::new();
    p.set_language(&tree_sitter_python::language()).ok()?;
    Some(p)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    /// Top-level `def` names in source order (decorated ones included).
    pub functions: Vec<String>,
    pub has_syntax_error: bool,
}

pub fn inspect(source: &str) -> Inspection {
    let tree = PY_PARSER.with(|p| {
        p.borrow_mut()
            .as_mut()
            .and_then(|parser| parser.parse(source, None))
    });

    let Some(tree) = tree else {
        return Inspection::default();
    };

    let root = tree.root_node();
    let mut functions = Vec::new();
    let mut cursor = root.walk();

    for child in root.named_children(&mut cursor) {
        if let Some(name) = function_name(child, source) {
            functions.push(name);
        }
    }

    Inspection {
        functions,
        has_syntax_error: root.has_error(),
    }
}

fn function_name(node: Node, source: &str) -> Option<String> {
    let def = match node.kind() {
        "function_definition" => node,
        "decorated_definition" => node.child_by_field_name("definition")?,
        _ => return None,
    };

    if def.kind() != "function_definition" {
        return None;
    }

    def.child_by_field_name("name")?
        .utf8_text(source.as_bytes())
        .ok()
        .map(str::to_owned)
}
