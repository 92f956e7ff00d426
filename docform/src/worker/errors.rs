//! Flattening of worker validation messages.
//!
//! Validation failures arrive as nested scopes:
//!
//! ```text
//! doc: (supplier: (name: cannot be blank; tax_id: invalid.); lines: (0: (quantity: must be positive.).).).
//! ```
//!
//! Parentheses open a scope, `; ` separates siblings and `.)` closes a
//! scope. [`format_errors`] turns this into `"supplier > name: cannot be blank"`
//! lines.

const DOC_PREFIX: &str = "doc:";
const PATH_SEPARATOR: &str = " > ";

#[derive(Debug, PartialEq)]
enum Node {
    Message(String),
    Scope(Vec<(String, Node)>),
}

struct Parser<'a> {
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn eat(&mut self, token: &str) -> bool {
        match self.rest.strip_prefix(token) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn scope(&mut self) -> Option<Node> {
        if !self.eat("(") {
            return None;
        }
        let mut entries = Vec::new();
        loop {
            let (key, rest) = self.rest.split_once(": ")?;
            self.rest = rest;
            let value = if self.rest.starts_with('(') {
                self.scope()?
            } else {
                self.message()?
            };
            entries.push((key.trim().to_string(), value));

            if self.eat("; ") {
                continue;
            }
            if self.eat(".)") {
                return Some(Node::Scope(entries));
            }
            return None;
        }
    }

    fn message(&mut self) -> Option<Node> {
        let end = [self.rest.find("; "), self.rest.find(".)")]
            .into_iter()
            .flatten()
            .min()?;
        let (text, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Node::Message(text.to_string()))
    }
}

fn flatten(key: &str, node: &Node, parent: &str, out: &mut Vec<String>) {
    let path = if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}{PATH_SEPARATOR}{key}")
    };
    match node {
        Node::Message(text) => out.push(format!("{path}: {text}")),
        Node::Scope(children) => {
            for (k, n) in children {
                flatten(k, n, &path, out);
            }
        }
    }
}

fn parse(error: &str) -> Option<Vec<String>> {
    let wrapped = format!("({})", error.trim_end());
    let mut parser = Parser { rest: &wrapped };
    let Node::Scope(top) = parser.scope()? else {
        return None;
    };
    if !parser.rest.is_empty() {
        return None;
    }

    let mut out = Vec::new();
    for (key, node) in &top {
        match node {
            Node::Scope(children) if key == "doc" => {
                for (k, n) in children {
                    flatten(k, n, "", &mut out);
                }
            }
            Node::Message(text) if key == "doc" => out.push(text.clone()),
            other => flatten(key, other, "", &mut out),
        }
    }
    Some(out)
}

/// Flatten a worker error message into `"path: message"` lines.
///
/// Messages that do not start with `doc:` are calculation errors and come
/// back as a single entry, as does text that does not follow the grammar.
pub fn format_errors(error: &str) -> Vec<String> {
    if !error.starts_with(DOC_PREFIX) {
        return vec![error.to_string()];
    }
    match parse(error) {
        Some(lines) if !lines.is_empty() => lines,
        _ => {
            warn!("unrecognised validation message: {error}");
            vec![error.to_string()]
        }
    }
}
