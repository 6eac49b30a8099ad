//! Location-path resolution over the element tree.
//!
//! Supports the restricted grammar used by extraction specs: an optional
//! leading `.//` (search all descendants), `/`-separated child steps with
//! optional `prefix:` qualifiers, a trailing `@attr` or `text()` step,
//! and a 1-indexed positional predicate `[N]` on element steps.
//!
//! Resolution never fails on missing data: a path that matches nothing
//! returns an empty sequence. Only syntactically invalid expressions are
//! errors, and those are a spec problem.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{ConvertError, ConvertResult};
use crate::xml_tree::Element;

/// Prefix -> namespace URI.
pub type Namespaces = HashMap<String, String>;

lazy_static! {
    // Trailing positional predicate, e.g. "title[1]"
    static ref RE_PREDICATE: Regex = Regex::new(r"^(.*?)\[(\d+)\]$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name { prefix: Option<String>, local: String },
    Attribute(String),
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    position: Option<usize>,
}

/// A parsed path expression, ready to evaluate against any context
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    steps: Vec<Step>,
}

impl LocationPath {
    pub fn parse(expr: &str) -> ConvertResult<Self> {
        let malformed =
            |why: &str| ConvertError::MalformedSpec(format!("path '{}': {}", expr, why));

        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty expression"));
        }

        let (rest, leading_axis) = if let Some(r) = trimmed.strip_prefix(".//") {
            (r, Axis::Descendant)
        } else if let Some(r) = trimmed.strip_prefix("//") {
            (r, Axis::Descendant)
        } else if let Some(r) = trimmed.strip_prefix("./") {
            (r, Axis::Child)
        } else {
            (trimmed, Axis::Child)
        };

        let mut steps = Vec::new();
        let mut next_axis = leading_axis;

        for raw in rest.split('/') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(malformed("empty step"));
            }
            // A self step keeps the node set as-is.
            if raw == "." {
                continue;
            }

            let step = if let Some(attr) = raw.strip_prefix('@') {
                if attr.is_empty() || attr.contains(['[', ']']) {
                    return Err(malformed("invalid attribute step"));
                }
                Step {
                    axis: next_axis,
                    test: NodeTest::Attribute(attr.to_string()),
                    position: None,
                }
            } else if raw == "text()" {
                Step { axis: next_axis, test: NodeTest::Text, position: None }
            } else {
                let (name, position) = match RE_PREDICATE.captures(raw) {
                    Some(caps) => {
                        let n: usize = caps[2]
                            .parse()
                            .map_err(|_| malformed("predicate index out of range"))?;
                        if n == 0 {
                            return Err(malformed("predicates are 1-indexed"));
                        }
                        (caps[1].to_string(), Some(n))
                    }
                    None => (raw.to_string(), None),
                };
                if name.is_empty() || name.contains(['[', ']', '@']) {
                    return Err(malformed("unrecognized step"));
                }
                let (prefix, local) = match name.split_once(':') {
                    Some((p, l)) => (Some(p.to_string()), l.to_string()),
                    None => (None, name),
                };
                if local.is_empty() {
                    return Err(malformed("empty element name"));
                }
                Step {
                    axis: next_axis,
                    test: NodeTest::Name { prefix, local },
                    position,
                }
            };

            next_axis = Axis::Child;
            steps.push(step);
        }

        if steps.is_empty() {
            return Err(malformed("no steps"));
        }
        // @attr and text() select values, so nothing can follow them.
        for step in &steps[..steps.len() - 1] {
            if !matches!(step.test, NodeTest::Name { .. }) {
                return Err(malformed("attribute or text() step must be last"));
            }
        }

        Ok(LocationPath { steps })
    }

    /// Evaluate against a context element. Each match is an attribute
    /// value or an element's concatenated, edge-trimmed text.
    pub fn resolve(&self, context: &Element, namespaces: &Namespaces) -> Vec<String> {
        let mut nodes: Vec<&Element> = vec![context];

        for step in &self.steps {
            match &step.test {
                NodeTest::Name { prefix, local } => {
                    let mut matched: Vec<&Element> = Vec::new();
                    for node in &nodes {
                        match step.axis {
                            Axis::Child => matched.extend(
                                node.children()
                                    .filter(|c| name_matches(c, prefix.as_deref(), local, namespaces)),
                            ),
                            Axis::Descendant => matched.extend(
                                node.descendants()
                                    .into_iter()
                                    .filter(|c| name_matches(c, prefix.as_deref(), local, namespaces)),
                            ),
                        }
                    }
                    if let Some(n) = step.position {
                        matched = match matched.get(n - 1) {
                            Some(el) => vec![el],
                            None => Vec::new(),
                        };
                    }
                    nodes = matched;
                }
                // Terminal steps; guaranteed last by parse().
                NodeTest::Attribute(name) => {
                    return nodes
                        .iter()
                        .filter_map(|el| el.attribute(name))
                        .map(str::to_string)
                        .collect();
                }
                NodeTest::Text => {
                    return nodes.iter().map(|el| el.itertext()).collect();
                }
            }
        }

        nodes.iter().map(|el| el.itertext()).collect()
    }
}

fn name_matches(el: &Element, prefix: Option<&str>, local: &str, namespaces: &Namespaces) -> bool {
    if el.tag != local {
        return false;
    }
    match prefix.and_then(|p| namespaces.get(p)) {
        // A prefix with a known binding requires the fully qualified name.
        Some(uri) => el.namespace.as_deref() == Some(uri.as_str()),
        // No prefix, or no mapping supplied: match by local name only.
        None => true,
    }
}

/// Parse and resolve in one call.
pub fn resolve(context: &Element, expr: &str, namespaces: &Namespaces) -> ConvertResult<Vec<String>> {
    Ok(LocationPath::parse(expr)?.resolve(context, namespaces))
}
