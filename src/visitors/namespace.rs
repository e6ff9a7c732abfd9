//! Resolve element and attribute prefixes to namespace URIs

use super::{ns, prefix, VisitorContext};
use crate::error::Error;
use crate::parser::{ElementNode, Node};

struct Scope {
    element: String,
    bindings: Vec<(String, String)>,
}

/// Prefix tables for the elements currently open
struct NameTable {
    scopes: Vec<Scope>,
    defaults: Vec<(String, String)>,
}

impl NameTable {
    fn new(context: &VisitorContext) -> Self {
        let mut defaults = Vec::new();
        if let Some(prefix) = &context.settings.prefix {
            defaults.push((prefix.clone(), ns::SPARK.to_string()));
        }
        Self {
            scopes: Vec::new(),
            defaults,
        }
    }

    fn lookup(&self, prefix: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.bindings.iter())
            .chain(self.defaults.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
    }

    fn resolve(&self, name: &str) -> Option<String> {
        prefix(name).and_then(|p| self.lookup(p))
    }

    fn visit_element(&mut self, mut element: ElementNode) -> ElementNode {
        let bindings: Vec<(String, String)> = element
            .attributes
            .iter()
            .filter_map(|a| {
                a.name
                    .strip_prefix("xmlns:")
                    .map(|p| (p.to_string(), a.value()))
            })
            .collect();
        self.scopes.push(Scope {
            element: element.name.clone(),
            bindings,
        });

        element.namespace = self.resolve(&element.name).or(element.namespace);
        for attribute in &mut element.attributes {
            if prefix(&attribute.name) != Some("xmlns") {
                attribute.namespace = self.resolve(&attribute.name).or(attribute.namespace.take());
            }
        }

        if element.is_empty {
            self.scopes.pop();
        }
        element
    }

    fn close(&mut self, name: &str) {
        if self.scopes.last().map(|s| s.element.as_str()) == Some(name) {
            self.scopes.pop();
        }
    }
}

/// Attach namespace URIs to prefixed names using `xmlns:` declarations in
/// scope and the configured prefix
pub fn resolve_namespaces(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    let mut table = NameTable::new(context);
    let resolved = nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(element) => Node::Element(table.visit_element(element)),
            Node::EndElement(mut end) => {
                end.namespace = table.resolve(&end.name).or(end.namespace);
                table.close(&end.name);
                Node::EndElement(end)
            }
            other => other,
        })
        .collect();
    Ok(resolved)
}
