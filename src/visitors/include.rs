//! `<include href="..."/>`: splice another file of the view folder

use std::collections::VecDeque;

use tracing::debug;

use super::{local_name, ns, resolve_namespaces, take_closed_body, VisitorContext};
use crate::config::NamespacesType;
use crate::error::{CompilerError, Error};
use crate::folder::{normalize_path, parent_folder};
use crate::parser::{parse_nodes, ElementNode, Node, SourceContext, TextNode};

fn is_xinclude(context: &VisitorContext, name: &str, namespace: Option<&str>, wanted: &str) -> bool {
    match context.namespaces {
        NamespacesType::Unqualified => name == wanted,
        NamespacesType::Qualified => namespace == Some(ns::XINCLUDE) && local_name(name) == wanted,
    }
}

/// Resolve `href` against the folder of the including file, folding `..`
fn resolve_href(current: &str, href: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let joined = if href.starts_with('/') {
        href.to_string()
    } else {
        format!("{}/{}", parent_folder(current), href)
    };
    let normalized = normalize_path(&joined);
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

struct Includer<'c> {
    context: &'c VisitorContext,
    active: Vec<String>,
}

impl Includer<'_> {
    fn expand(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, Error> {
        let mut queue: VecDeque<Node> = nodes.into();
        let mut output = Vec::with_capacity(queue.len());

        while let Some(node) = queue.pop_front() {
            match node {
                Node::Element(element) if self.is(&element.name, element.namespace.as_deref(), "include") => {
                    let body = if element.is_empty {
                        Vec::new()
                    } else {
                        take_closed_body(&element, &mut queue)?
                    };
                    let fallback = self.fallback(body)?;
                    output.extend(self.include(&element, fallback)?);
                }
                Node::EndElement(end)
                    if self.is(&end.name, end.namespace.as_deref(), "include")
                        || self.is(&end.name, end.namespace.as_deref(), "fallback") =>
                {
                    return Err(CompilerError::UnexpectedEndElement {
                        name: end.name,
                        position: end.position,
                    }
                    .into());
                }
                other => output.push(other),
            }
        }
        Ok(output)
    }

    fn is(&self, name: &str, namespace: Option<&str>, wanted: &str) -> bool {
        is_xinclude(self.context, name, namespace, wanted)
    }

    /// The content of the `<fallback>` child of an include, if any
    fn fallback(&self, body: Vec<Node>) -> Result<Option<Vec<Node>>, Error> {
        let mut queue: VecDeque<Node> = body.into();
        while let Some(node) = queue.pop_front() {
            if let Node::Element(element) = node {
                if self.is(&element.name, element.namespace.as_deref(), "fallback") {
                    if element.is_empty {
                        return Ok(Some(Vec::new()));
                    }
                    return Ok(Some(take_closed_body(&element, &mut queue)?));
                }
            }
        }
        Ok(None)
    }

    fn include(&mut self, element: &ElementNode, fallback: Option<Vec<Node>>) -> Result<Vec<Node>, Error> {
        let href = element
            .attribute_value("href")
            .ok_or_else(|| CompilerError::MissingAttribute {
                element: element.name.clone(),
                attribute: "href".to_string(),
                position: element.position.clone(),
            })?;
        let include_error = |message: &str| CompilerError::Include {
            href: href.clone(),
            message: message.to_string(),
            position: element.position.clone(),
        };

        let current = self.active.last().cloned().unwrap_or_default();
        let path = resolve_href(&current, &href);
        if self.active.contains(&path) {
            return Err(include_error("file includes itself").into());
        }

        let folder = match &self.context.view_folder {
            Some(folder) if folder.has_view(&path) => folder.clone(),
            _ => {
                return match fallback {
                    Some(nodes) => {
                        debug!(path = %path, "include missing, using fallback");
                        self.expand(nodes)
                    }
                    None => Err(include_error("file not found").into()),
                }
            }
        };

        debug!(path = %path, from = %current, "including file");
        let source = folder.open_view(&path)?;
        let last_modified = source.last_modified;
        let text = source.read_to_string(&path)?;

        if element.attribute_value("parse").as_deref() == Some("text") {
            return Ok(vec![Node::Text(TextNode::new(text))]);
        }

        let source = SourceContext::with_file(text, path.clone(), last_modified);
        let nodes = resolve_namespaces(parse_nodes(&source)?, self.context)?;
        self.active.push(path);
        let expanded = self.expand(nodes);
        self.active.pop();
        expanded
    }
}

/// Replace include elements with the nodes of the files they name
pub fn expand_includes(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    let mut includer = Includer {
        context,
        active: vec![normalize_path(&context.view_path)],
    };
    includer.expand(nodes)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{nodes, show};
    use super::*;
    use crate::folder::InMemoryViewFolder;
    use std::sync::Arc;

    fn context(folder: InMemoryViewFolder) -> VisitorContext {
        VisitorContext::default()
            .with_view_path("home/index.spark")
            .with_view_folder(Arc::new(folder))
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("home/index.spark", "part.html"), "home/part.html");
        assert_eq!(resolve_href("home/index.spark", "../Shared/a.html"), "Shared/a.html");
        assert_eq!(resolve_href("index.spark", "a.html"), "a.html");
    }

    #[test]
    fn test_include_markup() {
        let context = context(InMemoryViewFolder::new().with_view("home/part.html", "<b>${x}</b>"));
        let result = expand_includes(nodes("a<include href='part.html'/>c"), &context).expect("include");
        assert_eq!(show(&result), "a<b>${x}</b>c");
    }

    #[test]
    fn test_include_text() {
        let context = context(InMemoryViewFolder::new().with_view("home/raw.txt", "<not parsed"));
        let result = expand_includes(nodes("<include href='raw.txt' parse='text'/>"), &context)
            .expect("include");
        assert_eq!(show(&result), "<not parsed");
    }

    #[test]
    fn test_fallback_used_when_missing() {
        let context = context(InMemoryViewFolder::new());
        let result = expand_includes(
            nodes("<include href='gone.html'><fallback>none</fallback></include>"),
            &context,
        )
        .expect("include");
        assert_eq!(show(&result), "none");
    }

    #[test]
    fn test_missing_without_fallback_fails() {
        let context = context(InMemoryViewFolder::new());
        let result = expand_includes(nodes("<include href='gone.html'/>"), &context);
        assert!(matches!(result, Err(Error::Compiler(CompilerError::Include { .. }))));
    }

    #[test]
    fn test_recursive_include_fails() {
        let context = context(
            InMemoryViewFolder::new()
                .with_view("home/a.html", "<include href='b.html'/>")
                .with_view("home/b.html", "<include href='a.html'/>"),
        );
        let result = expand_includes(nodes("<include href='a.html'/>"), &context);
        assert!(matches!(result, Err(Error::Compiler(CompilerError::Include { .. }))));
    }

    #[test]
    fn test_stray_end_fails() {
        let result = expand_includes(nodes("a</include>"), &VisitorContext::default());
        assert!(matches!(
            result,
            Err(Error::Compiler(CompilerError::UnexpectedEndElement { .. }))
        ));
    }
}
