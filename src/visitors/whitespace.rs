//! Keep control tags that stand alone on a line from leaving blank lines

use super::VisitorContext;
use crate::error::Error;
use crate::parser::{Node, TextNode};

/// Length of the `[ \t]*` run at the end of `text`, if a newline precedes it
fn trailing_indent(text: &str) -> Option<usize> {
    let indent = text.len() - text.trim_end_matches([' ', '\t']).len();
    text[..text.len() - indent].ends_with('\n').then_some(indent)
}

/// Length of a leading `[ \t]*\r?\n`
fn leading_break(text: &str) -> Option<usize> {
    let indent = text.len() - text.trim_start_matches([' ', '\t']).len();
    let rest = &text[indent..];
    if rest.starts_with("\r\n") {
        Some(indent + 2)
    } else if rest.starts_with('\n') {
        Some(indent + 1)
    } else {
        None
    }
}

fn text_mut(node: Option<&mut Node>) -> Option<&mut TextNode> {
    match node {
        Some(Node::Text(text)) => Some(text),
        _ => None,
    }
}

/// Trim the indentation before a tag and the line break after it when both
/// are present
fn trim_line(before: Option<&mut TextNode>, after: Option<&mut TextNode>) {
    if let (Some(before), Some(after)) = (before, after) {
        if let (Some(indent), Some(newline)) = (trailing_indent(&before.text), leading_break(&after.text)) {
            let keep = before.text.len() - indent;
            before.text.truncate(keep);
            after.text.drain(..newline);
        }
    }
}

fn clean(mut nodes: Vec<Node>) -> Vec<Node> {
    for index in 0..nodes.len() {
        let (head, rest) = nodes.split_at_mut(index);
        let Some((current, tail)) = rest.split_first_mut() else {
            continue;
        };
        let Node::Special(special) = current else {
            continue;
        };
        special.body = clean(std::mem::take(&mut special.body));

        if special.body.is_empty() {
            trim_line(text_mut(head.last_mut()), text_mut(tail.first_mut()));
        } else {
            // opening tag, then closing tag
            trim_line(text_mut(head.last_mut()), text_mut(special.body.first_mut()));
            trim_line(text_mut(special.body.last_mut()), text_mut(tail.first_mut()));
        }
    }
    nodes.retain(|node| !matches!(node, Node::Text(text) if text.text.is_empty()));
    nodes
}

/// Drop the blank lines left behind by control tags on lines of their own
pub fn omit_blank_lines(nodes: Vec<Node>, context: &VisitorContext) -> Result<Vec<Node>, Error> {
    if !context.settings.omit_blank_lines {
        return Ok(nodes);
    }
    Ok(clean(nodes))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{nodes, show};
    use super::super::pair_special_nodes;
    use super::*;
    use crate::config::Settings;
    use std::sync::Arc;

    fn omit(text: &str) -> String {
        let context = VisitorContext::default();
        let paired = pair_special_nodes(nodes(text), &context).expect("pair");
        show(&omit_blank_lines(paired, &context).expect("omit"))
    }

    #[test]
    fn test_helpers() {
        assert_eq!(trailing_indent("a\n  "), Some(2));
        assert_eq!(trailing_indent("a  "), None);
        assert_eq!(leading_break("  \r\nb"), Some(4));
        assert_eq!(leading_break("b\n"), None);
    }

    #[test]
    fn test_control_lines_removed() {
        assert_eq!(
            omit("<ul>\n  <for each='x in xs'>\n    <li/>\n  </for>\n</ul>"),
            "<ul>\n[for each=x in xs]    <li/>\n[/for]</ul>"
        );
    }

    #[test]
    fn test_inline_tags_untouched() {
        assert_eq!(
            omit("<p>a <if condition='x'>b</if> c</p>"),
            "<p>a [if condition=x]b[/if] c</p>"
        );
    }

    #[test]
    fn test_empty_tag_on_own_line() {
        assert_eq!(
            omit("a\n  <set x='1'/>\nb"),
            "a\n[set x=1][/set]b"
        );
    }

    #[test]
    fn test_disabled() {
        let settings = Settings::default().with_omit_blank_lines(false);
        let context = VisitorContext::new(Arc::new(settings));
        let parsed = nodes("a\n  <set x='1'/>\nb");
        let paired = pair_special_nodes(parsed, &context).expect("pair");
        assert_eq!(
            show(&omit_blank_lines(paired, &context).expect("omit")),
            "a\n  [set x=1][/set]\nb"
        );
    }
}
