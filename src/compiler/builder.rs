//! Chunk builder: lowered nodes to chunks

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;

use super::chunk::*;
use super::unarmor_code;
use crate::bindings::string_code;
use crate::error::{CompilerError, Error};
use crate::parser::{
    is_void_element, AttributeNode, DoctypeNode, ElementNode, ExternalId, Node, Position, SpecialNode,
};
use crate::visitors::{local_name, take_closed_body, VisitorContext};

/// Finds the compiled file behind a partial name such as `_menu`
pub trait PartialResolver {
    fn resolve_partial(&self, name: &str) -> Result<Arc<FileContext>, Error>;
}

/// Turns one file's lowered nodes into chunks
pub struct ChunkBuilder<'a> {
    context: &'a VisitorContext,
    resolver: Option<&'a dyn PartialResolver>,
    cache_sites: usize,
}

/// Build chunks for nodes that need no partial resolution
pub fn build_chunks(nodes: &[Node], context: &VisitorContext) -> Result<Vec<Chunk>, Error> {
    ChunkBuilder::new(context).build(nodes)
}

fn attribute_value(element: &ElementNode, name: &str) -> Option<String> {
    element.attribute_value(name).map(|v| unarmor_code(&v))
}

fn required(element: &ElementNode, name: &str) -> Result<String, CompilerError> {
    attribute_value(element, name).ok_or_else(|| CompilerError::MissingAttribute {
        element: element.name.clone(),
        attribute: name.to_string(),
        position: element.position.clone(),
    })
}

/// Attributes other than the named ones, as (name, code) pairs
/// `if="x"` or `condition="x"`
fn condition(element: &ElementNode) -> Result<String, CompilerError> {
    match attribute_value(element, "if") {
        Some(condition) => Ok(condition),
        None => required(element, "condition"),
    }
}

fn other_attributes<'e>(
    element: &'e ElementNode,
    taken: &'e [&str],
) -> impl Iterator<Item = (String, String)> + 'e {
    element
        .attributes
        .iter()
        .filter(move |a| !taken.contains(&local_name(&a.name)))
        .map(|a| (a.name.clone(), unarmor_code(&a.value())))
}

fn is_whitespace_literal(chunk: Option<&Chunk>) -> bool {
    matches!(chunk, Some(Chunk::SendLiteral(literal)) if literal.text.trim().is_empty())
}

fn doctype_literal(doctype: &DoctypeNode) -> String {
    let quote = |id: &str| if id.contains('"') { '\'' } else { '"' };
    match &doctype.external_id {
        None => format!("<!DOCTYPE {}>", doctype.name),
        Some(ExternalId::System { system_id }) => {
            let q = quote(system_id);
            format!("<!DOCTYPE {} SYSTEM {}{}{}>", doctype.name, q, system_id, q)
        }
        Some(ExternalId::Public { public_id, system_id }) => {
            let p = quote(public_id);
            let s = quote(system_id);
            format!(
                "<!DOCTYPE {} PUBLIC {}{}{} {}{}{}>",
                doctype.name, p, public_id, p, s, system_id, s
            )
        }
    }
}

/// Output target of the builder: a chunk list with literal coalescing
#[derive(Default)]
struct Chunks(Vec<Chunk>);

impl Chunks {
    fn literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Chunk::SendLiteral(last)) = self.0.last_mut() {
            last.text.push_str(text);
        } else {
            self.0.push(Chunk::literal(text));
        }
    }

    fn push(&mut self, chunk: Chunk) {
        self.0.push(chunk);
    }

    /// Push, dropping a whitespace-only literal just before `chunk`
    fn push_killing_whitespace(&mut self, chunk: Chunk) {
        if is_whitespace_literal(self.0.last()) {
            self.0.pop();
        }
        self.0.push(chunk);
    }

    /// Insert ahead of a trailing literal so declarations come first
    fn push_unordered(&mut self, chunk: Chunk) {
        match self.0.last() {
            Some(Chunk::SendLiteral(_)) => {
                let index = self.0.len() - 1;
                self.0.insert(index, chunk);
            }
            _ => self.0.push(chunk),
        }
    }
}

impl<'a> ChunkBuilder<'a> {
    pub fn new(context: &'a VisitorContext) -> Self {
        Self {
            context,
            resolver: None,
            cache_sites: 0,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn PartialResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(&mut self, nodes: &[Node]) -> Result<Vec<Chunk>, Error> {
        let mut chunks = Chunks::default();
        self.visit_all(nodes, &mut chunks)?;
        Ok(chunks.0)
    }

    fn visit_all(&mut self, nodes: &[Node], chunks: &mut Chunks) -> Result<(), Error> {
        for node in nodes {
            self.visit(node, chunks)?;
        }
        Ok(())
    }

    fn expression(&self, code: &str, position: Option<Position>, raw: bool, silent_nulls: bool) -> Chunk {
        Chunk::SendExpression(SendExpressionChunk {
            code: unarmor_code(code),
            position,
            automatically_encode: !raw && self.context.settings.automatic_encoding,
            silent_nulls,
        })
    }

    fn visit(&mut self, node: &Node, chunks: &mut Chunks) -> Result<(), Error> {
        match node {
            Node::Text(text) => chunks.literal(&text.text),
            Node::Entity(entity) => chunks.literal(&format!("&{};", entity.name)),
            Node::Comment(comment) => chunks.literal(&format!("<!--{}-->", comment.text)),
            Node::Doctype(doctype) => chunks.literal(&doctype_literal(doctype)),
            Node::Expression(expression) => chunks.push(self.expression(
                &expression.code,
                expression.position.clone(),
                expression.raw,
                expression.silent_nulls,
            )),
            Node::Statement(statement) => {
                chunks.push_killing_whitespace(Chunk::CodeStatement(CodeStatementChunk {
                    code: unarmor_code(&statement.code),
                    position: statement.position.clone(),
                }))
            }
            Node::Element(element) => {
                chunks.literal(&format!("<{}", element.name));
                for attribute in &element.attributes {
                    self.visit_attribute(attribute, chunks);
                }
                chunks.literal(if element.is_empty { "/>" } else { ">" });
            }
            Node::EndElement(end) => {
                if !is_void_element(&end.name) {
                    chunks.literal(&format!("</{}>", end.name));
                }
            }
            Node::Special(special) => self.visit_special(special, chunks)?,
            Node::Extension(extension) => {
                let body = self.build(&extension.body)?;
                chunks.push(Chunk::Extension(ExtensionChunk {
                    extension: extension.extension.clone(),
                    body,
                    position: extension.element.position.clone(),
                }));
            }
        }
        Ok(())
    }

    fn visit_attribute(&self, attribute: &AttributeNode, chunks: &mut Chunks) {
        chunks.literal(&format!(" {}={}", attribute.name, attribute.quote));
        for node in &attribute.nodes {
            match node {
                Node::Text(text) => chunks.literal(&text.text),
                Node::Entity(entity) => chunks.literal(&format!("&{};", entity.name)),
                Node::Expression(expression) => chunks.push(self.expression(
                    &expression.code,
                    expression.position.clone(),
                    expression.raw,
                    expression.silent_nulls,
                )),
                _ => {}
            }
        }
        chunks.literal(&attribute.quote.to_string());
    }

    /// An `else`/`elseif` must follow an `if` or `elseif`, skipping a
    /// whitespace-only literal in between
    fn check_else(&self, element: &ElementNode, chunks: &mut Chunks) -> Result<(), CompilerError> {
        if is_whitespace_literal(chunks.0.last()) {
            chunks.0.pop();
        }
        match chunks.0.last() {
            Some(Chunk::Conditional(c)) if matches!(c.kind, ConditionalType::If | ConditionalType::ElseIf) => Ok(()),
            _ => Err(CompilerError::ElseWithoutIf {
                name: element.name.clone(),
                position: element.position.clone(),
            }),
        }
    }

    fn conditional(
        &mut self,
        kind: ConditionalType,
        condition: String,
        special: &SpecialNode,
    ) -> Result<Chunk, Error> {
        Ok(Chunk::Conditional(ConditionalChunk {
            kind,
            condition,
            body: self.build(&special.body)?,
            position: special.element.position.clone(),
        }))
    }

    fn visit_special(&mut self, special: &SpecialNode, chunks: &mut Chunks) -> Result<(), Error> {
        let element = &special.element;
        let position = element.position.clone();
        let name = local_name(&element.name);

        match name {
            "var" | "default" => {
                let ty = attribute_value(element, "type").unwrap_or_else(|| "var".to_string());
                let is_local = name == "var";
                let declarations: Vec<Chunk> = other_attributes(element, &["type"])
                    .map(|(name, value)| {
                        if is_local {
                            Chunk::LocalVariable(LocalVariableChunk {
                                name,
                                ty: ty.clone(),
                                value,
                                position: position.clone(),
                            })
                        } else {
                            Chunk::DefaultVariable(DefaultVariableChunk {
                                name,
                                ty: ty.clone(),
                                value,
                                position: position.clone(),
                            })
                        }
                    })
                    .collect();
                if element.is_empty && special.body.is_empty() {
                    for declaration in declarations {
                        chunks.push(declaration);
                    }
                } else {
                    let mut body = declarations;
                    body.extend(self.build(&special.body)?);
                    chunks.push(Chunk::Scope(ScopeChunk { body, position }));
                }
            }
            "global" => {
                let ty = attribute_value(element, "type").unwrap_or_else(|| "object".to_string());
                for (name, value) in other_attributes(element, &["type"]) {
                    chunks.push_unordered(Chunk::GlobalVariable(GlobalVariableChunk {
                        name,
                        ty: ty.clone(),
                        value,
                        position: position.clone(),
                    }));
                }
            }
            "viewdata" => {
                if let Some(model) = attribute_value(element, "model") {
                    chunks.push_unordered(Chunk::ViewDataModel(ViewDataModelChunk {
                        model_type: model,
                        alias: attribute_value(element, "alias"),
                        position: position.clone(),
                    }));
                }
                let default = attribute_value(element, "default");
                for (name, ty) in other_attributes(element, &["model", "alias", "default"]) {
                    chunks.push_unordered(Chunk::ViewData(ViewDataChunk {
                        key: name.clone(),
                        name,
                        ty,
                        default: default.clone(),
                        position: position.clone(),
                    }));
                }
            }
            "set" => {
                for (name, value) in other_attributes(element, &[]) {
                    chunks.push(Chunk::AssignVariable(AssignVariableChunk {
                        name,
                        value,
                        position: position.clone(),
                    }));
                }
            }
            "for" => {
                let code = required(element, "each")?;
                let mut body: Vec<Chunk> = other_attributes(element, &["each"])
                    .map(|(name, value)| {
                        Chunk::AssignVariable(AssignVariableChunk {
                            name,
                            value,
                            position: position.clone(),
                        })
                    })
                    .collect();
                body.extend(self.build(&special.body)?);
                chunks.push(Chunk::ForEach(ForEachChunk { code, body, position }));
            }
            "if" => {
                let condition = required(element, "condition")?;
                chunks.push(self.conditional(ConditionalType::If, condition, special)?);
            }
            "test" => {
                let chunk = match element.attribute("once") {
                    Some(key) => self.conditional(ConditionalType::Once, string_code(key), special)?,
                    None => {
                        self.conditional(ConditionalType::If, condition(element)?, special)?
                    }
                };
                chunks.push(chunk);
            }
            "elseif" => {
                self.check_else(element, chunks)?;
                let condition = condition(element)?;
                chunks.push(self.conditional(ConditionalType::ElseIf, condition, special)?);
            }
            "else" => {
                self.check_else(element, chunks)?;
                let chunk = match attribute_value(element, "if") {
                    Some(condition) => self.conditional(ConditionalType::ElseIf, condition, special)?,
                    None => self.conditional(ConditionalType::Else, String::new(), special)?,
                };
                chunks.push(chunk);
            }
            "unless" => {
                let condition = required(element, "condition")?;
                chunks.push(self.conditional(ConditionalType::Unless, condition, special)?);
            }
            "content" => {
                if let Some(name) = attribute_value(element, "name") {
                    let body = self.build(&special.body)?;
                    chunks.push(Chunk::Content(ContentChunk { name, body, position }));
                } else if let Some(variable) = attribute_value(element, "var") {
                    let add_type = match attribute_value(element, "add").as_deref() {
                        Some("before") => ContentAddType::InsertBefore,
                        Some("after") => ContentAddType::AppendAfter,
                        _ => ContentAddType::Replace,
                    };
                    let body = self.build(&special.body)?;
                    chunks.push(Chunk::ContentSet(ContentSetChunk {
                        variable,
                        add_type,
                        body,
                        position,
                    }));
                } else {
                    return Err(CompilerError::MissingAttribute {
                        element: element.name.clone(),
                        attribute: "name".to_string(),
                        position,
                    }
                    .into());
                }
            }
            "use" => self.visit_use(special, chunks)?,
            "render" => {
                if let Some(partial) = attribute_value(element, "partial") {
                    let chunk = self.render_partial(&partial, special, &["partial"])?;
                    chunks.push(chunk);
                } else {
                    let name = attribute_value(element, "section")
                        .or_else(|| attribute_value(element, "segment"));
                    let default = self.build(&special.body)?;
                    chunks.push(Chunk::RenderSection(RenderSectionChunk {
                        name,
                        default,
                        position,
                    }));
                }
            }
            "macro" => {
                let name = required(element, "name")?;
                let parameters = other_attributes(element, &["name"])
                    .map(|(name, ty)| MacroParameter { name, ty })
                    .collect();
                let body = self.build(&special.body)?;
                chunks.push(Chunk::Macro(MacroChunk {
                    name,
                    parameters,
                    body,
                    position,
                }));
            }
            "cache" => {
                self.cache_sites += 1;
                let site_id = format!("{}:{}", self.context.view_path, self.cache_sites);
                let body = self.build(&special.body)?;
                chunks.push(Chunk::Cache(CacheChunk {
                    site_id,
                    key: attribute_value(element, "key").unwrap_or_default(),
                    expires: attribute_value(element, "expires").unwrap_or_default(),
                    signal: attribute_value(element, "signal").unwrap_or_default(),
                    body,
                    position,
                }));
            }
            "segment" | "section" => {
                return Err(CompilerError::SectionOutsidePartial {
                    name: element.name.clone(),
                    position,
                }
                .into());
            }
            _ => {
                return Err(CompilerError::UnknownSpecialNode {
                    name: element.name.clone(),
                    position,
                }
                .into());
            }
        }
        Ok(())
    }

    fn visit_use(&mut self, special: &SpecialNode, chunks: &mut Chunks) -> Result<(), Error> {
        let element = &special.element;
        let position = element.position.clone();

        if let Some(name) = attribute_value(element, "content") {
            let default = self.build(&special.body)?;
            chunks.push(Chunk::UseContent(UseContentChunk {
                name,
                default,
                position,
            }));
        } else if let Some(file) = attribute_value(element, "file") {
            let chunk = self.render_partial(&file, special, &["file"])?;
            chunks.push(chunk);
        } else if let Some(namespace) = attribute_value(element, "namespace") {
            chunks.push_unordered(Chunk::UseNamespace(UseNamespaceChunk { namespace, position }));
        } else if let Some(assembly) = attribute_value(element, "assembly") {
            chunks.push_unordered(Chunk::UseAssembly(UseAssemblyChunk { assembly, position }));
        } else if let Some(base_type) = attribute_value(element, "pageBaseType") {
            chunks.push_unordered(Chunk::PageBaseType(PageBaseTypeChunk { base_type, position }));
        } else {
            return Err(CompilerError::UnknownSpecialNode {
                name: element.name.clone(),
                position,
            }
            .into());
        }
        Ok(())
    }

    /// A scope holding the invocation's attributes as locals and the partial
    /// invocation itself, with sections split out of the body
    fn render_partial(
        &mut self,
        name: &str,
        special: &SpecialNode,
        taken: &[&str],
    ) -> Result<Chunk, Error> {
        let element = &special.element;
        let position = element.position.clone();

        let file_context = match self.resolver {
            Some(resolver) => Some(resolver.resolve_partial(name)?),
            None => None,
        };
        let declared = file_context
            .as_ref()
            .map(|file| declared_sections(&file.chunks))
            .unwrap_or_default();

        let (body, sections) = self.split_sections(&special.body, &declared)?;

        let mut scope: Vec<Chunk> = other_attributes(element, taken)
            .map(|(name, value)| {
                Chunk::LocalVariable(LocalVariableChunk {
                    name,
                    ty: "var".to_string(),
                    value,
                    position: position.clone(),
                })
            })
            .collect();
        scope.push(Chunk::RenderPartial(RenderPartialChunk {
            name: name.to_string(),
            file_context,
            body,
            sections,
            position: position.clone(),
        }));
        Ok(Chunk::Scope(ScopeChunk {
            body: scope,
            position,
        }))
    }

    fn is_section_tag(&self, element: &ElementNode) -> bool {
        matches!(local_name(&element.name), "segment" | "section")
    }

    /// The section special wrapped by a conditional special, if that is all
    /// the conditional holds
    fn wrapped_section<'n>(&self, special: &'n SpecialNode) -> Option<&'n SpecialNode> {
        if !matches!(local_name(&special.element.name), "if" | "unless" | "test") {
            return None;
        }
        let mut content = special
            .body
            .iter()
            .filter(|n| !matches!(n, Node::Text(t) if t.text.trim().is_empty()));
        match (content.next(), content.next()) {
            (Some(Node::Special(inner)), None) if self.is_section_tag(&inner.element) => Some(inner),
            _ => None,
        }
    }

    /// Split a partial invocation body into its default body and named
    /// sections; every node lands in exactly one of them
    fn split_sections(
        &mut self,
        nodes: &[Node],
        declared: &[String],
    ) -> Result<(Vec<Chunk>, IndexMap<String, Vec<Chunk>>), Error> {
        let mut body = Chunks::default();
        let mut sections: IndexMap<String, Vec<Chunk>> = IndexMap::new();
        let mut queue: VecDeque<Node> = nodes.iter().cloned().collect();

        while let Some(node) = queue.pop_front() {
            let (name, chunks) = match &node {
                Node::Special(special) if self.is_section_tag(&special.element) => {
                    (required(&special.element, "name")?, self.build(&special.body)?)
                }
                Node::Special(special) => match self.wrapped_section(special) {
                    Some(inner) => {
                        let name = required(&inner.element, "name")?;
                        let unwrapped = SpecialNode::new(special.element.clone(), inner.body.clone());
                        let mut target = Chunks::default();
                        self.visit_special(&unwrapped, &mut target)?;
                        (name, target.0)
                    }
                    None => {
                        self.visit_special(special, &mut body)?;
                        continue;
                    }
                },
                Node::Element(element) if declared.contains(&element.name) => {
                    let inner = if element.is_empty {
                        Vec::new()
                    } else {
                        take_closed_body(element, &mut queue)?
                    };
                    (element.name.clone(), self.build(&inner)?)
                }
                other => {
                    self.visit(other, &mut body)?;
                    continue;
                }
            };
            sections.entry(name).or_default().extend(chunks);
        }
        Ok((body.0, sections))
    }
}

/// Names of the sections a partial renders with `<render section="x">`
pub(crate) fn declared_sections(chunks: &[Chunk]) -> Vec<String> {
    let mut names = Vec::new();
    collect_sections(chunks, &mut names);
    names
}

fn collect_sections(chunks: &[Chunk], names: &mut Vec<String>) {
    for chunk in chunks {
        if let Chunk::RenderSection(RenderSectionChunk { name: Some(name), .. }) = chunk {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for list in chunk.children() {
            collect_sections(list, names);
        }
    }
}
