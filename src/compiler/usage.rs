//! Find out whether names are referenced by code reachable from a chunk tree,
//! looking through partials and the sections handed to them

use super::chunk::*;

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `name` occurs in `code` as a whole identifier
fn mentions(code: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    code.match_indices(name).any(|(index, _)| {
        let before = code[..index].chars().next_back();
        let after = code[index + name.len()..].chars().next();
        !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
    })
}

/// Usage detection for a fixed set of names
///
/// Detection only ever turns flags on. A `<render/>` inside a partial
/// scans the body the caller handed to that partial, and
/// `<render section="x"/>` scans the caller's section, so a name used by the
/// caller through a partial is still found.
pub struct DetectUsage<'c> {
    names: Vec<(String, bool)>,
    frames: Vec<&'c RenderPartialChunk>,
}

impl<'c> DetectUsage<'c> {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(|n| (n.into(), false)).collect(),
            frames: Vec::new(),
        }
    }

    /// Scan as if inside `partial`, so its callbacks resolve to its body
    /// and sections
    pub fn with_partial(mut self, partial: &'c RenderPartialChunk) -> Self {
        self.frames.push(partial);
        self
    }

    pub fn is_detected(&self, name: &str) -> bool {
        self.names.iter().any(|(n, detected)| n == name && *detected)
    }

    /// Every name with its flag, in the order given
    pub fn detected(&self) -> impl Iterator<Item = (&str, bool)> {
        self.names.iter().map(|(n, d)| (n.as_str(), *d))
    }

    fn all_detected(&self) -> bool {
        self.names.iter().all(|(_, detected)| *detected)
    }

    fn examine(&mut self, code: &str) {
        for (name, detected) in &mut self.names {
            if !*detected && mentions(code, name) {
                *detected = true;
            }
        }
    }

    pub fn scan(&mut self, chunks: &'c [Chunk]) {
        for chunk in chunks {
            if self.all_detected() {
                return;
            }
            self.scan_chunk(chunk);
        }
    }

    fn scan_chunk(&mut self, chunk: &'c Chunk) {
        match chunk {
            Chunk::SendExpression(c) => self.examine(&c.code),
            Chunk::CodeStatement(c) => self.examine(&c.code),
            Chunk::LocalVariable(c) => self.examine(&c.value),
            Chunk::GlobalVariable(c) => self.examine(&c.value),
            Chunk::DefaultVariable(c) => self.examine(&c.value),
            Chunk::AssignVariable(c) => self.examine(&c.value),
            Chunk::ViewData(c) => {
                if let Some(default) = &c.default {
                    self.examine(default);
                }
            }
            Chunk::ForEach(c) => {
                self.examine(&c.code);
                self.scan(&c.body);
            }
            Chunk::Conditional(c) => {
                self.examine(&c.condition);
                self.scan(&c.body);
            }
            Chunk::Cache(c) => {
                self.examine(&c.key);
                self.examine(&c.expires);
                self.examine(&c.signal);
                self.scan(&c.body);
            }
            Chunk::RenderPartial(partial) => {
                self.scan(&partial.body);
                for section in partial.sections.values() {
                    self.scan(section);
                }
                if let Some(file) = &partial.file_context {
                    self.frames.push(partial);
                    self.scan(&file.chunks);
                    self.frames.pop();
                }
            }
            Chunk::RenderSection(section) => self.scan_callback(section),
            Chunk::Scope(_)
            | Chunk::Content(_)
            | Chunk::UseContent(_)
            | Chunk::ContentSet(_)
            | Chunk::Macro(_)
            | Chunk::Extension(_) => {
                for list in chunk.children() {
                    self.scan(list);
                }
            }
            Chunk::SendLiteral(_)
            | Chunk::ViewDataModel(_)
            | Chunk::UseNamespace(_)
            | Chunk::UseAssembly(_)
            | Chunk::PageBaseType(_) => {}
        }
    }

    /// Follow a callback point back into the caller that supplies it
    fn scan_callback(&mut self, section: &'c RenderSectionChunk) {
        let Some(frame) = self.frames.pop() else {
            self.scan(&section.default);
            return;
        };
        let supplied = match &section.name {
            None => Some(frame.body.as_slice()),
            Some(name) => frame.sections.get(name).map(Vec::as_slice),
        };
        if let Some(chunks) = supplied {
            self.scan(chunks);
        }
        self.frames.push(frame);
        if supplied.is_none() {
            self.scan(&section.default);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ViewLoader;
    use crate::config::Settings;
    use crate::folder::InMemoryViewFolder;
    use std::sync::Arc;

    const LOOP_NAMES: [&str; 4] = ["xIndex", "xCount", "xIsFirst", "xIsLast"];

    fn load(views: &[(&str, &str)]) -> Arc<FileContext> {
        let folder = views
            .iter()
            .fold(InMemoryViewFolder::new(), |folder, (path, text)| folder.with_view(path, *text));
        ViewLoader::new(Arc::new(folder), Arc::new(Settings::default()))
            .load("home/index.spark")
            .expect("should load")
    }

    fn loop_body(chunks: &[Chunk]) -> &[Chunk] {
        match chunks.iter().find(|c| matches!(c, Chunk::ForEach(_))) {
            Some(Chunk::ForEach(c)) => &c.body,
            _ => panic!("no loop"),
        }
    }

    fn detect(file: &FileContext) -> Vec<(String, bool)> {
        let mut usage = DetectUsage::new(LOOP_NAMES);
        usage.scan(loop_body(&file.chunks));
        usage.detected().map(|(n, d)| (n.to_string(), d)).collect()
    }

    fn flags(detected: &[(String, bool)]) -> Vec<bool> {
        detected.iter().map(|(_, d)| *d).collect()
    }

    #[test]
    fn test_mentions_whole_identifiers() {
        assert!(mentions("xIndex + 1", "xIndex"));
        assert!(mentions("f(xIndex)", "xIndex"));
        assert!(!mentions("xIndexer", "xIndex"));
        assert!(!mentions("my_xIndex", "xIndex"));
        assert!(!mentions("", "xIndex"));
    }

    #[test]
    fn test_direct_usage() {
        let file = load(&[("home/index.spark", "<for each='var x in xs'><if condition='xIsLast'>.</if>${x}</for>")]);
        assert_eq!(flags(&detect(&file)), vec![false, false, false, true]);
    }

    #[test]
    fn test_usage_in_statements() {
        let file = load(&[(
            "home/index.spark",
            "<for each='var x in xs'><% var last = xIsLast; %>\n  # total = xCount\n</for>",
        )]);
        assert_eq!(flags(&detect(&file)), vec![false, true, false, true]);
    }

    #[test]
    fn test_usage_inside_partial_is_found() {
        let file = load(&[
            ("home/index.spark", "<for each='var x in xs'><row/></for>"),
            ("home/_row.spark", "<td>${xIndex}</td>"),
        ]);
        assert_eq!(flags(&detect(&file)), vec![true, false, false, false]);
    }

    #[test]
    fn test_unused_names_are_not_detected() {
        let file = load(&[
            ("home/index.spark", "<for each='var x in xs'><row/>${x}</for>"),
            ("home/_row.spark", "<td>${y.Index}</td>"),
        ]);
        assert_eq!(flags(&detect(&file)), vec![false, false, false, false]);
    }

    #[test]
    fn test_section_handed_to_partial() {
        let file = load(&[
            (
                "home/index.spark",
                "<for each='var x in xs'><wrap><segment name='tail'>${xCount}</segment></wrap></for>",
            ),
            ("home/_wrap.spark", "<div><render/><render section='tail'/></div>"),
        ]);
        assert_eq!(flags(&detect(&file)), vec![false, true, false, false]);
    }

    #[test]
    fn test_partial_default_section() {
        let file = load(&[
            ("home/index.spark", "<for each='var x in xs'><wrap/></for>"),
            ("home/_wrap.spark", "<render section='missing'>${xIsFirst}</render>"),
        ]);
        assert_eq!(flags(&detect(&file)), vec![false, false, true, false]);
    }

    #[test]
    fn test_render_body_inside_partial_scans_caller() {
        // scanning the partial alone, the callback leads back to the caller
        let file = load(&[
            ("home/index.spark", "<wrap>${xIndex}</wrap>"),
            ("home/_wrap.spark", "<for each='var x in xs'><render/></for>"),
        ]);
        let Chunk::Scope(scope) = &file.chunks[0] else {
            panic!("expected scope");
        };
        let Chunk::RenderPartial(partial) = &scope.body[0] else {
            panic!("expected partial");
        };
        let partial_file = partial.file_context.as_ref().expect("resolved");
        let mut usage = DetectUsage::new(LOOP_NAMES).with_partial(partial);
        usage.scan(loop_body(&partial_file.chunks));
        assert!(usage.is_detected("xIndex"));
        assert!(!usage.is_detected("xCount"));
    }
}
