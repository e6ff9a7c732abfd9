//! From lowered nodes to chunks, and from view files to compiled chunk trees

mod builder;
pub mod chunk;
mod loader;
mod usage;

use indexmap::IndexMap;

use crate::error::CompilerError;

pub use builder::{build_chunks, ChunkBuilder, PartialResolver};
pub use chunk::*;
pub use loader::ViewLoader;
pub use usage::DetectUsage;

/// Replace the `[[`/`]]` escapes used inside markup attributes with `<`/`>`
pub fn unarmor_code(code: &str) -> String {
    code.replace("[[", "<").replace("]]", ">")
}

/// Reject globals and view data declared twice with a different type or
/// value, across every chunk list given
pub fn check_declarations<'a>(
    lists: impl IntoIterator<Item = &'a [Chunk]>,
) -> Result<(), CompilerError> {
    let mut globals: IndexMap<String, (String, String)> = IndexMap::new();
    let mut view_data: IndexMap<String, (String, String)> = IndexMap::new();
    for list in lists {
        check_list(list, &mut globals, &mut view_data)?;
    }
    Ok(())
}

fn check_list(
    chunks: &[Chunk],
    globals: &mut IndexMap<String, (String, String)>,
    view_data: &mut IndexMap<String, (String, String)>,
) -> Result<(), CompilerError> {
    for chunk in chunks {
        match chunk {
            Chunk::GlobalVariable(global) => {
                declare(globals, "global", &global.name, (global.ty.clone(), global.value.clone()))?
            }
            Chunk::ViewData(data) => declare(
                view_data,
                "viewdata",
                &data.name,
                (data.ty.clone(), data.key.clone()),
            )?,
            // partial files are checked on their own
            Chunk::RenderPartial(partial) => {
                check_list(&partial.body, globals, view_data)?;
                for section in partial.sections.values() {
                    check_list(section, globals, view_data)?;
                }
            }
            other => {
                for list in other.children() {
                    check_list(list, globals, view_data)?;
                }
            }
        }
    }
    Ok(())
}

fn declare(
    table: &mut IndexMap<String, (String, String)>,
    kind: &'static str,
    name: &str,
    declaration: (String, String),
) -> Result<(), CompilerError> {
    match table.get(name) {
        Some(existing) if *existing != declaration => Err(CompilerError::ConflictingDeclaration {
            kind,
            name: name.to_string(),
            first: format!("{} = {}", existing.0, existing.1),
            second: format!("{} = {}", declaration.0, declaration.1),
        }),
        Some(_) => Ok(()),
        None => {
            table.insert(name.to_string(), declaration);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: &str, ty: &str, value: &str) -> Chunk {
        Chunk::GlobalVariable(GlobalVariableChunk {
            name: name.into(),
            ty: ty.into(),
            value: value.into(),
            position: None,
        })
    }

    #[test]
    fn test_unarmor() {
        assert_eq!(unarmor_code("a [[ b ]] c"), "a < b > c");
    }

    #[test]
    fn test_same_declaration_twice_is_fine() {
        let a = vec![global("title", "string", "\"x\"")];
        let b = vec![global("title", "string", "\"x\"")];
        assert!(check_declarations([a.as_slice(), b.as_slice()]).is_ok());
    }

    #[test]
    fn test_conflicting_declarations() {
        let a = vec![global("title", "string", "\"x\"")];
        let b = vec![Chunk::Scope(ScopeChunk {
            body: vec![global("title", "int", "5")],
            position: None,
        })];
        let err = check_declarations([a.as_slice(), b.as_slice()]).expect_err("should conflict");
        assert!(matches!(err, CompilerError::ConflictingDeclaration { kind: "global", .. }));
    }
}
