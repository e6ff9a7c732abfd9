//! Compiler settings
//!
//! Settings can be built in code with the `with_*` methods or loaded from a
//! TOML file:
//!
//! ```toml
//! prefix = "s"
//! automatic_encoding = true
//! page_base_type = "MyApp.ViewBase"
//!
//! [views]
//! shared_folder = "Shared"
//! extension = ".spark"
//! bindings_file = "bindings.xml"
//!
//! [using]
//! namespaces = ["System.Linq"]
//! assemblies = ["MyApp.Helpers"]
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// How control tags are recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespacesType {
    /// Control tags are plain names (`<if>`)
    Unqualified,
    /// Control tags must carry the engine namespace (`<s:if>`)
    Qualified,
}

/// Options shared by every view compiled by an engine
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Prefix bound to the engine namespace; setting it enables qualified mode
    pub prefix: Option<String>,
    /// HTML-encode the output of `${}` holes
    pub automatic_encoding: bool,
    /// Treat `<section>` as a control tag like `<segment>`
    pub parse_section_tag_as_segment: bool,
    /// Drop lines left empty by control tags
    pub omit_blank_lines: bool,
    /// Namespaces imported by every view
    pub namespaces: Vec<String>,
    /// Assemblies referenced by every view
    pub assemblies: Vec<String>,
    /// Base type for generated views
    pub page_base_type: Option<String>,
    /// Name of the binding table in the root of the view folder
    pub bindings_file: String,
    /// Folder searched after the view's own folder when resolving partials
    pub shared_folder: String,
    /// Extension of view files, including the dot
    pub view_extension: String,
    /// Debug mode: render errors carry the position of the failing chunk
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix: None,
            automatic_encoding: true,
            parse_section_tag_as_segment: false,
            omit_blank_lines: true,
            namespaces: Vec::new(),
            assemblies: Vec::new(),
            page_base_type: None,
            bindings_file: "bindings.xml".to_string(),
            shared_folder: "Shared".to_string(),
            view_extension: ".spark".to_string(),
            debug: false,
        }
    }
}

/// TOML structure for deserializing settings
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSettings {
    prefix: Option<String>,
    automatic_encoding: Option<bool>,
    parse_section_tag_as_segment: Option<bool>,
    omit_blank_lines: Option<bool>,
    page_base_type: Option<String>,
    debug: Option<bool>,
    views: Option<TomlViews>,
    using: Option<TomlUsing>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlViews {
    shared_folder: Option<String>,
    extension: Option<String>,
    bindings_file: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct TomlUsing {
    namespaces: Vec<String>,
    assemblies: Vec<String>,
}

impl Settings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load settings from a TOML string, starting from the defaults
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, SettingsError> {
        let parsed: TomlSettings = toml::from_str(content)?;
        let mut settings = Settings::default();

        settings.prefix = parsed.prefix;
        settings.page_base_type = parsed.page_base_type;
        if let Some(value) = parsed.automatic_encoding {
            settings.automatic_encoding = value;
        }
        if let Some(value) = parsed.parse_section_tag_as_segment {
            settings.parse_section_tag_as_segment = value;
        }
        if let Some(value) = parsed.omit_blank_lines {
            settings.omit_blank_lines = value;
        }
        if let Some(value) = parsed.debug {
            settings.debug = value;
        }
        if let Some(views) = parsed.views {
            if let Some(shared) = views.shared_folder {
                settings.shared_folder = shared;
            }
            if let Some(extension) = views.extension {
                settings.view_extension = extension;
            }
            if let Some(bindings) = views.bindings_file {
                settings.bindings_file = bindings;
            }
        }
        let using = parsed.using.unwrap_or_default();
        settings.namespaces = using.namespaces;
        settings.assemblies = using.assemblies;
        Ok(settings)
    }

    /// The namespace mode implied by the configured prefix
    pub fn namespaces_type(&self) -> NamespacesType {
        if self.prefix.is_some() {
            NamespacesType::Qualified
        } else {
            NamespacesType::Unqualified
        }
    }

    /// Set the qualified-namespace prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set whether `${}` output is HTML-encoded
    pub fn with_automatic_encoding(mut self, encode: bool) -> Self {
        self.automatic_encoding = encode;
        self
    }

    /// Set whether `<section>` is parsed like `<segment>`
    pub fn with_section_as_segment(mut self, enabled: bool) -> Self {
        self.parse_section_tag_as_segment = enabled;
        self
    }

    /// Set whether blank lines around control tags are removed
    pub fn with_omit_blank_lines(mut self, enabled: bool) -> Self {
        self.omit_blank_lines = enabled;
        self
    }

    /// Add a namespace imported by every view
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Add an assembly referenced by every view
    pub fn with_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assemblies.push(assembly.into());
        self
    }

    /// Set the base type for generated views
    pub fn with_page_base_type(mut self, base_type: impl Into<String>) -> Self {
        self.page_base_type = Some(base_type.into());
        self
    }

    /// Set the binding table file name
    pub fn with_bindings_file(mut self, file: impl Into<String>) -> Self {
        self.bindings_file = file.into();
        self
    }

    /// Set the shared partial folder
    pub fn with_shared_folder(mut self, folder: impl Into<String>) -> Self {
        self.shared_folder = folder.into();
        self
    }

    /// Set the view file extension
    pub fn with_view_extension(mut self, extension: impl Into<String>) -> Self {
        self.view_extension = extension.into();
        self
    }

    /// Enable or disable debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
