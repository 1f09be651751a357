//! Attributes of a corpus and the components they own.
//!
//! Four kinds of attribute exist. Only positional attributes derive
//! components; structural and alignment attributes declare their kinds so
//! that lookups resolve, but their encodings are produced elsewhere.
//! Dynamic attributes are computed on demand and own no files.

pub mod component;
pub mod positional;

use std::path::Path;

use crate::attribute::component::{ComponentKind, ComponentState, ComponentTable};
use crate::attribute::positional::Positional;
use crate::error::{PosattrError, Result, remember};

/// Capabilities shared by every kind of attribute.
pub trait AttributeInfo {
    /// Attribute name, also the stem of its file names.
    fn name(&self) -> &str;

    /// Human-readable attribute kind.
    fn kind_name(&self) -> &'static str;

    /// The component table.
    fn components(&self) -> &ComponentTable;
}

/// Region annotations such as sentences or documents.
#[derive(Debug)]
pub struct Structural {
    name: String,
    has_values: bool,
    components: ComponentTable,
}

impl Structural {
    pub fn new<P: AsRef<Path>>(name: &str, dir: P, has_values: bool) -> Self {
        let kinds: &[ComponentKind] = if has_values {
            &[
                ComponentKind::StructRanges,
                ComponentKind::StructValues,
                ComponentKind::StructValueIndex,
            ]
        } else {
            &[ComponentKind::StructRanges]
        };
        Structural {
            name: name.to_string(),
            has_values,
            components: ComponentTable::with_kinds(name, dir.as_ref(), kinds),
        }
    }

    /// Whether regions carry annotation strings.
    pub fn has_values(&self) -> bool {
        self.has_values
    }
}

/// Links between the positions of two parallel corpora.
#[derive(Debug)]
pub struct Alignment {
    name: String,
    target: String,
    components: ComponentTable,
}

impl Alignment {
    pub fn new<P: AsRef<Path>>(name: &str, dir: P, target: &str) -> Self {
        Alignment {
            name: name.to_string(),
            target: target.to_string(),
            components: ComponentTable::with_kinds(
                name,
                dir.as_ref(),
                &[ComponentKind::AlignData],
            ),
        }
    }

    /// Id of the aligned corpus.
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// An attribute computed by an external command.
#[derive(Debug)]
pub struct Dynamic {
    name: String,
    command: String,
    arg_types: Vec<String>,
    components: ComponentTable,
}

impl Dynamic {
    pub fn new(name: &str, command: &str, arg_types: Vec<String>) -> Self {
        Dynamic {
            name: name.to_string(),
            command: command.to_string(),
            arg_types,
            components: ComponentTable::new(name),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arg_types(&self) -> &[String] {
        &self.arg_types
    }
}

/// Any attribute of a corpus.
#[derive(Debug)]
pub enum Attribute {
    Positional(Positional),
    Structural(Structural),
    Alignment(Alignment),
    Dynamic(Dynamic),
}

impl AttributeInfo for Positional {
    fn name(&self) -> &str {
        Positional::name(self)
    }

    fn kind_name(&self) -> &'static str {
        "positional"
    }

    fn components(&self) -> &ComponentTable {
        Positional::components(self)
    }
}

impl AttributeInfo for Structural {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind_name(&self) -> &'static str {
        "structural"
    }

    fn components(&self) -> &ComponentTable {
        &self.components
    }
}

impl AttributeInfo for Alignment {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind_name(&self) -> &'static str {
        "alignment"
    }

    fn components(&self) -> &ComponentTable {
        &self.components
    }
}

impl AttributeInfo for Dynamic {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind_name(&self) -> &'static str {
        "dynamic"
    }

    fn components(&self) -> &ComponentTable {
        &self.components
    }
}

impl Attribute {
    fn info(&self) -> &dyn AttributeInfo {
        match self {
            Attribute::Positional(a) => a,
            Attribute::Structural(a) => a,
            Attribute::Alignment(a) => a,
            Attribute::Dynamic(a) => a,
        }
    }

    /// Lifecycle state of `kind` for this attribute.
    pub fn state(&self, kind: ComponentKind) -> ComponentState {
        self.components().state(kind)
    }

    /// Derive `kind`. Only positional attributes derive components.
    pub fn create(&mut self, kind: ComponentKind) -> Result<()> {
        match self {
            Attribute::Positional(a) => a.create(kind),
            other => remember(Err(PosattrError::config(format!(
                "{} attribute {} cannot derive the {}",
                other.kind_name(),
                other.name(),
                kind.name()
            )))),
        }
    }

    /// Make sure `kind` is loaded, deriving it if allowed and possible.
    pub fn ensure(&mut self, kind: ComponentKind, try_create: bool) -> Result<()> {
        match self {
            Attribute::Positional(a) => a.ensure(kind, try_create),
            other if try_create && other.state(kind) == ComponentState::Defined => {
                other.create(kind)
            }
            Attribute::Structural(a) => remember(a.components.load(kind)),
            Attribute::Alignment(a) => remember(a.components.load(kind)),
            Attribute::Dynamic(a) => remember(a.components.load(kind)),
        }
    }

    /// Release every loaded component.
    pub fn drop_all(&mut self) -> usize {
        match self {
            Attribute::Positional(a) => a.drop_all(),
            Attribute::Structural(a) => a.components.unload_all(),
            Attribute::Alignment(a) => a.components.unload_all(),
            Attribute::Dynamic(a) => a.components.unload_all(),
        }
    }

    pub fn as_positional(&self) -> Option<&Positional> {
        match self {
            Attribute::Positional(a) => Some(a),
            _ => None,
        }
    }

    /// The positional attribute, or a configuration error naming the
    /// actual kind.
    pub fn as_positional_mut(&mut self) -> Result<&mut Positional> {
        match self {
            Attribute::Positional(a) => Ok(a),
            other => Err(PosattrError::config(format!(
                "attribute {} is {}, not positional",
                other.name(),
                other.kind_name()
            ))),
        }
    }
}

impl AttributeInfo for Attribute {
    fn name(&self) -> &str {
        self.info().name()
    }

    fn kind_name(&self) -> &'static str {
        self.info().kind_name()
    }

    fn components(&self) -> &ComponentTable {
        self.info().components()
    }
}
