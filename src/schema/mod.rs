//! Program schemas: per-program binary layouts of instructions, events and accounts.
//!
//! A [`ProgramSchema`] is validated once when it is built. Every discriminator must have the
//! schema's discriminator length, fixed-shape layouts must add up to their declared size, and
//! no two layouts of the same kind and shape may share a discriminator. Account layouts of
//! non-Anchor programs may omit the discriminator if they have a fixed size.

pub mod idl;
#[cfg(feature = "native")]
pub mod registry;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Error;

pub const DEFAULT_DISCRIMINATOR_LEN: usize = 8;
pub const PUBKEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    U128,
    I8,
    I16,
    I32,
    I64,
    Bool,
    /// 32 bytes rendered as base58.
    PublicKey,
    FixedBytes(usize),
    /// Legacy fixed-width text, NUL padded on the right.
    FixedText(usize),
    /// u32 little-endian byte length followed by UTF-8.
    String,
    /// u32 little-endian element count followed by the elements.
    Vec(Box<FieldKind>),
    Array(Box<FieldKind>, usize),
    /// One tag byte (0 = absent, 1 = present) followed by the value when present.
    Option(Box<FieldKind>),
    Struct(Vec<FieldSpec>),
}

impl FieldKind {
    /// Encoded size when it does not depend on the data.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 | Self::Bool => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 => Some(4),
            Self::U64 | Self::I64 => Some(8),
            Self::U128 => Some(16),
            Self::PublicKey => Some(PUBKEY_LEN),
            Self::FixedBytes(n) | Self::FixedText(n) => Some(*n),
            Self::Array(inner, n) => inner.fixed_size()?.checked_mul(*n),
            Self::Struct(fields) => fields
                .iter()
                .try_fold(0usize, |acc, f| acc.checked_add(f.kind.fixed_size()?)),
            Self::String | Self::Vec(_) | Self::Option(_) => None,
        }
    }

    /// Fewest bytes any encoding of this kind occupies, saturating at `usize::MAX`.
    pub fn min_size(&self) -> usize {
        match self {
            Self::String | Self::Vec(_) => 4,
            Self::Option(_) => 1,
            Self::Array(inner, n) => inner.min_size().saturating_mul(*n),
            Self::Struct(fields) => fields
                .iter()
                .fold(0usize, |acc, f| acc.saturating_add(f.kind.min_size())),
            fixed => fixed.fixed_size().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Instruction,
    Event,
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutShape {
    /// Fields decoded in order; trailing bytes are tolerated.
    Variable,
    /// The whole payload, discriminator included, is exactly this many bytes.
    Fixed(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub name: String,
    pub discriminator: Vec<u8>,
    pub fields: Vec<FieldSpec>,
    /// Account role names in instruction account order. Empty for events and accounts.
    pub accounts: Vec<String>,
    pub shape: LayoutShape,
}

impl Layout {
    pub fn new(name: impl Into<String>, discriminator: &[u8], fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            discriminator: discriminator.to_vec(),
            fields,
            accounts: Vec::new(),
            shape: LayoutShape::Variable,
        }
    }

    pub fn with_accounts(mut self, accounts: &[&str]) -> Self {
        self.accounts = accounts.iter().map(|a| (*a).to_string()).collect();
        self
    }

    pub fn fixed(mut self, total_len: usize) -> Self {
        self.shape = LayoutShape::Fixed(total_len);
        self
    }

    /// Layouts without a discriminator are recognised by exact size alone.
    pub fn is_size_matched(&self) -> bool {
        self.discriminator.is_empty()
    }

    pub fn account_index(&self, role: &str) -> Option<usize> {
        self.accounts.iter().position(|a| a == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSchema {
    pub program_id: String,
    pub name: Option<String>,
    pub discriminator_len: usize,
    pub instructions: Vec<Layout>,
    pub events: Vec<Layout>,
    pub accounts: Vec<Layout>,
}

impl ProgramSchema {
    pub fn builder(program_id: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            program_id: program_id.into(),
            name: None,
            discriminator_len: DEFAULT_DISCRIMINATOR_LEN,
            instructions: Vec::new(),
            events: Vec::new(),
            accounts: Vec::new(),
        }
    }

    pub fn layouts(&self, kind: LayoutKind) -> &[Layout] {
        match kind {
            LayoutKind::Instruction => &self.instructions,
            LayoutKind::Event => &self.events,
            LayoutKind::Account => &self.accounts,
        }
    }

    pub fn layout(&self, kind: LayoutKind, name: &str) -> Option<&Layout> {
        self.layouts(kind).iter().find(|l| l.name == name)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.discriminator_len == 0 {
            return Err(self.invalid("discriminator length must be non-zero".into()));
        }
        for kind in [
            LayoutKind::Instruction,
            LayoutKind::Event,
            LayoutKind::Account,
        ] {
            let layouts = self.layouts(kind);
            for (i, layout) in layouts.iter().enumerate() {
                self.validate_layout(kind, layout)?;
                if let Some(earlier) = layouts[..i].iter().find(|e| same_slot(e, layout)) {
                    return Err(Error::DuplicateDiscriminator {
                        program_id: self.program_id.clone(),
                        discriminator: layout.discriminator.clone(),
                        first: earlier.name.clone(),
                        second: layout.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_layout(&self, kind: LayoutKind, layout: &Layout) -> Result<(), Error> {
        if layout.is_size_matched() {
            if !matches!(layout.shape, LayoutShape::Fixed(_)) {
                return Err(self.invalid(format!(
                    "{kind} '{}' has no discriminator and no fixed size",
                    layout.name
                )));
            }
        } else if layout.discriminator.len() != self.discriminator_len {
            return Err(self.invalid(format!(
                "{kind} '{}' has a {}-byte discriminator, schema uses {}",
                layout.name,
                layout.discriminator.len(),
                self.discriminator_len
            )));
        }
        if let LayoutShape::Fixed(total) = layout.shape {
            let body = layout
                .fields
                .iter()
                .try_fold(0usize, |acc, f| acc.checked_add(f.kind.fixed_size()?));
            let Some(needed) = body.and_then(|b| b.checked_add(layout.discriminator.len())) else {
                return Err(self.invalid(format!(
                    "fixed {kind} '{}' contains variable-size fields",
                    layout.name
                )));
            };
            if needed != total {
                return Err(self.invalid(format!(
                    "fixed {kind} '{}' declares {total} bytes but its fields need {needed}",
                    layout.name
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> Error {
        Error::Schema {
            program_id: self.program_id.clone(),
            reason,
        }
    }
}

/// Two layouts collide when they share a discriminator and could both claim the same buffer.
fn same_slot(a: &Layout, b: &Layout) -> bool {
    a.discriminator == b.discriminator
        && match (a.shape, b.shape) {
            (LayoutShape::Variable, LayoutShape::Variable) => true,
            (LayoutShape::Fixed(x), LayoutShape::Fixed(y)) => x == y,
            _ => false,
        }
}

pub struct SchemaBuilder {
    program_id: String,
    name: Option<String>,
    discriminator_len: usize,
    instructions: Vec<Layout>,
    events: Vec<Layout>,
    accounts: Vec<Layout>,
}

impl SchemaBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn discriminator_len(mut self, len: usize) -> Self {
        self.discriminator_len = len;
        self
    }

    pub fn instruction(mut self, layout: Layout) -> Self {
        self.instructions.push(layout);
        self
    }

    pub fn event(mut self, layout: Layout) -> Self {
        self.events.push(layout);
        self
    }

    pub fn account(mut self, layout: Layout) -> Self {
        self.accounts.push(layout);
        self
    }

    pub fn build(self) -> Result<ProgramSchema, Error> {
        let schema = ProgramSchema {
            program_id: self.program_id,
            name: self.name,
            discriminator_len: self.discriminator_len,
            instructions: self.instructions,
            events: self.events,
            accounts: self.accounts,
        };
        schema.validate()?;
        Ok(schema)
    }
}

/// Anchor sighash: first 8 bytes of `sha256("<namespace>:<name>")`.
///
/// Namespaces are `global` for instructions (snake_case name), `event` for events and
/// `account` for accounts (PascalCase name).
pub fn anchor_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}
