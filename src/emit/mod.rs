//! Compiled output and the emitter boundary.
//!
//! The pipeline's output for one method is a [`CompiledMethod`]: encoded code bytes, the
//! method's linkage symbol, the relocations its code needs and a readable listing. Object
//! file writers consume compiled methods through the [`Emitter`] trait. [`ObjectBuffer`] is
//! an in-memory emitter that lays methods out in a single `.text` section, resolves calls
//! between the methods it holds and reports everything else as external relocations.
//!
//! # Examples
//!
//! ```rust
//! use cilaot::emit::{Emitter, ObjectBuffer};
//!
//! let mut object = ObjectBuffer::new();
//! object.declare_external("_ZN7Console9WriteLineEi_v");
//! let image = object.finish()?;
//! assert!(image.text.is_empty());
//! # Ok::<(), cilaot::Error>(())
//! ```

mod strtab;

pub use strtab::StringTable;

use std::collections::{HashMap, HashSet};

use strum::Display;

use crate::{file::io::patch_le_at, Result};

/// Abstract relocation kinds; targets map them to their own numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RelocKind {
    /// 32-bit displacement of a call target, relative to the end of the field.
    Call,
    /// 32-bit PC-relative reference.
    PcRel32,
    /// 64-bit absolute address.
    Absolute64,
}

/// A reference from code to a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// Name of the referenced symbol.
    pub symbol: String,
    /// Offset of the field to patch, relative to the method (or section, once emitted).
    pub offset: u64,
    /// Constant added to the symbol address.
    pub addend: i64,
    /// Abstract kind.
    pub kind: RelocKind,
    /// Target-specific relocation type.
    pub target_type: u32,
}

/// A defined symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Linkage name.
    pub name: String,
    /// Defining section.
    pub section: String,
    /// Offset in the section.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

/// What the target's output passes leave on the final graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodArtifacts {
    /// Linkage name of the method.
    pub symbol: String,
    /// Encoded instructions.
    pub code: Vec<u8>,
    /// Relocations, method relative.
    pub relocations: Vec<Relocation>,
    /// One line per instruction, `offset: instruction`.
    pub listing: Vec<String>,
}

/// A fully compiled method.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    /// Source-level method name.
    pub name: String,
    /// Linkage name.
    pub symbol: String,
    /// Encoded instructions.
    pub code: Vec<u8>,
    /// Relocations, method relative.
    pub relocations: Vec<Relocation>,
    /// Final instruction listing.
    pub listing: Vec<String>,
    /// Graph dumps before each pass and of the final graph, when recorded.
    pub dumps: Vec<String>,
}

impl CompiledMethod {
    /// Assembles a compiled method from pipeline output.
    #[must_use]
    pub fn new(name: &str, artifacts: MethodArtifacts, dumps: Vec<String>) -> Self {
        CompiledMethod {
            name: name.to_string(),
            symbol: artifacts.symbol,
            code: artifacts.code,
            relocations: artifacts.relocations,
            listing: artifacts.listing,
            dumps,
        }
    }
}

/// Consumer of compiled methods, typically an object file writer.
pub trait Emitter {
    /// The finished product.
    type Output;

    /// Adds a method, returning the symbol it was placed at.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emit`] if the method cannot be placed.
    fn emit_method(&mut self, method: &CompiledMethod) -> Result<Symbol>;

    /// Declares a symbol defined outside this output.
    fn declare_external(&mut self, name: &str);

    /// Resolves symbols and produces the output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emit`] if a relocation names a symbol that is neither
    /// defined nor declared external.
    fn finish(self) -> Result<Self::Output>;
}

/// The product of an [`ObjectBuffer`].
#[derive(Debug, Clone, Default)]
pub struct ObjectImage {
    /// Contents of the `.text` section.
    pub text: Vec<u8>,
    /// Defined symbols.
    pub symbols: Vec<Symbol>,
    /// Relocations against external symbols, section relative.
    pub relocations: Vec<Relocation>,
}

impl ObjectImage {
    /// Looks up a defined symbol.
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

/// In-memory emitter with a single `.text` section.
#[derive(Debug)]
pub struct ObjectBuffer {
    text: Vec<u8>,
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
    relocations: Vec<Relocation>,
    externals: HashSet<String>,
    alignment: usize,
}

impl Default for ObjectBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBuffer {
    /// Creates an empty buffer aligning methods to 16 bytes.
    #[must_use]
    pub fn new() -> Self {
        ObjectBuffer {
            text: Vec::new(),
            symbols: Vec::new(),
            by_name: HashMap::new(),
            relocations: Vec::new(),
            externals: HashSet::new(),
            alignment: 16,
        }
    }
}

impl Emitter for ObjectBuffer {
    type Output = ObjectImage;

    fn emit_method(&mut self, method: &CompiledMethod) -> Result<Symbol> {
        if self.by_name.contains_key(&method.symbol) {
            return Err(emit_error!("duplicate symbol '{}'", method.symbol));
        }

        let padded = self.text.len().div_ceil(self.alignment) * self.alignment;
        self.text.resize(padded, 0);
        let base = self.text.len() as u64;
        self.text.extend_from_slice(&method.code);

        let symbol = Symbol {
            name: method.symbol.clone(),
            section: ".text".to_string(),
            offset: base,
            size: method.code.len() as u64,
        };
        self.by_name.insert(symbol.name.clone(), self.symbols.len());
        self.symbols.push(symbol.clone());
        self.relocations
            .extend(method.relocations.iter().map(|r| Relocation {
                offset: r.offset + base,
                ..r.clone()
            }));
        Ok(symbol)
    }

    fn declare_external(&mut self, name: &str) {
        self.externals.insert(name.to_string());
    }

    fn finish(mut self) -> Result<ObjectImage> {
        let mut external = Vec::new();
        for reloc in std::mem::take(&mut self.relocations) {
            let local = self.by_name.get(&reloc.symbol).map(|&i| &self.symbols[i]);
            match (local, reloc.kind) {
                (Some(symbol), RelocKind::Call | RelocKind::PcRel32) => {
                    let delta = symbol.offset as i64 + reloc.addend - (reloc.offset as i64 + 4);
                    let value = i32::try_from(delta)
                        .map_err(|_| emit_error!("call to '{}' out of range", reloc.symbol))?;
                    let offset = usize::try_from(reloc.offset)
                        .map_err(|_| emit_error!("relocation offset {} overflows", reloc.offset))?;
                    if !patch_le_at(&mut self.text, offset, value) {
                        return Err(emit_error!(
                            "relocation against '{}' at {:#x} lies outside .text",
                            reloc.symbol,
                            reloc.offset
                        ));
                    }
                }
                (Some(_), RelocKind::Absolute64) => external.push(reloc),
                (None, _) if self.externals.contains(&reloc.symbol) => external.push(reloc),
                (None, _) => {
                    return Err(emit_error!("unresolved symbol '{}'", reloc.symbol));
                }
            }
        }

        Ok(ObjectImage {
            text: self.text,
            symbols: self.symbols,
            relocations: external,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn method(symbol: &str, code: Vec<u8>, calls: &[(&str, u64)]) -> CompiledMethod {
        CompiledMethod {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            code,
            relocations: calls
                .iter()
                .map(|(target, offset)| Relocation {
                    symbol: (*target).to_string(),
                    offset: *offset,
                    addend: 0,
                    kind: RelocKind::Call,
                    target_type: 1,
                })
                .collect(),
            listing: Vec::new(),
            dumps: Vec::new(),
        }
    }

    #[test]
    fn resolves_local_calls_and_keeps_external_ones() {
        let mut object = ObjectBuffer::new();
        object.declare_external("ext");
        let a = object
            .emit_method(&method("a", vec![0; 10], &[("b", 2), ("ext", 6)]))
            .unwrap();
        let b = object.emit_method(&method("b", vec![0xAA; 4], &[])).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 16);

        let image = object.finish().unwrap();
        // 16 - (2 + 4)
        assert_eq!(&image.text[2..6], &10i32.to_le_bytes());
        assert_eq!(image.relocations.len(), 1);
        assert_eq!(image.relocations[0].symbol, "ext");
        assert_eq!(image.symbol("b").unwrap().size, 4);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let mut object = ObjectBuffer::new();
        object.emit_method(&method("a", vec![0], &[])).unwrap();
        assert!(matches!(
            object.emit_method(&method("a", vec![0], &[])),
            Err(Error::Emit(_))
        ));
    }

    #[test]
    fn unresolved_symbols_fail() {
        let mut object = ObjectBuffer::new();
        object
            .emit_method(&method("a", vec![0; 8], &[("missing", 0)]))
            .unwrap();
        assert!(matches!(object.finish(), Err(Error::Emit(_))));
    }
}
