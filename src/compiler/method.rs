//! Descriptions of the methods handed to the compiler.
//!
//! Metadata loading is not part of this crate. Callers describe each method with a
//! [`MethodInfo`] (name, signature, local types, exception regions) and pair it with its code
//! bytes in a [`MethodSource`].

use std::sync::Arc;

use crate::{file::MethodBody, ir::CompType, passes::mangle, Result};

/// Parameter and return types of a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodSignature {
    /// Whether an implicit `this` argument precedes the declared parameters.
    pub has_this: bool,
    /// Declared parameter types.
    pub params: Vec<CompType>,
    /// Return type, `None` for `void`.
    pub ret: Option<CompType>,
}

impl MethodSignature {
    /// A static method signature.
    #[must_use]
    pub fn new(params: Vec<CompType>, ret: Option<CompType>) -> Self {
        MethodSignature {
            has_this: false,
            params,
            ret,
        }
    }

    /// Number of arguments including `this`.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Type of argument `index` as seen by `ldarg`, counting `this` as argument 0.
    #[must_use]
    pub fn arg_type(&self, index: usize) -> Option<CompType> {
        match (self.has_this, index) {
            (true, 0) => Some(CompType::Object),
            (true, i) => self.params.get(i - 1).copied(),
            (false, i) => self.params.get(i).copied(),
        }
    }

    /// Argument types in order, including `this`.
    #[must_use]
    pub fn arg_types(&self) -> Vec<CompType> {
        (0..self.arg_count()).filter_map(|i| self.arg_type(i)).collect()
    }
}

/// A protected region and its handler, in code offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EhRegion {
    /// Start of the protected block.
    pub try_offset: usize,
    /// Length of the protected block.
    pub try_length: usize,
    /// Start of the handler.
    pub handler_offset: usize,
    /// Length of the handler.
    pub handler_length: usize,
}

impl EhRegion {
    /// Returns `true` if `offset` lies in the protected block or the handler.
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        (self.try_offset..self.try_offset + self.try_length).contains(&offset)
            || (self.handler_offset..self.handler_offset + self.handler_length).contains(&offset)
    }
}

/// Everything the pipeline needs to know about a method besides its code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodInfo {
    /// Fully qualified name, e.g. `System.Math.Max`.
    pub name: String,
    /// Signature.
    pub signature: MethodSignature,
    /// Types of the local variables.
    pub locals: Vec<CompType>,
    /// Exception handling regions.
    pub regions: Vec<EhRegion>,
}

impl MethodInfo {
    /// Creates a method description without locals or regions.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: MethodSignature) -> Self {
        MethodInfo {
            name: name.into(),
            signature,
            locals: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Adds local variable types.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<CompType>) -> Self {
        self.locals = locals;
        self
    }

    /// The linkage name the compiled method is emitted under.
    #[must_use]
    pub fn symbol(&self) -> String {
        mangle(&self.name, &self.signature)
    }
}

/// A method description paired with its code bytes.
#[derive(Debug, Clone)]
pub struct MethodSource {
    /// The method description.
    pub info: Arc<MethodInfo>,
    /// Code bytes, optionally preceded by a tiny or fat method header.
    pub bytes: Vec<u8>,
    /// Whether `bytes` starts with a method header.
    pub has_header: bool,
}

impl MethodSource {
    /// A method whose `code` carries no header.
    #[must_use]
    pub fn new(info: MethodInfo, code: Vec<u8>) -> Self {
        MethodSource {
            info: Arc::new(info),
            bytes: code,
            has_header: false,
        }
    }

    /// A method whose `bytes` start with a tiny or fat method header.
    #[must_use]
    pub fn with_header(info: MethodInfo, bytes: Vec<u8>) -> Self {
        MethodSource {
            info: Arc::new(info),
            bytes,
            has_header: true,
        }
    }

    /// The code view, parsing the header if present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the header is malformed.
    pub fn body(&self) -> Result<MethodBody<'_>> {
        if self.has_header {
            MethodBody::from_header(&self.bytes)
        } else {
            Ok(MethodBody::new(&self.bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_arguments() {
        let sig = MethodSignature {
            has_this: true,
            params: vec![CompType::Int64],
            ret: None,
        };
        assert_eq!(sig.arg_count(), 2);
        assert_eq!(sig.arg_type(0), Some(CompType::Object));
        assert_eq!(sig.arg_type(1), Some(CompType::Int64));
        assert_eq!(sig.arg_type(2), None);
    }

    #[test]
    fn region_bounds() {
        let region = EhRegion {
            try_offset: 2,
            try_length: 3,
            handler_offset: 10,
            handler_length: 1,
        };
        assert!(!region.contains(1));
        assert!(region.contains(4));
        assert!(!region.contains(5));
        assert!(region.contains(10));
    }

    #[test]
    fn body_with_header() {
        let source = MethodSource::with_header(MethodInfo::default(), vec![0x06, 0x2A]);
        assert_eq!(source.body().unwrap().code(), &[0x2A]);
        let raw = MethodSource::new(MethodInfo::default(), vec![0x2A]);
        assert_eq!(raw.body().unwrap().len(), 1);
    }
}
