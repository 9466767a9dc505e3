//! Call target registry.
//!
//! Token resolution belongs to the metadata layer, which is not part of this crate. Callers
//! register the signature behind every call token a compilation unit uses; lowering looks
//! tokens up here to know how many arguments a call pops and whether it pushes a result.
//!
//! One registry is built per [`crate::Compiler`] and shared read-only by all passes and
//! worker threads, so tests can construct independent compilers without interference.

use std::{collections::HashMap, sync::Arc};

use crate::compiler::MethodSignature;

/// The callee description behind one call token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
    /// Fully qualified callee name.
    pub name: String,
    /// Callee signature.
    pub signature: MethodSignature,
}

impl CallSignature {
    /// Creates a callee description.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: MethodSignature) -> Self {
        CallSignature {
            name: name.into(),
            signature,
        }
    }
}

/// Maps call tokens to callee descriptions.
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    entries: HashMap<u32, Arc<CallSignature>>,
}

impl CallRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callee` under `token`, replacing any previous entry.
    pub fn register(&mut self, token: u32, callee: CallSignature) -> &mut Self {
        self.entries.insert(token, Arc::new(callee));
        self
    }

    /// Looks up the callee behind `token`.
    #[must_use]
    pub fn resolve(&self, token: u32) -> Option<&Arc<CallSignature>> {
        self.entries.get(&token)
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CompType;

    #[test]
    fn register_and_resolve() {
        let mut registry = CallRegistry::new();
        registry
            .register(
                0x0A00_0001,
                CallSignature::new(
                    "Math.Max",
                    MethodSignature::new(vec![CompType::Int32; 2], Some(CompType::Int32)),
                ),
            )
            .register(
                0x0A00_0002,
                CallSignature::new("Log.Flush", MethodSignature::default()),
            );

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve(0x0A00_0001).unwrap().name, "Math.Max");
        assert!(registry.resolve(0x0A00_0003).is_none());
    }
}
