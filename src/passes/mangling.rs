//! Linkage names.
//!
//! A method named `A.B.C` with signature `(this, i32, obj) -> i64` becomes
//!
//! ```text
//! _ZN 1A 1B 1C E T i o _ l      (without the spaces)
//! ```
//!
//! Name segments are length prefixed. Bytes outside `[A-Za-z0-9_]` are written as `$` and two
//! hex digits, an empty segment (as in `.ctor`) as `0`. Types are coded `i` (i32), `l` (i64),
//! `n` (native int), `d` (float), `o` (object), `r` (managed pointer) and `u` (unknown); `v`
//! stands for a void return.

use std::{fmt::Write, sync::Arc};

use log::trace;

use crate::{
    compiler::{CallRegistry, MethodSignature, Pass},
    emit::StringTable,
    graph::Graph,
    ir::{CompType, Location},
    target::Target,
    Result,
};

const NAME: &str = "mangle-call-sites";

fn type_code(ct: CompType) -> char {
    match ct {
        CompType::Int32 => 'i',
        CompType::Int64 => 'l',
        CompType::IntPtr => 'n',
        CompType::Float => 'd',
        CompType::Object => 'o',
        CompType::Ref => 'r',
        CompType::Unknown => 'u',
    }
}

fn segment(out: &mut String, name: &str) {
    if name.is_empty() {
        out.push('0');
        return;
    }
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "${byte:02x}");
        }
    }
    let _ = write!(out, "{}{}", encoded.len(), encoded);
}

/// The linkage name of a method.
///
/// ```rust
/// use cilaot::{compiler::MethodSignature, ir::CompType, passes::mangle};
///
/// let sig = MethodSignature::new(vec![CompType::Int32; 2], Some(CompType::Int32));
/// assert_eq!(mangle("Math.Max", &sig), "_ZN4Math3MaxEii_i");
/// ```
#[must_use]
pub fn mangle(name: &str, signature: &MethodSignature) -> String {
    let mut out = String::from("_ZN");
    for part in name.split('.') {
        segment(&mut out, part);
    }
    out.push('E');
    if signature.has_this {
        out.push('T');
    }
    out.extend(signature.params.iter().map(|ct| type_code(*ct)));
    out.push('_');
    out.push(signature.ret.map_or('v', type_code));
    out
}

/// Replaces call tokens by the linkage names of their callees.
///
/// Every name is interned in the shared [`StringTable`], as is the method's own name.
pub struct MangleCallSites {
    registry: Arc<CallRegistry>,
    strings: Arc<StringTable>,
}

impl MangleCallSites {
    /// Creates the pass.
    #[must_use]
    pub fn new(registry: Arc<CallRegistry>, strings: Arc<StringTable>) -> Self {
        MangleCallSites { registry, strings }
    }
}

impl Pass for MangleCallSites {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Resolves call tokens to interned linkage names"
    }

    fn run(&self, mut graph: Graph, _target: &dyn Target) -> Result<Graph> {
        self.strings.intern(&graph.method().symbol());

        let mut sites = 0;
        for id in graph.linear_stream().to_vec() {
            let Some(mc) = graph.contents_mut(id).as_mc_mut() else {
                continue;
            };
            for param in mc.insts.iter_mut().flat_map(|i| i.params.iter_mut()) {
                let Location::CallToken(token) = param.loc else {
                    continue;
                };
                let callee = self
                    .registry
                    .resolve(token)
                    .ok_or_else(|| pass_error!(NAME, "unresolved call target 0x{:08x}", token))?;
                let symbol = mangle(&callee.name, &callee.signature);
                self.strings.intern(&symbol);
                param.loc = Location::Symbol(symbol);
                sites += 1;
            }
        }

        trace!("'{}': {} call sites named", graph.method().name, sites);
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::CallSignature,
        graph::NodeContents,
        ir::Param,
        target::{McInst, McNode, Ref64},
        Error,
    };

    #[test]
    fn mangled_names() {
        let mut sig = MethodSignature::new(
            vec![CompType::Int32, CompType::Object],
            Some(CompType::Int64),
        );
        sig.has_this = true;
        assert_eq!(mangle("A.B.C", &sig), "_ZN1A1B1CETio_l");
        assert_eq!(mangle("T..ctor", &MethodSignature::default()), "_ZN1T04ctorE_v");
        assert_eq!(mangle("List`1.Add", &MethodSignature::default()), "_ZN8List$6013AddE_v");
    }

    #[test]
    fn call_tokens_become_interned_symbols() {
        let mut registry = CallRegistry::new();
        registry.register(
            0x0A00_0002,
            CallSignature::new(
                "Console.WriteLine",
                MethodSignature::new(vec![CompType::Int32], None),
            ),
        );
        let strings = Arc::new(StringTable::new());
        let pass = MangleCallSites::new(Arc::new(registry), strings.clone());

        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![McInst::target(
            0x17,
            "call",
            vec![Param::other(Location::CallToken(0x0A00_0002))],
        )])));
        let graph = pass.run(graph, &Ref64::new()).unwrap();

        let symbol = "_ZN7Console9WriteLineEi_v";
        assert_eq!(
            graph.node(a).contents.as_mc().unwrap().insts[0].params[0].loc,
            Location::Symbol(symbol.to_string())
        );
        assert!(strings.lookup(symbol).is_some());

        let mut graph = Graph::detached();
        graph.add_node(NodeContents::Mc(McNode::new(vec![McInst::target(
            0x17,
            "call",
            vec![Param::other(Location::CallToken(0x0A00_0009))],
        )])));
        assert!(matches!(
            pass.run(graph, &Ref64::new()),
            Err(Error::Pass { pass: NAME, .. })
        ));
    }
}
