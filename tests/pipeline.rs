//! End-to-end compilation tests on the `ref64` target.
//!
//! Each test hand-assembles CIL for a small method, compiles it through the full pipeline
//! with [`Compiler`] and inspects the encoded output, the listing, the dumps or the failure
//! report. Tests that link several methods go through [`ObjectBuffer`].

use std::{collections::HashMap, sync::Arc};

use cilaot::prelude::*;

const MATH_MAX: u32 = 0x0A00_0001;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int_sig(params: usize) -> MethodSignature {
    MethodSignature::new(vec![CompType::Int32; params], Some(CompType::Int32))
}

fn registry() -> CallRegistry {
    let mut registry = CallRegistry::new();
    registry.register(MATH_MAX, CallSignature::new("Math.Max", int_sig(2)));
    registry
}

fn compiler(config: CompilerConfig) -> Compiler {
    init_logging();
    Compiler::new(Arc::new(Ref64::new()), registry(), config)
}

/// `static int Sum(int n) { int s = 0; for (int i = 0; i < n; i++) s += i; return s; }`
fn sum_loop(name: &str) -> MethodSource {
    let code = vec![
        0x16, 0x0A, // 0: ldc.i4.0; stloc.0
        0x16, 0x0B, // 2: ldc.i4.0; stloc.1
        0x2B, 0x08, // 4: br.s 14
        0x06, 0x07, 0x58, 0x0A, // 6: ldloc.0; ldloc.1; add; stloc.0
        0x07, 0x17, 0x58, 0x0B, // 10: ldloc.1; ldc.i4.1; add; stloc.1
        0x07, 0x02, 0x32, 0xF4, // 14: ldloc.1; ldarg.0; blt.s 6
        0x06, 0x2A, // 18: ldloc.0; ret
    ];
    let info = MethodInfo::new(name, int_sig(1)).with_locals(vec![CompType::Int32; 2]);
    MethodSource::new(info, code)
}

/// `static int Max(int a, int b) => a > b ? a : b;`
fn max() -> MethodSource {
    let code = vec![
        0x02, 0x03, 0x31, 0x02, // 0: ldarg.0; ldarg.1; ble.s 6
        0x02, 0x2A, // 4: ldarg.0; ret
        0x03, 0x2A, // 6: ldarg.1; ret
    ];
    MethodSource::new(MethodInfo::new("Math.Max", int_sig(2)), code)
}

/// `static int Clamp(int a) => Math.Max(a, 0);`
fn clamp() -> MethodSource {
    let code = vec![0x02, 0x16, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A];
    MethodSource::new(MethodInfo::new("Demo.Clamp", int_sig(1)), code)
}

/// `static int Pick(int k) { switch (k) { case 0: return 10; case 1: return 20; } return 0; }`
fn pick() -> MethodSource {
    let mut code = vec![0x02, 0x45, 0x02, 0x00, 0x00, 0x00];
    code.extend_from_slice(&2i32.to_le_bytes());
    code.extend_from_slice(&5i32.to_le_bytes());
    code.extend_from_slice(&[
        0x16, 0x2A, // 14: ldc.i4.0; ret
        0x1F, 0x0A, 0x2A, // 16: ldc.i4.s 10; ret
        0x1F, 0x14, 0x2A, // 19: ldc.i4.s 20; ret
    ]);
    MethodSource::new(MethodInfo::new("Demo.Pick", int_sig(1)), code)
}

/// `static int Twice(int a) => Math.Max(a, a) + a;` keeps `a` live across the call.
fn twice() -> MethodSource {
    let code = vec![
        0x02, 0x02, 0x28, 0x01, 0x00, 0x00, 0x0A, // ldarg.0; ldarg.0; call Math.Max
        0x02, 0x58, 0x2A, // ldarg.0; add; ret
    ];
    MethodSource::new(MethodInfo::new("Demo.Twice", int_sig(1)), code)
}

fn compile(source: &MethodSource) -> CompiledMethod {
    compiler(CompilerConfig::default())
        .compile_method(source)
        .unwrap_or_else(|failure| {
            panic!(
                "'{}' failed in {}: {}",
                failure.method, failure.stage, failure.error
            )
        })
}

/// Splits a listing line `"0012: add r0, r4, r0"` into its mnemonic and operands.
fn instruction(line: &str) -> (&str, Vec<String>) {
    let text = line.split_once(": ").map_or(line, |(_, inst)| inst);
    let (op, rest) = text.split_once(' ').unwrap_or((text, ""));
    let operands = rest
        .split(", ")
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    (op, operands)
}

fn mnemonics(method: &CompiledMethod) -> Vec<String> {
    method
        .listing
        .iter()
        .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
        .collect()
}

#[test]
fn test_loop() {
    let compiled = compile(&sum_loop("Demo.Sum"));

    assert_eq!(compiled.symbol, "_ZN4Demo3SumEi_i");
    assert!(!compiled.code.is_empty());
    assert!(compiled.relocations.is_empty());
    assert!(compiled.dumps.is_empty());

    let ops = mnemonics(&compiled);
    assert_eq!(ops.first().map(String::as_str), Some("enter"));
    assert_eq!(ops.last().map(String::as_str), Some("ret"));
    assert!(ops.iter().any(|op| op == "jcc"));
    assert!(ops.iter().any(|op| op == "jmp"));
    assert_eq!(ops.iter().filter(|op| *op == "leave").count(), 1);

    // no virtual registers or unresolved slots survive
    for line in &compiled.listing {
        assert!(!line.contains(" v"), "unallocated operand in '{line}'");
        assert!(!line.contains("loc"), "unplaced local in '{line}'");
        assert!(!line.contains("arg"), "unplaced argument in '{line}'");
    }
}

#[test]
fn test_call_is_relocated() {
    let compiled = compile(&clamp());

    assert_eq!(compiled.symbol, "_ZN4Demo5ClampEi_i");
    assert_eq!(compiled.relocations.len(), 1);
    let reloc = &compiled.relocations[0];
    assert_eq!(reloc.symbol, "_ZN4Math3MaxEii_i");
    assert_eq!(reloc.kind, RelocKind::Call);
    assert_eq!(reloc.addend, 0);
    assert!((reloc.offset as usize) + 4 <= compiled.code.len());
    assert_eq!(
        &compiled.code[reloc.offset as usize..reloc.offset as usize + 4],
        &[0, 0, 0, 0]
    );
    assert!(mnemonics(&compiled).iter().any(|op| op == "call"));
}

#[test]
fn test_values_live_across_calls_are_saved() {
    let compiled = compile(&twice());
    let call = compiled
        .listing
        .iter()
        .position(|l| l.contains(": call "))
        .unwrap_or_else(|| panic!("no call in {:#?}", compiled.listing));

    let add = compiled
        .listing
        .iter()
        .position(|l| l.contains(": add "))
        .unwrap_or_else(|| panic!("no add in {:#?}", compiled.listing));
    assert!(add > call);
    assert_eq!(compiled.relocations.len(), 1);

    // Follow the copies between the call and the add. The call leaves its result in r0;
    // values that survive the call sit in r4/r5 or in frame slots, and reach other registers
    // only by being copied from there.
    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Origin {
        CallResult,
        Preserved,
    }
    let mut origin: HashMap<String, Origin> = HashMap::from([
        ("r0".to_string(), Origin::CallResult),
        ("r4".to_string(), Origin::Preserved),
        ("r5".to_string(), Origin::Preserved),
    ]);
    let lookup = |origin: &HashMap<String, Origin>, operand: &str| {
        origin
            .get(operand)
            .copied()
            .or_else(|| operand.starts_with("[fp").then_some(Origin::Preserved))
    };
    for line in &compiled.listing[call + 1..add] {
        let (op, operands) = instruction(line);
        let Some(dst) = operands.first() else {
            continue;
        };
        let copied = match (op, operands.get(1)) {
            ("mov", Some(src)) => lookup(&origin, src),
            _ => None,
        };
        match copied {
            Some(o) => origin.insert(dst.clone(), o),
            None => origin.remove(dst),
        };
    }

    let (_, operands) = instruction(&compiled.listing[add]);
    assert_eq!(operands.len(), 3, "{}", compiled.listing[add]);
    let mut sources: Vec<Option<Origin>> =
        operands[1..].iter().map(|o| lookup(&origin, o)).collect();
    sources.sort_by_key(|o| format!("{o:?}"));
    assert_eq!(
        sources,
        vec![Some(Origin::CallResult), Some(Origin::Preserved)],
        "add reads a clobbered location in {:#?}",
        compiled.listing
    );
}

#[test]
fn test_switch() {
    let compiled = compile(&pick());
    let ops = mnemonics(&compiled);

    assert!(ops.iter().any(|op| op == "switch"));
    assert_eq!(ops.iter().filter(|op| *op == "ret").count(), 3);
}

#[test]
fn test_object_buffer_links_methods() -> Result<()> {
    let compiler = compiler(CompilerConfig::default());
    let output = compiler.compile_unit(&[clamp(), max()])?;
    assert_eq!(output.compiled.len(), 2);
    assert!(output.failed.is_empty());

    let mut buffer = ObjectBuffer::new();
    let clamp_sym = buffer.emit_method(&output.compiled[0])?;
    let max_sym = buffer.emit_method(&output.compiled[1])?;
    assert_eq!(clamp_sym.offset, 0);
    assert_eq!(max_sym.offset % 16, 0);
    assert!(max_sym.offset >= clamp_sym.size);

    let call_field = output.compiled[0].relocations[0].offset;
    let image = buffer.finish()?;
    assert!(image.relocations.is_empty());
    assert!(image.symbol("_ZN4Math3MaxEii_i").is_some());

    let field = call_field as usize;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&image.text[field..field + 4]);
    let displacement = i64::from(i32::from_le_bytes(bytes));
    assert_eq!(displacement, max_sym.offset as i64 - (call_field as i64 + 4));

    let strings = compiler.strings();
    assert!(strings.lookup("_ZN4Math3MaxEii_i").is_some());
    assert!(strings.lookup("_ZN4Demo5ClampEi_i").is_some());
    Ok(())
}

#[test]
fn test_external_symbols() -> Result<()> {
    let compiled = compile(&clamp());

    let mut unresolved = ObjectBuffer::new();
    unresolved.emit_method(&compiled)?;
    assert!(matches!(unresolved.finish(), Err(Error::Emit(_))));

    let mut buffer = ObjectBuffer::new();
    buffer.emit_method(&compiled)?;
    buffer.declare_external("_ZN4Math3MaxEii_i");
    let image = buffer.finish()?;
    assert_eq!(image.relocations.len(), 1);
    assert_eq!(image.relocations[0].symbol, "_ZN4Math3MaxEii_i");

    let mut duplicate = ObjectBuffer::new();
    duplicate.emit_method(&compiled)?;
    assert!(matches!(
        duplicate.emit_method(&compiled),
        Err(Error::Emit(_))
    ));
    Ok(())
}

#[test]
fn test_parallel_matches_sequential() -> Result<()> {
    let sources: Vec<MethodSource> = (0..64)
        .map(|i| match i % 4 {
            0 => sum_loop(&format!("Demo.Sum{i}")),
            1 => clamp(),
            2 => pick(),
            _ => twice(),
        })
        .collect();

    let parallel = compiler(CompilerConfig::default()).compile_unit(&sources)?;
    let sequential =
        compiler(CompilerConfig::default().with_parallel(false)).compile_unit(&sources)?;

    assert_eq!(parallel.compiled.len(), sources.len());
    for (p, s) in parallel.compiled.iter().zip(&sequential.compiled) {
        assert_eq!(p.name, s.name);
        assert_eq!(p.code, s.code);
        assert_eq!(p.relocations, s.relocations);
        assert_eq!(p.listing, s.listing);
    }
    for (compiled, source) in parallel.compiled.iter().zip(&sources) {
        assert_eq!(compiled.name, source.info.name);
    }
    Ok(())
}

#[test]
fn test_unverified_graphs_compile_the_same() -> Result<()> {
    let unverified = compiler(CompilerConfig::default().with_verify_graphs(false))
        .compile_method(&sum_loop("Demo.Sum"))
        .map_err(Error::from)?;
    let verified = compile(&sum_loop("Demo.Sum"));
    assert_eq!(unverified.code, verified.code);
    assert_eq!(unverified.listing, verified.listing);
    Ok(())
}

#[test]
fn test_dumps() -> Result<()> {
    let compiler = compiler(CompilerConfig::default().with_dumps(true));
    let compiled = compiler
        .compile_method(&sum_loop("Demo.Sum"))
        .map_err(Error::from)?;

    let names = compiler.pipeline().pass_names();
    assert_eq!(compiled.dumps.len(), names.len() + 1);
    for (dump, name) in compiled.dumps.iter().zip(&names) {
        assert!(dump.starts_with(&format!("Graph before {name}:")), "{dump}");
    }
    assert!(compiled.dumps[names.len()].starts_with("Final graph:"));
    Ok(())
}

#[test]
fn test_standard_pass_order() {
    let compiler = compiler(CompilerConfig::default());
    assert_eq!(
        compiler.pipeline().pass_names(),
        vec![
            "lower-to-machine-ir",
            "stack-trace",
            "target-lower",
            "dominance",
            "ssa-convert",
            "gen-kill",
            "liveness",
            "register-allocate",
            "machine-liveness",
            "preserve-across-calls",
            "remove-redundant-moves",
            "callee-preserves",
            "allocate-local-vars",
            "mangle-call-sites",
            "ref64-encode",
        ]
    );
}

#[test]
fn test_failures_name_their_stage() {
    let compiler = compiler(
        CompilerConfig::default()
            .with_dumps(true)
            .with_failure_policy(FailurePolicy::SkipMethod),
    );

    // 0: ldarg.0; 1: brtrue.s 4; 3: ldc.i4.0; 4: ret  (stack depth 0 vs 1 at the join)
    let mismatch = MethodSource::new(
        MethodInfo::new("Demo.Mismatch", int_sig(1)),
        vec![0x02, 0x2D, 0x01, 0x16, 0x2A],
    );
    // ldstr is outside the supported instruction set
    let string = MethodSource::new(
        MethodInfo::new("Demo.Text", MethodSignature::new(Vec::new(), Some(CompType::Object))),
        vec![0x72, 0x01, 0x00, 0x00, 0x70, 0x2A],
    );
    // call through a token nobody registered
    let unknown = MethodSource::new(
        MethodInfo::new("Demo.Unknown", MethodSignature::default()),
        vec![0x28, 0x09, 0x00, 0x00, 0x0A, 0x2A],
    );

    let output = compiler
        .compile_unit(&[mismatch, clamp(), string, unknown])
        .unwrap_or_else(|e| panic!("skip policy returned {e}"));

    assert_eq!(output.compiled.len(), 1);
    assert_eq!(output.compiled[0].name, "Demo.Clamp");

    let stages: Vec<(&str, &str)> = output
        .failed
        .iter()
        .map(|f| (f.method.as_str(), f.stage))
        .collect();
    assert_eq!(
        stages,
        vec![
            ("Demo.Mismatch", "stack-trace"),
            ("Demo.Text", "lower-to-machine-ir"),
            ("Demo.Unknown", "lower-to-machine-ir"),
        ]
    );
    for failure in &output.failed {
        assert!(matches!(failure.error, Error::Pass { .. }));
        let dump = failure.last_dump.as_deref().unwrap_or_default();
        assert!(dump.starts_with(&format!("Graph before {}:", failure.stage)));
    }

    // failing neighbours leave no trace in the method that compiled
    let alone = compiler
        .compile_unit(&[clamp()])
        .unwrap_or_else(|e| panic!("clamp alone failed: {e}"));
    let (alone, together) = (&alone.compiled[0], &output.compiled[0]);
    assert_eq!(alone.symbol, together.symbol);
    assert_eq!(alone.code, together.code);
    assert_eq!(alone.listing, together.listing);
    assert_eq!(alone.relocations, together.relocations);
    assert_eq!(alone.dumps, together.dumps);
}

#[test]
fn test_checked_memory_and_float_bodies() {
    let ptr_sig = |params: Vec<CompType>| MethodSignature::new(params, Some(CompType::Int32));
    let mut r8 = vec![0x23];
    r8.extend_from_slice(&1.0f64.to_le_bytes());
    r8.extend_from_slice(&[0x69, 0x2A]);

    let cases = [
        // ldarg.0; ldarg.1; add.ovf; ret
        ("Demo.AddChecked", int_sig(2), vec![0x02, 0x03, 0xD6, 0x2A], "addo"),
        // ldarg.0; conv.ovf.i2; ret
        ("Demo.Narrow", int_sig(1), vec![0x02, 0xB5, 0x2A], "exto"),
        // ldarg.0; ldind.i4; ret
        ("Demo.Load", ptr_sig(vec![CompType::IntPtr]), vec![0x02, 0x4A, 0x2A], "ld"),
        // ldarg.0; ldarg.1; stind.i4; ldc.i4.0; ret
        (
            "Demo.Store",
            ptr_sig(vec![CompType::IntPtr, CompType::Int32]),
            vec![0x02, 0x03, 0x54, 0x16, 0x2A],
            "st",
        ),
        // ldc.r8 1.0; conv.i4; ret
        ("Demo.Truncate", int_sig(0), r8, "cvtfi"),
        // ldarg.0; ldarg.1; add; ret
        (
            "Demo.FloatSum",
            MethodSignature::new(vec![CompType::Float; 2], Some(CompType::Float)),
            vec![0x02, 0x03, 0x58, 0x2A],
            "fadd",
        ),
    ];

    for (name, signature, code, expected) in cases {
        let compiled = compile(&MethodSource::new(MethodInfo::new(name, signature), code));
        let ops = mnemonics(&compiled);
        assert!(
            ops.iter().any(|op| op == expected),
            "{name}: no {expected} in {:#?}",
            compiled.listing
        );
        assert!(!ops.iter().any(|op| op == "???"), "{name}: {:#?}", compiled.listing);
        assert_eq!(ops.last().map(String::as_str), Some("ret"));
    }
}
