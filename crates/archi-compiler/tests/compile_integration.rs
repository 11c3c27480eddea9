//! End-to-end checks: graph construction through image walking

use archi_compiler::{
    base_class, builtin, image_digest, ClassSpec, Compiler, ImageFile, ParameterSchema, Parameters,
    PrettyPrint, Registry, Slot, TypeDescriptor, TypedValue,
};
use archi_image::WORD;
use archi_ir::wire::{HEADER_CONTENTS, NAMED_NODE_VALUE, TAGGED_COUNT, TAGGED_PTR};
use archi_ir::Opcode;

fn word_at(bytes: &[u8], base: usize, addr: usize) -> usize {
    let off = addr - base;
    let mut buf = [0u8; WORD];
    buf.copy_from_slice(&bytes[off..off + WORD]);
    usize::from_ne_bytes(buf)
}

fn str_at(bytes: &[u8], base: usize, addr: usize) -> String {
    let off = addr - base;
    let len = bytes[off..]
        .iter()
        .position(|b| *b == 0)
        .expect("unterminated string");
    String::from_utf8(bytes[off..off + len].to_vec()).unwrap()
}

fn material_class() -> std::sync::Arc<dyn archi_compiler::ContextClass> {
    ClassSpec::new("material")
        .data_type(TypeDescriptor::private("engine.material"))
        .slot("albedo", 0, TypeDescriptor::Public(builtin::STRING))
        .setter("mask", 0, TypeDescriptor::Wildcard)
        .action(
            "bake",
            0,
            ParameterSchema::closed().with("quality", TypeDescriptor::Public(builtin::UINT)),
        )
        .constructible(
            ParameterSchema::closed().with("width", TypeDescriptor::Public(builtin::UINT)),
        )
        .build()
}

/// A small scene: configuration parameters, a material created from a
/// required factory, slot writes, one action, and cleanup.
fn build_scene(reg: &mut Registry) {
    let factory = reg.require("material_factory", base_class()).unwrap();
    let cfg = reg
        .assign_parameters(
            "render.cfg",
            &Parameters::new().set("quality", TypedValue::uint8(2)),
        )
        .unwrap();
    let mat = reg
        .create_from(
            "scene.mat",
            material_class(),
            &factory,
            &Parameters::new().set("width", TypedValue::uint32(640)),
        )
        .unwrap();
    reg.set(&mat, Slot::named("albedo"), TypedValue::string("brick"))
        .unwrap();
    reg.set(
        &mat,
        Slot::named("mask"),
        archi_compiler::SourceValue::slot(&cfg, Slot::named("quality")),
    )
    .unwrap();
    reg.act(
        &mat,
        Slot::named("bake"),
        &Parameters::new().set("quality", TypedValue::uint8(3)),
    )
    .unwrap();
    reg.delete(&cfg).unwrap();
}

fn expected_opcodes() -> Vec<usize> {
    vec![
        Opcode::InitParameters.to_word(),
        Opcode::InitFromContext.to_word(),
        Opcode::SetToValue.to_word(),
        Opcode::SetToContextSlot.to_word(),
        Opcode::Act.to_word(),
        Opcode::Delete.to_word(),
    ]
}

#[test]
fn test_image_replays_the_log_in_order() {
    let mut reg = Registry::new();
    build_scene(&mut reg);
    let base = 0x40000;
    let bytes = ImageFile::new(&reg).encode_at(base).unwrap();

    let contents = word_at(&bytes, base, base + HEADER_CONTENTS);
    let tagged = contents + NAMED_NODE_VALUE;
    assert_eq!(word_at(&bytes, base, tagged + TAGGED_COUNT), 6);

    let mut node = word_at(&bytes, base, tagged + TAGGED_PTR);
    let mut opcodes = Vec::new();
    while node != 0 {
        let instr = word_at(&bytes, base, node + WORD);
        opcodes.push(word_at(&bytes, base, instr));
        node = word_at(&bytes, base, node);
    }
    assert_eq!(opcodes, expected_opcodes());
}

#[test]
fn test_instruction_operands_resolve_through_the_image() {
    let mut reg = Registry::new();
    build_scene(&mut reg);
    let base = 0x1000;
    let bytes = ImageFile::new(&reg).encode_at(base).unwrap();

    let contents = word_at(&bytes, base, base + HEADER_CONTENTS);
    let mut node = word_at(&bytes, base, contents + NAMED_NODE_VALUE + TAGGED_PTR);
    let mut instrs = Vec::new();
    while node != 0 {
        instrs.push(word_at(&bytes, base, node + WORD));
        node = word_at(&bytes, base, node);
    }

    // INIT_FROM_CONTEXT: key then factory key.
    let init = instrs[1];
    assert_eq!(str_at(&bytes, base, word_at(&bytes, base, init + WORD)), "scene.mat");
    assert_eq!(
        str_at(&bytes, base, word_at(&bytes, base, init + 2 * WORD)),
        "material_factory"
    );

    // SET_TO_VALUE on the same key reuses the same interned string block.
    let set = instrs[2];
    assert_eq!(
        word_at(&bytes, base, init + WORD),
        word_at(&bytes, base, set + WORD)
    );
    let slot_name = word_at(&bytes, base, set + 2 * WORD);
    assert_eq!(str_at(&bytes, base, slot_name), "albedo");

    // The written value is the NUL-terminated payload.
    let payload = word_at(&bytes, base, set + 5 * WORD + TAGGED_PTR);
    assert_eq!(str_at(&bytes, base, payload), "brick");
}

#[test]
fn test_identical_graphs_compile_to_identical_bytes() {
    let mut first = Registry::new();
    build_scene(&mut first);
    let mut second = Registry::new();
    build_scene(&mut second);

    let a = ImageFile::new(&first).encode_at(0x8000).unwrap();
    let b = ImageFile::new(&second).encode_at(0x8000).unwrap();
    assert_eq!(a, b);
    assert_eq!(image_digest(&a), image_digest(&b));
}

#[test]
fn test_cluster_accounts_for_every_block() {
    let mut reg = Registry::new();
    build_scene(&mut reg);
    let image = ImageFile::new(&reg);

    let mut cluster = image.build_cluster().unwrap();
    cluster.pack();
    let totals = cluster.totals();
    let payload: usize = cluster.blocks().iter().map(|b| b.size()).sum();
    let header = cluster.header().map(|h| h.size()).unwrap_or(0);
    assert_eq!(totals.size, header + payload + totals.padding);

    let bytes = image.encode_at(0).unwrap();
    assert_eq!(bytes.len(), totals.size);
}

#[test]
fn test_compiler_wrapper_matches_the_manifest() {
    let mut compiler = Compiler::new();
    build_scene(compiler.registry_mut());

    let bytes = compiler.compile(0x2000).unwrap();
    let manifest = compiler.image().manifest().unwrap();
    assert_eq!(manifest.byte_size, bytes.len());
    assert_eq!(manifest.instruction_count, 6);
    assert_eq!(manifest.required_keys, ["material_factory"]);
    assert_eq!(manifest.live_keys, ["material_factory", "scene.mat"]);
    assert_eq!(manifest.contents, ["archi.instructions"]);

    let json = manifest.to_json().unwrap();
    assert!(json.contains("\"instruction_count\": 6"));
}

#[test]
fn test_log_renders_one_line_per_instruction() {
    let mut reg = Registry::new();
    build_scene(&mut reg);
    let rendered = reg.instructions().pretty_print();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].contains("INIT_PARAMETERS \"render.cfg\""));
    assert!(lines[1].contains("INIT_FROM_CONTEXT \"scene.mat\""));
    assert!(lines[5].contains("DELETE \"render.cfg\""));
}
