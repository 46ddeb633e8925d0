//! End-to-end compilation tests: hand-assembled binaries in, istream out.

use wbt_compiler::{compile_module, Value};
use wbt_error::codes;
use wbt_format::writer::BinaryWriter;

// Istream opcode bytes used in expectations.
const BR: u8 = 0x0C;
const RETURN: u8 = 0x0F;
const CALL: u8 = 0x10;
const GET_LOCAL: u8 = 0x20;
const I32_CONST: u8 = 0x41;
const DROP: u8 = 0x1A;
const ALLOCA: u8 = 0xE0;
const BR_UNLESS: u8 = 0xE1;
const DATA: u8 = 0xE3;
const DROP_KEEP: u8 = 0xE4;

struct ModuleBuilder {
    writer: BinaryWriter,
}

impl ModuleBuilder {
    fn new() -> Self {
        let mut writer = BinaryWriter::canonical();
        writer.write_module_header();
        Self { writer }
    }

    fn section(mut self, id: u8, payload: &[u8]) -> Self {
        self.writer.write_section(id, payload);
        self
    }

    // One body: local groups as (count, type byte) pairs, then code.
    fn code_section(self, bodies: &[(&[(u8, u8)], &[u8])]) -> Self {
        let mut payload = vec![bodies.len() as u8];
        for (locals, code) in bodies {
            let mut body = vec![locals.len() as u8];
            for (count, ty) in *locals {
                body.push(*count);
                body.push(*ty);
            }
            body.extend_from_slice(code);
            payload.push(body.len() as u8);
            payload.extend_from_slice(&body);
        }
        self.section(10, &payload)
    }

    fn build(self) -> Vec<u8> {
        self.writer.into_bytes()
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[test]
fn empty_module_compiles_to_nothing() {
    let module = compile_module(&ModuleBuilder::new().build()).unwrap();
    assert!(module.istream.is_empty());
    assert!(module.functions.is_empty());
    assert!(module.table.is_none());
    assert!(module.memory.is_none());
}

#[test]
fn const_body_lowers_to_const_drop_keep_return() {
    // () -> i32, body: i32.const 42; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x41, 0x2A, 0x0B])])
        .build();
    let module = compile_module(&data).unwrap();
    assert_eq!(module.functions[0].istream_offset, 0);
    #[rustfmt::skip]
    assert_eq!(
        module.istream,
        vec![
            I32_CONST, 0x2A, 0x00, 0x00, 0x00,
            DROP_KEEP, 0x00, 0x00, 0x00, 0x00, 0x01,
            RETURN,
        ]
    );
}

#[test]
fn block_branch_targets_the_offset_after_end() {
    // () -> i32, body: block (result i32) { i32.const 7; br 0 }; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x02, 0x7F, 0x41, 0x07, 0x0C, 0x00, 0x0B, 0x0B])])
        .build();
    let module = compile_module(&data).unwrap();
    // Layout: const(5) drop_keep(6) br(1+4) | epilogue drop_keep(6) return.
    assert_eq!(module.istream[11], BR);
    let target = u32_at(&module.istream, 12);
    assert_eq!(target, 16, "br must land immediately after the block's end");
    assert_eq!(module.istream[16], DROP_KEEP);
}

#[test]
fn mismatched_if_arms_fail_citing_the_else_arm() {
    // () -> i32, body: i32.const 1; if (result i32) { i32.const 1 }
    // else { i64.const 2 }; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .code_section(&[(
            &[],
            &[0x41, 0x01, 0x04, 0x7F, 0x41, 0x01, 0x05, 0x42, 0x02, 0x0B, 0x0B],
        )])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::TYPE_MISMATCH);
    assert!(err.message.contains("else arm"), "got: {}", err.message);
    assert!(err.message.contains("expected i32, got i64"));
}

#[test]
fn if_with_result_requires_else() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x41, 0x01, 0x04, 0x7F, 0x41, 0x01, 0x0B, 0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::IF_WITHOUT_ELSE);
}

#[test]
fn if_else_emits_br_unless_and_skip_branch() {
    // () -> (), body: i32.const 1; if { nop } else { nop }; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(
            &[],
            &[0x41, 0x01, 0x04, 0x40, 0x01, 0x05, 0x01, 0x0B, 0x0B],
        )])
        .build();
    let module = compile_module(&data).unwrap();
    // const(5), br_unless(1+4), br(1+4), return.
    assert_eq!(module.istream[5], BR_UNLESS);
    let else_start = u32_at(&module.istream, 6);
    // br_unless skips the then arm and the skip-branch, landing at the
    // start of the (empty) else arm.
    assert_eq!(module.istream[10], BR);
    assert_eq!(else_start, 15);
    let end_target = u32_at(&module.istream, 11);
    assert_eq!(end_target, 15, "then arm jumps over the else arm");
    assert_eq!(module.istream[15], RETURN);
}

#[test]
fn forward_calls_are_patched_when_the_callee_appears() {
    // Two () -> () functions; the first calls the second.
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x02, 0x00, 0x00])
        .code_section(&[(&[], &[0x10, 0x01, 0x0B]), (&[], &[0x0B])])
        .build();
    let module = compile_module(&data).unwrap();
    assert_eq!(module.istream[0], CALL);
    assert_eq!(module.functions[1].istream_offset, 6);
    assert_eq!(u32_at(&module.istream, 1), 6);
}

#[test]
fn locals_reserve_slots_and_translate_indices() {
    // () -> (), two i32 locals, body: get_local 0; drop; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[(2, 0x7F)], &[0x20, 0x00, 0x0B])])
        .build();
    let module = compile_module(&data).unwrap();
    #[rustfmt::skip]
    assert_eq!(
        module.istream,
        vec![
            ALLOCA, 0x02, 0x00, 0x00, 0x00,
            // distance from top of stack: 2 locals, empty operand stack
            GET_LOCAL, 0x02, 0x00, 0x00, 0x00,
            DROP,
            // epilogue drops the two local slots
            DROP_KEEP, 0x02, 0x00, 0x00, 0x00, 0x00,
            RETURN,
        ]
    );
}

#[test]
fn params_are_addressed_like_locals() {
    // (i32) -> i32, body: get_local 0; end. No alloca: nothing declared.
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x01, 0x7F, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x20, 0x00, 0x0B])])
        .build();
    let module = compile_module(&data).unwrap();
    #[rustfmt::skip]
    assert_eq!(
        module.istream,
        vec![
            GET_LOCAL, 0x01, 0x00, 0x00, 0x00,
            // drop the param, keep the result
            DROP_KEEP, 0x01, 0x00, 0x00, 0x00, 0x01,
            RETURN,
        ]
    );
}

#[test]
fn loop_branches_jump_backward_without_fixups() {
    // () -> (), body: loop { br 0 }; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x03, 0x40, 0x0C, 0x00, 0x0B, 0x0B])])
        .build();
    let module = compile_module(&data).unwrap();
    assert_eq!(module.istream, vec![BR, 0x00, 0x00, 0x00, 0x00, RETURN]);
}

#[test]
fn br_table_emits_an_inline_jump_table() {
    // () -> (), body: block { i32.const 0; br_table [0] default 0 }; end
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(
            &[],
            &[0x02, 0x40, 0x41, 0x00, 0x0E, 0x01, 0x00, 0x00, 0x0B, 0x0B],
        )])
        .build();
    let module = compile_module(&data).unwrap();
    let s = &module.istream;
    assert_eq!(s[5], 0x0E); // br_table
    assert_eq!(u32_at(s, 6), 1); // num_targets
    assert_eq!(u32_at(s, 10), 19); // table_offset: first entry
    assert_eq!(s[14], DATA);
    assert_eq!(u32_at(s, 15), 18); // 2 entries x 9 bytes
    // Both entries target the end of the block (offset 37), drop 0 keep 0.
    assert_eq!(u32_at(s, 19), 37);
    assert_eq!(u32_at(s, 23), 0);
    assert_eq!(s[27], 0);
    assert_eq!(u32_at(s, 28), 37);
    assert_eq!(s[37], RETURN);
}

#[test]
fn unreachable_code_is_polymorphic() {
    // () -> i32: unreachable; end — the missing result is permitted.
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x00, 0x0B])])
        .build();
    assert!(compile_module(&data).is_ok());

    // Dead instructions after a br still type-check polymorphically.
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        // block (result i32) { i32.const 1; br 0; i32.add }; end
        .code_section(&[(
            &[],
            &[0x02, 0x7F, 0x41, 0x01, 0x0C, 0x00, 0x6A, 0x0B, 0x0B],
        )])
        .build();
    assert!(compile_module(&data).is_ok());
}

#[test]
fn type_stack_underflow_is_detected() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x1A, 0x0B])]) // drop on empty stack
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::TYPE_STACK_UNDERFLOW);
}

#[test]
fn branch_depth_is_checked() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x0C, 0x05, 0x0B])]) // br 5
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::INVALID_BRANCH_DEPTH);
}

#[test]
fn binary_op_operand_types_are_checked() {
    // i32.add over (i32, i64) must fail.
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x41, 0x01, 0x42, 0x02, 0x6A, 0x1A, 0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::TYPE_MISMATCH);
    assert!(err.message.contains("i32.add"));
}

#[test]
fn select_requires_matching_operands() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        // i32.const, i64.const, i32.const (cond), select
        .code_section(&[(
            &[],
            &[0x41, 0x01, 0x42, 0x02, 0x41, 0x00, 0x1B, 0x1A, 0x0B],
        )])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::TYPE_MISMATCH);
    assert!(err.message.contains("select"));
}

#[test]
fn memory_instructions_require_a_memory() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        // i32.const 0; i32.load align=2 offset=0; drop
        .code_section(&[(&[], &[0x41, 0x00, 0x28, 0x02, 0x00, 0x1A, 0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::NO_MEMORY);
}

#[test]
fn over_natural_alignment_is_rejected() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .section(5, &[0x01, 0x00, 0x01]) // memory, 1 page
        // i32.load with align_log2 = 3 (8 bytes) on a 4-byte access
        .code_section(&[(&[], &[0x41, 0x00, 0x28, 0x03, 0x00, 0x1A, 0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::INVALID_ALIGNMENT);
}

#[test]
fn set_global_requires_mutability() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .section(6, &[0x01, 0x7F, 0x00, 0x41, 0x05, 0x0B]) // immutable i32 = 5
        .code_section(&[(&[], &[0x41, 0x01, 0x24, 0x00, 0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::IMMUTABLE_GLOBAL);
}

#[test]
fn globals_are_evaluated_at_compile_time() {
    let data = ModuleBuilder::new()
        .section(6, &[0x01, 0x7F, 0x01, 0x41, 0x2A, 0x0B]) // mutable i32 = 42
        .build();
    let module = compile_module(&data).unwrap();
    assert_eq!(module.globals[0].value, Value::I32(42));
    assert!(module.globals[0].mutable);
}

#[test]
fn global_initializer_type_is_checked() {
    let data = ModuleBuilder::new()
        .section(6, &[0x01, 0x7F, 0x00, 0x42, 0x2A, 0x0B]) // i32 global, i64 init
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::INIT_EXPR_TYPE_MISMATCH);
}

#[test]
fn imported_global_initializer_uses_declared_zero() {
    let mut imports = vec![0x01];
    imports.extend_from_slice(&[0x03, b'e', b'n', b'v']);
    imports.extend_from_slice(&[0x01, b'g']);
    imports.extend_from_slice(&[0x03, 0x7F, 0x00]); // global import, i32, const
    let data = ModuleBuilder::new()
        .section(2, &imports)
        .section(6, &[0x01, 0x7F, 0x00, 0x23, 0x00, 0x0B]) // i32 = get_global 0
        .build();
    let module = compile_module(&data).unwrap();
    assert_eq!(module.globals[0].value, Value::I32(0));
}

#[test]
fn duplicate_export_names_are_rejected_per_kind() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x02, 0x00, 0x00])
        .section(
            7,
            &[0x02, 0x01, b'f', 0x00, 0x00, 0x01, b'f', 0x00, 0x01],
        )
        .code_section(&[(&[], &[0x0B]), (&[], &[0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::DUPLICATE_EXPORT);
}

#[test]
fn start_function_signature_is_checked() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F])
        .section(3, &[0x01, 0x00])
        .section(8, &[0x00])
        .code_section(&[(&[], &[0x41, 0x01, 0x0B])])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::BAD_START_SIGNATURE);
}

#[test]
fn segments_are_evaluated_into_the_image() {
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .section(4, &[0x01, 0x70, 0x00, 0x02]) // table, 2 elements
        .section(5, &[0x01, 0x00, 0x01]) // memory, 1 page
        .section(9, &[0x01, 0x00, 0x41, 0x01, 0x0B, 0x01, 0x00]) // elem at 1: [f0]
        .code_section(&[(&[], &[0x0B])])
        .section(11, &[0x01, 0x00, 0x41, 0x08, 0x0B, 0x02, 0xAA, 0xBB])
        .build();
    let module = compile_module(&data).unwrap();
    let table = module.table.unwrap();
    assert_eq!(table.elements[0].offset, 1);
    assert_eq!(table.elements[0].func_indices, vec![0]);
    let memory = module.memory.unwrap();
    assert_eq!(memory.data_segments[0].offset, 8);
    assert_eq!(memory.data_segments[0].data, vec![0xAA, 0xBB]);
}

#[test]
fn imported_functions_call_through_call_host() {
    let mut imports = vec![0x01];
    imports.extend_from_slice(&[0x03, b'e', b'n', b'v']);
    imports.extend_from_slice(&[0x01, b'f']);
    imports.extend_from_slice(&[0x00, 0x00]);
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(2, &imports)
        .section(3, &[0x01, 0x00])
        .code_section(&[(&[], &[0x10, 0x00, 0x0B])]) // call import 0
        .build();
    let module = compile_module(&data).unwrap();
    assert_eq!(module.istream[0], 0xE2); // call_host
    assert_eq!(u32_at(&module.istream, 1), 0);
}

#[test]
fn call_argument_types_are_checked() {
    // (i32) -> (), called with an i64 argument.
    let data = ModuleBuilder::new()
        .section(
            1,
            &[0x02, 0x60, 0x01, 0x7F, 0x00, 0x60, 0x00, 0x00],
        )
        .section(3, &[0x02, 0x00, 0x01])
        .code_section(&[
            (&[], &[0x0B]),
            (&[], &[0x42, 0x01, 0x10, 0x00, 0x0B]),
        ])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::TYPE_MISMATCH);
}

#[test]
fn missing_bodies_are_detected() {
    // Function declared, no code section at all.
    let data = ModuleBuilder::new()
        .section(1, &[0x01, 0x60, 0x00, 0x00])
        .section(3, &[0x01, 0x00])
        .build();
    let err = compile_module(&data).unwrap_err();
    assert_eq!(err.code, codes::MISSING_FUNCTION_BODY);
}
