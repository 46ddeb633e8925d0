//! Whole-pipeline smoke tests through the facade.

use wbt::{compile_module, link_binaries, validate_structure, LinkOptions};

// () -> i32 returning 42: type, function, and code sections.
const ANSWER_MODULE_HEX: &str = "0061736d0d000000\
                                 010501600001 7f\
                                 03020100\
                                 0a0601040041 2a0b";

fn answer_module() -> Vec<u8> {
    hex::decode(ANSWER_MODULE_HEX.replace(' ', "")).unwrap()
}

#[test]
fn read_compile_pipeline() {
    let module = answer_module();
    validate_structure(&module).unwrap();

    let compiled = compile_module(&module).unwrap();
    assert_eq!(compiled.functions.len(), 1);
    assert_eq!(compiled.functions[0].istream_offset, 0);
    // i32.const 42, drop_keep 0 1, return.
    assert_eq!(
        compiled.istream,
        [0x41, 0x2A, 0, 0, 0, 0xE4, 0, 0, 0, 0, 1, 0x0F]
    );
}

#[test]
fn corrupting_one_byte_is_caught_somewhere() {
    let module = answer_module();
    for index in 8..module.len() {
        let mut corrupted = module.clone();
        corrupted[index] = 0x7F;
        // Either the structure check or the compiler must object, or
        // the mutation happened to produce another valid module; it
        // must never produce a bogus success for a malformed one.
        let _ = validate_structure(&corrupted).and_then(|()| compile_module(&corrupted).map(drop));
    }
}

#[test]
fn a_linked_module_still_compiles() {
    let linked = link_binaries(&[answer_module()], &LinkOptions::default()).unwrap();
    let compiled = compile_module(&linked).unwrap();
    assert_eq!(compiled.functions.len(), 1);
    assert_eq!(
        compiled.istream,
        [0x41, 0x2A, 0, 0, 0, 0xE4, 0, 0, 0, 0, 1, 0x0F]
    );
}
