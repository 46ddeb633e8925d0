//! Event-order tests for the streaming reader.

use wbt_decoder::{read_module, ModuleHandler, ReaderOptions};
use wbt_error::Result;
use wbt_format::module::RelocEntry;
use wbt_format::types::{BlockType, FuncSignature, ValueType};
use wbt_format::writer::BinaryWriter;
use wbt_format::ExternalKind;

#[derive(Default)]
struct RecordingHandler {
    events: Vec<String>,
}

impl RecordingHandler {
    fn push(&mut self, event: String) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

impl ModuleHandler for RecordingHandler {
    fn begin_module(&mut self, version: u32) -> Result<()> {
        self.push(format!("begin_module({version})"))
    }
    fn end_module(&mut self) -> Result<()> {
        self.push("end_module".into())
    }
    fn begin_type_section(&mut self, size: u32) -> Result<()> {
        self.push(format!("begin_type_section({size})"))
    }
    fn on_type_count(&mut self, count: u32) -> Result<()> {
        self.push(format!("on_type_count({count})"))
    }
    fn on_signature(&mut self, index: u32, sig: &FuncSignature) -> Result<()> {
        self.push(format!("on_signature({index}, {sig})"))
    }
    fn end_type_section(&mut self) -> Result<()> {
        self.push("end_type_section".into())
    }
    fn on_import_func(
        &mut self,
        import_index: u32,
        func_index: u32,
        module: &str,
        field: &str,
        sig_index: u32,
    ) -> Result<()> {
        self.push(format!(
            "on_import_func({import_index}, {func_index}, {module}, {field}, {sig_index})"
        ))
    }
    fn on_function(&mut self, index: u32, sig_index: u32) -> Result<()> {
        self.push(format!("on_function({index}, {sig_index})"))
    }
    fn on_export(
        &mut self,
        index: u32,
        kind: ExternalKind,
        item_index: u32,
        name: &str,
    ) -> Result<()> {
        self.push(format!(
            "on_export({index}, {}, {item_index}, {name})",
            kind.name()
        ))
    }
    fn begin_function_body(&mut self, index: u32) -> Result<()> {
        self.push(format!("begin_function_body({index})"))
    }
    fn on_local_decl_count(&mut self, count: u32) -> Result<()> {
        self.push(format!("on_local_decl_count({count})"))
    }
    fn on_local_decl(&mut self, decl_index: u32, count: u32, ty: ValueType) -> Result<()> {
        self.push(format!("on_local_decl({decl_index}, {count}, {ty})"))
    }
    fn on_i32_const_expr(&mut self, value: i32) -> Result<()> {
        self.push(format!("on_i32_const_expr({value})"))
    }
    fn on_block_expr(&mut self, block_type: BlockType) -> Result<()> {
        let ty = block_type.map_or("void", ValueType::name);
        self.push(format!("on_block_expr({ty})"))
    }
    fn on_br_expr(&mut self, depth: u32) -> Result<()> {
        self.push(format!("on_br_expr({depth})"))
    }
    fn on_end_expr(&mut self) -> Result<()> {
        self.push("on_end_expr".into())
    }
    fn end_function_body(&mut self, index: u32) -> Result<()> {
        self.push(format!("end_function_body({index})"))
    }
    fn on_function_name(&mut self, index: u32, name: &str) -> Result<()> {
        self.push(format!("on_function_name({index}, {name})"))
    }
    fn begin_reloc_section(&mut self, section_id: u8, name: Option<&str>) -> Result<()> {
        self.push(format!("begin_reloc_section({section_id}, {name:?})"))
    }
    fn on_reloc(&mut self, entry: RelocEntry) -> Result<()> {
        self.push(format!("on_reloc({:?}, {})", entry.ty, entry.offset))
    }
    fn on_error(&mut self, offset: usize, message: &str) {
        self.events.push(format!("on_error({offset:#x}, {message})"));
    }
}

fn header() -> BinaryWriter {
    let mut writer = BinaryWriter::canonical();
    writer.write_module_header();
    writer
}

#[test]
fn empty_module_events() {
    let data = header().into_bytes();
    assert_eq!(data, [0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00]);

    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
    assert_eq!(handler.events, ["begin_module(13)", "end_module"]);
}

#[test]
fn type_section_events() {
    let mut writer = header();
    // One signature: () -> i32.
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F]);
    let data = writer.into_bytes();

    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
    assert_eq!(
        handler.events,
        [
            "begin_module(13)",
            "begin_type_section(5)",
            "on_type_count(1)",
            "on_signature(0, () -> i32)",
            "end_type_section",
            "end_module",
        ]
    );
}

#[test]
fn function_body_events() {
    let mut writer = header();
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F]); // () -> i32
    writer.write_section(3, &[0x01, 0x00]); // one function, sig 0
    // Body: one i64 local group, i32.const 42, end.
    writer.write_section(10, &[0x01, 0x06, 0x01, 0x01, 0x7E, 0x41, 0x2A, 0x0B]);
    let data = writer.into_bytes();

    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
    let body: Vec<_> = handler
        .events
        .iter()
        .filter(|e| !e.contains("section") && !e.contains("module") && !e.contains("on_function("))
        .cloned()
        .collect();
    assert_eq!(
        body,
        [
            "on_type_count(1)",
            "on_signature(0, () -> i32)",
            "begin_function_body(0)",
            "on_local_decl_count(1)",
            "on_local_decl(0, 1, i64)",
            "on_i32_const_expr(42)",
            "on_end_expr",
            "end_function_body(0)",
        ]
    );
}

#[test]
fn skip_function_bodies_suppresses_expr_events() {
    let mut writer = header();
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x01, 0x7F]);
    writer.write_section(3, &[0x01, 0x00]);
    writer.write_section(10, &[0x01, 0x04, 0x00, 0x41, 0x2A, 0x0B]);
    let data = writer.into_bytes();

    let options = ReaderOptions {
        skip_function_bodies: true,
        ..Default::default()
    };
    let mut handler = RecordingHandler::default();
    read_module(&data, &options, &mut handler).unwrap();
    assert!(handler.events.iter().any(|e| e == "begin_function_body(0)"));
    assert!(!handler.events.iter().any(|e| e.contains("const")));
}

#[test]
fn import_precedes_local_functions_in_index_space() {
    let mut writer = header();
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x00]); // () -> ()
    // Import "env"."f" as a function with sig 0.
    let mut imports = vec![0x01];
    imports.extend_from_slice(&[0x03, b'e', b'n', b'v']);
    imports.extend_from_slice(&[0x01, b'f']);
    imports.extend_from_slice(&[0x00, 0x00]);
    writer.write_section(2, &imports);
    writer.write_section(3, &[0x01, 0x00]);
    writer.write_section(7, &[0x01, 0x01, b'g', 0x00, 0x01]); // export "g" = func 1
    writer.write_section(10, &[0x01, 0x02, 0x00, 0x0B]);
    let data = writer.into_bytes();

    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
    assert!(handler
        .events
        .contains(&"on_import_func(0, 0, env, f, 0)".to_string()));
    assert!(handler
        .events
        .contains(&"on_export(0, function, 1, g)".to_string()));
}

#[test]
fn export_index_out_of_range_is_rejected() {
    let mut writer = header();
    writer.write_section(7, &[0x01, 0x01, b'g', 0x00, 0x00]); // func 0, none declared
    let data = writer.into_bytes();

    let mut handler = RecordingHandler::default();
    let err = read_module(&data, &ReaderOptions::default(), &mut handler).unwrap_err();
    assert_eq!(err.code, wbt_error::codes::INDEX_OUT_OF_RANGE);
    // The diagnostic sink saw the same message the caller got.
    assert!(handler.events.last().unwrap().starts_with("on_error("));
}

#[test]
fn name_section_events_behind_option() {
    let mut writer = header();
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x00]);
    writer.write_section(3, &[0x01, 0x00]);
    writer.write_section(10, &[0x01, 0x02, 0x00, 0x0B]);
    // name payload: one function named "main", no locals.
    let mut names = Vec::new();
    names.push(0x01);
    names.push(0x04);
    names.extend_from_slice(b"main");
    names.push(0x00);
    writer.write_custom_section("name", &names);
    let data = writer.into_bytes();

    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
    assert!(!handler.events.iter().any(|e| e.contains("function_name")));

    let options = ReaderOptions {
        read_debug_names: true,
        ..Default::default()
    };
    let mut handler = RecordingHandler::default();
    read_module(&data, &options, &mut handler).unwrap();
    assert!(handler
        .events
        .contains(&"on_function_name(0, main)".to_string()));
}

#[test]
fn reloc_section_events() {
    let mut writer = header();
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x00]);
    // reloc.code: target section 10, one FuncIndexLeb entry at offset 4.
    writer.write_custom_section("reloc.code", &[0x0A, 0x01, 0x00, 0x04]);
    let data = writer.into_bytes();

    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
    assert!(handler
        .events
        .contains(&"begin_reloc_section(10, None)".to_string()));
    assert!(handler
        .events
        .contains(&"on_reloc(FuncIndexLeb, 4)".to_string()));
}

#[test]
fn custom_sections_may_appear_between_known_sections() {
    let mut writer = header();
    writer.write_section(1, &[0x00]);
    writer.write_custom_section("metadata", &[1, 2, 3]);
    writer.write_section(3, &[0x00]);
    let data = writer.into_bytes();
    let mut handler = RecordingHandler::default();
    read_module(&data, &ReaderOptions::default(), &mut handler).unwrap();
}

#[test]
fn limits_validated_on_memory_section() {
    let mut writer = header();
    // memory with initial 2, max 1
    writer.write_section(5, &[0x01, 0x01, 0x02, 0x01]);
    let data = writer.into_bytes();
    let err = read_module(
        &data,
        &ReaderOptions::default(),
        &mut RecordingHandler::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, wbt_error::codes::INVALID_LIMITS);
}

#[test]
fn table_import_plus_table_section_is_duplicate() {
    let mut writer = header();
    let mut imports = vec![0x01];
    imports.extend_from_slice(&[0x01, b'e']);
    imports.extend_from_slice(&[0x01, b't']);
    imports.extend_from_slice(&[0x01, 0x70, 0x00, 0x00]); // table import, no max
    writer.write_section(2, &imports);
    writer.write_section(4, &[0x01, 0x70, 0x00, 0x00]);
    let data = writer.into_bytes();
    let err = read_module(
        &data,
        &ReaderOptions::default(),
        &mut RecordingHandler::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, wbt_error::codes::DUPLICATE_SECTION_ITEM);
}

#[test]
fn reserved_byte_must_be_zero() {
    let mut writer = header();
    writer.write_section(1, &[0x01, 0x60, 0x00, 0x00]);
    writer.write_section(3, &[0x01, 0x00]);
    writer.write_section(5, &[0x01, 0x00, 0x01]);
    // grow_memory with reserved = 1
    writer.write_section(10, &[0x01, 0x06, 0x00, 0x41, 0x00, 0x40, 0x01, 0x0B]);
    let data = writer.into_bytes();
    let err = read_module(
        &data,
        &ReaderOptions::default(),
        &mut RecordingHandler::default(),
    )
    .unwrap_err();
    assert_eq!(err.code, wbt_error::codes::RESERVED_NONZERO);
}
