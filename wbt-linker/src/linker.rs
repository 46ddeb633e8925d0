//! Link driver: symbol resolution, index planning, and the public
//! entry points.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use wbt_error::{codes, Error, Result};
use wbt_format::ExternalKind;

use crate::emit;
use crate::input::LinkerInput;

/// Linker configuration.
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Produce relocatable output: unresolved imports stay in the
    /// import table and rebased `reloc.*` sections are emitted. When
    /// off, an unresolved function import is a fatal link error.
    pub relocatable: bool,
    /// Emit a merged debug-names custom section when any input carried
    /// one.
    pub write_debug_names: bool,
    /// Where [`link_files`] writes the combined module.
    pub output_path: Option<PathBuf>,
}

/// Merge object modules, in input order, into one binary.
pub fn link_binaries<D: AsRef<[u8]>>(binaries: &[D], options: &LinkOptions) -> Result<Vec<u8>> {
    let mut inputs = Vec::with_capacity(binaries.len());
    for (index, data) in binaries.iter().enumerate() {
        inputs.push(LinkerInput::read(
            format!("input {index}"),
            data.as_ref().to_vec(),
        )?);
    }
    link_inputs(&mut inputs, options)
}

/// Read object files, link them, and write `options.output_path` when
/// set. Returns the combined bytes either way.
pub fn link_files<P: AsRef<Path>>(paths: &[P], options: &LinkOptions) -> Result<Vec<u8>> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|io| {
            Error::io_error(
                codes::INPUT_READ_FAILED,
                format!("cannot read {}: {io}", path.display()),
            )
        })?;
        inputs.push(LinkerInput::read(path.display().to_string(), data)?);
    }
    let combined = link_inputs(&mut inputs, options)?;
    if let Some(output_path) = &options.output_path {
        std::fs::write(output_path, &combined).map_err(|io| {
            Error::io_error(
                codes::OUTPUT_WRITE_FAILED,
                format!("cannot write {}: {io}", output_path.display()),
            )
        })?;
    }
    Ok(combined)
}

/// Link already-scanned inputs.
pub fn link_inputs(inputs: &mut [LinkerInput], options: &LinkOptions) -> Result<Vec<u8>> {
    resolve_symbols(inputs);
    calculate_reloc_offsets(inputs);

    if !options.relocatable {
        for input in inputs.iter() {
            if let Some(import) = input.func_imports.iter().find(|import| import.active) {
                return Err(Error::link_error(
                    codes::UNDEFINED_SYMBOL,
                    format!(
                        "undefined symbol: {}.{} (imported by {})",
                        import.module, import.field, input.name
                    ),
                ));
            }
        }
    }

    emit::write_combined(inputs, options)
}

/// Build the export map and mark every resolvable function import
/// inactive.
///
/// Canonical order everywhere: inputs in command order, then symbols in
/// declaration order; resolution runs once before the single offset
/// pass, so offsets are stable.
fn resolve_symbols(inputs: &mut [LinkerInput]) {
    let mut exported_functions: HashMap<String, (usize, u32)> = HashMap::new();
    for (index, input) in inputs.iter().enumerate() {
        for export in &input.exports {
            if export.kind != ExternalKind::Func {
                continue;
            }
            if exported_functions.contains_key(&export.name) {
                warn!("duplicate function export {}; first wins", export.name);
                continue;
            }
            exported_functions.insert(export.name.clone(), (index, export.index));
        }
    }

    for input in inputs.iter_mut() {
        for import in &mut input.func_imports {
            if let Some(&definition) = exported_functions.get(&import.field) {
                import.active = false;
                import.resolved = Some(definition);
            }
        }
    }
}

/// Plan per-input offsets for every index space.
///
/// The final function index space is all active imports (input order,
/// declaration order) followed by every input's local functions. A
/// local function's offset therefore subtracts the input's own import
/// count, which can make the offset negative until it is applied.
fn calculate_reloc_offsets(inputs: &mut [LinkerInput]) {
    let total_active_func_imports: i64 = inputs
        .iter()
        .flat_map(|input| &input.func_imports)
        .filter(|import| import.active)
        .count() as i64;
    let total_global_imports: i64 = inputs
        .iter()
        .map(|input| i64::from(input.num_global_imports()))
        .sum();

    let mut type_total: u32 = 0;
    let mut local_func_total: i64 = 0;
    let mut local_global_total: i64 = 0;
    let mut global_import_total: u32 = 0;
    let mut elem_total: u32 = 0;
    let mut page_total: u32 = 0;

    for input in inputs.iter_mut() {
        input.type_index_offset = type_total;
        type_total += input.signatures.len() as u32;

        input.function_index_offset =
            total_active_func_imports + local_func_total - i64::from(input.num_func_imports());
        local_func_total += i64::from(input.num_functions);

        input.global_import_base = global_import_total;
        global_import_total += input.num_global_imports();
        input.global_index_offset =
            total_global_imports + local_global_total - i64::from(input.num_global_imports());
        local_global_total += i64::from(input.num_globals);

        input.table_index_offset = elem_total;
        elem_total += input.num_elem_entries();

        input.memory_page_offset = page_total;
        page_total += input.memory_limits.map_or(0, |limits| limits.initial);

        debug!(
            "{}: func offset {}, global offset {}, table base {}, page base {}",
            input.name,
            input.function_index_offset,
            input.global_index_offset,
            input.table_index_offset,
            input.memory_page_offset
        );
    }

    let mut ordinal = 0u32;
    for input in inputs.iter_mut() {
        for import in &mut input.func_imports {
            if import.active {
                import.relocated_index = ordinal;
                ordinal += 1;
            }
        }
    }
}

const MAX_RESOLUTION_DEPTH: u32 = 32;

/// Map a function index of one input into the merged index space.
///
/// References to resolved imports are remapped a second time through
/// the defining input's local space; a chain of re-exported imports is
/// followed with a depth bound.
pub fn relocate_func_index(inputs: &[LinkerInput], input_index: usize, index: u32) -> Result<u32> {
    relocate_func_index_depth(inputs, input_index, index, 0)
}

fn relocate_func_index_depth(
    inputs: &[LinkerInput],
    input_index: usize,
    index: u32,
    depth: u32,
) -> Result<u32> {
    if depth >= MAX_RESOLUTION_DEPTH {
        return Err(Error::link_error(
            codes::UNDEFINED_SYMBOL,
            "import resolution does not terminate",
        ));
    }
    let input = &inputs[input_index];
    let num_imports = input.num_func_imports();
    if index < num_imports {
        let import = &input.func_imports[index as usize];
        if import.active {
            return Ok(import.relocated_index);
        }
        match import.resolved {
            Some((def_input, def_index)) => {
                relocate_func_index_depth(inputs, def_input, def_index, depth + 1)
            }
            None => Err(Error::link_error(
                codes::UNDEFINED_SYMBOL,
                format!("undefined symbol: {}.{}", import.module, import.field),
            )),
        }
    } else {
        Ok((input.function_index_offset + i64::from(index)) as u32)
    }
}

/// Map a global index of one input into the merged index space.
pub fn relocate_global_index(inputs: &[LinkerInput], input_index: usize, index: u32) -> u32 {
    let input = &inputs[input_index];
    if index < input.num_global_imports() {
        input.global_import_base + index
    } else {
        (input.global_index_offset + i64::from(index)) as u32
    }
}

/// Map a type index of one input into the merged index space.
pub fn relocate_type_index(inputs: &[LinkerInput], input_index: usize, index: u32) -> u32 {
    inputs[input_index].type_index_offset + index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::FunctionImport;

    fn import(field: &str) -> FunctionImport {
        FunctionImport {
            module: "env".to_string(),
            field: field.to_string(),
            sig_index: 0,
            active: true,
            resolved: None,
            relocated_index: 0,
        }
    }

    #[test]
    fn function_offsets_follow_active_imports() {
        let mut inputs = vec![
            LinkerInput {
                name: "a".into(),
                num_functions: 2,
                exports: vec![wbt_format::module::Export {
                    name: "foo".into(),
                    kind: ExternalKind::Func,
                    index: 0,
                }],
                ..LinkerInput::default()
            },
            LinkerInput {
                name: "b".into(),
                num_functions: 1,
                func_imports: vec![import("foo"), import("missing")],
                ..LinkerInput::default()
            },
        ];
        resolve_symbols(&mut inputs);
        calculate_reloc_offsets(&mut inputs);

        // One active import ("missing") precedes all locals.
        assert!(!inputs[1].func_imports[0].active);
        assert!(inputs[1].func_imports[1].active);
        assert_eq!(inputs[1].func_imports[1].relocated_index, 0);

        // a's locals: 1 active import + 0 preceding locals - 0 imports.
        assert_eq!(inputs[0].function_index_offset, 1);
        // b's locals: 1 active + 2 preceding locals - 2 own imports.
        assert_eq!(inputs[1].function_index_offset, 1);

        // b's reference to import 0 follows the resolution into a.
        assert_eq!(relocate_func_index(&inputs, 1, 0).unwrap(), 1);
        // b's local function 0 (old index 2).
        assert_eq!(relocate_func_index(&inputs, 1, 2).unwrap(), 3);
    }

    #[test]
    fn unresolved_import_reference_fails_without_resolution() {
        let inputs = vec![LinkerInput {
            name: "a".into(),
            func_imports: vec![FunctionImport {
                active: false,
                resolved: None,
                ..import("ghost")
            }],
            ..LinkerInput::default()
        }];
        assert!(relocate_func_index(&inputs, 0, 0).is_err());
    }
}
