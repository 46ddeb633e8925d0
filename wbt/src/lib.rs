// WBT - wbt
// Module: Toolkit Facade
//
// Copyright (c) 2026 The WBT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

//! WebAssembly Binary Toolkit.
//!
//! A library for reading, validating, linking, and lowering wasm
//! module binaries. Three subsystems share one binary format, one
//! relocatable index model, and one notion of section identity:
//!
//! - **Reader** ([`wbt_decoder`]): a streaming, event-driven decoder of
//!   the module format. Callers implement [`ModuleHandler`] and receive
//!   one typed event per decoded unit, in file order.
//! - **Validator + interpreter compiler** ([`wbt_compiler`]): a handler
//!   that type-checks each function body against a symbolic operand
//!   stack and lowers it to a direct-threaded instruction stream.
//! - **Linker** ([`wbt_linker`]): merges relocatable object modules,
//!   resolving imports against exports and rewriting every relocated
//!   operand to its merged index.
//!
//! Data flows reader → handler events → istream for compilation, and
//! reader → section spans → combined binary for linking.
//!
//! ```
//! use wbt::{compile_module, read_module, NopHandler, ReaderOptions};
//!
//! // Magic plus version, no sections: the empty module.
//! let module = [0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
//! read_module(&module, &ReaderOptions::default(), &mut NopHandler)?;
//! let compiled = compile_module(&module)?;
//! assert!(compiled.istream.is_empty());
//! # wbt::Result::Ok(())
//! ```
//!
//! Every failure is fatal to its pipeline invocation: the first error
//! is reported through the handler's `on_error` sink and returned; no
//! partial output is ever exposed.

pub use wbt_error::{codes, Error, ErrorCategory, Result};

pub use wbt_format::{binary, module, opcode, types, writer};
pub use wbt_format::{ExternalKind, FuncSignature, Limits, ValueType};

pub use wbt_decoder::{read_module, ModuleHandler, NopHandler, ReaderOptions};

pub use wbt_compiler::{compile_module, CompiledModule, Compiler};

pub use wbt_linker::{link_binaries, link_files, LinkOptions, LinkerInput};

/// Check a binary for well-formedness without keeping anything.
///
/// Runs the reader with a no-op handler; schema and framing invariants
/// are enforced, function bodies are decoded but not type-checked.
pub fn validate_structure(data: &[u8]) -> Result<()> {
    read_module(data, &ReaderOptions::default(), &mut NopHandler)
}
