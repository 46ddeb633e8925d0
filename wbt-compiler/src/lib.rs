// WBT - wbt-compiler
// Module: Validator + Interpreter Compiler
//
// Copyright (c) 2026 The WBT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

//! Single-pass validator and interpreter compiler.
//!
//! The [`Compiler`] rides on the streaming reader as its event handler:
//! while the reader decodes a function body, the compiler maintains a
//! symbolic type stack and a control-label stack, verifies every
//! instruction against its static signature, and appends bytecodes to a
//! linear instruction stream (the *istream*) for a stack interpreter.
//!
//! Forward branches and forward calls are emitted with placeholder
//! operands and patched once their targets resolve: branch fixups when
//! the target label closes, call fixups when the callee's body is
//! reached. A successfully compiled module carries its istream out via
//! [`CompiledModule`]; nothing partial survives a failure.

pub mod compiler;
pub mod istream;
pub mod module;

pub use compiler::{compile_module, Compiler};
pub use istream::IstreamWriter;
pub use module::{CompiledFunc, CompiledGlobal, CompiledModule, Value};
