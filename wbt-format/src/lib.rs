// WBT - wbt-format
// Module: WebAssembly Binary Format
//
// Copyright (c) 2026 The WBT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

//! WebAssembly binary format primitives for the toolkit.
//!
//! This crate holds everything the reader, the interpreter compiler, and
//! the linker agree on at the byte level:
//!
//! - LEB128 and fixed-width integer coding ([`binary`])
//! - value types, external kinds, limits, and signatures ([`types`])
//! - the static opcode metadata table ([`opcode`])
//! - owned section substructures and relocation records ([`module`])
//! - byte-buffer emission helpers ([`writer`])
//!
//! All functions here are pure over byte buffers; no IO, no global state.

pub mod binary;
pub mod module;
pub mod opcode;
pub mod types;
pub mod writer;

pub use types::{ExternalKind, FuncSignature, Limits, ValueType};
