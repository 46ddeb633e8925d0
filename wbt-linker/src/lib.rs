// WBT - wbt-linker
// Module: Relocatable Module Linker
//
// Copyright (c) 2026 The WBT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

//! Merges relocatable wasm object modules into one binary.
//!
//! Each input carries `reloc.<section>` custom sections enumerating
//! every LEB operand that refers to a function, type, global, table, or
//! memory index. Linking proceeds in passes:
//!
//! 1. scan each input with the reader's section-span configuration
//!    ([`input::LinkerInput`]),
//! 2. resolve function imports against exports
//!    ([`linker`] symbol resolution),
//! 3. plan per-input index offsets for every index space,
//! 4. rewrite every relocated operand in place as a fixed 5-byte LEB
//!    ([`reloc`]), keeping byte lengths stable,
//! 5. re-frame the merged module ([`emit`]): import, export, table,
//!    memory, element, start and name sections are recomputed; type,
//!    function, global, code and data payloads are carried over in
//!    input order.

pub mod emit;
pub mod input;
pub mod linker;
pub mod reloc;

pub use input::LinkerInput;
pub use linker::{link_binaries, link_files, LinkOptions};
