// WBT - wbt-decoder
// Module: WebAssembly Binary Reader
//
// Copyright (c) 2026 The WBT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

//! Streaming, event-driven reader for wasm module binaries.
//!
//! [`read_module`] walks a binary from byte 0 and delivers one typed
//! event per decoded unit — section boundaries, declarations, and
//! individual instructions — to a [`ModuleHandler`] supplied by the
//! caller. Events arrive in strict file order; every event for section
//! N completes before any event for section N+1 begins.
//!
//! There are no recoverable errors: on the first violation the reader
//! reports one diagnostic through [`ModuleHandler::on_error`] and
//! returns the failure to the top-level entry point.
//!
//! Two handler implementations live elsewhere in the toolkit: the
//! validating interpreter compiler (`wbt-compiler`) and the linker's
//! section scanner (`wbt-linker`). [`NopHandler`] is provided here for
//! callers that only want well-formedness checking.

pub mod handler;
pub mod reader;

pub use handler::{ModuleHandler, NopHandler};
pub use reader::{read_module, ReaderOptions};
