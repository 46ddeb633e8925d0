// WBT - wbt-error
// Module: WBT Error Handling
//
// Copyright (c) 2026 The WBT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]

//! Error handling for the WebAssembly Binary Toolkit.
//!
//! Every failure in the toolkit is fatal to the pipeline invocation that
//! raised it; there are no recoverable errors. This crate provides the
//! single error type that flows through the reader, the interpreter
//! compiler, and the linker, categorized along the toolkit's error
//! taxonomy:
//!
//! - [`ErrorCategory::Decode`] — truncated input, invalid LEB128, unknown
//!   opcodes, section framing violations.
//! - [`ErrorCategory::Schema`] — structurally well-formed input carrying
//!   illegal declarations (bad value types, duplicate memories, nonzero
//!   reserved bytes).
//! - [`ErrorCategory::Validation`] — type-stack and control-label errors
//!   raised while compiling a function body.
//! - [`ErrorCategory::Link`] — undefined external symbols, conflicting
//!   start sections.
//! - [`ErrorCategory::Io`] — file system failures in the linker driver.
//!
//! Errors carry a `u16` code from [`codes`] and, where the failure was
//! detected at a known position in the input, the byte offset.

/// Error codes for the toolkit, grouped in category bands.
pub mod codes;
/// The error type and its factories.
pub mod errors;

pub use errors::{Error, ErrorCategory};

/// Result alias used across all toolkit crates.
pub type Result<T> = core::result::Result<T, Error>;
