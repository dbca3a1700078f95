//! Marshal-stream walker and rewriter for CPython `.pyc` containers.
//!
//! Parses the versioned, recursive, self-referential marshal object graph
//! that follows a `.pyc` header, locates embedded code objects, and
//! applies in-place, size-preserving type-code and opcode substitutions
//! driven by a caller-supplied [`Rules`](rules::Rules) adapter. Decoding,
//! disassembling, or executing the bytecode it walks over is out of scope.

pub mod buffers;
pub mod config;
pub mod error;
pub mod header;
pub mod mappers;
pub mod opcodes;
pub mod reader;
pub mod rules;
pub mod tables;
pub mod walker;

/// Version-sensitive layout tables: marshal type codes and `TYPE_CODE`
/// field shapes.
pub mod schema {
    /// Per-version `TYPE_CODE` field widths and optional fields.
    pub mod code_layout;
    /// The 7-bit marshal type-code byte values and their flags.
    pub mod typecode;
}

pub use self::config::ConfigRules;
pub use self::error::Error;
pub use self::rules::{IdentityRules, Rules};
pub use self::walker::Walker;
