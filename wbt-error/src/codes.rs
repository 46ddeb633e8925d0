//! Error code constants.
//!
//! Codes are grouped in bands by category: 1000s decode, 2000s schema,
//! 3000s validation, 4000s link, 5000s io.

// Decode errors (1000-1099)

/// Input ended before a complete item could be read.
pub const UNEXPECTED_EOF: u16 = 1000;
/// A LEB128 integer did not terminate within its maximum width.
pub const LEB128_OVERFLOW: u16 = 1001;
/// A LEB128 integer ran past the end of the buffer.
pub const LEB128_TRUNCATED: u16 = 1002;
/// Signed LEB128 trailing bits did not match the sign extension.
pub const LEB128_SIGN_EXTENSION: u16 = 1003;
/// The module did not start with `\0asm`.
pub const BAD_MAGIC: u16 = 1004;
/// The module version is not the supported version.
pub const BAD_VERSION: u16 = 1005;
/// A known section appeared out of order or more than once.
pub const SECTION_OUT_OF_ORDER: u16 = 1006;
/// A section handler did not consume exactly its declared payload.
pub const UNFINISHED_SECTION: u16 = 1007;
/// A declared item count did not match the items present.
pub const COUNT_MISMATCH: u16 = 1008;
/// An opcode byte (or prefix pair) has no known decoding.
pub const UNKNOWN_OPCODE: u16 = 1009;
/// A function body did not end with `end` at its declared boundary.
pub const UNFINISHED_FUNCTION_BODY: u16 = 1010;
/// A name was not valid UTF-8.
pub const INVALID_UTF8: u16 = 1011;

// Schema errors (2000-2099)

/// A byte did not decode to a concrete value type.
pub const INVALID_VALUE_TYPE: u16 = 2000;
/// A block signature byte was neither void nor a concrete value type.
pub const INVALID_BLOCK_TYPE: u16 = 2001;
/// More than one table or memory was declared.
pub const DUPLICATE_SECTION_ITEM: u16 = 2002;
/// A reserved byte was not zero.
pub const RESERVED_NONZERO: u16 = 2003;
/// An index referred past the declarations of its kind.
pub const INDEX_OUT_OF_RANGE: u16 = 2004;
/// Limits with `initial` above `max`, or pages above the module maximum.
pub const INVALID_LIMITS: u16 = 2005;
/// An element segment was declared without a table.
pub const ELEMENT_WITHOUT_TABLE: u16 = 2006;
/// A data segment was declared without a memory.
pub const DATA_WITHOUT_MEMORY: u16 = 2007;
/// A function signature declared more than one result.
pub const MULTIPLE_RESULTS: u16 = 2008;
/// An init expression was not one of the permitted constant forms.
pub const INVALID_INIT_EXPR: u16 = 2009;
/// An import descriptor kind byte was unknown.
pub const INVALID_EXTERNAL_KIND: u16 = 2010;
/// A relocation entry had an unknown type.
pub const INVALID_RELOC_TYPE: u16 = 2011;

// Validation errors (3000-3099)

/// An operand on the type stack did not match the expected type.
pub const TYPE_MISMATCH: u16 = 3000;
/// A value was required but the type stack was empty at this label.
pub const TYPE_STACK_UNDERFLOW: u16 = 3001;
/// A branch depth exceeded the current label stack.
pub const INVALID_BRANCH_DEPTH: u16 = 3002;
/// `else` or `end` appeared without a matching opening label.
pub const UNMATCHED_LABEL: u16 = 3003;
/// An `if` with a result type had no `else` arm.
pub const IF_WITHOUT_ELSE: u16 = 3004;
/// A local index exceeded the params + declared locals of the body.
pub const INVALID_LOCAL_INDEX: u16 = 3005;
/// `set_global` targeted an immutable global.
pub const IMMUTABLE_GLOBAL: u16 = 3006;
/// A load or store alignment exceeded its natural alignment.
pub const INVALID_ALIGNMENT: u16 = 3007;
/// Two exports of the same kind shared a name.
pub const DUPLICATE_EXPORT: u16 = 3008;
/// An instruction appeared after the function label was closed.
pub const EXPR_AFTER_END: u16 = 3009;
/// An init expression's type did not match its declaration.
pub const INIT_EXPR_TYPE_MISMATCH: u16 = 3010;
/// `call_indirect` was used in a module with no table.
pub const NO_TABLE: u16 = 3011;
/// A memory instruction was used in a module with no memory.
pub const NO_MEMORY: u16 = 3012;
/// The start function's signature was not `() -> ()`.
pub const BAD_START_SIGNATURE: u16 = 3013;
/// A declared function was never given a body.
pub const MISSING_FUNCTION_BODY: u16 = 3014;

// Link errors (4000-4099)

/// An import could not be resolved in executable output mode.
pub const UNDEFINED_SYMBOL: u16 = 4000;
/// More than one input carried a start section.
pub const CONFLICTING_START: u16 = 4001;
/// An input declared an import the linker cannot merge.
pub const UNSUPPORTED_IMPORT: u16 = 4002;
/// A relocation site did not hold the padded operand the record promises.
pub const BAD_RELOC_SITE: u16 = 4003;
/// A segment offset was not a plain constant the linker can rebase.
pub const UNSUPPORTED_SEGMENT_OFFSET: u16 = 4004;

// Io errors (5000-5099)

/// Reading a linker input failed.
pub const INPUT_READ_FAILED: u16 = 5000;
/// Writing the linked output failed.
pub const OUTPUT_WRITE_FAILED: u16 = 5001;
