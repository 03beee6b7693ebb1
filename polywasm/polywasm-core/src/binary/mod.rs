//! Binary parsing for the WASM MVP format: cursor, LEB128, type tags, and section decoding.
//! Everything here reports `DecodeError` with absolute byte offsets.

pub mod cursor;
pub mod leb128;
pub mod reader;
pub mod sections;
pub mod types;

pub use cursor::Cursor;

use crate::error::DecodeError;

/// Result alias for binary reading operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// `\0asm` read as a little-endian u32.
pub const MAGIC: u32 = 0x6D_73_61_00;

/// Binary format version accepted by the decoder.
pub const VERSION: u32 = 1;
