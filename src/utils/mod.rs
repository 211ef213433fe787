//! Small, self-contained helpers shared by several modules.

pub mod str;
pub mod sync;

pub use self::str::str_from_ascii;
