//! Conversions between raw register contents and the values devices expose.

pub mod mode_table;
pub mod scaled;

pub use mode_table::ModeTable;
pub use scaled::ScaledRegister;
