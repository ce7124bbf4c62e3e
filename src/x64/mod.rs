//! x86-64 architecture-specific components.
//!
//! This module contains the x86-64 glue between iced-x86 and the register
//! file:
//! - Register mapping onto (register, facet) pairs
//! - Register operands of decoded instructions
//!
//! The write semantics live in [`WritePolicy::x86_64`](crate::core::WritePolicy::x86_64)
//! and the register counts in [`ArchConfig::x86_64`](crate::core::ArchConfig::x86_64).

pub mod operands;
pub mod registers;

pub use operands::{address_operands, clears_upper_bits, destination, register_operands};
pub use registers::{map_register, parse_register, register_name, to_iced, Operand};
