//! Shared utility modules used across posattr components.

pub mod bits;
pub mod byte_order;
