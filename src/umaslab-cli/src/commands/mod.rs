//! Command handlers for umaslabs CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod configure;
pub mod layout;
pub mod slabs;
pub mod symbols;
pub mod zones;
