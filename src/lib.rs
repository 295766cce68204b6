//! data-bakery: declarative SQL seed data.
//!
//! Recipes describe rows per table with placeholder ID tokens. A
//! [`core::resolver::RecipeManager`] turns the tokens into integers that are
//! unique per table across a whole run, and [`core::codegen`] renders the
//! resolved rows as batched `INSERT` statements.

pub mod cli;
pub mod core;
