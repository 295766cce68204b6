//! Core baking logic: tokens, resolution, SQL generation, recipe loading, export.

pub mod codegen;
pub mod error;
pub mod export;
pub mod files;
pub mod parser;
pub mod recipe;
pub mod resolver;
pub mod tokens;
pub mod types;
