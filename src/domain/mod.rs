//! Core domain types and logic.

pub mod ast;
pub mod cache;
pub mod candle;
pub mod compiler;
pub mod config_validation;
pub mod context;
pub mod context_builder;
pub mod engine;
pub mod error;
pub mod eval;
pub mod functions;
pub mod indicator;
pub mod lexer;
pub mod lru;
pub mod parser;
pub mod project_vars;
pub mod providers;
pub mod regime;
pub mod regime_monitor;
pub mod validator;
pub mod value;
