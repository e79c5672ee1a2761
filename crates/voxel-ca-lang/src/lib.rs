//! Rule language for voxel cellular automata.
//!
//! Rules are written one per line:
//!
//! ```text
//! // Conway's game of life on the horizontal plane
//! #white_wool & [!2]moore2d@#white_wool & [!3]moore2d@#white_wool -> #air
//! #air & [3]moore2d@#white_wool -> #white_wool
//! ```
//!
//! Source flows through [`scan`] and [`Parser`] into a [`Program`], which
//! compiles into either an interpreter ([`CompiledRule`], a
//! [`voxel_ca_core::CellRule`]) or compute-kernel source
//! ([`KernelProgram`]).

pub mod analysis;
pub mod ast;
mod compile;
mod error;
pub mod kernel;
mod lexer;
mod parser;
mod program;

pub use ast::{Condition, Effect, Expression, Operator, Rule};
pub use compile::{apply_operator, compile, evaluate_condition, evaluate_expression, CompiledRule};
pub use error::{KernelError, LangError, LangResult, ParseError, ParseErrorKind};
pub use kernel::{compile_to_source, KernelCompiler, KernelConfig, KernelProgram};
pub use lexer::{scan, LexError, Token};
pub use parser::{Parser, BLOCK_IDENTIFIER};
pub use program::Program;
