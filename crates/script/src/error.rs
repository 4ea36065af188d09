//! Error types for each stage of the pipeline: lex, parse, compile, run.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("[line {line}] unexpected character '{ch}'")]
    UnexpectedChar { line: u32, ch: char },

    #[error("[line {line}] unterminated string")]
    UnterminatedString { line: u32 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("[line {line}] {message}")]
    Syntax { line: u32, message: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("[line {line}] {message}")]
    Semantic { line: u32, message: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("operand must be a number")]
    NotANumber,

    #[error("value is not callable")]
    NotCallable,

    #[error("expected {expected} arguments but got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("stack overflow")]
    StackOverflow,

    #[error("{0}")]
    Native(String),
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("runtime error: {error}\n{trace}")]
    Runtime { error: RuntimeError, trace: String },
}
