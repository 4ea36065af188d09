//! RogueScript: a small scripting language compiled to bytecode and run
//! on a stack VM. The public surface is intentionally small: compile
//! source with [`Vm::interpret`], bind host functionality with
//! [`Vm::register_native`], and persist compiled chunks to `.rgb` files
//! with [`save_chunk`]/[`load_chunk`].

pub mod ast;
pub mod chunk;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;
pub mod vm;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chunk::FunctionProto;

pub use error::{CompileError, LexError, ParseError, RuntimeError, ScriptError};
pub use value::Value;
pub use vm::{Outcome, Vm};

/// Serializes a compiled script to a `.rgb` file via `bincode`. The format
/// is implementation-defined; only round-tripping through [`load_chunk`]
/// is guaranteed.
pub fn save_chunk(proto: &FunctionProto, path: impl AsRef<Path>) -> Result<(), bincode::Error> {
    let file = File::create(path).map_err(bincode::Error::from)?;
    bincode::serialize_into(BufWriter::new(file), proto)
}

pub fn load_chunk(path: impl AsRef<Path>) -> Result<FunctionProto, bincode::Error> {
    let file = File::open(path).map_err(bincode::Error::from)?;
    bincode::deserialize_from(BufReader::new(file))
}

/// Compiles `source` without running it, for tooling that only needs the
/// serializable representation (e.g. the `compile` CLI subcommand).
pub fn compile_only(source: &str) -> Option<FunctionProto> {
    let tokens = lexer::Lexer::new(source).tokenize().ok()?;
    let program = parser::Parser::new(tokens).parse()?;
    compiler::Compiler::new().compile(&program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytecode_round_trips_through_rgb_file() {
        let proto = compile_only("(1 + 2) * 3;").unwrap();
        let mut path = std::env::temp_dir();
        path.push(format!("roguescript-test-{}.rgb", std::process::id()));
        save_chunk(&proto, &path).unwrap();
        let loaded = load_chunk(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let (outcome, value) = Vm::new().run_proto(loaded);
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), "9");
    }
}
