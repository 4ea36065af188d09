//! Thin demo CLI around the `roguedex-script` library: compile source to
//! a `.rgb` file, or run source/`.rgb` files directly. Not a driver for
//! embedding; see `roguedex_script::Vm` for that.

use clap::{Parser, Subcommand};
use roguedex_script::{Outcome, Vm, compile_only, load_chunk, save_chunk};

#[derive(Parser)]
#[command(name = "roguescript", about = "Compile and run RogueScript programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a `.rs` source file to a `.rgb` bytecode file.
    Compile { source: String, output: String },
    /// Run a `.rs` source file or a precompiled `.rgb` file.
    Run { path: String },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Compile { source, output } => {
            let src = std::fs::read_to_string(&source).unwrap_or_else(|e| {
                eprintln!("failed to read {source}: {e}");
                std::process::exit(1);
            });
            match compile_only(&src) {
                Some(proto) => {
                    if let Err(e) = save_chunk(&proto, &output) {
                        eprintln!("failed to write {output}: {e}");
                        std::process::exit(1);
                    }
                }
                None => {
                    eprintln!("compile error");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path } => {
            let mut vm = Vm::new();
            let (outcome, value) = if path.ends_with(".rgb") {
                match load_chunk(&path) {
                    Ok(proto) => vm.run_proto(proto),
                    Err(e) => {
                        eprintln!("failed to load {path}: {e}");
                        std::process::exit(1);
                    }
                }
            } else {
                let src = std::fs::read_to_string(&path).unwrap_or_else(|e| {
                    eprintln!("failed to read {path}: {e}");
                    std::process::exit(1);
                });
                vm.interpret(&src)
            };

            match outcome {
                Outcome::Ok => println!("=> {value}"),
                Outcome::CompileError => std::process::exit(65),
                Outcome::RuntimeError => std::process::exit(70),
            }
        }
    }
}
