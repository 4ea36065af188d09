//! Stack-based bytecode interpreter: dispatch loop, call frames, and
//! the runtime value stack.

use std::collections::HashMap;
use std::rc::Rc;

use crate::chunk::{Chunk, FunctionProto, OpCode};
use crate::error::RuntimeError;
use crate::value::{NativeFn, NativeFunction, Value};

const STACK_MAX: usize = 256;
const FRAMES_MAX: usize = 64;

struct Frame {
    function: Rc<FunctionProto>,
    ip: usize,
    base: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    CompileError,
    RuntimeError,
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: HashMap<String, Value>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: HashMap::new(),
        }
    }

    pub fn register_native(
        &mut self,
        name: impl Into<String>,
        callable: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) {
        let name = name.into();
        let boxed: Box<NativeFn> = Box::new(callable);
        self.globals.insert(
            name.clone(),
            Value::Native(Rc::new(NativeFunction { name, callable: boxed })),
        );
    }

    /// Compiles then runs `source`. The returned value is meaningful only
    /// when the outcome is `Ok`.
    pub fn interpret(&mut self, source: &str) -> (Outcome, Value) {
        let proto = match self.compile(source) {
            Some(proto) => proto,
            None => return (Outcome::CompileError, Value::Nil),
        };
        self.run(Rc::new(proto))
    }

    /// Runs an already-compiled script, e.g. one loaded from a `.rgb` file.
    pub fn run_proto(&mut self, proto: FunctionProto) -> (Outcome, Value) {
        self.run(Rc::new(proto))
    }

    fn compile(&self, source: &str) -> Option<FunctionProto> {
        let tokens = crate::lexer::Lexer::new(source).tokenize().map_err(|e| log::error!("{e}")).ok()?;
        let program = crate::parser::Parser::new(tokens).parse()?;
        match crate::compiler::Compiler::new().compile(&program) {
            Ok(proto) => Some(proto),
            Err(e) => {
                log::error!("{e}");
                None
            }
        }
    }

    fn run(&mut self, script: Rc<FunctionProto>) -> (Outcome, Value) {
        self.stack.clear();
        self.frames.clear();
        self.stack.push(Value::Function(Rc::clone(&script)));
        self.frames.push(Frame { function: script, ip: 0, base: 0 });

        match self.execute() {
            Ok(value) => (Outcome::Ok, value),
            Err(error) => {
                let trace = self.stack_trace();
                log::error!("runtime error: {error}\n{trace}");
                (Outcome::RuntimeError, Value::Nil)
            }
        }
    }

    fn stack_trace(&self) -> String {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let line = frame.function.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0);
                format!("[line {}] in {}", line, display_fn_name(&frame.function.name))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn current_chunk(&self) -> &Chunk {
        &self.frames.last().unwrap().function.chunk
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().unwrap();
        let byte = frame.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn current_line(&self) -> u32 {
        let frame = self.frames.last().unwrap();
        frame.function.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0)
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX * self.frames.len().max(1) {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler emitted unbalanced bytecode")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn execute(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let op = OpCode::from_byte(self.read_byte()).expect("invalid opcode byte");
            match op {
                OpCode::PushConst => {
                    let idx = self.read_byte();
                    let constant = self.current_chunk().constants[idx as usize].clone();
                    self.push(Value::from_constant(&constant))?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::DefineGlobal => {
                    let idx = self.read_byte();
                    let name = self.constant_name(idx);
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                OpCode::GetGlobal => {
                    let idx = self.read_byte();
                    let name = self.constant_name(idx);
                    let value = self
                        .globals
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })?;
                    self.push(value)?;
                }
                OpCode::SetGlobal => {
                    let idx = self.read_byte();
                    let name = self.constant_name(idx);
                    if !self.globals.contains_key(&name) {
                        return Err(RuntimeError::UndefinedVariable { name });
                    }
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().base;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().base;
                    self.stack[base + slot] = self.peek(0).clone();
                }
                OpCode::Add => self.binary_add()?,
                OpCode::Subtract => self.numeric_binary(|a, b| a - b, |a, b| a - b)?,
                OpCode::Multiply => self.numeric_binary(|a, b| a * b, |a, b| a * b)?,
                OpCode::Divide => self.divide()?,
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(Value::values_equal(&a, &b)))?;
                }
                OpCode::Greater => self.comparison(|a, b| a > b)?,
                OpCode::Less => self.comparison(|a, b| a < b)?,
                OpCode::Negate => {
                    let value = self.pop();
                    let negated = match value {
                        Value::Int(i) => Value::Int(-i),
                        Value::Float(f) => Value::Float(-f),
                        _ => return Err(RuntimeError::NotANumber),
                    };
                    self.push(negated)?;
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()))?;
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if !self.peek(0).is_truthy() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte() as usize;
                    self.call_value(arg_count)?;
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.stack.truncate(frame.base);
                    self.push(result)?;
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{value}");
                }
            }
        }
    }

    fn constant_name(&self, idx: u8) -> String {
        match &self.current_chunk().constants[idx as usize] {
            crate::chunk::Constant::Str(s) => s.clone(),
            other => format!("{other:?}"),
        }
    }

    fn binary_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
            (Value::Int(x), Value::Float(y)) => Value::Float(x as f64 + y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x + y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x + y),
            (Value::Str(x), Value::Str(y)) => Value::Str(Rc::from(format!("{x}{y}").as_str())),
            _ => return Err(RuntimeError::Native("operands must be two numbers or two strings".to_string())),
        };
        self.push(result)
    }

    fn numeric_binary(
        &mut self,
        f_int: impl Fn(i64, i64) -> i64,
        f_float: impl Fn(f64, f64) -> f64,
    ) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (a, b) {
            // Int/Int stays exact i64 arithmetic, same as `binary_add` — routing
            // this through f64 would silently lose precision past 2^53.
            (Value::Int(x), Value::Int(y)) => Value::Int(f_int(x, y)),
            (Value::Int(x), Value::Float(y)) => Value::Float(f_float(x as f64, y)),
            (Value::Float(x), Value::Int(y)) => Value::Float(f_float(x, y as f64)),
            (Value::Float(x), Value::Float(y)) => Value::Float(f_float(x, y)),
            _ => return Err(RuntimeError::NotANumber),
        };
        self.push(result)
    }

    fn divide(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let (x, y) = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => (*x as f64, *y as f64),
            (Value::Int(x), Value::Float(y)) => (*x as f64, *y),
            (Value::Float(x), Value::Int(y)) => (*x, *y as f64),
            (Value::Float(x), Value::Float(y)) => (*x, *y),
            _ => return Err(RuntimeError::NotANumber),
        };
        if y == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        self.push(Value::Float(x / y))
    }

    fn comparison(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let (x, y) = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => (*x as f64, *y as f64),
            (Value::Int(x), Value::Float(y)) => (*x as f64, *y),
            (Value::Float(x), Value::Int(y)) => (*x, *y as f64),
            (Value::Float(x), Value::Float(y)) => (*x, *y),
            _ => return Err(RuntimeError::NotANumber),
        };
        self.push(Value::Bool(f(x, y)))
    }

    fn call_value(&mut self, arg_count: usize) -> Result<(), RuntimeError> {
        let callee = self.peek(arg_count).clone();
        match callee {
            Value::Function(proto) => {
                if proto.arity as usize != arg_count {
                    return Err(RuntimeError::ArityMismatch { expected: proto.arity as usize, got: arg_count });
                }
                if self.frames.len() >= FRAMES_MAX {
                    return Err(RuntimeError::StackOverflow);
                }
                let base = self.stack.len() - arg_count - 1;
                self.frames.push(Frame { function: proto, ip: 0, base });
                Ok(())
            }
            Value::Native(native) => {
                let args_start = self.stack.len() - arg_count;
                let args: Vec<Value> = self.stack[args_start..].to_vec();
                self.stack.truncate(args_start - 1);
                let result = (native.callable)(&args)?;
                self.push(result)
            }
            _ => Err(RuntimeError::NotCallable),
        }
    }
}

fn display_fn_name(name: &str) -> &str {
    if name.is_empty() {
        "<script>"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> (Outcome, Value) {
        Vm::new().interpret(src)
    }

    #[test]
    fn simple_arithmetic() {
        let (outcome, value) = run("(1 - 2) * (3 + 4) / 5;");
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), Value::Float(-1.4).to_string());
    }

    #[test]
    fn precedence() {
        let (outcome, value) = run("1 + 2 * 3 - 4 / 2;");
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), "5");
    }

    #[test]
    fn falsiness_matches_nil_and_false_only() {
        let (_, v) = run("!True;");
        assert!(matches!(v, Value::Bool(false)));
        let (_, v) = run("!nil;");
        assert!(matches!(v, Value::Bool(true)));
        let (_, v) = run("!0;");
        assert!(matches!(v, Value::Bool(false)));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let (outcome, _) = run("1 / 0;");
        assert_eq!(outcome, Outcome::RuntimeError);
    }

    #[test]
    fn compile_error_on_unbalanced_parens() {
        let (outcome, _) = run("1 + (2;");
        assert_eq!(outcome, Outcome::CompileError);
    }

    #[test]
    fn undefined_variable_is_runtime_error() {
        let (outcome, _) = run("print undefined_name;");
        assert_eq!(outcome, Outcome::RuntimeError);
    }

    #[test]
    fn lexical_shadowing_in_nested_blocks() {
        let (outcome, value) = run("var x = 1; { var x = 2; } x;");
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), "1");
    }

    #[test]
    fn recursive_fibonacci() {
        let src = "def fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } fib(10);";
        let (outcome, value) = run(src);
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), "55");
    }

    #[test]
    fn short_circuit_or_skips_right_side() {
        let src = "var hit = False; def mark() { hit = True; return True; } True or mark(); hit;";
        let (outcome, value) = run(src);
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), "false");
    }

    #[test]
    fn native_function_roundtrip() {
        let mut vm = Vm::new();
        vm.register_native("double", |args: &[Value]| match args {
            [Value::Int(n)] => Ok(Value::Int(n * 2)),
            _ => Err(RuntimeError::ArityMismatch { expected: 1, got: args.len() }),
        });
        let (outcome, value) = vm.interpret("double(21);");
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(value.to_string(), "42");
    }

    proptest::proptest! {
        #[test]
        fn integer_addition_matches_host_arithmetic(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let (outcome, value) = run(&format!("{a} + {b};"));
            proptest::prop_assert_eq!(outcome, Outcome::Ok);
            proptest::prop_assert_eq!(value.to_string(), (a + b).to_string());
        }

        #[test]
        fn not_is_its_own_inverse_for_booleans(b in proptest::bool::ANY) {
            let literal = if b { "True" } else { "False" };
            let (_, value) = run(&format!("!!{literal};"));
            proptest::prop_assert_eq!(value.to_string(), b.to_string());
        }
    }
}
