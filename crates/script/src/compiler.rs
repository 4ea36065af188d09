//! Single-pass AST-walking compiler. One `FunctionState` exists per nested
//! `def`; it owns the locals list and scope depth for that function body,
//! mirroring the original tree-walking compiler's per-function instance.

use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::chunk::{Chunk, Constant, FunctionProto, OpCode};
use crate::error::CompileError;

struct Local {
    name: String,
    depth: i32,
}

struct FunctionState {
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: i32,
}

impl FunctionState {
    fn script() -> Self {
        FunctionState {
            chunk: Chunk::new("<script>"),
            locals: Vec::new(),
            scope_depth: 0,
        }
    }

    /// Non-script functions reserve local slot 0 for the callee, named
    /// the empty string. This is why a function's own name never resolves
    /// to that slot inside its own body: self-reference falls through to
    /// a global lookup even for a function compiled with a local name.
    fn function(name: &str) -> Self {
        FunctionState {
            chunk: Chunk::new(name),
            locals: vec![Local { name: String::new(), depth: 0 }],
            scope_depth: 0,
        }
    }
}

pub struct Compiler {
    state: FunctionState,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler { state: FunctionState::script() }
    }

    pub fn compile(mut self, program: &Program) -> Result<FunctionProto, CompileError> {
        let statements = &program.statements;
        for (i, stmt) in statements.iter().enumerate() {
            if i == statements.len() - 1 {
                if let Stmt::Expression { expr, line } = stmt {
                    self.compile_expr(expr)?;
                    self.emit_byte(OpCode::Return, *line);
                    continue;
                }
            }
            self.compile_stmt(stmt)?;
        }
        if statements.is_empty() || !matches!(statements.last(), Some(Stmt::Expression { .. })) {
            self.emit_return(statements.last().map(stmt_line).unwrap_or(0));
        }
        Ok(FunctionProto {
            name: "<script>".to_string(),
            arity: 0,
            chunk: self.state.chunk,
        })
    }

    fn emit_byte(&mut self, op: OpCode, line: u32) {
        self.state.chunk.write(op as u8, line);
    }

    fn emit_bytes(&mut self, op: OpCode, byte: u8, line: u32) {
        self.emit_byte(op, line);
        self.state.chunk.write(byte, line);
    }

    fn emit_return(&mut self, line: u32) {
        self.emit_byte(OpCode::Nil, line);
        self.emit_byte(OpCode::Return, line);
    }

    fn emit_constant(&mut self, value: Constant, line: u32) -> Result<(), CompileError> {
        let index = self
            .state
            .chunk
            .add_constant(value)
            .ok_or_else(|| CompileError::Semantic { line, message: "Too many constants in one chunk.".to_string() })?;
        self.emit_bytes(OpCode::PushConst, index, line);
        Ok(())
    }

    fn identifier_constant(&mut self, name: &str, line: u32) -> Result<u8, CompileError> {
        self.state
            .chunk
            .add_constant(Constant::Str(name.to_string()))
            .ok_or_else(|| CompileError::Semantic { line, message: "Too many global variables.".to_string() })
    }

    fn begin_scope(&mut self) {
        self.state.scope_depth += 1;
    }

    fn end_scope(&mut self, line: u32) {
        self.state.scope_depth -= 1;
        let mut count = 0;
        while let Some(local) = self.state.locals.last() {
            if local.depth > self.state.scope_depth {
                self.state.locals.pop();
                count += 1;
            } else {
                break;
            }
        }
        for _ in 0..count {
            self.emit_byte(OpCode::Pop, line);
        }
    }

    fn add_local(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        for local in self.state.locals.iter().rev() {
            if local.depth < self.state.scope_depth {
                break;
            }
            if local.name == name {
                return Err(CompileError::Semantic {
                    line,
                    message: format!("Already a variable with this name '{name}' in this scope."),
                });
            }
        }
        self.state.locals.push(Local { name: name.to_string(), depth: self.state.scope_depth });
        Ok(())
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.state
            .locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|i| i as u8)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expression { expr, line } => {
                self.compile_expr(expr)?;
                self.emit_byte(OpCode::Pop, *line);
            }
            Stmt::Print { expr, line } => {
                self.compile_expr(expr)?;
                self.emit_byte(OpCode::Print, *line);
            }
            Stmt::VarDecl { name, init, line } => {
                match init {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit_byte(OpCode::Nil, *line),
                }
                if self.state.scope_depth > 0 {
                    self.add_local(name, *line)?;
                } else {
                    let idx = self.identifier_constant(name, *line)?;
                    self.emit_bytes(OpCode::DefineGlobal, idx, *line);
                }
            }
            Stmt::Block { statements, line } => {
                self.begin_scope();
                for s in statements {
                    self.compile_stmt(s)?;
                }
                self.end_scope(*line);
            }
            Stmt::If { condition, then_branch, else_branch, line } => {
                self.compile_expr(condition)?;
                let then_jump = self.state.chunk.emit_jump(OpCode::JumpIfFalse, *line);
                self.emit_byte(OpCode::Pop, *line);
                self.compile_stmt(then_branch)?;
                let else_jump = self.state.chunk.emit_jump(OpCode::Jump, *line);

                self.patch_jump(then_jump, *line)?;
                self.emit_byte(OpCode::Pop, *line);
                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch)?;
                }
                self.patch_jump(else_jump, *line)?;
            }
            Stmt::While { condition, body, line } => {
                let loop_start = self.state.chunk.code.len();
                self.compile_expr(condition)?;
                let exit_jump = self.state.chunk.emit_jump(OpCode::JumpIfFalse, *line);
                self.emit_byte(OpCode::Pop, *line);
                self.compile_stmt(body)?;
                self.state
                    .chunk
                    .emit_loop(loop_start, *line)
                    .map_err(|_| CompileError::Semantic { line: *line, message: "Loop body too large.".to_string() })?;
                self.patch_jump(exit_jump, *line)?;
                self.emit_byte(OpCode::Pop, *line);
            }
            Stmt::Def { name, params, body, line } => {
                self.compile_def(name, params, body, *line)?;
            }
            Stmt::Return { value, line } => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit_byte(OpCode::Nil, *line),
                }
                self.emit_byte(OpCode::Return, *line);
            }
        }
        Ok(())
    }

    fn patch_jump(&mut self, offset: usize, line: u32) -> Result<(), CompileError> {
        self.state
            .chunk
            .patch_jump(offset)
            .map_err(|_| CompileError::Semantic { line, message: "Jump offset too large (over 65535 bytes).".to_string() })
    }

    fn compile_def(&mut self, name: &str, params: &[String], body: &[Stmt], line: u32) -> Result<(), CompileError> {
        let mut inner = Compiler { state: FunctionState::function(name) };
        inner.begin_scope();
        for param in params {
            inner.add_local(param, line)?;
        }
        for stmt in body {
            inner.compile_stmt(stmt)?;
        }
        inner.emit_return(line);

        let proto = FunctionProto {
            name: name.to_string(),
            arity: params.len() as u8,
            chunk: inner.state.chunk,
        };
        self.emit_constant(Constant::Function(proto), line)?;

        if self.state.scope_depth > 0 {
            self.add_local(name, line)?;
        } else {
            let idx = self.identifier_constant(name, line)?;
            self.emit_bytes(OpCode::DefineGlobal, idx, line);
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal { value, line } => self.compile_literal(value, *line)?,
            Expr::Grouping { inner, .. } => self.compile_expr(inner)?,
            Expr::Variable { name, line } => {
                match self.resolve_local(name) {
                    Some(slot) => self.emit_bytes(OpCode::GetLocal, slot, *line),
                    None => {
                        let idx = self.identifier_constant(name, *line)?;
                        self.emit_bytes(OpCode::GetGlobal, idx, *line);
                    }
                }
            }
            Expr::Assign { name, value, line } => {
                self.compile_expr(value)?;
                match self.resolve_local(name) {
                    Some(slot) => self.emit_bytes(OpCode::SetLocal, slot, *line),
                    None => {
                        let idx = self.identifier_constant(name, *line)?;
                        self.emit_bytes(OpCode::SetGlobal, idx, *line);
                    }
                }
            }
            Expr::Unary { op, operand, line } => {
                self.compile_expr(operand)?;
                match op {
                    UnaryOp::Negate => self.emit_byte(OpCode::Negate, *line),
                    UnaryOp::Not => self.emit_byte(OpCode::Not, *line),
                }
            }
            Expr::Binary { op, left, right, line } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match op {
                    BinaryOp::Add => self.emit_byte(OpCode::Add, *line),
                    BinaryOp::Subtract => self.emit_byte(OpCode::Subtract, *line),
                    BinaryOp::Multiply => self.emit_byte(OpCode::Multiply, *line),
                    BinaryOp::Divide => self.emit_byte(OpCode::Divide, *line),
                    BinaryOp::Equal => self.emit_byte(OpCode::Equal, *line),
                    BinaryOp::NotEqual => {
                        self.emit_byte(OpCode::Equal, *line);
                        self.emit_byte(OpCode::Not, *line);
                    }
                    BinaryOp::Greater => self.emit_byte(OpCode::Greater, *line),
                    BinaryOp::GreaterEqual => {
                        self.emit_byte(OpCode::Less, *line);
                        self.emit_byte(OpCode::Not, *line);
                    }
                    BinaryOp::Less => self.emit_byte(OpCode::Less, *line),
                    BinaryOp::LessEqual => {
                        self.emit_byte(OpCode::Greater, *line);
                        self.emit_byte(OpCode::Not, *line);
                    }
                }
            }
            Expr::Logical { op, left, right, line } => match op {
                LogicalOp::Or => {
                    self.compile_expr(left)?;
                    let else_jump = self.state.chunk.emit_jump(OpCode::JumpIfFalse, *line);
                    let end_jump = self.state.chunk.emit_jump(OpCode::Jump, *line);
                    self.patch_jump(else_jump, *line)?;
                    self.emit_byte(OpCode::Pop, *line);
                    self.compile_expr(right)?;
                    self.patch_jump(end_jump, *line)?;
                }
                LogicalOp::And => {
                    self.compile_expr(left)?;
                    let end_jump = self.state.chunk.emit_jump(OpCode::JumpIfFalse, *line);
                    self.emit_byte(OpCode::Pop, *line);
                    self.compile_expr(right)?;
                    self.patch_jump(end_jump, *line)?;
                }
            },
            Expr::Call { callee, args, line } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit_bytes(OpCode::Call, args.len() as u8, *line);
            }
        }
        Ok(())
    }

    fn compile_literal(&mut self, literal: &crate::ast::Literal, line: u32) -> Result<(), CompileError> {
        use crate::ast::Literal;
        match literal {
            Literal::Nil => self.emit_byte(OpCode::Nil, line),
            Literal::Bool(true) => self.emit_byte(OpCode::True, line),
            Literal::Bool(false) => self.emit_byte(OpCode::False, line),
            Literal::Int(i) => self.emit_constant(Constant::Int(*i), line)?,
            Literal::Float(f) => self.emit_constant(Constant::Float(*f), line)?,
            Literal::Str(s) => self.emit_constant(Constant::Str(s.clone()), line)?,
        }
        Ok(())
    }
}

fn stmt_line(stmt: &Stmt) -> u32 {
    match stmt {
        Stmt::Expression { line, .. }
        | Stmt::Print { line, .. }
        | Stmt::VarDecl { line, .. }
        | Stmt::Block { line, .. }
        | Stmt::If { line, .. }
        | Stmt::While { line, .. }
        | Stmt::Def { line, .. }
        | Stmt::Return { line, .. } => *line,
    }
}
