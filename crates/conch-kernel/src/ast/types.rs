//! AST node definitions consumed by the evaluator.

use conch_types::{ErrorCode, Position};

/// A complete conch program is a sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A single statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

/// Statement kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its side effects (includes command statements).
    Expr(Expr),
    /// Assignment: `a = expr`, `a, b = x, y`, `obj.attr = v`, `xs[i] = v`.
    Assignment(Assignment),
    /// Conditional: `if cond { ... } else { ... }`.
    If(IfStmt),
    /// Loop over an iterable: `for x in xs { ... }`.
    For(ForStmt),
    /// Loop with condition: `while cond { ... }`.
    While(WhileStmt),
    /// Multi-way branch: `switch expr { case a { } default { } }`.
    Switch(SwitchStmt),
    /// Break out of the enclosing loop or switch.
    Break,
    /// Continue with the next loop iteration.
    Continue,
    /// Return from the enclosing function: `return` or `return expr`.
    Return(Option<Expr>),
    /// Raise a runtime error: `throw expr`.
    Throw(Expr),
    /// Guarded block with catch clauses.
    TryCatch(TryCatch),
    /// Defer a statement to the exit of the enclosing function or root scope.
    Defer(Box<Stmt>),
    /// Function declaration.
    FuncDecl(FuncDecl),
    /// Class declaration.
    ClassDecl(ClassDecl),
    /// Interface declaration.
    InterfaceDecl(InterfaceDecl),
    /// Module import.
    Import(Import),
    /// Nested block scope.
    Block(Block),
}

/// A brace-delimited statement sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

/// Assignment of one or more values to one or more targets.
///
/// `a, b = f()` unpacks a single container value across the targets;
/// `a = 1, 2` binds a tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub targets: Vec<AssignTarget>,
    pub values: Vec<Expr>,
}

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// Plain identifier.
    Name(String),
    /// Attribute on an object: `obj.attr`.
    Attribute { object: Expr, name: String },
    /// Indexed element: `xs[i]`.
    Index { object: Expr, index: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    /// `else` arm; an `elif` chain parses as a nested `If` inside this block.
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    /// Loop variables; more than one unpacks each element.
    pub vars: Vec<String>,
    pub iterable: Expr,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub expr: Expr,
    pub cases: Vec<CaseClause>,
    pub default: Option<Block>,
}

/// One `case` arm; matches when any of its expressions equals the switch value.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub exprs: Vec<Expr>,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatch {
    pub try_block: Block,
    pub catches: Vec<CatchClause>,
}

/// One `catch` arm. An empty code list catches every error; otherwise the
/// clause matches when the raised error's code is in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub codes: Vec<ErrorCode>,
    /// Optional binding for the error message within the clause body.
    pub name: Option<String>,
    pub block: Block,
}

/// Function or method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    /// Name of the variadic tail parameter, if declared.
    pub variadic: Option<String>,
    pub block: Block,
}

/// A declared parameter with an optional default value expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Class declaration, possibly abstract, with an optional base class and a
/// list of implemented interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub is_abstract: bool,
    pub base: Option<String>,
    pub interfaces: Vec<String>,
    pub members: Vec<ClassMember>,
}

/// A member of a class body.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    /// Concrete method.
    Method { decl: FuncDecl, is_static: bool },
    /// Abstract method signature (only legal on abstract classes).
    Abstract(MethodSig),
}

/// A bare method signature, as declared by interfaces and abstract methods.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub name: String,
    pub num_params: usize,
    pub num_default_params: usize,
    pub variadic: bool,
}

/// Interface declaration: method signatures only, with optional base
/// interfaces whose signatures are merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub bases: Vec<String>,
    pub methods: Vec<MethodSig>,
}

/// Module import: `import name` or `import "path" as alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub alias: Option<String>,
    pub is_path: bool,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal constant.
    Literal(Literal),
    /// Identifier lookup.
    Identifier(String),
    /// Binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation: `+x`, `-x`, `~x`.
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Logical negation: `not x` / `!x`.
    Not(Box<Expr>),
    /// Attribute access: `obj.name`.
    Attribute { object: Box<Expr>, name: String },
    /// Indexed access: `xs[i]`, `m[k]`.
    Index { object: Box<Expr>, index: Box<Expr> },
    /// Slice: `xs[start:stop:step]` with Python-style clamping.
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    /// Array literal: `[a, b, c]`.
    ArrayInst(Vec<Expr>),
    /// Tuple literal: `(a, b)`.
    TupleInst(Vec<Expr>),
    /// Map literal: `{k: v, ...}`.
    MapInst(Vec<(Expr, Expr)>),
    /// Call with positional and keyword arguments.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    /// Anonymous function.
    Lambda {
        params: Vec<Param>,
        variadic: Option<String>,
        block: Block,
    },
    /// Command expression (single command or pipeline).
    Cmd(CmdExpression),
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    NotEq,
    /// Membership: `x in xs`.
    In,
    /// Type test: `x is T`.
    Is,
    BitAnd,
    BitOr,
    BitXor,
    /// Logical and (short-circuit for builtin kinds).
    And,
    /// Logical or (short-circuit for builtin kinds).
    Or,
}

/// Unary operators (logical `not` is its own node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Pos,
    Neg,
    BitNot,
}

/// A command expression: a pipeline plus the syntactic form that decides
/// whether its stdout is captured (`$(...)`) or the job runs attached.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdExpression {
    pub pipeline: CmdPipeline,
    /// True for the capture form, which yields a CMD object.
    pub captured: bool,
}

/// One or more commands connected by pipes.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdPipeline {
    pub commands: Vec<Cmd>,
    /// Trailing `&`: run without waiting.
    pub background: bool,
}

/// A single pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    pub words: Vec<CmdWord>,
    pub redirects: Vec<Redirection>,
}

/// One argv word, assembled from literal and interpolated pieces.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdWord {
    pub pieces: Vec<CmdPiece>,
    /// Quoted words skip tilde and glob expansion.
    pub quoted: bool,
}

impl CmdWord {
    /// A plain unquoted literal word.
    pub fn literal(s: impl Into<String>) -> Self {
        Self {
            pieces: vec![CmdPiece::Literal(s.into())],
            quoted: false,
        }
    }
}

/// A piece of a command word.
#[derive(Debug, Clone, PartialEq)]
pub enum CmdPiece {
    /// Literal text.
    Literal(String),
    /// Variable interpolation: `$name` / `${name}`.
    Var(String),
}

/// An I/O redirection attached to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirection {
    pub kind: RedirKind,
    pub target: CmdWord,
}

/// Redirection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirKind {
    /// `<` stdin from file.
    In,
    /// `>` stdout to file (truncate).
    Out,
    /// `>>` stdout to file (append).
    OutAppend,
    /// `2>` stderr to file.
    Err,
    /// `&>` both stdout and stderr to file.
    Both,
}
