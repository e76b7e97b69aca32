//! Abstract Syntax Tree node types
//!
//! The tree is produced by an external parser and handed to the engine as JSON.
//! Nodes are internally tagged with `"t"`. The engine never mutates the tree.

use serde::{Deserialize, Serialize};

/// Source location span for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    /// 1-based line number, or `None` for spans the parser did not fill in
    pub fn line(&self) -> Option<usize> {
        if *self == Span::default() {
            None
        } else {
            Some(self.start_line + 1)
        }
    }
}

/* ===================== Program ===================== */

/// A complete translation unit: functions, struct definitions and globals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}

/// Top-level item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Item {
    Function(FunctionDef),
    Struct(StructDef),
    Global {
        decl: Stmt,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

/// C type spelling as written in the source (`"unsigned long"`, `"byte"`, `"Servo"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default, rename = "const", skip_serializing_if = "std::ops::Not::not")]
    pub is_const: bool,
}

impl TypeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_const: false,
        }
    }

    pub fn void() -> Self {
        Self::named("void")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default = "TypeSpec::void")]
    pub ret: TypeSpec,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: Stmt,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
    /// `int values[]` style parameter
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_array: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeSpec,
}

/* ===================== Statements ===================== */

/// One declared name inside a declaration statement (`int a = 1, b[10];`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    /// Array dimensions; `null` means the size is taken from the initializer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dims: Vec<Option<Expr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Expr>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` marks the `default:` label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<Expr>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    VarDecl {
        ty: TypeSpec,
        declarators: Vec<Declarator>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    For {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update: Option<Expr>,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Break {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Continue {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Empty {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. } => *span,
            Stmt::VarDecl { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::DoWhile { span, .. } => *span,
            Stmt::For { span, .. } => *span,
            Stmt::Switch { span, .. } => *span,
            Stmt::Return { span, .. } => *span,
            Stmt::Break { span } => *span,
            Stmt::Continue { span } => *span,
            Stmt::Expr { span, .. } => *span,
            Stmt::Empty { span } => *span,
        }
    }
}

/* ===================== Operators ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And, // &&
    Or,  // ||
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,    // -x
    Plus,   // +x
    Not,    // !x
    BitNot, // ~x
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl AssignOp {
    /// The arithmetic operator behind a compound assignment (`+=` -> `+`)
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
        }
    }
}

/* ===================== Expressions ===================== */

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitInt {
        v: i64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitFloat {
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitChar {
        v: char,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitNull {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ternary {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    InitList {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Cast {
        ty: TypeSpec,
        expr: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitInt { span, .. } => *span,
            Expr::LitFloat { span, .. } => *span,
            Expr::LitBool { span, .. } => *span,
            Expr::LitChar { span, .. } => *span,
            Expr::LitStr { span, .. } => *span,
            Expr::LitNull { span } => *span,
            Expr::Ident { span, .. } => *span,
            Expr::Binary { span, .. } => *span,
            Expr::Logical { span, .. } => *span,
            Expr::Unary { span, .. } => *span,
            Expr::Update { span, .. } => *span,
            Expr::Assign { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::Index { span, .. } => *span,
            Expr::Member { span, .. } => *span,
            Expr::Ternary { span, .. } => *span,
            Expr::InitList { span, .. } => *span,
            Expr::Cast { span, .. } => *span,
        }
    }
}

/// Helper function for serde to skip serializing default spans
fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}
