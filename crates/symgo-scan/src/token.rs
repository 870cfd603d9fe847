//! Token kinds produced by the lexer.

use strum::{Display, IntoStaticStr};

use crate::position::Pos;

/// A lexed token: kind, literal text where relevant, and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal payload for identifiers and literals; empty otherwise.
    pub lit: String,
    pub pos: Pos,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Every token kind of the source language subset the scanner understands.
///
/// Operator variants display as their source spelling so parse errors read
/// naturally ("expected '}', found '+='").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TokenKind {
    #[strum(serialize = "EOF")]
    Eof,
    #[strum(serialize = "identifier")]
    Ident,
    #[strum(serialize = "int literal")]
    Int,
    #[strum(serialize = "float literal")]
    Float,
    #[strum(serialize = "imaginary literal")]
    Imag,
    #[strum(serialize = "string literal")]
    String,
    #[strum(serialize = "rune literal")]
    Rune,

    // Keywords.
    #[strum(serialize = "package")]
    Package,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "func")]
    Func,
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "struct")]
    Struct,
    #[strum(serialize = "interface")]
    Interface,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "chan")]
    Chan,
    #[strum(serialize = "const")]
    Const,
    #[strum(serialize = "var")]
    Var,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "range")]
    Range,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "case")]
    Case,
    #[strum(serialize = "default")]
    Default,
    #[strum(serialize = "select")]
    Select,
    #[strum(serialize = "go")]
    Go,
    #[strum(serialize = "defer")]
    Defer,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "fallthrough")]
    Fallthrough,
    #[strum(serialize = "goto")]
    Goto,

    // Operators and delimiters.
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Quo,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "|")]
    Or,
    #[strum(serialize = "^")]
    Xor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "&^")]
    AndNot,
    #[strum(serialize = "+=")]
    AddAssign,
    #[strum(serialize = "-=")]
    SubAssign,
    #[strum(serialize = "*=")]
    MulAssign,
    #[strum(serialize = "/=")]
    QuoAssign,
    #[strum(serialize = "%=")]
    RemAssign,
    #[strum(serialize = "&=")]
    AndAssign,
    #[strum(serialize = "|=")]
    OrAssign,
    #[strum(serialize = "^=")]
    XorAssign,
    #[strum(serialize = "<<=")]
    ShlAssign,
    #[strum(serialize = ">>=")]
    ShrAssign,
    #[strum(serialize = "&^=")]
    AndNotAssign,
    #[strum(serialize = "&&")]
    LAnd,
    #[strum(serialize = "||")]
    LOr,
    #[strum(serialize = "<-")]
    Arrow,
    #[strum(serialize = "++")]
    Inc,
    #[strum(serialize = "--")]
    Dec,
    #[strum(serialize = "==")]
    Eql,
    #[strum(serialize = "<")]
    Lss,
    #[strum(serialize = ">")]
    Gtr,
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "!=")]
    Neq,
    #[strum(serialize = "<=")]
    Leq,
    #[strum(serialize = ">=")]
    Geq,
    #[strum(serialize = ":=")]
    Define,
    #[strum(serialize = "...")]
    Ellipsis,
    #[strum(serialize = "(")]
    LParen,
    #[strum(serialize = "[")]
    LBrack,
    #[strum(serialize = "{{")]
    LBrace,
    #[strum(serialize = ")")]
    RParen,
    #[strum(serialize = "]")]
    RBrack,
    #[strum(serialize = "}}")]
    RBrace,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ".")]
    Period,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = ":")]
    Colon,
}

impl TokenKind {
    /// Keyword lookup for an identifier-shaped word.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "package" => TokenKind::Package,
            "import" => TokenKind::Import,
            "func" => TokenKind::Func,
            "type" => TokenKind::Type,
            "struct" => TokenKind::Struct,
            "interface" => TokenKind::Interface,
            "map" => TokenKind::Map,
            "chan" => TokenKind::Chan,
            "const" => TokenKind::Const,
            "var" => TokenKind::Var,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "range" => TokenKind::Range,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "select" => TokenKind::Select,
            "go" => TokenKind::Go,
            "defer" => TokenKind::Defer,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "fallthrough" => TokenKind::Fallthrough,
            "goto" => TokenKind::Goto,
            _ => return None,
        })
    }

    /// Whether a line break after this token inserts an implicit semicolon.
    pub fn ends_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::Imag
                | TokenKind::String
                | TokenKind::Rune
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Fallthrough
                | TokenKind::Inc
                | TokenKind::Dec
                | TokenKind::RParen
                | TokenKind::RBrack
                | TokenKind::RBrace
        )
    }

    /// Binary operator precedence, highest binding first; 0 for non-operators.
    pub fn precedence(self) -> u8 {
        match self {
            TokenKind::LOr => 1,
            TokenKind::LAnd => 2,
            TokenKind::Eql
            | TokenKind::Neq
            | TokenKind::Lss
            | TokenKind::Leq
            | TokenKind::Gtr
            | TokenKind::Geq => 3,
            TokenKind::Add | TokenKind::Sub | TokenKind::Or | TokenKind::Xor => 4,
            TokenKind::Mul
            | TokenKind::Quo
            | TokenKind::Rem
            | TokenKind::Shl
            | TokenKind::Shr
            | TokenKind::And
            | TokenKind::AndNot => 5,
            _ => 0,
        }
    }

    /// The assignment operators that expand to a binary operation
    /// (`+=` and friends), mapped to the underlying operator.
    pub fn augmented_op(self) -> Option<TokenKind> {
        Some(match self {
            TokenKind::AddAssign => TokenKind::Add,
            TokenKind::SubAssign => TokenKind::Sub,
            TokenKind::MulAssign => TokenKind::Mul,
            TokenKind::QuoAssign => TokenKind::Quo,
            TokenKind::RemAssign => TokenKind::Rem,
            TokenKind::AndAssign => TokenKind::And,
            TokenKind::OrAssign => TokenKind::Or,
            TokenKind::XorAssign => TokenKind::Xor,
            TokenKind::ShlAssign => TokenKind::Shl,
            TokenKind::ShrAssign => TokenKind::Shr,
            TokenKind::AndNotAssign => TokenKind::AndNot,
            _ => return None,
        })
    }
}
