use serde::{Deserialize, Serialize};

/// A single token from the source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub lexeme: String,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

/// All possible token types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal (never compilable, kept for precise diagnostics)
    String(String),

    // Identifiers
    /// Identifier
    Identifier(String),
    /// Reserved word of the host language that the grammar does not accept
    Reserved(String),

    // Keywords
    /// `def`
    Def,
    /// `return`
    Return,
    /// `while`
    While,
    /// `if`
    If,
    /// `elif`
    Elif,
    /// `else`
    Else,
    /// `for`
    For,
    /// `lambda`
    Lambda,

    // Operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `/`
    Slash,
    /// `//`
    SlashSlash,
    /// `%`
    Percent,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `=`
    Assign,
    /// Augmented assignment such as `+=` (operator text kept)
    AugAssign(String),
    /// `->`
    Arrow,
    /// `...`
    Ellipsis,
    /// Any other operator character sequence (`&`, `|`, `^`, `~`, `:=`, ...)
    OtherOperator(String),

    // Delimiters
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `@`
    At,

    // Layout
    /// End of a logical line
    Newline,
    /// Indentation increased
    Indent,
    /// Indentation decreased
    Dedent,

    // Special
    /// End of file marker
    Eof,
}

impl TokenKind {
    /// Map a word to its keyword token, if it is one
    pub fn keyword(s: &str) -> Option<TokenKind> {
        let kind = match s {
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "while" => TokenKind::While,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "lambda" => TokenKind::Lambda,
            "and" | "as" | "assert" | "async" | "await" | "break" | "class" | "continue"
            | "del" | "except" | "finally" | "from" | "global" | "import" | "in" | "is"
            | "nonlocal" | "not" | "or" | "pass" | "raise" | "try" | "with" | "yield"
            | "True" | "False" | "None" => TokenKind::Reserved(s.to_string()),
            _ => return None,
        };
        Some(kind)
    }

    /// Check if token is a keyword of the grammar
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::Return
                | TokenKind::While
                | TokenKind::If
                | TokenKind::Elif
                | TokenKind::Else
                | TokenKind::For
                | TokenKind::Lambda
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(fl) => write!(f, "{:?}", fl),
            TokenKind::String(s) => write!(f, "{:?}", s),
            TokenKind::Identifier(id) => write!(f, "{}", id),
            TokenKind::Reserved(word) => write!(f, "{}", word),
            TokenKind::Def => write!(f, "def"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::While => write!(f, "while"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Elif => write!(f, "elif"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Lambda => write!(f, "lambda"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StarStar => write!(f, "**"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::SlashSlash => write!(f, "//"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Assign => write!(f, "="),
            TokenKind::AugAssign(op) => write!(f, "{}", op),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::OtherOperator(op) => write!(f, "{}", op),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::At => write!(f, "@"),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Indent => write!(f, "indent"),
            TokenKind::Dedent => write!(f, "dedent"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}
