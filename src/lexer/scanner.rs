use super::token::{Token, TokenKind};
use crate::error::{Error, Result};
use tracing::trace;

/// Width a tab advances the indentation column to (next multiple of 8)
const TAB_WIDTH: usize = 8;

/// Indentation-aware scanner for function source text
///
/// Produces `Newline` at the end of every logical line and `Indent`/`Dedent`
/// pairs around nested suites. Newlines inside brackets and after a trailing
/// backslash join lines. The first logical line sets the base indentation, so
/// source extracted from an indented scope scans like top-level code.
pub struct Scanner {
    /// Source code as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start position of current token
    start: usize,
    /// Column where the current token starts
    start_column: usize,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Open indentation levels; the bottom entry is the base level
    indents: Vec<usize>,
    /// Open brackets with the line they were opened on
    brackets: Vec<(char, usize)>,
    /// Next character begins a physical line
    at_line_start: bool,
}

impl Scanner {
    /// Creates a new scanner from source code
    pub fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            start_column: 1,
            current: 0,
            line: 1,
            column: 1,
            indents: Vec::new(),
            brackets: Vec::new(),
            at_line_start: true,
        }
    }

    /// Scans all tokens from source code and returns them as a vector
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            if self.at_line_start && self.brackets.is_empty() {
                self.at_line_start = false;
                if !self.scan_indentation()? {
                    continue;
                }
            }
            if self.is_at_end() {
                break;
            }
            self.start = self.current;
            self.start_column = self.column;
            self.scan_token()?;
        }

        if let Some(&(open, line)) = self.brackets.last() {
            return Err(Error::ParseError {
                line,
                col: 1,
                message: format!("`{}` opened here is never closed", open),
            });
        }

        self.end_logical_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_layout(TokenKind::Dedent);
        }
        self.push_layout(TokenKind::Eof);
        trace!(tokens = self.tokens.len(), lines = self.line, "scanned source");

        Ok(std::mem::take(&mut self.tokens))
    }

    /// Measures the indentation of the line at the cursor and emits layout
    /// tokens. Returns `false` when the line is blank or a comment only.
    fn scan_indentation(&mut self) -> Result<bool> {
        let mut width = 0;
        while !self.is_at_end() {
            match self.peek() {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        let blank = self.is_at_end() || matches!(self.peek(), '\n' | '#' | '\r');
        if blank {
            // Blank or comment-only line: no layout change
            self.at_line_start = true;
            if self.peek() == '#' {
                self.skip_comment();
            }
            if self.peek() == '\r' {
                self.advance();
            }
            if self.peek() == '\n' {
                self.advance();
                self.new_line();
            }
            return Ok(false);
        }

        let Some(&top) = self.indents.last() else {
            self.indents.push(width);
            return Ok(true);
        };

        if width > top {
            self.indents.push(width);
            self.push_layout(TokenKind::Indent);
        } else if width < top {
            while self.indents.len() > 1 && width < self.indents[self.indents.len() - 1] {
                self.indents.pop();
                self.push_layout(TokenKind::Dedent);
            }
            if self.indents.last() != Some(&width) {
                return Err(Error::ParseError {
                    line: self.line,
                    col: self.column,
                    message: "unindent does not match any outer indentation level".to_string(),
                });
            }
        }

        Ok(true)
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\t' | '\r' | '\x0c' => {}

            '\n' => {
                if self.brackets.is_empty() {
                    self.end_logical_line();
                    self.at_line_start = true;
                }
                self.new_line();
            }

            '\\' if self.peek() == '\n' => {
                // Explicit line join
                self.advance();
                self.new_line();
            }

            '#' => self.skip_comment(),

            // Brackets
            '(' | '[' | '{' => {
                self.brackets.push((c, self.line));
                self.add_token(match c {
                    '(' => TokenKind::LeftParen,
                    '[' => TokenKind::LeftBracket,
                    _ => TokenKind::LeftBrace,
                });
            }
            ')' | ']' | '}' => {
                self.brackets.pop();
                self.add_token(match c {
                    ')' => TokenKind::RightParen,
                    ']' => TokenKind::RightBracket,
                    _ => TokenKind::RightBrace,
                });
            }

            ',' => self.add_token(TokenKind::Comma),
            '@' => self.add_token(TokenKind::At),
            ':' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::OtherOperator(":=".to_string()));
                } else {
                    self.add_token(TokenKind::Colon);
                }
            }

            '.' => {
                if self.peek().is_ascii_digit() {
                    self.scan_number()?;
                } else if self.peek() == '.' && self.peek_next() == '.' {
                    self.advance();
                    self.advance();
                    self.add_token(TokenKind::Ellipsis);
                } else {
                    self.add_token(TokenKind::Dot);
                }
            }

            // Arithmetic operators
            '+' => self.operator_or_aug(TokenKind::Plus),
            '-' => {
                if self.match_char('>') {
                    self.add_token(TokenKind::Arrow);
                } else {
                    self.operator_or_aug(TokenKind::Minus);
                }
            }
            '*' => {
                if self.match_char('*') {
                    self.operator_or_aug(TokenKind::StarStar);
                } else {
                    self.operator_or_aug(TokenKind::Star);
                }
            }
            '/' => {
                if self.match_char('/') {
                    self.operator_or_aug(TokenKind::SlashSlash);
                } else {
                    self.operator_or_aug(TokenKind::Slash);
                }
            }
            '%' => self.operator_or_aug(TokenKind::Percent),
            '&' | '|' | '^' => {
                let op = c.to_string();
                self.operator_or_aug(TokenKind::OtherOperator(op));
            }
            '~' => self.add_token(TokenKind::OtherOperator("~".to_string())),

            // Comparison operators
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LtEq);
                } else if self.match_char('<') {
                    self.operator_or_aug(TokenKind::OtherOperator("<<".to_string()));
                } else {
                    self.add_token(TokenKind::Lt);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GtEq);
                } else if self.match_char('>') {
                    self.operator_or_aug(TokenKind::OtherOperator(">>".to_string()));
                } else {
                    self.add_token(TokenKind::Gt);
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::EqEq);
                } else {
                    self.add_token(TokenKind::Assign);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq);
                } else {
                    return Err(self.unexpected_char(c));
                }
            }

            // Strings
            '"' | '\'' => self.scan_string(c)?,

            // Numbers
            c if c.is_ascii_digit() => self.scan_number()?,

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' => self.scan_identifier_or_keyword(),

            _ => return Err(self.unexpected_char(c)),
        }

        Ok(())
    }

    /// Emits `kind`, or an augmented assignment if the operator is followed by `=`
    fn operator_or_aug(&mut self, kind: TokenKind) {
        if self.match_char('=') {
            let text: String = self.source[self.start..self.current].iter().collect();
            self.add_token(TokenKind::AugAssign(text));
        } else {
            self.add_token(kind);
        }
    }

    /// Skips the rest of a comment, leaving the cursor on its newline
    fn skip_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<()> {
        let triple = self.peek() == quote && self.peek_next() == quote;
        if triple {
            self.advance();
            self.advance();
        }

        let start_line = self.line;
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::ParseError {
                    line: start_line,
                    col: self.start_column,
                    message: "unterminated string literal".to_string(),
                });
            }

            let c = self.peek();
            if c == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_next() == quote && self.peek_at(2) == quote {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(Error::ParseError {
                        line: start_line,
                        col: self.start_column,
                        message: "unterminated string literal".to_string(),
                    });
                }
                self.advance();
                self.new_line();
                value.push('\n');
                continue;
            }
            if c == '\\' {
                self.advance();
                if self.is_at_end() {
                    continue;
                }
                let escaped = self.advance();
                if escaped == '\n' {
                    self.new_line();
                    continue;
                }
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                continue;
            }
            value.push(self.advance());
        }

        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn scan_number(&mut self) -> Result<()> {
        self.consume_digits();

        let mut is_float = self.source[self.start] == '.';
        if !is_float
            && self.peek() == '.'
            && self.peek_next() != '.'
            && !self.peek_next().is_alphabetic()
            && self.peek_next() != '_'
        {
            is_float = true;
            self.advance();
        }
        if is_float {
            self.consume_digits();
        }
        if matches!(self.peek(), 'e' | 'E')
            && (self.peek_next().is_ascii_digit()
                || (matches!(self.peek_next(), '+' | '-') && self.peek_at(2).is_ascii_digit()))
        {
            is_float = true;
            self.advance();
            if matches!(self.peek(), '+' | '-') {
                self.advance();
            }
            self.consume_digits();
        }

        let text: String = self.source[self.start..self.current]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        if is_float {
            let value: f64 = text.parse().map_err(|_| Error::ParseError {
                line: self.line,
                col: self.start_column,
                message: format!("invalid float literal `{}`", text),
            })?;
            self.add_token(TokenKind::Float(value));
        } else {
            let value: i64 = text.parse().map_err(|_| Error::ParseError {
                line: self.line,
                col: self.start_column,
                message: format!("integer literal `{}` does not fit in 64 bits", text),
            })?;
            self.add_token(TokenKind::Integer(value));
        }

        Ok(())
    }

    fn consume_digits(&mut self) {
        while self.peek().is_ascii_digit() || (self.peek() == '_' && self.peek_next().is_ascii_digit())
        {
            self.advance();
        }
    }

    fn scan_identifier_or_keyword(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier(text));
        self.add_token(kind);
    }

    /// Closes the current logical line unless it is already closed or empty
    fn end_logical_line(&mut self) {
        match self.tokens.last().map(|t| &t.kind) {
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent) => {}
            Some(_) => self.push_layout(TokenKind::Newline),
        }
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn unexpected_char(&self, c: char) -> Error {
        Error::ParseError {
            line: self.line,
            col: self.start_column,
            message: format!("unexpected character '{}'", c),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_next(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.source
            .get(self.current + offset)
            .copied()
            .unwrap_or('\0')
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens
            .push(Token::new(kind, lexeme, self.line, self.start_column));
    }

    fn push_layout(&mut self, kind: TokenKind) {
        self.tokens
            .push(Token::new(kind, String::new(), self.line, self.column));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_line() {
        let tokens = kinds("return a + b");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Return,
                TokenKind::Identifier("a".to_string()),
                TokenKind::Plus,
                TokenKind::Identifier("b".to_string()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let source = "def f(n: int) -> int:\n    while n > 0:\n        n = n - 1\n    return n\n";
        let tokens = kinds(source);
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_base_indentation_is_ignored() {
        let nested = kinds("    def f() -> int:\n        return 1\n");
        let flat = kinds("def f() -> int:\n    return 1\n");
        assert_eq!(nested, flat);
    }

    #[test]
    fn test_blank_and_comment_lines_do_not_change_layout() {
        let source = "def f() -> int:\n\n    # comment\n    return 1  # trailing\n";
        assert_eq!(kinds(source), kinds("def f() -> int:\n    return 1\n"));
    }

    #[test]
    fn test_trailing_comment_after_code() {
        let tokens = kinds("x = a + b  # sum of (a, b\ny = x\n");
        assert!(!tokens.contains(&TokenKind::Identifier("sum".to_string())));
        assert!(!tokens.contains(&TokenKind::LeftParen));
        let newlines = tokens.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_nul_byte_is_rejected() {
        for source in ["def f() -> int:\n\0\n    return 1\n", "\0", "x = 1\0\n"] {
            let err = Scanner::new(source).scan_tokens().unwrap_err();
            assert!(matches!(err, Error::ParseError { .. }), "{:?}", source);
        }
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("x = f(1,\n      2)\n");
        let newlines = tokens.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1_000")[0], TokenKind::Integer(1000));
        assert_eq!(kinds("2.5")[0], TokenKind::Float(2.5));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
        assert_eq!(kinds("3.")[0], TokenKind::Float(3.0));
    }

    #[test]
    fn test_integer_overflow_is_parse_error() {
        let err = Scanner::new("99999999999999999999").scan_tokens().unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("a -> b <= c != d += e ... f // g");
        assert!(tokens.contains(&TokenKind::Arrow));
        assert!(tokens.contains(&TokenKind::LtEq));
        assert!(tokens.contains(&TokenKind::NotEq));
        assert!(tokens.contains(&TokenKind::AugAssign("+=".to_string())));
        assert!(tokens.contains(&TokenKind::Ellipsis));
        assert!(tokens.contains(&TokenKind::SlashSlash));
    }

    #[test]
    fn test_reserved_words() {
        let tokens = kinds("for x in y");
        assert_eq!(tokens[0], TokenKind::For);
        assert_eq!(tokens[2], TokenKind::Reserved("in".to_string()));
    }

    #[test]
    fn test_docstring() {
        let tokens = kinds("\"\"\"multi\nline\"\"\"\nx = 1\n");
        assert_eq!(tokens[0], TokenKind::String("multi\nline".to_string()));
        assert_eq!(tokens[1], TokenKind::Newline);
    }

    #[test]
    fn test_bad_dedent() {
        let source = "def f() -> int:\n        x = 1\n    return x\n";
        let err = Scanner::new(source).scan_tokens().unwrap_err();
        assert!(matches!(err, Error::ParseError { line: 3, .. }));
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = Scanner::new("x = (1 + 2\n").scan_tokens().unwrap_err();
        assert!(matches!(err, Error::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_token_positions() {
        let tokens = Scanner::new("x = 10").scan_tokens().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[2].line, tokens[2].column), (1, 5));
        assert_eq!(tokens[2].lexeme, "10");
    }
}
