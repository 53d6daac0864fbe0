use super::ast::{Annotation, BinaryOp, CompareOp, Expression, FunctionDef, Param, Statement};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};

/// Deepest nesting of expressions, operator chains, suites and annotations
/// the parser accepts
pub const MAX_NESTING: usize = 200;

/// Recursive-descent parser for a single annotated function definition
///
/// Accepts exactly one `def` (optionally decorated) and nothing after it.
/// Anything outside the compilable grammar is reported as
/// [`Error::UnsupportedConstruct`] rather than a parse error, so callers can
/// tell "not valid source" from "valid source we refuse to compile".
pub struct FunctionParser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl FunctionParser {
    /// Creates a new parser over a scanned token stream
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenKind::Eof, String::new(), line, 1));
        }
        FunctionParser {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Parses the token stream into a function definition
    pub fn parse(&mut self) -> Result<FunctionDef> {
        self.skip_newlines();
        self.skip_decorators()?;

        let def = self.parse_def()?;

        self.skip_newlines();
        if !self.is_at_end() {
            return Err(self.syntax_error(format!(
                "expected end of input after the body of `{}`, found {}",
                def.name,
                Self::describe(&self.peek().kind)
            )));
        }

        Ok(def)
    }

    /// Parses only the `def` header, leaving the body empty
    ///
    /// Used to derive a descriptor from source without validating the body.
    pub fn parse_header(&mut self) -> Result<FunctionDef> {
        self.skip_newlines();
        self.skip_decorators()?;
        let line = self.peek().line;
        self.expect_def()?;
        let name = self.expect_identifier("function name")?;
        let params = self.parse_params()?;
        let returns = self.parse_return_annotation()?;
        self.consume(TokenKind::Colon, "`:` after the function header")?;

        Ok(FunctionDef {
            name,
            params,
            returns,
            body: Vec::new(),
            line,
        })
    }

    /// Parses a standalone annotation such as `list[int]`
    pub fn parse_annotation_only(&mut self) -> Result<Annotation> {
        let annotation = self.parse_annotation()?;
        self.skip_newlines();
        if !self.is_at_end() {
            return Err(self.syntax_error(format!(
                "unexpected {} after annotation `{}`",
                Self::describe(&self.peek().kind),
                annotation
            )));
        }
        Ok(annotation)
    }

    fn skip_decorators(&mut self) -> Result<()> {
        while self.check(&TokenKind::At) {
            self.advance();
            // The decorator expression is irrelevant to compilation
            while !self.check(&TokenKind::Newline) {
                if self.is_at_end() {
                    return Err(self.syntax_error("expected `def` after decorator"));
                }
                self.advance();
            }
            self.skip_newlines();
        }
        Ok(())
    }

    fn expect_def(&mut self) -> Result<()> {
        match &self.peek().kind {
            TokenKind::Def => {
                self.advance();
                Ok(())
            }
            TokenKind::Reserved(word) if word == "async" => {
                Err(Error::unsupported("`async` function", self.peek().line))
            }
            TokenKind::Reserved(word) if word == "class" => Err(Error::unsupported(
                "class definition (expected a single function)",
                self.peek().line,
            )),
            other => Err(self.syntax_error(format!(
                "expected `def`, found {}",
                Self::describe(other)
            ))),
        }
    }

    fn parse_def(&mut self) -> Result<FunctionDef> {
        let mut def = self.parse_header()?;

        let body = self.parse_suite()?;
        if body.is_empty() {
            return Err(Error::ParseError {
                line: def.line,
                col: 1,
                message: format!("function `{}` has an empty body", def.name),
            });
        }

        def.body = body;
        Ok(def)
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.consume(TokenKind::LeftParen, "`(` after the function name")?;

        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Star | TokenKind::StarStar => {
                    return Err(Error::unsupported(
                        "variadic `*args`/`**kwargs` parameter",
                        token.line,
                    ));
                }
                TokenKind::Slash => {
                    return Err(Error::unsupported(
                        "positional-only parameter marker `/`",
                        token.line,
                    ));
                }
                _ => {}
            }

            let name = self.expect_identifier("parameter name")?;
            let annotation = if self.match_token(&TokenKind::Colon) {
                Some(self.parse_annotation()?)
            } else {
                None
            };
            if self.check(&TokenKind::Assign) {
                return Err(Error::unsupported(
                    format!("default value for parameter `{}`", name),
                    self.peek().line,
                ));
            }
            params.push(Param { name, annotation });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightParen, "`)` to close the parameter list")?;
        Ok(params)
    }

    fn parse_return_annotation(&mut self) -> Result<Option<Annotation>> {
        if self.match_token(&TokenKind::Arrow) {
            Ok(Some(self.parse_annotation()?))
        } else {
            Ok(None)
        }
    }

    fn parse_annotation(&mut self) -> Result<Annotation> {
        let token = self.advance();
        let base = match token.kind {
            TokenKind::Ellipsis => return Ok(Annotation::Ellipsis),
            TokenKind::Identifier(name) => name,
            // `None` and friends resolve to type errors later, not parse errors
            TokenKind::Reserved(word) => word,
            other => {
                return Err(Error::ParseError {
                    line: token.line,
                    col: token.column,
                    message: format!(
                        "expected a type annotation, found {}",
                        Self::describe(&other)
                    ),
                });
            }
        };

        if self.match_token(&TokenKind::LeftBracket) {
            self.enter()?;
            let arg = self.parse_annotation()?;
            self.leave(1);
            self.consume(TokenKind::RightBracket, "`]` to close the annotation")?;
            Ok(Annotation::Generic {
                base,
                arg: Box::new(arg),
            })
        } else {
            Ok(Annotation::Name(base))
        }
    }

    /// Parses the block after a `:`: an indented suite or one simple
    /// statement on the same line
    fn parse_suite(&mut self) -> Result<Vec<Statement>> {
        self.enter()?;
        let statements = self.parse_suite_inner()?;
        self.leave(1);
        Ok(statements)
    }

    fn parse_suite_inner(&mut self) -> Result<Vec<Statement>> {
        if !self.match_token(&TokenKind::Newline) {
            return Ok(vec![self.parse_statement()?]);
        }

        if !self.check(&TokenKind::Indent) {
            return Err(self.syntax_error("expected an indented block"));
        }
        self.advance();

        let mut statements = Vec::new();
        // A leading docstring is documentation, not a statement
        self.skip_docstring();
        while !self.check(&TokenKind::Dedent) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        self.match_token(&TokenKind::Dedent);

        Ok(statements)
    }

    /// Skips a string-literal expression statement at the head of a suite
    fn skip_docstring(&mut self) {
        if let TokenKind::String(_) = self.peek().kind {
            if matches!(self.peek_next().kind, TokenKind::Newline) {
                self.advance();
                self.advance();
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let token = self.peek().clone();
        let line = token.line;

        match &token.kind {
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.end_statement()?;
                Ok(Statement::Return { value, line })
            }
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expression()?;
                self.consume(TokenKind::Colon, "`:` after the loop condition")?;
                let body = self.parse_suite()?;
                if self.check(&TokenKind::Else) {
                    return Err(Error::unsupported("`while ... else` clause", self.peek().line));
                }
                Ok(Statement::While { condition, body })
            }
            TokenKind::If => {
                self.advance();
                self.parse_if_chain()
            }
            TokenKind::Elif | TokenKind::Else => Err(self.syntax_error(format!(
                "{} without a matching `if`",
                Self::describe(&token.kind)
            ))),
            TokenKind::For => Err(Error::unsupported("`for` loop over a sequence", line)),
            TokenKind::Def => Err(Error::unsupported("nested function definition", line)),
            TokenKind::At => Err(Error::unsupported("decorated nested definition", line)),
            TokenKind::Lambda => Err(Error::unsupported("`lambda` expression", line)),
            TokenKind::Reserved(word) => Err(Error::unsupported(
                match word.as_str() {
                    "class" => "nested class definition".to_string(),
                    "break" | "continue" | "pass" | "del" | "raise" | "assert" | "import"
                    | "from" | "global" | "nonlocal" | "try" | "with" => {
                        format!("`{}` statement", word)
                    }
                    _ => format!("`{}`", word),
                },
                line,
            )),
            TokenKind::Identifier(name) => match &self.peek_next().kind {
                TokenKind::Assign => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    let value = self.parse_expression()?;
                    if self.check(&TokenKind::Assign) {
                        return Err(Error::unsupported("chained assignment", line));
                    }
                    self.end_statement()?;
                    Ok(Statement::Assign { name, value, line })
                }
                TokenKind::AugAssign(op) => Err(Error::unsupported(
                    format!("augmented assignment `{}`", op),
                    line,
                )),
                TokenKind::Comma => Err(Error::unsupported(
                    "multiple assignment targets (tuple unpacking)",
                    line,
                )),
                TokenKind::Colon => Err(Error::unsupported("annotated local assignment", line)),
                _ => self.parse_expression_statement(line),
            },
            _ => self.parse_expression_statement(line),
        }
    }

    /// Reports why a statement that starts with an expression is rejected
    fn parse_expression_statement(&mut self, line: usize) -> Result<Statement> {
        let expr = self.parse_expression()?;
        match &self.peek().kind {
            TokenKind::Assign => match expr {
                Expression::Subscript { .. } => {
                    Err(Error::unsupported("assignment through a subscript", line))
                }
                other => Err(Error::unsupported(
                    format!("assignment to `{}`", other),
                    line,
                )),
            },
            TokenKind::AugAssign(op) => Err(Error::unsupported(
                format!("augmented assignment `{}`", op),
                line,
            )),
            TokenKind::Comma => Err(Error::unsupported(
                "multiple assignment targets (tuple unpacking)",
                line,
            )),
            _ => {
                self.end_statement()?;
                Err(Error::unsupported(
                    format!("bare expression statement `{}`", expr),
                    line,
                ))
            }
        }
    }

    /// Parses the remainder of an `if`/`elif` after its keyword
    fn parse_if_chain(&mut self) -> Result<Statement> {
        let condition = self.parse_expression()?;
        self.consume(TokenKind::Colon, "`:` after the if condition")?;
        let then_branch = self.parse_suite()?;

        let else_branch = if self.match_token(&TokenKind::Elif) {
            self.enter()?;
            let nested = self.parse_if_chain()?;
            self.leave(1);
            vec![nested]
        } else if self.match_token(&TokenKind::Else) {
            self.consume(TokenKind::Colon, "`:` after `else`")?;
            self.parse_suite()?
        } else {
            Vec::new()
        };

        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        )
    }

    fn end_statement(&mut self) -> Result<()> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Dedent | TokenKind::Eof => Ok(()),
            TokenKind::Comma => Err(Error::unsupported("tuple expression", token.line)),
            TokenKind::If => Err(Error::unsupported("conditional expression", token.line)),
            TokenKind::For => Err(Error::unsupported("generator expression", token.line)),
            other => Err(self.syntax_error(format!(
                "expected end of line, found {}",
                Self::describe(other)
            ))),
        }
    }

    // Expressions

    fn parse_expression(&mut self) -> Result<Expression> {
        self.enter()?;
        let expr = self.parse_comparison()?;
        self.leave(1);
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let left = self.parse_arith()?;

        let Some(op) = Self::compare_op(&self.peek().kind) else {
            self.reject_operator()?;
            return Ok(left);
        };
        self.advance();
        let right = self.parse_arith()?;

        if Self::compare_op(&self.peek().kind).is_some() {
            return Err(Error::unsupported("chained comparison", self.peek().line));
        }
        self.reject_operator()?;

        Ok(Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_arith(&mut self) -> Result<Expression> {
        let mut expr = self.parse_unary()?;

        // Each operator deepens the left-leaning tree by one level
        let mut chain = 0;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.enter()?;
            chain += 1;
            self.advance();
            let right = self.parse_unary()?;
            expr = Expression::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        self.leave(chain);

        Ok(expr)
    }

    /// Rejects operators that are lexically valid but outside the grammar
    fn reject_operator(&self) -> Result<()> {
        let token = self.peek();
        let construct = match &token.kind {
            TokenKind::Star
            | TokenKind::StarStar
            | TokenKind::Slash
            | TokenKind::SlashSlash
            | TokenKind::Percent
            | TokenKind::At => format!("binary operator `{}`", token.kind),
            TokenKind::OtherOperator(op) => format!("operator `{}`", op),
            TokenKind::Reserved(word) if word == "and" || word == "or" => {
                format!("boolean operator `{}`", word)
            }
            TokenKind::Reserved(word) if word == "in" || word == "is" || word == "not" => {
                format!("`{}` comparison", word)
            }
            _ => return Ok(()),
        };
        Err(Error::unsupported(construct, token.line))
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Minus => {
                self.advance();
                match self.peek().kind {
                    TokenKind::Integer(n) => {
                        self.advance();
                        Ok(Expression::IntLiteral(n.wrapping_neg()))
                    }
                    TokenKind::Float(x) => {
                        self.advance();
                        Ok(Expression::FloatLiteral(-x))
                    }
                    _ => Err(Error::unsupported(
                        "unary minus on a non-literal operand",
                        token.line,
                    )),
                }
            }
            TokenKind::Plus => Err(Error::unsupported("unary `+`", token.line)),
            TokenKind::OtherOperator(op) if op == "~" => {
                Err(Error::unsupported("bitwise inversion `~`", token.line))
            }
            TokenKind::Reserved(word) if word == "not" => {
                Err(Error::unsupported("boolean operator `not`", token.line))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expression> {
        let mut expr = self.parse_atom()?;

        let mut chain = 0;
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::LeftBracket => {
                    self.enter()?;
                    chain += 1;
                    self.advance();
                    let index = self.parse_expression()?;
                    if self.check(&TokenKind::Colon) {
                        return Err(Error::unsupported("slice", token.line));
                    }
                    self.consume(TokenKind::RightBracket, "`]` to close the subscript")?;
                    expr = Expression::Subscript {
                        base: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    return Err(Error::unsupported("attribute access", token.line));
                }
                TokenKind::LeftParen => {
                    return Err(Error::unsupported(
                        format!("call through the expression `{}`", expr),
                        token.line,
                    ));
                }
                _ => break,
            }
        }
        self.leave(chain);

        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expression> {
        let token = self.peek().clone();
        let line = token.line;

        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                if self.match_token(&TokenKind::LeftParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expression::Call { callee: name, args })
                } else {
                    Ok(Expression::Name(name))
                }
            }
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::IntLiteral(n))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expression::FloatLiteral(x))
            }
            TokenKind::LeftParen => {
                self.advance();
                if self.check(&TokenKind::RightParen) {
                    return Err(Error::unsupported("empty tuple", line));
                }
                let expr = self.parse_expression()?;
                match self.peek().kind {
                    TokenKind::Comma => return Err(Error::unsupported("tuple expression", line)),
                    TokenKind::For => return Err(Error::unsupported("generator expression", line)),
                    _ => {}
                }
                self.consume(TokenKind::RightParen, "`)` to close the parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                Err(Error::unsupported("list display or comprehension", line))
            }
            TokenKind::LeftBrace => Err(Error::unsupported(
                "dict or set display or comprehension",
                line,
            )),
            TokenKind::String(_) => Err(Error::unsupported("string literal", line)),
            TokenKind::Lambda => Err(Error::unsupported("`lambda` expression", line)),
            TokenKind::Reserved(word) => Err(Error::unsupported(
                match word.as_str() {
                    "True" | "False" => format!("boolean literal `{}`", word),
                    "None" => "`None` literal".to_string(),
                    _ => format!("`{}` expression", word),
                },
                line,
            )),
            TokenKind::Ellipsis => Err(Error::unsupported("`...` literal", line)),
            other => Err(self.syntax_error(format!(
                "expected an expression, found {}",
                Self::describe(&other)
            ))),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Star | TokenKind::StarStar => {
                    return Err(Error::unsupported("argument unpacking", token.line));
                }
                TokenKind::Identifier(name)
                    if matches!(self.peek_next().kind, TokenKind::Assign) =>
                {
                    return Err(Error::unsupported(
                        format!("keyword argument `{}=`", name),
                        token.line,
                    ));
                }
                _ => {}
            }

            args.push(self.parse_expression()?);
            if self.check(&TokenKind::For) {
                return Err(Error::unsupported("generator expression", token.line));
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightParen, "`)` to close the argument list")?;
        Ok(args)
    }

    fn compare_op(kind: &TokenKind) -> Option<CompareOp> {
        match kind {
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::LtEq => Some(CompareOp::Le),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::GtEq => Some(CompareOp::Ge),
            TokenKind::EqEq => Some(CompareOp::Eq),
            TokenKind::NotEq => Some(CompareOp::Ne),
            _ => None,
        }
    }

    // Token helpers

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Reserved(word) => {
                let message = format!("expected {}, found reserved word `{}`", what, word);
                Err(self.syntax_error(message))
            }
            other => {
                let message = format!("expected {}, found {}", what, Self::describe(other));
                Err(self.syntax_error(message))
            }
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let message = format!(
                "expected {}, found {}",
                expected,
                Self::describe(&self.peek().kind)
            );
            Err(self.syntax_error(message))
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.syntax_error(format!(
                "nesting exceeds {} levels",
                MAX_NESTING
            )));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        Error::ParseError {
            line: token.line,
            col: token.column,
            message: message.into(),
        }
    }

    /// Human-readable token description for diagnostics
    fn describe(kind: &TokenKind) -> String {
        match kind {
            TokenKind::Integer(_) => "integer literal".to_string(),
            TokenKind::Float(_) => "float literal".to_string(),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::Identifier(name) => format!("identifier `{}`", name),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "unexpected indentation".to_string(),
            TokenKind::Dedent => "end of block".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other),
        }
    }
}
