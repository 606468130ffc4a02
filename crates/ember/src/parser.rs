//! Recursive-descent parser for Ember source text.
//!
//! Application is juxtaposition (`make-adder 22`), so argument lists end at
//! the first token that cannot start a primary expression — in particular at
//! newlines, closing brackets and keywords. A program is an implicit block of
//! `val` bindings followed by a result expression; when the result is
//! omitted, the last bound name is used.

use crate::ast::{Binding, Block, Expr, MatchArm, Pattern};
use crate::error::ParseError;
use crate::lexer::{tokenize, unescape, SpannedToken, Token};
use crate::value::{NUMBER_MAX, NUMBER_MIN};

/// Parses a whole program into an implicit block.
pub fn parse(source: &str) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let block = parser.parse_block(None)?;
    parser.skip_newlines();
    match parser.peek() {
        None => Ok(block),
        Some(tok) => Err(parser.unexpected(tok, "end of input")),
    }
}

struct Parser<'a> {
    tokens: Vec<SpannedToken<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<SpannedToken<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<Token> {
        self.peek().map(|t| t.token)
    }

    fn peek2_kind(&self) -> Option<Token> {
        self.tokens.get(self.pos + 1).map(|t| t.token)
    }

    fn unexpected(&self, tok: SpannedToken<'_>, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            found: tok.text.to_owned(),
            expected: expected.to_owned(),
            line: tok.line,
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<SpannedToken<'a>, ParseError> {
        match self.peek() {
            Some(tok) if tok.token == token => {
                self.pos += 1;
                Ok(tok)
            }
            Some(tok) => Err(self.unexpected(tok, expected)),
            None => Err(ParseError::UnexpectedEof {
                expected: expected.to_owned(),
            }),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == Some(Token::Newline) {
            self.pos += 1;
        }
    }

    /// After a block item: consume a newline, or accept the terminator/EOF.
    fn expect_separator(&mut self, terminator: Option<Token>) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(tok) if tok.token == Token::Newline => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) if Some(tok.token) == terminator => Ok(()),
            Some(tok) => Err(self.unexpected(tok, "newline")),
        }
    }

    // ========================================================================
    // Blocks and bindings
    // ========================================================================

    fn parse_block(&mut self, terminator: Option<Token>) -> Result<Block, ParseError> {
        let mut bindings = Vec::new();
        let mut result: Option<Expr> = None;
        loop {
            self.skip_newlines();
            let Some(tok) = self.peek() else { break };
            if Some(tok.token) == terminator {
                break;
            }
            if result.is_some() {
                return Err(self.unexpected(tok, "end of block after result expression"));
            }
            if tok.token == Token::KwVal && self.peek2_kind() == Some(Token::Ident) {
                bindings.push(self.parse_binding()?);
                self.expect_separator(terminator)?;
            } else {
                result = Some(self.parse_expr()?);
            }
        }
        let has_explicit_result = result.is_some();
        let result = match result {
            Some(expr) => expr,
            None => match bindings.last() {
                Some(last) => Expr::Var(last.name.clone()),
                None => return Err(ParseError::Empty { what: "block" }),
            },
        };
        Ok(Block {
            bindings,
            result: Box::new(result),
            has_explicit_result,
        })
    }

    fn parse_binding(&mut self) -> Result<Binding, ParseError> {
        self.expect(Token::KwVal, "'val'")?;
        let name = self.expect(Token::Ident, "binding name")?.text.to_owned();
        let value = if self.peek_kind() == Some(Token::LParen) {
            let params = self.parse_params()?;
            self.expect(Token::Equals, "'='")?;
            let body = self.parse_expr()?;
            Expr::Lambda {
                params,
                body: Box::new(body),
            }
        } else {
            self.expect(Token::Equals, "'='")?;
            self.parse_expr()?
        };
        Ok(Binding { name, value })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(tok) if tok.token == Token::RParen => {
                    self.pos += 1;
                    return Ok(params);
                }
                Some(tok) if tok.token == Token::Ident => {
                    self.pos += 1;
                    params.push(tok.text.to_owned());
                }
                Some(tok) => return Err(self.unexpected(tok, "parameter name or ')'")),
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "')'".to_owned(),
                    })
                }
            }
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kind() == Some(Token::KwVal) {
            // Anonymous lambda: `val (x y) = body`
            self.pos += 1;
            let params = self.parse_params()?;
            self.expect(Token::Equals, "'='")?;
            let body = self.parse_expr()?;
            return Ok(Expr::Lambda {
                params,
                body: Box::new(body),
            });
        }
        self.parse_application()
    }

    fn parse_application(&mut self) -> Result<Expr, ParseError> {
        let head = self.parse_primary()?;
        let mut args = Vec::new();
        while self.starts_primary() {
            args.push(self.parse_primary()?);
        }
        if args.is_empty() {
            return Ok(head);
        }
        // A symbol literal applied to arguments is a compound symbol.
        if let Expr::Symbol(symbol) = head {
            return Ok(Expr::Compound { symbol, args });
        }
        Ok(Expr::Apply {
            head: Box::new(head),
            args,
        })
    }

    fn starts_primary(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                Token::Number
                    | Token::StringLit
                    | Token::SymbolLit
                    | Token::Ident
                    | Token::Operator
                    | Token::LParen
                    | Token::LBrace
            )
        )
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(ParseError::UnexpectedEof {
                expected: "expression".to_owned(),
            });
        };
        match tok.token {
            Token::Number => {
                self.pos += 1;
                Ok(Expr::Number(self.parse_number(tok)?))
            }
            Token::StringLit => {
                self.pos += 1;
                Ok(Expr::Str(unescape(tok.text, tok.line)?))
            }
            Token::SymbolLit => {
                self.pos += 1;
                Ok(Expr::Symbol(tok.text[1..].to_owned()))
            }
            Token::Ident => {
                self.pos += 1;
                let mut expr = Expr::Var(tok.text.to_owned());
                while self.peek_kind() == Some(Token::Dot) {
                    self.pos += 1;
                    let field = self.expect(Token::Ident, "field name")?.text.to_owned();
                    expr = Expr::FieldAccess {
                        object: Box::new(expr),
                        field,
                    };
                }
                Ok(expr)
            }
            Token::Operator => {
                self.pos += 1;
                Ok(Expr::Var(tok.text.to_owned()))
            }
            Token::LParen => {
                self.pos += 1;
                self.skip_newlines();
                let expr = self.parse_expr()?;
                self.skip_newlines();
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBrace => {
                self.pos += 1;
                let block = self.parse_block(Some(Token::RBrace))?;
                self.expect(Token::RBrace, "'}'")?;
                Ok(Expr::Block(block))
            }
            Token::KwMatch => self.parse_match(),
            Token::KwModule => self.parse_module(),
            _ => Err(self.unexpected(tok, "expression")),
        }
    }

    fn parse_number(&self, tok: SpannedToken<'_>) -> Result<i32, ParseError> {
        let out_of_range = || ParseError::NumberOutOfRange {
            literal: tok.text.to_owned(),
            line: tok.line,
        };
        let value: i64 = tok.text.parse().map_err(|_| out_of_range())?;
        if value < i64::from(NUMBER_MIN) || value > i64::from(NUMBER_MAX) {
            return Err(out_of_range());
        }
        Ok(value as i32)
    }

    // ========================================================================
    // Match expressions
    // ========================================================================

    fn parse_match(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::KwMatch, "'match'")?;
        let subject = self.parse_application()?;
        self.expect(Token::KwWith, "'with'")?;
        let mut branches = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                Some(Token::KwEnd) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let pattern = self.parse_pattern()?;
                    self.expect(Token::Arrow, "'->'")?;
                    let body = self.parse_expr()?;
                    branches.push(MatchArm { pattern, body });
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "'end'".to_owned(),
                    })
                }
            }
        }
        if branches.is_empty() {
            return Err(ParseError::Empty {
                what: "match expression",
            });
        }
        Ok(Expr::Match {
            subject: Box::new(subject),
            branches,
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        if let Some(tok) = self.peek() {
            if tok.token == Token::SymbolLit {
                self.pos += 1;
                let symbol = tok.text[1..].to_owned();
                let mut args = Vec::new();
                while self.starts_pattern_primary() {
                    args.push(self.parse_pattern_primary()?);
                }
                if args.is_empty() {
                    return Ok(Pattern::Symbol(symbol));
                }
                return Ok(Pattern::Compound { symbol, args });
            }
        }
        self.parse_pattern_primary()
    }

    fn starts_pattern_primary(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(Token::Number | Token::SymbolLit | Token::Ident | Token::Underscore | Token::LParen)
        )
    }

    fn parse_pattern_primary(&mut self) -> Result<Pattern, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(ParseError::UnexpectedEof {
                expected: "pattern".to_owned(),
            });
        };
        match tok.token {
            Token::Number => {
                self.pos += 1;
                Ok(Pattern::Number(self.parse_number(tok)?))
            }
            Token::SymbolLit => {
                self.pos += 1;
                Ok(Pattern::Symbol(tok.text[1..].to_owned()))
            }
            Token::Ident => {
                self.pos += 1;
                Ok(Pattern::Var(tok.text.to_owned()))
            }
            Token::Underscore => {
                self.pos += 1;
                Ok(Pattern::Wildcard)
            }
            Token::LParen => {
                self.pos += 1;
                let pattern = self.parse_pattern()?;
                self.expect(Token::RParen, "')'")?;
                Ok(pattern)
            }
            _ => Err(self.unexpected(tok, "pattern")),
        }
    }

    // ========================================================================
    // Modules
    // ========================================================================

    fn parse_module(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::KwModule, "'module'")?;
        self.expect(Token::LBrace, "'{'")?;
        let mut bindings = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Some(tok) if tok.token == Token::RBrace => {
                    self.pos += 1;
                    break;
                }
                Some(tok) if tok.token == Token::KwVal => {
                    bindings.push(self.parse_binding()?);
                    self.expect_separator(Some(Token::RBrace))?;
                }
                Some(tok) => return Err(self.unexpected(tok, "'val' binding or '}'")),
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "'}'".to_owned(),
                    })
                }
            }
        }
        Ok(Expr::Module { bindings })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_number_program() {
        let block = parse("4815").unwrap();
        assert!(block.bindings.is_empty());
        assert_eq!(*block.result, Expr::Number(4815));
    }

    #[test]
    fn test_bindings_with_result() {
        let block = parse("val a = 4\nval b = 7\nadd a b").unwrap();
        assert_eq!(block.bindings.len(), 2);
        assert_eq!(block.bindings[0].name, "a");
        assert_eq!(
            *block.result,
            Expr::Apply {
                head: Box::new(Expr::Var("add".to_owned())),
                args: vec![Expr::Var("a".to_owned()), Expr::Var("b".to_owned())],
            }
        );
    }

    #[test]
    fn test_trailing_binding_becomes_result() {
        let block = parse("val a = 4\nval b = 7").unwrap();
        assert_eq!(*block.result, Expr::Var("b".to_owned()));
    }

    #[test]
    fn test_compound_symbol_literal() {
        let block = parse(":sym 2 3").unwrap();
        assert_eq!(
            *block.result,
            Expr::Compound {
                symbol: "sym".to_owned(),
                args: vec![Expr::Number(2), Expr::Number(3)],
            }
        );
    }

    #[test]
    fn test_named_function_binding() {
        let block = parse("val make-adder (x) = { val (y) = add x y }\nmake-adder").unwrap();
        let Expr::Lambda { params, body } = &block.bindings[0].value else {
            panic!("expected lambda, got {:?}", block.bindings[0].value);
        };
        assert_eq!(params, &["x".to_owned()]);
        let Expr::Block(inner) = body.as_ref() else {
            panic!("expected block body");
        };
        assert!(matches!(*inner.result, Expr::Lambda { .. }));
    }

    #[test]
    fn test_parenthesized_arguments() {
        let block = parse("sub (sub z y) (sub x a)").unwrap();
        let Expr::Apply { args, .. } = &*block.result else {
            panic!("expected application");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0], Expr::Apply { .. }));
    }

    #[test]
    fn test_match_expression() {
        let source = "match n with\n  0 -> 1\n  :pair a _ -> a\n  x -> mul x 2\nend";
        let block = parse(source).unwrap();
        let Expr::Match { subject, branches } = &*block.result else {
            panic!("expected match");
        };
        assert_eq!(**subject, Expr::Var("n".to_owned()));
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0].pattern, Pattern::Number(0));
        assert_eq!(
            branches[1].pattern,
            Pattern::Compound {
                symbol: "pair".to_owned(),
                args: vec![Pattern::Var("a".to_owned()), Pattern::Wildcard],
            }
        );
        assert_eq!(branches[2].pattern, Pattern::Var("x".to_owned()));
    }

    #[test]
    fn test_nested_compound_pattern_needs_parens() {
        let source = "match p with\n  :pair (:pair a b) c -> a\nend";
        let block = parse(source).unwrap();
        let Expr::Match { branches, .. } = &*block.result else {
            panic!("expected match");
        };
        let Pattern::Compound { args, .. } = &branches[0].pattern else {
            panic!("expected compound pattern");
        };
        assert!(matches!(args[0], Pattern::Compound { .. }));
        assert_eq!(args[1], Pattern::Var("c".to_owned()));
    }

    #[test]
    fn test_module_and_field_access() {
        let source = "val geo = module { val sides = 4\nval area = 16 }\ngeo.area";
        let block = parse(source).unwrap();
        let Expr::Module { bindings } = &block.bindings[0].value else {
            panic!("expected module");
        };
        assert_eq!(bindings.len(), 2);
        assert_eq!(
            *block.result,
            Expr::FieldAccess {
                object: Box::new(Expr::Var("geo".to_owned())),
                field: "area".to_owned(),
            }
        );
    }

    #[test]
    fn test_operator_head() {
        let block = parse("+ 1 2").unwrap();
        let Expr::Apply { head, args } = &*block.result else {
            panic!("expected application");
        };
        assert_eq!(**head, Expr::Var("+".to_owned()));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_empty_program_rejected() {
        assert!(matches!(parse(""), Err(ParseError::Empty { .. })));
        assert!(matches!(parse("\n\n"), Err(ParseError::Empty { .. })));
    }

    #[test]
    fn test_anonymous_lambda_expression() {
        let block = parse("val (x y) = add x y").unwrap();
        let Expr::Lambda { params, .. } = &*block.result else {
            panic!("expected lambda result");
        };
        assert_eq!(params.len(), 2);
    }
}
