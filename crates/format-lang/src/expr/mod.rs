// Expression language: lexer, recursive descent parser, tree-walking evaluator

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod token;

use crate::error::Error;
use ast::Expr;
use lexer::Lexer;
use parser::Parser;

/// Parse an expression source string into an AST.
pub fn parse(source: &str) -> Result<Expr, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}
