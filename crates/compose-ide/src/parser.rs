//! Lexer, parser and AST of the Compose DSL.
//!
//! The DSL is a small JavaScript-flavoured language: literals, arrays,
//! objects, arrow functions, member access, calls, the usual operators,
//! `let`/`const`, `if`/`else` and `return`. The same expression grammar is
//! reused for the right-hand side of action statements.

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::fmt;
use std::rc::Rc;

mod lexer;
pub use lexer::{Token, lexer};

mod source;
pub use source::SourceCode;

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Statement>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|statements| {
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);
        let bracket_curly_open = just(Token::BracketCurlyOpen);
        let bracket_curly_close = just(Token::BracketCurlyClose);
        let bracket_square_open = just(Token::BracketSquareOpen);
        let bracket_square_close = just(Token::BracketSquareClose);
        let comma = just(Token::Comma);
        let semicolons = just(Token::Semicolon).repeated();

        let identifier = select! { Token::Identifier(identifier) => identifier.to_string() };

        let block = statements
            .clone()
            .delimited_by(bracket_curly_open.clone(), bracket_curly_close.clone());

        let expression = recursive(|expression| {
            let literal = select! {
                Token::Number(number) => Literal::Number(number),
                Token::Text(raw) => Literal::Text(unescape(raw)),
                Token::True => Literal::Bool(true),
                Token::False => Literal::Bool(false),
                Token::Null => Literal::Null,
            }
            .map(Expression::Literal);

            let function = {
                let parameters = choice((
                    identifier.clone().map(|parameter| vec![parameter]),
                    identifier
                        .clone()
                        .separated_by(comma.clone())
                        .allow_trailing()
                        .collect::<Vec<_>>()
                        .delimited_by(bracket_round_open.clone(), bracket_round_close.clone()),
                ));

                let body = choice((
                    block.clone().map(FunctionBody::Block),
                    expression
                        .clone()
                        .map(|body| FunctionBody::Expression(Box::new(body))),
                ));

                parameters
                    .then_ignore(just(Token::Arrow))
                    .then(body)
                    .map_with(|(parameters, body), extra| {
                        Expression::Function(Rc::new(Function {
                            parameters,
                            body,
                            span: extra.span(),
                        }))
                    })
            };

            let array = expression
                .clone()
                .separated_by(comma.clone())
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
                .map(Expression::Array);

            let object = {
                let key = identifier
                    .clone()
                    .or(select! { Token::Text(raw) => unescape(raw) });

                key.then_ignore(just(Token::Colon))
                    .then(expression.clone())
                    .separated_by(comma.clone())
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(bracket_curly_open.clone(), bracket_curly_close.clone())
                    .map(Expression::Object)
            };

            let variable = identifier.clone().map(Expression::Identifier);

            let nested = expression
                .clone()
                .delimited_by(bracket_round_open.clone(), bracket_round_close.clone());

            let atom = choice((function, literal, array, object, variable))
                .map_with(|node, extra| Spanned {
                    node,
                    span: extra.span(),
                })
                .or(nested);

            let postfix = choice((
                expression
                    .clone()
                    .separated_by(comma.clone())
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(bracket_round_open.clone(), bracket_round_close.clone())
                    .map(Postfix::Call),
                just(Token::Dot)
                    .ignore_then(identifier.clone())
                    .map(Postfix::Member),
                expression
                    .clone()
                    .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
                    .map(Postfix::Index),
            ))
            .map_with(|postfix, extra| (postfix, extra.span()));

            let call_chain = atom.foldl(
                postfix.repeated(),
                |target: Spanned<Expression>, (postfix, postfix_span): (Postfix, Span)| {
                    let span = Span::from(target.span.into_range().start..postfix_span.into_range().end);
                    let node = match postfix {
                        Postfix::Call(arguments) => Expression::Call {
                            callee: Box::new(target),
                            arguments,
                        },
                        Postfix::Member(property) => Expression::Member {
                            object: Box::new(target),
                            property,
                        },
                        Postfix::Index(index) => Expression::Index {
                            object: Box::new(target),
                            index: Box::new(index),
                        },
                    };
                    Spanned { span, node }
                },
            );

            let operators = call_chain.pratt((
                // Precedence 1 (lowest): logical or
                infix(left(1), just(Token::Or), |l, _, r, extra| {
                    binary(BinaryOperator::Or, l, r, extra.span())
                }),
                // Precedence 2: logical and
                infix(left(2), just(Token::And), |l, _, r, extra| {
                    binary(BinaryOperator::And, l, r, extra.span())
                }),
                // Precedence 3: equality
                infix(left(3), just(Token::StrictEqual), |l, _, r, extra| {
                    binary(BinaryOperator::Equal, l, r, extra.span())
                }),
                infix(left(3), just(Token::Equal), |l, _, r, extra| {
                    binary(BinaryOperator::Equal, l, r, extra.span())
                }),
                infix(left(3), just(Token::StrictNotEqual), |l, _, r, extra| {
                    binary(BinaryOperator::NotEqual, l, r, extra.span())
                }),
                infix(left(3), just(Token::NotEqual), |l, _, r, extra| {
                    binary(BinaryOperator::NotEqual, l, r, extra.span())
                }),
                // Precedence 4: comparison
                infix(left(4), just(Token::Less), |l, _, r, extra| {
                    binary(BinaryOperator::Less, l, r, extra.span())
                }),
                infix(left(4), just(Token::LessOrEqual), |l, _, r, extra| {
                    binary(BinaryOperator::LessOrEqual, l, r, extra.span())
                }),
                infix(left(4), just(Token::Greater), |l, _, r, extra| {
                    binary(BinaryOperator::Greater, l, r, extra.span())
                }),
                infix(left(4), just(Token::GreaterOrEqual), |l, _, r, extra| {
                    binary(BinaryOperator::GreaterOrEqual, l, r, extra.span())
                }),
                // Precedence 5: additive
                infix(left(5), just(Token::Plus), |l, _, r, extra| {
                    binary(BinaryOperator::Add, l, r, extra.span())
                }),
                infix(left(5), just(Token::Minus), |l, _, r, extra| {
                    binary(BinaryOperator::Subtract, l, r, extra.span())
                }),
                // Precedence 6: multiplicative
                infix(left(6), just(Token::Asterisk), |l, _, r, extra| {
                    binary(BinaryOperator::Multiply, l, r, extra.span())
                }),
                infix(left(6), just(Token::Slash), |l, _, r, extra| {
                    binary(BinaryOperator::Divide, l, r, extra.span())
                }),
                infix(left(6), just(Token::Percent), |l, _, r, extra| {
                    binary(BinaryOperator::Remainder, l, r, extra.span())
                }),
                // Precedence 7 (highest): prefix operators
                prefix(7, just(Token::Not), |_, operand, extra| {
                    unary(UnaryOperator::Not, operand, extra.span())
                }),
                prefix(7, just(Token::Minus), |_, operand, extra| {
                    unary(UnaryOperator::Negate, operand, extra.span())
                }),
            ));

            operators
                .then(
                    just(Token::Question)
                        .ignore_then(expression.clone())
                        .then_ignore(just(Token::Colon))
                        .then(expression)
                        .or_not(),
                )
                .map_with(|(condition, branches), extra| match branches {
                    Some((consequent, alternative)) => Spanned {
                        span: extra.span(),
                        node: Expression::Conditional {
                            condition: Box::new(condition),
                            consequent: Box::new(consequent),
                            alternative: Box::new(alternative),
                        },
                    },
                    None => condition,
                })
        });

        let binding = choice((just(Token::Let), just(Token::Const)))
            .ignore_then(identifier)
            .then_ignore(just(Token::Assign))
            .then(expression.clone())
            .map(|(name, value)| Statement::Let { name, value });

        let return_statement = just(Token::Return)
            .ignore_then(expression.clone().or_not())
            .map(Statement::Return);

        let if_statement = recursive(|if_statement| {
            just(Token::If)
                .ignore_then(
                    expression
                        .clone()
                        .delimited_by(bracket_round_open.clone(), bracket_round_close.clone()),
                )
                .then(block.clone())
                .then(
                    just(Token::Else)
                        .ignore_then(choice((
                            block.clone(),
                            if_statement.map_with(|statement, extra| {
                                vec![Spanned {
                                    node: statement,
                                    span: extra.span(),
                                }]
                            }),
                        )))
                        .or_not(),
                )
                .map(|((condition, then_branch), else_branch)| Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                })
        });

        let expression_statement = expression.map(Statement::Expression);

        let statement = choice((binding, if_statement, return_statement, expression_statement))
            .map_with(|node, extra| Spanned {
                node,
                span: extra.span(),
            })
            .then_ignore(semicolons.clone());

        semicolons.ignore_then(statement.repeated().collect::<Vec<_>>())
    })
}

enum Postfix {
    Call(Vec<Spanned<Expression>>),
    Member(String),
    Index(Spanned<Expression>),
}

fn binary(
    operator: BinaryOperator,
    operand_a: Spanned<Expression>,
    operand_b: Spanned<Expression>,
    span: Span,
) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::Binary {
            operator,
            operand_a: Box::new(operand_a),
            operand_b: Box::new(operand_b),
        },
    }
}

fn unary(operator: UnaryOperator, operand: Spanned<Expression>, span: Span) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::Unary {
            operator,
            operand: Box::new(operand),
        },
    }
}

fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut characters = raw.chars();
    while let Some(character) = characters.next() {
        if character != '\\' {
            text.push(character);
            continue;
        }
        match characters.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some('0') => text.push('\0'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let {
        name: String,
        value: Spanned<Expression>,
    },
    Expression(Spanned<Expression>),
    If {
        condition: Spanned<Expression>,
        then_branch: Vec<Spanned<Statement>>,
        else_branch: Option<Vec<Spanned<Statement>>>,
    },
    Return(Option<Spanned<Expression>>),
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Array(Vec<Spanned<Self>>),
    Object(Vec<(String, Spanned<Self>)>),
    Identifier(String),
    Member {
        object: Box<Spanned<Self>>,
        property: String,
    },
    Index {
        object: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
    Call {
        callee: Box<Spanned<Self>>,
        arguments: Vec<Spanned<Self>>,
    },
    Function(Rc<Function>),
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    Binary {
        operator: BinaryOperator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    Conditional {
        condition: Box<Spanned<Self>>,
        consequent: Box<Spanned<Self>>,
        alternative: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

/// An arrow function. Shared between every closure created from it.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: FunctionBody,
    pub span: Span,
}

#[derive(Debug)]
pub enum FunctionBody {
    Expression(Box<Spanned<Expression>>),
    Block(Vec<Spanned<Statement>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operator = match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Equal => "===",
            Self::NotEqual => "!==",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
        };
        write!(f, "{operator}")
    }
}

/// A syntax failure with a rendered diagnostic.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
    pub report: String,
}

/// Lex and parse a whole program.
///
/// Comments are dropped between lexing and parsing. On failure every lexer
/// or parser error is rendered with `ariadne`, and the first one is returned
/// with the concatenated report.
pub fn parse_program(
    filename: &str,
    source_code: &str,
) -> Result<Vec<Spanned<Statement>>, SyntaxError> {
    let (tokens, errors) = lexer().parse(source_code).into_output_errors();
    if !errors.is_empty() {
        return Err(report_errors(errors, filename, source_code));
    }
    let Some(mut tokens) = tokens else {
        return Err(SyntaxError {
            message: "source could not be tokenized".to_string(),
            span: Span::from(0..0),
            report: String::new(),
        });
    };

    tokens.retain(|spanned_token| !matches!(spanned_token.node, Token::Comment(_)));

    let (statements, errors) = parser()
        .parse(tokens.map(
            Span::from(source_code.len()..source_code.len()),
            |Spanned { node, span }| (node, span),
        ))
        .into_output_errors();
    if !errors.is_empty() {
        return Err(report_errors(errors, filename, source_code));
    }
    statements.ok_or_else(|| SyntaxError {
        message: "source could not be parsed".to_string(),
        span: Span::from(0..0),
        report: String::new(),
    })
}

/// Parse source that must consist of exactly one expression.
pub fn parse_expression(
    filename: &str,
    source_code: &str,
) -> Result<Spanned<Expression>, SyntaxError> {
    let mut statements = parse_program(filename, source_code)?;
    match (statements.pop(), statements.is_empty()) {
        (
            Some(Spanned {
                node: Statement::Expression(expression),
                ..
            }),
            true,
        ) => Ok(expression),
        _ => Err(SyntaxError {
            message: format!("expected a single expression, found `{}`", source_code.trim()),
            span: Span::from(0..source_code.len()),
            report: String::new(),
        }),
    }
}

fn report_errors<'code, T: fmt::Display + 'code>(
    errors: impl IntoIterator<Item = ParseError<'code, T>>,
    filename: &str,
    source_code: &str,
) -> SyntaxError {
    let mut first: Option<(String, Span)> = None;
    let mut report = String::new();
    for error in errors {
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (filename, error.span().into_range()))
            .with_config(Config::default().with_color(false))
            .with_message(error.to_string())
            .with_label(
                Label::new((filename, error.span().into_range()))
                    .with_message(error.reason().to_string()),
            )
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => report.push_str(&String::from_utf8_lossy(&report_bytes)),
            Err(_) => {
                report.push_str(&error.to_string());
                report.push('\n');
            }
        }
        if first.is_none() {
            first = Some((error.to_string(), *error.span()));
        }
    }
    let (message, span) = first.unwrap_or_else(|| ("invalid source".to_string(), Span::from(0..0)));
    SyntaxError {
        message,
        span,
        report,
    }
}
