use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Number(f64),
    // Raw content between the quotes, escapes are resolved by the parser
    Text(&'code str),
    Identifier(&'code str),
    Let,
    Const,
    If,
    Else,
    Return,
    True,
    False,
    Null,
    Arrow,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Question,
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    LessOrEqual,
    Less,
    GreaterOrEqual,
    Greater,
    And,
    Or,
    Not,
    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("'{text}'").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Let => "let".into(),
            Self::Const => "const".into(),
            Self::If => "if".into(),
            Self::Else => "else".into(),
            Self::Return => "return".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::Arrow => "=>".into(),
            Self::Comma => ",".into(),
            Self::Colon => ":".into(),
            Self::Semicolon => ";".into(),
            Self::Dot => ".".into(),
            Self::Question => "?".into(),
            Self::StrictEqual => "===".into(),
            Self::StrictNotEqual => "!==".into(),
            Self::Equal => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Not => "!".into(),
            Self::Assign => "=".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    let line_comment = just("//")
        .then(any().and_is(text::newline().not()).repeated())
        .to_slice()
        .map(Token::Comment);

    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .to_slice()
        .map(Token::Comment);

    // Negative numbers are a unary minus in the parser, so `a-1` stays a subtraction
    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    let escape = just('\\').then(any()).ignored();

    let single_quoted = just('\'')
        .ignore_then(
            none_of("\\'")
                .ignored()
                .or(escape.clone())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('\''))
        .map(Token::Text);

    let double_quoted = just('"')
        .ignore_then(none_of("\\\"").ignored().or(escape).repeated().to_slice())
        .then_ignore(just('"'))
        .map(Token::Text);

    let identifier_or_keyword = any()
        .filter(|character: &char| {
            character.is_ascii_alphabetic() || *character == '_' || *character == '$'
        })
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || *character == '_' || *character == '$'
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &str| match identifier {
            "let" => Token::Let,
            "const" => Token::Const,
            "if" => Token::If,
            "else" => Token::Else,
            "return" => Token::Return,
            "true" => Token::True,
            "false" => Token::False,
            "null" | "undefined" => Token::Null,
            _ => Token::Identifier(identifier),
        });

    let operator = choice((
        just("===").to(Token::StrictEqual),
        just("!==").to(Token::StrictNotEqual),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just("=>").to(Token::Arrow),
        just("<=").to(Token::LessOrEqual),
        just(">=").to(Token::GreaterOrEqual),
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('<').to(Token::Less),
        just('>').to(Token::Greater),
        just('!').to(Token::Not),
        just('=').to(Token::Assign),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just(',').to(Token::Comma),
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just('.').to(Token::Dot),
        just('?').to(Token::Question),
    ));

    let token = choice((
        line_comment,
        block_comment,
        bracket,
        number,
        single_quoted,
        double_quoted,
        identifier_or_keyword,
        operator,
        punctuation,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
        .padded()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    fn tokens(code: &str) -> Vec<Token<'_>> {
        let result = lexer().parse(code);
        assert!(!result.has_errors(), "{:?}", result.errors().collect::<Vec<_>>());
        result
            .output()
            .unwrap()
            .iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            tokens("a === b !== c => d <= e"),
            vec![
                Token::Identifier("a"),
                Token::StrictEqual,
                Token::Identifier("b"),
                Token::StrictNotEqual,
                Token::Identifier("c"),
                Token::Arrow,
                Token::Identifier("d"),
                Token::LessOrEqual,
                Token::Identifier("e"),
            ]
        );
    }

    #[test]
    fn test_text_keeps_raw_escapes() {
        assert_eq!(tokens(r#"'it\'s' "a\"b""#), vec![
            Token::Text(r"it\'s"),
            Token::Text(r#"a\"b"#),
        ]);
    }

    #[test]
    fn test_comments_and_keywords() {
        assert_eq!(
            tokens("// hello\nlet x = null /* inline */ ;"),
            vec![
                Token::Comment("// hello"),
                Token::Let,
                Token::Identifier("x"),
                Token::Assign,
                Token::Null,
                Token::Comment("/* inline */"),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_numbers_and_trailing_whitespace() {
        assert_eq!(
            tokens("  1.5 - 2  \n"),
            vec![Token::Number(1.5), Token::Minus, Token::Number(2.0)]
        );
    }

    #[test]
    fn test_unknown_character_is_reported() {
        let result = lexer().parse("a # b");
        assert!(result.has_errors());
    }
}
