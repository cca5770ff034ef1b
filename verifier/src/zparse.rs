// zparse.rs — Text notation for points and ranges
//
// Lexes and parses the compact forms produced by `Display`:
//   point:  z[1, -2, 3]       (z[] is the scalar point)
//   range:  zr[0:3, 0:5]      (zr[] is the scalar range)
// Uses `logos` for lexing and `chumsky` for parsing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns a validated `ZPoint` / `ZRange`.
// Failure modes: unknown characters, syntax errors, integer overflow, and
//                inverted bounds produce `ZSpaceError::Parse`.
// Side effects: none.

use std::fmt;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;
use logos::Logos;

use crate::error::ZSpaceError;
use crate::zpoint::ZPoint;
use crate::zrange::ZRange;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub(crate) enum Token {
    #[token("z")]
    Point,
    #[token("zr")]
    Range,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Point => write!(f, "z"),
            Token::Range => write!(f, "zr"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Int(v) => write!(f, "{v}"),
        }
    }
}

type ParserError<'tokens> = extra::Err<Rich<'tokens, Token, SimpleSpan>>;

// ── Lexing ──

fn lex(source: &str) -> Result<Vec<(Token, SimpleSpan)>, ZSpaceError> {
    let mut tokens = Vec::new();
    for (result, range) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, SimpleSpan::from(range))),
            Err(()) => {
                return Err(ZSpaceError::Parse(format!(
                    "unexpected input {:?} at offset {}",
                    &source[range.clone()],
                    range.start
                )))
            }
        }
    }
    Ok(tokens)
}

// ── Grammar ──

fn int<'tokens, I>() -> impl Parser<'tokens, I, i64, ParserError<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    select! { Token::Int(n) => n }
}

fn point_parser<'tokens, I>() -> impl Parser<'tokens, I, ZPoint, ParserError<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::Point)
        .ignore_then(
            int()
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBracket), just(Token::RBracket)),
        )
        .map(ZPoint::new)
        .then_ignore(end())
}

fn range_parser<'tokens, I>() -> impl Parser<'tokens, I, ZRange, ParserError<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let bound = int().then_ignore(just(Token::Colon)).then(int());

    just(Token::Range)
        .ignore_then(
            bound
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBracket), just(Token::RBracket)),
        )
        .try_map(|bounds: Vec<(i64, i64)>, span| {
            let (start, end): (Vec<i64>, Vec<i64>) = bounds.into_iter().unzip();
            ZRange::new(ZPoint::new(start), ZPoint::new(end))
                .map_err(|e| Rich::custom(span, e.to_string()))
        })
        .then_ignore(end())
}

fn run<T>(
    source: &str,
    parse: impl FnOnce(Vec<(Token, SimpleSpan)>, SimpleSpan) -> Result<T, Vec<String>>,
) -> Result<T, ZSpaceError> {
    let tokens = lex(source)?;
    let eoi: SimpleSpan = (source.len()..source.len()).into();
    parse(tokens, eoi).map_err(|errors| ZSpaceError::Parse(errors.join("; ")))
}

// ── Public API ──

pub(crate) fn parse_point(source: &str) -> Result<ZPoint, ZSpaceError> {
    run(source, |tokens, eoi| {
        let stream = Stream::from_iter(tokens).map(eoi, |(t, s): (_, _)| (t, s));
        point_parser()
            .parse(stream)
            .into_result()
            .map_err(|errs| errs.iter().map(|e| e.to_string()).collect())
    })
}

pub(crate) fn parse_range(source: &str) -> Result<ZRange, ZSpaceError> {
    run(source, |tokens, eoi| {
        let stream = Stream::from_iter(tokens).map(eoi, |(t, s): (_, _)| (t, s));
        range_parser()
            .parse(stream)
            .into_result()
            .map_err(|errs| errs.iter().map(|e| e.to_string()).collect())
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zpoint;

    #[test]
    fn lex_tokens() {
        let tokens: Vec<Token> = lex("zr[0:-3, 2]").unwrap().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            tokens,
            vec![
                Token::Range,
                Token::LBracket,
                Token::Int(0),
                Token::Colon,
                Token::Int(-3),
                Token::Comma,
                Token::Int(2),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn lex_rejects_unknown_characters() {
        assert!(matches!(lex("z[1; 2]"), Err(ZSpaceError::Parse(_))));
    }

    #[test]
    fn points() {
        assert_eq!(parse_point("z[1, -2, 3]").unwrap(), zpoint![1, -2, 3]);
        assert_eq!(parse_point(" z[ ] ").unwrap(), ZPoint::scalar());
        assert!(parse_point("z[1,]").is_err());
        assert!(parse_point("zr[1]").is_err());
        assert!(parse_point("z[1] z[2]").is_err());
    }

    #[test]
    fn ranges() {
        let r = parse_range("zr[0:3, 1:5]").unwrap();
        assert_eq!(r.start(), &zpoint![0, 1]);
        assert_eq!(r.end(), &zpoint![3, 5]);
        assert_eq!(parse_range("zr[]").unwrap(), ZRange::scalar());
    }

    #[test]
    fn inverted_range_is_an_error() {
        let err = parse_range("zr[3:0]").unwrap_err();
        assert!(matches!(err, ZSpaceError::Parse(_)));
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(parse_point("z[99999999999999999999]").is_err());
    }
}
