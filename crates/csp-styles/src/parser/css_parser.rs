//! Rule-text validation using the `cssparser` crate.
//!
//! A CSSOM `insertRule` accepts exactly one well-formed rule. This module
//! checks rule text the same way so in-process hosts reject what a browser
//! would reject, and splits declaration lists for the keyframe model.

use crate::parser::ParseError;
use cssparser::{
    BasicParseErrorKind, Delimiter, ParseError as CssParseError, ParseErrorKind, Parser,
    ParserInput, Token,
};

type Custom = &'static str;
type ParseResult<'i, T> = Result<T, CssParseError<'i, Custom>>;

/// Keyframes names that CSS reserves.
const RESERVED_KEYFRAMES_NAMES: &[&str] = &[
    "none", "initial", "inherit", "unset", "default", "revert", "revert-layer",
];

/// The shape of a successfully parsed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRule {
    /// An `@keyframes` rule.
    Keyframes {
        /// The animation name.
        name: String,
        /// Number of keyframe blocks.
        frames: usize,
    },
    /// A qualified style rule such as `body { width: 100%; }`.
    Style {
        /// The selector text, whitespace-collapsed.
        selector: String,
        /// Number of declarations.
        declarations: usize,
    },
}

/// Parse text that must contain exactly one rule.
///
/// # Example
///
/// ```
/// use csp_styles::parser::{parse_rule, ParsedRule};
///
/// let rule = parse_rule("@keyframes fade { from { opacity: 0 } to { opacity: 1 } }").unwrap();
/// assert_eq!(rule, ParsedRule::Keyframes { name: "fade".into(), frames: 2 });
/// assert!(parse_rule("a { color: red } b { color: blue }").is_err());
/// ```
pub fn parse_rule(text: &str) -> Result<ParsedRule, ParseError> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    parser
        .parse_entirely(|p| parse_one_rule(p))
        .map_err(to_parse_error)
}

/// Split a stylesheet's text into the source text of each top-level rule.
///
/// Any malformed rule fails the whole split: a `<style>` body is accepted or
/// refused as a unit.
pub fn split_rules(css: &str) -> Result<Vec<String>, ParseError> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut rules = vec![];

    while !parser.is_exhausted() {
        parser.skip_whitespace();
        let start = parser.position();
        parse_one_rule(&mut parser).map_err(to_parse_error)?;
        rules.push(parser.slice_from(start).trim().to_string());
    }

    Ok(rules)
}

/// Parse a declaration list such as `opacity: 0; transform: scale(0.5)`.
///
/// Returns `(property, value)` pairs in source order with whitespace runs in
/// values collapsed to single spaces.
pub fn parse_declarations(text: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    parser
        .parse_entirely(|p| parse_declaration_block(p))
        .map_err(to_parse_error)
}

fn parse_one_rule<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, ParsedRule> {
    let start = p.state();
    match p.next().cloned()? {
        Token::AtKeyword(name) if is_keyframes_keyword(&name) => parse_keyframes(p),
        Token::AtKeyword(_) => Err(p.new_custom_error("Unsupported at-rule")),
        _ => {
            p.reset(&start);
            parse_style_rule(p)
        }
    }
}

fn is_keyframes_keyword(name: &str) -> bool {
    name.eq_ignore_ascii_case("keyframes") || name.eq_ignore_ascii_case("-webkit-keyframes")
}

/// Parse the remainder of `@keyframes <name> { ... }`.
fn parse_keyframes<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, ParsedRule> {
    let name = match p.next().cloned()? {
        Token::Ident(name)
            if !RESERVED_KEYFRAMES_NAMES
                .iter()
                .any(|reserved| name.eq_ignore_ascii_case(reserved)) =>
        {
            name.to_string()
        }
        Token::QuotedString(name) => name.to_string(),
        token => return Err(p.new_unexpected_token_error(token)),
    };

    p.expect_curly_bracket_block()?;
    let frames = p.parse_nested_block(|block| parse_keyframe_blocks(block))?;

    Ok(ParsedRule::Keyframes { name, frames })
}

fn parse_keyframe_blocks<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, usize> {
    let mut frames = 0;
    while !p.is_exhausted() {
        p.parse_until_before(Delimiter::CurlyBracketBlock, |selectors| {
            parse_keyframe_selectors(selectors)
        })?;
        p.expect_curly_bracket_block()?;
        p.parse_nested_block(|block| parse_declaration_block(block))?;
        frames += 1;
    }
    Ok(frames)
}

/// Parse `from`, `to`, or a percentage in `[0%, 100%]`, comma-separated.
fn parse_keyframe_selectors<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, ()> {
    loop {
        match p.next().cloned()? {
            Token::Percentage { unit_value, .. } if (0.0..=1.0).contains(&unit_value) => {}
            Token::Ident(keyword)
                if keyword.eq_ignore_ascii_case("from") || keyword.eq_ignore_ascii_case("to") => {}
            token => return Err(p.new_unexpected_token_error(token)),
        }

        match p.next().cloned() {
            Ok(Token::Comma) => {}
            Ok(token) => return Err(p.new_unexpected_token_error(token)),
            Err(_) => return Ok(()),
        }
    }
}

/// Parse a qualified rule: prelude { declarations }
fn parse_style_rule<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, ParsedRule> {
    let selector = p.parse_until_before(Delimiter::CurlyBracketBlock, |prelude| {
        parse_prelude(prelude)
    })?;
    p.expect_curly_bracket_block()?;
    let declarations = p.parse_nested_block(|block| parse_declaration_block(block))?;

    Ok(ParsedRule::Style {
        selector,
        declarations: declarations.len(),
    })
}

fn parse_prelude<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    let start = p.position();
    let mut empty = true;
    while p.next().is_ok() {
        empty = false;
    }
    if empty {
        return Err(p.new_custom_error("Missing selector"));
    }
    Ok(collapse_whitespace(p.slice_from(start)))
}

fn parse_declaration_block<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, Vec<(String, String)>> {
    let mut declarations = vec![];
    while !p.is_exhausted() {
        match p.next().cloned()? {
            Token::Semicolon => {}
            Token::Ident(name) => {
                p.expect_colon()?;
                let value = p.parse_until_after(Delimiter::Semicolon, |value| {
                    parse_declaration_value(value)
                })?;
                declarations.push((name.to_string(), value));
            }
            token => return Err(p.new_unexpected_token_error(token)),
        }
    }
    Ok(declarations)
}

fn parse_declaration_value<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    p.skip_whitespace();
    let start = p.position();
    let mut empty = true;
    loop {
        match p.next().cloned() {
            Ok(
                Token::BadString(_)
                | Token::BadUrl(_)
                | Token::CloseParenthesis
                | Token::CloseSquareBracket
                | Token::CloseCurlyBracket,
            ) => return Err(p.new_custom_error("Invalid token in declaration value")),
            Ok(_) => empty = false,
            Err(_) => break,
        }
    }
    if empty {
        return Err(p.new_custom_error("Empty declaration value"));
    }
    Ok(collapse_whitespace(p.slice_from(start)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

fn to_parse_error(err: CssParseError<'_, Custom>) -> ParseError {
    let message = match err.kind {
        ParseErrorKind::Custom(message) => message.to_string(),
        ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
            format!("Unexpected token {token:?}")
        }
        ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => {
            "Unexpected end of input".to_string()
        }
        ParseErrorKind::Basic(other) => format!("{other:?}"),
    };
    ParseError::new(message, err.location.line + 1, err.location.column)
}
