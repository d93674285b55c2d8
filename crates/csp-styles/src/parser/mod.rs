//! Rule-text parsing built on `cssparser`.

mod css_parser;
mod error;

pub use css_parser::{ParsedRule, parse_declarations, parse_rule, split_rules};
pub use error::ParseError;
