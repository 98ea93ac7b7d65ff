//! Generic text parser for tools without a structured parser yet

use super::{ParseContext, ParseError, ParseResult, Parser};

/// Fallback parser that yields no entities.
///
/// Tools routed here (whois, nikto, hydra, sqlmap placeholders) still get
/// their raw output retained and their execution recorded; the empty result
/// surfaces as `ParseStatus::EmptyOutput`.
pub struct GenericTextParser;

impl Parser for GenericTextParser {
    fn parse(&self, _output: &str, _ctx: &ParseContext) -> Result<ParseResult, ParseError> {
        Ok(ParseResult::default())
    }
}
