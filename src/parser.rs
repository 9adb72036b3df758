use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while_m_n};
use nom::character::complete::{char, line_ending, multispace0, not_line_ending, space0};
use nom::combinator::{all_consuming, eof, map, peek, recognize, rest, verify};
use nom::multi::{many0, many_till, separated_list1};
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use crate::template::{Template, TemplatePart};

pub fn parse_template(input: &str) -> IResult<&str, Template> {
    all_consuming(map(many0(parse_element), |parts| Template { parts })).parse(input)
}

pub fn parse_element(input: &str) -> IResult<&str, TemplatePart> {
    alt((
        map(parse_escaped_literal, |text| TemplatePart::Literal(text.to_string())),
        map(parse_variable, TemplatePart::Variable),
        map(parse_literal_text, |text| TemplatePart::Literal(text.to_string())),
    )).parse(input)
}

pub fn parse_literal_text(input: &str) -> IResult<&str, &str> {
    verify(
        alt((
            take_until("{{"),
            rest,
        )),
        |s: &&str| !s.is_empty(),
    ).parse(input)
}

/// `{{ blocks.Rules }}` yields `["blocks", "Rules"]`.
pub fn parse_variable(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        (tag("{{"), multispace0),
        separated_list1(char('.'), map(identifier, str::to_string)),
        (multispace0, tag("}}")),
    ).parse(input)
}

pub fn parse_escaped_literal(input: &str) -> IResult<&str, &str> {
    delimited(tag("{{{{"), take_until("}}}}"), tag("}}}}")).parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    // Limit identifiers to 1-64 characters with alphanumeric, dash, underscore
    take_while_m_n(
        1,
        64,
        |c: char| c.is_alphanumeric() || c == '-' || c == '_'
    ).parse(input)
}

fn front_matter_delimiter(input: &str) -> IResult<&str, &str> {
    recognize((tag("---"), space0, alt((line_ending, eof)))).parse(input)
}

fn front_matter_line(input: &str) -> IResult<&str, &str> {
    recognize((not_line_ending, line_ending)).parse(input)
}

/// Splits a leading `---` delimited block off a document.
///
/// Returns the remaining body and the raw front-matter text between the delimiters.
/// The closing delimiter must start a line.
pub fn parse_front_matter(input: &str) -> IResult<&str, &str> {
    preceded(
        front_matter_delimiter,
        terminated(
            recognize(many_till(front_matter_line, peek(front_matter_delimiter))),
            front_matter_delimiter,
        ),
    ).parse(input)
}
