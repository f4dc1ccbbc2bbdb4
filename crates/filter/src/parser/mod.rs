//! # Parser
//!
//! Recursive descent parser for LDAP-style filter strings.
//!
//! ## Supported Syntax
//!
//! ```text
//! filter    = "(" filtercomp ")"
//! filtercomp = "&" filter+ | "|" filter+ | "!" filter | item
//! item      = attr op value | attr "=*" | attr "=" substring
//! op        = "=" | "~=" | ">" | ">=" | "<" | "<="
//! substring = [literal] ("*" [literal])+
//! ```
//!
//! Inside values a backslash escapes the following character, so `\(`, `\)`,
//! `\*` and `\\` are literals. Whitespace between tokens is ignored; the
//! attribute name is trimmed, values are kept verbatim.

use crate::node::{Comparison, Node, Operand};


/// Error produced while parsing a filter string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("filter parse error at position {position}: {message}")]
pub struct FilterError {
	/// Human-readable description of the parse error.
	pub message: String,
	/// Byte offset in the input where the error occurred.
	pub position: usize,
}

struct Parser<'a> {
	/// Remaining input.
	input: &'a str,
	/// Byte offset of `input` within the original string.
	position: usize,
}

impl<'a> Parser<'a> {
	fn new(input: &'a str) -> Self {
		Self { input, position: 0 }
	}

	fn peek(&self) -> Option<char> {
		self.input.chars().next()
	}

	fn next(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.position += ch.len_utf8();
		self.input = &self.input[ch.len_utf8()..];
		Some(ch)
	}

	fn skip_whitespace(&mut self) {
		while self.peek().is_some_and(char::is_whitespace) {
			self.next();
		}
	}

	fn take(&mut self, expected: char) -> Result<(), FilterError> {
		match self.peek() {
			Some(ch) if ch == expected => {
				self.next();
				Ok(())
			}
			Some(ch) => Err(self.error(format!("expected '{expected}', found '{ch}'"))),
			None => Err(self.error(format!("expected '{expected}', found end of input"))),
		}
	}

	fn error(&self, message: impl Into<String>) -> FilterError {
		FilterError {
			message: message.into(),
			position: self.position,
		}
	}
}

/// Parses a complete filter string into its root [`Node`].
///
/// # Errors
///
/// Returns a [`FilterError`] pointing at the first offending byte.
pub fn parse(input: &str) -> Result<Node, FilterError> {
	let mut parser = Parser::new(input);
	parser.skip_whitespace();
	let node = parse_filter(&mut parser)?;
	parser.skip_whitespace();

	if let Some(ch) = parser.peek() {
		return Err(parser.error(format!("unexpected trailing character '{ch}'")));
	}

	Ok(node)
}

/// Grammar: `filter = "(" filtercomp ")"`
fn parse_filter(parser: &mut Parser) -> Result<Node, FilterError> {
	parser.take('(')?;
	parser.skip_whitespace();
	let node = parse_filter_comp(parser)?;
	parser.skip_whitespace();
	parser.take(')')?;
	Ok(node)
}

fn parse_filter_comp(parser: &mut Parser) -> Result<Node, FilterError> {
	match parser.peek() {
		Some('&') => {
			parser.next();
			parse_operands(parser, '&').map(Node::And)
		}
		Some('|') => {
			parser.next();
			parse_operands(parser, '|').map(Node::Or)
		}
		Some('!') => {
			parser.next();
			parser.skip_whitespace();
			if parser.peek() != Some('(') {
				return Err(parser.error("expected '(' after '!'"));
			}
			Ok(Node::Not(Box::new(parse_filter(parser)?)))
		}
		_ => parse_item(parser),
	}
}

fn parse_operands(parser: &mut Parser, operator: char) -> Result<Vec<Node>, FilterError> {
	let mut children = Vec::new();
	parser.skip_whitespace();
	while parser.peek() == Some('(') {
		children.push(parse_filter(parser)?);
		parser.skip_whitespace();
	}
	if children.is_empty() {
		return Err(parser.error(format!("'{operator}' requires at least one operand")));
	}
	Ok(children)
}

/// Grammar: `item = attr op value`
fn parse_item(parser: &mut Parser) -> Result<Node, FilterError> {
	let attribute = parse_attribute(parser)?;

	let op = match parser.next() {
		Some('=') => return parse_equality(parser, attribute),
		Some('~') => {
			parser.take('=')?;
			Comparison::Approx
		}
		Some('>') if parser.peek() == Some('=') => {
			parser.next();
			Comparison::GreaterEqual
		}
		Some('>') => Comparison::Greater,
		Some('<') if parser.peek() == Some('=') => {
			parser.next();
			Comparison::LessEqual
		}
		Some('<') => Comparison::Less,
		Some(ch) => return Err(parser.error(format!("invalid operator '{ch}'"))),
		None => return Err(parser.error("expected an operator, found end of input")),
	};

	let text = parse_literal(parser)?;
	Ok(Node::Compare {
		attribute,
		op,
		operand: Operand::new(text),
	})
}

/// Reads the attribute name up to the operator.
fn parse_attribute(parser: &mut Parser) -> Result<String, FilterError> {
	let start = parser.position;
	let mut attribute = String::new();
	loop {
		match parser.peek() {
			Some('=' | '~' | '<' | '>') => break,
			Some(ch @ ('(' | ')')) => return Err(parser.error(format!("unexpected '{ch}' in attribute name"))),
			Some('\\') => {
				parser.next();
				match parser.next() {
					Some(ch) => attribute.push(ch),
					None => return Err(parser.error("dangling escape at end of input")),
				}
			}
			Some(ch) => {
				attribute.push(ch);
				parser.next();
			}
			None => return Err(parser.error("expected an operator, found end of input")),
		}
	}

	let attribute = attribute.trim_end().to_string();
	if attribute.is_empty() {
		return Err(FilterError {
			message: "missing attribute name".to_string(),
			position: start,
		});
	}
	Ok(attribute)
}

/// Handles everything after `attr=`: presence, substring or plain equality.
fn parse_equality(parser: &mut Parser, attribute: String) -> Result<Node, FilterError> {
	if parser.peek() == Some('*') {
		let saved = (parser.input, parser.position);
		parser.next();
		parser.skip_whitespace();
		if parser.peek() == Some(')') {
			return Ok(Node::Present { attribute });
		}
		(parser.input, parser.position) = saved;
	}

	let mut segments = parse_value(parser, true)?;
	if segments.iter().all(Option::is_some) {
		let text = segments.pop().flatten().unwrap_or_default();
		return Ok(Node::Compare {
			attribute,
			op: Comparison::Equal,
			operand: Operand::new(text),
		});
	}
	Ok(Node::Substring { attribute, segments })
}

fn parse_literal(parser: &mut Parser) -> Result<String, FilterError> {
	let mut segments = parse_value(parser, false)?;
	Ok(segments.pop().flatten().unwrap_or_default())
}

/// Reads a value up to the closing `)`, splitting on unescaped `*` when
/// `wildcards` is set. Without wildcards the result is a single literal.
fn parse_value(parser: &mut Parser, wildcards: bool) -> Result<Vec<Option<String>>, FilterError> {
	let mut segments = Vec::new();
	let mut literal = String::new();

	loop {
		match parser.peek() {
			Some(')') => break,
			Some('(') => return Err(parser.error("unescaped '(' in value")),
			Some('\\') => {
				parser.next();
				match parser.next() {
					Some(ch) => literal.push(ch),
					None => return Err(parser.error("dangling escape at end of input")),
				}
			}
			Some('*') if wildcards => {
				parser.next();
				if !literal.is_empty() {
					segments.push(Some(std::mem::take(&mut literal)));
				}
				segments.push(None);
			}
			Some(ch) => {
				literal.push(ch);
				parser.next();
			}
			None => return Err(parser.error("unterminated value, expected ')'")),
		}
	}

	if !literal.is_empty() || segments.is_empty() {
		segments.push(Some(literal));
	}
	Ok(segments)
}
