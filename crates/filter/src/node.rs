//! Compiled predicate tree and its evaluation against a property set.

use std::cmp::Ordering;
use std::fmt;

use crate::properties::{Properties, PropertyValue};

/// Comparison operator of a leaf predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
	Equal,
	/// Case-insensitive equality.
	Approx,
	Greater,
	GreaterEqual,
	Less,
	LessEqual,
}

impl Comparison {
	pub fn symbol(self) -> &'static str {
		match self {
			Self::Equal => "=",
			Self::Approx => "~=",
			Self::Greater => ">",
			Self::GreaterEqual => ">=",
			Self::Less => "<",
			Self::LessEqual => "<=",
		}
	}

	fn accepts(self, ordering: Ordering) -> bool {
		match self {
			Self::Equal | Self::Approx => ordering == Ordering::Equal,
			Self::Greater => ordering == Ordering::Greater,
			Self::GreaterEqual => ordering != Ordering::Less,
			Self::Less => ordering == Ordering::Less,
			Self::LessEqual => ordering != Ordering::Greater,
		}
	}
}

/// Right-hand side of a comparison, converted once at parse time.
#[derive(Debug, Clone)]
pub struct Operand {
	pub text: String,
	long: Option<i64>,
	double: Option<f64>,
	boolean: Option<bool>,
}

impl Operand {
	pub fn new(text: impl Into<String>) -> Self {
		let text = text.into();
		let trimmed = text.trim();
		Self {
			long: trimmed.parse().ok(),
			double: trimmed.parse().ok(),
			boolean: trimmed.parse().ok(),
			text,
		}
	}

	/// Typed ordering of `value` relative to this operand, when both sides
	/// share a type. String properties never take this path.
	fn typed_ordering(&self, value: &PropertyValue) -> Option<Ordering> {
		match value {
			PropertyValue::Long(v) => self.long.map(|o| v.cmp(&o)),
			PropertyValue::Double(v) => self.double.and_then(|o| v.partial_cmp(&o)),
			PropertyValue::Bool(v) => self.boolean.map(|o| v.cmp(&o)),
			PropertyValue::String(_) => None,
		}
	}
}

impl PartialEq for Operand {
	fn eq(&self, other: &Self) -> bool {
		self.text == other.text
	}
}

/// One node of a parsed filter.
///
/// `And` and `Or` always hold at least one child.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	And(Vec<Node>),
	Or(Vec<Node>),
	Not(Box<Node>),
	/// `(attr=*)`
	Present { attribute: String },
	/// `(attr=a*b*c)`; `None` marks a wildcard position.
	Substring { attribute: String, segments: Vec<Option<String>> },
	Compare { attribute: String, op: Comparison, operand: Operand },
}

impl Node {
	pub fn matches(&self, props: &Properties) -> bool {
		match self {
			Self::And(children) => children.iter().all(|c| c.matches(props)),
			Self::Or(children) => children.iter().any(|c| c.matches(props)),
			Self::Not(child) => !child.matches(props),
			Self::Present { attribute } => props.contains_key(attribute),
			Self::Substring { attribute, segments } => props
				.get(attribute)
				.is_some_and(|value| match_substring(segments, &value.as_text())),
			Self::Compare { attribute, op, operand } => props.get(attribute).is_some_and(|value| compare(*op, operand, value)),
		}
	}

	/// Attribute name of a leaf node.
	pub fn attribute(&self) -> Option<&str> {
		match self {
			Self::Present { attribute } | Self::Substring { attribute, .. } | Self::Compare { attribute, .. } => Some(attribute),
			_ => None,
		}
	}

	/// Structural equality that ignores the order of `And`/`Or` children.
	pub fn equivalent(&self, other: &Node) -> bool {
		match (self, other) {
			(Self::And(a), Self::And(b)) | (Self::Or(a), Self::Or(b)) => {
				a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.equivalent(y)))
			}
			(Self::Not(a), Self::Not(b)) => a.equivalent(b),
			_ => self == other,
		}
	}
}

fn compare(op: Comparison, operand: &Operand, value: &PropertyValue) -> bool {
	if op == Comparison::Approx {
		return value.as_text().to_lowercase() == operand.text.to_lowercase();
	}
	let ordering = operand
		.typed_ordering(value)
		.unwrap_or_else(|| value.as_text().as_ref().cmp(operand.text.as_str()));
	op.accepts(ordering)
}

/// Matches `subject` against literal segments separated by wildcards.
///
/// A leading literal must be a prefix, a trailing literal must be a suffix,
/// and inner literals must appear in order without overlapping.
fn match_substring(segments: &[Option<String>], subject: &str) -> bool {
	let last = segments.len().saturating_sub(1);
	let mut pos = 0;
	let mut anchored = true;

	for (i, segment) in segments.iter().enumerate() {
		let Some(literal) = segment else {
			anchored = false;
			continue;
		};
		let rest = &subject[pos..];
		if i == last {
			return if anchored { rest == literal } else { rest.ends_with(literal.as_str()) };
		}
		if anchored {
			if !rest.starts_with(literal.as_str()) {
				return false;
			}
			pos += literal.len();
		} else {
			let Some(offset) = rest.find(literal.as_str()) else {
				return false;
			};
			pos += offset + literal.len();
		}
		anchored = true;
	}
	true
}

const VALUE_SPECIALS: &[char] = &['(', ')', '*', '\\'];
const ATTRIBUTE_SPECIALS: &[char] = &['(', ')', '*', '\\', '=', '<', '>', '~'];

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str, specials: &[char]) -> fmt::Result {
	for ch in text.chars() {
		if specials.contains(&ch) {
			f.write_str("\\")?;
		}
		write!(f, "{ch}")?;
	}
	Ok(())
}

impl fmt::Display for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::And(children) | Self::Or(children) => {
				f.write_str(if matches!(self, Self::And(_)) { "(&" } else { "(|" })?;
				for child in children {
					write!(f, "{child}")?;
				}
				f.write_str(")")
			}
			Self::Not(child) => write!(f, "(!{child})"),
			Self::Present { attribute } => {
				f.write_str("(")?;
				write_escaped(f, attribute, ATTRIBUTE_SPECIALS)?;
				f.write_str("=*)")
			}
			Self::Substring { attribute, segments } => {
				f.write_str("(")?;
				write_escaped(f, attribute, ATTRIBUTE_SPECIALS)?;
				f.write_str("=")?;
				for segment in segments {
					match segment {
						Some(literal) => write_escaped(f, literal, VALUE_SPECIALS)?,
						None => f.write_str("*")?,
					}
				}
				f.write_str(")")
			}
			Self::Compare { attribute, op, operand } => {
				f.write_str("(")?;
				write_escaped(f, attribute, ATTRIBUTE_SPECIALS)?;
				f.write_str(op.symbol())?;
				write_escaped(f, &operand.text, VALUE_SPECIALS)?;
				f.write_str(")")
			}
		}
	}
}
