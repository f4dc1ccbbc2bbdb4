use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::node::{Comparison, Node};
use crate::parser::{self, FilterError};
use crate::properties::Properties;

/// An immutable, parsed filter.
///
/// Cloning is cheap; the predicate tree is shared.
#[derive(Debug, Clone)]
pub struct Filter {
	root: Arc<Node>,
	source: Arc<str>,
}

impl Filter {
	/// Parses `text` into a filter.
	///
	/// # Errors
	///
	/// Returns a [`FilterError`] for any malformed input, including the empty string.
	pub fn parse(text: &str) -> Result<Self, FilterError> {
		let root = parser::parse(text)?;
		Ok(Self {
			root: Arc::new(root),
			source: Arc::from(text),
		})
	}

	/// Parses an optional filter where absent or blank text selects everything.
	pub fn parse_optional(text: Option<&str>) -> Result<Option<Self>, FilterError> {
		match text.map(str::trim) {
			None | Some("") => Ok(None),
			Some(text) => Self::parse(text).map(Some),
		}
	}

	pub fn matches(&self, props: &Properties) -> bool {
		self.root.matches(props)
	}

	pub fn root(&self) -> &Node {
		&self.root
	}

	/// The text this filter was parsed from.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Returns the operand of the first leaf that names `attribute`.
	///
	/// Presence tests report `"*"`; substring tests have no single value and
	/// are skipped.
	pub fn find_attribute(&self, attribute: &str) -> Option<&str> {
		fn find<'a>(node: &'a Node, attribute: &str) -> Option<&'a str> {
			match node {
				Node::And(children) | Node::Or(children) => children.iter().find_map(|c| find(c, attribute)),
				Node::Not(child) => find(child, attribute),
				Node::Present { attribute: a } if a == attribute => Some("*"),
				Node::Compare { attribute: a, operand, .. } if a == attribute => Some(&operand.text),
				_ => None,
			}
		}
		find(&self.root, attribute)
	}

	/// True when every match must carry `attribute` equal to some value,
	/// that is an `(attribute=value)` leaf reachable through `&` only.
	pub fn has_mandatory_equals_value_attribute(&self, attribute: &str) -> bool {
		fn walk(node: &Node, attribute: &str) -> bool {
			match node {
				Node::And(children) => children.iter().any(|c| walk(c, attribute)),
				Node::Compare {
					attribute: a,
					op: Comparison::Equal,
					..
				} => a == attribute,
				_ => false,
			}
		}
		walk(&self.root, attribute)
	}

	/// True when every match must lack `attribute`, that is a
	/// `(!(attribute=*))` reachable through `&` only.
	pub fn has_mandatory_negated_presence_attribute(&self, attribute: &str) -> bool {
		fn walk(node: &Node, attribute: &str) -> bool {
			match node {
				Node::And(children) => children.iter().any(|c| walk(c, attribute)),
				Node::Not(child) => matches!(child.as_ref(), Node::Present { attribute: a } if a == attribute),
				_ => false,
			}
		}
		walk(&self.root, attribute)
	}

	/// Structural equality ignoring the order of `&`/`|` operands.
	pub fn equivalent(&self, other: &Filter) -> bool {
		Arc::ptr_eq(&self.root, &other.root) || self.root.equivalent(&other.root)
	}
}

impl PartialEq for Filter {
	fn eq(&self, other: &Self) -> bool {
		self.root == other.root
	}
}

impl FromStr for Filter {
	type Err = FilterError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// Renders the canonical form: no insignificant whitespace and special
/// characters escaped. The output parses back to an equal filter.
impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&*self.root, f)
	}
}
