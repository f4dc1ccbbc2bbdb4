//! LDAP-style filters over typed property sets.
//!
//! A [`Filter`] is parsed once and then evaluated many times against
//! [`Properties`], typically the properties of a registered service:
//!
//! ```
//! use tether_filter::{Filter, Properties};
//!
//! let filter = Filter::parse("(&(objectClass=calc)(rank>=5))").unwrap();
//! let props = Properties::from([("objectClass", "calc")]).with("rank", 7i64);
//! assert!(filter.matches(&props));
//! ```
//!
//! Comparisons are typed when the property is typed: a `Long` property is
//! compared numerically with an operand that parses as an integer, and so on
//! for doubles and booleans. String properties and unconvertible operands
//! compare lexically.

mod filter;
mod node;
mod parser;
mod properties;


pub use filter::Filter;
pub use node::{Comparison, Node, Operand};
pub use parser::FilterError;
pub use properties::{Properties, PropertyValue};
