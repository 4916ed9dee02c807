//! Canonical type descriptors.
//!
//! A descriptor names a persisted type in a way that survives a save/load
//! round trip:
//!
//! ```text
//! descriptor := plain | generic
//! plain      := <name>                      e.g. app.model.User
//! generic    := '*' <base> ':' ( '(' descriptor ')' )+
//!                                           e.g. *persist.List:(app.model.User)
//! ```
//!
//! Plain names must be non-empty, must not start with `*` and must not
//! contain parentheses. Generic base names additionally must not contain `:`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Canonical, reversible name of a persisted type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeDescriptor {
    /// A non-parametrized type.
    Plain(String),
    /// A parametrized type together with its type arguments, in order.
    Generic {
        base: String,
        args: Vec<TypeDescriptor>,
    },
}

impl TypeDescriptor {
    /// Descriptor for a non-generic type.
    pub fn plain(name: impl Into<String>) -> Self {
        Self::Plain(name.into())
    }

    /// Descriptor for a parametrized type.
    pub fn generic(base: impl Into<String>, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::Generic {
            base: base.into(),
            args: args.into_iter().collect(),
        }
    }

    /// The plain name, or the generic base name.
    pub fn name(&self) -> &str {
        match self {
            Self::Plain(name) => name,
            Self::Generic { base, .. } => base,
        }
    }

    /// Type arguments; empty for plain descriptors.
    pub fn args(&self) -> &[TypeDescriptor] {
        match self {
            Self::Plain(_) => &[],
            Self::Generic { args, .. } => args,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Generic { .. })
    }

    /// Deepest nesting of type arguments a descriptor may have.
    pub const MAX_DEPTH: usize = 32;

    /// Parse a descriptor string.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let mut parser = Parser { text, pos: 0 };
        let descriptor = parser.descriptor(text.len(), 0)?;
        Ok(descriptor)
    }

    /// Check that every name in this descriptor obeys the grammar.
    pub fn validate(&self) -> Result<(), TypeError> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<(), TypeError> {
        match self {
            Self::Plain(name) => validate_plain(name, name),
            Self::Generic { base, args } => {
                if depth >= Self::MAX_DEPTH {
                    return Err(invalid(base, "type arguments nested too deeply"));
                }
                let whole = self.to_string();
                validate_base(base, &whole)?;
                if args.is_empty() {
                    return Err(invalid(&whole, "generic descriptor needs at least one argument"));
                }
                args.iter().try_for_each(|arg| arg.validate_at(depth + 1))
            }
        }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Plain(name) => out.push_str(name),
            Self::Generic { base, args } => {
                out.push('*');
                out.push_str(base);
                out.push(':');
                for arg in args {
                    out.push('(');
                    arg.write_canonical(out);
                    out.push(')');
                }
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_canonical(&mut out);
        f.write_str(&out)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({self})")
    }
}

impl FromStr for TypeDescriptor {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypeDescriptor {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TypeDescriptor> for String {
    fn from(value: TypeDescriptor) -> Self {
        value.to_string()
    }
}

fn invalid(descriptor: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: reason.into(),
    }
}

fn validate_plain(name: &str, whole: &str) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(invalid(whole, "empty type name"));
    }
    if name.starts_with('*') {
        return Err(invalid(whole, "plain type name must not start with '*'"));
    }
    if name.contains(['(', ')']) {
        return Err(invalid(whole, "type name must not contain parentheses"));
    }
    Ok(())
}

fn validate_base(base: &str, whole: &str) -> Result<(), TypeError> {
    validate_plain(base, whole)?;
    if base.contains(':') {
        return Err(invalid(whole, "generic base name must not contain ':'"));
    }
    Ok(())
}

/// Recursive-descent parser over a byte range of the input.
struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    /// Parse one descriptor spanning `self.pos..end`, nested `depth` levels
    /// deep.
    fn descriptor(&mut self, end: usize, depth: usize) -> Result<TypeDescriptor, TypeError> {
        let span = &self.text[self.pos..end];
        let Some(rest) = span.strip_prefix('*') else {
            validate_plain(span, self.text)?;
            self.pos = end;
            return Ok(TypeDescriptor::Plain(span.to_string()));
        };

        if depth >= TypeDescriptor::MAX_DEPTH {
            return Err(invalid(self.text, "type arguments nested too deeply"));
        }
        let colon = rest
            .find(':')
            .ok_or_else(|| invalid(self.text, "generic descriptor is missing ':'"))?;
        let base = &rest[..colon];
        validate_base(base, self.text)?;

        // Skip '*', base and ':'.
        self.pos += 1 + colon + 1;
        let mut args = Vec::new();
        while self.pos < end {
            if self.text.as_bytes()[self.pos] != b'(' {
                return Err(invalid(self.text, format!("expected '(' at offset {}", self.pos)));
            }
            let close = self.matching_paren(self.pos, end)?;
            self.pos += 1;
            let arg = self.descriptor(close, depth + 1)?;
            args.push(arg);
            self.pos = close + 1;
        }
        if args.is_empty() {
            return Err(invalid(self.text, "generic descriptor needs at least one argument"));
        }
        Ok(TypeDescriptor::Generic {
            base: base.to_string(),
            args,
        })
    }

    /// Offset of the `)` balancing the `(` at `open`.
    fn matching_paren(&self, open: usize, end: usize) -> Result<usize, TypeError> {
        let mut level = 0usize;
        for (offset, byte) in self.text.as_bytes()[open..end].iter().enumerate() {
            match byte {
                b'(' => level += 1,
                b')' => {
                    level -= 1;
                    if level == 0 {
                        return Ok(open + offset);
                    }
                }
                _ => {}
            }
        }
        Err(invalid(self.text, "unbalanced parentheses"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user() -> TypeDescriptor {
        TypeDescriptor::plain("Lib.Model.User")
    }

    #[test]
    fn plain_roundtrip() {
        let d = TypeDescriptor::parse("Lib.Model.User").unwrap();
        assert_eq!(d, user());
        assert_eq!(d.to_string(), "Lib.Model.User");
        assert!(!d.is_generic());
    }

    #[test]
    fn generic_list_of_user() {
        let d = TypeDescriptor::parse("*Lib.Persist.List:(Lib.Model.User)").unwrap();
        assert_eq!(d, TypeDescriptor::generic("Lib.Persist.List", [user()]));
        assert_eq!(d.name(), "Lib.Persist.List");
        assert_eq!(d.args(), &[user()]);
        assert_eq!(d.to_string(), "*Lib.Persist.List:(Lib.Model.User)");
    }

    #[test]
    fn nested_generic_arguments() {
        let inner = TypeDescriptor::generic("List", [TypeDescriptor::plain("i64")]);
        let outer = TypeDescriptor::generic("Map", [TypeDescriptor::plain("String"), inner]);
        let text = outer.to_string();
        assert_eq!(text, "*Map:(String)(*List:(i64))");
        assert_eq!(TypeDescriptor::parse(&text).unwrap(), outer);
    }

    #[test]
    fn plain_names_may_contain_path_separators() {
        let d = TypeDescriptor::parse("*List:(app::model::User)").unwrap();
        assert_eq!(d.args()[0].name(), "app::model::User");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for bad in [
            "",
            "*List",
            "*List:",
            "*List:(User",
            "*List:User",
            "*List:(User))",
            "*:(User)",
            "*List:()",
            "User)",
        ] {
            assert!(TypeDescriptor::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn validate_catches_hand_built_errors() {
        assert!(TypeDescriptor::generic("List", []).validate().is_err());
        assert!(TypeDescriptor::generic("a:b", [user()]).validate().is_err());
        assert!(TypeDescriptor::plain("*x").validate().is_err());
        assert!(TypeDescriptor::generic("List", [user()]).validate().is_ok());
    }

    fn nested(depth: usize) -> TypeDescriptor {
        (0..depth).fold(user(), |inner, _| TypeDescriptor::generic("List", [inner]))
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let deepest = nested(TypeDescriptor::MAX_DEPTH);
        assert!(deepest.validate().is_ok());
        assert_eq!(TypeDescriptor::parse(&deepest.to_string()).unwrap(), deepest);

        let too_deep = nested(TypeDescriptor::MAX_DEPTH + 1);
        assert!(too_deep.validate().is_err());
        assert!(TypeDescriptor::parse(&too_deep.to_string()).is_err());

        let hostile = format!("{}x{}", "*L:(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            TypeDescriptor::parse(&hostile),
            Err(TypeError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn serde_as_string() {
        let d = TypeDescriptor::generic("List", [user()]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"*List:(Lib.Model.User)\"");
        let parsed: TypeDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, d);
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[A-Za-z_][A-Za-z0-9_.]{0,12}"
    }

    fn arb_descriptor() -> impl Strategy<Value = TypeDescriptor> {
        let leaf = arb_name().prop_map(TypeDescriptor::Plain);
        leaf.prop_recursive(3, 16, 3, |inner| {
            (arb_name(), prop::collection::vec(inner, 1..4))
                .prop_map(|(base, args)| TypeDescriptor::Generic { base, args })
        })
    }

    proptest! {
        #[test]
        fn canonical_text_parses_back(d in arb_descriptor()) {
            let text = d.to_string();
            prop_assert_eq!(TypeDescriptor::parse(&text).unwrap(), d);
        }
    }
}
