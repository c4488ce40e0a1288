//! Asset-name validation against a schema of legal token paths.
//!
//! A name is `_`-separated: any number of schema tokens, then a free-form
//! description, then a one or two letter uppercase variant. Tokens are
//! consumed greedily from the front of the name until the next element is
//! no longer a valid schema node; what was consumed must reach a leaf of
//! the schema.

use std::collections::BTreeMap;

use crate::error::NameError;

/// Tree of legal token paths (e.g. `char/hero`, `char/villain`).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    root: SchemaNode,
}

#[derive(Debug, Clone, Default)]
struct SchemaNode {
    children: BTreeMap<String, SchemaNode>,
}

impl Schema {
    /// Build a schema from `/`-separated token paths. Every path names a
    /// leaf; interior nodes are created as needed.
    pub fn from_paths<I, S>(paths: I) -> Schema
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Schema::default();
        for path in paths {
            let mut node = &mut schema.root;
            for token in path.as_ref().split('/').filter(|t| !t.is_empty()) {
                node = node.children.entry(token.to_string()).or_default();
            }
        }
        schema
    }

    fn node(&self, token_path: &str) -> Option<&SchemaNode> {
        let mut node = &self.root;
        for token in token_path.split('/').filter(|t| !t.is_empty()) {
            node = node.children.get(token)?;
        }
        Some(node)
    }

    /// True iff the token path names a node in the schema.
    pub fn contains(&self, token_path: &str) -> bool {
        !token_path.is_empty() && self.node(token_path).is_some()
    }

    /// True iff the token path names a leaf of the schema.
    pub fn is_leaf(&self, token_path: &str) -> bool {
        match self.node(token_path) {
            Some(node) => node.children.is_empty() && !token_path.is_empty(),
            None => false,
        }
    }

    /// The legal tokens directly below the given path ("" for the roots).
    pub fn next_tokens(&self, token_path: &str) -> Vec<String> {
        match self.node(token_path) {
            Some(node) => node.children.keys().cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// A name broken into its three parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// `/`-separated token path, e.g. `char/hero`.
    pub tokens: String,
    pub description: String,
    pub variant: String,
}

/// Join the three parts back into an asset name.
pub fn join_name(tokens: &str, description: &str, variant: &str) -> String {
    format!("{}_{}_{}", tokens.replace('/', "_"), description, variant)
}

/// Validate `name` against `schema` and break it into tokens,
/// description, and variant.
pub fn parse_name(name: &str, schema: &Schema) -> Result<ParsedName, NameError> {
    validate_underscores(name)?;
    let variant = validate_variant(name)?;
    let tokens = validate_tokens(name, schema)?;
    let description = validate_description(name, &tokens, &variant)?;
    Ok(ParsedName {
        tokens,
        description,
        variant,
    })
}

fn validate_underscores(name: &str) -> Result<(), NameError> {
    if name.contains("__") {
        return Err(NameError::DoubledUnderscore);
    }
    if name.starts_with('_') {
        return Err(NameError::LeadingUnderscore);
    }
    if name.ends_with('_') {
        return Err(NameError::TrailingUnderscore);
    }
    Ok(())
}

fn validate_variant(name: &str) -> Result<String, NameError> {
    let variant = name.rsplit('_').next().unwrap_or("");
    if variant.is_empty() || variant.len() > 2 {
        return Err(NameError::MissingVariant);
    }
    if !variant.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(NameError::MissingVariant);
    }
    Ok(variant.to_string())
}

/// Consume elements from the front of the name while they keep forming a
/// valid schema path. The consumed path must reach a leaf.
fn validate_tokens(name: &str, schema: &Schema) -> Result<String, NameError> {
    let mut consumed: Vec<&str> = Vec::new();
    for element in name.split('_') {
        let candidate = join_path(&consumed, element);
        if !schema.contains(&candidate) {
            break;
        }
        consumed.push(element);
    }

    if consumed.is_empty() {
        return Err(NameError::MissingTokens);
    }

    let token_path = consumed.join("/");
    if !schema.is_leaf(&token_path) {
        return Err(NameError::IncompleteTokens(token_path));
    }
    Ok(token_path)
}

fn join_path(consumed: &[&str], next: &str) -> String {
    if consumed.is_empty() {
        next.to_string()
    } else {
        format!("{}/{}", consumed.join("/"), next)
    }
}

fn validate_description(
    name: &str,
    token_path: &str,
    variant: &str,
) -> Result<String, NameError> {
    let token_name = token_path.replace('/', "_");
    let rest = &name[token_name.len()..];
    if rest.len() < variant.len() {
        return Err(NameError::MissingDescription);
    }
    // Between the tokens and the variant sits "_<description>_"; anything
    // shorter than three characters has no description in it.
    let middle = &rest[..rest.len() - variant.len()];
    if middle.len() <= 2 {
        return Err(NameError::MissingDescription);
    }
    Ok(middle.trim_matches('_').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_paths(["char/hero", "char/villain", "props/kitchen"])
    }

    #[test]
    fn test_parse_simple_name() {
        let parsed = parse_name("char_hero_batman_A", &schema()).unwrap();
        assert_eq!(parsed.tokens, "char/hero");
        assert_eq!(parsed.description, "batman");
        assert_eq!(parsed.variant, "A");
    }

    #[test]
    fn test_parse_two_letter_variant() {
        let parsed = parse_name("props_kitchen_kettle_AB", &schema()).unwrap();
        assert_eq!(parsed.variant, "AB");
    }

    #[test]
    fn test_description_may_contain_underscores() {
        let parsed = parse_name("char_hero_dark_knight_A", &schema()).unwrap();
        assert_eq!(parsed.description, "dark_knight");
    }

    #[test]
    fn test_incomplete_tokens() {
        let err = parse_name("char_batman_A", &schema()).unwrap_err();
        assert_eq!(err, NameError::IncompleteTokens("char".to_string()));
    }

    #[test]
    fn test_missing_tokens() {
        let err = parse_name("vehicle_tank_A", &schema()).unwrap_err();
        assert_eq!(err, NameError::MissingTokens);
    }

    #[test]
    fn test_doubled_underscore() {
        let err = parse_name("char__hero_batman_A", &schema()).unwrap_err();
        assert_eq!(err, NameError::DoubledUnderscore);
    }

    #[test]
    fn test_leading_and_trailing_underscore() {
        assert_eq!(
            parse_name("_char_hero_x_A", &schema()).unwrap_err(),
            NameError::LeadingUnderscore
        );
        assert_eq!(
            parse_name("char_hero_x_A_", &schema()).unwrap_err(),
            NameError::TrailingUnderscore
        );
    }

    #[test]
    fn test_missing_variant() {
        // lowercase, too long, and digits all fail
        assert_eq!(
            parse_name("char_hero_batman_a", &schema()).unwrap_err(),
            NameError::MissingVariant
        );
        assert_eq!(
            parse_name("char_hero_batman_ABC", &schema()).unwrap_err(),
            NameError::MissingVariant
        );
        assert_eq!(
            parse_name("char_hero_batman_A1", &schema()).unwrap_err(),
            NameError::MissingVariant
        );
    }

    #[test]
    fn test_missing_description() {
        assert_eq!(
            parse_name("char_hero_A", &schema()).unwrap_err(),
            NameError::MissingDescription
        );
    }

    #[test]
    fn test_single_char_description_is_enough() {
        let parsed = parse_name("char_hero_x_A", &schema()).unwrap();
        assert_eq!(parsed.description, "x");
    }

    #[test]
    fn test_round_trip_through_join() {
        let schema = schema();
        for (tokens, desc, variant) in [
            ("char/hero", "batman", "A"),
            ("char/villain", "bane", "ZZ"),
            ("props/kitchen", "copper_kettle", "B"),
        ] {
            let name = join_name(tokens, desc, variant);
            let parsed = parse_name(&name, &schema).unwrap();
            assert_eq!(parsed.tokens, tokens);
            assert_eq!(parsed.description, desc);
            assert_eq!(parsed.variant, variant);
        }
    }

    #[test]
    fn test_schema_queries() {
        let schema = schema();
        assert!(schema.contains("char"));
        assert!(schema.contains("char/hero"));
        assert!(!schema.contains("char/monster"));
        assert!(!schema.is_leaf("char"));
        assert!(schema.is_leaf("char/hero"));
        assert_eq!(schema.next_tokens("char"), vec!["hero", "villain"]);
        assert_eq!(schema.next_tokens(""), vec!["char", "props"]);
    }
}
