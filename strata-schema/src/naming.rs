//! Deterministic identifiers.
//!
//! Every constraint and index the engine creates is named
//! `{table}_{hash}_{suffix}`, where `hash` is the first eight hex digits of a
//! SHA-256 over the object's semantic identity (its column list and
//! kind-specific flags). The previous name of an object never feeds the hash,
//! so renaming a table or a column produces a new, predictable name and the
//! differ can turn "same definition, new name" into a cheap rename.
//!
//! Primary keys follow the Postgres default `{table}_pkey` instead.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex digits kept from identity hashes.
pub const HASH_LENGTH: usize = 8;

/// Suffix for plain indexes.
pub const INDEX_SUFFIX: &str = "idx";
/// Suffix for unique constraints.
pub const UNIQUE_SUFFIX: &str = "key";
/// Suffix for foreign keys.
pub const FOREIGN_KEY_SUFFIX: &str = "fkey";
/// Suffix for check constraints.
pub const CHECK_SUFFIX: &str = "check";

/// Hash a sequence of identity parts.
///
/// Parts are separated by a unit separator so that `["ab", "c"]` and
/// `["a", "bc"]` hash differently.
pub fn identity_hash<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_ref().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_LENGTH].to_string()
}

/// Build a `{table}_{hash}_{suffix}` name.
pub fn constraint_name(table: &str, hash: &str, suffix: &str) -> String {
    format!("{}_{}_{}", table, hash, suffix)
}

/// Name of a table's primary key constraint.
pub fn primary_key_name(table: &str) -> String {
    format!("{}_pkey", table)
}

/// Name of the unique index built before a primary key is attached.
pub fn primary_key_index_name(table: &str) -> String {
    format!("{}_pkey_idx", table)
}

/// Name of the temporary check constraint that stands in for `NOT NULL`
/// while a column is promoted.
pub fn temporary_not_null_check(column: &str) -> String {
    format!("{}_temporary_not_null_check_constraint", column)
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema-qualified, quoted table reference.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Quote an index element when it is a bare column name, leave expressions as-is.
pub fn quote_column_or_expr(element: &str) -> String {
    let is_ident = element
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && element
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        quote_ident(element)
    } else {
        element.to_string()
    }
}

/// Join a column list as quoted identifiers.
pub fn quote_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// How declared identifiers map to database identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    /// Declared identifiers are camelCase and stored as snake_case.
    pub camel_case: bool,
}

impl NamingPolicy {
    /// Policy that keeps identifiers unchanged.
    pub fn verbatim() -> Self {
        Self { camel_case: false }
    }

    /// Policy that converts camelCase identifiers to snake_case.
    pub fn camel_case() -> Self {
        Self { camel_case: true }
    }

    /// Convert a declared identifier to its database form.
    pub fn apply(&self, ident: &str) -> String {
        if self.camel_case {
            ident.to_case(Case::Snake)
        } else {
            ident.to_string()
        }
    }

    /// Convert a list of identifiers.
    pub fn apply_all(&self, idents: &[String]) -> Vec<String> {
        idents.iter().map(|i| self.apply(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_hash_is_eight_hex_digits() {
        let hash = identity_hash(["unique", "true", "email"]);
        assert_eq!(hash.len(), HASH_LENGTH);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_hash_separates_parts() {
        assert_ne!(identity_hash(["ab", "c"]), identity_hash(["a", "bc"]));
    }

    #[test]
    fn test_constraint_name() {
        assert_eq!(
            constraint_name("users", "abcd1234", UNIQUE_SUFFIX),
            "users_abcd1234_key"
        );
        assert_eq!(primary_key_name("users"), "users_pkey");
        assert_eq!(primary_key_index_name("users"), "users_pkey_idx");
        assert_eq!(
            temporary_not_null_check("id"),
            "id_temporary_not_null_check_constraint"
        );
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("public", "users"), "\"public\".\"users\"");
        assert_eq!(quote_column_or_expr("email"), "\"email\"");
        assert_eq!(quote_column_or_expr("lower(email)"), "lower(email)");
    }

    #[test]
    fn test_naming_policy() {
        assert_eq!(NamingPolicy::camel_case().apply("createdAt"), "created_at");
        assert_eq!(NamingPolicy::camel_case().apply("userId"), "user_id");
        assert_eq!(NamingPolicy::verbatim().apply("createdAt"), "createdAt");
    }

    proptest! {
        #[test]
        fn prop_identity_hash_is_deterministic(parts in proptest::collection::vec("[a-z_]{1,12}", 1..6)) {
            prop_assert_eq!(identity_hash(&parts), identity_hash(&parts));
        }

        #[test]
        fn prop_identity_hash_changes_with_input(
            parts in proptest::collection::vec("[a-z_]{1,12}", 1..6),
            extra in "[a-z]{1,4}",
        ) {
            let mut changed = parts.clone();
            changed[0] = format!("{}{}", changed[0], extra);
            prop_assert_ne!(identity_hash(&parts), identity_hash(&changed));
        }
    }
}
