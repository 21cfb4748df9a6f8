//! Column model.

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::naming::{identity_hash, quote_ident};

/// Identity generation mode of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// `GENERATED ALWAYS AS IDENTITY`.
    #[serde(rename = "ALWAYS")]
    Always,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    #[serde(rename = "BY DEFAULT")]
    ByDefault,
}

impl Identity {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::ByDefault => "BY DEFAULT",
        }
    }
}

/// A column attribute the differ can report as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnAttribute {
    /// The live column name differs (a rename).
    Name,
    /// Data type, including length/precision and enum flag.
    DataType,
    /// `NOT NULL` presence.
    Nullable,
    /// Default expression.
    Default,
    /// Identity generation.
    Identity,
}

impl ColumnAttribute {
    /// Path segment used when addressing this attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "columnName",
            Self::DataType => "dataType",
            Self::Nullable => "isNullable",
            Self::Default => "defaultValue",
            Self::Identity => "identity",
        }
    }
}

/// Description of one column.
///
/// `data_type` is canonical: serial columns are reported as `serial`,
/// `bigserial` or `smallserial` regardless of how Postgres exposes them (see
/// [`ColumnInfo::normalized`]). Defaults are stored as
/// `{hash}:{expression}` and compare by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name as it exists in the database.
    pub column_name: String,
    /// Canonical Postgres type name (or enum type name).
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub is_nullable: bool,
    /// Default as `{hash}:{expression}`.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Numeric precision.
    #[serde(default)]
    pub numeric_precision: Option<u32>,
    /// Numeric scale.
    #[serde(default)]
    pub numeric_scale: Option<u32>,
    /// Character maximum length.
    #[serde(default)]
    pub character_maximum_length: Option<u32>,
    /// Fractional seconds precision of time types.
    #[serde(default)]
    pub datetime_precision: Option<u32>,
    /// Identity generation mode.
    #[serde(default)]
    pub identity: Option<Identity>,
    /// The data type names an enum.
    #[serde(default, rename = "enum")]
    pub enum_type: bool,
    /// The default is volatile (e.g. `gen_random_uuid()`).
    #[serde(default)]
    pub volatile_default: bool,
}

impl ColumnInfo {
    /// Create a nullable column of the given type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default_value: None,
            numeric_precision: None,
            numeric_scale: None,
            character_maximum_length: None,
            datetime_precision: None,
            identity: None,
            enum_type: false,
            volatile_default: false,
        }
    }

    /// Column typed by an enum.
    pub fn enumerated(name: impl Into<String>, enum_name: impl Into<String>) -> Self {
        let mut column = Self::new(name, enum_name);
        column.enum_type = true;
        column
    }

    /// Mark the column `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Set a stable default expression.
    pub fn default(mut self, expression: impl AsRef<str>) -> Self {
        self.default_value = Some(encode_default(expression.as_ref()));
        self.volatile_default = false;
        self
    }

    /// Set a volatile default expression.
    pub fn volatile_default(mut self, expression: impl AsRef<str>) -> Self {
        self.default_value = Some(encode_default(expression.as_ref()));
        self.volatile_default = true;
        self
    }

    /// Set identity generation. Identity columns are always `NOT NULL`.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self.is_nullable = false;
        self
    }

    /// Set numeric precision and scale.
    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    /// Set character maximum length.
    pub fn max_length(mut self, length: u32) -> Self {
        self.character_maximum_length = Some(length);
        self
    }

    /// Set fractional seconds precision.
    pub fn datetime_precision(mut self, precision: u32) -> Self {
        self.datetime_precision = Some(precision);
        self
    }

    /// Full SQL type including modifiers.
    pub fn sql_type(&self) -> String {
        if self.enum_type {
            return quote_ident(&self.data_type);
        }

        let base = self.data_type.as_str();
        if let Some(length) = self.character_maximum_length {
            return format!("{}({})", base, length);
        }
        if base == "numeric" || base == "decimal" {
            return match (self.numeric_precision, self.numeric_scale) {
                (Some(p), Some(s)) => format!("{}({}, {})", base, p, s),
                (Some(p), None) => format!("{}({})", base, p),
                _ => base.to_string(),
            };
        }
        if let Some(precision) = self.datetime_precision
            && (base.starts_with("timestamp") || base.starts_with("time"))
        {
            // `timestamp with time zone` -> `timestamp(3) with time zone`
            return match base.split_once(' ') {
                Some((head, tail)) => format!("{}({}) {}", head, precision, tail),
                None => format!("{}({})", base, precision),
            };
        }
        base.to_string()
    }

    /// Hash part of the default, if any.
    pub fn default_hash(&self) -> Option<&str> {
        self.default_value
            .as_deref()
            .map(|d| d.split_once(':').map_or(d, |(hash, _)| hash))
    }

    /// Expression part of the default, if any.
    pub fn default_expression(&self) -> Option<&str> {
        self.default_value
            .as_deref()
            .map(|d| d.split_once(':').map_or(d, |(_, expr)| expr))
    }

    /// Check that the default is in `{hash}:{expression}` form.
    pub fn validate_default(&self) -> SchemaResult<()> {
        if let Some(value) = &self.default_value {
            let well_formed = value
                .split_once(':')
                .is_some_and(|(hash, expr)| is_hash(hash) && !expr.is_empty());
            if !well_formed {
                return Err(SchemaError::InvalidDefault {
                    column: self.column_name.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Rewrite the column into canonical form.
    ///
    /// Integer columns owning a sequence through a `nextval(...)` default are
    /// reported as serial types without a default. Defaults lacking a hash
    /// prefix get one.
    pub fn normalized(mut self) -> Self {
        if let Some(expression) = self.default_expression().map(str::to_string) {
            let serial = match self.data_type.as_str() {
                "integer" | "int4" => Some("serial"),
                "bigint" | "int8" => Some("bigserial"),
                "smallint" | "int2" => Some("smallserial"),
                _ => None,
            };
            if let Some(serial) = serial
                && expression.starts_with("nextval(")
                && self.identity.is_none()
            {
                self.data_type = serial.to_string();
                self.default_value = None;
                self.numeric_precision = None;
                self.numeric_scale = None;
                return self;
            }
            if !self
                .default_value
                .as_deref()
                .and_then(|d| d.split_once(':'))
                .is_some_and(|(hash, _)| is_hash(hash))
            {
                self.default_value = Some(encode_default(&expression));
            }
        }
        // Integer precision is implied by the type name.
        if matches!(
            self.data_type.as_str(),
            "integer" | "bigint" | "smallint" | "serial" | "bigserial" | "smallserial"
        ) {
            self.numeric_precision = None;
            self.numeric_scale = None;
        }
        self
    }

    /// Column definition as used in `CREATE TABLE` and `ADD COLUMN`.
    pub fn definition_sql(&self) -> String {
        let mut parts = vec![quote_ident(&self.column_name), self.sql_type()];
        if let Some(identity) = self.identity {
            parts.push(format!("GENERATED {} AS IDENTITY", identity.as_sql()));
        }
        if !self.is_nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(expression) = self.default_expression() {
            parts.push(format!("DEFAULT {}", expression));
        }
        parts.join(" ")
    }

    /// Attributes that differ between `self` (actual) and `other` (desired).
    pub fn changed_attributes(&self, other: &ColumnInfo) -> Vec<ColumnAttribute> {
        let mut changed = Vec::new();
        if self.column_name != other.column_name {
            changed.push(ColumnAttribute::Name);
        }
        if self.sql_type() != other.sql_type() || self.enum_type != other.enum_type {
            changed.push(ColumnAttribute::DataType);
        }
        if self.is_nullable != other.is_nullable {
            changed.push(ColumnAttribute::Nullable);
        }
        if self.default_hash() != other.default_hash() {
            changed.push(ColumnAttribute::Default);
        }
        if self.identity != other.identity {
            changed.push(ColumnAttribute::Identity);
        }
        changed
    }

    /// Structural equality as seen by the differ.
    pub fn same_shape(&self, other: &ColumnInfo) -> bool {
        self.changed_attributes(other).is_empty()
    }
}

/// Encode a default expression as `{hash}:{expression}`.
pub fn encode_default(expression: &str) -> String {
    let expression = expression.trim();
    format!("{}:{}", identity_hash([expression]), expression)
}

fn is_hash(candidate: &str) -> bool {
    candidate.len() == crate::naming::HASH_LENGTH && candidate.chars().all(|c| c.is_ascii_hexdigit())
}
