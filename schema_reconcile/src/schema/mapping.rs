//! Type mapping between logical types and native column types
//!
//! Logical type names are the ones model documents use (`string`, `int`,
//! `ulong`, `datetime`, ...). Each physical backend supplies a [`TypeMapper`]
//! translating them to and from its own column type text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::schema::types::DataType;

/// Bidirectional translation between logical and native column types
pub trait TypeMapper: Send + Sync {
    /// Translate introspected column type text, e.g. `int(11) unsigned`
    fn to_logical(&self, native: &str) -> Result<DataType>;

    /// Render the native column type for a logical type
    fn to_native(&self, data_type: &DataType) -> Result<String>;
}

/// Bare type name followed by an optional parenthesized argument list
static NATIVE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z][a-z0-9_ ]*?)\s*(?:\((.*)\))?$").expect("native type pattern is valid")
});

/// MySQL / MariaDB column types
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlTypeMapper;

impl MySqlTypeMapper {
    pub fn new() -> Self {
        Self
    }

    /// Strip trailing modifiers, returning the remaining text and whether it was unsigned
    fn strip_modifiers(text: &str) -> (&str, bool) {
        let mut text = text.trim();
        let mut unsigned = false;

        loop {
            if let Some(rest) = text.strip_suffix(" zerofill") {
                text = rest.trim_end();
            } else if let Some(rest) = text.strip_suffix(" unsigned") {
                text = rest.trim_end();
                unsigned = true;
            } else {
                break;
            }
        }

        (text, unsigned)
    }

    /// First comma-separated argument as a length; scale and non-numeric arguments are dropped
    fn parse_length(arguments: Option<&str>) -> Option<u32> {
        arguments
            .and_then(|args| args.split(',').next())
            .map(str::trim)
            .and_then(|first| first.parse::<u32>().ok())
    }

    fn sized(base: &str, length: Option<u32>, default: u32) -> String {
        format!("{}({})", base, length.unwrap_or(default))
    }
}

impl TypeMapper for MySqlTypeMapper {
    fn to_logical(&self, native: &str) -> Result<DataType> {
        let lowered = native.to_lowercase();
        let (text, unsigned) = Self::strip_modifiers(&lowered);

        let captures = NATIVE_TYPE
            .captures(text)
            .ok_or_else(|| Error::TypeMappingError(native.to_string()))?;
        let base = captures
            .get(1)
            .map(|m| m.as_str().trim())
            .ok_or_else(|| Error::TypeMappingError(native.to_string()))?;
        let length = Self::parse_length(captures.get(2).map(|m| m.as_str()));
        let sign = if unsigned { "u" } else { "" };

        if base.contains("char") {
            return Ok(DataType::new("string", length));
        }

        let name = if base.contains("binary") || base.contains("text") || base.contains("blob") {
            "string".to_string()
        } else if base.contains("bool") || (base.contains("tinyint") && length == Some(1)) {
            "bool".to_string()
        } else {
            match base {
                "bit" | "tinyint" | "smallint" | "mediumint" | "year" => format!("{sign}short"),
                "int" | "integer" => format!("{sign}int"),
                "bigint" => format!("{sign}long"),
                "dec" | "decimal" | "numeric" => return Ok(DataType::new("decimal", length)),
                "datetime" | "timestamp" => "datetime".to_string(),
                "date" => "dateonly".to_string(),
                "time" => "timeonly".to_string(),
                other => other.to_string(),
            }
        };

        Ok(DataType::new(&name, None))
    }

    fn to_native(&self, data_type: &DataType) -> Result<String> {
        let length = data_type.max_length;

        let native = match data_type.name.as_str() {
            "string" => match length {
                Some(length) => format!("VARCHAR({length})"),
                None => "LONGTEXT".to_string(),
            },
            "bool" => "TINYINT(1)".to_string(),
            "short" => Self::sized("TINYINT", length, 4),
            "ushort" => format!("{} UNSIGNED", Self::sized("TINYINT", length, 4)),
            "int" => Self::sized("INT", length, 11),
            "uint" => format!("{} UNSIGNED", Self::sized("INT", length, 11)),
            "long" => Self::sized("BIGINT", length, 20),
            "ulong" => format!("{} UNSIGNED", Self::sized("BIGINT", length, 20)),
            "decimal" => Self::sized("DEC", length, 10),
            "float" => "FLOAT".to_string(),
            "double" => "DOUBLE".to_string(),
            "datetime" => "DATETIME".to_string(),
            "dateonly" => "DATE".to_string(),
            "timeonly" => "TIME".to_string(),
            _ => return Err(Error::TypeMappingError(data_type.name.clone())),
        };

        Ok(native)
    }
}
