//! Source driver selection and source-type to target-type mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Property types understood by the target graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Boolean,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Binary,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Short => "SHORT",
            Self::Integer => "INTEGER",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Decimal => "DECIMAL",
            Self::String => "STRING",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Time => "TIME",
            Self::Binary => "BINARY",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source DBMS family, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDriver {
    #[default]
    Sqlite,
    Postgresql,
    Mysql,
    Sqlserver,
    Oracle,
    Hsqldb,
}

impl SourceDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlserver => "sqlserver",
            Self::Oracle => "oracle",
            Self::Hsqldb => "hsqldb",
        }
    }

    /// The type handler matching this driver.
    pub fn type_handler(&self) -> DataTypeHandler {
        match self {
            Self::Sqlite => DataTypeHandler::Sqlite,
            Self::Postgresql => DataTypeHandler::PostgreSql,
            Self::Mysql => DataTypeHandler::MySql,
            Self::Sqlserver => DataTypeHandler::SqlServer,
            Self::Oracle => DataTypeHandler::Oracle,
            Self::Hsqldb => DataTypeHandler::HyperSql,
        }
    }
}

impl FromStr for SourceDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgresql),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "sqlserver" | "mssql" => Ok(Self::Sqlserver),
            "oracle" => Ok(Self::Oracle),
            "hsqldb" | "hypersql" => Ok(Self::Hsqldb),
            other => Err(format!("unknown source driver '{other}'")),
        }
    }
}

impl fmt::Display for SourceDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps declared source column types onto [`TargetType`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataTypeHandler {
    Sqlite,
    PostgreSql,
    MySql,
    SqlServer,
    Oracle,
    HyperSql,
    #[default]
    Generic,
}

impl DataTypeHandler {
    /// Resolve a declared source type, or `None` when the type is unknown.
    pub fn resolve(&self, source_type: &str) -> Option<TargetType> {
        let lower = source_type.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or(&lower).trim();
        let base = base.strip_suffix(" unsigned").unwrap_or(base);

        match self {
            Self::Sqlite => map_generic(base).or_else(|| sqlite_affinity(base)),
            Self::PostgreSql => map_postgres(base).or_else(|| map_generic(base)),
            Self::MySql => map_mysql(base, &lower).or_else(|| map_generic(base)),
            Self::SqlServer => map_sqlserver(base).or_else(|| map_generic(base)),
            Self::Oracle => map_oracle(base, &lower).or_else(|| map_generic(base)),
            Self::HyperSql => map_generic(base),
            Self::Generic => map_generic(base),
        }
    }
}

fn map_generic(base: &str) -> Option<TargetType> {
    let t = match base {
        "bool" | "boolean" | "bit" => TargetType::Boolean,
        "smallint" | "int2" | "tinyint" => TargetType::Short,
        "int" | "integer" | "int4" | "mediumint" => TargetType::Integer,
        "bigint" | "int8" => TargetType::Long,
        "real" | "float4" => TargetType::Float,
        "float" | "double" | "double precision" | "float8" => TargetType::Double,
        "decimal" | "numeric" | "number" | "money" => TargetType::Decimal,
        "char" | "character" | "varchar" | "character varying" | "nchar" | "nvarchar"
        | "text" | "clob" | "longvarchar" | "uuid" | "json" | "xml" => TargetType::String,
        "date" => TargetType::Date,
        "datetime" | "timestamp" | "timestamp with time zone"
        | "timestamp without time zone" => TargetType::DateTime,
        "time" | "time with time zone" | "time without time zone" => TargetType::Time,
        "blob" | "binary" | "varbinary" | "longvarbinary" | "bytea" => TargetType::Binary,
        _ => return None,
    };
    Some(t)
}

/// SQLite's column affinity rules for declared types nobody spelled exactly.
fn sqlite_affinity(base: &str) -> Option<TargetType> {
    if base.is_empty() {
        return None;
    }
    if base.contains("int") {
        Some(TargetType::Long)
    } else if base.contains("char") || base.contains("clob") || base.contains("text") {
        Some(TargetType::String)
    } else if base.contains("blob") {
        Some(TargetType::Binary)
    } else if base.contains("real") || base.contains("floa") || base.contains("doub") {
        Some(TargetType::Double)
    } else {
        None
    }
}

fn map_postgres(base: &str) -> Option<TargetType> {
    let t = match base {
        "serial" | "serial4" => TargetType::Integer,
        "bigserial" | "serial8" => TargetType::Long,
        "smallserial" | "serial2" => TargetType::Short,
        "jsonb" | "citext" | "inet" | "cidr" | "macaddr" | "interval" => TargetType::String,
        "timestamptz" => TargetType::DateTime,
        "timetz" => TargetType::Time,
        t if t.ends_with("[]") => TargetType::String,
        _ => return None,
    };
    Some(t)
}

fn map_mysql(base: &str, full: &str) -> Option<TargetType> {
    let t = match base {
        // TINYINT(1) is the conventional boolean
        "tinyint" if full.contains("tinyint(1)") => TargetType::Boolean,
        "tinyint" => TargetType::Short,
        "year" => TargetType::Short,
        "longtext" | "mediumtext" | "tinytext" | "enum" | "set" => TargetType::String,
        "longblob" | "mediumblob" | "tinyblob" => TargetType::Binary,
        _ => return None,
    };
    Some(t)
}

fn map_sqlserver(base: &str) -> Option<TargetType> {
    let t = match base {
        "datetime2" | "smalldatetime" | "datetimeoffset" => TargetType::DateTime,
        "ntext" | "uniqueidentifier" | "sysname" => TargetType::String,
        "image" | "rowversion" => TargetType::Binary,
        "smallmoney" => TargetType::Decimal,
        _ => return None,
    };
    Some(t)
}

fn map_oracle(base: &str, full: &str) -> Option<TargetType> {
    let t = match base {
        // NUMBER(p) without a scale holds integers
        "number" if full.contains('(') && !full.contains(',') => TargetType::Long,
        "varchar2" | "nvarchar2" | "nclob" | "long" | "rowid" => TargetType::String,
        "binary_float" => TargetType::Float,
        "binary_double" => TargetType::Double,
        "raw" | "long raw" | "bfile" => TargetType::Binary,
        _ => return None,
    };
    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_types() {
        let h = DataTypeHandler::Sqlite;
        assert_eq!(h.resolve("INTEGER"), Some(TargetType::Integer));
        assert_eq!(h.resolve("VARCHAR(255)"), Some(TargetType::String));
        assert_eq!(h.resolve("UNSIGNED BIG INT"), Some(TargetType::Long));
        assert_eq!(h.resolve("NVARCHAR2(10)"), Some(TargetType::String));
        assert_eq!(h.resolve("DOUBLE PRECISION"), Some(TargetType::Double));
        assert_eq!(h.resolve(""), None);
        assert_eq!(h.resolve("GEOMETRY"), None);
    }

    #[test]
    fn test_mysql_types() {
        let h = DataTypeHandler::MySql;
        assert_eq!(h.resolve("TINYINT(1)"), Some(TargetType::Boolean));
        assert_eq!(h.resolve("TINYINT(4)"), Some(TargetType::Short));
        assert_eq!(h.resolve("INT(11) UNSIGNED"), Some(TargetType::Integer));
        assert_eq!(h.resolve("LONGTEXT"), Some(TargetType::String));
    }

    #[test]
    fn test_postgres_and_oracle_types() {
        assert_eq!(DataTypeHandler::PostgreSql.resolve("BIGSERIAL"), Some(TargetType::Long));
        assert_eq!(DataTypeHandler::PostgreSql.resolve("TEXT[]"), Some(TargetType::String));
        assert_eq!(DataTypeHandler::Oracle.resolve("NUMBER(10)"), Some(TargetType::Long));
        assert_eq!(DataTypeHandler::Oracle.resolve("NUMBER(10,2)"), Some(TargetType::Decimal));
    }

    #[test]
    fn test_driver_parsing() {
        assert_eq!("SQLite".parse::<SourceDriver>(), Ok(SourceDriver::Sqlite));
        assert_eq!("mssql".parse::<SourceDriver>(), Ok(SourceDriver::Sqlserver));
        assert!("db2".parse::<SourceDriver>().is_err());
        assert_eq!(SourceDriver::Mysql.type_handler(), DataTypeHandler::MySql);
    }
}
