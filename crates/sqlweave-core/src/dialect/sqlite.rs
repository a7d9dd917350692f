//! SQLite statements.

use super::push_where;
use crate::builder::{Fragment, LimitOption};
use crate::command::SelectPlan;
use crate::metadata::{DbType, IntrospectionQueries};

/// Maps declared column types, following SQLite's affinity rules for names
/// that are not listed.
pub(super) fn db_type(base: &str) -> Option<DbType> {
    Some(match base {
        "integer" | "int" | "bigint" | "int8" => DbType::BigInt,
        "smallint" | "int2" => DbType::SmallInt,
        "tinyint" => DbType::TinyInt,
        "mediumint" => DbType::Int,
        "boolean" | "bool" => DbType::Boolean,
        "real" | "double" | "double precision" | "float" => DbType::Double,
        "numeric" | "decimal" => DbType::Decimal,
        "text" | "clob" => DbType::Text,
        "varchar" | "character varying" | "nvarchar" | "varying character" => DbType::VarChar,
        "char" | "character" | "nchar" | "native character" => DbType::Char,
        "blob" => DbType::Binary,
        "date" => DbType::Date,
        "datetime" | "timestamp" => DbType::DateTime,
        "time" => DbType::Time,
        "uuid" | "guid" => DbType::Guid,
        "json" => DbType::Json,
        other if other.contains("int") => DbType::BigInt,
        other if other.contains("char") || other.contains("clob") || other.contains("text") => {
            DbType::Text
        }
        other if other.contains("real") || other.contains("floa") || other.contains("doub") => {
            DbType::Double
        }
        _ => return None,
    })
}

pub(super) static INTROSPECTION: IntrospectionQueries = IntrospectionQueries {
    objects: concat!(
        "SELECT NULL AS schema_name, name AS object_name, UPPER(type) AS object_type ",
        "FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ",
        "ORDER BY name"
    ),
    table: concat!(
        "SELECT NULL AS schema_name, name AS object_name, type = 'table' AS is_table ",
        "FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?2 COLLATE NOCASE ",
        "AND (?1 IS NULL OR ?1 = 'main')"
    ),
    columns: concat!(
        "SELECT c.name AS column_name, c.type AS type_name, ",
        "c.\"notnull\" = 0 AND c.pk = 0 AS is_nullable, ",
        "c.pk = 1 AND UPPER(c.type) = 'INTEGER' ",
        "AND (SELECT COUNT(*) FROM pragma_table_xinfo(?2) k WHERE k.pk > 0) = 1 AS is_identity, ",
        "c.hidden IN (2, 3) AS is_computed, c.pk > 0 AS is_primary_key, ",
        "NULL AS max_length, NULL AS precision, NULL AS scale ",
        "FROM pragma_table_xinfo(?2) c WHERE (?1 IS NULL OR ?1 = 'main') ",
        "ORDER BY c.cid"
    ),
    indexes: concat!(
        "SELECT il.name AS index_name, il.\"unique\" AS is_unique, ",
        "il.origin = 'pk' AS is_primary_key, ix.name AS column_name, ",
        "ix.\"desc\" AS is_descending ",
        "FROM pragma_index_list(?2) il JOIN pragma_index_xinfo(il.name) ix ON ix.key = 1 ",
        "WHERE (?1 IS NULL OR ?1 = 'main') ",
        "ORDER BY il.seq, ix.seqno"
    ),
    routine: "",
    parameters: "",
    function_columns: "",
};

pub(super) fn select(plan: SelectPlan) -> Fragment {
    let option = plan.limits.effective_option();
    let skip = plan.skip_parameter();
    let take = plan.take_parameter();

    let mut sql = Fragment::text(format!("SELECT {} FROM ", plan.select_list));
    sql.append(plan.source);
    push_where(&mut sql, plan.predicate);

    match option {
        LimitOption::RandomSampleRows => {
            sql.push_str(" ORDER BY RANDOM()");
            if let Some(take) = take {
                sql.push_str(" LIMIT ");
                sql.push_param(take);
            }
        }
        LimitOption::Rows => {
            if !plan.order_by.is_empty() {
                sql.push_str(" ");
                sql.push_str(&plan.order_by);
            }
            match take {
                Some(take) => {
                    sql.push_str(" LIMIT ");
                    sql.push_param(take);
                }
                None if skip.is_some() => sql.push_str(" LIMIT -1"),
                None => {}
            }
            if let Some(skip) = skip {
                sql.push_str(" OFFSET ");
                sql.push_param(skip);
            }
        }
        _ => {
            if !plan.order_by.is_empty() {
                sql.push_str(" ");
                sql.push_str(&plan.order_by);
            }
        }
    }
    sql.push_str(";");
    sql
}
