//! PostgreSQL statements.

use super::push_where;
use crate::builder::{Fragment, LimitOption};
use crate::command::{SelectPlan, WritePlan};
use crate::metadata::{DbType, IntrospectionQueries};

pub(super) fn db_type(base: &str) -> Option<DbType> {
    Some(match base {
        "bool" | "boolean" => DbType::Boolean,
        "int2" | "smallint" | "smallserial" => DbType::SmallInt,
        "int" | "int4" | "integer" | "serial" | "serial4" => DbType::Int,
        "int8" | "bigint" | "bigserial" | "serial8" => DbType::BigInt,
        "numeric" | "decimal" => DbType::Decimal,
        "money" => DbType::Money,
        "float4" | "real" => DbType::Real,
        "float8" | "double precision" => DbType::Double,
        "bpchar" | "char" | "character" => DbType::Char,
        "varchar" | "character varying" | "citext" => DbType::VarChar,
        "text" | "name" => DbType::Text,
        "bytea" => DbType::VarBinary,
        "date" => DbType::Date,
        "time" | "timetz" | "time without time zone" | "time with time zone" => DbType::Time,
        "timestamp" | "timestamp without time zone" => DbType::DateTime,
        "timestamptz" | "timestamp with time zone" => DbType::DateTimeOffset,
        "uuid" => DbType::Guid,
        "xml" => DbType::Xml,
        "json" | "jsonb" => DbType::Json,
        _ => return None,
    })
}

pub(super) static INTROSPECTION: IntrospectionQueries = IntrospectionQueries {
    objects: concat!(
        "SELECT table_schema AS schema_name, table_name AS object_name, ",
        "CASE table_type WHEN 'VIEW' THEN 'VIEW' ELSE 'TABLE' END AS object_type ",
        "FROM information_schema.tables ",
        "WHERE table_schema NOT IN ('pg_catalog', 'information_schema') ",
        "UNION ALL ",
        "SELECT n.nspname, p.proname, CASE p.prokind WHEN 'p' THEN 'PROCEDURE' ELSE 'FUNCTION' END ",
        "FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace ",
        "WHERE n.nspname NOT IN ('pg_catalog', 'information_schema') ",
        "AND (p.prokind = 'p' OR p.proretset) ",
        "ORDER BY 1, 2"
    ),
    table: concat!(
        "SELECT table_schema AS schema_name, table_name AS object_name, ",
        "table_type = 'BASE TABLE' AS is_table ",
        "FROM information_schema.tables ",
        "WHERE table_schema = COALESCE($1::text, current_schema()) AND table_name = $2"
    ),
    columns: concat!(
        "SELECT c.column_name, c.udt_name AS type_name, c.is_nullable = 'YES' AS is_nullable, ",
        "(c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%') AS is_identity, ",
        "c.is_generated = 'ALWAYS' AS is_computed, ",
        "EXISTS (SELECT 1 FROM information_schema.table_constraints tc ",
        "JOIN information_schema.key_column_usage k ON k.constraint_schema = tc.constraint_schema ",
        "AND k.constraint_name = tc.constraint_name AND k.table_name = tc.table_name ",
        "WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema ",
        "AND tc.table_name = c.table_name AND k.column_name = c.column_name) AS is_primary_key, ",
        "c.character_maximum_length AS max_length, c.numeric_precision AS precision, ",
        "c.numeric_scale AS scale ",
        "FROM information_schema.columns c ",
        "WHERE c.table_schema = COALESCE($1::text, current_schema()) AND c.table_name = $2 ",
        "ORDER BY c.ordinal_position"
    ),
    indexes: concat!(
        "SELECT ic.relname AS index_name, ix.indisunique AS is_unique, ",
        "ix.indisprimary AS is_primary_key, a.attname AS column_name, ",
        "(ix.indoption[k.ordinality - 1] & 1) = 1 AS is_descending ",
        "FROM pg_index ix ",
        "JOIN pg_class t ON t.oid = ix.indrelid ",
        "JOIN pg_namespace n ON n.oid = t.relnamespace ",
        "JOIN pg_class ic ON ic.oid = ix.indexrelid ",
        "CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ordinality) ",
        "JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum ",
        "WHERE n.nspname = COALESCE($1::text, current_schema()) AND t.relname = $2 ",
        "ORDER BY ic.relname, k.ordinality"
    ),
    routine: concat!(
        "SELECT n.nspname AS schema_name, p.proname AS object_name, ",
        "CASE p.prokind WHEN 'p' THEN 'PROCEDURE' ELSE 'FUNCTION' END AS object_type ",
        "FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace ",
        "WHERE n.nspname = COALESCE($1::text, current_schema()) AND p.proname = $2 ",
        "AND (p.prokind = 'p' OR p.proretset)"
    ),
    parameters: concat!(
        "SELECT p.parameter_name, p.udt_name AS type_name, p.parameter_mode ",
        "FROM information_schema.parameters p ",
        "JOIN information_schema.routines r ON r.specific_schema = p.specific_schema ",
        "AND r.specific_name = p.specific_name ",
        "WHERE r.routine_schema = COALESCE($1::text, current_schema()) AND r.routine_name = $2 ",
        "ORDER BY p.ordinal_position"
    ),
    function_columns: concat!(
        "SELECT p.parameter_name AS column_name, p.udt_name AS type_name, TRUE AS is_nullable, ",
        "FALSE AS is_identity, FALSE AS is_computed, FALSE AS is_primary_key, ",
        "p.character_maximum_length AS max_length, p.numeric_precision AS precision, ",
        "p.numeric_scale AS scale ",
        "FROM information_schema.parameters p ",
        "JOIN information_schema.routines r ON r.specific_schema = p.specific_schema ",
        "AND r.specific_name = p.specific_name ",
        "WHERE r.routine_schema = COALESCE($1::text, current_schema()) AND r.routine_name = $2 ",
        "AND p.parameter_mode IN ('OUT', 'INOUT') ",
        "ORDER BY p.ordinal_position"
    ),
};

pub(super) fn select(plan: SelectPlan) -> Fragment {
    let option = plan.limits.effective_option();
    let skip = plan.skip_parameter();
    let take = plan.take_parameter();

    let mut sql = Fragment::text(format!("SELECT {} FROM ", plan.select_list));
    sql.append(plan.source);
    if option == LimitOption::RandomSamplePercentage {
        sql.push_str(&format!(
            " TABLESAMPLE SYSTEM ({})",
            plan.limits.take.unwrap_or_default()
        ));
        if let Some(seed) = plan.limits.seed {
            sql.push_str(&format!(" REPEATABLE ({seed})"));
        }
    }
    push_where(&mut sql, plan.predicate);
    if !plan.order_by.is_empty() {
        sql.push_str(" ");
        sql.push_str(&plan.order_by);
    }

    match option {
        LimitOption::Rows => {
            if let Some(take) = take {
                sql.push_str(" LIMIT ");
                sql.push_param(take);
            }
            if let Some(skip) = skip {
                sql.push_str(" OFFSET ");
                sql.push_param(skip);
            }
        }
        LimitOption::RowsWithTies => {
            if let Some(skip) = skip {
                sql.push_str(" OFFSET ");
                sql.push_param(skip);
                sql.push_str(" ROWS");
            }
            if let Some(take) = take {
                sql.push_str(" FETCH FIRST ");
                sql.push_param(take);
                sql.push_str(" ROWS WITH TIES");
            }
        }
        _ => {}
    }
    sql.push_str(";");
    sql
}

/// Insert infix that lets explicit values replace `GENERATED ALWAYS`
/// identities.
pub(super) fn identity_override(plan: &WritePlan<'_, '_>) -> &'static str {
    let writes_identity = plan
        .builder
        .entries()
        .iter()
        .any(|e| e.insert && e.column.is_identity);
    if plan.identity_insert && writes_identity {
        " OVERRIDING SYSTEM VALUE"
    } else {
        ""
    }
}
