//! Derive macro for sqlweave records.
//!
//! `#[derive(Record)]` implements `sqlweave_core::Record` for a struct with
//! named fields, generating a static table of field accessors so argument
//! values can be mapped to columns without runtime reflection.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Ident, Lit, Meta};

/// Derives the `Record` trait for a struct.
///
/// # Attributes
///
/// - `#[table(name = "schema.table")]` - The table or view the record maps
///   to (optional, defaults to the struct name)
///
/// # Field Attributes
///
/// - `#[column(name = "ColumnName")]` - The property name used for column
///   matching (optional, defaults to the field name)
/// - `#[column(key)]` - Marks the field as a key for `use_key_attribute`
/// - `#[column(ignore)]` - Leaves the field out of the property list
///
/// Every mapped field type must implement `Clone` and
/// `sqlweave_core::ToSqlValue`.
#[proc_macro_derive(Record, attributes(table, column))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_record_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_record_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let table_name = get_table_name(&input.attrs)?.unwrap_or_else(|| struct_name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Record derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Record derive only supports structs",
            ));
        }
    };

    let mut field_infos: Vec<FieldInfo> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_column_attrs(&field.attrs)?;
        if attrs.ignore {
            continue;
        }
        field_infos.push(FieldInfo {
            field_name: field_name.clone(),
            property_name: attrs.name.unwrap_or_else(|| field_name.to_string()),
            is_key: attrs.key,
        });
    }

    let accessors: Vec<TokenStream2> = field_infos
        .iter()
        .map(|info| {
            let field_name = &info.field_name;
            let property_name = &info.property_name;
            let is_key = info.is_key;
            quote! {
                ::sqlweave_core::FieldAccessor {
                    name: #property_name,
                    is_key: #is_key,
                    get: |record: &Self| {
                        ::sqlweave_core::ToSqlValue::to_sql_value(
                            ::core::clone::Clone::clone(&record.#field_name),
                        )
                    },
                }
            }
        })
        .collect();

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::sqlweave_core::Record for #struct_name #ty_generics #where_clause {
            const TABLE_NAME: Option<&'static str> = Some(#table_name);
            const FIELDS: &'static [::sqlweave_core::FieldAccessor<Self>] = &[
                #(#accessors),*
            ];
        }
    })
}

struct FieldInfo {
    field_name: Ident,
    property_name: String,
    is_key: bool,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    key: bool,
    ignore: bool,
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<Option<String>> {
    let value: Expr = meta.value()?.parse()?;
    if let Expr::Lit(lit) = value {
        if let Lit::Str(s) = lit.lit {
            return Ok(Some(s.value()));
        }
    }
    Ok(None)
}

fn get_table_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    for attr in attrs {
        if attr.path().is_ident("table") {
            let mut table_name = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    table_name = string_value(&meta)?;
                    Ok(())
                } else {
                    Err(meta.error("unsupported table attribute"))
                }
            })?;
            if table_name.is_some() {
                return Ok(table_name);
            }
        }
    }
    Ok(None)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("column") {
            if matches!(attr.meta, Meta::Path(_)) {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    result.key = true;
                } else if meta.path.is_ident("ignore") {
                    result.ignore = true;
                } else if meta.path.is_ident("name") {
                    result.name = string_value(&meta)?;
                } else {
                    return Err(meta.error("unsupported column attribute"));
                }
                Ok(())
            })?;
        }
    }

    Ok(result)
}
