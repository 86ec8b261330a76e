use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, LitStr, Meta, Type};

/// Derive macro that describes a broker statement row as a set of CSV columns.
///
/// For each field, extracts:
/// - Canonical column name (respects #[serde(rename = "...")])
/// - Required (true if not Option<T>)
/// - Description (from doc comments)
/// - Header aliases (from repeated #[csv(alias = "...")])
///
/// Generates a `csv_schema() -> &'static [CsvField]` method. `CsvField` must be in
/// scope where the derive is used.
#[proc_macro_derive(CsvSchema, attributes(serde, csv))]
pub fn derive_csv_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(name, "CsvSchema only supports named fields")
                    .to_compile_error()
                    .into()
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "CsvSchema only supports structs")
                .to_compile_error()
                .into()
        }
    };

    let mut entries = Vec::new();
    for field in fields {
        let field_name = match field.ident.as_ref() {
            Some(ident) => ident.unraw().to_string(),
            None => continue,
        };
        let column = get_serde_rename(&field.attrs).unwrap_or(field_name);
        let required = !is_option_type(&field.ty);
        let doc = get_doc_comment(&field.attrs);
        let aliases = match get_aliases(&field.attrs) {
            Ok(aliases) => aliases,
            Err(err) => return err.to_compile_error().into(),
        };

        entries.push(quote! {
            CsvField {
                name: #column,
                aliases: &[#(#aliases),*],
                required: #required,
                description: #doc,
            }
        });
    }

    let expanded = quote! {
        impl #name {
            pub fn csv_schema() -> &'static [CsvField] {
                static SCHEMA: &[CsvField] = &[
                    #(#entries),*
                ];
                SCHEMA
            }
        }
    };

    TokenStream::from(expanded)
}

fn get_aliases(attrs: &[syn::Attribute]) -> syn::Result<Vec<String>> {
    let mut aliases = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("csv")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("alias") {
                let alias: LitStr = meta.value()?.parse()?;
                aliases.push(alias.value());
                Ok(())
            } else {
                Err(meta.error("expected `alias = \"...\"`"))
            }
        })?;
    }
    Ok(aliases)
}

fn get_serde_rename(attrs: &[syn::Attribute]) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }

        if let Meta::List(meta_list) = &attr.meta {
            let tokens = meta_list.tokens.to_string();
            // rename = "..." is the only serde key that changes the column name
            if let Some(start) = tokens.find("rename") {
                let rest = &tokens[start..];
                if let Some(eq_pos) = rest.find('=') {
                    let after_eq = rest[eq_pos + 1..].trim();
                    if let Some(stripped) = after_eq.strip_prefix('"') {
                        if let Some(end_quote) = stripped.find('"') {
                            return Some(stripped[..end_quote].to_string());
                        }
                    }
                }
            }
        }
    }
    None
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    attrs
        .iter()
        .filter_map(|attr| {
            if !attr.path().is_ident("doc") {
                return None;
            }
            if let Meta::NameValue(meta) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &meta.value {
                    if let Lit::Str(lit_str) = &expr_lit.lit {
                        return Some(lit_str.value().trim().to_string());
                    }
                }
            }
            None
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}
