//! Proc macros for declaring rustyhdf5-schema record types.
//!
//! - `#[derive(H5Group)]`: a record stored as a group
//! - `#[derive(H5Dataset)]`: a dataset schema (element type, declared
//!   shape and the dataset's attributes)
//! - `#[derive(H5Enum)]`: an integer-backed enumeration
//! - `#[derive(H5Union)]`: a union of dataset schemas resolved by shape
//!
//! The generated code refers to the runtime crate as `::rustyhdf5_schema`.

use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::ParseStream;
use syn::{
    parse_macro_input, Data, DeriveInput, Expr, ExprLit, ExprUnary, Fields, Ident, Lit, LitInt,
    LitStr, Token, Type, UnOp,
};

/// Derive a group record.
///
/// Every named field becomes a field of the record's schema, stored under
/// its Rust name or under `#[h5(rename = "...")]`. Field types must
/// implement `H5Field`: scalars, `String`, `Bytes`, other records, `Vec` of
/// records, `Option` of any of these, `Dataset<S>`, enums and unions.
#[proc_macro_derive(H5Group, attributes(h5))]
pub fn derive_h5group(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5group(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive a dataset schema.
///
/// ```ignore
/// #[derive(H5Dataset)]
/// #[h5(shape(3, _), dtype = f64)]
/// struct Trace {
///     exposure: f64,
/// }
/// ```
///
/// `shape` lists the extents; `_` or `-1` is a wildcard. `dtype` is the
/// element type. Named fields are the dataset's attributes and must be
/// scalars or enums.
#[proc_macro_derive(H5Dataset, attributes(h5))]
pub fn derive_h5dataset(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5dataset(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive an integer-backed enumeration.
///
/// Variants must be unit variants; discriminants must be integer literals
/// and default to one more than the previous variant. The backing type is
/// set with `#[h5(repr = i32)]` and defaults to `i64`.
#[proc_macro_derive(H5Enum, attributes(h5))]
pub fn derive_h5enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5enum(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive a union of datasets. Each variant holds exactly one
/// `Dataset<S>`; on load the first variant whose declared shape matches the
/// stored one is chosen.
#[proc_macro_derive(H5Union, attributes(h5))]
pub fn derive_h5union(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5union(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

struct RecordField {
    ident: Ident,
    stored: String,
    ty: Type,
}

fn reject_generics(input: &DeriveInput, derive: &str) -> syn::Result<()> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            format!("{derive} cannot be derived for generic types"),
        ));
    }
    Ok(())
}

/// Named fields of a struct; a unit struct has none.
fn record_fields(input: &DeriveInput, derive: &str) -> syn::Result<Option<Vec<RecordField>>> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            Fields::Unit => return Ok(None),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    name,
                    format!("{derive} can only be derived for structs with named fields"),
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                format!("{derive} can only be derived for structs"),
            ));
        }
    };

    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            return Err(syn::Error::new_spanned(field, "expected a named field"));
        };
        let mut stored = ident.to_string();
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("h5")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    stored = lit.value();
                    Ok(())
                } else {
                    Err(meta.error("unsupported field attribute, expected `rename`"))
                }
            })?;
        }
        out.push(RecordField {
            ident,
            stored,
            ty: field.ty.clone(),
        });
    }
    Ok(Some(out))
}

/// `RecordObject` and `Record` impls shared by groups and dataset schemas.
fn record_impls(name: &Ident, fields: Option<&[RecordField]>, role: TokenStream2) -> TokenStream2 {
    let name_str = name.to_string();
    let is_unit = fields.is_none();
    let fields = fields.unwrap_or_default();

    let idents: Vec<&Ident> = fields.iter().map(|f| &f.ident).collect();
    let stored: Vec<&str> = fields.iter().map(|f| f.stored.as_str()).collect();
    let types: Vec<&Type> = fields.iter().map(|f| &f.ty).collect();
    let indices: Vec<Literal> = (0..fields.len()).map(Literal::usize_unsuffixed).collect();

    let construct = if is_unit {
        quote! { Self }
    } else {
        quote! { Self { #( #idents: builder.take(#stored)?, )* } }
    };

    quote! {
        impl ::rustyhdf5_schema::RecordObject for #name {
            fn record_type(&self) -> ::rustyhdf5_schema::RecordType {
                ::rustyhdf5_schema::RecordType::of::<Self>()
            }

            fn field_value(&mut self, index: usize) -> ::rustyhdf5_schema::DumpValue<'_> {
                match index {
                    #( #indices => ::rustyhdf5_schema::H5Field::dump_value(&mut self.#idents), )*
                    _ => ::rustyhdf5_schema::DumpValue::Absent,
                }
            }
        }

        impl ::rustyhdf5_schema::Record for #name {
            const NAME: &'static str = #name_str;

            fn declared_fields() -> ::std::vec::Vec<(&'static str, ::rustyhdf5_schema::DeclaredType)> {
                ::std::vec![
                    #( (#stored, <#types as ::rustyhdf5_schema::H5Field>::declared_type()), )*
                ]
            }

            fn schema() -> ::core::result::Result<
                &'static ::rustyhdf5_schema::RecordSchema,
                ::rustyhdf5_schema::SchemaError,
            > {
                static SCHEMA: ::std::sync::OnceLock<
                    ::core::result::Result<::rustyhdf5_schema::RecordSchema, ::rustyhdf5_schema::SchemaError>,
                > = ::std::sync::OnceLock::new();
                SCHEMA
                    .get_or_init(|| {
                        ::rustyhdf5_schema::RecordSchema::build(
                            <Self as ::rustyhdf5_schema::Record>::NAME,
                            ::rustyhdf5_schema::RecordRole::#role,
                            <Self as ::rustyhdf5_schema::Record>::declared_fields(),
                        )
                    })
                    .as_ref()
                    .map_err(|e| e.clone())
            }

            #[allow(unused_mut, unused_variables)]
            fn from_fields(
                mut builder: ::rustyhdf5_schema::RecordBuilder,
            ) -> ::rustyhdf5_schema::Result<Self> {
                ::core::result::Result::Ok(#construct)
            }
        }
    }
}

fn impl_h5group(input: &DeriveInput) -> syn::Result<TokenStream2> {
    reject_generics(input, "H5Group")?;
    let name = &input.ident;
    let fields = record_fields(input, "H5Group")?;
    let record = record_impls(name, fields.as_deref(), quote! { Group });

    Ok(quote! {
        #record

        impl ::rustyhdf5_schema::H5Field for #name {
            fn declared_type() -> ::rustyhdf5_schema::DeclaredType {
                ::rustyhdf5_schema::DeclaredType::Record(::rustyhdf5_schema::RecordType::of::<Self>())
            }

            fn dump_value(&mut self) -> ::rustyhdf5_schema::DumpValue<'_> {
                ::rustyhdf5_schema::DumpValue::Record(self)
            }

            fn from_loaded(
                value: ::rustyhdf5_schema::LoadedValue,
            ) -> ::rustyhdf5_schema::Result<Self> {
                value.into_record::<Self>()
            }
        }

        impl ::rustyhdf5_schema::ListElement for #name {}
    })
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

enum ExtentSpec {
    Fixed(u64),
    Any,
}

fn parse_extent(input: ParseStream) -> syn::Result<ExtentSpec> {
    if input.peek(Token![_]) {
        input.parse::<Token![_]>()?;
        return Ok(ExtentSpec::Any);
    }
    if input.peek(Token![-]) {
        input.parse::<Token![-]>()?;
        let lit: LitInt = input.parse()?;
        if lit.base10_parse::<u64>()? != 1 {
            return Err(syn::Error::new(
                lit.span(),
                "negative extents are not allowed; use `_` or `-1` for a wildcard",
            ));
        }
        return Ok(ExtentSpec::Any);
    }
    let lit: LitInt = input.parse()?;
    Ok(ExtentSpec::Fixed(lit.base10_parse()?))
}

fn impl_h5dataset(input: &DeriveInput) -> syn::Result<TokenStream2> {
    reject_generics(input, "H5Dataset")?;
    let name = &input.ident;

    let mut shape: Option<Vec<ExtentSpec>> = None;
    let mut dtype: Option<Type> = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("h5")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("shape") {
                let content;
                syn::parenthesized!(content in meta.input);
                let extents = content.parse_terminated(parse_extent, Token![,])?;
                shape = Some(extents.into_iter().collect());
                Ok(())
            } else if meta.path.is_ident("dtype") {
                dtype = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported dataset attribute, expected `shape` or `dtype`"))
            }
        })?;
    }
    let (Some(shape), Some(dtype)) = (shape, dtype) else {
        return Err(syn::Error::new_spanned(
            name,
            "H5Dataset requires #[h5(shape(...), dtype = ...)]",
        ));
    };

    let extents = shape.iter().map(|e| match e {
        ExtentSpec::Fixed(n) => quote! { ::rustyhdf5_schema::Extent::Fixed(#n) },
        ExtentSpec::Any => quote! { ::rustyhdf5_schema::Extent::Any },
    });

    let fields = record_fields(input, "H5Dataset")?;
    let record = record_impls(name, fields.as_deref(), quote! { DatasetAttributes });

    Ok(quote! {
        #record

        impl ::rustyhdf5_schema::DatasetSchema for #name {
            const SHAPE: &'static [::rustyhdf5_schema::Extent] = &[ #( #extents ),* ];
            type Elem = #dtype;
        }
    })
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

fn backing_variant(ty: &Ident) -> syn::Result<Ident> {
    let variant = match ty.to_string().as_str() {
        "i8" => "I8",
        "i16" => "I16",
        "i32" => "I32",
        "i64" => "I64",
        "u8" => "U8",
        "u16" => "U16",
        "u32" => "U32",
        "u64" => "U64",
        "f32" => "F32",
        "f64" => "F64",
        "bool" => "Bool",
        other => {
            return Err(syn::Error::new_spanned(
                ty,
                format!("unsupported enum backing type `{other}`"),
            ));
        }
    };
    Ok(Ident::new(variant, ty.span()))
}

fn discriminant_value(expr: &Expr) -> syn::Result<i128> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) => lit.base10_parse(),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => Ok(-discriminant_value(expr)?),
        Expr::Paren(p) => discriminant_value(&p.expr),
        Expr::Group(g) => discriminant_value(&g.expr),
        _ => Err(syn::Error::new_spanned(
            expr,
            "H5Enum discriminants must be integer literals",
        )),
    }
}

fn impl_h5enum(input: &DeriveInput) -> syn::Result<TokenStream2> {
    reject_generics(input, "H5Enum")?;
    let name = &input.ident;
    let name_str = name.to_string();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(name, "H5Enum can only be derived for enums"));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(name, "H5Enum requires at least one variant"));
    }

    let mut backing = Ident::new("I64", name.span());
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("h5")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("repr") {
                let ty: Ident = meta.value()?.parse()?;
                backing = backing_variant(&ty)?;
                Ok(())
            } else {
                Err(meta.error("unsupported enum attribute, expected `repr`"))
            }
        })?;
    }

    let mut idents = Vec::new();
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut next: i128 = 0;
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "H5Enum variants must be unit variants",
            ));
        }
        let value = match &variant.discriminant {
            Some((_, expr)) => discriminant_value(expr)?,
            None => next,
        };
        let Ok(value) = i64::try_from(value) else {
            return Err(syn::Error::new_spanned(variant, "discriminant does not fit in i64"));
        };
        next = value as i128 + 1;
        idents.push(variant.ident.clone());
        names.push(variant.ident.to_string());
        values.push(value);
    }

    Ok(quote! {
        impl ::rustyhdf5_schema::H5Enum for #name {
            const NAME: &'static str = #name_str;
            const BACKING: ::rustyhdf5_schema::ScalarType = ::rustyhdf5_schema::ScalarType::#backing;
            const MEMBERS: &'static [(&'static str, i64)] = &[ #( (#names, #values), )* ];

            fn to_raw(&self) -> i64 {
                match self {
                    #( Self::#idents => #values, )*
                }
            }

            fn from_raw(raw: i64) -> ::core::option::Option<Self> {
                #(
                    if raw == #values {
                        return ::core::option::Option::Some(Self::#idents);
                    }
                )*
                ::core::option::Option::None
            }
        }

        impl ::rustyhdf5_schema::H5Field for #name {
            fn declared_type() -> ::rustyhdf5_schema::DeclaredType {
                ::rustyhdf5_schema::field::enum_declared_type::<Self>()
            }

            fn dump_value(&mut self) -> ::rustyhdf5_schema::DumpValue<'_> {
                ::rustyhdf5_schema::DumpValue::Enum(<Self as ::rustyhdf5_schema::H5Enum>::to_raw(self))
            }

            fn from_loaded(
                value: ::rustyhdf5_schema::LoadedValue,
            ) -> ::rustyhdf5_schema::Result<Self> {
                value.into_enum::<Self>()
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Unions
// ---------------------------------------------------------------------------

fn impl_h5union(input: &DeriveInput) -> syn::Result<TokenStream2> {
    reject_generics(input, "H5Union")?;
    let name = &input.ident;
    let name_str = name.to_string();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(name, "H5Union can only be derived for enums"));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(name, "H5Union requires at least one variant"));
    }

    let mut idents = Vec::new();
    let mut types = Vec::new();
    for variant in &data.variants {
        let ty = match &variant.fields {
            Fields::Unnamed(f) if f.unnamed.len() == 1 => f.unnamed[0].ty.clone(),
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "H5Union variants must hold exactly one dataset, e.g. `Small(Dataset<Small>)`",
                ));
            }
        };
        idents.push(variant.ident.clone());
        types.push(ty);
    }
    let indices: Vec<Literal> = (0..idents.len()).map(Literal::usize_unsuffixed).collect();

    Ok(quote! {
        impl ::rustyhdf5_schema::H5Field for #name {
            fn declared_type() -> ::rustyhdf5_schema::DeclaredType {
                ::rustyhdf5_schema::DeclaredType::Union(::std::vec![
                    #( <#types as ::rustyhdf5_schema::UnionVariant>::dataset_type(), )*
                ])
            }

            fn dump_value(&mut self) -> ::rustyhdf5_schema::DumpValue<'_> {
                match self {
                    #( Self::#idents(dataset) => ::rustyhdf5_schema::H5Field::dump_value(dataset), )*
                }
            }

            fn from_loaded(
                value: ::rustyhdf5_schema::LoadedValue,
            ) -> ::rustyhdf5_schema::Result<Self> {
                match value {
                    ::rustyhdf5_schema::LoadedValue::Union { variant, dataset } => match variant {
                        #(
                            #indices => ::core::result::Result::Ok(Self::#idents(
                                <#types as ::rustyhdf5_schema::UnionVariant>::from_dataset(dataset)?,
                            )),
                        )*
                        _ => ::core::result::Result::Err(::rustyhdf5_schema::Error::UnexpectedValue {
                            expected: #name_str,
                            found: "unknown union variant",
                        }),
                    },
                    other => ::core::result::Result::Err(::rustyhdf5_schema::Error::UnexpectedValue {
                        expected: #name_str,
                        found: other.label(),
                    }),
                }
            }
        }
    })
}
