//! # Waymark Macros
//!
//! `#[controller]` turns an inherent `impl` block into a
//! `waymark_core::Controller` implementation.
//!
//! ```ignore
//! #[derive(Default)]
//! struct OrdersController;
//!
//! #[controller("/orders")]
//! impl OrdersController {
//!     #[get("/:id")]
//!     async fn show(&self, #[params] params: HashMap<String, String>) -> ControllerResult {
//!         ControllerResult::ok(params["id"].clone())
//!     }
//!
//!     #[post]
//!     async fn create(&self, #[body(dto)] order: CreateOrder) -> Result<ControllerResult, OrderError> {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Attributes
//!
//! - On methods: `#[get]`, `#[post]`, `#[put]`, `#[patch]`, `#[delete]`,
//!   each with an optional path literal
//! - On parameters: `#[body]`, `#[params]`, `#[query]`, `#[req]`,
//!   `#[context]`; the first three accept `(dto)` to hydrate and validate
//!   the parameter's type before the call
//!
//! Routed methods take `&self`. Parameter indices count from the first
//! argument after `self`. Parameters without an attribute are declared with
//! the unknown kind and receive `Null`.
//! The controller type is instantiated through `Default`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Meta,
    Type,
};

const ROUTE_ATTRS: [(&str, &str); 5] = [
    ("get", "Get"),
    ("post", "Post"),
    ("put", "Put"),
    ("patch", "Patch"),
    ("delete", "Delete"),
];

const PARAM_ATTRS: [(&str, &str); 5] = [
    ("body", "Body"),
    ("params", "Params"),
    ("query", "Query"),
    ("req", "Request"),
    ("context", "RequestContext"),
];

/// Declare an inherent `impl` block as a controller
///
/// Takes an optional base path literal: `#[controller]` or
/// `#[controller("/orders")]`.
#[proc_macro_attribute]
pub fn controller(attr: TokenStream, item: TokenStream) -> TokenStream {
    let base_path = if attr.is_empty() {
        None
    } else {
        Some(parse_macro_input!(attr as LitStr))
    };
    let item_impl = parse_macro_input!(item as ItemImpl);

    expand(base_path, item_impl)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// A route attribute found on a method
struct RouteAttr {
    variant: Ident,
    path: LitStr,
}

/// A parameter attribute found on an argument
struct ParamAttr {
    variant: Ident,
    dto: bool,
}

/// One argument of a routed method
struct Param {
    ty: Type,
    attr: Option<ParamAttr>,
}

/// A method carrying at least one route attribute
struct RoutedMethod {
    name: Ident,
    is_async: bool,
    routes: Vec<RouteAttr>,
    params: Vec<Param>,
}

fn expand(base_path: Option<LitStr>, mut item_impl: ItemImpl) -> syn::Result<TokenStream2> {
    if !item_impl.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item_impl.generics,
            "#[controller] does not support generic impl blocks",
        ));
    }
    if let Some((_, path, _)) = &item_impl.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[controller] must be placed on an inherent impl block",
        ));
    }

    let mut routed = Vec::new();
    let mut errors: Option<syn::Error> = None;
    for impl_item in &mut item_impl.items {
        if let ImplItem::Fn(method) = impl_item {
            match collect_method(method) {
                Ok(Some(found)) => routed.push(found),
                Ok(None) => {}
                Err(err) => match errors.as_mut() {
                    Some(existing) => existing.combine(err),
                    None => errors = Some(err),
                },
            }
        }
    }
    if let Some(err) = errors {
        return Err(err);
    }

    let self_ty = &item_impl.self_ty;
    let base = base_path.map(|path| quote! { controller.base_path(#path); });
    let declarations = routed.iter().map(declare_method);

    Ok(quote! {
        #item_impl

        impl ::waymark_core::Controller for #self_ty {
            fn create() -> Self {
                <Self as ::core::default::Default>::default()
            }

            fn declare(controller: &mut ::waymark_core::ControllerDeclaration<'_, Self>) {
                #base
                #(#declarations)*
            }
        }
    })
}

/// Strip waymark attributes from `method` and record what they said
fn collect_method(method: &mut ImplItemFn) -> syn::Result<Option<RoutedMethod>> {
    let mut routes = Vec::new();
    let mut kept = Vec::with_capacity(method.attrs.len());
    for attr in method.attrs.drain(..) {
        match route_attr(&attr)? {
            Some(route) => routes.push(route),
            None => kept.push(attr),
        }
    }
    method.attrs = kept;

    let mut params = Vec::new();
    let mut receiver_ok = false;
    for input in &mut method.sig.inputs {
        match input {
            FnArg::Receiver(receiver) => {
                receiver_ok = receiver.reference.is_some() && receiver.mutability.is_none();
            }
            FnArg::Typed(pat_type) => {
                let mut attr = None;
                let mut kept = Vec::with_capacity(pat_type.attrs.len());
                for a in pat_type.attrs.drain(..) {
                    match param_attr(&a)? {
                        Some(found) if attr.is_some() => {
                            return Err(syn::Error::new_spanned(
                                &found.variant,
                                "a parameter takes at most one injection attribute",
                            ));
                        }
                        Some(found) => attr = Some(found),
                        None => kept.push(a),
                    }
                }
                pat_type.attrs = kept;
                params.push(Param {
                    ty: (*pat_type.ty).clone(),
                    attr,
                });
            }
        }
    }

    if routes.is_empty() {
        if let Some(param) = params.iter().find_map(|p| p.attr.as_ref()) {
            return Err(syn::Error::new_spanned(
                &param.variant,
                "parameter attributes are only allowed on routed methods",
            ));
        }
        return Ok(None);
    }
    if !receiver_ok {
        return Err(syn::Error::new_spanned(
            &method.sig,
            "routed controller methods must take `&self`",
        ));
    }

    Ok(Some(RoutedMethod {
        name: method.sig.ident.clone(),
        is_async: method.sig.asyncness.is_some(),
        routes,
        params,
    }))
}

fn route_attr(attr: &Attribute) -> syn::Result<Option<RouteAttr>> {
    let Some(variant) = lookup(attr, &ROUTE_ATTRS) else {
        return Ok(None);
    };
    let path = match &attr.meta {
        Meta::Path(_) => LitStr::new("", Span::call_site()),
        Meta::List(list) => list.parse_args::<LitStr>()?,
        Meta::NameValue(nv) => {
            return Err(syn::Error::new_spanned(nv, "expected #[verb] or #[verb(\"/path\")]"));
        }
    };
    Ok(Some(RouteAttr { variant, path }))
}

fn param_attr(attr: &Attribute) -> syn::Result<Option<ParamAttr>> {
    let Some(variant) = lookup(attr, &PARAM_ATTRS) else {
        return Ok(None);
    };
    let dto = match &attr.meta {
        Meta::Path(_) => false,
        Meta::List(list) => {
            let flag = list.parse_args::<Ident>()?;
            if flag != "dto" {
                return Err(syn::Error::new_spanned(flag, "expected `dto`"));
            }
            true
        }
        Meta::NameValue(nv) => {
            return Err(syn::Error::new_spanned(nv, "expected #[kind] or #[kind(dto)]"));
        }
    };
    if dto && !matches!(variant.to_string().as_str(), "Body" | "Params" | "Query") {
        return Err(syn::Error::new_spanned(
            attr,
            "only #[body], #[params] and #[query] can hydrate a DTO",
        ));
    }
    Ok(Some(ParamAttr { variant, dto }))
}

/// Map a bare attribute name to its `waymark_core` variant
fn lookup(attr: &Attribute, table: &[(&str, &str)]) -> Option<Ident> {
    let ident = attr.path().get_ident()?;
    table
        .iter()
        .find(|(name, _)| ident == name)
        .map(|(_, variant)| Ident::new(variant, ident.span()))
}

fn declare_method(method: &RoutedMethod) -> TokenStream2 {
    let name = &method.name;
    let name_str = name.to_string();

    let routes = method.routes.iter().map(|route| {
        let variant = &route.variant;
        let path = &route.path;
        quote! {
            controller.route(::waymark_core::Method::#variant, #name_str, #path);
        }
    });

    let params = method.params.iter().enumerate().map(|(index, param)| {
        let ty = &param.ty;
        let (variant, dto) = match &param.attr {
            Some(attr) => (
                attr.variant.clone(),
                attr.dto.then(|| quote! { .with_dto::<#ty>() }),
            ),
            None => (Ident::new("Unknown", Span::call_site()), None),
        };
        quote! {
            controller.param(
                #name_str,
                ::waymark_core::ParamDeclaration::new(#index, ::waymark_core::ParamKind::#variant)#dto,
            );
        }
    });

    let bindings: Vec<Ident> = (0..method.params.len())
        .map(|index| format_ident!("__waymark_arg{}", index))
        .collect();
    let takes = method.params.iter().enumerate().map(|(index, param)| {
        let binding = &bindings[index];
        let ty = &param.ty;
        let take = if param.attr.as_ref().is_some_and(|a| a.dto) {
            quote! { args.take_dto::<#ty>(#index) }
        } else {
            quote! { args.take::<#ty>(#index) }
        };
        quote! {
            let #binding: #ty = match #take {
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(err) => {
                    return ::core::result::Result::Err(::waymark_core::BoxError::from(err));
                }
            };
        }
    });

    let call = if method.is_async {
        quote! { this.#name(#(#bindings),*).await }
    } else {
        quote! { this.#name(#(#bindings),*) }
    };
    let args_binding = if method.params.is_empty() {
        quote! { _args }
    } else {
        quote! { mut args }
    };

    quote! {
        #(#routes)*
        #(#params)*
        controller.handler(
            #name_str,
            |this: ::std::sync::Arc<Self>, #args_binding: ::waymark_core::Arguments| async move {
                #(#takes)*
                ::waymark_core::IntoControllerResult::into_controller_result(#call)
            },
        );
    }
}
