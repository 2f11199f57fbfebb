use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{braced, token, Error, Ident, LitStr, Result, Token, Visibility};

use proc_macro_crate::{crate_name, FoundCrate};

/// Deprecation attribute: #[deprecated] / #[deprecated(note = "...")]
#[derive(Clone, Default)]
struct DeprecationAttr {
    is_deprecated: bool,
    note: Option<String>,
}

/// Parsed attributes for a node.
#[derive(Clone, Default)]
struct NodeAttrs {
    /// #[comment = "..."]
    comment: Option<String>,
    deprecation: DeprecationAttr,
    /// #[redirect = "Path.To.Target"]
    redirect_to: Option<LitStr>,
}

struct Node {
    name: Ident,
    attrs: NodeAttrs,
    children: Vec<Node>,
}

struct NativeTagsInput {
    vis: Visibility,
    root: Ident,
    nodes: Vec<Node>,
}

impl Parse for NativeTagsInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let vis: Visibility = input.parse()?;
        input.parse::<Token![mod]>()?;
        let root: Ident = input.parse()?;
        let content;
        braced!(content in input);
        let nodes = parse_nodes(&content)?;
        Ok(Self { vis, root, nodes })
    }
}

fn parse_nodes(input: ParseStream) -> Result<Vec<Node>> {
    let mut nodes: Vec<Node> = Vec::new();
    while !input.is_empty() {
        let attrs = parse_all_attrs(input)?;
        let name: Ident = input.parse()?;

        if nodes.iter().any(|n| n.name == name) {
            return Err(Error::new(name.span(), format!("duplicate tag `{name}`")));
        }

        let children = if input.peek(token::Brace) {
            let content;
            braced!(content in input);
            parse_nodes(&content)?
        } else {
            input.parse::<Token![;]>()?;
            Vec::new()
        };

        if let Some(target) = &attrs.redirect_to
            && !children.is_empty()
        {
            return Err(Error::new(
                target.span(),
                format!("`{name}` has #[redirect] but also has children; redirects must be leaf nodes"),
            ));
        }

        nodes.push(Node {
            name,
            attrs,
            children,
        });
    }
    Ok(nodes)
}

/// Handles:
/// - `#[comment = "..."]`
/// - `#[deprecated]` or `#[deprecated(note = "...")]`
/// - `#[redirect = "Path.To.Target"]`
fn parse_all_attrs(input: ParseStream) -> Result<NodeAttrs> {
    let mut result = NodeAttrs::default();

    while input.peek(Token![#]) {
        input.parse::<Token![#]>()?;
        let content;
        syn::bracketed!(content in input);

        let key: Ident = content.parse()?;

        if key == "deprecated" {
            result.deprecation.is_deprecated = true;

            if content.peek(token::Paren) {
                let inner;
                syn::parenthesized!(inner in content);
                if !inner.is_empty() {
                    let note_key: Ident = inner.parse()?;
                    if note_key != "note" {
                        return Err(Error::new(note_key.span(), "expected `note = \"...\"`"));
                    }
                    inner.parse::<Token![=]>()?;
                    let note: LitStr = inner.parse()?;
                    result.deprecation.note = Some(note.value());
                }
            }
        } else if key == "redirect" {
            content.parse::<Token![=]>()?;
            result.redirect_to = Some(content.parse()?);
        } else if key == "comment" {
            content.parse::<Token![=]>()?;
            let comment: LitStr = content.parse()?;
            result.comment = Some(comment.value());
        } else {
            return Err(Error::new(
                key.span(),
                format!("unknown attribute `{key}`, expected `comment`, `redirect` or `deprecated`"),
            ));
        }
    }

    Ok(result)
}

// =============================================================================
// Tree analysis (runs at macro expansion time)
// =============================================================================

fn join_path(prefix: &str, name: &Ident) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Native tag rows in DFS order. Redirect nodes produce no row.
fn collect_native_tags(nodes: &[Node], prefix: &str, out: &mut Vec<(String, String)>) {
    for node in nodes {
        if node.attrs.redirect_to.is_some() {
            continue;
        }
        let path = join_path(prefix, &node.name);
        out.push((path.clone(), node.attrs.comment.clone().unwrap_or_default()));
        collect_native_tags(&node.children, &path, out);
    }
}

/// `(old path, target literal)` for every redirect node.
fn collect_redirects(nodes: &[Node], prefix: &str, out: &mut Vec<(String, LitStr)>) {
    for node in nodes {
        let path = join_path(prefix, &node.name);
        match &node.attrs.redirect_to {
            Some(target) => out.push((path, target.clone())),
            None => collect_redirects(&node.children, &path, out),
        }
    }
}

/// Check that every redirect names a declared, non-redirect tag.
fn validate_redirects(nodes: &[Node]) -> Result<()> {
    let mut native = Vec::new();
    collect_native_tags(nodes, "", &mut native);
    let mut redirects = Vec::new();
    collect_redirects(nodes, "", &mut redirects);

    for (old, target) in &redirects {
        let value = target.value();
        if value == *old {
            return Err(Error::new(target.span(), "a tag cannot redirect to itself"));
        }
        if !native.iter().any(|(path, _)| *path == value) {
            return Err(Error::new(
                target.span(),
                format!("redirect target `{value}` is not declared in this block"),
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Crate path resolution
// =============================================================================

fn tags_crate_path() -> TokenStream2 {
    match crate_name("bevy-gameplay-tags") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) | Err(_) => quote!(::bevy_gameplay_tags),
    }
}

// =============================================================================
// Code generation
// =============================================================================

/// `super::super::Effect::Damage::Fire::Tag`, as seen from a module `depth`
/// levels below the root module.
fn redirect_type_path(target: &str, depth: u8) -> TokenStream2 {
    let supers = (0..=depth).map(|_| quote!(super::));
    let modules = target.split('.').map(|s| Ident::new(s, Span::call_site()));
    quote! { #(#supers)* #(#modules::)*Tag }
}

/// Recursively generate one module per node.
///
/// ```ignore
/// native_tags! {
///     pub mod Tags {
///         Effect {
///             #[comment = "All damage"]
///             Damage { Fire; }
///         }
///         #[redirect = "Effect.Damage.Fire"]
///         Burn;
///     }
/// }
///
/// // Generates:
/// pub mod Tags {
///     pub mod Effect {
///         pub struct Tag;              // impl NativeTag
///         pub const PATH: &str = "Effect";
///         pub mod Damage {
///             pub struct Tag;
///             pub const COMMENT: &str = "All damage";
///             pub mod Fire { ... }
///         }
///     }
///     #[deprecated(note = "redirected to Effect.Damage.Fire")]
///     pub mod Burn {
///         pub type Tag = super::Effect::Damage::Fire::Tag;
///     }
/// }
///
/// // Usage:
/// Tags::Effect::Damage::Tag::request(&registry)
/// ```
fn generate_tags_recursive(
    nodes: &[Node],
    prefix: &str,
    depth: u8,
    tags_crate: &TokenStream2,
) -> Vec<TokenStream2> {
    let mut output = Vec::new();

    for node in nodes {
        let node_ident = &node.name;
        let path = join_path(prefix, node_ident);
        let path_lit = LitStr::new(&path, Span::call_site());

        let deprecation_attr = if node.attrs.deprecation.is_deprecated {
            match &node.attrs.deprecation.note {
                Some(note) => quote! { #[deprecated(note = #note)] },
                None => quote! { #[deprecated] },
            }
        } else {
            quote! {}
        };

        if let Some(target) = &node.attrs.redirect_to {
            let target_type = redirect_type_path(&target.value(), depth);
            let redirect_deprecation = if node.attrs.deprecation.is_deprecated {
                deprecation_attr.clone()
            } else {
                let note = format!("redirected to {}", target.value());
                quote! { #[deprecated(note = #note)] }
            };

            output.push(quote! {
                #redirect_deprecation
                #[allow(non_snake_case)]
                pub mod #node_ident {
                    /// Redirect target.
                    pub type Tag = #target_type;
                    /// Name this redirect replaces.
                    pub const OLD_PATH: &'static str = #path_lit;
                    pub const PATH: &'static str = <Tag as #tags_crate::NativeTag>::PATH;
                    pub const DEPTH: u8 = <Tag as #tags_crate::NativeTag>::DEPTH;
                }
            });
            continue;
        }

        let comment = node.attrs.comment.clone().unwrap_or_default();
        let doc = if comment.is_empty() {
            format!("Native tag `{path}`.")
        } else {
            format!("Native tag `{path}`: {comment}")
        };

        let children_output = generate_tags_recursive(&node.children, &path, depth + 1, tags_crate);

        output.push(quote! {
            #deprecation_attr
            #[doc = #doc]
            #[allow(non_snake_case)]
            pub mod #node_ident {
                /// Zero-sized marker for this tag.
                #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
                pub struct Tag;

                impl Tag {
                    /// Full dot-separated path.
                    pub const PATH: &'static str = #path_lit;

                    /// Depth in the tag tree (0 = top-level).
                    pub const DEPTH: u8 = #depth;

                    /// Developer comment.
                    pub const COMMENT: &'static str = #comment;
                }

                impl ::core::fmt::Display for Tag {
                    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                        f.write_str(Self::PATH)
                    }
                }

                impl #tags_crate::NativeTag for Tag {
                    const PATH: &'static str = #path_lit;
                    const DEPTH: u8 = #depth;
                }

                pub const PATH: &'static str = Tag::PATH;
                pub const DEPTH: u8 = Tag::DEPTH;
                pub const COMMENT: &'static str = Tag::COMMENT;

                #(#children_output)*
            }
        });
    }

    output
}

fn expand(input: NativeTagsInput) -> Result<TokenStream2> {
    validate_redirects(&input.nodes)?;
    let tags_crate = tags_crate_path();

    let mut native = Vec::new();
    collect_native_tags(&input.nodes, "", &mut native);
    let node_count = native.len();
    let native_defs = native.iter().map(|(path, comment)| {
        quote! { #tags_crate::NativeTagDef::new(#path, #comment), }
    });

    let mut redirects = Vec::new();
    collect_redirects(&input.nodes, "", &mut redirects);
    let redirect_defs = redirects.iter().map(|(old, target)| {
        quote! { #tags_crate::NativeRedirectDef::new(#old, #target), }
    });

    let tags = generate_tags_recursive(&input.nodes, "", 0, &tags_crate);

    let vis = input.vis;
    let root = input.root;

    Ok(quote! {
        #[allow(non_snake_case, non_camel_case_types)]
        #vis mod #root {
            /// Number of native tags declared (redirects excluded).
            pub const NODE_COUNT: usize = #node_count;

            /// Native tags in declaration order, parents before children.
            pub const NATIVE_TAGS: &'static [#tags_crate::NativeTagDef] = &[
                #(#native_defs)*
            ];

            /// Redirects declared with `#[redirect = "..."]`.
            pub const REDIRECTS: &'static [#tags_crate::NativeRedirectDef] = &[
                #(#redirect_defs)*
            ];

            /// Register every native tag and redirect of this block.
            pub fn register(
                registry: &mut #tags_crate::TagRegistry,
            ) -> ::core::result::Result<(), #tags_crate::RegistryError> {
                registry.register_native_tags(NATIVE_TAGS)?;
                registry.register_native_redirects(REDIRECTS);
                ::core::result::Result::Ok(())
            }

            #(#tags)*
        }
    })
}

// =============================================================================
// Entry point
// =============================================================================

/// Declare native gameplay tags as a module tree.
#[proc_macro]
pub fn native_tags(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as NativeTagsInput);
    expand(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
