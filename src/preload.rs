//! Preload directives and the `Link` header codec
//!
//! A [`Preload`] advertises a sub-resource the browser should fetch early.
//! It serializes to a `Link` header value such as
//! `<https://example.org/style.css>;rel="preload";as="style"`; when its
//! target has been packaged, the packager emits an additional
//! `rel="allowed-alt-sxg"` value carrying the target's header integrity.

use crate::exchange::Integrity;
use url::Url;

/// One `;name="value"` or `;name` parameter of a link value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParam {
    pub name: String,
    pub value: Option<String>,
}

/// A preload directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preload {
    url: Url,
    params: Vec<LinkParam>,
    resources: Vec<Url>,
}

impl Preload {
    /// Creates a preload whose only resource to package is its target
    pub fn new(url: Url) -> Self {
        Self {
            resources: vec![url.clone()],
            url,
            params: Vec::new(),
        }
    }

    /// Appends a `;name="value"` parameter
    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push(LinkParam {
            name: name.to_ascii_lowercase(),
            value: Some(value.into()),
        });
        self
    }

    /// Appends a valueless `;name` parameter
    pub fn with_flag(mut self, name: &str) -> Self {
        self.params.push(LinkParam {
            name: name.to_ascii_lowercase(),
            value: None,
        });
        self
    }

    /// Target URL of the directive
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of the `as` parameter (the request destination)
    pub fn destination(&self) -> Option<&str> {
        self.param("as")
    }

    /// Value of a parameter; `Some("")` for a flag
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_deref().unwrap_or(""))
    }

    pub fn params(&self) -> &[LinkParam] {
        &self.params
    }

    /// Resources that should be packaged for this preload
    pub fn resources(&self) -> &[Url] {
        &self.resources
    }

    /// Keeps the directive as a hint but stops its targets from being packaged
    pub fn clear_resources(&mut self) {
        self.resources.clear();
    }

    /// URLs whose header integrity qualifies this preload as an SXG preload
    pub fn integrity_targets(&self) -> &[Url] {
        if self.resources.is_empty() {
            std::slice::from_ref(&self.url)
        } else {
            &self.resources
        }
    }

    /// Serializes to `<URL>;rel="preload"` followed by the parameters in the
    /// order they were set
    pub fn to_link_value(&self) -> String {
        let mut value = format!("<{}>;rel=\"preload\"", self.url);
        for param in &self.params {
            value.push(';');
            value.push_str(&param.name);
            if let Some(v) = &param.value {
                value.push('=');
                value.push_str(&quote(v));
            }
        }
        value
    }
}

/// Serializes an `allowed-alt-sxg` link value
pub fn allowed_alt_sxg_value(url: &Url, integrity: &Integrity) -> String {
    format!(
        "<{}>;rel=\"allowed-alt-sxg\";header-integrity={}",
        url,
        quote(integrity.as_str())
    )
}

/// A parsed `Link` header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkValue {
    pub target: String,
    pub params: Vec<LinkParam>,
}

impl LinkValue {
    /// Returns true if the `rel` parameter contains `token`
    pub fn has_rel(&self, token: &str) -> bool {
        self.params
            .iter()
            .filter(|p| p.name == "rel")
            .filter_map(|p| p.value.as_deref())
            .any(|rel| has_token(rel, token))
    }

    /// Converts a `rel=preload` value into a [`Preload`]
    ///
    /// The target is resolved against `base`. Returns `None` when the value
    /// is not a preload or its target does not resolve.
    pub fn to_preload(&self, base: &Url) -> Option<Preload> {
        if !self.has_rel("preload") {
            return None;
        }
        let url = base.join(&self.target).ok()?;
        let mut preload = Preload::new(url);
        preload.params = self
            .params
            .iter()
            .filter(|p| p.name != "rel")
            .cloned()
            .collect();
        Some(preload)
    }

    /// Serializes back to header syntax
    pub fn to_header_value(&self) -> String {
        let mut value = format!("<{}>", self.target);
        for param in &self.params {
            value.push(';');
            value.push_str(&param.name);
            if let Some(v) = &param.value {
                value.push('=');
                value.push_str(&quote(v));
            }
        }
        value
    }
}

/// Returns true if the whitespace-separated token list contains `token`,
/// compared ASCII case-insensitively
pub fn has_token(list: &str, token: &str) -> bool {
    list.split_ascii_whitespace()
        .any(|t| t.eq_ignore_ascii_case(token))
}

/// Parses a `Link` header into its values
///
/// Values that do not start with `<target>` are skipped. Parameter names are
/// lowercased; quoted values are unescaped.
pub fn parse_link_header(header: &str) -> Vec<LinkValue> {
    split_outside_quotes(header, ',', true)
        .into_iter()
        .filter_map(parse_link_value)
        .collect()
}

fn parse_link_value(raw: &str) -> Option<LinkValue> {
    let raw = raw.trim();
    let rest = raw.strip_prefix('<')?;
    let end = rest.find('>')?;
    let target = rest[..end].trim().to_string();

    let params = split_outside_quotes(&rest[end + 1..], ';', false)
        .into_iter()
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.split_once('=') {
                Some((name, value)) => Some(LinkParam {
                    name: name.trim().to_ascii_lowercase(),
                    value: Some(unquote(value.trim())),
                }),
                None => Some(LinkParam {
                    name: part.to_ascii_lowercase(),
                    value: None,
                }),
            }
        })
        .collect();

    Some(LinkValue { target, params })
}

/// Splits on `sep` outside quoted strings (and, optionally, outside `<...>`)
fn split_outside_quotes(s: &str, sep: char, angle_brackets: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' if !in_angle => in_quotes = !in_quotes,
            '<' if angle_brackets && !in_quotes => in_angle = true,
            '>' if angle_brackets && !in_quotes => in_angle = false,
            c if c == sep && !in_quotes && !in_angle => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
