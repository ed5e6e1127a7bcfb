//! Shader composition from named WGSL fragments with `{{TOKEN}}` macro substitution.
//!
//! A [`ShaderComposer`] holds a registry of [`ShaderFragment`]s. Each fragment
//! declares the fragments it depends on and the symbols it defines, so a
//! composition can be checked before any text reaches the GPU compiler:
//!
//! - requests are de-duplicated by name, first occurrence wins
//! - every dependency must already have been emitted
//! - no symbol may be defined by two emitted fragments
//! - every symbol a fragment uses must be defined by an earlier fragment
//! - every `{{TOKEN}}` must be covered by the [`MacroSet`], and no placeholder
//!   may survive substitution

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};

/// Errors raised while assembling a program from fragments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    #[error("fragment '{name}' is not registered")]
    UnknownFragment { name: String },

    #[error("fragment '{fragment}' requires '{requires}', which is not emitted before it")]
    MissingDependency { fragment: String, requires: String },

    #[error("symbol '{symbol}' is defined by both '{first}' and '{second}'")]
    DuplicateSymbol {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("fragment '{fragment}' uses '{symbol}', which no earlier fragment defines")]
    UndefinedSymbol { symbol: String, fragment: String },

    #[error("unresolved macro token '{{{{{token}}}}}' in fragment '{fragment}'")]
    UnresolvedToken { token: String, fragment: String },
}

/// A literal substituted for a `{{TOKEN}}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroValue {
    /// Emitted with a decimal point so WGSL types it as `f32`.
    Float(f32),
    Int(i64),
    /// Emitted as a `vec3<f32>(..)` constructor.
    Vec3([f32; 3]),
    /// Emitted verbatim.
    Raw(String),
}

impl MacroValue {
    /// The WGSL text for this value.
    pub fn to_wgsl(&self) -> String {
        match self {
            MacroValue::Float(v) => float_literal(*v),
            MacroValue::Int(v) => v.to_string(),
            MacroValue::Vec3([x, y, z]) => format!(
                "vec3<f32>({}, {}, {})",
                float_literal(*x),
                float_literal(*y),
                float_literal(*z)
            ),
            MacroValue::Raw(text) => text.clone(),
        }
    }
}

/// Format an `f32` so it always parses back as a WGSL float literal.
pub fn float_literal(value: f32) -> String {
    debug_assert!(value.is_finite(), "non-finite macro value {value}");
    let mut text = value.to_string();
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    text
}

/// Named literals available to a composition. Iterates in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroSet {
    values: BTreeMap<String, MacroValue>,
}

impl MacroSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: MacroValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: MacroValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&MacroValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MacroValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A reusable piece of WGSL source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderFragment {
    pub name: &'static str,
    /// Fragments that must be emitted before this one.
    pub requires: &'static [&'static str],
    /// Top-level symbols this fragment declares.
    pub defines: &'static [&'static str],
    /// Symbols this fragment calls that one of several variant fragments provides.
    pub uses: &'static [&'static str],
    pub body: &'static str,
}

impl ShaderFragment {
    pub const fn new(
        name: &'static str,
        requires: &'static [&'static str],
        defines: &'static [&'static str],
        body: &'static str,
    ) -> Self {
        Self {
            name,
            requires,
            defines,
            uses: &[],
            body,
        }
    }

    /// Declare symbols that must be defined by a fragment emitted earlier.
    pub const fn with_uses(self, uses: &'static [&'static str]) -> Self {
        Self { uses, ..self }
    }
}

/// Registry of fragments and the composition engine over it.
#[derive(Debug, Clone, Default)]
pub struct ShaderComposer {
    fragments: FxHashMap<&'static str, ShaderFragment>,
}

impl ShaderComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a composer from a fragment list.
    pub fn with_fragments(fragments: impl IntoIterator<Item = ShaderFragment>) -> Self {
        let mut composer = Self::new();
        for fragment in fragments {
            composer.register(fragment);
        }
        composer
    }

    /// Register a fragment, replacing any earlier fragment of the same name.
    pub fn register(&mut self, fragment: ShaderFragment) {
        if self.fragments.insert(fragment.name, fragment).is_some() {
            log::debug!("Replaced shader fragment '{}'", fragment.name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ShaderFragment> {
        self.fragments.get(name)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Assemble the requested fragments in order and substitute every macro token.
    pub fn compose(&self, requests: &[&str], macros: &MacroSet) -> Result<String, CompositionError> {
        let ordered = self.resolve(requests)?;

        let mut source = String::new();
        for fragment in &ordered {
            let body = substitute(fragment, macros)?;
            let _ = writeln!(source, "// {}", fragment.name);
            source.push_str(body.trim_matches('\n'));
            source.push_str("\n\n");
        }
        log::debug!(
            "Composed {} shader fragments into {} bytes",
            ordered.len(),
            source.len()
        );
        Ok(source)
    }

    /// The de-duplicated, dependency-checked emission order for `requests`.
    pub fn resolve(&self, requests: &[&str]) -> Result<Vec<ShaderFragment>, CompositionError> {
        let mut emitted: FxHashSet<&str> = FxHashSet::default();
        let mut symbols: FxHashMap<&str, &str> = FxHashMap::default();
        let mut ordered = Vec::with_capacity(requests.len());

        for &name in requests {
            if emitted.contains(name) {
                continue;
            }
            let fragment = *self
                .fragments
                .get(name)
                .ok_or_else(|| CompositionError::UnknownFragment {
                    name: name.to_string(),
                })?;

            if let Some(missing) = fragment.requires.iter().find(|r| !emitted.contains(**r)) {
                return Err(CompositionError::MissingDependency {
                    fragment: fragment.name.to_string(),
                    requires: missing.to_string(),
                });
            }
            if let Some(symbol) = fragment.uses.iter().find(|u| !symbols.contains_key(**u)) {
                return Err(CompositionError::UndefinedSymbol {
                    symbol: symbol.to_string(),
                    fragment: fragment.name.to_string(),
                });
            }
            for &symbol in fragment.defines {
                if let Some(first) = symbols.insert(symbol, fragment.name) {
                    return Err(CompositionError::DuplicateSymbol {
                        symbol: symbol.to_string(),
                        first: first.to_string(),
                        second: fragment.name.to_string(),
                    });
                }
            }

            emitted.insert(fragment.name);
            ordered.push(fragment);
        }
        Ok(ordered)
    }
}

/// Replace every `{{TOKEN}}` in one pass.
///
/// Substituted text is not expanded again; a value that itself contains a
/// placeholder is reported as unresolved.
fn substitute(fragment: &ShaderFragment, macros: &MacroSet) -> Result<String, CompositionError> {
    let unresolved = |token: &str| CompositionError::UnresolvedToken {
        token: token.to_string(),
        fragment: fragment.name.to_string(),
    };

    let mut out = String::with_capacity(fragment.body.len());
    let mut rest = fragment.body;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(unresolved(after.lines().next().unwrap_or_default().trim()));
        };
        let token = after[..end].trim();
        let value = macros.get(token).ok_or_else(|| unresolved(token))?;
        out.push_str(&value.to_wgsl());
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    if let Some(start) = out.find("{{") {
        let after = &out[start + 2..];
        let token = match after.find("}}") {
            Some(end) => after[..end].trim(),
            None => after.lines().next().unwrap_or_default().trim(),
        };
        return Err(unresolved(token));
    }
    Ok(out)
}
