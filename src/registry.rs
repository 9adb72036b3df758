//! # Prompt Registry
//!
//! Maps canonical dotted names to prompt classes and hands out fresh instances.
//!
//! The first class registered under a name is the default. Every class registered under a
//! name, including that first one, is also kept as a variant keyed by its simple name, and a
//! configured override selects one of those variants at lookup time.
//!
//! ```rust
//! use xprompt::{Body, Context, Prompt, PromptEnv, PromptRegistry, PromptType, Result};
//!
//! struct Analyze;
//!
//! impl Prompt for Analyze {
//!     fn body(&self, _ctx: &Context) -> Result<Body> {
//!         Ok(Body::from("Analyze the document."))
//!     }
//! }
//!
//! impl PromptType for Analyze {
//!     const NAME: &'static str = "Analyze";
//!     const MODULE: &'static str = "reviewer.prompts";
//!
//!     fn create(_env: &PromptEnv) -> Self {
//!         Analyze
//!     }
//! }
//!
//! let mut registry = PromptRegistry::new();
//! registry.register_type::<Analyze>("reviewer.analyze");
//! let prompt = registry.get("reviewer.analyze").unwrap();
//! assert_eq!(prompt.render(&Context::new()).unwrap(), "Analyze the document.");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PromptError, Result};
use crate::prompt::{Prompt, PromptClass, PromptEnv, PromptType};

/// Registry settings, usually read from a TOML file.
///
/// ```toml
/// prompts_root = "prompts"
///
/// [overrides]
/// "reviewer.analyze" = "AnalyzeCoT"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_root: Option<PathBuf>,
    /// Canonical prompt name -> simple name of the variant to use instead of the default.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl RegistryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML config file. A relative `prompts_root` is taken relative to the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PromptError::io(path, e))?;
        let mut config = Self::from_toml_str(&text)?;

        if let (Some(root), Some(parent)) = (&config.prompts_root, path.parent()) {
            if root.is_relative() {
                config.prompts_root = Some(parent.join(root));
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Default)]
pub struct PromptRegistry {
    env: PromptEnv,
    overrides: BTreeMap<String, String>,
    defaults: BTreeMap<String, PromptClass>,
    variants: HashMap<String, Vec<PromptClass>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: RegistryConfig) -> Self {
        let env = match config.prompts_root {
            Some(root) => PromptEnv::new().with_prompts_root(root),
            None => PromptEnv::new(),
        };
        Self {
            env,
            overrides: config.overrides,
            ..Self::default()
        }
    }

    pub fn with_prompts_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.env = self.env.with_prompts_root(root);
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, variant: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), variant.into());
        self
    }

    /// The environment every instance handed out by [`PromptRegistry::get`] is built with.
    pub fn env(&self) -> &PromptEnv {
        &self.env
    }

    /// Registers `class` under `name`.
    ///
    /// Only the first registration under a name becomes the default; every registration
    /// records the class as a variant under its simple name.
    pub fn register(&mut self, name: impl Into<String>, class: PromptClass) {
        let name = name.into();
        debug!(%name, class = %class.qualified_name(), "registering prompt");

        self.defaults.entry(name.clone()).or_insert_with(|| class.clone());

        let variants = self.variants.entry(name).or_default();
        match variants.iter_mut().find(|v| v.name() == class.name()) {
            Some(existing) => *existing = class,
            None => variants.push(class),
        }
    }

    pub fn register_type<T: PromptType>(&mut self, name: impl Into<String>) {
        self.register(name, PromptClass::of::<T>());
    }

    /// Instantiates the prompt registered under `name`, honouring a configured override.
    pub fn get(&self, name: &str) -> Result<Box<dyn Prompt>> {
        let default = self
            .defaults
            .get(name)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))?;

        if let Some(variant) = self.overrides.get(name).filter(|v| !v.is_empty()) {
            let variants = self.variants.get(name).map(Vec::as_slice).unwrap_or_default();
            return match variants.iter().find(|class| class.name() == variant) {
                Some(class) => {
                    debug!(%name, %variant, "using prompt override");
                    Ok(class.instantiate(&self.env))
                }
                None => Err(PromptError::OverrideNotFound {
                    name: name.to_string(),
                    variant: variant.clone(),
                    available: variants.iter().map(|c| c.name().to_string()).collect(),
                }),
            };
        }

        Ok(default.instantiate(&self.env))
    }

    /// The default class registered under `name`.
    pub fn class(&self, name: &str) -> Option<&PromptClass> {
        self.defaults.get(name)
    }

    /// Simple names of every variant registered under `name`, in registration order.
    pub fn variants(&self, name: &str) -> Vec<&str> {
        self.variants
            .get(name)
            .map(|classes| classes.iter().map(PromptClass::name).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// `(name, class)` pairs sorted by name, skipping blocks unless `include_blocks`.
    pub fn all(&self, include_blocks: bool) -> impl Iterator<Item = (&str, &PromptClass)> + '_ {
        self.defaults
            .iter()
            .filter(move |(_, class)| include_blocks || !class.is_block())
            .map(|(name, class)| (name.as_str(), class))
    }

    pub fn names(&self, include_blocks: bool) -> Vec<String> {
        self.all(include_blocks).map(|(name, _)| name.to_string()).collect()
    }
}

/// Attaches the canonical `name` to `T`'s class, like a registration decorator.
pub fn prompt<T: PromptType>(name: impl Into<String>) -> PromptClass {
    PromptClass::of::<T>().named(name)
}
