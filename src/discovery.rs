//! # Discovery
//!
//! Scans package roots for prompt classes and resolves a canonical dotted name for each.
//!
//! Packages and modules come from a [`ModuleLoader`]. [`ModuleCatalog`] is the in-memory
//! loader that application code registers its modules with at startup;
//! [`FileModuleLoader`](crate::file_modules::FileModuleLoader) exposes template files on disk.
//!
//! Name resolution order, unless a custom resolver replaces it:
//! 1. the name attached with [`prompt`](crate::registry::prompt) / [`PromptClass::named`],
//! 2. the class's explicit prompt name,
//! 3. by convention, `<service>.<snake_case(ClassName)>` when the defining module path has a
//!    `prompts` segment (service being the segment before it), else `snake_case(ClassName)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PromptError, Result};
use crate::prompt::PromptClass;
use crate::registry::PromptRegistry;

/// The classes a module exposes.
///
/// Classes whose own module differs from `name` are treated as re-exports and skipped.
#[derive(Debug, Clone, Default)]
pub struct PromptModule {
    pub name: String,
    pub classes: Vec<PromptClass>,
}

pub trait ModuleLoader {
    /// Every module nested below `package`, excluding `package` itself.
    fn submodules(&self, package: &str) -> Result<Vec<String>>;

    fn load(&self, module: &str) -> Result<PromptModule>;
}

/// Modules registered explicitly by the application.
///
/// Parent packages of registered modules exist implicitly and have no classes.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, std::result::Result<Vec<PromptClass>, String>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, name: impl Into<String>, classes: Vec<PromptClass>) -> Self {
        self.add_module(name, classes);
        self
    }

    /// A module that fails to load with `reason`.
    pub fn broken(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.modules.insert(name.into(), Err(reason.into()));
        self
    }

    /// Adds `classes` to module `name`, creating it if needed.
    ///
    /// A module previously marked [`broken`](ModuleCatalog::broken) is replaced by a loadable one.
    pub fn add_module(&mut self, name: impl Into<String>, classes: Vec<PromptClass>) {
        let entry = self.modules.entry(name.into()).or_insert_with(|| Ok(Vec::new()));
        match entry {
            Ok(existing) => existing.extend(classes),
            broken => *broken = Ok(classes),
        }
    }

    fn exists(&self, name: &str) -> bool {
        let prefix = format!("{name}.");
        self.modules.contains_key(name) || self.modules.keys().any(|m| m.starts_with(&prefix))
    }
}

impl ModuleLoader for ModuleCatalog {
    fn submodules(&self, package: &str) -> Result<Vec<String>> {
        if !self.exists(package) {
            return Err(PromptError::Import {
                module: package.to_string(),
                reason: "no such package".to_string(),
            });
        }

        let prefix = format!("{package}.");
        let mut names = BTreeSet::new();
        for module in self.modules.keys().filter(|m| m.starts_with(&prefix)) {
            // Intermediate packages count as modules too.
            let mut end = prefix.len();
            while let Some(dot) = module[end..].find('.') {
                names.insert(module[..end + dot].to_string());
                end += dot + 1;
            }
            names.insert(module.clone());
        }
        Ok(names.into_iter().collect())
    }

    fn load(&self, module: &str) -> Result<PromptModule> {
        match self.modules.get(module) {
            Some(Ok(classes)) => Ok(PromptModule {
                name: module.to_string(),
                classes: classes.clone(),
            }),
            Some(Err(reason)) => Err(PromptError::Import {
                module: module.to_string(),
                reason: reason.clone(),
            }),
            None if self.exists(module) => Ok(PromptModule {
                name: module.to_string(),
                classes: Vec::new(),
            }),
            None => Err(PromptError::Import {
                module: module.to_string(),
                reason: "no such module".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Propagate the first module load failure.
    #[default]
    Raise,
    /// Skip modules that fail to load.
    Skip,
}

/// Replaces the built-in name resolution; returning `None` or an empty name skips the class.
pub type NameResolver<'a> = &'a dyn Fn(&PromptClass) -> Option<String>;

#[derive(Clone, Copy)]
pub struct DiscoverOptions<'a> {
    pub include_blocks: bool,
    pub allow_convention: bool,
    pub name_resolver: Option<NameResolver<'a>>,
    pub on_error: OnError,
}

impl Default for DiscoverOptions<'_> {
    fn default() -> Self {
        Self {
            include_blocks: false,
            allow_convention: true,
            name_resolver: None,
            on_error: OnError::Raise,
        }
    }
}

impl<'a> DiscoverOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_blocks(mut self, include_blocks: bool) -> Self {
        self.include_blocks = include_blocks;
        self
    }

    pub fn allow_convention(mut self, allow_convention: bool) -> Self {
        self.allow_convention = allow_convention;
        self
    }

    pub fn name_resolver(mut self, resolver: NameResolver<'a>) -> Self {
        self.name_resolver = Some(resolver);
        self
    }

    pub fn on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }
}

impl fmt::Debug for DiscoverOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverOptions")
            .field("include_blocks", &self.include_blocks)
            .field("allow_convention", &self.allow_convention)
            .field("name_resolver", &self.name_resolver.is_some())
            .field("on_error", &self.on_error)
            .finish()
    }
}

/// Collects the prompt classes defined in `packages` and all of their submodules.
///
/// Fails on the first pair of distinct classes that resolve to the same name. Meeting the
/// same class twice is fine.
pub fn discover_prompts<L, I, S>(
    loader: &L,
    packages: I,
    options: &DiscoverOptions<'_>,
) -> Result<BTreeMap<String, PromptClass>>
where
    L: ModuleLoader + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    // Package roots are loaded up front; their failures propagate whatever `on_error` says.
    let mut roots: BTreeMap<String, PromptModule> = BTreeMap::new();
    let mut module_names = BTreeSet::new();
    for package in packages {
        let package = package.as_ref();
        if !roots.contains_key(package) {
            roots.insert(package.to_string(), loader.load(package)?);
        }
        module_names.insert(package.to_string());
        module_names.extend(loader.submodules(package)?);
    }

    let mut discovered: BTreeMap<String, PromptClass> = BTreeMap::new();
    for module_name in &module_names {
        let module = match roots.remove(module_name) {
            Some(root) => root,
            None => match loader.load(module_name) {
                Ok(module) => module,
                Err(err) if options.on_error == OnError::Skip => {
                    warn!(module = %module_name, error = %err, "skipping module");
                    continue;
                }
                Err(err) => return Err(err),
            },
        };
        debug!(module = %module.name, classes = module.classes.len(), "scanning module");

        for class in module.classes.iter().filter(|c| c.module() == module.name) {
            if class.is_block() && !options.include_blocks {
                continue;
            }

            let name = match options.name_resolver {
                Some(resolve) => resolve(class),
                None => default_name(class, options.allow_convention),
            };
            let Some(name) = name.filter(|n| !n.is_empty()) else {
                continue;
            };

            if let Some(existing) = discovered.get(&name) {
                if existing != class {
                    return Err(PromptError::Collision {
                        name,
                        first: existing.qualified_name(),
                        second: class.qualified_name(),
                    });
                }
                continue;
            }
            debug!(%name, class = %class.qualified_name(), "discovered prompt");
            discovered.insert(name, class.clone());
        }
    }

    Ok(discovered)
}

/// Runs [`discover_prompts`] and registers every result into `registry`.
pub fn register_discovered<L, I, S>(
    registry: &mut PromptRegistry,
    loader: &L,
    packages: I,
    options: &DiscoverOptions<'_>,
) -> Result<BTreeMap<String, PromptClass>>
where
    L: ModuleLoader + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let discovered = discover_prompts(loader, packages, options)?;
    for (name, class) in &discovered {
        registry.register(name.clone(), class.clone());
    }
    Ok(discovered)
}

/// The built-in name resolution. `None` when nothing applies.
pub fn default_name(class: &PromptClass, allow_convention: bool) -> Option<String> {
    if let Some(name) = class.registered_name().filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    if let Some(name) = class.prompt_name().filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    if !allow_convention {
        return None;
    }

    let snake = to_snake_case(class.name());
    let parts: Vec<&str> = class.module().split('.').collect();
    match parts.iter().position(|part| *part == "prompts") {
        Some(idx) if idx > 0 => Some(format!("{}.{}", parts[idx - 1], snake)),
        _ => Some(snake),
    }
}

static CAMEL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid regex"));
static CAMEL_HUMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

/// `ClassifyContent` -> `classify_content`.
///
/// Runs of capitals are not treated as acronyms: `HTTPServer` becomes `http_server` but
/// `HTTPSServer2X` becomes `https_server2_x`.
pub fn to_snake_case(name: &str) -> String {
    let words = CAMEL_WORD.replace_all(name, "${1}_${2}");
    CAMEL_HUMP.replace_all(&words, "${1}_${2}").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{Prompt, PromptEnv, PromptType};

    macro_rules! prompt_type {
        ($ty:ident, $module:literal $(, $konst:ident: $kty:ty = $value:expr)*) => {
            struct $ty;
            impl Prompt for $ty {}
            impl PromptType for $ty {
                const NAME: &'static str = stringify!($ty);
                const MODULE: &'static str = $module;
                $(const $konst: $kty = $value;)*
                fn create(_env: &PromptEnv) -> Self {
                    $ty
                }
            }
        };
    }

    prompt_type!(ClassifyContent, "sampleapp.classifier.prompts");
    prompt_type!(ExtractSignals, "sampleapp.observer.prompts");
    prompt_type!(SharedBlock, "blockapp.diag.prompts", IS_BLOCK: bool = true);
    prompt_type!(Diagnose, "blockapp.diag.prompts");
    prompt_type!(SameName, "dupeapp.a.prompts", PROMPT_NAME: Option<&'static str> = Some("shared.name"));
    prompt_type!(Another, "dupeapp.b.prompts", PROMPT_NAME: Option<&'static str> = Some("shared.name"));
    prompt_type!(TopLevel, "prompts");

    fn sampleapp() -> ModuleCatalog {
        ModuleCatalog::new()
            .module(
                "sampleapp.classifier.prompts",
                vec![crate::registry::prompt::<ClassifyContent>("classifier.classify_content")],
            )
            .module("sampleapp.observer.prompts", vec![PromptClass::of::<ExtractSignals>()])
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("ClassifyContent"), "classify_content");
        assert_eq!(to_snake_case("ExtractSignals"), "extract_signals");
        assert_eq!(to_snake_case("Analyze"), "analyze");
        assert_eq!(to_snake_case("AnalyzeCoT"), "analyze_co_t");
        assert_eq!(to_snake_case("Step2Plan"), "step2_plan");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_default_name_precedence() {
        let conventional = PromptClass::of::<ExtractSignals>();
        assert_eq!(default_name(&conventional, true).as_deref(), Some("observer.extract_signals"));
        assert_eq!(default_name(&conventional, false), None);

        let explicit = PromptClass::of::<SameName>();
        assert_eq!(default_name(&explicit, false).as_deref(), Some("shared.name"));

        let decorated = PromptClass::of::<SameName>().named("decorated.name");
        assert_eq!(default_name(&decorated, true).as_deref(), Some("decorated.name"));
    }

    #[test]
    fn test_convention_without_service_segment() {
        let top = PromptClass::of::<TopLevel>();
        assert_eq!(default_name(&top, true).as_deref(), Some("top_level"));

        let factory: crate::prompt::PromptFactory =
            std::sync::Arc::new(|_env: &PromptEnv| Box::new(TopLevel) as Box<dyn Prompt>);
        let flat = PromptClass::new("flat", "FlatPrompt", "app.helpers", factory);
        assert_eq!(default_name(&flat, true).as_deref(), Some("flat_prompt"));
    }

    #[test]
    fn test_discover_mixed_explicit_and_convention() {
        let discovered = discover_prompts(&sampleapp(), ["sampleapp"], &DiscoverOptions::default()).unwrap();
        assert_eq!(
            discovered.keys().collect::<Vec<_>>(),
            vec!["classifier.classify_content", "observer.extract_signals"]
        );
    }

    #[test]
    fn test_discover_skips_blocks_by_default() {
        let catalog = ModuleCatalog::new().module(
            "blockapp.diag.prompts",
            vec![PromptClass::of::<SharedBlock>(), PromptClass::of::<Diagnose>()],
        );

        let discovered = discover_prompts(&catalog, ["blockapp"], &DiscoverOptions::default()).unwrap();
        assert!(!discovered.contains_key("diag.shared_block"));
        assert!(discovered.contains_key("diag.diagnose"));

        let options = DiscoverOptions::new().include_blocks(true);
        let with_blocks = discover_prompts(&catalog, ["blockapp"], &options).unwrap();
        assert!(with_blocks.contains_key("diag.shared_block"));
    }

    #[test]
    fn test_discover_duplicate_names() {
        let catalog = ModuleCatalog::new()
            .module("dupeapp.a.prompts", vec![PromptClass::of::<SameName>()])
            .module("dupeapp.b.prompts", vec![PromptClass::of::<Another>()]);

        let err = discover_prompts(&catalog, ["dupeapp"], &DiscoverOptions::default()).unwrap_err();
        match err {
            PromptError::Collision { name, first, second } => {
                assert_eq!(name, "shared.name");
                assert_eq!(first, "dupeapp.a.prompts.SameName");
                assert_eq!(second, "dupeapp.b.prompts.Another");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_class_twice_is_not_a_collision() {
        let catalog = sampleapp()
            .module("sampleapp.observer.prompts", vec![PromptClass::of::<ExtractSignals>()]);
        let discovered = discover_prompts(
            &catalog,
            ["sampleapp", "sampleapp.observer"],
            &DiscoverOptions::default(),
        ).unwrap();
        assert_eq!(discovered.len(), 2);
    }

    #[test]
    fn test_reexported_classes_are_ignored() {
        let catalog = ModuleCatalog::new()
            .module("app.reexports", vec![PromptClass::of::<ExtractSignals>()]);
        let discovered = discover_prompts(&catalog, ["app"], &DiscoverOptions::default()).unwrap();
        assert!(discovered.is_empty());
    }

    #[test]
    fn test_import_failure_policy() {
        let catalog = sampleapp().broken("sampleapp.broken", "syntax error");

        let err = discover_prompts(&catalog, ["sampleapp"], &DiscoverOptions::default()).unwrap_err();
        assert!(matches!(err, PromptError::Import { ref module, .. } if module == "sampleapp.broken"));

        let options = DiscoverOptions::new().on_error(OnError::Skip);
        let discovered = discover_prompts(&catalog, ["sampleapp"], &options).unwrap();
        assert_eq!(discovered.len(), 2);
    }

    #[test]
    fn test_broken_package_root_fails_even_when_skipping() {
        let catalog = ModuleCatalog::new()
            .broken("sampleapp", "root import failed")
            .module("sampleapp.observer.prompts", vec![PromptClass::of::<ExtractSignals>()]);

        let options = DiscoverOptions::new().on_error(OnError::Skip);
        let err = discover_prompts(&catalog, ["sampleapp"], &options).unwrap_err();
        assert!(matches!(err, PromptError::Import { ref module, .. } if module == "sampleapp"));
    }

    #[test]
    fn test_module_replaces_broken_entry() {
        let catalog = ModuleCatalog::new()
            .broken("sampleapp.observer.prompts", "syntax error")
            .module("sampleapp.observer.prompts", vec![PromptClass::of::<ExtractSignals>()]);

        let module = catalog.load("sampleapp.observer.prompts").unwrap();
        assert_eq!(module.classes.len(), 1);
    }

    #[test]
    fn test_unknown_package_always_fails() {
        let options = DiscoverOptions::new().on_error(OnError::Skip);
        let err = discover_prompts(&sampleapp(), ["missing"], &options).unwrap_err();
        assert!(matches!(err, PromptError::Import { .. }));
    }

    #[test]
    fn test_custom_name_resolver() {
        let resolver = |class: &PromptClass| {
            (class.name() != "ClassifyContent").then(|| format!("custom.{}", class.name()))
        };
        let options = DiscoverOptions::new().name_resolver(&resolver);
        let discovered = discover_prompts(&sampleapp(), ["sampleapp"], &options).unwrap();
        assert_eq!(discovered.keys().collect::<Vec<_>>(), vec!["custom.ExtractSignals"]);
    }

    #[test]
    fn test_convention_disabled() {
        let options = DiscoverOptions::new().allow_convention(false);
        let discovered = discover_prompts(&sampleapp(), ["sampleapp"], &options).unwrap();
        assert_eq!(discovered.keys().collect::<Vec<_>>(), vec!["classifier.classify_content"]);
    }

    #[test]
    fn test_register_discovered() {
        let mut registry = PromptRegistry::new();
        let registered =
            register_discovered(&mut registry, &sampleapp(), ["sampleapp"], &DiscoverOptions::default()).unwrap();
        assert_eq!(registered.len(), 2);
        assert!(registry.contains("observer.extract_signals"));
        assert_eq!(registry.names(false), vec!["classifier.classify_content", "observer.extract_signals"]);
    }

    #[test]
    fn test_catalog_submodules_include_intermediate_packages() {
        let catalog = sampleapp();
        assert_eq!(
            catalog.submodules("sampleapp").unwrap(),
            vec![
                "sampleapp.classifier",
                "sampleapp.classifier.prompts",
                "sampleapp.observer",
                "sampleapp.observer.prompts",
            ]
        );
        assert!(catalog.load("sampleapp.classifier").unwrap().classes.is_empty());
        assert!(catalog.load("elsewhere").is_err());
    }

    #[test]
    fn test_on_error_from_config() {
        #[derive(Deserialize)]
        struct Settings {
            on_error: OnError,
        }
        let settings: Settings = toml::from_str("on_error = \"skip\"").unwrap();
        assert_eq!(settings.on_error, OnError::Skip);
    }
}
