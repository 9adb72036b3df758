//! # xprompt
//!
//! Composable prompt templates with a name-based registry.
//!
//! Prompts are small units that render to text. A prompt either renders a template file
//! (with YAML front-matter metadata and pre-rendered blocks) or builds its content in code
//! from text, nested prompts and sequences. Applications register prompt classes under
//! dotted names, either by hand or by scanning their modules, and select alternative
//! variants through configuration.
//!
//! # Modules
//!
//! - [`prompt`] - The [`Prompt`] trait, class descriptors and the render tree
//! - [`template`] - Template files, render context and strict substitution
//! - [`parser`] - Template and front-matter parsing
//! - [`node_set`] - Prompts rendered from structured records
//! - [`registry`] - The [`PromptRegistry`] and its configuration
//! - [`discovery`] - Scanning packages for prompt classes
//! - [`file_modules`] - Template files on disk as discoverable prompt classes
//!
//! # Examples
//!
//! ```rust
//! use std::fs;
//! use tempfile::TempDir;
//! use xprompt::{Context, Prompt, PromptEnv, PromptRegistry, PromptType, TemplateFile};
//!
//! struct Analyze {
//!     template: TemplateFile,
//! }
//!
//! impl Prompt for Analyze {
//!     fn template(&self) -> Option<&TemplateFile> {
//!         Some(&self.template)
//!     }
//! }
//!
//! impl PromptType for Analyze {
//!     const NAME: &'static str = "Analyze";
//!     const MODULE: &'static str = "reviewer.prompts";
//!
//!     fn create(env: &PromptEnv) -> Self {
//!         Analyze { template: TemplateFile::new(env, "analyze.md") }
//!     }
//! }
//!
//! let temp_dir = TempDir::new().unwrap();
//! fs::write(temp_dir.path().join("analyze.md"), "---\nmodel: small\n---\nAnalyze {{ document }}").unwrap();
//!
//! let mut registry = PromptRegistry::new().with_prompts_root(temp_dir.path());
//! registry.register_type::<Analyze>("reviewer.analyze");
//!
//! let prompt = registry.get("reviewer.analyze").unwrap();
//! let text = prompt.render(&Context::new().with("document", "the report")).unwrap();
//! assert_eq!(text, "Analyze the report");
//! ```

pub mod discovery;
pub mod error;
pub mod file_modules;
pub mod node_set;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod template;

pub use discovery::{
    default_name, discover_prompts, register_discovered, to_snake_case, DiscoverOptions,
    ModuleCatalog, ModuleLoader, NameResolver, OnError, PromptModule,
};
pub use error::{PromptError, Result};
pub use file_modules::FileModuleLoader;
pub use node_set::{Node, NodeSet, NodeSource, Nodes};
pub use prompt::{Body, ClassId, Prompt, PromptClass, PromptEnv, PromptFactory, PromptType};
pub use registry::{prompt, PromptRegistry, RegistryConfig};
pub use template::{Context, Template, TemplateFile, TemplatePrompt};
