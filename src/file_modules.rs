//! # File Modules
//!
//! Exposes a directory tree of template files as prompt modules.
//!
//! A package `a.b` is the directory `base_path/a/b`, every directory below it is a module,
//! and each `*.md` file directly inside a module directory is one template-backed prompt
//! class. The template's front matter may set:
//!
//! - `class` - the simple (variant) name; defaults to the file stem in PascalCase,
//! - `name` - an explicit canonical prompt name,
//! - `block` - whether the prompt is a block,
//! - `model` - the model the prompt targets.
//!
//! # Examples
//!
//! ```rust
//! use std::fs;
//! use tempfile::TempDir;
//! use xprompt::{discover_prompts, Context, DiscoverOptions, FileModuleLoader, PromptRegistry};
//!
//! let temp_dir = TempDir::new().unwrap();
//! let module_dir = temp_dir.path().join("sampleapp/observer/prompts");
//! fs::create_dir_all(&module_dir).unwrap();
//! fs::write(module_dir.join("extract_signals.md"), "Extract signals from {{ log }}").unwrap();
//!
//! let loader = FileModuleLoader::new(temp_dir.path());
//! let discovered = discover_prompts(&loader, ["sampleapp"], &DiscoverOptions::default()).unwrap();
//! assert!(discovered.contains_key("observer.extract_signals"));
//!
//! let mut registry = PromptRegistry::new();
//! for (name, class) in discovered {
//!     registry.register(name, class);
//! }
//! let prompt = registry.get("observer.extract_signals").unwrap();
//! let text = prompt.render(&Context::new().with("log", "the log")).unwrap();
//! assert_eq!(text, "Extract signals from the log");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::discovery::{ModuleLoader, PromptModule};
use crate::error::{PromptError, Result};
use crate::prompt::{Prompt, PromptClass, PromptEnv};
use crate::template::{split_document, TemplateFile, TemplatePrompt};

#[derive(Debug, Default, Deserialize)]
struct TemplateHeader {
    #[serde(rename = "class")]
    class_name: Option<String>,
    name: Option<String>,
    #[serde(default)]
    block: bool,
    model: Option<String>,
}

/// Loads prompt modules from template files below `base_path`.
#[derive(Debug, Clone)]
pub struct FileModuleLoader {
    /// The directory package paths are resolved against.
    pub base_path: PathBuf,
}

impl FileModuleLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn module_dir(&self, module: &str) -> PathBuf {
        module.split('.').fold(self.base_path.clone(), |dir, part| dir.join(part))
    }

    fn import_error(module: &str, reason: impl ToString) -> PromptError {
        PromptError::Import {
            module: module.to_string(),
            reason: reason.to_string(),
        }
    }

    fn get_md_files(&self, dir: &Path) -> Vec<walkdir::DirEntry> {
        let mut entries: Vec<_> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "md")
            })
            .collect();
        entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));
        entries
    }

    fn load_class(&self, module: &str, path: &Path) -> Result<PromptClass> {
        let text = fs::read_to_string(path).map_err(|e| PromptError::io(path, e))?;
        let (meta, _) = split_document(path, &text)?;
        let header: TemplateHeader =
            serde_yaml::from_value(Value::Mapping(meta)).map_err(|e| PromptError::yaml(path, e))?;

        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let class_name = header.class_name.unwrap_or_else(|| to_pascal_case(&stem));

        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file = PathBuf::from(path.file_name().unwrap_or_default());
        let factory = Arc::new(move |env: &PromptEnv| {
            let template = TemplateFile::new(env, file.clone()).with_dir(dir.clone());
            Box::new(TemplatePrompt::new(template)) as Box<dyn Prompt>
        });

        let mut class = PromptClass::new(path.display().to_string(), class_name, module, factory)
            .with_block(header.block);
        if let Some(name) = header.name {
            class = class.with_prompt_name(name);
        }
        if let Some(model) = header.model {
            class = class.with_model(model);
        }
        Ok(class)
    }
}

impl ModuleLoader for FileModuleLoader {
    fn submodules(&self, package: &str) -> Result<Vec<String>> {
        let dir = self.module_dir(package);
        if !dir.is_dir() {
            return Err(Self::import_error(
                package,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || is_module_segment(&e.file_name().to_string_lossy()))
        {
            let entry = entry.map_err(|e| Self::import_error(package, e))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let relative = entry.path().strip_prefix(&dir).map_err(|e| Self::import_error(package, e))?;
            let suffix: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            names.push(format!("{package}.{}", suffix.join(".")));
        }
        Ok(names)
    }

    fn load(&self, module: &str) -> Result<PromptModule> {
        let dir = self.module_dir(module);
        if !dir.is_dir() {
            return Err(Self::import_error(
                module,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let mut classes = Vec::new();
        for entry in self.get_md_files(&dir) {
            let class = self
                .load_class(module, entry.path())
                .map_err(|e| Self::import_error(module, e))?;
            debug!(module, class = class.name(), "loaded template prompt");
            classes.push(class);
        }

        Ok(PromptModule {
            name: module.to_string(),
            classes,
        })
    }
}

/// Directory names containing a dot (hidden ones included) cannot be addressed by a module path.
fn is_module_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// `classify_content` -> `ClassifyContent`.
fn to_pascal_case(stem: &str) -> String {
    stem.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
