use std::{collections::HashMap, fs, io, path::PathBuf, rc::Rc};

use crate::Config;

/// Modules named `:priv:<importer>` may only be imported by `<importer>`.
pub const PRIVATE_PREFIX: &str = ":priv:";

/// Resolves and loads modules from memory and, optionally, a directory of
/// `.wren` files.
#[derive(Debug, Default, Clone)]
pub struct ModuleLoader {
    root: Option<PathBuf>,
    sources: HashMap<String, String>,
}

impl ModuleLoader {
    /// A loader with only in-memory modules.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            sources: HashMap::new(),
        }
    }

    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add_module(name, source);
        self
    }

    pub fn add_module(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }

    pub fn resolve(&self, importer: &str, name: &str) -> Option<String> {
        if let Some(owner) = name.strip_prefix(PRIVATE_PREFIX) {
            return (!owner.is_empty() && owner == importer).then(|| name.to_owned());
        }
        if self.sources.contains_key(name) {
            return Some(name.to_owned());
        }
        if name.starts_with("./") || name.starts_with("../") {
            let base = importer.rsplit_once('/').map_or("", |(dir, _)| dir);
            return join(base, name);
        }
        Some(name.to_owned())
    }

    pub fn load(&self, name: &str) -> Option<String> {
        if let Some(source) = self.sources.get(name) {
            return Some(source.clone());
        }
        let root = self.root.as_ref()?;
        let file = if name.ends_with(".wren") {
            root.join(name)
        } else {
            root.join(format!("{name}.wren"))
        };
        match fs::read_to_string(&file) {
            Ok(source) => {
                log::debug!("loaded module `{name}` from {}", file.display());
                Some(source)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("could not read module `{name}` from {}: {err}", file.display());
                None
            }
        }
    }

    /// Wires resolution and loading into `config`.
    pub fn install(self, config: Config) -> Config {
        let loader = Rc::new(self);
        let resolver = loader.clone();
        config
            .with_resolve_module(move |_, importer, name| resolver.resolve(importer, name))
            .with_load_module(move |_, name| loader.load(name))
    }
}

/// Joins a relative module name onto `base`, resolving `.` and `..`.
fn join(base: &str, name: &str) -> Option<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|part| !part.is_empty()).collect();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}
