//! Emission of the assembled modules as `.ir` files
//!
//! Files are only rewritten when their content changes, so downstream
//! native builds keyed on modification times stay incremental.

use crate::assemble::{Assembly, CompiledFunction, NamespaceModule};
use crate::config::PipelineConfig;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of [`write_if_changed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteStatus {
    Unchanged = 0,
    Written = 1,
}

/// Write `content` to `path` unless the file already holds exactly that.
///
/// Empty content is never written.
pub fn write_if_changed(path: &Path, content: &str) -> Result<WriteStatus> {
    if content.is_empty() {
        tracing::debug!("not writing empty {}", path.display());
        return Ok(WriteStatus::Unchanged);
    }

    match fs::read(path) {
        Ok(existing) if existing == content.as_bytes() => return Ok(WriteStatus::Unchanged),
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(Error::io(path, err)),
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| Error::io(path, e))?;
    tracing::debug!("wrote {} ({} bytes)", path.display(), content.len());
    Ok(WriteStatus::Written)
}

/// Files touched by one emission
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmitSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

impl EmitSummary {
    pub fn total(&self) -> usize {
        self.written.len() + self.unchanged.len()
    }
}

/// Renders an [`Assembly`] into the output directory
pub struct Emitter {
    output_dir: PathBuf,
    debug: bool,
}

impl Emitter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            debug: config.debug,
        }
    }

    /// Every file the assembly produces, with its content, in output order.
    ///
    /// Fails if two outputs map to the same path.
    pub fn plan(&self, assembly: &Assembly) -> Result<Vec<(PathBuf, String)>> {
        let mut files = Vec::new();
        let mut owners: HashMap<PathBuf, String> = HashMap::new();
        let mut push = |path: PathBuf, owner: String, text: String| -> Result<()> {
            if let Some(first) = owners.get(&path) {
                return Err(Error::OutputCollision {
                    path: path.display().to_string(),
                    first: first.clone(),
                    second: owner,
                });
            }
            owners.insert(path.clone(), owner);
            files.push((path, text));
            Ok(())
        };

        for module in assembly.modules.values() {
            if let Some(text) = render_namespace(module) {
                push(
                    self.path_for(&module.mangled_namespace_name, "ir"),
                    format!("globals of {}", module.namespace),
                    text,
                )?;
            }
            for function in assembly.functions_of(module) {
                let Some(ir) = function.extracted_ir.as_ref() else {
                    continue;
                };
                let description = describe(function);
                push(
                    self.path_for(&function.mangled_name, "ir"),
                    description.clone(),
                    ir.render(&description),
                )?;
                if self.debug {
                    push(
                        self.path_for(&function.mangled_name, "raw.ir"),
                        format!("raw IR of {}", description),
                        ir.raw_ir.clone(),
                    )?;
                }
            }
        }
        Ok(files)
    }

    pub fn emit(&self, assembly: &Assembly) -> Result<EmitSummary> {
        let mut summary = EmitSummary::default();
        for (path, content) in self.plan(assembly)? {
            match write_if_changed(&path, &content)? {
                WriteStatus::Written => summary.written.push(path),
                WriteStatus::Unchanged => summary.unchanged.push(path),
            }
        }
        tracing::info!(
            "emitted {} files to {} ({} changed)",
            summary.total(),
            self.output_dir.display(),
            summary.written.len()
        );
        Ok(summary)
    }

    fn path_for(&self, stem: &str, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", stem, extension))
    }
}

/// Definitions of the bindings a namespace owns; `None` if it owns none
pub fn render_namespace(module: &NamespaceModule) -> Option<String> {
    if module.global_bindings.is_empty() {
        return None;
    }
    let mut out = format!("; globals of {}\n\n", module.namespace);
    for binding in module.global_bindings.values() {
        out.push_str(&binding.ir_definition);
        out.push('\n');
    }
    Some(out)
}

fn describe(function: &CompiledFunction) -> String {
    format!(
        "{}.{}({}) as @{}",
        function.namespace,
        function.friendly_name,
        function.argument_types.join(", "),
        function.output_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::GlobalBinding;
    use crate::extract::ExtractedIR;
    use crate::host::{FlatMangler, FunctionHandle, Mangler, NamespacePath};
    use crate::runtime::Value;
    use std::collections::BTreeMap;

    fn module(ns: &str) -> NamespaceModule {
        let namespace = NamespacePath::parse(ns);
        NamespaceModule {
            mangled_namespace_name: FlatMangler.mangle_namespace(&namespace),
            namespace,
            global_bindings: BTreeMap::new(),
            functions: Vec::new(),
            container_layouts: BTreeMap::new(),
        }
    }

    fn function(name: &str, ns: &str) -> CompiledFunction {
        let namespace = NamespacePath::parse(ns);
        let mut ir = ExtractedIR::default();
        ir.function_headers.push("define void @f() {".into());
        ir.function_bodies.push("\ntop:\n  ret void\n".into());
        CompiledFunction {
            handle: FunctionHandle(0),
            friendly_name: name.to_string(),
            mangled_name: FlatMangler.mangle(name, &namespace),
            argument_types: Vec::new(),
            namespace,
            is_entry_point: false,
            overload: 0,
            extracted_ir: Some(ir),
        }
    }

    #[test]
    fn test_second_write_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.ir");
        assert_eq!(write_if_changed(&path, "x").unwrap(), WriteStatus::Written);
        assert_eq!(write_if_changed(&path, "x").unwrap(), WriteStatus::Unchanged);
        assert_eq!(write_if_changed(&path, "y").unwrap(), WriteStatus::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "y");
    }

    #[test]
    fn test_empty_content_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ir");
        assert_eq!(write_if_changed(&path, "").unwrap(), WriteStatus::Unchanged);
        assert!(!path.exists());
        assert_eq!(WriteStatus::Written as u8, 1);
    }

    #[test]
    fn test_globals_file_colliding_with_function_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default().with_output_dir(dir.path());

        let mut outer = module("Main");
        outer.functions.push(0);
        let mut inner = module("Main.A");
        let binding = GlobalBinding::new(
            0x100,
            "x",
            &inner.namespace,
            &Value::int64(1),
            &FlatMangler,
        )
        .unwrap();
        inner.global_bindings.insert(0x100, binding);

        let assembly = Assembly {
            modules: BTreeMap::from([
                (outer.namespace.clone(), outer),
                (inner.namespace.clone(), inner),
            ]),
            functions: vec![function("A", "Main")],
            diagnostics: Vec::new(),
        };

        let err = Emitter::new(&config).emit(&assembly).unwrap_err();
        match err {
            Error::OutputCollision { path, .. } => assert!(path.ends_with("Main_A.ir")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_plan_lists_function_then_raw_ir() {
        let config = PipelineConfig {
            debug: true,
            ..PipelineConfig::default()
        };
        let mut main = module("Main");
        main.functions.push(0);
        let assembly = Assembly {
            modules: BTreeMap::from([(main.namespace.clone(), main)]),
            functions: vec![function("f", "Main")],
            diagnostics: Vec::new(),
        };

        let files = Emitter::new(&config).plan(&assembly).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Main_f.ir", "Main_f.raw.ir"]);
    }
}
