//! # Pipeline
//!
//! Drives one batch run:
//!
//! ```text
//! collect_bindings ─┐
//! collect_call_graph ┴▶ per function: emit_ir → extract → gc → container → verdict
//!                                                   ▼
//!                                  Assembler::assemble → Emitter::emit
//! ```
//!
//! Any fatal error aborts before the first file is written. Soft findings are
//! collected in the [`RunReport`].

use crate::assemble::{Assembler, Assembly, CompiledFunction, FunctionPreparer};
use crate::collect::{collect_bindings, collect_call_graph};
use crate::config::PipelineConfig;
use crate::emit::{EmitSummary, Emitter};
use crate::extract::{extract, ExtractedIR};
use crate::host::{FunctionHandle, HostCompiler, Mangler, Namespace};
use crate::passes::{ContainerPass, ContainerStats, GcPass, GcStats};
use crate::runtime::RuntimeIntrospection;
use crate::{Error, Result};

/// Summary of a run
#[derive(Debug, Default)]
pub struct RunReport {
    pub functions: usize,
    pub modules: usize,
    pub bindings: usize,
    pub gc: GcStats,
    pub containers: ContainerStats,
    pub emitted: EmitSummary,
    /// Soft findings; any of them makes the run fail its exit code
    pub diagnostics: Vec<Error>,
}

impl RunReport {
    /// Process exit code for the run
    pub fn exit_code(&self) -> i32 {
        if self.diagnostics.is_empty() {
            0
        } else {
            1
        }
    }
}

/// A configured pipeline
pub struct Pipeline<'a> {
    config: PipelineConfig,
    mangler: &'a dyn Mangler,
    runtime: &'a dyn RuntimeIntrospection,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        mangler: &'a dyn Mangler,
        runtime: &'a dyn RuntimeIntrospection,
    ) -> Self {
        Self {
            config,
            mangler,
            runtime,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Everything up to, but not including, writing files
    pub fn assemble(
        &self,
        host: &mut dyn HostCompiler,
        root: &Namespace,
        entry: FunctionHandle,
    ) -> Result<(Assembly, RunReport)> {
        let mut report = RunReport::default();

        let scan = collect_bindings(root, self.mangler);
        if let Some(err) = scan.rejected.first() {
            if !self.config.skip_unsupported_bindings {
                return Err(err.clone());
            }
            for err in &scan.rejected {
                tracing::warn!("skipping binding: {}", err);
            }
        }

        let graph = collect_call_graph(host, entry, self.mangler)?;
        let functions: Vec<CompiledFunction> = graph
            .iter()
            .map(|e| CompiledFunction::from_entry(e, e.handle == entry))
            .collect();

        let mut preparer = Preparer {
            host: &*host,
            gc: GcPass::new(self.config.policy),
            containers: ContainerPass::new(self.runtime),
            gc_stats: GcStats::default(),
            container_stats: ContainerStats::default(),
            diagnostics: Vec::new(),
        };
        let mut assembler = Assembler::new(self.mangler, self.runtime);
        let assembly = assembler.assemble(functions, scan.bindings, &mut preparer)?;

        report.functions = assembly.functions.len();
        report.modules = assembly.modules.len();
        report.bindings = assembly
            .modules
            .values()
            .map(|m| m.global_bindings.len())
            .sum();
        report.gc = preparer.gc_stats;
        report.containers = preparer.container_stats;
        report.diagnostics = preparer.diagnostics;
        report.diagnostics.extend(assembly.diagnostics.iter().cloned());

        Ok((assembly, report))
    }

    /// Full run: assemble, then write the output files
    pub fn run(
        &self,
        host: &mut dyn HostCompiler,
        root: &Namespace,
        entry: FunctionHandle,
    ) -> Result<RunReport> {
        let (assembly, mut report) = self.assemble(host, root, entry)?;
        report.emitted = Emitter::new(&self.config).emit(&assembly)?;

        tracing::info!(
            "{} functions in {} modules, {} bindings, {} diagnostics",
            report.functions,
            report.modules,
            report.bindings,
            report.diagnostics.len()
        );
        Ok(report)
    }
}

struct Preparer<'p> {
    host: &'p dyn HostCompiler,
    gc: GcPass,
    containers: ContainerPass<'p>,
    gc_stats: GcStats,
    container_stats: ContainerStats,
    diagnostics: Vec<Error>,
}

impl FunctionPreparer for Preparer<'_> {
    fn prepare(&mut self, function: &CompiledFunction) -> Result<ExtractedIR> {
        let raw = self.host.emit_ir(function.handle)?;
        let mut ir = extract(&function.target(), &raw)?;
        let name = function.friendly_name.as_str();

        let gc = self.gc.run(name, &mut ir);
        self.gc_stats.removed_lines += gc.removed_lines;
        self.gc_stats.substituted_allocations += gc.substituted_allocations;

        let containers = self.containers.run(name, function.output_name(), &mut ir)?;
        self.container_stats.dereferences += containers.dereferences;
        self.container_stats.allocations += containers.allocations;
        self.container_stats.markers += containers.markers;

        if let Some(diagnostic) = self.gc.verdict(name, &ir)? {
            self.diagnostics.push(diagnostic);
        }
        Ok(ir)
    }
}
