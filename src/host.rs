//! The build host the replacer plugs into.
//!
//! [`Lifecycle`] and [`Compilation`] are what a bundler has to provide.
//! [`BuildHost`] is a minimal in-process implementation: it records taps and
//! fires them phase by phase over a module list and an artifact store.

use crate::artifact::{ArtifactStore, ModuleKind};
use crate::replacer::{PassReport, ReplaceError};
use std::fmt;

/// Lifecycle phases, in the order a build goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Each module is being built.
    BuildModule,
    /// Module sources are final but not yet merged into chunks.
    OptimizeModules,
    /// Output files have just been produced.
    OptimizeChunkAssets,
    /// Every output file optimization has run.
    AfterOptimizeChunkAssets,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::BuildModule,
        Phase::OptimizeModules,
        Phase::OptimizeChunkAssets,
        Phase::AfterOptimizeChunkAssets,
    ];

    pub fn hook_name(self) -> &'static str {
        match self {
            Phase::BuildModule => "build-module",
            Phase::OptimizeModules => "optimize-modules",
            Phase::OptimizeChunkAssets => "optimize-chunk-assets",
            Phase::AfterOptimizeChunkAssets => "after-optimize-chunk-assets",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// In-flight compilation state visible to handlers.
pub trait Compilation {
    fn modules_mut(&mut self) -> &mut [ModuleKind];

    /// Names of output files eligible for asset phases.
    fn asset_candidates(&self) -> Vec<String>;

    fn assets(&mut self) -> &mut dyn ArtifactStore;
}

pub type Handler = Box<dyn FnMut(&mut dyn Compilation) -> Result<PassReport, ReplaceError>>;

/// Registration of handlers against lifecycle phases.
pub trait Lifecycle {
    fn tap(&mut self, phase: Phase, name: &'static str, handler: Handler);
}

/// Modules and assets of one build.
#[derive(Debug)]
pub struct BuildContext<S> {
    pub modules: Vec<ModuleKind>,
    pub assets: S,
    /// Extra asset names produced outside chunk emission.
    pub additional_assets: Vec<String>,
}

impl<S: ArtifactStore> Compilation for BuildContext<S> {
    fn modules_mut(&mut self) -> &mut [ModuleKind] {
        &mut self.modules
    }

    fn asset_candidates(&self) -> Vec<String> {
        let mut names = self.assets.names();
        for extra in &self.additional_assets {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }
        names
    }

    fn assets(&mut self) -> &mut dyn ArtifactStore {
        &mut self.assets
    }
}

struct Tap {
    phase: Phase,
    name: &'static str,
    handler: Handler,
}

pub struct BuildHost<S> {
    context: BuildContext<S>,
    taps: Vec<Tap>,
}

impl<S: ArtifactStore> BuildHost<S> {
    pub fn new(assets: S) -> Self {
        Self {
            context: BuildContext {
                modules: Vec::new(),
                assets,
                additional_assets: Vec::new(),
            },
            taps: Vec::new(),
        }
    }

    pub fn with_modules(mut self, modules: Vec<ModuleKind>) -> Self {
        self.context.modules = modules;
        self
    }

    pub fn add_module(&mut self, module: ModuleKind) {
        self.context.modules.push(module);
    }

    pub fn add_additional_asset(&mut self, name: impl Into<String>) {
        self.context.additional_assets.push(name.into());
    }

    pub fn context(&self) -> &BuildContext<S> {
        &self.context
    }

    pub fn into_context(self) -> BuildContext<S> {
        self.context
    }

    pub fn tapped_phases(&self) -> Vec<Phase> {
        self.taps.iter().map(|tap| tap.phase).collect()
    }

    /// Fire every tap, phase by phase, in registration order within a phase.
    ///
    /// The first handler error aborts the build.
    pub fn run(&mut self) -> Result<Vec<PassReport>, ReplaceError> {
        let mut reports = Vec::new();
        for phase in Phase::ALL {
            for tap in self.taps.iter_mut().filter(|tap| tap.phase == phase) {
                log::debug!("running {} for {}", tap.name, phase);
                reports.push((tap.handler)(&mut self.context)?);
            }
        }
        Ok(reports)
    }
}

impl<S: ArtifactStore> Lifecycle for BuildHost<S> {
    fn tap(&mut self, phase: Phase, name: &'static str, handler: Handler) {
        self.taps.push(Tap {
            phase,
            name,
            handler,
        });
    }
}
