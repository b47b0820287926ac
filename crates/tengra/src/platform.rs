//! Platform services: engine discovery, the diagnostic sink and the
//! process-facing capability object.
//!
//! There is no process-wide singleton. A [`Platform`] is constructed
//! once at the application root and passed (or cheaply cloned) into
//! every graph, session and tensor constructor, so "used before
//! initialized" is unrepresentable.

use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::Arc;

use libloading::Library;
use tengra_abi::{EngineApi, EntryFn, ABI_VERSION, ENTRY_SYMBOL};

use crate::error::{Error, Result};

/// Destination for binding diagnostics. A no-op sink is valid.
pub trait DiagnosticSink: Send + Sync {
    fn log(&self, message: &str);
}

/// Default sink: routes to the `tracing` infrastructure.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "tengra", "{message}");
    }
}

/// Discards all diagnostics.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn log(&self, _message: &str) {}
}

/// Which engine build to load from the library directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Cpu,
    Gpu,
}

impl Flavor {
    fn subdir(self) -> &'static str {
        match self {
            Flavor::Cpu => "cpu",
            Flavor::Gpu => "gpu",
        }
    }
}

/// Configuration for loading a dynamic engine.
pub struct EngineConfig {
    flavor: Flavor,
    dir: Option<PathBuf>,
    sink: Arc<dyn DiagnosticSink>,
}

impl EngineConfig {
    pub fn new() -> EngineConfig {
        EngineConfig {
            flavor: Flavor::Cpu,
            dir: None,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Base directory holding the `cpu`/`gpu` library subdirectories.
    /// Defaults to the running executable's directory.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// The platform-specific library path this configuration selects.
    pub fn library_path(&self) -> Result<PathBuf> {
        let base = match &self.dir {
            Some(dir) => dir.clone(),
            None => {
                let exe = std::env::current_exe().map_err(|e| Error::EngineUnavailable {
                    path: PathBuf::new(),
                    reason: format!("cannot resolve the executable directory: {e}"),
                })?;
                exe.parent().map(PathBuf::from).unwrap_or_default()
            }
        };
        let file = format!(
            "{}tengra_engine{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_SUFFIX
        );
        Ok(base.join(self.flavor.subdir()).join(file))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new()
    }
}

/// A loaded engine: the function table plus whatever keeps it alive.
pub(crate) struct Engine {
    api: *const EngineApi,
    /// Keeps a dynamically loaded engine mapped for as long as any
    /// handle derived from it exists. `None` for the in-process engine.
    _lib: Option<Library>,
    version: String,
}

// The function table is immutable and the engine contract makes its
// entry points callable from any thread.
unsafe impl Send for Engine {}
unsafe impl Sync for Engine {}

impl Engine {
    pub(crate) fn api(&self) -> &EngineApi {
        unsafe { &*self.api }
    }

    fn read_version(api: *const EngineApi) -> String {
        let ptr = unsafe { ((*api).engine_version)() };
        if ptr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
    }
}

/// The capability object behind every graph, session and tensor.
///
/// Cloning is cheap and shares the underlying engine; after
/// construction all operations are safe to use from multiple threads.
#[derive(Clone)]
pub struct Platform {
    engine: Arc<Engine>,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("engine_version", &self.engine_version())
            .finish_non_exhaustive()
    }
}

impl Platform {
    /// Binds to the in-process reference engine.
    pub fn reference() -> Platform {
        let api = tengra_engine_ref::engine_api() as *const EngineApi;
        let engine = Engine {
            api,
            _lib: None,
            version: Engine::read_version(api),
        };
        let platform = Platform {
            engine: Arc::new(engine),
            sink: Arc::new(TracingSink),
        };
        platform.log(&format!(
            "using in-process engine: {}",
            platform.engine_version()
        ));
        platform
    }

    /// Loads a dynamic engine from the platform search path.
    ///
    /// # Errors
    /// Fails with [`Error::EngineUnavailable`] when the library is
    /// missing, exports no entry point, or speaks a different ABI
    /// version. This condition is fatal by design: it is a deployment
    /// defect, distinct from every graph or session error.
    pub fn load(config: EngineConfig) -> Result<Platform> {
        let path = config.library_path()?;
        let unavailable = |reason: String| Error::EngineUnavailable {
            path: path.clone(),
            reason,
        };

        let lib = unsafe { Library::new(&path) }.map_err(|e| unavailable(e.to_string()))?;
        let entry: EntryFn = unsafe {
            lib.get::<EntryFn>(ENTRY_SYMBOL)
                .map(|symbol| *symbol)
                .map_err(|e| unavailable(e.to_string()))?
        };
        let api = unsafe { entry() };
        if api.is_null() {
            return Err(unavailable("engine returned a null function table".into()));
        }
        let abi_version = unsafe { (*api).abi_version };
        if abi_version != ABI_VERSION {
            return Err(unavailable(format!(
                "engine speaks ABI version {abi_version}, this binding needs {ABI_VERSION}"
            )));
        }

        let engine = Engine {
            api,
            _lib: Some(lib),
            version: Engine::read_version(api),
        };
        let platform = Platform {
            engine: Arc::new(engine),
            sink: config.sink,
        };
        platform.log(&format!(
            "engine {} loaded from {}",
            platform.engine_version(),
            path.display()
        ));
        Ok(platform)
    }

    /// Swaps the diagnostic sink.
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Platform {
        self.sink = Arc::new(sink);
        self
    }

    /// The engine's self-reported version string.
    pub fn engine_version(&self) -> &str {
        &self.engine.version
    }

    /// Routes a diagnostic message to the configured sink.
    pub fn log(&self, message: &str) {
        self.sink.log(message);
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_engine_reports_a_version() {
        let platform = Platform::reference();
        assert!(platform.engine_version().contains("reference"));
    }

    #[test]
    fn library_path_uses_flavor_subdir() {
        let config = EngineConfig::new().flavor(Flavor::Gpu).dir("/opt/engines");
        let path = config.library_path().unwrap();
        assert!(path.starts_with("/opt/engines/gpu"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.contains("tengra_engine"));
    }

    #[test]
    fn null_sink_swallows_messages() {
        let platform = Platform::reference().with_sink(NullSink);
        platform.log("nothing to see");
    }
}
