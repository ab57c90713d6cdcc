use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use renderer::{Backend, EngineError, GpuBackend, GpuOptions};
use shadertoy::{AssetCache, ShaderCatalog};
use tracing::{debug, info};

use super::{ContextHandle, Host, RenderRequest};
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::input::InputValue;
use crate::loader::{load_local, load_remote};

/// Prefix of the ids handed out by [`Host::create_local`].
pub const LOCAL_ID_PREFIX: &str = "localshader-";

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(0);

/// Creates the rendering backend when the host is allocated.
pub type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn Backend>, EngineError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct LocalHostOptions {
    /// Size of a remote context before its first render.
    pub width: u32,
    pub height: u32,
    /// Where GLSL units and catalog documents are written.
    pub scratch_dir: PathBuf,
    pub cache: AssetCache,
}

impl LocalHostOptions {
    pub fn new(cache: AssetCache) -> Self {
        Self {
            width: 640,
            height: 360,
            scratch_dir: std::env::temp_dir(),
            cache,
        }
    }
}

#[derive(Default)]
struct State {
    backend: Option<Arc<dyn Backend>>,
    contexts: HashMap<String, RenderContext>,
}

/// Exclusive access to the host's surface and context registry.
///
/// Every operation touching a context holds one for its whole duration.
pub struct SurfaceGuard<'a> {
    state: MutexGuard<'a, State>,
}

impl SurfaceGuard<'_> {
    pub fn is_allocated(&self) -> bool {
        self.state.backend.is_some()
    }

    /// Ids of the live contexts, sorted.
    pub fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.state.contexts.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        self.state
            .backend
            .clone()
            .ok_or_else(|| Error::Allocation("The host has not been allocated".to_string()))
    }
}

/// In-process host rendering through a [`Backend`].
pub struct LocalHost {
    options: LocalHostOptions,
    catalog: Arc<dyn ShaderCatalog>,
    factory: BackendFactory,
    state: Mutex<State>,
}

impl LocalHost {
    /// Host rendering on the default GPU adapter.
    pub fn new(catalog: Arc<dyn ShaderCatalog>, options: LocalHostOptions) -> Self {
        Self::with_backend_factory(
            catalog,
            options,
            Box::new(|| {
                let backend = GpuBackend::new(&GpuOptions::default())?;
                Ok(Arc::new(backend) as Arc<dyn Backend>)
            }),
        )
    }

    pub fn with_backend_factory(
        catalog: Arc<dyn ShaderCatalog>,
        options: LocalHostOptions,
        factory: BackendFactory,
    ) -> Self {
        Self {
            options,
            catalog,
            factory,
            state: Mutex::new(State::default()),
        }
    }

    pub fn options(&self) -> &LocalHostOptions {
        &self.options
    }

    /// Locks the surface; fails if a previous holder panicked.
    pub fn acquire(&self) -> Result<SurfaceGuard<'_>> {
        let state = self
            .state
            .lock()
            .map_err(|_| Error::Allocation("The rendering surface lock is poisoned".to_string()))?;
        Ok(SurfaceGuard { state })
    }

    /// Looks up `id`, fetching unknown non-local ids from the catalog.
    fn context_mut<'g>(
        &self,
        surface: &'g mut SurfaceGuard<'_>,
        id: &str,
    ) -> Result<&'g mut RenderContext> {
        let backend = surface.backend()?;
        if !surface.state.contexts.contains_key(id) {
            if id.starts_with(LOCAL_ID_PREFIX) {
                return Err(Error::NotFound(format!("Context {id} was not found")));
            }
            let context = self.create_remote(backend.as_ref(), id)?;
            surface.state.contexts.insert(id.to_string(), context);
        }
        surface
            .state
            .contexts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Context {id} was not found")))
    }

    fn create_remote(&self, backend: &dyn Backend, id: &str) -> Result<RenderContext> {
        let graph = load_remote(
            id,
            self.catalog.as_ref(),
            &self.options.cache,
            &self.options.scratch_dir,
        )?;
        RenderContext::new(
            id,
            graph,
            backend.create_renderer()?,
            self.options.width,
            self.options.height,
        )
    }
}

impl Host for LocalHost {
    fn allocate(&self) -> Result<()> {
        let mut surface = self.acquire()?;
        if surface.is_allocated() {
            return Ok(());
        }
        let backend = (self.factory)()
            .map_err(|err| Error::Allocation(format!("Could not initialize GPU: {err}")))?;
        surface.state.backend = Some(backend);
        info!(
            width = self.options.width,
            height = self.options.height,
            "local host allocated"
        );
        Ok(())
    }

    fn render(&self, request: &RenderRequest) -> Result<Image> {
        let mut surface = self.acquire()?;
        let context = self.context_mut(&mut surface, &request.id)?;
        let frame = request.frame.unwrap_or_else(|| context.frame_count());
        context.perform_render(
            frame,
            request.width,
            request.height,
            request.mouse,
            request.format,
        )?;
        debug!(id = %request.id, frame, "rendered frame");
        Ok(context.take_image())
    }

    fn reset(&self, id: &str) -> Result<()> {
        let mut surface = self.acquire()?;
        surface.backend()?;
        if id.starts_with(LOCAL_ID_PREFIX) {
            return Err(Error::InvalidOperation(
                "Cannot reset a local context.".to_string(),
            ));
        }
        if surface.state.contexts.remove(id).is_some() {
            info!(id, "context reset");
        }
        Ok(())
    }

    fn create_local(&self, sources: &[(String, String)]) -> Result<String> {
        let mut surface = self.acquire()?;
        let backend = surface.backend()?;
        let id = format!(
            "{LOCAL_ID_PREFIX}{}-{}",
            std::process::id(),
            NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed)
        );
        let graph = load_local(&id, sources, &self.options.scratch_dir)?;
        let context = RenderContext::new(
            id.clone(),
            graph,
            backend.create_renderer()?,
            self.options.width,
            self.options.height,
        )?;
        surface.state.contexts.insert(id.clone(), context);
        Ok(id)
    }

    fn get_context(&self, id: &str) -> Result<Box<dyn ContextHandle + '_>> {
        let mut surface = self.acquire()?;
        let context = self.context_mut(&mut surface, id)?;
        Ok(Box::new(LocalContext {
            host: self,
            id: context.id().to_string(),
        }))
    }
}

/// Handle on a context of a [`LocalHost`]; every call re-acquires the surface.
struct LocalContext<'a> {
    host: &'a LocalHost,
    id: String,
}

impl LocalContext<'_> {
    fn with_context<T>(&self, f: impl FnOnce(&mut RenderContext) -> Result<T>) -> Result<T> {
        let mut surface = self.host.acquire()?;
        f(self.host.context_mut(&mut surface, &self.id)?)
    }
}

impl ContextHandle for LocalContext<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_input(&self, buffer: &str, channel: usize, value: InputValue) -> Result<()> {
        self.with_context(|context| context.set_input(buffer, channel, value))
    }

    fn set_input_filter(&self, buffer: &str, channel: usize, min_filter: i32) -> Result<()> {
        self.with_context(|context| context.set_input_filter(buffer, channel, min_filter))
    }

    fn reset_input(&self, buffer: &str, channel: usize) -> Result<()> {
        self.with_context(|context| context.reset_input(buffer, channel))
    }
}
