use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use connector::{
    Host, HostServer, InputValue, LocalHost, LocalHostOptions, RenderRequest, Session,
    IMAGE_BUFFER,
};
use shadertoy::{AssetCache, ShaderCatalog, ShadertoyClient, ShadertoyConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{CatalogArgs, Cli, Command, RenderArgs, ServeArgs};
use crate::config::Settings;
use crate::output;
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    let debug = matches!(&cli.command, Command::Serve(args) if args.debug);
    initialise_tracing(debug);

    let paths = AppPaths::discover()?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        cache = %paths.cache_dir().display(),
        "resolved stc paths"
    );

    match cli.command {
        Command::Where => {
            println!("config dir: {}", paths.config_dir().display());
            println!("cache dir:  {}", paths.cache_dir().display());
            println!("config file: {}", paths.config_file().display());
            Ok(())
        }
        Command::Serve(args) => {
            let settings = load_settings(&paths)?;
            serve(&args, &settings, &paths)
        }
        Command::Render(args) => {
            let settings = load_settings(&paths)?;
            render(&args, &settings, &paths)
        }
    }
}

fn initialise_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_settings(paths: &AppPaths) -> Result<Settings> {
    let path = paths.config_file();
    Settings::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

fn build_catalog(settings: &Settings, args: &CatalogArgs) -> Result<Arc<dyn ShaderCatalog>> {
    let key = settings.api_key(args.shadertoy_api_key.as_deref());
    let config = ShadertoyConfig::new(key)
        .and_then(|config| {
            config.with_bases(&settings.shadertoy.api_base, &settings.shadertoy.media_base)
        })
        .context("invalid Shadertoy API configuration")?;
    let client = ShadertoyClient::new(config).context("failed to construct Shadertoy client")?;
    Ok(Arc::new(client))
}

fn host_options(settings: &Settings, paths: &AppPaths) -> LocalHostOptions {
    let mut options = LocalHostOptions::new(AssetCache::new(paths.asset_cache_dir()));
    options.width = settings.host.width;
    options.height = settings.host.height;
    options.scratch_dir = settings.scratch_dir();
    options
}

fn serve(args: &ServeArgs, settings: &Settings, paths: &AppPaths) -> Result<()> {
    let catalog = build_catalog(settings, &args.catalog)?;
    let host = Arc::new(LocalHost::new(catalog, host_options(settings, paths)));
    host.allocate().context("failed to prepare the local GPU host")?;

    let bind = args.bind.as_deref().unwrap_or(&settings.server.bind);
    let poll_interval = Duration::from_millis(
        args.poll_interval_ms
            .unwrap_or(settings.server.poll_interval_ms)
            .max(1),
    );
    let server = HostServer::bind(bind, host)
        .with_context(|| format!("failed to listen on {bind}"))?
        .with_poll_interval(poll_interval);
    tracing::info!(address = %server.local_addr()?, "serving local host");
    server.serve()?;
    Ok(())
}

fn render(args: &RenderArgs, settings: &Settings, paths: &AppPaths) -> Result<()> {
    let catalog = build_catalog(settings, &args.catalog)?;
    let mut session = Session::with_defaults(catalog, host_options(settings, paths));
    let target = session.set_current(&args.target);
    let host = session
        .current()
        .with_context(|| format!("failed to allocate host {target}"))?;

    let id = match &args.source {
        Some(image_source) => create_local(host.as_ref(), args, image_source)?,
        None => args.shader.clone().unwrap_or_default(),
    };

    if !args.inputs.is_empty() || !args.filters.is_empty() {
        let context = host.get_context(&id)?;
        for (spec, path) in &args.inputs {
            let image = output::load_input_image(path)?;
            context
                .set_input(&spec.buffer, spec.channel, InputValue::Image(image))
                .with_context(|| format!("failed to set input {spec}"))?;
        }
        for (spec, filter) in &args.filters {
            context
                .set_input_filter(&spec.buffer, spec.channel, *filter)
                .with_context(|| format!("failed to set filter on {spec}"))?;
        }
    }

    let (width, height) = args
        .size
        .unwrap_or((settings.host.width, settings.host.height));
    let mut request = RenderRequest::new(id.as_str(), width, height).with_format(args.format.to_gl());
    if let Some(frame) = args.frame {
        request = request.with_frame(frame);
    }
    if let Some(mouse) = args.mouse {
        request = request.with_mouse(mouse);
    }

    let image = host
        .render(&request)
        .with_context(|| format!("failed to render {id} on {target}"))?;
    if let Some(path) = &args.output {
        output::write_png(&image, path)?;
        tracing::info!(path = %path.display(), "wrote frame");
    }
    println!("{}", output::summary(&id, &image));
    Ok(())
}

/// Buffers named on the command line come first; the image buffer is last.
fn create_local(host: &dyn Host, args: &RenderArgs, image_source: &Path) -> Result<String> {
    let mut sources = Vec::with_capacity(args.buffers.len() + 1);
    for (name, path) in &args.buffers {
        sources.push((name.clone(), read_source(path)?));
    }
    sources.push((IMAGE_BUFFER.to_string(), read_source(image_source)?));
    let id = host
        .create_local(&sources)
        .context("failed to compile local shader")?;
    tracing::info!(%id, buffers = sources.len(), "created local context");
    Ok(id)
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
