use std::collections::BTreeMap;
use std::sync::Arc;

use shadertoy::ShaderCatalog;
use tracing::info;

use crate::error::Result;
use crate::host::{Host, LocalHost, LocalHostOptions};
use crate::net::{NetHost, DEFAULT_PORT};

/// Target naming the in-process GPU host.
pub const LOCAL_TARGET: &str = "local";

/// Builds the host for a normalized target.
pub type HostFactory = Box<dyn Fn(&str) -> Result<Arc<dyn Host>> + Send + Sync>;

/// Named hosts, one of which is current.
///
/// Hosts are created and allocated on first use and reused afterwards.
pub struct Session {
    factory: HostFactory,
    hosts: BTreeMap<String, Arc<dyn Host>>,
    current: String,
}

impl Session {
    pub fn new(factory: HostFactory) -> Self {
        Self {
            factory,
            hosts: BTreeMap::new(),
            current: LOCAL_TARGET.to_string(),
        }
    }

    /// `local` renders in-process with `options`; any other target is a
    /// remote `stc serve` instance.
    pub fn with_defaults(catalog: Arc<dyn ShaderCatalog>, options: LocalHostOptions) -> Self {
        Self::new(Box::new(move |target| {
            let host: Arc<dyn Host> = if target == LOCAL_TARGET {
                Arc::new(LocalHost::new(catalog.clone(), options.clone()))
            } else {
                Arc::new(NetHost::new(target))
            };
            Ok(host)
        }))
    }

    pub fn current_target(&self) -> &str {
        &self.current
    }

    /// Switches to `target` and returns its normalized name.
    pub fn set_current(&mut self, target: &str) -> String {
        self.current = normalize_target(target);
        info!(target_host = %self.current, "current host changed");
        self.current.clone()
    }

    /// The current host, allocated.
    ///
    /// A host whose allocation failed is not kept, so the next call retries.
    pub fn current(&mut self) -> Result<Arc<dyn Host>> {
        if let Some(host) = self.hosts.get(&self.current) {
            return Ok(host.clone());
        }
        let host = (self.factory)(&self.current)?;
        host.allocate()?;
        self.hosts.insert(self.current.clone(), host.clone());
        Ok(host)
    }

    /// Targets whose host has been instantiated.
    pub fn targets(&self) -> Vec<&str> {
        self.hosts.keys().map(String::as_str).collect()
    }
}

/// `local` stays as is; other targets get a `ws://` scheme and the default
/// port when they lack them.
pub fn normalize_target(target: &str) -> String {
    let target = target.trim();
    if target == LOCAL_TARGET {
        return target.to_string();
    }
    let mut url = if target.contains("://") {
        target.to_string()
    } else {
        format!("ws://{target}")
    };
    let authority_start = url.find("://").map_or(0, |index| index + 3);
    let authority_end = url[authority_start..]
        .find('/')
        .map_or(url.len(), |index| authority_start + index);
    if !url[authority_start..authority_end].contains(':') {
        url.insert_str(authority_end, &format!(":{DEFAULT_PORT}"));
    }
    url
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;
    use crate::host::{ContextHandle, RenderRequest};
    use crate::image::Image;

    /// Host whose allocation fails a configurable number of times.
    struct CountingHost {
        allocations: Arc<AtomicUsize>,
        failures_left: Mutex<usize>,
    }

    impl Host for CountingHost {
        fn allocate(&self) -> Result<()> {
            self.allocations.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Allocation("no surface".into()));
            }
            Ok(())
        }

        fn render(&self, _request: &RenderRequest) -> Result<Image> {
            Image::new([1, 1, 4])
        }

        fn reset(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        fn create_local(&self, _sources: &[(String, String)]) -> Result<String> {
            Ok("localshader-0-0".into())
        }

        fn get_context(&self, id: &str) -> Result<Box<dyn ContextHandle + '_>> {
            Err(Error::NotFound(id.to_string()))
        }
    }

    fn session(failures: usize) -> (Session, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let allocations = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(Mutex::new(Vec::new()));
        let (counter, log) = (allocations.clone(), created.clone());
        let failures = Arc::new(Mutex::new(failures));
        let session = Session::new(Box::new(move |target| {
            log.lock().unwrap().push(target.to_string());
            let mut remaining = failures.lock().unwrap();
            let failures_left = std::mem::take(&mut *remaining);
            Ok(Arc::new(CountingHost {
                allocations: counter.clone(),
                failures_left: Mutex::new(failures_left),
            }) as Arc<dyn Host>)
        }));
        (session, allocations, created)
    }

    #[test]
    fn normalizes_targets() {
        assert_eq!(normalize_target("local"), "local");
        assert_eq!(normalize_target("render-box"), "ws://render-box:13710");
        assert_eq!(normalize_target("10.0.0.2:9000"), "ws://10.0.0.2:9000");
        assert_eq!(normalize_target("ws://gpu"), "ws://gpu:13710");
        assert_eq!(normalize_target("ws://gpu/api"), "ws://gpu:13710/api");
        assert_eq!(normalize_target(" wss://gpu:443 "), "wss://gpu:443");
    }

    #[test]
    fn hosts_are_created_and_allocated_once() {
        let (mut session, allocations, created) = session(0);
        assert_eq!(session.current_target(), LOCAL_TARGET);
        session.current().unwrap();
        session.current().unwrap();

        assert_eq!(session.set_current("gpu"), "ws://gpu:13710");
        session.current().unwrap();
        session.set_current("local");
        session.current().unwrap();

        assert_eq!(allocations.load(Ordering::SeqCst), 2);
        assert_eq!(*created.lock().unwrap(), ["local", "ws://gpu:13710"]);
        assert_eq!(session.targets(), ["local", "ws://gpu:13710"]);
    }

    #[test]
    fn failed_allocation_is_retried() {
        let (mut session, allocations, created) = session(1);
        assert!(matches!(session.current(), Err(Error::Allocation(_))));
        assert!(session.targets().is_empty());

        session.current().unwrap();
        assert_eq!(allocations.load(Ordering::SeqCst), 2);
        assert_eq!(created.lock().unwrap().len(), 2);
    }
}
