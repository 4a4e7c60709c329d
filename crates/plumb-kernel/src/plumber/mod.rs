//! Pipeline builder: wires pipes and external programs into chains.
//!
//! ```text
//!   plumb(a, "sed -u s/x/y/", b, c)
//!
//!   [pipe a] ──reader──▶ feed ──▶ sed ──▶ drain ──writer──▶ [pipe b] ──▶ forward ──▶ [pipe c]
//! ```
//!
//! Every endpoint is classified once. Pipes are created on first reference
//! and each link attaches one reader to its source and one writer to its
//! destination, so plumbing an existing pipe again branches the topology.
//! Links run as tasks owned by a [`Pipeline`] record; tearing a pipeline
//! down cancels its token and waits for the tasks, which releases every
//! attachment it held.

mod classify;
mod stage;

pub use classify::{Endpoint, PathResolver, SearchPath, classify, resolve_in_path};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::process::ChildStdout;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use plumb_types::{PlumbError, PlumbResult};

use crate::namespace;
use crate::pipe::{PipeReader, PipeWriter};
use crate::registry::Registry;

/// One `plumb` call's worth of running links.
struct Pipeline {
    id: u64,
    /// Namespace of the caller that created it.
    namespace: String,
    endpoints: Vec<Endpoint>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    fn pipes(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().filter_map(Endpoint::pipe_name)
    }

    fn touches(&self, ns: &str) -> bool {
        self.namespace == ns || self.pipes().any(|name| namespace::in_namespace(ns, name))
    }

    fn describe(&self) -> String {
        describe(&self.endpoints)
    }

    async fn teardown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(pipeline = self.id, "pipeline task failed: {e}");
            }
        }
        tracing::info!(pipeline = self.id, "pipeline torn down");
    }
}

fn describe(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Input side of a program stage.
enum Input {
    Pipe(PipeReader),
    Program(ChildStdout),
}

/// Builds and tears down pipelines over a [`Registry`].
pub struct Plumber {
    registry: Registry,
    resolver: Arc<dyn PathResolver>,
    pipelines: Mutex<Vec<Pipeline>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Plumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plumber")
            .field("registry", &self.registry)
            .field("pipelines", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl Plumber {
    /// Plumber resolving programs against `PATH`.
    pub fn new(registry: Registry) -> Self {
        Self::with_resolver(registry, Arc::new(SearchPath::from_env()))
    }

    pub fn with_resolver(registry: Registry, resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            registry,
            resolver,
            pipelines: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Pipeline>> {
        self.pipelines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify a raw endpoint in `ns` with this plumber's resolver.
    pub fn classify(&self, ns: &str, raw: &str) -> Endpoint {
        classify(ns, raw, self.resolver.as_ref())
    }

    /// Wire `endpoints` into a chain.
    ///
    /// Must be called from within a Tokio runtime. Programs that fail to
    /// start are logged and leave a gap in the chain; the call still
    /// succeeds.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub fn plumb(&self, ns: &str, endpoints: &[String]) -> PlumbResult<()> {
        if endpoints.len() < 2 {
            return Err(PlumbError::invalid("plumb requires at least two endpoints"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PlumbError::Spawn("plumb requires an async runtime".into()))?;

        let endpoints: Vec<Endpoint> = endpoints.iter().map(|raw| self.classify(ns, raw)).collect();
        let last = endpoints.len() - 1;

        // Attach in name order, one pipe lock at a time.
        let mut wanted: Vec<(&str, usize)> = endpoints
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.pipe_name().map(|name| (name, i)))
            .collect();
        wanted.sort_unstable();

        let mut readers: HashMap<usize, PipeReader> = HashMap::new();
        let mut writers: HashMap<usize, PipeWriter> = HashMap::new();
        for (name, i) in wanted {
            let pipe = self.registry.get_or_create(name);
            if i > 0 {
                writers.insert(i, pipe.attach_writer()?);
            }
            if i < last {
                readers.insert(i, pipe.attach_reader()?);
            }
        }

        let cancel = CancellationToken::new();
        let max_line = self.registry.settings().max_line;
        let mut tasks = Vec::new();
        let mut upstream: Option<ChildStdout> = None;

        for (i, endpoint) in endpoints.iter().enumerate() {
            let next_is_program = i < last && endpoints[i + 1].is_program();

            let Endpoint::Program { path, argv } = endpoint else {
                if i < last && !next_is_program
                    && let (Some(reader), Some(writer)) = (readers.remove(&i), writers.remove(&(i + 1)))
                {
                    tasks.push(runtime.spawn(stage::forward(reader, writer, cancel.clone())));
                }
                continue;
            };

            let program = endpoint.to_string();
            let input = match i {
                0 => None,
                _ if endpoints[i - 1].is_program() => upstream.take().map(Input::Program),
                _ => readers.remove(&(i - 1)).map(Input::Pipe),
            };

            let mut child = match stage::spawn_program(path, argv, input.is_some(), i < last) {
                Ok(child) => child,
                Err(e) => {
                    tracing::warn!(%program, "stage failed to start: {e}");
                    continue;
                }
            };
            tracing::debug!(%program, pid = child.id(), "stage started");

            let stage_token = cancel.child_token();

            match (input, child.stdin.take()) {
                (Some(Input::Pipe(reader)), Some(stdin)) => {
                    tasks.push(runtime.spawn(stage::feed(
                        reader,
                        stdin,
                        stage_token.clone(),
                        program.clone(),
                    )));
                }
                (Some(Input::Program(stdout)), Some(stdin)) => {
                    tasks.push(runtime.spawn(stage::link(stdout, stdin, cancel.clone())));
                }
                _ => {}
            }

            if let Some(stdout) = child.stdout.take() {
                if next_is_program {
                    upstream = Some(stdout);
                } else if let Some(writer) = writers.remove(&(i + 1)) {
                    tasks.push(runtime.spawn(stage::drain(
                        stdout,
                        writer,
                        cancel.clone(),
                        stage_token.clone(),
                        max_line,
                        program.clone(),
                    )));
                }
            }

            if let Some(stderr) = child.stderr.take() {
                tasks.push(runtime.spawn(stage::log_stderr(stderr, program.clone())));
            }

            tasks.push(runtime.spawn(stage::supervise(child, stage_token, program)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(pipeline = id, chain = %describe(&endpoints), "pipeline created");
        self.lock().push(Pipeline {
            id,
            namespace: ns.to_string(),
            endpoints,
            cancel,
            tasks,
        });
        Ok(())
    }

    /// One line per connected topology across every namespace.
    pub fn pipelines(&self) -> Vec<String> {
        self.describe_where(|_| true)
    }

    /// Topologies that involve namespace `ns`.
    pub fn pipelines_in(&self, ns: &str) -> Vec<String> {
        self.describe_where(|p| p.touches(ns))
    }

    fn describe_where(&self, keep: impl Fn(&Pipeline) -> bool) -> Vec<String> {
        let mut pipelines = self.lock();
        pipelines.retain(|p| !p.is_finished());

        components(&pipelines)
            .into_iter()
            .filter(|group| group.iter().any(|&i| keep(&pipelines[i])))
            .map(|group| {
                group
                    .iter()
                    .map(|&i| pipelines[i].describe())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .collect()
    }

    /// Tear down pipelines matching `names` and delete named pipes left
    /// without attachments.
    ///
    /// A pipeline whose endpoint list equals `names` is removed alone.
    /// Otherwise every pipeline touching one of the named pipes goes.
    /// Every name is attempted; the first error is returned.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn pipeline_delete(&self, ns: &str, names: &[String]) -> PlumbResult<()> {
        if names.is_empty() {
            return Err(PlumbError::invalid("no pipeline given"));
        }

        let wanted: Vec<Endpoint> = names.iter().map(|raw| self.classify(ns, raw)).collect();
        let pipes: BTreeSet<&str> = wanted.iter().filter_map(Endpoint::pipe_name).collect();

        let matched: Vec<Pipeline> = {
            let mut pipelines = self.lock();
            pipelines.retain(|p| !p.is_finished());
            let exact = pipelines.iter().any(|p| p.endpoints == wanted);
            let (matched, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *pipelines).into_iter().partition(|p| {
                if exact {
                    p.endpoints == wanted
                } else {
                    p.pipes().any(|name| pipes.contains(name))
                }
            });
            *pipelines = kept;
            matched
        };

        let found = !matched.is_empty();
        let torn_down: BTreeSet<String> = matched
            .iter()
            .flat_map(|p| p.pipes())
            .map(str::to_string)
            .collect();
        for pipeline in matched {
            pipeline.teardown().await;
        }

        if !found && pipes.is_empty() {
            return Err(PlumbError::NotFound(names.join(" ")));
        }

        let mut first_err = None;
        for name in pipes {
            if self.registry.contains(name) {
                if !self.registry.delete_if_unattached(name) {
                    tracing::debug!(pipe = name, "pipe still attached, kept");
                }
            } else if !torn_down.contains(name) {
                first_err.get_or_insert(PlumbError::NotFound(name.to_string()));
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Tear down every pipeline and delete every pipe.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn pipeline_delete_all(&self) {
        let all = std::mem::take(&mut *self.lock());
        for pipeline in all {
            pipeline.teardown().await;
        }
        self.registry.delete_all();
    }

    /// Tear down pipelines involving `ns` and delete the namespace's pipes.
    ///
    /// Returns the number of pipes deleted.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn pipeline_delete_namespace(&self, ns: &str) -> usize {
        let matched: Vec<Pipeline> = {
            let mut pipelines = self.lock();
            let (matched, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *pipelines)
                .into_iter()
                .partition(|p| p.touches(ns));
            *pipelines = kept;
            matched
        };
        for pipeline in matched {
            pipeline.teardown().await;
        }
        self.registry.delete_namespace(ns)
    }
}

/// Group pipelines that share a pipe. Groups and members keep creation order.
fn components(pipelines: &[Pipeline]) -> Vec<Vec<usize>> {
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..pipelines.len()).collect();
    let mut owner: HashMap<&str, usize> = HashMap::new();

    for (i, pipeline) in pipelines.iter().enumerate() {
        for name in pipeline.pipes() {
            match owner.get(name) {
                Some(&j) => {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(name, i);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..pipelines.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}
