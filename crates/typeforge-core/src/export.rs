//! # Export Driver
//!
//! Orchestrates generation runs: root expansion, resolution, identifier
//! allocation, emission order and text assembly, one output unit per module.
//!
//! ## Failure isolation
//!
//! Per-type problems become [`Diagnostic`]s on the module's output and never
//! stop the run. Run-fatal errors (provider failure, allocator invariant
//! violation, cancellation) stop the module they happen in; with several
//! modules in flight the first fatal error also cancels the others.
//!
//! ## Parallelism
//!
//! [`ExportDriver::export_modules`] runs up to `jobs` module workers on scoped
//! threads. Each worker owns its resolver and registry; the only shared state
//! is the provider, reached through cloned [`ProviderHandle`]s.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{Diagnostic, ExportError, TypeforgeResult};
use crate::model::{ResolvedGraph, TypeId, TypeKey, TypeQuery};
use crate::names::{allocate, sanitize_identifier, NameTable};
use crate::provider::{ProviderHandle, SymbolProvider};
use crate::resolver::{Resolver, DEFAULT_MAX_DEPTH};
use crate::writer::{render_unit, CodeWriter, RenderContext};

/// Run-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportConfig
{
    /// Write references unqualified and declarations at the top level
    pub truncate_namespace: bool,
    /// Reference depth limit handed to the resolver
    pub max_depth: usize,
    /// Maximum number of modules processed at once
    pub jobs: usize,
}

impl Default for ExportConfig
{
    fn default() -> Self
    {
        Self {
            truncate_namespace: false,
            max_depth: DEFAULT_MAX_DEPTH,
            jobs: thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

/// One requested root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootRequest
{
    /// Exact qualified name
    Name(String),
    /// Provider offset of a type record
    Offset(u64),
    /// Glob over qualified names (`*` and `?`)
    Pattern(String),
}

impl RootRequest
{
    /// Interpret command-line text: globs become patterns, `0x...` becomes an
    /// offset, anything else is a name.
    #[must_use]
    pub fn parse(text: &str) -> Self
    {
        if text.contains(['*', '?']) {
            return RootRequest::Pattern(text.to_string());
        }
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            if let Ok(offset) = u64::from_str_radix(hex, 16) {
                return RootRequest::Offset(offset);
            }
        }
        RootRequest::Name(text.to_string())
    }
}

impl fmt::Display for RootRequest
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RootRequest::Name(name) | RootRequest::Pattern(name) => f.write_str(name),
            RootRequest::Offset(offset) => write!(f, "0x{offset:x}"),
        }
    }
}

/// Roots to export from one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest
{
    pub module: String,
    pub roots: Vec<RootRequest>,
}

impl ModuleRequest
{
    pub fn new(module: impl Into<String>, roots: Vec<RootRequest>) -> Self
    {
        Self {
            module: module.into(),
            roots,
        }
    }
}

/// Generated unit of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutput
{
    pub module: String,
    /// File name the unit is written under
    pub file_name: String,
    pub source: String,
    /// Number of declarations emitted
    pub declarations: usize,
    /// Per-type problems, sorted
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of a multi-module run.
#[derive(Debug, Clone, Default)]
pub struct RunReport
{
    /// Completed modules, in request order
    pub outputs: Vec<ModuleOutput>,
    /// Modules that were not completed because the run was cancelled
    pub cancelled: Vec<String>,
}

impl RunReport
{
    /// Every diagnostic of every completed module.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic>
    {
        self.outputs.iter().flat_map(|output| output.diagnostics.iter())
    }
}

/// Drives generation runs with one [`CodeWriter`].
pub struct ExportDriver
{
    writer: Box<dyn CodeWriter>,
    config: ExportConfig,
    cancel: CancellationToken,
}

impl fmt::Debug for ExportDriver
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ExportDriver")
            .field("style", &self.writer.style())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExportDriver
{
    pub fn new(writer: Box<dyn CodeWriter>, config: ExportConfig) -> Self
    {
        Self {
            writer,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop runs when `cancel` is triggered.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self
    {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ExportConfig
    {
        &self.config
    }

    #[must_use]
    pub fn writer(&self) -> &dyn CodeWriter
    {
        self.writer.as_ref()
    }

    /// Generate one module's unit.
    ///
    /// ## Errors
    ///
    /// - `ProviderQueryFailure` if the provider fails
    /// - `IdentifierCollisionUnresolvable` on an allocator invariant violation
    /// - `Cancelled` if cancellation was requested
    pub fn export_module(&self, provider: &mut dyn SymbolProvider, request: &ModuleRequest) -> TypeforgeResult<ModuleOutput>
    {
        self.run_module(provider, request, &self.cancel)
    }

    /// Generate several modules in parallel workers.
    ///
    /// Outputs come back in request order regardless of which worker
    /// finished first. Cancellation is not an error here: modules that did
    /// not complete are listed in [`RunReport::cancelled`].
    ///
    /// ## Errors
    ///
    /// The first run-fatal error in request order. Every other worker is
    /// cancelled as soon as it occurs.
    pub fn export_modules(&self, provider: &ProviderHandle, requests: &[ModuleRequest]) -> TypeforgeResult<RunReport>
    {
        let cancel = self.cancel.child();
        let jobs = self.config.jobs.clamp(1, requests.len().max(1));
        let next = AtomicUsize::new(0);
        info!(modules = requests.len(), jobs, "Starting export run");

        let mut results: Vec<(usize, TypeforgeResult<ModuleOutput>)> = thread::scope(|scope| {
            let workers: Vec<_> = (0..jobs)
                .map(|_| {
                    let mut handle = provider.clone();
                    let (next, cancel) = (&next, &cancel);
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(request) = requests.get(index) else {
                                break;
                            };
                            let result = self.run_module(&mut handle, request, cancel);
                            if let Err(error) = &result {
                                if !error.is_cancelled() {
                                    warn!(module = %request.module, "Fatal error, cancelling remaining modules");
                                    cancel.cancel();
                                }
                            }
                            done.push((index, result));
                        }
                        done
                    })
                })
                .collect();

            workers
                .into_iter()
                .flat_map(|worker| match worker.join() {
                    Ok(done) => done,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        });
        results.sort_by_key(|(index, _)| *index);

        let mut report = RunReport::default();
        for (index, result) in results {
            match result {
                Ok(output) => report.outputs.push(output),
                Err(error) if error.is_cancelled() => report.cancelled.push(requests[index].module.clone()),
                Err(error) => return Err(error),
            }
        }
        info!(
            completed = report.outputs.len(),
            cancelled = report.cancelled.len(),
            "Export run finished"
        );
        Ok(report)
    }

    fn run_module(
        &self,
        provider: &mut dyn SymbolProvider,
        request: &ModuleRequest,
        cancel: &CancellationToken,
    ) -> TypeforgeResult<ModuleOutput>
    {
        let module = request.module.as_str();
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled {
                module: module.to_string(),
            });
        }
        info!(module, roots = request.roots.len(), "Exporting module");

        let queries = expand_roots(provider, module, &request.roots)?;
        let mut resolver = Resolver::new(provider, module)
            .with_max_depth(self.config.max_depth)
            .with_cancellation(cancel.clone());
        resolver.resolve_roots(&queries)?;
        let graph = resolver.finish();

        let names = allocate(&graph, self.writer.reserved_words())?;
        let order = emission_order(&graph, &names);
        let ctx = RenderContext::new(&graph, &names, self.config.truncate_namespace);
        let source = render_unit(self.writer.as_ref(), &ctx, &order);

        let output = ModuleOutput {
            module: module.to_string(),
            file_name: format!("{}.{}", sanitize_identifier(module, "module"), self.writer.file_extension()),
            source,
            declarations: order.len(),
            diagnostics: graph.diagnostics().to_vec(),
        };
        info!(
            module,
            types = graph.len(),
            declarations = output.declarations,
            diagnostics = output.diagnostics.len(),
            "Module exported"
        );
        Ok(output)
    }
}

/// Turn root requests into provider queries.
///
/// Patterns are matched against the module's type names; matches are taken
/// in sorted order. Duplicates are dropped, first occurrence wins.
///
/// ## Errors
///
/// `ProviderQueryFailure` if enumerating type names fails.
pub fn expand_roots(provider: &mut dyn SymbolProvider, module: &str, roots: &[RootRequest]) -> TypeforgeResult<Vec<TypeQuery>>
{
    let mut names: Option<Vec<String>> = None;
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for root in roots {
        let expanded = match root {
            RootRequest::Name(name) => vec![TypeQuery::Name(name.clone())],
            RootRequest::Offset(offset) => vec![TypeQuery::Offset(*offset)],
            RootRequest::Pattern(pattern) => {
                let compiled = name_pattern(pattern)?;
                if names.is_none() {
                    let mut listed = provider
                        .type_names(module)
                        .map_err(|source| ExportError::ProviderQueryFailure {
                            module: module.to_string(),
                            root: pattern.clone(),
                            last_query: None,
                            source,
                        })?;
                    listed.sort();
                    names = Some(listed);
                }
                let matched: Vec<TypeQuery> = names
                    .iter()
                    .flatten()
                    .filter(|name| compiled.matches(name))
                    .map(|name| TypeQuery::Name(name.clone()))
                    .collect();
                if matched.is_empty() {
                    warn!(module, pattern = %pattern, "Root pattern matched no types");
                }
                matched
            }
        };
        for query in expanded {
            if seen.insert(query.clone()) {
                queries.push(query);
            }
        }
    }
    debug!(module, roots = queries.len(), "Expanded roots");
    Ok(queries)
}

/// Deterministic declaration order of a module.
///
/// Only named (emitted) types take part. A type comes after every emitted
/// type it holds by value, looking through arrays and other unnamed
/// wrappers. Pointers and function signatures add no ordering constraint:
/// that is where cycles are broken. Among types whose dependencies are all
/// written, the smallest canonical key goes first.
#[must_use]
pub fn emission_order(graph: &ResolvedGraph, names: &NameTable) -> Vec<TypeId>
{
    let nodes: Vec<TypeId> = graph
        .ids_by_key()
        .into_iter()
        .filter(|id| names.type_name(*id).is_some())
        .collect();

    let mut dependents: HashMap<TypeId, Vec<TypeId>> = HashMap::new();
    let mut pending: HashMap<TypeId, usize> = HashMap::new();
    for node in &nodes {
        let dependencies = emitted_dependencies(graph, names, *node);
        pending.insert(*node, dependencies.len());
        for dependency in dependencies {
            dependents.entry(dependency).or_default().push(*node);
        }
    }

    let mut ready: BTreeMap<&TypeKey, TypeId> = nodes
        .iter()
        .filter(|node| pending[*node] == 0)
        .map(|node| (graph.key(*node), *node))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some((_, node)) = ready.pop_first() {
        order.push(node);
        for dependent in dependents.get(&node).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(graph.key(*dependent), *dependent);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        // Value cycles are excluded before naming, so this only guards against
        // a broken graph; keep every declaration anyway.
        let placed: HashSet<TypeId> = order.iter().copied().collect();
        order.extend(nodes.into_iter().filter(|node| !placed.contains(node)));
    }
    order
}

/// Emitted types `id` holds by value, seen through unnamed wrappers.
fn emitted_dependencies(graph: &ResolvedGraph, names: &NameTable, id: TypeId) -> Vec<TypeId>
{
    let mut found = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<TypeId> = graph.get(id).value_dependencies().into_iter().collect();
    while let Some(current) = stack.pop() {
        if current == id || !visited.insert(current) {
            continue;
        }
        if names.type_name(current).is_some() {
            found.push(current);
        } else {
            stack.extend(graph.get(current).value_dependencies());
        }
    }
    found.sort();
    found.dedup();
    found
}

/// Write every output unit of a report into `dir`.
///
/// ## Errors
///
/// `Io` if the directory cannot be created or a file cannot be written.
pub fn write_outputs(report: &RunReport, dir: &Path) -> TypeforgeResult<Vec<PathBuf>>
{
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(report.outputs.len());
    for output in &report.outputs {
        let path = dir.join(&output.file_name);
        fs::write(&path, &output.source)?;
        debug!(path = %path.display(), "Wrote module output");
        written.push(path);
    }
    Ok(written)
}

/// Compile a root or filter pattern over qualified type names.
///
/// Only `*` and `?` are wildcards. Everything else, including the `[`/`]` of
/// array and operator names, matches literally.
///
/// ## Errors
///
/// `InvalidArgument` if the wildcards do not form a valid glob (`a**b`).
pub fn name_pattern(pattern: &str) -> TypeforgeResult<glob::Pattern>
{
    let mut escaped = String::with_capacity(pattern.len());
    let mut literal = String::new();
    for ch in pattern.chars() {
        if ch == '*' || ch == '?' {
            escaped.push_str(&glob::Pattern::escape(&literal));
            literal.clear();
            escaped.push(ch);
        } else {
            literal.push(ch);
        }
    }
    escaped.push_str(&glob::Pattern::escape(&literal));
    glob::Pattern::new(&escaped)
        .map_err(|err| ExportError::InvalidArgument(format!("invalid type pattern `{pattern}`: {err}")))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::provider::{FieldShape, InMemoryProvider};
    use crate::writer::WriterStyle;

    #[test]
    fn test_name_pattern()
    {
        let matches = |pattern: &str, text: &str| name_pattern(pattern).unwrap().matches(text);
        assert!(matches("*", "anything"));
        assert!(matches("ns::*", "ns::Node"));
        assert!(!matches("ns::*", "other::Node"));
        assert!(matches("No?e", "Node"));
        assert!(matches("*Node*", "ns::NodeList"));
        assert!(!matches("Node", "Nodes"));
        assert!(matches("a*b*c", "aXXbYYc"));
        assert!(!matches("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_name_pattern_brackets_are_literal()
    {
        let pattern = name_pattern("Grid*::operator[]").unwrap();
        assert!(pattern.matches("Grid<int>::operator[]"));
        assert!(!pattern.matches("Grid<int>::operator"));
        assert!(name_pattern("Table[4]*").unwrap().matches("Table[4]_t"));
        assert!(!name_pattern("Table[4]*").unwrap().matches("Table4_t"));
    }

    #[test]
    fn test_name_pattern_rejects_malformed_wildcards()
    {
        let err = name_pattern("ns::a**b").unwrap_err();
        assert!(matches!(err, ExportError::InvalidArgument(ref message) if message.contains("ns::a**b")));
    }

    #[test]
    fn test_root_request_parse()
    {
        assert_eq!(RootRequest::parse("ns::*"), RootRequest::Pattern("ns::*".into()));
        assert_eq!(RootRequest::parse("0x2a"), RootRequest::Offset(0x2a));
        assert_eq!(RootRequest::parse("Node"), RootRequest::Name("Node".into()));
        assert_eq!(RootRequest::parse("0xnothex"), RootRequest::Name("0xnothex".into()));
    }

    #[test]
    fn test_expand_roots_dedups_in_order()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "ns::B", 1, Vec::new())
            .with_struct("app", "ns::A", 1, Vec::new())
            .with_struct("app", "Other", 1, Vec::new());
        let roots = vec![
            RootRequest::Name("ns::B".into()),
            RootRequest::Pattern("ns::*".into()),
            RootRequest::Offset(7),
        ];
        let queries = expand_roots(&mut provider, "app", &roots).unwrap();
        assert_eq!(
            queries,
            vec![TypeQuery::name("ns::B"), TypeQuery::name("ns::A"), TypeQuery::Offset(7)]
        );
    }

    #[test]
    fn test_expand_roots_rejects_bad_pattern()
    {
        let mut provider = InMemoryProvider::new().with_struct("app", "Grid", 1, Vec::new());
        let roots = vec![RootRequest::Pattern("G***".into())];
        let err = expand_roots(&mut provider, "app", &roots).unwrap_err();
        assert!(matches!(err, ExportError::InvalidArgument(_)));
        assert_eq!(provider.query_count(), 0);
    }

    #[test]
    fn test_dependencies_are_emitted_first()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "A_Outer", 8, vec![FieldShape::new("inner", "Z_Inner", 0)])
            .with_struct("app", "Z_Inner", 8, vec![FieldShape::new("back", "A_Outer*", 0)]);
        let driver = ExportDriver::new(WriterStyle::Rust.writer(), ExportConfig::default());
        let request = ModuleRequest::new("app", vec![RootRequest::Name("A_Outer".into())]);
        let output = driver.export_module(&mut provider, &request).unwrap();

        let inner = output.source.find("pub struct Z_Inner").unwrap();
        let outer = output.source.find("pub struct A_Outer").unwrap();
        assert!(inner < outer);
        assert_eq!(output.declarations, 2);
        assert_eq!(output.file_name, "app.rs");
    }
}
