//! Transitive reference resolution.
//!
//! [`Resolver::resolve`] turns the manifest's declarations into a
//! [`DependencyGraph`] by breadth-first expansion, one level at a time:
//!
//! 1. Level 0 holds one request per declaration, parented by the root.
//! 2. Every request becomes an edge. Requests are keyed by `(name, selector)`; a key
//!    already resolved in this pass, or already scheduled in this level, is not
//!    fetched again, which also makes cyclic relationships terminate.
//! 3. Headers of the scheduled keys are fetched concurrently (at most `max_parallel`
//!    in flight) and consumed in request order. The first failure aborts the pass and
//!    drops the remaining fetches.
//! 4. Each header yields a candidate reference and the next level's requests, one per
//!    sub-dependency, sorted by name.
//!
//! When one name resolves to several refs, exactly one wins: a declaration of the
//! manifest beats a transitive request, and among equals the highest ref by
//! [`compare_refs`] wins. Only requests reachable from the root through winners compete,
//! so a request made inside a losing sub-tree can neither win nor show up in a
//! [`Conflict`]. The final graph only holds winners and their live requests.
//!
//! The outcome depends only on the declarations and the headers, never on the order in
//! which concurrent fetches complete.

pub mod dependency_graph;

pub use dependency_graph::{Conflict, ConflictCandidate, DependencyGraph, Edge, GraphNode};

use crate::constants::{DEFAULT_ARTIFACT_DIR, default_parallelism};
use crate::core::ResolutionError;
use crate::manifest::{Declaration, ResolvedReference};
use crate::source::ArtifactSource;
use crate::version::compare_refs;
use futures::{StreamExt, TryStreamExt, stream};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

type RequestKey = (String, Option<String>);

/// Tuning for a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Maximum concurrent header fetches
    pub max_parallel: usize,
    /// Project-relative directory artifacts are installed under
    pub artifact_dir: String,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_parallel: default_parallelism(),
            artifact_dir: DEFAULT_ARTIFACT_DIR.to_string(),
        }
    }
}

/// A request for `name` at `requested`, as seen while walking the graph.
#[derive(Debug, Clone)]
struct Request {
    parent: GraphNode,
    parent_ref: Option<String>,
    name: String,
    requested: Option<String>,
    /// Names from the first declaration down to `name`
    path: Vec<String>,
}

impl Request {
    fn key(&self) -> RequestKey {
        (self.name.clone(), self.requested.clone())
    }

    const fn from_root(&self) -> bool {
        matches!(self.parent, GraphNode::Root)
    }
}

/// Resolves declarations against an [`ArtifactSource`].
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::manifest::{Declaration, SaveKind};
/// use tdpm_cli::resolver::{Resolver, ResolverOptions};
/// use tdpm_cli::source::ArtifactSource;
///
/// # async fn example(source: impl ArtifactSource) -> anyhow::Result<()> {
/// let resolver = Resolver::new(&source, ResolverOptions::default());
/// let graph = resolver
///     .resolve(&[Declaration::new("a", Some("1.0"), SaveKind::Runtime)])
///     .await?;
/// for reference in graph.references() {
///     println!("{}@{}", reference.name, reference.resolved_ref);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Resolver<'a, S> {
    source: &'a S,
    options: ResolverOptions,
}

impl<'a, S: ArtifactSource> Resolver<'a, S> {
    /// Creates a resolver reading headers from `source`.
    pub const fn new(source: &'a S, options: ResolverOptions) -> Self {
        Self {
            source,
            options,
        }
    }

    /// Resolves `declarations` and all their transitive dependencies.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] naming the failed node and its path from the root if
    /// any header fetch fails. No partial graph is returned.
    pub async fn resolve(
        &self,
        declarations: &[Declaration],
    ) -> Result<DependencyGraph, ResolutionError> {
        let mut requests: Vec<Request> = Vec::new();
        let mut candidates: HashMap<RequestKey, ResolvedReference> = HashMap::new();

        let mut level: Vec<Request> = declarations
            .iter()
            .map(|declaration| Request {
                parent: GraphNode::Root,
                parent_ref: None,
                name: declaration.name.clone(),
                requested: declaration.reference.clone(),
                path: vec![declaration.name.clone()],
            })
            .collect();
        let mut depth = 0usize;

        while !level.is_empty() {
            let mut scheduled: Vec<(RequestKey, Vec<String>)> = Vec::new();
            let mut scheduled_keys: HashSet<RequestKey> = HashSet::new();
            for request in &level {
                let key = request.key();
                if !candidates.contains_key(&key) && scheduled_keys.insert(key.clone()) {
                    scheduled.push((key, request.path.clone()));
                }
            }
            debug!(
                depth,
                requests = level.len(),
                fetches = scheduled.len(),
                "Resolving dependency level"
            );
            requests.append(&mut level);

            let source = self.source;
            let fetches = scheduled.iter().map(|((name, selector), path)| async move {
                source
                    .header(name, selector.as_deref())
                    .await
                    .map_err(|cause| ResolutionError::new(path.clone(), cause))
            });
            let headers: Vec<_> = stream::iter(fetches)
                .buffered(self.options.max_parallel.max(1))
                .try_collect()
                .await?;

            for ((key, path), header) in scheduled.into_iter().zip(headers) {
                let name = key.0.clone();
                let reference = ResolvedReference {
                    path: format!("{}/{name}/{}", self.options.artifact_dir, header.main),
                    name: name.clone(),
                    resolved_ref: header.resolved_ref,
                    url: header.url,
                    checksum: None,
                };
                debug!(%name, resolved = %reference.resolved_ref, "Resolved");

                for (child, requested) in &header.dependencies {
                    let mut child_path = path.clone();
                    child_path.push(child.clone());
                    level.push(Request {
                        parent: GraphNode::Package(name.clone()),
                        parent_ref: Some(reference.resolved_ref.clone()),
                        name: child.clone(),
                        requested: requested.clone(),
                        path: child_path,
                    });
                }
                candidates.insert(key, reference);
            }
            depth += 1;
        }

        Ok(build_graph(&requests, &candidates))
    }
}

/// Picks winners, prunes losing sub-trees and assembles the graph.
///
/// Only live requests compete: those made by the root, or by the winning ref of a name
/// that is itself reached from the root. Winners and the live set depend on each other,
/// so both are recomputed until the winners stop changing.
fn build_graph(
    requests: &[Request],
    candidates: &HashMap<RequestKey, ResolvedReference>,
) -> DependencyGraph {
    let resolved_ref = |request: &Request| candidate_ref(candidates, request);

    let mut winners: BTreeMap<&str, usize> = BTreeMap::new();
    let mut live = live_requests(requests, &winners, candidates);
    let mut seen: HashSet<BTreeMap<&str, usize>> = HashSet::new();
    loop {
        let next = pick_winners(requests, &live, candidates);
        if next == winners {
            break;
        }
        if !seen.insert(next.clone()) {
            warn!("Conflict resolution did not settle; keeping the last assignment");
            winners = next;
            live = live_requests(requests, &winners, candidates);
            break;
        }
        winners = next;
        live = live_requests(requests, &winners, candidates);
    }

    let reached: HashSet<&str> = live.iter().map(|&i| requests[i].name.as_str()).collect();
    let mut graph = DependencyGraph::new();
    for (&name, &index) in &winners {
        if reached.contains(name)
            && let Some(reference) = candidates.get(&requests[index].key())
        {
            graph.insert_reference(reference.clone());
        }
    }
    for &index in &live {
        let request = &requests[index];
        graph.add_edge(
            request.parent.clone(),
            &request.name,
            request.requested.clone(),
            request.parent_ref.clone(),
        );
    }

    for (&name, &winner) in &winners {
        if !reached.contains(name) {
            continue;
        }
        let mut listed: Vec<ConflictCandidate> = Vec::new();
        for request in live.iter().map(|&i| &requests[i]).filter(|r| r.name == name) {
            let Some(resolved) = resolved_ref(request) else {
                continue;
            };
            let candidate = ConflictCandidate {
                parent: request.parent.clone(),
                requested: request.requested.clone(),
                resolved: resolved.to_string(),
            };
            if !listed.contains(&candidate) {
                listed.push(candidate);
            }
        }
        let distinct: HashSet<&str> = listed.iter().map(|c| c.resolved.as_str()).collect();
        if distinct.len() > 1 {
            let conflict = Conflict {
                name: name.to_string(),
                candidates: listed,
                winner: resolved_ref(&requests[winner]).unwrap_or_default().to_string(),
            };
            info!(%conflict, "Resolved version conflict");
            graph.push_conflict(conflict);
        }
    }

    graph
}

/// Best live request per name; ties go to the earliest request.
fn pick_winners<'r>(
    requests: &'r [Request],
    live: &[usize],
    candidates: &HashMap<RequestKey, ResolvedReference>,
) -> BTreeMap<&'r str, usize> {
    let mut winners: BTreeMap<&str, usize> = BTreeMap::new();
    for &index in live {
        let request = &requests[index];
        let Some(request_ref) = candidate_ref(candidates, request) else {
            continue;
        };
        let better = match winners.get(request.name.as_str()) {
            None => true,
            Some(&current) => {
                let current = &requests[current];
                let current_ref = candidate_ref(candidates, current).unwrap_or_default();
                rank(request.from_root(), request_ref, current.from_root(), current_ref)
                    == Ordering::Greater
            }
        };
        if better {
            winners.insert(request.name.as_str(), index);
        }
    }
    winners
}

/// Indices of requests reachable from the root through the current winners, in request
/// order. A name without a winner yet is reached but not expanded.
fn live_requests(
    requests: &[Request],
    winners: &BTreeMap<&str, usize>,
    candidates: &HashMap<RequestKey, ResolvedReference>,
) -> Vec<usize> {
    let mut live: Vec<usize> = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for (index, request) in requests.iter().enumerate() {
        if request.from_root() {
            live.push(index);
            queue.push_back(request.name.as_str());
        }
    }

    let mut expanded: HashSet<&str> = HashSet::new();
    while let Some(parent) = queue.pop_front() {
        if !expanded.insert(parent) {
            continue;
        }
        let Some(&winner) = winners.get(parent) else {
            continue;
        };
        let parent_ref = candidate_ref(candidates, &requests[winner]);
        for (index, request) in requests.iter().enumerate() {
            if request.parent.name() == Some(parent) && request.parent_ref.as_deref() == parent_ref {
                live.push(index);
                queue.push_back(request.name.as_str());
            }
        }
    }

    live.sort_unstable();
    live
}

fn candidate_ref<'c>(
    candidates: &'c HashMap<RequestKey, ResolvedReference>,
    request: &Request,
) -> Option<&'c str> {
    candidates.get(&request.key()).map(|r| r.resolved_ref.as_str())
}

/// Orders two candidates for the same name; `Greater` means `a` should win.
fn rank(a_root: bool, a_ref: &str, b_root: bool, b_ref: &str) -> Ordering {
    a_root.cmp(&b_root).then_with(|| compare_refs(a_ref, b_ref))
}
