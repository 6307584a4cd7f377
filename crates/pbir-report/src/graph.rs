//! Usage graph over a loaded report.
//!
//! Edges:
//! - measure -> measure: `A` depends on `B` when `A`'s expression contains `[B]`;
//! - visual -> field: names a visual binds (columns, measures, query refs);
//! - bookmark -> visual: containers a bookmark shows (no `display` override);
//! - visual -> visual: `visualInteractions` source/target pairs.
//!
//! Graphs are built per call and never cached: actions that change the tree rebuild.
//! Measure names come from untyped DAX text, so every traversal carries a visited set; the
//! results on cyclic graphs are well-defined but carry no particular meaning.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use pbir_dax::references_measure;

use crate::model::{Measure, ReportTree};

/// Address of a visual: `(page id, visual name)`.
pub type VisualKey = (String, String);

#[derive(Clone, Debug, Default)]
pub struct UsageGraph {
    measures: BTreeMap<String, Measure>,
    /// measure -> measures its expression references.
    depends_on: BTreeMap<String, BTreeSet<String>>,
    /// measure -> measures whose expressions reference it.
    dependents: BTreeMap<String, BTreeSet<String>>,
    /// field name -> visuals binding it.
    field_users: BTreeMap<String, BTreeSet<VisualKey>>,
    /// bookmark name -> visual names it shows.
    exposures: BTreeMap<String, BTreeSet<String>>,
    /// `(page, source, target)`.
    interactions: Vec<(String, String, String)>,
}

impl UsageGraph {
    pub fn build(tree: &ReportTree) -> Self {
        let mut graph = Self::from_measures(tree.measures());

        for (page, visual) in tree.visuals() {
            for field in visual.fields() {
                graph
                    .field_users
                    .entry(field.name)
                    .or_default()
                    .insert((page.id.clone(), visual.name().to_string()));
            }
        }

        for bookmark in &tree.bookmarks {
            let Some(name) = bookmark.name() else {
                continue;
            };
            let shown = graph.exposures.entry(name.to_string()).or_default();
            for container in bookmark.containers() {
                if container.shown {
                    shown.insert(container.visual.to_string());
                }
            }
        }

        for page in &tree.pages {
            for (source, target) in page.interactions() {
                graph
                    .interactions
                    .push((page.id.clone(), source.to_string(), target.to_string()));
            }
        }

        graph
    }

    /// Measure edges only. Later duplicates of a name replace earlier ones.
    pub fn from_measures(measures: impl IntoIterator<Item = Measure>) -> Self {
        let mut graph = Self::default();
        for measure in measures {
            graph.measures.insert(measure.name.clone(), measure);
        }

        for (name, measure) in &graph.measures {
            for other in graph.measures.keys() {
                if other != name && references_measure(&measure.expression, other) {
                    graph
                        .depends_on
                        .entry(name.clone())
                        .or_default()
                        .insert(other.clone());
                    graph
                        .dependents
                        .entry(other.clone())
                        .or_default()
                        .insert(name.clone());
                }
            }
        }
        graph
    }

    /// Record a visual's use of a field name (used when the visual scan happens elsewhere).
    pub fn add_field_use(&mut self, field: impl Into<String>, visual: VisualKey) {
        self.field_users
            .entry(field.into())
            .or_default()
            .insert(visual);
    }

    pub fn measures(&self) -> impl Iterator<Item = &Measure> {
        self.measures.values()
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.get(name)
    }

    /// Measures whose expression references `name` directly.
    pub fn direct_dependents(&self, name: &str) -> BTreeSet<&str> {
        self.dependents
            .get(name)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Transitive closure of [`UsageGraph::direct_dependents`], excluding `name` itself.
    pub fn all_dependents(&self, name: &str) -> BTreeSet<&str> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = self.direct_dependents(name).into_iter().collect();
        while let Some(next) = queue.pop_front() {
            if next == name || !seen.insert(next) {
                continue;
            }
            queue.extend(self.direct_dependents(next));
        }
        seen
    }

    pub fn is_used_in_visuals(&self, name: &str) -> bool {
        self.field_users
            .get(name)
            .is_some_and(|users| !users.is_empty())
    }

    /// Visuals binding `name`, as `(page, visual)` pairs.
    pub fn visuals_using(&self, name: &str) -> Vec<&VisualKey> {
        self.field_users
            .get(name)
            .map(|users| users.iter().collect())
            .unwrap_or_default()
    }

    /// Measures that are used by a visual, or that something used depends on (transitively).
    ///
    /// Equivalent to evaluating [`UsageGraph::is_used_or_dependents_used`] for every measure,
    /// computed as one walk from the directly used measures along depends-on edges.
    pub fn retained_measures(&self) -> BTreeSet<&str> {
        let mut retained: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = self
            .measures
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_used_in_visuals(name))
            .collect();
        while let Some(name) = queue.pop_front() {
            if !retained.insert(name) {
                continue;
            }
            if let Some(references) = self.depends_on.get(name) {
                queue.extend(references.iter().map(String::as_str));
            }
        }
        retained
    }

    /// `name` is used in a visual, or some measure depending on it is (recursively).
    pub fn is_used_or_dependents_used(&self, name: &str) -> bool {
        let mut visited = BTreeSet::new();
        self.used_or_dependents_used(name, &mut visited)
    }

    fn used_or_dependents_used<'a>(&'a self, name: &'a str, visited: &mut BTreeSet<&'a str>) -> bool {
        if !visited.insert(name) {
            return false;
        }
        if self.is_used_in_visuals(name) {
            return true;
        }
        self.direct_dependents(name)
            .into_iter()
            .any(|dependent| self.used_or_dependents_used(dependent, visited))
    }

    /// Every depth-first path from `from` through dependents down to a measure with no further
    /// dependents. A dependent already on the current path ends that path.
    pub fn trace_paths(&self, from: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut path = vec![from.to_string()];
        self.trace(from, &mut path, &mut paths);
        paths
    }

    fn trace(&self, current: &str, path: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
        let next: Vec<&str> = self
            .direct_dependents(current)
            .into_iter()
            .filter(|dependent| !path.iter().any(|seen| seen == dependent))
            .collect();
        if next.is_empty() {
            paths.push(path.clone());
            return;
        }
        for dependent in next {
            path.push(dependent.to_string());
            self.trace(dependent, path, paths);
            path.pop();
        }
    }

    /// Visual names shown by at least one bookmark.
    pub fn shown_by_bookmarks(&self) -> BTreeSet<&str> {
        self.exposures
            .values()
            .flat_map(|visuals| visuals.iter().map(String::as_str))
            .collect()
    }

    /// `(page, source, target)` interaction edges touching `visual` on either end.
    pub fn interactions_involving<'a>(
        &'a self,
        visual: &'a str,
    ) -> impl Iterator<Item = &'a (String, String, String)> + 'a {
        self.interactions
            .iter()
            .filter(move |(_, source, target)| source == visual || target == visual)
    }
}
