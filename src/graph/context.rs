//! Per-(host, share) graph-building context
//!
//! The context holds the "currently being built" slice of the graph:
//! host node, share node, the stack of directories from the share root
//! down to the current position, and the current element (file or
//! directory). Nothing is written to the store until `flush_path` runs,
//! so shares and directories that never yield a processable element
//! leave no empty scaffolds in the output.
//!
//! Duplicate suppression happens here, not in the store: the host
//! scaffold and share scaffold are emitted once per context, and each
//! directory's node/rights/Contains edge is committed exactly once via
//! `committed_dirs`. Rights edges are deliberately not deduplicated -
//! the same SID can hold the same right through multiple ACEs in
//! different descriptors.

use crate::graph::{kinds, Edge, GraphStore, Node};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Rights set: SID text -> edge kinds granted to that principal
pub type RightsSet = HashMap<String, Vec<&'static str>>;

/// A directory on the path stack with its rights
struct PathEntry {
    node: Node,
    rights: RightsSet,
}

/// Context for building the graph slice of one (host, share) pair
pub struct GraphContext<'g> {
    store: &'g GraphStore,
    host: Option<Node>,
    share: Option<Node>,
    share_rights: RightsSet,
    path: Vec<PathEntry>,
    element: Option<Node>,
    element_rights: RightsSet,
    edges_created: u64,
    host_emitted: bool,
    share_emitted: bool,
    committed_dirs: HashSet<String>,
}

impl<'g> GraphContext<'g> {
    pub fn new(store: &'g GraphStore) -> Self {
        GraphContext {
            store,
            host: None,
            share: None,
            share_rights: RightsSet::new(),
            path: Vec::new(),
            element: None,
            element_rights: RightsSet::new(),
            edges_created: 0,
            host_emitted: false,
            share_emitted: false,
            committed_dirs: HashSet::new(),
        }
    }

    pub fn set_host(&mut self, host: Node) {
        self.host = Some(host);
    }

    pub fn set_share(&mut self, share: Node) {
        self.share = Some(share);
    }

    pub fn share(&self) -> Option<&Node> {
        self.share.as_ref()
    }

    pub fn set_share_rights(&mut self, rights: RightsSet) {
        self.share_rights = rights;
    }

    /// Push a directory onto the path stack
    pub fn push_path(&mut self, node: Node, rights: RightsSet) {
        self.path.push(PathEntry { node, rights });
    }

    /// Pop the innermost directory off the path stack
    pub fn pop_path(&mut self) {
        self.path.pop();
    }

    /// Backslash-joined relative path of the current stack
    pub fn path_from_root(&self) -> String {
        let parts: Vec<&str> = self
            .path
            .iter()
            .map(|e| e.node.string_property("name"))
            .filter(|n| !n.is_empty())
            .collect();
        parts.join("\\")
    }

    pub fn set_element(&mut self, node: Node, rights: RightsSet) {
        self.element = Some(node);
        self.element_rights = rights;
    }

    pub fn clear_element(&mut self) {
        self.element = None;
        self.element_rights = RightsSet::new();
    }

    /// Total edges emitted through this context
    pub fn edges_created(&self) -> u64 {
        self.edges_created
    }

    /// Commit the current path structure to the store.
    ///
    /// Emission order: host scaffold, share scaffold, path ancestors from
    /// the share root down, then the current element with its rights.
    /// Each piece is emitted at most once per context.
    pub fn flush_path(&mut self) {
        let Some(host) = &self.host else {
            trace!("flush_path: no host set, skipping");
            return;
        };

        // Host node plus the externally-resolved computer link. Emitted
        // independently of the share state.
        if !self.host_emitted {
            self.host_emitted = true;
            self.store.add_node(host);

            let edge = Edge::new(
                host.id.to_uppercase(),
                host.id.clone(),
                kinds::EDGE_HOSTS_NETWORK_SHARE,
            )
            .with_start_match_by("name")
            .with_end_match_by("id");
            self.store.add_edge(&edge);
            self.edges_created += 1;

            debug!(host = %host.id, "Emitted host scaffold");
        }

        let Some(share) = &self.share else {
            trace!("flush_path: no share set, skipping");
            return;
        };

        if !self.share_emitted {
            self.share_emitted = true;
            self.store.add_node(share);

            let share_id = share.id.clone();
            let host_id = host.id.clone();
            emit_rights(
                self.store,
                &mut self.edges_created,
                &share_id,
                &self.share_rights,
            );

            self.store
                .add_edge(&Edge::new(host_id, share_id, kinds::EDGE_HAS_NETWORK_SHARE));
            self.edges_created += 1;

            debug!(share = %share.id, "Emitted share scaffold");
        }

        // Walk the path stack from the share down. Already-committed
        // directories still advance the parent pointer so deeper nodes
        // attach to the correct parent.
        let mut parent_id = share.id.clone();
        for entry in &self.path {
            if self.committed_dirs.insert(entry.node.id.clone()) {
                self.store.add_node(&entry.node);
                emit_rights(
                    self.store,
                    &mut self.edges_created,
                    &entry.node.id,
                    &entry.rights,
                );

                self.store.add_edge(&Edge::new(
                    parent_id.clone(),
                    entry.node.id.clone(),
                    kinds::EDGE_CONTAINS,
                ));
                self.edges_created += 1;
            }
            parent_id = entry.node.id.clone();
        }

        let Some(element) = &self.element else {
            return;
        };

        self.store.add_node(element);
        let element_id = element.id.clone();
        emit_rights(
            self.store,
            &mut self.edges_created,
            &element_id,
            &self.element_rights,
        );

        self.store
            .add_edge(&Edge::new(parent_id, element_id, kinds::EDGE_CONTAINS));
        self.edges_created += 1;
    }
}

/// Emit one edge per (sid, kind) pair onto the target id.
fn emit_rights(store: &GraphStore, counter: &mut u64, target_id: &str, rights: &RightsSet) {
    for (sid, edge_kinds) in rights {
        for kind in edge_kinds {
            store.add_edge(&Edge::new(sid.clone(), target_id.to_string(), *kind));
            *counter += 1;
        }
    }
}
