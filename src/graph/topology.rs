//! The phase graph, built once at startup and consulted for every transition.
//!
//! Each non-terminal phase carries exactly one outgoing edge. Static edges
//! name their successor directly; gated edges delegate to the approval gate
//! router; the routed edge delegates to the terminal router. The gated-phase
//! set doubles as the interrupt declaration: the engine suspends at a gated
//! phase whose gate is closed.

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};

use crate::graph::router::{self, Next};
use crate::state::{WorkflowPhase, WorkflowState};

/// One outgoing edge of the phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Unconditional successor.
    Static(WorkflowPhase),
    /// Routed through the approval gate router.
    Gated,
    /// Routed through the terminal router.
    Routed,
}

/// The workflow's phase topology.
#[derive(Debug, Clone)]
pub struct PhaseGraph {
    edges: HashMap<WorkflowPhase, EdgeKind>,
    gated: HashSet<WorkflowPhase>,
    entry: WorkflowPhase,
}

impl PhaseGraph {
    /// The built-in delivery-rollout topology.
    ///
    /// Init routes its validation failures through the terminal router like
    /// every other phase; there is no separate early-exit edge out of init.
    pub fn standard() -> Self {
        GraphBuilder::new(WorkflowPhase::Init)
            .edge(WorkflowPhase::Init, WorkflowPhase::Analyze)
            .edge(WorkflowPhase::Analyze, WorkflowPhase::Extract)
            .edge(WorkflowPhase::Extract, WorkflowPhase::Generate)
            .gated_edge(WorkflowPhase::Generate)
            .interrupt(WorkflowPhase::Approval)
            .gated_edge(WorkflowPhase::Approval)
            .edge(WorkflowPhase::Setup, WorkflowPhase::Verify)
            .routed_edge(WorkflowPhase::Verify)
            .build()
            .expect("built-in phase graph is valid")
    }

    /// The phase a fresh run starts in.
    pub fn entry(&self) -> WorkflowPhase {
        self.entry
    }

    /// Check if a phase is interrupt-gated.
    pub fn is_gated(&self, phase: WorkflowPhase) -> bool {
        self.gated.contains(&phase)
    }

    /// The declared edge out of a phase, if any.
    pub fn edge(&self, phase: WorkflowPhase) -> Option<EdgeKind> {
        self.edges.get(&phase).copied()
    }

    /// Phases with an outgoing edge, i.e. every phase a handler runs in.
    pub fn handler_phases(&self) -> Vec<WorkflowPhase> {
        let mut phases: Vec<WorkflowPhase> = WorkflowPhase::ALL
            .into_iter()
            .filter(|p| self.edges.contains_key(p))
            .collect();
        phases.sort_by_key(|p| p.as_str());
        phases
    }

    /// Resolve the successor of the current phase.
    ///
    /// Recorded errors preempt every edge; a completed run ends; otherwise
    /// the phase's declared edge decides.
    pub fn successor(&self, state: &WorkflowState) -> Next {
        if state.has_errors() {
            return Next::Phase(WorkflowPhase::Error);
        }
        match self.edges.get(&state.current_phase) {
            Some(EdgeKind::Static(next)) => Next::Phase(*next),
            Some(EdgeKind::Gated) => Next::Phase(router::approval_route(state)),
            Some(EdgeKind::Routed) | None => router::terminal_route(state),
        }
    }
}

/// Builder for phase graphs, validating the table on `build`.
pub struct GraphBuilder {
    entry: WorkflowPhase,
    edges: HashMap<WorkflowPhase, EdgeKind>,
    gated: HashSet<WorkflowPhase>,
}

impl GraphBuilder {
    pub fn new(entry: WorkflowPhase) -> Self {
        Self {
            entry,
            edges: HashMap::new(),
            gated: HashSet::new(),
        }
    }

    /// Add a static edge.
    pub fn edge(mut self, from: WorkflowPhase, to: WorkflowPhase) -> Self {
        self.edges.insert(from, EdgeKind::Static(to));
        self
    }

    /// Route the edge out of a phase through the approval gate router.
    pub fn gated_edge(mut self, from: WorkflowPhase) -> Self {
        self.edges.insert(from, EdgeKind::Gated);
        self
    }

    /// Route the edge out of a phase through the terminal router.
    pub fn routed_edge(mut self, from: WorkflowPhase) -> Self {
        self.edges.insert(from, EdgeKind::Routed);
        self
    }

    /// Declare a phase as interrupt-gated.
    pub fn interrupt(mut self, phase: WorkflowPhase) -> Self {
        self.gated.insert(phase);
        self
    }

    /// Build the graph, validating the edge table:
    /// - every non-terminal phase has exactly one outgoing edge
    /// - terminal phases have none
    /// - gated phases are non-terminal and carry gated edges
    /// - no static edge re-enters the entry phase
    pub fn build(self) -> Result<PhaseGraph> {
        for phase in WorkflowPhase::ALL {
            match (phase.is_terminal(), self.edges.get(&phase)) {
                (false, None) => bail!("Phase {phase} has no outgoing edge"),
                (true, Some(_)) => bail!("Terminal phase {phase} must not have an edge"),
                _ => {}
            }
        }

        for phase in &self.gated {
            if phase.is_terminal() {
                bail!("Terminal phase {phase} cannot be gated");
            }
            if self.edges.get(phase) != Some(&EdgeKind::Gated) {
                bail!("Gated phase {phase} must carry a gated edge");
            }
        }

        for (from, edge) in &self.edges {
            if let EdgeKind::Static(to) = edge {
                if *to == self.entry {
                    bail!("Static edge {from} -> {to} re-enters the entry phase");
                }
                if to.is_terminal() {
                    bail!("Static edge {from} -> {to} bypasses the terminal router");
                }
            }
        }

        Ok(PhaseGraph {
            edges: self.edges,
            gated: self.gated,
            entry: self.entry,
        })
    }
}
