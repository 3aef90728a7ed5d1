//! Phase graph and routing for the workflow engine.
//!
//! The workflow's shape is data, not control flow: `topology` holds the
//! edge table built once at startup, `router` holds the two pure routing
//! functions the conditional edges delegate to. The engine consults the
//! graph for every transition; no routing decision lives inside the driver
//! loop itself.
//!
//! ```text
//! init → analyze → extract → generate ─(gate)→ approval ⟲(gate)
//!                                  └──(gate)→ setup → verify ─(routed)→ end
//! any phase with recorded errors → error
//! ```

mod router;
mod topology;

pub use router::{Next, approval_gate_open, approval_route, terminal_route};
pub use topology::{EdgeKind, GraphBuilder, PhaseGraph};
