//! Management-prefix control message handling (spec.md §4.6, §6).

use athena_common::{Control, ControlOp, LinkSet, Name};
use tracing::{info, warn};

use crate::fib::Fib;

/// Whether the pipeline should keep running or the engine should exit
/// (spec.md §6: "Process exit is signalled via a management interest
/// addressed to the forwarder's reserved quit name").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Continue,
    Quit,
}

/// True if `name` falls under the forwarder's own management prefix
/// (spec.md §6).
pub fn is_management_name(management_prefix: &Name, name: &Name) -> bool {
    management_prefix.is_prefix_of(name)
}

/// Apply a decoded control operation against the FIB. Route-registration
/// requests translate into `fib.add_route`; everything else is logged and
/// ignored (spec.md §4.6); an ACK is always the caller's responsibility
/// to send back through `ingress`, since the ACK's wire encoding is the
/// codec's concern, not this crate's (spec.md §1).
pub fn handle_control(fib: &mut Fib, control: &Control, ingress: &LinkSet) -> ControlOutcome {
    match &control.op {
        ControlOp::AddRoute { name } => {
            fib.add_route(name, ingress);
            info!(name = %name, "route added");
            ControlOutcome::Continue
        }
        ControlOp::RemoveRoute { name } => {
            fib.delete_route(name, ingress);
            info!(name = %name, "route removed");
            ControlOutcome::Continue
        }
        ControlOp::Quit => {
            info!("quit requested via management interest");
            ControlOutcome::Quit
        }
        ControlOp::Unknown { operation } => {
            warn!(operation = %operation, "unknown control operation, ignored");
            ControlOutcome::Continue
        }
    }
}
