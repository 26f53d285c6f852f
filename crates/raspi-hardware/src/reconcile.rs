//! Diffing the tracked interrupts against a new pin configuration.
//!
//! Reconciliation runs in three stages:
//!
//! 1. **Plan.** Work out, without touching hardware, what happens to every
//!    interrupt:
//!    - every configured interrupt is matched against the tracked ones,
//!      first by hardware line and then by logical name; a match of the same
//!      type is carried over, a match of another type is retired and replaced;
//!    - configured interrupts left unmatched are created;
//!    - tracked interrupts nobody claimed are kept if they were created on
//!      demand by hardware label, and retired otherwise.
//! 2. **Apply.** Release every line that is given up, then arm every line
//!    that is taken. If any native call fails, everything done so far is
//!    undone and the error is returned.
//! 3. **Commit.** Only once the hardware agrees are the surviving interrupts
//!    updated in place and the next snapshot built.
//!
//! Carried-over interrupts keep their identity, so counts, subscriptions and
//! debounce state survive a reconfigure.

use std::collections::HashMap;
use std::sync::Arc;

use raspi_core::{LineId, PinConfig, PinTable};
use tracing::{debug, error, info, warn};

use crate::interrupt::Interrupt;
use crate::registry::InterruptMap;
use crate::traits::GpioBackend;
use crate::types::CallbackHandle;
use crate::{HardwareError, Result};

/// Compute and apply the transition from `current` to `wanted`, returning
/// the snapshot to install.
///
/// Entries of `wanted` that are not interrupts are ignored. On error no
/// interrupt in `current` has been updated in place, and every
/// line it released has been armed again where the hardware allowed it.
///
/// # Errors
///
/// - [`HardwareError::UnknownPin`] if a label does not resolve, or
///   [`HardwareError::Config`] if two interrupts resolve to the same line.
///   Both are reported before any native call is made.
/// - [`HardwareError::HardwareRegistrationFailed`] if arming or releasing a
///   callback fails.
pub fn reconcile<B: GpioBackend>(
    backend: &B,
    current: &InterruptMap,
    wanted: &[PinConfig],
) -> Result<InterruptMap> {
    let plan = Plan::build(current, wanted)?;
    debug!(steps = plan.steps.len(), "applying interrupt plan");
    let armed = plan.apply(backend)?;
    Ok(plan.commit(armed))
}

#[derive(Debug)]
enum Step<'a> {
    /// Same interrupt, possibly renamed, re-debounced or moved.
    CarryOver {
        interrupt: Arc<Interrupt>,
        config: &'a PinConfig,
        line: LineId,
    },
    /// New interrupt, not yet armed.
    Create {
        interrupt: Arc<Interrupt>,
        line: LineId,
    },
    /// Created on demand and not claimed by the configuration.
    Retain { interrupt: Arc<Interrupt> },
    /// Dropped from the configuration.
    Retire { interrupt: Arc<Interrupt> },
}

impl Step<'_> {
    /// Interrupt whose current line is given up by this step.
    fn releases(&self) -> Option<&Arc<Interrupt>> {
        match self {
            Self::CarryOver {
                interrupt, line, ..
            } if interrupt.line() != *line => Some(interrupt),
            Self::Retire { interrupt } => Some(interrupt),
            _ => None,
        }
    }

    /// Line newly armed by this step.
    fn arms(&self) -> Option<LineId> {
        match self {
            Self::CarryOver {
                interrupt, line, ..
            } if interrupt.line() != *line => Some(*line),
            Self::Create { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// How to undo one native call.
enum Undo {
    /// A line was released: arm it again.
    Rearm(Arc<Interrupt>),
    /// A line was armed: release it.
    Release(CallbackHandle),
}

#[derive(Debug)]
struct Plan<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Plan<'a> {
    fn build(current: &InterruptMap, wanted: &'a [PinConfig]) -> Result<Self> {
        let mut candidates: Vec<Arc<Interrupt>> = current.values().cloned().collect();
        candidates.sort_by_key(|i| i.line());

        let mut steps = Vec::new();
        let mut pending = Vec::new();
        let mut claimed: HashMap<LineId, &str> = HashMap::new();

        for config in wanted.iter().filter(|c| c.is_interrupt()) {
            let line = config.line()?;
            let name = config.effective_name();
            if let Some(first) = claimed.insert(line, name) {
                return Err(raspi_core::Error::DuplicatePin {
                    first: first.to_string(),
                    second: name.to_string(),
                    line: line.as_u32(),
                }
                .into());
            }

            let matched = candidates
                .iter()
                .position(|c| c.line() == line)
                .or_else(|| candidates.iter().position(|c| c.name() == name))
                .map(|idx| candidates.remove(idx));

            match matched {
                Some(interrupt) if interrupt.interrupt_type() == config.interrupt_type => {
                    steps.push(Step::CarryOver {
                        interrupt,
                        config,
                        line,
                    });
                }
                Some(interrupt) => {
                    debug!(
                        name,
                        from = ?interrupt.interrupt_type(),
                        to = ?config.interrupt_type,
                        "interrupt type changed, replacing"
                    );
                    steps.push(Step::Retire { interrupt });
                    pending.push((config, line));
                }
                None => pending.push((config, line)),
            }
        }

        for (config, line) in pending {
            let interrupt = Arc::new(Interrupt::new(
                config.effective_name(),
                line,
                config.debounce(),
                config.interrupt_type,
            ));
            steps.push(Step::Create { interrupt, line });
        }

        for interrupt in candidates {
            if PinTable::names_line(&interrupt.name(), interrupt.line()) {
                steps.push(Step::Retain { interrupt });
            } else {
                steps.push(Step::Retire { interrupt });
            }
        }

        Ok(Self { steps })
    }

    /// Make the native calls. Returns the handle armed by each step, indexed
    /// like `steps`.
    fn apply<B: GpioBackend>(&self, backend: &B) -> Result<Vec<Option<CallbackHandle>>> {
        let mut undo = Vec::new();
        let mut armed = vec![None; self.steps.len()];

        if let Err(e) = self.execute(backend, &mut undo, &mut armed) {
            warn!(error = %e, undo = undo.len(), "reconfigure failed, rolling back");
            rollback(backend, undo);
            return Err(e);
        }
        Ok(armed)
    }

    fn execute<B: GpioBackend>(
        &self,
        backend: &B,
        undo: &mut Vec<Undo>,
        armed: &mut [Option<CallbackHandle>],
    ) -> Result<()> {
        // Releases first, so a line given up by one interrupt can be taken by
        // another in the same pass.
        for interrupt in self.steps.iter().filter_map(Step::releases) {
            if let Some(handle) = interrupt.callback_handle() {
                backend.unregister(handle)?;
                undo.push(Undo::Rearm(interrupt.clone()));
            }
        }

        for (idx, step) in self.steps.iter().enumerate() {
            if let Some(line) = step.arms() {
                let handle = backend.register(line)?;
                undo.push(Undo::Release(handle));
                armed[idx] = Some(handle);
            }
        }
        Ok(())
    }

    fn commit(self, armed: Vec<Option<CallbackHandle>>) -> InterruptMap {
        let mut next = InterruptMap::new();

        for (step, handle) in self.steps.into_iter().zip(armed) {
            let interrupt = match step {
                Step::CarryOver {
                    interrupt,
                    config,
                    line,
                } => {
                    interrupt.set_name(config.effective_name());
                    interrupt.set_debounce(config.debounce());
                    if interrupt.line() != line {
                        info!(name = config.effective_name(), from = %interrupt.line(), to = %line, "moved digital interrupt");
                        interrupt.set_line(line);
                        interrupt.set_callback(handle);
                    }
                    interrupt
                }
                Step::Create { interrupt, line } => {
                    interrupt.set_callback(handle);
                    info!(name = %interrupt.name(), %line, "created digital interrupt");
                    interrupt
                }
                Step::Retain { interrupt } => interrupt,
                Step::Retire { interrupt } => {
                    interrupt.set_callback(None);
                    info!(name = %interrupt.name(), line = %interrupt.line(), "removed digital interrupt");
                    continue;
                }
            };

            let line = interrupt.line();
            if let Some(previous) = next.insert(line, interrupt) {
                warn!("{}", HardwareError::already_tracked(line, previous.name()));
            }
        }

        next
    }
}

fn rollback<B: GpioBackend>(backend: &B, undo: Vec<Undo>) {
    for action in undo.into_iter().rev() {
        match action {
            Undo::Release(handle) => {
                if let Err(e) = backend.unregister(handle) {
                    error!(%handle, error = %e, "rollback could not release callback");
                }
            }
            Undo::Rearm(interrupt) => match backend.register(interrupt.line()) {
                Ok(handle) => {
                    interrupt.set_callback(Some(handle));
                }
                Err(e) => {
                    error!(line = %interrupt.line(), error = %e, "rollback could not re-arm interrupt");
                    interrupt.set_callback(None);
                }
            },
        }
    }
}
