//! Structured exception handling: throw, rethrow, leave and endfinally
//!
//! Regions of a body are ordered innermost first. A thrown value is matched
//! against the regions protecting the throwing instruction in that order:
//! the first conforming catch handles it, and every finally passed on the way
//! runs before unwinding continues. Values that leave a frame unhandled
//! propagate to the caller as [`VmError::Exception`] and are raised again at
//! the call instruction.

use super::frame::{Continuation, Frame};
use super::{bad_operand, OpcodeResult, Vm};
use crate::emit::{HandlerKind, Instruction, Opcode, Operand};
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};

impl Vm {
    pub(super) fn exec_exception_ops(
        &mut self,
        frame: &mut Frame,
        instr: &Instruction,
        ip: usize,
    ) -> VmResult<OpcodeResult> {
        match instr.opcode {
            Opcode::Throw => {
                let exception = frame.pop()?;
                if exception.is_null() {
                    return Err(VmError::NullReference);
                }
                Err(VmError::Exception(exception))
            }
            Opcode::Rethrow => {
                let regions = frame.body.regions();
                let exception = frame
                    .handling
                    .iter()
                    .rev()
                    .find(|(r, _)| regions.get(*r).is_some_and(|region| region.in_handler(ip)))
                    .map(|(_, e)| e.clone())
                    .ok_or_else(|| VmError::RuntimeError("rethrow outside of a catch handler".to_string()))?;
                Err(VmError::Exception(exception))
            }
            Opcode::Leave | Opcode::LeaveS => {
                let Operand::Label(label) = instr.operand else {
                    return Err(bad_operand(instr.opcode));
                };
                let target = frame.target(label)?;
                self.leave(frame, ip, target);
                Ok(OpcodeResult::Continue)
            }
            Opcode::Endfinally => {
                frame.stack.clear();
                match frame.pending.pop() {
                    Some(Continuation::Leave {
                        target,
                        mut remaining,
                        ..
                    }) => {
                        if remaining.is_empty() {
                            frame.ip = target;
                        } else {
                            let next = remaining.remove(0);
                            self.enter_finally(frame, next, target, remaining);
                        }
                        Ok(OpcodeResult::Continue)
                    }
                    // Keep unwinding from the end of this handler
                    Some(Continuation::Unwind { exception, .. }) => Err(VmError::Exception(exception)),
                    None => Err(VmError::RuntimeError(
                        "endfinally outside of a finally handler".to_string(),
                    )),
                }
            }
            op => Err(bad_operand(op)),
        }
    }

    /// Exit protected regions toward `target`, running finally handlers first
    fn leave(&mut self, frame: &mut Frame, ip: usize, target: usize) {
        frame.stack.clear();
        let body = std::sync::Arc::clone(&frame.body);
        let regions = body.regions();
        frame.handling.retain(|(r, _)| {
            regions
                .get(*r)
                .map_or(false, |region| !region.in_handler(ip) || region.in_handler(target))
        });

        let mut finallies: Vec<usize> = regions
            .iter()
            .enumerate()
            .filter(|(_, region)| {
                region.kind == HandlerKind::Finally && region.protects(ip) && !region.protects(target)
            })
            .map(|(index, _)| index)
            .collect();
        if finallies.is_empty() {
            frame.ip = target;
        } else {
            let first = finallies.remove(0);
            self.enter_finally(frame, first, target, finallies);
        }
    }

    fn enter_finally(&mut self, frame: &mut Frame, region: usize, target: usize, remaining: Vec<usize>) {
        frame.ip = frame
            .body
            .regions()
            .get(region)
            .map_or(target, |r| r.handler_start);
        frame.pending.push(Continuation::Leave {
            region,
            target,
            remaining,
        });
    }

    /// Handle a value thrown at `ip`
    ///
    /// Returns `Ok` when a handler in this frame takes over, otherwise the
    /// exception as an error for the caller.
    pub(super) fn raise(&mut self, frame: &mut Frame, exception: Value, ip: usize) -> VmResult<()> {
        let body = std::sync::Arc::clone(&frame.body);
        let regions = body.regions();

        // Leaving a handler abandons whatever it was doing
        frame
            .pending
            .retain(|c| regions.get(c.region()).map_or(false, |r| !r.in_handler(ip)));
        frame
            .handling
            .retain(|(i, _)| regions.get(*i).map_or(false, |r| !r.in_handler(ip)));

        for (index, region) in regions.iter().enumerate() {
            if !region.protects(ip) {
                continue;
            }
            match &region.kind {
                HandlerKind::Catch(ty) => {
                    let ty = frame.resolve(ty);
                    if self.conforms(&exception, &ty) {
                        frame.stack.clear();
                        frame.push(exception.clone())?;
                        frame.handling.push((index, exception));
                        frame.ip = region.handler_start;
                        return Ok(());
                    }
                }
                HandlerKind::Finally => {
                    frame.stack.clear();
                    frame.pending.push(Continuation::Unwind {
                        region: index,
                        exception,
                    });
                    frame.ip = region.handler_start;
                    return Ok(());
                }
            }
        }
        Err(VmError::Exception(exception))
    }
}
