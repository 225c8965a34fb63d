//! Sealing: label resolution, structural checks and stack depth analysis

use super::instruction::{MethodBody, Operand};
use super::opcode::{FlowControl, Opcode, StackEffect};
use super::{EmitError, EmitResult, HandlerKind, InstructionEmitter, Label};
use crate::types::MethodRef;

/// Stack shape of a call site, supplied by whoever knows the callee signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallShape {
    /// Values popped (arguments, including the receiver)
    pub pops: usize,
    /// Values pushed (0 or 1)
    pub pushes: usize,
}

/// Shape assumed for calls nobody could describe
const UNKNOWN_CALL: CallShape = CallShape { pops: 0, pushes: 1 };

impl InstructionEmitter {
    /// Seal the stream into an immutable [`MethodBody`]
    ///
    /// Call sites are assumed to pop nothing and push one value; use
    /// [`seal_with`](Self::seal_with) when callee signatures are known.
    pub fn seal(&mut self) -> EmitResult<MethodBody> {
        self.seal_with(|_, _| None)
    }

    /// Seal the stream, describing call sites with `shape_of`
    ///
    /// Reports the first recorded emission error, any unclosed exception
    /// block, any branch to an unmarked label, control falling off the end,
    /// and stack underflow. Long branches whose target is close enough are
    /// rewritten to their short form.
    pub fn seal_with<F>(&mut self, shape_of: F) -> EmitResult<MethodBody>
    where
        F: Fn(Opcode, MethodRef) -> Option<CallShape>,
    {
        if self.sealed {
            return Err(EmitError::Sealed(self.method.clone()));
        }
        self.sealed = true;

        if let Some(error) = self.errors.first() {
            return Err(error.clone());
        }
        if self.unclosed_blocks() > 0 {
            return Err(EmitError::ExceptionBlock {
                method: self.method.clone(),
                message: format!("{} exception block(s) left open", self.unclosed_blocks()),
            });
        }

        let len = self.instructions.len();
        for instr in &self.instructions {
            match &instr.operand {
                Operand::Label(label) => {
                    self.resolve(*label)?;
                }
                Operand::Switch(labels) => {
                    for label in labels.iter() {
                        self.resolve(*label)?;
                    }
                }
                _ => {}
            }
        }

        match self.instructions.last() {
            Some(last) if last.opcode.is_terminator() => {}
            _ => return Err(EmitError::FallOffEnd(self.method.clone())),
        }

        self.relax_branches()?;
        let max_stack = self.max_stack_depth(&shape_of)?;

        tracing::trace!(
            method = %self.method,
            instructions = len,
            locals = self.locals.len(),
            regions = self.regions.len(),
            max_stack,
            "sealed method body"
        );

        Ok(MethodBody {
            instructions: std::mem::take(&mut self.instructions),
            labels: std::mem::take(&mut self.labels),
            locals: std::mem::take(&mut self.locals),
            regions: std::mem::take(&mut self.regions),
            max_stack,
        })
    }

    fn resolve(&self, label: Label) -> EmitResult<usize> {
        match self.labels.get(label.0 as usize) {
            None => Err(EmitError::UnknownLabel {
                method: self.method.clone(),
                label: label.0,
            }),
            Some(None) => Err(EmitError::UnmarkedLabel {
                method: self.method.clone(),
                label: label.0,
            }),
            Some(Some(pos)) if *pos >= self.instructions.len() => {
                Err(EmitError::InvalidBranchTarget {
                    method: self.method.clone(),
                    label: label.0,
                })
            }
            Some(Some(pos)) => Ok(*pos),
        }
    }

    /// Pick short or long branch encodings from the instruction distance
    fn relax_branches(&mut self) -> EmitResult<()> {
        for ip in 0..self.instructions.len() {
            let Operand::Label(label) = self.instructions[ip].operand else {
                continue;
            };
            let target = self.resolve(label)?;
            let distance = target as isize - (ip as isize + 1);
            let fits_short = (-128..=127).contains(&distance);
            let opcode = self.instructions[ip].opcode;
            let relaxed = if fits_short {
                opcode.short_form()
            } else {
                opcode.long_form()
            };
            if let Some(relaxed) = relaxed {
                self.instructions[ip].opcode = relaxed;
            }
        }
        Ok(())
    }

    fn max_stack_depth<F>(&self, shape_of: &F) -> EmitResult<usize>
    where
        F: Fn(Opcode, MethodRef) -> Option<CallShape>,
    {
        let len = self.instructions.len();
        let mut seen = vec![false; len];
        let mut work: Vec<(usize, usize)> = vec![(0, 0)];
        for region in &self.regions {
            let entry = match region.kind {
                HandlerKind::Catch(_) => 1,
                HandlerKind::Finally => 0,
            };
            work.push((region.handler_start, entry));
        }

        let mut max = 0;
        while let Some((ip, depth)) = work.pop() {
            if ip >= len || seen[ip] {
                continue;
            }
            seen[ip] = true;
            let instr = &self.instructions[ip];

            let (pops, pushes) = match instr.opcode.stack_effect() {
                StackEffect::Fixed { pops, pushes } => (pops as usize, pushes as usize),
                StackEffect::Call => {
                    let shape = instr
                        .operand
                        .method()
                        .and_then(|m| shape_of(instr.opcode, m))
                        .unwrap_or(UNKNOWN_CALL);
                    (shape.pops, shape.pushes)
                }
                StackEffect::Return => (self.returns_value as usize, 0),
                StackEffect::Clear => (depth, 0),
            };
            if pops > depth {
                return Err(EmitError::StackUnderflow {
                    method: self.method.clone(),
                    offset: ip,
                });
            }
            let after = depth - pops + pushes;
            max = max.max(after).max(depth);

            match instr.opcode.flow() {
                FlowControl::Next => work.push((ip + 1, after)),
                FlowControl::Branch | FlowControl::Leave => {
                    if let Operand::Label(l) = &instr.operand {
                        work.push((self.resolve(*l)?, after));
                    }
                }
                FlowControl::CondBranch => {
                    work.push((ip + 1, after));
                    if let Operand::Label(l) = &instr.operand {
                        work.push((self.resolve(*l)?, after));
                    }
                }
                FlowControl::Switch => {
                    work.push((ip + 1, after));
                    if let Operand::Switch(labels) = &instr.operand {
                        for l in labels.iter() {
                            work.push((self.resolve(*l)?, after));
                        }
                    }
                }
                FlowControl::Return | FlowControl::Throw | FlowControl::EndFinally => {}
            }
        }
        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Comparison;
    use crate::types::{TypeId, TypeRef};

    #[test]
    fn test_forward_branch_resolves() {
        let mut il = InstructionEmitter::new("max").returning(true);
        let second = il.define_label();
        il.ldarg_0().ldarg_1().branch_if(Comparison::Lt, second);
        il.ldarg_0().ret();
        il.mark_label(second).ldarg_1().ret();

        let body = il.seal().unwrap();
        assert_eq!(body.target(second), Some(5));
        // Close targets are rewritten to short branches
        assert_eq!(body.instructions()[2].opcode, Opcode::BltS);
        assert_eq!(body.max_stack(), 2);
    }

    #[test]
    fn test_far_branch_stays_long() {
        let mut il = InstructionEmitter::new("far");
        let end = il.define_label();
        il.br_s(end);
        for _ in 0..200 {
            il.nop();
        }
        il.mark_label(end).ret();
        let body = il.seal().unwrap();
        assert_eq!(body.instructions()[0].opcode, Opcode::Br);
    }

    #[test]
    fn test_unmarked_label_fails() {
        let mut il = InstructionEmitter::new("f");
        let never = il.define_label();
        il.br(never).ret();
        assert!(matches!(
            il.seal(),
            Err(EmitError::UnmarkedLabel { label: 0, .. })
        ));
    }

    #[test]
    fn test_unreferenced_unmarked_label_is_fine() {
        let mut il = InstructionEmitter::new("f");
        let _unused = il.define_label();
        il.ret();
        assert!(il.seal().is_ok());
    }

    #[test]
    fn test_fall_off_end() {
        let mut il = InstructionEmitter::new("f");
        il.ldc_i4(1).pop();
        assert!(matches!(il.seal(), Err(EmitError::FallOffEnd(_))));

        let mut empty = InstructionEmitter::new("g");
        assert!(matches!(empty.seal(), Err(EmitError::FallOffEnd(_))));
    }

    #[test]
    fn test_stack_underflow() {
        let mut il = InstructionEmitter::new("f").returning(true);
        il.ret();
        assert!(matches!(
            il.seal(),
            Err(EmitError::StackUnderflow { offset: 0, .. })
        ));
    }

    #[test]
    fn test_open_block_fails() {
        let mut il = InstructionEmitter::new("f");
        il.begin_exception_block();
        il.ret();
        assert!(matches!(il.seal(), Err(EmitError::ExceptionBlock { .. })));
    }

    #[test]
    fn test_seal_twice_and_emit_after_seal() {
        let mut il = InstructionEmitter::new("f");
        il.ret();
        assert!(il.seal().is_ok());
        assert!(il.is_sealed());
        assert!(matches!(il.seal(), Err(EmitError::Sealed(_))));
        il.nop();
        assert!(il.is_empty());
    }

    #[test]
    fn test_call_shapes_feed_stack_depth() {
        let callee = MethodRef {
            owner: TypeId(1),
            index: 0,
        };
        let mut il = InstructionEmitter::new("f").returning(true);
        il.ldc_i4(1).ldc_i4(2).ldc_i4(3).call(callee).ret();
        let body = il
            .seal_with(|_, _| Some(CallShape { pops: 3, pushes: 1 }))
            .unwrap();
        assert_eq!(body.max_stack(), 3);
    }

    #[test]
    fn test_catch_handler_entry_depth() {
        let mut il = InstructionEmitter::new("f");
        il.begin_exception_block();
        il.ldstr("x").throw();
        il.begin_catch_block(TypeRef::String).unwrap();
        il.pop();
        il.end_exception_block().unwrap();
        il.ret();
        let body = il.seal().unwrap();
        assert_eq!(body.regions().len(), 1);
        assert_eq!(body.max_stack(), 1);
        assert!(body.to_string().contains("catch string"));
    }
}
