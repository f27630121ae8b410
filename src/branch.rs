//! Types for representing retired control-flow instructions.

/// The kind of a retired branch instruction.
///
/// The signature generators only react to calls and returns; the other
/// kinds are carried so that a harness can replay a full retirement stream
/// through [`crate::CachePrefetcher::branch_operate`] unfiltered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchKind {
    /// A direct conditional branch instruction.
    DirectBranch,

    /// A direct unconditional jump instruction.
    DirectJump,

    /// An indirect unconditional jump instruction.
    IndirectJump,

    /// A direct procedure call instruction.
    DirectCall,

    /// An indirect procedure call instruction.
    IndirectCall,

    /// A return instruction.
    Return,
}
impl BranchKind {
    /// Returns 'true' if this is a "call" instruction.
    pub fn is_call(&self) -> bool {
        matches!(self, Self::DirectCall | Self::IndirectCall)
    }

    /// Returns 'true' if this is a "return" instruction.
    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return)
    }

    /// Returns 'true' if this is a "call" or "return".
    pub fn is_procedural(&self) -> bool {
        self.is_call() || self.is_return()
    }
}

/// A record of branch execution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BranchRecord {
    /// The program counter value for this branch
    pub pc: u64,

    /// The target address evaluated for this branch
    pub tgt: u64,

    /// The type/kind of branch
    pub kind: BranchKind,
}
impl BranchRecord {
    pub fn new(pc: u64, tgt: u64, kind: BranchKind) -> Self {
        Self { pc, tgt, kind }
    }
}
