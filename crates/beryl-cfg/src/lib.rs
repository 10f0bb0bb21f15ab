//! Control-flow-graph lowering.
//!
//! Each method body becomes a graph of basic blocks holding `local :=
//! rvalue` bindings plus a terminator. The form is SSA-ish: every
//! assignment writes a fresh binding of a base local, and phi-equivalents
//! are implicit in the per-block environments inference maintains. Blocks
//! reachable only through an exception edge are approximated with
//! unanalyzable conditions.

mod builder;

use core::fmt;

use beryl_ast::CastKind;
use beryl_core::loc::Loc;
use beryl_core::names::NameRef;
use beryl_core::symbols::SymbolRef;
use beryl_core::types::{LitKind, Ty};

pub use builder::{MethodSource, build};

/// A dense block handle within one CFG.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The entry block of every CFG.
    pub const ENTRY: BlockId = BlockId(0);
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A dense local-variable handle within one CFG.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalRef(pub u32);

impl fmt::Debug for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Per-local metadata.
#[derive(Clone, Debug)]
pub struct LocalInfo {
    /// The source name, `None` for compiler temporaries.
    pub name: Option<NameRef>,
    /// The local-variable-numbering version, zero for temporaries.
    pub unique: u32,
    /// The minimum loop depth among all writes; inference widens loop-
    /// carried variables by this.
    pub min_loops: u32,
}

/// The right-hand side of one binding.
#[derive(Clone, Debug)]
pub enum Rvalue {
    /// A copy of another local.
    Ident(LocalRef),
    /// A reference to a symbol (constant, field, class object).
    Alias(SymbolRef),
    /// A method call.
    Send {
        /// The receiver local.
        recv: LocalRef,
        /// The callee name.
        method: NameRef,
        /// How many of `args` are positional.
        num_pos_args: u16,
        /// Argument locals: positionals, then keyword key/value pairs.
        args: Vec<LocalRef>,
        /// Whether the receiver was implicit.
        is_private_ok: bool,
        /// Whether a literal block was passed.
        has_block: bool,
    },
    /// The value leaving the method through an explicit `return`.
    Return(LocalRef),
    /// The value of one block-body iteration.
    BlockReturn(LocalRef),
    /// The `self` reference.
    LoadSelf,
    /// A literal value.
    Literal(LitKind),
    /// The method argument at the given index.
    LoadArg(u16),
    /// The parameters delivered to a block body.
    LoadYieldParams,
    /// A `T.let`/`T.cast`/`T.unsafe`/`T.absurd` assertion.
    Cast {
        /// The asserted local.
        value: LocalRef,
        /// Which assertion.
        kind: CastKind,
        /// The asserted type.
        ty: Ty,
    },
    /// Something the lowering cannot model; types as untyped.
    Unanalyzable,
    /// The method's result value, where the declared result type is
    /// checked.
    SolveConstraint(LocalRef),
    /// An exhaustiveness assertion on an uninhabited value.
    TAbsurd(LocalRef),
}

/// One `local := rvalue` instruction.
#[derive(Clone, Debug)]
pub struct Binding {
    /// The written local.
    pub target: LocalRef,
    /// The source location the binding is charged to.
    pub loc: Loc,
    /// The computed value.
    pub rvalue: Rvalue,
}

/// How a block ends.
#[derive(Clone, Debug)]
pub enum Terminator {
    /// Unconditional jump.
    Jump(BlockId),
    /// Two-way branch on a boolean-tested local.
    Cond {
        /// The tested local.
        cond: LocalRef,
        /// Taken when truthy.
        then_block: BlockId,
        /// Taken when falsy.
        else_block: BlockId,
    },
    /// Return the given local to the caller.
    Ret(LocalRef),
}

/// One basic block.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    /// The instructions, in order.
    pub bindings: Vec<Binding>,
    /// The terminator.
    pub terminator: Terminator,
    /// The loop depth the block was created at.
    pub loop_depth: u32,
}

/// A lowered method body.
#[derive(Debug)]
pub struct Cfg {
    /// All blocks; `BlockId::ENTRY` is the entry.
    pub blocks: Vec<BasicBlock>,
    /// All locals.
    pub locals: Vec<LocalInfo>,
    /// Blocks in reverse postorder from the entry; the dataflow iteration
    /// order.
    pub topo: Vec<BlockId>,
    /// Predecessors per block.
    pub preds: Vec<Vec<BlockId>>,
}

impl Cfg {
    /// The block behind `id`.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    /// The info behind a local.
    pub fn local(&self, local: LocalRef) -> &LocalInfo {
        &self.locals[local.0 as usize]
    }

    /// The successors of a block.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        match &self.block(id).terminator {
            Terminator::Jump(target) => vec![*target],
            Terminator::Cond {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Ret(_) => vec![],
        }
    }

    pub(crate) fn compute_edges(&mut self) {
        self.preds = vec![Vec::new(); self.blocks.len()];
        for id in 0..self.blocks.len() as u32 {
            let id = BlockId(id);
            for succ in self.successors(id) {
                if !self.preds[succ.0 as usize].contains(&id) {
                    self.preds[succ.0 as usize].push(id);
                }
            }
        }
        // Reverse postorder over the forward graph, used as the
        // topological iteration order for forward dataflow.
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![(BlockId::ENTRY, 0usize)];
        visited[0] = true;
        while let Some((block, child)) = stack.pop() {
            let succs = self.successors(block);
            if child < succs.len() {
                stack.push((block, child + 1));
                let next = succs[child];
                if !visited[next.0 as usize] {
                    visited[next.0 as usize] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        self.topo = postorder;
    }
}
