//! Patch templates: the editor-facing description of a generator graph.
//!
//! A template is an arena of node definitions wired together by
//! [`TemplateKey`] handles. It holds no audio state; the engine spawns an
//! independent graph instance from it for every voice.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use core::fmt;
use slotmap::{new_key_type, SlotMap};

use crate::time::{Pitch, Time};

new_key_type! {
    /// Handle of a node definition inside a [`PatchTemplate`].
    pub struct TemplateKey;
}

/// Range a [`NodeKind::Clamp`] node limits its input to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClampMode {
    /// `[0, 1]`
    Pos,
    /// `[-1, 0]`
    Neg,
    /// `[-1, 1]`
    Full,
}

impl ClampMode {
    pub fn bounds(self) -> (f32, f32) {
        match self {
            ClampMode::Pos => (0.0, 1.0),
            ClampMode::Neg => (-1.0, 0.0),
            ClampMode::Full => (-1.0, 1.0),
        }
    }
}

/// What a template node generates, with its parameters in musical units.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Sine { pitch: Pitch, amp: f32 },
    Square { pitch: Pitch, amp: f32, duty: f32 },
    Sawtooth { pitch: Pitch, amp: f32 },
    Triangle { pitch: Pitch, amp: f32 },
    WhiteNoise { amp: f32 },
    Dc { value: f32 },
    Zero,

    /// Sum of any number of inputs.
    Add,
    /// Equal-weight mix of any number of inputs.
    Batch,
    Min,
    Max,
    Mul,
    Amplify { gain: f32 },
    /// `a * b + c`
    Mad,
    Cube,
    /// `a + (b - a) * t`, inputs ordered `a, b, t`.
    Lerp,
    Clamp { mode: ClampMode },
    Invert,

    LinearAttack { offset: Time, attack: Time },
    LinearDecay { offset: Time, duration: Time, sustain: f32 },
    Adsr { offset: Time, attack: Time, decay: Time, sustain: f32, release: Time },
    Release { release: Time },

    Delay { voices: u16, offset: Time, dampen: f32 },
    Cycle { offset: Time, record: Time },
    Smear { window: Time },
    Stutter { segment: Time, repeats: u16 },
}

impl NodeKind {
    /// Number of fixed input slots, or `None` for nodes taking any number.
    pub fn input_count(&self) -> Option<usize> {
        use NodeKind::*;
        Some(match self {
            Sine { .. } | Square { .. } | Sawtooth { .. } | Triangle { .. } | WhiteNoise { .. }
            | Dc { .. } | Zero => 0,
            Add | Batch => return None,
            Min | Max | Mul => 2,
            Mad | Lerp => 3,
            Amplify { .. } | Cube | Clamp { .. } | Invert => 1,
            LinearAttack { .. } | LinearDecay { .. } | Adsr { .. } | Release { .. } => 1,
            Delay { .. } | Cycle { .. } | Smear { .. } | Stutter { .. } => 1,
        })
    }

    /// Short display label for editor rendering.
    pub fn label(&self) -> &'static str {
        use NodeKind::*;
        match self {
            Sine { .. } => "Sine",
            Square { .. } => "Square",
            Sawtooth { .. } => "Saw",
            Triangle { .. } => "Tri",
            WhiteNoise { .. } => "Noise",
            Dc { .. } => "DC",
            Zero => "Zero",
            Add => "Add",
            Batch => "Batch",
            Min => "Min",
            Max => "Max",
            Mul => "Mul",
            Amplify { .. } => "Amp",
            Mad => "MAD",
            Cube => "Cube",
            Lerp => "Lerp",
            Clamp { .. } => "Clamp",
            Invert => "Invert",
            LinearAttack { .. } => "Attack",
            LinearDecay { .. } => "Decay",
            Adsr { .. } => "ADSR",
            Release { .. } => "Release",
            Delay { .. } => "Delay",
            Cycle { .. } => "Cycle",
            Smear { .. } => "Smear",
            Stutter { .. } => "Stutter",
        }
    }
}

/// A node definition and its input wiring.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateNode {
    pub kind: NodeKind,
    /// Input slots; `None` is an unconnected input.
    pub inputs: Vec<Option<TemplateKey>>,
}

impl TemplateNode {
    fn new(kind: NodeKind) -> Self {
        let inputs = alloc::vec![None; kind.input_count().unwrap_or(0)];
        Self { kind, inputs }
    }

    /// Connected inputs, skipping empty slots.
    pub fn children(&self) -> impl Iterator<Item = TemplateKey> + '_ {
        self.inputs.iter().flatten().copied()
    }
}

/// Error from editing a [`PatchTemplate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// The key doesn't name a node in this template.
    UnknownNode,
    /// The node has no input slot with that index.
    NoSuchInput { index: usize },
    /// The edge would make the child an ancestor of itself.
    WouldCycle,
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::UnknownNode => write!(f, "unknown template node"),
            PatchError::NoSuchInput { index } => write!(f, "node has no input {}", index),
            PatchError::WouldCycle => write!(f, "connection would create a cycle"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PatchError {}

/// An editable generator graph description.
#[derive(Clone, Debug, Default)]
pub struct PatchTemplate {
    pub name: ArrayString<32>,
    nodes: SlotMap<TemplateKey, TemplateNode>,
    root: Option<TemplateKey>,
}

impl PatchTemplate {
    /// Create an empty template. Names longer than 32 bytes are truncated.
    pub fn new(name: &str) -> Self {
        let mut label = ArrayString::new();
        for c in name.chars() {
            if label.try_push(c).is_err() {
                break;
            }
        }
        Self {
            name: label,
            nodes: SlotMap::with_key(),
            root: None,
        }
    }

    /// Add an unconnected node and return its key.
    pub fn add(&mut self, kind: NodeKind) -> TemplateKey {
        self.nodes.insert(TemplateNode::new(kind))
    }

    /// Look up a node.
    pub fn node(&self, key: TemplateKey) -> Option<&TemplateNode> {
        self.nodes.get(key)
    }

    /// Number of nodes in the template.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node whose output is the patch output.
    pub fn root(&self) -> Option<TemplateKey> {
        self.root
    }

    pub fn set_root(&mut self, key: TemplateKey) -> Result<(), PatchError> {
        if !self.nodes.contains_key(key) {
            return Err(PatchError::UnknownNode);
        }
        self.root = Some(key);
        Ok(())
    }

    /// Wire `child` into input slot `index` of `parent`.
    ///
    /// Nodes taking any number of inputs grow by one slot when `index`
    /// equals their current input count. The edge is refused if `child`
    /// already reaches `parent`.
    pub fn connect(
        &mut self,
        parent: TemplateKey,
        index: usize,
        child: TemplateKey,
    ) -> Result<(), PatchError> {
        if !self.nodes.contains_key(child) {
            return Err(PatchError::UnknownNode);
        }
        let node = self.nodes.get(parent).ok_or(PatchError::UnknownNode)?;
        let variadic = node.kind.input_count().is_none();
        if index > node.inputs.len() || (index == node.inputs.len() && !variadic) {
            return Err(PatchError::NoSuchInput { index });
        }
        if self.reaches(child, parent) {
            return Err(PatchError::WouldCycle);
        }
        let node = &mut self.nodes[parent];
        if index == node.inputs.len() {
            node.inputs.push(Some(child));
        } else {
            node.inputs[index] = Some(child);
        }
        Ok(())
    }

    /// Append `child` as a new input of a node taking any number of inputs.
    pub fn push_input(&mut self, parent: TemplateKey, child: TemplateKey) -> Result<(), PatchError> {
        let index = self.nodes.get(parent).ok_or(PatchError::UnknownNode)?.inputs.len();
        self.connect(parent, index, child)
    }

    /// Clear input slot `index` of `parent`.
    pub fn disconnect(&mut self, parent: TemplateKey, index: usize) -> Result<(), PatchError> {
        let node = self.nodes.get_mut(parent).ok_or(PatchError::UnknownNode)?;
        let slot = node
            .inputs
            .get_mut(index)
            .ok_or(PatchError::NoSuchInput { index })?;
        *slot = None;
        Ok(())
    }

    /// Remove a node and every edge pointing at it.
    pub fn remove(&mut self, key: TemplateKey) -> Option<TemplateNode> {
        let removed = self.nodes.remove(key)?;
        for node in self.nodes.values_mut() {
            for slot in node.inputs.iter_mut() {
                if *slot == Some(key) {
                    *slot = None;
                }
            }
        }
        if self.root == Some(key) {
            self.root = None;
        }
        Some(removed)
    }

    /// Whether `to` is reachable from `from` through input edges.
    pub fn reaches(&self, from: TemplateKey, to: TemplateKey) -> bool {
        let mut stack = alloc::vec![from];
        let mut seen: Vec<TemplateKey> = Vec::new();
        while let Some(key) = stack.pop() {
            if key == to {
                return true;
            }
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            if let Some(node) = self.nodes.get(key) {
                stack.extend(node.children());
            }
        }
        false
    }
}

impl PatchTemplate {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, key: TemplateKey) -> fmt::Result {
        let Some(node) = self.nodes.get(key) else {
            return f.write_str("?");
        };
        f.write_str(node.kind.label())?;
        if node.inputs.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, input) in node.inputs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match input {
                Some(child) => self.write_node(f, *child)?,
                None => f.write_str("_")?,
            }
        }
        f.write_str(")")
    }
}

/// `name: Root(Child, ...)`, one label per node, `_` for an unconnected
/// input. A shared node is written under each parent.
impl fmt::Display for PatchTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        match self.root {
            Some(root) => self.write_node(f, root),
            None => f.write_str("(empty)"),
        }
    }
}
