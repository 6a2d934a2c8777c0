//! Octree arena node

use crate::math::Aabb;

/// One region of the tree. Children and parent are indices into the owning arena.
#[derive(Clone, Debug)]
pub(crate) struct Node<T> {
    pub region: Aabb,
    /// Objects that straddle octant boundaries, or every object of a leaf
    pub objects: Vec<T>,
    pub children: [Option<u32>; 8],
    /// Bit i set when `children[i]` exists
    pub active: u8,
    /// Back-reference for upward pruning; `None` for the root
    pub parent: Option<u32>,
}

impl<T> Node<T> {
    pub fn new(region: Aabb, objects: Vec<T>, parent: Option<u32>) -> Self {
        Self {
            region,
            objects,
            children: [None; 8],
            active: 0,
            parent,
        }
    }

    /// No children and at most one object
    pub fn is_leaf_candidate(&self) -> bool {
        self.active == 0 && self.objects.len() <= 1
    }

    /// Nothing stored here or below
    pub fn is_empty(&self) -> bool {
        self.active == 0 && self.objects.is_empty()
    }

    pub fn set_child(&mut self, index: u8, child: Option<u32>) {
        debug_assert!(index < 8);
        self.children[index as usize] = child;
        if child.is_some() {
            self.active |= 1 << index;
        } else {
            self.active &= !(1 << index);
        }
    }

    pub fn child(&self, index: u8) -> Option<u32> {
        self.children[index as usize]
    }

    /// Octant slot holding `child`, if it is one of ours
    pub fn slot_of(&self, child: u32) -> Option<u8> {
        self.children.iter().position(|c| *c == Some(child)).map(|i| i as u8)
    }
}
