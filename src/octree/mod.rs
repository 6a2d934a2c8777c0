//! Generic octree over bounded objects
//!
//! Objects are queued with [`Octree::add`] and only become visible to queries after
//! [`Octree::update_tree`]. The first update builds the whole tree (sizing a zero
//! region to fit its objects); later updates insert incrementally and fall back to a
//! full rebuild when an object lands outside the root region. A root that is still an
//! empty leaf takes any object as is.
//!
//! A node only splits when its octants stay at least `minimum_size` on every axis.
//!
//! Nodes live in an arena owned by the tree. Each node stores its parent's index so
//! removals can prune empty branches upward.

mod bounds;
mod node;

pub use bounds::{Bounded, Bounds};

use std::collections::VecDeque;

use crate::core::{Error, Result};
use crate::core::types::Vec3;
use crate::math::{Aabb, BoundingSphere, Frustum, Ray};
use node::Node;

/// Default minimum leaf edge length
pub const DEFAULT_MINIMUM_SIZE: f32 = 1.0;

const ROOT: u32 = 0;

/// One object matched by a query. `distance` is only set for ray queries.
#[derive(Debug)]
pub struct Intersection<'a, T> {
    pub object: &'a T,
    pub distance: Option<f32>,
}

impl<'a, T> Intersection<'a, T> {
    fn new(object: &'a T, distance: Option<f32>) -> Self {
        Self { object, distance }
    }
}

/// Shape of one reachable node, as reported by [`Octree::structure`]
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSummary {
    pub depth: u32,
    pub region: Aabb,
    /// Objects stored at this node (not below it)
    pub objects: usize,
    pub mask: u8,
}

/// Sparse octree of [`Bounded`] objects
#[derive(Clone, Debug)]
pub struct Octree<T> {
    /// Node arena (root is at index 0)
    nodes: Vec<Node<T>>,
    /// Arena slots released by pruning
    free: Vec<u32>,
    /// Objects added since the last `update_tree`
    pending: VecDeque<T>,
    minimum_size: f32,
    built: bool,
}

impl<T: Bounded> Default for Octree<T> {
    fn default() -> Self {
        Self::new(Aabb::default(), DEFAULT_MINIMUM_SIZE)
    }
}

impl<T: Bounded> Octree<T> {
    /// Create an empty tree over `region`. A zero-volume region is sized on first build.
    pub fn new(region: Aabb, minimum_size: f32) -> Self {
        let minimum_size = if minimum_size > 0.0 { minimum_size } else { DEFAULT_MINIMUM_SIZE };
        Self {
            nodes: vec![Node::new(region, Vec::new(), None)],
            free: Vec::new(),
            pending: VecDeque::new(),
            minimum_size,
            built: false,
        }
    }

    /// Queue an object for the next [`Octree::update_tree`].
    pub fn add(&mut self, item: T) -> Result<()> {
        let bounds = item.bounds();
        if bounds.is_empty() {
            return Err(Error::InvalidBounds(format!("{:?}", bounds)));
        }
        self.pending.push_back(item);
        Ok(())
    }

    /// Queue many objects. Nothing is queued if any of them carries empty bounds.
    pub fn add_all<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if let Some(bad) = items.iter().map(Bounded::bounds).find(Bounds::is_empty) {
            return Err(Error::InvalidBounds(format!("{:?}", bad)));
        }
        self.pending.extend(items);
        Ok(())
    }

    /// Materialize queued objects into the tree.
    pub fn update_tree(&mut self) {
        if !self.built {
            let queued: Vec<T> = self.pending.drain(..).collect();
            let root = &mut self.nodes[ROOT as usize];
            root.objects.extend(queued);
            if root.region.is_degenerate() {
                if let Some(tight) = tight_bounds(&root.objects) {
                    root.region = enclosing_cube(&tight, self.minimum_size);
                }
            }
            self.build(ROOT);
            self.built = true;
            log::debug!(
                "octree built: {} objects, {} nodes, region {:?}",
                self.object_count(),
                self.node_count(),
                self.region()
            );
            return;
        }

        while let Some(item) = self.pending.pop_front() {
            self.insert(item);
        }
    }

    /// Remove one object equal to `item`, pruning branches left empty.
    /// Returns false when nothing matched.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        if let Some(pos) = self.pending.iter().position(|p| p == item) {
            self.pending.remove(pos);
            return true;
        }

        let found = self.reachable().into_iter().find_map(|(idx, _)| {
            self.nodes[idx as usize]
                .objects
                .iter()
                .position(|o| o == item)
                .map(|pos| (idx, pos))
        });
        let Some((idx, pos)) = found else {
            return false;
        };

        self.nodes[idx as usize].objects.remove(pos);
        self.prune(idx);
        true
    }

    // --- queries ---

    /// Objects touching or overlapping `aabb`
    pub fn intersects_box(&self, aabb: &Aabb) -> Vec<Intersection<'_, T>> {
        let mut hits = Vec::new();
        self.walk(ROOT, &|region: &Aabb| region.intersects(aabb), &mut |object| {
            if object.intersects_aabb(aabb) {
                hits.push(Intersection::new(object, None));
            }
        });
        hits
    }

    /// Objects hit by `ray`, with the distance to each hit
    pub fn intersects_ray(&self, ray: &Ray) -> Vec<Intersection<'_, T>> {
        let mut hits = Vec::new();
        self.walk(ROOT, &|region: &Aabb| ray.intersects_aabb(region).is_some(), &mut |object| {
            if let Some(t) = object.intersects_ray(ray) {
                hits.push(Intersection::new(object, Some(t)));
            }
        });
        hits
    }

    /// Closest object hit by `ray`. On ties the first one found wins.
    pub fn nearest_intersection(&self, ray: &Ray) -> Option<Intersection<'_, T>> {
        let mut nearest: Option<Intersection<'_, T>> = None;
        for hit in self.intersects_ray(ray) {
            let t = hit.distance.unwrap_or(f32::INFINITY);
            let closer = match &nearest {
                Some(best) => t < best.distance.unwrap_or(f32::INFINITY),
                None => true,
            };
            if closer {
                nearest = Some(hit);
            }
        }
        nearest
    }

    /// Objects overlapping `sphere`. Children are pruned by the sphere's bounding box,
    /// objects are tested against the sphere itself.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> Vec<Intersection<'_, T>> {
        let reach = sphere.bounding_box();
        let mut hits = Vec::new();
        self.walk(ROOT, &|region: &Aabb| region.intersects(&reach), &mut |object| {
            if object.intersects_sphere(sphere) {
                hits.push(Intersection::new(object, None));
            }
        });
        hits
    }

    /// Objects at least partially inside `frustum`
    pub fn intersects_frustum(&self, frustum: &Frustum) -> Vec<Intersection<'_, T>> {
        let mut hits = Vec::new();
        self.walk(ROOT, &|region: &Aabb| frustum.contains_aabb(region).overlaps(), &mut |object| {
            if object.intersects_frustum(frustum) {
                hits.push(Intersection::new(object, None));
            }
        });
        hits
    }

    /// Objects overlapping the volume of another bounded object
    pub fn intersects_object<B>(&self, other: &B) -> Vec<Intersection<'_, T>>
    where
        B: Bounded + ?Sized,
    {
        let bounds = other.bounds();
        let mut hits = Vec::new();
        self.walk(ROOT, &|region: &Aabb| bounds.intersects_aabb(region), &mut |object| {
            if object.intersects_bounds(&bounds) {
                hits.push(Intersection::new(object, None));
            }
        });
        hits
    }

    // --- introspection ---

    /// Region covered by the root node
    pub fn region(&self) -> Aabb {
        self.nodes[ROOT as usize].region
    }

    pub fn minimum_size(&self) -> f32 {
        self.minimum_size
    }

    /// Objects in the tree, excluding pending ones
    pub fn object_count(&self) -> usize {
        self.reachable()
            .into_iter()
            .map(|(idx, _)| self.nodes[idx as usize].objects.len())
            .sum()
    }

    /// Every object in the tree (pre-order by node), then the pending queue
    pub fn objects(&self) -> impl Iterator<Item = &T> + '_ {
        self.reachable()
            .into_iter()
            .flat_map(|(idx, _)| self.nodes[idx as usize].objects.iter())
            .chain(self.pending.iter())
    }

    /// Nodes reachable from the root, the root included
    pub fn node_count(&self) -> usize {
        self.reachable().len()
    }

    /// Active-child mask of the root
    pub fn octant_mask(&self) -> u8 {
        self.nodes[ROOT as usize].active
    }

    pub fn has_children(&self) -> bool {
        self.octant_mask() != 0
    }

    /// Built, with nothing waiting in the queue
    pub fn is_ready(&self) -> bool {
        self.built && self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pre-order description of every reachable node
    pub fn structure(&self) -> Vec<NodeSummary> {
        self.reachable()
            .into_iter()
            .map(|(idx, depth)| {
                let node = &self.nodes[idx as usize];
                NodeSummary {
                    depth,
                    region: node.region,
                    objects: node.objects.len(),
                    mask: node.active,
                }
            })
            .collect()
    }

    /// Log the tree layout at debug level
    pub fn dump(&self) {
        for summary in self.structure() {
            log::debug!(
                "{:indent$}[{:.2?} .. {:.2?}] objects={} mask={:08b}",
                "",
                summary.region.min,
                summary.region.max,
                summary.objects,
                summary.mask,
                indent = summary.depth as usize * 2
            );
        }
    }

    // --- internals ---

    /// Split `idx` recursively, pushing every fully contained object into its octant.
    fn build(&mut self, idx: u32) {
        let region = self.nodes[idx as usize].region;
        if self.nodes[idx as usize].objects.len() <= 1 || !self.can_split(&region) {
            return;
        }

        let octants: [Aabb; 8] = std::array::from_fn(|i| region.child_octant(i as u8));
        let mut buckets: [Vec<T>; 8] = Default::default();
        let mut straddling = Vec::new();

        for object in std::mem::take(&mut self.nodes[idx as usize].objects) {
            let bounds = object.bounds();
            match octants.iter().position(|octant| bounds.fits_in(octant)) {
                Some(i) => buckets[i].push(object),
                None => straddling.push(object),
            }
        }
        self.nodes[idx as usize].objects = straddling;

        for (i, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let child = self.alloc(octants[i], bucket, idx);
            self.nodes[idx as usize].set_child(i as u8, Some(child));
            self.build(child);
        }
    }

    /// Place one object into an already built tree.
    fn insert(&mut self, item: T) {
        if self.nodes[ROOT as usize].is_leaf_candidate() {
            self.nodes[ROOT as usize].objects.push(item);
            return;
        }

        let bounds = item.bounds();
        let root_region = self.region();
        if root_region.is_degenerate() || !bounds.fits_in(&root_region) {
            self.rebuild(item);
            return;
        }

        let mut idx = ROOT;
        loop {
            let node = &self.nodes[idx as usize];
            if node.is_leaf_candidate() || !self.can_split(&node.region) {
                break;
            }

            let region = node.region;
            let Some(octant) = (0..8u8).find(|&i| bounds.fits_in(&region.child_octant(i))) else {
                break;
            };

            idx = match node.child(octant) {
                Some(child) => child,
                None => {
                    let child = self.alloc(region.child_octant(octant), Vec::new(), idx);
                    self.nodes[idx as usize].set_child(octant, Some(child));
                    child
                }
            };
        }

        self.nodes[idx as usize].objects.push(item);
    }

    /// Rebuild from scratch around every stored object plus `item`.
    fn rebuild(&mut self, item: T) {
        let old_region = self.region();
        let mut objects: Vec<T> = self
            .nodes
            .iter_mut()
            .flat_map(|node| std::mem::take(&mut node.objects))
            .collect();
        objects.push(item);

        let mut extent = tight_bounds(&objects).unwrap_or(old_region);
        if !old_region.is_degenerate() {
            extent = extent.merged(&old_region);
        }
        let region = enclosing_cube(&extent, self.minimum_size);
        log::debug!("octree rebuild: {:?} -> {:?} ({} objects)", old_region, region, objects.len());

        self.nodes.clear();
        self.free.clear();
        self.nodes.push(Node::new(region, objects, None));
        self.build(ROOT);
    }

    /// Detach empty nodes from `idx` upward.
    fn prune(&mut self, mut idx: u32) {
        while let Some(parent) = self.nodes[idx as usize].parent {
            if !self.nodes[idx as usize].is_empty() {
                break;
            }
            if let Some(slot) = self.nodes[parent as usize].slot_of(idx) {
                self.nodes[parent as usize].set_child(slot, None);
            }
            self.free.push(idx);
            idx = parent;
        }
    }

    fn alloc(&mut self, region: Aabb, objects: Vec<T>, parent: u32) -> u32 {
        let node = Node::new(region, objects, Some(parent));
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    /// Octants of `region` would still be at least the minimum size on every axis
    fn can_split(&self, region: &Aabb) -> bool {
        (region.size() * 0.5).min_element() >= self.minimum_size
    }

    /// Depth-first visit of `idx`: every local object, then each child `enter` accepts.
    fn walk<'a, E, V>(&'a self, idx: u32, enter: &E, visit: &mut V)
    where
        E: Fn(&Aabb) -> bool,
        V: FnMut(&'a T),
    {
        let node = &self.nodes[idx as usize];
        if node.is_empty() {
            return;
        }
        for object in &node.objects {
            visit(object);
        }
        for &child in node.children.iter().flatten() {
            if enter(&self.nodes[child as usize].region) {
                self.walk(child, enter, visit);
            }
        }
    }

    /// (index, depth) of every reachable node, pre-order
    fn reachable(&self) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        let mut stack = vec![(ROOT, 0u32)];
        while let Some((idx, depth)) = stack.pop() {
            out.push((idx, depth));
            let node = &self.nodes[idx as usize];
            for &child in node.children.iter().rev().flatten() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

/// Union of the bounding boxes of `objects`
fn tight_bounds<T: Bounded>(objects: &[T]) -> Option<Aabb> {
    objects
        .iter()
        .map(|o| o.bounds().bounding_box())
        .reduce(|a, b| a.merged(&b))
}

/// Cube anchored at `extent.min` whose side is the smallest power of two
/// covering the largest extent and `minimum_size` (at least 1).
fn enclosing_cube(extent: &Aabb, minimum_size: f32) -> Aabb {
    let largest = extent.size().max_element().max(minimum_size).ceil();
    let side = if largest <= 1.0 { 1.0 } else { largest.log2().ceil().exp2() };
    Aabb::new(extent.min, extent.min + Vec3::splat(side))
}
