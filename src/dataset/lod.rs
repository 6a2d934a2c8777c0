//! Level of detail: one resolution tier of a set version
//!
//! Each level owns an octree of cube-space cells and the affine mapping between
//! world space (where queries arrive) and its integer cube grid. The mapping is
//! a per-axis scale plus offset:
//!
//! - `ratio = (world.max - world.min) / set_size`
//! - `cube = (world - world.min) / ratio`
//! - `world = cube * ratio + world.min`
//!
//! An axis whose set size is zero uses a ratio of 1 on that axis.

use std::fmt;
use std::str::FromStr;

use crate::core::{Error, Result};
use crate::core::types::{IVec3, Vec2, Vec3};
use crate::math::{Aabb, BoundingSphere};
use crate::octree::Octree;
use super::CubeBounds;

const X_PLACEHOLDER: &str = "{x}";
const Y_PLACEHOLDER: &str = "{y}";
const Z_PLACEHOLDER: &str = "{z}";
const FORMAT_PLACEHOLDER: &str = "{format}";

/// Model payload encodings a level can serve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Obj,
    #[default]
    Ebo,
    Ctm,
}

impl ModelFormat {
    /// File extension used in model templates
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Obj => "obj",
            ModelFormat::Ebo => "ebo",
            ModelFormat::Ctm => "ctm",
        }
    }

    /// Parse an optional caller-supplied format; `None` or empty means the default.
    pub fn parse_or_default(format: Option<&str>) -> Result<Self> {
        match format {
            None => Ok(ModelFormat::default()),
            Some(s) if s.trim().is_empty() => Ok(ModelFormat::default()),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for ModelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "obj" => Ok(ModelFormat::Obj),
            "ebo" => Ok(ModelFormat::Ebo),
            "ctm" => Ok(ModelFormat::Ctm),
            _ => Err(Error::not_found(format!("model format '{}'", s))),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One level of detail of a set version
#[derive(Clone, Debug)]
pub struct LevelOfDetail {
    name: String,
    number: i32,
    cubes: Octree<CubeBounds>,
    /// Grid extent in cube units
    set_size: Vec3,
    /// World extent this level represents; drives the transform
    world_bounds: Aabb,
    /// Extent of the actual model data
    model_bounds: Aabb,
    texture_set_size: Vec2,
    vertex_count: u64,
    metadata_uri: String,
    texture_template: String,
    model_template: String,
    /// Derived from `world_bounds` and `set_size`, never set directly
    ratio: Vec3,
}

impl LevelOfDetail {
    /// Create a level over a built octree.
    ///
    /// # Arguments
    /// * `name` - Level name, e.g. `"L2"`
    /// * `number` - Numeric ordering index
    /// * `cubes` - Octree of the level's cells in cube space
    /// * `set_size` - Grid extent in cube units
    /// * `world_bounds` - World-space extent the grid maps onto
    pub fn new(
        name: impl Into<String>,
        number: i32,
        cubes: Octree<CubeBounds>,
        set_size: Vec3,
        world_bounds: Aabb,
    ) -> Self {
        let mut lod = Self {
            name: name.into(),
            number,
            cubes,
            set_size,
            world_bounds,
            model_bounds: world_bounds,
            texture_set_size: Vec2::ZERO,
            vertex_count: 0,
            metadata_uri: String::new(),
            texture_template: String::new(),
            model_template: String::new(),
            ratio: Vec3::ONE,
        };
        lod.update_ratio();
        lod
    }

    pub fn with_model_bounds(mut self, model_bounds: Aabb) -> Self {
        self.model_bounds = model_bounds;
        self
    }

    pub fn with_texture_set_size(mut self, texture_set_size: Vec2) -> Self {
        self.texture_set_size = texture_set_size;
        self
    }

    pub fn with_vertex_count(mut self, vertex_count: u64) -> Self {
        self.vertex_count = vertex_count;
        self
    }

    /// Attach the metadata location and the resolved payload templates.
    /// Templates use `{x}`, `{y}`, `{z}` and `{format}` placeholders.
    pub fn with_sources(
        mut self,
        metadata_uri: impl Into<String>,
        texture_template: impl Into<String>,
        model_template: impl Into<String>,
    ) -> Self {
        self.metadata_uri = metadata_uri.into();
        self.texture_template = texture_template.into();
        self.model_template = model_template.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn cubes(&self) -> &Octree<CubeBounds> {
        &self.cubes
    }

    pub fn set_size(&self) -> Vec3 {
        self.set_size
    }

    pub fn world_bounds(&self) -> Aabb {
        self.world_bounds
    }

    pub fn model_bounds(&self) -> Aabb {
        self.model_bounds
    }

    pub fn texture_set_size(&self) -> Vec2 {
        self.texture_set_size
    }

    pub fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    pub fn metadata_uri(&self) -> &str {
        &self.metadata_uri
    }

    pub fn texture_template(&self) -> &str {
        &self.texture_template
    }

    pub fn model_template(&self) -> &str {
        &self.model_template
    }

    /// World units per cube unit, per axis
    pub fn world_to_cube_ratio(&self) -> Vec3 {
        self.ratio
    }

    pub fn set_set_size(&mut self, set_size: Vec3) {
        self.set_size = set_size;
        self.update_ratio();
    }

    pub fn set_world_bounds(&mut self, world_bounds: Aabb) {
        self.world_bounds = world_bounds;
        self.update_ratio();
    }

    fn update_ratio(&mut self) {
        let extent = self.world_bounds.size();
        let zero = self.set_size.cmpeq(Vec3::ZERO);
        // Divide by one on degenerate axes; their ratio is replaced below anyway.
        let divisor = Vec3::select(zero, Vec3::ONE, self.set_size);
        self.ratio = Vec3::select(zero, Vec3::ONE, extent / divisor);
    }

    /// Convert a world-space point to cube space.
    ///
    /// # Examples
    /// ```
    /// use cubeserve::dataset::LevelOfDetail;
    /// use cubeserve::math::Aabb;
    /// use cubeserve::octree::Octree;
    /// use glam::Vec3;
    ///
    /// let world = Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0));
    /// let lod = LevelOfDetail::new("L0", 0, Octree::default(), Vec3::splat(4.0), world);
    /// assert_eq!(lod.to_cube(Vec3::new(-5.0, 5.0, 0.0)), Vec3::new(1.0, 3.0, 2.0));
    /// ```
    pub fn to_cube(&self, world: Vec3) -> Vec3 {
        (world - self.world_bounds.min) / self.ratio
    }

    /// Convert a cube-space point to world space.
    ///
    /// # Examples
    /// ```
    /// use cubeserve::dataset::LevelOfDetail;
    /// use cubeserve::math::Aabb;
    /// use cubeserve::octree::Octree;
    /// use glam::Vec3;
    ///
    /// let world = Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0));
    /// let lod = LevelOfDetail::new("L0", 0, Octree::default(), Vec3::splat(4.0), world);
    /// assert_eq!(lod.to_world(Vec3::new(1.0, 3.0, 2.0)), Vec3::new(-5.0, 5.0, 0.0));
    /// ```
    pub fn to_world(&self, cube: Vec3) -> Vec3 {
        cube * self.ratio + self.world_bounds.min
    }

    /// Convert a world-space box to cube space, corner by corner
    pub fn box_to_cube(&self, world: &Aabb) -> Aabb {
        Aabb::new(self.to_cube(world.min), self.to_cube(world.max))
    }

    /// Convert a cube-space box to world space, corner by corner
    pub fn box_to_world(&self, cube: &Aabb) -> Aabb {
        Aabb::new(self.to_world(cube.min), self.to_world(cube.max))
    }

    /// Map a world sphere into cube space. The radius is scaled by the x-axis
    /// ratio only, so non-uniform levels see a distorted sphere.
    pub fn sphere_to_cube(&self, center: Vec3, radius: f32) -> BoundingSphere {
        BoundingSphere::new(self.to_cube(center), radius / self.ratio.x)
    }

    /// World-space center of the cell containing `world`
    pub fn snap_to_cell_center(&self, world: Vec3) -> Vec3 {
        self.to_world(self.to_cube(world).floor() + Vec3::splat(0.5))
    }

    /// Cells touching a world-space box
    pub fn query_box(&self, world: &Aabb) -> Vec<IVec3> {
        let cube_box = self.box_to_cube(world);
        self.cubes
            .intersects_box(&cube_box)
            .into_iter()
            .map(|hit| hit.object.grid_coordinate())
            .collect()
    }

    /// Cells overlapping a world-space sphere
    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<IVec3> {
        let sphere = self.sphere_to_cube(center, radius);
        self.cubes
            .intersects_sphere(&sphere)
            .into_iter()
            .map(|hit| hit.object.grid_coordinate())
            .collect()
    }

    /// The 3x3x3 block of cells around the cell containing `world`.
    ///
    /// The probe box spans one unit either side of the cell center, so it
    /// overlaps exactly the 27 surrounding cells by half a unit and does not
    /// touch the ring beyond them.
    pub fn query_neighborhood(&self, world: Vec3) -> Vec<IVec3> {
        let center = self.to_cube(world).floor() + Vec3::splat(0.5);
        let probe = Aabb::from_center_half_extent(center, Vec3::ONE);
        self.cubes
            .intersects_box(&probe)
            .into_iter()
            .map(|hit| hit.object.grid_coordinate())
            .collect()
    }

    /// Texture location for cell column (x, y)
    pub fn texture_uri(&self, x: i32, y: i32) -> String {
        self.texture_template
            .replace(X_PLACEHOLDER, &x.to_string())
            .replace(Y_PLACEHOLDER, &y.to_string())
    }

    /// Model location for cell (x, y, z) in `format`
    pub fn model_uri(&self, x: i32, y: i32, z: i32, format: ModelFormat) -> String {
        self.model_template
            .replace(X_PLACEHOLDER, &x.to_string())
            .replace(Y_PLACEHOLDER, &y.to_string())
            .replace(Z_PLACEHOLDER, &z.to_string())
            .replace(FORMAT_PLACEHOLDER, format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn empty_lod(world: Aabb, set_size: Vec3) -> LevelOfDetail {
        LevelOfDetail::new("L1", 1, Octree::default(), set_size, world)
    }

    fn diagonal_lod() -> LevelOfDetail {
        let name: Arc<str> = Arc::from("L1");
        let mut tree = Octree::default();
        tree.add_all((0..4).map(|i| CubeBounds::unit(IVec3::splat(i), name.clone()))).unwrap();
        tree.update_tree();
        let set_size = tree.region().size();
        LevelOfDetail::new("L1", 1, tree, set_size, Aabb::new(Vec3::ZERO, Vec3::splat(40.0)))
    }

    #[test]
    fn test_transform() {
        let lod = empty_lod(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)), Vec3::splat(4.0));
        assert_eq!(lod.world_to_cube_ratio(), Vec3::splat(5.0));
        assert_eq!(lod.to_world(Vec3::new(1.0, 3.0, 2.0)), Vec3::new(-5.0, 5.0, 0.0));
        assert_eq!(lod.to_cube(Vec3::new(-5.0, 5.0, 0.0)), Vec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_box_to_world_uses_min_offset() {
        let lod = empty_lod(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)), Vec3::splat(4.0));
        let world = lod.box_to_world(&Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(world.min, Vec3::splat(-10.0));
        assert_eq!(world.max, Vec3::splat(-5.0));
        assert_eq!(lod.box_to_cube(&world), Aabb::new(Vec3::ZERO, Vec3::ONE));
    }

    #[test]
    fn test_degenerate_axis_uses_unit_ratio() {
        let mut lod = empty_lod(Aabb::new(Vec3::ZERO, Vec3::new(40.0, 40.0, 8.0)), Vec3::new(4.0, 0.0, 2.0));
        assert_eq!(lod.world_to_cube_ratio(), Vec3::new(10.0, 1.0, 4.0));

        lod.set_set_size(Vec3::ZERO);
        assert_eq!(lod.world_to_cube_ratio(), Vec3::ONE);
        assert_eq!(lod.to_cube(Vec3::new(3.0, 4.0, 5.0)), Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn test_ratio_follows_inputs() {
        let mut lod = empty_lod(Aabb::new(Vec3::ZERO, Vec3::splat(40.0)), Vec3::splat(4.0));
        assert_eq!(lod.world_to_cube_ratio(), Vec3::splat(10.0));
        lod.set_world_bounds(Aabb::new(Vec3::ZERO, Vec3::splat(80.0)));
        assert_eq!(lod.world_to_cube_ratio(), Vec3::splat(20.0));
        lod.set_set_size(Vec3::splat(8.0));
        assert_eq!(lod.world_to_cube_ratio(), Vec3::splat(10.0));
    }

    #[test]
    fn test_box_query() {
        let lod = diagonal_lod();
        let hits = lod.query_box(&Aabb::new(Vec3::splat(10.0), Vec3::splat(20.0)));
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], IVec3::ZERO);
    }

    #[test]
    fn test_neighborhood() {
        let lod = diagonal_lod();
        let hits = lod.query_neighborhood(Vec3::splat(15.0));
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], IVec3::ZERO);

        let hits = lod.query_neighborhood(Vec3::splat(25.0));
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], IVec3::ONE);
    }

    #[test]
    fn test_neighborhood_is_exactly_3x3x3() {
        let name: Arc<str> = Arc::from("L0");
        let mut tree = Octree::default();
        let mut cells = Vec::new();
        for x in 0..6 {
            for y in 0..6 {
                for z in 0..6 {
                    cells.push(CubeBounds::unit(IVec3::new(x, y, z), name.clone()));
                }
            }
        }
        tree.add_all(cells).unwrap();
        tree.update_tree();
        let lod = LevelOfDetail::new("L0", 0, tree, Vec3::splat(8.0), Aabb::new(Vec3::ZERO, Vec3::splat(8.0)));

        let mut hits = lod.query_neighborhood(Vec3::new(2.3, 2.9, 2.0));
        hits.sort_by_key(|c| (c.x, c.y, c.z));
        assert_eq!(hits.len(), 27);
        assert_eq!(hits[0], IVec3::ONE);
        assert_eq!(hits[26], IVec3::splat(3));
    }

    #[test]
    fn test_sphere_radius_uses_x_ratio() {
        // y is stretched twice as much as x and z.
        let name: Arc<str> = Arc::from("L0");
        let mut tree = Octree::default();
        tree.add_all([
            CubeBounds::unit(IVec3::ZERO, name.clone()),
            CubeBounds::unit(IVec3::new(0, 1, 0), name.clone()),
            CubeBounds::unit(IVec3::new(3, 3, 3), name),
        ])
        .unwrap();
        tree.update_tree();
        let world = Aabb::new(Vec3::ZERO, Vec3::new(40.0, 80.0, 40.0));
        let lod = LevelOfDetail::new("L0", 0, tree, Vec3::splat(4.0), world);

        let sphere = lod.sphere_to_cube(Vec3::splat(5.0), 10.0);
        assert_eq!(sphere.center, Vec3::new(0.5, 0.25, 0.5));
        assert_eq!(sphere.radius, 1.0);

        // The (0,1,0) cell starts 15 world units above the center, outside a
        // radius of 10, yet the x-scaled cube-space sphere still reaches it.
        let mut hits = lod.query_sphere(Vec3::splat(5.0), 10.0);
        hits.sort_by_key(|c| (c.x, c.y, c.z));
        assert_eq!(hits, vec![IVec3::ZERO, IVec3::new(0, 1, 0)]);
    }

    #[test]
    fn test_snap_to_cell_center() {
        let lod = empty_lod(Aabb::new(Vec3::ZERO, Vec3::splat(40.0)), Vec3::splat(4.0));
        assert_eq!(lod.snap_to_cell_center(Vec3::new(12.0, 39.0, 0.5)), Vec3::new(15.0, 35.0, 5.0));
    }

    #[test]
    fn test_templates() {
        let lod = empty_lod(Aabb::new(Vec3::ZERO, Vec3::ONE), Vec3::ONE).with_sources(
            "https://blob.example/set/v1/L2/metadata.json",
            "https://blob.example/set/v1/L2/texture/{x}_{y}.jpg",
            "https://blob.example/set/v1/L2/{x}_{y}_{z}.{format}",
        );
        assert_eq!(lod.texture_uri(3, -1), "https://blob.example/set/v1/L2/texture/3_-1.jpg");
        assert_eq!(
            lod.model_uri(1, 2, 3, ModelFormat::Ctm),
            "https://blob.example/set/v1/L2/1_2_3.ctm"
        );
    }

    #[test]
    fn test_model_format_parse() {
        assert_eq!("OBJ".parse::<ModelFormat>().unwrap(), ModelFormat::Obj);
        assert_eq!(ModelFormat::parse_or_default(None).unwrap(), ModelFormat::Ebo);
        assert_eq!(ModelFormat::parse_or_default(Some("Ctm")).unwrap(), ModelFormat::Ctm);
        assert!("fbx".parse::<ModelFormat>().unwrap_err().is_not_found());
    }

    proptest! {
        #[test]
        fn test_world_cube_round_trip(
            px in -1000.0f32..1000.0,
            py in -1000.0f32..1000.0,
            pz in -1000.0f32..1000.0,
            min in -500.0f32..500.0,
            extent in 1.0f32..1000.0,
            size in 1u32..64,
        ) {
            let world = Aabb::new(Vec3::splat(min), Vec3::splat(min + extent));
            let lod = empty_lod(world, Vec3::splat(size as f32));
            let p = Vec3::new(px, py, pz);
            let back = lod.to_world(lod.to_cube(p));
            let tolerance = 1e-3 * (1.0 + p.abs().max_element() + min.abs());
            prop_assert!((back - p).abs().max_element() <= tolerance, "{:?} -> {:?}", p, back);
        }
    }
}
