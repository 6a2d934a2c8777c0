use criterion::{criterion_group, criterion_main, Criterion, black_box};

use std::sync::Arc;

use cubeserve::dataset::{CubeBounds, LevelOfDetail, SetVersion};
use cubeserve::math::Aabb;
use cubeserve::octree::Octree;

use glam::{IVec3, Vec3};

/// Shell of a sphere of radius `size / 2` on a `size`^3 grid, like a scanned surface
fn shell_cells(size: i32) -> Vec<IVec3> {
    let center = Vec3::splat(size as f32 * 0.5);
    let radius = size as f32 * 0.45;
    let mut cells = Vec::new();
    for x in 0..size {
        for y in 0..size {
            for z in 0..size {
                let d = (IVec3::new(x, y, z).as_vec3() + 0.5).distance(center);
                if (d - radius).abs() < 1.0 {
                    cells.push(IVec3::new(x, y, z));
                }
            }
        }
    }
    cells
}

fn build_tree(cells: &[IVec3]) -> Octree<CubeBounds> {
    let lod: Arc<str> = Arc::from("L1");
    let mut tree = Octree::new(Aabb::default(), 1.0);
    tree.add_all(cells.iter().map(|&c| CubeBounds::unit(c, lod.clone())))
        .unwrap();
    tree.update_tree();
    tree
}

fn bench_octree_build_32(c: &mut Criterion) {
    let cells = shell_cells(32);

    c.bench_function("octree_build_32", |b| {
        b.iter(|| build_tree(black_box(&cells)));
    });
}

fn bench_octree_build_64(c: &mut Criterion) {
    let cells = shell_cells(64);

    c.bench_function("octree_build_64", |b| {
        b.iter(|| build_tree(black_box(&cells)));
    });
}

fn test_set(size: i32) -> SetVersion {
    let cells = shell_cells(size);
    let world = Aabb::new(Vec3::ZERO, Vec3::splat(size as f32 * 10.0));
    let lod = |name: &str| LevelOfDetail::new(name, 1, build_tree(&cells), Vec3::splat(size as f32), world);
    SetVersion::new("bench", "v1")
        .with_detail_level(lod("L1"))
        .with_detail_level(lod("L2"))
}

fn bench_queries(c: &mut Criterion) {
    let set = test_set(64);

    c.bench_function("query_box_64", |b| {
        let probe = Aabb::new(Vec3::splat(100.0), Vec3::splat(220.0));
        b.iter(|| set.query_box("L1", black_box(&probe)).unwrap());
    });

    c.bench_function("query_sphere_profile_64", |b| {
        b.iter(|| {
            set.query_sphere_profile("L1=1,L2=2", black_box(Vec3::splat(320.0)), 300.0)
                .unwrap()
        });
    });

    c.bench_function("query_neighborhood_64", |b| {
        b.iter(|| {
            set.query_neighborhood(Some("L1"), black_box(Vec3::new(35.0, 320.0, 320.0)))
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_octree_build_32,
    bench_octree_build_64,
    bench_queries,
);
criterion_main!(benches);
