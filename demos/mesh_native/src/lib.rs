//! Demo `shine` module exporting the mesh API.
//!
//! Build with `cargo build` in `demos/` and point the loader's
//! `library_path` at the produced `libshine.so` / `shine.dll`.

use std::ffi::c_void;
use std::slice;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInfo {
    pub position_count: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    position: Vector3,
    normal: Vector3,
}

/// Mesh owned by this module and handed out as an opaque pointer.
#[derive(Debug, Default)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    fn quad() -> Self {
        let normal = Vector3::new(0., 0., -1.);
        let vertices = [(0., 0.), (10., 0.), (0., 10.), (10., 10.)]
            .into_iter()
            .map(|(x, y)| Vertex {
                position: Vector3::new(x, y, 0.),
                normal,
            })
            .collect();
        Self {
            vertices,
            indices: vec![0, 2, 1, 2, 3, 1],
        }
    }

    fn info(&self) -> MeshInfo {
        MeshInfo {
            position_count: self.vertices.len() as u32,
            index_count: self.indices.len() as u32,
        }
    }

    /// Replace the geometry with the surface of a single solid voxel.
    fn polygonize_unit_voxel(&mut self) {
        const FACES: [(Vector3, [Vector3; 4]); 6] = [
            (
                Vector3::new(-1., 0., 0.),
                [
                    Vector3::new(0., 0., 0.),
                    Vector3::new(0., 0., 1.),
                    Vector3::new(0., 1., 1.),
                    Vector3::new(0., 1., 0.),
                ],
            ),
            (
                Vector3::new(1., 0., 0.),
                [
                    Vector3::new(1., 0., 0.),
                    Vector3::new(1., 1., 0.),
                    Vector3::new(1., 1., 1.),
                    Vector3::new(1., 0., 1.),
                ],
            ),
            (
                Vector3::new(0., -1., 0.),
                [
                    Vector3::new(0., 0., 0.),
                    Vector3::new(1., 0., 0.),
                    Vector3::new(1., 0., 1.),
                    Vector3::new(0., 0., 1.),
                ],
            ),
            (
                Vector3::new(0., 1., 0.),
                [
                    Vector3::new(0., 1., 0.),
                    Vector3::new(0., 1., 1.),
                    Vector3::new(1., 1., 1.),
                    Vector3::new(1., 1., 0.),
                ],
            ),
            (
                Vector3::new(0., 0., -1.),
                [
                    Vector3::new(0., 0., 0.),
                    Vector3::new(0., 1., 0.),
                    Vector3::new(1., 1., 0.),
                    Vector3::new(1., 0., 0.),
                ],
            ),
            (
                Vector3::new(0., 0., 1.),
                [
                    Vector3::new(0., 0., 1.),
                    Vector3::new(1., 0., 1.),
                    Vector3::new(1., 1., 1.),
                    Vector3::new(0., 1., 1.),
                ],
            ),
        ];

        self.vertices.clear();
        self.indices.clear();
        for (normal, corners) in FACES {
            let base = self.vertices.len() as u32;
            self.vertices.extend(corners.iter().map(|&position| Vertex { position, normal }));
            self.indices
                .extend([0, 1, 2, 0, 2, 3].iter().map(|i| base + i));
        }
    }
}

#[no_mangle]
pub extern "C" fn create_mesh() -> *mut c_void {
    Box::into_raw(Box::new(Mesh::quad())).cast()
}

/// # Safety
/// `mesh_ptr` must come from `create_mesh` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn release_mesh(mesh_ptr: *mut c_void) {
    if !mesh_ptr.is_null() {
        drop(Box::from_raw(mesh_ptr.cast::<Mesh>()));
    }
}

/// # Safety
/// `mesh_ptr` must be a live mesh from `create_mesh`.
#[no_mangle]
pub unsafe extern "C" fn get_mesh_info(mesh_ptr: *const c_void) -> MeshInfo {
    (*mesh_ptr.cast::<Mesh>()).info()
}

/// Copy the mesh into caller buffers. Nothing is written unless every
/// buffer matches the sizes reported by `get_mesh_info`.
///
/// # Safety
/// `mesh_ptr` must be a live mesh and each buffer valid for its count.
#[no_mangle]
pub unsafe extern "C" fn fill_mesh_data(
    mesh_ptr: *const c_void,
    positions: *mut Vector3,
    position_count: i32,
    normals: *mut Vector3,
    normal_count: i32,
    indices: *mut u32,
    index_count: i32,
) {
    let mesh = &*mesh_ptr.cast::<Mesh>();
    let info = mesh.info();
    if position_count as u32 != info.position_count
        || normal_count as u32 != info.position_count
        || index_count as u32 != info.index_count
    {
        return;
    }

    let positions = slice::from_raw_parts_mut(positions, position_count as usize);
    let normals = slice::from_raw_parts_mut(normals, normal_count as usize);
    for ((pos, normal), vertex) in positions.iter_mut().zip(normals).zip(&mesh.vertices) {
        *pos = vertex.position;
        *normal = vertex.normal;
    }
    slice::from_raw_parts_mut(indices, index_count as usize).copy_from_slice(&mesh.indices);
}

/// # Safety
/// `mesh_ptr` must be a live mesh not accessed concurrently.
#[no_mangle]
pub unsafe extern "C" fn polygonize_voxel(mesh_ptr: *mut c_void) {
    (*mesh_ptr.cast::<Mesh>()).polygonize_unit_voxel();
}
