//! Mesh API exported by the `shine` native module.
//!
//! [`MeshApi`] is the symbol table; [`Mesh`] owns one native mesh and
//! releases it on drop. A mesh must not outlive the loaded library its API
//! came from.

use crate::native_api;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshInfo {
    pub position_count: u32,
    pub index_count: u32,
}

native_api! {
    /// Entry points of the `shine` mesh module.
    pub struct MeshApi in "shine" {
        create_mesh: unsafe extern "C" fn() -> *mut c_void,
        release_mesh: unsafe extern "C" fn(*mut c_void),
        get_mesh_info: unsafe extern "C" fn(*const c_void) -> MeshInfo,
        fill_mesh_data: unsafe extern "C" fn(
            *const c_void,
            *mut Vector3,
            i32,
            *mut Vector3,
            i32,
            *mut u32,
            i32,
        ),
        polygonize_voxel: unsafe extern "C" fn(*mut c_void),
    }
}

/// Geometry copied out of a native mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vector3>,
    pub normals: Vec<Vector3>,
    pub indices: Vec<u32>,
}

/// A mesh owned by the native module.
pub struct Mesh {
    api: Arc<MeshApi>,
    ptr: NonNull<c_void>,
}

// SAFETY: the native mesh is a plain heap object with no thread affinity.
unsafe impl Send for Mesh {}

impl Mesh {
    /// Create an empty mesh. Returns `None` if the module could not allocate
    /// one.
    ///
    /// # Safety
    /// The library `api` was bound from must stay loaded until the returned
    /// mesh is dropped. Unloading it first leaves every method of the mesh,
    /// including its destructor, calling into unmapped code.
    pub unsafe fn new(api: Arc<MeshApi>) -> Option<Self> {
        // SAFETY: `create_mesh` takes no arguments and returns an owned mesh.
        let ptr = NonNull::new(unsafe { (api.create_mesh)() })?;
        Some(Self { api, ptr })
    }

    #[must_use]
    pub fn info(&self) -> MeshInfo {
        // SAFETY: `ptr` is a live mesh created by this API.
        unsafe { (self.api.get_mesh_info)(self.ptr.as_ptr()) }
    }

    /// Run the voxel polygonizer into this mesh.
    pub fn polygonize(&mut self) {
        // SAFETY: `ptr` is a live mesh and `&mut self` excludes other use.
        unsafe { (self.api.polygonize_voxel)(self.ptr.as_ptr()) }
    }

    /// Copy the mesh geometry out of native memory.
    #[must_use]
    pub fn data(&self) -> MeshData {
        let info = self.info();
        let vertices = info.position_count as usize;
        let mut data = MeshData {
            positions: vec![Vector3::default(); vertices],
            normals: vec![Vector3::default(); vertices],
            indices: vec![0; info.index_count as usize],
        };
        // SAFETY: buffers are sized from `get_mesh_info` for the same mesh.
        unsafe {
            (self.api.fill_mesh_data)(
                self.ptr.as_ptr(),
                data.positions.as_mut_ptr(),
                vertices as i32,
                data.normals.as_mut_ptr(),
                vertices as i32,
                data.indices.as_mut_ptr(),
                info.index_count as i32,
            );
        }
        data
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        // SAFETY: `ptr` was created by `create_mesh` and is released once.
        unsafe { (self.api.release_mesh)(self.ptr.as_ptr()) };
    }
}
