// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor instances: a descriptor plus where its data lives.

use crate::{DType, Shape, TensorDesc, TensorError};

/// An opaque handle to a region of device memory.
///
/// The engine treats `addr` as a number: it never dereferences it. Buffers
/// are owned by the caller (variant-pack tensors) or by the workspace pool
/// (internal tensors); a `DeviceBuffer` only names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBuffer {
    addr: u64,
    size_bytes: usize,
}

impl DeviceBuffer {
    /// Wraps a raw device address and byte size.
    pub fn new(addr: u64, size_bytes: usize) -> Self {
        Self { addr, size_bytes }
    }

    /// Returns the device address.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Returns the size of the region in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Returns a sub-region `[offset, offset + len)` of this buffer.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::DeviceBuffer;
    /// let ws = DeviceBuffer::new(0x1000, 256);
    /// let r = ws.slice(128, 64).unwrap();
    /// assert_eq!(r.addr(), 0x1080);
    /// assert!(ws.slice(200, 64).is_err());
    /// ```
    pub fn slice(&self, offset: usize, len: usize) -> Result<DeviceBuffer, TensorError> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= self.size_bytes => Ok(DeviceBuffer {
                addr: self.addr + offset as u64,
                size_bytes: len,
            }),
            _ => Err(TensorError::RegionOutOfBounds {
                offset,
                len,
                size: self.size_bytes,
            }),
        }
    }
}

/// Small host-resident data read directly by kernels.
///
/// Step parameters (sequence lengths, cache offsets, layer ids) travel this
/// way so they never need a device transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostData {
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl HostData {
    /// Element type of the data.
    pub fn dtype(&self) -> DType {
        match self {
            HostData::I32(_) => DType::I32,
            HostData::I64(_) => DType::I64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            HostData::I32(v) => v.len(),
            HostData::I64(v) => v.len(),
        }
    }

    /// Returns `true` when no elements are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the values if this is `I32` data.
    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            HostData::I32(v) => Some(v),
            HostData::I64(_) => None,
        }
    }

    /// Returns the values if this is `I64` data.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            HostData::I64(v) => Some(v),
            HostData::I32(_) => None,
        }
    }

    /// The 1-D descriptor matching this data.
    pub fn desc(&self) -> TensorDesc {
        TensorDesc::new(self.dtype(), Shape::vector(self.len()))
    }
}

/// A tensor instance bound into a plan slot or a variant pack.
///
/// A slot may be unbound (descriptor only, before setup or between steps),
/// device-bound, host-resident, or both: some kernels read a step parameter
/// from host memory while a device copy also exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub device: Option<DeviceBuffer>,
    pub host: Option<HostData>,
}

impl Tensor {
    /// A tensor with a descriptor and no storage.
    pub fn unbound(desc: TensorDesc) -> Self {
        Self {
            desc,
            device: None,
            host: None,
        }
    }

    /// A tensor backed by device memory.
    pub fn on_device(desc: TensorDesc, buffer: DeviceBuffer) -> Self {
        Self {
            desc,
            device: Some(buffer),
            host: None,
        }
    }

    /// A host-resident 1-D `i32` tensor.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Tensor};
    /// let t = Tensor::host_i32(vec![3, 3]);
    /// assert_eq!(t.desc.dtype, DType::I32);
    /// assert_eq!(t.desc.shape.dims(), &[2]);
    /// assert!(t.is_host_resident());
    /// ```
    pub fn host_i32(values: Vec<i32>) -> Self {
        let data = HostData::I32(values);
        Self {
            desc: data.desc(),
            device: None,
            host: Some(data),
        }
    }

    /// Attaches host data, rewriting the descriptor to match it.
    ///
    /// Any device buffer already bound stays exactly as it was.
    pub fn bind_host(&mut self, data: HostData) {
        self.desc = data.desc().with_layout(self.desc.layout);
        self.host = Some(data);
    }

    /// Checks that attached host data agrees with the descriptor.
    pub fn check_host(&self) -> Result<(), TensorError> {
        match &self.host {
            Some(data) if data.len() != self.desc.num_elements() => {
                Err(TensorError::HostDataMismatch {
                    expected: self.desc.num_elements(),
                    actual: data.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Returns `true` if a device buffer is attached.
    pub fn is_device_bound(&self) -> bool {
        self.device.is_some()
    }

    /// Returns `true` if host data is attached.
    pub fn is_host_resident(&self) -> bool {
        self.host.is_some()
    }

    /// Returns `true` if the tensor has any storage at all.
    pub fn has_data(&self) -> bool {
        self.device.is_some() || self.host.is_some()
    }

    /// Detaches the device buffer, keeping descriptor and host data.
    pub fn unbind_device(&mut self) {
        self.device = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_desc(rows: usize, cols: usize) -> TensorDesc {
        TensorDesc::new(DType::F32, Shape::matrix(rows, cols))
    }

    #[test]
    fn test_slice_bounds() {
        let buf = DeviceBuffer::new(4096, 512);
        let r = buf.slice(0, 512).unwrap();
        assert_eq!(r, buf);
        assert!(buf.slice(1, 512).is_err());
        assert!(buf.slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_unbound() {
        let t = Tensor::unbound(f32_desc(4, 8));
        assert!(!t.has_data());
        assert!(!t.is_device_bound());
    }

    #[test]
    fn test_bind_host_keeps_device() {
        let buf = DeviceBuffer::new(0x2000, 16);
        let mut t = Tensor::on_device(f32_desc(1, 4), buf);
        t.bind_host(HostData::I32(vec![7, 7]));

        assert_eq!(t.device, Some(buf));
        assert_eq!(t.desc.dtype, DType::I32);
        assert_eq!(t.desc.shape, Shape::vector(2));
        assert_eq!(t.host.as_ref().and_then(|h| h.as_i32()), Some(&[7, 7][..]));
        t.check_host().unwrap();
    }

    #[test]
    fn test_check_host_mismatch() {
        let mut t = Tensor::host_i32(vec![1, 2, 3]);
        t.desc = t.desc.with_shape(Shape::vector(2));
        assert!(matches!(
            t.check_host(),
            Err(TensorError::HostDataMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_unbind_device() {
        let mut t = Tensor::on_device(f32_desc(2, 2), DeviceBuffer::new(64, 16));
        t.unbind_device();
        assert!(!t.has_data());
        assert_eq!(t.desc, f32_desc(2, 2));
    }

    #[test]
    fn test_host_data_accessors() {
        let d = HostData::I64(vec![1, 2]);
        assert_eq!(d.dtype(), DType::I64);
        assert_eq!(d.as_i64(), Some(&[1i64, 2][..]));
        assert!(d.as_i32().is_none());
        assert!(!d.is_empty());
    }
}
