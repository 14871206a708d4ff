// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Value types describing the tensors that flow through an operation graph.
//!
//! This crate provides:
//! - [`DType`]: element data types, including the integer types used for
//!   host-resident step parameters.
//! - [`Layout`]: the memory layout tag a kernel expects.
//! - [`Shape`]: ordered dimension sizes, rank-limited to [`MAX_RANK`].
//! - [`TensorDesc`]: dtype + layout + shape; what shape inference produces.
//! - [`Tensor`]: a tensor *instance*: a descriptor plus an optional
//!   [`DeviceBuffer`] handle and optional [`HostData`].
//!
//! # Ownership
//! Device memory is never allocated or freed here. A [`DeviceBuffer`] is an
//! opaque `(address, size)` handle to memory owned by the caller or by the
//! workspace pool; copying it copies the handle, not the bytes.

mod desc;
mod dtype;
mod error;
mod layout;
mod shape;
mod tensor;

pub use desc::TensorDesc;
pub use dtype::DType;
pub use error::TensorError;
pub use layout::Layout;
pub use shape::{Shape, MAX_RANK};
pub use tensor::{DeviceBuffer, HostData, Tensor};
