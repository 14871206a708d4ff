// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory layout tags.

/// How a tensor's elements are arranged in memory.
///
/// The engine never interprets the layout; it is carried through shape
/// inference so kernels can pick the right code path.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Plain row-major N-dimensional layout.
    #[default]
    Nd,
    /// Batch, channel, height, width.
    Nchw,
    /// Batch, height, width, channel.
    Nhwc,
    /// Blocked fractal layout used by matrix units.
    FractalNz,
}

impl Layout {
    /// Returns a short label.
    pub fn as_str(self) -> &'static str {
        match self {
            Layout::Nd => "nd",
            Layout::Nchw => "nchw",
            Layout::Nhwc => "nhwc",
            Layout::FractalNz => "fractal_nz",
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
