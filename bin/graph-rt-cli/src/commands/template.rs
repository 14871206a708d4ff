// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `graph-rt template` command: print or write the sample graph template.

use crate::template::SAMPLE;
use anyhow::Context;
use std::path::PathBuf;

pub fn execute(output: Option<PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, SAMPLE)
                .with_context(|| format!("cannot write '{}'", path.display()))?;
            println!("Wrote sample template to {}", path.display());
        }
        None => print!("{SAMPLE}"),
    }
    Ok(())
}
