// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! `zookeeper-export` — write a subtree's textual form.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use zelkova_client::{ConnectOptions, Session};

#[derive(Parser)]
#[command(name = "zookeeper-export", about = "Export a coordination tree as text")]
pub struct ExportArgs {
    /// Include ephemeral nodes
    #[arg(short = 'e', long)]
    pub ephemeral: bool,

    /// Write to a file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Coordination-service connection string
    pub connection: String,

    /// Subtree to export
    #[arg(default_value = "/")]
    pub path: String,
}

pub fn run(args: ExportArgs) -> Result<String> {
    let session = Session::connect(&args.connection, ConnectOptions::new())?;
    let text = session.export_tree(&args.path, args.ephemeral, None)?;
    session.close();
    Ok(text)
}

pub fn main(args: ExportArgs) -> Result<()> {
    let output = args.output.clone();
    let text = run(args)?;
    match output {
        Some(file) => std::fs::write(file, text)?,
        None => print!("{text}"),
    }
    Ok(())
}
