// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! `zookeeper-import` — reconcile a tree definition against the service.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use zelkova_client::{ConnectOptions, ImportOptions, Session, Trim};
use zelkova_core::acl;

#[derive(Parser)]
#[command(
    name = "zookeeper-import",
    about = "Import a tree definition from a file or stdin"
)]
pub struct ImportArgs {
    /// Report changes without applying them
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Delete live paths absent from the definition
    #[arg(short = 't', long)]
    pub trim: bool,

    /// Permission bits for created nodes, as an integer bitmask
    #[arg(short = 'p', long, value_name = "BITS", default_value_t = acl::perms::ALL)]
    pub permission: u32,

    /// Coordination-service connection string
    pub connection: String,

    /// Definition file; `-` reads standard input
    #[arg(default_value = "-")]
    pub file: String,

    /// Base path the definition applies under
    #[arg(default_value = "/")]
    pub path: String,
}

pub fn run(args: ImportArgs, text: &str) -> Result<Vec<String>> {
    let session = Session::connect(&args.connection, ConnectOptions::new())?;
    let options = ImportOptions::new()
        .base(&args.path)
        .trim(if args.trim { Trim::Prune } else { Trim::Warn })
        .acls(vec![acl::world_acl(args.permission)])
        .dry_run(args.dry_run);
    let report = session.import_tree(text, options)?;
    session.close();
    Ok(report)
}

pub fn main(args: ImportArgs) -> Result<()> {
    let text = if args.file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file))?
    };
    for line in run(args, &text)? {
        println!("{line}");
    }
    Ok(())
}
