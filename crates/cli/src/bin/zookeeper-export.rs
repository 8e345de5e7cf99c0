// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

use clap::Parser;
use zelkova_cli::export::{main as export_main, ExportArgs};

fn main() -> anyhow::Result<()> {
    zelkova_cli::init_tracing();
    export_main(ExportArgs::parse())
}
