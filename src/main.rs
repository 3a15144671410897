mod commands;

use clap::Parser;
use commands::Cli;
use common::cli::utils;
use metadata::MetadataError;
use table::{ErrorKind, TableError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    if let Err(e) = cli.run().await {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(exit_code(&e));
    }
}

/// Exit code for a failed command: the kind of the first library error in the chain.
fn exit_code(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<TableError>() {
            return e.kind().exit_code();
        }
        if let Some(e) = cause.downcast_ref::<MetadataError>() {
            let kind = match e {
                MetadataError::Parse { .. } => ErrorKind::Parse,
                MetadataError::Io { .. } => ErrorKind::Io,
            };
            return kind.exit_code();
        }
    }
    1
}
