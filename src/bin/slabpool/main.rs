use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_status;
mod cmd_put;
mod cmd_get;
mod cmd_del;
mod cmd_annex;
mod cmd_flush;

fn init_logger() {
    // RUST_LOG overrides; default is info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Status { pool, json } =>
            cmd_status::exec_with_json(pool, json),

        cli::Cmd::Put { pool, key, value, ttl } =>
            cmd_put::exec(pool, key, value, ttl),

        cli::Cmd::Get { pool, key, out } =>
            cmd_get::exec(pool, key, out),

        cli::Cmd::Del { pool, key } =>
            cmd_del::exec(pool, key),

        cli::Cmd::Append { pool, key, value } =>
            cmd_annex::exec(pool, key, value, true),

        cli::Cmd::Prepend { pool, key, value } =>
            cmd_annex::exec(pool, key, value, false),

        cli::Cmd::Flush { pool } =>
            cmd_flush::exec(pool),
    }
}
