//! A thin manual-testing client, mirroring mini-redis's `src/bin/cli.rs`:
//! connect, run one query given as a raw ReQL term array on the command
//! line, and print whatever comes back. Not part of the public crate API —
//! just a smoke test for poking a running `rethinkdb` by hand.

use std::time::Duration;

use structopt::StructOpt;

use reethink_core::{client, Config, RunResult};

#[derive(StructOpt)]
struct Cli {
    /// Raw ReQL term array to run, e.g. `[[15,[[14,["test"]],"people"]]]`
    /// for `r.db("test").table("people")`.
    query: String,

    #[structopt(long = "--host", default_value = "127.0.0.1")]
    host: String,

    #[structopt(long = "--port", default_value = "28015")]
    port: u16,

    #[structopt(long = "--auth-key", default_value = "")]
    auth_key: String,

    #[structopt(long = "--db")]
    db: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> reethink_core::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let cli = Cli::from_args();

    let mut config = Config::new(cli.host)
        .port(cli.port)
        .auth_key(cli.auth_key)
        .connect_timeout(Duration::from_secs(10));
    if let Some(db) = cli.db {
        config = config.default_db(db);
    }

    let query: serde_json::Value = serde_json::from_str(&cli.query)
        .map_err(|e| reethink_core::Error::Protocol(format!("invalid query json: {e}")))?;

    let client = client::connect(config).await?;

    match client.run(query).await? {
        RunResult::Atom(value) => println!("{value}"),
        RunResult::Sequence(values) => {
            for value in values {
                println!("{value}");
            }
        }
        RunResult::Cursor(mut cursor) => {
            while let Some(value) = cursor.next().await? {
                println!("{value}");
            }
        }
    }

    client.close().await;
    Ok(())
}
