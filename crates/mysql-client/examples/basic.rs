//! Basic session example.
//!
//! Runs a session against the in-process mock server from `mysql-testing`,
//! so it needs no database. Swap the mock's address for a real server's
//! once you have an authenticated stream from your handshake code.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=mysql_client=debug cargo run --example basic
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mysql_client::{CancelContext, Config, Error, Negotiated, Session, TxOptions, Value};
use mysql_testing::fixtures::users_table;
use mysql_testing::mock_server::{MockMySqlServer, MockResponse};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let users = users_table();
    let server = MockMySqlServer::builder()
        .with_response(users.select_all_sql(), users.response())
        .with_response(
            "INSERT INTO users (name) VALUES ('dave')",
            MockResponse::insert(1, 4),
        )
        .build()
        .await
        .expect("mock server should start");

    let stream = server.connect().await.expect("mock server should accept");
    let negotiated = Negotiated::new(server.capabilities())
        .connection_id(1)
        .server_version("8.0.36-mock");
    let config = Config::new()
        .max_allowed_packet(4 << 20)
        .interpolate_params(true);

    let mut session = Session::establish(stream, negotiated, config).await?;
    println!("Connected to {} (thread {})", session.server_version(), session.connection_id());

    // Every operation takes a context; this one gives up after five seconds.
    let ctx = CancelContext::none().with_timeout(Duration::from_secs(5));

    let mut rows = session.query(&ctx, &users.select_all_sql(), &[]).await?;
    while let Some(row) = rows.next_row().await? {
        let id: i64 = row.get(0)?;
        let name: String = row.get_by_name("name")?;
        let email: Option<String> = row.get(2)?;
        println!("  {id}: {name} <{}>", email.as_deref().unwrap_or("-"));
    }
    drop(rows);

    // Arguments are inlined client-side when interpolation is enabled.
    let mut tx = session.begin_transaction(&ctx, TxOptions::new()).await?;
    let result = tx
        .exec(&ctx, "INSERT INTO users (name) VALUES (?)", &[Value::from("dave")])
        .await?;
    println!("Inserted row {}", result.last_insert_id());
    tx.commit().await?;

    session.close().await;
    server.stop();
    Ok(())
}
