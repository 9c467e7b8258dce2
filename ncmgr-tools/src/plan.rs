//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use std::sync::Arc;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use ncmgr_netconf::data::{DataNode, DataTree, EditOperation, InstancePath};
use ncmgr_netconf::device::Device;
use ncmgr_netconf::error::Error;
use ncmgr_netconf::schema::StaticSchema;
use ncmgr_netconf::test::stub::StubDevice;
use serde::Deserialize;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

// Edit intent read from the command line.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Intent {
    #[serde(default = "default_operation")]
    default_operation: EditOperation,
    #[serde(default)]
    parent: Option<String>,
    config: Vec<DataNode>,
}

fn default_operation() -> EditOperation {
    EditOperation::Merge
}

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("ncmgr_netconf=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(filename: &str) -> T {
    let data = std::fs::read_to_string(filename)
        .unwrap_or_else(|error| panic!("Unable to read {filename}: {error}"));
    serde_json::from_str(&data)
        .unwrap_or_else(|error| panic!("Failed to parse {filename}: {error}"))
}

// Runs the intent through a single transaction.
async fn apply(device: &Device, intent: &Intent) -> Result<(), Error> {
    let parent = match &intent.parent {
        Some(parent) => parent.parse()?,
        None => InstancePath::root(),
    };

    let mut tx = device.begin_transaction()?;
    for node in &intent.config {
        tx.edit(&parent, node, intent.default_operation).await?;
    }
    tx.commit().await
}

fn print_datastore(name: &str, data: &DataTree) {
    println!("{name}:");
    match serde_json::to_string_pretty(data) {
        Ok(data) => println!("{data}"),
        Err(error) => eprintln!("Failed to encode {name} datastore: {error}"),
    }
}

// ===== main =====

#[tokio::main]
async fn main() {
    // Parse command-line parameters.
    let matches = App::new("Plan configuration changes")
        .about("Run an edit intent against a simulated NETCONF device")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("schema")
                .long("schema")
                .value_name("file")
                .help("Schema definition (JSON)")
                .required(true),
        )
        .arg(
            Arg::with_name("running")
                .long("running")
                .value_name("file")
                .help("Initial running datastore (JSON)"),
        )
        .arg(
            Arg::with_name("INTENT")
                .help("Edit intent (JSON)")
                .required(true)
                .index(1),
        )
        .get_matches();

    // Read configuration file.
    let config = Config::load(matches.value_of("config"));

    // Initialize tracing.
    init_tracing(&config.logging);

    // Read input documents.
    let schema: StaticSchema = read_json(matches.value_of("schema").unwrap());
    let schema = Arc::new(schema);
    let running = matches
        .value_of("running")
        .map(read_json::<DataTree>)
        .unwrap_or_default();
    let intent: Intent = read_json(matches.value_of("INTENT").unwrap());

    // Start the simulated device.
    let stub = StubDevice::new(schema.clone(), config.simulation.capabilities());
    stub.set_running(running);
    let device = Device::connect(
        "simulated",
        config.device,
        stub.connector(),
        schema,
        None,
    );
    if let Err(error) = device.wait_up().await {
        eprintln!("Failed to connect to the simulated device: {error}");
        std::process::exit(1);
    }
    info!("starting up");

    let result = apply(&device, &intent).await;
    device.close().await;

    // Print the resulting protocol sequence and datastores.
    println!("operations:");
    for operation in stub.operations() {
        println!("  {operation}");
    }
    print_datastore("running", &stub.running());
    print_datastore("candidate", &stub.candidate());

    if let Err(error) = result {
        eprintln!("Transaction failed: {error}");
        std::process::exit(1);
    }
}
