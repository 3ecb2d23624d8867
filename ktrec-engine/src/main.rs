use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ktrec_engine::config::{CliArgs, Command, DeviceArgs, EvaluateArgs, ServeArgs, TrainArgs};
use ktrec_engine::dataset::read_ndjson;
use ktrec_engine::inference::run_evaluation;
use ktrec_engine::models::weights::{resolve_source, save_bundle, ModelBundle};
use ktrec_engine::protocol::EvaluateParams;
use ktrec_engine::server::{RecommendServer, ServerConfig};
use ktrec_engine::training::train_from_interactions;
use ktrec_engine::transport::NdjsonTransport;

fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Logs go to stderr; stdout carries protocol frames and reports.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    match args.command {
        Command::Serve(serve) => run_serve(serve),
        Command::Train(train) => run_train(train),
        Command::Evaluate(eval) => run_evaluate(eval),
    }
}

fn select_device(args: &DeviceArgs) -> Result<candle_core::Device> {
    let device = match args.device.as_str() {
        #[cfg(feature = "cuda")]
        "cuda" => candle_core::Device::new_cuda(args.device_id)?,
        #[cfg(feature = "metal")]
        "metal" => candle_core::Device::new_metal(args.device_id)?,
        "cpu" => candle_core::Device::Cpu,
        other => {
            tracing::warn!("Unknown device '{}', falling back to CPU", other);
            candle_core::Device::Cpu
        }
    };
    tracing::info!(device = ?device, "Compute device selected");
    Ok(device)
}

fn load_bundle(model: &str, revision: Option<&str>, device: &candle_core::Device) -> Result<ModelBundle> {
    let files = resolve_source(model, revision).resolve()?;
    Ok(ModelBundle::load(&files, device)?)
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let device = select_device(&args.device)?;
    let bundle = load_bundle(&args.model.model, args.model.revision.as_deref(), &device)?;

    let config = ServerConfig {
        server_name: args.server_name,
        server_version: args.server_version,
        default_top_n: args.top_n,
    };
    let mut server = RecommendServer::new(config, Arc::new(bundle), NdjsonTransport::new());

    tracing::info!("ktrec-engine JSON-RPC server ready");
    let stdin = std::io::stdin();
    server.run(stdin.lock())
}

fn run_train(args: TrainArgs) -> Result<()> {
    let device = select_device(&args.device)?;
    let records = read_ndjson(&args.interactions)?;
    let trained = train_from_interactions(
        &records,
        &args.model_dims(),
        args.min_interactions,
        &args.training_config(),
        &device,
    )?;
    save_bundle(&args.output, &trained.config, &trained.index, &trained.varmap)?;

    println!("{}", serde_json::to_string_pretty(&trained.report)?);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let device = select_device(&args.device)?;
    let bundle = load_bundle(&args.model.model, args.model.revision.as_deref(), &device)?;
    let params = EvaluateParams {
        interactions: read_ndjson(&args.interactions)?,
        k: Some(args.k),
        min_interactions: Some(args.min_interactions),
        batch_size: Some(args.batch_size),
    };
    let result = run_evaluation(&bundle, &params)?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
