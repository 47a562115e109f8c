// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};

use ctc::api::CtcApi;
use ctc::codepage::{self, Codepage};
use ctc::config::{self, Config};
use ctc::ctc::{Ctc, Endian, HerculesVersion};
use ctc::error::Error;
use ctc::http;

#[derive(Parser, Debug)]
#[command(name = "ctcserver", about = "HTTP API bridge to a mainframe guest over Hercules CTC adapters")]
struct Args {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Enable trace logging
    #[arg(long)]
    trace: bool,

    /// Log human-readable console output instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Config file path
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Code page used for EBCDIC translation
    #[arg(long, value_enum, default_value_t = CodepageArg::Bracket)]
    codepage: CodepageArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodepageArg {
    Bracket,
    Cp37,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // -trace outranks -debug.
    let level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    if args.pretty {
        builder.init();
    } else {
        builder.json().init();
    }

    codepage::set_codepage(match args.codepage {
        CodepageArg::Bracket => Codepage::Bracket,
        CodepageArg::Cp37 => Codepage::Cp37,
    });

    println!();
    println!("CTC Mainframe API bridge");
    println!();

    let config = match config::read_config(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("couldn't read server configuration: {err}");
            return ExitCode::from(1);
        }
    };

    let (ctccmd, ctcdata) = match connect(&config).await {
        Ok(devices) => devices,
        Err(err) => {
            error!("unable to connect to Hercules: {err}");
            return ExitCode::from(1);
        }
    };

    let api = Arc::new(CtcApi::new(ctccmd, ctcdata));
    let app = http::router(api);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(port = config.listen_port, "couldn't bind HTTP listener: {err}");
            return ExitCode::from(1);
        }
    };

    info!(port = config.listen_port, "serving HTTP API");
    if let Err(err) = axum::serve(listener, app).await {
        error!("HTTP server failed: {err}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Brings up both CTC devices at once. Hercules 3.13 makes exactly one
/// connection attempt per device, so both must be listening before the
/// emulator attaches either; the two connects therefore run in parallel
/// and any half-connected survivor is torn down on failure.
async fn connect(config: &Config) -> Result<(Ctc, Ctc), Error> {
    let ver = if config.hercules_v313 {
        HerculesVersion::Old
    } else {
        HerculesVersion::New
    };
    let bo = if config.hercules_host_bigendian {
        Endian::Big
    } else {
        Endian::Little
    };

    let host = config.hercules_host.clone();
    let (lport, rport) = (config.cmd_local_port, config.cmd_remote_port);
    let cmd_task = tokio::task::spawn_blocking(move || -> Result<Ctc, Error> {
        let mut dev = Ctc::new(lport, rport, 0x500, &host, ver, bo)?;
        dev.connect()?;
        Ok(dev)
    });

    let host = config.hercules_host.clone();
    let (lport, rport) = (config.data_local_port, config.data_remote_port);
    let data_task = tokio::task::spawn_blocking(move || -> Result<Ctc, Error> {
        let mut dev = Ctc::new(lport, rport, 0x501, &host, ver, bo)?;
        dev.connect()?;
        Ok(dev)
    });

    let (cmd_result, data_result) = tokio::join!(cmd_task, data_task);
    let cmd_result = flatten(cmd_result);
    let data_result = flatten(data_result);

    match (cmd_result, data_result) {
        (Ok(ctccmd), Ok(ctcdata)) => Ok((ctccmd, ctcdata)),
        (Err(err), Ok(mut ctcdata)) => {
            ctcdata.close();
            error!("couldn't connect CTC command device: {err}");
            Err(err)
        }
        (Ok(mut ctccmd), Err(err)) => {
            ctccmd.close();
            error!("couldn't connect CTC data device: {err}");
            Err(err)
        }
        (Err(cmd_err), Err(data_err)) => {
            error!("couldn't connect CTC command device: {cmd_err}");
            error!("couldn't connect CTC data device: {data_err}");
            Err(cmd_err)
        }
    }
}

fn flatten(result: Result<Result<Ctc, Error>, tokio::task::JoinError>) -> Result<Ctc, Error> {
    match result {
        Ok(inner) => inner,
        Err(join_err) => Err(Error::Io(io::Error::new(io::ErrorKind::Other, join_err))),
    }
}
