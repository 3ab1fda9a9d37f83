//! The willow chess engine.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
#![warn(missing_docs, missing_debug_implementations, unused_extern_crates)]

use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use clap::{App, Arg, ArgMatches, SubCommand, crate_version};
use simplelog::{WriteLogger, LevelFilter, Config};
use chess::{Board, STARTPOS_FEN, variations};
use willow::engine::Options;
use willow::protocol::uci::Uci;

fn main() -> Result<(), Box<dyn Error>> {
    let matches =
        App::new("willow")
            .version(crate_version!())
            .about("A UCI chess engine guided by an ONNX policy/value network")
            .arg(Arg::with_name("net")
                .long("net")
                .short("n")
                .value_name("ONNX_FILE")
                .takes_value(true)
                .default_value("willow.onnx")
                .help("The network used to evaluate positions"))
            .arg(Arg::with_name("log-file")
                .long("log-file")
                .global(true)
                .value_name("FILE")
                .takes_value(true)
                .help("Writes a protocol and search log to FILE"))
            .arg(Arg::with_name("log-level")
                .long("log-level")
                .global(true)
                .value_name("LEVEL")
                .takes_value(true)
                .default_value("info")
                .help("How chatty the log gets (error, warn, info, debug or trace)"))
            .subcommand(SubCommand::with_name("counts")
                .about("Counts the legal variations from one or more positions, as a check \
                        on the move generator")
                .arg(Arg::with_name("depth")
                    .long("depth")
                    .short("d")
                    .value_name("PLIES")
                    .takes_value(true)
                    .required(true)
                    .help("How many plies deep to count"))
                .arg(Arg::with_name("position")
                    .value_name("FEN")
                    .takes_value(true)
                    .multiple(true)
                    .help("Positions in Forsyth-Edwards Notation; defaults to the \
                           starting position")))
            .get_matches();

    init_logging(&matches)?;

    match matches.subcommand() {
        ("counts", Some(counts)) => run_counts(counts),
        _ => {
            let net = PathBuf::from(matches.value_of_os("net").expect("INFALLIBLE"));
            Uci::new(&net, Options::default())?.run();
            Ok(())
        }
    }
}

// Logging is off unless a log file was asked for; the log crate's macros are no-ops then.
fn init_logging(matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    let path = match matches.value_of_os("log-file") {
        Some(path) => path,
        None => return Ok(()),
    };

    let level: LevelFilter = matches
        .value_of("log-level")
        .expect("INFALLIBLE")
        .parse()
        .map_err(|_| "the log level must be one of error, warn, info, debug or trace")?;

    WriteLogger::init(level, Config::default(), File::create(path)?)?;
    Ok(())
}

fn run_counts(matches: &ArgMatches<'_>) -> Result<(), Box<dyn Error>> {
    let depth: usize = matches
        .value_of("depth")
        .expect("INFALLIBLE")
        .parse()
        .map_err(|_| "the depth must be a whole number of plies")?;

    let positions: Vec<&str> = match matches.values_of("position") {
        Some(positions) => positions.collect(),
        None => vec![STARTPOS_FEN],
    };

    for fen in positions {
        let board: Board = fen.parse().map_err(|err| format!("{}: {}", fen, err))?;
        println!("{}", fen);
        let total = variations::print(&board, depth);
        println!("total at depth {}: {}\n", depth, total);
    }
    Ok(())
}
